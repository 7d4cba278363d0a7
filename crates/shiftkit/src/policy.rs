//! Bucket policy documents.
//!
//! Only the statement tagged [`STATEMENT_SID`] belongs to this tool. Every
//! other statement in an existing policy is preserved as-is.

use serde_json::{Value, json};

/// `Sid` of the statement this tool owns.
pub const STATEMENT_SID: &str = "StackshiftStateAccess";

/// Actions the state backend needs.
pub const STATE_ACTIONS: [&str; 4] = [
    "s3:GetObject",
    "s3:PutObject",
    "s3:DeleteObject",
    "s3:ListBucket",
];

/// Principal ARN for a caller identity.
///
/// `sts get-caller-identity` reports assumed roles as
/// `arn:aws:sts::<acct>:assumed-role/<role>/<session>`, which bucket policies
/// do not accept; those are mapped to `arn:aws:iam::<acct>:role/<role>`.
pub fn principal_arn(caller_arn: &str) -> String {
    let Some(rest) = caller_arn.strip_prefix("arn:") else {
        return caller_arn.to_string();
    };
    let parts: Vec<&str> = rest.splitn(5, ':').collect();
    if let [partition, "sts", _, account, resource] = parts.as_slice()
        && let Some(role_path) = resource.strip_prefix("assumed-role/")
        && let Some((role, _session)) = role_path.split_once('/')
    {
        return format!("arn:{partition}:iam::{account}:role/{role}");
    }
    caller_arn.to_string()
}

/// The statement granting `principal` state access to `bucket`.
pub fn access_statement(bucket: &str, principal: &str) -> Value {
    json!({
        "Sid": STATEMENT_SID,
        "Effect": "Allow",
        "Principal": { "AWS": principal },
        "Action": STATE_ACTIONS,
        "Resource": [
            format!("arn:aws:s3:::{bucket}"),
            format!("arn:aws:s3:::{bucket}/*"),
        ],
    })
}

/// Parse an existing policy document; `None` or blank means no policy.
pub fn parse(document: Option<&str>) -> serde_json::Result<Value> {
    match document.map(str::trim) {
        Some(text) if !text.is_empty() => serde_json::from_str(text),
        _ => Ok(json!({ "Version": "2012-10-17", "Statement": [] })),
    }
}

fn statements(policy: &Value) -> Vec<Value> {
    match policy.get("Statement") {
        Some(Value::Array(items)) => items.clone(),
        Some(single @ Value::Object(_)) => vec![single.clone()],
        _ => Vec::new(),
    }
}

/// Replace this tool's statement in `policy` with a fresh one.
pub fn merge(policy: &Value, bucket: &str, principal: &str) -> Value {
    let mut kept: Vec<Value> = statements(policy)
        .into_iter()
        .filter(|s| s.get("Sid").and_then(Value::as_str) != Some(STATEMENT_SID))
        .collect();
    kept.push(access_statement(bucket, principal));

    let mut merged = match policy {
        Value::Object(map) => Value::Object(map.clone()),
        _ => json!({}),
    };
    if merged.get("Version").is_none() {
        merged["Version"] = json!("2012-10-17");
    }
    merged["Statement"] = Value::Array(kept);
    merged
}

fn principal_matches(principal: Option<&Value>, arn: &str) -> bool {
    let matches = |v: &Value| v.as_str().is_some_and(|s| s == "*" || s == arn);
    match principal {
        Some(Value::String(s)) => s == "*" || s == arn,
        Some(Value::Object(map)) => map.values().any(|v| match v {
            Value::Array(items) => items.iter().any(matches),
            other => matches(other),
        }),
        _ => false,
    }
}

/// Whether `policy` explicitly denies something to `principal` or everyone.
pub fn has_applicable_deny(policy: &Value, principal: &str) -> bool {
    statements(policy).iter().any(|s| {
        s.get("Effect").and_then(Value::as_str) == Some("Deny")
            && principal_matches(s.get("Principal"), principal)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROLE: &str = "arn:aws:iam::123456789012:role/deployer";

    #[test]
    fn test_principal_arn_maps_assumed_roles() {
        assert_eq!(
            principal_arn("arn:aws:sts::123456789012:assumed-role/deployer/ci-session"),
            ROLE
        );
        assert_eq!(
            principal_arn("arn:aws:iam::123456789012:user/alice"),
            "arn:aws:iam::123456789012:user/alice"
        );
        assert_eq!(principal_arn("not-an-arn"), "not-an-arn");
    }

    #[test]
    fn test_merge_into_empty_policy() {
        let policy = parse(None).unwrap();
        let merged = merge(&policy, "proj-state", ROLE);
        let statements = merged["Statement"].as_array().unwrap();
        assert_eq!(statements.len(), 1);
        assert_eq!(statements[0]["Sid"], STATEMENT_SID);
        assert_eq!(statements[0]["Principal"]["AWS"], ROLE);
        assert_eq!(statements[0]["Resource"][1], "arn:aws:s3:::proj-state/*");
        assert_eq!(merged["Version"], "2012-10-17");
    }

    #[test]
    fn test_merge_replaces_own_statement_and_keeps_others() {
        let existing = json!({
            "Version": "2012-10-17",
            "Statement": [
                { "Sid": STATEMENT_SID, "Effect": "Allow", "Principal": { "AWS": "arn:old" } },
                { "Sid": "Other", "Effect": "Allow", "Principal": "*", "Action": "s3:GetObject" }
            ]
        });
        let merged = merge(&existing, "b", ROLE);
        let statements = merged["Statement"].as_array().unwrap();
        assert_eq!(statements.len(), 2);
        assert_eq!(statements[0]["Sid"], "Other");
        assert_eq!(statements[1]["Principal"]["AWS"], ROLE);

        // Merging again is stable.
        assert_eq!(merge(&merged, "b", ROLE), merged);
    }

    #[test]
    fn test_single_statement_object_is_accepted() {
        let existing = json!({
            "Statement": { "Sid": "Legacy", "Effect": "Allow", "Principal": "*" }
        });
        let merged = merge(&existing, "b", ROLE);
        assert_eq!(merged["Statement"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_deny_detection() {
        let everyone = json!({ "Statement": [
            { "Effect": "Deny", "Principal": "*", "Action": "s3:*",
              "Condition": { "Bool": { "aws:SecureTransport": "false" } } }
        ]});
        assert!(has_applicable_deny(&everyone, ROLE));

        let caller = json!({ "Statement": [
            { "Effect": "Deny", "Principal": { "AWS": [ "arn:other", ROLE ] } }
        ]});
        assert!(has_applicable_deny(&caller, ROLE));

        let someone_else = json!({ "Statement": [
            { "Effect": "Deny", "Principal": { "AWS": "arn:other" } },
            { "Effect": "Allow", "Principal": "*" }
        ]});
        assert!(!has_applicable_deny(&someone_else, ROLE));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse(Some("{not json")).is_err());
        assert!(parse(Some("  ")).is_ok());
    }
}
