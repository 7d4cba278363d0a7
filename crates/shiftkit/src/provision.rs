//! S3 bucket and KMS key provisioning.
//!
//! Primary resources (the bucket, the key) are fatal when they cannot be
//! created. Everything configured afterwards is best-effort and reported as
//! [`Outcome::Degraded`]: a bucket without a lifecycle rule is still a valid
//! state backend.

use crate::error::{Error, Result};
use crate::exec::{ExecResult, RunOptions, Runner};
use crate::policy;
use serde::Deserialize;
use std::thread;
use std::time::Duration;

/// Days noncurrent state versions are kept.
pub const NONCURRENT_RETENTION_DAYS: u32 = 90;

/// Wait after writing a policy next to an explicit deny.
pub const POLICY_PROPAGATION_DELAY: Duration = Duration::from_secs(5);

/// Result of a step chain that can degrade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Everything was applied
    Succeeded,
    /// The resource is usable but some configuration is missing
    Degraded(Vec<String>),
    /// The resource is not usable
    Failed(String),
}

impl Outcome {
    fn from_warnings(warnings: Vec<String>) -> Self {
        if warnings.is_empty() {
            Self::Succeeded
        } else {
            Self::Degraded(warnings)
        }
    }

    /// Whether the resource can be used.
    pub fn is_usable(&self) -> bool {
        !matches!(self, Self::Failed(_))
    }

    /// Warnings for a degraded outcome.
    pub fn warnings(&self) -> &[String] {
        match self {
            Self::Degraded(warnings) => warnings,
            _ => &[],
        }
    }
}

/// Whether `ensure_bucket` had to create the bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketStatus {
    /// Created by this run
    Created,
    /// Already there
    Existing,
}

/// What `ensure_bucket` did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketReport {
    /// Created or found
    pub status: BucketStatus,
    /// Degradations from configuration and policy steps
    pub warnings: Vec<String>,
}

/// A KMS key created by this tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionedKey {
    /// KMS key id
    pub key_id: String,
    /// Alias bound to the key, `None` when binding failed
    pub alias: Option<String>,
}

impl ProvisionedKey {
    /// Identifier to put in the provider URL: the alias when bound.
    pub fn provider_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.key_id)
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CallerIdentity {
    arn: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PolicyResponse {
    policy: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CreateKeyResponse {
    key_metadata: KeyMetadata,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct KeyMetadata {
    key_id: String,
}

/// Provisions backend resources with the `aws` CLI.
pub struct Provisioner<'r> {
    runner: &'r dyn Runner,
    propagation_delay: Duration,
}

impl<'r> Provisioner<'r> {
    /// Create a provisioner using `runner`.
    pub fn new(runner: &'r dyn Runner) -> Self {
        Self {
            runner,
            propagation_delay: POLICY_PROPAGATION_DELAY,
        }
    }

    /// Override the wait after policy writes.
    pub fn with_propagation_delay(mut self, delay: Duration) -> Self {
        self.propagation_delay = delay;
        self
    }

    fn aws(&self, args: &[&str], opts: &RunOptions) -> ExecResult {
        self.runner.run("aws", args, opts)
    }

    // =========================================================================
    // Buckets
    // =========================================================================

    /// Whether `bucket` exists and is reachable. Any error, including access
    /// denied, counts as absent.
    pub fn bucket_exists(&self, bucket: &str, region: &str) -> bool {
        self.aws(
            &["s3api", "head-bucket", "--bucket", bucket, "--region", region],
            &RunOptions::silent(),
        )
        .success
    }

    /// Create `bucket` and apply versioning, encryption and a lifecycle rule.
    pub fn create_bucket(&self, bucket: &str, region: &str) -> Outcome {
        let constraint = format!("LocationConstraint={region}");
        let mut args = vec![
            "s3api",
            "create-bucket",
            "--bucket",
            bucket,
            "--region",
            region,
        ];
        // us-east-1 rejects an explicit location constraint
        if region != "us-east-1" {
            args.extend(["--create-bucket-configuration", constraint.as_str()]);
        }

        let created = self.aws(
            &args,
            &RunOptions::new().observed("create-bucket", format!("Creating bucket {bucket}")),
        );
        if !created.success && !created.output().contains("BucketAlreadyOwnedByYou") {
            return Outcome::Failed(created.output().to_string());
        }
        log::info!("created bucket {bucket} in {region}");

        let mut warnings = Vec::new();

        let versioning = self.aws(
            &[
                "s3api",
                "put-bucket-versioning",
                "--bucket",
                bucket,
                "--region",
                region,
                "--versioning-configuration",
                "Status=Enabled",
            ],
            &RunOptions::silent(),
        );
        if !versioning.success {
            warnings.push(format!(
                "versioning not enabled on {bucket}: {}",
                versioning.output()
            ));
        }

        let encryption = self.aws(
            &[
                "s3api",
                "put-bucket-encryption",
                "--bucket",
                bucket,
                "--region",
                region,
                "--server-side-encryption-configuration",
                r#"{"Rules":[{"ApplyServerSideEncryptionByDefault":{"SSEAlgorithm":"AES256"}}]}"#,
            ],
            &RunOptions::silent(),
        );
        if !encryption.success {
            warnings.push(format!(
                "default encryption not enabled on {bucket}: {}",
                encryption.output()
            ));
        }

        let lifecycle_rule = lifecycle_configuration(NONCURRENT_RETENTION_DAYS);
        let lifecycle = self.aws(
            &[
                "s3api",
                "put-bucket-lifecycle-configuration",
                "--bucket",
                bucket,
                "--region",
                region,
                "--lifecycle-configuration",
                &lifecycle_rule,
            ],
            &RunOptions::silent(),
        );
        if !lifecycle.success {
            warnings.push(format!(
                "lifecycle rule not applied to {bucket}: {}",
                lifecycle.output()
            ));
        }

        for warning in &warnings {
            log::warn!("{warning}");
        }
        Outcome::from_warnings(warnings)
    }

    /// ARN of the calling identity, as a policy principal.
    pub fn caller_arn(&self) -> Option<String> {
        let result = self.aws(
            &["sts", "get-caller-identity", "--output", "json"],
            &RunOptions::silent(),
        );
        if !result.success {
            log::debug!("get-caller-identity failed: {}", result.output());
            return None;
        }
        match serde_json::from_str::<CallerIdentity>(&result.stdout) {
            Ok(identity) => Some(policy::principal_arn(&identity.arn)),
            Err(e) => {
                log::debug!("unexpected get-caller-identity output: {e}");
                None
            }
        }
    }

    /// Make sure the caller can read and write state in `bucket`.
    ///
    /// Statements owned by other parties are kept. When the existing policy
    /// holds an explicit deny that could apply to the caller, waits for the
    /// propagation delay after writing.
    pub fn reconcile_policy(&self, bucket: &str, region: &str) -> Outcome {
        let Some(principal) = self.caller_arn() else {
            return Outcome::Failed("could not determine the caller identity".to_string());
        };

        let fetched = self.aws(
            &[
                "s3api",
                "get-bucket-policy",
                "--bucket",
                bucket,
                "--region",
                region,
                "--output",
                "json",
            ],
            &RunOptions::silent(),
        );
        let document = if fetched.success {
            match serde_json::from_str::<PolicyResponse>(&fetched.stdout) {
                Ok(response) => Some(response.policy),
                Err(e) => return Outcome::Failed(format!("unreadable bucket policy: {e}")),
            }
        } else if fetched.output().contains("NoSuchBucketPolicy") {
            None
        } else {
            return Outcome::Failed(format!(
                "could not read the policy of {bucket}: {}",
                fetched.output()
            ));
        };

        let existing = match policy::parse(document.as_deref()) {
            Ok(existing) => existing,
            Err(e) => return Outcome::Failed(format!("unreadable bucket policy: {e}")),
        };
        let merged = policy::merge(&existing, bucket, &principal);

        let written = self.aws(
            &[
                "s3api",
                "put-bucket-policy",
                "--bucket",
                bucket,
                "--region",
                region,
                "--policy",
                &merged.to_string(),
            ],
            &RunOptions::new().observed("bucket-policy", format!("Updating policy of {bucket}")),
        );
        if !written.success {
            return Outcome::Failed(format!(
                "could not write the policy of {bucket}: {}",
                written.output()
            ));
        }
        log::info!("granted {principal} state access to {bucket}");

        if policy::has_applicable_deny(&existing, &principal) {
            log::info!(
                "existing policy has an explicit deny; waiting {}s for propagation",
                self.propagation_delay.as_secs()
            );
            thread::sleep(self.propagation_delay);
        }
        Outcome::Succeeded
    }

    /// Make sure `bucket` exists, creating it at most once.
    ///
    /// `permit_create` is only consulted when the bucket is missing. With
    /// `reconcile`, the access policy is reconciled whether the bucket was
    /// created or found, since existing buckets may have been set up by hand.
    pub fn ensure_bucket(
        &self,
        bucket: &str,
        region: &str,
        permit_create: impl FnOnce() -> bool,
        reconcile: bool,
    ) -> Result<BucketReport> {
        let mut warnings = Vec::new();

        let status = if self.bucket_exists(bucket, region) {
            BucketStatus::Existing
        } else {
            if !permit_create() {
                return Err(Error::Provision {
                    resource: format!("bucket {bucket}"),
                    message: "bucket does not exist and creation was not permitted".to_string(),
                    detail: String::new(),
                });
            }
            match self.create_bucket(bucket, region) {
                Outcome::Failed(detail) => {
                    return Err(Error::Provision {
                        resource: format!("bucket {bucket}"),
                        message: "create-bucket failed".to_string(),
                        detail,
                    });
                }
                outcome => warnings.extend(outcome.warnings().iter().cloned()),
            }
            BucketStatus::Created
        };

        if reconcile {
            match self.reconcile_policy(bucket, region) {
                Outcome::Failed(reason) => {
                    warnings.push(format!("bucket policy not reconciled: {reason}"));
                }
                outcome => warnings.extend(outcome.warnings().iter().cloned()),
            }
        }

        Ok(BucketReport { status, warnings })
    }

    // =========================================================================
    // KMS
    // =========================================================================

    /// Whether `alias` resolves to a key in `region`.
    pub fn key_alias_exists(&self, alias: &str, region: &str) -> bool {
        self.aws(
            &["kms", "describe-key", "--key-id", alias, "--region", region],
            &RunOptions::silent(),
        )
        .success
    }

    /// Create a key and bind `alias` to it.
    ///
    /// If the alias cannot be created the bare key is still returned so the
    /// caller can use it by id.
    pub fn create_key_and_alias(&self, alias: &str, region: &str) -> Option<ProvisionedKey> {
        let created = self.aws(
            &[
                "kms",
                "create-key",
                "--description",
                "Pulumi stack secrets",
                "--region",
                region,
                "--output",
                "json",
            ],
            &RunOptions::new().observed("create-key", format!("Creating KMS key for {alias}")),
        );
        if !created.success {
            log::warn!("create-key failed: {}", created.output());
            return None;
        }
        let key_id = match serde_json::from_str::<CreateKeyResponse>(&created.stdout) {
            Ok(response) => response.key_metadata.key_id,
            Err(e) => {
                log::warn!("unexpected create-key output: {e}");
                return None;
            }
        };

        let aliased = self.aws(
            &[
                "kms",
                "create-alias",
                "--alias-name",
                alias,
                "--target-key-id",
                &key_id,
                "--region",
                region,
            ],
            &RunOptions::silent(),
        );
        if aliased.success {
            log::info!("created KMS key {key_id} as {alias}");
            Some(ProvisionedKey {
                key_id,
                alias: Some(alias.to_string()),
            })
        } else {
            log::warn!(
                "KMS key {key_id} created but alias {alias} failed: {}",
                aliased.output()
            );
            Some(ProvisionedKey {
                key_id,
                alias: None,
            })
        }
    }
}

/// Lifecycle configuration expiring noncurrent versions after `days`.
pub fn lifecycle_configuration(days: u32) -> String {
    serde_json::json!({
        "Rules": [{
            "ID": "expire-noncurrent-state",
            "Status": "Enabled",
            "Filter": {},
            "NoncurrentVersionExpiration": { "NoncurrentDays": days }
        }]
    })
    .to_string()
}
