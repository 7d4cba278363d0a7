//! Backend locations.

use crate::error::{Error, Result};
use std::fmt;

/// Canonical scheme for object storage locations.
pub const OBJECT_STORE_SCHEME: &str = "objectstore://";

/// Scheme `pulumi login` understands for S3 backends.
pub const S3_SCHEME: &str = "s3://";

/// Region used when nothing else is configured.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Where stack state lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendLocation {
    /// Self-managed S3 bucket.
    ObjectStorage {
        /// Bucket name, never empty
        bucket: String,
        /// AWS region of the bucket
        region: String,
    },
    /// Pulumi Cloud.
    Hosted {
        /// Organization, when known
        organization: Option<String>,
    },
}

impl BackendLocation {
    /// Object storage location, rejecting an empty bucket.
    pub fn object_storage(bucket: &str, region: &str) -> Result<Self> {
        let bucket = bucket.trim();
        if bucket.is_empty() {
            return Err(Error::InvalidLocation {
                raw: bucket.to_string(),
                reason: "bucket name is empty".to_string(),
            });
        }
        let region = match region.trim() {
            "" => DEFAULT_REGION,
            r => r,
        };
        Ok(Self::ObjectStorage {
            bucket: bucket.to_string(),
            region: region.to_string(),
        })
    }

    /// Hosted service location.
    pub fn hosted(organization: Option<&str>) -> Self {
        Self::Hosted {
            organization: organization.map(str::to_string),
        }
    }

    /// Parse `objectstore://<bucket>[?region=<region>]`.
    ///
    /// `s3://` is accepted as an alias because that is how the engine prints
    /// its own backend URL. A missing region falls back to `fallback_region`;
    /// a missing bucket or any other scheme is an error.
    pub fn parse_object_storage(raw: &str, fallback_region: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let invalid = |reason: &str| Error::InvalidLocation {
            raw: raw.to_string(),
            reason: reason.to_string(),
        };

        let rest = trimmed
            .strip_prefix(OBJECT_STORE_SCHEME)
            .or_else(|| trimmed.strip_prefix(S3_SCHEME))
            .ok_or_else(|| invalid("expected objectstore:// scheme"))?;

        let (bucket, query) = match rest.split_once('?') {
            Some((bucket, query)) => (bucket, Some(query)),
            None => (rest, None),
        };
        let bucket = bucket.trim_end_matches('/');
        if bucket.is_empty() {
            return Err(invalid("bucket name is empty"));
        }
        if bucket.contains('/') {
            return Err(invalid("bucket name must not contain '/'"));
        }

        let region = query
            .into_iter()
            .flat_map(|q| q.split('&'))
            .filter_map(|pair| pair.split_once('='))
            .find(|(key, _)| *key == "region")
            .map(|(_, value)| value)
            .filter(|value| !value.is_empty())
            .unwrap_or(fallback_region);

        Self::object_storage(bucket, region)
    }

    /// URL passed to `pulumi login`; `None` for the hosted service, which
    /// logs in without a URL.
    pub fn login_url(&self) -> Option<String> {
        match self {
            Self::ObjectStorage { bucket, region } => {
                Some(format!("{S3_SCHEME}{bucket}?region={region}"))
            }
            Self::Hosted { .. } => None,
        }
    }

    /// Whether this is the hosted service.
    pub fn is_hosted(&self) -> bool {
        matches!(self, Self::Hosted { .. })
    }

    /// Short display name for messages.
    pub fn name(&self) -> String {
        match self {
            Self::ObjectStorage { bucket, .. } => format!("S3 bucket {bucket}"),
            Self::Hosted { .. } => "Pulumi Cloud".to_string(),
        }
    }
}

impl fmt::Display for BackendLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ObjectStorage { bucket, region } => {
                write!(f, "{OBJECT_STORE_SCHEME}{bucket}?region={region}")
            }
            Self::Hosted {
                organization: Some(org),
            } => write!(f, "pulumi-cloud ({org})"),
            Self::Hosted { organization: None } => f.write_str("pulumi-cloud"),
        }
    }
}
