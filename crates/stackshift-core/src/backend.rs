//! Backend connection strings, stack identifiers and region resolution.

use crate::error::{Result, StackshiftError};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

pub const CLOUD_URL: &str = "https://api.pulumi.com";
pub const DEFAULT_REGION: &str = "us-east-1";
pub const REGION_ENV: &str = "AWS_REGION";

const S3_SCHEME: &str = "s3://";

// ---------------------------------------------------------------------------
// BackendDescriptor
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackendDescriptor {
    Cloud,
    S3 {
        bucket: String,
        region: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        lock_table: Option<String>,
    },
}

impl BackendDescriptor {
    /// Build a validated S3 descriptor.
    pub fn s3(
        bucket: impl Into<String>,
        region: impl Into<String>,
        lock_table: Option<String>,
    ) -> Result<Self> {
        let bucket = bucket.into();
        let region = region.into();
        if bucket.trim().is_empty() {
            return Err(StackshiftError::MissingArgument("bucket".to_string()));
        }
        validate_region(&region)?;
        Ok(BackendDescriptor::S3 {
            bucket,
            region,
            lock_table: lock_table.filter(|t| !t.is_empty()),
        })
    }

    pub fn is_cloud(&self) -> bool {
        matches!(self, BackendDescriptor::Cloud)
    }

    pub fn bucket(&self) -> Option<&str> {
        match self {
            BackendDescriptor::S3 { bucket, .. } => Some(bucket),
            BackendDescriptor::Cloud => None,
        }
    }

    pub fn region(&self) -> Option<&str> {
        match self {
            BackendDescriptor::S3 { region, .. } => Some(region),
            BackendDescriptor::Cloud => None,
        }
    }

    pub fn lock_table(&self) -> Option<&str> {
        match self {
            BackendDescriptor::S3 { lock_table, .. } => lock_table.as_deref(),
            BackendDescriptor::Cloud => None,
        }
    }

    /// Same backend with locking disabled.
    pub fn without_lock_table(&self) -> Self {
        match self {
            BackendDescriptor::S3 { bucket, region, .. } => BackendDescriptor::S3 {
                bucket: bucket.clone(),
                region: region.clone(),
                lock_table: None,
            },
            BackendDescriptor::Cloud => BackendDescriptor::Cloud,
        }
    }

    /// URL passed to `pulumi login`.
    pub fn login_url(&self) -> String {
        match self {
            BackendDescriptor::Cloud => CLOUD_URL.to_string(),
            BackendDescriptor::S3 {
                bucket,
                region,
                lock_table,
            } => build_s3_url(bucket, region, lock_table.as_deref()),
        }
    }
}

impl fmt::Display for BackendDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendDescriptor::Cloud => f.write_str("Pulumi Cloud"),
            other => f.write_str(&other.login_url()),
        }
    }
}

// ---------------------------------------------------------------------------
// URL building / parsing
// ---------------------------------------------------------------------------

pub fn build_s3_url(bucket: &str, region: &str, lock_table: Option<&str>) -> String {
    let mut url = format!("{S3_SCHEME}{bucket}?region={region}");
    if let Some(table) = lock_table.filter(|t| !t.is_empty()) {
        url.push_str("&dynamodb_table=");
        url.push_str(table);
    }
    url
}

/// Parse `s3://bucket?region=R&dynamodb_table=T`.
///
/// `fallback_region` is used when the URL carries no `region` parameter.
/// Unrecognized query parameters are ignored.
pub fn parse_s3_url(url: &str, fallback_region: &str) -> Result<BackendDescriptor> {
    let invalid = |reason: &str| StackshiftError::InvalidBackendUrl {
        url: url.to_string(),
        reason: reason.to_string(),
    };

    let rest = url
        .strip_prefix(S3_SCHEME)
        .ok_or_else(|| invalid("scheme must be s3://"))?;
    let (bucket, query) = match rest.split_once('?') {
        Some((b, q)) => (b, q),
        None => (rest, ""),
    };
    let bucket = bucket.trim_end_matches('/');
    if bucket.is_empty() {
        return Err(invalid("bucket name is missing"));
    }
    if bucket.contains('/') {
        return Err(invalid("bucket path prefixes are not supported"));
    }

    let mut region = None;
    let mut lock_table = None;
    for pair in query.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        match key {
            "region" => region = Some(value.to_string()),
            "dynamodb_table" => lock_table = Some(value.to_string()),
            _ => {}
        }
    }

    let region = region
        .filter(|r| !r.is_empty())
        .unwrap_or_else(|| fallback_region.to_string());
    match BackendDescriptor::s3(bucket, region, lock_table) {
        Err(StackshiftError::InvalidRegion(r)) => {
            Err(invalid(&format!("'{r}' is not a valid AWS region")))
        }
        other => other,
    }
}

/// Accept `cloud`, the Pulumi Cloud URL, or an `s3://` URL.
pub fn parse_backend(spec: &str, fallback_region: &str) -> Result<BackendDescriptor> {
    let trimmed = spec.trim();
    match trimmed {
        "cloud" | "pulumi" | "service" => return Ok(BackendDescriptor::Cloud),
        _ => {}
    }
    if trimmed.trim_end_matches('/') == CLOUD_URL || trimmed.trim_end_matches('/') == "https://app.pulumi.com" {
        return Ok(BackendDescriptor::Cloud);
    }
    if trimmed.starts_with(S3_SCHEME) {
        return parse_s3_url(trimmed, fallback_region);
    }
    Err(StackshiftError::InvalidBackendUrl {
        url: spec.to_string(),
        reason: "expected 'cloud' or an s3:// URL".to_string(),
    })
}

// ---------------------------------------------------------------------------
// Regions
// ---------------------------------------------------------------------------

fn region_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z]{2}(-gov|-iso[a-z]*)?-[a-z]+-\d+$").unwrap())
}

pub fn validate_region(region: &str) -> Result<()> {
    if region_re().is_match(region) {
        Ok(())
    } else {
        Err(StackshiftError::InvalidRegion(region.to_string()))
    }
}

/// Region precedence: explicit flag, then `AWS_REGION`, then the config
/// file, then [`DEFAULT_REGION`].
pub fn resolve_region(flag: Option<&str>, config: Option<&str>) -> String {
    let env = std::env::var(REGION_ENV).ok();
    resolve_region_from(flag, env.as_deref(), config)
}

pub fn resolve_region_from(flag: Option<&str>, env: Option<&str>, config: Option<&str>) -> String {
    [flag, env, config]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|r| !r.is_empty())
        .unwrap_or(DEFAULT_REGION)
        .to_string()
}

// ---------------------------------------------------------------------------
// StackId
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackId {
    pub org: Option<String>,
    pub name: String,
}

/// Split `org/name` on the first `/`. A bare name has no organization.
pub fn split_stack_id(id: &str) -> StackId {
    match id.split_once('/') {
        Some((org, name)) if !org.is_empty() => StackId {
            org: Some(org.to_string()),
            name: name.to_string(),
        },
        Some((_, name)) => StackId {
            org: None,
            name: name.to_string(),
        },
        None => StackId {
            org: None,
            name: id.to_string(),
        },
    }
}

impl StackId {
    /// `org/name` when the organization is known, else `name`.
    pub fn qualified(&self) -> String {
        match &self.org {
            Some(org) => format!("{org}/{}", self.name),
            None => self.name.clone(),
        }
    }

    /// Filesystem-safe stem: every `/` replaced by `-`.
    pub fn file_stem(&self) -> String {
        self.qualified().replace('/', "-")
    }
}

impl fmt::Display for StackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.qualified())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
