//! Secrets-provider selection for target stacks.

use crate::error::{Result, StackshiftError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Environment variable the Pulumi CLI reads the passphrase from.
pub const PASSPHRASE_ENV: &str = "PULUMI_CONFIG_PASSPHRASE";

// ---------------------------------------------------------------------------
// SecretsProvider
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SecretsProvider {
    /// Pulumi Cloud's own key management. Only valid on the Cloud backend.
    Service,
    Passphrase,
    AwsKms { alias: String, region: String },
    /// Whatever the CLI picks when no `--secrets-provider` is given.
    Default,
    Custom { url: String },
}

impl SecretsProvider {
    /// Build from a provider family name plus the material it needs.
    ///
    /// `kind` is one of `service`, `passphrase`, `awskms`, `default`, or a
    /// provider URL (`awskms://...`, `gcpkms://...`, `hashivault://...`).
    pub fn from_selection(kind: &str, kms_alias: Option<&str>, region: &str) -> Result<Self> {
        match kind.trim() {
            "service" => Ok(SecretsProvider::Service),
            "passphrase" => Ok(SecretsProvider::Passphrase),
            "default" | "" => Ok(SecretsProvider::Default),
            "awskms" => {
                let alias = kms_alias
                    .filter(|a| !a.trim().is_empty())
                    .ok_or_else(|| StackshiftError::MissingArgument("kms-alias".to_string()))?;
                Ok(SecretsProvider::AwsKms {
                    alias: normalize_alias(alias),
                    region: region.to_string(),
                })
            }
            url if url.starts_with("awskms://") => parse_kms_url(url),
            url if url.contains("://") => Ok(SecretsProvider::Custom {
                url: url.to_string(),
            }),
            other => Err(StackshiftError::InvalidSecretsProvider(other.to_string())),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            SecretsProvider::Service => "service",
            SecretsProvider::Passphrase => "passphrase",
            SecretsProvider::AwsKms { .. } => "awskms",
            SecretsProvider::Default => "default",
            SecretsProvider::Custom { .. } => "custom",
        }
    }

    /// Value for `pulumi stack init --secrets-provider`. `None` means the
    /// flag is omitted and the CLI default applies.
    pub fn init_arg(&self) -> Option<String> {
        match self {
            SecretsProvider::Service | SecretsProvider::Default => None,
            SecretsProvider::Passphrase => Some("passphrase".to_string()),
            SecretsProvider::AwsKms { alias, region } => Some(kms_url(alias, region)),
            SecretsProvider::Custom { url } => Some(url.clone()),
        }
    }

    /// Positional value for `pulumi stack change-secrets-provider`.
    pub fn change_arg(&self) -> String {
        match self {
            SecretsProvider::Service => "service".to_string(),
            SecretsProvider::Default => "default".to_string(),
            other => other.init_arg().unwrap_or_default(),
        }
    }

    pub fn kms_alias(&self) -> Option<(&str, &str)> {
        match self {
            SecretsProvider::AwsKms { alias, region } => Some((alias, region)),
            _ => None,
        }
    }
}

impl fmt::Display for SecretsProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SecretsProvider::AwsKms { alias, region } => f.write_str(&kms_url(alias, region)),
            SecretsProvider::Custom { url } => f.write_str(url),
            other => f.write_str(other.kind()),
        }
    }
}

/// `alias/<name>`, accepting either form as input.
pub fn normalize_alias(alias: &str) -> String {
    let alias = alias.trim();
    if alias.starts_with("alias/") {
        alias.to_string()
    } else {
        format!("alias/{alias}")
    }
}

pub fn kms_url(alias: &str, region: &str) -> String {
    format!("awskms://{}?region={region}", normalize_alias(alias))
}

fn parse_kms_url(url: &str) -> Result<SecretsProvider> {
    let rest = url.trim_start_matches("awskms://");
    let (key, query) = rest.split_once('?').unwrap_or((rest, ""));
    let region = query
        .split('&')
        .find_map(|p| p.strip_prefix("region="))
        .filter(|r| !r.is_empty());
    match region {
        Some(region) if key.starts_with("alias/") => Ok(SecretsProvider::AwsKms {
            alias: key.to_string(),
            region: region.to_string(),
        }),
        // Key ids/ARNs and region-less URLs are passed through untouched.
        _ => Ok(SecretsProvider::Custom {
            url: url.to_string(),
        }),
    }
}

// ---------------------------------------------------------------------------
// Passphrase
// ---------------------------------------------------------------------------

/// Passphrase material. Never printed; handed to child processes only
/// through [`PASSPHRASE_ENV`].
#[derive(Clone, PartialEq, Eq)]
pub struct Passphrase(String);

impl Passphrase {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Passphrase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Passphrase(***)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selection_families() {
        assert_eq!(
            SecretsProvider::from_selection("service", None, "us-east-1").unwrap(),
            SecretsProvider::Service
        );
        assert_eq!(
            SecretsProvider::from_selection("default", None, "us-east-1").unwrap(),
            SecretsProvider::Default
        );
        let kms = SecretsProvider::from_selection("awskms", Some("pulumi-state"), "eu-west-1").unwrap();
        assert_eq!(
            kms,
            SecretsProvider::AwsKms {
                alias: "alias/pulumi-state".to_string(),
                region: "eu-west-1".to_string()
            }
        );
        assert_eq!(kms.init_arg().unwrap(), "awskms://alias/pulumi-state?region=eu-west-1");
    }

    #[test]
    fn awskms_requires_alias() {
        let err = SecretsProvider::from_selection("awskms", None, "us-east-1").unwrap_err();
        assert!(matches!(err, StackshiftError::MissingArgument(_)));
    }

    #[test]
    fn kms_url_parses_back_to_alias() {
        let p = SecretsProvider::from_selection("awskms://alias/x?region=us-west-2", None, "us-east-1")
            .unwrap();
        assert_eq!(p.kms_alias(), Some(("alias/x", "us-west-2")));
    }

    #[test]
    fn other_urls_are_custom() {
        let p = SecretsProvider::from_selection("hashivault://transit-key", None, "us-east-1").unwrap();
        assert_eq!(p.init_arg().as_deref(), Some("hashivault://transit-key"));
        let id = SecretsProvider::from_selection("awskms://1234abcd?region=us-east-1", None, "us-east-1")
            .unwrap();
        assert_eq!(id.kind(), "custom");
    }

    #[test]
    fn unknown_family_rejected() {
        assert!(SecretsProvider::from_selection("vault", None, "us-east-1").is_err());
    }

    #[test]
    fn init_and_change_args() {
        assert_eq!(SecretsProvider::Default.init_arg(), None);
        assert_eq!(SecretsProvider::Service.init_arg(), None);
        assert_eq!(SecretsProvider::Passphrase.init_arg().as_deref(), Some("passphrase"));
        assert_eq!(SecretsProvider::Default.change_arg(), "default");
        assert_eq!(SecretsProvider::Service.change_arg(), "service");
    }

    #[test]
    fn passphrase_debug_is_redacted() {
        let p = Passphrase::new("correct horse");
        assert_eq!(format!("{p:?}"), "Passphrase(***)");
        assert_eq!(p.expose(), "correct horse");
    }
}
