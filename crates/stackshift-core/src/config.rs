use crate::backend::{validate_region, BackendDescriptor};
use crate::error::Result;
use crate::paths;
use crate::secrets::SecretsProvider;
use serde::{Deserialize, Serialize};
use std::path::Path;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// Default S3 backend for `migrate` and `provision`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lock_table: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kms_alias: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MigrateDefaults {
    /// `service`, `passphrase`, `awskms`, `default`, or a provider URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secrets_provider: Option<String>,
    /// Create missing bucket, lock table and KMS key without asking for
    /// the individual flags.
    #[serde(default)]
    pub create_resources: bool,
    #[serde(default)]
    pub skip_verify: bool,
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// Organization prefixed to bare stack names.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub migrate: MigrateDefaults,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssm_prefix: Option<String>,
}

fn default_version() -> u32 {
    1
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: default_version(),
            region: None,
            organization: None,
            backend: BackendConfig::default(),
            migrate: MigrateDefaults::default(),
            ssm_prefix: None,
        }
    }
}

impl Config {
    /// Load `stackshift.yaml` from `root`. A missing file is an empty config.
    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(&path)?;
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    /// Write a starter config unless one exists. Returns true if written.
    pub fn init(root: &Path, region: &str) -> Result<bool> {
        let cfg = Config {
            region: Some(region.to_string()),
            ..Config::default()
        };
        let data = serde_yaml::to_string(&cfg)?;
        crate::io::write_if_missing(&paths::config_path(root), data.as_bytes())
    }

    /// The configured S3 backend, if a bucket is set.
    pub fn s3_backend(&self, region: &str) -> Result<Option<BackendDescriptor>> {
        match self.backend.bucket.as_deref() {
            Some(bucket) => {
                BackendDescriptor::s3(bucket, region, self.backend.lock_table.clone()).map(Some)
            }
            None => Ok(None),
        }
    }

    /// Qualify a bare stack name with the configured organization.
    pub fn qualify_stack(&self, stack: &str) -> String {
        match &self.organization {
            Some(org) if !stack.contains('/') && !org.is_empty() => format!("{org}/{stack}"),
            _ => stack.to_string(),
        }
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        let mut push = |level: WarnLevel, message: String| {
            warnings.push(ConfigWarning { level, message })
        };

        if self.version != 1 {
            push(
                WarnLevel::Warning,
                format!("unknown config version {}", self.version),
            );
        }

        if let Some(region) = &self.region {
            if let Err(e) = validate_region(region) {
                push(WarnLevel::Error, e.to_string());
            }
        }

        if matches!(&self.backend.bucket, Some(b) if b.trim().is_empty()) {
            push(WarnLevel::Error, "backend.bucket is empty".to_string());
        }
        if self.backend.lock_table.is_some() && self.backend.bucket.is_none() {
            push(
                WarnLevel::Warning,
                "backend.lock_table is set but backend.bucket is not".to_string(),
            );
        }

        let region = self.region.as_deref().unwrap_or(crate::backend::DEFAULT_REGION);
        match self.migrate.secrets_provider.as_deref() {
            Some(kind) => {
                if let Err(e) =
                    SecretsProvider::from_selection(kind, self.backend.kms_alias.as_deref(), region)
                {
                    push(WarnLevel::Error, format!("migrate.secrets_provider: {e}"));
                }
                if kind != "awskms" && self.backend.kms_alias.is_some() {
                    push(
                        WarnLevel::Warning,
                        format!("backend.kms_alias is ignored with secrets provider '{kind}'"),
                    );
                }
            }
            None if self.backend.kms_alias.is_some() => push(
                WarnLevel::Warning,
                "backend.kms_alias is set but migrate.secrets_provider is not 'awskms'"
                    .to_string(),
            ),
            None => {}
        }

        if matches!(&self.ssm_prefix, Some(p) if !p.starts_with('/')) {
            push(
                WarnLevel::Warning,
                "ssm_prefix should start with '/'".to_string(),
            );
        }

        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_is_default() {
        let dir = TempDir::new().unwrap();
        let cfg = Config::load(dir.path()).unwrap();
        assert_eq!(cfg, Config::default());
        assert!(cfg.validate().is_empty());
    }

    #[test]
    fn save_load_preserves_sections() {
        let dir = TempDir::new().unwrap();
        let cfg = Config {
            region: Some("eu-west-1".into()),
            organization: Some("acme".into()),
            backend: BackendConfig {
                bucket: Some("acme-state".into()),
                lock_table: Some("pulumi-locks".into()),
                kms_alias: Some("alias/pulumi".into()),
            },
            migrate: MigrateDefaults {
                secrets_provider: Some("awskms".into()),
                create_resources: true,
                skip_verify: false,
            },
            ..Config::default()
        };
        cfg.save(dir.path()).unwrap();
        let loaded = Config::load(dir.path()).unwrap();
        assert_eq!(loaded, cfg);
        assert!(loaded.validate().is_empty(), "{:?}", loaded.validate());
    }

    #[test]
    fn minimal_yaml_parses() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            paths::config_path(dir.path()),
            "backend:\n  bucket: my-state\n",
        )
        .unwrap();
        let cfg = Config::load(dir.path()).unwrap();
        assert_eq!(cfg.version, 1);
        let backend = cfg.s3_backend("us-east-1").unwrap().unwrap();
        assert_eq!(backend.login_url(), "s3://my-state?region=us-east-1");
    }

    #[test]
    fn malformed_yaml_is_an_error() {
        let dir = TempDir::new().unwrap();
        std::fs::write(paths::config_path(dir.path()), "backend: [unclosed").unwrap();
        assert!(Config::load(dir.path()).is_err());
    }

    #[test]
    fn init_does_not_overwrite() {
        let dir = TempDir::new().unwrap();
        assert!(Config::init(dir.path(), "us-west-2").unwrap());
        assert!(!Config::init(dir.path(), "eu-west-1").unwrap());
        let cfg = Config::load(dir.path()).unwrap();
        assert_eq!(cfg.region.as_deref(), Some("us-west-2"));
    }

    #[test]
    fn qualify_stack_uses_organization() {
        let cfg = Config {
            organization: Some("acme".into()),
            ..Config::default()
        };
        assert_eq!(cfg.qualify_stack("dev"), "acme/dev");
        assert_eq!(cfg.qualify_stack("other/dev"), "other/dev");
        assert_eq!(Config::default().qualify_stack("dev"), "dev");
    }

    #[test]
    fn validate_flags_problems() {
        let cfg = Config {
            version: 2,
            region: Some("mars-1".into()),
            backend: BackendConfig {
                bucket: None,
                lock_table: Some("locks".into()),
                kms_alias: None,
            },
            migrate: MigrateDefaults {
                secrets_provider: Some("awskms".into()),
                ..Default::default()
            },
            ssm_prefix: Some("app".into()),
            ..Config::default()
        };
        let warnings = cfg.validate();
        let errors: Vec<_> = warnings
            .iter()
            .filter(|w| w.level == WarnLevel::Error)
            .map(|w| w.message.as_str())
            .collect();
        assert_eq!(errors.len(), 2, "{errors:?}");
        assert!(errors.iter().any(|m| m.contains("mars-1")));
        assert!(errors.iter().any(|m| m.contains("kms-alias")));
        assert_eq!(warnings.len(), 5);
    }
}
