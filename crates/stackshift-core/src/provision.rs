//! Idempotent provisioning of the AWS resources a state backend needs.
//!
//! Existence checks are read-only probes. Creation treats the primary
//! resource as the only hard requirement; hardening steps that follow it
//! (versioning, encryption, lifecycle, policy, point-in-time recovery,
//! alias) are best-effort and surface as warnings.

use crate::aws;
use crate::error::{Result, StackshiftError};
use crate::exec::{CommandRunner, CommandSpec};
use crate::secrets::normalize_alias;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// ResourceSpec
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResourceSpec {
    S3Bucket { name: String, region: String },
    DynamoDbTable { name: String, region: String },
    KmsKeyAlias { alias: String, region: String },
}

impl ResourceSpec {
    pub fn bucket(name: impl Into<String>, region: impl Into<String>) -> Self {
        ResourceSpec::S3Bucket {
            name: name.into(),
            region: region.into(),
        }
    }

    pub fn lock_table(name: impl Into<String>, region: impl Into<String>) -> Self {
        ResourceSpec::DynamoDbTable {
            name: name.into(),
            region: region.into(),
        }
    }

    pub fn kms_alias(alias: &str, region: impl Into<String>) -> Self {
        ResourceSpec::KmsKeyAlias {
            alias: normalize_alias(alias),
            region: region.into(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            ResourceSpec::S3Bucket { name, .. } | ResourceSpec::DynamoDbTable { name, .. } => name,
            ResourceSpec::KmsKeyAlias { alias, .. } => alias,
        }
    }

    pub fn region(&self) -> &str {
        match self {
            ResourceSpec::S3Bucket { region, .. }
            | ResourceSpec::DynamoDbTable { region, .. }
            | ResourceSpec::KmsKeyAlias { region, .. } => region,
        }
    }
}

impl fmt::Display for ResourceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceSpec::S3Bucket { name, .. } => write!(f, "S3 bucket '{name}'"),
            ResourceSpec::DynamoDbTable { name, .. } => write!(f, "DynamoDB table '{name}'"),
            ResourceSpec::KmsKeyAlias { alias, .. } => write!(f, "KMS key '{alias}'"),
        }
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Created {
    /// KMS key id; `None` for buckets and tables.
    pub id: Option<String>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Ensured {
    Present { id: Option<String> },
    Created(Created),
    Absent,
}

impl Ensured {
    pub fn is_available(&self) -> bool {
        !matches!(self, Ensured::Absent)
    }

    pub fn id(&self) -> Option<&str> {
        match self {
            Ensured::Present { id } | Ensured::Created(Created { id, .. }) => id.as_deref(),
            Ensured::Absent => None,
        }
    }
}

// ---------------------------------------------------------------------------
// AWS output shapes
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct KeyEnvelope {
    key_metadata: KeyMetadata,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct KeyMetadata {
    key_id: String,
    #[serde(default)]
    key_state: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CallerIdentity {
    #[serde(default)]
    account: String,
    #[serde(default)]
    arn: String,
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

/// Confirm the AWS CLI has working credentials. Returns the caller ARN.
pub fn check_credentials(runner: &mut dyn CommandRunner) -> Result<String> {
    let spec = aws::sts_get_caller_identity();
    let stdout = runner.run(&spec).into_result(&spec)?;
    let identity: CallerIdentity =
        serde_json::from_str(&stdout).map_err(|e| StackshiftError::UnexpectedOutput {
            command: spec.display_line(),
            reason: e.to_string(),
        })?;
    info!(account = %identity.account, "aws credentials ok");
    Ok(identity.arn)
}

pub fn exists(runner: &mut dyn CommandRunner, spec: &ResourceSpec) -> bool {
    match spec {
        ResourceSpec::S3Bucket { name, region } => {
            runner.run(&aws::s3_head_bucket(name, region).quiet()).success
        }
        ResourceSpec::DynamoDbTable { name, region } => {
            runner.run(&aws::dynamodb_describe_table(name, region).quiet()).success
        }
        ResourceSpec::KmsKeyAlias { alias, region } => {
            usable_key_id(runner, alias, region).is_some()
        }
    }
}

/// Key id behind `alias`, if the key exists and is not scheduled for deletion
/// or disabled.
fn usable_key_id(runner: &mut dyn CommandRunner, alias: &str, region: &str) -> Option<String> {
    let res = runner.run(&aws::kms_describe_key(alias, region).quiet());
    if !res.success {
        return None;
    }
    let envelope: KeyEnvelope = serde_json::from_str(&res.stdout).ok()?;
    match envelope.key_metadata.key_state.as_deref() {
        Some("PendingDeletion") | Some("Disabled") => None,
        _ => Some(envelope.key_metadata.key_id),
    }
}

pub fn create(runner: &mut dyn CommandRunner, spec: &ResourceSpec) -> Result<Created> {
    info!(resource = %spec, region = spec.region(), "creating");
    match spec {
        ResourceSpec::S3Bucket { name, region } => create_bucket(runner, spec, name, region),
        ResourceSpec::DynamoDbTable { name, region } => create_table(runner, spec, name, region),
        ResourceSpec::KmsKeyAlias { alias, region } => create_kms_key(runner, spec, alias, region),
    }
}

/// Check for `spec`; create it when absent and `create_if_missing` is set.
pub fn ensure(
    runner: &mut dyn CommandRunner,
    spec: &ResourceSpec,
    create_if_missing: bool,
) -> Result<Ensured> {
    if let ResourceSpec::KmsKeyAlias { alias, region } = spec {
        if let Some(id) = usable_key_id(runner, alias, region) {
            return Ok(Ensured::Present { id: Some(id) });
        }
    } else if exists(runner, spec) {
        return Ok(Ensured::Present { id: None });
    }

    if !create_if_missing {
        info!(resource = %spec, "absent and creation not requested");
        return Ok(Ensured::Absent);
    }
    create(runner, spec).map(Ensured::Created)
}

fn provision_error(spec: &ResourceSpec, reason: &str) -> StackshiftError {
    StackshiftError::Provision {
        resource: spec.to_string(),
        reason: reason.trim().to_string(),
    }
}

/// Run a hardening step, recording a warning instead of failing.
fn best_effort(
    runner: &mut dyn CommandRunner,
    cmd: CommandSpec,
    what: &str,
    resource: &ResourceSpec,
    warnings: &mut Vec<String>,
) -> bool {
    let res = runner.run(&cmd);
    if !res.success {
        let msg = format!("{resource}: could not {what}: {}", res.output.trim());
        warn!("{msg}");
        warnings.push(msg);
    }
    res.success
}

fn create_bucket(
    runner: &mut dyn CommandRunner,
    spec: &ResourceSpec,
    name: &str,
    region: &str,
) -> Result<Created> {
    let res = runner.run(&aws::s3_create_bucket(name, region));
    if !res.success {
        return Err(provision_error(spec, &res.output));
    }

    let mut warnings = Vec::new();
    let hardening = [
        (aws::s3_put_bucket_versioning(name, region), "enable versioning"),
        (aws::s3_put_bucket_encryption(name, region), "enable default encryption"),
        (aws::s3_put_bucket_lifecycle(name, region), "add lifecycle rule"),
    ];
    for (cmd, what) in hardening {
        best_effort(runner, cmd, what, spec, &mut warnings);
    }

    // Only install the TLS policy on a bucket without one.
    let policy = runner.run(&aws::s3_get_bucket_policy(name, region));
    if !policy.success {
        if policy.output.contains("NoSuchBucketPolicy") {
            let body = aws::tls_only_policy(name);
            let cmd = aws::s3_put_bucket_policy(name, region, &body);
            best_effort(runner, cmd, "attach TLS-only policy", spec, &mut warnings);
        } else {
            let msg = format!("{spec}: could not read bucket policy: {}", policy.output.trim());
            warn!("{msg}");
            warnings.push(msg);
        }
    }

    Ok(Created { id: None, warnings })
}

fn create_table(
    runner: &mut dyn CommandRunner,
    spec: &ResourceSpec,
    name: &str,
    region: &str,
) -> Result<Created> {
    let res = runner.run(&aws::dynamodb_create_table(name, region));
    if !res.success {
        return Err(provision_error(spec, &res.output));
    }

    let mut warnings = Vec::new();
    let wait = aws::dynamodb_wait_table_exists(name, region);
    if best_effort(runner, wait, "wait for table", spec, &mut warnings) {
        let pitr = aws::dynamodb_enable_pitr(name, region);
        best_effort(runner, pitr, "enable point-in-time recovery", spec, &mut warnings);
    }
    Ok(Created { id: None, warnings })
}

fn create_kms_key(
    runner: &mut dyn CommandRunner,
    spec: &ResourceSpec,
    alias: &str,
    region: &str,
) -> Result<Created> {
    let description = format!("Pulumi state secrets ({alias})");
    let res = runner.run(&aws::kms_create_key(region, &description));
    if !res.success {
        return Err(provision_error(spec, &res.output));
    }
    let envelope: KeyEnvelope = serde_json::from_str(&res.stdout)
        .map_err(|e| provision_error(spec, &format!("unreadable create-key output: {e}")))?;
    let key_id = envelope.key_metadata.key_id;

    let mut warnings = Vec::new();
    best_effort(
        runner,
        aws::kms_create_alias(alias, &key_id, region),
        &format!("alias key {key_id}"),
        spec,
        &mut warnings,
    );
    Ok(Created {
        id: Some(key_id),
        warnings,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::Tool;
    use crate::testing::ScriptedRunner;

    const KEY_JSON: &str = r#"{"KeyMetadata":{"KeyId":"1234abcd-12ab","KeyState":"Enabled"}}"#;

    #[test]
    fn existing_bucket_is_not_created() {
        let mut runner = ScriptedRunner::new();
        let out = ensure(&mut runner, &ResourceSpec::bucket("b", "us-east-1"), true).unwrap();
        assert_eq!(out, Ensured::Present { id: None });
        assert_eq!(runner.lines(), ["aws s3api head-bucket --bucket b --region us-east-1"]);
    }

    #[test]
    fn missing_bucket_without_flag_is_absent() {
        let mut runner = ScriptedRunner::new().fail(Tool::Aws, &["s3api", "head-bucket"], "404");
        let out = ensure(&mut runner, &ResourceSpec::bucket("b", "us-east-1"), false).unwrap();
        assert_eq!(out, Ensured::Absent);
        assert!(!runner.called(Tool::Aws, &["s3api", "create-bucket"]));
    }

    #[test]
    fn existence_probes_are_quiet_but_creation_is_not() {
        let mut runner = ScriptedRunner::new().fail(Tool::Aws, &["s3api", "head-bucket"], "404");
        ensure(&mut runner, &ResourceSpec::bucket("b", "us-east-1"), true).unwrap();
        assert!(runner.find(Tool::Aws, &["s3api", "head-bucket"]).unwrap().spec.quiet);
        assert!(!runner.find(Tool::Aws, &["s3api", "create-bucket"]).unwrap().spec.quiet);
    }

    #[test]
    fn bucket_creation_runs_hardening_in_order() {
        let mut runner = ScriptedRunner::new()
            .fail(Tool::Aws, &["s3api", "head-bucket"], "404")
            .fail(Tool::Aws, &["s3api", "get-bucket-policy"], "An error occurred (NoSuchBucketPolicy)");
        let out = ensure(&mut runner, &ResourceSpec::bucket("b", "eu-west-1"), true).unwrap();
        assert!(matches!(out, Ensured::Created(Created { ref warnings, .. }) if warnings.is_empty()));
        let steps: [&[&str]; 5] = [
            &["s3api", "create-bucket"],
            &["s3api", "put-bucket-versioning"],
            &["s3api", "put-bucket-encryption"],
            &["s3api", "put-bucket-lifecycle-configuration"],
            &["s3api", "put-bucket-policy"],
        ];
        let order: Vec<usize> = steps
            .iter()
            .map(|p| runner.position(Tool::Aws, p).unwrap())
            .collect();
        assert!(order.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn hardening_failures_are_warnings() {
        let mut runner = ScriptedRunner::new()
            .fail(Tool::Aws, &["s3api", "head-bucket"], "404")
            .fail(Tool::Aws, &["s3api", "put-bucket-versioning"], "AccessDenied")
            .fail(Tool::Aws, &["s3api", "put-bucket-lifecycle-configuration"], "AccessDenied");
        let created = create(&mut runner, &ResourceSpec::bucket("b", "us-east-1")).unwrap();
        assert_eq!(created.warnings.len(), 2);
        assert!(created.warnings[0].contains("versioning"));
        // get-bucket-policy succeeded, so a policy already exists.
        assert!(!runner.called(Tool::Aws, &["s3api", "put-bucket-policy"]));
    }

    #[test]
    fn bucket_creation_failure_is_provision_error() {
        let mut runner = ScriptedRunner::new().fail(
            Tool::Aws,
            &["s3api", "create-bucket"],
            "BucketAlreadyExists",
        );
        let err = create(&mut runner, &ResourceSpec::bucket("b", "us-east-1")).unwrap_err();
        match err {
            StackshiftError::Provision { resource, reason } => {
                assert_eq!(resource, "S3 bucket 'b'");
                assert_eq!(reason, "BucketAlreadyExists");
            }
            other => panic!("unexpected: {other}"),
        }
        assert!(!runner.called(Tool::Aws, &["s3api", "put-bucket-versioning"]));
    }

    #[test]
    fn lock_table_gets_pitr_after_wait() {
        let mut runner = ScriptedRunner::new().fail(
            Tool::Aws,
            &["dynamodb", "describe-table"],
            "ResourceNotFound",
        );
        let out = ensure(&mut runner, &ResourceSpec::lock_table("locks", "us-east-1"), true).unwrap();
        assert!(out.is_available());
        let wait = runner.position(Tool::Aws, &["dynamodb", "wait"]).unwrap();
        let pitr = runner.position(Tool::Aws, &["dynamodb", "update-continuous-backups"]).unwrap();
        assert!(wait < pitr);
    }

    #[test]
    fn pitr_failure_keeps_table() {
        let mut runner = ScriptedRunner::new()
            .fail(Tool::Aws, &["dynamodb", "describe-table"], "ResourceNotFound")
            .fail(Tool::Aws, &["dynamodb", "update-continuous-backups"], "Throttled");
        let created = create(&mut runner, &ResourceSpec::lock_table("locks", "us-east-1")).unwrap();
        assert_eq!(created.warnings.len(), 1);
    }

    #[test]
    fn existing_kms_key_returns_id() {
        let mut runner = ScriptedRunner::new().stdout(Tool::Aws, &["kms", "describe-key"], KEY_JSON);
        let out = ensure(&mut runner, &ResourceSpec::kms_alias("pulumi", "us-east-1"), false).unwrap();
        assert_eq!(out.id(), Some("1234abcd-12ab"));
        let call = runner.find(Tool::Aws, &["kms", "describe-key"]).unwrap();
        assert_eq!(call.spec.flag_value("--key-id"), Some("alias/pulumi"));
    }

    #[test]
    fn key_pending_deletion_counts_as_absent() {
        let mut runner = ScriptedRunner::new().stdout(
            Tool::Aws,
            &["kms", "describe-key"],
            r#"{"KeyMetadata":{"KeyId":"k","KeyState":"PendingDeletion"}}"#,
        );
        assert!(!exists(&mut runner, &ResourceSpec::kms_alias("pulumi", "us-east-1")));
    }

    #[test]
    fn alias_failure_still_returns_key_id() {
        let mut runner = ScriptedRunner::new()
            .fail(Tool::Aws, &["kms", "describe-key"], "NotFoundException")
            .stdout(Tool::Aws, &["kms", "create-key"], KEY_JSON)
            .fail(Tool::Aws, &["kms", "create-alias"], "AlreadyExistsException");
        let out = ensure(&mut runner, &ResourceSpec::kms_alias("pulumi", "us-east-1"), true).unwrap();
        match out {
            Ensured::Created(created) => {
                assert_eq!(created.id.as_deref(), Some("1234abcd-12ab"));
                assert_eq!(created.warnings.len(), 1);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn credentials_check_parses_identity() {
        let mut runner = ScriptedRunner::new().stdout(
            Tool::Aws,
            &["sts", "get-caller-identity"],
            r#"{"UserId":"AID","Account":"123456789012","Arn":"arn:aws:iam::123456789012:user/ops"}"#,
        );
        let arn = check_credentials(&mut runner).unwrap();
        assert_eq!(arn, "arn:aws:iam::123456789012:user/ops");
    }

    #[test]
    fn credentials_failure_is_external_command_failure() {
        let mut runner = ScriptedRunner::new().fail(
            Tool::Aws,
            &["sts", "get-caller-identity"],
            "Unable to locate credentials",
        );
        let err = check_credentials(&mut runner).unwrap_err();
        assert!(matches!(err, StackshiftError::ExternalCommandFailure { .. }));
    }
}
