//! Command builders for the AWS CLI.
//!
//! Every builder takes the region explicitly; nothing relies on the AWS
//! CLI's own profile region. Calls whose output is parsed request
//! `--output json`.

use crate::exec::{CommandSpec, Tool};
use serde_json::json;

fn aws<const N: usize>(args: [&str; N]) -> CommandSpec {
    CommandSpec::new(Tool::Aws, args)
}

fn with_region(spec: CommandSpec, region: &str) -> CommandSpec {
    spec.arg("--region").arg(region)
}

/// Region that S3 treats as having no location constraint.
pub const NO_LOCATION_CONSTRAINT_REGION: &str = "us-east-1";

pub const LOCK_TABLE_KEY: &str = "LockID";
pub const LOCK_TABLE_CAPACITY: u32 = 5;
pub const NONCURRENT_VERSION_EXPIRY_DAYS: u32 = 90;
pub const KMS_KEY_TAG: (&str, &str) = ("Purpose", "pulumi-state");

// ---------------------------------------------------------------------------
// STS
// ---------------------------------------------------------------------------

pub fn sts_get_caller_identity() -> CommandSpec {
    aws(["sts", "get-caller-identity", "--output", "json"])
}

// ---------------------------------------------------------------------------
// S3
// ---------------------------------------------------------------------------

pub fn s3_head_bucket(bucket: &str, region: &str) -> CommandSpec {
    with_region(aws(["s3api", "head-bucket", "--bucket", bucket]), region)
}

pub fn s3_create_bucket(bucket: &str, region: &str) -> CommandSpec {
    let spec = with_region(aws(["s3api", "create-bucket", "--bucket", bucket]), region);
    if region == NO_LOCATION_CONSTRAINT_REGION {
        spec
    } else {
        spec.arg("--create-bucket-configuration")
            .arg(format!("LocationConstraint={region}"))
    }
}

pub fn s3_put_bucket_versioning(bucket: &str, region: &str) -> CommandSpec {
    with_region(
        aws([
            "s3api",
            "put-bucket-versioning",
            "--bucket",
            bucket,
            "--versioning-configuration",
            "Status=Enabled",
        ]),
        region,
    )
}

pub fn s3_put_bucket_encryption(bucket: &str, region: &str) -> CommandSpec {
    let config = json!({
        "Rules": [{
            "ApplyServerSideEncryptionByDefault": { "SSEAlgorithm": "AES256" }
        }]
    });
    with_region(
        aws(["s3api", "put-bucket-encryption", "--bucket", bucket])
            .arg("--server-side-encryption-configuration")
            .arg(config.to_string()),
        region,
    )
}

pub fn s3_put_bucket_lifecycle(bucket: &str, region: &str) -> CommandSpec {
    let config = json!({
        "Rules": [{
            "ID": "expire-noncurrent-versions",
            "Status": "Enabled",
            "Filter": { "Prefix": "" },
            "NoncurrentVersionExpiration": { "NoncurrentDays": NONCURRENT_VERSION_EXPIRY_DAYS }
        }]
    });
    with_region(
        aws(["s3api", "put-bucket-lifecycle-configuration", "--bucket", bucket])
            .arg("--lifecycle-configuration")
            .arg(config.to_string()),
        region,
    )
}

pub fn s3_get_bucket_policy(bucket: &str, region: &str) -> CommandSpec {
    with_region(
        aws(["s3api", "get-bucket-policy", "--bucket", bucket, "--output", "json"]),
        region,
    )
}

pub fn s3_put_bucket_policy(bucket: &str, region: &str, policy: &str) -> CommandSpec {
    with_region(
        aws(["s3api", "put-bucket-policy", "--bucket", bucket, "--policy", policy]),
        region,
    )
}

/// Policy denying every request to `bucket` made without TLS.
pub fn tls_only_policy(bucket: &str) -> String {
    json!({
        "Version": "2012-10-17",
        "Statement": [{
            "Sid": "DenyInsecureTransport",
            "Effect": "Deny",
            "Principal": "*",
            "Action": "s3:*",
            "Resource": [
                format!("arn:aws:s3:::{bucket}"),
                format!("arn:aws:s3:::{bucket}/*")
            ],
            "Condition": { "Bool": { "aws:SecureTransport": "false" } }
        }]
    })
    .to_string()
}

// ---------------------------------------------------------------------------
// DynamoDB
// ---------------------------------------------------------------------------

pub fn dynamodb_describe_table(table: &str, region: &str) -> CommandSpec {
    with_region(
        aws(["dynamodb", "describe-table", "--table-name", table, "--output", "json"]),
        region,
    )
}

pub fn dynamodb_create_table(table: &str, region: &str) -> CommandSpec {
    with_region(
        aws(["dynamodb", "create-table", "--table-name", table])
            .arg("--attribute-definitions")
            .arg(format!("AttributeName={LOCK_TABLE_KEY},AttributeType=S"))
            .arg("--key-schema")
            .arg(format!("AttributeName={LOCK_TABLE_KEY},KeyType=HASH"))
            .arg("--provisioned-throughput")
            .arg(format!(
                "ReadCapacityUnits={LOCK_TABLE_CAPACITY},WriteCapacityUnits={LOCK_TABLE_CAPACITY}"
            )),
        region,
    )
}

/// Block until the table reports ACTIVE (the CLI polls on our behalf).
pub fn dynamodb_wait_table_exists(table: &str, region: &str) -> CommandSpec {
    with_region(
        aws(["dynamodb", "wait", "table-exists", "--table-name", table]),
        region,
    )
}

pub fn dynamodb_enable_pitr(table: &str, region: &str) -> CommandSpec {
    with_region(
        aws([
            "dynamodb",
            "update-continuous-backups",
            "--table-name",
            table,
            "--point-in-time-recovery-specification",
            "PointInTimeRecoveryEnabled=true",
        ]),
        region,
    )
}

// ---------------------------------------------------------------------------
// KMS
// ---------------------------------------------------------------------------

/// `alias` must already be in `alias/<name>` form.
pub fn kms_describe_key(alias: &str, region: &str) -> CommandSpec {
    with_region(
        aws(["kms", "describe-key", "--key-id", alias, "--output", "json"]),
        region,
    )
}

pub fn kms_create_key(region: &str, description: &str) -> CommandSpec {
    with_region(
        aws(["kms", "create-key", "--description", description])
            .arg("--tags")
            .arg(format!("TagKey={},TagValue={}", KMS_KEY_TAG.0, KMS_KEY_TAG.1))
            .arg("--output")
            .arg("json"),
        region,
    )
}

pub fn kms_create_alias(alias: &str, key_id: &str, region: &str) -> CommandSpec {
    with_region(
        aws(["kms", "create-alias", "--alias-name", alias, "--target-key-id", key_id]),
        region,
    )
}

// ---------------------------------------------------------------------------
// SSM
// ---------------------------------------------------------------------------

pub fn ssm_put_parameter(name: &str, value: &str, secure: bool, region: &str) -> CommandSpec {
    let kind = if secure { "SecureString" } else { "String" };
    with_region(
        aws(["ssm", "put-parameter", "--name", name, "--value"])
            .secret_arg(value)
            .arg("--type")
            .arg(kind)
            .arg("--overwrite"),
        region,
    )
}

// ---------------------------------------------------------------------------
// EKS
// ---------------------------------------------------------------------------

pub fn eks_describe_cluster(cluster: &str, region: &str) -> CommandSpec {
    with_region(
        aws(["eks", "describe-cluster", "--name", cluster, "--output", "json"]),
        region,
    )
}

pub fn eks_update_public_access_cidrs(cluster: &str, region: &str, cidrs: &[String]) -> CommandSpec {
    with_region(
        aws(["eks", "update-cluster-config", "--name", cluster])
            .arg("--resources-vpc-config")
            .arg(format!("publicAccessCidrs={}", cidrs.join(","))),
        region,
    )
}

// ---------------------------------------------------------------------------
// ECS
// ---------------------------------------------------------------------------

pub fn ecs_list_task_definitions(region: &str, family_prefix: Option<&str>) -> CommandSpec {
    let spec = aws(["ecs", "list-task-definitions", "--status", "ACTIVE", "--output", "json"]);
    let spec = match family_prefix {
        Some(prefix) => spec.arg("--family-prefix").arg(prefix),
        None => spec,
    };
    with_region(spec, region)
}

pub fn ecs_describe_task_definition(arn: &str, region: &str) -> CommandSpec {
    with_region(
        aws(["ecs", "describe-task-definition", "--task-definition", arn, "--output", "json"]),
        region,
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
