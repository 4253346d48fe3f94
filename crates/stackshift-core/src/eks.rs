//! Allow-listing CIDR blocks on an EKS cluster's public API endpoint.

use crate::aws;
use crate::error::{Result, StackshiftError};
use crate::exec::CommandRunner;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use tracing::info;

/// Validate and normalize an IPv4 CIDR block. A bare address becomes `/32`.
pub fn parse_cidr(input: &str) -> Result<String> {
    let input = input.trim();
    let (addr, bits) = match input.split_once('/') {
        Some((addr, bits)) => (addr, bits),
        None => (input, "32"),
    };
    let addr: Ipv4Addr = addr
        .parse()
        .map_err(|_| StackshiftError::InvalidCidr(input.to_string()))?;
    let bits: u8 = bits
        .parse()
        .ok()
        .filter(|b| *b <= 32)
        .ok_or_else(|| StackshiftError::InvalidCidr(input.to_string()))?;
    Ok(format!("{addr}/{bits}"))
}

/// `existing` followed by every new entry not already present.
pub fn merge_cidrs(existing: &[String], additions: &[String]) -> Vec<String> {
    let mut merged: Vec<String> = Vec::with_capacity(existing.len() + additions.len());
    for cidr in existing.iter().chain(additions) {
        if !merged.contains(cidr) {
            merged.push(cidr.clone());
        }
    }
    merged
}

#[derive(Deserialize)]
struct DescribeCluster {
    cluster: Cluster,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Cluster {
    resources_vpc_config: VpcConfig,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VpcConfig {
    #[serde(default)]
    public_access_cidrs: Vec<String>,
}

pub fn current_cidrs(runner: &mut dyn CommandRunner, cluster: &str, region: &str) -> Result<Vec<String>> {
    let spec = aws::eks_describe_cluster(cluster, region);
    let stdout = runner.run(&spec).into_result(&spec)?;
    let parsed: DescribeCluster =
        serde_json::from_str(&stdout).map_err(|e| StackshiftError::UnexpectedOutput {
            command: spec.display_line(),
            reason: e.to_string(),
        })?;
    Ok(parsed.cluster.resources_vpc_config.public_access_cidrs)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CidrUpdate {
    pub cluster: String,
    pub before: Vec<String>,
    pub after: Vec<String>,
    pub updated: bool,
}

/// Add `cidrs` to the cluster's public access list, or set the list to
/// exactly `cidrs` with `replace`. Every CIDR is validated before any AWS
/// call, and no update is issued when the list would not change.
pub fn allow_cidrs(
    runner: &mut dyn CommandRunner,
    cluster: &str,
    region: &str,
    cidrs: &[String],
    replace: bool,
) -> Result<CidrUpdate> {
    if cluster.trim().is_empty() {
        return Err(StackshiftError::MissingArgument("cluster".to_string()));
    }
    if cidrs.is_empty() {
        return Err(StackshiftError::MissingArgument("cidr".to_string()));
    }
    let additions = cidrs
        .iter()
        .map(|c| parse_cidr(c))
        .collect::<Result<Vec<_>>>()?;

    let before = current_cidrs(runner, cluster, region)?;
    let after = if replace {
        merge_cidrs(&[], &additions)
    } else {
        merge_cidrs(&before, &additions)
    };

    let updated = after != before;
    if updated {
        let spec = aws::eks_update_public_access_cidrs(cluster, region, &after);
        runner.run(&spec).into_result(&spec)?;
        info!(cluster, cidrs = %after.join(","), "public access updated");
    } else {
        info!(cluster, "public access already up to date");
    }
    Ok(CidrUpdate {
        cluster: cluster.to_string(),
        before,
        after,
        updated,
    })
}
