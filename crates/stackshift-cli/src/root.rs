use stackshift_core::paths;
use std::path::{Path, PathBuf};

/// Resolve the Pulumi workspace directory.
///
/// Priority:
/// 1. `--workspace` flag / `STACKSHIFT_WORKSPACE` env var (passed in as `explicit`)
/// 2. Walk upward from `cwd` looking for `Pulumi.yaml` or `stackshift.yaml`
/// 3. Fall back to `cwd`
pub fn resolve_workspace(explicit: Option<&Path>) -> PathBuf {
    if let Some(p) = explicit {
        return p.to_path_buf();
    }
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    paths::find_workspace(&cwd).unwrap_or(cwd)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_workspace_wins() {
        let dir = tempfile::TempDir::new().unwrap();
        assert_eq!(resolve_workspace(Some(dir.path())), dir.path());
    }
}
