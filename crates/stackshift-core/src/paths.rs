use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "stackshift.yaml";
pub const PULUMI_PROJECT_FILE: &str = "Pulumi.yaml";
pub const DEFAULT_ENV_FILE: &str = ".env";

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn pulumi_project_path(root: &Path) -> PathBuf {
    root.join(PULUMI_PROJECT_FILE)
}

/// True if `dir` looks like a stackshift workspace.
pub fn is_workspace(dir: &Path) -> bool {
    pulumi_project_path(dir).exists() || config_path(dir).exists()
}

/// Nearest ancestor of `start` (inclusive) that is a workspace.
pub fn find_workspace(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| is_workspace(dir))
        .map(Path::to_path_buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn finds_nearest_project_upwards() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("infra/modules/net");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(dir.path().join("infra/Pulumi.yaml"), "name: infra\n").unwrap();
        assert_eq!(find_workspace(&nested), Some(dir.path().join("infra")));
    }

    #[test]
    fn config_file_alone_marks_workspace() {
        let dir = TempDir::new().unwrap();
        std::fs::write(config_path(dir.path()), "version: 1\n").unwrap();
        assert!(is_workspace(dir.path()));
    }
}
