use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// MigrationState
// ---------------------------------------------------------------------------

/// States of the migration run, in the order they are entered.
///
/// The only back-edge is the confirmation prompt after a verification
/// mismatch; everything else is strictly linear.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationState {
    Init,
    ProvisionResources,
    ChangeSecretsProvider,
    ExportState,
    SwitchBackend,
    CreateStack,
    ImportState,
    Verify,
    ConfirmOnMismatch,
    DeleteSource,
    Cleanup,
    Done,
}

impl MigrationState {
    pub fn all() -> &'static [MigrationState] {
        &[
            MigrationState::Init,
            MigrationState::ProvisionResources,
            MigrationState::ChangeSecretsProvider,
            MigrationState::ExportState,
            MigrationState::SwitchBackend,
            MigrationState::CreateStack,
            MigrationState::ImportState,
            MigrationState::Verify,
            MigrationState::ConfirmOnMismatch,
            MigrationState::DeleteSource,
            MigrationState::Cleanup,
            MigrationState::Done,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MigrationState::Init => "init",
            MigrationState::ProvisionResources => "provision_resources",
            MigrationState::ChangeSecretsProvider => "change_secrets_provider",
            MigrationState::ExportState => "export_state",
            MigrationState::SwitchBackend => "switch_backend",
            MigrationState::CreateStack => "create_stack",
            MigrationState::ImportState => "import_state",
            MigrationState::Verify => "verify",
            MigrationState::ConfirmOnMismatch => "confirm_on_mismatch",
            MigrationState::DeleteSource => "delete_source",
            MigrationState::Cleanup => "cleanup",
            MigrationState::Done => "done",
        }
    }

    /// True once the target backend may hold state written by this run.
    pub fn touches_target(self) -> bool {
        self >= MigrationState::CreateStack && self != MigrationState::Cleanup
    }
}

impl fmt::Display for MigrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MigrationState {
    type Err = crate::error::StackshiftError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MigrationState::all()
            .iter()
            .copied()
            .find(|st| st.as_str() == s)
            .ok_or_else(|| crate::error::StackshiftError::InvalidRequest(format!("unknown state '{s}'")))
    }
}

// ---------------------------------------------------------------------------
// StepOutcome
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    Completed,
    Skipped,
    /// Completed, but with a reduced configuration (no lock table, fallback
    /// secrets provider).
    Degraded,
    /// Completed with a non-fatal problem.
    Warned,
    Failed,
}

impl StepOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            StepOutcome::Completed => "completed",
            StepOutcome::Skipped => "skipped",
            StepOutcome::Degraded => "degraded",
            StepOutcome::Warned => "warned",
            StepOutcome::Failed => "failed",
        }
    }
}

impl fmt::Display for StepOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_str_roundtrip() {
        for st in MigrationState::all() {
            let parsed: MigrationState = st.as_str().parse().unwrap();
            assert_eq!(parsed, *st);
        }
        assert!("exporting".parse::<MigrationState>().is_err());
    }

    #[test]
    fn states_are_ordered_linearly() {
        let all = MigrationState::all();
        assert!(all.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn target_touched_from_create_stack_on() {
        assert!(!MigrationState::ExportState.touches_target());
        assert!(!MigrationState::SwitchBackend.touches_target());
        assert!(MigrationState::CreateStack.touches_target());
        assert!(MigrationState::Verify.touches_target());
        assert!(!MigrationState::Cleanup.touches_target());
    }

    #[test]
    fn state_serializes_snake_case() {
        let json = serde_json::to_string(&MigrationState::ConfirmOnMismatch).unwrap();
        assert_eq!(json, "\"confirm_on_mismatch\"");
    }
}
