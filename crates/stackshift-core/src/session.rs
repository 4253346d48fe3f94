//! The Pulumi CLI keeps exactly one active backend login per user. This
//! handle makes that global state explicit so every switch is a visible
//! logout-then-login transition.

use crate::backend::BackendDescriptor;
use crate::exec::{run_in, CommandRunner, StepResult};
use crate::pulumi;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug)]
pub struct SessionHandle {
    workspace: PathBuf,
    active: Option<BackendDescriptor>,
}

impl SessionHandle {
    /// A handle that assumes nothing about the current login.
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        Self {
            workspace: workspace.into(),
            active: None,
        }
    }

    pub fn active(&self) -> Option<&BackendDescriptor> {
        self.active.as_ref()
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    /// Log out of whatever is active, then log in to `target`.
    ///
    /// The logout is unconditional and its result is ignored: the CLI
    /// reports an error when nobody is logged in, which is fine here.
    pub fn switch_to(
        &mut self,
        runner: &mut dyn CommandRunner,
        target: &BackendDescriptor,
    ) -> StepResult {
        let logout = run_in(runner, pulumi::logout().quiet(), &self.workspace);
        if !logout.success {
            debug!(output = %logout.output.trim(), "logout reported an error");
        }
        self.active = None;

        let login = run_in(runner, pulumi::login(&target.login_url()), &self.workspace);
        if login.success {
            info!(backend = %target, "logged in");
            self.active = Some(target.clone());
        }
        login
    }

    /// Switch only if `target` is not already the known active backend.
    pub fn ensure(
        &mut self,
        runner: &mut dyn CommandRunner,
        target: &BackendDescriptor,
    ) -> StepResult {
        if self.active.as_ref() == Some(target) {
            return StepResult::ok("");
        }
        self.switch_to(runner, target)
    }
}
