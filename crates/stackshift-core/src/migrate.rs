//! Stack migration between Pulumi Cloud and an S3 backend.
//!
//! A run walks the states in [`MigrationState`] order. Every step turns the
//! result of its external calls into continue / degrade / abort locally;
//! nothing propagates past [`migrate`], which always returns a
//! [`MigrationReport`]. Cleanup of the exported state runs exactly once on
//! every path.

use crate::backend::{split_stack_id, BackendDescriptor, StackId};
use crate::error::{Result, StackshiftError};
use crate::exec::{CommandRunner, CommandSpec, StepResult};
use crate::provision::{self, Ensured, ResourceSpec};
use crate::pulumi;
use crate::secrets::{Passphrase, SecretsProvider, PASSPHRASE_ENV};
use crate::session::SessionHandle;
use crate::types::{MigrationState, StepOutcome};
use crate::verify::{self, Verdict};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use tempfile::TempDir;
use tracing::{error, info, warn};

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// Which supporting resources may be created when absent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CreateFlags {
    pub bucket: bool,
    pub lock_table: bool,
    pub kms_key: bool,
}

impl CreateFlags {
    pub fn all() -> Self {
        Self {
            bucket: true,
            lock_table: true,
            kms_key: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MigrationRequest {
    /// `name` or `org/name`.
    pub stack: String,
    pub source: BackendDescriptor,
    pub target: BackendDescriptor,
    /// Directory containing the Pulumi project; every Pulumi call runs here.
    pub workspace: PathBuf,
    pub secrets_provider: SecretsProvider,
    pub passphrase: Option<Passphrase>,
    /// Provider to switch the source stack to before exporting.
    pub source_secrets_provider: Option<SecretsProvider>,
    pub create: CreateFlags,
    pub skip_verify: bool,
    pub delete_source: bool,
    /// Answer yes to the verification-mismatch prompt.
    pub assume_yes: bool,
    pub interactive: bool,
}

impl MigrationRequest {
    pub fn new(
        stack: impl Into<String>,
        source: BackendDescriptor,
        target: BackendDescriptor,
        workspace: impl Into<PathBuf>,
    ) -> Self {
        Self {
            stack: stack.into(),
            source,
            target,
            workspace: workspace.into(),
            secrets_provider: SecretsProvider::Default,
            passphrase: None,
            source_secrets_provider: None,
            create: CreateFlags::default(),
            skip_verify: false,
            delete_source: false,
            assume_yes: false,
            interactive: true,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.stack.trim().is_empty() || split_stack_id(self.stack.trim()).name.is_empty() {
            return Err(StackshiftError::MissingArgument("stack".to_string()));
        }
        match (self.source.is_cloud(), self.target.is_cloud()) {
            (true, false) | (false, true) => {}
            (true, true) => {
                return Err(StackshiftError::InvalidRequest(
                    "source and target are both Pulumi Cloud".to_string(),
                ))
            }
            (false, false) => {
                return Err(StackshiftError::InvalidRequest(
                    "one side must be Pulumi Cloud; S3 to S3 migration is not supported"
                        .to_string(),
                ))
            }
        }
        for side in [&self.source, &self.target] {
            if matches!(side.bucket(), Some(b) if b.trim().is_empty()) {
                return Err(StackshiftError::MissingArgument("bucket".to_string()));
            }
        }
        if self.secrets_provider == SecretsProvider::Service && !self.target.is_cloud() {
            return Err(StackshiftError::InvalidRequest(
                "the service secrets provider is only available on Pulumi Cloud".to_string(),
            ));
        }
        if self.source_secrets_provider == Some(SecretsProvider::Service) && !self.source.is_cloud()
        {
            return Err(StackshiftError::InvalidRequest(
                "the service secrets provider is only available on Pulumi Cloud".to_string(),
            ));
        }
        let wants_passphrase = self.secrets_provider == SecretsProvider::Passphrase
            || self.source_secrets_provider == Some(SecretsProvider::Passphrase);
        if wants_passphrase && self.passphrase.is_none() {
            return Err(StackshiftError::MissingArgument("passphrase".to_string()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Confirmation
// ---------------------------------------------------------------------------

pub trait Confirm {
    fn confirm(&mut self, prompt: &str) -> bool;
}

/// Always gives the same answer.
#[derive(Debug, Clone, Copy)]
pub struct FixedAnswer(pub bool);

impl Confirm for FixedAnswer {
    fn confirm(&mut self, _prompt: &str) -> bool {
        self.0
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Succeeded,
    Aborted,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepRecord {
    pub state: MigrationState,
    pub outcome: StepOutcome,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub detail: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MigrationReport {
    pub run_id: String,
    pub stack: String,
    pub source: BackendDescriptor,
    /// Effective target (lock table dropped if it could not be provisioned).
    pub target: BackendDescriptor,
    /// Stack name actually created on the target.
    pub target_stack: Option<String>,
    /// Effective secrets provider after any fallback.
    pub secrets_provider: String,
    pub verification: Option<Verdict>,
    pub steps: Vec<StepRecord>,
    pub warnings: Vec<String>,
    pub outcome: RunOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_state: Option<MigrationState>,
    /// True once state has been imported into the target stack.
    pub target_holds_state: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl MigrationReport {
    pub fn succeeded(&self) -> bool {
        self.outcome == RunOutcome::Succeeded
    }

    pub fn step(&self, state: MigrationState) -> Option<&StepRecord> {
        self.steps.iter().find(|s| s.state == state)
    }

    pub fn outcome_of(&self, state: MigrationState) -> Option<StepOutcome> {
        self.step(state).map(|s| s.outcome)
    }

    /// What an operator must know about the target after an abort.
    pub fn abort_notice(&self) -> Option<String> {
        if self.succeeded() {
            return None;
        }
        let failed = self.failed_state?;
        let stack = self.target_stack.as_deref().unwrap_or(&self.stack);
        if self.target_holds_state {
            Some(format!(
                "target stack '{stack}' on {} already holds the imported state; \
                 inspect it before re-running, a blind retry would import twice",
                self.target
            ))
        } else if failed.touches_target() && self.target_stack.is_some() {
            Some(format!(
                "an empty stack '{stack}' was created on {}; remove it with \
                 `pulumi stack rm {stack}` before retrying",
                self.target
            ))
        } else {
            Some("no changes were made to the target backend".to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

/// Execute a migration. Never fails: the outcome is in the report.
pub fn migrate(
    runner: &mut dyn CommandRunner,
    confirm: &mut dyn Confirm,
    req: &MigrationRequest,
) -> MigrationReport {
    let mut run = Run::start(runner, confirm, req);
    let result = run.drive();
    if let Err(e) = &result {
        run.fail(e);
    }
    run.cleanup();
    run.finish(result)
}

struct Run<'a> {
    runner: &'a mut dyn CommandRunner,
    confirm: &'a mut dyn Confirm,
    req: &'a MigrationRequest,
    stack: StackId,
    session: SessionHandle,
    state: MigrationState,
    target: BackendDescriptor,
    provider: SecretsProvider,
    export_dir: Option<TempDir>,
    export_file: Option<PathBuf>,
    report: MigrationReport,
}

impl<'a> Run<'a> {
    fn start(
        runner: &'a mut dyn CommandRunner,
        confirm: &'a mut dyn Confirm,
        req: &'a MigrationRequest,
    ) -> Self {
        let now = Utc::now();
        let report = MigrationReport {
            run_id: uuid::Uuid::new_v4().to_string(),
            stack: req.stack.trim().to_string(),
            source: req.source.clone(),
            target: req.target.clone(),
            target_stack: None,
            secrets_provider: req.secrets_provider.to_string(),
            verification: None,
            steps: Vec::new(),
            warnings: Vec::new(),
            outcome: RunOutcome::Aborted,
            error: None,
            failed_state: None,
            target_holds_state: false,
            started_at: now,
            finished_at: now,
        };
        info!(run_id = %report.run_id, stack = %report.stack, "migration started");
        Self {
            runner,
            confirm,
            req,
            stack: split_stack_id(req.stack.trim()),
            session: SessionHandle::new(&req.workspace),
            state: MigrationState::Init,
            target: req.target.clone(),
            provider: req.secrets_provider.clone(),
            export_dir: None,
            export_file: None,
            report,
        }
    }

    fn drive(&mut self) -> Result<()> {
        self.enter(MigrationState::Init);
        self.req.validate()?;
        let detail = format!("{} from {} to {}", self.stack, self.req.source, self.req.target);
        self.record(MigrationState::Init, StepOutcome::Completed, detail);

        self.provision()?;
        self.change_source_secrets_provider()?;
        self.export_state()?;
        self.switch_backend()?;
        self.create_stack()?;
        self.import_state()?;
        self.verify()?;
        self.delete_source();
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Bookkeeping
    // -----------------------------------------------------------------------

    fn enter(&mut self, state: MigrationState) {
        self.state = state;
        info!(state = %state, "step");
    }

    fn record(&mut self, state: MigrationState, outcome: StepOutcome, detail: impl Into<String>) {
        self.report.steps.push(StepRecord {
            state,
            outcome,
            detail: detail.into(),
        });
    }

    fn warn(&mut self, msg: impl Into<String>) {
        let msg = msg.into();
        warn!("{msg}");
        self.report.warnings.push(msg);
    }

    fn fail(&mut self, err: &StackshiftError) {
        error!(state = %self.state, "{err}");
        self.record(self.state, StepOutcome::Failed, err.to_string());
        self.report.failed_state = Some(self.state);
        self.report.error = Some(err.to_string());
    }

    fn finish(mut self, result: Result<()>) -> MigrationReport {
        if result.is_ok() {
            self.record(MigrationState::Done, StepOutcome::Completed, "");
            self.report.outcome = RunOutcome::Succeeded;
            info!(run_id = %self.report.run_id, "migration succeeded");
        }
        self.report.target = self.target;
        self.report.secrets_provider = self.provider.to_string();
        self.report.finished_at = Utc::now();
        self.report
    }

    // -----------------------------------------------------------------------
    // Pulumi invocation
    // -----------------------------------------------------------------------

    fn pulumi(&self, spec: CommandSpec) -> CommandSpec {
        let spec = spec.cwd(&self.req.workspace);
        match &self.req.passphrase {
            Some(p) => spec.env(PASSPHRASE_ENV, p.expose()),
            None => spec,
        }
    }

    fn exec(&mut self, spec: CommandSpec) -> StepResult {
        let spec = self.pulumi(spec);
        self.runner.run(&spec)
    }

    fn exec_checked(&mut self, spec: CommandSpec) -> Result<String> {
        let spec = self.pulumi(spec);
        self.runner.run(&spec).into_result(&spec)
    }

    fn login(&mut self, backend: &BackendDescriptor, force: bool) -> Result<()> {
        let res = if force {
            self.session.switch_to(self.runner, backend)
        } else {
            self.session.ensure(self.runner, backend)
        };
        if res.success {
            Ok(())
        } else {
            Err(StackshiftError::ExternalCommandFailure {
                command: format!("pulumi login {}", backend.login_url()),
                stderr: res.output.trim().to_string(),
            })
        }
    }

    // -----------------------------------------------------------------------
    // Steps
    // -----------------------------------------------------------------------

    fn provision(&mut self) -> Result<()> {
        self.enter(MigrationState::ProvisionResources);
        let kms = self
            .provider
            .kms_alias()
            .map(|(a, r)| (a.to_string(), r.to_string()));

        let caller = provision::check_credentials(self.runner)?;
        let mut details = vec![format!("caller {caller}")];
        let mut degraded = false;

        if let BackendDescriptor::S3 { bucket, region, .. } = &self.req.source {
            let spec = ResourceSpec::bucket(bucket, region);
            if !provision::exists(self.runner, &spec) {
                return Err(StackshiftError::Provision {
                    resource: spec.to_string(),
                    reason: "source bucket does not exist".to_string(),
                });
            }
            details.push(format!("source {spec} exists"));
        }

        if let BackendDescriptor::S3 {
            bucket,
            region,
            lock_table,
        } = self.target.clone()
        {
            let spec = ResourceSpec::bucket(&bucket, &region);
            match provision::ensure(self.runner, &spec, self.req.create.bucket)? {
                Ensured::Absent => {
                    return Err(StackshiftError::Provision {
                        resource: spec.to_string(),
                        reason: "does not exist; pass --create-bucket to create it".to_string(),
                    })
                }
                Ensured::Created(created) => {
                    for w in created.warnings {
                        self.warn(w);
                    }
                    details.push(format!("created {spec}"));
                }
                Ensured::Present { .. } => details.push(format!("{spec} exists")),
            }

            if let Some(table) = lock_table {
                let spec = ResourceSpec::lock_table(&table, &region);
                match provision::ensure(self.runner, &spec, self.req.create.lock_table) {
                    Ok(Ensured::Present { .. }) => details.push(format!("{spec} exists")),
                    Ok(Ensured::Created(created)) => {
                        for w in created.warnings {
                            self.warn(w);
                        }
                        details.push(format!("created {spec}"));
                    }
                    Ok(Ensured::Absent) => {
                        self.warn(format!(
                            "{spec} does not exist; continuing without state locking"
                        ));
                        self.target = self.target.without_lock_table();
                        degraded = true;
                    }
                    Err(e) => {
                        self.warn(format!("{e}; continuing without state locking"));
                        self.target = self.target.without_lock_table();
                        degraded = true;
                    }
                }
            }
        }

        if let Some((alias, region)) = kms {
            let spec = ResourceSpec::kms_alias(&alias, region.as_str());
            let fallback = if self.req.passphrase.is_some() {
                SecretsProvider::Passphrase
            } else {
                SecretsProvider::Default
            };
            match provision::ensure(self.runner, &spec, self.req.create.kms_key) {
                Ok(Ensured::Present { .. }) => details.push(format!("{spec} exists")),
                Ok(Ensured::Created(created)) => {
                    let alias_failed = !created.warnings.is_empty();
                    for w in created.warnings {
                        self.warn(w);
                    }
                    match created.id {
                        // Keyed but unaliased: address the key by id instead.
                        Some(id) if alias_failed => {
                            self.provider = SecretsProvider::Custom {
                                url: format!("awskms://{id}?region={region}"),
                            };
                            degraded = true;
                            details.push(format!("created KMS key {id} without alias"));
                        }
                        _ => details.push(format!("created {spec}")),
                    }
                }
                Ok(Ensured::Absent) => {
                    self.warn(format!(
                        "{spec} does not exist; falling back to the {fallback} secrets provider"
                    ));
                    self.provider = fallback;
                    degraded = true;
                }
                Err(e) => {
                    self.warn(format!(
                        "{e}; falling back to the {fallback} secrets provider"
                    ));
                    self.provider = fallback;
                    degraded = true;
                }
            }
        }

        let outcome = if degraded {
            StepOutcome::Degraded
        } else {
            StepOutcome::Completed
        };
        self.record(MigrationState::ProvisionResources, outcome, details.join("; "));
        Ok(())
    }

    fn change_source_secrets_provider(&mut self) -> Result<()> {
        let Some(provider) = self.req.source_secrets_provider.clone() else {
            self.record(MigrationState::ChangeSecretsProvider, StepOutcome::Skipped, "");
            return Ok(());
        };
        self.enter(MigrationState::ChangeSecretsProvider);
        let source = self.req.source.clone();
        self.login(&source, false)?;
        let stack = self.stack.qualified();
        self.exec_checked(pulumi::change_secrets_provider(&stack, &provider.change_arg()))?;
        self.record(
            MigrationState::ChangeSecretsProvider,
            StepOutcome::Completed,
            format!("source stack now uses {provider}"),
        );
        Ok(())
    }

    fn export_state(&mut self) -> Result<()> {
        self.enter(MigrationState::ExportState);
        let source = self.req.source.clone();
        self.login(&source, false)?;

        let dir = tempfile::Builder::new().prefix("stackshift-").tempdir()?;
        let file = dir.path().join(format!("{}.json", self.stack.file_stem()));
        self.export_dir = Some(dir);

        let stack = self.stack.qualified();
        self.exec_checked(pulumi::stack_export(&stack, &file, true))?;
        let size = match std::fs::metadata(&file) {
            Ok(meta) => meta.len(),
            Err(_) => {
                return Err(StackshiftError::UnexpectedOutput {
                    command: "pulumi stack export".to_string(),
                    reason: format!("{} was not written", file.display()),
                })
            }
        };
        self.record(
            MigrationState::ExportState,
            StepOutcome::Completed,
            format!("{size} bytes to {}", file.display()),
        );
        self.export_file = Some(file);
        Ok(())
    }

    fn switch_backend(&mut self) -> Result<()> {
        self.enter(MigrationState::SwitchBackend);
        let target = self.target.clone();
        self.login(&target, true)?;
        self.record(
            MigrationState::SwitchBackend,
            StepOutcome::Completed,
            format!("logged in to {target}"),
        );
        Ok(())
    }

    fn create_stack(&mut self) -> Result<()> {
        self.enter(MigrationState::CreateStack);
        let provider_arg = self.provider.init_arg();
        let qualified = self.stack.qualified();

        let first = self.exec(pulumi::stack_init(&qualified, provider_arg.as_deref()));
        let created = if first.success {
            qualified
        } else if self.stack.org.is_some() {
            // Some backends have no organization scoping; retry once bare.
            self.warn(format!(
                "creating '{qualified}' failed ({}); retrying without the organization",
                first.output.trim()
            ));
            let bare = self.stack.name.clone();
            self.exec_checked(pulumi::stack_init(&bare, provider_arg.as_deref()))?;
            bare
        } else {
            let spec = self.pulumi(pulumi::stack_init(&qualified, provider_arg.as_deref()));
            return Err(StackshiftError::ExternalCommandFailure {
                command: spec.display_line(),
                stderr: first.output.trim().to_string(),
            });
        };

        self.report.target_stack = Some(created.clone());
        let detail = format!("{created} with the {} secrets provider", self.provider);
        self.record(MigrationState::CreateStack, StepOutcome::Completed, detail);
        Ok(())
    }

    fn import_state(&mut self) -> Result<()> {
        self.enter(MigrationState::ImportState);
        let (Some(file), Some(stack)) = (self.export_file.clone(), self.report.target_stack.clone())
        else {
            return Err(StackshiftError::InvalidRequest(
                "import attempted without an export".to_string(),
            ));
        };
        self.exec_checked(pulumi::stack_import(&stack, &file))?;
        self.report.target_holds_state = true;
        self.record(
            MigrationState::ImportState,
            StepOutcome::Completed,
            format!("state imported into {stack}"),
        );
        Ok(())
    }

    fn verify(&mut self) -> Result<()> {
        if self.req.skip_verify {
            self.record(MigrationState::Verify, StepOutcome::Skipped, "--skip-verify");
            return Ok(());
        }
        self.enter(MigrationState::Verify);
        let stack = self.report.target_stack.clone().unwrap_or_else(|| self.stack.qualified());
        let spec = self.pulumi(pulumi::preview_diff(&stack));
        let (verdict, res) = verify::verify(self.runner, &spec);
        self.report.verification = Some(verdict);

        if verdict == Verdict::Clean {
            self.record(MigrationState::Verify, StepOutcome::Completed, "no changes");
            return Ok(());
        }
        let reason = if res.success {
            StackshiftError::VerificationMismatch.to_string()
        } else {
            format!("preview failed: {}", res.output.trim())
        };
        self.warn(reason.clone());
        self.record(MigrationState::Verify, StepOutcome::Warned, reason);

        self.enter(MigrationState::ConfirmOnMismatch);
        if self.req.assume_yes {
            self.record(
                MigrationState::ConfirmOnMismatch,
                StepOutcome::Completed,
                "auto-confirmed (--yes)",
            );
            return Ok(());
        }
        if !self.req.interactive {
            return Err(StackshiftError::ConfirmationDeclined);
        }
        let prompt = format!("Verification of '{stack}' reported changes. Continue anyway?");
        if !self.confirm.confirm(&prompt) {
            return Err(StackshiftError::ConfirmationDeclined);
        }
        self.record(MigrationState::ConfirmOnMismatch, StepOutcome::Completed, "confirmed");
        Ok(())
    }

    /// Gated by `delete_source`, or by the operator when running
    /// interactively. Failures are warnings: the migration itself is done.
    fn delete_source(&mut self) {
        let stack = self.stack.qualified();
        let wanted = self.req.delete_source
            || (self.req.interactive
                && !self.req.assume_yes
                && self.confirm.confirm(&format!(
                    "Delete '{stack}' from {}?",
                    self.req.source
                )));
        if !wanted {
            self.record(MigrationState::DeleteSource, StepOutcome::Skipped, "");
            return;
        }
        self.enter(MigrationState::DeleteSource);

        let source = self.req.source.clone();
        if let Err(e) = self.login(&source, true) {
            self.warn(format!("source stack not deleted: {e}"));
            self.record(MigrationState::DeleteSource, StepOutcome::Warned, e.to_string());
            self.restore_target_login();
            return;
        }
        let rm = self.exec(pulumi::stack_rm(&stack));
        let (outcome, detail) = if rm.success {
            (StepOutcome::Completed, format!("removed {stack} from {source}"))
        } else {
            let msg = format!("source stack not deleted: {}", rm.output.trim());
            self.warn(msg.clone());
            (StepOutcome::Warned, msg)
        };
        self.restore_target_login();
        self.record(MigrationState::DeleteSource, outcome, detail);
    }

    fn restore_target_login(&mut self) {
        let target = self.target.clone();
        if let Err(e) = self.login(&target, true) {
            self.warn(format!("could not log back in to {target}: {e}"));
        }
    }

    fn cleanup(&mut self) {
        self.state = MigrationState::Cleanup;
        let Some(dir) = self.export_dir.take() else {
            self.record(MigrationState::Cleanup, StepOutcome::Completed, "nothing to remove");
            return;
        };
        let path = dir.path().display().to_string();
        match dir.close() {
            Ok(()) => {
                info!(path = %path, "removed exported state");
                self.record(MigrationState::Cleanup, StepOutcome::Completed, format!("removed {path}"));
            }
            Err(e) => {
                self.warn(format!("could not remove {path}: {e}"));
                self.record(MigrationState::Cleanup, StepOutcome::Warned, e.to_string());
            }
        }
        self.export_file = None;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
