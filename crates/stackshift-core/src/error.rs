use thiserror::Error;

#[derive(Debug, Error)]
pub enum StackshiftError {
    #[error("missing required argument: {0}")]
    MissingArgument(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("invalid backend url '{url}': {reason}")]
    InvalidBackendUrl { url: String, reason: String },

    #[error("invalid AWS region '{0}'")]
    InvalidRegion(String),

    #[error("invalid CIDR block '{0}': expected a.b.c.d/n")]
    InvalidCidr(String),

    #[error("invalid secrets provider '{0}'")]
    InvalidSecretsProvider(String),

    #[error("`{command}` failed: {stderr}")]
    ExternalCommandFailure { command: String, stderr: String },

    #[error("could not provision {resource}: {reason}")]
    Provision { resource: String, reason: String },

    #[error("verification found changes against the target backend")]
    VerificationMismatch,

    #[error("migration not confirmed")]
    ConfirmationDeclined,

    #[error("unexpected output from `{command}`: {reason}")]
    UnexpectedOutput { command: String, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StackshiftError>;
