use rusqlite;
use std::fmt;
use std::io;
use thiserror::Error;

/// A specific integrity violation, named precisely enough for an automated
/// caller to correct its request and retry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    /// A field required for the node's type is missing or empty.
    MissingField { field: String },
    /// `parent_id` does not resolve, or resolves to a type the tree-shape
    /// rules do not allow as a parent.
    InvalidParent { parent: String, reason: String },
    /// A `depends_on` or `adheres_to` target does not exist.
    DanglingReference { field: String, reference: String },
    /// The proposed `depends_on` edges would make the node reachable from
    /// itself.
    CycleDetected { through: String },
    /// An `adheres_to` target exists but its `applies_to` excludes the
    /// referencing node's type.
    GuardrailNotApplicable {
        guardrail: String,
        node_type: String,
    },
    /// `id` or `human_id` collides with an existing entity.
    DuplicateIdentifier { identifier: String },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::MissingField { field } => {
                write!(f, "required field '{}' is missing or empty", field)
            }
            Violation::InvalidParent { parent, reason } => {
                write!(f, "invalid parent '{}': {}", parent, reason)
            }
            Violation::DanglingReference { field, reference } => {
                write!(f, "{} references '{}' which does not exist", field, reference)
            }
            Violation::CycleDetected { through } => {
                write!(f, "dependency cycle detected through '{}'", through)
            }
            Violation::GuardrailNotApplicable {
                guardrail,
                node_type,
            } => {
                write!(
                    f,
                    "guardrail '{}' does not apply to nodes of type '{}'",
                    guardrail, node_type
                )
            }
            Violation::DuplicateIdentifier { identifier } => {
                write!(f, "identifier '{}' is already in use", identifier)
            }
        }
    }
}

impl Violation {
    /// Stable machine-readable kind, used by the tool adapter error envelope.
    pub fn kind(&self) -> &'static str {
        match self {
            Violation::MissingField { .. } => "missing_field",
            Violation::InvalidParent { .. } => "invalid_parent",
            Violation::DanglingReference { .. } => "dangling_reference",
            Violation::CycleDetected { .. } => "cycle_detected",
            Violation::GuardrailNotApplicable { .. } => "guardrail_not_applicable",
            Violation::DuplicateIdentifier { .. } => "duplicate_identifier",
        }
    }
}

#[derive(Error, Debug)]
pub enum RaasError {
    #[error("SQLite error: {0}")]
    RusqliteError(#[from] rusqlite::Error),
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
    #[error("Malformed document: {0}")]
    MalformedDocument(String),
    #[error("Validation error: {0}")]
    Validation(Violation),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Contention: {0} (retryable)")]
    Contention(String),
    #[error("Config error: {0}")]
    ConfigError(String),
}

impl RaasError {
    /// Machine-readable kind for the adapter envelope.
    pub fn kind(&self) -> &'static str {
        match self {
            RaasError::RusqliteError(_) => "storage",
            RaasError::IoError(_) => "io",
            RaasError::MalformedDocument(_) => "malformed_document",
            RaasError::Validation(v) => v.kind(),
            RaasError::NotFound(_) => "not_found",
            RaasError::Conflict(_) => "conflict",
            RaasError::Contention(_) => "contention",
            RaasError::ConfigError(_) => "config",
        }
    }

    /// Only `Contention` may be retried without modifying the request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RaasError::Contention(_))
    }
}

impl From<Violation> for RaasError {
    fn from(v: Violation) -> Self {
        RaasError::Validation(v)
    }
}
