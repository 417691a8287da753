use std::fmt;

/// Crate-wide error taxonomy.
///
/// Component modules define their own `thiserror`-derived enums close to the
/// code that raises them; everything converges into this enum at the
/// orchestration boundary so callers match on one type.
#[derive(Debug, Clone, PartialEq)]
pub enum ProvisionerError {
    /// Bad step registration, detected before any execution starts.
    ValidationError(String),
    /// Remote marker read/write failure.
    MarkerStoreError(String),
    /// A step's remote action failed.
    ProvisionError(String),
    /// A package lifecycle phase failed.
    DeployError(String),
    /// An await/retry budget was exhausted.
    TimeoutExceeded(String),
    /// The provisioning run was cancelled.
    Cancelled(String),
    /// Local package file missing.
    FileNotFound(String),
    /// Local or transport I/O failure.
    IoError(String),
    ConfigurationError(String),
}

impl fmt::Display for ProvisionerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProvisionerError::ValidationError(msg) => write!(f, "Validation error: {msg}"),
            ProvisionerError::MarkerStoreError(msg) => write!(f, "Marker store error: {msg}"),
            ProvisionerError::ProvisionError(msg) => write!(f, "Provision error: {msg}"),
            ProvisionerError::DeployError(msg) => write!(f, "Deploy error: {msg}"),
            ProvisionerError::TimeoutExceeded(msg) => write!(f, "Timeout exceeded: {msg}"),
            ProvisionerError::Cancelled(msg) => write!(f, "Cancelled: {msg}"),
            ProvisionerError::FileNotFound(msg) => write!(f, "File not found: {msg}"),
            ProvisionerError::IoError(msg) => write!(f, "I/O error: {msg}"),
            ProvisionerError::ConfigurationError(msg) => write!(f, "Configuration error: {msg}"),
        }
    }
}

impl std::error::Error for ProvisionerError {}

pub type Result<T> = std::result::Result<T, ProvisionerError>;
