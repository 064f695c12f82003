//! Unified error handling for the auto-deploy pipeline
//!
//! Every component (loader, template store, provisioners, orchestrator) reports
//! failures through [`DeployError`]. The CLI maps an error to a process exit code
//! through [`DeployError::exit_code`]; no other structured error surface exists.

use thiserror::Error;

/// Exit code for configuration, template or input-table failures
pub const EXIT_LOAD_FAILURE: i32 = 1;
/// Exit code for failures while talking to the configuration server
pub const EXIT_REMOTE_FAILURE: i32 = 2;

// ============================================================================
// DeployError - Main error type
// ============================================================================

/// Main error type for the auto-deploy pipeline
#[derive(Debug, Error)]
pub enum DeployError {
    // ======================================
    // Configuration Errors
    // ======================================
    #[error("Configuration load failed: {path}: {reason}")]
    ConfigLoad { path: String, reason: String },

    #[error("Template load failed: {template} ({path}): {reason}")]
    TemplateLoad {
        template: String,
        path: String,
        reason: String,
    },

    #[error("Invalid configuration: {field}: {reason}")]
    InvalidConfig { field: String, reason: String },

    // ======================================
    // Input Errors
    // ======================================
    #[error("Parse error: {file}: {error}")]
    Parse { file: String, error: String },

    // ======================================
    // Remote Errors
    // ======================================
    #[error("Request rejected during {stage}: {url} returned {status}: {body}")]
    RemoteRequest {
        stage: String,
        url: String,
        status: u16,
        body: String,
    },

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Tag provisioning incomplete: {failed} of {attempted} devices failed")]
    TagStageIncomplete { failed: usize, attempted: usize },

    // ======================================
    // Internal Errors
    // ======================================
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type alias using DeployError
pub type DeployResult<T> = Result<T, DeployError>;

/// Error category used for exit-code mapping and log levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Setup file, templates or configuration values
    Configuration,
    /// Tabular input
    Input,
    /// Configuration-server requests
    Remote,
    /// Anything else
    Internal,
}

impl DeployError {
    /// Create a remote request error
    pub fn remote(
        stage: impl Into<String>,
        url: impl Into<String>,
        status: u16,
        body: impl Into<String>,
    ) -> Self {
        Self::RemoteRequest {
            stage: stage.into(),
            url: url.into(),
            status,
            body: body.into(),
        }
    }

    /// Create an invalid configuration error
    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Get error category
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ConfigLoad { .. } | Self::TemplateLoad { .. } | Self::InvalidConfig { .. } => {
                ErrorCategory::Configuration
            },
            Self::Parse { .. } => ErrorCategory::Input,
            Self::RemoteRequest { .. } | Self::HttpClient(_) | Self::TagStageIncomplete { .. } => {
                ErrorCategory::Remote
            },
            Self::Serialization(_) => ErrorCategory::Internal,
        }
    }

    /// Get error code (for logs)
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::ConfigLoad { .. } => "CONFIG_LOAD_ERROR",
            Self::TemplateLoad { .. } => "TEMPLATE_LOAD_ERROR",
            Self::InvalidConfig { .. } => "INVALID_CONFIG",
            Self::Parse { .. } => "PARSE_ERROR",
            Self::RemoteRequest { .. } => "REMOTE_REQUEST_ERROR",
            Self::HttpClient(_) => "HTTP_CLIENT_ERROR",
            Self::TagStageIncomplete { .. } => "TAG_STAGE_INCOMPLETE",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Process exit code: load/parse failures are 1, remote failures are 2
    pub fn exit_code(&self) -> i32 {
        match self.category() {
            ErrorCategory::Remote => EXIT_REMOTE_FAILURE,
            ErrorCategory::Configuration | ErrorCategory::Input | ErrorCategory::Internal => {
                EXIT_LOAD_FAILURE
            },
        }
    }

    /// HTTP status carried by the error, if the server answered at all
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::RemoteRequest { status, .. } => Some(*status),
            Self::HttpClient(err) => err.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Get log level
    pub fn log_level(&self) -> tracing::Level {
        match self.category() {
            ErrorCategory::Internal | ErrorCategory::Remote => tracing::Level::ERROR,
            ErrorCategory::Configuration | ErrorCategory::Input => tracing::Level::WARN,
        }
    }
}

// Conversion traits for common error types
impl From<serde_json::Error> for DeployError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

// Helper macros for creating errors
#[macro_export]
macro_rules! config_error {
    ($path:expr, $msg:expr) => {
        $crate::DeployError::ConfigLoad {
            path: $path.to_string(),
            reason: $msg.to_string(),
        }
    };
    ($path:expr, $fmt:expr, $($arg:tt)*) => {
        $crate::DeployError::ConfigLoad {
            path: $path.to_string(),
            reason: format!($fmt, $($arg)*),
        }
    };
}

#[macro_export]
macro_rules! parse_error {
    ($file:expr, $msg:expr) => {
        $crate::DeployError::Parse {
            file: $file.to_string(),
            error: $msg.to_string(),
        }
    };
    ($file:expr, $fmt:expr, $($arg:tt)*) => {
        $crate::DeployError::Parse {
            file: $file.to_string(),
            error: format!($fmt, $($arg)*),
        }
    };
}
