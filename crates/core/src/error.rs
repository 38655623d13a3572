//! Error types for the workshop engine.
//!
//! Each collaborator boundary has its own error enum. The top-level [`Error`]
//! carries them plus the engine's own failure kinds, and maps every variant
//! onto a stable [`ErrorCode`] so callers can decide between "fix the input",
//! "try again" and "give up".

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The top-level error type for all workshop operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("Workbench error: {0}")]
    Store(#[from] StoreError),

    /// Bad input or output that retrying verbatim will not fix.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Loop-detector hard stop or turn cap exhausted. Terminal for the phase.
    #[error("Agent loop detected: {0}")]
    LoopDetected(String),

    #[error("Operation canceled")]
    Canceled,

    #[error("File read failed: {0}")]
    FileRead(String),

    #[error("File write failed: {0}")]
    FileWrite(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Stable machine-readable code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::Llm(e) => e.code(),
            Error::Tool(ToolError::WorkerUnavailable(_)) => ErrorCode::ToolWorkerUnavailable,
            Error::Tool(ToolError::SandboxViolation(_)) => ErrorCode::SandboxViolation,
            Error::Tool(ToolError::InvalidArguments(_)) => ErrorCode::ValidationFailed,
            Error::Tool(_) => ErrorCode::FileWriteFailed,
            Error::Store(StoreError::SandboxViolation(_)) => ErrorCode::SandboxViolation,
            Error::Store(StoreError::InvalidPath(_)) | Error::Store(StoreError::Unsupported(_)) => {
                ErrorCode::ValidationFailed
            }
            Error::Store(StoreError::NotFound(_)) | Error::Store(StoreError::DraftMissing) => {
                ErrorCode::FileReadFailed
            }
            Error::Store(_) => ErrorCode::FileWriteFailed,
            Error::Validation(_) => ErrorCode::ValidationFailed,
            Error::LoopDetected(_) => ErrorCode::AgentLoopDetected,
            Error::Canceled => ErrorCode::UserCanceled,
            Error::FileRead(_) => ErrorCode::FileReadFailed,
            Error::FileWrite(_) | Error::Serialization(_) => ErrorCode::FileWriteFailed,
        }
    }

    /// Whether the caller may offer "try again" for this error.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Llm(e) => matches!(
                e,
                LlmError::RateLimited(_) | LlmError::Unavailable(_) | LlmError::Network(_)
            ),
            Error::Tool(ToolError::WorkerUnavailable(_)) => true,
            Error::LoopDetected(_) => true,
            _ => false,
        }
    }

    pub fn is_canceled(&self) -> bool {
        matches!(self, Error::Canceled)
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Error::Llm(LlmError::RateLimited(_)))
    }

    /// Serializable form handed to callers.
    pub fn info(&self, phase: ErrorPhase) -> ErrorInfo {
        ErrorInfo {
            code: self.code(),
            message: self.to_string(),
            phase,
            subphase: None,
            retryable: self.is_retryable(),
        }
    }
}

/// Errors surfaced by an [`LlmClient`](crate::llm::LlmClient).
#[derive(Debug, Clone, Error)]
pub enum LlmError {
    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("provider unavailable: {0}")]
    Unavailable(String),

    #[error("egress blocked: {0}")]
    EgressBlocked(String),

    #[error("provider not configured: {0}")]
    NotConfigured(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("API request failed: {message} (status: {status_code})")]
    Api { status_code: u16, message: String },
}

impl LlmError {
    pub fn code(&self) -> ErrorCode {
        match self {
            LlmError::RateLimited(_) | LlmError::Unavailable(_) | LlmError::Api { .. } => {
                ErrorCode::ProviderUnavailable
            }
            LlmError::Unauthorized(_) => ErrorCode::ProviderAuthFailed,
            LlmError::EgressBlocked(_) => ErrorCode::EgressConsentRequired,
            LlmError::Network(_) => ErrorCode::NetworkUnavailable,
            LlmError::NotConfigured(_) => ErrorCode::ProviderNotConfigured,
        }
    }
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    NotFound(String),

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("{tool_name} failed: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("tool worker unavailable: {0}")]
    WorkerUnavailable(String),

    #[error("sandbox violation: {0}")]
    SandboxViolation(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("sandbox violation: {0}")]
    SandboxViolation(String),

    #[error("unsupported file type: {0}")]
    Unsupported(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("draft not found")]
    DraftMissing,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<StoreError> for ToolError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::SandboxViolation(reason) => ToolError::SandboxViolation(reason),
            StoreError::InvalidPath(reason) | StoreError::Unsupported(reason) => {
                ToolError::InvalidArguments(reason)
            }
            other => ToolError::ExecutionFailed {
                tool_name: "workbench".into(),
                reason: other.to_string(),
            },
        }
    }
}

/// Stable error codes exposed across the engine boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    EgressConsentRequired,
    ProviderNotConfigured,
    ProviderAuthFailed,
    ProviderUnavailable,
    NetworkUnavailable,
    SandboxViolation,
    ValidationFailed,
    FileReadFailed,
    FileWriteFailed,
    UserCanceled,
    ToolWorkerUnavailable,
    AgentLoopDetected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPhase {
    Workshop,
    Review,
    Checkpoints,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorSubphase {
    RpiResearch,
    RpiPlan,
    RpiImplement,
    RpiSummary,
}

/// Serializable error description for UI/transport layers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: ErrorCode,
    pub message: String,
    pub phase: ErrorPhase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subphase: Option<ErrorSubphase>,
    pub retryable: bool,
}

impl ErrorInfo {
    pub fn with_subphase(mut self, subphase: ErrorSubphase) -> Self {
        self.subphase = Some(subphase);
        self
    }
}
