use thiserror::Error;

/// Stable error-kind tag surfaced to observers alongside `BazaarError`.
///
/// Mirrors the kinds enumerated in the error-handling design: each error
/// the pipeline can produce maps to exactly one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    PermissionDenied,
    DeviceBusy,
    HardwareError,
    MlModelError,
    RecognizerTransient,
    RecognizerFatal,
    NetworkError,
    StoreError,
    SchemaError,
    Validation,
    Conflict,
    Cancelled,
}

/// All errors produced by the pipeline crate.
#[derive(Debug, Error)]
pub enum BazaarError {
    #[error("microphone permission denied")]
    PermissionDenied,

    #[error("audio device busy: {0}")]
    DeviceBusy(String),

    #[error("audio hardware error: {0}")]
    HardwareError(String),

    #[error("no default input device found")]
    NoDefaultInputDevice,

    #[error("ring buffer is full — pipeline cannot keep up")]
    RingBufferFull,

    #[error("ml model error: {0}")]
    MlModelError(String),

    #[error("recognizer transient error: {0}")]
    RecognizerTransient(String),

    #[error("recognizer fatal error: {0}")]
    RecognizerFatal(String),

    #[error("network error: {0}")]
    NetworkError(String),

    #[error("store error: {0}")]
    StoreError(String),

    #[error("schema error: {0}")]
    SchemaError(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("conflict on {entity_type} {entity_id}")]
    Conflict { entity_type: String, entity_id: String },

    #[error("engine is already running")]
    AlreadyRunning,

    #[error("engine is not running")]
    NotRunning,

    #[error("operation cancelled")]
    Cancelled,

    #[error("model file not found: {path}")]
    ModelNotFound { path: std::path::PathBuf },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl BazaarError {
    /// Stable kind tag for this error, independent of its message.
    pub fn kind(&self) -> ErrorKind {
        match self {
            BazaarError::PermissionDenied => ErrorKind::PermissionDenied,
            BazaarError::DeviceBusy(_) => ErrorKind::DeviceBusy,
            BazaarError::HardwareError(_)
            | BazaarError::NoDefaultInputDevice
            | BazaarError::RingBufferFull => ErrorKind::HardwareError,
            BazaarError::MlModelError(_) | BazaarError::ModelNotFound { .. } => {
                ErrorKind::MlModelError
            }
            BazaarError::RecognizerTransient(_) => ErrorKind::RecognizerTransient,
            BazaarError::RecognizerFatal(_) => ErrorKind::RecognizerFatal,
            BazaarError::NetworkError(_) => ErrorKind::NetworkError,
            BazaarError::StoreError(_) => ErrorKind::StoreError,
            BazaarError::SchemaError(_) => ErrorKind::SchemaError,
            BazaarError::Validation(_) => ErrorKind::Validation,
            BazaarError::Conflict { .. } => ErrorKind::Conflict,
            BazaarError::Cancelled | BazaarError::AlreadyRunning | BazaarError::NotRunning => {
                ErrorKind::Cancelled
            }
            BazaarError::Io(_) | BazaarError::Other(_) => ErrorKind::HardwareError,
        }
    }

    /// Whether the pipeline can recover from this error without a restart.
    pub fn recoverable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::RecognizerTransient
                | ErrorKind::NetworkError
                | ErrorKind::Conflict
                | ErrorKind::Validation
        )
    }

    /// A short, user-facing action hint, if one applies.
    pub fn action_hint(&self) -> Option<&'static str> {
        match self {
            BazaarError::PermissionDenied => Some("open microphone permission settings"),
            BazaarError::DeviceBusy(_) => Some("close other applications using the microphone"),
            _ => None,
        }
    }

    /// Full `ErrorInfo` surfaced to observers: kind, message, recoverable, hint.
    pub fn info(&self) -> ErrorInfo {
        ErrorInfo {
            kind: self.kind(),
            message: self.to_string(),
            recoverable: self.recoverable(),
            action_hint: self.action_hint().map(str::to_string),
        }
    }
}

/// The four pieces of every error surfaced to an observer, per the error
/// handling design: a stable kind tag, a short message, whether it is
/// recoverable, and an optional action hint.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorInfo {
    pub kind: ErrorKind,
    pub message: String,
    pub recoverable: bool,
    pub action_hint: Option<String>,
}

pub type Result<T> = std::result::Result<T, BazaarError>;
