use std::fmt;
use thiserror::Error;
use tokio::time::Duration;

use crate::validation::{check::CheckError, ValidationError};

#[derive(Error, Debug)]
pub enum StdError {
    #[error("JsonSerializationError: {0}")]
    JsonSerializationError(#[source] serde_json::Error),

    #[error("Kube Error: {0}")]
    KubeError(#[source] kube::Error),

    #[error("Finalizer Error: {0}")]
    // NB: awkward type because finalizer::Error embeds the reconciler error (which is this)
    // so boxing this error to break cycles
    FinalizerError(#[source] Box<kube::runtime::finalizer::Error<Error>>),

    #[error("MetadataMissing: {0}")]
    MetadataMissing(String),

    #[error("InvalidSpec: {0}")]
    InvalidSpec(#[source] ValidationError),

    #[error("CheckFailed: {0}")]
    CheckFailed(#[source] CheckError),

    #[error("ConfigRenderError: {0}")]
    ConfigRenderError(String),

    #[error("HttpError: {0}")]
    HttpError(String),

    #[error("HttpStatusError: {status}: {body}")]
    HttpStatusError { status: u16, body: String },

    #[error("EtcdServiceError: {0}")]
    EtcdServiceError(String),

    #[error("ObjectNotReady: {0}")]
    ObjectNotReady(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("MetricsError: {0}")]
    MetricsError(#[source] prometheus::Error),
}

impl StdError {
    pub fn metric_label(&self) -> String {
        let label = match self {
            StdError::JsonSerializationError(_) => "jsonserializationerror",
            StdError::KubeError(_) => "kubeerror",
            StdError::FinalizerError(_) => "finalizererror",
            StdError::MetadataMissing(_) => "metadatamissing",
            StdError::InvalidSpec(_) => "invalidspec",
            StdError::CheckFailed(_) => "checkfailed",
            StdError::ConfigRenderError(_) => "configrendererror",
            StdError::HttpError(_) => "httperror",
            StdError::HttpStatusError { .. } => "httpstatuserror",
            StdError::EtcdServiceError(_) => "etcdserviceerror",
            StdError::ObjectNotReady(_) => "objectnotready",
            StdError::Timeout(_) => "timeout",
            StdError::MetricsError(_) => "metricserror",
        };
        label.to_string()
    }

    /// Errors expected to clear up on their own, e.g. a server still starting.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StdError::HttpError(_)
                | StdError::HttpStatusError { .. }
                | StdError::ObjectNotReady(_)
                | StdError::Timeout(_)
        )
    }
}

#[derive(Error, Debug)]
pub struct ErrorWithRequeue {
    pub duration: Duration,
    pub error: StdError,
}

impl ErrorWithRequeue {
    pub fn new(error: StdError, duration: Duration) -> ErrorWithRequeue {
        ErrorWithRequeue { error, duration }
    }

    pub fn metric_label(&self) -> String {
        self.error.metric_label()
    }
}

impl fmt::Display for ErrorWithRequeue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.error)
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Standard Error: {0}")]
    StdError(#[source] StdError),

    #[error("Error With Requeue: {0}")]
    ErrorWithRequeue(#[source] ErrorWithRequeue),
}

impl Error {
    pub fn metric_label(&self) -> String {
        match self {
            Error::StdError(e) => e.metric_label(),
            Error::ErrorWithRequeue(e) => e.metric_label(),
        }
    }

    pub fn is_transient(&self) -> bool {
        match self {
            Error::StdError(e) => e.is_transient(),
            Error::ErrorWithRequeue(e) => e.error.is_transient(),
        }
    }
}

impl From<StdError> for Error {
    fn from(e: StdError) -> Self {
        Error::StdError(e)
    }
}

impl From<kube::Error> for Error {
    fn from(e: kube::Error) -> Self {
        Error::StdError(StdError::KubeError(e))
    }
}

impl From<ValidationError> for Error {
    fn from(e: ValidationError) -> Self {
        Error::StdError(StdError::InvalidSpec(e))
    }
}

impl From<CheckError> for Error {
    fn from(e: CheckError) -> Self {
        Error::StdError(StdError::CheckFailed(e))
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
