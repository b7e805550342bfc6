use thiserror::Error;

/// Outcome of a single request against the query-job API.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The job (or repository) does not exist, usually because the job expired server-side
    #[error("Query job not found")]
    NotFound,
    /// Any other non-2xx response
    #[error("Backend error ({status}): {message}")]
    Status { status: u16, message: String },
    /// Transport failure (connect, timeout, TLS)
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),
    /// Response body could not be decoded
    #[error("Failed to decode backend response: {0}")]
    Decode(String),
    /// The configured base URL cannot be extended with a path
    #[error("Invalid backend URL: {0}")]
    InvalidUrl(String),
}

impl BackendError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }

    /// HTTP status code, if the backend answered at all
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::NotFound => Some(404),
            Self::Status { status, .. } => Some(*status),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            Self::Decode(_) | Self::InvalidUrl(_) => None,
        }
    }
}

/// Job-level failures, surfaced to callers inside a result object rather than thrown.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JobError {
    #[error("No Repository Selected: please select a repository")]
    NoRepositorySelected,
    #[error("Failed to create query: tried to query {attempts} times in a row")]
    FailedToCreateQuery { attempts: u32 },
    #[error("Query Error: {message}")]
    QueryError {
        status: Option<u16>,
        message: String,
    },
}

impl JobError {
    /// Short label used for metrics and log fields
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NoRepositorySelected => "no_repository_selected",
            Self::FailedToCreateQuery { .. } => "failed_to_create_query",
            Self::QueryError { .. } => "query_error",
        }
    }
}

impl From<&BackendError> for JobError {
    fn from(err: &BackendError) -> Self {
        let message = match err {
            BackendError::Status { message, .. } => message.clone(),
            other => other.to_string(),
        };
        Self::QueryError {
            status: err.status(),
            message,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RangeError {
    #[error("Live queries cannot start at '{0}'")]
    InvalidLiveRange(String),
}

/// Annotation formatting failures; these fail the whole formatting call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnnotationError {
    #[error("Annotation query result event does not contain a @timestamp field")]
    MissingTimestampField,
    #[error("Value of the @timestamp field in annotation query result is not a number")]
    NonNumericTimestamp,
    #[error("'{0}' is not a field that exists on returned events for annotation query")]
    MissingTemplateField(String),
    #[error("Value of '{0}' field in annotation query result is not a number")]
    NonNumericTimeEnd(String),
}

/// Variable query formatting failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VariableError {
    #[error("{0} is not a field that exists on returned events for variable query")]
    MissingDataField(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
