use thiserror::Error;

use crate::domain::expense::ExpenseStatus;
use crate::store::StoreError;

/// Expected request-time outcomes of a vote submission. These are
/// return values, not exceptional control flow; every variant leaves
/// prior state untouched.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum VoteError {
    #[error("invalid vote request: {0}")]
    Validation(String),
    #[error("user `{user_id}` is not eligible to vote on expense `{expense_id}`")]
    NotEligible { user_id: String, expense_id: String },
    #[error("user `{user_id}` has already voted on expense `{expense_id}`")]
    DuplicateVote { user_id: String, expense_id: String },
    #[error("expense `{expense_id}` is already {status} and accepts no further votes")]
    ExpenseClosed { expense_id: String, status: ExpenseStatus },
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Vote(#[from] VoteError),
    #[error("expense `{0}` was not found")]
    ExpenseNotFound(String),
    #[error("user `{0}` was not found")]
    UserNotFound(String),
    #[error("persistence failure: {0}")]
    Persistence(String),
}

impl From<StoreError> for ApplicationError {
    fn from(value: StoreError) -> Self {
        Self::Persistence(value.to_string())
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The vote could not be processed. Check the expense and try again."
            }
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        match value {
            ApplicationError::Vote(error) => Self::BadRequest {
                message: error.to_string(),
                correlation_id: "unassigned".to_owned(),
            },
            ApplicationError::ExpenseNotFound(_) | ApplicationError::UserNotFound(_) => {
                Self::BadRequest {
                    message: value.to_string(),
                    correlation_id: "unassigned".to_owned(),
                }
            }
            ApplicationError::Persistence(message) => {
                Self::ServiceUnavailable { message, correlation_id: "unassigned".to_owned() }
            }
        }
    }
}
