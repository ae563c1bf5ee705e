use std::fmt;

/// Why a raw document could not be turned into a typed record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    MissingField(&'static str),
    WrongType {
        field: &'static str,
        expected: &'static str,
    },
    InvalidTimestamp(&'static str),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::MissingField(field) => write!(f, "missing field `{}`", field),
            DecodeError::WrongType { field, expected } => {
                write!(f, "field `{}` is not {}", field, expected)
            }
            DecodeError::InvalidTimestamp(field) => {
                write!(f, "field `{}` is not a valid timestamp", field)
            }
        }
    }
}

impl std::error::Error for DecodeError {}

#[derive(Debug)]
pub enum AppError {
    Store(String),
    NotFound(String),
    Validation(String),
    PermissionDenied(String),
    Unauthenticated,
    Decode(DecodeError),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Store(msg) => write!(f, "Store error: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::Validation(msg) => write!(f, "Validation error: {}", msg),
            AppError::PermissionDenied(msg) => write!(f, "Permission denied: {}", msg),
            AppError::Unauthenticated => write!(f, "User is not signed in"),
            AppError::Decode(err) => write!(f, "Decode error: {}", err),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Decode(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DecodeError> for AppError {
    fn from(err: DecodeError) -> Self {
        AppError::Decode(err)
    }
}

pub type AppResult<T> = Result<T, AppError>;
