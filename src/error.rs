use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum Error {
    #[error("Invalid argument. {0}")]
    InvalidArgument(String),

    /// Event creation through a stream class the event class does not belong to
    #[error("Event class '{event_class}' is not attached to a stream class")]
    NotAttached { event_class: String },

    /// Attachment is single use, a second attachment is refused with this
    /// rather than `NotAttached`
    #[error("Event class '{event_class}' is already attached to a stream class")]
    AlreadyAttached { event_class: String },

    #[error("Value {value} is out of range. {detail}")]
    OutOfRange { value: String, detail: String },

    #[error("Cannot mutate a frozen {0}")]
    AlreadyFrozen(&'static str),

    #[error("Failed to allocate {0}")]
    AllocationFailure(String),

    #[error("Validation failed. {0}")]
    ValidationFailure(String),

    #[error("Field '{path}' is not set")]
    UnsetField { path: String },
}

impl Error {
    pub(crate) fn invalid_argument(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        Error::ValidationFailure(msg.into())
    }

    pub(crate) fn out_of_range(value: impl ToString, detail: impl Into<String>) -> Self {
        Error::OutOfRange {
            value: value.to_string(),
            detail: detail.into(),
        }
    }

    pub(crate) fn unset(path: impl Into<String>) -> Self {
        Error::UnsetField { path: path.into() }
    }

    /// Prefix the path of an `UnsetField` error with the name of the enclosing field.
    /// Other errors pass through untouched.
    pub(crate) fn within(self, parent: &str) -> Self {
        match self {
            Error::UnsetField { path } if path.is_empty() => Error::UnsetField {
                path: parent.to_owned(),
            },
            Error::UnsetField { path } if path.starts_with('[') => Error::UnsetField {
                path: format!("{parent}{path}"),
            },
            Error::UnsetField { path } => Error::UnsetField {
                path: format!("{parent}.{path}"),
            },
            e => e,
        }
    }
}
