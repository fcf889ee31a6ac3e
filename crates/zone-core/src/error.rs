use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    NotFound,
    DuplicateLabel,
    InvalidGeometry,
    StorageFailure,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ZoneError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("label already in use: {0}")]
    DuplicateLabel(String),

    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("storage failure: {0}")]
    Storage(String),
}

impl ZoneError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::NotFound(_) => ErrorCode::NotFound,
            Self::DuplicateLabel(_) => ErrorCode::DuplicateLabel,
            Self::InvalidGeometry(_) => ErrorCode::InvalidGeometry,
            Self::Storage(_) => ErrorCode::StorageFailure,
        }
    }

    pub fn invalid_geometry(message: impl Into<String>) -> Self {
        Self::InvalidGeometry(message.into())
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }
}

pub type ZoneResult<T> = Result<T, ZoneError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_follow_variants() {
        assert_eq!(
            ZoneError::NotFound("zone 3".into()).code(),
            ErrorCode::NotFound
        );
        assert_eq!(
            ZoneError::storage("disk full").code(),
            ErrorCode::StorageFailure
        );
        assert_eq!(
            ZoneError::DuplicateLabel("park".into()).to_string(),
            "label already in use: park"
        );
    }
}
