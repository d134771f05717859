use thiserror::Error;

/// Failure of a web action, rendered as the numeric `code` plus `msg`
#[derive(Debug, Error)]
pub enum ActionError {
    /// Missing or malformed input
    #[error("{0}")]
    Invalid(String),

    /// The operation ran but could not complete
    #[error("{0}")]
    Failed(String),

    /// A file transfer reported failure
    #[error("{0}")]
    Transfer(String),

    #[error("unauthorized access")]
    Unauthorized,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ActionError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid(msg.into())
    }

    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }

    pub fn code(&self) -> i64 {
        match self {
            Self::Invalid(_) | Self::Unauthorized => -1,
            Self::Failed(_) | Self::Internal(_) => 1,
            Self::Transfer(_) => 2,
        }
    }
}

impl From<std::io::Error> for ActionError {
    fn from(e: std::io::Error) -> Self {
        Self::Internal(e.into())
    }
}

impl From<serde_json::Error> for ActionError {
    fn from(e: serde_json::Error) -> Self {
        Self::Invalid(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes() {
        assert_eq!(ActionError::invalid("x").code(), -1);
        assert_eq!(ActionError::Unauthorized.code(), -1);
        assert_eq!(ActionError::failed("x").code(), 1);
        assert_eq!(ActionError::Transfer("x".into()).code(), 2);
        assert_eq!(ActionError::from(anyhow::anyhow!("boom")).code(), 1);
        assert_eq!(ActionError::Unauthorized.to_string(), "unauthorized access");
    }
}
