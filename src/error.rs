pub type MatchcardResult<T> = Result<T, MatchcardError>;

#[derive(thiserror::Error, Debug)]
pub enum MatchcardError {
    #[error("validation error: {0}")]
    Validation(String),

    /// A font or image could not be retrieved via either fetch strategy.
    /// Callers absorb this per resource; it is never fatal on its own.
    #[error("fetch error: {0}")]
    Fetch(String),

    #[error("rasterization error: {0}")]
    Raster(String),

    /// The final bitmap could not be serialized to the requested format.
    /// Fatal; the format is caller-chosen and is never auto-degraded.
    #[error("encoding error: {0}")]
    Encode(String),

    /// Every sink in the delivery chain was tried and failed.
    #[error("delivery error: {0}")]
    Delivery(String),

    #[error("serialization error: {0}")]
    Serde(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl MatchcardError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn fetch(msg: impl Into<String>) -> Self {
        Self::Fetch(msg.into())
    }

    pub fn raster(msg: impl Into<String>) -> Self {
        Self::Raster(msg.into())
    }

    pub fn encode(msg: impl Into<String>) -> Self {
        Self::Encode(msg.into())
    }

    pub fn delivery(msg: impl Into<String>) -> Self {
        Self::Delivery(msg.into())
    }

    pub fn serde(msg: impl Into<String>) -> Self {
        Self::Serde(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes_are_stable() {
        assert!(
            MatchcardError::validation("x")
                .to_string()
                .contains("validation error:")
        );
        assert!(
            MatchcardError::fetch("x")
                .to_string()
                .contains("fetch error:")
        );
        assert!(
            MatchcardError::raster("x")
                .to_string()
                .contains("rasterization error:")
        );
        assert!(
            MatchcardError::encode("x")
                .to_string()
                .contains("encoding error:")
        );
        assert!(
            MatchcardError::delivery("x")
                .to_string()
                .contains("delivery error:")
        );
    }

    #[test]
    fn other_preserves_source() {
        let base = std::io::Error::other("boom");
        let err = MatchcardError::Other(anyhow::Error::new(base));
        assert!(err.to_string().contains("boom"));
    }
}
