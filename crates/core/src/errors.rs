use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

/// Shared failure taxonomy for external data providers. Adapter
/// implementations translate provider-native status codes into these kinds
/// so nothing downstream branches per provider.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderErrorKind {
    RateLimited,
    NotFound,
    Unavailable,
    InvalidQuery,
}

impl ProviderErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RateLimited => "rate_limited",
            Self::NotFound => "not_found",
            Self::Unavailable => "unavailable",
            Self::InvalidQuery => "invalid_query",
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("provider `{provider}` failed ({}): {message}", kind.as_str())]
pub struct ProviderError {
    pub provider: String,
    pub kind: ProviderErrorKind,
    pub message: String,
}

impl ProviderError {
    pub fn new(
        provider: impl Into<String>,
        kind: ProviderErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self { provider: provider.into(), kind, message: message.into() }
    }

    pub fn unavailable(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(provider, ProviderErrorKind::Unavailable, message)
    }

    /// Only transport-level and server-side failures are worth retrying;
    /// 4xx classes are deterministic and come back identical.
    pub fn is_retryable(&self) -> bool {
        self.kind == ProviderErrorKind::Unavailable
    }
}

#[cfg(test)]
mod tests {
    use super::{ProviderError, ProviderErrorKind};

    #[test]
    fn only_unavailable_is_retryable() {
        assert!(ProviderError::unavailable("opentripmap", "timeout").is_retryable());
        for kind in [
            ProviderErrorKind::RateLimited,
            ProviderErrorKind::NotFound,
            ProviderErrorKind::InvalidQuery,
        ] {
            assert!(!ProviderError::new("opentripmap", kind, "nope").is_retryable());
        }
    }

    #[test]
    fn display_names_the_provider_and_kind() {
        let error = ProviderError::new("rapidapi", ProviderErrorKind::RateLimited, "429");
        assert_eq!(error.to_string(), "provider `rapidapi` failed (rate_limited): 429");
    }
}
