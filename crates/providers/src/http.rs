use reqwest::StatusCode;

use wayfarer_core::errors::{ProviderError, ProviderErrorKind};

/// Translates a non-success HTTP status into the shared provider taxonomy.
pub fn error_for_status(provider: &str, status: StatusCode) -> ProviderError {
    let kind = if status == StatusCode::TOO_MANY_REQUESTS {
        ProviderErrorKind::RateLimited
    } else if status == StatusCode::NOT_FOUND {
        ProviderErrorKind::NotFound
    } else if status.is_client_error() {
        ProviderErrorKind::InvalidQuery
    } else {
        ProviderErrorKind::Unavailable
    };
    ProviderError::new(provider, kind, format!("http status {}", status.as_u16()))
}

/// Transport failures (timeouts, connection resets, DNS) are all treated as
/// the service being unavailable.
pub fn error_for_transport(provider: &str, error: &reqwest::Error) -> ProviderError {
    let detail = if error.is_timeout() {
        "request timed out".to_string()
    } else {
        format!("transport error: {error}")
    };
    ProviderError::unavailable(provider, detail)
}

#[cfg(test)]
mod tests {
    use reqwest::StatusCode;

    use wayfarer_core::errors::ProviderErrorKind;

    use super::error_for_status;

    #[test]
    fn status_codes_map_onto_the_taxonomy() {
        let cases = [
            (StatusCode::TOO_MANY_REQUESTS, ProviderErrorKind::RateLimited),
            (StatusCode::NOT_FOUND, ProviderErrorKind::NotFound),
            (StatusCode::BAD_REQUEST, ProviderErrorKind::InvalidQuery),
            (StatusCode::UNAUTHORIZED, ProviderErrorKind::InvalidQuery),
            (StatusCode::INTERNAL_SERVER_ERROR, ProviderErrorKind::Unavailable),
            (StatusCode::BAD_GATEWAY, ProviderErrorKind::Unavailable),
        ];
        for (status, expected) in cases {
            assert_eq!(error_for_status("opentripmap", status).kind, expected);
        }
    }
}
