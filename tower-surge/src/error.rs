use std::time::Duration;

/// Errors produced by the admission middleware.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SurgeError {
    /// The caller's token bucket denied the request.
    ///
    /// `retry_after` is the deficit wait, or `None` when the bucket never
    /// refills. When the `axum` feature is enabled, this converts to
    /// `429 Too Many Requests` with a `Retry-After` header when known.
    #[error("rate limit exceeded")]
    RateLimited {
        /// How long the client should wait before retrying, if ever.
        retry_after: Option<Duration>,
    },

    /// The bulkhead wait exceeded the maximum; the request was shed without
    /// the handler running.
    ///
    /// When the `axum` feature is enabled, this converts to
    /// `429 Too Many Requests`.
    #[error("admission wait exceeded the maximum; request shed")]
    Overloaded,

    /// The request's cancellation signal fired while it was queued.
    ///
    /// This is an aborted operation, not an overload signal. When the `axum`
    /// feature is enabled, this converts to `408 Request Timeout`.
    #[error("request cancelled while waiting for admission")]
    Cancelled,

    /// Limiter construction for the caller's key failed.
    ///
    /// The store caches nothing in this case; a later request for the same
    /// key retries construction. When the `axum` feature is enabled, this
    /// converts to `500 Internal Server Error`.
    #[error("limiter construction failed: {0}")]
    Factory(String),

    /// An unexpected error occurred in the inner service.
    ///
    /// The string contains the `Display` representation of the inner error.
    /// When the `axum` feature is enabled, this converts to
    /// `500 Internal Server Error`.
    #[error("internal service error: {0}")]
    Inner(String),
}

#[cfg(feature = "axum")]
impl axum::response::IntoResponse for SurgeError {
    fn into_response(self) -> axum::response::Response {
        use axum::http::StatusCode;

        let (status, msg, headers) = match self {
            Self::RateLimited { retry_after } => {
                let header = retry_after.map(|wait| {
                    let secs = wait.as_secs().max(1);
                    (
                        axum::http::header::RETRY_AFTER,
                        axum::http::HeaderValue::from(secs),
                    )
                });
                (StatusCode::TOO_MANY_REQUESTS, self.to_string(), header)
            }
            Self::Overloaded => (StatusCode::TOO_MANY_REQUESTS, self.to_string(), None),
            Self::Cancelled => (StatusCode::REQUEST_TIMEOUT, self.to_string(), None),
            Self::Factory(_) | Self::Inner(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, self.to_string(), None)
            }
        };

        let mut response = (status, msg).into_response();
        if let Some((name, value)) = headers {
            response.headers_mut().insert(name, value);
        }
        response
    }
}
