use crate::fetch::client::HttpClient;
use crate::fetch::error::FetchError;
use async_trait::async_trait;
use reqwest::header::{HeaderName, HeaderValue};

/// Header Socrata reads application tokens from.
pub const APP_TOKEN_HEADER: &str = "X-App-Token";

/// An [`HttpClient`] wrapper that sends a Socrata application token with
/// every request.
///
/// Anonymous requests work but are throttled more aggressively; a token
/// raises the rate limit.
pub struct AppToken<C> {
    inner: C,
    header_name: HeaderName,
    token: HeaderValue,
}

impl<C> AppToken<C> {
    /// Wraps `inner`, checking up front that `token` is a legal header value.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Request`] if the token contains characters
    /// that cannot appear in an HTTP header.
    pub fn new(inner: C, token: &str) -> Result<Self, FetchError> {
        let mut token = HeaderValue::from_str(token.trim())
            .map_err(|e| FetchError::Request(format!("invalid app token: {e}")))?;
        token.set_sensitive(true);
        Ok(Self {
            inner,
            header_name: HeaderName::from_static("x-app-token"),
            token,
        })
    }
}

#[async_trait]
impl<C: HttpClient> HttpClient for AppToken<C> {
    async fn execute(&self, mut req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
        req.headers_mut()
            .insert(self.header_name.clone(), self.token.clone());
        self.inner.execute(req).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_token_with_newline() {
        assert!(AppToken::new((), "abc\ndef").is_err());
    }

    #[test]
    fn test_accepts_plain_token() {
        let wrapped = AppToken::new((), " 8f3kQ2 ").unwrap();
        assert_eq!(wrapped.token.to_str().unwrap(), "8f3kQ2");
        assert_eq!(wrapped.header_name.as_str(), APP_TOKEN_HEADER.to_ascii_lowercase());
    }
}
