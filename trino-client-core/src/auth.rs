//! Authentication capability interface. Concrete scheme implementations (JWT, certificate,
//! Kerberos, OAuth) are external collaborators per the scope note; this module implements the
//! trait plus `Basic` as the reference capability.

use std::fmt;

use http::HeaderValue;
use reqwest::blocking::ClientBuilder;

/// Something that can attach credentials to the underlying HTTP client and that knows which of
/// its own errors are worth retrying. Installing any `Auth` over a plain HTTP connection is a
/// configuration error, checked eagerly by `RequestLayerBuilder::build()`.
pub trait Auth: fmt::Debug + Send + Sync {
    /// Attach credentials to the client being built. Called once, at `RequestLayer`
    /// construction time. The default capability needs no client-level setup (its credentials
    /// are carried per-request, see [`Self::authorization_header`]).
    fn attach_to_http_client(&self, builder: ClientBuilder) -> ClientBuilder {
        builder
    }

    /// The `Authorization` header value to attach to every request, if any. Called once per
    /// request by `RequestLayer::outbound_headers`.
    fn authorization_header(&self) -> Option<HeaderValue> {
        None
    }

    /// Whether a response-decode failure produced while this capability is installed should be
    /// treated as retryable by [`crate::retry::RetryPolicy`] (checked alongside the policy's own
    /// default transient set). The default capability contributes none; token-refresh schemes
    /// that can see e.g. an HTML login page in place of a JSON body may override this.
    fn is_transient_error(&self, _error: &reqwest::Error) -> bool {
        false
    }
}

/// HTTP Basic authentication. Rejected outright by `RequestLayerBuilder::build()` when the
/// target scheme is not HTTPS, since Basic credentials are sent in the clear otherwise.
pub struct BasicAuth {
    user: String,
    password: String,
}

impl BasicAuth {
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicAuth")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl Auth for BasicAuth {
    fn authorization_header(&self) -> Option<HeaderValue> {
        use base64::Engine;
        let raw = format!("{}:{}", self.user, self.password);
        let encoded = base64::engine::general_purpose::STANDARD.encode(raw);
        HeaderValue::from_str(&format!("Basic {encoded}")).ok()
    }
}
