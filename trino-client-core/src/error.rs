use http::StatusCode;
use snafu::Snafu;

/// The core's error taxonomy. Every fallible operation in this crate returns one of these
/// variants; none of them wrap `Box<dyn Error>`, so callers can match on `kind` behavior without
/// downcasting.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("cannot install an authentication capability over a plain HTTP connection"))]
    AuthRequiresHttps,

    #[snafu(display(
        "extra credential key {key:?} must be non-empty ASCII with no whitespace or '='"
    ))]
    InvalidExtraCredentialKey { key: String },

    #[snafu(display("custom header {header:?} collides with a reserved Trino protocol header"))]
    ReservedHeaderCollision { header: String },

    #[snafu(display("header {header:?} does not form a valid HTTP header value: {value:?}"))]
    InvalidHeaderValue { header: String, value: String },

    #[snafu(display("failed to parse a URL"))]
    UrlParse { source: url::ParseError },

    #[snafu(display("failed to configure the SOCKS proxy from SOCKS_PROXY"))]
    ConfigureProxy { source: reqwest::Error },

    #[snafu(display("failed to construct the underlying HTTP client"))]
    ConstructHttpClient { source: reqwest::Error },

    #[snafu(display("redirect response carried no (or an unreadable) Location header"))]
    MissingRedirectLocation,

    #[snafu(display("failed to send request to the Trino coordinator"))]
    Transport { source: reqwest::Error },

    #[snafu(display("error 503: service unavailable"))]
    Http503,

    #[snafu(display("error 504: gateway timeout"))]
    Http504,

    #[snafu(display("error {status}{}", body_excerpt.as_deref().map(|b| format!(": {b}")).unwrap_or_default()))]
    Http {
        status: StatusCode,
        body_excerpt: Option<String>,
    },

    #[snafu(display("failed to decode Trino coordinator response body"))]
    DecodeResponse { source: reqwest::Error },

    #[snafu(display("Trino reported an external error for query {query_id:?}: {message}"))]
    TrinoExternal {
        query_id: Option<String>,
        message: String,
    },

    #[snafu(display("Trino reported a user error for query {query_id:?}: {message}"))]
    TrinoUser {
        query_id: Option<String>,
        message: String,
    },

    #[snafu(display("Trino reported a query error for query {query_id:?}: {message}"))]
    TrinoQuery {
        query_id: Option<String>,
        message: String,
    },

    #[snafu(display(
        "could not convert {original_value:?} into a native value for Trino type {target_type:?}"
    ))]
    DataConversion {
        original_value: String,
        target_type: String,
    },
}
