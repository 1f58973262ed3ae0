//! Encodes [`ClientSession`] into outbound `X-Trino-*` headers, and folds inbound directive
//! headers back into a session.

use http::{HeaderMap, HeaderName, HeaderValue};
use snafu::{ResultExt, Snafu};
use tracing::instrument;

use crate::client_session::ClientSession;

pub const HEADER_CATALOG: &str = "X-Trino-Catalog";
pub const HEADER_SCHEMA: &str = "X-Trino-Schema";
pub const HEADER_SOURCE: &str = "X-Trino-Source";
pub const HEADER_USER: &str = "X-Trino-User";
pub const HEADER_CLIENT_TAGS: &str = "X-Trino-Client-Tags";
pub const HEADER_SESSION: &str = "X-Trino-Session";
pub const HEADER_TRANSACTION_ID: &str = "X-Trino-Transaction-Id";
pub const HEADER_EXTRA_CREDENTIAL: &str = "X-Trino-Extra-Credential";

pub const HEADER_SET_SESSION: &str = "X-Trino-Set-Session";
pub const HEADER_CLEAR_SESSION: &str = "X-Trino-Clear-Session";
pub const HEADER_STARTED_TRANSACTION_ID: &str = "X-Trino-Started-Transaction-Id";
pub const HEADER_ADDED_PREPARE: &str = "X-Trino-Added-Prepare";
pub const HEADER_DEALLOCATED_PREPARE: &str = "X-Trino-Deallocated-Prepare";

/// All reserved outbound header names, lowercased, for collision checks against caller-supplied
/// custom headers.
pub const RESERVED_HEADERS: &[&str] = &[
    "x-trino-catalog",
    "x-trino-schema",
    "x-trino-source",
    "x-trino-user",
    "x-trino-client-tags",
    "x-trino-session",
    "x-trino-transaction-id",
    "x-trino-extra-credential",
];

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display(
        "extra credential key {key:?} must be non-empty ASCII with no whitespace or '='"
    ))]
    InvalidExtraCredentialKey { key: String },

    #[snafu(display("custom header {header:?} collides with a reserved Trino protocol header"))]
    ReservedHeaderCollision { header: String },

    #[snafu(display("header {header:?} carries a value that is not a valid HTTP header value"))]
    InvalidHeaderValue {
        header: String,
        source: http::header::InvalidHeaderValue,
    },
}

fn is_valid_extra_credential_key(key: &str) -> bool {
    !key.is_empty() && key.chars().all(|c| c.is_ascii() && !c.is_whitespace() && c != '=')
}

/// Validate caller-supplied headers don't collide with reserved protocol headers.
pub fn validate_custom_headers(headers: &HeaderMap) -> Result<(), Error> {
    for name in headers.keys() {
        if RESERVED_HEADERS.contains(&name.as_str()) {
            return ReservedHeaderCollisionSnafu {
                header: name.as_str().to_string(),
            }
            .fail();
        }
    }
    Ok(())
}

/// Build the outbound `X-Trino-*` header set from the current session.
#[instrument(skip_all, fields(user = %session.user))]
pub fn encode(session: &ClientSession) -> Result<HeaderMap, Error> {
    let mut headers = HeaderMap::new();

    if let Some(catalog) = &session.catalog {
        insert(&mut headers, HEADER_CATALOG, catalog)?;
    }
    if let Some(schema) = &session.schema {
        insert(&mut headers, HEADER_SCHEMA, schema)?;
    }
    if let Some(source) = &session.source {
        insert(&mut headers, HEADER_SOURCE, source)?;
    }
    if !session.user.is_empty() {
        insert(&mut headers, HEADER_USER, &session.user)?;
    }
    if !session.client_tags.is_empty() {
        insert(&mut headers, HEADER_CLIENT_TAGS, &session.client_tags.join(","))?;
    }
    if !session.properties.is_empty() {
        let mut pairs: Vec<String> = session
            .properties
            .iter()
            .map(|(k, v)| format!("{k}={}", urlencoding::encode(v)))
            .collect();
        pairs.sort();
        insert(&mut headers, HEADER_SESSION, &pairs.join(","))?;
    }
    insert(&mut headers, HEADER_TRANSACTION_ID, &session.transaction_id)?;
    if !session.extra_credential.is_empty() {
        let mut pairs = Vec::with_capacity(session.extra_credential.len());
        for key in session.extra_credential.keys() {
            if !is_valid_extra_credential_key(key) {
                return InvalidExtraCredentialKeySnafu { key: key.clone() }.fail();
            }
        }
        let mut sorted_keys: Vec<&String> = session.extra_credential.keys().collect();
        sorted_keys.sort();
        for key in sorted_keys {
            let value = &session.extra_credential[key];
            let encoded: String = url::form_urlencoded::byte_serialize(value.as_bytes()).collect();
            pairs.push(format!("{key}={encoded}"));
        }
        insert(&mut headers, HEADER_EXTRA_CREDENTIAL, &pairs.join(","))?;
    }

    for (name, value) in session.headers.iter() {
        headers.insert(name.clone(), value.clone());
    }

    Ok(headers)
}

fn insert(headers: &mut HeaderMap, name: &str, value: &str) -> Result<(), Error> {
    let header_value = HeaderValue::from_str(value).context(InvalidHeaderValueSnafu {
        header: name.to_string(),
    })?;
    headers.insert(
        HeaderName::from_bytes(name.as_bytes()).expect("reserved header names are static ASCII"),
        header_value,
    );
    Ok(())
}

fn parse_percent_encoded_pairs(raw: &str) -> Vec<(String, String)> {
    raw.split(',')
        .filter_map(|pair| {
            let pair = pair.trim();
            if pair.is_empty() {
                return None;
            }
            let (key, value) = pair.split_once('=')?;
            let decoded = urlencoding::decode(value).ok()?.into_owned();
            Some((key.trim().to_string(), decoded))
        })
        .collect()
}

/// Fold inbound directive headers from a response into the session. Clear-Session is applied
/// before Set-Session, per the documented tie-break.
#[instrument(skip_all)]
pub fn apply_response_headers(session: &mut ClientSession, headers: &HeaderMap) {
    if let Some(value) = headers.get(HEADER_CLEAR_SESSION).and_then(|v| v.to_str().ok()) {
        for name in value.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            session.properties.remove(name);
        }
    }

    if let Some(value) = headers.get(HEADER_SET_SESSION).and_then(|v| v.to_str().ok()) {
        for (key, value) in parse_percent_encoded_pairs(value) {
            session.properties.insert(key, value);
        }
    }

    if let Some(value) = headers
        .get(HEADER_STARTED_TRANSACTION_ID)
        .and_then(|v| v.to_str().ok())
    {
        session.transaction_id = value.to_string();
    }

    if let Some(value) = headers.get(HEADER_ADDED_PREPARE).and_then(|v| v.to_str().ok()) {
        for (name, sql) in parse_percent_encoded_pairs(value) {
            session.prepared_statements.insert(name, sql);
        }
    }

    if let Some(value) = headers
        .get(HEADER_DEALLOCATED_PREPARE)
        .and_then(|v| v.to_str().ok())
    {
        for name in value.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            session.prepared_statements.remove(name);
        }
    }
}
