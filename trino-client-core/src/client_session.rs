use std::collections::HashMap;
use std::fmt;

use http::HeaderMap;

use crate::sanitization::Sanitize;

/// Sentinel used for `transaction_id` before the coordinator has started a transaction, and
/// after `X-Trino-Clear-Session` or an explicit rollback/commit has ended one.
pub const NO_TRANSACTION: &str = "NONE";

/// Mutable session state threaded through every request a [`Query`](crate::query::Query) makes.
///
/// This mirrors the coordinator's notion of a client session: catalog/schema, session
/// properties, the current transaction, any prepared statements registered so far, and
/// opaque headers the caller wants attached to every request. A `ClientSession` is cloned
/// into each [`crate::query::Query`] so that session mutations from one query don't leak into
/// queries already in flight.
#[derive(Clone)]
pub struct ClientSession {
    pub catalog: Option<String>,
    pub schema: Option<String>,
    pub source: Option<String>,
    pub user: String,
    pub properties: HashMap<String, String>,
    pub headers: HeaderMap,
    pub transaction_id: String,
    pub extra_credential: HashMap<String, String>,
    pub client_tags: Vec<String>,
    pub prepared_statements: HashMap<String, String>,
}

impl ClientSession {
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            catalog: None,
            schema: None,
            source: None,
            user: user.into(),
            properties: HashMap::new(),
            headers: HeaderMap::new(),
            transaction_id: NO_TRANSACTION.to_string(),
            extra_credential: HashMap::new(),
            client_tags: Vec::new(),
            prepared_statements: HashMap::new(),
        }
    }

    pub fn in_transaction(&self) -> bool {
        self.transaction_id != NO_TRANSACTION
    }
}

impl fmt::Debug for ClientSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientSession")
            .field("catalog", &self.catalog)
            .field("schema", &self.schema)
            .field("source", &self.source)
            .field("user", &self.user)
            .field("properties", &self.properties)
            .field("headers", &self.headers.sanitize())
            .field("transaction_id", &self.transaction_id)
            .field(
                "extra_credential",
                &self
                    .extra_credential
                    .keys()
                    .map(|k| (k.clone(), "<redacted>"))
                    .collect::<HashMap<_, _>>(),
            )
            .field("client_tags", &self.client_tags)
            .field("prepared_statements", &self.prepared_statements.keys().collect::<Vec<_>>())
            .finish()
    }
}
