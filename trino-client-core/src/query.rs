//! Query lifecycle: submit a statement, page through `nextUri`, expose a lazy row stream, and
//! support cancellation from another thread while iteration is in progress.

use std::sync::{Arc, Mutex};

use reqwest::header::HeaderMap as ReqwestHeaderMap;
use serde_json::Value;
use snafu::ensure;
use tracing::instrument;

use crate::error::{self, TrinoUserSnafu};
use crate::request::RequestLayer;
use crate::type_mapper;
use crate::wire::{Status, WireColumn};

pub type Error = error::Error;

/// The subset of Query state that must stay visible to [`CancelToken`] from another thread.
/// Everything else (buffered rows, stats, columns) is single-threaded and lives directly on
/// `Query`, following the `tokio-postgres` `Client`/`CancelToken` split: only what cancellation
/// genuinely needs crosses the `Arc<Mutex<_>>` boundary.
#[derive(Debug, Default)]
struct SharedState {
    query_id: Option<String>,
    finished: bool,
    cancelled: bool,
}

/// A handle that can cancel a [`Query`] from a different thread than the one driving iteration.
/// Obtained via [`Query::cancel_token`].
#[derive(Clone)]
pub struct CancelToken {
    shared: Arc<Mutex<SharedState>>,
    request_layer: Arc<RequestLayer>,
}

impl CancelToken {
    #[instrument(skip(self))]
    pub fn cancel(&self) -> Result<(), Error> {
        let query_id = {
            let shared = self.shared.lock().expect("query state mutex poisoned");
            if shared.cancelled || shared.finished {
                return Ok(());
            }
            match &shared.query_id {
                Some(id) => id.clone(),
                None => return Ok(()),
            }
        };

        let url = self.request_layer.query_url(&query_id);
        let status = self.request_layer.delete(&url)?;
        if status.as_u16() != 204 {
            return error::HttpSnafu {
                status,
                body_excerpt: None,
            }
            .fail();
        }

        self.shared.lock().expect("query state mutex poisoned").cancelled = true;
        Ok(())
    }
}

/// Drives one SQL statement through the coordinator's paging protocol. Not `Clone`: a query is
/// a single-pass, forward-only sequence of pages (see [`Self::rows`]).
pub struct Query {
    request_layer: Arc<RequestLayer>,
    sql: String,
    shared: Arc<Mutex<SharedState>>,
    next_uri: Option<String>,
    info_uri: Option<String>,
    stats: Value,
    warnings: Vec<Value>,
    columns: Option<Vec<WireColumn>>,
    update_type: Option<String>,
    response_headers: Option<ReqwestHeaderMap>,
    pending_rows: Vec<Vec<Value>>,
    typed_output: bool,
    query_id: Option<String>,
}

impl Query {
    pub fn new(request_layer: Arc<RequestLayer>, sql: impl Into<String>) -> Self {
        Self {
            request_layer,
            sql: sql.into(),
            shared: Arc::new(Mutex::new(SharedState::default())),
            next_uri: None,
            info_uri: None,
            stats: Value::Null,
            warnings: Vec::new(),
            columns: None,
            update_type: None,
            response_headers: None,
            pending_rows: Vec::new(),
            typed_output: true,
            query_id: None,
        }
    }

    /// Disable TypeMapper conversion; `rows()` then yields raw JSON scalars per cell.
    pub fn without_type_mapping(mut self) -> Self {
        self.typed_output = false;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        CancelToken {
            shared: Arc::clone(&self.shared),
            request_layer: Arc::clone(&self.request_layer),
        }
    }

    pub fn query_id(&self) -> Option<&str> {
        self.query_id.as_deref()
    }

    pub fn is_finished(&self) -> bool {
        self.shared.lock().expect("query state mutex poisoned").finished
    }

    pub fn is_cancelled(&self) -> bool {
        self.shared.lock().expect("query state mutex poisoned").cancelled
    }

    pub fn stats(&self) -> &Value {
        &self.stats
    }

    pub fn warnings(&self) -> &[Value] {
        &self.warnings
    }

    pub fn info_uri(&self) -> Option<&str> {
        self.info_uri.as_deref()
    }

    pub fn update_type(&self) -> Option<&str> {
        self.update_type.as_deref()
    }

    pub fn response_headers(&self) -> Option<&ReqwestHeaderMap> {
        self.response_headers.as_ref()
    }

    /// Submit the statement. Forbidden once `cancel()` has been called. On success, seeds the
    /// first page of rows for [`Self::rows`] to drain before fetching further pages.
    #[instrument(skip(self), fields(sql_len = self.sql.len()))]
    pub fn execute(&mut self) -> Result<(), Error> {
        ensure!(
            !self.is_cancelled(),
            TrinoUserSnafu {
                query_id: None::<String>,
                message: "cannot execute a query that has already been cancelled".to_string(),
            }
        );

        let (status, headers) = self.request_layer.post(&self.sql, None)?;
        self.apply_status(&status, headers);
        self.pending_rows = status.rows;
        Ok(())
    }

    /// Fetch the next page and return its rows. Callers normally reach this through
    /// [`Self::rows`] rather than directly. Does not touch `pending_rows` itself — callers own
    /// buffering (`rows()` overwrites, `columns()` appends) so a page's rows are never counted
    /// twice.
    #[instrument(skip(self))]
    pub fn fetch(&mut self) -> Result<Vec<Vec<Value>>, Error> {
        let Some(next_uri) = self.next_uri.clone() else {
            return Ok(Vec::new());
        };
        let (status, headers) = self.request_layer.get(&next_uri)?;
        self.apply_status(&status, headers);
        Ok(status.rows)
    }

    fn apply_status(&mut self, status: &Status, headers: ReqwestHeaderMap) {
        self.query_id = Some(status.id.clone());
        self.shared.lock().expect("query state mutex poisoned").query_id = Some(status.id.clone());
        if self.info_uri.is_none() {
            self.info_uri = Some(status.info_uri.clone());
            self.warnings = status.warnings.clone();
        }
        self.update_state(status);
        self.next_uri = status.next_uri.clone();
        self.response_headers = Some(headers);
        self.shared.lock().expect("query state mutex poisoned").finished = status.next_uri.is_none();
    }

    fn update_state(&mut self, status: &Status) {
        self.stats = status.stats.clone();
        if status.update_type.is_some() {
            self.update_type = status.update_type.clone();
        }
        if self.columns.is_none() {
            if let Some(columns) = &status.columns {
                if !columns.is_empty() {
                    self.columns = Some(columns.clone());
                }
            }
        }
    }

    #[instrument(skip(self))]
    pub fn cancel(&mut self) -> Result<(), Error> {
        self.cancel_token().cancel()
    }

    /// Drain buffered rows, fetching further pages internally, until `columns` becomes known or
    /// the query terminates.
    pub fn columns(&mut self) -> Result<Option<&[WireColumn]>, Error> {
        while self.columns.is_none() && !self.is_finished() && !self.is_cancelled() {
            let rows = self.fetch()?;
            self.pending_rows.extend(rows);
        }
        Ok(self.columns.as_deref())
    }

    /// A single-pass iterator over this query's rows, fetching further pages on demand.
    pub fn rows(&mut self) -> RowStream<'_> {
        RowStream { query: self, exhausted_initial: false }
    }
}

/// Forward-only row stream borrowing its [`Query`] mutably. Not restartable; concurrent
/// iteration by two consumers over the same `Query` is undefined.
pub struct RowStream<'q> {
    query: &'q mut Query,
    exhausted_initial: bool,
}

impl<'q> Iterator for RowStream<'q> {
    type Item = Result<Vec<Value>, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if !self.query.pending_rows.is_empty() {
                let raw = self.query.pending_rows.remove(0);
                return Some(self.convert(raw));
            }
            if !self.exhausted_initial {
                self.exhausted_initial = true;
            }
            if self.query.is_finished() {
                return None;
            }
            match self.query.fetch() {
                Ok(rows) => {
                    if rows.is_empty() && self.query.is_finished() {
                        return None;
                    }
                    self.query.pending_rows = rows;
                }
                Err(err) => return Some(Err(err)),
            }
        }
    }
}

impl<'q> RowStream<'q> {
    fn convert(&self, raw: Vec<Value>) -> Result<Vec<Value>, Error> {
        if !self.query.typed_output {
            return Ok(raw);
        }
        let Some(columns) = &self.query.columns else {
            return error::DataConversionSnafu {
                original_value: format!("{raw:?}"),
                target_type: "<unknown, columns not yet available>".to_string(),
            }
            .fail();
        };
        type_mapper::map_row(&raw, columns)
    }
}
