//! Core client library for speaking the Trino coordinator's statement HTTP protocol: submit a
//! SQL statement, page through `nextUri` until the query terminates, stream rows lazily, and
//! keep a mutating session (catalog/schema/properties/transaction/extra credentials) correctly
//! threaded through every request via response header directives.
//!
//! This crate is deliberately synchronous (see [`request`]'s module docs): one blocking HTTP
//! call per page, driven from the calling thread. It does not parse SQL, plan queries, or pool
//! connections beyond the one `reqwest::blocking::Client` a [`request::RequestLayer`] owns.

pub mod auth;
pub mod client_session;
pub mod error;
pub mod header_codec;
pub mod query;
pub mod redirect;
pub mod request;
pub mod retry;
pub mod sanitization;
pub mod type_mapper;
pub mod wire;

pub use client_session::ClientSession;
pub use error::Error;
pub use query::{CancelToken, Query, RowStream};
pub use request::{RequestLayer, RequestLayerBuilder, Scheme};
