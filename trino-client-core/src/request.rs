//! The request layer: URL construction, header assembly, retry policy, and redirect handling.
//! Owns the underlying blocking HTTP client and the [`ClientSession`] mutated on every response.

use std::env;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use reqwest::blocking::{Client, Response};
use reqwest::header::HeaderMap as ReqwestHeaderMap;
use reqwest::StatusCode;
use snafu::{OptionExt, ResultExt};
use tracing::{debug, info, instrument};
use url::Url;

use crate::auth::Auth;
use crate::client_session::ClientSession;
use crate::error::{
    self, DecodeResponseSnafu, Http503Snafu, Http504Snafu, HttpSnafu, InvalidExtraCredentialKeySnafu,
    InvalidHeaderValueSnafu, MissingRedirectLocationSnafu, ReservedHeaderCollisionSnafu,
    TransportSnafu, TrinoExternalSnafu, TrinoQuerySnafu, TrinoUserSnafu, UrlParseSnafu,
};
use crate::header_codec;
use crate::redirect::RedirectHandler;
use crate::wire::{Status, WireResponse};

type Error = error::Error;

const DEFAULT_TLS_PORT: u16 = 443;

/// The coordinator scheme a [`RequestLayer`] talks to. Chosen explicitly by the caller, or
/// inferred from the port (HTTPS when it matches the configured default TLS port).
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    fn as_str(self) -> &'static str {
        self.into()
    }
}

pub struct RequestLayerBuilder {
    host: String,
    port: u16,
    scheme: Option<Scheme>,
    session: ClientSession,
    auth: Option<Box<dyn Auth>>,
    redirect_handler: Option<Box<dyn RedirectHandler>>,
    max_attempts: u32,
    request_timeout: Duration,
    http_client: Option<Client>,
}

impl RequestLayerBuilder {
    pub fn new(host: impl Into<String>, port: u16, user: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            scheme: None,
            session: ClientSession::new(user),
            auth: None,
            redirect_handler: None,
            max_attempts: 3,
            request_timeout: Duration::from_secs(30),
            http_client: None,
        }
    }

    pub fn scheme(mut self, scheme: Scheme) -> Self {
        self.scheme = Some(scheme);
        self
    }

    pub fn session(mut self, session: ClientSession) -> Self {
        self.session = session;
        self
    }

    pub fn auth(mut self, auth: Box<dyn Auth>) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn redirect_handler(mut self, handler: Box<dyn RedirectHandler>) -> Self {
        self.redirect_handler = Some(handler);
        self
    }

    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Inject a pre-built client, bypassing this builder's own construction (used by tests to
    /// point at an `httpmock` server without touching `SOCKS_PROXY`/TLS settings).
    pub fn http_client(mut self, client: Client) -> Self {
        self.http_client = Some(client);
        self
    }

    #[instrument(skip(self), fields(host = %self.host, port = self.port))]
    pub fn build(self) -> Result<RequestLayer, Error> {
        let resolved_scheme = self.scheme.unwrap_or(if self.port == DEFAULT_TLS_PORT {
            Scheme::Https
        } else {
            Scheme::Http
        });

        if self.auth.is_some() && resolved_scheme != Scheme::Https {
            return error::AuthRequiresHttpsSnafu.fail();
        }

        header_codec::validate_custom_headers(&self.session.headers)
            .map_err(map_header_codec_error)?;

        let client = match self.http_client {
            Some(client) => client,
            None => {
                let mut builder = Client::builder().timeout(self.request_timeout);
                if self.redirect_handler.is_some() {
                    builder = builder.redirect(reqwest::redirect::Policy::none());
                }
                if let Some(auth) = &self.auth {
                    builder = auth.attach_to_http_client(builder);
                }
                if let Ok(proxy_host) = env::var("SOCKS_PROXY") {
                    let proxy_url = format!("socks5://{proxy_host}");
                    let proxy = reqwest::Proxy::all(&proxy_url).context(error::ConfigureProxySnafu)?;
                    builder = builder.proxy(proxy);
                }
                builder.build().context(error::ConstructHttpClientSnafu)?
            }
        };

        let retry_policy = crate::retry::RetryPolicy::new(self.max_attempts)
            .unwrap_or_else(|_| crate::retry::RetryPolicy::new(1).expect("1 is a valid budget"));

        Ok(RequestLayer {
            host: self.host,
            port: self.port,
            scheme: resolved_scheme,
            client,
            session: Arc::new(Mutex::new(self.session)),
            auth: self.auth,
            redirect_handler: self.redirect_handler,
            retry_policy,
        })
    }
}

/// Builds and dispatches POST/GET/DELETE calls against a Trino coordinator and maintains the
/// [`ClientSession`] shared across them. Meant to be owned by a single [`crate::query::Query`]
/// at a time; concurrent queries sharing one layer race on session mutation.
pub struct RequestLayer {
    host: String,
    port: u16,
    scheme: Scheme,
    client: Client,
    session: Arc<Mutex<ClientSession>>,
    auth: Option<Box<dyn Auth>>,
    redirect_handler: Option<Box<dyn RedirectHandler>>,
    retry_policy: crate::retry::RetryPolicy,
}

impl RequestLayer {
    pub fn statement_url(&self) -> String {
        format!("{}://{}:{}/v1/statement", self.scheme.as_str(), self.host, self.port)
    }

    pub fn query_url(&self, query_id: &str) -> String {
        format!("{}://{}:{}/v1/query/{}", self.scheme.as_str(), self.host, self.port, query_id)
    }

    pub fn session(&self) -> Arc<Mutex<ClientSession>> {
        Arc::clone(&self.session)
    }

    fn outbound_headers(&self, extra_headers: Option<&ReqwestHeaderMap>) -> Result<ReqwestHeaderMap, Error> {
        let session = self.session.lock().expect("session mutex poisoned");
        let mut headers = header_codec::encode(&session).map_err(map_header_codec_error)?;
        if let Some(auth) = &self.auth {
            if let Some(value) = auth.authorization_header() {
                headers.insert(reqwest::header::AUTHORIZATION, value);
            }
        }
        if let Some(extra) = extra_headers {
            for (name, value) in extra.iter() {
                headers.insert(name.clone(), value.clone());
            }
        }
        Ok(headers)
    }

    /// POST the statement. Returns the decoded first page and that response's headers so the
    /// caller (`Query::execute`) can capture `info_uri` etc. before any later page arrives.
    #[instrument(skip(self, sql, extra_headers), fields(url = %self.statement_url()))]
    pub fn post(
        &self,
        sql: &str,
        extra_headers: Option<&ReqwestHeaderMap>,
    ) -> Result<(Status, ReqwestHeaderMap), Error> {
        let url = self.statement_url();
        let headers = self.outbound_headers(extra_headers)?;
        self.retry_policy.call(self.auth.as_deref(), || {
            let response = self
                .client
                .post(&url)
                .headers(headers.clone())
                .body(sql.to_string())
                .send()
                .context(TransportSnafu)?;
            self.dispatch_post(response, sql)
        })
    }

    /// Walk every redirect hop, resubmitting the POST body at each rewritten location. Only
    /// invoked when a redirect handler is installed; in that case the underlying client is
    /// built with redirect-following disabled, so every hop reaches here rather than being
    /// resolved transparently by reqwest.
    fn dispatch_post(&self, response: Response, sql: &str) -> Result<(Status, ReqwestHeaderMap), Error> {
        let Some(handler) = &self.redirect_handler else {
            return self.process(response);
        };

        let mut response = response;
        while response.status().is_redirection() {
            let location = response
                .headers()
                .get(reqwest::header::LOCATION)
                .and_then(|v| v.to_str().ok())
                .context(MissingRedirectLocationSnafu)?;
            let location_url = Url::parse(location).context(UrlParseSnafu)?;
            let rewritten = handler.handle(&location_url);
            info!(to = %rewritten, "following redirect");
            let headers = self.outbound_headers(None)?;
            response = self
                .client
                .post(rewritten.as_str())
                .headers(headers)
                .body(sql.to_string())
                .send()
                .context(TransportSnafu)?;
        }
        self.process(response)
    }

    #[instrument(skip(self), fields(%url))]
    pub fn get(&self, url: &str) -> Result<(Status, ReqwestHeaderMap), Error> {
        let headers = self.outbound_headers(None)?;
        self.retry_policy.call(self.auth.as_deref(), || {
            let response = self
                .client
                .get(url)
                .headers(headers.clone())
                .send()
                .context(TransportSnafu)?;
            self.process(response)
        })
    }

    #[instrument(skip(self), fields(%url))]
    pub fn delete(&self, url: &str) -> Result<StatusCode, Error> {
        let headers = self.outbound_headers(None)?;
        self.retry_policy.call(self.auth.as_deref(), || {
            let response = self
                .client
                .delete(url)
                .headers(headers.clone())
                .send()
                .context(TransportSnafu)?;
            Ok(response.status())
        })
    }

    /// Decode one response into a [`Status`]. Response headers are read before `.json()`
    /// consumes the body, but inbound directive headers are only folded into the session once
    /// the response is confirmed not to carry an `error` envelope — an error response must not
    /// mutate session state even if it happens to carry `Set-Session`/`Clear-Session`.
    #[instrument(skip(self, response))]
    fn process(&self, response: Response) -> Result<(Status, ReqwestHeaderMap), Error> {
        let status_code = response.status();
        if !status_code.is_success() {
            return Err(raise_response_error(status_code, response));
        }

        let response_headers = response.headers().clone();
        let body: WireResponse = response.json().context(DecodeResponseSnafu)?;
        debug!(query_id = %body.id, has_next_uri = body.next_uri.is_some(), "decoded response envelope");

        if let Some(wire_error) = &body.error {
            let query_id = Some(body.id.clone());
            let message = wire_error.message.clone();
            return Err(match wire_error.error_type.as_str() {
                "EXTERNAL" => TrinoExternalSnafu { query_id, message }.build(),
                "USER_ERROR" => TrinoUserSnafu { query_id, message }.build(),
                _ => TrinoQuerySnafu { query_id, message }.build(),
            });
        }

        {
            let mut session = self.session.lock().expect("session mutex poisoned");
            header_codec::apply_response_headers(&mut session, &response_headers);
        }

        Ok((body.into(), response_headers))
    }
}

fn raise_response_error(status: StatusCode, response: Response) -> Error {
    match status {
        StatusCode::SERVICE_UNAVAILABLE => Http503Snafu.build(),
        StatusCode::GATEWAY_TIMEOUT => Http504Snafu.build(),
        _ => {
            let body_excerpt = response.text().ok().map(|text| text.chars().take(200).collect());
            HttpSnafu { status, body_excerpt }.build()
        }
    }
}

fn map_header_codec_error(source: header_codec::Error) -> Error {
    match source {
        header_codec::Error::InvalidExtraCredentialKey { key } => {
            InvalidExtraCredentialKeySnafu { key }.build()
        }
        header_codec::Error::ReservedHeaderCollision { header } => {
            ReservedHeaderCollisionSnafu { header }.build()
        }
        header_codec::Error::InvalidHeaderValue { header, source } => {
            InvalidHeaderValueSnafu { header, value: source.to_string() }.build()
        }
    }
}
