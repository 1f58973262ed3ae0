//! Redirect handler capability. When installed, `RequestLayer` disables the underlying HTTP
//! client's automatic redirect-following and walks `Location` headers itself, giving the
//! handler a chance to rewrite each hop (e.g. a load balancer rewriting to an internal host).

use url::Url;

pub trait RedirectHandler: std::fmt::Debug + Send + Sync {
    fn handle(&self, location: &Url) -> Url;
}

/// Passes the `Location` URL through unchanged; useful as a default when a caller wants manual
/// redirect walking without any rewriting.
#[derive(Debug, Default)]
pub struct IdentityRedirectHandler;

impl RedirectHandler for IdentityRedirectHandler {
    fn handle(&self, location: &Url) -> Url {
        location.clone()
    }
}
