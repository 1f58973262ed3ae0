pub trait Sanitize {
    fn sanitize(&self) -> Self;
}

impl Sanitize for http::HeaderMap {
    fn sanitize(&self) -> Self {
        let mut sanitized = self.clone();
        for name in ["authorization", "x-trino-extra-credential"] {
            if let Some(value) = sanitized.get_mut(name) {
                *value = http::HeaderValue::from_static("<redacted>");
            }
        }
        sanitized
    }
}
