//! Exponential-backoff retry wrapper around transport calls. `max_attempts` is an explicit,
//! visible parameter on the policy rather than something callers rebind closures around.

use std::thread;
use std::time::Duration;

use snafu::Snafu;
use tracing::warn;

use crate::auth::Auth;
use crate::error::Error;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_delay: Duration,
    multiplier: f64,
    max_delay: Option<Duration>,
}

#[derive(Debug, Snafu)]
pub enum ConfigError {
    #[snafu(display("max_attempts must be at least 1, got {max_attempts}"))]
    ZeroAttempts { max_attempts: u32 },
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Result<Self, ConfigError> {
        if max_attempts == 0 {
            return ZeroAttemptsSnafu { max_attempts }.fail();
        }
        Ok(Self {
            max_attempts,
            initial_delay: Duration::from_millis(100),
            multiplier: 2.0,
            max_delay: Some(Duration::from_secs(10)),
        })
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    pub fn with_max_delay(mut self, max_delay: Option<Duration>) -> Self {
        self.max_delay = max_delay;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Run `attempt`, retrying while it returns a retryable [`Error`] and attempts remain.
    /// Sleeps between attempts; never sleeps after the final one. `auth`, when installed, gets
    /// a say in whether an otherwise-unclassified error is transient (see
    /// [`Auth::is_transient_error`]).
    pub fn call<T>(
        &self,
        auth: Option<&dyn Auth>,
        mut attempt: impl FnMut() -> Result<T, Error>,
    ) -> Result<T, Error> {
        let mut delay = self.initial_delay;
        for attempt_number in 1..=self.max_attempts {
            match attempt() {
                Ok(value) => return Ok(value),
                Err(err) if is_retryable(&err, auth) && attempt_number < self.max_attempts => {
                    warn!(attempt_number, max_attempts = self.max_attempts, error = %err, "retrying after transient failure");
                    thread::sleep(delay);
                    let next = delay.mul_f64(self.multiplier);
                    delay = match self.max_delay {
                        Some(cap) if next > cap => cap,
                        _ => next,
                    };
                }
                Err(err) => return Err(err),
            }
        }
        unreachable!("loop always returns on the final iteration")
    }
}

fn is_retryable(err: &Error, auth: Option<&dyn Auth>) -> bool {
    if matches!(err, Error::Transport { .. } | Error::Http503 | Error::Http504) {
        return true;
    }
    if let (Error::DecodeResponse { source }, Some(auth)) = (err, auth) {
        return auth.is_transient_error(source);
    }
    false
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    #[test]
    fn retries_until_success_within_budget() {
        let policy = RetryPolicy::new(3)
            .unwrap()
            .with_initial_delay(Duration::from_millis(1));
        let attempts = Cell::new(0);

        let result = policy.call(None, || {
            attempts.set(attempts.get() + 1);
            if attempts.get() < 3 {
                Err(Error::Http503)
            } else {
                Ok("ok")
            }
        });

        assert_eq!(result.unwrap(), "ok");
        assert_eq!(attempts.get(), 3);
    }

    #[test]
    fn exhausts_exactly_max_attempts_on_persistent_failure() {
        let policy = RetryPolicy::new(3)
            .unwrap()
            .with_initial_delay(Duration::from_millis(1));
        let attempts = Cell::new(0);

        let result = policy.call(None, || {
            attempts.set(attempts.get() + 1);
            Err::<(), _>(Error::Http503)
        });

        assert!(result.is_err());
        assert_eq!(attempts.get(), 3);
    }

    #[test]
    fn non_retryable_error_stops_immediately() {
        let policy = RetryPolicy::new(5)
            .unwrap()
            .with_initial_delay(Duration::from_millis(1));
        let attempts = Cell::new(0);

        let result = policy.call(None, || {
            attempts.set(attempts.get() + 1);
            Err::<(), _>(Error::AuthRequiresHttps)
        });

        assert!(result.is_err());
        assert_eq!(attempts.get(), 1);
    }

    #[test]
    fn zero_max_attempts_is_rejected() {
        assert!(matches!(RetryPolicy::new(0), Err(ConfigError::ZeroAttempts { .. })));
    }

    #[derive(Debug)]
    struct AlwaysTransientAuth;

    impl Auth for AlwaysTransientAuth {
        fn is_transient_error(&self, _error: &reqwest::Error) -> bool {
            true
        }
    }

    #[test]
    fn installed_auth_can_mark_an_otherwise_unclassified_error_transient() {
        let policy = RetryPolicy::new(3)
            .unwrap()
            .with_initial_delay(Duration::from_millis(1));
        let attempts = Cell::new(0);
        let auth: Box<dyn Auth> = Box::new(AlwaysTransientAuth);

        let result = policy.call(Some(auth.as_ref()), || {
            attempts.set(attempts.get() + 1);
            if attempts.get() < 2 {
                let source = reqwest::blocking::Client::new()
                    .get("not a url")
                    .build()
                    .unwrap_err();
                Err(Error::DecodeResponse { source })
            } else {
                Ok("ok")
            }
        });

        assert_eq!(result.unwrap(), "ok");
        assert_eq!(attempts.get(), 2);
    }

    #[test]
    fn decode_error_without_auth_is_not_retried() {
        let policy = RetryPolicy::new(3)
            .unwrap()
            .with_initial_delay(Duration::from_millis(1));
        let attempts = Cell::new(0);

        let result = policy.call(None, || {
            attempts.set(attempts.get() + 1);
            let source = reqwest::blocking::Client::new()
                .get("not a url")
                .build()
                .unwrap_err();
            Err::<(), _>(Error::DecodeResponse { source })
        });

        assert!(result.is_err());
        assert_eq!(attempts.get(), 1);
    }
}
