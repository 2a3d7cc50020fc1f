// src/config.rs

use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use dotenvy::dotenv;

/// Default retry bound for a conflicting transaction.
pub const DEFAULT_TX_MAX_ATTEMPTS: u32 = 5;

/// Default deadline for a whole transactional operation, retries included.
pub const DEFAULT_TX_TIMEOUT_MS: u64 = 5_000;

/// Which backing store the service runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: Option<String>,
    pub store_backend: StoreBackend,
    pub jwt_secret: String,
    pub port: u16,
    pub tx_max_attempts: u32,
    pub tx_timeout: Duration,
}

impl Config {
    /// Reads the configuration from the environment (and `.env`).
    ///
    /// Unknown or unparseable optional values fall back to their defaults with a warning,
    /// so the tracing subscriber should be installed before calling this.
    pub fn from_env() -> Self {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL").ok().filter(|url| !url.is_empty());
        let store_backend =
            parse_backend(env::var("STORE_BACKEND").ok().as_deref(), &database_url);

        let jwt_secret = env::var("JWT_SECRET").expect("JWT_SECRET must be set");

        Self {
            database_url,
            store_backend,
            jwt_secret,
            port: parse_or("PORT", 3000),
            tx_max_attempts: parse_or("TX_MAX_ATTEMPTS", DEFAULT_TX_MAX_ATTEMPTS),
            tx_timeout: Duration::from_millis(parse_or("TX_TIMEOUT_MS", DEFAULT_TX_TIMEOUT_MS)),
        }
    }
}

fn backend_for(database_url: &Option<String>) -> StoreBackend {
    if database_url.is_some() {
        StoreBackend::Postgres
    } else {
        StoreBackend::Memory
    }
}

fn parse_backend(raw: Option<&str>, database_url: &Option<String>) -> StoreBackend {
    match raw {
        Some("memory") => StoreBackend::Memory,
        Some("postgres") => StoreBackend::Postgres,
        Some(other) => {
            tracing::warn!("Unknown STORE_BACKEND '{}', picking from DATABASE_URL", other);
            backend_for(database_url)
        }
        None => backend_for(database_url),
    }
}

fn parse_or<T: FromStr + Copy + Display>(key: &str, default: T) -> T {
    parse_value(key, env::var(key).ok().as_deref(), default)
}

fn parse_value<T: FromStr + Copy + Display>(key: &str, raw: Option<&str>, default: T) -> T {
    match raw {
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid {} value '{}', using default {}", key, raw, default);
            default
        }),
        None => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Runs `f` under a subscriber that records formatted events.
    fn with_captured_logs<R>(f: impl FnOnce() -> R) -> (R, String) {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();

        let result = tracing::subscriber::with_default(subscriber, f);
        let text = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        (result, text)
    }

    #[test]
    fn test_invalid_number_falls_back_with_warning() {
        let (value, logs) =
            with_captured_logs(|| parse_value("TX_MAX_ATTEMPTS", Some("abc"), DEFAULT_TX_MAX_ATTEMPTS));

        assert_eq!(value, DEFAULT_TX_MAX_ATTEMPTS);
        assert!(logs.contains("WARN"));
        assert!(logs.contains("Invalid TX_MAX_ATTEMPTS value 'abc', using default 5"));
    }

    #[test]
    fn test_valid_and_missing_numbers_do_not_warn() {
        let ((parsed, missing), logs) = with_captured_logs(|| {
            (
                parse_value("TX_TIMEOUT_MS", Some("250"), DEFAULT_TX_TIMEOUT_MS),
                parse_value::<u16>("PORT", None, 3000),
            )
        });

        assert_eq!(parsed, 250);
        assert_eq!(missing, 3000);
        assert!(logs.is_empty());
    }

    #[test]
    fn test_unknown_backend_warns_and_follows_database_url() {
        let url = Some("postgres://localhost/exams".to_string());

        let (backend, logs) = with_captured_logs(|| parse_backend(Some("mongo"), &url));
        assert_eq!(backend, StoreBackend::Postgres);
        assert!(logs.contains("Unknown STORE_BACKEND 'mongo'"));

        assert_eq!(parse_backend(Some("mongo"), &None), StoreBackend::Memory);
        assert_eq!(parse_backend(Some("memory"), &url), StoreBackend::Memory);
        assert_eq!(parse_backend(None, &None), StoreBackend::Memory);
    }
}
