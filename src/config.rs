use std::{env, fmt::Display, str::FromStr, time::Duration};

/// AppConfig
///
/// Holds the application's entire configuration state. Immutable once loaded and pulled
/// into handlers and middleware via `FromRef`.
#[derive(Clone, Debug)]
pub struct AppConfig {
    // Runtime environment marker. Controls the persistence fallback and cookie hardening.
    pub env: Env,
    // Postgres connection string. Optional locally, where the in-memory store stands in.
    pub db_url: Option<String>,
    // Socket address the HTTP server binds to.
    pub bind_addr: String,
    // Name of the cookie carrying the session token.
    pub session_cookie: String,
    // Sessions older than this resolve as absent. None keeps them for the process lifetime.
    pub session_ttl: Option<Duration>,
    // Deadline for one request, persistence calls included.
    pub request_timeout: Duration,
    // Reject ballots outside the voting's [start_time, end_time] window.
    pub enforce_voting_window: bool,
    // Local in-memory mode only: an admin provisioned at startup.
    pub local_admin: Option<(String, String)>,
}

/// Env
///
/// The runtime context: local development or hardened production.
#[derive(Clone, PartialEq, Debug)]
pub enum Env {
    Local,
    Production,
}

impl Default for AppConfig {
    /// Safe values for test setup, independent of the process environment.
    fn default() -> Self {
        Self {
            env: Env::Local,
            db_url: None,
            bind_addr: "127.0.0.1:9080".to_string(),
            session_cookie: "session".to_string(),
            session_ttl: None,
            request_timeout: Duration::from_secs(10),
            enforce_voting_window: false,
            local_admin: None,
        }
    }
}

impl AppConfig {
    /// load
    ///
    /// Reads every parameter from environment variables, fail-fast.
    ///
    /// # Panics
    /// Panics if `DATABASE_URL` is missing in production, or if a numeric/boolean variable
    /// cannot be parsed.
    pub fn load() -> Self {
        let env = match env::var("APP_ENV").as_deref() {
            Ok("production") => Env::Production,
            _ => Env::Local,
        };

        let db_url = match env {
            Env::Production => Some(
                env::var("DATABASE_URL").expect("FATAL: DATABASE_URL required in production"),
            ),
            Env::Local => env::var("DATABASE_URL").ok(),
        };

        // Only honoured by the in-memory store.
        let local_admin = match (&env, &db_url) {
            (Env::Local, None) => env::var("LOCAL_ADMIN_LOGIN")
                .ok()
                .zip(env::var("LOCAL_ADMIN_PASSWORD").ok()),
            _ => None,
        };

        Self {
            env,
            db_url,
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:9080".to_string()),
            session_cookie: env::var("SESSION_COOKIE").unwrap_or_else(|_| "session".to_string()),
            session_ttl: optional::<u64>("SESSION_TTL_SECS").map(Duration::from_secs),
            request_timeout: Duration::from_secs(
                optional::<u64>("REQUEST_TIMEOUT_SECS").unwrap_or(10),
            ),
            enforce_voting_window: optional::<bool>("ENFORCE_VOTING_WINDOW").unwrap_or(false),
            local_admin,
        }
    }
}

fn optional<T: FromStr>(key: &str) -> Option<T>
where
    T::Err: Display,
{
    env::var(key).ok().map(|raw| {
        raw.trim()
            .parse()
            .unwrap_or_else(|e| panic!("FATAL: invalid {key} value `{raw}`: {e}"))
    })
}
