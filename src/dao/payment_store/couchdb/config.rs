use std::time::Duration;

use super::error::{CouchDaoError, CouchResult};

/// Server used when `COUCH_BASE_URL` is unset.
pub const DEFAULT_BASE_URL: &str = "http://localhost:5984";
/// Database used when `COUCH_DB` is unset.
pub const DEFAULT_DATABASE: &str = "dues_back";
/// Per-request timeout used when `COUCH_TIMEOUT_SECS` is unset.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Basic-auth pair sent with every request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CouchCredentials {
    /// Basic-auth user.
    pub username: String,
    /// Basic-auth password.
    pub password: String,
}

/// Where the payment and player documents live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CouchConfig {
    /// Server root without a trailing slash.
    pub base_url: String,
    /// Database holding payment and player documents.
    pub database: String,
    /// Optional basic auth.
    pub credentials: Option<CouchCredentials>,
    /// Upper bound for a single HTTP request.
    pub request_timeout: Duration,
}

impl CouchConfig {
    /// Target `database` on `base_url`; fails when CouchDB would reject the name.
    pub fn new(base_url: impl Into<String>, database: impl Into<String>) -> CouchResult<Self> {
        let database = database.into();
        if !is_valid_database_name(&database) {
            return Err(CouchDaoError::InvalidDatabaseName { database });
        }

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            database,
            credentials: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        })
    }

    /// Attach basic-auth credentials.
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.credentials = Some(CouchCredentials {
            username: username.into(),
            password: password.into(),
        });
        self
    }

    /// Read `COUCH_BASE_URL`, `COUCH_DB`, `COUCH_TIMEOUT_SECS` and the
    /// `COUCH_USERNAME` / `COUCH_PASSWORD` pair, defaulting to a local server.
    pub fn from_env() -> CouchResult<Self> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> CouchResult<Self> {
        let base_url = lookup("COUCH_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_owned());
        let database = lookup("COUCH_DB").unwrap_or_else(|| DEFAULT_DATABASE.to_owned());
        let mut config = Self::new(base_url, database)?;

        if let Some(secs) = lookup("COUCH_TIMEOUT_SECS") {
            let secs = secs
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .ok_or(CouchDaoError::InvalidEnvVar {
                    var: "COUCH_TIMEOUT_SECS",
                    value: secs,
                })?;
            config.request_timeout = Duration::from_secs(secs);
        }

        match (lookup("COUCH_USERNAME"), lookup("COUCH_PASSWORD")) {
            (Some(username), Some(password)) => Ok(config.with_credentials(username, password)),
            (None, None) => Ok(config),
            (Some(_), None) => Err(CouchDaoError::MissingEnvVar {
                var: "COUCH_PASSWORD",
            }),
            (None, Some(_)) => Err(CouchDaoError::MissingEnvVar {
                var: "COUCH_USERNAME",
            }),
        }
    }
}

/// CouchDB database names start with a lowercase letter and use `[a-z0-9_$()+-/]`.
fn is_valid_database_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next().is_some_and(|first| first.is_ascii_lowercase())
        && chars.all(|c| {
            c.is_ascii_lowercase() || c.is_ascii_digit() || "_$()+-/".contains(c)
        })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| vars.get(var).cloned()
    }

    #[test]
    fn defaults_target_a_local_dues_database() {
        let config = CouchConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.database, DEFAULT_DATABASE);
        assert_eq!(config.credentials, None);
        assert_eq!(config.request_timeout, DEFAULT_REQUEST_TIMEOUT);
    }

    #[test]
    fn environment_overrides_are_applied() {
        let config = CouchConfig::from_lookup(lookup(&[
            ("COUCH_BASE_URL", "https://couch.example.org/"),
            ("COUCH_DB", "club_dues"),
            ("COUCH_TIMEOUT_SECS", "3"),
            ("COUCH_USERNAME", "admin"),
            ("COUCH_PASSWORD", "secret"),
        ]))
        .unwrap();

        assert_eq!(config.base_url, "https://couch.example.org");
        assert_eq!(config.database, "club_dues");
        assert_eq!(config.request_timeout, Duration::from_secs(3));
        assert_eq!(config.credentials.unwrap().username, "admin");
    }

    #[test]
    fn half_a_credential_pair_is_rejected() {
        let err = CouchConfig::from_lookup(lookup(&[("COUCH_USERNAME", "admin")])).unwrap_err();
        assert!(matches!(
            err,
            CouchDaoError::MissingEnvVar {
                var: "COUCH_PASSWORD"
            }
        ));
    }

    #[test]
    fn bad_names_and_timeouts_are_rejected() {
        assert!(matches!(
            CouchConfig::new(DEFAULT_BASE_URL, "Dues"),
            Err(CouchDaoError::InvalidDatabaseName { .. })
        ));
        assert!(matches!(
            CouchConfig::from_lookup(lookup(&[("COUCH_TIMEOUT_SECS", "0")])),
            Err(CouchDaoError::InvalidEnvVar { .. })
        ));
    }
}
