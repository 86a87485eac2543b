use std::time::Duration;

use mongodb::options::ClientOptions;

use super::error::{MongoDaoError, MongoResult};

/// URI used when `MONGO_URI` is unset.
pub const DEFAULT_URI: &str = "mongodb://localhost:27017";
const DEFAULT_DATABASE: &str = "dues_back";
const APP_NAME: &str = "dues-back";
/// Server selection stays short; the storage supervisor owns long-term retrying.
const SERVER_SELECTION_TIMEOUT: Duration = Duration::from_secs(5);

/// Ping retries performed while opening a connection, before the store reports failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectRetry {
    /// Pings attempted, at least one.
    pub attempts: u32,
    /// Wait after the first failed ping.
    pub initial_delay: Duration,
    /// Ceiling of the doubling wait.
    pub max_delay: Duration,
}

impl ConnectRetry {
    /// Waits between consecutive attempts; one fewer than `attempts`.
    pub fn delays(&self) -> impl Iterator<Item = Duration> + use<> {
        let max_delay = self.max_delay;
        let mut next = self.initial_delay.min(max_delay);
        (1..self.attempts.max(1)).map(move |_| {
            let current = next;
            next = (next * 2).min(max_delay);
            current
        })
    }
}

impl Default for ConnectRetry {
    fn default() -> Self {
        Self {
            attempts: 3,
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(2),
        }
    }
}

/// Parsed connection settings for the MongoDB backend.
#[derive(Clone)]
pub struct MongoConfig {
    /// Driver options parsed from the connection URI.
    pub options: ClientOptions,
    /// Database holding the payment and player collections.
    pub database_name: String,
    /// Ping retries when (re)connecting.
    pub retry: ConnectRetry,
}

impl MongoConfig {
    /// Parse `uri`, using `db_name` or the default database.
    ///
    /// The application name and server selection timeout are filled in unless
    /// the URI sets them.
    pub async fn from_uri(uri: &str, db_name: Option<&str>) -> MongoResult<Self> {
        let mut options =
            ClientOptions::parse(uri)
                .await
                .map_err(|source| MongoDaoError::InvalidUri {
                    uri: uri.to_owned(),
                    source,
                })?;
        options.app_name.get_or_insert_with(|| APP_NAME.to_owned());
        options
            .server_selection_timeout
            .get_or_insert(SERVER_SELECTION_TIMEOUT);

        Ok(Self {
            options,
            database_name: db_name
                .filter(|name| !name.is_empty())
                .unwrap_or(DEFAULT_DATABASE)
                .to_owned(),
            retry: ConnectRetry::default(),
        })
    }

    /// Read `MONGO_URI` (default [`DEFAULT_URI`]) and `MONGO_DB`.
    pub async fn from_env() -> MongoResult<Self> {
        let uri = std::env::var("MONGO_URI").unwrap_or_else(|_| DEFAULT_URI.to_owned());
        let db = std::env::var("MONGO_DB").ok();
        Self::from_uri(&uri, db.as_deref()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_delays_double_up_to_the_ceiling() {
        let retry = ConnectRetry {
            attempts: 5,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_millis(1_500),
        };
        let delays: Vec<u128> = retry.delays().map(|d| d.as_millis()).collect();
        assert_eq!(delays, [500, 1_000, 1_500, 1_500]);
    }

    #[test]
    fn a_single_attempt_never_waits() {
        let retry = ConnectRetry {
            attempts: 0,
            ..ConnectRetry::default()
        };
        assert_eq!(retry.delays().count(), 0);
    }

    #[tokio::test]
    async fn uri_defaults_are_filled_in() {
        let config = MongoConfig::from_uri(DEFAULT_URI, Some("")).await.unwrap();
        assert_eq!(config.database_name, DEFAULT_DATABASE);
        assert_eq!(config.options.app_name.as_deref(), Some(APP_NAME));
        assert_eq!(
            config.options.server_selection_timeout,
            Some(SERVER_SELECTION_TIMEOUT)
        );

        let named = MongoConfig::from_uri("mongodb://db:27017/?appName=other", Some("club"))
            .await
            .unwrap();
        assert_eq!(named.database_name, "club");
        assert_eq!(named.options.app_name.as_deref(), Some("other"));
    }
}
