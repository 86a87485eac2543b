use mongodb::{Client, Database, bson::doc};
use tokio::time::sleep;
use tracing::debug;

use super::{
    config::MongoConfig,
    error::{MongoDaoError, MongoResult},
};

/// Build a client for `config` and wait until its database answers a ping,
/// following `config.retry`.
pub async fn establish_connection(config: &MongoConfig) -> MongoResult<(Client, Database)> {
    let client = Client::with_options(config.options.clone())
        .map_err(|source| MongoDaoError::ClientConstruction { source })?;
    let database = client.database(&config.database_name);

    let mut delays = config.retry.delays();
    let mut attempts = 0;
    loop {
        attempts += 1;
        let err = match database.run_command(doc! { "ping": 1 }).await {
            Ok(_) => return Ok((client, database)),
            Err(err) => err,
        };

        let Some(delay) = delays.next() else {
            return Err(MongoDaoError::InitialPing {
                database: config.database_name.clone(),
                attempts,
                source: err,
            });
        };
        debug!(
            database = %config.database_name,
            attempts,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "MongoDB ping failed; retrying"
        );
        sleep(delay).await;
    }
}
