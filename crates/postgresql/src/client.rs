//! PostgreSQL client creation.

use reconcile::{ReconcileError, Result};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_postgres::{Client, Config, NoTls};
use tracing::{error, info};

/// Shared handle to one connection.
///
/// Readers lock it per query. A writer holds the lock from `BEGIN` until
/// `COMMIT` or `ROLLBACK` so no other statement lands inside its transaction.
pub type SharedClient = Arc<Mutex<Client>>;

/// Connect to `uri`, replacing its database name with `database` if given.
pub async fn new_postgresql_client(uri: &str, database: Option<&str>) -> Result<SharedClient> {
    let mut config: Config = uri
        .parse()
        .map_err(|e| ReconcileError::Configuration(format!("invalid connection string: {e}")))?;
    if let Some(database) = database {
        config.dbname(database);
    }

    let (client, connection) = config
        .connect(NoTls)
        .await
        .map_err(|e| ReconcileError::io("connect", e))?;

    tokio::spawn(async move {
        if let Err(e) = connection.await {
            error!("PostgreSQL connection error: {e}");
        }
    });

    info!(
        "Connected to PostgreSQL database {}",
        config.get_dbname().unwrap_or("<default>")
    );
    Ok(Arc::new(Mutex::new(client)))
}
