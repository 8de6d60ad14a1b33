use std::time::Duration;

use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions};
use tracing::{info, instrument, warn};

use crate::application::ports::RepositoryError;

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    pub max_connections: u32,
}

#[instrument(skip(config), fields(host = %config.host, database = %config.database))]
pub async fn create_pool(config: &DatabaseConfig) -> Result<MySqlPool, RepositoryError> {
    let options = MySqlConnectOptions::new()
        .host(&config.host)
        .port(config.port)
        .username(&config.user)
        .password(&config.password)
        .database(&config.database)
        .charset("utf8mb4");

    let mut retries = 5;
    let mut delay = Duration::from_millis(500);

    loop {
        match MySqlPoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options.clone())
            .await
        {
            Ok(pool) => {
                info!("MySQL connection pool established");
                return Ok(pool);
            }
            Err(e) if retries > 0 => {
                retries -= 1;
                warn!(
                    error = %e,
                    retries_left = retries,
                    delay_ms = delay.as_millis() as u64,
                    "MySQL connection failed, retrying"
                );
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
            Err(e) => {
                return Err(RepositoryError::ConnectionFailed(format!(
                    "{}:{}/{}: {}",
                    config.host, config.port, config.database, e
                )));
            }
        }
    }
}
