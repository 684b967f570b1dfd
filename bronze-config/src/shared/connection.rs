use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use sqlx::postgres::PgConnectOptions;

use crate::Config;

/// Application name reported to Postgres by ingestion connections.
const APP_NAME_INGESTOR: &str = "bronze_ingestor";

/// Connection settings for the destination Postgres instance.
///
/// This intentionally does not implement `Serialize` to avoid accidentally leaking the
/// password into serialized forms.
#[derive(Debug, Clone, Deserialize)]
pub struct PgConnectionConfig {
    pub host: String,
    pub port: u16,
    /// Database name.
    pub name: String,
    pub username: String,
    pub password: Option<SecretString>,
}

impl Config for PgConnectionConfig {
    const LIST_PARSE_KEYS: &'static [&'static str] = &[];
}

impl PgConnectionConfig {
    /// Builds sqlx connect options targeting the configured database.
    pub fn with_db(&self) -> PgConnectOptions {
        let mut options = PgConnectOptions::new_without_pgpass()
            .host(&self.host)
            .port(self.port)
            .database(&self.name)
            .username(&self.username)
            .application_name(APP_NAME_INGESTOR);

        if let Some(password) = &self.password {
            options = options.password(password.expose_secret());
        }

        options
    }
}
