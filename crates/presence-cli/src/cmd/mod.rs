pub mod config;
pub mod serve;
pub mod state;
pub mod sweep;
pub mod user;

use anyhow::Context;
use chrono::{DateTime, Utc};
use presence_core::db::PresenceDb;
use presence_core::PresenceTracker;
use presence_server::ServerConfig;
use std::path::PathBuf;

/// Where the database and tunables live, from the global flags.
pub struct Store {
    pub db: PathBuf,
    pub config: Option<PathBuf>,
}

impl Store {
    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            db_path: self.db.clone(),
            config_path: self.config.clone(),
            cron_secret: None,
            sweep_interval: None,
        }
    }

    pub fn tracker(&self) -> anyhow::Result<PresenceTracker> {
        presence_server::open_tracker(&self.server_config())
    }

    pub fn db(&self) -> anyhow::Result<PresenceDb> {
        PresenceDb::open(&self.db).with_context(|| format!("opening database {}", self.db.display()))
    }
}

/// Parse an `--at` override, defaulting to now.
pub fn instant(at: Option<&str>) -> anyhow::Result<DateTime<Utc>> {
    match at {
        None => Ok(Utc::now()),
        Some(s) => Ok(DateTime::parse_from_rfc3339(s)
            .with_context(|| format!("invalid --at '{s}': expected RFC 3339"))?
            .with_timezone(&Utc)),
    }
}
