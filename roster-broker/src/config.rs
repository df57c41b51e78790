//! Broker configuration: embedded defaults plus a user override file.

use std::path::PathBuf;

use serde::Deserialize;

const DEFAULT_CONFIG: &str = include_str!("../config.toml");
const FALLBACK_LISTEN: &str = "127.0.0.1:1234";

#[derive(Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    broker: BrokerSection,
    #[serde(default, rename = "user")]
    users: Vec<SeedUser>,
}

#[derive(Deserialize, Default)]
struct BrokerSection {
    listen: Option<String>,
}

/// A user created (with password set) at broker startup.
#[derive(Deserialize, Clone)]
pub struct SeedUser {
    pub name: String,
    pub password: String,
}

pub struct Config {
    listen: String,
    users: Vec<SeedUser>,
}

impl Config {
    /// Load the embedded defaults, then merge the user's config file over
    /// them. A malformed user file is logged and ignored.
    pub fn load() -> Self {
        let mut base: ConfigFile =
            toml::from_str(DEFAULT_CONFIG).expect("Failed to parse embedded config.toml");

        if let Some(path) = user_config_path() {
            if path.exists() {
                match std::fs::read_to_string(&path) {
                    Ok(contents) => match toml::from_str::<ConfigFile>(&contents) {
                        Ok(user) => {
                            if user.broker.listen.is_some() {
                                base.broker.listen = user.broker.listen;
                            }
                            if !user.users.is_empty() {
                                base.users = user.users;
                            }
                        }
                        Err(e) => {
                            log::warn!("ignoring malformed config {}: {}", path.display(), e)
                        }
                    },
                    Err(e) => log::warn!("cannot read config {}: {}", path.display(), e),
                }
            }
        }

        Self {
            listen: base
                .broker
                .listen
                .unwrap_or_else(|| FALLBACK_LISTEN.to_string()),
            users: base.users,
        }
    }

    pub fn listen(&self) -> &str {
        &self.listen
    }

    pub fn users(&self) -> &[SeedUser] {
        &self.users
    }
}

fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("roster").join("config.toml"))
}
