use color_eyre::eyre::{eyre, Report};
use std::{env, fmt::Display, str::FromStr};
use tracing::{info, warn};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// Postgres connection string. Without it the server keeps everything in
    /// memory.
    pub database_url: Option<String>,
    pub bind_address: String,
    pub max_connections: u32,
    /// Reject ballots outside `[publish_at, close_at)`.
    pub enforce_voting_window: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, Report> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, Report>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL").filter(|url| !url.is_empty());
        if database_url.is_none() {
            warn!("DATABASE_URL not set, polls will only be kept in memory");
        }
        Ok(Self {
            database_url,
            bind_address: try_load(&lookup, "BIND_ADDRESS", "127.0.0.1:8080")?,
            max_connections: try_load(&lookup, "DATABASE_MAX_CONNECTIONS", "5")?,
            enforce_voting_window: try_load(&lookup, "POLLS_ENFORCE_VOTING_WINDOW", "true")?,
        })
    }
}

fn try_load<F, T>(lookup: &F, key: &str, default: &str) -> Result<T, Report>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display,
{
    let value = lookup(key).unwrap_or_else(|| {
        info!("{key} not set, using default: {default}");
        default.to_owned()
    });
    value
        .parse()
        .map_err(|e| eyre!("Invalid {key} value {value:?}: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, Report> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(
            config,
            Config {
                database_url: None,
                bind_address: "127.0.0.1:8080".to_owned(),
                max_connections: 5,
                enforce_voting_window: true,
            }
        );
    }

    #[test]
    fn reads_overrides() {
        let config = load(&[
            ("DATABASE_URL", "postgres://localhost/polls"),
            ("POLLS_ENFORCE_VOTING_WINDOW", "false"),
            ("DATABASE_MAX_CONNECTIONS", "12"),
        ])
        .unwrap();
        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/polls"));
        assert!(!config.enforce_voting_window);
        assert_eq!(config.max_connections, 12);
    }

    #[test]
    fn rejects_malformed_values() {
        assert!(load(&[("POLLS_ENFORCE_VOTING_WINDOW", "sometimes")]).is_err());
        assert!(load(&[("DATABASE_MAX_CONNECTIONS", "-1")]).is_err());
    }
}
