use anyhow::{bail, Result};
use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,
    pub database_max_connections: u32,
    pub port: u16,
    pub reservation_ttl_secs: u64,
    pub sweep_interval_secs: u64,
    pub default_limit_bytes: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Config {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgresql://localhost/quota_ledger".to_string()),
            database_max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "20".to_string())
                .parse()?,
            port: env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()?,
            reservation_ttl_secs: env::var("RESERVATION_TTL_SECS")
                .unwrap_or_else(|_| "1800".to_string()) // 30 minutes
                .parse()?,
            sweep_interval_secs: env::var("SWEEP_INTERVAL_SECS")
                .unwrap_or_else(|_| "60".to_string())
                .parse()?,
            default_limit_bytes: env::var("DEFAULT_LIMIT_BYTES")
                .unwrap_or_else(|_| "1073741824".to_string()) // 1GB
                .parse()?,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.reservation_ttl_secs == 0 {
            bail!("RESERVATION_TTL_SECS must be greater than zero");
        }
        if self.reservation_ttl_secs > i64::MAX as u64 / 1000 {
            bail!("RESERVATION_TTL_SECS is out of range");
        }
        if self.database_max_connections == 0 {
            bail!("DATABASE_MAX_CONNECTIONS must be greater than zero");
        }
        Ok(())
    }

    pub fn reservation_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.reservation_ttl_secs as i64)
    }

    /// `None` disables the background sweeper.
    pub fn sweep_interval(&self) -> Option<std::time::Duration> {
        (self.sweep_interval_secs > 0)
            .then(|| std::time::Duration::from_secs(self.sweep_interval_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: [&str; 6] = [
        "DATABASE_URL",
        "DATABASE_MAX_CONNECTIONS",
        "PORT",
        "RESERVATION_TTL_SECS",
        "SWEEP_INTERVAL_SECS",
        "DEFAULT_LIMIT_BYTES",
    ];

    fn clear_env() {
        for var in VARS {
            env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn test_defaults() {
        clear_env();
        let config = Config::from_env().unwrap();

        assert_eq!(config.reservation_ttl_secs, 1800);
        assert_eq!(config.reservation_ttl(), chrono::Duration::minutes(30));
        assert_eq!(config.sweep_interval(), Some(std::time::Duration::from_secs(60)));
        assert_eq!(config.default_limit_bytes, 1073741824);
        assert_eq!(config.port, 3000);
    }

    #[test]
    #[serial]
    fn test_zero_ttl_rejected() {
        clear_env();
        env::set_var("RESERVATION_TTL_SECS", "0");
        assert!(Config::from_env().is_err());
        clear_env();
    }

    #[test]
    #[serial]
    fn test_zero_sweep_interval_disables_sweeper() {
        clear_env();
        env::set_var("SWEEP_INTERVAL_SECS", "0");
        let config = Config::from_env().unwrap();
        assert_eq!(config.sweep_interval(), None);
        clear_env();
    }
}
