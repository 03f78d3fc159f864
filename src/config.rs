use crate::ledger::ParticipationPolicy;
use crate::odds::{default_fee_rate, validate_fee_rate};
use rust_decimal::Decimal;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
    pub idle_timeout_secs: u64,
    pub max_lifetime_secs: u64,
    pub test_before_acquire: bool,
}

/// Where the ledger lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerBackend {
    Postgres,
    Memory,
}

impl LedgerBackend {
    pub fn from_str(s: &str) -> Result<Self, String> {
        match s.to_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(LedgerBackend::Postgres),
            "memory" => Ok(LedgerBackend::Memory),
            _ => Err(format!(
                "Invalid LEDGER_BACKEND: {}. Must be one of: postgres, memory",
                s
            )),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerBackend::Postgres => "postgres",
            LedgerBackend::Memory => "memory",
        }
    }
}

/// Betting ledger settings
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    pub backend: LedgerBackend,
    pub default_fee_rate: Decimal,
    pub participation_policy: ParticipationPolicy,
    pub scheduler_interval_secs: u64,
    pub reconcile_interval_secs: u64,
    pub audit_log_dir: PathBuf,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub ledger: LedgerConfig,
    pub log_level: String,
    pub log_format: String,
    pub environment: String,
}

impl DatabaseConfig {
    /// Create database config from environment variables
    pub fn from_env() -> Result<Self, String> {
        let url = env::var("DATABASE_URL")
            .map_err(|_| "DATABASE_URL environment variable is required")?;

        let max_connections = env::var("DATABASE_MAX_CONNECTIONS")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(10);

        let acquire_timeout_secs = env::var("DATABASE_ACQUIRE_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(30);

        let idle_timeout_secs = env::var("DATABASE_IDLE_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(600); // 10 minutes

        let max_lifetime_secs = env::var("DATABASE_MAX_LIFETIME_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(1800); // 30 minutes

        let test_before_acquire = env::var("DATABASE_TEST_BEFORE_ACQUIRE")
            .ok()
            .and_then(|s| s.parse::<bool>().ok())
            .unwrap_or(true);

        // Validate configuration
        if max_connections == 0 {
            return Err("DATABASE_MAX_CONNECTIONS must be greater than 0".to_string());
        }

        if acquire_timeout_secs == 0 {
            return Err("DATABASE_ACQUIRE_TIMEOUT_SECS must be greater than 0".to_string());
        }

        Ok(Self {
            url,
            max_connections,
            acquire_timeout_secs,
            idle_timeout_secs,
            max_lifetime_secs,
            test_before_acquire,
        })
    }

    /// Get acquire timeout as Duration
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }

    /// Get idle timeout as Duration
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    /// Get max lifetime as Duration
    pub fn max_lifetime(&self) -> Duration {
        Duration::from_secs(self.max_lifetime_secs)
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgresql://localhost/votepool".to_string(),
            max_connections: 10,
            acquire_timeout_secs: 30,
            idle_timeout_secs: 600,
            max_lifetime_secs: 1800,
            test_before_acquire: true,
        }
    }
}

/// Parse a fee rate such as "0.10" and check it is in `[0, 1)`
pub fn parse_fee_rate(raw: &str) -> Result<Decimal, String> {
    let rate = Decimal::from_str(raw.trim())
        .map_err(|e| format!("Invalid DEFAULT_FEE_RATE {}: {}", raw, e))?;
    validate_fee_rate(rate).map_err(|e| format!("Invalid DEFAULT_FEE_RATE: {}", e))
}

impl LedgerConfig {
    /// Create ledger config from environment variables
    pub fn from_env() -> Result<Self, String> {
        let backend = match env::var("LEDGER_BACKEND") {
            Ok(raw) => LedgerBackend::from_str(&raw)?,
            Err(_) => LedgerBackend::Postgres,
        };

        let default_fee_rate = match env::var("DEFAULT_FEE_RATE") {
            Ok(raw) => parse_fee_rate(&raw)?,
            Err(_) => default_fee_rate(),
        };

        let participation_policy = match env::var("PARTICIPATION_POLICY") {
            Ok(raw) => ParticipationPolicy::from_str(&raw)?,
            Err(_) => ParticipationPolicy::default(),
        };

        let scheduler_interval_secs = env::var("SCHEDULER_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(60);

        let reconcile_interval_secs = env::var("RECONCILE_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(3600); // 1 hour

        let audit_log_dir = PathBuf::from(
            env::var("AUDIT_LOG_DIR").unwrap_or_else(|_| "./logs".to_string()),
        );

        if scheduler_interval_secs == 0 {
            return Err("SCHEDULER_INTERVAL_SECS must be greater than 0".to_string());
        }

        if reconcile_interval_secs == 0 {
            return Err("RECONCILE_INTERVAL_SECS must be greater than 0".to_string());
        }

        Ok(Self {
            backend,
            default_fee_rate,
            participation_policy,
            scheduler_interval_secs,
            reconcile_interval_secs,
            audit_log_dir,
        })
    }

    pub fn scheduler_interval(&self) -> Duration {
        Duration::from_secs(self.scheduler_interval_secs)
    }

    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile_interval_secs)
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            backend: LedgerBackend::Postgres,
            default_fee_rate: default_fee_rate(),
            participation_policy: ParticipationPolicy::default(),
            scheduler_interval_secs: 60,
            reconcile_interval_secs: 3600,
            audit_log_dir: PathBuf::from("./logs"),
        }
    }
}

impl AppConfig {
    /// Create application config from environment variables
    pub fn from_env() -> Result<Self, String> {
        let ledger = LedgerConfig::from_env()?;

        // The in-memory ledger runs without a database
        let database = match ledger.backend {
            LedgerBackend::Postgres => DatabaseConfig::from_env()?,
            LedgerBackend::Memory => DatabaseConfig::from_env().unwrap_or_default(),
        };

        let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let log_format = env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        // Validate log level
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&log_level.to_lowercase().as_str()) {
            return Err(format!(
                "Invalid LOG_LEVEL: {}. Must be one of: {:?}",
                log_level, valid_log_levels
            ));
        }

        let valid_log_formats = ["pretty", "json"];
        if !valid_log_formats.contains(&log_format.to_lowercase().as_str()) {
            return Err(format!(
                "Invalid LOG_FORMAT: {}. Must be one of: {:?}",
                log_format, valid_log_formats
            ));
        }

        // Validate environment
        let valid_environments = ["development", "staging", "production"];
        if !valid_environments.contains(&environment.to_lowercase().as_str()) {
            return Err(format!(
                "Invalid ENVIRONMENT: {}. Must be one of: {:?}",
                environment, valid_environments
            ));
        }

        Ok(Self {
            database,
            ledger,
            log_level: log_level.to_lowercase(),
            log_format: log_format.to_lowercase(),
            environment: environment.to_lowercase(),
        })
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// Check if running in development
    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }

    pub fn json_logs(&self) -> bool {
        self.log_format == "json"
    }

    /// Get database URL (convenience method)
    pub fn database_url(&self) -> &str {
        &self.database.url
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            ledger: LedgerConfig::default(),
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            environment: "development".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_config_default() {
        let config = DatabaseConfig::default();
        assert_eq!(config.max_connections, 10);
        assert_eq!(config.acquire_timeout_secs, 30);
    }

    #[test]
    fn test_app_config_default() {
        let config = AppConfig::default();
        assert_eq!(config.ledger.scheduler_interval_secs, 60);
        assert_eq!(config.ledger.default_fee_rate, Decimal::new(10, 2));
        assert_eq!(
            config.ledger.participation_policy,
            ParticipationPolicy::SingleActiveBet
        );
        assert!(config.is_development());
        assert!(!config.is_production());
        assert!(!config.json_logs());
    }

    #[test]
    fn test_parse_fee_rate() {
        assert_eq!(parse_fee_rate("0.05"), Ok(Decimal::new(5, 2)));
        assert_eq!(parse_fee_rate(" 0 "), Ok(Decimal::ZERO));
        assert!(parse_fee_rate("1").is_err());
        assert!(parse_fee_rate("-0.1").is_err());
        assert!(parse_fee_rate("ten percent").is_err());
    }

    #[test]
    fn test_ledger_backend_parsing() {
        assert_eq!(LedgerBackend::from_str("memory"), Ok(LedgerBackend::Memory));
        assert_eq!(
            LedgerBackend::from_str("PostgreSQL"),
            Ok(LedgerBackend::Postgres)
        );
        assert!(LedgerBackend::from_str("sqlite").is_err());
    }
}
