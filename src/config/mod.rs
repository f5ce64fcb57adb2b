//! Configuration management for the chaintrace client

use crate::error::{ChainTraceError, Result};
use crate::ledger::Address;
use primitive_types::U256;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::warn;

/// Main configuration structure for the chaintrace client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Ledger node connection configuration
    pub node: NodeConfig,

    /// Ledger program (contract) configuration
    pub ledger: LedgerConfig,

    /// Transaction fee policy
    pub fees: FeeConfig,

    /// Submission retry and confirmation configuration
    pub submission: SubmissionConfig,

    /// Read-side query configuration
    pub query: QueryConfig,

    /// Monitoring and logging configuration
    pub monitoring: MonitoringConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Primary RPC endpoints
    pub primary_endpoints: Vec<String>,

    /// Backup RPC endpoints, tried when all primaries fail
    pub backup_endpoints: Vec<String>,

    /// RPC request timeout in milliseconds
    pub rpc_timeout_ms: u64,

    /// Maximum number of concurrent RPC requests
    pub max_concurrent_requests: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Address of the supply-chain ledger program, hex encoded
    pub program_address: String,

    /// Chain identifier included in every signed transaction
    pub chain_id: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeConfig {
    /// Fixed upper bound on computation units per transaction
    pub gas_limit: u64,

    /// Gas price strategy: "query-node-current" or "fixed"
    pub gas_price_strategy: String,

    /// Gas price used when the strategy is "fixed"
    pub fixed_gas_price: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionConfig {
    /// Maximum identical-envelope resends after transient send failures
    pub max_submit_retries: u32,

    /// Total confirmation-wait budget in milliseconds
    pub confirmation_timeout_ms: u64,

    /// Initial delay between receipt polls in milliseconds
    pub poll_initial_delay_ms: u64,

    /// Cap on the receipt poll delay in milliseconds
    pub poll_max_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Number of history entries fetched per read call
    pub page_size: usize,

    /// Attempts per read call before giving up on transient failures
    pub retry_attempts: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Enable JSON logging
    pub json_logging: bool,

    /// Metrics reporting interval in seconds
    pub metrics_interval_secs: u64,
}

/// Resolved gas price strategy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GasPriceStrategy {
    /// Ask the node for its current fee price before each submission
    QueryNodeCurrent,
    /// Use a fixed, configured gas price
    Fixed(U256),
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| ChainTraceError::Config(config::ConfigError::Message(e.to_string())))?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables and file
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder();

        // Start with default configuration
        settings = settings.add_source(config::File::with_name("config/default").required(false));

        // Add environment-specific configuration
        if let Ok(env) = std::env::var("CHAINTRACE_ENV") {
            settings = settings
                .add_source(config::File::with_name(&format!("config/{}", env)).required(false));
        }

        // Add local configuration (not committed to git)
        settings = settings.add_source(config::File::with_name("config/local").required(false));

        // Override with environment variables
        settings = settings.add_source(
            config::Environment::with_prefix("CHAINTRACE")
                .prefix_separator("_")
                .separator("__"),
        );

        let config: Config = settings.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.node.primary_endpoints.is_empty() {
            return Err(ChainTraceError::Config(config::ConfigError::Message(
                "At least one primary RPC endpoint must be configured".to_string(),
            )));
        }

        if self.node.max_concurrent_requests == 0 {
            return Err(ChainTraceError::Config(config::ConfigError::Message(
                "max_concurrent_requests must be positive".to_string(),
            )));
        }

        // The program address must at least parse; a zero address is allowed
        // here so the default configuration loads, and is warned about at
        // service construction.
        self.ledger.program_address()?;

        if self.fees.gas_limit == 0 {
            return Err(ChainTraceError::Config(config::ConfigError::Message(
                "gas_limit must be positive".to_string(),
            )));
        }

        if self.fees.gas_price_strategy == "fixed" && self.fees.fixed_gas_price.is_none() {
            return Err(ChainTraceError::Config(config::ConfigError::Message(
                "fixed gas price strategy requires fixed_gas_price".to_string(),
            )));
        }

        if self.submission.poll_initial_delay_ms == 0
            || self.submission.poll_initial_delay_ms > self.submission.poll_max_delay_ms
        {
            return Err(ChainTraceError::Config(config::ConfigError::Message(
                "poll delays must satisfy 0 < initial <= max".to_string(),
            )));
        }

        if self.submission.confirmation_timeout_ms == 0 {
            return Err(ChainTraceError::Config(config::ConfigError::Message(
                "confirmation_timeout_ms must be positive".to_string(),
            )));
        }

        if self.query.page_size == 0 {
            return Err(ChainTraceError::Config(config::ConfigError::Message(
                "query page_size must be positive".to_string(),
            )));
        }

        Ok(())
    }

    /// Get RPC timeout as Duration
    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.node.rpc_timeout_ms)
    }

    /// Get metrics reporting interval as Duration
    pub fn metrics_interval(&self) -> Duration {
        Duration::from_secs(self.monitoring.metrics_interval_secs)
    }
}

impl LedgerConfig {
    /// Parse the configured program address
    pub fn program_address(&self) -> Result<Address> {
        self.program_address.parse().map_err(|_| {
            ChainTraceError::Config(config::ConfigError::Message(format!(
                "Invalid program address: {}",
                self.program_address
            )))
        })
    }
}

impl FeeConfig {
    /// Resolve the configured gas price strategy
    pub fn strategy(&self) -> GasPriceStrategy {
        match self.gas_price_strategy.as_str() {
            "fixed" => match self.fixed_gas_price {
                Some(price) => GasPriceStrategy::Fixed(U256::from(price)),
                // validate() rejects this combination; fall back rather than fail here
                None => GasPriceStrategy::QueryNodeCurrent,
            },
            "query-node-current" => GasPriceStrategy::QueryNodeCurrent,
            other => {
                warn!(
                    "Unknown gas price strategy '{}', using 'query-node-current'",
                    other
                );
                GasPriceStrategy::QueryNodeCurrent
            }
        }
    }
}

impl SubmissionConfig {
    /// Get the total confirmation-wait budget as Duration
    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_millis(self.confirmation_timeout_ms)
    }

    /// Get the initial receipt poll delay as Duration
    pub fn poll_initial_delay(&self) -> Duration {
        Duration::from_millis(self.poll_initial_delay_ms)
    }

    /// Get the receipt poll delay cap as Duration
    pub fn poll_max_delay(&self) -> Duration {
        Duration::from_millis(self.poll_max_delay_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            node: NodeConfig {
                primary_endpoints: vec!["http://localhost:8545".to_string()],
                backup_endpoints: vec![],
                rpc_timeout_ms: crate::defaults::RPC_TIMEOUT.as_millis() as u64,
                max_concurrent_requests: 64,
            },
            ledger: LedgerConfig {
                program_address: format!("{}", Address::ZERO),
                chain_id: crate::defaults::CHAIN_ID,
            },
            fees: FeeConfig {
                gas_limit: crate::defaults::GAS_LIMIT,
                gas_price_strategy: "query-node-current".to_string(),
                fixed_gas_price: None,
            },
            submission: SubmissionConfig {
                max_submit_retries: crate::defaults::MAX_SUBMIT_RETRIES,
                confirmation_timeout_ms: crate::defaults::CONFIRMATION_TIMEOUT.as_millis() as u64,
                poll_initial_delay_ms: crate::defaults::POLL_INITIAL_DELAY.as_millis() as u64,
                poll_max_delay_ms: crate::defaults::POLL_MAX_DELAY.as_millis() as u64,
            },
            query: QueryConfig {
                page_size: crate::defaults::HISTORY_PAGE_SIZE,
                retry_attempts: 3,
            },
            monitoring: MonitoringConfig {
                log_level: "info".to_string(),
                json_logging: false,
                metrics_interval_secs: 60,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_endpoints_rejected() {
        let mut config = Config::default();
        config.node.primary_endpoints.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_fixed_strategy_requires_price() {
        let mut config = Config::default();
        config.fees.gas_price_strategy = "fixed".to_string();
        assert!(config.validate().is_err());

        config.fees.fixed_gas_price = Some(1_000_000_000);
        assert!(config.validate().is_ok());
        assert_eq!(
            config.fees.strategy(),
            GasPriceStrategy::Fixed(U256::from(1_000_000_000u64))
        );
    }

    #[test]
    fn test_unknown_strategy_falls_back_to_query() {
        let mut config = Config::default();
        config.fees.gas_price_strategy = "oracle".to_string();
        assert_eq!(config.fees.strategy(), GasPriceStrategy::QueryNodeCurrent);
    }

    #[test]
    fn test_poll_delays_validated() {
        let mut config = Config::default();
        config.submission.poll_initial_delay_ms = 20_000;
        config.submission.poll_max_delay_ms = 1_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_program_address_rejected() {
        let mut config = Config::default();
        config.ledger.program_address = "not-an-address".to_string();
        assert!(config.validate().is_err());
    }
}
