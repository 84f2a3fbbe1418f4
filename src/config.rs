//! Configuration management for the round engine
//!
//! Tables are declared in a TOML file, overridden by `ROUNDHOUSE_*`
//! environment variables and validated before any table is opened.

use crate::errors::{ConfigurationError, EngineResult};
use crate::games::outcome::{CrashCurve, GameParams, MINES_BOARD_SIZE};
use crate::games::types::{GameType, TableId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::env;
use std::path::Path;
use std::time::Duration;

/// Top-level engine configuration
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Entries kept per game type by the in-memory history store
    pub history_capacity: usize,
    /// Hex-encoded 32-byte VRF secret; a random key is used when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vrf_seed: Option<String>,
    pub settlement: SettlementConfig,
    pub logging: LoggingConfig,
    pub tables: Vec<TableConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            history_capacity: 1_000,
            vrf_seed: None,
            settlement: SettlementConfig::default(),
            logging: LoggingConfig::default(),
            tables: GameType::ALL.iter().map(|g| TableConfig::for_game(*g)).collect(),
        }
    }
}

/// One game table
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TableConfig {
    pub id: TableId,
    pub game_type: GameType,
    /// Mines only
    #[serde(default = "default_mine_count")]
    pub mine_count: u8,
    /// Slots a single user may fill in one round
    #[serde(default = "default_max_slots")]
    pub max_slots: u8,
    /// Live multiplier broadcast period for crash games
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    pub phases: PhaseDurations,
    pub stakes: StakeLimits,
    #[serde(default)]
    pub crash_curve: CrashCurve,
}

fn default_mine_count() -> u8 {
    3
}

fn default_max_slots() -> u8 {
    2
}

fn default_tick_interval_ms() -> u64 {
    100
}

impl TableConfig {
    /// Defaults for one table of `game_type`, id `"{game}-1"`
    pub fn for_game(game_type: GameType) -> Self {
        Self {
            id: TableId(format!("{}-1", game_type)),
            game_type,
            mine_count: default_mine_count(),
            max_slots: default_max_slots(),
            tick_interval_ms: default_tick_interval_ms(),
            phases: PhaseDurations::for_game(game_type),
            stakes: StakeLimits::default(),
            crash_curve: CrashCurve::default(),
        }
    }

    pub fn game_params(&self) -> GameParams {
        GameParams {
            mine_count: self.mine_count,
        }
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

/// Phase lengths in milliseconds. For crash games `locked_ms` is unused:
/// the flight lasts until the curve reaches the crash point.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PhaseDurations {
    pub betting_ms: u64,
    pub locked_ms: u64,
    pub resolving_ms: u64,
    pub cooldown_ms: u64,
}

impl PhaseDurations {
    pub fn for_game(game_type: GameType) -> Self {
        let (betting_ms, locked_ms, resolving_ms, cooldown_ms) = match game_type {
            GameType::WinGo => (27_000, 3_000, 5_000, 2_000),
            GameType::K3 | GameType::FiveD => (55_000, 5_000, 5_000, 3_000),
            GameType::Aviator => (6_000, 0, 3_000, 2_000),
            GameType::Mines => (10_000, 1_000, 3_000, 1_000),
            GameType::DragonTiger | GameType::AndarBahar => (15_000, 2_000, 5_000, 3_000),
            GameType::Baccarat | GameType::TeenPatti => (20_000, 2_000, 6_000, 3_000),
            GameType::SicBo | GameType::Roulette => (20_000, 3_000, 5_000, 3_000),
        };
        Self {
            betting_ms,
            locked_ms,
            resolving_ms,
            cooldown_ms,
        }
    }

    pub fn betting(&self) -> Duration {
        Duration::from_millis(self.betting_ms)
    }

    pub fn locked(&self) -> Duration {
        Duration::from_millis(self.locked_ms)
    }

    pub fn resolving(&self) -> Duration {
        Duration::from_millis(self.resolving_ms)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }
}

/// Inclusive stake bounds in minor units
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct StakeLimits {
    pub min: u64,
    pub max: u64,
}

impl Default for StakeLimits {
    fn default() -> Self {
        Self { min: 10, max: 100_000 }
    }
}

impl StakeLimits {
    pub fn contains(&self, stake: u64) -> bool {
        stake >= self.min && stake <= self.max
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SettlementConfig {
    /// Deadline for settling one round before it is voided
    pub timeout_ms: u64,
    /// Deadline for outcome generation
    pub outcome_timeout_ms: u64,
    /// Bets settled in parallel per round
    pub concurrency: usize,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 5_000,
            outcome_timeout_ms: 1_000,
            concurrency: 64,
        }
    }
}

impl SettlementConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn outcome_timeout(&self) -> Duration {
        Duration::from_millis(self.outcome_timeout_ms)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Configuration loader with environment variable support
#[derive(Debug, Default)]
pub struct ConfigLoader {
    config_path: Option<String>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { config_path: None }
    }

    /// Set the configuration file path
    pub fn with_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_path = Some(path.as_ref().to_string_lossy().to_string());
        self
    }

    /// Load configuration from file and environment variables
    pub fn load(&self) -> EngineResult<EngineConfig> {
        let mut config = if let Some(ref path) = self.config_path {
            self.load_from_file(path)?
        } else {
            EngineConfig::default()
        };

        self.apply_overrides(&mut config, |key| env::var(key).ok())?;
        self.validate(&config)?;

        Ok(config)
    }

    fn load_from_file(&self, path: &str) -> EngineResult<EngineConfig> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigurationError::LoadFailed(format!("Failed to read {}: {}", path, e)))?;

        toml::from_str(&content).map_err(|e| ConfigurationError::from(e).into())
    }

    /// Apply `ROUNDHOUSE_*` overrides read through `lookup`
    pub fn apply_overrides<F>(&self, config: &mut EngineConfig, lookup: F) -> EngineResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(level) = lookup("ROUNDHOUSE_LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Some(seed) = lookup("ROUNDHOUSE_VRF_SEED") {
            config.vrf_seed = Some(seed);
        }
        if let Some(value) = lookup("ROUNDHOUSE_SETTLEMENT_TIMEOUT_MS") {
            config.settlement.timeout_ms = parse_override("ROUNDHOUSE_SETTLEMENT_TIMEOUT_MS", value)?;
        }
        if let Some(value) = lookup("ROUNDHOUSE_OUTCOME_TIMEOUT_MS") {
            config.settlement.outcome_timeout_ms = parse_override("ROUNDHOUSE_OUTCOME_TIMEOUT_MS", value)?;
        }
        if let Some(value) = lookup("ROUNDHOUSE_SETTLEMENT_CONCURRENCY") {
            config.settlement.concurrency = parse_override("ROUNDHOUSE_SETTLEMENT_CONCURRENCY", value)?;
        }
        if let Some(value) = lookup("ROUNDHOUSE_HISTORY_CAPACITY") {
            config.history_capacity = parse_override("ROUNDHOUSE_HISTORY_CAPACITY", value)?;
        }
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self, config: &EngineConfig) -> EngineResult<()> {
        if config.tables.is_empty() {
            return Err(ConfigurationError::MissingRequired("tables".to_string()).into());
        }
        if config.settlement.timeout_ms == 0 {
            return Err(invalid("settlement.timeout_ms", "0", "Timeout cannot be zero"));
        }
        if config.settlement.outcome_timeout_ms == 0 {
            return Err(invalid("settlement.outcome_timeout_ms", "0", "Timeout cannot be zero"));
        }
        if config.settlement.concurrency == 0 {
            return Err(invalid("settlement.concurrency", "0", "Concurrency cannot be zero"));
        }
        if let Some(seed) = &config.vrf_seed {
            let valid = hex::decode(seed).map(|b| b.len() == 32).unwrap_or(false);
            if !valid {
                return Err(invalid("vrf_seed", "<redacted>", "Expected 64 hex characters"));
            }
        }

        let mut seen = HashSet::new();
        for table in &config.tables {
            if table.id.0.is_empty() {
                return Err(ConfigurationError::MissingRequired("tables.id".to_string()).into());
            }
            if !seen.insert(&table.id) {
                return Err(ConfigurationError::ValidationFailed(format!("Duplicate table id '{}'", table.id)).into());
            }
            validate_table(table)?;
        }

        Ok(())
    }

    /// Save configuration to file
    pub fn save(&self, config: &EngineConfig, path: &str) -> EngineResult<()> {
        let toml_string = toml::to_string_pretty(config)
            .map_err(|e| ConfigurationError::SaveFailed(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, toml_string)
            .map_err(|e| ConfigurationError::SaveFailed(format!("Failed to write to {}: {}", path, e)).into())
    }
}

/// Validate one table on its own, as done when a table is opened at runtime
pub fn validate_table(table: &TableConfig) -> EngineResult<()> {
    let field = |name: &str| format!("tables.{}.{}", table.id, name);
    let phases = &table.phases;

    if phases.betting_ms == 0 {
        return Err(invalid(&field("phases.betting_ms"), "0", "Betting window cannot be zero"));
    }
    if phases.locked_ms == 0 && !table.game_type.is_continuous() {
        return Err(invalid(&field("phases.locked_ms"), "0", "Locked phase cannot be zero"));
    }
    if phases.resolving_ms == 0 {
        return Err(invalid(&field("phases.resolving_ms"), "0", "Reveal phase cannot be zero"));
    }
    if table.stakes.min == 0 || table.stakes.min > table.stakes.max {
        return Err(invalid(
            &field("stakes"),
            &format!("{}..{}", table.stakes.min, table.stakes.max),
            "Require 0 < min <= max",
        ));
    }
    if table.max_slots == 0 {
        return Err(invalid(&field("max_slots"), "0", "At least one slot is required"));
    }
    if table.game_type == GameType::Mines && (table.mine_count == 0 || table.mine_count >= MINES_BOARD_SIZE) {
        return Err(invalid(
            &field("mine_count"),
            &table.mine_count.to_string(),
            "Mine count must be within 1..=24",
        ));
    }
    if table.game_type.is_continuous() {
        if table.tick_interval_ms == 0 {
            return Err(invalid(&field("tick_interval_ms"), "0", "Tick interval cannot be zero"));
        }
        if !table.crash_curve.is_valid() {
            return Err(invalid(
                &field("crash_curve"),
                &format!("{:?}", table.crash_curve),
                "Growth rate must be positive",
            ));
        }
    }
    Ok(())
}

fn invalid(field: &str, value: &str, reason: &str) -> crate::errors::EngineError {
    ConfigurationError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
    .into()
}

fn parse_override<T: std::str::FromStr>(key: &str, value: String) -> EngineResult<T> {
    value.parse().map_err(|_| {
        ConfigurationError::InvalidValue {
            field: key.to_string(),
            value,
            reason: "Invalid number".to_string(),
        }
        .into()
    })
}

/// Builder pattern for creating configurations
pub struct ConfigBuilder {
    config: EngineConfig,
}

impl ConfigBuilder {
    /// Start from defaults with no tables
    pub fn new() -> Self {
        Self {
            config: EngineConfig {
                tables: Vec::new(),
                ..EngineConfig::default()
            },
        }
    }

    pub fn table(mut self, table: TableConfig) -> Self {
        self.config.tables.push(table);
        self
    }

    pub fn settlement(mut self, settlement: SettlementConfig) -> Self {
        self.config.settlement = settlement;
        self
    }

    pub fn vrf_seed(mut self, seed_hex: impl Into<String>) -> Self {
        self.config.vrf_seed = Some(seed_hex.into());
        self
    }

    pub fn history_capacity(mut self, capacity: usize) -> Self {
        self.config.history_capacity = capacity;
        self
    }

    pub fn build(self) -> EngineConfig {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Generate a sample configuration file
pub fn generate_sample_config(path: &str) -> EngineResult<()> {
    let config = EngineConfig::default();
    let loader = ConfigLoader::new();
    loader.save(&config, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.tables.len(), GameType::ALL.len());

        let wingo = config
            .tables
            .iter()
            .find(|t| t.id == TableId::from("wingo-1"))
            .unwrap();
        assert_eq!(wingo.phases.betting(), Duration::from_secs(27));
        assert_eq!(wingo.phases.locked(), Duration::from_secs(3));
        assert!(ConfigLoader::new().validate(&config).is_ok());
    }

    #[test]
    fn test_config_validation() {
        let loader = ConfigLoader::new();
        let mut config = EngineConfig::default();

        config.tables[0].stakes = StakeLimits { min: 500, max: 100 };
        assert!(loader.validate(&config).is_err());

        let mut config = EngineConfig::default();
        let duplicate = config.tables[0].clone();
        config.tables.push(duplicate);
        assert!(loader.validate(&config).is_err());

        let mut config = ConfigBuilder::new().table(TableConfig::for_game(GameType::Mines)).build();
        config.tables[0].mine_count = 25;
        assert!(loader.validate(&config).is_err());

        let config = ConfigBuilder::new()
            .table(TableConfig::for_game(GameType::SicBo))
            .vrf_seed("zz")
            .build();
        assert!(loader.validate(&config).is_err());

        // A near-miss secret must not end up in logs
        let leaked = "ab".repeat(31);
        let config = ConfigBuilder::new()
            .table(TableConfig::for_game(GameType::SicBo))
            .vrf_seed(leaked.clone())
            .build();
        let message = loader.validate(&config).unwrap_err().to_string();
        assert!(message.contains("vrf_seed"));
        assert!(message.contains("<redacted>"));
        assert!(!message.contains(&leaked));
    }

    #[test]
    fn test_crash_tables_skip_locked_duration() {
        let config = ConfigBuilder::new().table(TableConfig::for_game(GameType::Aviator)).build();
        assert_eq!(config.tables[0].phases.locked_ms, 0);
        assert!(ConfigLoader::new().validate(&config).is_ok());
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("ROUNDHOUSE_LOG_LEVEL", "debug"),
            ("ROUNDHOUSE_SETTLEMENT_TIMEOUT_MS", "750"),
            ("ROUNDHOUSE_SETTLEMENT_CONCURRENCY", "8"),
        ]
        .into_iter()
        .collect();

        let loader = ConfigLoader::new();
        let mut config = EngineConfig::default();
        loader
            .apply_overrides(&mut config, |key| vars.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.settlement.timeout_ms, 750);
        assert_eq!(config.settlement.concurrency, 8);

        let bad = loader.apply_overrides(&mut config, |key| {
            (key == "ROUNDHOUSE_HISTORY_CAPACITY").then(|| "lots".to_string())
        });
        assert!(bad.is_err());
    }

    #[test]
    fn test_save_and_load_config() -> EngineResult<()> {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path().to_str().unwrap();

        let original = ConfigBuilder::new()
            .table(TableConfig::for_game(GameType::Aviator))
            .table(TableConfig::for_game(GameType::WinGo))
            .vrf_seed(hex::encode([7u8; 32]))
            .build();

        let loader = ConfigLoader::new();
        loader.save(&original, path)?;
        let content = std::fs::read_to_string(path)?;
        let loaded: EngineConfig = toml::from_str(&content).map_err(ConfigurationError::from)?;

        assert_eq!(loaded, original);
        Ok(())
    }
}
