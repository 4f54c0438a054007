use std::str::FromStr;

use anyhow::{anyhow, bail, Result};
use chrono::{Duration, NaiveTime};
use chrono_tz::Tz;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub risk: RiskConfig,
    pub gate: GateConfig,
    pub cache: CacheConfig,
    pub strategy: StrategyConfig,
    pub paper: PaperConfig,
}

/// Hard account-level limits checked at mint and again at confirm.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    /// Daily loss floor in dollars (positive number).
    pub max_daily_loss: Decimal,
    /// Absolute portfolio delta cap, in per-contract delta units.
    pub delta_cap: Decimal,
    /// Reject trades whose estimated cost exceeds reported buying power.
    pub enforce_buying_power: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    pub confirmation_timeout_secs: u64,
    pub token_sweep_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub max_staleness_secs: u64,
    /// Exchange-local time of day after which same-day data is dead ("HH:MM").
    pub auto_expire_at: String,
    /// IANA zone the auto-expire time is expressed in.
    pub exchange_timezone: String,
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    /// Widest acceptable |delta - target| when picking a contract.
    pub delta_tolerance: Decimal,
    pub contract_multiplier: Decimal,
    pub min_volume: u64,
    /// Dollars risked per lotto play; sets the contract count.
    pub lotto_risk_budget: Decimal,
    /// Max (ask - bid) / mid, in percent, before a leg counts as illiquid.
    pub max_spread_pct: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PaperConfig {
    pub starting_buying_power: Decimal,
    pub commission_per_contract: Decimal,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_daily_loss: Decimal::from(500),
            delta_cap: Decimal::from(5),
            enforce_buying_power: true,
        }
    }
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            confirmation_timeout_secs: 30,
            token_sweep_interval_secs: 60,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_staleness_secs: 60,
            auto_expire_at: "16:15".to_string(),
            exchange_timezone: "America/New_York".to_string(),
            sweep_interval_secs: 300,
        }
    }
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            delta_tolerance: Decimal::new(5, 2),
            contract_multiplier: Decimal::from(100),
            min_volume: 0,
            lotto_risk_budget: Decimal::from(100),
            max_spread_pct: Decimal::from(50),
        }
    }
}

impl Default for PaperConfig {
    fn default() -> Self {
        Self {
            starting_buying_power: Decimal::from(25_000),
            commission_per_contract: Decimal::new(65, 2),
        }
    }
}

impl GateConfig {
    #[must_use]
    pub fn confirmation_timeout(&self) -> Duration {
        Duration::seconds(secs_i64(self.confirmation_timeout_secs))
    }
}

impl CacheConfig {
    #[must_use]
    pub fn max_staleness(&self) -> Duration {
        Duration::seconds(secs_i64(self.max_staleness_secs))
    }

    /// Parses `auto_expire_at`, accepting both `HH:MM` and `HH:MM:SS`.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not a valid time of day.
    pub fn auto_expire_time(&self) -> Result<NaiveTime> {
        NaiveTime::parse_from_str(&self.auto_expire_at, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(&self.auto_expire_at, "%H:%M:%S"))
            .map_err(|e| anyhow!("invalid cache.auto_expire_at '{}': {e}", self.auto_expire_at))
    }

    /// # Errors
    ///
    /// Returns an error if the zone name is not a known IANA zone.
    pub fn exchange_tz(&self) -> Result<Tz> {
        Tz::from_str(&self.exchange_timezone)
            .map_err(|e| anyhow!("invalid cache.exchange_timezone '{}': {e}", self.exchange_timezone))
    }
}

impl AppConfig {
    /// Checks the limits and intervals before anything is constructed from them.
    ///
    /// # Errors
    ///
    /// Returns the first invalid setting found.
    pub fn validate(&self) -> Result<()> {
        if self.risk.max_daily_loss <= Decimal::ZERO {
            bail!("risk.max_daily_loss must be positive");
        }
        if self.risk.delta_cap <= Decimal::ZERO {
            bail!("risk.delta_cap must be positive");
        }
        if self.gate.confirmation_timeout_secs == 0 {
            bail!("gate.confirmation_timeout_secs must be at least 1");
        }
        if self.gate.token_sweep_interval_secs == 0 {
            bail!("gate.token_sweep_interval_secs must be at least 1");
        }
        if self.cache.max_staleness_secs == 0 {
            bail!("cache.max_staleness_secs must be at least 1");
        }
        if self.cache.sweep_interval_secs == 0 {
            bail!("cache.sweep_interval_secs must be at least 1");
        }
        self.cache.auto_expire_time()?;
        self.cache.exchange_tz()?;
        if self.strategy.delta_tolerance <= Decimal::ZERO {
            bail!("strategy.delta_tolerance must be positive");
        }
        if self.strategy.contract_multiplier <= Decimal::ZERO {
            bail!("strategy.contract_multiplier must be positive");
        }
        if self.strategy.max_spread_pct <= Decimal::ZERO {
            bail!("strategy.max_spread_pct must be positive");
        }
        Ok(())
    }
}

// chrono panics on durations past ~i64::MAX ms; a year is plenty.
const MAX_INTERVAL_SECS: u64 = 365 * 24 * 60 * 60;

fn secs_i64(secs: u64) -> i64 {
    i64::try_from(secs.min(MAX_INTERVAL_SECS)).unwrap_or_default()
}
