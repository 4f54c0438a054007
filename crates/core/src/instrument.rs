//! Market data point for one option contract.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Options contract right (call or put).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionRight {
    Call,
    Put,
}

impl std::fmt::Display for OptionRight {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Call => write!(f, "C"),
            Self::Put => write!(f, "P"),
        }
    }
}

/// Why a record was refused at construction.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RecordError {
    #[error("empty symbol")]
    EmptySymbol,

    #[error("{symbol}: negative quote (bid {bid}, ask {ask})")]
    NegativeQuote {
        symbol: String,
        bid: Decimal,
        ask: Decimal,
    },

    #[error("{symbol}: crossed quote, bid {bid} > ask {ask}")]
    CrossedQuote {
        symbol: String,
        bid: Decimal,
        ask: Decimal,
    },

    #[error("{symbol}: negative implied volatility {iv}")]
    NegativeIv { symbol: String, iv: Decimal },
}

/// Greeks snapshot carried by a record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Greeks {
    pub delta: Decimal,
    pub gamma: Decimal,
    pub theta: Decimal,
    pub vega: Decimal,
}

/// One observation of one contract.
///
/// Never mutated after construction; a newer observation replaces the
/// whole record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentRecord {
    pub symbol: String,
    pub bid: Decimal,
    pub ask: Decimal,
    pub greeks: Greeks,
    pub implied_volatility: Decimal,
    pub volume: u64,
    #[serde(default)]
    pub open_interest: u64,
    pub observed_at: DateTime<Utc>,
}

impl InstrumentRecord {
    /// Builds a record, enforcing `0 <= bid <= ask` and a non-negative IV.
    ///
    /// # Errors
    ///
    /// Returns a [`RecordError`] describing the first violated invariant.
    pub fn new(
        symbol: impl Into<String>,
        bid: Decimal,
        ask: Decimal,
        greeks: Greeks,
        implied_volatility: Decimal,
        volume: u64,
        observed_at: DateTime<Utc>,
    ) -> Result<Self, RecordError> {
        let record = Self {
            symbol: symbol.into(),
            bid,
            ask,
            greeks,
            implied_volatility,
            volume,
            open_interest: 0,
            observed_at,
        };
        record.validate()?;
        Ok(record)
    }

    #[must_use]
    pub fn with_open_interest(mut self, open_interest: u64) -> Self {
        self.open_interest = open_interest;
        self
    }

    /// Re-checks the invariants; used on records that arrived through serde.
    ///
    /// # Errors
    ///
    /// Returns a [`RecordError`] describing the first violated invariant.
    pub fn validate(&self) -> Result<(), RecordError> {
        if self.symbol.trim().is_empty() {
            return Err(RecordError::EmptySymbol);
        }
        if self.bid < Decimal::ZERO || self.ask < Decimal::ZERO {
            return Err(RecordError::NegativeQuote {
                symbol: self.symbol.clone(),
                bid: self.bid,
                ask: self.ask,
            });
        }
        if self.bid > self.ask {
            return Err(RecordError::CrossedQuote {
                symbol: self.symbol.clone(),
                bid: self.bid,
                ask: self.ask,
            });
        }
        if self.implied_volatility < Decimal::ZERO {
            return Err(RecordError::NegativeIv {
                symbol: self.symbol.clone(),
                iv: self.implied_volatility,
            });
        }
        Ok(())
    }

    #[must_use]
    pub fn delta(&self) -> Decimal {
        self.greeks.delta
    }

    #[must_use]
    pub fn mid(&self) -> Decimal {
        (self.bid + self.ask) / Decimal::TWO
    }

    #[must_use]
    pub fn spread(&self) -> Decimal {
        self.ask - self.bid
    }

    /// Same observation re-stamped at `observed_at`.
    #[must_use]
    pub fn restamped(&self, observed_at: DateTime<Utc>) -> Self {
        Self {
            observed_at,
            ..self.clone()
        }
    }
}
