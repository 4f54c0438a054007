//! Symbol conventions: how a contract symbol encodes right, strike, expiry.

use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use zdte_core::OptionRight;

/// Contract terms decoded from a symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractSpec {
    pub underlying: String,
    pub expiry: NaiveDate,
    pub right: OptionRight,
    pub strike: Decimal,
}

impl ContractSpec {
    /// Human-readable contract description (e.g., "SPY 450C 2026-03-20").
    pub fn display_name(&self) -> String {
        format!(
            "{} {}{} {}",
            self.underlying,
            self.strike.normalize(),
            self.right,
            self.expiry
        )
    }

    /// Same underlying, expiry and right.
    pub fn same_series(&self, other: &ContractSpec) -> bool {
        self.underlying == other.underlying
            && self.expiry == other.expiry
            && self.right == other.right
    }
}

/// Decodes symbols into contract terms. Supplied by whoever owns the feed.
pub trait SymbolConvention: Send + Sync + std::fmt::Debug {
    fn parse(&self, symbol: &str) -> Option<ContractSpec>;

    fn right(&self, symbol: &str) -> Option<OptionRight> {
        self.parse(symbol).map(|spec| spec.right)
    }
}

/// OCC option symbology: root, `YYMMDD`, `C`/`P`, strike × 1000 in 8 digits.
///
/// `SPY260320C00450000` is the SPY 450 call expiring 2026-03-20. Space-padded
/// roots (`SPY   260320C00450000`) are accepted.
#[derive(Debug, Clone, Copy, Default)]
pub struct OccConvention;

const OCC_SUFFIX_LEN: usize = 15;

impl SymbolConvention for OccConvention {
    fn parse(&self, symbol: &str) -> Option<ContractSpec> {
        let symbol = symbol.trim();
        if !symbol.is_ascii() || symbol.len() <= OCC_SUFFIX_LEN {
            return None;
        }

        let (root, suffix) = symbol.split_at(symbol.len() - OCC_SUFFIX_LEN);
        let underlying = root.trim_end();
        if underlying.is_empty() {
            return None;
        }

        let (date, rest) = suffix.split_at(6);
        let (right, strike) = rest.split_at(1);

        if !date.bytes().all(|b| b.is_ascii_digit()) || !strike.bytes().all(|b| b.is_ascii_digit())
        {
            return None;
        }

        let yy: i32 = date[0..2].parse().ok()?;
        let mm: u32 = date[2..4].parse().ok()?;
        let dd: u32 = date[4..6].parse().ok()?;
        let expiry = NaiveDate::from_ymd_opt(2000 + yy, mm, dd)?;

        let right = match right {
            "C" => OptionRight::Call,
            "P" => OptionRight::Put,
            _ => return None,
        };

        let strike_thousandths: i64 = strike.parse().ok()?;

        Some(ContractSpec {
            underlying: underlying.to_uppercase(),
            expiry,
            right,
            strike: Decimal::new(strike_thousandths, 3),
        })
    }
}

/// Formats an OCC symbol; the inverse of [`OccConvention::parse`].
pub fn occ_symbol(underlying: &str, expiry: NaiveDate, right: OptionRight, strike: Decimal) -> String {
    let thousandths = (strike * Decimal::ONE_THOUSAND).trunc().to_i64().unwrap_or_default();
    format!(
        "{}{}{}{:08}",
        underlying.to_uppercase(),
        expiry.format("%y%m%d"),
        right,
        thousandths
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn parses_standard_occ_symbol() {
        let spec = OccConvention.parse("SPY260320C00450000").unwrap();
        assert_eq!(spec.underlying, "SPY");
        assert_eq!(spec.expiry, NaiveDate::from_ymd_opt(2026, 3, 20).unwrap());
        assert_eq!(spec.right, OptionRight::Call);
        assert_eq!(spec.strike, dec!(450));
        assert_eq!(spec.display_name(), "SPY 450C 2026-03-20");
    }

    #[test]
    fn parses_padded_root_and_fractional_strike() {
        let spec = OccConvention.parse("SPX   260320P04512500").unwrap();
        assert_eq!(spec.underlying, "SPX");
        assert_eq!(spec.right, OptionRight::Put);
        assert_eq!(spec.strike, dec!(4512.5));
    }

    #[test]
    fn rejects_malformed_symbols() {
        assert!(OccConvention.parse("SPY").is_none());
        assert!(OccConvention.parse("SPY260320X00450000").is_none());
        assert!(OccConvention.parse("SPY261320C00450000").is_none());
        assert!(OccConvention.parse("260320C00450000").is_none());
        assert!(OccConvention.parse("SPY2603A0C00450000").is_none());
    }

    #[test]
    fn formats_back_to_occ() {
        let expiry = NaiveDate::from_ymd_opt(2026, 3, 20).unwrap();
        assert_eq!(
            occ_symbol("spy", expiry, OptionRight::Put, dec!(440)),
            "SPY260320P00440000"
        );
        assert_eq!(
            occ_symbol("SPX", expiry, OptionRight::Call, dec!(4512.5)),
            "SPX260320C04512500"
        );
    }

    #[test]
    fn series_comparison_ignores_strike() {
        let a = OccConvention.parse("SPY260320C00450000").unwrap();
        let b = OccConvention.parse("SPY260320C00460000").unwrap();
        let c = OccConvention.parse("SPY260320P00450000").unwrap();
        assert!(a.same_series(&b));
        assert!(!a.same_series(&c));
    }
}
