//! Conversions between satoshis and wei.
//!
//! Rootstock keeps 18 decimals for RBTC while bitcoin keeps 8, so one satoshi
//! is worth 10^10 wei.

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

pub const WEI_PER_SATOSHI: i64 = 10_000_000_000;

pub fn satoshi_to_wei(satoshis: u64) -> Decimal {
    Decimal::from(satoshis) * Decimal::from(WEI_PER_SATOSHI)
}

/// Truncates any fraction of a satoshi. Returns `None` for negative values
/// or values that do not fit into a `u64`.
pub fn wei_to_satoshi(wei: Decimal) -> Option<u64> {
    (wei / Decimal::from(WEI_PER_SATOSHI)).trunc().to_u64()
}
