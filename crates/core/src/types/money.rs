//! Money formatting over decimal arithmetic.
//!
//! All monetary amounts in Clayforge are `rust_decimal::Decimal` values in
//! USD. Totals are always recomputed from line items rather than maintained
//! as running floating-point deltas, which is why this module deliberately
//! offers no incremental helpers.

use rust_decimal::Decimal;

/// Format an amount as a USD display string (e.g., "$19.99").
///
/// Rounds to two decimal places using banker's rounding.
#[must_use]
pub fn format_usd(amount: Decimal) -> String {
    format!("${:.2}", amount.round_dp(2))
}
