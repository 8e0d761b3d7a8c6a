//! Fee and net amount calculation.
//!
//! Pure functions over integer amounts in the smallest currency unit.
//! The percentage fee is rounded to the nearest unit, half-up, then the
//! fixed fee is added on top.

/// Calculate the platform fee for a payment.
///
/// `fee = round(amount * fee_percent / 100) + fixed_fee`
///
/// Callers are responsible for rejecting payments where the fixed fee
/// would exceed the amount; this function only does the arithmetic.
pub fn fee(amount: i64, fee_percent: f64, fixed_fee: i64) -> i64 {
    let percent_fee = (amount as f64 * fee_percent / 100.0).round() as i64;
    percent_fee + fixed_fee
}

/// Calculate the net amount the merchant receives after fees.
pub fn net(amount: i64, fee_percent: f64, fixed_fee: i64) -> i64 {
    amount - fee(amount, fee_percent, fixed_fee)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_fee() {
        // 5000 @ 2.9% + 30 fixed: round(145) + 30 = 175
        assert_eq!(fee(5000, 2.9, 30), 175);
        assert_eq!(net(5000, 2.9, 30), 4825);
    }

    #[test]
    fn test_rounding_half_up() {
        // 250 * 2.9% = 7.25 -> 7
        assert_eq!(fee(250, 2.9, 0), 7);
        // 500 * 2.9% = 14.5 -> 15 (half rounds up)
        assert_eq!(fee(500, 2.9, 0), 15);
        // 1500 * 2.5% = 37.5 -> 38
        assert_eq!(fee(1500, 2.5, 0), 38);
    }

    #[test]
    fn test_zero_percent() {
        assert_eq!(fee(1000, 0.0, 30), 30);
        assert_eq!(net(1000, 0.0, 30), 970);
    }

    #[test]
    fn test_fixed_fee_exceeding_amount() {
        // The calculation is still performed; rejecting a negative net
        // is the caller's policy decision.
        assert_eq!(fee(10, 2.9, 30), 30);
        assert_eq!(net(10, 2.9, 30), -20);
    }
}
