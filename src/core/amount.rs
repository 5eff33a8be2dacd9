//! Exact Integer Amount Arithmetic
//!
//! Every value that moves through the ledger is an [`Amount`]: an unsigned
//! count of indivisible base units. There is no floating point anywhere in
//! accounting or payout code.
//!
//! ## Payout Math
//!
//! A winner's reward is `floor(stake * pot / winning_total)`. The product
//! `stake * pot` can exceed `u128` for large pots, so [`mul_div_floor`]
//! computes it with a 256-bit intermediate:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  a * b  ->  [ hi: u128 ][ lo: u128 ]   (full 256-bit product) │
//! │  (hi:lo) / d  ->  binary long division, truncating            │
//! │  result fits u128 iff hi < d                                  │
//! └──────────────────────────────────────────────────────────────┘
//! ```

/// Ledger value in indivisible base units.
pub type Amount = u128;

/// Zero amount.
pub const AMOUNT_ZERO: Amount = 0;

const LOW_MASK: u128 = u64::MAX as u128;

/// Full 256-bit product of two amounts, returned as `(hi, lo)`.
#[inline]
pub fn widening_mul(a: Amount, b: Amount) -> (u128, u128) {
    let (a1, a0) = (a >> 64, a & LOW_MASK);
    let (b1, b0) = (b >> 64, b & LOW_MASK);

    let p00 = a0 * b0;
    let p01 = a0 * b1;
    let p10 = a1 * b0;
    let p11 = a1 * b1;

    // Sum of three values < 2^64 each, cannot overflow.
    let mid = (p00 >> 64) + (p01 & LOW_MASK) + (p10 & LOW_MASK);

    let lo = (p00 & LOW_MASK) | ((mid & LOW_MASK) << 64);
    let hi = p11 + (p01 >> 64) + (p10 >> 64) + (mid >> 64);
    (hi, lo)
}

/// Compute `floor(a * b / d)` exactly.
///
/// Returns `None` if `d == 0` or the quotient does not fit in an [`Amount`].
/// Truncates toward zero: a fractional unit is never rounded up.
///
/// # Example
/// ```
/// use multibet::core::amount::mul_div_floor;
/// // 2 of 5 winning units, pot of 10
/// assert_eq!(mul_div_floor(2, 10, 5), Some(4));
/// // 1 of 3 winning units, pot of 10: 3.33.. floors to 3
/// assert_eq!(mul_div_floor(1, 10, 3), Some(3));
/// ```
pub fn mul_div_floor(a: Amount, b: Amount, d: Amount) -> Option<Amount> {
    if d == 0 {
        return None;
    }

    if let Some(product) = a.checked_mul(b) {
        return Some(product / d);
    }

    let (hi, lo) = widening_mul(a, b);
    if hi >= d {
        return None;
    }

    // Invariant: rem < d at the top of every iteration.
    let mut rem = hi;
    let mut quot: u128 = 0;
    for bit in (0..128).rev() {
        let carry = rem >> 127;
        rem = (rem << 1) | ((lo >> bit) & 1);
        quot <<= 1;
        if carry == 1 || rem >= d {
            rem = rem.wrapping_sub(d);
            quot |= 1;
        }
    }

    Some(quot)
}

// =============================================================================
// WIRE ENCODING
// =============================================================================

/// Serde adapter for a single amount.
///
/// Human-readable formats get a decimal string, since JSON numbers lose
/// precision above 2^53 in most clients and serde's buffered (tagged)
/// deserialization only carries 64-bit integers. Input may be a string or a
/// non-negative integer. Binary formats keep the raw `u128`.
pub mod decimal_amount {
    use std::fmt;

    use serde::de::{self, Visitor};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use super::Amount;

    /// Serialize as a decimal string.
    pub fn serialize<S: Serializer>(amount: &Amount, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.collect_str(amount)
        } else {
            amount.serialize(serializer)
        }
    }

    /// Deserialize from a decimal string or a non-negative integer.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Amount, D::Error> {
        if deserializer.is_human_readable() {
            deserializer.deserialize_any(AmountVisitor)
        } else {
            Amount::deserialize(deserializer)
        }
    }

    struct AmountVisitor;

    impl<'de> Visitor<'de> for AmountVisitor {
        type Value = Amount;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a non-negative integer or decimal string")
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<Amount, E> {
            Ok(Amount::from(v))
        }

        fn visit_u128<E: de::Error>(self, v: u128) -> Result<Amount, E> {
            Ok(v)
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<Amount, E> {
            Amount::try_from(v).map_err(|_| E::custom("amount must not be negative"))
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Amount, E> {
            v.trim()
                .parse::<Amount>()
                .map_err(|_| E::custom(format!("invalid amount {:?}", v)))
        }
    }
}

/// Serde adapter for a list of amounts, element-wise [`decimal_amount`].
pub mod decimal_amounts {
    use serde::ser::SerializeSeq;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use super::Amount;

    #[derive(Serialize, Deserialize)]
    #[serde(transparent)]
    struct Decimal(#[serde(with = "super::decimal_amount")] Amount);

    /// Serialize each amount as a decimal string.
    pub fn serialize<S: Serializer>(amounts: &[Amount], serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(amounts.len()))?;
        for amount in amounts {
            seq.serialize_element(&Decimal(*amount))?;
        }
        seq.end()
    }

    /// Deserialize a list of strings or integers.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Amount>, D::Error> {
        let decoded = Vec::<Decimal>::deserialize(deserializer)?;
        Ok(decoded.into_iter().map(|d| d.0).collect())
    }
}
