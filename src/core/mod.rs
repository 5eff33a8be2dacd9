//! Core deterministic primitives.
//!
//! Exact integer amounts and state hashing. Nothing in this module touches
//! system time, floating point, or hash-ordered collections.

pub mod amount;
pub mod hash;

// Re-export core types
pub use amount::{Amount, AMOUNT_ZERO, mul_div_floor};
pub use hash::{StateHash, StateHasher, hash_with_domain};
