//! Account Identity
//!
//! Participants and the bet authority share one principal type.
//!
//! On the wire an id is a UUID string; clients may also send 32-char hex.
//! Binary encodings (the journal) keep the raw 16 bytes.

use std::fmt;
use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};

use crate::core::hash::hash_with_domain;

/// Domain separator for ids derived from external subjects.
const SUBJECT_DOMAIN: &[u8] = b"MULTIBET_ACCOUNT_V1";

/// Unique account identifier (UUID as bytes).
///
/// Implements Ord for deterministic BTreeMap ordering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct AccountId(pub [u8; 16]);

impl AccountId {
    /// Create from raw bytes.
    pub const fn new(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Create from UUID string.
    pub fn from_uuid_str(s: &str) -> Option<Self> {
        uuid::Uuid::parse_str(s)
            .ok()
            .map(|u| Self(*u.as_bytes()))
    }

    /// Convert to UUID string.
    pub fn to_uuid_string(&self) -> String {
        uuid::Uuid::from_bytes(self.0).to_string()
    }

    /// Parse from a 32-character hex string.
    pub fn from_hex(s: &str) -> Option<Self> {
        let bytes = hex::decode(s).ok()?;
        if bytes.len() != 16 {
            return None;
        }
        let mut arr = [0u8; 16];
        arr.copy_from_slice(&bytes);
        Some(Self(arr))
    }

    /// Parse either a UUID or a 32-character hex string.
    pub fn parse(s: &str) -> Option<Self> {
        Self::from_uuid_str(s).or_else(|| Self::from_hex(s))
    }

    /// Derive a deterministic account id from an external subject
    /// (for example the `sub` claim of an auth token).
    pub fn from_subject(subject: &str) -> Self {
        let hash = hash_with_domain(SUBJECT_DOMAIN, subject.as_bytes());

        let mut id = [0u8; 16];
        id.copy_from_slice(&hash[..16]);
        Self(id)
    }

    /// Get raw bytes.
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Short hex prefix for log lines.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl Serialize for AccountId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.collect_str(&uuid::Uuid::from_bytes(self.0))
        } else {
            self.0.serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for AccountId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            deserializer.deserialize_str(AccountIdVisitor)
        } else {
            <[u8; 16]>::deserialize(deserializer).map(Self)
        }
    }
}

struct AccountIdVisitor;

impl<'de> Visitor<'de> for AccountIdVisitor {
    type Value = AccountId;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a UUID or 32-character hex account id")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<AccountId, E> {
        AccountId::parse(v).ok_or_else(|| E::custom(format!("invalid account id {:?}", v)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uuid_round_trip() {
        let id = AccountId::new([0xAB; 16]);
        let parsed = AccountId::from_uuid_str(&id.to_uuid_string());
        assert_eq!(parsed, Some(id));
    }

    #[test]
    fn test_parse_accepts_hex_and_uuid() {
        let id = AccountId::new([1; 16]);
        assert_eq!(AccountId::parse(&id.to_string()), Some(id));
        assert_eq!(AccountId::parse(&id.to_uuid_string()), Some(id));
        assert_eq!(AccountId::parse("not-an-id"), None);
        assert_eq!(AccountId::from_hex("abcd"), None);
    }

    #[test]
    fn test_subject_derivation() {
        let id1 = AccountId::from_subject("user123");
        let id2 = AccountId::from_subject("user123");
        let id3 = AccountId::from_subject("user456");

        assert_eq!(id1, id2);
        assert_ne!(id1, id3);
    }

    #[test]
    fn test_json_uses_uuid_string() {
        let id = AccountId::new([1; 16]);

        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, r#""01010101-0101-0101-0101-010101010101""#);
        assert_eq!(serde_json::from_str::<AccountId>(&json).unwrap(), id);

        let hex = format!(r#""{}""#, id);
        assert_eq!(serde_json::from_str::<AccountId>(&hex).unwrap(), id);
        assert!(serde_json::from_str::<AccountId>("[1,1]").is_err());
    }

    #[test]
    fn test_bincode_keeps_raw_bytes() {
        let id = AccountId::new([0xCD; 16]);
        let bytes = bincode::serialize(&id).unwrap();

        assert_eq!(bytes, vec![0xCD; 16]);
        assert_eq!(bincode::deserialize::<AccountId>(&bytes).unwrap(), id);
    }
}
