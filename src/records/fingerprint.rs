use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Content-addressed identity of a post: blake3 of its text followed by its
/// `YYYY-MM-DD` post date, as lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub const HEX_LEN: usize = 64;

    pub fn of(text: &str, post_time: NaiveDate) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(text.as_bytes());
        hasher.update(post_time.format("%Y-%m-%d").to_string().as_bytes());
        Self(hasher.finalize().to_hex().to_string())
    }

    /// Parse a persisted digest. Returns `None` unless `s` is exactly 64
    /// lowercase hex characters.
    pub fn parse(s: &str) -> Option<Self> {
        let valid = s.len() == Self::HEX_LEN
            && s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        valid.then(|| Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_same_text_and_date_collapse() {
        let a = Fingerprint::of("ระบบล่ม", day("2024-01-01"));
        let b = Fingerprint::of("ระบบล่ม", day("2024-01-01"));
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), Fingerprint::HEX_LEN);
    }

    #[test]
    fn test_date_is_part_of_identity() {
        let a = Fingerprint::of("ระบบล่ม", day("2024-01-01"));
        let b = Fingerprint::of("ระบบล่ม", day("2024-01-02"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_digest_covers_text_then_date() {
        let expected = blake3::hash("hello2024-01-01".as_bytes()).to_hex().to_string();
        assert_eq!(Fingerprint::of("hello", day("2024-01-01")).as_str(), expected);
    }

    #[test]
    fn test_parse_round_trips_and_rejects_garbage() {
        let fp = Fingerprint::of("x", day("2024-01-01"));
        assert_eq!(Fingerprint::parse(fp.as_str()), Some(fp));
        assert!(Fingerprint::parse("not-a-digest").is_none());
        assert!(Fingerprint::parse(&"A".repeat(64)).is_none());
        assert!(Fingerprint::parse(&"a".repeat(63)).is_none());
    }
}
