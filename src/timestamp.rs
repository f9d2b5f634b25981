use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{Display, Formatter};
use std::ops::Add;
use std::time::{SystemTime, SystemTimeError};

/// A Unix timestamp represented as a `u64`, used throughout mandate expiry,
/// webhook signing, and hold/escrow deadlines.
///
/// Serialized as a stringified integer to avoid precision loss in JSON clients
/// that parse numbers as IEEE-754 doubles.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Ord, Eq, Hash)]
pub struct UnixTimestamp(pub u64);

impl Serialize for UnixTimestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for UnixTimestamp {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let ts = s
            .parse::<u64>()
            .map_err(|_| serde::de::Error::custom("timestamp must be a non-negative integer"))?;
        Ok(UnixTimestamp(ts))
    }
}

impl Display for UnixTimestamp {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Add<u64> for UnixTimestamp {
    type Output = Self;

    fn add(self, rhs: u64) -> Self::Output {
        UnixTimestamp(self.0 + rhs)
    }
}

impl UnixTimestamp {
    pub fn try_now() -> Result<Self, SystemTimeError> {
        let now = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)?
            .as_secs();
        Ok(Self(now))
    }

    pub fn seconds_since_epoch(&self) -> u64 {
        self.0
    }

    pub fn saturating_sub(&self, rhs: UnixTimestamp) -> u64 {
        self.0.saturating_sub(rhs.0)
    }

    /// Hour-of-day in UTC, `0..24`. Used by the confidence router's
    /// time-of-day factor; computed directly from the epoch offset rather
    /// than through a calendar library.
    pub fn hour_utc(&self) -> u32 {
        ((self.0 / 3600) % 24) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_json() {
        let ts = UnixTimestamp(1_700_000_000);
        let json = serde_json::to_string(&ts).unwrap();
        assert_eq!(json, "\"1700000000\"");
        let back: UnixTimestamp = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ts);
    }

    #[test]
    fn try_now_is_plausible() {
        let now = UnixTimestamp::try_now().unwrap();
        assert!(now.0 > 1_700_000_000);
    }
}
