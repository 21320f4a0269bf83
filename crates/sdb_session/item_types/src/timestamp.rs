use std::{
    fmt,
    ops::Sub,
    str::FromStr,
    sync::atomic::{
        AtomicI64,
        Ordering,
    },
    time::Duration,
};

use chrono::{
    DateTime,
    NaiveDateTime,
    TimeDelta,
    Timelike,
    Utc,
};
use serde::{
    de::Error as _,
    Deserialize,
    Deserializer,
    Serialize,
    Serializer,
};

/// Wire format: ISO-8601 with microsecond precision, UTC implied.
const FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

/// A wall-clock instant stamped on every mutation.
///
/// Timestamps tag journal entries and the per-item marker attribute, and the
/// read path orders journal entries against a marker baseline by comparing
/// them. They render as ISO-8601 UTC with microsecond precision
/// (`2024-05-03T12:34:56.789012`), and the rendered form sorts the same way
/// the instants do.
///
/// All timestamps come from this process's clock; no cross-process ordering
/// is implied.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(NaiveDateTime);

/// The largest microsecond count `now` has handed out, process-wide.
static LAST_ISSUED_MICROS: AtomicI64 = AtomicI64::new(i64::MIN);

impl Timestamp {
    /// The current instant, at the microsecond precision the wire format
    /// carries.
    ///
    /// Consecutive calls are strictly increasing even within one clock tick:
    /// journal replay filters entries strictly after a baseline, so two
    /// mutations sharing a timestamp would hide the second from reads. The
    /// clock advances by one microsecond instead.
    pub fn now() -> Self {
        let mut candidate = Utc::now().timestamp_micros();
        let mut last = LAST_ISSUED_MICROS.load(Ordering::Relaxed);
        loop {
            if candidate <= last {
                candidate = last + 1;
            }
            match LAST_ISSUED_MICROS.compare_exchange_weak(
                last,
                candidate,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(observed) => last = observed,
            }
        }
        let instant = DateTime::from_timestamp_micros(candidate)
            .expect("the system clock is within chrono's representable range")
            .naive_utc();
        Self(instant)
    }

    fn truncated(instant: NaiveDateTime) -> Self {
        let truncated = instant
            .with_nanosecond(instant.nanosecond() / 1_000 * 1_000)
            .expect("truncating nanoseconds cannot leave the valid range");
        Self(truncated)
    }

    /// How long ago `self` was, as seen from `now`. Future timestamps have
    /// zero age.
    pub fn age_at(&self, now: Timestamp) -> Duration {
        (now.0 - self.0).to_std().unwrap_or_default()
    }
}

/// Rewinding a timestamp, mostly for fabricating journal entries of a known
/// age in tests.
impl Sub<Duration> for Timestamp {
    type Output = Timestamp;

    fn sub(self, rhs: Duration) -> Timestamp {
        let delta = TimeDelta::from_std(rhs).expect("duration exceeds the representable range");
        Self::truncated(self.0 - delta)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(FORMAT))
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({self})")
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid timestamp {input:?}: {source}")]
pub struct TimestampParseError {
    input: String,
    source: chrono::ParseError,
}

impl FromStr for Timestamp {
    type Err = TimestampParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NaiveDateTime::parse_from_str(s, FORMAT)
            .map(Self)
            .map_err(|source| TimestampParseError {
                input: s.to_owned(),
                source,
            })
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}
