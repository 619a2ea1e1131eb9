//! Message decoration.
//!
//! The relay stamps every inbound text with the server's local wall-clock
//! time of receipt before fanning it out: `"[HH:MM:SS] " + text`.

use chrono::{Local, NaiveTime};

use crate::errors::TransformError;

/// Pure mapping from `(raw_text, receipt_time)` to the decorated broadcast text.
///
/// Implementations must not touch shared state. A failure affects only the
/// one message being transformed.
pub trait MessageTransform: Send + Sync {
    /// Decorate one inbound message.
    fn apply(&self, raw: &str, received_at: NaiveTime) -> Result<String, TransformError>;
}

/// Prefixes the payload with a zero-padded `[HH:MM:SS] ` stamp.
#[derive(Clone, Copy, Debug, Default)]
pub struct TimestampTransform;

impl MessageTransform for TimestampTransform {
    fn apply(&self, raw: &str, received_at: NaiveTime) -> Result<String, TransformError> {
        Ok(format!("[{}] {raw}", received_at.format("%H:%M:%S")))
    }
}

/// Source of the server's receipt time.
pub trait Clock: Send + Sync {
    /// Current local wall-clock time of day.
    fn now(&self) -> NaiveTime;
}

/// Reads the host's local time zone.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveTime {
        Local::now().time()
    }
}

/// Always returns the same time.
#[derive(Clone, Copy, Debug)]
pub struct FixedClock(pub NaiveTime);

impl FixedClock {
    /// Build from hour/minute/second. Returns `None` for out-of-range values.
    pub fn hms(hour: u32, min: u32, sec: u32) -> Option<Self> {
        NaiveTime::from_hms_opt(hour, min, sec).map(Self)
    }
}

impl Clock for FixedClock {
    fn now(&self) -> NaiveTime {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(h: u32, m: u32, s: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, s).unwrap()
    }

    #[test]
    fn stamps_message() {
        let out = TimestampTransform.apply("hello", at(12, 0, 1)).unwrap();
        assert_eq!(out, "[12:00:01] hello");
    }

    #[test]
    fn zero_pads_all_fields() {
        let out = TimestampTransform.apply("x", at(3, 4, 5)).unwrap();
        assert_eq!(out, "[03:04:05] x");
    }

    #[test]
    fn uses_24_hour_clock() {
        let out = TimestampTransform.apply("late", at(23, 59, 59)).unwrap();
        assert_eq!(out, "[23:59:59] late");
    }

    #[test]
    fn drops_subsecond_precision() {
        let t = NaiveTime::from_hms_milli_opt(8, 30, 15, 999).unwrap();
        let out = TimestampTransform.apply("ms", t).unwrap();
        assert_eq!(out, "[08:30:15] ms");
    }

    #[test]
    fn empty_payload_still_stamped() {
        let out = TimestampTransform.apply("", at(0, 0, 0)).unwrap();
        assert_eq!(out, "[00:00:00] ");
    }

    #[test]
    fn preserves_unicode_and_whitespace() {
        let out = TimestampTransform.apply("  héllo 👋\n", at(1, 2, 3)).unwrap();
        assert_eq!(out, "[01:02:03]   héllo 👋\n");
    }

    #[test]
    fn fixed_clock_returns_same_time() {
        let clock = FixedClock::hms(12, 0, 1).unwrap();
        assert_eq!(clock.now(), at(12, 0, 1));
        assert_eq!(clock.now(), clock.now());
    }

    #[test]
    fn fixed_clock_rejects_invalid_time() {
        assert!(FixedClock::hms(24, 0, 0).is_none());
        assert!(FixedClock::hms(0, 60, 0).is_none());
    }

    #[test]
    fn transform_is_object_safe() {
        let t: Box<dyn MessageTransform> = Box::new(TimestampTransform);
        assert_eq!(t.apply("a", at(9, 9, 9)).unwrap(), "[09:09:09] a");
    }
}
