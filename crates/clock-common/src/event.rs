//! Wire format of the payloads exchanged with libclock.
//!
//! Events arrive as UTF-8 JSON objects tagged by an `eventType` field:
//!
//! ```json
//! {"eventType": "clock_alarm", "time": "1718000000", "msg": "wake up"}
//! ```
//!
//! Only `clock_alarm` is recognized. Any other tag decodes to
//! [`ClockEvent::Unknown`] and is ignored by the bridge. The reply of
//! `clock_list_alarms` is a JSON array of `{time, msg}` objects, optionally
//! wrapped in an `{"alarms": [...]}` object.

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Event type tag of an alarm that fired.
pub const ALARM_EVENT_TYPE: &str = "clock_alarm";

/// Asynchronous notification emitted by the library.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "eventType")]
pub enum ClockEvent {
    /// An alarm fired.
    #[serde(rename = "clock_alarm")]
    Alarm(AlarmEvent),
    /// Any event type the bridge does not understand.
    #[serde(other)]
    Unknown,
}

impl ClockEvent {
    /// Decode an event from the raw bytes handed over by the library.
    pub fn decode(bytes: &[u8]) -> Result<Self, EventError> {
        let text = std::str::from_utf8(bytes).map_err(EventError::Utf8)?;
        Self::from_json(text)
    }

    /// Decode an event from its JSON text.
    pub fn from_json(text: &str) -> Result<Self, EventError> {
        serde_json::from_str(text).map_err(EventError::Json)
    }

    /// Encode the event to its JSON text.
    pub fn to_json(&self) -> Result<String, EventError> {
        serde_json::to_string(self).map_err(EventError::Json)
    }
}

/// Payload of a `clock_alarm` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlarmEvent {
    /// Time the alarm fired, in seconds since the Unix epoch.
    #[serde(deserialize_with = "string_or_number")]
    pub time: String,
    /// Message passed when the alarm was set.
    pub msg: String,
}

impl AlarmEvent {
    /// Build an alarm event stamped with the given wall-clock time.
    pub fn at(time: SystemTime, msg: impl Into<String>) -> Self {
        let secs = time
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
            .as_secs();
        Self {
            time: secs.to_string(),
            msg: msg.into(),
        }
    }

    /// Fire time in whole seconds since the Unix epoch, if `time` is numeric.
    #[must_use]
    pub fn epoch_seconds(&self) -> Option<i64> {
        let secs: f64 = self.time.trim().parse().ok()?;
        if !secs.is_finite() {
            return None;
        }
        // Truncation is intended: sub-second precision is not reported.
        #[allow(clippy::cast_possible_truncation)]
        Some(secs.trunc() as i64)
    }

    /// Fire time as a [`SystemTime`], if `time` is numeric and not before the epoch.
    #[must_use]
    pub fn timestamp(&self) -> Option<SystemTime> {
        let secs: f64 = self.time.trim().parse().ok()?;
        if !secs.is_finite() || secs < 0.0 {
            return None;
        }
        UNIX_EPOCH.checked_add(Duration::try_from_secs_f64(secs).ok()?)
    }
}

/// An alarm that is set and has not fired yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledAlarm {
    /// Time the alarm is due, in seconds since the Unix epoch.
    #[serde(deserialize_with = "string_or_number")]
    pub time: String,
    /// Message the alarm will carry.
    pub msg: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum AlarmListing {
    Bare(Vec<ScheduledAlarm>),
    Wrapped { alarms: Vec<ScheduledAlarm> },
}

/// Decode the reply of `clock_list_alarms`.
///
/// An empty reply is treated as an empty list.
pub fn decode_alarm_list(text: &str) -> Result<Vec<ScheduledAlarm>, EventError> {
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    match serde_json::from_str(text).map_err(EventError::Json)? {
        AlarmListing::Bare(alarms) | AlarmListing::Wrapped { alarms } => Ok(alarms),
    }
}

/// Payload decoding errors.
#[derive(Debug, Error)]
pub enum EventError {
    /// Payload bytes are not valid UTF-8.
    #[error("payload is not valid UTF-8: {0}")]
    Utf8(#[source] std::str::Utf8Error),

    /// Payload is not the expected JSON shape.
    #[error("malformed JSON payload: {0}")]
    Json(#[source] serde_json::Error),
}

/// Accept `time` either as a JSON string or as a bare number.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    struct StringOrNumber;

    impl<'de> Visitor<'de> for StringOrNumber {
        type Value = String;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a string or a number")
        }

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(value.to_owned())
        }

        fn visit_string<E>(self, value: String) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(value)
        }

        fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(value.to_string())
        }

        fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(value.to_string())
        }

        fn visit_f64<E>(self, value: f64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(value.to_string())
        }
    }

    deserializer.deserialize_any(StringOrNumber)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_alarm_event() {
        let raw = br#"{"eventType":"clock_alarm","time":"1718000000","msg":"this is my alarm"}"#;
        let event = ClockEvent::decode(raw).unwrap();
        assert_eq!(
            event,
            ClockEvent::Alarm(AlarmEvent {
                time: "1718000000".into(),
                msg: "this is my alarm".into(),
            })
        );
    }

    #[test]
    fn test_numeric_time_is_accepted() {
        let event =
            ClockEvent::from_json(r#"{"eventType":"clock_alarm","time":1718000000,"msg":"x"}"#)
                .unwrap();
        match event {
            ClockEvent::Alarm(alarm) => assert_eq!(alarm.epoch_seconds(), Some(1_718_000_000)),
            ClockEvent::Unknown => panic!("expected alarm event"),
        }
    }

    #[test]
    fn test_unknown_event_type() {
        let event =
            ClockEvent::from_json(r#"{"eventType":"clock_tick","time":"1","extra":true}"#).unwrap();
        assert_eq!(event, ClockEvent::Unknown);
    }

    #[test]
    fn test_missing_event_type_is_malformed() {
        let result = ClockEvent::from_json(r#"{"time":"1","msg":"x"}"#);
        assert!(matches!(result, Err(EventError::Json(_))));
    }

    #[test]
    fn test_alarm_without_msg_is_malformed() {
        let result = ClockEvent::from_json(r#"{"eventType":"clock_alarm","time":"1"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_utf8_is_rejected() {
        let result = ClockEvent::decode(&[0x7b, 0xff, 0xfe, 0x7d]);
        assert!(matches!(result, Err(EventError::Utf8(_))));
    }

    #[test]
    fn test_encoded_alarm_carries_tag() {
        let event = ClockEvent::Alarm(AlarmEvent::at(UNIX_EPOCH + Duration::from_secs(42), "hi"));
        let json = event.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["eventType"], ALARM_EVENT_TYPE);
        assert_eq!(value["time"], "42");
        assert_eq!(value["msg"], "hi");
    }

    #[test]
    fn test_fractional_time() {
        let alarm = AlarmEvent {
            time: "12.75".into(),
            msg: String::new(),
        };
        assert_eq!(alarm.epoch_seconds(), Some(12));
        assert_eq!(
            alarm.timestamp(),
            Some(UNIX_EPOCH + Duration::from_millis(12_750))
        );
    }

    #[test]
    fn test_out_of_range_time() {
        let alarm = AlarmEvent {
            time: "1e300".into(),
            msg: "far future".into(),
        };
        assert_eq!(alarm.timestamp(), None);
    }

    #[test]
    fn test_non_numeric_time() {
        let alarm = AlarmEvent {
            time: "noon".into(),
            msg: String::new(),
        };
        assert_eq!(alarm.epoch_seconds(), None);
        assert_eq!(alarm.timestamp(), None);
    }

    #[test]
    fn test_decode_alarm_list_shapes() {
        let bare = decode_alarm_list(r#"[{"time":"10","msg":"a"},{"time":20,"msg":"b"}]"#).unwrap();
        assert_eq!(bare.len(), 2);
        assert_eq!(bare[1].time, "20");

        let wrapped = decode_alarm_list(r#"{"alarms":[{"time":"10","msg":"a"}]}"#).unwrap();
        assert_eq!(wrapped[0].msg, "a");

        assert!(decode_alarm_list("").unwrap().is_empty());
        assert!(decode_alarm_list("not json").is_err());
    }
}
