//! Lenient JSON encoding
//!
//! Response bodies are encoded with `serde_json`, but encoding must never
//! fail an invocation. Values serde cannot represent degrade to their
//! string form, and date/time values render as ISO-8601 strings.

use std::fmt::{self, Debug, Display};

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, TimeZone};
use serde::{Serialize, Serializer};
use serde_json::Value;

/// Encode a value as JSON, falling back to its debug string
pub fn to_value<T>(value: &T) -> Value
where
    T: Serialize + Debug + ?Sized,
{
    serde_json::to_value(value).unwrap_or_else(|_| Value::String(format!("{value:?}")))
}

/// Date and time values with an ISO-8601 rendering
pub trait IsoFormat {
    fn isoformat(&self) -> String;
}

impl<Tz: TimeZone> IsoFormat for DateTime<Tz>
where
    Tz::Offset: Display,
{
    fn isoformat(&self) -> String {
        self.to_rfc3339_opts(SecondsFormat::AutoSi, false)
    }
}

impl IsoFormat for NaiveDateTime {
    fn isoformat(&self) -> String {
        self.format("%Y-%m-%dT%H:%M:%S%.f").to_string()
    }
}

impl IsoFormat for NaiveDate {
    fn isoformat(&self) -> String {
        self.format("%Y-%m-%d").to_string()
    }
}

impl IsoFormat for NaiveTime {
    fn isoformat(&self) -> String {
        self.format("%H:%M:%S%.f").to_string()
    }
}

/// Serializer function for `#[serde(serialize_with = "azfunc::json::iso8601")]`
pub fn iso8601<T, S>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
where
    T: IsoFormat,
    S: Serializer,
{
    serializer.serialize_str(&value.isoformat())
}

/// Wrapper serializing a date/time value as an ISO-8601 string
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Iso8601<T>(pub T);

impl<T: IsoFormat> Serialize for Iso8601<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        iso8601(&self.0, serializer)
    }
}

/// Wrapper serializing any `Display` value as its string form
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Stringify<T>(pub T);

impl<T: Display> Serialize for Stringify<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

impl<T: Display> Debug for Stringify<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, Utc};
    use serde_json::json;
    use std::collections::HashMap;
    use std::net::{IpAddr, Ipv4Addr};

    #[test]
    fn test_native_values_encode_directly() {
        assert_eq!(to_value(&json!({"a": 1})), json!({"a": 1}));
        assert_eq!(to_value("hello"), json!("hello"));
        assert_eq!(to_value(&vec![1, 2]), json!([1, 2]));
    }

    #[test]
    fn test_unencodable_value_degrades_to_string() {
        let mut map = HashMap::new();
        map.insert((1, 2), 3);
        assert_eq!(to_value(&map), json!("{(1, 2): 3}"));
    }

    #[test]
    fn test_datetime_isoformat() {
        let dt = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 5).unwrap();
        assert_eq!(dt.isoformat(), "2024-03-01T12:30:05+00:00");

        let offset = FixedOffset::east_opt(2 * 3600).unwrap();
        let dt = offset.with_ymd_and_hms(2024, 3, 1, 12, 30, 5).unwrap();
        assert_eq!(dt.isoformat(), "2024-03-01T12:30:05+02:00");
    }

    #[test]
    fn test_naive_isoformat() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert_eq!(date.isoformat(), "2024-03-01");

        let naive = date.and_hms_opt(8, 0, 0).unwrap();
        assert_eq!(naive.isoformat(), "2024-03-01T08:00:00");

        let precise = date.and_hms_micro_opt(8, 0, 0, 250_000).unwrap();
        assert_eq!(precise.isoformat(), "2024-03-01T08:00:00.250");
    }

    #[test]
    fn test_wrappers_in_documents() {
        let dt = Utc.with_ymd_and_hms(2020, 1, 2, 3, 4, 5).unwrap();
        let doc = json!({
            "at": Iso8601(dt),
            "ip": Stringify(IpAddr::V4(Ipv4Addr::LOCALHOST)),
        });
        assert_eq!(doc["at"], "2020-01-02T03:04:05+00:00");
        assert_eq!(doc["ip"], "127.0.0.1");
    }

    #[test]
    fn test_serialize_with_attribute() {
        #[derive(Serialize)]
        struct Event {
            #[serde(serialize_with = "iso8601")]
            at: NaiveDateTime,
        }

        let at = NaiveDate::from_ymd_opt(2021, 6, 7)
            .unwrap()
            .and_hms_opt(1, 2, 3)
            .unwrap();
        let encoded = serde_json::to_string(&Event { at }).unwrap();
        assert_eq!(encoded, r#"{"at":"2021-06-07T01:02:03"}"#);
    }
}
