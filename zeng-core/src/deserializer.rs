pub mod flexible_timestamp {
    use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
    use serde::de::{Deserialize, Deserializer};
    use serde_json::Value;

    /// Accepts epoch milliseconds, RFC 3339 strings, or `YYYY-MM-DD HH:MM:SS` exchange stamps.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<Value>::deserialize(deserializer)?;
        Ok(value.and_then(|value| parse(&value)))
    }

    pub(crate) fn parse(value: &Value) -> Option<DateTime<Utc>> {
        match value {
            Value::Number(num) => num
                .as_i64()
                .and_then(|millis| Utc.timestamp_millis_opt(millis).single()),
            Value::String(text) => DateTime::parse_from_rfc3339(text)
                .map(|ts| ts.with_timezone(&Utc))
                .ok()
                .or_else(|| {
                    NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S")
                        .ok()
                        .map(|naive| Utc.from_utc_datetime(&naive))
                }),
            _ => None,
        }
    }
}
