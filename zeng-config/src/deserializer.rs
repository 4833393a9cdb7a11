/// Broker tags are matched case-sensitively downstream, so normalise them on load.
pub mod uppercase {
    use serde::de::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<String>::deserialize(deserializer)?;
        Ok(value
            .map(|broker| broker.trim().to_uppercase())
            .filter(|broker| !broker.is_empty()))
    }
}
