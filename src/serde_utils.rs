use serde::{Deserialize, Deserializer, de::Error};
use std::time::Duration;

/// Deserialize an optional human-readable duration such as `3s` or `500ms`.
pub fn deserialize_optional_duration<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    value
        .map(|v| humantime::parse_duration(v.trim()).map_err(D::Error::custom))
        .transpose()
}
