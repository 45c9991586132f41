use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Object-key path into a JSON document, written dotted (`incident.raw.message`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JsonPath(Vec<String>);

impl JsonPath {
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    /// Parse a dotted path. Empty segments are dropped.
    pub fn parse(dotted: &str) -> Self {
        Self(
            dotted
                .split('.')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
                .collect(),
        )
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Walk the path through nested objects. Any non-object on the way is a miss.
    pub fn lookup<'a>(&self, value: &'a Value) -> Option<&'a Value> {
        if self.0.is_empty() {
            return None;
        }
        self.0
            .iter()
            .try_fold(value, |current, key| current.as_object()?.get(key))
    }

    /// String at the path, trimmed. Blank strings count as missing.
    pub fn lookup_str<'a>(&self, value: &'a Value) -> Option<&'a str> {
        let s = self.lookup(value)?.as_str()?.trim();
        (!s.is_empty()).then_some(s)
    }
}

/// First non-blank string found under any of `paths`, in order.
pub fn first_str<'a>(value: &'a Value, paths: &[JsonPath]) -> Option<&'a str> {
    paths.iter().find_map(|p| p.lookup_str(value))
}

impl fmt::Display for JsonPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("."))
    }
}

impl Serialize for JsonPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for JsonPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::parse(&raw))
    }
}
