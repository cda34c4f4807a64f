//! JSON property documents for twin reports, desired patches and method payloads.
//!
//! Numbers are always written with two decimals (`30.00`). A report carrying
//! acknowledgment metadata wraps each property:
//!
//! ```text
//! {"targetTemperature":{"value":30.00,"ac":200,"av":3,"ad":"success"}}
//! ```

use std::fmt;

use serde::de::{self, DeserializeSeed, IgnoredAny, MapAccess, Visitor};
use serde::ser::{self, SerializeMap};
use serde::{Serialize, Serializer};
use serde_json::value::RawValue;
use tracing::debug;

use crate::error::{Error, Result};

/// Key of the desired section inside a full twin document.
pub const DESIRED_KEY: &str = "desired";

/// Key of the version member inside a desired section or patch.
pub const VERSION_KEY: &str = "$version";

/// Acknowledgment attached to a reported property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ack {
    pub code: u16,
    pub version: i64,
    pub description: String,
}

impl Ack {
    /// Successful acknowledgment of the given desired version.
    pub fn success(version: i64) -> Self {
        Self {
            code: 200,
            version,
            description: "success".to_string(),
        }
    }
}

/// A desired property value together with the twin version it came with.
#[derive(Debug, Clone, PartialEq)]
pub struct TwinProperty {
    pub name: String,
    pub value: f64,
    pub version: i64,
}

/// Builder for a single compact JSON object.
#[derive(Debug, Clone, Default)]
pub struct PropertyDocument {
    properties: Vec<(String, f64)>,
    ack: Option<Ack>,
    time_range: Option<(String, String)>,
}

impl PropertyDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a numeric property. Order is preserved in the output.
    pub fn property(mut self, name: impl Into<String>, value: f64) -> Self {
        self.properties.push((name.into(), value));
        self
    }

    /// Wraps every property with acknowledgment metadata.
    pub fn ack(mut self, ack: Ack) -> Self {
        self.ack = Some(ack);
        self
    }

    /// Appends `startTime` and `endTime` members after the properties.
    pub fn time_range(mut self, start: impl Into<String>, end: impl Into<String>) -> Self {
        self.time_range = Some((start.into(), end.into()));
        self
    }

    /// Encodes the document.
    ///
    /// Fails when a value is not finite. The builder is left untouched so
    /// the caller can log and move on.
    pub fn to_vec(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| Error::Encode(e.to_string()))
    }
}

impl Serialize for PropertyDocument {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let extra = if self.time_range.is_some() { 2 } else { 0 };
        let mut map = serializer.serialize_map(Some(self.properties.len() + extra))?;
        for (name, value) in &self.properties {
            let value = Fixed2 { name, value: *value };
            match &self.ack {
                Some(ack) => map.serialize_entry(
                    name,
                    &AckedValue {
                        value,
                        ac: ack.code,
                        av: ack.version,
                        ad: &ack.description,
                    },
                )?,
                None => map.serialize_entry(name, &value)?,
            }
        }
        if let Some((start, end)) = &self.time_range {
            map.serialize_entry("startTime", start)?;
            map.serialize_entry("endTime", end)?;
        }
        map.end()
    }
}

/// A number written with exactly two decimals.
struct Fixed2<'a> {
    name: &'a str,
    value: f64,
}

impl Serialize for Fixed2<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        if !self.value.is_finite() {
            return Err(ser::Error::custom(format!(
                "{} is not a finite number",
                self.name
            )));
        }
        let raw = RawValue::from_string(format!("{:.2}", self.value)).map_err(ser::Error::custom)?;
        raw.serialize(serializer)
    }
}

#[derive(Serialize)]
struct AckedValue<'a> {
    value: Fixed2<'a>,
    ac: u16,
    av: i64,
    ad: &'a str,
}

/// Reads a desired property and its version from a twin document.
///
/// With `expect_wrapper` the property is looked up inside the `desired`
/// member (full document); otherwise at the top level (patch). Members are
/// scanned in order and the first occurrence of the property and of
/// `$version` wins. Once both are found the remaining input is not
/// inspected, so a malformed tail after them is tolerated. Otherwise
/// malformed JSON, a missing wrapper, a missing property or a missing version
/// all yield `None`.
///
/// An acknowledged report (`{"name":{"value":v,"av":n,...}}`) reads back as
/// value `v` with version `n` when no `$version` member is present.
pub fn parse_desired_property(doc: &[u8], name: &str, expect_wrapper: bool) -> Option<TwinProperty> {
    let mut found = Found::default();
    let mut de = serde_json::Deserializer::from_slice(doc);
    let seed = PropertySeed {
        name,
        expect_wrapper,
        found: &mut found,
    };
    if let Err(e) = seed.deserialize(&mut de).and_then(|()| de.end()) {
        if !found.complete {
            debug!("twin document not parsed: {}", e);
            return None;
        }
        debug!("ignoring twin document tail after {}: {}", name, e);
    }

    match (found.value, found.version.or(found.ack_version)) {
        (Some(value), Some(version)) => Some(TwinProperty {
            name: name.to_string(),
            value,
            version,
        }),
        _ => {
            debug!(
                "property {} not found (value={:?}, version={:?})",
                name, found.value, found.version
            );
            None
        }
    }
}

#[derive(Default)]
struct Found {
    value: Option<f64>,
    version: Option<i64>,
    ack_version: Option<i64>,
    /// Both the property and `$version` have been seen.
    complete: bool,
}

struct PropertySeed<'a> {
    name: &'a str,
    expect_wrapper: bool,
    found: &'a mut Found,
}

impl<'de> DeserializeSeed<'de> for PropertySeed<'_> {
    type Value = ();

    fn deserialize<D>(self, deserializer: D) -> std::result::Result<(), D::Error>
    where
        D: de::Deserializer<'de>,
    {
        deserializer.deserialize_map(self)
    }
}

impl<'de> Visitor<'de> for PropertySeed<'_> {
    type Value = ();

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a JSON object")
    }

    fn visit_map<A>(self, mut map: A) -> std::result::Result<(), A::Error>
    where
        A: MapAccess<'de>,
    {
        let PropertySeed {
            name,
            expect_wrapper,
            found,
        } = self;

        if expect_wrapper {
            let mut wrapper_seen = false;
            while let Some(key) = map.next_key::<String>()? {
                if !wrapper_seen && key == DESIRED_KEY {
                    wrapper_seen = true;
                    map.next_value_seed(PropertySeed {
                        name,
                        expect_wrapper: false,
                        found: &mut *found,
                    })?;
                } else {
                    map.next_value::<IgnoredAny>()?;
                }
            }
            return Ok(());
        }

        let mut value_seen = false;
        let mut version_seen = false;
        while let Some(key) = map.next_key::<String>()? {
            if found.complete {
                map.next_value::<IgnoredAny>()?;
            } else if !value_seen && key == name {
                value_seen = true;
                match map.next_value::<serde_json::Value>()? {
                    serde_json::Value::Object(acked) => {
                        found.value = acked.get("value").and_then(|v| v.as_f64());
                        found.ack_version = acked.get("av").and_then(|v| v.as_i64());
                    }
                    other => found.value = other.as_f64(),
                }
            } else if !version_seen && key == VERSION_KEY {
                version_seen = true;
                found.version = map.next_value::<serde_json::Value>()?.as_i64();
            } else {
                map.next_value::<IgnoredAny>()?;
            }
            found.complete = value_seen && version_seen;
        }
        Ok(())
    }
}
