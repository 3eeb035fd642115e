//! Named parameters and the slider-style descriptors that bound them.

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParameterError {
    #[error("Unknown parameter: {0}")]
    Unknown(String),
    #[error("Missing value for parameter: {0}")]
    Missing(String),
    #[error("Duplicate parameter: {0}")]
    Duplicate(String),
    #[error("No descriptor for declared parameter: {0}")]
    Undescribed(String),
    #[error("Invalid descriptor for {name}: {reason}")]
    InvalidDescriptor { name: String, reason: String },
}

/// Ordered mapping of parameter name to value.
///
/// Insertion order is preserved so that series and serialized output list
/// parameters in the order the model declares them. Serializes as a map.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterSet {
    entries: Vec<(String, f64)>,
}

impl ParameterSet {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, name: &str, value: f64) -> Self {
        self.insert(name, value);
        self
    }

    /// Sets `name` to `value`, appending it if it is new.
    pub fn insert(&mut self, name: &str, value: f64) {
        match self.entries.iter_mut().find(|(n, _)| n == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name.to_string(), value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| *v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), *v))
    }

    /// Looks up each of `names` in order.
    pub fn values_for(&self, names: &[String]) -> Result<Vec<f64>, ParameterError> {
        names
            .iter()
            .map(|name| {
                self.get(name)
                    .ok_or_else(|| ParameterError::Missing(name.clone()))
            })
            .collect()
    }
}

impl FromIterator<(String, f64)> for ParameterSet {
    fn from_iter<I: IntoIterator<Item = (String, f64)>>(iter: I) -> Self {
        let mut set = ParameterSet::new();
        for (name, value) in iter {
            set.insert(&name, value);
        }
        set
    }
}

impl Serialize for ParameterSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, value) in &self.entries {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ParameterSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SetVisitor;

        impl<'de> Visitor<'de> for SetVisitor {
            type Value = ParameterSet;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of parameter names to numbers")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut set = ParameterSet::new();
                while let Some((name, value)) = access.next_entry::<String, f64>()? {
                    set.insert(&name, value);
                }
                Ok(set)
            }
        }

        deserializer.deserialize_map(SetVisitor)
    }
}

/// Bounds and default of one swept parameter, as a slider would present it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDescriptor {
    pub name: String,
    pub min: f64,
    pub max: f64,
    pub step: f64,
    pub default: f64,
}

impl ParameterDescriptor {
    pub fn new(name: &str, min: f64, max: f64, step: f64, default: f64) -> Self {
        Self {
            name: name.to_string(),
            min,
            max,
            step,
            default,
        }
    }

    pub fn validate(&self) -> Result<(), ParameterError> {
        let invalid = |reason: &str| ParameterError::InvalidDescriptor {
            name: self.name.clone(),
            reason: reason.to_string(),
        };
        if self.name.is_empty() {
            return Err(invalid("name must not be empty"));
        }
        if ![self.min, self.max, self.step, self.default]
            .iter()
            .all(|v| v.is_finite())
        {
            return Err(invalid("bounds, step and default must be finite"));
        }
        if self.min > self.max {
            return Err(invalid("min must not exceed max"));
        }
        if self.step <= 0.0 {
            return Err(invalid("step must be positive"));
        }
        if self.default < self.min || self.default > self.max {
            return Err(invalid("default must lie within [min, max]"));
        }
        Ok(())
    }

    /// Clamps `value` into `[min, max]`. NaN maps to the default.
    pub fn clamp(&self, value: f64) -> f64 {
        if value.is_nan() {
            return self.default;
        }
        value.clamp(self.min, self.max)
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Builds the parameter set holding every descriptor's default.
pub fn defaults(descriptors: &[ParameterDescriptor]) -> ParameterSet {
    descriptors
        .iter()
        .map(|d| (d.name.clone(), d.default))
        .collect()
}

/// Checks descriptors on their own and against the names a derivative
/// function declares. An empty `declared` list skips the cross-check.
pub fn validate_descriptors(
    descriptors: &[ParameterDescriptor],
    declared: &[String],
) -> Result<(), ParameterError> {
    let mut seen = HashSet::new();
    for descriptor in descriptors {
        descriptor.validate()?;
        if !seen.insert(descriptor.name.as_str()) {
            return Err(ParameterError::Duplicate(descriptor.name.clone()));
        }
    }

    if declared.is_empty() {
        return Ok(());
    }

    for name in declared {
        if !seen.contains(name.as_str()) {
            return Err(ParameterError::Undescribed(name.clone()));
        }
    }
    for descriptor in descriptors {
        if !declared.contains(&descriptor.name) {
            return Err(ParameterError::Unknown(descriptor.name.clone()));
        }
    }
    Ok(())
}
