//! Dataset records produced by readers and consumed by writers.
//!
//! A dataset is a stream of [`DatasetAttributes`], [`Keyable`]s (group and
//! series keys) and [`Observation`]s. Instances are immutable once handed out.

use std::collections::BTreeMap;

use crate::TimeFormat;

/// A possibly repeated attribute value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AttributeValue {
    /// Attribute concept id.
    pub concept: String,
    /// One value for plain attributes, several for complex ones.
    pub values: Vec<String>,
}

impl AttributeValue {
    /// A single-valued attribute.
    pub fn single(concept: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            concept: concept.into(),
            values: vec![value.into()],
        }
    }

    /// A complex attribute.
    pub fn many<I, S>(concept: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            concept: concept.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// The first value, or `""`.
    pub fn first(&self) -> &str {
        self.values.first().map(String::as_str).unwrap_or("")
    }
}

fn find<'a>(attributes: &'a [AttributeValue], concept: &str) -> Option<&'a AttributeValue> {
    attributes.iter().find(|a| a.concept == concept)
}

/// How a series relates to its observations.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SeriesTiming {
    /// Observations vary by time.
    TimeSeries {
        /// Classified reporting period, when recognisable.
        time_format: Option<TimeFormat>,
    },
    /// Observations vary by a non-time dimension.
    CrossSectional {
        /// The dimension at observation.
        dimension: String,
        /// The time the cross-section refers to, empty if unmapped.
        time: String,
    },
}

/// A series or group key with its attributes.
///
/// # Examples
///
/// ```
/// use sdmx_types::{Keyable, SeriesTiming, TimeFormat};
///
/// let series = Keyable::series(SeriesTiming::TimeSeries { time_format: Some(TimeFormat::Annual) })
///     .with_key("REF_AREA", "GR")
///     .with_key("SEX", "F");
///
/// assert!(!series.is_group());
/// assert_eq!(series.key_value("SEX"), Some("F"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Keyable {
    /// Group id, `None` for a series.
    pub group: Option<String>,
    /// Dimension values keyed by concept id.
    pub key: BTreeMap<String, String>,
    /// Attribute values in structure order.
    pub attributes: Vec<AttributeValue>,
    /// Series timing; `None` for groups.
    pub timing: Option<SeriesTiming>,
}

impl Keyable {
    /// An empty series key.
    pub fn series(timing: SeriesTiming) -> Self {
        Self {
            group: None,
            key: BTreeMap::new(),
            attributes: Vec::new(),
            timing: Some(timing),
        }
    }

    /// An empty group key.
    pub fn group(id: impl Into<String>) -> Self {
        Self {
            group: Some(id.into()),
            key: BTreeMap::new(),
            attributes: Vec::new(),
            timing: None,
        }
    }

    /// Builder-style key value.
    pub fn with_key(mut self, concept: impl Into<String>, value: impl Into<String>) -> Self {
        self.key.insert(concept.into(), value.into());
        self
    }

    /// Builder-style attribute.
    pub fn with_attribute(mut self, attribute: AttributeValue) -> Self {
        self.attributes.push(attribute);
        self
    }

    /// Returns true for group keys.
    pub fn is_group(&self) -> bool {
        self.group.is_some()
    }

    /// Value of a key dimension.
    pub fn key_value(&self, concept: &str) -> Option<&str> {
        self.key.get(concept).map(String::as_str)
    }

    /// Attribute by concept id.
    pub fn attribute(&self, concept: &str) -> Option<&AttributeValue> {
        find(&self.attributes, concept)
    }
}

/// One observation of a series.
///
/// `time` is empty (never absent) when no time concept is mapped. The
/// `coordinate` is the time value for time series, the value of the
/// dimension at observation for cross-sections, or the measure id/code for
/// multi-measure expansions.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Observation {
    /// Time value of the row, empty if unmapped.
    pub time: String,
    /// Observation coordinate.
    pub coordinate: String,
    /// Observation value.
    pub value: String,
    /// Measure concept for multi-measure and cross-sectional expansions.
    pub measure: Option<String>,
    /// Observation-level attributes in structure order.
    pub attributes: Vec<AttributeValue>,
}

impl Observation {
    /// A time-series observation.
    pub fn at_time(time: impl Into<String>, value: impl Into<String>) -> Self {
        let time = time.into();
        Self {
            coordinate: time.clone(),
            time,
            value: value.into(),
            measure: None,
            attributes: Vec::new(),
        }
    }

    /// Builder-style attribute.
    pub fn with_attribute(mut self, attribute: AttributeValue) -> Self {
        self.attributes.push(attribute);
        self
    }

    /// Attribute by concept id.
    pub fn attribute(&self, concept: &str) -> Option<&AttributeValue> {
        find(&self.attributes, concept)
    }
}

/// Attributes attached once per dataset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DatasetAttributes {
    /// Attribute values in structure order.
    pub attributes: Vec<AttributeValue>,
}

impl DatasetAttributes {
    /// Returns true if no attribute has a value.
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Attribute by concept id.
    pub fn get(&self, concept: &str) -> Option<&AttributeValue> {
        find(&self.attributes, concept)
    }
}

/// One item of a dataset stream, in emission order.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DatasetEvent {
    /// Dataset-level attributes; precede any keyable.
    DatasetAttributes(DatasetAttributes),
    /// A group or series key.
    Keyable(Keyable),
    /// An observation of the most recent series key.
    Observation(Observation),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyable_equality_ignores_insertion_order() {
        let timing = SeriesTiming::TimeSeries { time_format: None };
        let a = Keyable::series(timing.clone())
            .with_key("REF_AREA", "GR")
            .with_key("SEX", "F");
        let b = Keyable::series(timing)
            .with_key("SEX", "F")
            .with_key("REF_AREA", "GR");
        assert_eq!(a, b);
    }

    #[test]
    fn test_group_keyable() {
        let group = Keyable::group("SIBLING")
            .with_key("REF_AREA", "GR")
            .with_attribute(AttributeValue::single("TITLE", "Population"));
        assert!(group.is_group());
        assert!(group.timing.is_none());
        assert_eq!(group.attribute("TITLE").map(|a| a.first()), Some("Population"));
    }

    #[test]
    fn test_observation_at_time() {
        let obs = Observation::at_time("2005", "23871")
            .with_attribute(AttributeValue::single("OBS_STATUS", "P"));
        assert_eq!(obs.coordinate, "2005");
        assert_eq!(obs.time, "2005");
        assert!(obs.measure.is_none());
        assert_eq!(obs.attribute("OBS_STATUS").map(|a| a.first()), Some("P"));
    }

    #[test]
    fn test_dataset_attributes_lookup() {
        let attrs = DatasetAttributes {
            attributes: vec![AttributeValue::many("NOTES", ["a", "b"])],
        };
        assert!(!attrs.is_empty());
        assert_eq!(attrs.get("NOTES").map(|a| a.values.len()), Some(2));
        assert!(attrs.get("COLLECTION").is_none());
    }
}
