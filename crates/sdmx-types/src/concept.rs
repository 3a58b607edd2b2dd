//! Concept roles and attachment levels.
//!
//! Every component of a data structure is a concept playing exactly one role.
//! Attributes additionally carry the level they attach to.

/// The structural level an attribute belongs to.
///
/// # Examples
///
/// ```
/// use sdmx_types::AttachmentLevel;
///
/// let level = AttachmentLevel::Group("SIBLING".to_string());
/// assert_eq!(level.group_name(), Some("SIBLING"));
/// assert_eq!(AttachmentLevel::Series.group_name(), None);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AttachmentLevel {
    /// Attached once for the whole dataset.
    Dataset,
    /// Attached to a named group of series.
    Group(String),
    /// Attached to each series.
    Series,
    /// Attached to each observation.
    Observation,
}

impl AttachmentLevel {
    /// Returns the group name for a group-level attachment.
    pub fn group_name(&self) -> Option<&str> {
        match self {
            Self::Group(name) => Some(name),
            Self::Dataset | Self::Series | Self::Observation => None,
        }
    }
}

/// The role a concept plays in a data structure.
///
/// Role dispatch throughout the engine matches on this enum exhaustively.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ConceptRole {
    /// A key dimension.
    Dimension,
    /// The time dimension.
    TimeDimension,
    /// A dimension whose values enumerate measures.
    MeasureDimension,
    /// An attribute attached at the given level.
    Attribute(AttachmentLevel),
    /// The primary measure carrying the observation value.
    PrimaryMeasure,
    /// An explicit measure in multi-measure structures.
    Measure,
    /// A measure represented as a value of the measure dimension.
    CrossSectionalMeasure,
}

impl ConceptRole {
    /// Returns true for any of the three dimension roles.
    pub fn is_dimension(&self) -> bool {
        match self {
            Self::Dimension | Self::TimeDimension | Self::MeasureDimension => true,
            Self::Attribute(_) | Self::PrimaryMeasure | Self::Measure | Self::CrossSectionalMeasure => {
                false
            }
        }
    }

    /// Returns true for the primary measure and both explicit measure roles.
    pub fn is_measure(&self) -> bool {
        match self {
            Self::PrimaryMeasure | Self::Measure | Self::CrossSectionalMeasure => true,
            Self::Dimension | Self::TimeDimension | Self::MeasureDimension | Self::Attribute(_) => {
                false
            }
        }
    }

    /// Returns the attachment level if this is an attribute role.
    pub fn attachment(&self) -> Option<&AttachmentLevel> {
        match self {
            Self::Attribute(level) => Some(level),
            _ => None,
        }
    }
}

/// A concept of a data structure together with its metadata.
///
/// # Examples
///
/// ```
/// use sdmx_types::{AttachmentLevel, Concept, ConceptRole};
///
/// let status = Concept::attribute("OBS_STATUS", AttachmentLevel::Observation).mandatory();
/// assert!(status.mandatory);
/// assert_eq!(status.role.attachment(), Some(&AttachmentLevel::Observation));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Concept {
    /// Concept identifier, unique within a structure.
    pub id: String,
    /// The role of this concept.
    pub role: ConceptRole,
    /// Whether a value must be supplied.
    pub mandatory: bool,
    /// Whether the value is a sequence of sub-values.
    pub complex: bool,
    /// Declared measure-dimension code of a cross-sectional measure.
    pub code: Option<String>,
}

impl Concept {
    /// Creates a concept with the given role.
    pub fn new(id: impl Into<String>, role: ConceptRole) -> Self {
        Self {
            id: id.into(),
            role,
            mandatory: false,
            complex: false,
            code: None,
        }
    }

    /// Creates a mandatory key dimension.
    pub fn dimension(id: impl Into<String>) -> Self {
        Self::new(id, ConceptRole::Dimension).mandatory()
    }

    /// Creates a mandatory time dimension.
    pub fn time_dimension(id: impl Into<String>) -> Self {
        Self::new(id, ConceptRole::TimeDimension).mandatory()
    }

    /// Creates a mandatory measure dimension.
    pub fn measure_dimension(id: impl Into<String>) -> Self {
        Self::new(id, ConceptRole::MeasureDimension).mandatory()
    }

    /// Creates an optional attribute attached at `level`.
    pub fn attribute(id: impl Into<String>, level: AttachmentLevel) -> Self {
        Self::new(id, ConceptRole::Attribute(level))
    }

    /// Creates the primary measure.
    pub fn primary_measure(id: impl Into<String>) -> Self {
        Self::new(id, ConceptRole::PrimaryMeasure)
    }

    /// Creates an explicit measure.
    pub fn measure(id: impl Into<String>) -> Self {
        Self::new(id, ConceptRole::Measure)
    }

    /// Creates a cross-sectional measure with its declared code.
    pub fn cross_sectional_measure(id: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            ..Self::new(id, ConceptRole::CrossSectionalMeasure)
        }
    }

    /// Marks the concept as mandatory.
    pub fn mandatory(mut self) -> Self {
        self.mandatory = true;
        self
    }

    /// Marks the concept as complex (repeatable).
    pub fn complex(mut self) -> Self {
        self.complex = true;
        self
    }

    /// Returns the declared code, falling back to the concept id.
    pub fn code_or_id(&self) -> &str {
        self.code.as_deref().unwrap_or(&self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_predicates() {
        assert!(ConceptRole::TimeDimension.is_dimension());
        assert!(ConceptRole::MeasureDimension.is_dimension());
        assert!(!ConceptRole::PrimaryMeasure.is_dimension());
        assert!(ConceptRole::CrossSectionalMeasure.is_measure());
        assert!(!ConceptRole::Attribute(AttachmentLevel::Series).is_measure());
    }

    #[test]
    fn test_concept_constructors() {
        let freq = Concept::dimension("FREQ");
        assert!(freq.mandatory);
        assert!(!freq.complex);

        let male = Concept::cross_sectional_measure("OBS_M", "M");
        assert_eq!(male.code_or_id(), "M");
        assert_eq!(Concept::measure("TURNOVER").code_or_id(), "TURNOVER");
    }
}
