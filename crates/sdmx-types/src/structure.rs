//! The structure descriptor consumed by the conversion engine.
//!
//! A [`StructureDescriptor`] is the minimal, read-only shape of a data
//! structure definition: the ordered concept list, named groups and the rule
//! for the dimension at observation. It is parsed elsewhere and handed to the
//! engine once per dataset.
//!
//! # Examples
//!
//! ```
//! use sdmx_types::{AttachmentLevel, Concept, StructureDescriptor};
//!
//! let dsd = StructureDescriptor::new(vec![
//!     Concept::dimension("FREQ"),
//!     Concept::dimension("REF_AREA"),
//!     Concept::time_dimension("TIME_PERIOD"),
//!     Concept::primary_measure("OBS_VALUE"),
//!     Concept::attribute("OBS_STATUS", AttachmentLevel::Observation),
//! ]);
//!
//! assert!(dsd.validate().is_ok());
//! assert!(dsd.is_time_series());
//! assert_eq!(dsd.series_dimensions().count(), 2);
//! ```

use crate::{AttachmentLevel, Concept, ConceptRole};

/// Error type for structurally inconsistent descriptors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StructureError {
    /// Two concepts share an id.
    DuplicateConcept(String),
    /// More than one concept claims a role that must be unique.
    DuplicateRole(String),
    /// A group lists a concept that is not a dimension of the structure.
    UnknownGroupDimension {
        /// The group id.
        group: String,
        /// The offending concept id.
        dimension: String,
    },
    /// An attribute attaches to a group that is not declared.
    UnknownGroup(String),
    /// The dimension at observation is not a dimension of the structure.
    InvalidDimensionAtObservation(String),
}

impl std::fmt::Display for StructureError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateConcept(id) => write!(f, "duplicate concept id '{}'", id),
            Self::DuplicateRole(role) => write!(f, "more than one {} declared", role),
            Self::UnknownGroupDimension { group, dimension } => {
                write!(f, "group '{}' references unknown dimension '{}'", group, dimension)
            }
            Self::UnknownGroup(group) => write!(f, "attribute attached to undeclared group '{}'", group),
            Self::InvalidDimensionAtObservation(id) => {
                write!(f, "dimension at observation '{}' is not a dimension", id)
            }
        }
    }
}

impl std::error::Error for StructureError {}

/// A named group of series identified by a subset of the dimensions.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GroupDescriptor {
    /// Group identifier.
    pub id: String,
    /// Dimension ids making up the group key, in structure order.
    pub dimensions: Vec<String>,
}

impl GroupDescriptor {
    /// Creates a group over the given dimensions.
    pub fn new<I, S>(id: impl Into<String>, dimensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: id.into(),
            dimensions: dimensions.into_iter().map(Into::into).collect(),
        }
    }
}

/// Rule selecting the dimension that varies within a series.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DimensionAtObservation {
    /// The time dimension; falls back to the last key dimension when the
    /// structure has no time dimension.
    #[default]
    Time,
    /// An explicitly named dimension.
    Dimension(String),
}

/// Minimal read-only data structure definition.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StructureDescriptor {
    /// Concepts in declaration order.
    pub concepts: Vec<Concept>,
    /// Named groups.
    pub groups: Vec<GroupDescriptor>,
    /// Dimension-at-observation rule.
    pub dimension_at_observation: DimensionAtObservation,
}

impl StructureDescriptor {
    /// Creates a descriptor with no groups and time at observation.
    pub fn new(concepts: Vec<Concept>) -> Self {
        Self {
            concepts,
            groups: Vec::new(),
            dimension_at_observation: DimensionAtObservation::Time,
        }
    }

    /// Adds a named group.
    pub fn with_group(mut self, group: GroupDescriptor) -> Self {
        self.groups.push(group);
        self
    }

    /// Sets the dimension-at-observation rule.
    pub fn with_dimension_at_observation(mut self, rule: DimensionAtObservation) -> Self {
        self.dimension_at_observation = rule;
        self
    }

    /// Checks internal consistency of the descriptor.
    pub fn validate(&self) -> Result<(), StructureError> {
        let mut seen = std::collections::HashSet::new();
        let mut time_dimensions = 0;
        let mut primary_measures = 0;

        for concept in &self.concepts {
            if !seen.insert(concept.id.as_str()) {
                return Err(StructureError::DuplicateConcept(concept.id.clone()));
            }
            match &concept.role {
                ConceptRole::TimeDimension => time_dimensions += 1,
                ConceptRole::PrimaryMeasure => primary_measures += 1,
                ConceptRole::Attribute(AttachmentLevel::Group(group)) => {
                    if self.group(group).is_none() {
                        return Err(StructureError::UnknownGroup(group.clone()));
                    }
                }
                _ => {}
            }
        }

        if time_dimensions > 1 {
            return Err(StructureError::DuplicateRole("time dimension".to_string()));
        }
        if primary_measures > 1 {
            return Err(StructureError::DuplicateRole("primary measure".to_string()));
        }

        for group in &self.groups {
            for dimension in &group.dimensions {
                let known = self.concept(dimension).is_some_and(|c| c.role.is_dimension());
                if !known {
                    return Err(StructureError::UnknownGroupDimension {
                        group: group.id.clone(),
                        dimension: dimension.clone(),
                    });
                }
            }
        }

        if let DimensionAtObservation::Dimension(id) = &self.dimension_at_observation {
            if !self.concept(id).is_some_and(|c| c.role.is_dimension()) {
                return Err(StructureError::InvalidDimensionAtObservation(id.clone()));
            }
        }

        Ok(())
    }

    /// Looks up a concept by id.
    pub fn concept(&self, id: &str) -> Option<&Concept> {
        self.concepts.iter().find(|c| c.id == id)
    }

    /// Looks up a group by id.
    pub fn group(&self, id: &str) -> Option<&GroupDescriptor> {
        self.groups.iter().find(|g| g.id == id)
    }

    /// Returns true if the concept is declared complex.
    pub fn is_complex(&self, id: &str) -> bool {
        self.concept(id).is_some_and(|c| c.complex)
    }

    /// Returns the time dimension, if any.
    pub fn time_dimension(&self) -> Option<&Concept> {
        self.concepts
            .iter()
            .find(|c| c.role == ConceptRole::TimeDimension)
    }

    /// Returns the primary measure, if any.
    pub fn primary_measure(&self) -> Option<&Concept> {
        self.concepts
            .iter()
            .find(|c| c.role == ConceptRole::PrimaryMeasure)
    }

    /// Returns all concepts with the given role, in declaration order.
    pub fn with_role<'a>(&'a self, role: &'a ConceptRole) -> impl Iterator<Item = &'a Concept> + 'a {
        self.concepts.iter().filter(move |c| &c.role == role)
    }

    /// Returns the explicit measures in declaration order.
    pub fn measures(&self) -> impl Iterator<Item = &Concept> {
        self.concepts.iter().filter(|c| c.role == ConceptRole::Measure)
    }

    /// Returns the cross-sectional measures in declaration order.
    pub fn cross_sectional_measures(&self) -> impl Iterator<Item = &Concept> {
        self.concepts
            .iter()
            .filter(|c| c.role == ConceptRole::CrossSectionalMeasure)
    }

    /// Returns the attributes attached at `level`, in declaration order.
    pub fn attributes_at<'a>(
        &'a self,
        level: &'a AttachmentLevel,
    ) -> impl Iterator<Item = &'a Concept> + 'a {
        self.concepts
            .iter()
            .filter(move |c| c.role.attachment() == Some(level))
    }

    /// Resolves the id of the dimension at observation.
    ///
    /// Returns `None` only when the structure has no dimension that could
    /// serve as one.
    pub fn dimension_at_observation_id(&self) -> Option<&str> {
        match &self.dimension_at_observation {
            DimensionAtObservation::Dimension(id) => Some(id),
            DimensionAtObservation::Time => self
                .time_dimension()
                .or_else(|| {
                    self.concepts
                        .iter()
                        .rev()
                        .find(|c| c.role == ConceptRole::Dimension)
                })
                .map(|c| c.id.as_str()),
        }
    }

    /// Returns true when a time dimension exists and is the dimension at
    /// observation.
    pub fn is_time_series(&self) -> bool {
        match (self.time_dimension(), self.dimension_at_observation_id()) {
            (Some(time), Some(at_obs)) => time.id == at_obs,
            _ => false,
        }
    }

    /// Returns the dimensions making up a series key.
    ///
    /// These are the plain key dimensions; the time dimension, the measure
    /// dimension and a non-time dimension at observation are excluded.
    pub fn series_dimensions(&self) -> impl Iterator<Item = &Concept> {
        let at_obs = if self.is_time_series() {
            None
        } else {
            self.dimension_at_observation_id()
        };
        self.concepts
            .iter()
            .filter(move |c| c.role == ConceptRole::Dimension && Some(c.id.as_str()) != at_obs)
    }

    /// Returns concept ids in natural column order: dimensions, then
    /// measures, then attributes, each in declaration order.
    pub fn natural_order(&self) -> Vec<&str> {
        let dimensions = self.concepts.iter().filter(|c| c.role.is_dimension());
        let measures = self.concepts.iter().filter(|c| c.role.is_measure());
        let attributes = self.concepts.iter().filter(|c| c.role.attachment().is_some());
        dimensions
            .chain(measures)
            .chain(attributes)
            .map(|c| c.id.as_str())
            .collect()
    }
}
