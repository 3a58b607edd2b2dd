//! Well-known concept identifiers.
//!
//! Cross-domain concept ids that the engine gives special treatment to, plus
//! the ones commonly seen in statistical data structures.
//!
//! # Examples
//!
//! ```
//! use sdmx_types::well_known;
//!
//! assert_eq!(well_known::FREQ, "FREQ");
//! assert_eq!(well_known::TIME_PERIOD, "TIME_PERIOD");
//! ```

// =============================================================================
// Dimensions
// =============================================================================

/// Frequency dimension. Its code drives the series time format.
pub const FREQ: &str = "FREQ";

/// Reference area dimension.
pub const REF_AREA: &str = "REF_AREA";

/// Conventional time dimension id.
pub const TIME_PERIOD: &str = "TIME_PERIOD";

// =============================================================================
// Measures
// =============================================================================

/// Conventional primary measure id.
pub const OBS_VALUE: &str = "OBS_VALUE";

// =============================================================================
// Attributes
// =============================================================================

/// Observation status attribute.
pub const OBS_STATUS: &str = "OBS_STATUS";

/// Observation confidentiality attribute.
pub const OBS_CONF: &str = "OBS_CONF";

/// Series time format attribute.
pub const TIME_FORMAT: &str = "TIME_FORMAT";

/// Unit multiplier attribute.
pub const UNIT_MULT: &str = "UNIT_MULT";
