//! Activity and population units.

use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Becquerels in one curie.
pub const CURIE_IN_BECQUEREL: f64 = 3.7e10;

/// Unit of an initial activity or population handed to the decay model.
///
/// Parsing never fails: strings that are not one of the known spellings
/// become [`ActivityUnit::Unrecognized`], which the decay model treats as
/// already being in Bq-equivalent atoms and flags with a warning.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(from = "String", into = "String"))]
pub enum ActivityUnit {
    /// Microcuries.
    MicroCurie,
    /// Curies.
    Curie,
    /// Becquerels (decays per second).
    #[default]
    Becquerel,
    /// Number of atoms rather than an activity.
    Atoms,
    /// Anything else; kept verbatim for diagnostics.
    Unrecognized(String),
}

impl ActivityUnit {
    /// Parses a unit string. Accepts `uCi`/`µCi`, `Ci`, `Bq` and `atoms`.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim() {
            "uCi" | "µCi" | "microcurie" => Self::MicroCurie,
            "Ci" | "curie" => Self::Curie,
            "Bq" | "bq" | "becquerel" => Self::Becquerel,
            "atoms" => Self::Atoms,
            other => Self::Unrecognized(other.to_string()),
        }
    }

    /// Multiplier taking a quantity in this unit to Bq (or atoms).
    #[must_use]
    pub fn to_base_factor(&self) -> f64 {
        match self {
            Self::MicroCurie => 1e-6 * CURIE_IN_BECQUEREL,
            Self::Curie => CURIE_IN_BECQUEREL,
            Self::Becquerel | Self::Atoms | Self::Unrecognized(_) => 1.0,
        }
    }

    /// True for the four known units.
    #[must_use]
    pub fn is_recognized(&self) -> bool {
        !matches!(self, Self::Unrecognized(_))
    }

    /// True when the quantity is a number of atoms rather than an activity.
    #[must_use]
    pub fn is_atoms(&self) -> bool {
        matches!(self, Self::Atoms)
    }

    /// Warns through the log facade when the unit is not recognised.
    pub(crate) fn warn_if_unrecognized(&self) {
        if let Self::Unrecognized(raw) = self {
            log::warn!(
                "unknown activity units '{raw}'; valid units are 'uCi', 'Ci', 'Bq' or 'atoms'. \
                 Treating the quantity as Bq-equivalent atoms"
            );
        }
    }
}

impl FromStr for ActivityUnit {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl From<String> for ActivityUnit {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<ActivityUnit> for String {
    fn from(value: ActivityUnit) -> Self {
        value.to_string()
    }
}

impl fmt::Display for ActivityUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MicroCurie => f.write_str("uCi"),
            Self::Curie => f.write_str("Ci"),
            Self::Becquerel => f.write_str("Bq"),
            Self::Atoms => f.write_str("atoms"),
            Self::Unrecognized(raw) => f.write_str(raw),
        }
    }
}
