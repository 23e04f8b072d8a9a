//! JSON channel tables for the schedule optimiser.
//!
//! ```json
//! {
//!   "units": "uCi",
//!   "channels": [
//!     { "name": "Au197(n,g)Au198", "foil_group": "Au", "gamma_energy": 411.8,
//!       "half_life": 232770.0, "init_activity": 0.05, "foil_radius": 0.635 }
//!   ],
//!   "efficiency": {
//!     "entries": [{ "distance": 10.0, "model": { "kind": "constant", "efficiency": 0.01 } }],
//!     "fallback": { "kind": "log_quadratic", "a": 0.0328, "b": 0.0146, "c": 0.150, "d": -0.016 }
//!   }
//! }
//! ```

use std::fs;
use std::path::Path;

use gammacount_core::{ActivityUnit, EfficiencyTable, ReactionChannel};
use serde::{Deserialize, Serialize};

use crate::Result;

/// Reaction channels together with the efficiency curves of their counting
/// positions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelTable {
    /// Unit of the channels' activities; Bq when absent.
    #[serde(default)]
    pub units: ActivityUnit,
    pub channels: Vec<ReactionChannel>,
    #[serde(default)]
    pub efficiency: EfficiencyTable,
}

/// Reads a channel table from a JSON file.
///
/// # Errors
/// Returns an error if the file cannot be read or is not a valid table.
pub fn read_channel_table<P: AsRef<Path>>(path: P) -> Result<ChannelTable> {
    let text = fs::read_to_string(path)?;
    parse_channel_table(&text)
}

/// Parses a channel table and validates every channel.
///
/// Unnamed channels are named after their foil group.
///
/// # Errors
/// Returns `Json` for malformed documents and `CoreError` for channels that
/// violate their physical invariants.
pub fn parse_channel_table(json: &str) -> Result<ChannelTable> {
    let mut table: ChannelTable = serde_json::from_str(json)?;
    for channel in &mut table.channels {
        if channel.name.is_empty() {
            channel.name.clone_from(&channel.foil_group);
        }
        channel.validate()?;
    }
    log::debug!(
        "channel table: {} channels, {} efficiency positions",
        table.channels.len(),
        table.efficiency.len()
    );
    Ok(table)
}
