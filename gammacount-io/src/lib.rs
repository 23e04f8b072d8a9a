//! gammacount-io: File I/O for gammacount.
//!
//! This crate reads Maestro and `GammaVision` `.Spe` spectra through
//! memory-mapped files, loads JSON reaction-channel tables and writes results
//! as CSV.
//!

mod channels;
mod error;
mod reader;
mod spe;
mod writer;

pub use channels::{parse_channel_table, read_channel_table, ChannelTable};
pub use error::{Error, Result};
pub use reader::MappedFile;
pub use spe::{parse_spe, read_spe, SpeReader};
pub use writer::ResultWriter;
