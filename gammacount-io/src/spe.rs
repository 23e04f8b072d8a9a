//! Maestro / `GammaVision` `.Spe` spectra.
//!
//! The format is line oriented. Sections start with a `$NAME:` line:
//!
//! - `$MEAS_TIM:` next line holds `live real` (s)
//! - `$DATE_MEA:` next line holds `mm/dd/yyyy HH:MM:SS`
//! - `$MCA_CAL:` next line holds the coefficient count, the one after it
//!   `c b a` for `E = a·ch² + b·ch + c`, optionally followed by a unit
//! - `$DATA:` next line holds `first last` channel, then one count per line
//!   until the next section
//!
//! Only `$DATA:` is required; the other sections fall back to defaults.

use std::path::Path;

use chrono::NaiveDateTime;
use gammacount_core::{EnergyCalibration, Spectrum};

use crate::reader::MappedFile;
use crate::{Error, Result};

const DATE_FORMAT: &str = "%m/%d/%Y %H:%M:%S";

/// Reader for `.Spe` files.
pub struct SpeReader {
    file: MappedFile,
}

impl SpeReader {
    /// Opens a `.Spe` file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or memory-mapped.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self {
            file: MappedFile::open(path)?,
        })
    }

    /// Returns the file size in bytes.
    #[must_use]
    pub fn file_size(&self) -> usize {
        self.file.len()
    }

    /// Parses the whole file.
    ///
    /// # Errors
    /// Returns `InvalidFormat` if the file has no usable `$DATA:` section or
    /// a header value cannot be parsed.
    pub fn read(&self) -> Result<Spectrum> {
        let text = String::from_utf8_lossy(self.file.as_bytes());
        parse_spe(&text).map_err(|e| match e {
            Error::InvalidFormat(reason) => {
                let path = self.file.path().display();
                Error::InvalidFormat(format!("{path}: {reason}"))
            }
            other => other,
        })
    }
}

/// Reads a `.Spe` file into a [`Spectrum`].
///
/// # Errors
/// See [`SpeReader::open`] and [`SpeReader::read`].
pub fn read_spe<P: AsRef<Path>>(path: P) -> Result<Spectrum> {
    SpeReader::open(path)?.read()
}

/// Parses `.Spe` text.
///
/// # Errors
/// Returns `InvalidFormat` if there is no usable `$DATA:` section or a header
/// value cannot be parsed.
pub fn parse_spe(text: &str) -> Result<Spectrum> {
    let lines: Vec<&str> = text.lines().map(str::trim).collect();

    let data = section(&lines, "$DATA:")
        .ok_or_else(|| Error::InvalidFormat("missing $DATA: section".into()))?;
    let (first, last) = data
        .first()
        .and_then(|range| {
            let mut it = range.split_whitespace().map(str::parse::<u32>);
            Some((it.next()?.ok()?, it.next()?.ok()?))
        })
        .ok_or_else(|| Error::InvalidFormat("bad $DATA: channel range".into()))?;

    let counts = data[1..]
        .iter()
        .take_while(|line| !line.starts_with('$'))
        .flat_map(|line| line.split_whitespace())
        .map(|token| {
            token
                .parse::<f64>()
                .map_err(|_| Error::InvalidFormat(format!("bad count '{token}'")))
        })
        .collect::<Result<Vec<f64>>>()?;
    let expected = u64::from(last.saturating_sub(first)) + 1;
    if counts.len() as u64 != expected {
        log::warn!(
            "$DATA: declares channels {first}..={last} but holds {} counts",
            counts.len()
        );
    }
    let channels = (first..).take(counts.len()).collect();
    let mut spectrum = Spectrum::new(channels, counts)?;

    if let Some(line) = section(&lines, "$MEAS_TIM:").and_then(|s| s.first()) {
        let times = parse_floats(line)?;
        match times.as_slice() {
            [live, real, ..] => spectrum = spectrum.with_times(*live, *real),
            [live] => spectrum = spectrum.with_times(*live, *live),
            [] => return Err(Error::InvalidFormat("empty $MEAS_TIM: line".into())),
        }
    } else {
        log::warn!("no $MEAS_TIM: section, live time left at zero");
    }

    if let Some(line) = section(&lines, "$DATE_MEA:").and_then(|s| s.first()) {
        let timestamp = NaiveDateTime::parse_from_str(line, DATE_FORMAT)
            .map_err(|e| Error::InvalidFormat(format!("bad date '{line}': {e}")))?;
        spectrum = spectrum.with_timestamp(timestamp);
    }

    if let Some(line) = section(&lines, "$MCA_CAL:").and_then(|s| s.get(1)) {
        let terms = parse_floats(line)?;
        let calibration = match terms.as_slice() {
            [c, b, a, ..] => EnergyCalibration::new(*a, *b, *c),
            [c, b] => EnergyCalibration::new(0.0, *b, *c),
            _ => return Err(Error::InvalidFormat(format!("bad $MCA_CAL: '{line}'"))),
        };
        spectrum = spectrum.with_calibration(calibration);
    } else {
        log::warn!("no $MCA_CAL: section, energies equal channel numbers");
    }

    log::debug!(
        "parsed spectrum: {} channels, live time {} s",
        spectrum.len(),
        spectrum.live_time
    );
    Ok(spectrum)
}

/// Lines following a `$NAME:` header.
fn section<'a>(lines: &'a [&'a str], name: &str) -> Option<&'a [&'a str]> {
    lines
        .iter()
        .position(|line| *line == name)
        .map(|i| &lines[i + 1..])
}

/// Leading numeric fields of a line; a trailing unit such as `keV` is ignored.
fn parse_floats(line: &str) -> Result<Vec<f64>> {
    let values: Vec<f64> = line
        .split_whitespace()
        .map_while(|token| token.parse().ok())
        .collect();
    if values.is_empty() && !line.is_empty() {
        return Err(Error::InvalidFormat(format!("no numbers in '{line}'")));
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::{Datelike, Timelike};

    const SAMPLE: &str = "$SPEC_ID:\r\nAu foil 3\r\n$SPEC_REM:\r\nDET# 1\r\n\
$DATE_MEA:\r\n06/14/2016 09:21:07\r\n$MEAS_TIM:\r\n3600 3612\r\n\
$DATA:\r\n0 7\r\n       0\r\n       3\r\n      17\r\n     120\r\n      16\r\n\
       4\r\n       1\r\n       0\r\n$ROI:\r\n0\r\n$PRESETS:\r\nLive Time\r\n\
$MCA_CAL:\r\n3\r\n1.874105E-001 3.838918E-001 3.468863E-008 keV\r\n";

    #[test]
    fn test_parse_sample() {
        let spectrum = parse_spe(SAMPLE).unwrap();
        assert_eq!(spectrum.channels, (0..8).collect::<Vec<u32>>());
        let counts = [0.0, 3.0, 17.0, 120.0, 16.0, 4.0, 1.0, 0.0];
        assert_eq!(spectrum.counts, counts);
        assert_relative_eq!(spectrum.live_time, 3600.0);
        assert_relative_eq!(spectrum.real_time, 3612.0);

        let timestamp = spectrum.timestamp.unwrap();
        let date = (timestamp.year(), timestamp.month(), timestamp.day());
        assert_eq!(date, (2016, 6, 14));
        let time = (timestamp.hour(), timestamp.minute(), timestamp.second());
        assert_eq!(time, (9, 21, 7));

        assert_relative_eq!(spectrum.calibration.a, 3.468_863e-8);
        assert_relative_eq!(spectrum.calibration.b, 0.383_891_8);
        assert_relative_eq!(spectrum.calibration.c, 0.187_410_5);
    }

    #[test]
    fn test_data_offset_and_missing_headers() {
        let spectrum = parse_spe("$DATA:\n100 102\n5\n6\n7\n").unwrap();
        assert_eq!(spectrum.channels, vec![100, 101, 102]);
        assert_eq!(spectrum.calibration, EnergyCalibration::default());
        assert!(spectrum.timestamp.is_none());
    }

    #[test]
    fn test_rejects_malformed_files() {
        let malformed = [
            "$MEAS_TIM:\n10 10\n",
            "$DATA:\nzero\n1\n",
            "$DATA:\n0 1\n1\nx\n",
            "$DATA:\n0 1\n1\n2\n$DATE_MEA:\nyesterday\n",
            "$DATA:\n0 1\n1\n2\n$MCA_CAL:\n1\nkeV\n",
        ];
        for text in malformed {
            let err = parse_spe(text).unwrap_err();
            assert!(matches!(err, Error::InvalidFormat(_)), "{text:?}");
        }
        // Negative counts are rejected by the spectrum itself.
        let err = parse_spe("$DATA:\n0 1\n1\n-2\n").unwrap_err();
        assert!(matches!(err, Error::CoreError(_)));
    }
}
