//! CSV writers for schedules and fit results.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use gammacount_algorithms::{PeakReport, PeakWindow, Schedule};

use crate::Result;

/// Writes analysis results as CSV.
pub struct ResultWriter<W: Write> {
    writer: W,
}

impl ResultWriter<BufWriter<File>> {
    /// Creates a writer to a new file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be created.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::create(path)?;
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write> ResultWriter<W> {
    /// Wraps any writer, e.g. a locked stdout.
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// One row per channel, in counting order.
    ///
    /// # Errors
    /// Returns an error if writing fails.
    pub fn write_schedule(&mut self, schedule: &Schedule) -> Result<()> {
        writeln!(
            self.writer,
            "position,foil_group,channel,gamma_energy,efficiency,count_activity,\
             count_activity_uncertainty,start_time,channel_time,count_time"
        )?;
        for (position, slot) in schedule.slots.iter().enumerate() {
            for a in schedule
                .assignments
                .iter()
                .filter(|a| a.foil_group == slot.foil_group)
            {
                writeln!(
                    self.writer,
                    "{},{},{},{},{:.6e},{:.6e},{:.6e},{:.1},{},{}",
                    position + 1,
                    escape(&a.foil_group),
                    escape(&a.name),
                    a.gamma_energy,
                    a.absolute_efficiency,
                    a.count_activity,
                    a.count_activity_uncertainty,
                    slot.start_time,
                    format_time(a.channel_time),
                    format_time(a.count_time),
                )?;
            }
        }
        self.writer.flush()?;
        Ok(())
    }

    /// One row per peak; failed fits keep their window and carry the error.
    ///
    /// # Errors
    /// Returns an error if writing fails.
    pub fn write_peak_reports(&mut self, reports: &[PeakReport]) -> Result<()> {
        writeln!(
            self.writer,
            "peak,energy,low,high,centroid,width,peak_counts,peak_counts_std,\
             reduced_chi_square,status"
        )?;
        for report in reports {
            let (peak, energy) = (report.peak, report.energy);
            let PeakWindow { low, high, .. } = report.window;
            write!(self.writer, "{peak},{energy:.3},{low},{high},")?;
            match &report.outcome {
                Ok(fit) => {
                    let (c, w) = (fit.shape.centroid, fit.shape.width);
                    let (n, s) = (fit.peak_counts, fit.peak_counts_std);
                    let chi = fit.reduced_chi_square;
                    writeln!(self.writer, "{c:.3},{w:.4},{n:.1},{s:.1},{chi:.4},ok")?;
                }
                Err(e) => writeln!(self.writer, ",,,,,{}", escape(&e.to_string()))?,
            }
        }
        self.writer.flush()?;
        Ok(())
    }

    /// One row per window.
    ///
    /// # Errors
    /// Returns an error if writing fails.
    pub fn write_windows(&mut self, windows: &BTreeMap<i64, PeakWindow>) -> Result<()> {
        writeln!(self.writer, "peak,low,high")?;
        for w in windows.values() {
            let PeakWindow { peak, low, high } = *w;
            writeln!(self.writer, "{peak},{low},{high}")?;
        }
        self.writer.flush()?;
        Ok(())
    }

    /// Flushes the writer.
    ///
    /// # Errors
    /// Returns an error if flushing fails.
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    /// Returns the wrapped writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

/// Infeasible times are written as `inf`.
fn format_time(seconds: f64) -> String {
    if seconds < gammacount_core::INFEASIBLE_TIME {
        format!("{seconds:.1}")
    } else {
        "inf".to_string()
    }
}

/// Quotes a CSV field when it contains a separator, quote or newline.
fn escape(field: &str) -> String {
    if field.contains([',', '"', '\n']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gammacount_algorithms::{compute_windows, ScheduleOptimizer, WindowConfig};
    use gammacount_core::{EfficiencyModel, EfficiencyTable, ReactionChannel};
    use tempfile::NamedTempFile;

    fn to_string(writer: ResultWriter<Vec<u8>>) -> String {
        String::from_utf8(writer.into_inner()).unwrap()
    }

    #[test]
    fn test_write_schedule() {
        let channels = vec![
            ReactionChannel::new("Au", 411.8, 232_770.0, 50.0).with_distance(10.0),
            ReactionChannel::new("In", 1293.6, 3_257.0, 800.0)
                .with_name("In116m, 1294 keV")
                .with_distance(10.0),
        ];
        let table = EfficiencyTable::uniform(EfficiencyModel::Constant { efficiency: 0.02 });
        let optimizer = ScheduleOptimizer::default();
        let schedule = optimizer.optimize(&channels, &table).unwrap();

        let mut writer = ResultWriter::new(Vec::new());
        writer.write_schedule(&schedule).unwrap();
        let content = to_string(writer);
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("position,foil_group,channel"));
        assert!(lines[1].starts_with("1,In,\"In116m, 1294 keV\","));
        assert!(lines[2].starts_with("2,Au,Au,"));
    }

    #[test]
    fn test_write_windows_to_file() {
        let file = NamedTempFile::new().unwrap();
        let windows = compute_windows(&[210, 1138], &WindowConfig::default()).unwrap();
        let mut writer = ResultWriter::create(file.path()).unwrap();
        writer.write_windows(&windows).unwrap();
        drop(writer);

        let content = std::fs::read_to_string(file.path()).unwrap();
        assert_eq!(content, "peak,low,high\n210,110,310\n1138,1038,1238\n");
    }

    #[test]
    fn test_escape() {
        assert_eq!(escape("plain"), "plain");
        assert_eq!(escape("a,b"), "\"a,b\"");
        assert_eq!(escape("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(format_time(1e99), "inf");
        assert_eq!(format_time(61.04), "61.0");
    }
}
