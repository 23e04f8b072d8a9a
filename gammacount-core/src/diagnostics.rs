//! Severity-tagged diagnostics.
//!
//! Advisory conditions (dead time, infeasible channels, unknown units,
//! discarded skew terms) are reported through the `log` facade and also
//! collected as [`Diagnostic`] values so callers can inspect them.

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Diagnostic severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Severity {
    /// Informational.
    Info,
    /// The result is usable but should be looked at.
    Warning,
}

/// What a diagnostic is about.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum DiagnosticKind {
    /// Initial observed rate implies a dead-time fraction above the advisory level.
    DeadTime { rate: f64, fraction: f64 },
    /// Count time could not be reached in finite time; a sentinel was used.
    InfeasibleCountTime,
    /// Channel inputs failed validation; a sentinel was used.
    RejectedChannel { reason: String },
    /// Unit string was not recognised and was treated as Bq-equivalent atoms.
    UnrecognizedUnits { units: String },
    /// The skew term of a peak area was discarded.
    SkewTermDiscarded { skew: f64, gaussian: f64 },
    /// No seed peak was detected; the window maximum was used.
    SeedFallback { index: usize },
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DeadTime { rate, fraction } => {
                let percent = fraction * 100.0;
                write!(f, "{rate:.1} cps implies {percent:.1}% dead time")
            }
            Self::InfeasibleCountTime => {
                f.write_str("precision target cannot be reached in finite time")
            }
            Self::RejectedChannel { reason } => write!(f, "channel rejected: {reason}"),
            Self::UnrecognizedUnits { units } => {
                write!(f, "unknown units '{units}', using Bq-equivalent atoms")
            }
            Self::SkewTermDiscarded { skew, gaussian } => {
                write!(f, "skew area {skew:.3e} dropped, gaussian {gaussian:.3e}")
            }
            Self::SeedFallback { index } => {
                write!(f, "no seed peak, using window maximum at index {index}")
            }
        }
    }
}

/// A single diagnostic event.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Diagnostic {
    /// Severity.
    pub severity: Severity,
    /// Event payload.
    pub kind: DiagnosticKind,
    /// What the event refers to, e.g. a channel name.
    pub subject: Option<String>,
}

impl Diagnostic {
    /// Creates a warning.
    #[must_use]
    pub fn warning(kind: DiagnosticKind) -> Self {
        Self {
            severity: Severity::Warning,
            kind,
            subject: None,
        }
    }

    /// Creates an informational diagnostic.
    #[must_use]
    pub fn info(kind: DiagnosticKind) -> Self {
        Self {
            severity: Severity::Info,
            kind,
            subject: None,
        }
    }

    /// Attaches a subject.
    #[must_use]
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Forwards the diagnostic to the `log` facade.
    pub fn emit(&self) {
        match self.severity {
            Severity::Warning => log::warn!("{self}"),
            Severity::Info => log::info!("{self}"),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.subject {
            Some(subject) => write!(f, "{subject}: {}", self.kind),
            None => write!(f, "{}", self.kind),
        }
    }
}

/// Ordered collection of diagnostics.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Diagnostics {
    events: Vec<Diagnostic>,
}

impl Diagnostics {
    /// Creates an empty collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a diagnostic and forwards it to the log.
    pub fn push(&mut self, diagnostic: Diagnostic) {
        diagnostic.emit();
        self.events.push(diagnostic);
    }

    /// Records a diagnostic without logging it.
    pub fn record(&mut self, diagnostic: Diagnostic) {
        self.events.push(diagnostic);
    }

    /// Forwards every recorded diagnostic to the log.
    pub fn emit(&self) {
        for diagnostic in &self.events {
            diagnostic.emit();
        }
    }

    /// Appends the events of another collection without logging them again.
    pub fn extend(&mut self, other: Diagnostics) {
        self.events.extend(other.events);
    }

    /// Number of events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Returns true if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Iterates over the events in recording order.
    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.events.iter()
    }

    /// Iterates over warnings only.
    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.events
            .iter()
            .filter(|d| d.severity == Severity::Warning)
    }

    /// Returns true if any event satisfies `pred`.
    pub fn any(&self, pred: impl Fn(&DiagnosticKind) -> bool) -> bool {
        self.events.iter().any(|d| pred(&d.kind))
    }
}

impl IntoIterator for Diagnostics {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.into_iter()
    }
}
