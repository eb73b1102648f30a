//! Normalized check results.
//!
//! Every probe, no matter what it talks to, reduces to a [`StatusRecord`]:
//! one cell of the status table. Records are assembled through
//! [`RecordBuilder`] while a check walks its sub-probe chain and are frozen
//! before they are handed to the renderer.

use serde::Serialize;

/// Severity classification of a record, independent of its display string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Category {
    /// Nothing could be determined.
    Unkn,
    /// Fully healthy.
    Good,
    /// Degraded but functional.
    Warn,
    /// A probe failed.
    Error,
    /// Unreachable at the lowest level.
    Bad,
    /// Transient state (installing, allocated).
    Busy,
    /// Healthy standby, not expected to be active here.
    Passive,
    /// Confirmed down.
    Down,
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unkn => write!(f, "UNKN"),
            Self::Good => write!(f, "GOOD"),
            Self::Warn => write!(f, "WARN"),
            Self::Error => write!(f, "ERROR"),
            Self::Bad => write!(f, "BAD"),
            Self::Busy => write!(f, "BUSY"),
            Self::Passive => write!(f, "PASSIVE"),
            Self::Down => write!(f, "DOWN"),
        }
    }
}

/// One normalized status cell.
///
/// Immutable once published to the renderer. `history` lists the sub-probes
/// attempted in order; `info` names the first failing one so the table can
/// show *which* step failed without the full details text.
#[derive(Debug, Clone, Serialize)]
pub struct StatusRecord {
    /// Key of the column this record belongs to.
    pub column: String,
    /// Short display string, e.g. "OK", "DOWN", "UNMANAGED".
    pub status: String,
    /// Severity classification consistent with `status`.
    pub category: Category,
    /// Names of the sub-probes attempted, in order.
    pub history: Vec<String>,
    /// Short annotation appended to `status` in parentheses.
    pub info: String,
    /// Free-text diagnostics, possibly multi-line; truncated for display.
    pub details: String,
}

impl StatusRecord {
    /// The default "nothing known" record for a column.
    pub fn unknown(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            status: "UNKN".to_string(),
            category: Category::Unkn,
            history: Vec::new(),
            info: String::new(),
            details: String::new(),
        }
    }
}

/// Ordered builder for [`StatusRecord`].
///
/// Checks construct the record fully, then freeze it: `step` appends to the
/// history as each sub-probe starts, the setters refine status and category
/// as the chain progresses, and [`RecordBuilder::fail`] short-circuits with
/// `info` naming the step that broke the chain.
#[derive(Debug, Clone)]
pub struct RecordBuilder {
    record: StatusRecord,
}

impl RecordBuilder {
    /// Start a builder for the given column with UNKN status.
    pub fn new(column: impl Into<String>) -> Self {
        Self {
            record: StatusRecord::unknown(column),
        }
    }

    /// Record that a sub-probe is being attempted.
    pub fn step(&mut self, name: impl Into<String>) {
        self.record.history.push(name.into());
    }

    pub fn set_status(&mut self, status: impl Into<String>) {
        self.record.status = status.into();
    }

    pub fn set_category(&mut self, category: Category) {
        self.record.category = category;
    }

    pub fn set_info(&mut self, info: impl Into<String>) {
        self.record.info = info.into();
    }

    pub fn set_details(&mut self, details: impl Into<String>) {
        self.record.details = details.into();
    }

    /// Append to the details text, space-separated.
    pub fn push_details(&mut self, details: &str) {
        if !self.record.details.is_empty() {
            self.record.details.push(' ');
        }
        self.record.details.push_str(details);
    }

    #[must_use]
    pub fn status(&self) -> &str {
        &self.record.status
    }

    #[must_use]
    pub fn category(&self) -> Category {
        self.record.category
    }

    /// Freeze the record as-is.
    #[must_use]
    pub fn build(self) -> StatusRecord {
        self.record
    }

    /// Freeze the record with `info` naming the last attempted sub-probe.
    ///
    /// This is the fail-fast exit: once a sub-probe fails, no later one runs
    /// and the failing step's name travels with the record.
    #[must_use]
    pub fn fail(mut self) -> StatusRecord {
        if let Some(last) = self.record.history.last() {
            self.record.info = last.clone();
        }
        self.record
    }
}
