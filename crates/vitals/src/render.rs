//! Aligned, width-constrained table output.
//!
//! [`StatusTable`] prints one header, then one row per host/resource as
//! results arrive, plus an in-place progress line. Workers serialize access
//! through a mutex held only for the brief render call; check execution
//! stays parallel.
//!
//! Consistency guarantee: a row is rendered only when records exist for the
//! full configured column set. A partial row is dropped (debug-logged), never
//! drawn with gaps.

use std::collections::HashMap;
use std::io::Write;

use colored::Colorize;
use tracing::debug;

use crate::record::{Category, StatusRecord};
use crate::scheme::ColorScheme;

const DETAILS_LABEL: &str = "Details";
const TRUNCATION_MARKER: &str = "...";
const BAR_WIDTH: usize = 30;
const CELL_PADDING: usize = 2;

/// Layout and behavior knobs for one table, fixed for the whole run.
#[derive(Debug, Clone)]
pub struct TableSpec {
    /// Label of the first column ("Node", "Checks", ...).
    pub index_label: String,
    /// Width reserved for row keys (longest expected key).
    pub index_width: usize,
    /// Ordered column keys; a row must supply exactly these.
    pub columns: Vec<String>,
    /// Configured minimum width of each status column.
    pub status_col: usize,
    /// Explicit details-column width; 0 derives it from the terminal width.
    pub details_col: usize,
    /// Show the details sub-column.
    pub verbose: bool,
    /// Drop borders and separator rules.
    pub no_table: bool,
    /// Never draw the progress line.
    pub no_statusbar: bool,
    /// Total number of work units, for the progress percentage.
    pub total: usize,
    pub scheme: ColorScheme,
}

/// Incremental table renderer.
pub struct StatusTable {
    spec: TableSpec,
    status_width: usize,
    details_width: usize,
    term_width: usize,
    done: usize,
}

impl StatusTable {
    /// Build a table sized against the detected terminal width.
    #[must_use]
    pub fn new(spec: TableSpec) -> Self {
        let (_, cols) = console::Term::stdout().size();
        Self::with_terminal_width(spec, usize::from(cols).max(40))
    }

    /// Build a table against an explicit terminal width.
    #[must_use]
    pub fn with_terminal_width(spec: TableSpec, term_width: usize) -> Self {
        let label_max = spec
            .columns
            .iter()
            .map(|c| c.chars().count())
            .max()
            .unwrap_or(0);
        let status_width = spec.status_col.max(label_max);
        let index_width = spec.index_width.max(spec.index_label.chars().count());

        let details_width = if spec.details_col > 0 {
            spec.details_col
        } else {
            derived_details_width(term_width, index_width, status_width, spec.columns.len())
        };

        let mut spec = spec;
        spec.index_width = index_width;
        Self {
            spec,
            status_width,
            details_width,
            term_width,
            done: 0,
        }
    }

    /// Work units completed so far. Only ever increases.
    #[must_use]
    pub fn done(&self) -> usize {
        self.done
    }

    fn cell_widths(&self) -> Vec<usize> {
        let mut widths = vec![self.spec.index_width];
        for _ in &self.spec.columns {
            widths.push(self.status_width);
            if self.spec.verbose {
                widths.push(self.details_width);
            }
        }
        widths
    }

    pub fn separator(&self) {
        if self.spec.no_table {
            return;
        }
        let mut out = String::from("+");
        for width in self.cell_widths() {
            out.push_str(&"-".repeat(width + 2 * CELL_PADDING));
            out.push('+');
        }
        println!("{out}");
    }

    pub fn header(&self) {
        self.separator();
        let mut cells = vec![pad(&self.spec.index_label, self.spec.index_width)];
        for column in &self.spec.columns {
            cells.push(pad(&capitalized(column), self.status_width));
            if self.spec.verbose {
                cells.push(pad(DETAILS_LABEL, self.details_width));
            }
        }
        println!("{}", self.join_cells(&cells));
        self.separator();
    }

    /// Render one row, or drop it if the record set does not exactly match
    /// the configured columns or the display filter hides it.
    ///
    /// Returns whether the row was printed. The progress counter is not
    /// touched here; dropped rows still count as checked via [`Self::statusbar`].
    pub fn line(&mut self, row_key: &str, records: &[StatusRecord]) -> bool {
        match self.format_line(row_key, records) {
            Some(text) => {
                println!("{text}");
                true
            }
            None => false,
        }
    }

    /// Build the printable text for one row, applying validation, filtering,
    /// truncation and colorization.
    #[must_use]
    pub fn format_line(&self, row_key: &str, records: &[StatusRecord]) -> Option<String> {
        if self.spec.columns.is_empty() {
            return None;
        }

        let mut by_column: HashMap<&str, &StatusRecord> = HashMap::new();
        for record in records {
            if !self.spec.columns.iter().any(|c| c == &record.column) {
                debug!(
                    row = row_key,
                    column = %record.column,
                    "record column not configured, dropping row"
                );
                return None;
            }
            by_column.insert(record.column.as_str(), record);
        }
        if by_column.len() != self.spec.columns.len() {
            debug!(
                row = row_key,
                got = by_column.len(),
                want = self.spec.columns.len(),
                "incomplete record set, dropping row"
            );
            return None;
        }

        let categories: Vec<Category> = self
            .spec
            .columns
            .iter()
            .map(|c| by_column[c.as_str()].category)
            .collect();
        if self.spec.scheme.row_hidden(&categories) {
            debug!(row = row_key, "row hidden by display filter");
            return None;
        }

        let mut cells = vec![pad(
            &clip(row_key, self.spec.index_width),
            self.spec.index_width,
        )];
        for column in &self.spec.columns {
            let record = by_column[column.as_str()];
            cells.push(self.status_cell(record));
            if self.spec.verbose {
                cells.push(self.details_cell(record));
            }
        }
        Some(self.join_cells(&cells))
    }

    fn join_cells(&self, cells: &[String]) -> String {
        let border = if self.spec.no_table { "" } else { "|" };
        let gap = " ".repeat(CELL_PADDING);
        let mut out = String::from(border);
        for cell in cells {
            out.push_str(&gap);
            out.push_str(cell);
            out.push_str(&gap);
            out.push_str(border);
        }
        out
    }

    /// Status text plus the failed-step annotation, truncated to the column
    /// and colorized over the bare status word only.
    fn status_cell(&self, record: &StatusRecord) -> String {
        let (padded, colored_chars) = self.status_cell_parts(record);
        let color = self.spec.scheme.color(record.category);
        let split = padded
            .char_indices()
            .nth(colored_chars)
            .map_or(padded.len(), |(i, _)| i);
        let (head, tail) = padded.split_at(split);
        format!("{}{}", head.color(color), tail)
    }

    /// Padded cell text and the number of leading chars to colorize.
    fn status_cell_parts(&self, record: &StatusRecord) -> (String, usize) {
        let mut text = record.status.clone();
        if !record.info.is_empty() {
            text.push('(');
            text.push_str(&record.info);
            text.push(')');
        }
        let (truncated, kept) = truncate_marked(&text, self.status_width);
        let colored_chars = record.status.chars().count().min(kept);
        (pad(&truncated, self.status_width), colored_chars)
    }

    /// Details text with newlines escaped, truncated to the column. Never
    /// prints raw multi-line text inside a cell.
    fn details_cell(&self, record: &StatusRecord) -> String {
        let escaped = record.details.replace('\n', "\\n");
        let (truncated, _) = truncate_marked(&escaped, self.details_width);
        pad(&truncated, self.details_width)
    }

    /// Redraw the in-place progress line; `update` advances the counter.
    ///
    /// The counter is monotonic and keeps counting even when drawing is
    /// suppressed, so completion bookkeeping survives `--no-statusbar`.
    pub fn statusbar(&mut self, update: bool) {
        if update {
            self.done += 1;
        }
        if self.spec.no_statusbar {
            return;
        }

        let total = self.spec.total.max(1);
        let progress = 100.0 * self.done as f64 / total as f64;
        let bar_width = BAR_WIDTH.min(self.term_width.saturating_sub(12)).max(1);
        let filled = ((progress / 100.0) * bar_width as f64) as usize;
        let filled = filled.min(bar_width);

        let mut out = format!("{progress:6.2}% [");
        out.push_str(&"|".repeat(filled));
        out.push_str(&".".repeat(bar_width - filled));
        out.push_str("]\r");

        let mut stdout = std::io::stdout();
        let _ = stdout.write_all(out.as_bytes());
        let _ = stdout.flush();
    }
}

/// Evenly divide the terminal width left over after the index and status
/// columns across the details columns, floored at the label width.
fn derived_details_width(
    term_width: usize,
    index_width: usize,
    status_width: usize,
    columns: usize,
) -> usize {
    let columns = columns.max(1);
    let fixed = 1 + (index_width + 2 * CELL_PADDING + 1)
        + columns * (status_width + 2 * CELL_PADDING + 1);
    let per_column = term_width.saturating_sub(fixed) / columns;
    per_column
        .saturating_sub(2 * CELL_PADDING + 1)
        .max(DETAILS_LABEL.len())
}

fn pad(text: &str, width: usize) -> String {
    let len = text.chars().count();
    if len >= width {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len() + width - len);
    out.push_str(text);
    out.extend(std::iter::repeat(' ').take(width - len));
    out
}

fn clip(text: &str, width: usize) -> String {
    text.chars().take(width).collect()
}

/// Truncate to `width` chars, ending in the marker when anything was cut.
/// Returns the text and how many chars of the original were kept.
fn truncate_marked(text: &str, width: usize) -> (String, usize) {
    let len = text.chars().count();
    if len <= width {
        return (text.to_string(), len);
    }
    if width <= TRUNCATION_MARKER.len() {
        return (clip(text, width), width);
    }
    let kept = width - TRUNCATION_MARKER.len();
    let mut out = clip(text, kept);
    out.push_str(TRUNCATION_MARKER);
    (out, kept)
}
