//! Per-query display state and the panel focus/scroll state machine
//!
//! `PanelState` is owned by the UI loop. Refresh tasks never touch it
//! directly; their results arrive as [`RefreshEvent`]s and are applied here.

use std::ops::Range;

use chrono::{DateTime, Local, Utc};

use crate::backend::BackendError;
use crate::refresh::RefreshEvent;
use crate::series::{DataPoint, Query, TimeSeriesResult};

/// Panels shown side by side once there are more than two queries
pub const MAX_VISIBLE_PANELS: usize = 3;

pub const WAITING_FOOTER: &str = "Time Range: Waiting for data...";

/// Latest state of one configured query
#[derive(Clone, Debug)]
pub struct QueryHistory {
    pub name: String,
    /// Replaced wholesale on each successful refresh
    pub series: TimeSeriesResult,
    /// Set by a failed refresh, cleared by the next success
    pub last_error: Option<BackendError>,
    /// Highest refresh cycle applied to this query (0 = none yet)
    pub last_cycle: u64,
    received: bool,
}

impl QueryHistory {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            series: TimeSeriesResult::default(),
            last_error: None,
            last_cycle: 0,
            received: false,
        }
    }

    /// What the panel should show right now
    pub fn view(&self) -> PanelView<'_> {
        if let Some(err) = &self.last_error {
            return PanelView::Error(err);
        }
        if !self.received {
            return PanelView::Initializing;
        }
        if self.series.is_empty() {
            return PanelView::NoData;
        }
        PanelView::Graph(&self.series)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PanelView<'a> {
    /// No result has arrived yet
    Initializing,
    /// The latest refresh failed; stored data is kept but not shown
    Error(&'a BackendError),
    NoData,
    Graph(&'a TimeSeriesResult),
}

/// Display state for all panels: histories plus focus and scroll position.
///
/// Invariants after every operation:
/// - `focus < len()` when there is at least one panel
/// - `scroll <= len() - visible` (saturating)
/// - `scroll <= focus < scroll + visible`
#[derive(Clone, Debug)]
pub struct PanelState {
    histories: Vec<QueryHistory>,
    focus: usize,
    scroll: usize,
    visible: usize,
}

impl PanelState {
    pub fn new(queries: &[Query]) -> Self {
        Self {
            histories: queries.iter().map(|q| QueryHistory::new(&q.name)).collect(),
            focus: 0,
            scroll: 0,
            visible: visible_count_for(queries.len()),
        }
    }

    pub fn len(&self) -> usize {
        self.histories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.histories.is_empty()
    }

    pub fn histories(&self) -> &[QueryHistory] {
        &self.histories
    }

    pub fn history(&self, index: usize) -> Option<&QueryHistory> {
        self.histories.get(index)
    }

    pub fn focus(&self) -> usize {
        self.focus
    }

    pub fn scroll_offset(&self) -> usize {
        self.scroll
    }

    pub fn visible_count(&self) -> usize {
        self.visible
    }

    /// Indices of the panels currently on screen
    pub fn visible_range(&self) -> Range<usize> {
        let end = (self.scroll + self.visible).min(self.histories.len());
        self.scroll..end
    }

    pub fn focus_next(&mut self) {
        if self.histories.is_empty() {
            return;
        }
        self.focus = (self.focus + 1) % self.histories.len();
        self.scroll_to_show_focus();
    }

    pub fn focus_prev(&mut self) {
        if self.histories.is_empty() {
            return;
        }
        let len = self.histories.len();
        self.focus = (self.focus + len - 1) % len;
        self.scroll_to_show_focus();
    }

    /// Move the window (never the focus) so the focused panel is on screen
    fn scroll_to_show_focus(&mut self) {
        if self.histories.is_empty() || self.visible == 0 {
            return;
        }
        if self.focus >= self.scroll + self.visible {
            self.scroll = self.focus + 1 - self.visible;
        }
        if self.focus < self.scroll {
            self.scroll = self.focus;
        }
        let max_scroll = self.histories.len().saturating_sub(self.visible);
        self.scroll = self.scroll.min(max_scroll);
    }

    /// Store a refresh outcome for one query.
    ///
    /// Success replaces the stored series and clears the error. Failure
    /// records the error and keeps the previous series. An out-of-range index
    /// is ignored. Returns whether anything changed.
    pub fn update(
        &mut self,
        index: usize,
        outcome: Result<TimeSeriesResult, BackendError>,
    ) -> bool {
        let Some(history) = self.histories.get_mut(index) else {
            tracing::debug!(index, "ignoring update for unknown panel");
            return false;
        };

        match outcome {
            Ok(series) => {
                history.series = series;
                history.last_error = None;
            }
            Err(err) => {
                history.last_error = Some(err);
            }
        }
        history.received = true;
        true
    }

    /// Single-point form of [`update`](Self::update)
    #[deprecated(note = "use `update` with a full series")]
    pub fn update_point(&mut self, index: usize, outcome: Result<DataPoint, BackendError>) -> bool {
        self.update(index, outcome.map(TimeSeriesResult::single))
    }

    /// Apply a result from the refresh loop, dropping it if a newer cycle
    /// has already been applied to the same query
    pub fn apply(&mut self, event: RefreshEvent) -> bool {
        let RefreshEvent {
            index,
            cycle,
            outcome,
        } = event;

        let Some(history) = self.histories.get_mut(index) else {
            tracing::debug!(index, cycle, "ignoring refresh for unknown panel");
            return false;
        };
        if cycle < history.last_cycle {
            tracing::debug!(
                index,
                cycle,
                applied = history.last_cycle,
                "dropping stale refresh result"
            );
            return false;
        }
        history.last_cycle = cycle;
        self.update(index, outcome)
    }

    /// Earliest and latest timestamp across every stored series
    pub fn time_range(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        self.histories
            .iter()
            .filter_map(|h| h.series.time_bounds())
            .reduce(|(lo, hi), (l, h)| (lo.min(l), hi.max(h)))
    }

    /// Footer text for the shared time range
    pub fn footer_text(&self) -> String {
        match self.time_range() {
            Some((from, to)) => format!(
                "Time Range: {} to {}",
                format_clock(from),
                format_clock(to)
            ),
            None => WAITING_FOOTER.to_string(),
        }
    }
}

/// Visible panel count for a given number of queries
pub fn visible_count_for(total: usize) -> usize {
    total.min(MAX_VISIBLE_PANELS)
}

/// Format an instant as local HH:MM:SS
pub fn format_clock(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%H:%M:%S").to_string()
}
