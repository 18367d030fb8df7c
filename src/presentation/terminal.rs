use super::chart::render_volume_chart;
use super::format::format_entry_line;
use super::DashboardSnapshot;
use crate::query::Filter;
use crate::types::{EntrySource, Level};
use std::fmt::Write;

const DEFAULT_WIDTH: usize = 120;
const CHART_ROWS: usize = 10;
const CLEAR_SCREEN: &str = "\x1b[2J\x1b[H";

/// Terminal width from `COLUMNS`, falling back to 120.
pub fn terminal_width() -> usize {
    std::env::var("COLUMNS")
        .ok()
        .and_then(|c| c.parse().ok())
        .filter(|w: &usize| *w >= 40)
        .unwrap_or(DEFAULT_WIDTH)
}

pub fn status_line(snapshot: &DashboardSnapshot) -> String {
    let mode = if snapshot.live { "Live" } else { "Paused" };
    let source = match snapshot.source {
        EntrySource::Stream => "stream",
        EntrySource::Poll => "poll",
    };
    let mut line = format!(
        "[{}] stream: {} | source: {}",
        mode, snapshot.connection, source
    );
    if snapshot.logs_error.is_some() {
        line.push_str(" | logs: stale (fetch failed)");
    }
    if snapshot.stats_error.is_some() {
        line.push_str(" | stats: stale (fetch failed)");
    }
    line
}

/// Full screen: header counters, status, volume chart and the entry table.
pub fn render_frame(snapshot: &DashboardSnapshot, width: usize) -> String {
    let summary = snapshot.summary();
    let mut out = String::new();
    let _ = writeln!(
        out,
        "LogStream  total: {}  services: {}  errors: {}",
        summary.total, summary.services, summary.errors
    );
    let _ = writeln!(out, "{}", status_line(snapshot));
    let _ = writeln!(out, "{}", "─".repeat(width));

    for row in render_volume_chart(&snapshot.stats, CHART_ROWS, width / 2) {
        let _ = writeln!(out, "{}", row);
    }
    let _ = writeln!(out, "{}", "─".repeat(width));

    if snapshot.entries.is_empty() {
        let empty = if snapshot.logs_error.is_some() {
            "Failed to load logs"
        } else {
            "No logs found"
        };
        let _ = writeln!(out, "{}", empty);
    }
    for entry in &snapshot.entries {
        let _ = writeln!(out, "{}", format_entry_line(entry, width));
    }
    out
}

/// `render_frame` prefixed with the ANSI clear-screen sequence.
pub fn redraw(snapshot: &DashboardSnapshot, width: usize) -> String {
    format!("{}{}", CLEAR_SCREEN, render_frame(snapshot, width))
}

/// A line typed into the `watch` console.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Live,
    Pause,
    Quit,
    /// Empty argument clears the constraint.
    Service(Option<String>),
    Level(Option<Level>),
    Search(Option<String>),
    ClearFilter,
}

pub const CONSOLE_HELP: &str =
    "commands: live | pause | service <name> | level <debug|info|warn|error> | search <text> | clear | quit";

impl ConsoleCommand {
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        let (word, rest) = line.split_once(' ').unwrap_or((line, ""));
        let arg = Some(rest.trim().to_string()).filter(|a| !a.is_empty());
        let command = match word.to_ascii_lowercase().as_str() {
            "live" | "l" => ConsoleCommand::Live,
            "pause" | "p" => ConsoleCommand::Pause,
            "quit" | "q" | "exit" => ConsoleCommand::Quit,
            "service" => ConsoleCommand::Service(arg),
            "level" => match arg {
                None => ConsoleCommand::Level(None),
                Some(raw) => match Level::parse(&raw) {
                    Level::Unknown => return None,
                    level => ConsoleCommand::Level(Some(level)),
                },
            },
            "search" | "/" => ConsoleCommand::Search(arg),
            "clear" => ConsoleCommand::ClearFilter,
            _ => return None,
        };
        Some(command)
    }

    /// The filter after this command, or `None` if it does not touch the filter.
    pub fn apply(&self, current: &Filter) -> Option<Filter> {
        let mut next = current.clone();
        match self {
            ConsoleCommand::Service(service) => next.service = service.clone(),
            ConsoleCommand::Level(level) => next.level = *level,
            ConsoleCommand::Search(search) => next.search = search.clone(),
            ConsoleCommand::ClearFilter => next = Filter::default(),
            _ => return None,
        }
        Some(next)
    }
}
