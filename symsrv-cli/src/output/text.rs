//! Text output formatting with colors.

use symsrv_core::ServerState;

use super::json::{CheckOutput, FetchOutput, StatusOutput};

// ============================================================================
// ANSI Colors
// ============================================================================

const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const RED: &str = "\x1b[31m";

/// Text formatter with optional colors.
pub struct TextFormatter {
    use_colors: bool,
}

impl TextFormatter {
    /// Creates a new text formatter.
    pub fn new(use_colors: bool) -> Self {
        Self { use_colors }
    }

    fn paint(&self, color: &str, text: &str) -> String {
        if self.use_colors {
            format!("{color}{text}{RESET}")
        } else {
            text.to_string()
        }
    }

    /// One line per fetch: a mark, the build ID, then the path or error.
    pub fn format_fetch(&self, outputs: &[FetchOutput]) -> String {
        let mut lines = Vec::with_capacity(outputs.len());
        for output in outputs {
            let retries = if output.attempts > 1 {
                self.paint(DIM, &format!(" (after {} attempts)", output.attempts))
            } else {
                String::new()
            };
            let line = match (&output.path, &output.error) {
                (Some(path), None) => {
                    format!("{} {} {path}{retries}", self.paint(GREEN, "✓"), output.build_id)
                }
                (Some(path), Some(error)) => format!(
                    "{} {} {path}\n  {}{retries}",
                    self.paint(YELLOW, "!"),
                    output.build_id,
                    self.paint(DIM, error)
                ),
                (None, error) => format!(
                    "{} {} {}{retries}",
                    self.paint(RED, "✗"),
                    output.build_id,
                    error.as_deref().unwrap_or("failed")
                ),
            };
            lines.push(line);
        }
        lines.join("\n")
    }

    /// One line per check.
    pub fn format_check(&self, outputs: &[CheckOutput]) -> String {
        outputs
            .iter()
            .map(|output| {
                if output.available {
                    format!(
                        "{} {} ({}) available",
                        self.paint(GREEN, "✓"),
                        output.build_id,
                        output.file_type
                    )
                } else {
                    format!(
                        "{} {} ({}) {}",
                        self.paint(RED, "✗"),
                        output.build_id,
                        output.file_type,
                        output.error.as_deref().unwrap_or("unavailable")
                    )
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Colored state label.
    pub fn state_label(&self, state: ServerState) -> String {
        let color = match state {
            ServerState::Ready => GREEN,
            ServerState::Auth => RED,
            ServerState::Initializing | ServerState::Busy => YELLOW,
        };
        self.paint(color, &state.to_string())
    }

    /// Multi-line status report.
    pub fn format_status(&self, status: &StatusOutput) -> String {
        let mut lines = vec![
            self.paint(BOLD, &format!("Symbol server: {}", status.server)),
            "─".repeat(40),
            format!("State:        {}", self.state_label(status.state)),
            format!("Ready count:  {}", status.ready_count),
            format!("Retry count:  {}", status.retry_count),
        ];
        if let Some(secs) = status.next_refresh_secs {
            lines.push(format!("Next refresh: in {}", format_duration(secs)));
        }
        if status.downloads.in_flight > 0 {
            lines.push(format!("Downloads:    {} in flight", status.downloads.in_flight));
        }
        if !status.errors.is_empty() {
            lines.push(String::new());
            lines.push(format!("Errors ({}):", status.errors.len()));
            for error in &status.errors {
                lines.push(format!("  {}", self.paint(DIM, error)));
            }
        }
        lines.join("\n")
    }
}

/// Formats seconds as `1h 2m`, `5m 3s`, or `42s`.
pub fn format_duration(secs: u64) -> String {
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;
    if hours > 0 {
        format!("{hours}h {minutes}m")
    } else if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else {
        format!("{seconds}s")
    }
}
