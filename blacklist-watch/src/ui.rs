//! Terminal output for the blacklist-watch CLI.
//!
//! Colored per-URL status lines, headers and summaries. Uses only the
//! `console` crate.

use blacklist_watch_lib::{
    Authority, BatchSummary, Disposition, PollReport, PollState, SubmissionOutcome, ThreatType,
    UrlEntry, UrlReport,
};
use console::{pad_str, style, Alignment};
use std::path::Path;
use std::time::Duration;

const URL_WIDTH: usize = 40;

// ── Header ───────────────────────────────────────────────────────────────────

/// Print a styled header at the start of a run.
pub fn print_header(url_count: usize, concurrency: usize, check_only: bool) {
    let action = if check_only { "Looking up" } else { "Processing" };
    println!(
        "{} {} {}",
        style("blacklist-watch").bold(),
        style(format!("v{}", env!("CARGO_PKG_VERSION"))).dim(),
        style(format!(
            "- {} {} URL{}",
            action,
            url_count,
            plural(url_count)
        ))
        .dim(),
    );
    println!("{}", style(format!("Concurrency: {}", concurrency)).dim());
    println!();
}

/// Tell the user where the run log is being written.
pub fn print_log_location(path: &Path) {
    eprintln!("{}", style(format!("Logging to {}", path.display())).dim());
}

// ── Pipeline results ─────────────────────────────────────────────────────────

/// Print the final disposition of one URL.
pub fn print_report_line(report: &UrlReport) {
    let padded = pad_str(report.url.as_str(), URL_WIDTH, Alignment::Left, Some(".."));

    match &report.disposition {
        Disposition::AlreadyFlagged { threat_type } => {
            println!(
                "  {}  {}",
                style(&padded).white(),
                style(format!("already flagged ({})", threat_type))
                    .cyan()
                    .bold(),
            );
        }
        Disposition::Polled { submission, poll } => {
            let status = poll_status(poll);
            let styled = match poll.state {
                PollState::Confirmed(_) => style(status).green().bold(),
                _ => style(status).yellow().bold(),
            };
            println!("  {}  {}", style(&padded).white(), styled);

            if let SubmissionOutcome::Failure { reason } = submission {
                println!(
                    "    {} {}",
                    style("└─").dim(),
                    style(format!("submission failed: {}", reason)).red(),
                );
            }
            if poll.lookup_errors > 0 {
                println!(
                    "    {} {}",
                    style("└─").dim(),
                    style(format!(
                        "{} lookup error{} while polling",
                        poll.lookup_errors,
                        plural(poll.lookup_errors as usize)
                    ))
                    .dim(),
                );
            }
        }
    }
}

/// Status text for a finished poll.
fn poll_status(poll: &PollReport) -> String {
    let attempts = format!("{} attempt{}", poll.attempts, plural(poll.attempts as usize));
    match &poll.state {
        PollState::Confirmed(result) => match result.first_threat_type() {
            Some(threat_type) => format!(
                "confirmed after {} ({}, {})",
                attempts,
                threat_type,
                format_elapsed(poll.elapsed)
            ),
            None => format!("confirmed after {}", attempts),
        },
        PollState::TimedOut => format!(
            "timed out after {} ({})",
            attempts,
            format_elapsed(poll.elapsed)
        ),
        PollState::Pending => "pending".to_string(),
    }
}

// ── Lookup-only results ──────────────────────────────────────────────────────

/// Print one `--check-only` result.
pub fn print_check_line(url: &UrlEntry, threat_type: Option<ThreatType>) {
    let padded = pad_str(url.as_str(), URL_WIDTH, Alignment::Left, Some(".."));
    match threat_type {
        Some(threat_type) => println!(
            "  {}  {}",
            style(&padded).white(),
            style(format!("Detected ({})", threat_type)).red().bold(),
        ),
        None => println!(
            "  {}  {}",
            style(&padded).white(),
            style("Not detected").green(),
        ),
    }
}

/// Print the `--check-only` summary bar.
pub fn print_check_summary(total: usize, flagged: usize, authority: Authority) {
    println!(
        "  {}",
        style("────────────────────────────────────────────────────").dim()
    );
    println!(
        "  {} URL{} checked against {}  {}  {}  {}  {}",
        style(total).bold(),
        plural(total),
        authority,
        style("|").dim(),
        style(format!("{} detected", flagged)).red(),
        style("|").dim(),
        style(format!("{} not detected", total - flagged)).green(),
    );
}

// ── Summary ──────────────────────────────────────────────────────────────────

/// Print the final summary bar with colored counts.
pub fn print_summary(summary: &BatchSummary, duration: Duration) {
    println!(
        "  {}",
        style("────────────────────────────────────────────────────").dim()
    );
    println!(
        "  {} URL{} in {}  {}  {}  {}  {}  {}  {}",
        style(summary.total).bold(),
        plural(summary.total),
        format_elapsed(duration),
        style("|").dim(),
        style(format!("{} already flagged", summary.already_flagged)).cyan(),
        style("|").dim(),
        style(format!("{} confirmed", summary.confirmed)).green(),
        style("|").dim(),
        style(format!("{} timed out", summary.timed_out)).yellow(),
    );

    if summary.submission_failures > 0 {
        println!(
            "  {} {}",
            style("•").dim(),
            style(format!(
                "{} submission{} failed",
                summary.submission_failures,
                plural(summary.submission_failures)
            ))
            .red(),
        );
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn plural(count: usize) -> &'static str {
    if count == 1 {
        ""
    } else {
        "s"
    }
}

/// Human-readable duration, coarse enough for polls measured in hours.
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    if secs < 60 {
        format!("{:.1}s", elapsed.as_secs_f64())
    } else if secs < 60 * 60 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else if secs < 24 * 60 * 60 {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    } else {
        format!("{}d {}h", secs / 86_400, (secs % 86_400) / 3600)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blacklist_watch_lib::{LookupResult, ThreatMatch};

    fn report(state: PollState, attempts: u32, elapsed_secs: u64) -> PollReport {
        PollReport {
            state,
            attempts,
            lookup_errors: 0,
            elapsed: Duration::from_secs(elapsed_secs),
        }
    }

    #[test]
    fn test_poll_status_confirmed() {
        let confirmed = PollState::Confirmed(LookupResult::from_matches(vec![ThreatMatch {
            url: "https://bad.example".to_string(),
            threat_type: ThreatType::SocialEngineering,
            platform_type: None,
        }]));
        assert_eq!(
            poll_status(&report(confirmed, 4, 180)),
            "confirmed after 4 attempts (SOCIAL_ENGINEERING, 3m 0s)"
        );
    }

    #[test]
    fn test_poll_status_timed_out() {
        assert_eq!(
            poll_status(&report(PollState::TimedOut, 1, 7200)),
            "timed out after 1 attempt (2h 0m)"
        );
    }

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(Duration::from_millis(1500)), "1.5s");
        assert_eq!(format_elapsed(Duration::from_secs(125)), "2m 5s");
        assert_eq!(format_elapsed(Duration::from_secs(3 * 3600 + 120)), "3h 2m");
        assert_eq!(format_elapsed(Duration::from_secs(14 * 86_400)), "14d 0h");
    }

    #[test]
    fn test_plural() {
        assert_eq!(plural(0), "s");
        assert_eq!(plural(1), "");
        assert_eq!(plural(2), "s");
    }
}
