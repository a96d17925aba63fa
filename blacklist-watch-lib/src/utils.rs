//! Helpers for reading input URLs and converting user-facing units.

use crate::error::BlacklistError;
use crate::types::UrlEntry;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Gather the URL batch from a single `--url` value and/or a URL file.
///
/// The single URL comes first, then the file's lines in order. Blank lines
/// and lines starting with `#` are skipped. Duplicates are kept so that
/// every input line gets its own disposition.
///
/// # Errors
///
/// - `FileError` if the file cannot be read
/// - `InvalidUrl` if a line is not a usable URL
/// - `InvalidInput` if nothing is left to process
pub fn collect_urls(
    single_url: Option<&str>,
    url_file: Option<&Path>,
) -> Result<Vec<UrlEntry>, BlacklistError> {
    let mut urls = Vec::new();

    if let Some(single) = single_url {
        if !single.trim().is_empty() {
            urls.push(UrlEntry::parse(single)?);
        }
    }

    if let Some(path) = url_file {
        let content = fs::read_to_string(path).map_err(|e| {
            BlacklistError::file_error(
                path.to_string_lossy(),
                format!("Failed to read URL file: {}", e),
            )
        })?;
        urls.extend(parse_url_lines(&content)?);
    }

    if urls.is_empty() {
        return Err(BlacklistError::invalid_input(
            "No URLs provided. Use --url or --file.",
        ));
    }

    Ok(urls)
}

/// Parse newline-delimited URLs, skipping blanks and `#` comment lines.
pub fn parse_url_lines(content: &str) -> Result<Vec<UrlEntry>, BlacklistError> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(UrlEntry::parse)
        .collect()
}

/// Largest interval or timeout accepted, in minutes (one year).
pub const MAX_POLL_MINUTES: f64 = 365.0 * 24.0 * 60.0;

/// Convert a (possibly fractional) number of minutes into a `Duration`.
///
/// # Errors
///
/// Returns `ConfigError` for negative, NaN or infinite values and for
/// anything above `MAX_POLL_MINUTES`.
pub fn minutes_to_duration(minutes: f64) -> Result<Duration, BlacklistError> {
    if !minutes.is_finite() || minutes < 0.0 {
        return Err(BlacklistError::config(format!(
            "Invalid number of minutes '{}': must be a finite, non-negative number",
            minutes
        )));
    }
    if minutes > MAX_POLL_MINUTES {
        return Err(BlacklistError::config(format!(
            "Invalid number of minutes '{}': must be at most {}",
            minutes, MAX_POLL_MINUTES
        )));
    }

    Duration::try_from_secs_f64(minutes * 60.0).map_err(|e| {
        BlacklistError::config(format!("Invalid number of minutes '{}': {}", minutes, e))
    })
}
