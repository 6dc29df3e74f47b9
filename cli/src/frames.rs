//! Frame text in and out. One QR payload per line, hex encoded; blank lines
//! and `#` comments are skipped so scan logs can be annotated by hand.

use std::fs;
use std::io::{self, BufRead, Write};

use anyhow::{Context, Result};

/// Source name meaning stdin.
pub const STDIN: &str = "-";

/// Reads frame lines from a file, or stdin for `-`.
pub fn read_lines(source: &str) -> Result<Vec<String>> {
    let raw = if source == STDIN {
        let mut lines = Vec::new();
        for line in io::stdin().lock().lines() {
            lines.push(line.context("failed to read frames from stdin")?);
        }
        lines
    } else {
        fs::read_to_string(source)
            .with_context(|| format!("failed to read frames from {source}"))?
            .lines()
            .map(str::to_owned)
            .collect()
    };
    Ok(filter_lines(raw))
}

fn filter_lines(raw: Vec<String>) -> Vec<String> {
    raw.into_iter()
        .map(|line| line.trim().to_owned())
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .collect()
}

/// Prints frames to stdout, one per line.
pub fn print(frames: &[String]) -> Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    for frame in frames {
        writeln!(out, "{frame}").context("failed to write frames to stdout")?;
    }
    out.flush()?;
    Ok(())
}

/// Asks a yes/no question on stderr. Anything but `y`/`yes` is a no.
pub fn confirm(question: &str) -> Result<bool> {
    eprint!("{question} [y/N] ");
    io::stderr().flush()?;
    let mut answer = String::new();
    io::stdin()
        .lock()
        .read_line(&mut answer)
        .context("failed to read the answer")?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}
