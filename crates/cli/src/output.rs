// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::ValueEnum;

/// Determine if color output should be enabled.
///
/// Delegates to [`crate::color::should_colorize`] — the single source of truth
/// for color detection across the CLI.
pub fn should_use_color() -> bool {
    crate::color::should_colorize()
}

#[derive(Clone, Copy, Debug, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Format a timestamp as relative time (e.g., "5s", "2m", "1h", "3d")
pub fn format_time_ago(epoch_ms: u64) -> String {
    if epoch_ms == 0 {
        return "-".to_string();
    }
    let now_ms = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64;
    let elapsed_secs = now_ms.saturating_sub(epoch_ms) / 1000;
    if elapsed_secs < 60 {
        format!("{}s", elapsed_secs)
    } else if elapsed_secs < 3600 {
        format!("{}m", elapsed_secs / 60)
    } else if elapsed_secs < 86400 {
        format!("{}h", elapsed_secs / 3600)
    } else {
        format!("{}d", elapsed_secs / 86400)
    }
}

/// Print one snapshot of log content, honoring `--output json`.
///
/// The host only exposes a point-in-time read of a task's stdout/stderr
/// (no streaming route), so `--follow` is implemented by the caller
/// re-invoking this with successive snapshots rather than by this
/// function watching anything itself.
pub fn print_log_snapshot(content: &str, format: OutputFormat, label: &str, task_id: &str) {
    match format {
        OutputFormat::Text => {
            if content.is_empty() {
                eprintln!("No {label} output for task {task_id}");
            } else {
                print!("{content}");
                if !content.ends_with('\n') {
                    println!();
                }
            }
        }
        OutputFormat::Json => {
            let obj = serde_json::json!({
                "task_id": task_id,
                "stream": label,
                "lines": content.lines().collect::<Vec<_>>(),
            });
            println!("{}", serde_json::to_string_pretty(&obj).unwrap_or_default());
        }
    }
}

#[cfg(test)]
#[path = "output_tests.rs"]
mod tests;
