//! User PATH entries

use crate::error::Result;
use crate::executor::{ps_quote, run_checked, CommandSpec, Executor};
use std::path::Path;
use tracing::{debug, info};

fn normalize(entry: &str) -> String {
    entry
        .trim()
        .trim_end_matches(['\\', '/'])
        .to_ascii_lowercase()
}

/// Whether the `;`-separated `path_value` already lists `dir`
pub fn contains_dir(path_value: &str, dir: &str) -> bool {
    let wanted = normalize(dir);
    path_value
        .split(';')
        .any(|entry| !entry.trim().is_empty() && normalize(entry) == wanted)
}

/// Append `dir` to the user's PATH unless it is already there.
///
/// Returns whether PATH was changed.
pub fn ensure_on_user_path(executor: &dyn Executor, dir: &Path) -> Result<bool> {
    let dir = dir.to_string_lossy();
    let query = CommandSpec::powershell(
        "[System.Environment]::GetEnvironmentVariable('Path', 'User')",
    );
    let current = run_checked(executor, &query)?;
    let current = current.stdout_trimmed();

    if contains_dir(current, &dir) {
        debug!("{} is already in PATH", dir);
        return Ok(false);
    }

    let updated = if current.is_empty() {
        dir.to_string()
    } else {
        format!("{};{}", current.trim_end_matches(';'), dir)
    };
    let set = CommandSpec::powershell(format!(
        "[System.Environment]::SetEnvironmentVariable('Path', {}, 'User')",
        ps_quote(&updated)
    ))
    .on_error(format!("Failed to add {} to PATH", dir));
    run_checked(executor, &set)?;

    info!("Added {} to PATH. Restart your terminal to apply changes.", dir);
    Ok(true)
}
