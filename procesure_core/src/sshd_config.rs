//! sshd_config patching
//!
//! Line-oriented editing of OpenSSH server configuration files. A file is
//! handled as a list of lines that keep their own terminators, so content we
//! don't touch is written back byte-for-byte (CRLF included).
//!
//! The main entry point is [`upsert_block`], which makes sure a directive
//! block such as `Match User alice` appears exactly once with the requested
//! body, backing up the pristine file the first time it is modified.

use crate::config::validate_username;
use crate::error::{ProcesureError, Result};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// First line written when the config file has to be created
pub const DEFAULT_CONFIG_HEADER: &str = "# Default sshd_config generated by procesure\n";

/// Extension used for the one-time backup copy
pub const BACKUP_EXTENSION: &str = "bak";

/// Indentation used for generated Match block settings
const BLOCK_INDENT: &str = "       ";

/// What [`upsert_lines`] did to the line list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertAction {
    /// The header was missing and the block was appended
    Inserted,
    /// The header existed and its body was replaced
    Replaced,
}

/// Path of the backup copy for a config file (`sshd_config` -> `sshd_config.bak`)
pub fn backup_path(path: &Path) -> PathBuf {
    path.with_extension(BACKUP_EXTENSION)
}

/// Split text into lines, keeping each line's terminator
pub fn split_lines(content: &str) -> Vec<String> {
    content.split_inclusive('\n').map(String::from).collect()
}

fn terminated(line: &str) -> String {
    if line.ends_with('\n') {
        line.to_string()
    } else {
        format!("{}\n", line)
    }
}

fn first_token(line: &str) -> &str {
    line.split_whitespace().next().unwrap_or("")
}

/// A line opens a new block if its first token is `keyword`.
///
/// Keywords compare case-insensitively, as sshd does, so `match User bob`
/// ends a `Match User alice` block.
fn is_block_boundary(line: &str, keyword: &str) -> bool {
    first_token(line).eq_ignore_ascii_case(keyword)
}

/// Text of a line without its terminator
fn strip_terminator(line: &str) -> &str {
    line.strip_suffix('\n')
        .map(|rest| rest.strip_suffix('\r').unwrap_or(rest))
        .unwrap_or(line)
}

/// Reject blocks that could not be found again by a later upsert.
///
/// The header and every body line must be a single line, and no body line
/// may start a new block of the header's kind.
fn validate_block<S: AsRef<str>>(header: &str, body: &[S]) -> Result<()> {
    let header_text = strip_terminator(header);
    if header_text.trim().is_empty() {
        return Err(ProcesureError::InvalidConfig(
            "directive header is empty".to_string(),
        ));
    }
    if header_text.contains(['\n', '\r']) {
        return Err(ProcesureError::InvalidConfig(format!(
            "directive header '{}' spans several lines",
            header_text.escape_debug()
        )));
    }

    let keyword = first_token(header_text);
    for line in body {
        let text = strip_terminator(line.as_ref());
        if text.contains(['\n', '\r']) {
            return Err(ProcesureError::InvalidConfig(format!(
                "block line '{}' spans several lines",
                text.escape_debug()
            )));
        }
        if is_block_boundary(text, keyword) {
            return Err(ProcesureError::InvalidConfig(format!(
                "block line '{}' would start a new '{}' block",
                text.trim(),
                keyword
            )));
        }
    }
    Ok(())
}

/// Insert or replace a directive block in memory.
///
/// The block is located by a line whose trimmed text equals the trimmed
/// `header`. Its body runs until the next line starting with the header's
/// directive keyword (`Match` for `Match User alice`) or the end of the list.
/// Only the body is replaced; the header line is left as it was found.
///
/// When the header is missing, the block is appended after a blank separator
/// line (unless the list is empty or already ends with a blank line).
pub fn upsert_lines<S: AsRef<str>>(lines: &mut Vec<String>, header: &str, body: &[S]) -> UpsertAction {
    let wanted = header.trim();
    let keyword = first_token(wanted);
    let body: Vec<String> = body.iter().map(|line| terminated(line.as_ref())).collect();

    match lines.iter().position(|line| line.trim() == wanted) {
        Some(index) => {
            let start = index + 1;
            let end = lines[start..]
                .iter()
                .position(|line| is_block_boundary(line, keyword))
                .map(|offset| start + offset)
                .unwrap_or(lines.len());

            lines.splice(start..end, body);
            UpsertAction::Replaced
        }
        None => {
            if let Some(last) = lines.last_mut() {
                if !last.ends_with('\n') {
                    last.push('\n');
                }
            }
            if lines.last().is_some_and(|line| !line.trim().is_empty()) {
                lines.push("\n".to_string());
            }

            lines.push(terminated(header));
            lines.extend(body);
            UpsertAction::Inserted
        }
    }
}

/// Set a global directive (e.g. `Port 2222`) in memory.
///
/// Global directives must precede every `Match` block. The first uncommented
/// occurrence of `keyword` before the first `Match` line is rewritten; if
/// there is none, the directive is inserted just before the first `Match`
/// block (ahead of its blank separator lines), or appended at the end.
/// Keywords compare case-insensitively, as sshd does.
pub fn set_directive_lines(lines: &mut Vec<String>, keyword: &str, value: &str) -> UpsertAction {
    let directive = format!("{} {}\n", keyword, value);
    let first_match = lines
        .iter()
        .position(|line| first_token(line).eq_ignore_ascii_case("Match"))
        .unwrap_or(lines.len());

    let existing = lines[..first_match]
        .iter()
        .position(|line| first_token(line).eq_ignore_ascii_case(keyword));

    if let Some(index) = existing {
        lines[index] = directive;
        return UpsertAction::Replaced;
    }

    let mut insert_at = first_match;
    if first_match < lines.len() {
        while insert_at > 0 && lines[insert_at - 1].trim().is_empty() {
            insert_at -= 1;
        }
    } else if let Some(last) = lines.last_mut() {
        if !last.ends_with('\n') {
            last.push('\n');
        }
    }

    lines.insert(insert_at, directive);
    UpsertAction::Inserted
}

/// Quote a directive argument that contains whitespace
fn quote_argument(value: &str) -> String {
    if value.contains(char::is_whitespace) {
        format!("\"{}\"", value)
    } else {
        value.to_string()
    }
}

/// Build the `Match User` block that pins a user's key file and auth policy
pub fn match_user_block(username: &str, authorized_keys_file: &str) -> Result<(String, Vec<String>)> {
    validate_username(username)?;
    if authorized_keys_file.trim().is_empty() || authorized_keys_file.contains(['\n', '\r', '"']) {
        return Err(ProcesureError::InvalidConfig(format!(
            "invalid AuthorizedKeysFile '{}'",
            authorized_keys_file.escape_debug()
        )));
    }

    let header = format!("Match User {}\n", username);
    let body = vec![
        format!(
            "{}AuthorizedKeysFile {}\n",
            BLOCK_INDENT,
            quote_argument(authorized_keys_file)
        ),
        format!("{}AllowTcpForwarding yes\n", BLOCK_INDENT),
        format!("{}PubkeyAuthentication yes\n", BLOCK_INDENT),
        format!("{}PasswordAuthentication no\n", BLOCK_INDENT),
    ];
    Ok((header, body))
}

fn update_error(path: &Path) -> impl Fn(io::Error) -> ProcesureError + '_ {
    move |source| ProcesureError::config_update(path, source)
}

/// Create the config file (and its parent directories) if it is missing
fn ensure_config_file(path: &Path) -> io::Result<()> {
    if path.exists() {
        return Ok(());
    }

    info!("{} not found, creating a new one", path.display());
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(path, DEFAULT_CONFIG_HEADER)
}

/// Copy the file to its backup path unless a backup already exists
fn backup_once(path: &Path) -> io::Result<bool> {
    let backup = backup_path(path);
    if backup.exists() {
        debug!("Backup already exists at {}, skipping backup", backup.display());
        return Ok(false);
    }

    fs::copy(path, &backup)?;
    info!("Backed up {} to {}", path.display(), backup.display());
    Ok(true)
}

/// Run an in-memory edit against a config file on disk.
///
/// Creates the file when missing and takes the one-time backup before the
/// edit. The whole file is rewritten in place.
fn edit_file<F>(path: &Path, edit: F) -> Result<UpsertAction>
where
    F: FnOnce(&mut Vec<String>) -> UpsertAction,
{
    ensure_config_file(path).map_err(update_error(path))?;
    backup_once(path).map_err(update_error(path))?;

    let content = fs::read_to_string(path).map_err(update_error(path))?;
    let mut lines = split_lines(&content);
    let action = edit(&mut lines);

    fs::write(path, lines.concat()).map_err(update_error(path))?;
    Ok(action)
}

/// Ensure `path` contains exactly one up-to-date copy of the block opened by `header`.
///
/// Repeating the call with the same arguments leaves the file byte-identical.
/// Lines outside the located block are never touched. Headers and body lines
/// that would break that guarantee are rejected with `InvalidConfig`.
pub fn upsert_block<S: AsRef<str>>(path: &Path, header: &str, body: &[S]) -> Result<UpsertAction> {
    validate_block(header, body)?;

    let action = edit_file(path, |lines| upsert_lines(lines, header, body))?;
    match action {
        UpsertAction::Inserted => info!("Added '{}' block to {}", header.trim(), path.display()),
        UpsertAction::Replaced => info!("Updated '{}' block in {}", header.trim(), path.display()),
    }
    Ok(action)
}

/// Ensure a global directive such as `Port` has the given value
pub fn set_directive(path: &Path, keyword: &str, value: &str) -> Result<UpsertAction> {
    if keyword.trim().is_empty() || keyword.contains(char::is_whitespace) {
        return Err(ProcesureError::InvalidConfig(format!(
            "invalid directive keyword '{}'",
            keyword
        )));
    }

    let action = edit_file(path, |lines| set_directive_lines(lines, keyword, value))?;
    debug!("Set {} {} in {} ({:?})", keyword, value, path.display(), action);
    Ok(action)
}
