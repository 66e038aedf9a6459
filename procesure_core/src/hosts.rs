//! Hosts file aliases

use crate::error::Result;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Whether `content` already maps `ip` to `name`
pub fn has_alias(content: &str, ip: &str, name: &str) -> bool {
    content.lines().any(|line| {
        let entry = line.split('#').next().unwrap_or("");
        let mut fields = entry.split_whitespace();
        fields.next() == Some(ip) && fields.any(|host| host.eq_ignore_ascii_case(name))
    })
}

/// Make sure the hosts file maps `ip` to `name`.
///
/// Appends `ip name` when no entry exists yet; returns whether the file changed.
pub fn ensure_alias(hosts_path: &Path, ip: &str, name: &str) -> Result<bool> {
    let content = if hosts_path.exists() {
        fs::read_to_string(hosts_path)?
    } else {
        String::new()
    };

    if has_alias(&content, ip, name) {
        debug!("Alias '{}' already exists in {}", name, hosts_path.display());
        return Ok(false);
    }

    let mut updated = content;
    if !updated.is_empty() && !updated.ends_with('\n') {
        updated.push('\n');
    }
    updated.push_str(&format!("{} {}\n", ip, name));
    fs::write(hosts_path, updated)?;

    info!("Alias '{}' -> {} added to {}", name, ip, hosts_path.display());
    Ok(true)
}
