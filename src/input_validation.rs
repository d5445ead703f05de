//! Input validation for values sent to the agent.
//!
//! Everything here runs before a request leaves the client, so a bad value
//! surfaces as a local validation error instead of an agent round trip.

use anyhow::{bail, Result};
use url::Url;

const MAX_PATH_LENGTH: usize = 4096;

/// Validate a task UUID as used in `/patches/{uuid}/...` and `CMD` messages.
pub fn validate_task_uuid(uuid: &str) -> Result<()> {
    const MAX_UUID_LENGTH: usize = 100;

    if uuid.is_empty() {
        bail!("Task UUID cannot be empty");
    }

    if uuid.len() > MAX_UUID_LENGTH {
        bail!(
            "Task UUID too long: {} chars (max: {})",
            uuid.len(),
            MAX_UUID_LENGTH
        );
    }

    // Goes into URL path segments verbatim
    if !uuid.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
        bail!("Task UUID contains invalid characters: '{}'", uuid);
    }

    Ok(())
}

pub fn validate_task_label(label: &str) -> Result<()> {
    const MAX_LABEL_LENGTH: usize = 200;

    let trimmed = label.trim();
    if trimmed.is_empty() {
        bail!("Task label cannot be empty");
    }

    if trimmed.chars().count() > MAX_LABEL_LENGTH {
        bail!("Task label too long (max: {} chars)", MAX_LABEL_LENGTH);
    }

    if trimmed.chars().any(char::is_control) {
        bail!("Task label contains control characters");
    }

    Ok(())
}

/// Validate an endpoint URI such as `fs:///home/me/docs` or
/// `router://server/workspace`.
pub fn validate_endpoint_uri(uri: &str) -> Result<()> {
    if uri.trim().is_empty() {
        bail!("Endpoint URI cannot be empty");
    }

    let parsed =
        Url::parse(uri).map_err(|e| anyhow::anyhow!("Invalid endpoint URI '{}': {}", uri, e))?;

    if parsed.scheme().is_empty() {
        bail!("Endpoint URI has no scheme: '{}'", uri);
    }

    Ok(())
}

/// Validate a folder path inside an endpoint, as sent to `POST /tree`.
pub fn validate_tree_path(path: &str) -> Result<()> {
    if path.len() > MAX_PATH_LENGTH {
        bail!("Path too long: {} bytes (max: {})", path.len(), MAX_PATH_LENGTH);
    }

    if path.contains('\0') || path.contains('\n') || path.contains('\r') {
        bail!("Path contains control characters");
    }

    if path.split('/').any(|segment| segment == "..") {
        bail!("Path contains traversal segment: '{}'", path);
    }

    Ok(())
}

/// Validate the selective sync roots of a task. Empty entries are skipped.
pub fn validate_selective_roots(roots: &[String]) -> Result<()> {
    const MAX_ROOTS: usize = 100;

    if roots.len() > MAX_ROOTS {
        bail!(
            "Too many selective roots: {} (max: {})",
            roots.len(),
            MAX_ROOTS
        );
    }

    for root in roots {
        let trimmed = root.trim();
        if trimmed.is_empty() {
            continue;
        }
        validate_tree_path(trimmed)?;
    }

    Ok(())
}
