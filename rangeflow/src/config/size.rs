//! Human-readable byte sizes for configuration values.

use super::ConfigError;

const KB: u64 = 1024;
const MB: u64 = KB * 1024;
const GB: u64 = MB * 1024;

/// Parse a size such as `5MB`, `512 KB`, `1gb` or `4096`.
///
/// Units are binary multiples. A bare number is bytes.
pub fn parse_size(value: &str) -> Result<u64, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("empty size".to_string());
    }

    let split = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());
    let (number, unit) = trimmed.split_at(split);

    let number: u64 = number
        .parse()
        .map_err(|_| format!("invalid size '{}'", value))?;

    let multiplier = match unit.trim().to_ascii_uppercase().as_str() {
        "" | "B" => 1,
        "K" | "KB" | "KIB" => KB,
        "M" | "MB" | "MIB" => MB,
        "G" | "GB" | "GIB" => GB,
        other => return Err(format!("unknown size unit '{}'", other)),
    };

    number
        .checked_mul(multiplier)
        .ok_or_else(|| format!("size '{}' overflows", value))
}

/// Format a byte count for display, e.g. `5.0 MB`.
pub fn format_size(bytes: u64) -> String {
    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Parse a size found under `[section] key`.
pub(crate) fn parse_size_value(section: &str, key: &str, value: &str) -> Result<u64, ConfigError> {
    parse_size(value).map_err(|reason| ConfigError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
        reason,
    })
}
