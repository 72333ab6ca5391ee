//! Utility functions

use regex::Regex;
use std::sync::OnceLock;
use url::Url;

const KB: u64 = 1024;
const MB: u64 = KB * 1024;
const GB: u64 = MB * 1024;
const TB: u64 = GB * 1024;
const PB: u64 = TB * 1024;

/// Format file size in human-readable format
pub fn format_size(size: u64) -> String {
    if size >= TB {
        format!("{:.2} TB", size as f64 / TB as f64)
    } else if size >= GB {
        format!("{:.2} GB", size as f64 / GB as f64)
    } else if size >= MB {
        format!("{:.2} MB", size as f64 / MB as f64)
    } else if size >= KB {
        format!("{:.2} KB", size as f64 / KB as f64)
    } else {
        format!("{} B", size)
    }
}

/// Parse a human-readable size ("1.46 GB", "700MiB", "1,024") into bytes
///
/// Values are rounded to the nearest byte. Anything that is not a number
/// once the unit is stripped yields 0.
pub fn parse_size(text: &str) -> u64 {
    let text = text.trim();
    if text.is_empty() {
        return 0;
    }
    if text.chars().all(|c| c.is_ascii_digit()) {
        return text.parse().unwrap_or(0);
    }

    static UNIT: OnceLock<Regex> = OnceLock::new();
    let unit = UNIT.get_or_init(|| Regex::new(r"(?i)[KMGTPI]*B?").expect("valid unit pattern"));

    let normalized = text.replace([',', ' '], "").to_uppercase();
    let number = unit.replace_all(&normalized, "");
    let value: f64 = match number.parse() {
        Ok(v) => v,
        Err(_) => return 0,
    };

    let multiplier = if normalized.contains("PB") || normalized.contains("PIB") {
        PB
    } else if normalized.contains("TB") || normalized.contains("TIB") {
        TB
    } else if normalized.contains("GB") || normalized.contains("GIB") {
        GB
    } else if normalized.contains("MB") || normalized.contains("MIB") {
        MB
    } else if normalized.contains("KB") || normalized.contains("KIB") {
        KB
    } else {
        1
    };

    (value * multiplier as f64).round().max(0.0) as u64
}

/// Split a URL into (scheme, netloc)
///
/// Scheme-less input is returned as-is with an `http` scheme.
pub fn url_netloc(url: &str) -> (String, String) {
    if url.is_empty() {
        return ("http".to_string(), String::new());
    }
    if !url.starts_with("http") {
        return ("http".to_string(), url.trim_end_matches('/').to_string());
    }
    match Url::parse(url) {
        Ok(parsed) => {
            let mut netloc = parsed.host_str().unwrap_or_default().to_string();
            if let Some(port) = parsed.port() {
                netloc = format!("{}:{}", netloc, port);
            }
            (parsed.scheme().to_string(), netloc)
        }
        Err(_) => ("http".to_string(), String::new()),
    }
}

/// Host part of a URL, used to look sites up by domain
pub fn url_domain(url: &str) -> String {
    url_netloc(url).1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(500), "500 B");
        assert_eq!(format_size(1024), "1.00 KB");
        assert_eq!(format_size(1024 * 1024), "1.00 MB");
        assert_eq!(format_size(1024 * 1024 * 1024), "1.00 GB");
        assert_eq!(format_size(1024 * 1024 * 1024 * 1024), "1.00 TB");
    }

    #[test]
    fn test_parse_size_units() {
        assert_eq!(parse_size("1.46 GB"), (1.46 * GB as f64).round() as u64);
        assert_eq!(parse_size("700 MiB"), 700 * MB);
        assert_eq!(parse_size("2TB"), 2 * TB);
        assert_eq!(parse_size("1,024 KB"), 1024 * KB);
        assert_eq!(parse_size("4096"), 4096);
    }

    #[test]
    fn test_parse_size_garbage() {
        assert_eq!(parse_size(""), 0);
        assert_eq!(parse_size("n/a"), 0);
    }

    #[test]
    fn test_url_netloc() {
        assert_eq!(
            url_netloc("https://example.com/torrents.php"),
            ("https".to_string(), "example.com".to_string())
        );
        assert_eq!(
            url_netloc("http://example.com:8080/"),
            ("http".to_string(), "example.com:8080".to_string())
        );
        assert_eq!(url_netloc("example.com"), ("http".to_string(), "example.com".to_string()));
    }
}
