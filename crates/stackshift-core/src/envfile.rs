use crate::error::Result;
use std::path::Path;

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Read and parse a dotenv file.
pub fn load(path: &Path) -> Result<Vec<(String, String)>> {
    let content = std::fs::read_to_string(path)?;
    Ok(parse(&content))
}

/// Parse `KEY=VALUE` content.
///
/// Blank lines and `#` comments are skipped, an `export ` prefix is allowed,
/// and one layer of matching single or double quotes is stripped. A key that
/// appears twice keeps its first position and its last value.
pub fn parse(content: &str) -> Vec<(String, String)> {
    let mut pairs: Vec<(String, String)> = Vec::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").map(str::trim_start).unwrap_or(line);
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let value = unquote(value.trim());
        match pairs.iter_mut().find(|(k, _)| k == key) {
            Some(existing) => existing.1 = value.to_string(),
            None => pairs.push((key.to_string(), value.to_string())),
        }
    }
    pairs
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

// ---------------------------------------------------------------------------
// Key naming
// ---------------------------------------------------------------------------

/// `DB_HOST_NAME` -> `dbHostName`.
pub fn camel_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for (i, word) in key.split(&['_', '-'][..]).filter(|w| !w.is_empty()).enumerate() {
        let lower = word.to_lowercase();
        if i == 0 {
            out.push_str(&lower);
            continue;
        }
        let mut chars = lower.chars();
        if let Some(first) = chars.next() {
            out.extend(first.to_uppercase());
            out.push_str(chars.as_str());
        }
    }
    out
}
