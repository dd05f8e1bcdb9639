//! Loose `key: value` / `key=value` extraction for tool output.
//!
//! Tools emit either `ConvertTo-Json` dumps or flat `key=value` lines. Neither
//! is trusted to be well formed, so nothing here returns an error: unknown
//! lines are skipped and values that fail numeric coercion read as absent.

use std::collections::HashMap;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fields {
    values: HashMap<String, String>,
}

impl Fields {
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn f64(&self, key: &str) -> Option<f64> {
        self.get(key)?.parse::<f64>().ok().filter(|v| v.is_finite())
    }

    pub fn i64(&self, key: &str) -> Option<i64> {
        let raw = self.get(key)?;
        raw.parse::<i64>()
            .ok()
            .or_else(|| raw.parse::<f64>().ok().filter(|v| v.is_finite()).map(|v| v as i64))
    }

    pub fn u64(&self, key: &str) -> Option<u64> {
        self.i64(key).and_then(|v| u64::try_from(v).ok())
    }

    fn insert(&mut self, key: &str, value: String) {
        self.values.insert(key.to_string(), value);
    }
}

/// Collects the recognized keys in `raw`. Repeated keys keep the last value.
pub fn parse_fields(raw: &str, keys: &[&str]) -> Fields {
    let mut fields = Fields::default();
    for (key, value) in pairs(raw, keys) {
        fields.insert(key, value);
    }
    fields
}

/// Like [`parse_fields`], but starts a new record whenever a key repeats
/// within the current one. Used for `ConvertTo-Json` arrays.
pub fn parse_records(raw: &str, keys: &[&str]) -> Vec<Fields> {
    let mut records = Vec::new();
    let mut current = Fields::default();
    for (key, value) in pairs(raw, keys) {
        if current.contains(key) {
            records.push(std::mem::take(&mut current));
        }
        current.insert(key, value);
    }
    if !current.is_empty() {
        records.push(current);
    }
    records
}

fn pairs<'a, 'k: 'a>(raw: &'a str, keys: &[&'k str]) -> impl Iterator<Item = (&'k str, String)> + 'a {
    let keys = keys.to_vec();
    raw.lines().filter_map(move |line| {
        let (key, value) = split_line(line)?;
        let key = keys.iter().find(|k| k.eq_ignore_ascii_case(key))?;
        Some((*key, value))
    })
}

fn split_line(line: &str) -> Option<(&str, String)> {
    let idx = line.find([':', '='])?;
    let key = trim_punctuation(line[..idx].trim());
    if key.is_empty() {
        return None;
    }
    Some((key, trim_punctuation(line[idx + 1..].trim()).to_string()))
}

/// Strips one trailing comma and one layer of surrounding quotes.
fn trim_punctuation(value: &str) -> &str {
    let value = value.strip_suffix(',').unwrap_or(value).trim_end();
    let value = value.strip_prefix(['"', '\'']).unwrap_or(value);
    value.strip_suffix(['"', '\'']).unwrap_or(value).trim()
}

/// Best-effort float parse that accepts decimal commas and unit suffixes.
pub fn parse_f64_loose(input: &str) -> Option<f64> {
    let trimmed = input.trim();
    if let Ok(v) = trimmed.parse::<f64>() {
        return Some(v);
    }

    if let Ok(v) = trimmed.replace(',', ".").parse::<f64>() {
        return Some(v);
    }

    let filtered: String = trimmed
        .chars()
        .take_while(|c| !c.is_whitespace())
        .filter(|c| c.is_ascii_digit() || matches!(c, '.' | ',' | '-' | '+'))
        .collect();
    if filtered.is_empty() {
        return None;
    }

    filtered.replace(',', ".").parse::<f64>().ok()
}

/// Decodes tool stdout that may be UTF-8 or UTF-16LE (Windows consoles).
pub fn decode_cmd_stdout(bytes: &[u8]) -> String {
    if looks_utf16le(bytes) {
        let u16buf: Vec<u16> = bytes
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        if let Ok(s) = String::from_utf16(&u16buf) {
            return s.trim_start_matches('\u{feff}').to_string();
        }
    }

    match std::str::from_utf8(bytes) {
        Ok(utf8) => utf8.to_string(),
        Err(_) => String::from_utf8_lossy(bytes).to_string(),
    }
}

/// BOM, or NUL high bytes in at least half the code units with no NUL low
/// byte, which is what mostly-ASCII text in UTF-16LE looks like.
fn looks_utf16le(bytes: &[u8]) -> bool {
    if bytes.len() < 2 || bytes.len() % 2 != 0 {
        return false;
    }
    if bytes.starts_with(&[0xFF, 0xFE]) {
        return true;
    }
    let units = bytes.len() / 2;
    let mut high_nuls = 0;
    for pair in bytes.chunks_exact(2) {
        if pair[0] == 0 {
            return false;
        }
        if pair[1] == 0 {
            high_nuls += 1;
        }
    }
    high_nuls * 2 >= units
}
