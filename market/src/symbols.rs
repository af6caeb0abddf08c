//! Instrument identifiers: `EXCHANGE:TICKER` entries normalised to `TICKER`.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use tracing::{debug, info, warn};

/// Uppercases and strips an exchange prefix. Empty entries and `###`
/// section headers yield `None`.
pub fn normalize_symbol(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() || raw.starts_with("###") {
        return None;
    }
    let ticker = raw.rsplit(':').next().unwrap_or(raw).trim();
    (!ticker.is_empty()).then(|| ticker.to_ascii_uppercase())
}

/// Parses a comma and/or newline separated symbol list.
pub fn parse_symbols(content: &str) -> BTreeSet<String> {
    content
        .split([',', '\n'])
        .filter_map(normalize_symbol)
        .collect()
}

/// Loads and merges every `.txt` list in `dir`, sorted and de-duplicated.
///
/// A missing folder or unreadable file is logged and contributes nothing.
pub fn load_symbols_from_dir(dir: &Path) -> Vec<String> {
    let entries = match fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "symbol folder not readable");
            return Vec::new();
        }
    };

    let mut all = BTreeSet::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("txt") {
            continue;
        }
        match fs::read_to_string(&path) {
            Ok(content) => {
                let parsed = parse_symbols(&content);
                debug!(file = %path.display(), count = parsed.len(), "parsed symbol list");
                all.extend(parsed);
            }
            Err(e) => warn!(file = %path.display(), error = %e, "skipping unreadable symbol list"),
        }
    }

    let symbols: Vec<String> = all.into_iter().collect();
    info!(count = symbols.len(), ?symbols, "loaded symbols");
    symbols
}
