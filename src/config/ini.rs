//! Lookup of single values in sectioned `key=value` files.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Looks up `key` inside `[section]` of the file at `source`.
///
/// Lines starting with `;` or `#` are comments. The value is returned verbatim,
/// i.e. everything after the first `=` of the first matching line.
///
/// If the file can't be read or the key isn't present `default` is returned.
/// The file is read again on every call.
pub fn lookup(section: &str, key: &str, source: &Path, default: &str) -> String {
    let file = match File::open(source) {
        Ok(file) => file,
        Err(e) => {
            log::warn!(target: "config", "Failed to open config file {}: {e}", source.display());
            return default.to_string();
        }
    };

    let mut in_section = false;
    for line in BufReader::new(file).lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                log::warn!(target: "config", "Failed to read config file {}: {e}", source.display());
                break;
            }
        };

        if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
            continue;
        }

        if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            in_section = name == section;
            continue;
        }

        if !in_section {
            continue;
        }

        if let Some((current_key, value)) = line.split_once('=') {
            if current_key == key {
                return value.to_string();
            }
        }
    }

    log::trace!(target: "config", "No value for {section}.{key}, using default");
    default.to_string()
}
