//! Serial port discovery for the diagnostics adapter.

use std::path::{Path, PathBuf};

/// Device node name prefixes that may carry an ELM327 link.
pub const SERIAL_PREFIXES: &[&str] = &["ttyUSB", "ttyACM", "rfcomm"];

/// Lists candidate serial nodes under `/dev`, sorted by path.
pub fn scan_serial_ports() -> Vec<PathBuf> {
    scan_serial_ports_in(Path::new("/dev"))
}

/// Same as [`scan_serial_ports`] but rooted at `dir`. Unreadable directories yield nothing.
pub fn scan_serial_ports_in(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut ports: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .filter(|e| {
            let name = e.file_name();
            let name = name.to_string_lossy();
            SERIAL_PREFIXES.iter().any(|p| name.starts_with(p))
        })
        .map(|e| e.path())
        .collect();
    ports.sort();
    ports
}
