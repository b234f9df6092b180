//! Runtime configuration for repertoire builds.
//!
//! Every value has a compile-time default and can be overridden through an
//! environment variable. Command-line flags take precedence over both.

use std::path::PathBuf;

const DEFAULT_CONFIG_DIR: &str = ".config/repertoire/data";
const DEV_DATA_DIR: &str = "./data";

/// Default engine search depth per position.
pub const DEFAULT_ANALYSIS_DEPTH: u8 = 10;

/// Get the data directory for trees and game caches.
///
/// Priority:
/// 1. REPERTOIRE_DATA_DIR env variable if set
/// 2. $HOME/.config/repertoire/data if HOME is set
/// 3. ./data as fallback
pub fn get_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("REPERTOIRE_DATA_DIR") {
        return PathBuf::from(dir);
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(DEFAULT_CONFIG_DIR);
    }

    PathBuf::from(DEV_DATA_DIR)
}

/// Get an explicit Stockfish binary from STOCKFISH_PATH.
///
/// `None` when the variable is unset; the engine crate then probes the
/// usual install locations.
pub fn get_stockfish_path() -> Option<PathBuf> {
    std::env::var_os("STOCKFISH_PATH").map(PathBuf::from)
}

/// Get the engine search depth.
///
/// Priority:
/// 1. REPERTOIRE_ANALYSIS_DEPTH env variable if set (falls back to the
///    default if it does not parse as a `u8`)
/// 2. `10` as fallback
pub fn get_analysis_depth() -> u8 {
    parse_or(
        std::env::var("REPERTOIRE_ANALYSIS_DEPTH").ok(),
        DEFAULT_ANALYSIS_DEPTH,
    )
}

/// Get the number of workers, each running its own engine.
///
/// Priority:
/// 1. REPERTOIRE_WORKERS env variable if set and non-zero
/// 2. available parallelism, or 1 if unknown
pub fn get_worker_count() -> usize {
    let default = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    match parse_or(std::env::var("REPERTOIRE_WORKERS").ok(), default) {
        0 => default,
        n => n,
    }
}

fn parse_or<T: std::str::FromStr>(value: Option<String>, default: T) -> T {
    value
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_data_dir_fallback() {
        // Returns the env override when REPERTOIRE_DATA_DIR is set, which is
        // also correct.
        let dir = get_data_dir();
        assert!(!dir.as_os_str().is_empty());
    }

    #[test]
    fn test_worker_count_is_positive() {
        assert!(get_worker_count() >= 1);
    }

    #[test]
    fn test_parse_or() {
        assert_eq!(parse_or(Some("12".to_string()), 10u8), 12);
        assert_eq!(parse_or(Some(" 7 ".to_string()), 10u8), 7);
        assert_eq!(parse_or(Some("deep".to_string()), 10u8), 10);
        assert_eq!(parse_or(Some("300".to_string()), 10u8), 10);
        assert_eq!(parse_or(None, 4usize), 4);
    }

    #[test]
    fn test_stockfish_path_only_from_env() {
        // No probing here: unset means None and the engine crate searches.
        assert_eq!(
            get_stockfish_path(),
            std::env::var_os("STOCKFISH_PATH").map(PathBuf::from)
        );
    }

    // Env-var overrides are not exercised here to avoid test pollution
}
