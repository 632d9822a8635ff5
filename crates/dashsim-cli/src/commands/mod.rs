pub mod fleet;
pub mod health;

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use dashsim_core::{SimulationConfig, load_config_from_path};
use serde::Serialize;

/// How often the run loop checks for Ctrl+C and the duration limit.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Parse a duration string like "5m", "30s", "1h", "100ms". Bare numbers are seconds.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();

    let (numeric, multiplier) = if let Some(rest) = s.strip_suffix("ms") {
        (rest, 1u64)
    } else if let Some(rest) = s.strip_suffix('s') {
        (rest, 1000)
    } else if let Some(rest) = s.strip_suffix('m') {
        (rest, 60_000)
    } else if let Some(rest) = s.strip_suffix('h') {
        (rest, 3_600_000)
    } else {
        (s, 1000)
    };

    let value: u64 = numeric
        .trim()
        .parse()
        .map_err(|_| format!("invalid duration '{s}' (expected e.g. 100ms, 30s, 5m, 1h)"))?;
    value
        .checked_mul(multiplier)
        .map(Duration::from_millis)
        .ok_or_else(|| format!("duration '{s}' is too large"))
}

/// Report a bad argument value and exit with the usage error code.
pub fn invalid_arg(message: &str) -> ! {
    eprintln!("Error: {message}");
    std::process::exit(2);
}

/// Load the config file if one was given, defaults otherwise. Exits on failure.
pub fn load_config(path: Option<&Path>) -> SimulationConfig {
    let Some(path) = path else {
        return SimulationConfig::default();
    };
    match load_config_from_path(path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading config {}: {e}", path.display());
            std::process::exit(1);
        }
    }
}

/// Serialize `value` as pretty JSON into `path`.
pub fn write_json<T: Serialize>(value: &T, path: &Path) -> std::io::Result<()> {
    let body = serde_json::to_string_pretty(value)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    std::fs::write(path, body)
}

/// Flag cleared by Ctrl+C.
pub fn interrupt_flag() -> Arc<AtomicBool> {
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    }) {
        log::warn!("could not install Ctrl+C handler: {e}");
    }
    running
}

/// Runtime for the simulator timers. Exits if one cannot be created.
pub fn runtime() -> tokio::runtime::Runtime {
    match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error starting async runtime: {e}");
            std::process::exit(1);
        }
    }
}

/// Resolve once `running` is cleared or `limit` has elapsed, whichever is first.
pub async fn wait_until_stopped(running: &AtomicBool, limit: Option<Duration>) {
    let deadline = limit.map(|d| tokio::time::Instant::now() + d);
    while running.load(Ordering::SeqCst) {
        if let Some(deadline) = deadline
            && tokio::time::Instant::now() >= deadline
        {
            break;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // -----------------------------------------------------------------------
    // parse_duration tests
    // -----------------------------------------------------------------------

    #[test]
    fn test_parse_duration_suffixes() {
        assert_eq!(parse_duration("100ms"), Ok(Duration::from_millis(100)));
        assert_eq!(parse_duration("30s"), Ok(Duration::from_secs(30)));
        assert_eq!(parse_duration("5m"), Ok(Duration::from_secs(300)));
        assert_eq!(parse_duration("1h"), Ok(Duration::from_secs(3600)));
    }

    #[test]
    fn test_parse_duration_bare_is_seconds() {
        assert_eq!(parse_duration("12"), Ok(Duration::from_secs(12)));
        assert_eq!(parse_duration(" 3s "), Ok(Duration::from_secs(3)));
    }

    #[test]
    fn test_parse_duration_rejects_garbage() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("fast").is_err());
        assert!(parse_duration("-5s").is_err());
        assert!(parse_duration("1.5s").is_err());
    }

    #[test]
    fn test_parse_duration_overflow() {
        assert!(parse_duration(&format!("{}h", u64::MAX)).is_err());
    }

    // -----------------------------------------------------------------------
    // Config and output tests
    // -----------------------------------------------------------------------

    #[test]
    fn test_load_config_none_is_default() {
        assert_eq!(load_config(None), SimulationConfig::default());
    }

    #[test]
    fn test_load_config_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sim.json");
        std::fs::write(&path, r#"{ "fleet": { "total": 9 } }"#).unwrap();
        assert_eq!(load_config(Some(&path)).fleet.total, 9);
    }

    #[test]
    fn test_write_json_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        write_json(&serde_json::json!({ "points": [1, 2, 3] }), &path).unwrap();
        let raw = std::fs::read_to_string(&path).unwrap();
        let back: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(back["points"][2], 3);
    }

    #[test]
    fn test_write_json_missing_dir_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope").join("out.json");
        assert!(write_json(&1u32, &path).is_err());
    }

    // -----------------------------------------------------------------------
    // wait_until_stopped tests
    // -----------------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn test_wait_honors_duration() {
        let running = AtomicBool::new(true);
        let start = tokio::time::Instant::now();
        wait_until_stopped(&running, Some(Duration::from_secs(2))).await;
        let waited = start.elapsed();
        assert!(waited >= Duration::from_secs(2));
        assert!(waited < Duration::from_secs(2) + POLL_INTERVAL * 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_returns_when_flag_cleared() {
        let running = AtomicBool::new(false);
        let start = tokio::time::Instant::now();
        wait_until_stopped(&running, None).await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
