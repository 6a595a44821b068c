//! INI serialization logic for converting `ConfigFile` → INI string.
//!
//! This module contains the `to_config_string()` function that produces
//! the commented INI representation written to `config.ini`.

use std::fmt::Write as _;
use std::path::Path;

use super::settings::ConfigFile;
use crate::phase::OperationalPhase;

/// Convert a `ConfigFile` to a commented INI string for saving.
pub(super) fn to_config_string(config: &ConfigFile) -> String {
    let c = &config.controller;
    let o = &config.operations;
    let f = &config.fuel;
    let g = &config.cargo;

    let mut out = format!(
        r#"[controller]
; Milliseconds between telemetry evaluations (default: 1000)
evaluation_interval_ms = {}
; Advance the operational phase automatically from telemetry (true/false)
auto_advance = {}
; Prediction confidence required before an automatic advance, 0.0 - 1.0
min_confidence = {}
; Re-read every domain from the simulator every N evaluations (0 = never)
sync_every_ticks = {}

[operations]
; Milliseconds between progress samples of a running service
sample_interval_ms = {}
; Minimum seconds between progress notifications
progress_interval_secs = {}
; Consecutive failed samples before a service is abandoned
max_sample_failures = {}
; Seconds one service may spend reacting to a phase change (0 = unbounded)
coordinator_timeout_secs = {}
; Attempts to obtain the cargo doors before loading or unloading
door_retry_attempts = {}

[fuel]
; Truck pump rates in kilograms per second
refuel_rate_kg_s = {}
defuel_rate_kg_s = {}
; Quantities within this many kilograms of the plan count as reached
tolerance_kg = {}

[cargo]
; Share of planned cargo placed in the forward hold, 0.0 - 1.0
forward_share = {}
; Holds within this many kilograms of the plan count as reached
tolerance_kg = {}

[timeouts]
; Minutes a phase may last before a timeout is reported (0 = disabled)
"#,
        c.evaluation_interval_ms,
        c.auto_advance,
        c.min_confidence,
        c.sync_every_ticks,
        o.sample_interval_ms,
        o.progress_interval_secs,
        o.max_sample_failures,
        o.coordinator_timeout_secs,
        o.door_retry_attempts,
        f.refuel_rate_kg_s,
        f.defuel_rate_kg_s,
        f.tolerance_kg,
        g.forward_share,
        g.tolerance_kg,
    );

    for phase in OperationalPhase::ALL {
        let minutes = config.timeouts.minutes.get(&phase).copied().unwrap_or(0);
        let _ = writeln!(out, "{} = {}", phase.as_str(), minutes);
    }

    let _ = write!(
        out,
        r#"
[logging]
; Directory for the log file (relative paths are resolved from the working directory)
directory = {}
file = {}
"#,
        path_to_string(&config.logging.directory),
        config.logging.file,
    );

    out
}

/// Convert a path to a string, replacing the home directory with `~`.
fn path_to_string(path: &Path) -> String {
    if let Some(home) = dirs::home_dir() {
        if let Ok(rest) = path.strip_prefix(&home) {
            return format!("~/{}", rest.display());
        }
    }
    path.display().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ini::Ini;

    #[test]
    fn test_written_config_parses_back() {
        let mut config = ConfigFile::default();
        config.controller.auto_advance = false;
        config.cargo.forward_share = 0.6;
        config.timeouts.minutes.insert(OperationalPhase::TaxiIn, 15);

        let text = to_config_string(&config);
        let parsed = super::super::parser::parse_ini(&Ini::load_from_str(&text).unwrap()).unwrap();

        assert_eq!(parsed.controller, config.controller);
        assert_eq!(parsed.operations, config.operations);
        assert_eq!(parsed.timeouts, config.timeouts);
        assert_eq!(parsed.cargo.forward_share, 0.6);
        assert_eq!(parsed.logging, config.logging);
    }

    #[test]
    fn test_every_phase_has_a_timeout_line() {
        let text = to_config_string(&ConfigFile::default());
        for phase in OperationalPhase::ALL {
            assert!(
                text.contains(&format!("\n{} = ", phase.as_str())),
                "missing timeout for {phase:?}"
            );
        }
    }

    #[test]
    fn test_home_paths_are_abbreviated() {
        if let Some(home) = dirs::home_dir() {
            assert_eq!(path_to_string(&home.join("logs")), "~/logs");
        }
        assert_eq!(path_to_string(Path::new("logs")), "logs");
    }
}
