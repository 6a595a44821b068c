//! INI parsing logic for converting `Ini` → `ConfigFile`.
//!
//! This module contains the `parse_ini()` function and its helpers.
//! It is the single place where INI key names are mapped to struct fields.

use std::str::FromStr;

use ini::{Ini, Properties};

use super::file::ConfigFileError;
use super::settings::ConfigFile;
use crate::phase::OperationalPhase;

/// Parse an `Ini` object into a `ConfigFile`.
///
/// Starts from `ConfigFile::default()` and overlays any values found in the INI.
/// Unknown sections and keys are ignored.
pub(super) fn parse_ini(ini: &Ini) -> Result<ConfigFile, ConfigFileError> {
    let mut config = ConfigFile::default();

    // [controller] section
    if let Some(section) = ini.section(Some("controller")) {
        let s = Section::new("controller", section);
        if let Some(v) = s.positive::<u64>("evaluation_interval_ms")? {
            config.controller.evaluation_interval_ms = v;
        }
        if let Some(v) = s.boolean("auto_advance")? {
            config.controller.auto_advance = v;
        }
        if let Some(v) = s.fraction("min_confidence")? {
            config.controller.min_confidence = v;
        }
        if let Some(v) = s.number::<u32>("sync_every_ticks", "must be a non-negative integer")? {
            config.controller.sync_every_ticks = v;
        }
    }

    // [operations] section
    if let Some(section) = ini.section(Some("operations")) {
        let s = Section::new("operations", section);
        if let Some(v) = s.positive::<u64>("sample_interval_ms")? {
            config.operations.sample_interval_ms = v;
        }
        if let Some(v) = s.number::<u64>(
            "progress_interval_secs",
            "must be a non-negative integer (seconds)",
        )? {
            config.operations.progress_interval_secs = v;
        }
        if let Some(v) = s.positive::<u32>("max_sample_failures")? {
            config.operations.max_sample_failures = v;
        }
        if let Some(v) = s.number::<u64>(
            "coordinator_timeout_secs",
            "must be a non-negative integer (seconds, 0 = unbounded)",
        )? {
            config.operations.coordinator_timeout_secs = v;
        }
        if let Some(v) = s.positive::<u32>("door_retry_attempts")? {
            config.operations.door_retry_attempts = v;
        }
    }

    // [fuel] section
    if let Some(section) = ini.section(Some("fuel")) {
        let s = Section::new("fuel", section);
        if let Some(v) = s.rate("refuel_rate_kg_s")? {
            config.fuel.refuel_rate_kg_s = v;
        }
        if let Some(v) = s.rate("defuel_rate_kg_s")? {
            config.fuel.defuel_rate_kg_s = v;
        }
        if let Some(v) = s.number::<f64>("tolerance_kg", "must be a number of kilograms")? {
            config.fuel.tolerance_kg = v.max(0.0);
        }
    }

    // [cargo] section
    if let Some(section) = ini.section(Some("cargo")) {
        let s = Section::new("cargo", section);
        if let Some(v) = s.fraction("forward_share")? {
            config.cargo.forward_share = v;
        }
        if let Some(v) = s.number::<f64>("tolerance_kg", "must be a number of kilograms")? {
            config.cargo.tolerance_kg = v.max(0.0);
        }
    }

    // [timeouts] section, one key per phase
    if let Some(section) = ini.section(Some("timeouts")) {
        let s = Section::new("timeouts", section);
        for phase in OperationalPhase::ALL {
            if let Some(v) = s.number::<u64>(phase.as_str(), "must be whole minutes (0 = disabled)")? {
                config.timeouts.minutes.insert(phase, v);
            }
        }
    }

    // [logging] section
    if let Some(section) = ini.section(Some("logging")) {
        if let Some(v) = section.get("directory") {
            let v = v.trim();
            if !v.is_empty() {
                config.logging.directory = expand_tilde(v);
            }
        }
        if let Some(v) = section.get("file") {
            let v = v.trim();
            if !v.is_empty() {
                config.logging.file = v.to_string();
            }
        }
    }

    Ok(config)
}

/// One INI section plus its name, for error reporting.
struct Section<'a> {
    name: &'static str,
    props: &'a Properties,
}

impl<'a> Section<'a> {
    fn new(name: &'static str, props: &'a Properties) -> Self {
        Self { name, props }
    }

    fn invalid(&self, key: &str, value: &str, reason: &str) -> ConfigFileError {
        ConfigFileError::InvalidValue {
            section: self.name.to_string(),
            key: key.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }

    fn number<T: FromStr>(&self, key: &str, reason: &str) -> Result<Option<T>, ConfigFileError> {
        match self.props.get(key) {
            None => Ok(None),
            Some(v) => v
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| self.invalid(key, v, reason)),
        }
    }

    fn positive<T: FromStr + PartialOrd + Default>(
        &self,
        key: &str,
    ) -> Result<Option<T>, ConfigFileError> {
        const REASON: &str = "must be a positive integer";
        match self.number::<T>(key, REASON)? {
            Some(v) if v <= T::default() => {
                Err(self.invalid(key, self.props.get(key).unwrap_or_default(), REASON))
            }
            other => Ok(other),
        }
    }

    fn fraction(&self, key: &str) -> Result<Option<f64>, ConfigFileError> {
        const REASON: &str = "must be a number between 0.0 and 1.0";
        match self.number::<f64>(key, REASON)? {
            Some(v) if !(0.0..=1.0).contains(&v) => {
                Err(self.invalid(key, self.props.get(key).unwrap_or_default(), REASON))
            }
            other => Ok(other),
        }
    }

    fn rate(&self, key: &str) -> Result<Option<f64>, ConfigFileError> {
        const REASON: &str = "must be a positive number (kg per second)";
        match self.number::<f64>(key, REASON)? {
            Some(v) if v <= 0.0 || !v.is_finite() => {
                Err(self.invalid(key, self.props.get(key).unwrap_or_default(), REASON))
            }
            other => Ok(other),
        }
    }

    fn boolean(&self, key: &str) -> Result<Option<bool>, ConfigFileError> {
        match self.props.get(key) {
            None => Ok(None),
            Some(v) => match v.trim().to_lowercase().as_str() {
                "true" | "yes" | "on" | "1" => Ok(Some(true)),
                "false" | "no" | "off" | "0" => Ok(Some(false)),
                _ => Err(self.invalid(key, v, "must be 'true' or 'false'")),
            },
        }
    }
}

/// Expand a leading `~` to the home directory.
fn expand_tilde(path: &str) -> std::path::PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    std::path::PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Result<ConfigFile, ConfigFileError> {
        parse_ini(&Ini::load_from_str(text).unwrap())
    }

    #[test]
    fn test_empty_ini_is_default() {
        let config = parse("").unwrap();
        assert_eq!(config.controller, ConfigFile::default().controller);
        assert_eq!(config.timeouts, ConfigFile::default().timeouts);
    }

    #[test]
    fn test_overlays_values() {
        let config = parse(
            "[controller]\n\
             auto_advance = no\n\
             min_confidence = 0.75\n\
             [fuel]\n\
             refuel_rate_kg_s = 40\n\
             [timeouts]\n\
             taxi_out = 20\n\
             departure = 0\n\
             [logging]\n\
             file = gate.log\n",
        )
        .unwrap();

        assert!(!config.controller.auto_advance);
        assert_eq!(config.controller.min_confidence, 0.75);
        assert_eq!(config.fuel.refuel_rate_kg_s, 40.0);
        assert_eq!(config.timeouts.minutes[&OperationalPhase::TaxiOut], 20);
        assert_eq!(config.timeouts.minutes[&OperationalPhase::Departure], 0);
        assert_eq!(config.logging.file, "gate.log");
    }

    #[test]
    fn test_unknown_keys_are_ignored() {
        let config = parse("[controller]\ncolour = blue\n[weather]\nwind = 270\n").unwrap();
        assert_eq!(config.controller, ConfigFile::default().controller);
    }

    #[test]
    fn test_rejects_out_of_range_share() {
        let err = parse("[cargo]\nforward_share = 1.5\n").unwrap_err();
        match err {
            ConfigFileError::InvalidValue {
                section, key, value, ..
            } => {
                assert_eq!(section, "cargo");
                assert_eq!(key, "forward_share");
                assert_eq!(value, "1.5");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_rejects_zero_sample_interval() {
        assert!(matches!(
            parse("[operations]\nsample_interval_ms = 0\n"),
            Err(ConfigFileError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_rejects_bad_bool() {
        assert!(parse("[controller]\nauto_advance = maybe\n").is_err());
    }
}
