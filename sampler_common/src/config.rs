//! Configuration Registry (spec.md §4.7).
//!
//! Recognized keys are loaded from (and persisted to) a `key=value` text
//! file — not TOML — per spec.md's explicit wire format for the external
//! config writer. The in-memory snapshot is published via
//! `parking_lot::RwLock<Arc<Configuration>>`: a reader that has already
//! started a job keeps its original `Arc` clone for the duration of that
//! job, even if the registry is swapped underneath it.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Errors raised loading, parsing, or validating a configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Read {
        /// Path that failed.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The file could not be written.
    #[error("failed to write config file {path}: {source}")]
    Write {
        /// Path that failed.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// A line was not valid `KEY=value` syntax.
    #[error("malformed line {line_no}: {line:?}")]
    MalformedLine {
        /// 1-based line number.
        line_no: usize,
        /// Offending line text.
        line: String,
    },
    /// A recognized key's value did not parse as a number.
    #[error("key {key} has non-numeric value {value:?}")]
    NotANumber {
        /// Offending key.
        key: String,
        /// Offending raw value.
        value: String,
    },
    /// A key outside the recognized set appeared in the file.
    #[error("unrecognized config key {0}")]
    UnrecognizedKey(String),
    /// A recognized key was missing from the file.
    #[error("missing required config key {0}")]
    MissingKey(&'static str),
    /// A value failed the strictly-positive (or, for `RINSE_CYCLES`,
    /// non-negative) validation rule.
    #[error("key {key} must be {requirement}, got {value}")]
    OutOfRange {
        /// Offending key.
        key: &'static str,
        /// What the value must satisfy.
        requirement: &'static str,
        /// Offending value.
        value: f64,
    },
}

/// The two directions a `HOME_DIRECTION_*` config key may encode
/// (`0 = CCW`, `1 = CW`, matching the wire's direction encoding).
const HOME_DIRECTION_KEYS: &[&str] = &[
    "HOME_DIRECTION_X",
    "HOME_DIRECTION_Y",
    "HOME_DIRECTION_Z",
    "HOME_DIRECTION_PIPETTE",
];

macro_rules! config_keys {
    ($($field:ident => $key:literal),+ $(,)?) => {
        /// The recognized numeric hardware parameters (spec.md §4.7).
        #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
        pub struct Configuration {
            $(
                #[doc = concat!("`", $key, "`")]
                pub $field: f64,
            )+
        }

        impl Configuration {
            /// All recognized keys, in declaration order.
            pub const KEYS: &'static [&'static str] = &[$($key),+];

            fn from_map(map: &BTreeMap<String, f64>) -> Result<Self, ConfigError> {
                Ok(Self {
                    $(
                        $field: *map.get($key).ok_or(ConfigError::MissingKey($key))?,
                    )+
                })
            }

            fn to_map(self) -> BTreeMap<String, f64> {
                let mut map = BTreeMap::new();
                $(map.insert($key.to_string(), self.$field);)+
                map
            }
        }
    };
}

config_keys! {
    well_spacing_mm => "WELL_SPACING",
    well_diameter_mm => "WELL_DIAMETER",
    well_height_mm => "WELL_HEIGHT",
    steps_per_mm_x => "STEPS_PER_MM_X",
    steps_per_mm_y => "STEPS_PER_MM_Y",
    steps_per_mm_z => "STEPS_PER_MM_Z",
    pipette_steps_per_ml => "PIPETTE_STEPS_PER_ML",
    pickup_depth_mm => "PICKUP_DEPTH",
    dropoff_depth_mm => "DROPOFF_DEPTH",
    safe_height_mm => "SAFE_HEIGHT",
    rinse_cycles => "RINSE_CYCLES",
    travel_speed_s_per_step => "TRAVEL_SPEED",
    pipette_speed_s_per_step => "PIPETTE_SPEED",
    pipette_capacity_ml => "PIPETTE_CAPACITY_ML",
    home_direction_x => "HOME_DIRECTION_X",
    home_direction_y => "HOME_DIRECTION_Y",
    home_direction_z => "HOME_DIRECTION_Z",
    home_direction_pipette => "HOME_DIRECTION_PIPETTE",
}

impl Configuration {
    /// Validate spec.md §4.7's write-time rule: every value strictly
    /// positive, except `RINSE_CYCLES` which may be zero and the
    /// `HOME_DIRECTION_*` keys which must be exactly `0` or `1`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (key, value) in self.to_map() {
            let key: &'static str = Self::KEYS
                .iter()
                .find(|k| **k == key)
                .expect("to_map only emits recognized keys");

            if HOME_DIRECTION_KEYS.contains(&key) {
                if value != 0.0 && value != 1.0 {
                    return Err(ConfigError::OutOfRange {
                        key,
                        requirement: "0 (CCW) or 1 (CW)",
                        value,
                    });
                }
                continue;
            }

            let positive_required = key != "RINSE_CYCLES";
            let ok = if positive_required {
                value > 0.0
            } else {
                value >= 0.0
            };
            if !ok {
                return Err(ConfigError::OutOfRange {
                    key,
                    requirement: if positive_required {
                        "strictly positive"
                    } else {
                        "non-negative"
                    },
                    value,
                });
            }
        }
        Ok(())
    }

    /// The configured homing direction for `axis` (spec.md §4.6).
    pub fn home_direction(&self, axis: crate::axis::Axis) -> crate::axis::Direction {
        let raw = match axis {
            crate::axis::Axis::X => self.home_direction_x,
            crate::axis::Axis::Y => self.home_direction_y,
            crate::axis::Axis::Z => self.home_direction_z,
            crate::axis::Axis::Pipette => self.home_direction_pipette,
        };
        crate::axis::Direction::from_wire(raw as u8).expect("validated to be 0 or 1")
    }

    fn parse(text: &str) -> Result<Self, ConfigError> {
        let mut map = BTreeMap::new();
        for (idx, raw_line) in text.lines().enumerate() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (key, value) = line.split_once('=').ok_or_else(|| ConfigError::MalformedLine {
                line_no: idx + 1,
                line: raw_line.to_string(),
            })?;
            let key = key.trim();
            let value = value.trim();
            if !Self::KEYS.contains(&key) {
                return Err(ConfigError::UnrecognizedKey(key.to_string()));
            }
            let parsed: f64 = value.parse().map_err(|_| ConfigError::NotANumber {
                key: key.to_string(),
                value: value.to_string(),
            })?;
            map.insert(key.to_string(), parsed);
        }
        let config = Self::from_map(&map)?;
        config.validate()?;
        Ok(config)
    }

    fn render(self) -> String {
        let mut out = String::new();
        for key in Self::KEYS {
            let map = self.to_map();
            out.push_str(key);
            out.push('=');
            out.push_str(&map[*key].to_string());
            out.push('\n');
        }
        out
    }
}

impl fmt::Display for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render())
    }
}

/// Live, swappable configuration snapshot shared across the process
/// (spec.md §4.7, §5). Cloning the `Arc` a reader obtains pins that
/// reader to the snapshot in effect at the time it started a job.
#[derive(Clone)]
pub struct ConfigRegistry {
    inner: Arc<RwLock<Arc<Configuration>>>,
}

impl ConfigRegistry {
    /// Load and validate a configuration file, failing closed on any
    /// parse or validation error (spec.md §4.7: "validates each value").
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config = Configuration::parse(&text)?;
        Ok(Self {
            inner: Arc::new(RwLock::new(Arc::new(config))),
        })
    }

    /// Construct a registry directly from an already-validated
    /// configuration, bypassing file I/O (used by tests and the
    /// simulated transport).
    pub fn from_configuration(config: Configuration) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(RwLock::new(Arc::new(config))),
        })
    }

    /// Borrow the current snapshot. The returned `Arc` is stable even if
    /// another thread calls [`Self::write_and_swap`] concurrently.
    pub fn current(&self) -> Arc<Configuration> {
        self.inner.read().clone()
    }

    /// Validate `new_config`, persist it to `path`, and atomically swap
    /// the in-memory snapshot (spec.md §4.7: "validates... then
    /// atomically swaps the snapshot").
    pub fn write_and_swap(&self, path: &Path, new_config: Configuration) -> Result<(), ConfigError> {
        new_config.validate()?;
        std::fs::write(path, new_config.render()).map_err(|source| ConfigError::Write {
            path: path.display().to_string(),
            source,
        })?;
        *self.inner.write() = Arc::new(new_config);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn sample_text() -> &'static str {
        "WELL_SPACING=9.0\n\
         WELL_DIAMETER=6.5\n\
         WELL_HEIGHT=11.0\n\
         STEPS_PER_MM_X=80\n\
         STEPS_PER_MM_Y=80\n\
         STEPS_PER_MM_Z=400\n\
         PIPETTE_STEPS_PER_ML=1000\n\
         PICKUP_DEPTH=8.0\n\
         DROPOFF_DEPTH=5.0\n\
         SAFE_HEIGHT=20.0\n\
         RINSE_CYCLES=2\n\
         TRAVEL_SPEED=0.001\n\
         PIPETTE_SPEED=0.002\n\
         PIPETTE_CAPACITY_ML=1.0\n\
         HOME_DIRECTION_X=0\n\
         HOME_DIRECTION_Y=0\n\
         HOME_DIRECTION_Z=0\n\
         HOME_DIRECTION_PIPETTE=0\n"
    }

    #[test]
    fn parses_valid_file() {
        let config = Configuration::parse(sample_text()).unwrap();
        assert_eq!(config.rinse_cycles, 2.0);
        assert_eq!(config.pipette_capacity_ml, 1.0);
    }

    #[test]
    fn allows_rinse_cycles_zero() {
        let text = sample_text().replace("RINSE_CYCLES=2", "RINSE_CYCLES=0");
        assert!(Configuration::parse(&text).is_ok());
    }

    #[test]
    fn rejects_non_positive_required_field() {
        let text = sample_text().replace("WELL_SPACING=9.0", "WELL_SPACING=0");
        assert!(matches!(
            Configuration::parse(&text),
            Err(ConfigError::OutOfRange { key: "WELL_SPACING", .. })
        ));
    }

    #[test]
    fn rejects_missing_key() {
        let text = sample_text().replace("PIPETTE_CAPACITY_ML=1.0\n", "");
        assert!(matches!(
            Configuration::parse(&text),
            Err(ConfigError::MissingKey("PIPETTE_CAPACITY_ML"))
        ));
    }

    #[test]
    fn rejects_unrecognized_key() {
        let mut text = sample_text().to_string();
        text.push_str("BOGUS_KEY=1\n");
        assert!(matches!(
            Configuration::parse(&text),
            Err(ConfigError::UnrecognizedKey(_))
        ));
    }

    #[test]
    fn ignores_blank_lines_and_comments() {
        let mut text = String::from("# a comment\n\n");
        text.push_str(sample_text());
        assert!(Configuration::parse(&text).is_ok());
    }

    #[test]
    fn rejects_home_direction_outside_zero_or_one() {
        let text = sample_text().replace("HOME_DIRECTION_Z=0", "HOME_DIRECTION_Z=2");
        assert!(matches!(
            Configuration::parse(&text),
            Err(ConfigError::OutOfRange { key: "HOME_DIRECTION_Z", .. })
        ));
    }

    #[test]
    fn home_direction_looks_up_per_axis() {
        let text = sample_text().replace("HOME_DIRECTION_Z=0", "HOME_DIRECTION_Z=1");
        let config = Configuration::parse(&text).unwrap();
        assert_eq!(
            config.home_direction(crate::axis::Axis::Z),
            crate::axis::Direction::Cw
        );
        assert_eq!(
            config.home_direction(crate::axis::Axis::X),
            crate::axis::Direction::Ccw
        );
    }

    #[test]
    fn render_round_trips_through_parse() {
        let config = Configuration::parse(sample_text()).unwrap();
        let rendered = config.render();
        let reparsed = Configuration::parse(&rendered).unwrap();
        assert_eq!(config, reparsed);
    }

    #[test]
    fn registry_load_and_write_and_swap() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sampler.conf");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(sample_text().as_bytes())
            .unwrap();

        let registry = ConfigRegistry::load(&path).unwrap();
        let before = registry.current();
        assert_eq!(before.rinse_cycles, 2.0);

        let mut updated = *before;
        updated.rinse_cycles = 5.0;
        registry.write_and_swap(&path, updated).unwrap();

        let after = registry.current();
        assert_eq!(after.rinse_cycles, 5.0);
        assert_eq!(before.rinse_cycles, 2.0, "earlier snapshot unaffected");

        let reloaded = ConfigRegistry::load(&path).unwrap();
        assert_eq!(reloaded.current().rinse_cycles, 5.0);
    }

    #[test]
    fn write_and_swap_rejects_invalid_without_mutating() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sampler.conf");
        std::fs::write(&path, sample_text()).unwrap();
        let registry = ConfigRegistry::load(&path).unwrap();

        let mut invalid = *registry.current();
        invalid.safe_height_mm = -1.0;
        assert!(registry.write_and_swap(&path, invalid).is_err());
        assert_eq!(registry.current().safe_height_mm, 20.0);
    }
}
