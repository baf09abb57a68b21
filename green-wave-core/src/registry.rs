//! Traffic light registry
//!
//! Loads the static light list from JSON. Entries look like
//! `{"lat": 55.75, "lon": "37.61", "LightNumber": 17}`: coordinates may be
//! numbers or numeric strings, and the label is optional. Malformed entries
//! are dropped with a warning rather than failing the whole load.

use crate::types::{GreenWaveError, Result, TrafficLight};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Keys the registry label may appear under (the second is a known typo in
/// deployed data files)
const LABEL_KEYS: [&str; 2] = ["LightNumber", "LightNumbe"];

/// An immutable, validated list of traffic lights
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LightRegistry {
    lights: Vec<TrafficLight>,
}

impl LightRegistry {
    pub fn new(lights: Vec<TrafficLight>) -> Self {
        Self { lights }
    }

    /// Load a registry from a JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        log::info!("Loading traffic lights: {:?}", path);

        let content = std::fs::read_to_string(path).map_err(|e| {
            GreenWaveError::RegistryUnavailable(format!("Failed to read {:?}: {}", path, e))
        })?;

        let registry = Self::from_json_str(&content).map_err(|e| match e {
            GreenWaveError::JsonError(e) => GreenWaveError::RegistryUnavailable(format!(
                "Invalid JSON in {:?}: {}",
                path, e
            )),
            other => other,
        })?;

        log::info!("Loaded {} traffic lights from {:?}", registry.len(), path);
        Ok(registry)
    }

    /// Parse a registry from JSON text
    pub fn from_json_str(content: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(content)?;
        Ok(Self::from_json_value(&value))
    }

    /// Build a registry from an already-parsed JSON value
    ///
    /// Anything other than an array yields an empty registry.
    pub fn from_json_value(value: &Value) -> Self {
        let entries = match value.as_array() {
            Some(entries) => entries,
            None => {
                log::warn!(
                    "Unexpected traffic lights data type {}; expected a list of entries",
                    json_type_name(value)
                );
                return Self::default();
            }
        };

        let mut lights = Vec::with_capacity(entries.len());
        let mut discarded = 0usize;

        for entry in entries {
            match parse_entry(entry) {
                Some(light) => lights.push(light),
                None => discarded += 1,
            }
        }

        if discarded > 0 {
            log::warn!("Discarded {} malformed traffic light entries", discarded);
        }

        Self { lights }
    }

    pub fn lights(&self) -> &[TrafficLight] {
        &self.lights
    }

    pub fn len(&self) -> usize {
        self.lights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lights.is_empty()
    }

    /// Find a light by its label
    pub fn find(&self, label: &str) -> Option<&TrafficLight> {
        let label = label.trim();
        self.lights
            .iter()
            .find(|light| light.label.as_deref() == Some(label))
    }

    pub fn into_lights(self) -> Vec<TrafficLight> {
        self.lights
    }
}

fn parse_entry(entry: &Value) -> Option<TrafficLight> {
    let object = entry.as_object()?;

    let latitude = parse_number(object.get("lat")?)?;
    let longitude = parse_number(object.get("lon")?)?;

    let label = LABEL_KEYS
        .iter()
        .filter_map(|key| object.get(*key))
        .find_map(parse_label);

    Some(TrafficLight {
        latitude,
        longitude,
        label,
    })
}

fn parse_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    number.is_finite().then_some(number)
}

fn parse_label(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// A file-backed registry that reloads only when the file changes
///
/// If the file goes missing or becomes malformed after a successful load,
/// the last good copy keeps being served.
#[derive(Debug)]
pub struct CachedRegistry {
    path: PathBuf,
    modified: Option<SystemTime>,
    registry: LightRegistry,
}

impl CachedRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            modified: None,
            registry: LightRegistry::default(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Return the current lights, reloading if the file's mtime moved
    pub fn load(&mut self) -> &LightRegistry {
        let modified = match std::fs::metadata(&self.path).and_then(|m| m.modified()) {
            Ok(modified) => modified,
            Err(e) => {
                if self.registry.is_empty() {
                    log::error!("Traffic lights file not found: {:?} ({})", self.path, e);
                } else {
                    log::warn!("Traffic lights file missing; using cached data from previous load");
                }
                return &self.registry;
            }
        };

        if !self.registry.is_empty() && self.modified == Some(modified) {
            log::trace!("Traffic lights unchanged: {:?}", self.path);
            return &self.registry;
        }

        match LightRegistry::from_file(&self.path) {
            Ok(registry) => {
                self.registry = registry;
                self.modified = Some(modified);
            }
            Err(e) => {
                log::error!("{}", e);
                if !self.registry.is_empty() {
                    // Remember the bad version so it is not re-parsed every call
                    self.modified = Some(modified);
                    log::warn!("Using cached traffic lights; latest file is malformed");
                }
            }
        }

        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_mixed_entries() {
        let json = r#"[
            {"lat": 55.75, "lon": 37.61, "LightNumber": 17},
            {"lat": "55.76", "lon": " 37.62 ", "LightNumbe": " A-3 "},
            {"lat": "north", "lon": 37.0},
            {"lon": 37.0},
            "not an object",
            {"lat": 55.77, "lon": 37.63, "LightNumber": ""}
        ]"#;

        let registry = LightRegistry::from_json_str(json).unwrap();
        assert_eq!(registry.len(), 3);

        let lights = registry.lights();
        assert_eq!(lights[0].label.as_deref(), Some("17"));
        assert_eq!(lights[1].latitude, 55.76);
        assert_eq!(lights[1].longitude, 37.62);
        assert_eq!(lights[1].label.as_deref(), Some("A-3"));
        assert_eq!(lights[2].label, None);

        assert!(registry.find("A-3").is_some());
        assert!(registry.find("99").is_none());
    }

    #[test]
    fn test_non_array_is_empty() {
        let registry = LightRegistry::from_json_str(r#"{"lat": 1, "lon": 2}"#).unwrap();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_invalid_json_is_error() {
        assert!(LightRegistry::from_json_str("[{").is_err());
    }

    #[test]
    fn test_missing_file_is_registry_error() {
        let result = LightRegistry::from_file(Path::new("/nonexistent/light_traffics.json"));
        assert!(matches!(result, Err(GreenWaveError::RegistryUnavailable(_))));
    }

    #[test]
    fn test_cached_registry_keeps_last_good_copy() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("light_traffics.json");

        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, r#"[{{"lat": 1.0, "lon": 2.0}}]"#).unwrap();
        drop(file);

        let mut cache = CachedRegistry::new(&path);
        assert_eq!(cache.load().len(), 1);

        std::fs::remove_file(&path).unwrap();
        assert_eq!(cache.load().len(), 1);
    }

    fn write_lights(path: &Path, content: &str, mtime_secs: u64) {
        std::fs::write(path, content).unwrap();
        let file = std::fs::File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(mtime_secs))
            .unwrap();
    }

    #[test]
    fn test_cached_registry_reloads_on_mtime_change() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("light_traffics.json");

        write_lights(&path, r#"[{"lat": 1.0, "lon": 2.0}]"#, 1_000);
        let mut cache = CachedRegistry::new(&path);
        assert_eq!(cache.load().len(), 1);

        // Same mtime: the new content is not picked up
        write_lights(&path, r#"[{"lat": 1.0, "lon": 2.0}, {"lat": 3.0, "lon": 4.0}]"#, 1_000);
        assert_eq!(cache.load().len(), 1);

        write_lights(&path, r#"[{"lat": 1.0, "lon": 2.0}, {"lat": 3.0, "lon": 4.0}]"#, 2_000);
        assert_eq!(cache.load().len(), 2);
    }

    #[test]
    fn test_cached_registry_survives_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("light_traffics.json");

        write_lights(&path, r#"[{"lat": 1.0, "lon": 2.0, "LightNumber": 5}]"#, 1_000);
        let mut cache = CachedRegistry::new(&path);
        assert_eq!(cache.load().len(), 1);

        write_lights(&path, "[{", 2_000);
        assert_eq!(cache.load().len(), 1);
        assert!(cache.load().find("5").is_some());

        // The malformed version is remembered; only a newer mtime is re-read
        write_lights(&path, r#"[{"lat": 1.0, "lon": 2.0}, {"lat": 3.0, "lon": 4.0}]"#, 2_000);
        assert_eq!(cache.load().len(), 1);

        write_lights(&path, r#"[{"lat": 1.0, "lon": 2.0}, {"lat": 3.0, "lon": 4.0}]"#, 3_000);
        assert_eq!(cache.load().len(), 2);
    }

    #[test]
    fn test_cached_registry_missing_without_cache() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = CachedRegistry::new(dir.path().join("absent.json"));
        assert!(cache.load().is_empty());
    }
}
