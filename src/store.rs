//! Calibrated object models and their persisted store
//!
//! The store is a fixed, ordered table created from the configured object
//! list. Iteration order is configuration order, which the classifier relies
//! on for its tie-break.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::config::ObjectConfig;
use crate::error::StoreError;

/// Default lower bound for a model's standard deviation
pub const DEFAULT_STD_FLOOR: f64 = 1e-6;

/// Calibrated 1-D Gaussian model of one object's smoothed RMS
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectModel {
    key: char,
    mean: f64,
    std: f64,
}

impl ObjectModel {
    /// Uncalibrated model: mean 0, std 1
    pub fn new(key: char) -> Self {
        Self {
            key,
            mean: 0.0,
            std: 1.0,
        }
    }

    /// Model with explicit statistics, `std` clamped to `std_floor`
    pub fn with_stats(key: char, mean: f64, std: f64, std_floor: f64) -> Self {
        let mut model = Self::new(key);
        model.set_stats(mean, std, std_floor);
        model
    }

    pub fn key(&self) -> char {
        self.key
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn std(&self) -> f64 {
        self.std
    }

    /// Overwrite mean and std. A std below the floor (or NaN) is raised to it.
    pub fn set_stats(&mut self, mean: f64, std: f64, std_floor: f64) {
        self.mean = mean;
        self.std = if std.is_finite() && std >= std_floor {
            std
        } else {
            if std.is_finite() {
                debug!("Clamping std {:e} to floor {:e}", std, std_floor);
            } else {
                warn!("Non-finite std {}; using floor {:e}", std, std_floor);
            }
            std_floor
        };
    }
}

/// One persisted entry of the model document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRecord {
    pub mean: f64,
    pub std: f64,
    pub key: char,
}

/// Persisted document: object name -> record
pub type ModelDocument = BTreeMap<String, ModelRecord>;

/// Ordered table of object models, keyed by object name
#[derive(Debug, Clone)]
pub struct ModelStore {
    entries: Vec<(String, ObjectModel)>,
    std_floor: f64,
}

impl ModelStore {
    /// Create default models for the configured objects
    pub fn from_objects(objects: &[ObjectConfig], std_floor: f64) -> Self {
        let entries = objects
            .iter()
            .map(|o| (o.name.clone(), ObjectModel::new(o.key())))
            .collect();

        Self { entries, std_floor }
    }

    /// Build a store from explicit entries, in order
    pub fn from_models<I, S>(models: I, std_floor: f64) -> Self
    where
        I: IntoIterator<Item = (S, ObjectModel)>,
        S: Into<String>,
    {
        Self {
            entries: models.into_iter().map(|(n, m)| (n.into(), m)).collect(),
            std_floor,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn std_floor(&self) -> f64 {
        self.std_floor
    }

    /// Iterate over `(name, model)` in configuration order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ObjectModel)> {
        self.entries.iter().map(|(n, m)| (n.as_str(), m))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn get(&self, name: &str) -> Option<&ObjectModel> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, m)| m)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut ObjectModel> {
        self.entries
            .iter_mut()
            .find(|(n, _)| n == name)
            .map(|(_, m)| m)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Name of the first object whose key matches
    pub fn find_by_key(&self, key: char) -> Option<&str> {
        self.entries
            .iter()
            .find(|(_, m)| m.key == key)
            .map(|(n, _)| n.as_str())
    }

    /// Update one model's statistics; returns false for unknown names or a
    /// non-finite mean
    pub fn update(&mut self, name: &str, mean: f64, std: f64) -> bool {
        if !mean.is_finite() {
            warn!("Refusing non-finite mean {} for '{}'", mean, name);
            return false;
        }
        let floor = self.std_floor;
        match self.get_mut(name) {
            Some(model) => {
                model.set_stats(mean, std, floor);
                true
            }
            None => false,
        }
    }

    /// Overwrite configured objects with the values found in `document`.
    ///
    /// Objects absent from the document keep their current values; names the
    /// configuration does not know and records with a non-finite mean are
    /// ignored. Returns the number of objects restored.
    pub fn load(&mut self, document: &ModelDocument) -> usize {
        let floor = self.std_floor;
        let mut restored = 0;
        for (name, model) in self.entries.iter_mut() {
            let Some(record) = document.get(name) else {
                continue;
            };
            if !record.mean.is_finite() {
                warn!("Skipping '{}' with non-finite mean {}", name, record.mean);
                continue;
            }
            model.key = record.key;
            model.set_stats(record.mean, record.std, floor);
            restored += 1;
        }
        restored
    }

    /// Serialize every model into a document keyed by object name
    pub fn save(&self) -> ModelDocument {
        self.entries
            .iter()
            .map(|(name, m)| {
                (
                    name.clone(),
                    ModelRecord {
                        mean: m.mean,
                        std: m.std,
                        key: m.key,
                    },
                )
            })
            .collect()
    }

    /// Load models from a JSON file.
    ///
    /// A missing or malformed file leaves the defaults in place. Entries are
    /// decoded one at a time, so a single broken entry does not discard the
    /// rest. Returns the number of objects restored.
    pub fn load_file(&mut self, path: &Path) -> usize {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                warn!(
                    "No model store at {} ({}); starting uncalibrated",
                    path.display(),
                    e
                );
                return 0;
            }
        };

        let raw: BTreeMap<String, serde_json::Value> = match serde_json::from_str(&content) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Ignoring malformed model store {}: {}", path.display(), e);
                return 0;
            }
        };

        let mut document = ModelDocument::new();
        for (name, value) in raw {
            if !self.contains(&name) {
                debug!("Skipping unconfigured object '{}' in model store", name);
                continue;
            }
            match serde_json::from_value::<ModelRecord>(value) {
                Ok(record) => {
                    document.insert(name, record);
                }
                Err(e) => warn!("Skipping malformed entry '{}': {}", name, e),
            }
        }

        let restored = self.load(&document);
        info!(
            "Loaded {} of {} models from {}",
            restored,
            self.len(),
            path.display()
        );
        restored
    }

    /// Write all models to a JSON file, creating parent directories
    pub fn save_file(&self, path: &Path) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(&self.save())
            .map_err(|e| StoreError::Serialize(e.to_string()))?;

        let write_err = |source| StoreError::Write {
            path: path.display().to_string(),
            source,
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(write_err)?;
            }
        }
        std::fs::write(path, json).map_err(write_err)?;

        info!("Saved {} models to {}", self.len(), path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn objects() -> Vec<ObjectConfig> {
        vec![
            ObjectConfig::new("nothing", Some('n')),
            ObjectConfig::new("1", Some('1')),
            ObjectConfig::new("2", Some('2')),
        ]
    }

    #[test]
    fn test_defaults() {
        let store = ModelStore::from_objects(&objects(), DEFAULT_STD_FLOOR);
        assert_eq!(store.len(), 3);
        for (_, model) in store.iter() {
            assert_eq!(model.mean(), 0.0);
            assert_eq!(model.std(), 1.0);
        }
        assert_eq!(store.names().collect::<Vec<_>>(), vec!["nothing", "1", "2"]);
    }

    #[test]
    fn test_find_by_key() {
        let store = ModelStore::from_objects(&objects(), DEFAULT_STD_FLOOR);
        assert_eq!(store.find_by_key('n'), Some("nothing"));
        assert_eq!(store.find_by_key('2'), Some("2"));
        assert_eq!(store.find_by_key('x'), None);
    }

    #[test]
    fn test_load_partial_document() {
        let mut store = ModelStore::from_objects(&objects(), DEFAULT_STD_FLOOR);
        let mut doc = ModelDocument::new();
        doc.insert(
            "1".to_string(),
            ModelRecord {
                mean: 0.05,
                std: 0.01,
                key: 'a',
            },
        );
        doc.insert(
            "ghost".to_string(),
            ModelRecord {
                mean: 9.0,
                std: 9.0,
                key: 'g',
            },
        );

        store.load(&doc);

        let one = store.get("1").unwrap();
        assert_eq!(one.mean(), 0.05);
        assert_eq!(one.std(), 0.01);
        assert_eq!(one.key(), 'a');
        assert_eq!(store.get("nothing").unwrap().mean(), 0.0);
        assert!(store.get("ghost").is_none());
    }

    #[test]
    fn test_load_clamps_zero_std() {
        let mut store = ModelStore::from_objects(&objects(), DEFAULT_STD_FLOOR);
        let mut doc = ModelDocument::new();
        doc.insert(
            "2".to_string(),
            ModelRecord {
                mean: 0.1,
                std: 0.0,
                key: '2',
            },
        );
        store.load(&doc);
        assert_eq!(store.get("2").unwrap().std(), DEFAULT_STD_FLOOR);
    }

    #[test]
    fn test_non_finite_mean_rejected() {
        let mut store = ModelStore::from_objects(&objects(), DEFAULT_STD_FLOOR);
        assert!(!store.update("1", f64::NAN, 0.01));
        assert_eq!(store.get("1").unwrap().mean(), 0.0);

        let mut doc = ModelDocument::new();
        doc.insert(
            "1".to_string(),
            ModelRecord {
                mean: f64::NAN,
                std: 0.01,
                key: '1',
            },
        );
        doc.insert(
            "2".to_string(),
            ModelRecord {
                mean: 0.1,
                std: 0.01,
                key: '2',
            },
        );
        assert_eq!(store.load(&doc), 1);
        assert_eq!(store.get("1").unwrap().mean(), 0.0);
        assert_eq!(store.get("2").unwrap().mean(), 0.1);
    }

    #[test]
    fn test_save_load_round_trip() {
        let mut store = ModelStore::from_objects(&objects(), DEFAULT_STD_FLOOR);
        store.update("nothing", 0.012, 0.003);
        store.update("2", 0.1, 0.02);

        let doc = store.save();
        let json = serde_json::to_string(&doc).unwrap();
        let parsed: ModelDocument = serde_json::from_str(&json).unwrap();

        let mut restored = ModelStore::from_objects(&objects(), DEFAULT_STD_FLOOR);
        restored.load(&parsed);

        for ((name_a, a), (name_b, b)) in store.iter().zip(restored.iter()) {
            assert_eq!(name_a, name_b);
            assert_eq!(a, b);
        }
    }

    #[test]
    fn test_document_layout() {
        let mut store = ModelStore::from_objects(&objects(), DEFAULT_STD_FLOOR);
        store.update("1", 0.05, 0.01);
        let value = serde_json::to_value(store.save()).unwrap();
        assert_eq!(value["1"]["mean"], 0.05);
        assert_eq!(value["1"]["std"], 0.01);
        assert_eq!(value["1"]["key"], "1");
        assert_eq!(value["nothing"]["key"], "n");
    }

    #[test]
    fn test_load_file_missing() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ModelStore::from_objects(&objects(), DEFAULT_STD_FLOOR);
        assert_eq!(store.load_file(&dir.path().join("absent.json")), 0);
        assert_eq!(store.get("1").unwrap().std(), 1.0);
    }

    #[test]
    fn test_load_file_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("measurements.json");
        std::fs::write(&path, "{ not json").unwrap();

        let mut store = ModelStore::from_objects(&objects(), DEFAULT_STD_FLOOR);
        assert_eq!(store.load_file(&path), 0);
        assert_eq!(store.get("nothing").unwrap().mean(), 0.0);
    }

    #[test]
    fn test_load_file_skips_broken_entry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("measurements.json");
        std::fs::write(
            &path,
            r#"{
                "1": {"mean": 0.05, "std": 0.01, "key": "1"},
                "2": {"mean": "oops"}
            }"#,
        )
        .unwrap();

        let mut store = ModelStore::from_objects(&objects(), DEFAULT_STD_FLOOR);
        assert_eq!(store.load_file(&path), 1);
        assert_eq!(store.get("1").unwrap().mean(), 0.05);
        assert_eq!(store.get("2").unwrap().mean(), 0.0);
    }

    #[test]
    fn test_save_file_creates_parent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/dir/measurements.json");

        let mut store = ModelStore::from_objects(&objects(), DEFAULT_STD_FLOOR);
        store.update("1", 0.05, 0.01);
        store.save_file(&path).unwrap();

        let mut restored = ModelStore::from_objects(&objects(), DEFAULT_STD_FLOOR);
        assert_eq!(restored.load_file(&path), 3);
        assert_eq!(restored.get("1"), store.get("1"));
    }
}
