//! JSON-file script storage.
//!
//! All scripts live in one JSON array. Writes go to a sibling temp file first
//! and are renamed into place, so a crash mid-save never truncates the list.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::Script;

pub struct ScriptStore {
    path: PathBuf,
}

impl ScriptStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads every stored script. A missing file is an empty store.
    pub fn load_all(&self) -> Result<Vec<Script>> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "scripts file not found, starting empty");
            return Ok(Vec::new());
        }

        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read {}", self.path.display()))?;
        let scripts: Vec<Script> = serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse {}", self.path.display()))?;

        debug!(count = scripts.len(), "scripts loaded");
        Ok(scripts)
    }

    pub fn save_all(&self, scripts: &[Script]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
        }

        let json = serde_json::to_string_pretty(scripts)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).with_context(|| format!("failed to write {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("failed to replace {}", self.path.display()))?;

        info!(count = scripts.len(), path = %self.path.display(), "scripts saved");
        Ok(())
    }

    /// Inserts the script, or replaces the stored one with the same id.
    pub fn save(&self, script: &Script) -> Result<()> {
        let mut scripts = self.load_all()?;
        match scripts.iter_mut().find(|s| s.id == script.id) {
            Some(existing) => *existing = script.clone(),
            None => scripts.push(script.clone()),
        }
        self.save_all(&scripts)
    }

    /// Removes the script with `id`. Returns whether anything was removed.
    pub fn delete(&self, id: &str) -> Result<bool> {
        let mut scripts = self.load_all()?;
        let before = scripts.len();
        scripts.retain(|s| s.id != id);
        if scripts.len() == before {
            return Ok(false);
        }
        self.save_all(&scripts)?;
        Ok(true)
    }

    pub fn find_by_name(&self, name: &str) -> Result<Option<Script>> {
        Ok(self.load_all()?.into_iter().find(|s| s.name == name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::{Comparison, ExecutionMode, Rect, Step, Target};
    use tempfile::tempdir;

    fn sample(name: &str) -> Script {
        Script::new(
            name,
            vec![
                Step::click(100.0, 200.0),
                Step::wait(500),
                Step::recognize(
                    Rect::new(0.0, 0.0, 300.0, 80.0).unwrap(),
                    Target::Number(20.0),
                    Comparison::Equals,
                )
                .unwrap(),
            ],
            ExecutionMode::Repeat,
        )
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let store = ScriptStore::new(dir.path().join("scripts.json"));
        assert!(store.load_all().unwrap().is_empty());
    }

    #[test]
    fn test_save_then_find() {
        let dir = tempdir().unwrap();
        let store = ScriptStore::new(dir.path().join("nested").join("scripts.json"));
        let script = sample("daily");
        store.save(&script).unwrap();

        let found = store.find_by_name("daily").unwrap().unwrap();
        assert_eq!(found, script);
        assert!(store.find_by_name("weekly").unwrap().is_none());
    }

    #[test]
    fn test_save_replaces_by_id() {
        let dir = tempdir().unwrap();
        let store = ScriptStore::new(dir.path().join("scripts.json"));
        let mut script = sample("daily");
        store.save(&script).unwrap();

        script.name = "renamed".into();
        store.save(&script).unwrap();

        let all = store.load_all().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].name, "renamed");
    }

    #[test]
    fn test_delete() {
        let dir = tempdir().unwrap();
        let store = ScriptStore::new(dir.path().join("scripts.json"));
        let a = sample("a");
        let b = sample("b");
        store.save_all(&[a.clone(), b.clone()]).unwrap();

        assert!(store.delete(&a.id).unwrap());
        assert!(!store.delete(&a.id).unwrap());
        assert_eq!(store.load_all().unwrap(), vec![b]);
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("scripts.json");
        fs::write(&path, "not json").unwrap();
        assert!(ScriptStore::new(path).load_all().is_err());
    }

    #[test]
    fn test_file_uses_event_records() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("scripts.json");
        let store = ScriptStore::new(&path);
        store.save(&sample("daily")).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw[0]["executionMode"], "REPEAT");
        assert_eq!(raw[0]["events"][0]["type"], "CLICK");
        assert_eq!(raw[0]["events"][2]["type"], "OCR");
        assert_eq!(raw[0]["events"][2]["params"]["comparisonType"], "EQUALS");
    }
}
