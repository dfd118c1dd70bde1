//! File-backed hierarchical JSON store.
//!
//! A key is a list of segments; `["session", "abc"]` maps to
//! `<root>/session/abc.json`. There is no caching or indexing: every call
//! touches the filesystem.

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use crate::error::StorageError;

/// Root of the JSON store.
#[derive(Debug, Clone)]
pub struct Storage {
    root: PathBuf,
}

impl Storage {
    /// Opens (and creates, if needed) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|source| io_err(&root, source))?;
        Ok(Self { root })
    }

    /// Opens the default store under kiri's data directory.
    pub fn open_default() -> anyhow::Result<Self> {
        let root = crate::config::Config::data_dir()?.join(crate::constants::STORAGE_DIRNAME);
        Ok(Self::open(root)?)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Serializes `value` as pretty JSON under `key`, creating parent directories.
    ///
    /// The JSON goes to a temp file next to the target and is renamed into
    /// place, so a reader sees either the old value or the new one. Temp
    /// files never end in `.json` and are invisible to [`Storage::list`].
    pub fn write<T: Serialize + ?Sized>(&self, key: &[&str], value: &T) -> Result<(), StorageError> {
        let path = self.file_path(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| io_err(parent, source))?;
        }
        let json = serde_json::to_string_pretty(value).map_err(|source| StorageError::Encode {
            path: path.display().to_string(),
            source,
        })?;
        let tmp_path = path.with_extension(format!("tmp.{}", Uuid::new_v4()));
        fs::write(&tmp_path, json).map_err(|source| io_err(&tmp_path, source))?;
        if let Err(source) = fs::rename(&tmp_path, &path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(io_err(&path, source));
        }
        Ok(())
    }

    /// Reads and decodes the value under `key`. Returns `None` if it does not exist.
    pub fn read<T: DeserializeOwned>(&self, key: &[&str]) -> Result<Option<T>, StorageError> {
        let path = self.file_path(key)?;
        if !path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&path).map_err(|source| io_err(&path, source))?;
        let value = serde_json::from_str(&contents).map_err(|source| StorageError::Decode {
            path: path.display().to_string(),
            source,
        })?;
        Ok(Some(value))
    }

    /// Removes the value under `key`. Missing keys are not an error.
    pub fn delete(&self, key: &[&str]) -> Result<(), StorageError> {
        let path = self.file_path(key)?;
        if path.exists() {
            fs::remove_file(&path).map_err(|source| io_err(&path, source))?;
        }
        Ok(())
    }

    /// Recursively removes everything stored under `prefix`.
    pub fn delete_prefix(&self, prefix: &[&str]) -> Result<(), StorageError> {
        let dir = self.dir_path(prefix)?;
        if dir.exists() {
            fs::remove_dir_all(&dir).map_err(|source| io_err(&dir, source))?;
        }
        Ok(())
    }

    /// Lists the leaf keys directly under `prefix`, sorted lexically.
    pub fn list(&self, prefix: &[&str]) -> Result<Vec<String>, StorageError> {
        let dir = self.dir_path(prefix)?;
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(&dir).map_err(|source| io_err(&dir, source))?;
        let mut keys = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| io_err(&dir, source))?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                keys.push(stem.to_string());
            }
        }
        keys.sort();
        Ok(keys)
    }

    pub fn exists(&self, key: &[&str]) -> Result<bool, StorageError> {
        Ok(self.file_path(key)?.exists())
    }

    fn file_path(&self, key: &[&str]) -> Result<PathBuf, StorageError> {
        let (last, parents) = key
            .split_last()
            .ok_or_else(|| StorageError::InvalidKey(String::new()))?;
        let dir = self.dir_path(parents)?;
        validate_segment(last, key)?;
        Ok(dir.join(format!("{}.json", last)))
    }

    fn dir_path(&self, prefix: &[&str]) -> Result<PathBuf, StorageError> {
        let mut path = self.root.clone();
        for segment in prefix {
            validate_segment(segment, prefix)?;
            path.push(segment);
        }
        Ok(path)
    }
}

/// Rejects segments that would escape the store or collapse the hierarchy.
fn validate_segment(segment: &str, key: &[&str]) -> Result<(), StorageError> {
    if segment.is_empty()
        || segment == "."
        || segment == ".."
        || segment.contains('/')
        || segment.contains('\\')
    {
        return Err(StorageError::InvalidKey(key.join("/")));
    }
    Ok(())
}

fn io_err(path: &Path, source: std::io::Error) -> StorageError {
    StorageError::Io {
        path: path.display().to_string(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn temp_store(name: &str) -> Storage {
        let dir = std::env::temp_dir().join(format!("kiri_storage_{}_{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        Storage::open(dir).unwrap()
    }

    #[test]
    fn test_write_read_delete() {
        let store = temp_store("rw");
        store.write(&["session", "abc"], &json!({"a": 1})).unwrap();
        assert!(store.exists(&["session", "abc"]).unwrap());

        let value: Option<Value> = store.read(&["session", "abc"]).unwrap();
        assert_eq!(value, Some(json!({"a": 1})));

        store.delete(&["session", "abc"]).unwrap();
        let value: Option<Value> = store.read(&["session", "abc"]).unwrap();
        assert!(value.is_none());

        fs::remove_dir_all(store.root()).unwrap();
    }

    #[test]
    fn test_list_is_sorted_and_prefix_delete_cascades() {
        let store = temp_store("list");
        store.write(&["message", "s1", "002"], &json!(2)).unwrap();
        store.write(&["message", "s1", "001"], &json!(1)).unwrap();
        store.write(&["message", "s1", "010"], &json!(10)).unwrap();

        assert_eq!(store.list(&["message", "s1"]).unwrap(), vec!["001", "002", "010"]);
        assert!(store.list(&["message", "missing"]).unwrap().is_empty());

        store.delete_prefix(&["message", "s1"]).unwrap();
        assert!(store.list(&["message", "s1"]).unwrap().is_empty());

        fs::remove_dir_all(store.root()).unwrap();
    }

    #[test]
    fn test_rejects_escaping_keys() {
        let store = temp_store("keys");
        assert!(matches!(
            store.write(&["..", "evil"], &json!(1)),
            Err(StorageError::InvalidKey(_))
        ));
        assert!(matches!(
            store.write(&["a/b"], &json!(1)),
            Err(StorageError::InvalidKey(_))
        ));
        assert!(matches!(store.read::<Value>(&[]), Err(StorageError::InvalidKey(_))));

        fs::remove_dir_all(store.root()).unwrap();
    }

    #[test]
    fn test_corrupt_value_is_decode_error() {
        let store = temp_store("corrupt");
        let path = store.root().join("session");
        fs::create_dir_all(&path).unwrap();
        fs::write(path.join("bad.json"), "{not json").unwrap();

        assert!(matches!(
            store.read::<Value>(&["session", "bad"]),
            Err(StorageError::Decode { .. })
        ));

        fs::remove_dir_all(store.root()).unwrap();
    }

    #[test]
    fn test_leftover_temp_file_is_ignored() {
        let store = temp_store("atomic");
        store.write(&["message", "s1", "001"], &json!({"n": 1})).unwrap();
        store.write(&["message", "s1", "001"], &json!({"n": 2})).unwrap();
        // A write interrupted before its rename leaves only the temp file.
        let dir = store.root().join("message").join("s1");
        fs::write(dir.join("002.tmp.0f3a"), "{\"n\": ").unwrap();

        assert_eq!(store.list(&["message", "s1"]).unwrap(), vec!["001"]);
        let value: Option<Value> = store.read(&["message", "s1", "001"]).unwrap();
        assert_eq!(value, Some(json!({"n": 2})));
        let files = fs::read_dir(&dir).unwrap().count();
        assert_eq!(files, 2);

        fs::remove_dir_all(store.root()).unwrap();
    }
}
