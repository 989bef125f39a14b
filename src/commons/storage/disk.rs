use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};

use log::warn;
use serde_json::Value;

use crate::commons::storage::{
    Key, KeyValueError, Namespace, Scope, Segment, StorageResult,
};

//------------ Disk ----------------------------------------------------------

/// Disk based storage, using one JSON file per key.
///
/// Under the hood this uses two directories: path/namespace and
/// path/tmp. The latter is used for temporary files for new values.
/// Such values are written first and then renamed (moved) to avoid
/// issues with partially written files because of I/O issues (disk
/// full) or concurrent reads of the key as its value is being updated.
///
/// Different instances that use different namespaces but share the same
/// (base) path all use the same tmp directory. This is not an issue as
/// the temporary files have unique names.
#[derive(Clone, Debug)]
pub struct Disk {
    root: PathBuf,
    tmp: PathBuf,
}

impl Disk {
    const EXTENSION: &'static str = ".json";

    /// Creates a disk based store for the given base path and namespace.
    pub fn new(path: &str, namespace: &Namespace) -> StorageResult<Self> {
        let root = PathBuf::from(path).join(namespace.as_str());
        let tmp = PathBuf::from(path).join("tmp");

        if !tmp.exists() {
            fs::create_dir_all(&tmp).map_err(|e| {
                KeyValueError::io(
                    format!(
                        "cannot create directory for tmp files: {}",
                        tmp.display()
                    ),
                    e,
                )
            })?;
        }

        Ok(Disk { root, tmp })
    }

    fn path_for_scope(&self, scope: &Scope) -> PathBuf {
        let mut path = self.root.clone();
        for segment in scope.as_vec() {
            path.push(segment.as_str());
        }
        path
    }

    fn path_for_key(&self, key: &Key) -> PathBuf {
        let mut path = self.path_for_scope(key.scope());
        path.push(format!("{}{}", key.name(), Self::EXTENSION));
        path
    }

    /// Maps a file path under `root` back to the key it stores.
    ///
    /// Returns `None` for files this store did not write, such as
    /// foreign files without the JSON extension.
    fn key_for_path(&self, path: &Path) -> Option<Key> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let mut segments = Vec::new();
        for component in relative.components() {
            segments.push(component.as_os_str().to_str()?.to_string());
        }

        let file_name = segments.pop()?;
        let name = Segment::parse(file_name.strip_suffix(Self::EXTENSION)?).ok()?;
        let scope = Scope::new(
            segments
                .iter()
                .map(|s| Segment::parse(s))
                .collect::<Result<_, _>>()
                .ok()?,
        );

        Some(Key::new_scoped(scope, name))
    }
}

impl Disk {
    pub fn has(&self, key: &Key) -> StorageResult<bool> {
        Ok(self.path_for_key(key).exists())
    }

    pub fn get(&self, key: &Key) -> StorageResult<Option<Value>> {
        let path = self.path_for_key(key);
        if path.exists() {
            let value = fs::read_to_string(&path).map_err(|e| {
                KeyValueError::io(
                    format!("cannot read file for key: {key}"),
                    e,
                )
            })?;
            Ok(Some(serde_json::from_str(&value)?))
        } else {
            Ok(None)
        }
    }

    pub fn list_keys(&self, scope: &Scope) -> StorageResult<Vec<Key>> {
        let path = self.path_for_scope(scope);
        if !path.exists() {
            return Ok(vec![]);
        }

        let mut keys = vec![];
        for file in list_files_recursive(&path)? {
            match self.key_for_path(&file) {
                Some(key) => keys.push(key),
                None => {
                    warn!(
                        "ignoring foreign file in store: {}",
                        file.display()
                    );
                }
            }
        }

        Ok(keys)
    }

    /// Stores a value on disk.
    ///
    /// The entire value is written into a tempfile first, to ensure
    /// that it is complete before it is renamed to the actual file for
    /// the key. A reader therefore sees either the old value or the new
    /// value, never a partial one.
    pub fn store(&self, key: &Key, value: Value) -> StorageResult<()> {
        let path = self.path_for_key(key);
        let dir = self.path_for_scope(key.scope());

        if !dir.try_exists().unwrap_or_default() {
            fs::create_dir_all(&dir).map_err(|e| {
                KeyValueError::io(
                    format!("cannot create dir for path: {}", dir.display()),
                    e,
                )
            })?;
        }

        let tmp_file =
            tempfile::NamedTempFile::new_in(&self.tmp).map_err(|e| {
                KeyValueError::io(
                    format!(
                        "issue writing tmp file for key: {key}. \
                         Check permissions and space on disk."
                    ),
                    e,
                )
            })?;

        fs::write(&tmp_file, format!("{value:#}").as_bytes()).map_err(|e| {
            KeyValueError::io(
                format!(
                    "issue writing tmp file: {} for key: {key}",
                    tmp_file.as_ref().display()
                ),
                e,
            )
        })?;

        tmp_file.persist(&path).map_err(|e| {
            KeyValueError::io(
                format!("cannot persist tmp file to: {}", path.display()),
                e.error,
            )
        })?;

        Ok(())
    }
}

impl Display for Disk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "local://{}", self.root.display())
    }
}


//------------ Helpers -------------------------------------------------------

fn list_files_recursive(dir: &Path) -> StorageResult<Vec<PathBuf>> {
    let mut files = vec![];

    let entries = fs::read_dir(dir).map_err(|e| {
        KeyValueError::io(
            format!("cannot read directory: {}", dir.display()),
            e,
        )
    })?;

    for entry in entries {
        let path = entry
            .map_err(|e| {
                KeyValueError::io(
                    format!("cannot read entry in: {}", dir.display()),
                    e,
                )
            })?
            .path();
        if path.is_dir() {
            files.append(&mut list_files_recursive(&path)?);
        } else {
            files.push(path);
        }
    }

    Ok(files)
}
