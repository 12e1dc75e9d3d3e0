//! Registry of vocabulary-definition files.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::{HarmonizeError, HarmonizeResult};
use crate::labels::map::LabelMap;

/// Read-only directory of label-definition files.
///
/// The registry eagerly reads the key set of every file at construction, so
/// callers can list which label sets exist per source, but materializes full
/// [`LabelMap`] instances only on request — vocabulary tables can be large
/// and most callers need one or two per run. Every
/// [`LabelSetRegistry::get_label_map`] call constructs a fresh instance;
/// nothing mutable is shared.
#[derive(Debug, Clone)]
pub struct LabelSetRegistry {
    files: BTreeMap<String, PathBuf>,
    label_sets: BTreeMap<String, Vec<String>>,
}

impl LabelSetRegistry {
    /// Build a registry from named files, relative paths resolved against
    /// `root`.
    pub fn new(
        root: impl AsRef<Path>,
        files: BTreeMap<String, PathBuf>,
    ) -> HarmonizeResult<Self> {
        let root = root.as_ref();
        let files: BTreeMap<String, PathBuf> = files
            .into_iter()
            .map(|(id, path)| {
                let path = if path.is_absolute() {
                    path
                } else {
                    root.join(path)
                };
                (id, path)
            })
            .collect();
        let label_sets = read_label_sets(&files)?;
        Ok(Self { files, label_sets })
    }

    /// Build a registry by scanning a directory tree for YAML files.
    ///
    /// Each file registers under its stem; two files with the same stem are
    /// a configuration error.
    pub fn discover(root: impl AsRef<Path>) -> HarmonizeResult<Self> {
        let mut files = BTreeMap::new();
        for entry in WalkDir::new(root.as_ref()).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                HarmonizeError::config(format!("cannot scan label directory: {e}"))
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let is_yaml = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"));
            if !is_yaml {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if files
                .insert(stem.to_string(), path.to_path_buf())
                .is_some()
            {
                return Err(HarmonizeError::config(format!(
                    "duplicate label file id '{stem}' while scanning directory"
                )));
            }
        }
        let label_sets = read_label_sets(&files)?;
        Ok(Self { files, label_sets })
    }

    /// Registered file ids and their paths.
    pub fn files(&self) -> &BTreeMap<String, PathBuf> {
        &self.files
    }

    /// Label sets available in each registered file.
    pub fn label_sets(&self) -> &BTreeMap<String, Vec<String>> {
        &self.label_sets
    }

    /// Label sets available in one registered file.
    pub fn label_sets_in(&self, file_id: &str) -> HarmonizeResult<&[String]> {
        self.label_sets
            .get(file_id)
            .map(Vec::as_slice)
            .ok_or_else(|| {
                HarmonizeError::config(format!("no label file registered as '{file_id}'"))
            })
    }

    /// Materialize a fresh [`LabelMap`] for one label set.
    pub fn get_label_map(&self, file_id: &str, labelset: &str) -> HarmonizeResult<LabelMap> {
        let path = self.files.get(file_id).ok_or_else(|| {
            HarmonizeError::config(format!("no label file registered as '{file_id}'"))
        })?;
        if !self.label_sets_in(file_id)?.iter().any(|s| s == labelset) {
            return Err(HarmonizeError::config(format!(
                "label file '{file_id}' has no label set '{labelset}'"
            )));
        }
        LabelMap::from_yaml_file(path, &[labelset], true)
    }
}

fn read_label_sets(
    files: &BTreeMap<String, PathBuf>,
) -> HarmonizeResult<BTreeMap<String, Vec<String>>> {
    let mut out = BTreeMap::new();
    for (id, path) in files {
        let text = fs::read_to_string(path)?;
        let parsed: serde_yaml::Value = serde_yaml::from_str(&text)?;
        let mapping = parsed.as_mapping().ok_or_else(|| {
            HarmonizeError::schema(format!(
                "label file '{}' is not a mapping of label sets",
                path.display()
            ))
        })?;
        let mut keys = Vec::with_capacity(mapping.len());
        for (key, _) in mapping {
            let key = key.as_str().ok_or_else(|| {
                HarmonizeError::schema(format!(
                    "label file '{}' has a non-string label set name",
                    path.display()
                ))
            })?;
            keys.push(key.to_string());
        }
        out.insert(id.clone(), keys);
    }
    Ok(out)
}
