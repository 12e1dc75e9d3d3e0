//! Section/option configuration for data sources.
//!
//! Loader parameters (file locations, dtype overrides, index column lists)
//! live in INI/CFG-style text:
//!
//! ```text
//! [DEFAULT]
//! root_path = /srv/statistics
//!
//! [energy_balance]
//! files =
//!     balance_2019.csv
//!     balance_2020.csv
//! index_cols =
//!     region
//!     product
//! ```
//!
//! Supported syntax is the subset this crate relies on: `[section]` headers,
//! `key = value` or `key: value` options, full-line `#`/`;` comments, and
//! indented continuation lines that extend the previous value with a newline
//! (the idiom for list-valued options). Option names are case-insensitive;
//! section names are case-sensitive. Options in the reserved `DEFAULT`
//! section are visible from every section.
//!
//! The reserved default-section option `root_path` names the root directory
//! used to resolve relative paths. An explicit root set by the caller wins
//! over file contents; absent both, the directory containing the first file
//! read is used.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{HarmonizeError, HarmonizeResult};

/// Name of the reserved defaults section.
pub const DEFAULT_SECTION: &str = "DEFAULT";

/// Reserved default-section option naming the root path.
pub const ROOT_PATH_OPTION: &str = "root_path";

/// Default separator for list-valued options: one item per line.
pub const DEFAULT_LIST_SEPARATOR: &str = "\n";

/// Key/value configuration with typed accessors and a resolvable root path.
///
/// Built once at loader construction, optionally extended with further
/// [`SourceConfig::read`]/[`SourceConfig::read_str`] calls, and consulted
/// read-only during every load operation.
#[derive(Debug, Clone, Default)]
pub struct SourceConfig {
    defaults: BTreeMap<String, String>,
    sections: BTreeMap<String, BTreeMap<String, String>>,
    root_override: Option<PathBuf>,
    list_separator: Option<String>,
    strip_items: bool,
}

impl SourceConfig {
    /// Create an empty configuration.
    pub fn new() -> Self {
        Self {
            defaults: BTreeMap::new(),
            sections: BTreeMap::new(),
            root_override: None,
            list_separator: None,
            strip_items: true,
        }
    }

    /// Read configuration from a file.
    ///
    /// If the file does not set `root_path`, the file's parent directory
    /// becomes the root.
    pub fn from_file(path: impl AsRef<Path>) -> HarmonizeResult<Self> {
        let mut config = Self::new();
        config.read(path)?;
        Ok(config)
    }

    /// Read configuration from a literal string with file-identical format.
    pub fn from_string(contents: &str) -> HarmonizeResult<Self> {
        let mut config = Self::new();
        config.read_str(contents)?;
        Ok(config)
    }

    /// Use a custom list separator instead of one-item-per-line.
    pub fn with_list_separator(mut self, separator: impl Into<String>) -> Self {
        self.list_separator = Some(separator.into());
        self
    }

    /// Disable whitespace stripping of list values and items.
    pub fn without_item_stripping(mut self) -> Self {
        self.strip_items = false;
        self
    }

    /// Merge configuration from a file; later values override earlier ones,
    /// except that an already-established root path is preserved.
    pub fn read(&mut self, path: impl AsRef<Path>) -> HarmonizeResult<()> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        let had_root = self.root_path().is_some();
        let prior_root = self.defaults.get(ROOT_PATH_OPTION).cloned();
        self.parse(&contents)?;
        if had_root {
            match prior_root {
                Some(root) => {
                    self.defaults.insert(ROOT_PATH_OPTION.to_string(), root);
                }
                None => {
                    self.defaults.remove(ROOT_PATH_OPTION);
                }
            }
        } else if self.root_path().is_none() {
            let parent = path.parent().unwrap_or_else(|| Path::new("."));
            let absolute = std::path::absolute(parent)?;
            self.defaults.insert(
                ROOT_PATH_OPTION.to_string(),
                absolute.to_string_lossy().into_owned(),
            );
        }
        Ok(())
    }

    /// Merge configuration from a literal string; later values override
    /// earlier ones, including the root path.
    pub fn read_str(&mut self, contents: &str) -> HarmonizeResult<()> {
        self.parse(contents)
    }

    fn parse(&mut self, contents: &str) -> HarmonizeResult<()> {
        let mut current_section: Option<String> = None;
        let mut current_option: Option<String> = None;

        for (lineno0, raw_line) in contents.lines().enumerate() {
            let lineno = lineno0 + 1;
            let line = raw_line.trim_end();
            let trimmed = line.trim_start();

            if trimmed.is_empty() {
                current_option = None;
                continue;
            }
            if trimmed.starts_with('#') || trimmed.starts_with(';') {
                continue;
            }

            // Indented lines continue the previous option's value.
            if line.starts_with(char::is_whitespace) {
                let (Some(section), Some(option)) = (&current_section, &current_option) else {
                    return Err(HarmonizeError::config(format!(
                        "line {lineno}: continuation line without a preceding option"
                    )));
                };
                let store = self.store_mut(section);
                if let Some(value) = store.get_mut(option) {
                    value.push('\n');
                    value.push_str(trimmed);
                }
                continue;
            }

            if trimmed.starts_with('[') {
                let Some(name) = trimmed.strip_prefix('[').and_then(|s| s.strip_suffix(']'))
                else {
                    return Err(HarmonizeError::config(format!(
                        "line {lineno}: malformed section header '{trimmed}'"
                    )));
                };
                current_section = Some(name.to_string());
                current_option = None;
                if name != DEFAULT_SECTION {
                    self.sections.entry(name.to_string()).or_default();
                }
                continue;
            }

            let delim = trimmed
                .find(['=', ':'])
                .ok_or_else(|| {
                    HarmonizeError::config(format!(
                        "line {lineno}: expected 'option = value', got '{trimmed}'"
                    ))
                })?;
            let option = trimmed[..delim].trim().to_lowercase();
            if option.is_empty() {
                return Err(HarmonizeError::config(format!(
                    "line {lineno}: empty option name"
                )));
            }
            let value = trimmed[delim + 1..].trim().to_string();
            let Some(section) = &current_section else {
                return Err(HarmonizeError::config(format!(
                    "line {lineno}: option before any section header"
                )));
            };
            self.store_mut(section).insert(option.clone(), value);
            current_option = Some(option);
        }
        Ok(())
    }

    fn store_mut(&mut self, section: &str) -> &mut BTreeMap<String, String> {
        if section == DEFAULT_SECTION {
            &mut self.defaults
        } else {
            self.sections.entry(section.to_string()).or_default()
        }
    }

    /// Section names in sorted order (the `DEFAULT` section is not listed).
    pub fn sections(&self) -> impl Iterator<Item = &str> {
        self.sections.keys().map(String::as_str)
    }

    /// Whether a non-default section exists.
    pub fn has_section(&self, section: &str) -> bool {
        self.sections.contains_key(section)
    }

    /// Get an option, falling back to the `DEFAULT` section, or `None`.
    pub fn get_opt(&self, section: &str, option: &str) -> Option<&str> {
        let option = option.to_lowercase();
        if section != DEFAULT_SECTION {
            if let Some(value) = self.sections.get(section).and_then(|s| s.get(&option)) {
                return Some(value.as_str());
            }
        }
        self.defaults.get(&option).map(String::as_str)
    }

    /// Get an option, falling back to the `DEFAULT` section.
    pub fn get(&self, section: &str, option: &str) -> HarmonizeResult<&str> {
        self.get_opt(section, option).ok_or_else(|| {
            HarmonizeError::config(format!(
                "missing option '{option}' in section '{section}'"
            ))
        })
    }

    /// Set an option directly.
    pub fn set(&mut self, section: &str, option: &str, value: impl Into<String>) {
        self.store_mut(section)
            .insert(option.to_lowercase(), value.into());
    }

    /// Get a list-valued option, split on the configured separator.
    ///
    /// The whole value and each item are whitespace-stripped (unless
    /// disabled) and empty items are dropped, so the one-item-per-line form
    /// tolerates a newline directly after the equals sign.
    pub fn get_list(&self, section: &str, option: &str) -> HarmonizeResult<Vec<String>> {
        let separator = self
            .list_separator
            .clone()
            .unwrap_or_else(|| DEFAULT_LIST_SEPARATOR.to_string());
        let raw = self.get(section, option)?;
        let value = if self.strip_items { raw.trim() } else { raw };
        let items = value
            .split(separator.as_str())
            .map(|item| {
                if self.strip_items {
                    item.trim().to_string()
                } else {
                    item.to_string()
                }
            })
            .filter(|item| !item.is_empty())
            .collect();
        Ok(items)
    }

    /// Get a list-valued option with every item parsed to `T`.
    pub fn get_parsed_list<T>(&self, section: &str, option: &str) -> HarmonizeResult<Vec<T>>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.get_list(section, option)?
            .into_iter()
            .map(|item| {
                item.parse::<T>().map_err(|e| {
                    HarmonizeError::config(format!(
                        "cannot parse item '{item}' of option '{option}' in section \
                         '{section}': {e}"
                    ))
                })
            })
            .collect()
    }

    /// The root path used to resolve relative file references.
    ///
    /// An explicit [`SourceConfig::set_root_path`] wins over configuration
    /// file contents.
    pub fn root_path(&self) -> Option<PathBuf> {
        if let Some(root) = &self.root_override {
            return Some(root.clone());
        }
        self.defaults.get(ROOT_PATH_OPTION).map(PathBuf::from)
    }

    /// Set an explicit root path, overriding any configured value.
    pub fn set_root_path(&mut self, root: impl Into<PathBuf>) {
        self.root_override = Some(root.into());
    }

    /// Get a path-valued option, resolving relative values against the root.
    pub fn get_path(&self, section: &str, option: &str) -> HarmonizeResult<PathBuf> {
        let raw = PathBuf::from(self.get(section, option)?);
        self.resolve_path(raw, section, option)
    }

    /// Get a list-valued option of paths, each resolved against the root.
    pub fn get_path_list(&self, section: &str, option: &str) -> HarmonizeResult<Vec<PathBuf>> {
        self.get_list(section, option)?
            .into_iter()
            .map(|item| self.resolve_path(PathBuf::from(item), section, option))
            .collect()
    }

    fn resolve_path(
        &self,
        path: PathBuf,
        section: &str,
        option: &str,
    ) -> HarmonizeResult<PathBuf> {
        if path.is_absolute() {
            return Ok(path);
        }
        let root = self.root_path().ok_or_else(|| {
            HarmonizeError::config(format!(
                "option '{option}' in section '{section}' is a relative path but no \
                 root path is configured"
            ))
        })?;
        Ok(root.join(path))
    }
}
