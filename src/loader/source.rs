//! Data-source capability interface and the configured CSV source.

use std::path::PathBuf;

use crate::config::SourceConfig;
use crate::error::{HarmonizeError, HarmonizeResult};
use crate::loader::read::{read_and_concat, read_csv_table};
use crate::types::Table;

/// Identifies what a load operation should fetch.
///
/// Which fields a source requires is source-specific; a missing required
/// field is a configuration error from that source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadRequest {
    /// Dataset identifier, usually naming a configuration section.
    pub dataset: Option<String>,
    /// Dataset version, for sources with versioned raw files.
    pub version: Option<String>,
}

impl LoadRequest {
    /// Request a dataset by id.
    pub fn dataset(id: impl Into<String>) -> Self {
        Self {
            dataset: Some(id.into()),
            version: None,
        }
    }

    /// Select a dataset version, builder-style.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }
}

/// A source of raw data files.
///
/// Concrete sources implement exactly two operations: locating raw files and
/// reading them into a raw table. Everything else — dtype coercion,
/// adjustments, indexing — is provided by the pipeline.
pub trait RawSource {
    /// Locate the raw data file(s) for a request.
    fn raw_datafile_paths(
        &self,
        config: &SourceConfig,
        request: &LoadRequest,
    ) -> HarmonizeResult<Vec<PathBuf>>;

    /// Read located files into a raw table.
    fn read_raw_datafiles(
        &self,
        paths: &[PathBuf],
        config: &SourceConfig,
    ) -> HarmonizeResult<Table>;
}

/// A [`RawSource`] for per-dataset CSV files declared in configuration.
///
/// The request's dataset id names a configuration section carrying either a
/// `files` list (one file per line, oldest version first) or a
/// `file_pattern` glob, resolved against the root path. With a versioned
/// request, `files_<version>` is read instead of `files`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CsvDirSource;

impl CsvDirSource {
    /// Create the source.
    pub fn new() -> Self {
        Self
    }
}

impl RawSource for CsvDirSource {
    fn raw_datafile_paths(
        &self,
        config: &SourceConfig,
        request: &LoadRequest,
    ) -> HarmonizeResult<Vec<PathBuf>> {
        let dataset = request.dataset.as_deref().ok_or_else(|| {
            HarmonizeError::config(
                "this source requires a dataset id in the load request",
            )
        })?;
        if !config.has_section(dataset) {
            return Err(HarmonizeError::config(format!(
                "no configuration section for dataset '{dataset}'"
            )));
        }

        let files_option = match &request.version {
            Some(version) => format!("files_{version}"),
            None => "files".to_string(),
        };

        if config.get_opt(dataset, &files_option).is_some() {
            let paths = config.get_path_list(dataset, &files_option)?;
            for path in &paths {
                if !path.is_file() {
                    return Err(HarmonizeError::Io(std::io::Error::new(
                        std::io::ErrorKind::NotFound,
                        format!("raw data file not found: {}", path.display()),
                    )));
                }
            }
            return Ok(paths);
        }
        if request.version.is_some() {
            return Err(HarmonizeError::config(format!(
                "dataset '{dataset}' has no '{files_option}' option"
            )));
        }

        let Some(pattern) = config.get_opt(dataset, "file_pattern") else {
            return Err(HarmonizeError::config(format!(
                "dataset '{dataset}' declares neither 'files' nor 'file_pattern'"
            )));
        };
        let pattern_path = PathBuf::from(pattern);
        let full_pattern = if pattern_path.is_absolute() {
            pattern_path
        } else {
            let root = config.root_path().ok_or_else(|| {
                HarmonizeError::config(format!(
                    "dataset '{dataset}' uses a relative file_pattern but no root path \
                     is configured"
                ))
            })?;
            root.join(pattern_path)
        };
        let pattern_str = full_pattern.to_string_lossy();
        let matches = glob::glob(&pattern_str)
            .map_err(|e| {
                HarmonizeError::config(format!("invalid file_pattern '{pattern_str}': {e}"))
            })?;
        let mut paths = Vec::new();
        for entry in matches {
            let path = entry.map_err(|e| {
                HarmonizeError::config(format!("cannot read glob match: {e}"))
            })?;
            paths.push(path);
        }
        // Lexicographic order keeps versioned files oldest-first.
        paths.sort();
        if paths.is_empty() {
            return Err(HarmonizeError::config(format!(
                "file_pattern '{pattern_str}' for dataset '{dataset}' matches no files"
            )));
        }
        Ok(paths)
    }

    fn read_raw_datafiles(
        &self,
        paths: &[PathBuf],
        _config: &SourceConfig,
    ) -> HarmonizeResult<Table> {
        read_and_concat(paths, |p| read_csv_table(p))
    }
}

#[cfg(test)]
mod tests {
    use super::{CsvDirSource, LoadRequest, RawSource};
    use crate::config::SourceConfig;

    fn write_files(dir: &std::path::Path) {
        std::fs::write(dir.join("bal_2019.csv"), "id\n1\n").unwrap();
        std::fs::write(dir.join("bal_2020.csv"), "id\n2\n").unwrap();
    }

    fn config_for(dir: &std::path::Path, body: &str) -> SourceConfig {
        let mut config = SourceConfig::from_string(body).unwrap();
        config.set_root_path(dir);
        config
    }

    #[test]
    fn file_list_resolves_and_checks_existence() {
        let dir = tempfile::tempdir().unwrap();
        write_files(dir.path());
        let config = config_for(
            dir.path(),
            "[web]\nfiles =\n    bal_2019.csv\n    bal_2020.csv\n",
        );
        let paths = CsvDirSource::new()
            .raw_datafile_paths(&config, &LoadRequest::dataset("web"))
            .unwrap();
        assert_eq!(paths.len(), 2);
        assert!(paths[0].ends_with("bal_2019.csv"));

        let missing = config_for(dir.path(), "[web]\nfiles = nope.csv\n");
        let err = CsvDirSource::new()
            .raw_datafile_paths(&missing, &LoadRequest::dataset("web"))
            .unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn glob_pattern_matches_oldest_first() {
        let dir = tempfile::tempdir().unwrap();
        write_files(dir.path());
        let config = config_for(dir.path(), "[web]\nfile_pattern = bal_*.csv\n");
        let paths = CsvDirSource::new()
            .raw_datafile_paths(&config, &LoadRequest::dataset("web"))
            .unwrap();
        assert_eq!(paths.len(), 2);
        assert!(paths[0].ends_with("bal_2019.csv"));
        assert!(paths[1].ends_with("bal_2020.csv"));
    }

    #[test]
    fn request_and_section_validation() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_for(dir.path(), "[web]\nfiles = a.csv\n");
        let source = CsvDirSource::new();

        let err = source
            .raw_datafile_paths(&config, &LoadRequest::default())
            .unwrap_err();
        assert!(err.to_string().contains("requires a dataset id"));

        let err = source
            .raw_datafile_paths(&config, &LoadRequest::dataset("other"))
            .unwrap_err();
        assert!(err.to_string().contains("no configuration section"));

        let empty = config_for(dir.path(), "[web]\nskiprows = 1\n");
        let err = source
            .raw_datafile_paths(&empty, &LoadRequest::dataset("web"))
            .unwrap_err();
        assert!(err.to_string().contains("neither 'files' nor 'file_pattern'"));
    }

    #[test]
    fn versioned_requests_use_versioned_file_lists() {
        let dir = tempfile::tempdir().unwrap();
        write_files(dir.path());
        let config = config_for(
            dir.path(),
            "[web]\nfiles = bal_2020.csv\nfiles_2019 = bal_2019.csv\n",
        );
        let source = CsvDirSource::new();

        let paths = source
            .raw_datafile_paths(&config, &LoadRequest::dataset("web").with_version("2019"))
            .unwrap();
        assert!(paths[0].ends_with("bal_2019.csv"));

        let err = source
            .raw_datafile_paths(&config, &LoadRequest::dataset("web").with_version("1990"))
            .unwrap_err();
        assert!(err.to_string().contains("files_1990"));
    }
}
