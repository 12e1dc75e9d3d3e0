use std::path::PathBuf;

use stat_harmonize::config::SourceConfig;

const CONFIG_FILE: &str = "tests/fixtures/sources.cfg";

#[test]
fn root_defaults_to_the_config_file_directory() {
    let config = SourceConfig::from_file(CONFIG_FILE).unwrap();
    let root = config.root_path().unwrap();
    assert!(root.is_absolute());
    assert!(root.ends_with("tests/fixtures"));
}

#[test]
fn file_lists_resolve_against_the_root() {
    let config = SourceConfig::from_file(CONFIG_FILE).unwrap();
    let files = config.get_path_list("web", "files").unwrap();
    assert_eq!(files.len(), 2);
    assert!(files[0].ends_with("tests/fixtures/web_balance_2019.csv"));
    assert!(files.iter().all(|p| p.is_file()));
}

#[test]
fn index_columns_read_as_a_list() {
    let config = SourceConfig::from_file(CONFIG_FILE).unwrap();
    assert_eq!(
        config.get_list("web", "index_cols").unwrap(),
        vec!["region", "product"]
    );
}

#[test]
fn string_config_extends_a_file_config() {
    let mut config = SourceConfig::from_file(CONFIG_FILE).unwrap();
    let original_root = config.root_path().unwrap();

    config
        .read_str("[web]\nskiprows = 2\n[extra]\nfile_pattern = extra_*.csv\n")
        .unwrap();
    assert_eq!(config.get("web", "skiprows").unwrap(), "2");
    assert!(config.has_section("extra"));
    // Options from the file are still there, and the root is unchanged.
    assert!(config.get_opt("web", "files").is_some());
    assert_eq!(config.root_path().unwrap(), original_root);
}

#[test]
fn missing_options_are_config_errors() {
    let config = SourceConfig::from_file(CONFIG_FILE).unwrap();
    let err = config.get("web", "no_such_option").unwrap_err();
    assert!(err.to_string().contains("no_such_option"));
    let err = config.get_path_list("nope", "files").unwrap_err();
    assert!(err.to_string().contains("'files'"));
}

#[test]
fn missing_config_file_propagates_io_error() {
    let err = SourceConfig::from_file(PathBuf::from("tests/fixtures/absent.cfg")).unwrap_err();
    assert!(err.to_string().contains("io error"));
}
