use std::collections::BTreeMap;
use std::path::PathBuf;

use stat_harmonize::labels::{
    Axis, Hierarchy, LabelMap, LabelSetRegistry, MissingPolicy, TableAxis,
};
use stat_harmonize::types::{DataType, Field, Schema, Table, Value};

const LABELS_FILE: &str = "tests/fixtures/web_labels.yaml";

fn utf8s(items: &[&str]) -> Vec<Value> {
    items.iter().map(|s| Value::Utf8((*s).to_string())).collect()
}

#[test]
fn products_round_trip_through_names() {
    let map = LabelMap::from_yaml_file(LABELS_FILE, &["products"], true).unwrap();
    let names = map
        .translate(
            &utf8s(&["COAL", "GAS"]),
            &Axis::Code,
            &Axis::column("name"),
            MissingPolicy::Raise,
        )
        .unwrap();
    assert_eq!(names, utf8s(&["Coal", "Natural gas"]));

    let codes = map
        .translate(&names, &Axis::column("name"), &Axis::Code, MissingPolicy::Raise)
        .unwrap();
    assert_eq!(codes, utf8s(&["COAL", "GAS"]));
}

#[test]
fn unknown_code_raises_unless_null_opted_in() {
    let map = LabelMap::from_yaml_file(LABELS_FILE, &["products"], true).unwrap();
    assert!(map
        .translate(
            &utf8s(&["COAL", "OIL"]),
            &Axis::Code,
            &Axis::column("name"),
            MissingPolicy::Raise,
        )
        .is_err());

    let out = map
        .translate(
            &utf8s(&["COAL", "OIL"]),
            &Axis::Code,
            &Axis::column("name"),
            MissingPolicy::Null,
        )
        .unwrap();
    assert_eq!(out, vec![Value::Utf8("Coal".to_string()), Value::Null]);
}

#[test]
fn alternate_agency_codes_translate_between_columns() {
    let map = LabelMap::from_yaml_file(LABELS_FILE, &["regions"], true).unwrap();
    let iso = map
        .translate(
            &utf8s(&["CN", "US"]),
            &Axis::Code,
            &Axis::column("iso3"),
            MissingPolicy::Raise,
        )
        .unwrap();
    assert_eq!(iso, utf8s(&["CHN", "USA"]));

    let names = map
        .translate(
            &iso,
            &Axis::column("iso3"),
            &Axis::column("name"),
            MissingPolicy::Raise,
        )
        .unwrap();
    assert_eq!(names, utf8s(&["China", "United States"]));
}

#[test]
fn metadata_tags_carry_into_the_table_attrs() {
    let map = LabelMap::from_yaml_file(LABELS_FILE, &["products"], true).unwrap();
    let table = map.table();
    assert_eq!(table.name.as_deref(), Some("products"));
    assert_eq!(
        table.attrs.get("hierarchy_level").and_then(|v| v.as_str()),
        Some("level")
    );
    // code_type: str applies to the code axis dtype.
    assert_eq!(table.schema.fields[0].data_type, DataType::Utf8);
}

#[test]
fn hierarchy_view_exposes_levels_parents_and_memo_items() {
    let map = LabelMap::from_yaml_file(LABELS_FILE, &["products"], true).unwrap();
    let hierarchy = Hierarchy::from_label_map(&map).unwrap();

    assert_eq!(hierarchy.level_of("TOT"), Some(1));
    assert_eq!(hierarchy.parent_of("COAL"), Some("TOT"));
    assert_eq!(hierarchy.children_of("TOT"), vec!["COAL", "GAS"]);
    assert!(hierarchy.is_memo("BUNKERS"));
    assert_eq!(hierarchy.memo_items_of("TOT"), vec!["BUNKERS"]);
}

#[test]
fn rollup_mismatches_are_reported_not_raised() {
    let map = LabelMap::from_yaml_file(LABELS_FILE, &["products"], true).unwrap();
    let hierarchy = Hierarchy::from_label_map(&map).unwrap();

    let schema = Schema::new(vec![
        Field::new("product", DataType::Utf8),
        Field::new("value", DataType::Float64),
    ]);
    let table = Table::new(
        schema,
        vec![
            vec![Value::Utf8("TOT".to_string()), Value::Float64(16.0)],
            vec![Value::Utf8("COAL".to_string()), Value::Float64(10.5)],
            vec![Value::Utf8("GAS".to_string()), Value::Float64(5.0)],
        ],
    );

    // 10.5 + 5.0 != 16.0; the discrepancy is information, not an error.
    let report = hierarchy.reconcile(&table, "product", "value", 1e-6).unwrap();
    assert_eq!(report.len(), 1);
    assert_eq!(report[0].parent, "TOT");
    assert!((report[0].actual - 15.5).abs() < 1e-9);
}

#[test]
fn registry_scans_eagerly_and_materializes_lazily() {
    let mut files = BTreeMap::new();
    files.insert("web".to_string(), PathBuf::from("web_labels.yaml"));
    let registry = LabelSetRegistry::new("tests/fixtures", files).unwrap();

    assert_eq!(
        registry.label_sets_in("web").unwrap(),
        &["products".to_string(), "regions".to_string()]
    );

    let map = registry.get_label_map("web", "regions").unwrap();
    assert_eq!(map.codes(), vec!["CN", "US"]);
    assert!(registry.get_label_map("web", "flows").is_err());
}

#[test]
fn row_labels_translate_through_the_map() {
    let map = LabelMap::from_yaml_file(LABELS_FILE, &["products"], true).unwrap();
    let schema = Schema::new(vec![
        Field::new("product", DataType::Utf8),
        Field::new("value", DataType::Float64),
    ]);
    let mut table = Table::new(
        schema,
        vec![
            vec![Value::Utf8("COAL".to_string()), Value::Float64(1.0)],
            vec![Value::Utf8("GAS".to_string()), Value::Float64(2.0)],
        ],
    );
    table.set_index(vec!["product".to_string()]).unwrap();

    let translated = map
        .translate_index(
            &table,
            &Axis::Code,
            &Axis::column("name"),
            TableAxis::Rows,
            None,
            MissingPolicy::Raise,
        )
        .unwrap();
    assert_eq!(
        translated.row_labels(),
        vec![utf8s(&["Coal"]), utf8s(&["Natural gas"])]
    );
}
