use std::fs;

use pipeline::{
    CardName, CatalogError, DimensionName, Direction, FailureRecord, Ledger, LedgerStore,
    PipelineError, TemplateError, Timestamp,
};
use store::{load_catalog, load_prompt_template, JsonLedgerStore};

const CARDS: &str = r#"{
  "version": "1.0",
  "data": [
    {"card_name": "愚者", "direction": "正位", "summary": "新的开始", "detail": "冒险"},
    {"card_name": "愚者", "direction": "逆位", "summary": "鲁莽", "detail": ""},
    {"card_name": "魔术师", "direction": "upright", "summary": "创造"}
  ]
}"#;

const DIMENSIONS: &str = r#"{
  "data": [
    {"name": "情感-过去", "category": "情感", "description": "过去的情感", "aspect": "过去", "aspect_type": 1},
    {"name": "事业", "category": "事业", "description": "职业发展", "aspect": "", "aspect_type": ""}
  ]
}"#;

#[test]
fn catalog_loads_from_data_envelopes() {
    let dir = tempfile::tempdir().unwrap();
    let cards = dir.path().join("cards.json");
    let dimensions = dir.path().join("dimensions.json");
    fs::write(&cards, CARDS).unwrap();
    fs::write(&dimensions, DIMENSIONS).unwrap();

    let catalog = load_catalog(&cards, &dimensions).unwrap();

    assert_eq!(catalog.card_count(), 3);
    assert_eq!(catalog.expected_count(), 6);
    assert!(catalog.find_card("魔术师", Direction::Upright).is_some());
    let career = catalog.find_dimension("事业").unwrap();
    assert_eq!(career.aspect, None);
    assert_eq!(career.aspect_type, None);
    assert_eq!(catalog.find_dimension("情感-过去").unwrap().aspect_type, Some(1));
}

#[test]
fn unreadable_catalog_names_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("missing.json");
    let dimensions = dir.path().join("dimensions.json");
    fs::write(&dimensions, DIMENSIONS).unwrap();

    match load_catalog(&missing, &dimensions) {
        Err(CatalogError::Source { location, .. }) => assert!(location.ends_with("missing.json")),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn legacy_ledger_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out").join("ledger.json");
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(
        &path,
        r#"{
          "version": "1.0.0",
          "generated_at": "2025-01-05T10:11:12.123456",
          "model": "glm-4",
          "count": 1,
          "data": [{
            "card_name": "愚者", "direction": "正位",
            "dimension_name": "事业", "dimension_category": "事业",
            "aspect": "", "aspect_type": "", "content": "勇敢迈步"
          }]
        }"#,
    )
    .unwrap();
    let store = JsonLedgerStore::new(&path);

    let ledger = store.load().unwrap();
    assert_eq!(ledger.len(), 1);
    assert_eq!(ledger.records()[0].aspect_type, None);

    assert_eq!(ledger.model.as_deref(), Some("glm-4"));

    store.persist(&ledger).unwrap();
    let reloaded = store.load().unwrap();
    assert_eq!(reloaded.records(), ledger.records());
    assert_eq!(reloaded.updated_at, ledger.updated_at);

    let written: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(written["model"], "glm-4");
    assert_eq!(written["count"], 1);
}

#[test]
fn failures_survive_a_persist() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonLedgerStore::new(dir.path().join("ledger.json"));
    let mut ledger = Ledger::new("with failures");
    ledger.record_failures(vec![FailureRecord {
        card_name: CardName::new("愚者").unwrap(),
        direction: Direction::Reversed,
        dimension_name: DimensionName::new("事业").unwrap(),
        attempts: 3,
        error: "provider returned HTTP 503: busy".into(),
        failed_at: Timestamp::now(),
    }]);

    store.persist(&ledger).unwrap();
    let reloaded = store.load().unwrap();

    assert_eq!(reloaded.failures(), ledger.failures());
    assert_eq!(reloaded.failures()[0].direction, Direction::Reversed);
}

#[test]
fn persist_creates_directories_and_leaves_no_temp_files() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("deeper").join("ledger.json");
    let store = JsonLedgerStore::new(&path);

    for _ in 0..3 {
        store.persist(&Ledger::new("empty")).unwrap();
    }

    let entries: Vec<_> = fs::read_dir(path.parent().unwrap())
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert_eq!(entries, vec![std::ffi::OsString::from("ledger.json")]);
}

#[test]
fn prompt_template_errors_are_configuration_errors() {
    let dir = tempfile::tempdir().unwrap();
    let good = dir.path().join("good.txt");
    let bad = dir.path().join("bad.txt");
    fs::write(&good, "请解读{card_name}（{direction}）在「{dimension_name}」中的含义").unwrap();
    fs::write(&bad, "{card} is not a field").unwrap();

    assert!(load_prompt_template(&good).is_ok());

    let err = load_prompt_template(&bad).unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Template(TemplateError::UnknownPlaceholder { ref name }) if name == "card"
    ));
    assert!(err.is_configuration());

    let err = load_prompt_template(&dir.path().join("absent.txt")).unwrap_err();
    assert!(matches!(err, PipelineError::Configuration { .. }));
}
