//! Match, master and detail joins aggregated on SQLite.

use serde_json::{json, Value};
use starql::config::Settings;
use starql::model::Cube;
use starql::query::{AggregationResult, Cell, Record};
use starql::star::{AggregateRequest, Browser};
use starql::store::SqliteStore;

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn store() -> SqliteStore {
    let store = SqliteStore::open_in_memory().unwrap();
    store
        .execute_batch(
            "CREATE TABLE facts (id INTEGER, id_date INTEGER, id_city INTEGER, amount INTEGER);
             INSERT INTO facts VALUES (1, 20120101, 1, 100), (2, 20120102, 99, 1000);
             CREATE TABLE dim_city (id INTEGER, name TEXT);
             INSERT INTO dim_city VALUES (1, 'Bratislava'), (2, 'New York');",
        )
        .unwrap();
    store
}

fn cube(method: &str) -> Cube {
    let description = json!({
        "name": "sales",
        "fact": "facts",
        "dimensions": [
            {"name": "city", "levels": [{"name": "name"}]}
        ],
        "measures": [{"name": "amount"}],
        "aggregates": [
            {"name": "amount_sum", "function": "sum", "measure": "amount"},
            {"name": "record_count", "function": "count"}
        ],
        "joins": [
            {"master": "facts.id_city", "detail": "dim_city.id", "method": method}
        ]
    });
    Cube::from_value(description).unwrap()
}

fn settings() -> Settings {
    let mut settings = Settings::default();
    settings.schema.dimension_prefix = "dim_".into();
    settings
}

fn aggregate_by_city(method: &str) -> AggregationResult {
    init_logging();
    let (cube, store) = (cube(method), store());
    let browser = Browser::new(&cube, &store, &settings()).unwrap();
    let request = AggregateRequest::new(Cell::default())
        .parse_drilldown(&["city"])
        .unwrap();
    browser.aggregate(&request).unwrap()
}

fn rows(result: &mut AggregationResult) -> Vec<(Value, Value, Value)> {
    result
        .cached()
        .iter()
        .map(|r: &Record| {
            (
                r["city.name"].clone(),
                r["amount_sum"].clone(),
                r["record_count"].clone(),
            )
        })
        .collect()
}

#[test]
fn test_match_join_drops_unmatched_facts() {
    let mut result = aggregate_by_city("match");
    assert_eq!(result.summary.as_ref().unwrap()["amount_sum"], json!(100));
    assert_eq!(rows(&mut result), vec![(json!("Bratislava"), json!(100), json!(1))]);
    assert_eq!(result.total_cell_count, Some(1));
}

#[test]
fn test_master_join_keeps_all_facts() {
    let mut result = aggregate_by_city("master");
    assert_eq!(result.summary.as_ref().unwrap()["amount_sum"], json!(1100));
    assert_eq!(
        rows(&mut result),
        vec![
            (Value::Null, json!(1000), json!(1)),
            (json!("Bratislava"), json!(100), json!(1)),
        ]
    );
}

#[test]
fn test_detail_join_keeps_all_members() {
    let mut result = aggregate_by_city("detail");
    let summary = result.summary.clone().unwrap();
    assert_eq!(summary["amount_sum"], json!(100));
    assert_eq!(summary["record_count"], json!(1));
    assert_eq!(
        rows(&mut result),
        vec![
            (json!("Bratislava"), json!(100), json!(1)),
            (json!("New York"), json!(0), json!(0)),
        ]
    );
    assert_eq!(result.total_cell_count, Some(2));
}

#[test]
fn test_unjoined_cube_has_no_dimension_table() {
    init_logging();
    let mut cube = cube("match");
    cube.joins.clear();
    let store = store();
    let browser = Browser::new(&cube, &store, &settings()).unwrap();
    let request = AggregateRequest::new(Cell::default())
        .parse_drilldown(&["city"])
        .unwrap();
    let error = browser.aggregate(&request).unwrap_err();
    assert_eq!(error.kind(), "schema");
}
