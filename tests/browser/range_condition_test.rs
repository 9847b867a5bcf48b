//! Hierarchical range cuts evaluated on SQLite.

use serde_json::Value;
use starql::config::Settings;
use starql::model::Cube;
use starql::query::Cell;
use starql::star::{AggregateRequest, Browser};
use starql::store::SqliteStore;
use starql::QueryError;

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

const MONTHS: &[(i64, i64)] = &[
    (2011, 10),
    (2011, 11),
    (2011, 12),
    (2012, 1),
    (2012, 2),
    (2012, 3),
    (2012, 4),
    (2012, 5),
];

fn store() -> SqliteStore {
    let mut sql = String::from("CREATE TABLE sales (id INTEGER, year INTEGER, month INTEGER, amount INTEGER);\n");
    for (id, (year, month)) in MONTHS.iter().enumerate() {
        sql.push_str(&format!(
            "INSERT INTO sales VALUES ({}, {}, {}, 1);\n",
            id, year, month
        ));
    }
    let store = SqliteStore::open_in_memory().unwrap();
    store.execute_batch(&sql).unwrap();
    store
}

fn cube() -> Cube {
    Cube::from_json(
        r#"{
            "name": "sales",
            "dimensions": [{"name": "date", "levels": ["year", "month"]}],
            "measures": [{"name": "amount"}],
            "mappings": {"date.year": "year", "date.month": "month"}
        }"#,
    )
    .unwrap()
}

/// `(year, month)` of every month within `cell`.
fn months(cell: &str) -> Result<Vec<(i64, i64)>, QueryError> {
    init_logging();
    let (cube, store) = (cube(), store());
    let browser = Browser::new(&cube, &store, &Settings::default())?;
    let request = AggregateRequest::new(cell.parse::<Cell>()?)
        .with_aggregates(&["amount_sum"])
        .parse_drilldown(&["date:month"])?;
    let mut result = browser.aggregate(&request)?;
    Ok(result
        .cached()
        .iter()
        .map(|r| {
            let number = |name: &str| r[name].as_i64().unwrap_or_default();
            (number("date.year"), number("date.month"))
        })
        .collect())
}

#[test]
fn test_range_within_year() {
    assert_eq!(
        months("date:2012,1-2012,3").unwrap(),
        vec![(2012, 1), (2012, 2), (2012, 3)]
    );
}

#[test]
fn test_range_across_years() {
    assert_eq!(
        months("date:2011,11-2012,2").unwrap(),
        vec![(2011, 11), (2011, 12), (2012, 1), (2012, 2)]
    );
}

#[test]
fn test_open_ranges() {
    assert_eq!(
        months("date:-2011,11").unwrap(),
        vec![(2011, 10), (2011, 11)]
    );
    assert_eq!(months("date:2012,4-").unwrap(), vec![(2012, 4), (2012, 5)]);
}

#[test]
fn test_bounds_of_different_depth() {
    assert_eq!(
        months("date:2011-2012,1").unwrap(),
        vec![(2011, 10), (2011, 11), (2011, 12), (2012, 1)]
    );
    assert_eq!(months("date:2012-2012").unwrap().len(), 5);
}

#[test]
fn test_inverted_range() {
    assert_eq!(
        months("!date:2011,11-2012,4").unwrap(),
        vec![(2011, 10), (2012, 5)]
    );
}

#[test]
fn test_numeric_month_comparison() {
    // Month 10 must not sort before month 2
    assert_eq!(
        months("date:2011,2-2011,11").unwrap(),
        vec![(2011, 10), (2011, 11)]
    );
}

#[test]
fn test_range_bound_ending_with_null_member() {
    let error = months("date:2012,__null__-").unwrap_err();
    assert!(matches!(error, QueryError::Argument(msg) if msg.contains("null member")));
}

#[test]
fn test_summary_of_range() {
    init_logging();
    let (cube, store) = (cube(), store());
    let browser = Browser::new(&cube, &store, &Settings::default()).unwrap();
    let request = AggregateRequest::new("date:2011,12-2012,2".parse().unwrap());
    let result = browser.aggregate(&request).unwrap();
    let summary = result.summary.unwrap();
    assert_eq!(summary["amount_sum"], Value::from(3));
}
