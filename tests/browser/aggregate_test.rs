//! Browser aggregations over a two-year fact table on SQLite.

use serde_json::{json, Value};
use starql::config::Settings;
use starql::model::Cube;
use starql::query::{AggregationResult, Cell, DrilldownRequest};
use starql::star::{AggregateRequest, Browser};
use starql::store::SqliteStore;
use starql::QueryError;

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

const CUSTOMERS: [&str; 3] = ["ann", "bob", "cid"];

/// Eight months per year with amounts 1, 2, 4, ... 128.
fn store() -> SqliteStore {
    let mut sql = String::from(
        "CREATE TABLE sales (id INTEGER, year INTEGER, month INTEGER, customer TEXT, amount INTEGER);\n",
    );
    for (i, year) in [2010, 2011].into_iter().enumerate() {
        for month in 1..=8u32 {
            sql.push_str(&format!(
                "INSERT INTO sales VALUES ({}, {}, {}, '{}', {});\n",
                i * 8 + month as usize,
                year,
                month,
                CUSTOMERS[month as usize % 3],
                1u32 << (month - 1)
            ));
        }
    }
    let store = SqliteStore::open_in_memory().unwrap();
    store.execute_batch(&sql).unwrap();
    store
}

fn cube() -> Cube {
    Cube::from_json(
        r#"{
            "name": "sales",
            "dimensions": [
                {
                    "name": "date",
                    "levels": ["year", {"name": "month", "info": {"aggregation_units": 2}}]
                },
                {
                    "name": "customer",
                    "cardinality": "high",
                    "levels": [{"name": "name"}]
                }
            ],
            "measures": [{"name": "amount", "label": "Amount"}],
            "aggregates": [
                {"name": "amount_sum", "label": "Total", "function": "sum", "measure": "amount"},
                {"name": "record_count", "function": "count"},
                {"name": "amount_sma", "function": "sma", "measure": "amount_sum"}
            ],
            "mappings": {
                "date.year": "sales.year",
                "date.month": "sales.month",
                "customer.name": "sales.customer"
            }
        }"#,
    )
    .unwrap()
}

fn aggregate(request: AggregateRequest) -> Result<AggregationResult, QueryError> {
    init_logging();
    let (cube, store) = (cube(), store());
    let browser = Browser::new(&cube, &store, &Settings::default())?;
    browser.aggregate(&request)
}

fn column(result: &mut AggregationResult, name: &str) -> Vec<Value> {
    result.cached().iter().map(|r| r[name].clone()).collect()
}

#[test]
fn test_summary_of_whole_cube() {
    let result = aggregate(AggregateRequest::new(Cell::default())).unwrap();
    let summary = result.summary.as_ref().unwrap();
    assert_eq!(summary["amount_sum"], json!(510));
    assert_eq!(summary["record_count"], json!(16));
    assert_eq!(summary["amount_sma"], json!(510.0));
    assert!(result.drilldown.is_none());
    assert_eq!(result.total_cell_count, None);
    assert_eq!(result.labels["amount_sum"], "Total");
    assert_eq!(result.labels["amount_sma"], "Simple Moving Avg. of amount_sum");
}

#[test]
fn test_drilldown_by_year() {
    let request = AggregateRequest::new(Cell::default()).with_drilldown(DrilldownRequest::new("date"));
    let mut result = aggregate(request).unwrap();

    assert_eq!(result.summary.as_ref().unwrap()["amount_sum"], json!(510));
    assert_eq!(result.total_cell_count, Some(2));
    assert_eq!(column(&mut result, "date.year"), vec![json!(2010), json!(2011)]);
    assert_eq!(column(&mut result, "amount_sum"), vec![json!(255), json!(255)]);
    assert_eq!(result.levels["date"], vec!["year"]);
}

#[test]
fn test_months_with_moving_average() {
    let cell: Cell = "date:2010".parse().unwrap();
    let request = AggregateRequest::new(cell)
        .with_aggregates(&["amount_sum", "amount_sma"])
        .parse_drilldown(&["date"])
        .unwrap();
    let mut result = aggregate(request).unwrap();

    assert_eq!(result.total_cell_count, Some(8));
    assert_eq!(result.summary.as_ref().unwrap()["amount_sum"], json!(255));
    let months: Vec<Value> = (1..=8).map(|m| json!(m)).collect();
    assert_eq!(column(&mut result, "date.month"), months);
    assert_eq!(
        column(&mut result, "amount_sma"),
        [1.0, 1.5, 3.0, 6.0, 12.0, 24.0, 48.0, 96.0]
            .into_iter()
            .map(|v| json!(v))
            .collect::<Vec<_>>()
    );
}

#[test]
fn test_pagination() {
    let cell: Cell = "date:2010".parse().unwrap();
    let request = AggregateRequest::new(cell)
        .with_aggregates(&["amount_sum"])
        .parse_drilldown(&["date:month"])
        .unwrap()
        .with_page(1, 3);
    let mut result = aggregate(request).unwrap();

    assert_eq!(result.total_cell_count, Some(8));
    assert_eq!(column(&mut result, "amount_sum"), vec![json!(8), json!(16), json!(32)]);
}

#[test]
fn test_explicit_order() {
    let cell: Cell = "date:2010".parse().unwrap();
    let request = AggregateRequest::new(cell.clone())
        .parse_drilldown(&["date"])
        .unwrap()
        .with_order("amount_sum", Some("desc"));
    let mut result = aggregate(request).unwrap();
    assert_eq!(column(&mut result, "date.month")[0], json!(8));

    // Window aggregates order by the aggregate they are computed from
    let request = AggregateRequest::new(cell)
        .parse_drilldown(&["date"])
        .unwrap()
        .with_order("amount_sma", Some("desc"));
    let mut result = aggregate(request).unwrap();
    assert_eq!(column(&mut result, "date.month")[0], json!(8));
}

#[test]
fn test_split_segments_cells() {
    let request = AggregateRequest::new(Cell::default())
        .with_aggregates(&["amount_sum"])
        .parse_drilldown(&["date"])
        .unwrap()
        .with_split("date:2011".parse().unwrap());
    let mut result = aggregate(request).unwrap();

    assert!(result.has_split);
    assert_eq!(column(&mut result, "__within_split__"), vec![json!(0), json!(1)]);
    assert_eq!(column(&mut result, "date.year"), vec![json!(2010), json!(2011)]);
    assert!(result.levels.contains_key("__within_split__"));
}

#[test]
fn test_high_cardinality_drilldown_requires_paging_or_cut() {
    let request = AggregateRequest::new(Cell::default())
        .parse_drilldown(&["customer"])
        .unwrap();
    let error = aggregate(request.clone()).unwrap_err();
    assert!(matches!(&error, QueryError::Argument(msg) if msg.contains("high-cardinality")));

    let mut paged = aggregate(request.with_page(0, 2)).unwrap();
    assert_eq!(paged.total_cell_count, Some(3));
    assert_eq!(paged.cached().len(), 2);

    let pinned = AggregateRequest::new("customer:ann;bob".parse().unwrap())
        .parse_drilldown(&["customer"])
        .unwrap();
    let mut pinned = aggregate(pinned).unwrap();
    assert_eq!(column(&mut pinned, "customer.name"), vec![json!("ann"), json!("bob")]);
}

#[test]
fn test_request_errors() {
    let unknown = AggregateRequest::new(Cell::default()).with_aggregates(&["profit"]);
    assert!(matches!(
        aggregate(unknown),
        Err(QueryError::NotFound { kind: "aggregate", .. })
    ));

    let too_deep = AggregateRequest::new("date:2010,1".parse().unwrap())
        .parse_drilldown(&["date"])
        .unwrap();
    assert!(matches!(aggregate(too_deep), Err(QueryError::Hierarchy(_))));

    let only_windows = AggregateRequest::new(Cell::default()).with_aggregates(&["amount_sma"]);
    // The source aggregate is added, so a lone window aggregate is valid
    assert!(aggregate(only_windows).is_ok());
}

#[test]
fn test_result_json() {
    let request = AggregateRequest::new("date:2011".parse().unwrap())
        .with_aggregates(&["amount_sum"])
        .parse_drilldown(&["date"])
        .unwrap();
    let mut result = aggregate(request).unwrap();
    let value: Value = serde_json::from_str(&result.to_json().unwrap()).unwrap();

    assert_eq!(value["summary"]["amount_sum"], json!(255));
    assert_eq!(value["cells"].as_array().unwrap().len(), 8);
    assert_eq!(value["cell"][0]["path"], json!(["2011"]));
    assert_eq!(value["aggregates"], json!(["amount_sum"]));
}

#[test]
fn test_page_beyond_offset_range() {
    let request = AggregateRequest::new(Cell::default())
        .parse_drilldown(&["date"])
        .unwrap()
        .with_page(u64::MAX / 2, 3);
    let error = aggregate(request).unwrap_err();
    assert!(matches!(error, QueryError::Argument(msg) if msg.contains("out of range")));
}
