//! Window calculators and the aggregation result that applies them.

use std::cell::Cell as Counter;
use std::rc::Rc;

use serde_json::{json, Value};
use starql::model::Cube;
use starql::query::{
    calculators_for_aggregates, AggregationResult, Cell, Drilldown, Record, WindowCalculator,
    WindowFunction,
};
use starql::QueryError;

fn record(value: Value) -> Record {
    value.as_object().cloned().unwrap()
}

fn cube() -> Cube {
    Cube::from_json(
        r#"{
            "name": "sales",
            "dimensions": [
                {
                    "name": "date",
                    "levels": [
                        "year",
                        {"name": "month", "info": {"aggregation_units": 3}}
                    ]
                },
                {"name": "store"}
            ],
            "measures": [{"name": "amount"}],
            "aggregates": [
                {"name": "amount_sum", "function": "sum", "measure": "amount"},
                {"name": "amount_sma", "function": "sma", "measure": "amount_sum"},
                {"name": "amount_wma", "function": "wma", "measure": "amount_sum", "window_size": 2}
            ]
        }"#,
    )
    .unwrap()
}

#[test]
fn test_simple_moving_average_over_stream() {
    let mut calculator = WindowCalculator::new(
        WindowFunction::SimpleMovingAverage,
        "amount_sma",
        "amount_sum",
        3,
        Vec::new(),
    )
    .unwrap();

    let averages: Vec<Value> = [1, 2, 3, 4, 5]
        .into_iter()
        .map(|v| {
            let mut record = record(json!({ "amount_sum": v }));
            calculator.calculate(&mut record);
            record["amount_sma"].clone()
        })
        .collect();
    assert_eq!(averages, vec![json!(1.0), json!(1.5), json!(2.0), json!(3.0), json!(4.0)]);
}

#[test]
fn test_windows_per_group() {
    let mut calculator = WindowCalculator::new(
        WindowFunction::SimpleMovingSum,
        "amount_sms",
        "amount_sum",
        2,
        vec!["store".to_string()],
    )
    .unwrap();

    let input = [("a", 1), ("b", 10), ("a", 2), ("b", 20), ("a", 3)];
    let sums: Vec<Value> = input
        .into_iter()
        .map(|(store, v)| {
            let mut record = record(json!({ "store": store, "amount_sum": v }));
            calculator.calculate(&mut record);
            record["amount_sms"].clone()
        })
        .collect();
    assert_eq!(
        sums,
        vec![json!(1.0), json!(10.0), json!(3.0), json!(30.0), json!(5.0)]
    );
}

#[test]
fn test_window_parameters_from_drilldown() {
    let cube = cube();
    let drilldown = Drilldown::from_strings(&cube, &["date:month", "store"], &Cell::default()).unwrap();
    let aggregates = cube.get_aggregates(&["amount_sma", "amount_wma"]).unwrap();

    let calculators = calculators_for_aggregates(&cube, &aggregates, &drilldown, true).unwrap();
    assert_eq!(calculators.len(), 2);

    // Month carries aggregation units, the store becomes the window key
    assert_eq!(calculators[0].target(), "amount_sma");
    assert_eq!(calculators[0].window_size(), 3);
    assert_eq!(calculators[0].window_key(), ["__within_split__", "store"]);

    // An explicit window size wins
    assert_eq!(calculators[1].window_size(), 2);
}

#[test]
fn test_unknown_window_function() {
    let mut cube = cube();
    cube.aggregates[1].function = Some("ema".to_string());
    let aggregates = cube.get_aggregates(&["amount_sma"]).unwrap();
    let result = calculators_for_aggregates(&cube, &aggregates, &Drilldown::default(), false);
    assert!(matches!(result, Err(QueryError::Argument(_))));
}

fn drilled_result(cube: &Cube) -> AggregationResult {
    let cell: Cell = "date:2012".parse().unwrap();
    let drilldown = Drilldown::from_strings(cube, &["date"], &cell).unwrap();
    let aggregates = cube.get_aggregates(&["amount_sma"]).unwrap();
    let calculators = calculators_for_aggregates(cube, &aggregates, &drilldown, false).unwrap();

    let mut result = AggregationResult::new(
        cell,
        vec!["amount_sum".into(), "amount_sma".into()],
        Some(drilldown),
        false,
    );
    result.set_summary(record(json!({ "amount_sum": 60 })), &calculators);
    result.set_cells(
        vec![
            record(json!({ "date.year": 2012, "date.month": 1, "amount_sum": 10 })),
            record(json!({ "date.year": 2012, "date.month": 2, "amount_sum": 20 })),
            record(json!({ "date.year": 2012, "date.month": 3, "amount_sum": 30 })),
        ],
        calculators,
    );
    result
}

#[test]
fn test_summary_does_not_share_windows() {
    let cube = cube();
    let result = drilled_result(&cube);
    assert_eq!(result.summary.as_ref().unwrap()["amount_sma"], json!(60.0));

    let averages: Vec<Value> = result.into_cells().map(|r| r["amount_sma"].clone()).collect();
    assert_eq!(averages, vec![json!(10.0), json!(15.0), json!(20.0)]);
}

#[test]
fn test_table_rows() {
    let cube = cube();
    let mut result = drilled_result(&cube);
    let rows = result.table_rows(&cube, "date", None).unwrap();

    assert_eq!(rows.len(), 3);
    assert_eq!(rows[1].key, json!(2));
    assert_eq!(rows[1].label, json!(2));
    assert_eq!(rows[1].path, vec![Some("2012".to_string()), Some("2".to_string())]);
    assert!(rows[1].is_base);
    assert_eq!(rows[2].record["amount_sma"], json!(20.0));

    assert!(matches!(
        result.table_rows(&cube, "date", Some(5)),
        Err(QueryError::Hierarchy(_))
    ));
}

#[test]
fn test_json_output() {
    let cube = cube();
    let mut result = drilled_result(&cube);
    result.total_cell_count = Some(3);

    let value: Value = serde_json::from_str(&result.to_json().unwrap()).unwrap();
    assert_eq!(value["total_cell_count"], 3);
    assert_eq!(value["cells"].as_array().unwrap().len(), 3);
    assert_eq!(value["levels"]["date"], json!(["year", "month"]));
    assert_eq!(value["attributes"], json!(["date.year", "date.month"]));
    assert_eq!(value["cell"][0]["type"], "point");
    assert_eq!(value["has_split"], false);
}

#[test]
fn test_cells_stream_from_one_shot_source() {
    let cube = cube();
    let cell: Cell = "date:2012".parse().unwrap();
    let drilldown = Drilldown::from_strings(&cube, &["date"], &cell).unwrap();
    let aggregates = cube.get_aggregates(&["amount_sma"]).unwrap();
    let calculators = calculators_for_aggregates(&cube, &aggregates, &drilldown, false).unwrap();

    let pulled = Rc::new(Counter::new(0));
    let source = {
        let pulled = Rc::clone(&pulled);
        let mut months = 1..=4;
        std::iter::from_fn(move || {
            pulled.set(pulled.get() + 1);
            months
                .next()
                .map(|m| record(json!({ "date.year": 2012, "date.month": m, "amount_sum": m * 10 })))
        })
    };
    let mut result = AggregationResult::new(cell, vec!["amount_sma".into()], Some(drilldown), false);
    result.set_cells(source, calculators);
    assert_eq!(pulled.get(), 0);

    let mut cells = result.into_cells();
    assert_eq!(cells.next().unwrap()["amount_sma"], json!(10.0));
    assert_eq!(pulled.get(), 1);
    assert_eq!(cells.next().unwrap()["amount_sma"], json!(15.0));
    assert_eq!(pulled.get(), 2);

    let rest: Vec<Value> = cells.map(|r| r["amount_sma"].clone()).collect();
    // Window of three months
    assert_eq!(rest, vec![json!(20.0), json!(30.0)]);
    assert_eq!(pulled.get(), 5);
}

#[test]
fn test_cached_cells_read_repeatedly() {
    let calculator = WindowCalculator::new(
        WindowFunction::SimpleMovingAverage,
        "amount_sma",
        "amount_sum",
        2,
        Vec::new(),
    )
    .unwrap();

    let pulled = Rc::new(Counter::new(0));
    let source = {
        let pulled = Rc::clone(&pulled);
        std::iter::from_fn(move || {
            let n = pulled.get();
            pulled.set(n + 1);
            (n < 2).then(|| record(json!({ "amount_sum": (n + 1) * 2 })))
        })
    };
    let mut result = AggregationResult::new(Cell::default(), vec!["amount_sma".into()], None, false);
    result.set_cells(source, vec![calculator]);

    let first: Vec<Value> = result.cached().iter().map(|r| r["amount_sma"].clone()).collect();
    let second: Vec<Value> = result.cached().iter().map(|r| r["amount_sma"].clone()).collect();
    assert_eq!(first, vec![json!(2.0), json!(3.0)]);
    assert_eq!(first, second);
    assert_eq!(pulled.get(), 3);
}
