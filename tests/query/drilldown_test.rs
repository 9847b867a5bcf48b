//! Drilldown resolution: explicit and implicit levels, hierarchies and
//! cardinality guards.

use starql::model::Cube;
use starql::query::{Cell, Drilldown, DrilldownRequest, SPLIT_DIMENSION_NAME};
use starql::QueryError;

fn cube() -> Cube {
    Cube::from_json(
        r#"{
            "name": "sales",
            "dimensions": [
                {
                    "name": "date",
                    "levels": [
                        "year",
                        {
                            "name": "month",
                            "attributes": ["month", "month_name"],
                            "order_attribute": "month",
                            "order": "desc"
                        },
                        "day"
                    ],
                    "hierarchies": [
                        {"name": "ymd", "levels": ["year", "month", "day"]},
                        {"name": "ym", "levels": ["year", "month"]}
                    ]
                },
                {
                    "name": "customer",
                    "levels": [{"name": "name", "cardinality": "high"}]
                },
                {"name": "flag"}
            ],
            "measures": [{"name": "amount"}]
        }"#,
    )
    .unwrap()
}

#[test]
fn test_explicit_level_includes_parents() {
    let cube = cube();
    let drilldown = Drilldown::from_strings(&cube, &["date:month"], &Cell::default()).unwrap();
    let item = drilldown.drilldown_for_dimension("date").unwrap();
    assert_eq!(item.keys, vec!["date.year", "date.month"]);
    assert!(item.is_default_hierarchy);
    assert_eq!(drilldown.to_string(), "date:month");

    let attributes: Vec<&str> = drilldown
        .all_attributes()
        .iter()
        .map(|a| a.reference.as_str())
        .collect();
    assert_eq!(attributes, vec!["date.year", "date.month", "date.month_name"]);
}

#[test]
fn test_implicit_level_follows_point_cut() {
    let cube = cube();
    let cell: Cell = "date:2012".parse().unwrap();
    let drilldown = Drilldown::from_strings(&cube, &["date"], &cell).unwrap();
    assert_eq!(drilldown.items_as_strings(), vec!["date:month"]);

    let drilldown = Drilldown::from_strings(&cube, &["date"], &Cell::default()).unwrap();
    assert_eq!(drilldown.items_as_strings(), vec!["date:year"]);

    // An inverted cut does not pin its last level
    let inverted: Cell = "!date:2012".parse().unwrap();
    let drilldown = Drilldown::from_strings(&cube, &["date"], &inverted).unwrap();
    assert_eq!(drilldown.items_as_strings(), vec!["date:year"]);
}

#[test]
fn test_drilling_past_last_level_fails() {
    let cube = cube();
    let cell: Cell = "date@ym:2012,3".parse().unwrap();
    let result = Drilldown::new(&cube, &[DrilldownRequest::new("date").with_hierarchy("ym")], &cell);
    assert!(matches!(result, Err(QueryError::Hierarchy(_))));
}

#[test]
fn test_cut_and_drilldown_hierarchy_mismatch() {
    let cube = cube();
    let cell: Cell = "date@ym:2012".parse().unwrap();
    let result = Drilldown::from_strings(&cube, &["date@ymd"], &cell);
    assert!(matches!(result, Err(QueryError::Hierarchy(_))));

    // An explicit level needs no cut
    let drilldown = Drilldown::from_strings(&cube, &["date@ymd:day"], &cell).unwrap();
    assert_eq!(drilldown.items_as_strings(), vec!["date:day"]);
}

#[test]
fn test_non_default_hierarchy_in_strings_and_levels() {
    let cube = cube();
    let drilldown = Drilldown::from_strings(&cube, &["date@ym:month", "flag"], &Cell::default()).unwrap();
    assert_eq!(drilldown.items_as_strings(), vec!["date@ym:month", "flag:flag"]);

    let levels = drilldown.result_levels(true);
    assert_eq!(levels["date@ym"], vec!["year", "month"]);
    assert_eq!(levels["flag"], vec!["flag"]);
    assert!(levels.contains_key(SPLIT_DIMENSION_NAME));
    assert!(!drilldown.result_levels(false).contains_key(SPLIT_DIMENSION_NAME));
}

#[test]
fn test_duplicate_dimension_keeps_deeper_item() {
    let cube = cube();
    let drilldown =
        Drilldown::from_strings(&cube, &["date:year", "date:day", "date:month"], &Cell::default())
            .unwrap();
    assert_eq!(drilldown.len(), 1);
    assert_eq!(drilldown.items_as_strings(), vec!["date:day"]);
}

#[test]
fn test_natural_order_uses_level_order() {
    let cube = cube();
    let drilldown = Drilldown::from_strings(&cube, &["date:month", "flag"], &Cell::default()).unwrap();
    let order = drilldown.natural_order();
    assert_eq!(
        order,
        vec![
            ("date.year".to_string(), "asc".to_string()),
            ("date.month".to_string(), "desc".to_string()),
            ("flag".to_string(), "asc".to_string()),
        ]
    );
}

#[test]
fn test_high_cardinality_levels() {
    let cube = cube();
    let drilldown = Drilldown::from_strings(&cube, &["customer", "date"], &Cell::default()).unwrap();
    let levels = drilldown.high_cardinality_levels(&cube, &Cell::default()).unwrap();
    let names: Vec<&str> = levels.iter().map(|l| l.name.as_str()).collect();
    assert_eq!(names, vec!["name"]);

    let pinned: Cell = "customer:ann;bob".parse().unwrap();
    assert!(drilldown.high_cardinality_levels(&cube, &pinned).unwrap().is_empty());
}

#[test]
fn test_invalid_requests() {
    let cube = cube();
    assert!(matches!(DrilldownRequest::parse(""), Err(QueryError::Argument(_))));
    assert!(matches!(
        DrilldownRequest::parse("date:month:day"),
        Err(QueryError::Argument(_))
    ));
    assert!(matches!(
        Drilldown::from_strings(&cube, &["date:week"], &Cell::default()),
        Err(QueryError::Hierarchy(_))
    ));
    assert!(matches!(
        Drilldown::from_strings(&cube, &["product"], &Cell::default()),
        Err(QueryError::NotFound { .. })
    ));
}
