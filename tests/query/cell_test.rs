//! Cell navigation against a cube with a multi-hierarchy date dimension.

use starql::model::Cube;
use starql::query::{path, Cell, Cut};
use starql::QueryError;

fn cube() -> Cube {
    Cube::from_json(
        r#"{
            "name": "sales",
            "dimensions": [
                {
                    "name": "date",
                    "levels": ["year", "month", "day"],
                    "hierarchies": [
                        {"name": "ymd", "levels": ["year", "month", "day"]},
                        {"name": "ym", "levels": ["year", "month"]}
                    ]
                },
                {"name": "city", "levels": ["country", "name"]}
            ],
            "measures": [{"name": "amount"}]
        }"#,
    )
    .unwrap()
}

#[test]
fn test_rollup_one_level_and_to_level() {
    let cube = cube();
    let cell: Cell = "date:2012,3,14|city:sk,BA".parse().unwrap();

    let up = cell.rollup(&cube, &[("date", None)]).unwrap();
    assert_eq!(up.cut_for_dimension("date"), Some(&Cut::point("date", path(&["2012", "3"]))));

    let to_year = cell.rollup(&cube, &[("date", Some("year")), ("city", None)]).unwrap();
    assert_eq!(to_year, "date:2012|city:sk".parse::<Cell>().unwrap());
}

#[test]
fn test_rollup_past_first_level_removes_cut() {
    let cube = cube();
    let cell: Cell = "date:2012|city:sk".parse().unwrap();
    let rolled = cell.rollup_dim(&cube, "date", None, None).unwrap();
    assert_eq!(rolled.to_str(), "city:sk");
}

#[test]
fn test_rollup_rejects_range_cut() {
    let cube = cube();
    let cell: Cell = "date:2010-2012".parse().unwrap();
    assert!(matches!(
        cell.rollup(&cube, &[("date", None)]),
        Err(QueryError::Argument(_))
    ));
}

#[test]
fn test_rollup_to_deeper_level_fails() {
    let cube = cube();
    let cell: Cell = "date:2012".parse().unwrap();
    assert!(matches!(
        cell.rollup(&cube, &[("date", Some("day"))]),
        Err(QueryError::Hierarchy(_))
    ));
}

#[test]
fn test_is_base_per_hierarchy() {
    let cube = cube();
    let cell: Cell = "date@ym:2012,3".parse().unwrap();
    assert!(cell.is_base(&cube, "date", Some("ym")).unwrap());
    assert!(!cell.is_base(&cube, "date", Some("ymd")).unwrap());
    assert!(!cell.is_base(&cube, "city", None).unwrap());
}

#[test]
fn test_contains_level_for_point_and_set_cuts() {
    let cube = cube();
    let cell: Cell = "date:2012,3|city:sk;cz".parse().unwrap();
    assert!(cell.contains_level(&cube, "date", "month", None).unwrap());
    assert!(!cell.contains_level(&cube, "date", "day", None).unwrap());
    assert!(cell.contains_level(&cube, "city", "country", None).unwrap());
    assert!(!cell.contains_level(&cube, "city", "name", None).unwrap());

    let ranged: Cell = "city:sk-sl".parse().unwrap();
    assert!(!ranged.contains_level(&cube, "city", "country", None).unwrap());
}

#[test]
fn test_deepest_levels_and_key_attributes() {
    let cube = cube();
    let cell: Cell = "date:2012,3|city:sk;cz,BA".parse().unwrap();

    let levels = cell.deepest_levels(&cube).unwrap();
    let names: Vec<(&str, &str)> = levels
        .iter()
        .map(|(dim, _, level)| (dim.as_str(), level.name.as_str()))
        .collect();
    assert_eq!(names, vec![("date", "month"), ("city", "name")]);

    let keys: Vec<&str> = cell
        .collect_key_attributes(&cube)
        .unwrap()
        .iter()
        .map(|a| a.reference.as_str())
        .collect();
    assert_eq!(keys, vec!["date.year", "date.month", "city.country", "city.name"]);
}

#[test]
fn test_unknown_dimension() {
    let cube = cube();
    let cell: Cell = "product:tea".parse().unwrap();
    assert!(matches!(
        cell.collect_key_attributes(&cube),
        Err(QueryError::NotFound { kind: "dimension", .. })
    ));
}

#[test]
fn test_drilldown_and_multi_slice() {
    let cell = Cell::default()
        .drilldown("date", "2012", None)
        .multi_slice(vec![
            Cut::point("city", path(&["sk"])),
            Cut::point("date", path(&["2013"])),
        ]);
    assert_eq!(cell.to_str(), "date:2013|city:sk");
    assert_eq!(cell.drilldown("city", "BA", None).to_str(), "date:2013|city:sk,BA");
}

#[test]
fn test_equality_ignores_order_but_counts_repeats() {
    let a = Cut::point("date", path(&["2012"]));
    let b = Cut::point("city", path(&["sk"]));

    assert_eq!(Cell::new(vec![a.clone(), b.clone()]), Cell::new(vec![b.clone(), a.clone()]));
    assert_ne!(
        Cell::new(vec![a.clone(), a.clone(), b.clone()]),
        Cell::new(vec![a.clone(), b.clone(), b.clone()])
    );
    assert_eq!(
        Cell::new(vec![a.clone(), b.clone(), a.clone()]),
        Cell::new(vec![a.clone(), a, b])
    );
}
