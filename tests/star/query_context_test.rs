//! Cell conditions and derived columns, executed on SQLite.

use serde_json::{json, Value};
use starql::config::SchemaSettings;
use starql::model::Cube;
use starql::query::Cell;
use starql::sql::{sum, Dialect, Query};
use starql::star::{hierarchies_for_cube, Mapper, QueryContext, StarSchema};
use starql::store::{SqliteStore, Store};
use starql::QueryError;

const REFERENCES: &[&str] = &["date.year", "date.month", "customer", "amount", "margin"];

fn store() -> SqliteStore {
    let store = SqliteStore::open_in_memory().unwrap();
    store
        .execute_batch(
            "CREATE TABLE dim_date (id INTEGER, year INTEGER, month INTEGER);
             INSERT INTO dim_date VALUES (1, 2012, 1), (2, 2012, 2), (3, 2013, 1);
             CREATE TABLE sales (id INTEGER, id_date INTEGER, customer TEXT, amount INTEGER, cost INTEGER);
             INSERT INTO sales VALUES
                (1, 1, 'ann', 10, 4),
                (2, 2, 'bob', 20, 5),
                (3, 3, 'ann', 40, 10),
                (4, 3, NULL, 5, 1);",
        )
        .unwrap();
    store
}

fn cube() -> Cube {
    Cube::from_json(
        r#"{
            "name": "sales",
            "dimensions": [
                {"name": "date", "levels": ["year", "month"]},
                {"name": "customer"}
            ],
            "measures": [
                {"name": "amount"},
                {"name": "cost"},
                {"name": "margin", "expression": "amount - cost"}
            ],
            "joins": [{"master": "sales.id_date", "detail": "dim_date.id"}]
        }"#,
    )
    .unwrap()
}

fn star(cube: &Cube, store: &SqliteStore) -> StarSchema {
    let naming = SchemaSettings {
        dimension_prefix: "dim_".into(),
        ..SchemaSettings::default()
    };
    let mapper = Mapper::new(cube, &naming);
    let catalog = store.catalog().unwrap();
    StarSchema::builder(&cube.name, &mapper.fact_name(), &catalog)
        .with_mappings(mapper.mappings())
        .with_joins(cube.joins.clone())
        .build()
        .unwrap()
}

/// Sum of `measure` over the records of `cell`.
fn total(context: &QueryContext<'_>, store: &SqliteStore, measure: &str, cell: &str) -> Value {
    let cell: Cell = cell.parse().unwrap();
    let mut query = Query::new()
        .select(vec![sum(context.column(measure).unwrap())])
        .from(context.star().clone());
    if let Some(condition) = context.condition_for_cell(&cell).unwrap() {
        query = query.filter(condition);
    }
    let rows = store.fetch(&query.to_sql(Dialect::Sqlite)).unwrap();
    rows.rows[0][0].clone()
}

#[test]
fn test_cell_conditions() {
    let (cube, store) = (cube(), store());
    let star = star(&cube, &store);
    let attributes = cube.collect_dependencies(REFERENCES).unwrap();
    let context = QueryContext::new(&star, &attributes, hierarchies_for_cube(&cube), false).unwrap();

    let cases = [
        ("", json!(75)),
        ("date:2012", json!(30)),
        ("date:2012,2", json!(20)),
        ("customer:ann;bob", json!(70)),
        ("!customer:ann", json!(20)),
        ("customer:__null__", json!(5)),
        ("date:2013|customer:ann", json!(40)),
    ];
    for (cell, expected) in cases {
        assert_eq!(total(&context, &store, "amount", cell), expected, "cell: {}", cell);
    }
}

#[test]
fn test_derived_measure_column() {
    let (cube, store) = (cube(), store());
    let star = star(&cube, &store);
    let attributes = cube.collect_dependencies(REFERENCES).unwrap();
    let context = QueryContext::new(&star, &attributes, hierarchies_for_cube(&cube), false).unwrap();

    let margin = context.column("margin").unwrap().to_sql(Dialect::Sqlite);
    assert!(margin.contains("\"sales\".\"amount\""));
    assert!(margin.contains("\"sales\".\"cost\""));
    assert_eq!(total(&context, &store, "margin", ""), json!(55));
    assert_eq!(total(&context, &store, "margin", "date:2013"), json!(34));
}

#[test]
fn test_condition_for_empty_cell() {
    let (cube, store) = (cube(), store());
    let star = star(&cube, &store);
    let attributes = cube.collect_dependencies(REFERENCES).unwrap();
    let context = QueryContext::new(&star, &attributes, hierarchies_for_cube(&cube), false).unwrap();
    assert!(context.condition_for_cell(&Cell::default()).unwrap().is_none());
}

#[test]
fn test_safe_labels_map_back_to_references() {
    let (cube, store) = (cube(), store());
    let star = star(&cube, &store);
    let attributes = cube.collect_dependencies(REFERENCES).unwrap();
    let context = QueryContext::new(&star, &attributes, hierarchies_for_cube(&cube), true).unwrap();

    let label = context.label("date.year").unwrap().to_string();
    assert!(label.starts_with('a'), "label: {}", label);
    assert_eq!(context.get_labels(&[label, "other".to_string()]), vec!["date.year", "other"]);

    let select = context.select_column("margin").unwrap();
    assert_eq!(select.alias.as_deref(), Some(context.label("margin").unwrap()));
}

#[test]
fn test_context_only_joins_required_tables() {
    let (cube, store) = (cube(), store());
    let star = star(&cube, &store);
    let attributes = cube.collect_dependencies(&["customer", "amount"]).unwrap();
    let context = QueryContext::new(&star, &attributes, hierarchies_for_cube(&cube), false).unwrap();

    let sql = Query::new()
        .select(vec![context.column("amount").unwrap()])
        .from(context.star().clone())
        .to_sql(Dialect::Sqlite);
    assert!(!sql.contains("dim_date"));

    // Date keys were not requested, so date cuts can not be compiled
    let cell: Cell = "date:2012".parse().unwrap();
    assert!(matches!(
        context.condition_for_cell(&cell),
        Err(QueryError::Internal(_))
    ));
}

#[test]
fn test_split_column_flags_records() {
    let (cube, store) = (cube(), store());
    let star = star(&cube, &store);
    let attributes = cube.collect_dependencies(REFERENCES).unwrap();
    let context = QueryContext::new(&star, &attributes, hierarchies_for_cube(&cube), false).unwrap();

    let split: Cell = "customer:ann".parse().unwrap();
    let sql = Query::new()
        .select(vec![context.column_for_split(&split).unwrap()])
        .from(context.star().clone())
        .to_sql(Dialect::Sqlite);
    let rows = store.fetch(&sql).unwrap();
    let flags: Vec<Value> = rows.rows.into_iter().map(|mut r| r.remove(0)).collect();
    assert_eq!(flags.iter().filter(|v| **v == json!(1)).count(), 2);
    assert_eq!(rows.columns, vec!["__within_split__"]);

    assert!(matches!(
        context.column_for_split(&Cell::default()),
        Err(QueryError::Argument(_))
    ));
}

#[test]
fn test_cut_on_unknown_dimension_or_hierarchy() {
    let (cube, store) = (cube(), store());
    let star = star(&cube, &store);
    let attributes = cube.collect_dependencies(REFERENCES).unwrap();
    let context = QueryContext::new(&star, &attributes, hierarchies_for_cube(&cube), false).unwrap();

    let error = context
        .condition_for_cell(&"product:shoes".parse().unwrap())
        .unwrap_err();
    assert!(matches!(&error, QueryError::NotFound { kind: "dimension", name } if name == "product"));
    assert!(error.is_client_error());

    let error = context
        .condition_for_cell(&"date@fiscal:2012".parse().unwrap())
        .unwrap_err();
    assert!(matches!(error, QueryError::NotFound { kind: "hierarchy", .. }));
}
