//! Aggregation statements rendered for every supported dialect.

use sqlparser::dialect::{
    DuckDbDialect, MsSqlDialect, MySqlDialect, PostgreSqlDialect, SQLiteDialect,
};
use sqlparser::parser::Parser;
use starql::config::Settings;
use starql::model::Cube;
use starql::sql::Dialect;
use starql::star::{AggregateRequest, Browser};
use starql::store::SqliteStore;
use starql::QueryError;

const DIALECTS: [Dialect; 5] = [
    Dialect::DuckDb,
    Dialect::Postgres,
    Dialect::MySql,
    Dialect::TSql,
    Dialect::Sqlite,
];

fn store() -> SqliteStore {
    let store = SqliteStore::open_in_memory().unwrap();
    store
        .execute_batch(
            "CREATE TABLE sales (id INTEGER, id_city INTEGER, year INTEGER, month INTEGER, amount INTEGER);
             CREATE TABLE dim_city (id INTEGER, name TEXT);",
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
                {"name": "city", "levels": [{"name": "name"}]}
            ],
            "measures": [{"name": "amount"}],
            "aggregates": [
                {"name": "amount_sum", "function": "sum", "measure": "amount"},
                {"name": "record_count", "function": "count"}
            ],
            "mappings": {"date.year": "sales.year", "date.month": "sales.month"},
            "joins": [{"master": "sales.id_city", "detail": "dim_city.id", "method": "master"}]
        }"#,
    )
    .unwrap()
}

fn settings() -> Settings {
    let mut settings = Settings::default();
    settings.schema.dimension_prefix = "dim_".into();
    settings
}

fn request() -> AggregateRequest {
    AggregateRequest::new("date:2012".parse().unwrap())
        .parse_drilldown(&["date", "city"])
        .unwrap()
        .with_split("city:Bratislava".parse().unwrap())
        .with_page(2, 10)
}

fn parse(sql: &str, dialect: Dialect) {
    let parser: Box<dyn sqlparser::dialect::Dialect> = match dialect {
        Dialect::DuckDb => Box::new(DuckDbDialect {}),
        Dialect::Postgres => Box::new(PostgreSqlDialect {}),
        Dialect::MySql => Box::new(MySqlDialect {}),
        Dialect::TSql => Box::new(MsSqlDialect {}),
        Dialect::Sqlite => Box::new(SQLiteDialect {}),
    };
    if let Err(error) = Parser::parse_sql(&*parser, sql) {
        panic!("{} statement does not parse: {}\n{}", dialect, error, sql);
    }
}

#[test]
fn test_statements_parse_in_every_dialect() {
    let (cube, store) = (cube(), store());
    let browser = Browser::new(&cube, &store, &settings()).unwrap();

    for dialect in DIALECTS {
        let statements = browser.explain_in(&request(), dialect).unwrap();
        assert_eq!(statements.dialect, dialect);

        let summary = statements.summary.unwrap();
        let cells = statements.cells.unwrap();
        let count = statements.cell_count.unwrap();
        for sql in [&summary, &cells, &count] {
            parse(sql, dialect);
        }
        assert!(!summary.contains("GROUP BY"), "{}", summary);
        assert!(cells.contains("GROUP BY"), "{}", cells);
        assert!(cells.contains("LEFT OUTER JOIN"), "{}", cells);
    }
}

#[test]
fn test_dialect_specific_rendering() {
    let (cube, store) = (cube(), store());
    let browser = Browser::new(&cube, &store, &settings()).unwrap();
    let cells = |dialect| browser.explain_in(&request(), dialect).unwrap().cells.unwrap();

    let postgres = cells(Dialect::Postgres);
    assert!(postgres.contains("LIMIT 10 OFFSET 20"), "{}", postgres);
    assert!(postgres.contains("\"dim_city\".\"name\""), "{}", postgres);

    let tsql = cells(Dialect::TSql);
    assert!(tsql.contains("OFFSET 20 ROWS FETCH NEXT 10 ROWS ONLY"), "{}", tsql);
    assert!(tsql.contains("[dim_city].[name]"), "{}", tsql);

    let mysql = cells(Dialect::MySql);
    assert!(mysql.contains("`dim_city`.`name`"), "{}", mysql);
}

#[test]
fn test_explain_uses_configured_dialect() {
    let (cube, store) = (cube(), store());
    let mut settings = settings();
    settings.query.dialect = Dialect::TSql;
    let browser = Browser::new(&cube, &store, &settings).unwrap();

    let statements = browser.explain(&request()).unwrap();
    assert_eq!(statements.dialect, Dialect::TSql);
    assert!(statements.cells.unwrap().contains("FETCH NEXT 10 ROWS ONLY"));
}

#[test]
fn test_summary_only_request() {
    let (cube, store) = (cube(), store());
    let browser = Browser::new(&cube, &store, &settings()).unwrap();
    let statements = browser
        .explain_in(&AggregateRequest::new("date:2012".parse().unwrap()), Dialect::Postgres)
        .unwrap();
    assert!(statements.summary.is_some());
    assert!(statements.cells.is_none());
    assert!(statements.cell_count.is_none());
}

#[test]
fn test_page_offset_overflow() {
    let (cube, store) = (cube(), store());
    let browser = Browser::new(&cube, &store, &settings()).unwrap();
    let request = AggregateRequest::new("date:2012".parse().unwrap())
        .parse_drilldown(&["date"])
        .unwrap()
        .with_page(u64::MAX, 2);
    let error = browser.explain_in(&request, Dialect::Postgres).unwrap_err();
    assert!(matches!(error, QueryError::Argument(msg) if msg.contains("out of range")));
}
