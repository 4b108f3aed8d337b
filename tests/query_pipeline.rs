//! End-to-end queries over an in-memory schema

use tabql::{execute, ColumnType, ErrorCategory, ErrorCode, MemorySchema, SchemaRegistry, Table, Value};

fn registry() -> SchemaRegistry {
    let entities = vec![
        ("Warsaw", "Poland", 1700, 10.5),
        ("Gdansk", "Poland", 470, 3.0),
        ("Berlin", "Germany", 3600, 20.0),
        ("Munich", "Germany", 1500, 12.0),
        ("Bonn", "Germany", 300, 1.5),
    ];
    let schema = MemorySchema::new("test")
        .with_table(
            "entities",
            vec![
                ("Name", ColumnType::Text),
                ("Country", ColumnType::Text),
                ("Population", ColumnType::Integer),
                ("Money", ColumnType::Real),
            ],
            entities
                .into_iter()
                .map(|(name, country, population, money)| {
                    vec![
                        Value::from(name),
                        Value::from(country),
                        Value::Integer(population),
                        Value::Real(money),
                    ]
                })
                .collect(),
        )
        .unwrap()
        .with_table(
            "countries",
            vec![("Country", ColumnType::Text), ("Continent", ColumnType::Text)],
            vec![
                vec![Value::from("Poland"), Value::from("Europe")],
                vec![Value::from("Germany"), Value::from("Europe")],
            ],
        )
        .unwrap();
    SchemaRegistry::new().with("test", schema)
}

fn run(query: &str) -> Table {
    execute(query, &registry()).unwrap_or_else(|e| panic!("query failed: {}: {}", query, e))
}

fn column(table: &Table, ordinal: usize) -> Vec<Value> {
    table.rows().iter().map(|r| r.values[ordinal].clone()).collect()
}

fn texts(values: &[&str]) -> Vec<Value> {
    values.iter().map(|&v| Value::from(v)).collect()
}

#[test]
fn test_filter_keeps_source_order() {
    let table = run("select Name from #test.entities() where Population > 1000");
    assert_eq!(table.column_names(), vec!["Name"]);
    assert_eq!(column(&table, 0), texts(&["Warsaw", "Berlin", "Munich"]));
}

#[test]
fn test_skip_and_take() {
    let table = run("select Name from #test.entities() skip 1 take 2");
    assert_eq!(column(&table, 0), texts(&["Gdansk", "Berlin"]));

    let table = run("select Name from #test.entities() where Population > 1000 skip 1");
    assert_eq!(column(&table, 0), texts(&["Berlin", "Munich"]));

    assert!(run("select Name from #test.entities() skip 10").is_empty());
    assert!(run("select Name from #test.entities() take 0").is_empty());
    assert_eq!(run("select Name from #test.entities() skip 3 take 10").len(), 2);
}

#[test]
fn test_aggregate_without_group_by_yields_one_row() {
    let table = run("select Sum(Population), Count(Name) from #test.entities()");
    assert_eq!(table.column_names(), vec!["Sum(Population)", "Count(Name)"]);
    assert_eq!(table.len(), 1);
    assert_eq!(table.rows()[0].values, vec![Value::Real(7570.0), Value::Integer(5)]);
}

#[test]
fn test_implicit_group_over_no_rows_is_empty() {
    let table = run("select Count(Name) from #test.entities() where Population > 100000");
    assert!(table.is_empty());
}

#[test]
fn test_group_by_in_first_seen_order() {
    let table = run(
        "select Country, Count(Name) as Cities, Sum(Population) as People \
         from #test.entities() group by Country",
    );
    assert_eq!(table.column_names(), vec!["Country", "Cities", "People"]);
    assert_eq!(
        table.rows()[0].values,
        vec![Value::from("Poland"), Value::Integer(2), Value::Real(2170.0)]
    );
    assert_eq!(
        table.rows()[1].values,
        vec![Value::from("Germany"), Value::Integer(3), Value::Real(5400.0)]
    );
}

#[test]
fn test_having_filters_groups() {
    let table = run(
        "select Country, Max(Money) from #test.entities() group by Country having Count(Name) > 2",
    );
    assert_eq!(table.len(), 1);
    assert_eq!(table.rows()[0].values, vec![Value::from("Germany"), Value::Real(20.0)]);
}

#[test]
fn test_join_on_condition() {
    let table = run(
        "select e.Name, c.Continent from #test.entities() e \
         join #test.countries() c on e.Country = c.Country where e.Population > 1000",
    );
    assert_eq!(table.column_names(), vec!["e.Name", "c.Continent"]);
    assert_eq!(column(&table, 0), texts(&["Warsaw", "Berlin", "Munich"]));
    assert_eq!(column(&table, 1), texts(&["Europe", "Europe", "Europe"]));
}

#[test]
fn test_cte_feeds_later_query() {
    let table = run(
        "with big as (select Name, Country from #test.entities() where Population > 1000) \
         select Country, Count(Name) as N from big group by Country",
    );
    assert_eq!(column(&table, 0), texts(&["Poland", "Germany"]));
    assert_eq!(column(&table, 1), vec![Value::Integer(1), Value::Integer(2)]);
}

#[test]
fn test_methods_like_and_concatenation() {
    let table = run(
        "select ToUpper(Name) as Upper, Name + ' (' + Country + ')' as Label \
         from #test.entities() where Name like 'b%'",
    );
    assert_eq!(column(&table, 0), texts(&["BERLIN", "BONN"]));
    assert_eq!(column(&table, 1), texts(&["Berlin (Germany)", "Bonn (Germany)"]));
}

#[test]
fn test_arithmetic_types() {
    let table = run("select Population * 2 as Double, Money / 2 as Half from #test.entities() take 1");
    assert_eq!(table.columns()[0].ty, ColumnType::Integer);
    assert_eq!(table.columns()[1].ty, ColumnType::Real);
    assert_eq!(table.rows()[0].values, vec![Value::Integer(3400), Value::Real(5.25)]);
}

#[test]
fn test_star_expands_columns() {
    let table = run("select * from #test.countries()");
    assert_eq!(table.column_names(), vec!["Country", "Continent"]);
    assert_eq!(table.len(), 2);
}

#[test]
fn test_multiple_statements_return_last() {
    let table = run(
        "select Name from #test.entities(); select Continent from #test.countries() take 1",
    );
    assert_eq!(table.column_names(), vec!["Continent"]);
    assert_eq!(table.len(), 1);
}

#[test]
fn test_undefined_method_fails_compilation() {
    let err = execute("select Frobnicate(Name) from #test.entities()", &registry()).unwrap_err();
    assert_eq!(err.code, ErrorCode::NotFound);
    assert_eq!(err.category(), ErrorCategory::Compile);
    assert!(err.message.contains("Frobnicate"));
}

#[test]
fn test_unknown_schema_and_column() {
    let err = execute("select Name from #nope.entities()", &registry()).unwrap_err();
    assert_eq!(err.code, ErrorCode::NotFound);

    let err = execute("select Mayor from #test.entities()", &registry()).unwrap_err();
    assert_eq!(err.code, ErrorCode::NotFound);
}

#[test]
fn test_runtime_arithmetic_error() {
    let err = execute("select Population / 0 from #test.entities()", &registry()).unwrap_err();
    assert_eq!(err.code, ErrorCode::Arithmetic);
    assert_eq!(err.category(), ErrorCategory::Execution);
}

#[test]
fn test_logical_operators_short_circuit() {
    let schema = MemorySchema::new("test")
        .with_table(
            "towns",
            vec![("Name", ColumnType::Text), ("Population", ColumnType::Integer)],
            vec![
                vec![Value::from("Ghost"), Value::Integer(0)],
                vec![Value::from("Town"), Value::Integer(50)],
            ],
        )
        .unwrap();
    let registry = SchemaRegistry::new().with("test", schema);

    let table = execute(
        "select Name from #test.towns() where Population <> 0 and 100 / Population > 1",
        &registry,
    )
    .unwrap();
    assert_eq!(column(&table, 0), texts(&["Town"]));

    let table = execute(
        "select Name from #test.towns() where Population = 0 or 100 / Population > 1",
        &registry,
    )
    .unwrap();
    assert_eq!(column(&table, 0), texts(&["Ghost", "Town"]));
}

#[test]
fn test_in_list_filters() {
    let table = run(
        "select Name from #test.entities() where Name in ('Bonn', 'Gdansk', 'Paris')",
    );
    assert_eq!(column(&table, 0), texts(&["Gdansk", "Bonn"]));

    let table = run("select Name from #test.entities() where Population not in (1700, 3600, 300)");
    assert_eq!(column(&table, 0), texts(&["Gdansk", "Munich"]));

    let err = execute("select Name from #test.entities() where Name in (1, 2)", &registry()).unwrap_err();
    assert_eq!(err.code, ErrorCode::TypeMismatch);
}

#[test]
fn test_desc_lists_source_columns() {
    let table = run("desc #test.entities()");
    assert_eq!(table.column_names(), vec!["Name", "Type"]);
    assert_eq!(column(&table, 0), texts(&["Name", "Country", "Population", "Money"]));
    assert_eq!(column(&table, 1), texts(&["Text", "Text", "Integer", "Real"]));
}
