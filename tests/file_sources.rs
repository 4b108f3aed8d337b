//! Queries over the delimited-file and flat-file schemas

use std::io::Write;

use tabql::{execute, ErrorCode, SchemaRegistry, Value};

fn temp_file(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn test_csv_with_header() {
    let file = temp_file("Name,Age\nAnn,30\nBob,25\n\"Smith, Jo\",41\n");
    let query = format!(
        "select Name, ToInt(Age) as Age from #csv.file('{}', ',', true, 0) where ToInt(Age) > 26",
        file.path().display()
    );
    let table = execute(&query, &SchemaRegistry::with_file_schemas()).unwrap();
    assert_eq!(table.column_names(), vec!["Name", "Age"]);
    assert_eq!(table.rows()[0].values, vec![Value::from("Ann"), Value::Integer(30)]);
    assert_eq!(table.rows()[1].values, vec![Value::from("Smith, Jo"), Value::Integer(41)]);
    assert_eq!(table.len(), 2);
}

#[test]
fn test_csv_without_header_names_columns() {
    let file = temp_file("# comment\nx;1\ny;2\n");
    let query = format!(
        "select Column1 from #csv.file('{}', ';', false, 1) where Column2 = '2'",
        file.path().display()
    );
    let table = execute(&query, &SchemaRegistry::with_file_schemas()).unwrap();
    assert_eq!(table.len(), 1);
    assert_eq!(table.rows()[0].values, vec![Value::from("y")]);
}

#[test]
fn test_flat_file_lines() {
    let file = temp_file("alpha\nbeta\ngamma\n");
    let query = format!(
        "select LineNumber, Line from #flat.file('{}') where Line like 'b%'",
        file.path().display()
    );
    let table = execute(&query, &SchemaRegistry::with_file_schemas()).unwrap();
    assert_eq!(table.rows()[0].values, vec![Value::Integer(2), Value::from("beta")]);
    assert_eq!(table.len(), 1);
}

#[test]
fn test_chunked_reading_keeps_order() {
    let content: String = (1..=250).map(|n| format!("line {}\n", n)).collect();
    let file = temp_file(&content);
    let query = format!(
        "select LineNumber from #flat.file('{}') skip 200",
        file.path().display()
    );
    let engine = tabql::Engine::new(tabql::EngineConfig::default().with_chunk_size(16).with_queue_depth(2));
    let table = engine
        .execute(&query, &SchemaRegistry::with_file_schemas())
        .unwrap();
    assert_eq!(table.len(), 50);
    assert_eq!(table.rows()[0].values, vec![Value::Integer(201)]);
}

#[test]
fn test_desc_reads_only_the_header() {
    let file = temp_file("City,Country\nWarsaw,Poland\n");
    let query = format!("desc #csv.file('{}', ',', true, 0)", file.path().display());
    let table = execute(&query, &SchemaRegistry::with_file_schemas()).unwrap();
    assert_eq!(table.len(), 2);
    assert_eq!(table.rows()[0].values, vec![Value::from("City"), Value::from("Text")]);
    assert_eq!(table.rows()[1].values, vec![Value::from("Country"), Value::from("Text")]);
}

#[test]
fn test_missing_file_is_a_source_error() {
    let query = "select Line from #flat.file('/nonexistent/tabql/input.txt')";
    let err = execute(query, &SchemaRegistry::with_file_schemas()).unwrap_err();
    assert_eq!(err.code, ErrorCode::Source);
}
