//! Delimited text files
//!
//! `#csv.file('path', 'separator', hasHeader, skipLines)` reads a delimited
//! file. Every column is Text. With a header the columns take the header's
//! names, otherwise they are called `Column1..N`. Fields may be wrapped in
//! double quotes; a doubled quote inside a quoted field is a literal quote.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use crate::error::{Error, ErrorCode, Result};
use crate::schema::chunked::spawn_reader;
use crate::schema::{bool_param, int_param, text_param, RowSource, Schema, SchemaTable, SourceContext};
use crate::types::{ColumnType, Value};

const METHOD: &str = "file";

/// Schema exposing delimited files
#[derive(Debug, Clone, Default)]
pub struct CsvSchema;

impl CsvSchema {
    pub fn new() -> Self {
        CsvSchema
    }
}

#[derive(Debug, Clone)]
struct CsvOptions {
    path: PathBuf,
    separator: char,
    has_header: bool,
    skip_lines: usize,
}

impl CsvOptions {
    fn from_params(method: &str, params: &[Value]) -> Result<Self> {
        if !method.eq_ignore_ascii_case(METHOD) {
            return Err(Error::with_message(
                ErrorCode::NotFound,
                format!("schema '#csv' has no table '{}'", method),
            ));
        }
        let path = PathBuf::from(text_param(method, params, 0)?);
        let separator = text_param(method, params, 1)?.chars().next().ok_or_else(|| {
            Error::with_message(ErrorCode::TypeMismatch, "separator must not be empty")
        })?;
        let has_header = bool_param(method, params, 2)?;
        let skip_lines = int_param(method, params, 3)?.max(0) as usize;
        Ok(CsvOptions {
            path,
            separator,
            has_header,
            skip_lines,
        })
    }
}

fn open(path: &Path) -> Result<BufReader<File>> {
    let file = File::open(path).map_err(|e| {
        Error::with_message(
            ErrorCode::Source,
            format!("cannot open '{}': {}", path.display(), e),
        )
    })?;
    Ok(BufReader::new(file))
}

/// Split one line into fields, honouring double-quoted fields
pub fn split_line(line: &str, separator: char) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            if c == '"' {
                if chars.peek() == Some(&'"') {
                    field.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            } else {
                field.push(c);
            }
        } else if c == '"' && field.is_empty() {
            in_quotes = true;
        } else if c == separator {
            fields.push(std::mem::take(&mut field));
        } else {
            field.push(c);
        }
    }
    fields.push(field);
    fields
}

fn header_columns(options: &CsvOptions) -> Result<Vec<String>> {
    let mut lines = open(&options.path)?.lines().skip(options.skip_lines);
    let first = match lines.next() {
        Some(line) => line?,
        None => {
            return Err(Error::with_message(
                ErrorCode::Source,
                format!("'{}' has no rows to read columns from", options.path.display()),
            ))
        }
    };
    let fields = split_line(first.trim_end_matches('\r'), options.separator);

    if !options.has_header {
        return Ok((1..=fields.len()).map(|i| format!("Column{}", i)).collect());
    }

    let mut names: Vec<String> = Vec::with_capacity(fields.len());
    for (i, field) in fields.into_iter().enumerate() {
        let name = field.trim();
        let name = if name.is_empty() {
            format!("Column{}", i + 1)
        } else {
            name.to_string()
        };
        if names.contains(&name) {
            return Err(Error::with_message(
                ErrorCode::Duplicate,
                format!("'{}' repeats header column '{}'", options.path.display(), name),
            ));
        }
        names.push(name);
    }
    Ok(names)
}

impl Schema for CsvSchema {
    fn name(&self) -> &str {
        "csv"
    }

    fn table(&self, method: &str, params: &[Value]) -> Result<SchemaTable> {
        let options = CsvOptions::from_params(method, params)?;
        let names = header_columns(&options)?;
        Ok(SchemaTable::new(
            names.into_iter().map(|n| (n, ColumnType::Text)).collect(),
        ))
    }

    fn row_source(&self, method: &str, params: &[Value], ctx: &SourceContext) -> Result<RowSource> {
        let options = CsvOptions::from_params(method, params)?;
        let table = self.table(method, params)?;
        let width = table.columns.len();
        let reader = open(&options.path)?;
        let label = format!("csv:{}", options.path.display());

        spawn_reader(&label, table.ordinals(), ctx, move |sink| {
            let skip = options.skip_lines + usize::from(options.has_header);
            for (n, line) in reader.lines().enumerate().skip(skip) {
                let line = line?;
                let line = line.trim_end_matches('\r');
                if line.is_empty() {
                    continue;
                }
                let mut fields = split_line(line, options.separator);
                if fields.len() > width {
                    return Err(Error::with_message(
                        ErrorCode::Source,
                        format!(
                            "line {} of '{}' has {} fields, expected {}",
                            n + 1,
                            options.path.display(),
                            fields.len(),
                            width
                        ),
                    ));
                }
                fields.resize(width, String::new());
                if !sink.push(fields.into_iter().map(Value::Text).collect()) {
                    break;
                }
            }
            Ok(())
        })
    }
}
