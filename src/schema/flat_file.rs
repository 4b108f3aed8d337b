//! Plain text files, one row per line
//!
//! `#flat.file('path')` yields `LineNumber` (1-based) and `Line`.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;

use crate::error::{Error, ErrorCode, Result};
use crate::schema::chunked::spawn_reader;
use crate::schema::{text_param, RowSource, Schema, SchemaTable, SourceContext};
use crate::types::{ColumnType, Value};

#[derive(Debug, Clone, Default)]
pub struct FlatFileSchema;

impl FlatFileSchema {
    pub fn new() -> Self {
        FlatFileSchema
    }
}

fn path_param(method: &str, params: &[Value]) -> Result<PathBuf> {
    if !method.eq_ignore_ascii_case("file") {
        return Err(Error::with_message(
            ErrorCode::NotFound,
            format!("schema '#flat' has no table '{}'", method),
        ));
    }
    Ok(PathBuf::from(text_param(method, params, 0)?))
}

impl Schema for FlatFileSchema {
    fn name(&self) -> &str {
        "flat"
    }

    fn table(&self, method: &str, params: &[Value]) -> Result<SchemaTable> {
        path_param(method, params)?;
        Ok(SchemaTable::new(vec![
            ("LineNumber", ColumnType::Integer),
            ("Line", ColumnType::Text),
        ]))
    }

    fn row_source(&self, method: &str, params: &[Value], ctx: &SourceContext) -> Result<RowSource> {
        let path = path_param(method, params)?;
        let table = self.table(method, params)?;
        let file = File::open(&path).map_err(|e| {
            Error::with_message(
                ErrorCode::Source,
                format!("cannot open '{}': {}", path.display(), e),
            )
        })?;
        let label = format!("flat:{}", path.display());

        spawn_reader(&label, table.ordinals(), ctx, move |sink| {
            for (n, line) in BufReader::new(file).lines().enumerate() {
                let line = line?;
                let values = vec![
                    Value::Integer(n as i64 + 1),
                    Value::Text(line.trim_end_matches('\r').to_string()),
                ];
                if !sink.push(values) {
                    break;
                }
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_lines_are_numbered() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "first\r\nsecond\n\nfourth").unwrap();
        file.flush().unwrap();

        let params = vec![Value::from(file.path().to_string_lossy().as_ref())];
        let rows: Vec<_> = FlatFileSchema
            .row_source("file", &params, &SourceContext::default())
            .unwrap()
            .map(|r| {
                let r = r.unwrap();
                (r.get("LineNumber").unwrap(), r.get("Line").unwrap())
            })
            .collect();

        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0], (Value::Integer(1), Value::from("first")));
        assert_eq!(rows[2], (Value::Integer(3), Value::from("")));
        assert_eq!(rows[3], (Value::Integer(4), Value::from("fourth")));
    }

    #[test]
    fn test_unknown_method() {
        let err = FlatFileSchema.table("lines", &[Value::from("x")]).unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
    }
}
