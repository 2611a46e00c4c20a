use std::{fs::File, io::{BufReader, Read}, path::Path};
use serde_json::Value;
use tracing::debug;
use crate::error::{FilterError, Result};

fn into_forest(root: Value) -> Result<Vec<Value>> {
    match root {
        Value::Array(rows) => Ok(rows),
        // a single row object is a forest of one
        Value::Object(_) => Ok(vec![root]),
        Value::Null => Err(FilterError::InvalidForest("null")),
        Value::Bool(_) => Err(FilterError::InvalidForest("a boolean")),
        Value::Number(_) => Err(FilterError::InvalidForest("a number")),
        Value::String(_) => Err(FilterError::InvalidForest("a string")),
    }
}

pub fn read_forest<R: Read>(reader: R) -> Result<Vec<Value>> {
    let root: Value = serde_json::from_reader(BufReader::new(reader))?;
    into_forest(root)
}

pub fn parse_forest(text: &str) -> Result<Vec<Value>> {
    into_forest(serde_json::from_str(text)?)
}

pub fn open_forest(path: &Path) -> Result<Vec<Value>> {
    let f = File::open(path)?;
    let rows = read_forest(f)?;
    debug!(path = %path.display(), roots = rows.len(), "loaded forest");
    Ok(rows)
}
