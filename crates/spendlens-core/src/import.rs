//! JSON transaction loader
//!
//! Input is a single JSON array of transaction objects.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result, ValidationError};
use crate::models::RawTransaction;

/// Load transactions from a JSON file
pub fn load_transactions(path: &Path) -> Result<Vec<RawTransaction>> {
    if !path.exists() {
        return Err(Error::NotFound(format!(
            "Transaction file not found: {}",
            path.display()
        )));
    }
    let file = File::open(path)?;
    let transactions = parse_transactions(BufReader::new(file))?;
    debug!(path = %path.display(), count = transactions.len(), "Loaded transactions");
    Ok(transactions)
}

/// Parse a JSON array of transaction objects from any reader
pub fn parse_transactions<R: Read>(reader: R) -> Result<Vec<RawTransaction>> {
    let document: Value = serde_json::from_reader(reader)?;
    let Value::Array(items) = document else {
        return Err(Error::InvalidData(
            "Expected a JSON array of transactions".into(),
        ));
    };

    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| -> Result<RawTransaction> {
            if !item.is_object() {
                return Err(ValidationError::MalformedRecord {
                    index,
                    reason: "transaction must be a JSON object".to_string(),
                }
                .into());
            }
            serde_json::from_value(item).map_err(|e| {
                Error::from(ValidationError::MalformedRecord {
                    index,
                    reason: e.to_string(),
                })
            })
        })
        .collect()
}
