//! Value Codec
//!
//! Converts documents to and from the compact columnar blob the cache uses
//! for its heavy payload path. A document is serialized to JSON text,
//! wrapped as a single-row, single-column table, and that table is encoded
//! in the binary columnar layout. Decoding reverses the steps exactly.

mod table;


pub use table::{Column, Table, TABLE_MAGIC, TABLE_VERSION};

use crate::document::Document;
use crate::error::{CacheError, Result};

/// Name of the single column carrying the serialized document.
pub const DATA_COLUMN: &str = "data";

// == Encode ==
/// Encodes a document as a columnar blob.
///
/// Non-finite floats are normalized to null by the JSON step; see
/// [`Document::to_json_value`].
pub fn encode_document(doc: &Document) -> Result<Vec<u8>> {
    let json = doc.to_json_string()?;
    let mut table = Table::new();
    table.push_column(DATA_COLUMN, Column::Str(vec![Some(json)]))?;
    Ok(table.encode())
}

// == Decode ==
/// Decodes a columnar blob back into the document it was encoded from.
pub fn decode_document(bytes: &[u8]) -> Result<Document> {
    let table = Table::decode(bytes)?;

    let column = table.column(DATA_COLUMN).ok_or_else(|| {
        CacheError::DecodeFailure(format!("columnar blob has no '{DATA_COLUMN}' column"))
    })?;
    let cells = match column {
        Column::Str(cells) => cells,
        _ => {
            return Err(CacheError::DecodeFailure(format!(
                "'{DATA_COLUMN}' column is not a string column"
            )))
        }
    };
    if cells.len() != 1 {
        return Err(CacheError::DecodeFailure(format!(
            "expected a single row, found {}",
            cells.len()
        )));
    }
    let json = cells[0]
        .as_ref()
        .ok_or_else(|| CacheError::DecodeFailure("document cell is null".to_string()))?;

    Document::from_json_str(json)
}
