//! Columnar Table Layout
//!
//! A typed table of named columns and its compact binary encoding. The
//! layout is little-endian and self-describing: a fixed header, one block
//! per column (name, type tag, null bitmap, packed values) and a trailing
//! CRC32C over everything before it.

use crc32c::crc32c;

use crate::error::{CacheError, Result};

// == Format Constants ==
/// Magic number for columnar blobs: "FCT1"
pub const TABLE_MAGIC: u32 = 0x4643_5431;

/// Current columnar format version
pub const TABLE_VERSION: u16 = 1;

const TAG_STR: u8 = 0;
const TAG_INT: u8 = 1;
const TAG_FLOAT: u8 = 2;
const TAG_BOOL: u8 = 3;

// == Column ==
/// A single typed column; `None` cells are nulls.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    Str(Vec<Option<String>>),
    Int(Vec<Option<i64>>),
    Float(Vec<Option<f64>>),
    Bool(Vec<Option<bool>>),
}

impl Column {
    /// Number of cells in the column.
    pub fn len(&self) -> usize {
        match self {
            Column::Str(cells) => cells.len(),
            Column::Int(cells) => cells.len(),
            Column::Float(cells) => cells.len(),
            Column::Bool(cells) => cells.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn type_tag(&self) -> u8 {
        match self {
            Column::Str(_) => TAG_STR,
            Column::Int(_) => TAG_INT,
            Column::Float(_) => TAG_FLOAT,
            Column::Bool(_) => TAG_BOOL,
        }
    }
}

// == Table ==
/// An ordered collection of named, equal-length columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<(String, Column)>,
}

impl Table {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a column; every column must match the existing row count.
    pub fn push_column(&mut self, name: &str, column: Column) -> Result<()> {
        if let Some((_, first)) = self.columns.first() {
            if first.len() != column.len() {
                return Err(CacheError::EncodeFailure(format!(
                    "column '{}' has {} rows, table has {}",
                    name,
                    column.len(),
                    first.len()
                )));
            }
        }
        self.columns.push((name.to_string(), column));
        Ok(())
    }

    /// Number of rows (cells per column).
    pub fn row_count(&self) -> usize {
        self.columns.first().map_or(0, |(_, c)| c.len())
    }

    /// Number of columns.
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Looks up a column by name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, c)| c)
    }

    // == Encode ==
    /// Encodes the table into the binary columnar layout.
    pub fn encode(&self) -> Vec<u8> {
        let rows = self.row_count();
        let mut buf = Vec::with_capacity(64);
        buf.extend_from_slice(&TABLE_MAGIC.to_le_bytes());
        buf.extend_from_slice(&TABLE_VERSION.to_le_bytes());
        buf.extend_from_slice(&(self.columns.len() as u16).to_le_bytes());
        buf.extend_from_slice(&(rows as u64).to_le_bytes());

        for (name, column) in &self.columns {
            buf.extend_from_slice(&(name.len() as u16).to_le_bytes());
            buf.extend_from_slice(name.as_bytes());
            buf.push(column.type_tag());
            encode_column(&mut buf, column, rows);
        }

        let crc = crc32c(&buf);
        buf.extend_from_slice(&crc.to_le_bytes());
        buf
    }

    // == Decode ==
    /// Decodes a table from the binary columnar layout.
    pub fn decode(bytes: &[u8]) -> Result<Table> {
        if bytes.len() < 20 {
            return Err(decode_err("blob shorter than header"));
        }

        // Trailing CRC covers everything before it
        let body = &bytes[..bytes.len() - 4];
        let stored_crc = u32::from_le_bytes(bytes[bytes.len() - 4..].try_into().unwrap());
        let actual_crc = crc32c(body);
        if stored_crc != actual_crc {
            return Err(decode_err(&format!(
                "checksum mismatch: stored {stored_crc:08x}, computed {actual_crc:08x}"
            )));
        }

        let mut cursor = Cursor::new(body);
        let magic = cursor.read_u32()?;
        if magic != TABLE_MAGIC {
            return Err(decode_err(&format!(
                "bad magic: expected {TABLE_MAGIC:08x}, got {magic:08x}"
            )));
        }
        let version = cursor.read_u16()?;
        if version > TABLE_VERSION {
            return Err(decode_err(&format!("unsupported format version {version}")));
        }
        let column_count = cursor.read_u16()? as usize;
        let rows = cursor.read_u64()? as usize;

        let mut table = Table::new();
        for _ in 0..column_count {
            let name_len = cursor.read_u16()? as usize;
            let name = String::from_utf8(cursor.read_bytes(name_len)?.to_vec())
                .map_err(|_| decode_err("column name is not UTF-8"))?;
            let tag = cursor.read_u8()?;
            let column = decode_column(&mut cursor, tag, rows)?;
            table.push_column(&name, column)?;
        }

        if !cursor.at_end() {
            return Err(decode_err("trailing bytes after last column"));
        }
        Ok(table)
    }
}

fn decode_err(reason: &str) -> CacheError {
    CacheError::DecodeFailure(format!("columnar blob: {reason}"))
}

// == Column Encoding ==
/// Writes the null bitmap (bit set = cell present) then the packed values.
fn encode_column(buf: &mut Vec<u8>, column: &Column, rows: usize) {
    let mut bitmap = vec![0u8; (rows + 7) / 8];
    let present = |i: usize, is_some: bool, bitmap: &mut [u8]| {
        if is_some {
            bitmap[i / 8] |= 1 << (i % 8);
        }
    };

    match column {
        Column::Str(cells) => {
            for (i, cell) in cells.iter().enumerate() {
                present(i, cell.is_some(), &mut bitmap);
            }
            buf.extend_from_slice(&bitmap);
            for cell in cells.iter().flatten() {
                buf.extend_from_slice(&(cell.len() as u32).to_le_bytes());
                buf.extend_from_slice(cell.as_bytes());
            }
        }
        Column::Int(cells) => {
            for (i, cell) in cells.iter().enumerate() {
                present(i, cell.is_some(), &mut bitmap);
            }
            buf.extend_from_slice(&bitmap);
            for cell in cells.iter().flatten() {
                buf.extend_from_slice(&cell.to_le_bytes());
            }
        }
        Column::Float(cells) => {
            for (i, cell) in cells.iter().enumerate() {
                present(i, cell.is_some(), &mut bitmap);
            }
            buf.extend_from_slice(&bitmap);
            for cell in cells.iter().flatten() {
                buf.extend_from_slice(&cell.to_le_bytes());
            }
        }
        Column::Bool(cells) => {
            for (i, cell) in cells.iter().enumerate() {
                present(i, cell.is_some(), &mut bitmap);
            }
            buf.extend_from_slice(&bitmap);
            for cell in cells.iter().flatten() {
                buf.push(u8::from(*cell));
            }
        }
    }
}

fn decode_column(cursor: &mut Cursor<'_>, tag: u8, rows: usize) -> Result<Column> {
    let bitmap = cursor.read_bytes((rows + 7) / 8)?.to_vec();
    let is_present = |i: usize| bitmap[i / 8] & (1 << (i % 8)) != 0;

    match tag {
        TAG_STR => {
            let mut cells = Vec::with_capacity(rows);
            for i in 0..rows {
                if is_present(i) {
                    let len = cursor.read_u32()? as usize;
                    let text = String::from_utf8(cursor.read_bytes(len)?.to_vec())
                        .map_err(|_| decode_err("string cell is not UTF-8"))?;
                    cells.push(Some(text));
                } else {
                    cells.push(None);
                }
            }
            Ok(Column::Str(cells))
        }
        TAG_INT => {
            let mut cells = Vec::with_capacity(rows);
            for i in 0..rows {
                if is_present(i) {
                    cells.push(Some(cursor.read_i64()?));
                } else {
                    cells.push(None);
                }
            }
            Ok(Column::Int(cells))
        }
        TAG_FLOAT => {
            let mut cells = Vec::with_capacity(rows);
            for i in 0..rows {
                if is_present(i) {
                    cells.push(Some(cursor.read_f64()?));
                } else {
                    cells.push(None);
                }
            }
            Ok(Column::Float(cells))
        }
        TAG_BOOL => {
            let mut cells = Vec::with_capacity(rows);
            for i in 0..rows {
                if is_present(i) {
                    cells.push(Some(cursor.read_u8()? != 0));
                } else {
                    cells.push(None);
                }
            }
            Ok(Column::Bool(cells))
        }
        other => Err(decode_err(&format!("unknown column type tag {other}"))),
    }
}

// == Byte Cursor ==
/// Bounds-checked reader over the blob body.
struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.bytes.len())
            .ok_or_else(|| decode_err("truncated blob"))?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_bytes(1)?[0])
    }

    fn read_u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.read_bytes(2)?.try_into().unwrap()))
    }

    fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.read_bytes(4)?.try_into().unwrap()))
    }

    fn read_u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.read_bytes(8)?.try_into().unwrap()))
    }

    fn read_i64(&mut self) -> Result<i64> {
        Ok(i64::from_le_bytes(self.read_bytes(8)?.try_into().unwrap()))
    }

    fn read_f64(&mut self) -> Result<f64> {
        Ok(f64::from_le_bytes(self.read_bytes(8)?.try_into().unwrap()))
    }

    fn at_end(&self) -> bool {
        self.pos == self.bytes.len()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    fn sample_table() -> Table {
        let mut table = Table::new();
        table
            .push_column(
                "name",
                Column::Str(vec![
                    Some("alpha".to_string()),
                    None,
                    Some("gamma".to_string()),
                ]),
            )
            .unwrap();
        table
            .push_column("count", Column::Int(vec![Some(1), Some(2), None]))
            .unwrap();
        table
            .push_column(
                "ratio",
                Column::Float(vec![Some(0.25), Some(-1.5), Some(3.75)]),
            )
            .unwrap();
        table
            .push_column("flag", Column::Bool(vec![Some(true), None, Some(false)]))
            .unwrap();
        table
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let table = sample_table();
        let bytes = table.encode();
        let decoded = Table::decode(&bytes).unwrap();
        assert_eq!(decoded, table);
    }

    #[test]
    fn test_empty_table_roundtrip() {
        let table = Table::new();
        let bytes = table.encode();
        let decoded = Table::decode(&bytes).unwrap();
        assert_eq!(decoded.column_count(), 0);
        assert_eq!(decoded.row_count(), 0);
    }

    #[test]
    fn test_mismatched_column_length_rejected() {
        let mut table = Table::new();
        table
            .push_column("a", Column::Int(vec![Some(1), Some(2)]))
            .unwrap();
        let result = table.push_column("b", Column::Int(vec![Some(1)]));
        assert!(matches!(result, Err(CacheError::EncodeFailure(_))));
    }

    #[test]
    fn test_decode_bad_magic() {
        let mut bytes = sample_table().encode();
        bytes[0] ^= 0xFF;
        // Fix the checksum so only the magic is wrong
        let body_len = bytes.len() - 4;
        let crc = crc32c(&bytes[..body_len]).to_le_bytes();
        bytes[body_len..].copy_from_slice(&crc);

        let result = Table::decode(&bytes);
        assert!(matches!(result, Err(CacheError::DecodeFailure(_))));
    }

    #[test]
    fn test_decode_corrupt_body() {
        let mut bytes = sample_table().encode();
        let mid = bytes.len() / 2;
        bytes[mid] ^= 0xFF;
        let result = Table::decode(&bytes);
        assert!(matches!(result, Err(CacheError::DecodeFailure(_))));
    }

    #[test]
    fn test_decode_truncated() {
        let bytes = sample_table().encode();
        let result = Table::decode(&bytes[..10]);
        assert!(matches!(result, Err(CacheError::DecodeFailure(_))));
    }

    #[test]
    fn test_nulls_survive_roundtrip() {
        let mut table = Table::new();
        table
            .push_column("only_nulls", Column::Str(vec![None, None, None]))
            .unwrap();
        let decoded = Table::decode(&table.encode()).unwrap();
        assert_eq!(
            decoded.column("only_nulls"),
            Some(&Column::Str(vec![None, None, None]))
        );
    }
}
