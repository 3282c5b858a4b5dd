//! Extracts the column names and row counts validation needs from a landing
//! object.
//!
//! Supported: `csv`, `text` (configurable delimiter), `json` (array of
//! objects or NDJSON), `ndjson`, `parquet` (footer only) and `excel` (first
//! worksheet of an xlsx workbook).

use std::io::Cursor;
use std::sync::Arc;

use bytes::Bytes;
use calamine::{Data, Reader, Xlsx};
use indexmap::IndexSet;
use parquet::file::reader::{FileReader, SerializedFileReader};
use serde_json::Value;
use snafu::prelude::*;
use tracing::debug;

use crate::error::{
    DelimitedSnafu, EmptyWorkbookSnafu, FetchSnafu, JsonShapeSnafu, JsonSnafu, ParquetSnafu,
    ReadError, UnsupportedFileTypeSnafu, WorkbookSnafu,
};
use crate::model::{FileEvent, FileType};
use sluice_core::StorageProvider;

/// Header and row summary of one file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableShape {
    /// Column names as written in the file, in file order.
    pub columns: Vec<String>,
    /// Data rows (the header is not a row).
    pub row_count: u64,
    /// Every value of every data row is null or blank.
    pub all_null: bool,
}

impl TableShape {
    /// No data rows, or only null ones.
    pub fn is_empty(&self) -> bool {
        self.row_count == 0 || self.all_null
    }
}

/// Parse `bytes` as `file_type`.
pub fn read_table(
    bytes: &Bytes,
    file_type: &FileType,
    text_delimiter: u8,
) -> Result<TableShape, ReadError> {
    match file_type {
        FileType::Csv => read_delimited(bytes, b','),
        FileType::Text => read_delimited(bytes, text_delimiter),
        FileType::Json => read_json(bytes),
        FileType::Ndjson => read_ndjson(bytes),
        FileType::Parquet => read_parquet(bytes),
        FileType::Excel => read_workbook(bytes),
        other => UnsupportedFileTypeSnafu {
            file_type: other.as_str(),
        }
        .fail(),
    }
}

fn read_delimited(bytes: &Bytes, delimiter: u8) -> Result<TableShape, ReadError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_reader(bytes.as_ref());

    let columns: Vec<String> = reader
        .headers()
        .context(DelimitedSnafu)?
        .iter()
        .map(str::to_string)
        .collect();

    let mut row_count = 0u64;
    let mut all_null = true;
    for record in reader.records() {
        let record = record.context(DelimitedSnafu)?;
        row_count += 1;
        if record.iter().any(|field| !field.trim().is_empty()) {
            all_null = false;
        }
    }

    Ok(TableShape {
        columns,
        row_count,
        all_null: row_count > 0 && all_null,
    })
}

/// Records are objects; columns are the union of their keys in first-seen order.
fn shape_of_records<'a>(
    records: impl IntoIterator<Item = &'a Value>,
) -> Result<TableShape, ReadError> {
    let mut columns: IndexSet<String> = IndexSet::new();
    let mut row_count = 0u64;
    let mut all_null = true;

    for record in records {
        let Value::Object(fields) = record else {
            return JsonShapeSnafu {
                message: format!("expected an object, found {}", kind(record)),
            }
            .fail();
        };
        row_count += 1;
        for (name, value) in fields {
            columns.insert(name.clone());
            if !value.is_null() {
                all_null = false;
            }
        }
    }

    Ok(TableShape {
        columns: columns.into_iter().collect(),
        row_count,
        all_null: row_count > 0 && all_null,
    })
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn read_json(bytes: &Bytes) -> Result<TableShape, ReadError> {
    let text = String::from_utf8_lossy(bytes);
    let trimmed = text.trim_start_matches('\u{feff}').trim_start();

    if trimmed.starts_with('[') {
        let document: Value = serde_json::from_str(trimmed).context(JsonSnafu)?;
        match &document {
            Value::Array(records) => shape_of_records(records),
            other => JsonShapeSnafu {
                message: format!("expected an array, found {}", kind(other)),
            }
            .fail(),
        }
    } else {
        read_ndjson(bytes)
    }
}

fn read_ndjson(bytes: &Bytes) -> Result<TableShape, ReadError> {
    let text = String::from_utf8_lossy(bytes);
    let records = text
        .trim_start_matches('\u{feff}')
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(serde_json::from_str::<Value>)
        .collect::<Result<Vec<_>, _>>()
        .context(JsonSnafu)?;
    shape_of_records(&records)
}

/// Top-level field names and row counts from the footer. A file is all-null
/// when every column chunk's statistics report only nulls.
fn read_parquet(bytes: &Bytes) -> Result<TableShape, ReadError> {
    let reader = SerializedFileReader::new(bytes.clone()).context(ParquetSnafu)?;
    let metadata = reader.metadata();

    let columns: Vec<String> = metadata
        .file_metadata()
        .schema_descr()
        .root_schema()
        .get_fields()
        .iter()
        .map(|field| field.name().to_string())
        .collect();

    let row_count = metadata.file_metadata().num_rows().max(0) as u64;

    let all_null = row_count > 0
        && metadata.row_groups().iter().all(|row_group| {
            let rows = row_group.num_rows().max(0) as u64;
            row_group.columns().iter().all(|column| {
                column
                    .statistics()
                    .and_then(|stats| stats.null_count_opt())
                    .is_some_and(|nulls| nulls == rows)
            })
        });

    Ok(TableShape {
        columns,
        row_count,
        all_null,
    })
}

fn is_blank(cell: &Data) -> bool {
    match cell {
        Data::Empty => true,
        Data::String(value) => value.trim().is_empty(),
        _ => false,
    }
}

/// First worksheet only: its first used row is the header, the rest are data.
fn read_workbook(bytes: &Bytes) -> Result<TableShape, ReadError> {
    let mut workbook: Xlsx<_> =
        Xlsx::new(Cursor::new(bytes.clone())).context(WorkbookSnafu)?;
    let range = workbook
        .worksheet_range_at(0)
        .context(EmptyWorkbookSnafu)?
        .context(WorkbookSnafu)?;

    let mut rows = range.rows();
    let columns: Vec<String> = match rows.next() {
        Some(header) => header
            .iter()
            .filter(|cell| !matches!(cell, Data::Empty))
            .map(ToString::to_string)
            .collect(),
        None => Vec::new(),
    };

    let mut row_count = 0u64;
    let mut all_null = true;
    for row in rows {
        row_count += 1;
        if !row.iter().all(is_blank) {
            all_null = false;
        }
    }

    Ok(TableShape {
        columns,
        row_count,
        all_null: row_count > 0 && all_null,
    })
}

/// Fetches landing objects and parses them into a [`TableShape`].
#[derive(Clone)]
pub struct TableReader {
    storage: Arc<StorageProvider>,
    text_delimiter: u8,
}

impl TableReader {
    pub fn new(storage: Arc<StorageProvider>, text_delimiter: u8) -> Self {
        Self {
            storage,
            text_delimiter,
        }
    }

    pub async fn read(&self, event: &FileEvent) -> Result<TableShape, ReadError> {
        // No reader exists; skip the download.
        if matches!(event.file_type, FileType::Other(_)) {
            return UnsupportedFileTypeSnafu {
                file_type: event.file_type.as_str(),
            }
            .fail();
        }

        let bytes = self.storage.get(&event.key).await.context(FetchSnafu {
            key: event.key.to_string(),
        })?;

        let shape = read_table(&bytes, &event.file_type, self.text_delimiter)?;
        debug!(
            file = %event.file_name,
            file_type = %event.file_type,
            size = bytes.len(),
            columns = shape.columns.len(),
            rows = shape.row_count,
            "Read file shape"
        );
        Ok(shape)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parquet::data_type::{ByteArray, ByteArrayType, Int32Type};
    use parquet::file::properties::WriterProperties;
    use parquet::file::writer::SerializedFileWriter;
    use parquet::schema::parser::parse_message_type;

    fn bytes(text: &str) -> Bytes {
        Bytes::from(text.to_string())
    }

    #[test]
    fn test_csv_header_and_rows() {
        let shape = read_table(&bytes("ID,Total,Extra\n1,2,3\n4,5,6\n"), &FileType::Csv, b'\t')
            .unwrap();
        assert_eq!(shape.columns, vec!["ID", "Total", "Extra"]);
        assert_eq!(shape.row_count, 2);
        assert!(!shape.is_empty());
    }

    #[test]
    fn test_csv_header_only_is_empty() {
        let shape = read_table(&bytes("id,total\n"), &FileType::Csv, b'\t').unwrap();
        assert_eq!(shape.columns, vec!["id", "total"]);
        assert_eq!(shape.row_count, 0);
        assert!(shape.is_empty());

        let shape = read_table(&bytes(""), &FileType::Csv, b'\t').unwrap();
        assert!(shape.columns.is_empty());
        assert!(shape.is_empty());
    }

    #[test]
    fn test_csv_blank_rows_are_all_null() {
        let shape = read_table(&bytes("id,total\n,\n , \n"), &FileType::Csv, b'\t').unwrap();
        assert_eq!(shape.row_count, 2);
        assert!(shape.all_null);
        assert!(shape.is_empty());
    }

    #[test]
    fn test_text_uses_configured_delimiter() {
        let tab = read_table(&bytes("id\tname\n1\ta\n"), &FileType::Text, b'\t').unwrap();
        assert_eq!(tab.columns, vec!["id", "name"]);

        let pipe = read_table(&bytes("id|name\n1|a\n"), &FileType::Text, b'|').unwrap();
        assert_eq!(pipe.columns, vec!["id", "name"]);
        assert_eq!(pipe.row_count, 1);
    }

    #[test]
    fn test_json_array_of_records() {
        let shape = read_table(
            &bytes(r#"[{"id": 1, "total": 2}, {"id": 3, "extra": null}]"#),
            &FileType::Json,
            b'\t',
        )
        .unwrap();
        assert_eq!(shape.columns, vec!["id", "total", "extra"]);
        assert_eq!(shape.row_count, 2);
        assert!(!shape.all_null);
    }

    #[test]
    fn test_json_falls_back_to_ndjson() {
        let shape = read_table(
            &bytes("{\"id\": null}\n\n{\"id\": null}\n"),
            &FileType::Json,
            b'\t',
        )
        .unwrap();
        assert_eq!(shape.row_count, 2);
        assert!(shape.all_null);
    }

    #[test]
    fn test_json_scalar_records_rejected() {
        let err = read_table(&bytes("[1, 2]"), &FileType::Json, b'\t').unwrap_err();
        assert!(matches!(err, ReadError::JsonShape { .. }));

        let err = read_table(&bytes("{\"id\": 1"), &FileType::Ndjson, b'\t').unwrap_err();
        assert!(matches!(err, ReadError::Json { .. }));
    }

    #[test]
    fn test_unknown_type_is_unsupported() {
        let err = read_table(&bytes("Obj"), &FileType::Other("avro".to_string()), b'\t')
            .unwrap_err();
        assert_eq!(err.to_string(), "Unsupported file type 'avro'");
    }

    fn workbook(rows: &[&[&str]]) -> Bytes {
        let mut workbook = rust_xlsxwriter::Workbook::new();
        let sheet = workbook.add_worksheet();
        for (r, row) in rows.iter().enumerate() {
            for (c, value) in row.iter().enumerate() {
                sheet.write_string(r as u32, c as u16, *value).unwrap();
            }
        }
        Bytes::from(workbook.save_to_buffer().unwrap())
    }

    #[test]
    fn test_excel_first_sheet_header_and_rows() {
        let shape = read_table(
            &workbook(&[&["ID", "Total"], &["1", "2"], &["3", "4"]]),
            &FileType::Excel,
            b'\t',
        )
        .unwrap();
        assert_eq!(shape.columns, vec!["ID", "Total"]);
        assert_eq!(shape.row_count, 2);
        assert!(!shape.is_empty());
    }

    #[test]
    fn test_excel_header_only_and_blank_rows_are_empty() {
        let header_only = read_table(&workbook(&[&["id", "total"]]), &FileType::Excel, b'\t')
            .unwrap();
        assert_eq!(header_only.columns, vec!["id", "total"]);
        assert_eq!(header_only.row_count, 0);
        assert!(header_only.is_empty());

        let blank = read_table(
            &workbook(&[&["id", "total"], &[" ", " "]]),
            &FileType::Excel,
            b'\t',
        )
        .unwrap();
        assert_eq!(blank.row_count, 1);
        assert!(blank.all_null);
    }

    #[test]
    fn test_excel_garbage_is_error() {
        let err = read_table(&bytes("not really a workbook"), &FileType::Excel, b'\t')
            .unwrap_err();
        assert!(matches!(err, ReadError::Workbook { .. }), "{err}");
    }

    fn parquet_file(names: &[Option<&str>]) -> Bytes {
        let schema = Arc::new(
            parse_message_type(
                "message orders { REQUIRED INT32 id; OPTIONAL BYTE_ARRAY Name (UTF8); }",
            )
            .unwrap(),
        );
        let mut buffer = Vec::new();
        let mut writer = SerializedFileWriter::new(
            &mut buffer,
            schema,
            Arc::new(WriterProperties::builder().build()),
        )
        .unwrap();

        let ids: Vec<i32> = (0..names.len() as i32).collect();
        let values: Vec<ByteArray> = names.iter().flatten().map(|n| ByteArray::from(*n)).collect();
        let levels: Vec<i16> = names.iter().map(|n| i16::from(n.is_some())).collect();

        let mut row_group = writer.next_row_group().unwrap();
        let mut column = row_group.next_column().unwrap().unwrap();
        column
            .typed::<Int32Type>()
            .write_batch(&ids, None, None)
            .unwrap();
        column.close().unwrap();
        let mut column = row_group.next_column().unwrap().unwrap();
        column
            .typed::<ByteArrayType>()
            .write_batch(&values, Some(&levels), None)
            .unwrap();
        column.close().unwrap();
        row_group.close().unwrap();
        writer.close().unwrap();

        Bytes::from(buffer)
    }

    #[test]
    fn test_parquet_footer() {
        let shape = read_table(
            &parquet_file(&[Some("a"), None, Some("c")]),
            &FileType::Parquet,
            b'\t',
        )
        .unwrap();
        assert_eq!(shape.columns, vec!["id", "Name"]);
        assert_eq!(shape.row_count, 3);
        assert!(!shape.all_null);
    }

    #[test]
    fn test_parquet_garbage_is_error() {
        let err = read_table(&bytes("not parquet"), &FileType::Parquet, b'\t').unwrap_err();
        assert!(matches!(err, ReadError::Parquet { .. }));
    }
}
