//! CSV and XLSX export of a filtered record set.
//!
//! Both encoders refuse an empty set with [`ExportError::EmptyResult`], so no
//! file is produced and the caller shows the notice instead.

use chrono::NaiveDate;
use serde_json::{Map, Number, Value};
use std::fs;
use std::io::{Cursor, Write as _};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::ExportError;
use crate::records::{AttendanceRecord, ID_KEY};

pub const CSV_MIME: &str = "text/csv;charset=utf-8";
pub const XLSX_MIME: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
pub const SHEET_NAME: &str = "Dados";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Xlsx,
}

impl ExportFormat {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "csv" => Some(Self::Csv),
            "xlsx" | "excel" => Some(Self::Xlsx),
            _ => None,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Xlsx => "xlsx",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Csv => CSV_MIME,
            Self::Xlsx => XLSX_MIME,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportFile {
    pub file_name: String,
    pub mime_type: &'static str,
    pub bytes: Vec<u8>,
}

/// `report_<YYYY-MM-DD>.<ext>`
pub fn file_name(format: ExportFormat, date: NaiveDate) -> String {
    format!("report_{}.{}", date.format("%Y-%m-%d"), format.extension())
}

pub fn encode(
    format: ExportFormat,
    records: &[&AttendanceRecord],
    date: NaiveDate,
) -> Result<ExportFile, ExportError> {
    match format {
        ExportFormat::Csv => encode_csv(records, date),
        ExportFormat::Xlsx => encode_xlsx(records, date),
    }
}

// ---------------------------------------------------------------------------
// CSV
// ---------------------------------------------------------------------------

fn csv_cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => format!("\"{}\"", s.replace('"', "\"\"")),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(other) => format!("\"{}\"", other.to_string().replace('"', "\"\"")),
    }
}

/// Header = keys of the first record except `id`, in stored order. Strings
/// are quoted with inner quotes doubled; numbers and booleans are literal.
pub fn encode_csv(records: &[&AttendanceRecord], date: NaiveDate) -> Result<ExportFile, ExportError> {
    let Some(first) = records.first() else {
        return Err(ExportError::EmptyResult);
    };
    let headers: Vec<String> = first
        .to_row()
        .keys()
        .filter(|k| k.as_str() != ID_KEY)
        .cloned()
        .collect();

    let mut out = headers.join(",");
    out.push('\n');
    for record in records {
        let row = record.to_row();
        let line: Vec<String> = headers.iter().map(|h| csv_cell(row.get(h))).collect();
        out.push_str(&line.join(","));
        out.push('\n');
    }

    info!(rows = records.len(), "Encoded CSV export");
    Ok(ExportFile {
        file_name: file_name(ExportFormat::Csv, date),
        mime_type: CSV_MIME,
        bytes: out.into_bytes(),
    })
}

/// Split CSV text into raw cells, remembering which cells were quoted.
fn split_csv(text: &str) -> Result<Vec<Vec<(String, bool)>>, ExportError> {
    let mut rows = Vec::new();
    let mut row: Vec<(String, bool)> = Vec::new();
    let mut cell = String::new();
    let mut quoted = false;
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    cell.push('"');
                }
                '"' => in_quotes = false,
                _ => cell.push(c),
            }
            continue;
        }
        match c {
            '"' if cell.is_empty() && !quoted => {
                in_quotes = true;
                quoted = true;
            }
            ',' => row.push((std::mem::take(&mut cell), std::mem::take(&mut quoted))),
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' => {
                row.push((std::mem::take(&mut cell), std::mem::take(&mut quoted)));
                rows.push(std::mem::take(&mut row));
            }
            _ => cell.push(c),
        }
    }
    if in_quotes {
        return Err(ExportError::encode("csv", "unterminated quoted cell"));
    }
    if !cell.is_empty() || quoted || !row.is_empty() {
        row.push((cell, quoted));
        rows.push(row);
    }
    Ok(rows)
}

fn bare_value(raw: &str) -> Option<Value> {
    match raw {
        "" => None,
        "true" => Some(Value::Bool(true)),
        "false" => Some(Value::Bool(false)),
        _ => {
            if let Ok(i) = raw.parse::<i64>() {
                return Some(Value::from(i));
            }
            match raw.parse::<f64>().ok().and_then(Number::from_f64) {
                Some(n) => Some(Value::Number(n)),
                None => Some(Value::String(raw.to_string())),
            }
        }
    }
}

/// Read back a CSV produced by [`encode_csv`]. Quoted cells become strings,
/// bare cells numbers or booleans, and empty bare cells are left out.
pub fn decode_csv(text: &str) -> Result<Vec<Map<String, Value>>, ExportError> {
    let mut rows = split_csv(text)?.into_iter();
    let Some(header) = rows.next() else {
        return Ok(Vec::new());
    };
    let header: Vec<String> = header.into_iter().map(|(name, _)| name).collect();

    let mut out = Vec::new();
    for (line, cells) in rows.enumerate() {
        if cells.len() != header.len() {
            return Err(ExportError::encode(
                "csv",
                format!(
                    "row {} has {} cells, expected {}",
                    line + 2,
                    cells.len(),
                    header.len()
                ),
            ));
        }
        let mut record = Map::new();
        for (name, (raw, quoted)) in header.iter().zip(cells) {
            let value = if quoted {
                Some(Value::String(raw))
            } else {
                bare_value(&raw)
            };
            if let Some(value) = value {
                record.insert(name.clone(), value);
            }
        }
        out.push(record);
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// XLSX
// ---------------------------------------------------------------------------

const CONTENT_TYPES_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/></Types>"#;

const ROOT_RELS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#;

const WORKBOOK_RELS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/></Relationships>"#;

fn workbook_xml() -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets><sheet name="{SHEET_NAME}" sheetId="1" r:id="rId1"/></sheets></workbook>"#
    )
}

/// Escape XML text and drop control characters XML 1.0 cannot carry.
fn xml_escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\t' | '\n' | '\r' => out.push(c),
            c if (c as u32) < 0x20 => {}
            c => out.push(c),
        }
    }
    out
}

/// Spreadsheet column name for a zero-based index (0 -> A, 26 -> AA).
fn column_name(mut index: usize) -> String {
    let mut name = Vec::new();
    loop {
        name.push(b'A' + (index % 26) as u8);
        if index < 26 {
            break;
        }
        index = index / 26 - 1;
    }
    name.reverse();
    String::from_utf8(name).unwrap_or_default()
}

fn xlsx_cell(reference: &str, value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Number(n) => Some(format!(r#"<c r="{reference}"><v>{n}</v></c>"#)),
        Value::Bool(b) => Some(format!(
            r#"<c r="{reference}" t="b"><v>{}</v></c>"#,
            u8::from(*b)
        )),
        Value::String(s) => Some(inline_string(reference, s)),
        other => Some(inline_string(reference, &other.to_string())),
    }
}

fn inline_string(reference: &str, text: &str) -> String {
    format!(
        r#"<c r="{reference}" t="inlineStr"><is><t xml:space="preserve">{}</t></is></c>"#,
        xml_escape(text)
    )
}

fn sheet_xml(rows: &[Map<String, Value>]) -> String {
    let mut headers: Vec<&str> = Vec::new();
    for row in rows {
        for key in row.keys() {
            if !headers.contains(&key.as_str()) {
                headers.push(key);
            }
        }
    }

    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>"#,
    );
    xml.push_str(r#"<row r="1">"#);
    for (col, header) in headers.iter().enumerate() {
        xml.push_str(&inline_string(&format!("{}1", column_name(col)), header));
    }
    xml.push_str("</row>");

    for (i, row) in rows.iter().enumerate() {
        let line = i + 2;
        xml.push_str(&format!(r#"<row r="{line}">"#));
        for (col, header) in headers.iter().enumerate() {
            if let Some(cell) = row
                .get(*header)
                .and_then(|v| xlsx_cell(&format!("{}{line}", column_name(col)), v))
            {
                xml.push_str(&cell);
            }
        }
        xml.push_str("</row>");
    }
    xml.push_str("</sheetData></worksheet>");
    xml
}

/// One sheet named `Dados`; header = union of record keys in first-seen
/// order, `id` included.
pub fn encode_xlsx(records: &[&AttendanceRecord], date: NaiveDate) -> Result<ExportFile, ExportError> {
    if records.is_empty() {
        return Err(ExportError::EmptyResult);
    }
    let rows: Vec<Map<String, Value>> = records.iter().map(|r| r.to_row()).collect();

    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);

    let parts: [(&str, String); 5] = [
        ("[Content_Types].xml", CONTENT_TYPES_XML.to_string()),
        ("_rels/.rels", ROOT_RELS_XML.to_string()),
        ("xl/workbook.xml", workbook_xml()),
        ("xl/_rels/workbook.xml.rels", WORKBOOK_RELS_XML.to_string()),
        ("xl/worksheets/sheet1.xml", sheet_xml(&rows)),
    ];
    for (name, body) in parts {
        zip.start_file(name, options)
            .map_err(|e| ExportError::encode("xlsx", e))?;
        zip.write_all(body.as_bytes())
            .map_err(|e| ExportError::encode("xlsx", e))?;
    }
    let bytes = zip
        .finish()
        .map_err(|e| ExportError::encode("xlsx", e))?
        .into_inner();

    info!(rows = records.len(), "Encoded XLSX export");
    Ok(ExportFile {
        file_name: file_name(ExportFormat::Xlsx, date),
        mime_type: XLSX_MIME,
        bytes,
    })
}

/// Write an export into `dir` (created if needed) and return its path.
pub fn write_to_dir(file: &ExportFile, dir: &Path) -> Result<PathBuf, ExportError> {
    fs::create_dir_all(dir)?;
    let path = dir.join(&file.file_name);
    fs::write(&path, &file.bytes)?;
    info!(path = %path.display(), bytes = file.bytes.len(), "Export written");
    Ok(path)
}
