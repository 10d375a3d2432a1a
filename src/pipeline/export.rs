//! Export rendering: parsed fields → delimited table and flat text.
//!
//! Every document type has a fixed column schema (see [`crate::document`]);
//! the table export is one header row plus one data row in that exact
//! order, tab-delimited. Consumers paste these straight into spreadsheets,
//! so column order and header wording are part of the external contract.
//!
//! Unknown document types do not fail — they fall back to a two-column
//! `(Filename, Extraction Data)` generic table so a mistyped tag still
//! yields something downloadable.
//!
//! The renderer tolerates input that is still raw model text (it re-parses)
//! because a caller may ask for an export before, or instead of, storing a
//! parsed map.

use crate::document::{DocumentType, FieldSchema, GENERIC_HEADERS};
use crate::pipeline::parse::{parse_fields, FieldMap};
use chrono::{DateTime, Utc};
use std::borrow::Cow;

/// Sentinel written into table cells for fields the model did not produce.
pub const TABLE_SENTINEL: &str = "Not found";

/// Sentinel written into flat text for prompted-but-missing fields.
/// Columns the template never asks for stay blank instead.
pub const TEXT_SENTINEL: &str = "NA";

/// Content type of the `.csv` download.
pub const CSV_CONTENT_TYPE: &str = "text/csv";

/// Content type of the `.txt` download.
pub const TEXT_CONTENT_TYPE: &str = "text/plain";

/// The two rendered representations of one job's fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Export {
    /// Tab-delimited table: header row + one data row.
    pub table: String,
    /// Flat human-readable text block mirroring the same fields.
    pub text: String,
}

/// Renderer input: an already-parsed map or still-raw model text.
#[derive(Debug, Clone, Copy)]
pub enum FieldSource<'a> {
    Parsed(&'a FieldMap),
    Raw(&'a str),
}

/// Render both export representations for one document.
pub fn render(source: FieldSource<'_>, document_type: &str, filename: &str) -> Export {
    let raw: Option<&str> = match source {
        FieldSource::Raw(text) => Some(text),
        FieldSource::Parsed(_) => None,
    };
    let fields: Cow<'_, FieldMap> = match source {
        FieldSource::Parsed(map) => Cow::Borrowed(map),
        FieldSource::Raw(text) => Cow::Owned(parse_fields(text)),
    };

    match DocumentType::from_tag(document_type) {
        Some(doc) => Export {
            table: render_table(&fields, doc.schema(), filename),
            text: render_text(&fields, doc.schema(), filename),
        },
        None => Export {
            table: render_generic_table(&fields, raw, filename),
            text: render_generic_text(&fields, raw, filename),
        },
    }
}

/// One header row plus one data row, tab-delimited, schema order.
fn render_table(fields: &FieldMap, schema: &FieldSchema, filename: &str) -> String {
    let mut header: Vec<&str> = Vec::with_capacity(schema.len() + 1);
    header.push("Filename");
    header.extend(schema.labels());

    let mut row: Vec<String> = Vec::with_capacity(schema.len() + 1);
    row.push(cell(filename));
    for label in schema.labels() {
        row.push(cell(fields.get(label).unwrap_or(TABLE_SENTINEL)));
    }

    format!("{}\n{}\n", header.join("\t"), row.join("\t"))
}

/// Two-column fallback for unrecognised document types.
fn render_generic_table(fields: &FieldMap, raw: Option<&str>, filename: &str) -> String {
    let data = match raw {
        Some(text) => cell(text),
        None => cell(&join_pairs(fields)),
    };
    format!(
        "{}\n{}\t{}\n",
        GENERIC_HEADERS.join("\t"),
        cell(filename),
        data
    )
}

/// Flat text mirroring the table columns, one `Label: value` per line.
fn render_text(fields: &FieldMap, schema: &FieldSchema, filename: &str) -> String {
    let mut out = String::new();
    out.push_str(&format!("File: {filename}\n"));
    for field in schema.fields {
        let value = match fields.get(field.label) {
            Some(v) => v,
            None if field.prompted => TEXT_SENTINEL,
            None => "",
        };
        out.push_str(&format!("{}: {value}\n", field.label));
    }
    out.push_str(&"-".repeat(50));
    out.push('\n');
    out
}

fn render_generic_text(fields: &FieldMap, raw: Option<&str>, filename: &str) -> String {
    let body = match raw {
        Some(text) => text.to_string(),
        None => fields
            .iter()
            .map(|(k, v)| format!("{k}: {v}"))
            .collect::<Vec<_>>()
            .join("\n"),
    };
    format!("File: {filename}\n{body}\n{}\n", "-".repeat(50))
}

/// Sanitise a value for a delimited cell: tabs and line breaks would split
/// the row.
fn cell(value: &str) -> String {
    value
        .replace('\t', " ")
        .replace("\r\n", "; ")
        .replace(['\r', '\n'], "; ")
}

fn join_pairs(fields: &FieldMap) -> String {
    fields
        .iter()
        .map(|(k, v)| format!("{k}: {v}"))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Convert the tab-delimited table to comma-separated form for the `.csv`
/// download, quoting values that contain commas.
pub fn tsv_to_csv(tsv: &str) -> String {
    tsv.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            line.split('\t')
                .map(|value| {
                    if value.contains(',') {
                        format!("\"{value}\"")
                    } else {
                        value.to_string()
                    }
                })
                .collect::<Vec<_>>()
                .join(",")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Timestamped download filename: `{doc_type}_{file}_{YYYYmmdd_HHMMSS}.{ext}`.
pub fn download_name(
    document_type: &str,
    filename: &str,
    at: DateTime<Utc>,
    ext: &str,
) -> String {
    format!(
        "{document_type}_{filename}_{}.{ext}",
        at.format("%Y%m%d_%H%M%S")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn passport_fields() -> FieldMap {
        parse_fields(
            "Passport Country Code: USA\nPassport Number: 123456789\nFirst Name: Jane\nFamily Name: Doe\nGender: F",
        )
    }

    #[test]
    fn passport_table_has_eighteen_columns() {
        let export = render(
            FieldSource::Parsed(&passport_fields()),
            "passport",
            "scan.png",
        );
        let mut lines = export.table.lines();
        let header: Vec<&str> = lines.next().unwrap().split('\t').collect();
        let row: Vec<&str> = lines.next().unwrap().split('\t').collect();
        assert_eq!(header.len(), 18);
        assert_eq!(row.len(), 18);
        assert_eq!(header[0], "Filename");
        assert_eq!(header[1], "Passport Country Code");
        assert_eq!(header[17], "Authority");
        assert_eq!(row[0], "scan.png");
        assert_eq!(row[3], "123456789");
    }

    #[test]
    fn missing_fields_render_the_table_sentinel() {
        let export = render(
            FieldSource::Parsed(&passport_fields()),
            "passport",
            "scan.png",
        );
        let row = export.table.lines().nth(1).unwrap();
        // Authority was never parsed.
        assert!(row.ends_with(TABLE_SENTINEL));
    }

    #[test]
    fn check_table_has_twenty_eight_columns() {
        let fields = parse_fields("Bank Name: ABC Bank\nCheck Number: 1234");
        let export = render(FieldSource::Parsed(&fields), "check", "chk.jpg");
        let header: Vec<&str> = export.table.lines().next().unwrap().split('\t').collect();
        assert_eq!(header.len(), 28);
        assert_eq!(header[1], "Link to The file");
        assert_eq!(header[27], "Market");
    }

    #[test]
    fn unknown_type_falls_back_to_generic_schema() {
        let fields = parse_fields("Some Label: value");
        let export = render(FieldSource::Parsed(&fields), "unknown_type", "doc.png");
        let header: Vec<&str> = export.table.lines().next().unwrap().split('\t').collect();
        assert_eq!(header, vec!["Filename", "Extraction Data"]);
        let row: Vec<&str> = export.table.lines().nth(1).unwrap().split('\t').collect();
        assert_eq!(row.len(), 2);
        assert_eq!(row[0], "doc.png");
        assert!(row[1].contains("Some Label: value"));
    }

    #[test]
    fn raw_text_input_is_reparsed() {
        let export = render(
            FieldSource::Raw("Bank Name: ABC Bank\nGarbled line\nCheck Number: 1234"),
            "check",
            "chk.jpg",
        );
        let header: Vec<&str> = export.table.lines().next().unwrap().split('\t').collect();
        let row: Vec<&str> = export.table.lines().nth(1).unwrap().split('\t').collect();
        let bank_idx = header.iter().position(|h| *h == "Bank Name").unwrap();
        assert_eq!(row[bank_idx], "ABC Bank");
    }

    #[test]
    fn flat_text_distinguishes_na_from_blank() {
        let fields = parse_fields("Bank Name: ABC Bank");
        let export = render(FieldSource::Parsed(&fields), "check", "chk.jpg");
        assert!(export.text.starts_with("File: chk.jpg\n"));
        assert!(export.text.contains("Bank Name: ABC Bank\n"));
        // Prompted but missing → NA.
        assert!(export.text.contains("Check Number: NA\n"));
        // Never prompted → blank.
        assert!(export.text.contains("Payor City: \n"));
        assert!(export.text.trim_end().ends_with(&"-".repeat(50)));
    }

    #[test]
    fn table_cells_cannot_split_rows() {
        let mut fields = FieldMap::new();
        fields.insert("First Name", "Jane\tDoe\nextra");
        let export = render(FieldSource::Parsed(&fields), "passport", "scan.png");
        assert_eq!(export.table.lines().count(), 2);
        let row: Vec<&str> = export.table.lines().nth(1).unwrap().split('\t').collect();
        assert_eq!(row.len(), 18);
    }

    #[test]
    fn tsv_to_csv_quotes_commas() {
        let csv = tsv_to_csv("Filename\tCheck Amount\nchk.jpg\t1,123.56\n");
        assert_eq!(csv, "Filename,Check Amount\nchk.jpg,\"1,123.56\"");
    }

    #[test]
    fn download_name_is_timestamped() {
        let at = Utc.with_ymd_and_hms(2025, 3, 14, 9, 26, 53).unwrap();
        assert_eq!(
            download_name("passport", "scan.png", at, "csv"),
            "passport_scan.png_20250314_092653.csv"
        );
    }
}
