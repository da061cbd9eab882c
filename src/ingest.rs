//! CSV ingestion for punch logs and feature tables
//!
//! Time-clock exports are loose: headers come in mixed case with stray
//! spaces, some exports carry a UTF-8 BOM or CRLF line endings, and names
//! can contain quoted commas. The reader accepts all of that but is strict
//! about structure: missing required columns and rows with the wrong number
//! of fields are errors.

use crate::features::{impute, FeatureError, FeatureTable, LABEL_COLUMN};
use crate::label::AttendanceClass;
use crate::record::PunchRecord;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Columns every punch log must have
pub const REQUIRED_COLUMNS: [&str; 4] = [
    "employee_id",
    "fecha",
    "hora_entrada_teorica",
    "hora_entrada_real",
];

/// Alternative header spellings, mapped to the canonical name
const COLUMN_ALIASES: [(&str, &str); 3] = [
    ("empleado_id", "employee_id"),
    ("id_empleado", "employee_id"),
    ("employee_name", "nombre_empleado"),
];

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Input has no header row")]
    Empty,

    #[error("Missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    #[error("Line {line}: expected {expected} fields, found {found}")]
    MalformedRow {
        line: usize,
        expected: usize,
        found: usize,
    },

    #[error("Line {line}: unterminated quoted field")]
    UnterminatedQuote { line: usize },

    #[error(transparent)]
    Feature(#[from] FeatureError),
}

pub type Result<T> = std::result::Result<T, IngestError>;

/// One parsed CSV record and the line it started on
#[derive(Debug, Clone, PartialEq)]
struct CsvRow {
    line: usize,
    fields: Vec<String>,
}

/// Split CSV text into records
///
/// Handles quoted fields with embedded separators, doubled quotes and line
/// breaks. Blank lines are skipped.
fn parse_csv(text: &str) -> Result<Vec<CsvRow>> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut rows = Vec::new();
    let mut fields: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut line = 1;
    let mut row_start = 1;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    field.push('"');
                    chars.next();
                }
                '"' => in_quotes = false,
                '\n' => {
                    line += 1;
                    field.push('\n');
                }
                _ => field.push(c),
            }
            continue;
        }

        match c {
            '"' => in_quotes = true,
            ',' => fields.push(std::mem::take(&mut field)),
            '\r' => {}
            '\n' => {
                fields.push(std::mem::take(&mut field));
                push_row(&mut rows, row_start, std::mem::take(&mut fields));
                line += 1;
                row_start = line;
            }
            _ => field.push(c),
        }
    }

    if in_quotes {
        return Err(IngestError::UnterminatedQuote { line: row_start });
    }
    if !field.is_empty() || !fields.is_empty() {
        fields.push(field);
        push_row(&mut rows, row_start, fields);
    }

    Ok(rows)
}

fn push_row(rows: &mut Vec<CsvRow>, line: usize, fields: Vec<String>) {
    let blank = fields.iter().all(|f| f.trim().is_empty());
    if !blank {
        rows.push(CsvRow { line, fields });
    }
}

/// Trim, lower-case and resolve aliases
fn normalize_header(raw: &str) -> String {
    let name = raw.trim().to_lowercase();
    COLUMN_ALIASES
        .iter()
        .find(|(alias, _)| *alias == name)
        .map_or(name, |(_, canonical)| canonical.to_string())
}

fn check_width(row: &CsvRow, expected: usize) -> Result<()> {
    if row.fields.len() != expected {
        return Err(IngestError::MalformedRow {
            line: row.line,
            expected,
            found: row.fields.len(),
        });
    }
    Ok(())
}

/// Punch records parsed from one export
#[derive(Debug, Clone, PartialEq)]
pub struct PunchLog {
    pub records: Vec<PunchRecord>,
    /// Whether the export had an `ausencia` column
    pub has_status: bool,
}

/// Parse a punch log from CSV text
pub fn parse_punches(text: &str) -> Result<PunchLog> {
    let mut rows = parse_csv(text)?.into_iter();
    let header: Vec<String> = rows
        .next()
        .ok_or(IngestError::Empty)?
        .fields
        .iter()
        .map(|h| normalize_header(h))
        .collect();

    let missing: Vec<String> = REQUIRED_COLUMNS
        .iter()
        .filter(|c| !header.iter().any(|h| h == *c))
        .map(|c| c.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(IngestError::MissingColumns(missing));
    }

    let index = |name: &str| header.iter().position(|h| h == name);
    let employee_id = index("employee_id");
    let employee_name = index("nombre_empleado");
    let date = index("fecha");
    let scheduled_in = index("hora_entrada_teorica");
    let actual_in = index("hora_entrada_real");
    let scheduled_out = index("hora_salida_teorica");
    let actual_out = index("hora_salida_real");
    let status = index(LABEL_COLUMN);

    let mut records = Vec::new();
    for row in rows {
        check_width(&row, header.len())?;
        let cell = |idx: Option<usize>| -> Option<String> {
            idx.map(|i| row.fields[i].trim())
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        records.push(PunchRecord {
            employee_id: cell(employee_id).unwrap_or_default(),
            employee_name: cell(employee_name).unwrap_or_default(),
            raw_date: cell(date),
            raw_scheduled_clock_in: cell(scheduled_in),
            raw_actual_clock_in: cell(actual_in),
            raw_scheduled_clock_out: cell(scheduled_out),
            raw_actual_clock_out: cell(actual_out),
            raw_attendance_status: cell(status),
        });
    }

    debug!(rows = records.len(), has_status = status.is_some(), "parsed punch log");
    Ok(PunchLog {
        records,
        has_status: status.is_some(),
    })
}

fn read_text(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|source| IngestError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Read a punch log from a CSV file
pub fn read_punches(path: &Path) -> Result<PunchLog> {
    let log = parse_punches(&read_text(path)?)?;
    info!(path = %path.display(), records = log.records.len(), "ingested punch log");
    Ok(log)
}

fn parse_label(row: usize, raw: &str) -> std::result::Result<AttendanceClass, FeatureError> {
    let invalid = || FeatureError::InvalidLabel {
        row,
        value: raw.to_string(),
    };
    let value: f64 = raw.trim().parse().map_err(|_| invalid())?;
    if value.fract() != 0.0 || value < 0.0 {
        return Err(invalid());
    }
    AttendanceClass::from_index(value as usize).ok_or_else(invalid)
}

/// Parse a feature table from CSV text
///
/// An `ausencia` column, wherever it sits, becomes the label vector. The
/// remaining columns must match the feature schema exactly. Cells that are
/// not numbers are imputed to 0.
pub fn parse_feature_table(text: &str) -> Result<FeatureTable> {
    let mut rows = parse_csv(text)?.into_iter();
    let header: Vec<String> = rows
        .next()
        .ok_or(IngestError::Empty)?
        .fields
        .iter()
        .map(|h| h.trim().to_lowercase())
        .collect();

    let label_idx = header.iter().position(|h| h == LABEL_COLUMN);
    let columns: Vec<String> = header
        .iter()
        .filter(|h| *h != LABEL_COLUMN)
        .cloned()
        .collect();

    let mut values = Vec::new();
    let mut labels = label_idx.map(|_| Vec::new());
    for (row_number, row) in rows.enumerate() {
        check_width(&row, header.len())?;

        let mut features = Vec::with_capacity(columns.len());
        for (i, cell) in row.fields.iter().enumerate() {
            if Some(i) == label_idx {
                if let Some(labels) = labels.as_mut() {
                    labels.push(parse_label(row_number, cell)?);
                }
            } else {
                features.push(impute(cell.trim().parse::<f64>().ok()));
            }
        }
        values.push(features);
    }

    let table = FeatureTable::new(columns, values, labels)?;
    table.validate_schema()?;
    Ok(table)
}

/// Read a feature table from a CSV file
pub fn read_feature_table(path: &Path) -> Result<FeatureTable> {
    let table = parse_feature_table(&read_text(path)?)?;
    info!(path = %path.display(), rows = table.len(), "loaded feature table");
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{FeatureBuilder, FEATURE_COLUMNS};

    const PUNCHES: &str = "\
Employee_ID , Nombre_Empleado,fecha,hora_entrada_teorica,hora_entrada_real,ausencia
101,\"Pérez, Ana\",05/03/2024,08:00,08:25,Tardanza 20min
102,Luis,05/03/2024,08:00,,Ausente Justificado
103,Marta,06/03/2024,08:00,07:58,
";

    #[test]
    fn test_parse_punches() {
        let log = parse_punches(PUNCHES).unwrap();
        assert!(log.has_status);
        assert_eq!(log.records.len(), 3);

        let ana = &log.records[0];
        assert_eq!(ana.employee_id, "101");
        assert_eq!(ana.employee_name, "Pérez, Ana");
        assert_eq!(ana.lateness_minutes(), Some(25.0));
        assert_eq!(ana.raw_attendance_status.as_deref(), Some("Tardanza 20min"));

        assert_eq!(log.records[1].raw_actual_clock_in, None);
        assert_eq!(log.records[2].raw_attendance_status, None);
    }

    #[test]
    fn test_bom_crlf_and_aliases() {
        let text = "\u{feff}empleado_id,employee_name,fecha,hora_entrada_teorica,hora_entrada_real\r\n7,Rosa,01/02/2024,09:00,09:40\r\n";
        let log = parse_punches(text).unwrap();
        assert!(!log.has_status);
        assert_eq!(log.records[0].employee_id, "7");
        assert_eq!(log.records[0].employee_name, "Rosa");
        assert_eq!(log.records[0].lateness_minutes(), Some(40.0));
    }

    #[test]
    fn test_missing_required_columns() {
        let err = parse_punches("employee_id,fecha\n1,05/03/2024\n").unwrap_err();
        match err {
            IngestError::MissingColumns(cols) => {
                assert_eq!(cols, vec!["hora_entrada_teorica", "hora_entrada_real"]);
            }
            other => panic!("expected MissingColumns, got {other:?}"),
        }
    }

    #[test]
    fn test_malformed_row() {
        let text = "employee_id,fecha,hora_entrada_teorica,hora_entrada_real\n1,05/03/2024,08:00\n";
        assert!(matches!(
            parse_punches(text),
            Err(IngestError::MalformedRow {
                line: 2,
                expected: 4,
                found: 3
            })
        ));
    }

    #[test]
    fn test_quoted_fields() {
        let rows = parse_csv("a,b\n\"x \"\"y\"\"\",\"line\nbreak\"\n").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].fields, vec!["x \"y\"", "line\nbreak"]);
        assert_eq!(rows[1].line, 2);
    }

    #[test]
    fn test_unterminated_quote() {
        assert!(matches!(
            parse_csv("a,b\n\"open,1\n"),
            Err(IngestError::UnterminatedQuote { line: 2 })
        ));
    }

    #[test]
    fn test_empty_input() {
        assert!(matches!(parse_punches(""), Err(IngestError::Empty)));
        assert!(matches!(parse_punches("\n\n"), Err(IngestError::Empty)));
    }

    #[test]
    fn test_read_punches_missing_file() {
        let err = read_punches(Path::new("/nonexistent/punches.csv")).unwrap_err();
        assert!(matches!(err, IngestError::Io { .. }));
        assert!(err.to_string().contains("/nonexistent/punches.csv"));
    }

    fn feature_csv(with_label: bool) -> String {
        let mut header: Vec<&str> = FEATURE_COLUMNS.to_vec();
        if with_label {
            header.push(LABEL_COLUMN);
        }
        let mut text = header.join(",");
        text.push('\n');
        text.push_str("1,0,0,0,3,2024,5,10,25,1,0");
        if with_label {
            text.push_str(",2");
        }
        text.push('\n');
        text.push_str("2,0,0,0,3,2024,6,10,abc,0,0");
        if with_label {
            text.push_str(",0");
        }
        text.push('\n');
        text
    }

    #[test]
    fn test_parse_feature_table_with_labels() {
        let table = parse_feature_table(&feature_csv(true)).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.columns(), FEATURE_COLUMNS.map(String::from).as_slice());
        assert_eq!(
            table.labels(),
            Some([AttendanceClass::Late, AttendanceClass::Present].as_slice())
        );
        // "abc" imputed
        assert_eq!(table.column("tardanza_min"), Some(vec![25.0, 0.0]));
    }

    #[test]
    fn test_parse_feature_table_without_labels() {
        let table = parse_feature_table(&feature_csv(false)).unwrap();
        assert!(table.labels().is_none());
    }

    #[test]
    fn test_feature_table_schema_mismatch() {
        let text = "dia_semana,extra\n1,2\n";
        match parse_feature_table(text) {
            Err(IngestError::Feature(FeatureError::SchemaMismatch(mismatch))) => {
                assert!(mismatch.missing.contains(&"tardanza_min".to_string()));
                assert_eq!(mismatch.unexpected, vec!["extra".to_string()]);
            }
            other => panic!("expected SchemaMismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_invalid_label() {
        let text = feature_csv(true).replace(",2\n", ",7\n");
        assert!(matches!(
            parse_feature_table(&text),
            Err(IngestError::Feature(FeatureError::InvalidLabel { row: 0, .. }))
        ));
    }

    #[test]
    fn test_features_from_ingested_punches() {
        let log = parse_punches(PUNCHES).unwrap();
        let table = FeatureBuilder::training().build(&log.records);
        assert_eq!(
            table.labels(),
            Some(
                [
                    AttendanceClass::Late,
                    AttendanceClass::Absent,
                    AttendanceClass::Present
                ]
                .as_slice()
            )
        );
    }
}
