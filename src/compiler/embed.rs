//! Data embedding for the dashboard page.
//!
//! Injects up to three inert `<script>` blocks before the first `</head>`
//! (or at the start of the document when there is no head):
//!
//! ```text
//! <script type="application/json" id="embedded-json">…raw JSON…</script>
//! <script type="text/csv" id="embedded-csv">…raw CSV…</script>
//! <script type="application/json" id="embedded-csv-rows">…CSV as JSON rows…</script>
//! ```
//!
//! Each block is emitted only when its data file could be read. Block
//! contents escape `</` as `<\/` so no data can close the script element.

use crate::config::BuildConfig;
use crate::log;
use serde_json::{Map, Number, Value};
use std::{borrow::Cow, fmt::Write, fs, path::Path};

use super::SourceFile;

pub const JSON_BLOCK_ID: &str = "embedded-json";
pub const CSV_BLOCK_ID: &str = "embedded-csv";
pub const CSV_ROWS_BLOCK_ID: &str = "embedded-csv-rows";

/// Data files found for the embed target. `None` means absent.
#[derive(Debug, Default)]
pub struct DataBlocks {
    pub json: Option<String>,
    pub csv: Option<String>,
}

impl DataBlocks {
    /// Read the configured data files; unreadable files count as absent.
    pub fn load(config: &BuildConfig) -> Self {
        let data_dir = config.source.join(&config.embed.data_dir);
        Self {
            json: read_optional(&data_dir.join(&config.embed.json)),
            csv: read_optional(&data_dir.join(&config.embed.csv)),
        }
    }

    pub const fn is_empty(&self) -> bool {
        self.json.is_none() && self.csv.is_none()
    }
}

fn read_optional(path: &Path) -> Option<String> {
    match fs::read_to_string(path) {
        Ok(content) => Some(content),
        Err(err) => {
            log!("embed"; "{} not embedded: {err}", path.display());
            None
        }
    }
}

/// Whether `file` is the configured embed target.
pub fn is_target(file: &SourceFile, config: &BuildConfig) -> bool {
    let page = config.embed.page.trim_start_matches("./");
    !page.is_empty() && file.rel == page
}

/// Inject the data blocks into `html`.
pub fn inject<'a>(html: &'a str, blocks: &DataBlocks) -> Cow<'a, str> {
    if blocks.is_empty() {
        return Cow::Borrowed(html);
    }

    let mut markup = String::new();
    if let Some(json) = &blocks.json {
        push_block(&mut markup, "application/json", JSON_BLOCK_ID, json);
    }
    if let Some(csv) = &blocks.csv {
        push_block(&mut markup, "text/csv", CSV_BLOCK_ID, csv);
        let rows = Value::Array(csv_to_rows(csv)).to_string();
        push_block(&mut markup, "application/json", CSV_ROWS_BLOCK_ID, &rows);
    }

    let at = html.to_ascii_lowercase().find("</head>").unwrap_or(0);
    let mut out = String::with_capacity(html.len() + markup.len());
    out.push_str(&html[..at]);
    out.push_str(&markup);
    out.push_str(&html[at..]);
    Cow::Owned(out)
}

fn push_block(out: &mut String, mime: &str, id: &str, content: &str) {
    let _ = writeln!(
        out,
        r#"<script type="{mime}" id="{id}">{}</script>"#,
        escape_script(content)
    );
}

fn escape_script(content: &str) -> String {
    content.replace("</", "<\\/")
}

// ============================================================================
// CSV
// ============================================================================

/// Convert CSV text to JSON objects keyed by the header row.
///
/// Keys keep the header's column order. Values parse as integers first, then
/// as finite floats (integral ones such as `1e3` become integers), and stay
/// strings otherwise. Blank values become `""`. Missing trailing values are
/// blank.
pub fn csv_to_rows(csv: &str) -> Vec<Value> {
    let mut records = parse_csv(csv).into_iter();
    let Some(header) = records.next() else {
        return Vec::new();
    };
    let keys: Vec<String> = header.iter().map(|key| key.trim().to_owned()).collect();

    records
        .map(|record| {
            let row: Map<String, Value> = keys
                .iter()
                .enumerate()
                .map(|(i, key)| {
                    let field = record.get(i).map_or("", String::as_str);
                    (key.clone(), csv_value(field))
                })
                .collect();
            Value::Object(row)
        })
        .collect()
}

#[allow(clippy::cast_possible_truncation)]
fn csv_value(field: &str) -> Value {
    let field = field.trim();
    if field.is_empty() {
        return Value::String(String::new());
    }
    if let Ok(int) = field.parse::<i64>() {
        return Value::Number(int.into());
    }
    match field.parse::<f64>() {
        Ok(float) if is_integral(float) => Value::Number((float as i64).into()),
        Ok(float) => Number::from_f64(float)
            .map_or_else(|| Value::String(field.to_owned()), Value::Number),
        Err(_) => Value::String(field.to_owned()),
    }
}

/// Whole and within the range where `f64 -> i64` is exact.
fn is_integral(float: f64) -> bool {
    const LIMIT: f64 = 9_007_199_254_740_992.0; // 2^53
    float.is_finite() && float.fract() == 0.0 && float.abs() <= LIMIT
}

/// Split CSV text into records. Quoted fields may contain commas, newlines
/// and doubled quotes. Blank lines are skipped.
fn parse_csv(text: &str) -> Vec<Vec<String>> {
    let mut records = Vec::new();
    let mut record = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        if in_quotes {
            match ch {
                '"' if chars.peek() == Some(&'"') => {
                    field.push('"');
                    chars.next();
                }
                '"' => in_quotes = false,
                _ => field.push(ch),
            }
            continue;
        }

        match ch {
            '"' if field.is_empty() => in_quotes = true,
            ',' => record.push(std::mem::take(&mut field)),
            '\r' => {}
            '\n' => {
                record.push(std::mem::take(&mut field));
                records.push(std::mem::take(&mut record));
            }
            _ => field.push(ch),
        }
    }
    if !field.is_empty() || !record.is_empty() {
        record.push(field);
        records.push(record);
    }

    records.retain(|r| !(r.len() == 1 && r[0].trim().is_empty()));
    records
}
