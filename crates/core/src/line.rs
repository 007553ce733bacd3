//! Line-oriented record format.
//!
//! One record per line: `name[,tag=value...] field=value[,field=value...] [unix_nanos]`.
//! Integers carry an `i` suffix, unsigned integers a `u` suffix and strings
//! are double-quoted. Commas, spaces and `=` inside names are escaped with `\`.

use chrono::{DateTime, Utc};

use crate::error::{Result, TallyError};
use crate::model::{FieldValue, MetricRecord};
use crate::time::{from_unix_nanos, to_unix_nanos};

/// Encodes `record` as one line. Returns `Ok(None)` when the record has no
/// field that can be written; a timestamp outside the nanosecond range is an
/// error.
pub fn encode_record(record: &MetricRecord) -> Result<Option<String>> {
    let mut out = escape(record.name(), &[',', ' ']);
    for (k, v) in record.tags() {
        out.push(',');
        out.push_str(&escape(k, &[',', '=', ' ']));
        out.push('=');
        out.push_str(&escape(v, &[',', '=', ' ']));
    }

    let mut fields = Vec::with_capacity(record.fields().len());
    for (k, v) in record.fields() {
        if let Some(encoded) = encode_field_value(v)? {
            fields.push(format!("{}={encoded}", escape(k, &[',', '=', ' '])));
        }
    }
    if fields.is_empty() {
        return Ok(None);
    }

    out.push(' ');
    out.push_str(&fields.join(","));
    out.push(' ');
    out.push_str(&to_unix_nanos(record.timestamp())?.to_string());
    Ok(Some(out))
}

fn encode_field_value(value: &FieldValue) -> Result<Option<String>> {
    let encoded = match value {
        FieldValue::Int(v) => format!("{v}i"),
        FieldValue::UInt(v) => format!("{v}u"),
        FieldValue::Float(v) if v.is_finite() => format!("{v}"),
        FieldValue::Float(_) => return Ok(None),
        FieldValue::Bool(v) => v.to_string(),
        FieldValue::Timestamp(ts) => format!("{}i", to_unix_nanos(*ts)?),
        FieldValue::Text(s) => format!("\"{}\"", escape(s, &['"'])),
        FieldValue::Null => return Ok(None),
    };
    Ok(Some(encoded))
}

fn escape(input: &str, special: &[char]) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        if c == '\\' || special.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn unescape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
                continue;
            }
        }
        out.push(c);
    }
    out
}

/// Splits on `sep` wherever it is neither escaped nor inside double quotes.
fn split_top(input: &str, sep: char) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut escaped = false;
    let mut in_quotes = false;
    for (idx, c) in input.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '"' => in_quotes = !in_quotes,
            c if c == sep && !in_quotes => {
                out.push(&input[start..idx]);
                start = idx + c.len_utf8();
            }
            _ => {}
        }
    }
    out.push(&input[start..]);
    out
}

fn split_pair(input: &str) -> Option<(&str, &str)> {
    let mut parts = split_top(input, '=');
    if parts.len() < 2 {
        return None;
    }
    let key = parts.remove(0);
    let value_start = key.len() + 1;
    Some((key, &input[value_start..]))
}

/// Records parsed from a block of lines, plus one error per line that did
/// not parse.
#[derive(Debug, Default)]
pub struct ParsedLines {
    pub records: Vec<MetricRecord>,
    pub errors: Vec<TallyError>,
}

/// Parses every record in `input`. Lines without a timestamp are stamped
/// with `default_ts`. A bad line does not stop the lines after it.
pub fn parse_lines(input: &str, default_ts: DateTime<Utc>) -> ParsedLines {
    let mut out = ParsedLines::default();
    for (idx, raw) in input.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match parse_line(line, default_ts) {
            Ok(record) => out.records.push(record),
            Err(e) => out
                .errors
                .push(TallyError::Parse(format!("line {}: {e}", idx + 1))),
        }
    }
    out
}

fn parse_line(line: &str, default_ts: DateTime<Utc>) -> std::result::Result<MetricRecord, String> {
    let sections: Vec<&str> = split_top(line, ' ')
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect();
    let (key, fields, ts) = match sections.as_slice() {
        [key, fields] => (*key, *fields, None),
        [key, fields, ts] => (*key, *fields, Some(*ts)),
        _ => return Err("expected `name[,tags] fields [timestamp]`".to_string()),
    };

    let timestamp = match ts {
        Some(raw) => from_unix_nanos(
            raw.parse::<i64>()
                .map_err(|e| format!("bad timestamp {raw}: {e}"))?,
        ),
        None => default_ts,
    };

    let mut key_parts = split_top(key, ',').into_iter();
    let name = unescape(key_parts.next().unwrap_or_default());
    let mut record = MetricRecord::new(name, timestamp).map_err(|e| e.to_string())?;

    for tag in key_parts {
        let (k, v) = split_pair(tag).ok_or_else(|| format!("bad tag {tag}"))?;
        if k.is_empty() {
            return Err(format!("empty tag key in {tag}"));
        }
        record = record.with_tag(unescape(k), unescape(v));
    }

    for field in split_top(fields, ',') {
        let (k, v) = split_pair(field).ok_or_else(|| format!("bad field {field}"))?;
        if k.is_empty() {
            return Err(format!("empty field key in {field}"));
        }
        record = record.with_field(unescape(k), parse_field_value(v)?);
    }

    Ok(record)
}

fn parse_field_value(raw: &str) -> std::result::Result<FieldValue, String> {
    if raw.len() >= 2 && raw.starts_with('"') && raw.ends_with('"') {
        return Ok(FieldValue::Text(unescape(&raw[1..raw.len() - 1])));
    }
    match raw {
        "t" | "T" | "true" | "True" | "TRUE" => return Ok(FieldValue::Bool(true)),
        "f" | "F" | "false" | "False" | "FALSE" => return Ok(FieldValue::Bool(false)),
        _ => {}
    }
    if let Some(int) = raw.strip_suffix('i') {
        return int
            .parse::<i64>()
            .map(FieldValue::Int)
            .map_err(|e| format!("bad integer {raw}: {e}"));
    }
    if let Some(uint) = raw.strip_suffix('u') {
        return uint
            .parse::<u64>()
            .map(FieldValue::UInt)
            .map_err(|e| format!("bad unsigned integer {raw}: {e}"));
    }
    raw.parse::<f64>()
        .map(FieldValue::Float)
        .map_err(|e| format!("bad field value {raw}: {e}"))
}
