//! Delimited-text plumbing shared by the loader and the output writer.
//!
//! - **Delimiter resolution**: extension-based (`.tsv`/`.tab` → tab, `.psv` → pipe,
//!   everything else comma).
//! - **Encoding**: inputs are decoded and outputs transcoded via `encoding_rs`,
//!   defaulting to UTF-8. A UTF-8 byte-order mark on the first header is dropped.
//! - **Quoting**: output uses `QuoteStyle::Always` so values round-trip unchanged.

use std::{
    fs::{self, File},
    io::{BufReader, Read},
    path::Path,
};

use anyhow::{Context, Result, anyhow};
use csv::QuoteStyle;
use encoding_rs::{Encoding, UTF_8};

pub const DEFAULT_CSV_DELIMITER: u8 = b',';
pub const DEFAULT_TSV_DELIMITER: u8 = b'\t';
pub const DEFAULT_PSV_DELIMITER: u8 = b'|';

const UTF8_BOM: char = '\u{feff}';

pub fn resolve_encoding(label: Option<&str>) -> Result<&'static Encoding> {
    if let Some(value) = label {
        Encoding::for_label(value.trim().as_bytes())
            .ok_or_else(|| anyhow!("Unknown encoding '{value}'"))
    } else {
        Ok(UTF_8)
    }
}

pub fn resolve_input_delimiter(path: &Path) -> u8 {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("tsv") || ext.eq_ignore_ascii_case("tab") => {
            DEFAULT_TSV_DELIMITER
        }
        Some(ext) if ext.eq_ignore_ascii_case("psv") => DEFAULT_PSV_DELIMITER,
        _ => DEFAULT_CSV_DELIMITER,
    }
}

pub fn open_csv_reader_from_path(path: &Path, delimiter: u8) -> Result<csv::Reader<Box<dyn Read>>> {
    let reader: Box<dyn Read> = Box::new(BufReader::new(
        File::open(path).with_context(|| format!("Opening input file {path:?}"))?,
    ));
    let mut builder = csv::ReaderBuilder::new();
    builder
        .has_headers(true)
        .delimiter(delimiter)
        .double_quote(true)
        .flexible(true);
    Ok(builder.from_reader(reader))
}

pub fn decode_bytes(bytes: &[u8], encoding: &'static Encoding) -> Result<String> {
    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        Err(anyhow!(
            "Failed to decode text with encoding {}",
            encoding.name()
        ))
    } else {
        Ok(text.into_owned())
    }
}

pub fn decode_record(record: &csv::ByteRecord, encoding: &'static Encoding) -> Result<Vec<String>> {
    record
        .iter()
        .map(|field| decode_bytes(field, encoding))
        .collect()
}

pub fn reader_headers<R>(
    reader: &mut csv::Reader<R>,
    encoding: &'static Encoding,
) -> Result<Vec<String>>
where
    R: Read,
{
    let headers = reader.byte_headers()?.clone();
    let mut decoded = decode_record(&headers, encoding)?;
    if let Some(first) = decoded.first_mut() {
        if let Some(stripped) = first.strip_prefix(UTF8_BOM) {
            *first = stripped.to_string();
        }
    }
    Ok(decoded)
}

/// Serializes `rows` under `headers` and writes the file in one go, transcoding from
/// UTF-8 when another output encoding is requested.
pub fn write_csv(
    path: &Path,
    headers: &[String],
    rows: impl IntoIterator<Item = Vec<String>>,
    encoding: &'static Encoding,
) -> Result<()> {
    let mut builder = csv::WriterBuilder::new();
    builder
        .delimiter(DEFAULT_CSV_DELIMITER)
        .quote_style(QuoteStyle::Always)
        .double_quote(true);
    let mut writer = builder.from_writer(Vec::new());
    writer
        .write_record(headers)
        .with_context(|| format!("Writing headers for {path:?}"))?;
    for (idx, row) in rows.into_iter().enumerate() {
        writer
            .write_record(&row)
            .with_context(|| format!("Writing row {} of {path:?}", idx + 2))?;
    }
    let buffer = writer
        .into_inner()
        .map_err(|err| anyhow!("Flushing CSV buffer for {path:?}: {}", err.error()))?;
    let bytes = if encoding == UTF_8 {
        buffer
    } else {
        let text = String::from_utf8(buffer).context("CSV writer produced invalid UTF-8")?;
        let (encoded, _, had_errors) = encoding.encode(&text);
        if had_errors {
            return Err(anyhow!(
                "Some characters of {path:?} cannot be represented in {}",
                encoding.name()
            ));
        }
        encoded.into_owned()
    };
    fs::write(path, bytes).with_context(|| format!("Creating output file {path:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn delimiter_follows_extension() {
        assert_eq!(resolve_input_delimiter(&PathBuf::from("a.TSV")), b'\t');
        assert_eq!(resolve_input_delimiter(&PathBuf::from("a.psv")), b'|');
        assert_eq!(resolve_input_delimiter(&PathBuf::from("a.csv")), b',');
    }

    #[test]
    fn unknown_encoding_label_is_rejected() {
        assert!(resolve_encoding(Some("klingon")).is_err());
        assert_eq!(resolve_encoding(Some("latin1")).unwrap().name(), "windows-1252");
    }

    #[test]
    fn write_csv_transcodes_output() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let encoding = resolve_encoding(Some("windows-1252")).unwrap();
        write_csv(
            &path,
            &["name".to_string()],
            vec![vec!["café".to_string()]],
            encoding,
        )
        .unwrap();
        let bytes = fs::read(&path).unwrap();
        assert!(bytes.contains(&0xE9));
    }
}
