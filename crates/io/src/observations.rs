// Scrape output import
//
// The portal scrape is external; it hands over either a `name,inn` CSV or
// the raw list-item text it collected, one `<name> (<digits>)` per line.

use std::io::Read;
use std::path::Path;

use iprtrack_core::names::shorten_legal_form;
use iprtrack_core::Observation;
use regex::Regex;
use tracing::{debug, warn};

use crate::error::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObservationFormat {
    /// Delimited file with a header naming the name and tax id columns.
    Csv,
    /// Scraped list items, `<name> (<digits>)` per line.
    Lines,
}

impl ObservationFormat {
    /// `.csv`/`.tsv` are CSV, anything else is treated as scraped lines.
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("csv") | Some("tsv") => Self::Csv,
            _ => Self::Lines,
        }
    }
}

const NAME_HEADERS: &[&str] = &["name", "gosuslugi_name", "name_gosuslugi"];
const INN_HEADERS: &[&str] = &["inn", "tax_id"];

pub fn read_observations(path: &Path, format: ObservationFormat) -> Result<Vec<Observation>, StoreError> {
    let content = read_file_as_utf8(path)?;
    let observations = match format {
        ObservationFormat::Csv => parse_csv(&content).map_err(|message| StoreError::Csv {
            path: path.to_path_buf(),
            message,
        })?,
        ObservationFormat::Lines => parse_lines(&content),
    };
    debug!("read {} observation(s) from {}", observations.len(), path.display());
    Ok(observations)
}

/// Read file and convert to UTF-8 if needed. Cyrillic exports from Excel are
/// usually Windows-1251.
pub fn read_file_as_utf8(path: &Path) -> Result<String, StoreError> {
    let mut file = std::fs::File::open(path).map_err(|e| StoreError::io(path, e))?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes).map_err(|e| StoreError::io(path, e))?;

    match String::from_utf8(bytes) {
        Ok(s) => Ok(s.strip_prefix('\u{feff}').map(str::to_string).unwrap_or(s)),
        Err(e) => {
            let bytes = e.into_bytes();
            let (decoded, _, _) = encoding_rs::WINDOWS_1251.decode(&bytes);
            Ok(decoded.into_owned())
        }
    }
}

/// Parse scraped list-item lines. Lines that don't look like
/// `<name> (<digits>)` are skipped.
pub fn parse_lines(content: &str) -> Vec<Observation> {
    let pattern = Regex::new(r"^(.+) \((\d+)\)$").expect("literal pattern");
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| match pattern.captures(line) {
            Some(caps) => Some(Observation::new(shorten_legal_form(&caps[1]), &caps[2])),
            None => {
                debug!("skipping unmatched line: {line}");
                None
            }
        })
        .collect()
}

/// Parse a delimited file with a header row. The delimiter is sniffed.
/// Tax ids are passed through raw so malformed ones reach reconciliation
/// and get reported there.
pub fn parse_csv(content: &str) -> Result<Vec<Observation>, String> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(sniff_delimiter(content))
        .flexible(true)
        .from_reader(content.as_bytes());

    let headers = reader.headers().map_err(|e| e.to_string())?.clone();
    let find = |names: &[&str]| {
        headers
            .iter()
            .position(|h| names.iter().any(|n| h.trim().eq_ignore_ascii_case(n)))
    };
    let (Some(name_col), Some(inn_col)) = (find(NAME_HEADERS), find(INN_HEADERS)) else {
        return Err("missing 'name' or 'inn' column in header".to_string());
    };

    let mut observations = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        let record = result.map_err(|e| e.to_string())?;
        let name = record.get(name_col).unwrap_or("").trim();
        let inn = record.get(inn_col).unwrap_or("").trim();
        if name.is_empty() && inn.is_empty() {
            continue;
        }
        if name.is_empty() {
            warn!("line {}: empty name for inn {inn}", idx + 2);
        }
        observations.push(Observation::new(shorten_legal_form(name), inn));
    }
    Ok(observations)
}

/// Most consistent multi-field delimiter across the first lines.
fn sniff_delimiter(content: &str) -> u8 {
    let candidates: &[u8] = &[b'\t', b';', b',', b'|'];
    let sample_lines: Vec<&str> = content.lines().take(10).collect();

    let mut best = b',';
    let mut best_score = 0u64;

    for &delim in candidates {
        let counts: Vec<usize> = sample_lines
            .iter()
            .map(|line| {
                csv::ReaderBuilder::new()
                    .delimiter(delim)
                    .has_headers(false)
                    .flexible(true)
                    .from_reader(line.as_bytes())
                    .records()
                    .next()
                    .and_then(|r| r.ok())
                    .map(|r| r.len())
                    .unwrap_or(1)
            })
            .collect();

        let Some(&target) = counts.first() else {
            continue;
        };
        if target <= 1 {
            continue;
        }
        let consistent = counts.iter().filter(|&&c| c == target).count() as u64;
        let score = consistent * target as u64;
        if score > best_score {
            best_score = score;
            best = delim;
        }
    }

    best
}
