use std::collections::HashMap;
use std::io::Read;

use serde::Serialize;
use tracing::debug;

use crate::error::GribError;
use crate::http::{HttpSource, STATUS_OK};

// Half-open `[start, end)`; a missing `end` reaches to the end of the resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ByteRange {
    pub start: u64,
    pub end: Option<u64>,
}

impl ByteRange {
    pub fn new(start: u64, end: Option<u64>) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> Option<u64> {
        self.end.map(|end| end - self.start)
    }

    // HTTP ranges are inclusive.
    pub fn header_value(&self) -> String {
        match self.end {
            Some(end) => format!("bytes={}-{}", self.start, end - 1),
            None => format!("bytes={}-", self.start),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexTable {
    entries: HashMap<String, HashMap<String, ByteRange>>,
}

struct Record<'a> {
    offset: u64,
    param: &'a str,
    level: &'a str,
}

fn parse_record(line: &str) -> Option<Record<'_>> {
    let fields: Vec<&str> = line.split(':').collect();
    if fields.len() < 5 {
        return None;
    }
    let offset = fields[1].trim().parse::<u64>().ok()?;
    Some(Record {
        offset,
        param: fields[3],
        level: fields[4],
    })
}

impl IndexTable {
    // Lines read `n:offset:date:PARAM:level:...`. A record ends where the next
    // well-formed one starts. A repeated (parameter, level) pair keeps the last.
    pub fn parse(text: &str) -> Self {
        let records: Vec<Record<'_>> = text.lines().filter_map(parse_record).collect();
        let mut entries: HashMap<String, HashMap<String, ByteRange>> = HashMap::new();

        for (i, record) in records.iter().enumerate() {
            let end = records.get(i + 1).map(|next| next.offset);
            if end.is_some_and(|end| end <= record.offset) {
                debug!(
                    param = record.param,
                    level = record.level,
                    "skipping index record with empty range"
                );
                continue;
            }
            entries
                .entry(record.param.to_string())
                .or_default()
                .insert(record.level.to_string(), ByteRange::new(record.offset, end));
        }

        Self { entries }
    }

    pub fn get(&self, param: &str, level: &str) -> Option<ByteRange> {
        self.entries.get(param)?.get(level).copied()
    }

    pub fn lookup(&self, param: &str, level: &str) -> Result<ByteRange, GribError> {
        self.get(param, level)
            .ok_or_else(|| GribError::IndexEntryMissing {
                param: param.to_string(),
                height: level.to_string(),
            })
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(HashMap::len).sum()
    }
}

pub fn index_url(archive_url: &str) -> String {
    format!("{archive_url}.idx")
}

// One attempt; the caller owns the retry policy.
pub fn resolve_index(source: &dyn HttpSource, archive_url: &str) -> Result<IndexTable, GribError> {
    let url = index_url(archive_url);
    let body = source.get(&url, None)?.expect_status(&url, STATUS_OK)?;
    let mut text = String::new();
    let mut reader = body.reader;
    reader
        .read_to_string(&mut text)
        .map_err(|err| GribError::BodyRead(err.to_string()))?;

    let table = IndexTable::parse(&text);
    if table.is_empty() {
        return Err(GribError::Index(format!("{url} lists no records")));
    }
    debug!(url = %url, records = table.len(), "parsed index");
    Ok(table)
}
