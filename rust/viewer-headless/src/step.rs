// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! STEP (ISO 10303-21) scanning.
//!
//! Finds entity boundaries in the `DATA` section without decoding attribute
//! values. Semicolons inside quoted strings do not end an entity.

use memchr::{memchr, memchr2, memmem};
use rustc_hash::FxHashMap;
use thiserror::Error;

/// Magic line every STEP exchange file starts with.
pub const STEP_MAGIC: &[u8] = b"ISO-10303-21;";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScanError {
    #[error("missing ISO-10303-21 header")]
    NotStep,

    #[error("no DATA section")]
    MissingData,

    #[error("unterminated entity at byte {offset}")]
    Unterminated { offset: usize },

    #[error("malformed entity at byte {offset}")]
    Malformed { offset: usize },

    #[error("file contains no entities")]
    Empty,
}

/// One `#id=TYPE(...);` record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityRecord<'a> {
    pub id: u32,
    pub type_name: &'a str,
    pub start: usize,
    pub end: usize,
}

/// Entity types that carry renderable geometry.
const GEOMETRY_TYPES: &[&str] = &[
    "IFCBEAM",
    "IFCBEAMSTANDARDCASE",
    "IFCBUILDINGELEMENTPROXY",
    "IFCCOLUMN",
    "IFCCOLUMNSTANDARDCASE",
    "IFCCOVERING",
    "IFCCURTAINWALL",
    "IFCDOOR",
    "IFCDOORSTANDARDCASE",
    "IFCFLOWFITTING",
    "IFCFLOWSEGMENT",
    "IFCFLOWTERMINAL",
    "IFCFOOTING",
    "IFCFURNISHINGELEMENT",
    "IFCMEMBER",
    "IFCMEMBERSTANDARDCASE",
    "IFCOPENINGELEMENT",
    "IFCPILE",
    "IFCPLATE",
    "IFCPLATESTANDARDCASE",
    "IFCRAILING",
    "IFCRAMP",
    "IFCRAMPFLIGHT",
    "IFCREINFORCINGBAR",
    "IFCROOF",
    "IFCSLAB",
    "IFCSLABSTANDARDCASE",
    "IFCSPACE",
    "IFCSTAIR",
    "IFCSTAIRFLIGHT",
    "IFCWALL",
    "IFCWALLSTANDARDCASE",
    "IFCWINDOW",
    "IFCWINDOWSTANDARDCASE",
];

/// Whether entities of `type_name` produce geometry.
pub fn has_geometry(type_name: &str) -> bool {
    let upper = type_name.to_ascii_uppercase();
    GEOMETRY_TYPES.binary_search(&upper.as_str()).is_ok()
}

/// Schema identifier from the `FILE_SCHEMA` header entry, e.g. `IFC4`.
pub fn file_schema(content: &[u8]) -> Option<String> {
    let header_end = memmem::find(content, b"DATA;").unwrap_or(content.len());
    let header = &content[..header_end];
    let at = memmem::find(header, b"FILE_SCHEMA")?;
    let rest = &header[at..];
    let open = memchr(b'\'', rest)? + 1;
    let close = open + memchr(b'\'', &rest[open..])?;
    let schema = std::str::from_utf8(&rest[open..close]).ok()?.trim();
    if schema.is_empty() {
        None
    } else {
        Some(schema.to_ascii_uppercase())
    }
}

/// Iterates entity records of a STEP file.
pub struct EntityScanner<'a> {
    content: &'a [u8],
    position: usize,
    end: usize,
}

impl<'a> EntityScanner<'a> {
    /// Scanner positioned at the start of the `DATA` section.
    pub fn new(content: &'a [u8]) -> Result<Self, ScanError> {
        if !content.starts_with(STEP_MAGIC) {
            return Err(ScanError::NotStep);
        }
        let data = memmem::find(content, b"DATA;").ok_or(ScanError::MissingData)? + b"DATA;".len();
        Ok(Self {
            content,
            position: data,
            end: content.len(),
        })
    }

    /// Byte offset of the scan.
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// Next entity record, or `None` at the end of the `DATA` section.
    pub fn next_entity(&mut self) -> Result<Option<EntityRecord<'a>>, ScanError> {
        let hash = self.skip_trivia();
        let rest = &self.content[hash..self.end];
        if rest.is_empty() || rest.starts_with(b"ENDSEC;") {
            self.position = self.end;
            return Ok(None);
        }
        if rest[0] != b'#' {
            return Err(ScanError::Malformed { offset: hash });
        }

        let line_end = self.statement_end(hash)?;
        let record = &self.content[hash..line_end];

        let digits = record[1..].iter().take_while(|b| b.is_ascii_digit()).count();
        if digits == 0 {
            return Err(ScanError::Malformed { offset: hash });
        }
        let id = std::str::from_utf8(&record[1..1 + digits])
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .ok_or(ScanError::Malformed { offset: hash })?;

        let eq = memchr(b'=', record).ok_or(ScanError::Malformed { offset: hash })?;
        let type_start = eq + 1 + record[eq + 1..].iter().take_while(|b| b.is_ascii_whitespace()).count();
        let type_len = record[type_start..]
            .iter()
            .take_while(|b| b.is_ascii_alphanumeric() || **b == b'_')
            .count();
        if type_len == 0 {
            return Err(ScanError::Malformed { offset: hash });
        }
        let type_name = std::str::from_utf8(&record[type_start..type_start + type_len])
            .map_err(|_| ScanError::Malformed { offset: hash })?;

        self.position = line_end + 1;
        Ok(Some(EntityRecord {
            id,
            type_name,
            start: hash,
            end: line_end + 1,
        }))
    }

    /// Offset of the next token, past whitespace and `/* */` comments.
    fn skip_trivia(&self) -> usize {
        let mut cursor = self.position;
        loop {
            cursor += self.content[cursor..self.end]
                .iter()
                .take_while(|b| b.is_ascii_whitespace())
                .count();
            if !self.content[cursor..self.end].starts_with(b"/*") {
                return cursor;
            }
            match memmem::find(&self.content[cursor + 2..self.end], b"*/") {
                Some(i) => cursor += i + 4,
                None => return self.end,
            }
        }
    }

    /// Offset of the `;` ending the statement starting at `from`, skipping quoted strings.
    fn statement_end(&self, from: usize) -> Result<usize, ScanError> {
        let mut cursor = from;
        let mut quoted = false;
        while cursor < self.end {
            let found = memchr2(b';', b'\'', &self.content[cursor..self.end])
                .ok_or(ScanError::Unterminated { offset: from })?;
            let at = cursor + found;
            match self.content[at] {
                b'\'' => quoted = !quoted,
                _ if !quoted => return Ok(at),
                _ => {}
            }
            cursor = at + 1;
        }
        Err(ScanError::Unterminated { offset: from })
    }
}

/// Counts gathered by a full scan.
#[derive(Debug, Clone, Default)]
pub struct StepSummary {
    pub schema: String,
    pub entity_count: usize,
    pub geometry_ids: Vec<u32>,
    pub type_counts: FxHashMap<String, usize>,
}

/// Scan every entity, calling `on_progress` with the byte offset reached.
pub fn summarize(
    content: &[u8],
    mut on_progress: impl FnMut(usize, usize),
) -> Result<StepSummary, ScanError> {
    let mut scanner = EntityScanner::new(content)?;
    let mut summary = StepSummary {
        schema: file_schema(content).unwrap_or_else(|| "IFC2X3".into()),
        ..StepSummary::default()
    };

    while let Some(record) = scanner.next_entity()? {
        summary.entity_count += 1;
        let type_name = record.type_name.to_ascii_uppercase();
        if has_geometry(&type_name) {
            summary.geometry_ids.push(record.id);
        }
        *summary.type_counts.entry(type_name).or_insert(0) += 1;
        on_progress(scanner.position(), scanner.len());
    }

    if summary.entity_count == 0 {
        return Err(ScanError::Empty);
    }
    Ok(summary)
}
