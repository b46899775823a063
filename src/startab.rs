//! Minimal STAR-style tabular record store.
//!
//! A document is an ordered sequence of named blocks. A *list* block holds a
//! single implicit record rendered as `_tag value` lines; a *loop* block
//! holds many records rendered as a `loop_` header, one `_tag` line per
//! column, and whitespace-separated data rows. Values are kept as text
//! tokens and parsed on access, so a written document reproduces exactly
//! what was set.
//!
//! Only the subset needed by the micrograph motion files is implemented:
//! comments (`#`) and blank lines are skipped, unknown blocks are preserved
//! by the parser and ignored by readers, and duplicate block names keep the
//! first occurrence.

use crate::error::MotionError;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

/// Rendering style of a block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockKind {
    /// One implicit record, `_tag value` per line.
    List,
    /// Many records under a `loop_` header.
    Loop,
}

/// One named block of records.
#[derive(Clone, Debug)]
pub struct StarBlock {
    name: String,
    kind: BlockKind,
    tags: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl StarBlock {
    /// Create an empty list block (a single implicit record).
    pub fn list(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: BlockKind::List,
            tags: Vec::new(),
            rows: vec![Vec::new()],
        }
    }

    /// Create an empty loop block.
    pub fn tabular(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: BlockKind::Loop,
            tags: Vec::new(),
            rows: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> BlockKind {
        self.kind
    }

    /// Number of records. A list block always reports 1.
    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    /// Append an empty record to a loop block. Subsequent `set` calls fill
    /// the new record.
    pub fn add_row(&mut self) {
        debug_assert_eq!(self.kind, BlockKind::Loop, "add_row on a list block");
        self.rows.push(Vec::new());
    }

    /// Set `tag` in the most recent record, registering the column on first
    /// use. Values are stored via their `Display` form; `f64` uses Rust's
    /// shortest exact representation and round-trips precisely.
    pub fn set(&mut self, tag: &str, value: impl std::fmt::Display) {
        let col = match self.tags.iter().position(|t| t == tag) {
            Some(i) => i,
            None => {
                self.tags.push(tag.to_string());
                self.tags.len() - 1
            }
        };
        let row = self
            .rows
            .last_mut()
            .expect("block has no record to set a value in");
        if row.len() <= col {
            row.resize(col + 1, String::new());
        }
        row[col] = value.to_string();
    }

    fn token(&self, row: usize, tag: &str) -> Option<&str> {
        let col = self.tags.iter().position(|t| t == tag)?;
        let value = self.rows.get(row)?.get(col)?;
        if value.is_empty() {
            None
        } else {
            Some(value)
        }
    }

    /// Optional string field; `None` when the tag is absent.
    pub fn get_str(&self, row: usize, tag: &str) -> Option<&str> {
        self.token(row, tag)
    }

    /// Optional real field; `None` when the tag is absent or unparsable.
    pub fn get_f64(&self, row: usize, tag: &str) -> Option<f64> {
        self.token(row, tag)?.parse().ok()
    }

    /// Optional integer field; `None` when the tag is absent or unparsable.
    pub fn get_i64(&self, row: usize, tag: &str) -> Option<i64> {
        self.token(row, tag)?.parse().ok()
    }

    /// Required string field.
    pub fn require_str(&self, row: usize, tag: &str) -> Result<&str, MotionError> {
        self.token(row, tag)
            .ok_or_else(|| MotionError::malformed(&self.name, format!("missing field {tag}")))
    }

    /// Required real field.
    pub fn require_f64(&self, row: usize, tag: &str) -> Result<f64, MotionError> {
        self.require_str(row, tag)?.parse().map_err(|_| {
            MotionError::malformed(&self.name, format!("field {tag} is not a real number"))
        })
    }

    /// Required integer field.
    pub fn require_i64(&self, row: usize, tag: &str) -> Result<i64, MotionError> {
        self.require_str(row, tag)?.parse().map_err(|_| {
            MotionError::malformed(&self.name, format!("field {tag} is not an integer"))
        })
    }

    fn render(&self, out: &mut String) {
        let _ = writeln!(out, "data_{}", self.name);
        let _ = writeln!(out);
        match self.kind {
            BlockKind::List => {
                if let Some(row) = self.rows.first() {
                    for (tag, value) in self.tags.iter().zip(row.iter()) {
                        let _ = writeln!(out, "{tag:<35} {value}");
                    }
                }
            }
            BlockKind::Loop => {
                let _ = writeln!(out, "loop_");
                for (i, tag) in self.tags.iter().enumerate() {
                    let _ = writeln!(out, "{tag} #{}", i + 1);
                }
                for row in &self.rows {
                    let mut line = String::new();
                    for value in row {
                        let _ = write!(line, "{value:>12} ");
                    }
                    let _ = writeln!(out, "{}", line.trim_end());
                }
            }
        }
        let _ = writeln!(out);
    }
}

/// An ordered collection of blocks backed by a text file.
#[derive(Clone, Debug, Default)]
pub struct StarDocument {
    blocks: Vec<StarBlock>,
}

impl StarDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, block: StarBlock) {
        self.blocks.push(block);
    }

    /// First block with the given name, if any.
    pub fn block(&self, name: &str) -> Option<&StarBlock> {
        self.blocks.iter().find(|b| b.name == name)
    }

    pub fn blocks(&self) -> &[StarBlock] {
        &self.blocks
    }

    /// Parse a document from text. Tag headers may carry `#n` column
    /// annotations; data rows with fewer tokens than columns leave the
    /// trailing fields absent.
    pub fn parse(text: &str) -> Result<Self, MotionError> {
        let mut blocks: Vec<StarBlock> = Vec::new();
        let mut in_loop_header = false;

        for raw in text.lines() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some(name) = line.strip_prefix("data_") {
                blocks.push(StarBlock::list(name));
                in_loop_header = false;
                continue;
            }

            let current = blocks.last_mut().ok_or_else(|| {
                MotionError::malformed("<document>", "content before the first data_ block")
            })?;

            if line == "loop_" {
                current.kind = BlockKind::Loop;
                current.rows.clear();
                in_loop_header = true;
                continue;
            }

            if let Some(rest) = line.strip_prefix('_') {
                let mut parts = rest.split_whitespace();
                let tag = format!("_{}", parts.next().unwrap_or_default());
                match current.kind {
                    BlockKind::Loop => {
                        if !in_loop_header {
                            return Err(MotionError::malformed(
                                &current.name,
                                format!("tag {tag} after loop data rows"),
                            ));
                        }
                        current.tags.push(tag);
                    }
                    BlockKind::List => {
                        let value: Vec<&str> = parts.filter(|p| !p.starts_with('#')).collect();
                        current.tags.push(tag);
                        current.rows[0].push(value.join(" "));
                    }
                }
                continue;
            }

            // Data row of a loop block.
            if current.kind != BlockKind::Loop {
                return Err(MotionError::malformed(
                    &current.name,
                    format!("unexpected line `{line}` in a list block"),
                ));
            }
            if current.tags.is_empty() {
                return Err(MotionError::malformed(
                    &current.name,
                    "loop data row before any column tags",
                ));
            }
            in_loop_header = false;
            current
                .rows
                .push(line.split_whitespace().map(str::to_string).collect());
        }

        // Duplicate names keep the first occurrence.
        let mut seen: Vec<String> = Vec::new();
        blocks.retain(|b| {
            if seen.contains(&b.name) {
                false
            } else {
                seen.push(b.name.clone());
                true
            }
        });

        Ok(Self { blocks })
    }

    /// Read and parse a document from `path`.
    pub fn read_from(path: &Path) -> Result<Self, MotionError> {
        let text = fs::read_to_string(path).map_err(|e| MotionError::file_access(path, e))?;
        Self::parse(&text)
    }

    /// Render the document to text.
    pub fn to_star_string(&self) -> String {
        let mut out = String::new();
        for block in &self.blocks {
            block.render(&mut out);
        }
        out
    }

    /// Write the rendered document to `path`.
    pub fn write_to(&self, path: &Path) -> Result<(), MotionError> {
        fs::write(path, self.to_star_string()).map_err(|e| MotionError::file_access(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> StarDocument {
        let mut doc = StarDocument::new();
        let mut general = StarBlock::list("general");
        general.set("_rlnImageSizeX", 1024);
        general.set("_rlnImageSizeY", 1024);
        general.set("_rlnMicrographMovieName", "movie.mrcs");
        doc.push(general);

        let mut shifts = StarBlock::tabular("global_shift");
        for frame in 1..=3 {
            shifts.add_row();
            shifts.set("_rlnMicrographFrameNumber", frame);
            shifts.set("_rlnMicrographShiftX", 0.125 * frame as f64);
            shifts.set("_rlnMicrographShiftY", -0.5);
        }
        doc.push(shifts);
        doc
    }

    #[test]
    fn print_parse_round_trip() {
        let doc = sample();
        let reparsed = StarDocument::parse(&doc.to_star_string()).unwrap();

        let general = reparsed.block("general").unwrap();
        assert_eq!(general.kind(), BlockKind::List);
        assert_eq!(general.require_i64(0, "_rlnImageSizeX").unwrap(), 1024);
        assert_eq!(
            general.require_str(0, "_rlnMicrographMovieName").unwrap(),
            "movie.mrcs"
        );

        let shifts = reparsed.block("global_shift").unwrap();
        assert_eq!(shifts.kind(), BlockKind::Loop);
        assert_eq!(shifts.n_rows(), 3);
        assert_eq!(shifts.require_f64(1, "_rlnMicrographShiftX").unwrap(), 0.25);
        assert_eq!(shifts.require_f64(2, "_rlnMicrographShiftY").unwrap(), -0.5);
    }

    #[test]
    fn missing_field_reports_block_and_tag() {
        let doc = sample();
        let general = doc.block("general").unwrap();
        assert!(general.get_f64(0, "_rlnVoltage").is_none());
        let err = general.require_f64(0, "_rlnVoltage").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("general") && msg.contains("_rlnVoltage"), "{msg}");
    }

    #[test]
    fn duplicate_blocks_keep_first() {
        let text = "data_a\n\n_x 1\n\ndata_a\n\n_x 2\n";
        let doc = StarDocument::parse(text).unwrap();
        assert_eq!(doc.blocks().len(), 1);
        assert_eq!(doc.block("a").unwrap().require_i64(0, "_x").unwrap(), 1);
    }

    #[test]
    fn content_before_first_block_is_rejected() {
        assert!(StarDocument::parse("_x 1\n").is_err());
    }

    #[test]
    fn loop_tags_strip_column_annotations() {
        let text = "data_t\n\nloop_\n_a #1\n_b #2\n1 2.5\n";
        let doc = StarDocument::parse(text).unwrap();
        let t = doc.block("t").unwrap();
        assert_eq!(t.require_i64(0, "_a").unwrap(), 1);
        assert_eq!(t.require_f64(0, "_b").unwrap(), 2.5);
    }
}
