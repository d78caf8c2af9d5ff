//! GEDCOM line grammar and record tree
//!
//! Every line is `LEVEL [@XREF@] TAG [VALUE]`. Lines are grouped into
//! level-0 records; a bad line marks its whole record as malformed while
//! the rest of the file still parses.

use nom::{
    bytes::complete::{take_while1, take_while_m_n},
    character::complete::{char, space1},
    combinator::{all_consuming, map_res, opt, rest},
    sequence::{delimited, preceded, terminated, tuple},
    IResult,
};
use serde::{Deserialize, Serialize};

const BOM: char = '\u{feff}';

/// A problem with the source, tied to the line it was found on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportWarning {
    pub line: usize,
    pub reason: String,
}

impl ImportWarning {
    pub fn new(line: usize, reason: impl Into<String>) -> Self {
        Self {
            line,
            reason: reason.into(),
        }
    }
}

/// One tokenized line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GedcomLine {
    pub line: usize,
    pub level: u32,
    pub xref: Option<String>,
    pub tag: String,
    pub value: Option<String>,
}

/// A line with its subordinate lines
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GedcomNode {
    pub line: usize,
    pub level: u32,
    pub xref: Option<String>,
    pub tag: String,
    pub value: Option<String>,
    pub children: Vec<GedcomNode>,
}

impl GedcomNode {
    fn leaf(line: GedcomLine) -> Self {
        Self {
            line: line.line,
            level: line.level,
            xref: line.xref,
            tag: line.tag,
            value: line.value,
            children: Vec::new(),
        }
    }

    /// First child with this tag
    pub fn child(&self, tag: &str) -> Option<&GedcomNode> {
        self.children.iter().find(|c| c.tag == tag)
    }

    /// All children with this tag, in line order
    pub fn children_with<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a GedcomNode> + 'a {
        self.children.iter().filter(move |c| c.tag == tag)
    }

    /// Trimmed, non-empty value of the first child with this tag
    pub fn child_value(&self, tag: &str) -> Option<&str> {
        self.child(tag)
            .and_then(|c| c.value.as_deref())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }

    /// Pointer value (`@X1@`) without the delimiters
    pub fn pointer(&self) -> Option<&str> {
        let value = self.value.as_deref()?.trim();
        value
            .strip_prefix('@')
            .and_then(|v| v.strip_suffix('@'))
            .filter(|v| !v.is_empty() && !v.contains('@'))
    }
}

/// A level-0 record, well-formed or not
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GedcomRecord {
    pub node: GedcomNode,
    /// First structural problem found inside the record
    pub malformed: Option<ImportWarning>,
}

/// Tokenized source
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GedcomDocument {
    pub records: Vec<GedcomRecord>,
    /// Problems outside any record
    pub warnings: Vec<ImportWarning>,
}

// =========================================================================
// Line grammar
// =========================================================================

fn level(input: &str) -> IResult<&str, u32> {
    map_res(take_while_m_n(1, 2, |c: char| c.is_ascii_digit()), |s: &str| {
        s.parse::<u32>()
    })(input)
}

fn xref(input: &str) -> IResult<&str, &str> {
    delimited(char('@'), take_while1(|c: char| c != '@' && c != ' '), char('@'))(input)
}

fn tag(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_ascii_alphanumeric() || c == '_')(input)
}

fn line_parts(input: &str) -> IResult<&str, (u32, Option<&str>, &str, Option<&str>)> {
    all_consuming(tuple((
        terminated(level, space1),
        opt(terminated(xref, space1)),
        tag,
        opt(preceded(char(' '), rest)),
    )))(input)
}

/// Tokenize one physical line (without its line terminator)
pub fn parse_line(line_no: usize, raw: &str) -> Result<GedcomLine, ImportWarning> {
    let (_, (level, xref, tag, value)) = line_parts(raw.trim_start())
        .map_err(|_| ImportWarning::new(line_no, format!("unparseable line: {:?}", raw.trim())))?;

    Ok(GedcomLine {
        line: line_no,
        level,
        xref: xref.map(str::to_string),
        tag: tag.to_ascii_uppercase(),
        value: value.filter(|v| !v.is_empty()).map(str::to_string),
    })
}

// =========================================================================
// Record assembly
// =========================================================================

struct RecordBuilder {
    lines: Vec<GedcomLine>,
    last_level: u32,
    malformed: Option<ImportWarning>,
}

impl RecordBuilder {
    fn new(first: GedcomLine) -> Self {
        Self {
            last_level: first.level,
            lines: vec![first],
            malformed: None,
        }
    }

    fn poison(&mut self, warning: ImportWarning) {
        if self.malformed.is_none() {
            self.malformed = Some(warning);
        }
    }

    fn push(&mut self, line: GedcomLine) {
        if line.level > self.last_level + 1 {
            self.poison(ImportWarning::new(
                line.line,
                format!("level jumps from {} to {}", self.last_level, line.level),
            ));
            return;
        }
        self.last_level = line.level;
        self.lines.push(line);
    }

    fn finish(self) -> GedcomRecord {
        GedcomRecord {
            node: build_tree(self.lines),
            malformed: self.malformed,
        }
    }
}

/// Fold a record's lines into a tree, joining CONC/CONT into their parent
fn build_tree(lines: Vec<GedcomLine>) -> GedcomNode {
    let mut lines = lines.into_iter();
    let mut stack: Vec<GedcomNode> = Vec::new();
    if let Some(first) = lines.next() {
        stack.push(GedcomNode::leaf(first));
    }

    for line in lines {
        while stack.len() > 1 && stack.last().map_or(false, |n| n.level >= line.level) {
            if let Some(done) = stack.pop() {
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(done);
                }
            }
        }

        let Some(parent) = stack.last_mut() else { break };
        match line.tag.as_str() {
            "CONC" => {
                let value = parent.value.get_or_insert_with(String::new);
                value.push_str(line.value.as_deref().unwrap_or_default());
            }
            "CONT" => {
                let value = parent.value.get_or_insert_with(String::new);
                value.push('\n');
                value.push_str(line.value.as_deref().unwrap_or_default());
            }
            _ => stack.push(GedcomNode::leaf(line)),
        }
    }

    while stack.len() > 1 {
        if let Some(done) = stack.pop() {
            if let Some(parent) = stack.last_mut() {
                parent.children.push(done);
            }
        }
    }
    stack.pop().unwrap_or_else(|| GedcomNode {
        line: 0,
        level: 0,
        xref: None,
        tag: String::new(),
        value: None,
        children: Vec::new(),
    })
}

/// Tokenize a whole GEDCOM text into records
pub fn parse_document(text: &str) -> GedcomDocument {
    let text = text.strip_prefix(BOM).unwrap_or(text);
    let mut document = GedcomDocument::default();
    let mut current: Option<RecordBuilder> = None;

    // `lines` already drops a trailing `\r`
    for (idx, raw) in text.lines().enumerate() {
        let line_no = idx + 1;
        if raw.trim().is_empty() {
            continue;
        }

        match parse_line(line_no, raw) {
            Ok(line) if line.level == 0 => {
                if let Some(record) = current.take() {
                    document.records.push(record.finish());
                }
                current = Some(RecordBuilder::new(line));
            }
            Ok(line) => match current.as_mut() {
                Some(record) => record.push(line),
                None => document.warnings.push(ImportWarning::new(
                    line_no,
                    format!("level {} line outside any record", line.level),
                )),
            },
            Err(warning) => match current.as_mut() {
                Some(record) => record.poison(warning),
                None => document.warnings.push(warning),
            },
        }
    }

    if let Some(record) = current {
        document.records.push(record.finish());
    }
    document
}
