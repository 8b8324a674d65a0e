//! Directive recognition in template cell text.
//!
//! Row directives live in the cells of a row: `{{range NAME}}` and `{{end}}`
//! must be the whole text of the row's first cell, a `{{NAME.FIELD}}`
//! reference anywhere in the row makes it a list row. Attribute tags
//! (`{{NAME key:value;key:value}}`) can appear in any cell and are rewritten
//! to a bare `{{NAME}}` before interpolation.

use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::Serialize;
use xlst_core::address::cell_address;
use xlst_core::{Row, Sheet};

static RANGE_START: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*\{\{\s*range\s+(\w+)\s*\}\}\s*$").unwrap());
static RANGE_END: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*\{\{\s*end\s*\}\}\s*$").unwrap());
static LIST_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{\s*(\w+)\.\w+(?:\s+(?:\w+:\w+;?\s*)*)?\s*\}\}").unwrap());
static TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{\s*(\w+(?:\.\w+)?)(?:\s+((?:\w+:\w+;?\s*)*))?\s*\}\}").unwrap()
});
static ATTR: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\w+):(\w+)").unwrap());
static EXPRESSION: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)\{\{(.*?)\}\}").unwrap());
static NAME_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\[([^\]]*)\]|([^\s{}()=./"'\[\]~#^>!&|,]+)"#).unwrap());

/// How a template row expands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowDirective {
    RangeStart(String),
    RangeEnd,
    List(String),
    Plain,
}

fn first_cell_text(row: &Row) -> Option<&str> {
    row.first_cell().map(|c| c.value.as_str())
}

/// Name of the range opened by this row, if its first cell is `{{range NAME}}`
pub fn range_start(row: &Row) -> Option<&str> {
    let text = first_cell_text(row)?;
    RANGE_START.captures(text).and_then(|c| c.get(1)).map(|m| m.as_str())
}

pub fn is_range_end(row: &Row) -> bool {
    first_cell_text(row).is_some_and(|text| RANGE_END.is_match(text))
}

/// Sequence name of the first `{{NAME.FIELD}}` reference in the row
pub fn list_marker(row: &Row) -> Option<&str> {
    row.cells
        .iter()
        .map(|c| c.display_text())
        .filter(|text| !text.is_empty())
        .find_map(|text| LIST_MARKER.captures(text).and_then(|c| c.get(1)).map(|m| m.as_str()))
}

/// Classify a row, range markers first, then list markers.
pub fn classify_row(row: &Row) -> RowDirective {
    if let Some(name) = range_start(row) {
        return RowDirective::RangeStart(name.to_string());
    }
    if is_range_end(row) {
        return RowDirective::RangeEnd;
    }
    match list_marker(row) {
        Some(name) => RowDirective::List(name.to_string()),
        None => RowDirective::Plain,
    }
}

/// Index of the `end` closing a range whose body starts at `rows[0]`.
///
/// Nested range starts must be closed before the outer one can be.
pub fn find_range_end(rows: &[Row]) -> Option<usize> {
    let mut nesting = 0usize;
    for (idx, row) in rows.iter().enumerate() {
        if is_range_end(row) {
            if nesting == 0 {
                return Some(idx);
            }
            nesting -= 1;
        } else if range_start(row).is_some() {
            nesting += 1;
        }
    }
    None
}

/// Context names a block of rows can read.
///
/// Rendering serializes only these entries of a scope. Every word inside a
/// `{{...}}` expression counts, so the set is a superset of the real lookups;
/// `this`, `@root` or a bare `.` make the whole scope visible.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NameSet {
    names: BTreeSet<String>,
    everything: bool,
}

impl NameSet {
    pub fn everything() -> Self {
        Self { names: BTreeSet::new(), everything: true }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.everything || self.names.contains(name)
    }

    pub fn is_everything(&self) -> bool {
        self.everything
    }

    fn add_expression(&mut self, expr: &str) {
        if expr.trim() == "." {
            self.everything = true;
            return;
        }
        for caps in NAME_TOKEN.captures_iter(expr) {
            let Some(token) = caps.get(1).or_else(|| caps.get(2)) else { continue };
            match token.as_str() {
                "this" | "@root" => self.everything = true,
                name => {
                    self.names.insert(name.to_string());
                }
            }
        }
    }
}

/// Collect the names referenced anywhere in `rows`, nested blocks included.
///
/// `range`/`end` rows are skipped: the sequence a range walks is read
/// through the scope, never rendered.
pub fn referenced_names(rows: &[Row]) -> NameSet {
    let mut set = NameSet::default();
    let rendered = rows.iter().filter(|r| range_start(r).is_none() && !is_range_end(r));
    for cell in rendered.flat_map(|r| r.cells.iter()) {
        for caps in EXPRESSION.captures_iter(cell.display_text()) {
            set.add_expression(&caps[1]);
        }
    }
    set
}

/// A `{{NAME attr:value;...}}` tag found in a cell
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AttributeTag {
    pub name: String,
    pub attrs: Vec<(String, String)>,
}

impl AttributeTag {
    /// Look up an attribute; later entries win
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// `merge:false`, `merge:0` and `merge:no` leave merging off
    pub fn is_merge(&self) -> bool {
        self.attr("merge").is_some_and(attr_enabled)
    }

    pub fn is_header(&self) -> bool {
        self.attr("header").is_some_and(attr_enabled)
    }
}

fn attr_enabled(value: &str) -> bool {
    !matches!(value.to_ascii_lowercase().as_str(), "false" | "0" | "no")
}

/// Strip attribute syntax from every tag in `text`.
///
/// Returns the text with each tag rewritten to `{{NAME}}` and the tags in
/// order of appearance (plain tags included, with no attributes).
pub fn parse_tags(text: &str) -> (String, Vec<AttributeTag>) {
    let mut tags = Vec::new();
    let rewritten = TAG.replace_all(text, |caps: &Captures| {
        let name = caps[1].to_string();
        let attrs = caps
            .get(2)
            .map(|m| {
                ATTR.captures_iter(m.as_str())
                    .map(|kv| (kv[1].to_string(), kv[2].to_string()))
                    .collect()
            })
            .unwrap_or_default();
        let bare = format!("{{{{{}}}}}", name);
        tags.push(AttributeTag { name, attrs });
        bare
    });
    (rewritten.into_owned(), tags)
}

/// What `scan_sheet` found on one row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Directive {
    RangeStart { name: String, depth: usize },
    RangeEnd { depth: usize },
    List { name: String },
    Tag { cell: String, name: String, merge: bool, header: bool },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirectiveInfo {
    /// 1-based row number
    pub row: usize,
    #[serde(flatten)]
    pub directive: Directive,
}

/// List every directive in a template sheet, top to bottom.
pub fn scan_sheet(sheet: &Sheet) -> Vec<DirectiveInfo> {
    let mut found = Vec::new();
    let mut depth = 0usize;

    for (idx, row) in sheet.rows.iter().enumerate() {
        let row_no = idx + 1;
        match classify_row(row) {
            RowDirective::RangeStart(name) => {
                found.push(DirectiveInfo { row: row_no, directive: Directive::RangeStart { name, depth } });
                depth += 1;
                continue;
            }
            RowDirective::RangeEnd => {
                depth = depth.saturating_sub(1);
                found.push(DirectiveInfo { row: row_no, directive: Directive::RangeEnd { depth } });
                continue;
            }
            RowDirective::List(name) => {
                found.push(DirectiveInfo { row: row_no, directive: Directive::List { name } });
            }
            RowDirective::Plain => {}
        }

        for (col, cell) in row.cells.iter().enumerate() {
            let (_, tags) = parse_tags(cell.display_text());
            for tag in tags.into_iter().filter(|t| !t.attrs.is_empty()) {
                found.push(DirectiveInfo {
                    row: row_no,
                    directive: Directive::Tag {
                        cell: cell_address(idx, col),
                        merge: tag.is_merge(),
                        header: tag.is_header(),
                        name: tag.name,
                    },
                });
            }
        }
    }

    found
}
