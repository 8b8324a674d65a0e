//! Vertical merge runs collected while rendering.
//!
//! Cells tagged `{{NAME merge:true}}` report their rendered text here. The
//! first cell to produce a given text within a (sheet, group) becomes the
//! anchor; later cells with the same text only bump its count. `finalize`
//! then gives every anchor a thin border and a vertical span of `count`.

use std::collections::BTreeMap;

use xlst_core::{BorderStyle, Workbook};

/// Merge tagging extracted from a cell's attribute tags
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeRequest {
    pub group: String,
    pub header: bool,
    pub attrs: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeEntry {
    /// (row, col) in the output sheet
    pub anchor: (usize, usize),
    pub count: u32,
    pub attrs: Vec<(String, String)>,
}

type Groups = BTreeMap<String, BTreeMap<String, MergeEntry>>;

#[derive(Debug, Default)]
pub struct MergeTracker {
    sheets: BTreeMap<String, Groups>,
}

impl MergeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget every run; called at the start of each render
    pub fn reset(&mut self) {
        self.sheets.clear();
    }

    pub fn record(&mut self, sheet: &str, request: &MergeRequest, value: &str, anchor: (usize, usize)) {
        let runs = self
            .sheets
            .entry(sheet.to_string())
            .or_default()
            .entry(request.group.clone())
            .or_default();

        match runs.get_mut(value) {
            Some(entry) => entry.count += 1,
            None => {
                runs.insert(
                    value.to_string(),
                    MergeEntry {
                        anchor,
                        count: if request.header { 1 } else { 0 },
                        attrs: request.attrs.clone(),
                    },
                );
            }
        }
    }

    pub fn entry(&self, sheet: &str, group: &str, value: &str) -> Option<&MergeEntry> {
        self.sheets.get(sheet)?.get(group)?.get(value)
    }

    /// Total tracked runs across all sheets and groups
    pub fn len(&self) -> usize {
        self.sheets
            .values()
            .flat_map(|groups| groups.values())
            .map(BTreeMap::len)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Apply borders and spans to every anchor. Returns the number of anchor
    /// cells updated. Running it again on the same workbook changes nothing.
    pub fn finalize(&self, workbook: &mut Workbook) -> usize {
        let mut touched = 0;
        for (sheet_name, groups) in &self.sheets {
            let Some(sheet) = workbook.sheet_mut(sheet_name) else {
                log::warn!("merge runs recorded for unknown sheet '{}'", sheet_name);
                continue;
            };
            for entry in groups.values().flat_map(BTreeMap::values) {
                let (row, col) = entry.anchor;
                if let Some(cell) = sheet.cell_mut(row, col) {
                    cell.style.set_all_borders(BorderStyle::Thin);
                    cell.v_merge = entry.count;
                    touched += 1;
                }
            }
        }
        touched
    }
}
