use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::cell::Cell;

/// Column metadata (width in Excel character units)
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ColumnInfo {
    pub width: Option<f64>,
    pub hidden: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Row {
    /// Height in points; None = sheet default
    pub height: Option<f64>,
    pub hidden: bool,
    pub cells: Vec<Cell>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_cell(&mut self) -> &mut Cell {
        self.cells.push(Cell::new());
        let last = self.cells.len() - 1;
        &mut self.cells[last]
    }

    pub fn first_cell(&self) -> Option<&Cell> {
        self.cells.first()
    }

    /// Get a cell, growing the row with empty cells as needed
    pub fn cell_mut(&mut self, col: usize) -> &mut Cell {
        if col >= self.cells.len() {
            self.cells.resize_with(col + 1, Cell::new);
        }
        &mut self.cells[col]
    }

    pub fn is_empty(&self) -> bool {
        self.cells.iter().all(Cell::is_blank)
    }

    /// Copy this row for output: height, hidden flag, and per-cell style,
    /// value, spans and hyperlink. With `wrap_text` every copied cell is
    /// forced to word-wrap.
    pub fn duplicate(&self, wrap_text: bool) -> Row {
        let mut row = Row {
            height: self.height,
            hidden: self.hidden,
            cells: Vec::with_capacity(self.cells.len()),
        };
        for from in &self.cells {
            let to = row.add_cell();
            to.style = from.style.clone();
            if wrap_text {
                to.style.wrap_text = true;
            }
            to.value = from.value.clone();
            to.kind = from.kind;
            to.h_merge = from.h_merge;
            to.v_merge = from.v_merge;
            to.hyperlink = from.hyperlink.clone();
        }
        row
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Sheet {
    pub name: String,
    /// Dense rows: `rows[i]` is worksheet row `i` (0-based)
    pub rows: Vec<Row>,
    pub columns: BTreeMap<u16, ColumnInfo>,
}

impl Sheet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rows: Vec::new(),
            columns: BTreeMap::new(),
        }
    }

    pub fn add_row(&mut self) -> &mut Row {
        self.rows.push(Row::new());
        let last = self.rows.len() - 1;
        &mut self.rows[last]
    }

    /// Get a row, growing the sheet with empty rows as needed
    pub fn row_mut(&mut self, row: usize) -> &mut Row {
        if row >= self.rows.len() {
            self.rows.resize_with(row + 1, Row::new);
        }
        &mut self.rows[row]
    }

    pub fn cell(&self, row: usize, col: usize) -> Option<&Cell> {
        self.rows.get(row).and_then(|r| r.cells.get(col))
    }

    pub fn cell_mut(&mut self, row: usize, col: usize) -> Option<&mut Cell> {
        self.rows.get_mut(row).and_then(|r| r.cells.get_mut(col))
    }

    /// Widest row, in cells
    pub fn max_col(&self) -> usize {
        self.rows.iter().map(|r| r.cells.len()).max().unwrap_or(0)
    }

    pub fn copy_columns_from(&mut self, other: &Sheet) {
        for (col, info) in &other.columns {
            self.columns.insert(*col, info.clone());
        }
    }

    /// Iterate non-blank cells as ((row, col), cell)
    pub fn cells_iter(&self) -> impl Iterator<Item = ((usize, usize), &Cell)> {
        self.rows.iter().enumerate().flat_map(|(r, row)| {
            row.cells
                .iter()
                .enumerate()
                .map(move |(c, cell)| ((r, c), cell))
        })
    }

    /// Cell display values as a grid (handy for tests and inspection)
    pub fn values(&self) -> Vec<Vec<String>> {
        self.rows
            .iter()
            .map(|r| r.cells.iter().map(|c| c.display_text().to_string()).collect())
            .collect()
    }
}
