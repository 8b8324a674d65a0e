use serde::{Deserialize, Serialize};

/// Horizontal text alignment
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum Alignment {
    #[default]
    General,
    Left,
    Center,
    Right,
    CenterAcrossSelection,
}

/// Vertical text alignment
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum VerticalAlignment {
    Top,
    Middle,
    #[default]
    Bottom,
}

/// Border line weight
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum BorderStyle {
    #[default]
    None,
    Thin,
    Medium,
    Thick,
}

/// One side of a cell border
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CellBorder {
    pub style: BorderStyle,
    /// RGBA; None = automatic
    pub color: Option<[u8; 4]>,
}

/// Number format attached to a cell.
///
/// Built-in formats keep their xlsx index so they survive a load/save cycle
/// without being re-spelled as format codes.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum NumberFormat {
    #[default]
    General,
    Builtin(u8),
    Custom(String),
}

/// Cell formatting options
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CellStyle {
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
    pub strikethrough: bool,
    pub font_size: Option<f32>,
    pub font_color: Option<[u8; 4]>,
    pub font_family: Option<String>,
    pub alignment: Alignment,
    pub vertical_alignment: VerticalAlignment,
    pub wrap_text: bool,
    pub background_color: Option<[u8; 4]>,
    pub border_top: CellBorder,
    pub border_right: CellBorder,
    pub border_bottom: CellBorder,
    pub border_left: CellBorder,
    pub number_format: NumberFormat,
    /// Protection "hidden" flag
    pub hidden: bool,
}

impl CellStyle {
    /// Set the same border on all four sides
    pub fn set_all_borders(&mut self, style: BorderStyle) {
        let border = CellBorder { style, color: None };
        self.border_top = border;
        self.border_right = border;
        self.border_bottom = border;
        self.border_left = border;
    }

    /// True when nothing differs from the default style
    pub fn is_default(&self) -> bool {
        *self == CellStyle::default()
    }
}

/// What kind of value the template cell held when it was read
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum ValueKind {
    #[default]
    Empty,
    Text,
    Number,
    Bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Hyperlink {
    /// URL, or `internal:Sheet!A1` for links inside the workbook
    pub target: String,
    pub display: Option<String>,
    pub tooltip: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Cell {
    pub value: String,
    pub kind: ValueKind,
    pub style: CellStyle,
    /// Additional columns spanned to the right (0 = not merged)
    pub h_merge: u32,
    /// Additional rows spanned downward (0 = not merged)
    pub v_merge: u32,
    pub hyperlink: Option<Hyperlink>,
}

impl Cell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(value: impl Into<String>) -> Self {
        let value = value.into();
        let kind = if value.is_empty() { ValueKind::Empty } else { ValueKind::Text };
        Self { value, kind, ..Self::default() }
    }

    /// Replace the value, keeping style, spans and kind.
    ///
    /// An empty cell that receives text becomes a text cell.
    pub fn set_value(&mut self, value: impl Into<String>) {
        self.value = value.into();
        if self.kind == ValueKind::Empty && !self.value.is_empty() {
            self.kind = ValueKind::Text;
        }
    }

    /// Text shown in the cell: hyperlink display text wins over the value
    pub fn display_text(&self) -> &str {
        match &self.hyperlink {
            Some(Hyperlink { display: Some(display), .. }) => display,
            _ => &self.value,
        }
    }

    pub fn is_blank(&self) -> bool {
        self.value.is_empty() && self.hyperlink.is_none()
    }

    pub fn is_merge_anchor(&self) -> bool {
        self.h_merge > 0 || self.v_merge > 0
    }
}
