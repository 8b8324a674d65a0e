// Document model shared by the reader, the writer and the template engine

pub mod address;
pub mod cell;
pub mod sheet;
pub mod workbook;

pub use cell::{Alignment, BorderStyle, Cell, CellBorder, CellStyle, Hyperlink, NumberFormat, ValueKind, VerticalAlignment};
pub use sheet::{ColumnInfo, Row, Sheet};
pub use workbook::Workbook;
