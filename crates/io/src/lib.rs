// File I/O operations

mod error;
pub mod xlsx;
pub mod xlsx_styles;

pub use error::{Error, Result};
pub use xlsx::{read_workbook, read_workbook_from_bytes, workbook_to_bytes, write_workbook, write_workbook_to, WriteReport};
