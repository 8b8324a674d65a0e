use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to read xlsx archive: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("failed to read workbook: {0}")]
    Read(#[from] calamine::XlsxError),

    #[error("failed to write workbook: {0}")]
    Write(#[from] rust_xlsxwriter::XlsxError),

    #[error("invalid workbook: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, Error>;
