use thiserror::Error;

/// Everything a template load or render can fail with.
///
/// Row numbers are 1-based, as shown in a spreadsheet.
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("end of range \"{name}\" not found (sheet '{sheet}', row {row})")]
    UnclosedRange { sheet: String, name: String, row: usize },

    #[error("end without a matching range (sheet '{sheet}', row {row})")]
    UnexpectedEnd { sheet: String, row: usize },

    #[error("context property for range \"{name}\" is missing or not a list of objects (sheet '{sheet}', row {row})")]
    RangeContext { sheet: String, name: String, row: usize },

    #[error("template syntax error in {sheet}!{cell} ({text:?}): {message}")]
    Syntax { sheet: String, cell: String, text: String, message: String },

    #[error("template execution failed in {sheet}!{cell}: {message}")]
    Execution { sheet: String, cell: String, message: String },

    #[error(transparent)]
    Io(#[from] xlst_io::Error),

    #[error("report was not generated")]
    NotRendered,

    #[error("no template loaded")]
    NoTemplate,
}

impl TemplateError {
    /// Errors caused by the template's directive structure or cell text
    pub fn is_template_fault(&self) -> bool {
        matches!(
            self,
            TemplateError::UnclosedRange { .. }
                | TemplateError::UnexpectedEnd { .. }
                | TemplateError::Syntax { .. }
                | TemplateError::Execution { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, TemplateError>;
