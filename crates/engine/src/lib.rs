// Template engine: expands an xlsx template against a JSON-like context

pub mod context;
pub mod directive;
mod error;
pub mod expand;
pub mod interpolate;
pub mod merge;
mod templater;
pub mod value;

pub use context::Scope;
pub use directive::{scan_sheet, AttributeTag, Directive, DirectiveInfo, RowDirective};
pub use error::{Result, TemplateError};
pub use interpolate::{InterpolateError, Interpolator, Rendered};
pub use merge::{MergeEntry, MergeRequest, MergeTracker};
pub use templater::{RenderOptions, Templater};
pub use value::{Mapping, Scalar, Value};
