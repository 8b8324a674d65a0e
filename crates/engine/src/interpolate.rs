// Cell text interpolation through handlebars

use handlebars::{Context, Handlebars};
use serde::Serialize;
use thiserror::Error;

use crate::context::Scope;
use crate::directive::{self, AttributeTag};
use crate::merge::MergeRequest;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InterpolateError {
    #[error("{0}")]
    Syntax(String),
    #[error("{0}")]
    Execution(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub text: String,
    /// Set when the cell's tags turn merge tracking on
    pub group: Option<MergeRequest>,
}

/// Renders cell text against a scope.
///
/// Compiled templates are cached by their text, so list rows and range
/// blocks only parse each distinct cell once.
pub struct Interpolator {
    registry: Handlebars<'static>,
}

impl Default for Interpolator {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpolator {
    pub fn new() -> Self {
        let mut registry = Handlebars::new();
        // Missing names render as empty text
        registry.set_strict_mode(false);
        Self { registry }
    }

    /// Drop cached templates
    pub fn clear(&mut self) {
        self.registry.clear_templates();
    }

    /// Serialize render data once for rendering several cells against it
    pub fn context<T: Serialize>(data: &T) -> Result<Context, InterpolateError> {
        Context::wraps(data).map_err(|e| InterpolateError::Execution(e.to_string()))
    }

    pub fn render(&mut self, text: &str, scope: &Scope) -> Result<Rendered, InterpolateError> {
        let data = Self::context(scope)?;
        self.render_in(text, &data)
    }

    pub fn render_in(&mut self, text: &str, data: &Context) -> Result<Rendered, InterpolateError> {
        let (bare, tags) = directive::parse_tags(text);
        let source = triple_braces(&bare);

        if !self.registry.has_template(&source) {
            self.registry
                .register_template_string(&source, &source)
                .map_err(|e| InterpolateError::Syntax(e.to_string()))?;
        }
        let text = self
            .registry
            .render_with_context(&source, data)
            .map_err(|e| InterpolateError::Execution(e.to_string()))?;

        Ok(Rendered { text, group: merge_request(tags) })
    }
}

/// `{{x}}` → `{{{x}}}` so substitutions are not HTML-escaped
fn triple_braces(text: &str) -> String {
    text.replace("{{", "{{{").replace("}}", "}}}")
}

/// Attributes accumulate over all tags in a cell; the last tag names the group.
fn merge_request(tags: Vec<AttributeTag>) -> Option<MergeRequest> {
    let name = tags.last()?.name.clone();
    let combined = AttributeTag {
        name,
        attrs: tags.into_iter().flat_map(|t| t.attrs).collect(),
    };
    if !combined.is_merge() {
        return None;
    }
    Some(MergeRequest {
        header: combined.is_header(),
        group: combined.name,
        attrs: combined.attrs,
    })
}
