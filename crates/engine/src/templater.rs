use std::io::Write;
use std::path::Path;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use xlst_core::Workbook;
use xlst_io::WriteReport;

use crate::context;
use crate::error::{Result, TemplateError};
use crate::expand::render_sheet;
use crate::interpolate::Interpolator;
use crate::merge::MergeTracker;
use crate::value::Value;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderOptions {
    /// Force word-wrap on every output cell
    pub wrap_text_in_all_cells: bool,
}

#[derive(Default)]
struct State {
    template: Option<Workbook>,
    report: Option<Workbook>,
    merges: MergeTracker,
    interpolator: Interpolator,
}

/// Loads an xlsx template and renders reports from it.
///
/// The template is never modified; each render builds a fresh report
/// workbook. One instance can be shared between threads, calls on it are
/// serialized.
#[derive(Default)]
pub struct Templater {
    state: Mutex<State>,
}

impl Templater {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let templater = Self::new();
        templater.read_template(path)?;
        Ok(templater)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let templater = Self::new();
        templater.read_template_bytes(bytes)?;
        Ok(templater)
    }

    /// Wrap an in-memory template
    pub fn from_workbook(template: Workbook) -> Self {
        let templater = Self::new();
        templater.load(template);
        templater
    }

    pub fn read_template(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let template = xlst_io::read_workbook(path)?;
        log::info!("loaded template {} ({} sheets)", path.display(), template.sheet_count());
        self.load(template);
        Ok(())
    }

    pub fn read_template_bytes(&self, bytes: &[u8]) -> Result<()> {
        let template = xlst_io::read_workbook_from_bytes(bytes)?;
        log::info!("loaded template from {} bytes ({} sheets)", bytes.len(), template.sheet_count());
        self.load(template);
        Ok(())
    }

    fn load(&self, template: Workbook) {
        let mut state = self.state.lock();
        state.template = Some(template);
        state.report = None;
        state.merges.reset();
        state.interpolator.clear();
    }

    pub fn template(&self) -> Option<Workbook> {
        self.state.lock().template.clone()
    }

    /// The last successfully rendered report
    pub fn report(&self) -> Option<Workbook> {
        self.state.lock().report.clone()
    }

    pub fn render(&self, data: &Value) -> Result<()> {
        self.render_with_options(data, &RenderOptions::default())
    }

    /// Render every template sheet, in order, into a new report.
    ///
    /// On failure the previous report is gone too, so nothing partial can be
    /// saved.
    pub fn render_with_options(&self, data: &Value, options: &RenderOptions) -> Result<()> {
        let mut guard = self.state.lock();
        let State { template, report, merges, interpolator } = &mut *guard;

        *report = None;
        merges.reset();
        let template = template.as_ref().ok_or(TemplateError::NoTemplate)?;

        let mut out = Workbook::new();
        for (idx, sheet) in template.sheets().iter().enumerate() {
            let mut scope = context::resolve(data, idx);
            let target = out.add_sheet(sheet.name.clone());
            render_sheet(sheet, &mut scope, target, interpolator, merges, options)?;
        }
        let anchors = merges.finalize(&mut out);

        log::info!("rendered {} sheets, {} merge anchors", out.sheet_count(), anchors);
        *report = Some(out);
        Ok(())
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<WriteReport> {
        let state = self.state.lock();
        let report = state.report.as_ref().ok_or(TemplateError::NotRendered)?;
        Ok(xlst_io::write_workbook(report, path)?)
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> Result<WriteReport> {
        let state = self.state.lock();
        let report = state.report.as_ref().ok_or(TemplateError::NotRendered)?;
        Ok(xlst_io::write_workbook_to(report, writer)?)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let state = self.state.lock();
        let report = state.report.as_ref().ok_or(TemplateError::NotRendered)?;
        Ok(xlst_io::workbook_to_bytes(report)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use xlst_core::{BorderStyle, Cell, Row, Sheet};

    fn row(cells: &[&str]) -> Row {
        Row { cells: cells.iter().map(|v| Cell::text(*v)).collect(), ..Row::default() }
    }

    fn people_template() -> Workbook {
        Workbook::from_sheets(vec![Sheet {
            name: "People".into(),
            rows: vec![
                row(&["Dept", "Name"]),
                row(&["{{people.dept merge:true;header:true}}", "{{people.name}}"]),
            ],
            ..Sheet::default()
        }])
    }

    fn data(people: serde_json::Value) -> Value {
        Value::from(json!({ "people": people }))
    }

    #[test]
    fn test_save_before_render_fails() {
        let t = Templater::from_workbook(people_template());
        assert!(matches!(t.to_bytes(), Err(TemplateError::NotRendered)));
        assert!(matches!(t.write(&mut Vec::<u8>::new()), Err(TemplateError::NotRendered)));
    }

    #[test]
    fn test_render_without_template() {
        let t = Templater::new();
        assert!(matches!(t.render(&Value::null()), Err(TemplateError::NoTemplate)));
    }

    #[test]
    fn test_render_applies_merges() {
        let t = Templater::from_workbook(people_template());
        t.render(&data(json!([
            {"dept": "Sales", "name": "A"},
            {"dept": "Sales", "name": "B"},
            {"dept": "Eng", "name": "C"},
        ])))
        .unwrap();

        let report = t.report().unwrap();
        let sheet = report.sheet("People").unwrap();
        assert_eq!(sheet.rows.len(), 4);
        let sales = sheet.cell(1, 0).unwrap();
        assert_eq!(sales.v_merge, 2);
        assert_eq!(sales.style.border_bottom.style, BorderStyle::Thin);
        assert_eq!(sheet.cell(3, 0).unwrap().v_merge, 1);
        assert_eq!(sheet.cell(2, 0).unwrap().v_merge, 0);
    }

    #[test]
    fn test_second_render_is_finalized_too() {
        let t = Templater::from_workbook(people_template());
        t.render(&data(json!([{"dept": "Sales", "name": "A"}]))).unwrap();
        t.render(&data(json!([
            {"dept": "Eng", "name": "A"},
            {"dept": "Eng", "name": "B"},
            {"dept": "Eng", "name": "C"},
        ])))
        .unwrap();

        let report = t.report().unwrap();
        let sheet = report.sheet("People").unwrap();
        assert_eq!(sheet.cell(1, 0).unwrap().value, "Eng");
        assert_eq!(sheet.cell(1, 0).unwrap().v_merge, 3);
    }

    #[test]
    fn test_failed_render_drops_report() {
        let template = Workbook::from_sheets(vec![Sheet {
            name: "Groups".into(),
            rows: vec![row(&["{{range groups}}"]), row(&["{{g}}"]), row(&["{{end}}"])],
            ..Sheet::default()
        }]);
        let t = Templater::from_workbook(template);
        t.render(&Value::from(json!({"groups": [{"g": 1}]}))).unwrap();
        assert!(t.report().is_some());

        let err = t.render(&Value::from(json!({"groups": "nope"}))).unwrap_err();
        assert!(matches!(err, TemplateError::RangeContext { .. }));
        assert!(t.report().is_none());
        assert!(matches!(t.to_bytes(), Err(TemplateError::NotRendered)));
    }

    #[test]
    fn test_shareable_across_threads() {
        let t = Templater::from_workbook(people_template());
        std::thread::scope(|s| {
            for n in 1..=4 {
                let t = &t;
                s.spawn(move || {
                    let people: Vec<_> = (0..n).map(|i| json!({"dept": "D", "name": i})).collect();
                    t.render(&data(json!(people))).unwrap();
                });
            }
        });
        let rows = t.report().unwrap().sheet("People").unwrap().rows.len();
        assert!((2..=5).contains(&rows));
    }

    #[test]
    fn test_render_options_deserialize() {
        let opts: RenderOptions = serde_json::from_str(r#"{"wrap_text_in_all_cells": true}"#).unwrap();
        assert!(opts.wrap_text_in_all_cells);
        let opts: RenderOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(opts, RenderOptions::default());
    }
}
