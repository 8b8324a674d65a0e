//! Row expansion for one sheet.
//!
//! Template rows are walked with an explicit cursor. Each step handles the
//! row under the cursor and returns the index of the next row to look at, so
//! a range block consumes its body and its `end` row in one step.

use handlebars::Context;
use xlst_core::address::cell_address;
use xlst_core::{Cell, Row, Sheet};

use crate::context::Scope;
use crate::directive::{classify_row, find_range_end, referenced_names, NameSet, RowDirective};
use crate::error::{Result, TemplateError};
use crate::interpolate::{InterpolateError, Interpolator};
use crate::merge::MergeTracker;
use crate::templater::RenderOptions;
use crate::value::Value;

/// Render `template` into the empty sheet `out`.
pub fn render_sheet(
    template: &Sheet,
    scope: &mut Scope,
    out: &mut Sheet,
    interpolator: &mut Interpolator,
    merges: &mut MergeTracker,
    options: &RenderOptions,
) -> Result<()> {
    out.copy_columns_from(template);

    let mut expansion = Expansion {
        sheet: &template.name,
        out,
        interpolator,
        merges,
        options,
    };
    let names = referenced_names(&template.rows);
    expansion.rows(&template.rows, 0, scope, &names)?;

    log::debug!(
        "sheet '{}': {} template rows -> {} rows",
        template.name,
        template.rows.len(),
        expansion.out.rows.len()
    );
    Ok(())
}

struct Expansion<'a> {
    sheet: &'a str,
    out: &'a mut Sheet,
    interpolator: &'a mut Interpolator,
    merges: &'a mut MergeTracker,
    options: &'a RenderOptions,
}

/// Where a block of template rows sits and what it reads
struct Block<'r> {
    rows: &'r [Row],
    /// Template index of `rows[0]`, for error positions
    offset: usize,
    names: &'r NameSet,
}

impl Expansion<'_> {
    fn rows(&mut self, rows: &[Row], offset: usize, scope: &mut Scope, names: &NameSet) -> Result<()> {
        let block = Block { rows, offset, names };
        // Plain rows of one block share a scope, so they share its context
        let mut shared = None;
        let mut idx = 0;
        while idx < rows.len() {
            idx = self.step(&block, idx, scope, &mut shared)?;
        }
        Ok(())
    }

    fn step(&mut self, block: &Block, idx: usize, scope: &mut Scope, shared: &mut Option<Context>) -> Result<usize> {
        let row = &block.rows[idx];
        let template_row = block.offset + idx;

        match classify_row(row) {
            RowDirective::RangeStart(name) => {
                let body_start = idx + 1;
                let body_len =
                    find_range_end(&block.rows[body_start..]).ok_or_else(|| TemplateError::UnclosedRange {
                        sheet: self.sheet.to_string(),
                        name: name.clone(),
                        row: template_row + 1,
                    })?;
                let body = &block.rows[body_start..body_start + body_len];

                let elements = scope.range_elements(&name).ok_or_else(|| TemplateError::RangeContext {
                    sheet: self.sheet.to_string(),
                    name: name.clone(),
                    row: template_row + 1,
                })?;
                let names = referenced_names(body);
                for element in elements {
                    let mut local = scope.overlay(element);
                    self.rows(body, block.offset + body_start, &mut local, &names)?;
                }

                Ok(body_start + body_len + 1)
            }
            RowDirective::RangeEnd => Err(TemplateError::UnexpectedEnd {
                sheet: self.sheet.to_string(),
                row: template_row + 1,
            }),
            RowDirective::List(name) => {
                self.list_row(block, row, template_row, &name, scope, shared)?;
                Ok(idx + 1)
            }
            RowDirective::Plain => {
                let data = self.context_for(row, template_row, scope, block.names, shared)?;
                self.emit_row(row, template_row, data)?;
                Ok(idx + 1)
            }
        }
    }

    /// One output row per element of `name`, or a single row when `name`
    /// is not a sequence.
    ///
    /// `name` is rebound per element and restored afterwards, on error too.
    fn list_row(
        &mut self,
        block: &Block,
        row: &Row,
        template_row: usize,
        name: &str,
        scope: &mut Scope,
        shared: &mut Option<Context>,
    ) -> Result<()> {
        let items = match scope.shared(name) {
            Some(items) if items.is_sequence() => items,
            _ => {
                let data = self.context_for(row, template_row, scope, block.names, shared)?;
                return self.emit_row(row, template_row, data);
            }
        };

        let names = referenced_names(std::slice::from_ref(row));
        let saved = scope.bind(name, Value::null());
        let mut outcome = Ok(());
        for item in items.as_sequence().unwrap_or_default() {
            scope.bind(name, item.clone());
            let mut fresh = None;
            outcome = self
                .context_for(row, template_row, scope, &names, &mut fresh)
                .and_then(|data| self.emit_row(row, template_row, data));
            if outcome.is_err() {
                break;
            }
        }
        scope.restore(name, saved);
        outcome
    }

    /// The context `row` renders against, built on first use and kept in
    /// `cache`. None when the row has nothing to render.
    fn context_for<'c>(
        &self,
        row: &Row,
        template_row: usize,
        scope: &Scope,
        names: &NameSet,
        cache: &'c mut Option<Context>,
    ) -> Result<Option<&'c Context>> {
        if !row.cells.iter().any(needs_render) {
            return Ok(None);
        }
        if cache.is_none() {
            let data = Interpolator::context(&scope.visible(names))
                .map_err(|e| self.cell_error(e, template_row, 0, ""))?;
            *cache = Some(data);
        }
        Ok(cache.as_ref())
    }

    fn emit_row(&mut self, template: &Row, template_row: usize, data: Option<&Context>) -> Result<()> {
        let mut row = template.duplicate(self.options.wrap_text_in_all_cells);
        let out_row = self.out.rows.len();

        if let Some(data) = data {
            for (col, cell) in row.cells.iter_mut().enumerate() {
                self.render_cell(cell, data, template_row, (out_row, col))?;
            }
        }

        log::trace!("{}: template row {} -> row {}", self.sheet, template_row + 1, out_row + 1);
        self.out.rows.push(row);
        Ok(())
    }

    fn render_cell(&mut self, cell: &mut Cell, data: &Context, template_row: usize, anchor: (usize, usize)) -> Result<()> {
        if !needs_render(cell) {
            return Ok(());
        }
        let source = cell.display_text().to_string();
        let rendered = self
            .interpolator
            .render_in(&source, data)
            .map_err(|e| self.cell_error(e, template_row, anchor.1, &source))?;

        if let Some(request) = &rendered.group {
            self.merges.record(self.sheet, request, &rendered.text, anchor);
        }

        match cell.hyperlink.as_mut() {
            // The target stays; only the shown text changes
            Some(link) => link.display = Some(rendered.text),
            None => cell.set_value(rendered.text),
        }
        Ok(())
    }

    fn cell_error(&self, err: InterpolateError, template_row: usize, col: usize, text: &str) -> TemplateError {
        let sheet = self.sheet.to_string();
        let cell = cell_address(template_row, col);
        match err {
            InterpolateError::Syntax(message) => TemplateError::Syntax { sheet, cell, text: text.to_string(), message },
            InterpolateError::Execution(message) => TemplateError::Execution { sheet, cell, message },
        }
    }
}

fn needs_render(cell: &Cell) -> bool {
    cell.display_text().contains("{{")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::resolve;
    use serde_json::json;
    use xlst_core::{BorderStyle, Hyperlink};

    fn row(cells: &[&str]) -> Row {
        Row { cells: cells.iter().map(|v| Cell::text(*v)).collect(), ..Row::default() }
    }

    fn template(rows: Vec<Row>) -> Sheet {
        Sheet { name: "T".into(), rows, ..Sheet::default() }
    }

    fn render_with(
        sheet: &Sheet,
        data: serde_json::Value,
        options: RenderOptions,
        merges: &mut MergeTracker,
    ) -> Result<Sheet> {
        let mut scope = resolve(&Value::from(data), 0);
        let mut out = Sheet::new("T");
        let mut interp = Interpolator::new();
        render_sheet(sheet, &mut scope, &mut out, &mut interp, merges, &options)?;
        Ok(out)
    }

    fn render(sheet: &Sheet, data: serde_json::Value) -> Result<Sheet> {
        render_with(sheet, data, RenderOptions::default(), &mut MergeTracker::new())
    }

    fn first_column(sheet: &Sheet) -> Vec<String> {
        sheet.rows.iter().map(|r| r.first_cell().map(|c| c.value.clone()).unwrap_or_default()).collect()
    }

    #[test]
    fn test_plain_rows_pass_through() {
        let t = template(vec![row(&["Title", "{{title}}"]), row(&["static"])]);
        let out = render(&t, json!({"title": "Report"})).unwrap();
        assert_eq!(out.values(), vec![vec!["Title".to_string(), "Report".to_string()], vec!["static".to_string()]]);
    }

    #[test]
    fn test_range_block_with_local_scope() {
        let t = template(vec![
            row(&["{{range items}}"]),
            row(&["{{title}}"]),
            row(&["{{n}}"]),
            row(&["{{end}}"]),
            row(&["after {{title}}"]),
        ]);
        let out = render(&t, json!({"title": "outer", "items": [{"n": 1}, {"n": 2, "title": "one"}]})).unwrap();
        assert_eq!(first_column(&out), vec!["outer", "1", "one", "2", "after outer"]);
    }

    #[test]
    fn test_nested_ranges() {
        let t = template(vec![
            row(&["{{range groups}}"]),
            row(&["G {{g}}"]),
            row(&["{{range items}}"]),
            row(&["{{g}}/{{v}}"]),
            row(&["{{end}}"]),
            row(&["{{end}}"]),
        ]);
        let data = json!({"groups": [
            {"g": "a", "items": [{"v": 1}, {"v": 2}, {"v": 3}]},
            {"g": "b", "items": [{"v": 4}, {"v": 5}, {"v": 6}]},
        ]});
        let out = render(&t, data).unwrap();
        assert_eq!(
            first_column(&out),
            vec!["G a", "a/1", "a/2", "a/3", "G b", "b/4", "b/5", "b/6"]
        );
    }

    #[test]
    fn test_empty_range_emits_nothing() {
        let t = template(vec![row(&["{{range items}}"]), row(&["x"]), row(&["{{end}}"]), row(&["tail"])]);
        let out = render(&t, json!({"items": []})).unwrap();
        assert_eq!(first_column(&out), vec!["tail"]);
    }

    #[test]
    fn test_structural_errors() {
        let unclosed = template(vec![row(&["{{range items}}"]), row(&["x"])]);
        match render(&unclosed, json!({"items": []})) {
            Err(TemplateError::UnclosedRange { name, row, .. }) => assert_eq!((name.as_str(), row), ("items", 1)),
            other => panic!("unexpected {:?}", other),
        }

        let stray = template(vec![row(&["x"]), row(&["{{end}}"])]);
        match render(&stray, json!({})) {
            Err(TemplateError::UnexpectedEnd { row, .. }) => assert_eq!(row, 2),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_range_context_errors() {
        let t = template(vec![row(&["{{range items}}"]), row(&["x"]), row(&["{{end}}"])]);
        for data in [json!({}), json!({"items": "nope"}), json!({"items": [1, 2]})] {
            let err = render(&t, data).unwrap_err();
            assert!(matches!(err, TemplateError::RangeContext { ref name, row: 1, .. } if name == "items"));
            assert!(!err.is_template_fault());
        }
    }

    #[test]
    fn test_list_rows() {
        let t = template(vec![
            row(&["{{people.name}}", "{{people.age}}"]),
            row(&["{{tags.x}}", "{{title}}"]),
        ]);
        let data = json!({
            "title": "T",
            "people": [{"name": "Ann", "age": 30}, {"name": "Bob", "age": 41}, {"name": "Cy"}],
            "tags": [{"x": 1}, {"x": 2}, {"x": 3}],
        });
        let out = render(&t, data).unwrap();
        assert_eq!(out.rows.len(), 6);
        assert_eq!(out.values()[1], vec!["Bob".to_string(), "41".to_string()]);
        assert_eq!(out.values()[2], vec!["Cy".to_string(), String::new()]);
        assert_eq!(out.values()[5], vec!["3".to_string(), "T".to_string()]);

        // A mapping is not a sequence: the row renders once against it
        let out = render(&t, json!({"people": {"name": "Solo"}})).unwrap();
        assert_eq!(out.rows.len(), 2);
        assert_eq!(out.values()[0][0], "Solo");
        assert_eq!(out.values()[1][0], "");
    }

    #[test]
    fn test_list_row_restores_sequence_for_later_rows() {
        let t = template(vec![
            row(&["{{people.name}}"]),
            row(&["{{range people}}"]),
            row(&["{{name}}!"]),
            row(&["{{end}}"]),
            row(&["{{people.name}}?"]),
        ]);
        let out = render(&t, json!({"people": [{"name": "Ann"}, {"name": "Bo"}]})).unwrap();
        assert_eq!(first_column(&out), vec!["Ann", "Bo", "Ann!", "Bo!", "Ann?", "Bo?"]);
    }

    #[test]
    fn test_failed_list_row_restores_scope() {
        let t = template(vec![row(&["{{people.name}}", "{{nohelper people.name}}"])]);
        let mut scope = resolve(&Value::from(json!({"people": [{"name": "A"}, {"name": "B"}], "k": 1})), 0);
        let before = scope.clone();

        let mut out = Sheet::new("T");
        let err = render_sheet(
            &t,
            &mut scope,
            &mut out,
            &mut Interpolator::new(),
            &mut MergeTracker::new(),
            &RenderOptions::default(),
        )
        .unwrap_err();

        assert!(matches!(err, TemplateError::Execution { ref cell, .. } if cell == "B1"));
        assert_eq!(scope, before);
        assert!(scope.is_sequence("people"));
        assert!(out.rows.is_empty());
    }

    #[test]
    fn test_large_blocks_render() {
        let t = template(vec![
            row(&["{{range items}}"]),
            row(&["{{v}} {{n}}"]),
            row(&["{{end}}"]),
            row(&["{{rows.v}}-{{rows.n}}"]),
        ]);
        let items: Vec<_> = (0..10_000).map(|n| json!({"v": "item", "n": n})).collect();
        let out = render(&t, json!({"items": items.clone(), "rows": items})).unwrap();

        let values = first_column(&out);
        assert_eq!(values.len(), 20_000);
        assert_eq!(values[0], "item 0");
        assert_eq!(values[9_999], "item 9999");
        assert_eq!(values[10_000], "item-0");
        assert_eq!(values[19_999], "item-9999");
    }

    #[test]
    fn test_whole_scope_references() {
        let t = template(vec![row(&["{{this.title}}", "{{@root.n}}"])]);
        let out = render(&t, json!({"title": "T", "n": 2})).unwrap();
        assert_eq!(out.values()[0], vec!["T".to_string(), "2".to_string()]);
    }

    #[test]
    fn test_merge_runs_use_output_anchors() {
        let t = template(vec![
            row(&["Header"]),
            row(&["{{people.dept merge:true}}", "{{people.name}}"]),
        ]);
        let data = json!({"people": [
            {"dept": "Sales", "name": "A"},
            {"dept": "Sales", "name": "B"},
            {"dept": "Eng", "name": "C"},
        ]});
        let mut merges = MergeTracker::new();
        render_with(&t, data, RenderOptions::default(), &mut merges).unwrap();

        let sales = merges.entry("T", "people.dept", "Sales").unwrap();
        assert_eq!((sales.anchor, sales.count), ((1, 0), 1));
        let eng = merges.entry("T", "people.dept", "Eng").unwrap();
        assert_eq!((eng.anchor, eng.count), ((3, 0), 0));
    }

    #[test]
    fn test_hyperlink_keeps_target() {
        let mut link_row = Row::default();
        let cell = link_row.add_cell();
        cell.value = "{{site}}".into();
        cell.hyperlink = Some(Hyperlink {
            target: "https://example.com".into(),
            display: Some("Visit {{site}}".into()),
            tooltip: None,
        });
        let t = template(vec![link_row]);

        let out = render(&t, json!({"site": "Example"})).unwrap();
        let link = out.cell(0, 0).unwrap().hyperlink.clone().unwrap();
        assert_eq!(link.target, "https://example.com");
        assert_eq!(link.display.as_deref(), Some("Visit Example"));
    }

    #[test]
    fn test_syntax_error_names_template_cell() {
        let t = template(vec![row(&["ok"]), row(&["fine", "{{broken"])]);
        match render(&t, json!({})) {
            Err(TemplateError::Syntax { cell, text, .. }) => {
                assert_eq!(cell, "B2");
                assert_eq!(text, "{{broken");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_template_is_not_modified() {
        let t = template(vec![
            row(&["{{range items}}"]),
            row(&["{{v merge:true}}"]),
            row(&["{{end}}"]),
        ]);
        let before = t.clone();
        render(&t, json!({"items": [{"v": 1}, {"v": 1}]})).unwrap();
        assert_eq!(t, before);
    }

    #[test]
    fn test_wrap_text_option() {
        let t = template(vec![row(&["a", "{{b}}"])]);
        let options = RenderOptions { wrap_text_in_all_cells: true };
        let out = render_with(&t, json!({"b": 1}), options, &mut MergeTracker::new()).unwrap();
        assert!(out.rows[0].cells.iter().all(|c| c.style.wrap_text));
        assert_eq!(out.cell(0, 0).unwrap().style.border_top.style, BorderStyle::None);

        let out = render(&t, json!({"b": 1})).unwrap();
        assert!(!out.rows[0].cells[0].style.wrap_text);
    }
}
