// End-to-end rendering of xlsx templates built with rust_xlsxwriter.
// Run with: cargo test -p xlst-engine --test render

use std::path::{Path, PathBuf};

use rust_xlsxwriter::{Format, Url, Workbook as XlsxWorkbook};
use serde_json::json;
use xlst_core::BorderStyle;
use xlst_engine::{RenderOptions, TemplateError, Templater, Value};

fn save(wb: &mut XlsxWorkbook, dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    wb.save(&path).unwrap();
    path
}

fn write_rows(wb: &mut XlsxWorkbook, sheet: &str, rows: &[&[&str]]) {
    let ws = wb.add_worksheet().set_name(sheet).unwrap();
    for (r, cells) in rows.iter().enumerate() {
        for (c, text) in cells.iter().enumerate() {
            if !text.is_empty() {
                ws.write_string(r as u32, c as u16, *text).unwrap();
            }
        }
    }
}

fn first_column(t: &Templater, sheet: &str) -> Vec<String> {
    let report = t.report().unwrap();
    report
        .sheet(sheet)
        .unwrap()
        .rows
        .iter()
        .map(|r| r.first_cell().map(|c| c.value.clone()).unwrap_or_default())
        .collect()
}

fn data(json: serde_json::Value) -> Value {
    Value::from(json)
}

#[test]
fn directive_free_template_is_copied() {
    let dir = tempfile::tempdir().unwrap();
    let mut wb = XlsxWorkbook::new();
    let bold = Format::new().set_bold();
    let ws = wb.add_worksheet().set_name("Static").unwrap();
    ws.write_string_with_format(0, 0, "Name", &bold).unwrap();
    ws.write_string(0, 1, "Qty").unwrap();
    ws.write_string(1, 0, "Bolts").unwrap();
    ws.write_number(1, 1, 40.0).unwrap();
    ws.set_column_width(0, 20).unwrap();
    let path = save(&mut wb, dir.path(), "static.xlsx");

    let t = Templater::from_path(&path).unwrap();
    t.render(&data(json!({"unused": 1}))).unwrap();

    let template = t.template().unwrap();
    let report = t.report().unwrap();
    assert_eq!(report.sheet("Static").unwrap().values(), template.sheet("Static").unwrap().values());
    assert!(report.sheet("Static").unwrap().cell(0, 0).unwrap().style.bold);
    assert_eq!(report.sheet("Static").unwrap().columns, template.sheet("Static").unwrap().columns);
}

#[test]
fn range_blocks_and_nesting() {
    let dir = tempfile::tempdir().unwrap();
    let mut wb = XlsxWorkbook::new();
    write_rows(
        &mut wb,
        "Orders",
        &[
            &["Report {{title}}"],
            &["{{range groups}}"],
            &["Group {{name}} ({{title}})"],
            &["{{range items}}"],
            &["{{name}}", "{{sku}}"],
            &["{{end}}"],
            &["{{end}}"],
            &["Done"],
        ],
    );
    let path = save(&mut wb, dir.path(), "nested.xlsx");

    let t = Templater::from_path(&path).unwrap();
    t.render(&data(json!({
        "title": "Q3",
        "groups": [
            {"name": "A", "items": [{"sku": "a1"}, {"sku": "a2"}, {"sku": "a3"}]},
            {"name": "B", "title": "local", "items": [{"sku": "b1"}, {"sku": "b2"}, {"sku": "b3", "name": "own"}]},
        ],
    })))
    .unwrap();

    assert_eq!(
        first_column(&t, "Orders"),
        vec!["Report Q3", "Group A (Q3)", "A", "A", "A", "Group B (local)", "B", "B", "own", "Done"]
    );
    let report = t.report().unwrap();
    assert_eq!(report.sheet("Orders").unwrap().cell(4, 1).unwrap().value, "a3");
}

#[test]
fn unclosed_range_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let mut wb = XlsxWorkbook::new();
    write_rows(&mut wb, "Broken", &[&["Header"], &["{{range items}}"], &["{{x}}"]]);
    let path = save(&mut wb, dir.path(), "broken.xlsx");

    let t = Templater::from_path(&path).unwrap();
    let err = t.render(&data(json!({"items": [{"x": 1}]}))).unwrap_err();
    match &err {
        TemplateError::UnclosedRange { sheet, name, row } => {
            assert_eq!((sheet.as_str(), name.as_str(), *row), ("Broken", "items", 2));
        }
        other => panic!("unexpected {:?}", other),
    }
    assert!(err.to_string().contains("items"));
    assert!(t.report().is_none());
}

#[test]
fn list_rows_expand_per_element() {
    let dir = tempfile::tempdir().unwrap();
    let mut wb = XlsxWorkbook::new();
    write_rows(&mut wb, "People", &[&["Name", "Age"], &["{{people.name}}", "{{people.age}}"], &["Total"]]);
    let path = save(&mut wb, dir.path(), "people.xlsx");

    let t = Templater::from_path(&path).unwrap();
    t.render(&data(json!({"people": [
        {"name": "Ann", "age": 31},
        {"name": "Bob", "age": 45},
        {"name": "Cid", "age": 27},
    ]})))
    .unwrap();
    assert_eq!(first_column(&t, "People"), vec!["Name", "Ann", "Bob", "Cid", "Total"]);

    t.render(&data(json!({"people": {"name": "Solo", "age": 1}}))).unwrap();
    assert_eq!(first_column(&t, "People"), vec!["Name", "Solo", "Total"]);
}

#[test]
fn merge_runs_with_and_without_header() {
    let dir = tempfile::tempdir().unwrap();
    let mut wb = XlsxWorkbook::new();
    write_rows(&mut wb, "Plain", &[&["{{people.dept merge:true}}", "{{people.name}}"]]);
    write_rows(&mut wb, "Header", &[&["{{people.dept merge:true;header:true}}", "{{people.name}}"]]);
    let path = save(&mut wb, dir.path(), "merge.xlsx");

    let t = Templater::from_path(&path).unwrap();
    t.render(&data(json!({"people": [
        {"dept": "Sales", "name": "A"},
        {"dept": "Sales", "name": "B"},
        {"dept": "Eng", "name": "C"},
    ]})))
    .unwrap();

    let report = t.report().unwrap();
    let plain = report.sheet("Plain").unwrap();
    assert_eq!(plain.cell(0, 0).unwrap().v_merge, 1);
    assert_eq!(plain.cell(0, 0).unwrap().style.border_left.style, BorderStyle::Thin);
    assert_eq!(plain.cell(2, 0).unwrap().v_merge, 0);
    assert_eq!(plain.cell(2, 0).unwrap().style.border_left.style, BorderStyle::Thin);
    assert_eq!(plain.cell(1, 0).unwrap().style.border_left.style, BorderStyle::None);

    let header = report.sheet("Header").unwrap();
    assert_eq!(header.cell(0, 0).unwrap().v_merge, 2);
    assert_eq!(header.cell(2, 0).unwrap().v_merge, 1);
}

#[test]
fn saved_report_reads_back() {
    let dir = tempfile::tempdir().unwrap();
    let mut wb = XlsxWorkbook::new();
    let ws = wb.add_worksheet().set_name("Links").unwrap();
    ws.write_string(0, 0, "{{rows.dept merge:true}}").unwrap();
    ws.write_string(0, 1, "{{rows.who}}").unwrap();
    ws.write_url(0, 2, Url::new("https://example.com/docs").set_text("Docs for {{rows.who}}")).unwrap();
    let path = save(&mut wb, dir.path(), "links.xlsx");

    let t = Templater::from_path(&path).unwrap();
    t.render_with_options(
        &data(json!({"rows": [
            {"dept": "Ops", "who": "x & y"},
            {"dept": "Ops", "who": "z"},
        ]})),
        &RenderOptions { wrap_text_in_all_cells: true },
    )
    .unwrap();

    let out = dir.path().join("links_report.xlsx");
    let summary = t.save(&out).unwrap();
    assert_eq!(summary.merges, 1);

    let back = xlst_io::read_workbook(&out).unwrap();
    let sheet = back.sheet("Links").unwrap();
    let anchor = sheet.cell(0, 0).unwrap();
    assert_eq!(anchor.value, "Ops");
    assert_eq!(anchor.v_merge, 1);
    assert!(anchor.style.wrap_text);
    assert_eq!(sheet.cell(0, 1).unwrap().value, "x & y");

    let link = sheet.cell(1, 2).unwrap();
    assert_eq!(link.display_text(), "Docs for z");
    assert!(link.hyperlink.as_ref().unwrap().target.starts_with("https://example.com/docs"));
}

#[test]
fn per_sheet_contexts() {
    let dir = tempfile::tempdir().unwrap();
    let mut wb = XlsxWorkbook::new();
    write_rows(&mut wb, "First", &[&["{{who}}"]]);
    write_rows(&mut wb, "Second", &[&["{{who}}"]]);
    let path = save(&mut wb, dir.path(), "sheets.xlsx");

    let t = Templater::from_path(&path).unwrap();
    t.render(&data(json!([{"who": "one"}, {"who": "two"}]))).unwrap();
    assert_eq!(first_column(&t, "First"), vec!["one"]);
    assert_eq!(first_column(&t, "Second"), vec!["two"]);
}

#[test]
fn fresh_instances_render_identically() {
    let dir = tempfile::tempdir().unwrap();
    let mut wb = XlsxWorkbook::new();
    write_rows(
        &mut wb,
        "Sheet1",
        &[&["{{range teams}}"], &["{{team}}"], &["{{members.dept merge:true}}", "{{members.name}}"], &["{{end}}"]],
    );
    let path = save(&mut wb, dir.path(), "teams.xlsx");
    let bytes = std::fs::read(&path).unwrap();

    let context = data(json!({"teams": [
        {"team": "Red", "members": [{"dept": "d1", "name": "a"}, {"dept": "d1", "name": "b"}]},
        {"team": "Blue", "members": [{"dept": "d2", "name": "c"}]},
    ]}));

    let first = Templater::from_path(&path).unwrap();
    first.render(&context).unwrap();
    let first_bytes = first.to_bytes().unwrap();

    // Far enough apart that a wall-clock timestamp would differ
    std::thread::sleep(std::time::Duration::from_millis(1100));
    let second = Templater::from_bytes(&bytes).unwrap();
    second.render(&context).unwrap();
    assert_eq!(first.report(), second.report());
    assert_eq!(second.to_bytes().unwrap(), first_bytes);

    let a = dir.path().join("a.xlsx");
    let b = dir.path().join("b.xlsx");
    first.save(&a).unwrap();
    second.save(&b).unwrap();
    assert_eq!(std::fs::read(&a).unwrap(), std::fs::read(&b).unwrap());
}

#[test]
fn missing_template_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = Templater::from_path(dir.path().join("nope.xlsx")).err().unwrap();
    assert!(matches!(err, TemplateError::Io(_)));
    assert!(!err.is_template_fault());
}
