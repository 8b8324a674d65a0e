// Excel file read/write
//
// Cell values come from calamine; styles, dimensions, merges and hyperlinks
// from the raw XML parts (see xlsx_styles). Writing goes through rust_xlsxwriter.

use std::collections::HashSet;
use std::io::{Cursor, Write};
use std::path::Path;
use std::time::Instant;

use calamine::{Data, Reader, Xlsx};
use rust_xlsxwriter::{
    Color, DocProperties, ExcelDateTime, Format, FormatAlign, FormatBorder, FormatUnderline, Url, Workbook as XlsxWorkbook,
    Worksheet,
};
use xlst_core::{Alignment, BorderStyle, Cell, CellBorder, CellStyle, Hyperlink, NumberFormat, Sheet, ValueKind, VerticalAlignment, Workbook};
use zip::ZipArchive;

use crate::error::{Error, Result};
use crate::xlsx_styles::{self, SheetFormatting, StyleTable};

pub use xlst_core::address::{MAX_COLS, MAX_ROWS};

/// Counts from a write
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct WriteReport {
    pub sheets: usize,
    pub cells: usize,
    pub merges: usize,
    /// Spans that overlapped an earlier one or ran off the sheet
    pub merges_skipped: usize,
}

impl WriteReport {
    pub fn summary(&self) -> String {
        let mut s = format!("{} sheet(s), {} cell(s), {} merge(s)", self.sheets, self.cells, self.merges);
        if self.merges_skipped > 0 {
            s.push_str(&format!(", {} merge(s) skipped", self.merges_skipped));
        }
        s
    }
}

// ============================================================================
// Reading
// ============================================================================

/// Read an .xlsx file into the document model
pub fn read_workbook(path: impl AsRef<Path>) -> Result<Workbook> {
    let bytes = std::fs::read(path.as_ref())?;
    read_workbook_from_bytes(&bytes)
}

/// Read an .xlsx held in memory
pub fn read_workbook_from_bytes(bytes: &[u8]) -> Result<Workbook> {
    let start_time = Instant::now();

    let mut xlsx: Xlsx<_> = Xlsx::new(Cursor::new(bytes))?;
    let sheet_names: Vec<String> = xlsx.sheet_names().to_vec();
    if sheet_names.is_empty() {
        return Err(Error::Invalid("workbook contains no sheets".to_string()));
    }

    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    let (style_table, formats) = xlsx_styles::parse_xlsx_formatting(&mut archive, &sheet_names);

    let mut workbook = Workbook::new();
    let mut total_cells = 0;

    for (sheet_name, formatting) in sheet_names.iter().zip(formats) {
        let range = xlsx.worksheet_range(sheet_name)?;
        let sheet = workbook.add_sheet(sheet_name.clone());

        let (height, width) = range.get_size();
        if height > 0 && width > 0 {
            let (start_row, start_col) = range.start().unwrap_or((0, 0));
            for (row_idx, row) in range.rows().enumerate() {
                let target_row = start_row as usize + row_idx;
                if target_row >= MAX_ROWS {
                    log::warn!("sheet '{}' truncated at {} rows", sheet_name, MAX_ROWS);
                    break;
                }
                for (col_idx, data) in row.iter().enumerate() {
                    let target_col = start_col as usize + col_idx;
                    if target_col >= MAX_COLS {
                        log::warn!("sheet '{}' row {} truncated at {} columns", sheet_name, target_row + 1, MAX_COLS);
                        break;
                    }
                    if let Some((value, kind)) = cell_value(data) {
                        let cell = sheet.row_mut(target_row).cell_mut(target_col);
                        cell.value = value;
                        cell.kind = kind;
                        total_cells += 1;
                    }
                }
            }
        }

        apply_formatting(sheet, &style_table, formatting);
    }

    log::info!(
        "read workbook: {} sheet(s), {} cell(s) in {} ms",
        workbook.sheet_count(),
        total_cells,
        start_time.elapsed().as_millis()
    );
    Ok(workbook)
}

/// Convert a calamine value into stored text and kind
fn cell_value(data: &Data) -> Option<(String, ValueKind)> {
    let converted = match data {
        Data::Empty => return None,
        Data::String(s) => {
            if s.is_empty() {
                return None;
            }
            (s.clone(), ValueKind::Text)
        }
        Data::Float(n) => (format_number(*n), ValueKind::Number),
        Data::Int(n) => (n.to_string(), ValueKind::Number),
        Data::Bool(b) => ((if *b { "TRUE" } else { "FALSE" }).to_string(), ValueKind::Bool),
        Data::Error(e) => (format!("#{:?}", e), ValueKind::Text),
        // Serial number; the cell's number format carries the date display
        Data::DateTime(dt) => (format_number(dt.as_f64()), ValueKind::Number),
        Data::DateTimeIso(s) | Data::DurationIso(s) => (s.clone(), ValueKind::Text),
    };
    Some(converted)
}

/// Integers without decimals
fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

fn apply_formatting(sheet: &mut Sheet, styles: &StyleTable, formatting: SheetFormatting) {
    for (row, col, style_id) in formatting.cell_styles {
        if row >= MAX_ROWS || col >= MAX_COLS {
            continue;
        }
        if let Some(style) = styles.get(style_id) {
            if !style.is_default() {
                sheet.row_mut(row).cell_mut(col).style = style.clone();
            }
        }
    }

    for (row, meta) in formatting.rows {
        if row >= MAX_ROWS {
            continue;
        }
        let r = sheet.row_mut(row);
        r.height = meta.height;
        r.hidden = meta.hidden;
    }

    sheet.columns = formatting.columns;

    for (start_row, start_col, end_row, end_col) in formatting.merged_regions {
        if end_row < start_row || end_col < start_col || end_row >= MAX_ROWS || end_col >= MAX_COLS {
            log::warn!("sheet '{}': ignoring invalid merged region", sheet.name);
            continue;
        }
        let anchor = sheet.row_mut(start_row).cell_mut(start_col);
        anchor.h_merge = (end_col - start_col) as u32;
        anchor.v_merge = (end_row - start_row) as u32;
    }

    for link in formatting.hyperlinks {
        if link.row >= MAX_ROWS || link.col >= MAX_COLS {
            continue;
        }
        let external = link.rel_id.as_ref().and_then(|id| formatting.relationships.get(id));
        let target = match (external, &link.location) {
            (Some(url), Some(loc)) => format!("{}#{}", url, loc),
            (Some(url), None) => url.clone(),
            (None, Some(loc)) => format!("internal:{}", loc),
            (None, None) => continue,
        };
        let cell = sheet.row_mut(link.row).cell_mut(link.col);
        let display = link.display.or_else(|| (!cell.value.is_empty()).then(|| cell.value.clone()));
        cell.hyperlink = Some(Hyperlink { target, display, tooltip: link.tooltip });
    }
}

// ============================================================================
// Writing
// ============================================================================

/// Write the workbook to an .xlsx file
pub fn write_workbook(workbook: &Workbook, path: impl AsRef<Path>) -> Result<WriteReport> {
    let path = path.as_ref();
    let (mut xlsx_workbook, report) = build_xlsx(workbook)?;
    xlsx_workbook.save(path)?;
    log::info!("wrote {}: {}", path.display(), report.summary());
    Ok(report)
}

/// Serialize the workbook to .xlsx bytes
pub fn workbook_to_bytes(workbook: &Workbook) -> Result<Vec<u8>> {
    let (mut xlsx_workbook, _) = build_xlsx(workbook)?;
    Ok(xlsx_workbook.save_to_buffer()?)
}

/// Serialize the workbook into any writer (file, socket, response body)
pub fn write_workbook_to<W: Write>(workbook: &Workbook, writer: &mut W) -> Result<WriteReport> {
    let (mut xlsx_workbook, report) = build_xlsx(workbook)?;
    let buffer = xlsx_workbook.save_to_buffer()?;
    writer.write_all(&buffer)?;
    writer.flush()?;
    Ok(report)
}

fn build_xlsx(workbook: &Workbook) -> Result<(XlsxWorkbook, WriteReport)> {
    let mut report = WriteReport::default();
    let mut xlsx_workbook = XlsxWorkbook::new();

    // A fixed creation time keeps equal workbooks byte-identical
    let created = ExcelDateTime::from_ymd(2000, 1, 1)?;
    xlsx_workbook.set_properties(&DocProperties::new().set_creation_datetime(&created));

    for sheet in workbook.sheets() {
        let worksheet = xlsx_workbook.add_worksheet().set_name(&sheet.name)?;

        // Merges first: merge_range() writes blanks over the whole region and
        // the anchor's value is written on top of it below.
        let covered = write_merges(sheet, worksheet, &mut report)?;
        report.cells += write_cells(sheet, worksheet, &covered)?;
        apply_layout(sheet, worksheet)?;
        report.sheets += 1;
    }

    if workbook.sheet_count() == 0 {
        xlsx_workbook.add_worksheet();
    }

    Ok((xlsx_workbook, report))
}

type Region = (usize, usize, usize, usize);

fn regions_overlap(a: &Region, b: &Region) -> bool {
    a.0 <= b.2 && b.0 <= a.2 && a.1 <= b.3 && b.1 <= a.3
}

/// Write every span and return the set of covered (non-anchor) cells
fn write_merges(sheet: &Sheet, worksheet: &mut Worksheet, report: &mut WriteReport) -> Result<HashSet<(usize, usize)>> {
    let mut written: Vec<Region> = Vec::new();
    let mut covered = HashSet::new();

    for ((row, col), cell) in sheet.cells_iter() {
        if !cell.is_merge_anchor() {
            continue;
        }
        let region = (row, col, row + cell.v_merge as usize, col + cell.h_merge as usize);
        if region.2 >= MAX_ROWS || region.3 >= MAX_COLS {
            log::warn!("sheet '{}': merge at {} runs off the sheet, skipped", sheet.name, xlst_core::address::cell_address(row, col));
            report.merges_skipped += 1;
            continue;
        }
        if written.iter().any(|w| regions_overlap(w, &region)) {
            log::warn!("sheet '{}': merge at {} overlaps another merge, skipped", sheet.name, xlst_core::address::cell_address(row, col));
            report.merges_skipped += 1;
            continue;
        }

        let format = build_excel_format(&cell.style);
        worksheet.merge_range(region.0 as u32, region.1 as u16, region.2 as u32, region.3 as u16, "", &format)?;
        for r in region.0..=region.2 {
            for c in region.1..=region.3 {
                if (r, c) != (row, col) {
                    covered.insert((r, c));
                }
            }
        }
        written.push(region);
        report.merges += 1;
    }

    Ok(covered)
}

fn write_cells(sheet: &Sheet, worksheet: &mut Worksheet, covered: &HashSet<(usize, usize)>) -> Result<usize> {
    let mut cells_written = 0;

    for ((row, col), cell) in sheet.cells_iter() {
        if covered.contains(&(row, col)) || row >= MAX_ROWS || col >= MAX_COLS {
            continue;
        }
        let row32 = row as u32;
        let col16 = col as u16;
        let format = build_excel_format(&cell.style);

        if let Some(link) = &cell.hyperlink {
            if write_hyperlink(worksheet, row32, col16, cell, link, &format) {
                cells_written += 1;
                continue;
            }
        }

        if cell.value.is_empty() {
            // Only write a blank if the cell has formatting
            if !cell.style.is_default() {
                worksheet.write_blank(row32, col16, &format)?;
                cells_written += 1;
            }
            continue;
        }

        match (cell.kind, cell.value.parse::<f64>()) {
            (ValueKind::Number, Ok(n)) if n.is_finite() => {
                worksheet.write_number_with_format(row32, col16, n, &format)?;
            }
            (ValueKind::Bool, _) if cell.value == "TRUE" || cell.value == "FALSE" => {
                worksheet.write_boolean_with_format(row32, col16, cell.value == "TRUE", &format)?;
            }
            _ => {
                worksheet.write_string_with_format(row32, col16, &cell.value, &format)?;
            }
        }
        cells_written += 1;
    }

    Ok(cells_written)
}

/// Returns false when the link could not be written and the cell should fall
/// back to its plain value.
fn write_hyperlink(worksheet: &mut Worksheet, row: u32, col: u16, cell: &Cell, link: &Hyperlink, format: &Format) -> bool {
    if link.target.is_empty() {
        return false;
    }
    let mut url = Url::new(link.target.as_str()).set_text(cell.display_text());
    if let Some(tip) = &link.tooltip {
        url = url.set_tip(tip.as_str());
    }
    match worksheet.write_url_with_format(row, col, url, format) {
        Ok(_) => true,
        Err(e) => {
            log::warn!("hyperlink at {} not written: {}", xlst_core::address::cell_address(row as usize, col as usize), e);
            false
        }
    }
}

fn build_excel_format(style: &CellStyle) -> Format {
    let mut format = Format::new();

    // Font styling
    if style.bold {
        format = format.set_bold();
    }
    if style.italic {
        format = format.set_italic();
    }
    if style.underline {
        format = format.set_underline(FormatUnderline::Single);
    }
    if style.strikethrough {
        format = format.set_font_strikethrough();
    }
    if let Some(size) = style.font_size {
        format = format.set_font_size(size as f64);
    }
    if let Some(rgba) = style.font_color {
        format = format.set_font_color(rgb(rgba));
    }
    if let Some(ref family) = style.font_family {
        format = format.set_font_name(family);
    }

    // Horizontal alignment
    format = match style.alignment {
        Alignment::General => format, // Excel default: numbers right, text left
        Alignment::Left => format.set_align(FormatAlign::Left),
        Alignment::Center => format.set_align(FormatAlign::Center),
        Alignment::Right => format.set_align(FormatAlign::Right),
        Alignment::CenterAcrossSelection => format.set_align(FormatAlign::CenterAcross),
    };

    format = match style.vertical_alignment {
        VerticalAlignment::Top => format.set_align(FormatAlign::Top),
        VerticalAlignment::Middle => format.set_align(FormatAlign::VerticalCenter),
        VerticalAlignment::Bottom => format,
    };

    if style.wrap_text {
        format = format.set_text_wrap();
    }

    if let Some(rgba) = style.background_color {
        format = format.set_background_color(rgb(rgba));
    }

    format = apply_border(format, style.border_top, Format::set_border_top, Format::set_border_top_color);
    format = apply_border(format, style.border_right, Format::set_border_right, Format::set_border_right_color);
    format = apply_border(format, style.border_bottom, Format::set_border_bottom, Format::set_border_bottom_color);
    format = apply_border(format, style.border_left, Format::set_border_left, Format::set_border_left_color);

    format = match &style.number_format {
        NumberFormat::General => format,
        NumberFormat::Builtin(index) => format.set_num_format_index(*index),
        NumberFormat::Custom(code) => format.set_num_format(code),
    };

    if style.hidden {
        format = format.set_hidden();
    }

    format
}

fn apply_border(
    format: Format,
    border: CellBorder,
    set_style: fn(Format, FormatBorder) -> Format,
    set_color: fn(Format, Color) -> Format,
) -> Format {
    if border.style == BorderStyle::None {
        return format;
    }
    let format = set_style(format, border_style_to_xlsx(border.style));
    match border.color {
        Some(rgba) => set_color(format, rgb(rgba)),
        None => format,
    }
}

fn rgb([r, g, b, _]: [u8; 4]) -> Color {
    // Excel uses ARGB, but rust_xlsxwriter uses RGB hex
    Color::RGB(((r as u32) << 16) | ((g as u32) << 8) | (b as u32))
}

fn border_style_to_xlsx(style: BorderStyle) -> FormatBorder {
    match style {
        BorderStyle::None => FormatBorder::None,
        BorderStyle::Thin => FormatBorder::Thin,
        BorderStyle::Medium => FormatBorder::Medium,
        BorderStyle::Thick => FormatBorder::Thick,
    }
}

/// Column widths/hidden columns and row heights/hidden rows
fn apply_layout(sheet: &Sheet, worksheet: &mut Worksheet) -> Result<()> {
    for (col, info) in &sheet.columns {
        if let Some(width) = info.width {
            worksheet.set_column_width(*col, width)?;
        }
        if info.hidden {
            worksheet.set_column_hidden(*col)?;
        }
    }

    for (idx, row) in sheet.rows.iter().enumerate().take(MAX_ROWS) {
        if let Some(height) = row.height {
            worksheet.set_row_height(idx as u32, height)?;
        }
        if row.hidden {
            worksheet.set_row_hidden(idx as u32)?;
        }
    }

    Ok(())
}
