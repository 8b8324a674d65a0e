//! XLSX part parser: extracts formatting from styles.xml and per-sheet layout
//! (style IDs, row/column dimensions, merged regions, hyperlinks) from the
//! worksheet XML inside the XLSX (ZIP) archive.
//!
//! Cell values are read by calamine; everything here is layered on top.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::{BTreeMap, HashMap};
use std::io::{Read, Seek};
use xlst_core::address::parse_range_ref;
use xlst_core::{Alignment, BorderStyle, CellBorder, CellStyle, ColumnInfo, NumberFormat, VerticalAlignment};
use zip::ZipArchive;

// =============================================================================
// Public types
// =============================================================================

/// Parsed style table from styles.xml: cellXfs index to CellStyle.
#[derive(Debug, Default)]
pub struct StyleTable {
    pub styles: Vec<CellStyle>,
}

impl StyleTable {
    pub fn get(&self, id: usize) -> Option<&CellStyle> {
        self.styles.get(id)
    }

    pub fn len(&self) -> usize {
        self.styles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.styles.is_empty()
    }
}

/// Row attributes from `<row>`
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct RowMeta {
    pub height: Option<f64>,
    pub hidden: bool,
}

/// A `<hyperlink>` entry before its relationship is resolved
#[derive(Debug, Default, Clone, PartialEq)]
pub struct HyperlinkRef {
    /// Top-left cell of the `ref` range
    pub row: usize,
    pub col: usize,
    pub rel_id: Option<String>,
    pub location: Option<String>,
    pub display: Option<String>,
    pub tooltip: Option<String>,
}

/// Everything taken from one worksheet XML besides cell values.
#[derive(Debug, Default)]
pub struct SheetFormatting {
    /// (row, col, style_id) triples
    pub cell_styles: Vec<(usize, usize, usize)>,
    pub rows: BTreeMap<usize, RowMeta>,
    pub columns: BTreeMap<u16, ColumnInfo>,
    /// Merged cell regions: (start_row, start_col, end_row, end_col)
    pub merged_regions: Vec<(usize, usize, usize, usize)>,
    pub hyperlinks: Vec<HyperlinkRef>,
    /// Relationship id → target from the worksheet's .rels part
    pub relationships: HashMap<String, String>,
}

// =============================================================================
// XML helpers
// =============================================================================

/// Unescape the 5 predefined XML entities: &amp; &lt; &gt; &quot; &apos;
fn unescape_xml(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    s.replace("&quot;", "\"")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

fn attr_string(value: &[u8]) -> String {
    unescape_xml(&String::from_utf8_lossy(value))
}

fn attr_parse<T: std::str::FromStr>(value: &[u8]) -> Option<T> {
    std::str::from_utf8(value).ok().and_then(|s| s.parse().ok())
}

fn attr_bool(value: &[u8]) -> bool {
    value == b"1" || value == b"true"
}

/// Collect XML attributes into a Vec of (key, value) pairs.
fn collect_attrs(e: &BytesStart) -> Vec<(Vec<u8>, Vec<u8>)> {
    e.attributes()
        .flatten()
        .map(|a| (a.key.as_ref().to_vec(), a.value.to_vec()))
        .collect()
}

// =============================================================================
// Colors
// =============================================================================

/// Standard Excel indexed color palette, first 8 entries plus the common
/// extended ones. Unknown indices resolve to None.
fn indexed_color(idx: u8) -> Option<[u8; 4]> {
    let rgb: [u8; 3] = match idx {
        0 | 8 => [0, 0, 0],
        1 | 9 => [255, 255, 255],
        2 | 10 => [255, 0, 0],
        3 | 11 => [0, 255, 0],
        4 | 12 => [0, 0, 255],
        5 | 13 => [255, 255, 0],
        6 | 14 => [255, 0, 255],
        7 | 15 => [0, 255, 255],
        16 => [128, 0, 0],
        17 => [0, 128, 0],
        18 => [0, 0, 128],
        19 => [128, 128, 0],
        20 => [128, 0, 128],
        21 => [0, 128, 128],
        22 => [192, 192, 192],
        23 => [128, 128, 128],
        64 => [0, 0, 0],
        65 => [255, 255, 255],
        _ => return None,
    };
    Some([rgb[0], rgb[1], rgb[2], 255])
}

/// Parse AARRGGBB (or RRGGBB) hex to RGBA.
fn parse_argb_hex(hex: &[u8]) -> Option<[u8; 4]> {
    let s = std::str::from_utf8(hex).ok()?;
    let s = s.trim_start_matches('#');
    let byte = |range: std::ops::Range<usize>| u8::from_str_radix(s.get(range)?, 16).ok();

    match s.len() {
        8 => Some([byte(2..4)?, byte(4..6)?, byte(6..8)?, byte(0..2)?]),
        6 => Some([byte(0..2)?, byte(2..4)?, byte(4..6)?, 255]),
        _ => None,
    }
}

/// Color from rgb/indexed attributes. Theme colors are not resolved.
fn parse_color_attrs(attrs: &[(Vec<u8>, Vec<u8>)]) -> Option<[u8; 4]> {
    let mut indexed = None;
    for (key, value) in attrs {
        match key.as_slice() {
            b"rgb" => return parse_argb_hex(value),
            b"indexed" => indexed = attr_parse::<u8>(value),
            _ => {}
        }
    }
    indexed.and_then(indexed_color)
}

// =============================================================================
// styles.xml
// =============================================================================

#[derive(Debug, Clone, Default)]
struct ParsedFont {
    bold: bool,
    italic: bool,
    underline: bool,
    strikethrough: bool,
    size: Option<f32>,
    color: Option<[u8; 4]>,
    family: Option<String>,
}

#[derive(Debug, Clone, Default)]
struct ParsedBorder {
    top: CellBorder,
    right: CellBorder,
    bottom: CellBorder,
    left: CellBorder,
}

#[derive(Debug, Default)]
struct XfEntry {
    num_fmt_id: Option<u16>,
    font_id: Option<usize>,
    fill_id: Option<usize>,
    border_id: Option<usize>,
    h_align: Option<String>,
    v_align: Option<String>,
    wrap_text: bool,
    hidden: bool,
}

/// Parse styles.xml content into a StyleTable.
pub fn parse_styles_xml(xml: &str) -> StyleTable {
    let custom_num_fmts = parse_num_fmts(xml);
    let fonts = parse_fonts(xml);
    let fills = parse_fills(xml);
    let borders = parse_borders(xml);
    let styles = parse_cell_xfs(xml, &custom_num_fmts, &fonts, &fills, &borders);
    StyleTable { styles }
}

/// Parse <numFmts> → formatId → formatCode
fn parse_num_fmts(xml: &str) -> HashMap<u16, String> {
    let mut map = HashMap::new();
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut in_num_fmts = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) if e.name().as_ref() == b"numFmts" => in_num_fmts = true,
            Ok(Event::End(ref e)) if e.name().as_ref() == b"numFmts" => break,
            Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e))
                if in_num_fmts && e.name().as_ref() == b"numFmt" =>
            {
                let mut id: Option<u16> = None;
                let mut code: Option<String> = None;
                for attr in e.attributes().flatten() {
                    match attr.key.as_ref() {
                        b"numFmtId" => id = attr_parse(&attr.value),
                        b"formatCode" => code = Some(attr_string(&attr.value)),
                        _ => {}
                    }
                }
                if let (Some(id), Some(code)) = (id, code) {
                    map.insert(id, code);
                }
            }
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    map
}

fn parse_fonts(xml: &str) -> Vec<ParsedFont> {
    let mut fonts = Vec::new();
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut depth = 0; // 0 = outside, 1 = inside <fonts>, 2 = inside <font>
    let mut current = ParsedFont::default();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.name().as_ref() {
                b"fonts" if depth == 0 => depth = 1,
                b"font" if depth == 1 => {
                    depth = 2;
                    current = ParsedFont::default();
                }
                b"color" if depth == 2 => current.color = parse_color_attrs(&collect_attrs(e)),
                _ => {}
            },
            Ok(Event::Empty(ref e)) if depth == 2 => match e.name().as_ref() {
                b"b" => current.bold = !has_false_val(e),
                b"i" => current.italic = !has_false_val(e),
                b"u" => current.underline = !has_none_val(e),
                b"strike" => current.strikethrough = !has_false_val(e),
                b"sz" => current.size = val_attr(e).and_then(|v| v.parse().ok()),
                b"color" => current.color = parse_color_attrs(&collect_attrs(e)),
                b"name" | b"rFont" => current.family = val_attr(e),
                _ => {}
            },
            Ok(Event::End(ref e)) => match e.name().as_ref() {
                b"font" if depth == 2 => {
                    fonts.push(std::mem::take(&mut current));
                    depth = 1;
                }
                b"fonts" if depth == 1 => break,
                _ => {}
            },
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    fonts
}

fn val_attr(e: &BytesStart) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == b"val")
        .map(|a| attr_string(&a.value))
}

fn has_false_val(e: &BytesStart) -> bool {
    matches!(val_attr(e).as_deref(), Some("0") | Some("false"))
}

fn has_none_val(e: &BytesStart) -> bool {
    matches!(val_attr(e).as_deref(), Some("none"))
}

/// Parse <fills> into background colors (solid pattern foreground)
fn parse_fills(xml: &str) -> Vec<Option<[u8; 4]>> {
    let mut fills = Vec::new();
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut depth = 0; // 0 = outside, 1 = inside <fills>, 2 = inside <fill>
    let mut in_pattern_fill = false;
    let mut current: Option<[u8; 4]> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.name().as_ref() {
                b"fills" if depth == 0 => depth = 1,
                b"fill" if depth == 1 => {
                    depth = 2;
                    current = None;
                }
                b"patternFill" if depth == 2 => in_pattern_fill = true,
                b"fgColor" if in_pattern_fill => current = parse_color_attrs(&collect_attrs(e)),
                _ => {}
            },
            Ok(Event::Empty(ref e)) => {
                if e.name().as_ref() == b"fgColor" && in_pattern_fill {
                    current = parse_color_attrs(&collect_attrs(e));
                }
            }
            Ok(Event::End(ref e)) => match e.name().as_ref() {
                b"patternFill" => in_pattern_fill = false,
                b"fill" if depth == 2 => {
                    fills.push(current.take());
                    depth = 1;
                    in_pattern_fill = false;
                }
                b"fills" if depth == 1 => break,
                _ => {}
            },
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    fills
}

fn parse_borders(xml: &str) -> Vec<ParsedBorder> {
    let mut borders = Vec::new();
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut depth = 0; // 0 = outside, 1 = inside <borders>, 2 = inside <border>
    let mut current_side: Option<Vec<u8>> = None;
    let mut current = ParsedBorder::default();
    let mut side = CellBorder::default();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.name().as_ref() {
                b"borders" if depth == 0 => depth = 1,
                b"border" if depth == 1 => {
                    depth = 2;
                    current = ParsedBorder::default();
                }
                name @ (b"left" | b"right" | b"top" | b"bottom") if depth == 2 => {
                    current_side = Some(name.to_vec());
                    side = CellBorder { style: border_style_attr(e), color: None };
                }
                b"color" if current_side.is_some() => side.color = parse_color_attrs(&collect_attrs(e)),
                _ => {}
            },
            Ok(Event::Empty(ref e)) => match e.name().as_ref() {
                name @ (b"left" | b"right" | b"top" | b"bottom") if depth == 2 => {
                    let border = CellBorder { style: border_style_attr(e), color: None };
                    set_border_side(&mut current, name, border);
                }
                b"color" if current_side.is_some() => side.color = parse_color_attrs(&collect_attrs(e)),
                _ => {}
            },
            Ok(Event::End(ref e)) => match e.name().as_ref() {
                b"left" | b"right" | b"top" | b"bottom" if depth == 2 => {
                    if let Some(name) = current_side.take() {
                        set_border_side(&mut current, &name, side);
                    }
                    side = CellBorder::default();
                }
                b"border" if depth == 2 => {
                    borders.push(std::mem::take(&mut current));
                    depth = 1;
                }
                b"borders" if depth == 1 => break,
                _ => {}
            },
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    borders
}

fn border_style_attr(e: &BytesStart) -> BorderStyle {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == b"style")
        .map(|a| parse_border_style(&String::from_utf8_lossy(&a.value)))
        .unwrap_or_default()
}

fn set_border_side(border: &mut ParsedBorder, side: &[u8], value: CellBorder) {
    match side {
        b"left" => border.left = value,
        b"right" => border.right = value,
        b"top" => border.top = value,
        b"bottom" => border.bottom = value,
        _ => {}
    }
}

fn parse_border_style(s: &str) -> BorderStyle {
    match s {
        "thin" | "hair" | "dotted" | "dashed" | "dashDot" | "dashDotDot" => BorderStyle::Thin,
        "medium" | "mediumDashed" | "mediumDashDot" | "mediumDashDotDot" | "slantDashDot" => BorderStyle::Medium,
        "thick" | "double" => BorderStyle::Thick,
        _ => BorderStyle::None,
    }
}

/// Parse <cellXfs> and resolve each <xf> into a CellStyle.
fn parse_cell_xfs(
    xml: &str,
    custom_num_fmts: &HashMap<u16, String>,
    fonts: &[ParsedFont],
    fills: &[Option<[u8; 4]>],
    borders: &[ParsedBorder],
) -> Vec<CellStyle> {
    let mut styles = Vec::new();
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut in_cell_xfs = false;
    let mut in_xf = false;
    let mut current = XfEntry::default();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.name().as_ref() {
                b"cellXfs" => in_cell_xfs = true,
                b"xf" if in_cell_xfs => {
                    in_xf = true;
                    current = xf_from_attrs(e);
                }
                b"alignment" if in_xf => apply_alignment_attrs(&mut current, e),
                b"protection" if in_xf => apply_protection_attrs(&mut current, e),
                _ => {}
            },
            Ok(Event::Empty(ref e)) => match e.name().as_ref() {
                b"xf" if in_cell_xfs => {
                    // Self-closing <xf .../>, resolve immediately
                    let xf = xf_from_attrs(e);
                    styles.push(resolve_xf(&xf, custom_num_fmts, fonts, fills, borders));
                }
                b"alignment" if in_xf => apply_alignment_attrs(&mut current, e),
                b"protection" if in_xf => apply_protection_attrs(&mut current, e),
                _ => {}
            },
            Ok(Event::End(ref e)) => match e.name().as_ref() {
                b"xf" if in_xf => {
                    styles.push(resolve_xf(&current, custom_num_fmts, fonts, fills, borders));
                    in_xf = false;
                }
                b"cellXfs" => break,
                _ => {}
            },
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    styles
}

fn xf_from_attrs(e: &BytesStart) -> XfEntry {
    let mut xf = XfEntry::default();
    for attr in e.attributes().flatten() {
        match attr.key.as_ref() {
            b"numFmtId" => xf.num_fmt_id = attr_parse(&attr.value),
            b"fontId" => xf.font_id = attr_parse(&attr.value),
            b"fillId" => xf.fill_id = attr_parse(&attr.value),
            b"borderId" => xf.border_id = attr_parse(&attr.value),
            _ => {}
        }
    }
    xf
}

fn apply_alignment_attrs(xf: &mut XfEntry, e: &BytesStart) {
    for attr in e.attributes().flatten() {
        match attr.key.as_ref() {
            b"horizontal" => xf.h_align = Some(attr_string(&attr.value)),
            b"vertical" => xf.v_align = Some(attr_string(&attr.value)),
            b"wrapText" => xf.wrap_text = attr_bool(&attr.value),
            _ => {}
        }
    }
}

fn apply_protection_attrs(xf: &mut XfEntry, e: &BytesStart) {
    for attr in e.attributes().flatten() {
        if attr.key.as_ref() == b"hidden" {
            xf.hidden = attr_bool(&attr.value);
        }
    }
}

/// Map a numFmtId to a NumberFormat. Ids 1-49 are Excel built-ins.
fn number_format(id: u16, custom: &HashMap<u16, String>) -> NumberFormat {
    if let Some(code) = custom.get(&id) {
        return NumberFormat::Custom(code.clone());
    }
    match id {
        0 => NumberFormat::General,
        1..=49 => NumberFormat::Builtin(id as u8),
        _ => NumberFormat::General,
    }
}

/// Resolve an XfEntry into a CellStyle using the parsed component tables.
fn resolve_xf(
    xf: &XfEntry,
    custom_num_fmts: &HashMap<u16, String>,
    fonts: &[ParsedFont],
    fills: &[Option<[u8; 4]>],
    borders: &[ParsedBorder],
) -> CellStyle {
    let mut style = CellStyle::default();

    if let Some(font) = xf.font_id.and_then(|id| fonts.get(id)) {
        style.bold = font.bold;
        style.italic = font.italic;
        style.underline = font.underline;
        style.strikethrough = font.strikethrough;
        style.font_size = font.size;
        style.font_color = font.color;
        style.font_family = font.family.clone();
    }

    if let Some(fill) = xf.fill_id.and_then(|id| fills.get(id)) {
        style.background_color = *fill;
    }

    if let Some(border) = xf.border_id.and_then(|id| borders.get(id)) {
        style.border_top = border.top;
        style.border_right = border.right;
        style.border_bottom = border.bottom;
        style.border_left = border.left;
    }

    if let Some(id) = xf.num_fmt_id {
        style.number_format = number_format(id, custom_num_fmts);
    }

    if let Some(ref h) = xf.h_align {
        style.alignment = match h.as_str() {
            "left" => Alignment::Left,
            "center" => Alignment::Center,
            "right" => Alignment::Right,
            "centerContinuous" => Alignment::CenterAcrossSelection,
            _ => Alignment::General,
        };
    }

    if let Some(ref v) = xf.v_align {
        style.vertical_alignment = match v.as_str() {
            "top" => VerticalAlignment::Top,
            "center" => VerticalAlignment::Middle,
            _ => VerticalAlignment::Bottom,
        };
    }

    style.wrap_text = xf.wrap_text;
    style.hidden = xf.hidden;
    style
}

/// Strip the workbook defaults (font, size) so that an unstyled cell compares
/// equal to `CellStyle::default()`.
pub fn normalize_against_default(table: &mut StyleTable) {
    let Some(base) = table.styles.first().cloned() else {
        return;
    };
    for style in &mut table.styles {
        if style.font_family == base.font_family {
            style.font_family = None;
        }
        if style.font_size == base.font_size {
            style.font_size = None;
        }
        if style.font_color == base.font_color {
            style.font_color = None;
        }
    }
}

// =============================================================================
// Worksheet XML
// =============================================================================

/// Parse a worksheet XML for style IDs, dimensions, merges and hyperlinks.
pub fn parse_sheet_formatting(xml: &str) -> SheetFormatting {
    let mut out = SheetFormatting::default();

    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => match e.name().as_ref() {
                b"row" => parse_row_element(e, &mut out.rows),
                b"c" => {
                    let mut style_id: Option<usize> = None;
                    let mut cell_ref: Option<String> = None;
                    for attr in e.attributes().flatten() {
                        match attr.key.as_ref() {
                            b"s" => style_id = attr_parse(&attr.value),
                            b"r" => cell_ref = Some(attr_string(&attr.value)),
                            _ => {}
                        }
                    }
                    // style_id 0 = default, skip
                    if let (Some(style_id), Some(cell_ref)) = (style_id, cell_ref) {
                        if style_id > 0 {
                            if let Some((row, col, _, _)) = parse_range_ref(&cell_ref) {
                                out.cell_styles.push((row, col, style_id));
                            }
                        }
                    }
                }
                b"col" => parse_col_element(e, &mut out.columns),
                b"mergeCell" => {
                    for attr in e.attributes().flatten() {
                        if attr.key.as_ref() == b"ref" {
                            if let Some(region) = parse_range_ref(&attr_string(&attr.value)) {
                                out.merged_regions.push(region);
                            }
                        }
                    }
                }
                b"hyperlink" => {
                    if let Some(link) = parse_hyperlink_element(e) {
                        out.hyperlinks.push(link);
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    out
}

fn parse_row_element(e: &BytesStart, rows: &mut BTreeMap<usize, RowMeta>) {
    let mut row_idx: Option<usize> = None;
    let mut custom_height = false;
    let mut meta = RowMeta::default();

    for attr in e.attributes().flatten() {
        match attr.key.as_ref() {
            // 1-based → 0-based
            b"r" => row_idx = attr_parse::<usize>(&attr.value).and_then(|r| r.checked_sub(1)),
            b"ht" => meta.height = attr_parse(&attr.value),
            b"customHeight" => custom_height = attr_bool(&attr.value),
            b"hidden" => meta.hidden = attr_bool(&attr.value),
            _ => {}
        }
    }

    if !custom_height {
        meta.height = None;
    }
    if let Some(row) = row_idx {
        if meta != RowMeta::default() {
            rows.insert(row, meta);
        }
    }
}

fn parse_col_element(e: &BytesStart, columns: &mut BTreeMap<u16, ColumnInfo>) {
    let mut min_col: Option<u16> = None;
    let mut max_col: Option<u16> = None;
    let mut width: Option<f64> = None;
    let mut custom_width = false;
    let mut hidden = false;

    for attr in e.attributes().flatten() {
        match attr.key.as_ref() {
            b"min" => min_col = attr_parse::<u16>(&attr.value).and_then(|c| c.checked_sub(1)),
            b"max" => max_col = attr_parse::<u16>(&attr.value).and_then(|c| c.checked_sub(1)),
            b"width" => width = attr_parse(&attr.value),
            b"customWidth" => custom_width = attr_bool(&attr.value),
            b"hidden" => hidden = attr_bool(&attr.value),
            _ => {}
        }
    }

    if !custom_width && !hidden {
        return;
    }
    if let (Some(min), Some(max)) = (min_col, max_col) {
        let info = ColumnInfo {
            width: if custom_width { width } else { None },
            hidden,
        };
        for col in min..=max {
            columns.insert(col, info.clone());
        }
    }
}

fn parse_hyperlink_element(e: &BytesStart) -> Option<HyperlinkRef> {
    let mut link = HyperlinkRef::default();
    let mut anchor = None;
    for attr in e.attributes().flatten() {
        match attr.key.as_ref() {
            b"ref" => anchor = parse_range_ref(&attr_string(&attr.value)),
            b"r:id" => link.rel_id = Some(attr_string(&attr.value)),
            b"location" => link.location = Some(attr_string(&attr.value)),
            b"display" => link.display = Some(attr_string(&attr.value)),
            b"tooltip" => link.tooltip = Some(attr_string(&attr.value)),
            _ => {}
        }
    }
    let (row, col, _, _) = anchor?;
    link.row = row;
    link.col = col;
    Some(link)
}

/// Parse a relationships part into Id → Target
pub fn parse_relationships(xml: &str) -> HashMap<String, String> {
    let mut rid_to_target = HashMap::new();
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e))
                if e.name().as_ref() == b"Relationship" =>
            {
                let mut id = None;
                let mut target = None;
                for attr in e.attributes().flatten() {
                    match attr.key.as_ref() {
                        b"Id" => id = Some(attr_string(&attr.value)),
                        b"Target" => target = Some(attr_string(&attr.value)),
                        _ => {}
                    }
                }
                if let (Some(id), Some(target)) = (id, target) {
                    rid_to_target.insert(id, target);
                }
            }
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    rid_to_target
}

/// Parse workbook.xml into (sheet name, relationship id) pairs, in order
fn parse_workbook_sheets(xml: &str) -> Vec<(String, String)> {
    let mut sheets = Vec::new();
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e)) if e.name().as_ref() == b"sheet" => {
                let mut name = None;
                let mut rid = None;
                for attr in e.attributes().flatten() {
                    match attr.key.as_ref() {
                        b"name" => name = Some(attr_string(&attr.value)),
                        b"r:id" => rid = Some(attr_string(&attr.value)),
                        _ => {}
                    }
                }
                if let (Some(name), Some(rid)) = (name, rid) {
                    sheets.push((name, rid));
                }
            }
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    sheets
}

/// Resolve a relationship target relative to `xl/`
fn part_path(target: &str) -> String {
    match target.strip_prefix('/') {
        Some(absolute) => absolute.to_string(),
        None => format!("xl/{}", target),
    }
}

/// `xl/worksheets/sheet1.xml` → `xl/worksheets/_rels/sheet1.xml.rels`
fn rels_path_for(part: &str) -> String {
    match part.rsplit_once('/') {
        Some((dir, file)) => format!("{}/_rels/{}.rels", dir, file),
        None => format!("_rels/{}.rels", part),
    }
}

// =============================================================================
// Top-level entry point
// =============================================================================

/// Parse all formatting data from an XLSX archive.
/// Returns the style table and one SheetFormatting per entry in `sheet_names`.
pub fn parse_xlsx_formatting<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    sheet_names: &[String],
) -> (StyleTable, Vec<SheetFormatting>) {
    let mut style_table = match read_zip_file(archive, "xl/styles.xml") {
        Some(xml) => parse_styles_xml(&xml),
        None => StyleTable::default(),
    };
    normalize_against_default(&mut style_table);

    let workbook_xml = read_zip_file(archive, "xl/workbook.xml").unwrap_or_default();
    let rels_xml = read_zip_file(archive, "xl/_rels/workbook.xml.rels").unwrap_or_default();
    let rid_to_target = parse_relationships(&rels_xml);
    let name_to_part: HashMap<String, String> = parse_workbook_sheets(&workbook_xml)
        .into_iter()
        .filter_map(|(name, rid)| rid_to_target.get(&rid).map(|t| (name, part_path(t))))
        .collect();

    let sheet_formats = sheet_names
        .iter()
        .map(|name| {
            let Some(part) = name_to_part.get(name) else {
                return SheetFormatting::default();
            };
            let Some(xml) = read_zip_file(archive, part) else {
                return SheetFormatting::default();
            };
            let mut formatting = parse_sheet_formatting(&xml);
            if !formatting.hyperlinks.is_empty() {
                if let Some(rels) = read_zip_file(archive, &rels_path_for(part)) {
                    formatting.relationships = parse_relationships(&rels);
                }
            }
            formatting
        })
        .collect();

    (style_table, sheet_formats)
}

/// Read a file from a ZIP archive, returning None when missing or unreadable.
fn read_zip_file<R: Read + Seek>(archive: &mut ZipArchive<R>, path: &str) -> Option<String> {
    let mut file = archive.by_name(path).ok()?;
    let mut content = String::new();
    file.read_to_string(&mut content).ok()?;
    Some(content)
}

// =============================================================================
// Tests
// =============================================================================
