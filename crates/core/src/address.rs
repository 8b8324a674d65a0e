// A1-style cell references

/// Maximum rows in an xlsx worksheet
pub const MAX_ROWS: usize = 1_048_576;
/// Maximum columns in an xlsx worksheet
pub const MAX_COLS: usize = 16_384;

/// Convert column index to Excel column letters (0 = A, 25 = Z, 26 = AA, etc.)
pub fn col_to_letters(col: usize) -> String {
    let mut result = String::new();
    let mut n = col;
    loop {
        result.insert(0, (b'A' + (n % 26) as u8) as char);
        if n < 26 {
            break;
        }
        n = n / 26 - 1;
    }
    result
}

/// Convert row/col to Excel cell address (e.g., "A1", "B5", "AA100")
pub fn cell_address(row: usize, col: usize) -> String {
    format!("{}{}", col_to_letters(col), row + 1)
}

/// Parse a cell reference like "B5" or "$B$5" into (row, col) = (4, 1).
pub fn parse_cell_ref(r: &str) -> Option<(usize, usize)> {
    let mut col_part = String::new();
    let mut row_part = String::new();

    for ch in r.chars() {
        if ch == '$' {
            continue;
        }
        if ch.is_ascii_alphabetic() {
            if !row_part.is_empty() {
                return None;
            }
            col_part.push(ch.to_ascii_uppercase());
        } else if ch.is_ascii_digit() {
            row_part.push(ch);
        } else {
            return None;
        }
    }

    if col_part.is_empty() || row_part.is_empty() {
        return None;
    }

    // Worksheet XML is untrusted: overlong columns must not wrap
    let mut col: usize = 0;
    for ch in col_part.chars() {
        col = col.checked_mul(26)?.checked_add(ch as usize - 'A' as usize + 1)?;
        if col > MAX_COLS {
            return None;
        }
    }

    let row: usize = row_part.parse().ok()?;
    if row == 0 || row > MAX_ROWS {
        return None;
    }

    Some((row - 1, col - 1))
}

/// Parse a range reference like "A1:C3" into (start_row, start_col, end_row, end_col).
/// A single cell reference yields a one-cell range.
pub fn parse_range_ref(r: &str) -> Option<(usize, usize, usize, usize)> {
    match r.split_once(':') {
        Some((start, end)) => {
            let (sr, sc) = parse_cell_ref(start)?;
            let (er, ec) = parse_cell_ref(end)?;
            Some((sr, sc, er, ec))
        }
        None => {
            let (row, col) = parse_cell_ref(r)?;
            Some((row, col, row, col))
        }
    }
}
