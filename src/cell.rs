/// Largest column count a worksheet may have (`XFD`).
pub const MAX_COLS: u32 = 16_384;
/// Largest row count a worksheet may have.
pub const MAX_ROWS: u32 = 1_048_576;

/// The value held by one cell.
#[derive(Clone, Debug, PartialEq)]
pub enum CellValue {
    Text(String),
    Number(f64),
    Boolean(bool),
    Empty,
    /// Formulas, error values, ISO dates and formula string results.
    /// These are carried through untouched.
    Other(String),
}

impl CellValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            CellValue::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, CellValue::Text(_))
    }

    /// Same variant, ignoring the payload.
    pub fn same_kind(&self, other: &CellValue) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

/// One addressable slot in a sheet. `row` and `col` are zero-based.
#[derive(Clone, Debug, PartialEq)]
pub struct Cell {
    pub row: u32,
    pub col: u32,
    pub value: CellValue,
}

impl Cell {
    pub fn new(row: u32, col: u32, value: CellValue) -> Self {
        Cell { row, col, value }
    }

    pub fn text(row: u32, col: u32, text: impl Into<String>) -> Self {
        Cell::new(row, col, CellValue::Text(text.into()))
    }

    /// A1-style name of this cell.
    pub fn name(&self) -> String {
        cell_name(self.row, self.col)
    }
}

/// Convert a zero-based column index to its letters (0 → `A`, 26 → `AA`).
pub fn col_to_letter(col: u32) -> String {
    let mut col = col + 1;
    let mut result = String::new();
    while col > 0 {
        col -= 1;
        result.push(((col % 26) as u8 + b'A') as char);
        col /= 26;
    }
    result.chars().rev().collect()
}

/// Convert column letters to a zero-based index. Case-insensitive.
pub fn letter_to_col(letters: &str) -> Option<u32> {
    if letters.is_empty() {
        return None;
    }
    let mut col: u32 = 0;
    for c in letters.chars() {
        if !c.is_ascii_alphabetic() {
            return None;
        }
        let digit = (c.to_ascii_uppercase() as u32) - ('A' as u32) + 1;
        col = col.checked_mul(26)?.checked_add(digit)?;
        if col > MAX_COLS {
            return None;
        }
    }
    Some(col - 1)
}

pub fn cell_name(row: u32, col: u32) -> String {
    format!("{}{}", col_to_letter(col), row + 1)
}

/// Parse an A1-style reference into zero-based `(row, col)`.
///
/// Absolute markers (`$A$1`) are accepted.
pub fn parse_cell_name(cell_name: &str) -> Option<(u32, u32)> {
    let mut letters = String::new();
    let mut digits = String::new();
    let mut found_digit = false;

    for c in cell_name.trim().chars() {
        if c == '$' {
            continue;
        }
        if c.is_ascii_alphabetic() {
            if found_digit {
                return None;
            }
            letters.push(c);
        } else if c.is_ascii_digit() {
            found_digit = true;
            digits.push(c);
        } else {
            return None;
        }
    }

    let col = letter_to_col(&letters)?;
    let row = digits.parse::<u32>().ok()?;
    if row == 0 || row > MAX_ROWS {
        return None;
    }
    Some((row - 1, col))
}
