use crate::cell::{Cell, CellValue};
use crate::normalizer::Normalizer;

/// A named grid of cells. Only populated cells are stored, in row-major
/// order as they appeared in the source.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Sheet {
    name: String,
    cells: Vec<Cell>,
}

impl Sheet {
    pub fn new(name: impl Into<String>) -> Self {
        Sheet {
            name: name.into(),
            cells: Vec::new(),
        }
    }

    pub fn with_cells(name: impl Into<String>, cells: Vec<Cell>) -> Self {
        Sheet {
            name: name.into(),
            cells,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn push(&mut self, cell: Cell) {
        self.cells.push(cell);
    }

    pub fn cell(&self, row: u32, col: u32) -> Option<&Cell> {
        self.cells.iter().find(|c| c.row == row && c.col == col)
    }

    pub fn value(&self, row: u32, col: u32) -> Option<&CellValue> {
        self.cell(row, col).map(|c| &c.value)
    }

    /// Mutable access to the text of every text cell. Addresses and
    /// non-text cells are not reachable through this view.
    pub fn text_cells_mut(&mut self) -> impl Iterator<Item = &mut String> {
        self.cells.iter_mut().filter_map(|cell| match &mut cell.value {
            CellValue::Text(text) => Some(text),
            _ => None,
        })
    }
}

/// An ordered collection of sheets.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Workbook {
    sheets: Vec<Sheet>,
}

impl Workbook {
    pub fn new() -> Self {
        Workbook::default()
    }

    pub fn from_sheets(sheets: Vec<Sheet>) -> Self {
        Workbook { sheets }
    }

    pub fn push_sheet(&mut self, sheet: Sheet) {
        self.sheets.push(sheet);
    }

    pub fn sheets(&self) -> &[Sheet] {
        &self.sheets
    }

    pub fn sheets_mut(&mut self) -> &mut [Sheet] {
        &mut self.sheets
    }

    pub fn sheet(&self, name: &str) -> Option<&Sheet> {
        self.sheets.iter().find(|s| s.name == name)
    }
}

/// Counters from one normalization pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NormalizeStats {
    pub text_cells: usize,
    pub changed_cells: usize,
}

impl NormalizeStats {
    pub fn merge(&mut self, other: NormalizeStats) {
        self.text_cells += other.text_cells;
        self.changed_cells += other.changed_cells;
    }
}

impl Normalizer {
    /// Rewrite every text cell of `sheet` with the rule.
    pub fn apply_to_sheet(&self, sheet: &mut Sheet) -> NormalizeStats {
        let mut stats = NormalizeStats::default();
        for text in sheet.text_cells_mut() {
            stats.text_cells += 1;
            if self.normalize_in_place(text) {
                stats.changed_cells += 1;
            }
        }
        stats
    }

    /// Rewrite every text cell of every sheet in `workbook`.
    pub fn apply_to_workbook(&self, workbook: &mut Workbook) -> NormalizeStats {
        let mut stats = NormalizeStats::default();
        for sheet in workbook.sheets_mut() {
            stats.merge(self.apply_to_sheet(sheet));
        }
        stats
    }
}
