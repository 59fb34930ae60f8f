use std::fmt;
use std::path::{Path, PathBuf};

use calamine::{open_workbook, Data, Reader, Xlsx, XlsxError};
use pricewatch_core::PriceRow;
use pricewatch_logging::watch_info;
use rust_xlsxwriter::Workbook;
use thiserror::Error;

use crate::persist::{AtomicFileWriter, PersistError};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read workbook {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: XlsxError,
    },
    #[error("failed to encode workbook: {0}")]
    Encode(#[from] rust_xlsxwriter::XlsxError),
    #[error("cell ({row}, {col}) is outside the worksheet grid")]
    OutOfRange { row: usize, col: usize },
    #[error("workbook path {0:?} has no file name")]
    InvalidPath(PathBuf),
    #[error("failed to write workbook: {0}")]
    Persist(#[from] PersistError),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum CellValue {
    #[default]
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
}

impl From<Option<String>> for CellValue {
    fn from(value: Option<String>) -> Self {
        value.map_or(CellValue::Empty, CellValue::Text)
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Empty => Ok(()),
            CellValue::Text(text) => f.write_str(text),
            CellValue::Number(n) => write!(f, "{n}"),
            CellValue::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl From<&Data> for CellValue {
    fn from(data: &Data) -> Self {
        match data {
            Data::Empty => CellValue::Empty,
            Data::String(s) => CellValue::Text(s.clone()),
            Data::Float(f) => CellValue::Number(*f),
            Data::Int(i) => CellValue::Number(*i as f64),
            Data::Bool(b) => CellValue::Bool(*b),
            Data::DateTime(dt) => CellValue::Number(dt.as_f64()),
            other => CellValue::Text(other.to_string()),
        }
    }
}

/// A worksheet as a dense grid anchored at A1.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Sheet {
    pub name: String,
    pub rows: Vec<Vec<CellValue>>,
}

impl Sheet {
    fn is_blank(&self) -> bool {
        self.rows
            .iter()
            .all(|row| row.iter().all(|cell| *cell == CellValue::Empty))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppendOutcome {
    pub path: PathBuf,
    /// Rows in the price sheet after the append, header included.
    pub total_rows: usize,
    pub created_sheet: bool,
}

/// The xlsx workbook that accumulates one price row per run.
///
/// Every append is a whole-file read-modify-write; other sheets in the
/// workbook keep their cell values but not their formatting.
#[derive(Debug, Clone)]
pub struct WorkbookStore {
    path: PathBuf,
    sheet_name: String,
}

impl WorkbookStore {
    pub fn new(path: impl Into<PathBuf>, sheet_name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            sheet_name: sheet_name.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn sheet_name(&self) -> &str {
        &self.sheet_name
    }

    pub fn append_row(
        &self,
        header: &[String],
        row: &PriceRow,
    ) -> Result<AppendOutcome, StoreError> {
        let mut sheets = self.load_sheets()?;

        let index = match sheets.iter().position(|s| self.is_price_sheet(s)) {
            Some(index) => index,
            None => {
                sheets.push(Sheet {
                    name: self.sheet_name.clone(),
                    rows: Vec::new(),
                });
                sheets.len() - 1
            }
        };

        let sheet = &mut sheets[index];
        let created_sheet = sheet.is_blank();
        let mut rows = std::mem::take(&mut sheet.rows);
        if created_sheet {
            rows = vec![header.iter().cloned().map(CellValue::Text).collect()];
        }
        rows.push(
            std::iter::once(CellValue::Text(row.date.clone()))
                .chain(row.cells.iter().cloned().map(CellValue::from))
                .collect(),
        );
        sheet.rows = rows;
        let total_rows = sheet.rows.len();

        self.save_sheets(&sheets)?;
        watch_info!(
            "Appended row for {} to {:?} ({} rows in {})",
            row.date,
            self.path,
            total_rows,
            self.sheet_name
        );

        Ok(AppendOutcome {
            path: self.path.clone(),
            total_rows,
            created_sheet,
        })
    }

    /// All sheets of the workbook; empty if the file does not exist yet.
    pub fn load_sheets(&self) -> Result<Vec<Sheet>, StoreError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let read_err = |source: XlsxError| StoreError::Read {
            path: self.path.clone(),
            source,
        };

        let mut workbook: Xlsx<_> = open_workbook(&self.path).map_err(read_err)?;
        let mut sheets = Vec::new();
        for name in workbook.sheet_names() {
            let range = workbook.worksheet_range(&name).map_err(read_err)?;
            let mut rows = Vec::new();
            if let Some((first_row, first_col)) = range.start() {
                // calamine trims leading blank rows/columns; restore the A1 anchor.
                rows.resize_with(first_row as usize, Vec::new);
                for data_row in range.rows() {
                    let mut row = vec![CellValue::Empty; first_col as usize];
                    row.extend(data_row.iter().map(CellValue::from));
                    rows.push(row);
                }
            }
            sheets.push(Sheet { name, rows });
        }
        Ok(sheets)
    }

    /// The price sheet, if the workbook already has one.
    pub fn load_price_sheet(&self) -> Result<Option<Sheet>, StoreError> {
        Ok(self
            .load_sheets()?
            .into_iter()
            .find(|sheet| self.is_price_sheet(sheet)))
    }

    /// Encode `sheets` and atomically replace the workbook file.
    pub fn save_sheets(&self, sheets: &[Sheet]) -> Result<(), StoreError> {
        let mut workbook = Workbook::new();
        for sheet in sheets {
            let worksheet = workbook.add_worksheet();
            worksheet.set_name(&sheet.name)?;
            for (r, cells) in sheet.rows.iter().enumerate() {
                for (c, cell) in cells.iter().enumerate() {
                    let (row, col) = match (u32::try_from(r), u16::try_from(c)) {
                        (Ok(row), Ok(col)) => (row, col),
                        _ => return Err(StoreError::OutOfRange { row: r, col: c }),
                    };
                    match cell {
                        CellValue::Empty => {}
                        CellValue::Text(text) => {
                            worksheet.write_string(row, col, text)?;
                        }
                        CellValue::Number(n) => {
                            worksheet.write_number(row, col, *n)?;
                        }
                        CellValue::Bool(b) => {
                            worksheet.write_boolean(row, col, *b)?;
                        }
                    }
                }
            }
        }
        let bytes = workbook.save_to_buffer()?;

        let filename = self
            .path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| StoreError::InvalidPath(self.path.clone()))?;
        AtomicFileWriter::for_target(&self.path).write(filename, &bytes)?;
        Ok(())
    }

    // Excel treats sheet names case-insensitively.
    fn is_price_sheet(&self, sheet: &Sheet) -> bool {
        sheet.name.to_lowercase() == self.sheet_name.to_lowercase()
    }
}
