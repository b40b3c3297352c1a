//! Parsed workbook representation supplied by the upstream file reader.
//!
//! The engine never sees raw spreadsheet bytes. A reader produces one
//! [`Workbook`] per uploaded file, with the header row and a bounded sample
//! of cell values for every column.

use serde::{Deserialize, Serialize};

/// A single source column: its header text and a few sample cell values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    /// Header text exactly as it appears in the sheet.
    pub header: String,
    /// Sample cell values (first rows), rendered as text.
    #[serde(default)]
    pub samples: Vec<String>,
}

impl Column {
    pub fn new(header: impl Into<String>) -> Self {
        Self {
            header: header.into(),
            samples: Vec::new(),
        }
    }

    /// Attach sample values to this column.
    #[must_use]
    pub fn with_samples<I, S>(mut self, samples: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.samples = samples.into_iter().map(Into::into).collect();
        self
    }
}

/// One sheet of a workbook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sheet {
    /// Sheet name as listed in the workbook.
    pub name: String,
    /// Columns in sheet order.
    #[serde(default)]
    pub columns: Vec<Column>,
    /// Number of data rows below the header row.
    #[serde(default)]
    pub row_count: usize,
}

impl Sheet {
    pub fn new(name: impl Into<String>, row_count: usize) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            row_count,
        }
    }

    /// Append a column.
    #[must_use]
    pub fn with_column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    /// Append header-only columns.
    #[must_use]
    pub fn with_headers<I, S>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns.extend(headers.into_iter().map(Column::new));
        self
    }

    /// Header texts in column order.
    pub fn headers(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.header.as_str())
    }

    /// Find a column by its exact header text.
    pub fn column(&self, header: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.header == header)
    }

    /// True when the sheet has no data rows.
    pub fn is_empty(&self) -> bool {
        self.row_count == 0
    }
}

/// An ordered collection of sheets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workbook {
    #[serde(default)]
    pub sheets: Vec<Sheet>,
}

impl Workbook {
    pub fn new(sheets: Vec<Sheet>) -> Self {
        Self { sheets }
    }

    /// Look up a sheet by name, returning its position as well.
    pub fn sheet(&self, name: &str) -> Option<(usize, &Sheet)> {
        self.sheets.iter().enumerate().find(|(_, s)| s.name == name)
    }

    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(|s| s.name.as_str()).collect()
    }
}
