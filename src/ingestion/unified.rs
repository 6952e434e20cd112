//! Workbook conversion entrypoint.
//!
//! Most callers should use [`WorkbookConverter::to_rows`], which:
//!
//! - rejects file names without a spreadsheet extension before touching the bytes
//! - converts the first sheet to delimited text, in-process for modern formats and through
//!   the configured legacy converter for `.xls`
//! - reads the text back into rows, dropping blank rows

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::error::{StagingError, StagingResult};
use crate::types::Row;

use super::csv::read_rows;
use super::excel::CalamineConverter;

/// Turns workbook bytes into delimited text (CSV) for the workbook's first sheet.
///
/// Implementations may run in-process or shell out; either way the contract is a byte
/// transform, and anything written to disk must be gone when `convert` returns.
pub trait SheetConverter: Send + Sync {
    fn convert(&self, input: &[u8], file_name: &str) -> StagingResult<Vec<u8>>;
}

/// Supported workbook formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkbookFormat {
    /// Office Open XML workbook.
    Xlsx,
    /// Macro-enabled Office Open XML workbook.
    Xlsm,
    /// Binary Office Open XML workbook.
    Xlsb,
    /// Legacy BIFF workbook.
    Xls,
    /// OpenDocument spreadsheet.
    Ods,
}

impl WorkbookFormat {
    /// Parse a workbook format from a file extension (case-insensitive).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "xlsx" => Some(Self::Xlsx),
            "xlsm" => Some(Self::Xlsm),
            "xlsb" => Some(Self::Xlsb),
            "xls" => Some(Self::Xls),
            "ods" => Some(Self::Ods),
            _ => None,
        }
    }

    /// Infer the format from an uploaded file name.
    pub fn from_file_name(file_name: &str) -> StagingResult<Self> {
        Path::new(file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
            .ok_or_else(|| StagingError::UnsupportedExtension {
                file_name: file_name.to_string(),
            })
    }

    /// Whether this format goes through the legacy converter.
    pub fn is_legacy(self) -> bool {
        matches!(self, Self::Xls)
    }
}

/// Converter that picks an implementation per [`WorkbookFormat`].
#[derive(Clone)]
pub struct WorkbookConverter {
    modern: Arc<dyn SheetConverter>,
    legacy: Arc<dyn SheetConverter>,
}

impl fmt::Debug for WorkbookConverter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkbookConverter").finish_non_exhaustive()
    }
}

impl Default for WorkbookConverter {
    fn default() -> Self {
        Self::in_process()
    }
}

impl WorkbookConverter {
    /// Use separate converters for modern and legacy formats.
    pub fn new(modern: Arc<dyn SheetConverter>, legacy: Arc<dyn SheetConverter>) -> Self {
        Self { modern, legacy }
    }

    /// Convert every format in-process with calamine.
    pub fn in_process() -> Self {
        let calamine: Arc<dyn SheetConverter> = Arc::new(CalamineConverter);
        Self::new(Arc::clone(&calamine), calamine)
    }

    /// Convert modern formats in-process and `.xls` with `legacy`.
    pub fn with_legacy(legacy: Arc<dyn SheetConverter>) -> Self {
        Self::new(Arc::new(CalamineConverter), legacy)
    }

    /// Convert an upload into rows of cell text.
    pub fn to_rows(&self, input: &[u8], file_name: &str) -> StagingResult<Vec<Row>> {
        let delimited = self.convert(input, file_name)?;
        read_rows(&delimited)
    }
}

impl SheetConverter for WorkbookConverter {
    fn convert(&self, input: &[u8], file_name: &str) -> StagingResult<Vec<u8>> {
        let format = WorkbookFormat::from_file_name(file_name)?;
        let converter = if format.is_legacy() {
            &self.legacy
        } else {
            &self.modern
        };
        tracing::debug!(?format, file_name, bytes = input.len(), "converting workbook");
        converter.convert(input, file_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingConverter {
        calls: AtomicUsize,
        output: &'static str,
    }

    impl SheetConverter for CountingConverter {
        fn convert(&self, _input: &[u8], _file_name: &str) -> StagingResult<Vec<u8>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.output.as_bytes().to_vec())
        }
    }

    #[test]
    fn extension_check_happens_before_conversion() {
        let modern = Arc::new(CountingConverter::default());
        let legacy = Arc::new(CountingConverter::default());
        let converter = WorkbookConverter::new(modern.clone(), legacy.clone());

        for name in ["report.csv", "report", "report.xlsx.exe", ".xlsx.txt"] {
            let err = converter.to_rows(b"", name).unwrap_err();
            assert!(matches!(err, StagingError::UnsupportedExtension { .. }), "{name}");
        }
        assert_eq!(modern.calls.load(Ordering::SeqCst), 0);
        assert_eq!(legacy.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn legacy_format_uses_legacy_converter() {
        let modern = Arc::new(CountingConverter {
            output: "m\n",
            ..Default::default()
        });
        let legacy = Arc::new(CountingConverter {
            output: "h1,h2\n,\n1,2\n",
            ..Default::default()
        });
        let converter = WorkbookConverter::new(modern.clone(), legacy.clone());

        let rows = converter.to_rows(b"bytes", "Export.XLS").unwrap();
        assert_eq!(rows, vec![vec!["h1", "h2"], vec!["1", "2"]]);
        assert_eq!(legacy.calls.load(Ordering::SeqCst), 1);
        assert_eq!(modern.calls.load(Ordering::SeqCst), 0);

        converter.to_rows(b"bytes", "export.ods").unwrap();
        assert_eq!(modern.calls.load(Ordering::SeqCst), 1);
    }
}
