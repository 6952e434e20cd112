//! Workbook conversion and delimited-text handling.
//!
//! Most callers should use [`WorkbookConverter`] (from [`unified`]), which picks an
//! implementation by file extension:
//!
//! - [`excel`]: in-process conversion with calamine
//! - [`external`]: a headless office suite for legacy `.xls` files
//!
//! [`csv`] reads converted text back into rows and writes staged buffers.

pub mod csv;
pub mod excel;
pub mod external;
pub mod unified;

pub use excel::CalamineConverter;
pub use external::ExternalConverter;
pub use unified::{SheetConverter, WorkbookConverter, WorkbookFormat};
