//! `sheet-staging` turns uploaded spreadsheet workbooks into validated CSV, stages the result
//! under an opaque token, and writes it to object storage once the uploader confirms.
//!
//! The main entrypoint is [`service::StagingService`], which exposes the two operations a
//! presentation layer needs:
//!
//! - [`service::StagingService::upload`]: convert the workbook's first sheet, coerce every data
//!   row to the destination site's [`types::Schema`], stage the buffer, and return a token plus
//!   a short preview
//! - [`service::StagingService::commit`]: store the staged buffer for a [`types::Site`] and retire
//!   the token
//!
//! ## Workbook formats
//!
//! - `.xlsx`, `.xlsm`, `.xlsb`, `.ods`: read in-process with calamine
//! - `.xls`: converted by a headless office suite ([`ingestion::external::ExternalConverter`]),
//!   or in-process when configured
//!
//! ## Column types
//!
//! Schemas declare each column as one of [`types::FieldType`]. Coercion rewrites cells into a
//! canonical text form (see [`coerce::coerce`]); empty cells always pass.
//!
//! - `INTEGER`: base-10 `i64`, staged without leading zeros
//! - `FLOAT`, `BOOLEAN`: checked, staged as written
//! - `DATE`: `M/D/YYYY h:mm:ss AM|PM` in US Central time, staged as `YYYY-MM-DD`
//! - `TIMESTAMP`: same input, staged as `YYYY-MM-DD HH:MM:SS`
//! - `STRING`: unchanged, except a trailing `.0` on the second column
//!
//! ## Quick example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use sheet_staging::config::StagingConfig;
//! use sheet_staging::service::StagingService;
//! use sheet_staging::storage::FilesystemSink;
//!
//! # fn main() -> Result<(), sheet_staging::StagingError> {
//! let config = StagingConfig::default();
//! let service = StagingService::from_config(&config, Arc::new(FilesystemSink::new("objects")))?;
//!
//! let bytes = std::fs::read("april.xlsx")?;
//! let receipt = service.upload(&bytes, "april.xlsx", Some("North Campus"))?;
//! for row in &receipt.preview {
//!     println!("{}", row.join(" | "));
//! }
//! let stored = service.commit(&receipt.token, "North Campus")?;
//! println!("stored {} bytes at {}", stored.bytes, stored.key);
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`ingestion`]: workbook conversion and CSV reading/writing
//! - [`coerce`] and [`validate`]: cell and row checks
//! - [`pipeline`]: conversion plus parallel validation
//! - [`session`] and [`commit`]: staging and confirmed writes through an [`storage::ObjectSink`]
//! - [`observability`]: observer hooks and alerting
//! - [`config`]: TOML configuration

pub mod coerce;
pub mod commit;
pub mod config;
pub mod error;
pub mod ingestion;
pub mod observability;
pub mod pipeline;
pub mod schema;
pub mod service;
pub mod session;
pub mod storage;
pub mod types;
pub mod validate;

pub use error::{ErrorClass, StagingError, StagingResult};
