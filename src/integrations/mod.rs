//! External data sources
//!
//! The PPA directory is populated out-of-band from CSV exports:
//! - CSV import (`name,location,state,rating,reviews,description`)

mod csv_import;

pub use csv_import::{PpaCsvImporter, PpaImportResult};

/// Errors that can occur during an import
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Missing required column: {0}")]
    MissingColumn(&'static str),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}
