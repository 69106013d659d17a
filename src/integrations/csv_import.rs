//! PPA CSV Import
//!
//! Reads PPA records from a CSV file with a header row. Columns are matched
//! by name (case-insensitive), so their order is free. Only `name` and
//! `state` are required.

use super::ImportError;
use crate::services::directory::canonical_state;
use crate::services::Ppa;
use std::io::Read;
use std::path::Path;

/// Maximum number of row errors kept in a result
const MAX_ERRORS: usize = 100;

/// Column positions resolved from the header row
#[derive(Debug, Default)]
struct Columns {
    name: usize,
    state: usize,
    location: Option<usize>,
    rating: Option<usize>,
    reviews: Option<usize>,
    description: Option<usize>,
}

impl Columns {
    fn from_headers(headers: &csv::StringRecord) -> Result<Self, ImportError> {
        let find = |wanted: &str| {
            headers
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(wanted))
        };

        Ok(Self {
            name: find("name").ok_or(ImportError::MissingColumn("name"))?,
            state: find("state").ok_or(ImportError::MissingColumn("state"))?,
            location: find("location"),
            rating: find("rating"),
            reviews: find("reviews"),
            description: find("description"),
        })
    }
}

/// Result of a CSV import operation
#[derive(Debug)]
pub struct PpaImportResult {
    pub records: Vec<Ppa>,
    pub rows_processed: usize,
    pub rows_failed: usize,
    pub errors: Vec<String>,
}

/// CSV importer for the PPA directory
#[derive(Debug, Clone)]
pub struct PpaCsvImporter {
    /// Field delimiter
    delimiter: u8,
    /// Reject states outside the known list
    strict_states: bool,
}

impl Default for PpaCsvImporter {
    fn default() -> Self {
        Self::new()
    }
}

impl PpaCsvImporter {
    pub fn new() -> Self {
        Self {
            delimiter: b',',
            strict_states: true,
        }
    }

    /// Set the field delimiter
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Accept any state name as written
    pub fn allow_unknown_states(mut self) -> Self {
        self.strict_states = false;
        self
    }

    /// Import records from a CSV file
    pub fn import(&self, path: &Path) -> Result<PpaImportResult, ImportError> {
        let file = std::fs::File::open(path)?;
        self.import_reader(file)
    }

    /// Import from a CSV string
    pub fn import_str(&self, csv_data: &str) -> Result<PpaImportResult, ImportError> {
        self.import_reader(csv_data.as_bytes())
    }

    fn import_reader<R: Read>(&self, input: R) -> Result<PpaImportResult, ImportError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .delimiter(self.delimiter)
            .flexible(true)
            .from_reader(input);

        let columns = Columns::from_headers(reader.headers()?)?;

        let mut records = Vec::new();
        let mut rows_failed = 0;
        let mut errors = Vec::new();

        for (line_num, result) in reader.records().enumerate() {
            // +2: one for the header, one for 1-based lines
            let actual_line = line_num + 2;

            let parsed = result
                .map_err(|e| e.to_string())
                .and_then(|record| self.parse_record(&columns, &record));

            match parsed {
                Ok(ppa) => records.push(ppa),
                Err(e) => {
                    errors.push(format!("Line {}: {}", actual_line, e));
                    rows_failed += 1;
                }
            }
        }

        if errors.len() > MAX_ERRORS {
            let total = errors.len();
            errors.truncate(MAX_ERRORS);
            errors.push(format!("... and {} more errors", total - MAX_ERRORS));
        }

        Ok(PpaImportResult {
            rows_processed: records.len(),
            records,
            rows_failed,
            errors,
        })
    }

    fn parse_record(&self, columns: &Columns, record: &csv::StringRecord) -> Result<Ppa, String> {
        let field = |idx: Option<usize>| {
            idx.and_then(|i| record.get(i))
                .map(str::trim)
                .unwrap_or_default()
        };

        let name = field(Some(columns.name));
        if name.is_empty() {
            return Err("missing name".to_string());
        }

        let raw_state = field(Some(columns.state));
        if raw_state.is_empty() {
            return Err("missing state".to_string());
        }
        let state = match canonical_state(raw_state) {
            Some(state) => state.to_string(),
            None if !self.strict_states => raw_state.to_string(),
            None => return Err(format!("unknown state '{}'", raw_state)),
        };

        let rating = match field(columns.rating) {
            "" => 0.0,
            s => match s.parse::<f64>() {
                Ok(r) if (0.0..=5.0).contains(&r) => r,
                Ok(r) => return Err(format!("rating {} outside 0-5", r)),
                Err(_) => return Err(format!("invalid rating '{}'", s)),
            },
        };

        let reviews = match field(columns.reviews) {
            "" => 0,
            s => s
                .parse::<u32>()
                .map_err(|_| format!("invalid review count '{}'", s))?,
        };

        Ok(Ppa {
            id: String::new(),
            name: name.to_string(),
            location: field(columns.location).to_string(),
            state,
            rating,
            reviews,
            description: field(columns.description).to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_import_ppas() {
        let csv_data = "name,location,state,rating,reviews,description
Lagos State Secretariat,Alausa Ikeja,Lagos,4.2,31,State government secretariat
Kano Secretariat,Audu Bako,kano,3.5,12,
Ikeja General Hospital,Ikeja,Lagos,,,";

        let result = PpaCsvImporter::new().import_str(csv_data).unwrap();

        assert_eq!(result.rows_processed, 3);
        assert_eq!(result.rows_failed, 0);
        assert_eq!(result.records[0].reviews, 31);
        assert_eq!(result.records[1].state, "Kano");
        assert_eq!(result.records[2].rating, 0.0);
    }

    #[test]
    fn test_columns_in_any_order() {
        let csv_data = "State,Name
Oyo,University College Hospital";

        let result = PpaCsvImporter::new().import_str(csv_data).unwrap();
        assert_eq!(result.records[0].name, "University College Hospital");
        assert_eq!(result.records[0].state, "Oyo");
    }

    #[test]
    fn test_row_errors_are_collected() {
        let csv_data = "name,state,rating,reviews
,Lagos,4,1
Somewhere,Atlantis,4,1
Too Good,Lagos,9,1
Counted,Lagos,4,many
Fine,Lagos,4,1";

        let result = PpaCsvImporter::new().import_str(csv_data).unwrap();
        assert_eq!(result.rows_processed, 1);
        assert_eq!(result.rows_failed, 4);
        assert!(result.errors[0].starts_with("Line 2:"));
        assert!(result.errors[1].contains("unknown state"));

        let lenient = PpaCsvImporter::new()
            .allow_unknown_states()
            .import_str(csv_data)
            .unwrap();
        assert_eq!(lenient.rows_processed, 2);
    }

    #[test]
    fn test_missing_required_column() {
        let err = PpaCsvImporter::new()
            .import_str("name,location\nA,B")
            .unwrap_err();
        assert!(matches!(err, ImportError::MissingColumn("state")));
    }

    #[test]
    fn test_semicolon_delimiter() {
        let result = PpaCsvImporter::new()
            .with_delimiter(b';')
            .import_str("name;state\nFederal Medical Centre;Abia")
            .unwrap();
        assert_eq!(result.rows_processed, 1);
    }
}
