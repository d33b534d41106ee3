//! Global specialty catalog. Specialties referenced by qualifications must exist here.

mod parser;

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::ids::SpecialtyId;
use crate::workflows::professionals::domain::ProfessionalType;

#[derive(Debug)]
pub enum CatalogImportError {
    Io(std::io::Error),
    Csv(csv::Error),
    InvalidRow { line: u64, reason: String },
    DuplicateSpecialty(SpecialtyId),
}

impl std::fmt::Display for CatalogImportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CatalogImportError::Io(err) => write!(f, "failed to read specialty catalog: {}", err),
            CatalogImportError::Csv(err) => write!(f, "invalid specialty catalog CSV: {}", err),
            CatalogImportError::InvalidRow { line, reason } => {
                write!(f, "specialty catalog line {}: {}", line, reason)
            }
            CatalogImportError::DuplicateSpecialty(id) => {
                write!(f, "specialty {} listed more than once", id)
            }
        }
    }
}

impl std::error::Error for CatalogImportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CatalogImportError::Io(err) => Some(err),
            CatalogImportError::Csv(err) => Some(err),
            CatalogImportError::InvalidRow { .. } | CatalogImportError::DuplicateSpecialty(_) => {
                None
            }
        }
    }
}

impl From<std::io::Error> for CatalogImportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<csv::Error> for CatalogImportError {
    fn from(err: csv::Error) -> Self {
        Self::Csv(err)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogSpecialty {
    pub id: SpecialtyId,
    pub name: String,
    pub professional_type: ProfessionalType,
}

#[derive(Debug, Clone, Default)]
pub struct SpecialtyCatalog {
    entries: BTreeMap<SpecialtyId, CatalogSpecialty>,
}

impl SpecialtyCatalog {
    pub fn new(entries: impl IntoIterator<Item = CatalogSpecialty>) -> Self {
        Self {
            entries: entries
                .into_iter()
                .map(|entry| (entry.id, entry))
                .collect(),
        }
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, CatalogImportError> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file)
    }

    /// Reads `id,name,professional_type` rows. Rows without an id get a fresh one.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, CatalogImportError> {
        let mut entries = BTreeMap::new();

        for row in parser::parse_rows(reader)? {
            let id = match row.id.as_deref() {
                Some(raw) => raw.parse().map_err(|_| CatalogImportError::InvalidRow {
                    line: row.line,
                    reason: format!("'{raw}' is not a UUID"),
                })?,
                None => SpecialtyId::new(),
            };

            if row.name.trim().is_empty() {
                return Err(CatalogImportError::InvalidRow {
                    line: row.line,
                    reason: "name is empty".to_string(),
                });
            }

            let professional_type = match row.professional_type.as_deref() {
                Some(raw) => raw.parse().map_err(|reason| CatalogImportError::InvalidRow {
                    line: row.line,
                    reason,
                })?,
                None => ProfessionalType::Doctor,
            };

            let entry = CatalogSpecialty {
                id,
                name: row.name,
                professional_type,
            };
            if entries.insert(id, entry).is_some() {
                return Err(CatalogImportError::DuplicateSpecialty(id));
            }
        }

        Ok(Self { entries })
    }

    pub fn insert(&mut self, entry: CatalogSpecialty) {
        self.entries.insert(entry.id, entry);
    }

    pub fn contains(&self, id: &SpecialtyId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn get(&self, id: &SpecialtyId) -> Option<&CatalogSpecialty> {
        self.entries.get(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &CatalogSpecialty> {
        self.entries.values()
    }
}
