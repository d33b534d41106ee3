use serde::{Deserialize, Deserializer};
use std::io::Read;

#[derive(Debug)]
pub(crate) struct CatalogRow {
    pub(crate) line: u64,
    pub(crate) id: Option<String>,
    pub(crate) name: String,
    pub(crate) professional_type: Option<String>,
}

pub(crate) fn parse_rows<R: Read>(reader: R) -> Result<Vec<CatalogRow>, csv::Error> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let mut rows = Vec::new();

    for (index, record) in csv_reader.deserialize::<RawCatalogRow>().enumerate() {
        let raw = record?;
        rows.push(CatalogRow {
            // header occupies line 1
            line: index as u64 + 2,
            id: raw.id,
            name: raw.name,
            professional_type: raw.professional_type,
        });
    }

    Ok(rows)
}

#[derive(Debug, Deserialize)]
struct RawCatalogRow {
    #[serde(default, deserialize_with = "empty_string_as_none")]
    id: Option<String>,
    name: String,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    professional_type: Option<String>,
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    Ok(opt.filter(|value| !value.trim().is_empty()))
}
