//! Occupation catalog (record store)
//!
//! Records are immutable once loaded. Every code is kept as an opaque string
//! so leading zeros and mixed formats survive.

use std::io::Read;
use std::path::Path;

use sha2::{Digest, Sha256};

use super::config::CatalogSchema;
use super::error::{SearchError, SearchResult};

/// Order in which record fields are joined into `searchable_text`.
/// Extra catalog columns follow, in file order.
pub const SEARCHABLE_FIELDS: [SearchableField; 8] = [
    SearchableField::Division,
    SearchableField::Subdivision,
    SearchableField::Group,
    SearchableField::Family,
    SearchableField::Code,
    SearchableField::LegacyCode,
    SearchableField::Title,
    SearchableField::Description,
];

/// A named record field that contributes to searchable text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchableField {
    Division,
    Subdivision,
    Group,
    Family,
    Code,
    LegacyCode,
    Title,
    Description,
}

/// Raw field values for building a [`Record`]
#[derive(Debug, Clone, Default)]
pub struct RecordFields {
    pub division: String,
    pub subdivision: String,
    pub group: String,
    pub family: String,
    pub code: String,
    pub legacy_code: Option<String>,
    pub title: String,
    pub description: String,
    /// Remaining catalog columns as (column, value), in file order
    pub extras: Vec<(String, String)>,
}

/// One catalog entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    division: String,
    subdivision: String,
    group: String,
    family: String,
    code: String,
    legacy_code: Option<String>,
    title: String,
    description: String,
    extras: Vec<(String, String)>,
    searchable_text: String,
}

impl Record {
    pub fn new(fields: RecordFields) -> Self {
        let mut record = Self {
            division: fields.division,
            subdivision: fields.subdivision,
            group: fields.group,
            family: fields.family,
            code: fields.code,
            legacy_code: fields.legacy_code,
            title: fields.title,
            description: fields.description,
            extras: fields.extras,
            searchable_text: String::new(),
        };
        record.searchable_text = record.derive_searchable_text();
        record
    }

    pub fn division(&self) -> &str {
        &self.division
    }

    pub fn subdivision(&self) -> &str {
        &self.subdivision
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn family(&self) -> &str {
        &self.family
    }

    /// Primary code
    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn legacy_code(&self) -> Option<&str> {
        self.legacy_code.as_deref()
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn extras(&self) -> &[(String, String)] {
        &self.extras
    }

    /// All fields joined by single spaces, derived at construction
    pub fn searchable_text(&self) -> &str {
        &self.searchable_text
    }

    pub fn field(&self, field: SearchableField) -> &str {
        match field {
            SearchableField::Division => &self.division,
            SearchableField::Subdivision => &self.subdivision,
            SearchableField::Group => &self.group,
            SearchableField::Family => &self.family,
            SearchableField::Code => &self.code,
            SearchableField::LegacyCode => self.legacy_code.as_deref().unwrap_or(""),
            SearchableField::Title => &self.title,
            SearchableField::Description => &self.description,
        }
    }

    /// Coarser hierarchy codes checked by the hierarchy tier
    fn hierarchy_codes(&self) -> [&str; 3] {
        [
            self.division.as_str(),
            self.subdivision.as_str(),
            self.group.as_str(),
        ]
    }

    fn derive_searchable_text(&self) -> String {
        SEARCHABLE_FIELDS
            .iter()
            .map(|f| self.field(*f))
            .chain(self.extras.iter().map(|(_, v)| v.as_str()))
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Immutable, ordered collection of catalog records
#[derive(Debug, Clone)]
pub struct RecordStore {
    records: Vec<Record>,
    fingerprint: String,
}

impl RecordStore {
    /// Build a store from records already in memory
    pub fn from_records(records: Vec<Record>) -> SearchResult<Self> {
        if records.is_empty() {
            return Err(SearchError::DataLoad("catalog contains no records".into()));
        }
        let fingerprint = fingerprint(&records);
        Ok(Self {
            records,
            fingerprint,
        })
    }

    /// Load a catalog CSV file
    pub fn load(path: &Path, schema: &CatalogSchema) -> SearchResult<Self> {
        let file = std::fs::File::open(path).map_err(|e| {
            SearchError::DataLoad(format!("cannot open {}: {}", path.display(), e))
        })?;
        let store = Self::from_reader(file, schema)?;
        log::info!(
            "[Catalog] Loaded {} records from {}",
            store.len(),
            path.display()
        );
        Ok(store)
    }

    /// Parse catalog CSV from any reader
    pub fn from_reader<R: Read>(reader: R, schema: &CatalogSchema) -> SearchResult<Self> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::None)
            .from_reader(reader);

        let headers = csv_reader
            .headers()
            .map_err(|e| SearchError::DataLoad(format!("unreadable header row: {e}")))?
            .clone();
        let column = |name: &str| headers.iter().position(|h| h.trim() == name);

        let missing: Vec<&str> = schema
            .required_columns()
            .into_iter()
            .filter(|name| column(*name).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(SearchError::DataLoad(format!(
                "missing required columns: {}",
                missing.join(", ")
            )));
        }

        let columns = ColumnMap {
            code: column(schema.code.as_str()).unwrap_or_default(),
            title: column(schema.title.as_str()).unwrap_or_default(),
            division: column(schema.division.as_str()).unwrap_or_default(),
            subdivision: column(schema.subdivision.as_str()).unwrap_or_default(),
            group: column(schema.group.as_str()).unwrap_or_default(),
            family: column(schema.family.as_str()).unwrap_or_default(),
            description: column(schema.description.as_str()).unwrap_or_default(),
            legacy_code: schema.legacy_code.as_deref().and_then(column),
        };

        // Everything not mapped and not dropped rides along as extras
        let claimed = columns.claimed();
        let extra_columns: Vec<(usize, String)> = headers
            .iter()
            .enumerate()
            .filter(|(i, name)| {
                !claimed.contains(i) && !schema.dropped.iter().any(|d| d == name.trim())
            })
            .map(|(i, name)| (i, name.trim().to_string()))
            .collect();

        let mut records = Vec::new();
        for (row, result) in csv_reader.records().enumerate() {
            let row_data = result
                .map_err(|e| SearchError::DataLoad(format!("row {}: {}", row + 1, e)))?;
            let get = |i: usize| row_data.get(i).unwrap_or("").to_string();

            records.push(Record::new(RecordFields {
                division: get(columns.division),
                subdivision: get(columns.subdivision),
                group: get(columns.group),
                family: get(columns.family),
                code: get(columns.code),
                legacy_code: columns.legacy_code.map(get),
                title: get(columns.title),
                description: get(columns.description),
                extras: extra_columns
                    .iter()
                    .map(|(i, name)| (name.clone(), get(*i)))
                    .collect(),
            }));
        }

        Self::from_records(records)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, position: usize) -> Option<&Record> {
        self.records.get(position)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Record> {
        self.records.iter()
    }

    /// Searchable text of every record, in load order
    pub fn searchable_texts(&self) -> Vec<String> {
        self.records
            .iter()
            .map(|r| r.searchable_text().to_string())
            .collect()
    }

    /// Hex SHA-256 over the ordered catalog contents
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Records whose trimmed primary code equals `code` (case-sensitive)
    pub fn find_by_exact_code(&self, code: &str) -> Vec<(usize, &Record)> {
        self.filter(|r| r.code.trim() == code)
    }

    /// Records whose title matches `title`, ignoring case and surrounding whitespace
    pub fn find_by_exact_title(&self, title: &str) -> Vec<(usize, &Record)> {
        let wanted = title.trim().to_lowercase();
        self.filter(|r| r.title.trim().to_lowercase() == wanted)
    }

    /// Records whose division, subdivision or group code equals `code`
    pub fn find_by_hierarchy_code(&self, code: &str) -> Vec<(usize, &Record)> {
        self.filter(|r| r.hierarchy_codes().iter().any(|c| c.trim() == code))
    }

    fn filter<F>(&self, predicate: F) -> Vec<(usize, &Record)>
    where
        F: Fn(&Record) -> bool,
    {
        self.records
            .iter()
            .enumerate()
            .filter(|(_, r)| predicate(r))
            .collect()
    }
}

struct ColumnMap {
    code: usize,
    title: usize,
    division: usize,
    subdivision: usize,
    group: usize,
    family: usize,
    description: usize,
    legacy_code: Option<usize>,
}

impl ColumnMap {
    fn claimed(&self) -> Vec<usize> {
        let mut claimed = vec![
            self.code,
            self.title,
            self.division,
            self.subdivision,
            self.group,
            self.family,
            self.description,
        ];
        claimed.extend(self.legacy_code);
        claimed
    }
}

const UNIT_SEP: u8 = 0x1f;
const RECORD_SEP: u8 = 0x1e;

fn fingerprint(records: &[Record]) -> String {
    let mut hasher = Sha256::new();
    hasher.update((records.len() as u64).to_le_bytes());
    for record in records {
        for field in SEARCHABLE_FIELDS {
            hasher.update(record.field(field).as_bytes());
            hasher.update([UNIT_SEP]);
        }
        for (name, value) in &record.extras {
            hasher.update(name.as_bytes());
            hasher.update([UNIT_SEP]);
            hasher.update(value.as_bytes());
            hasher.update([UNIT_SEP]);
        }
        hasher.update([RECORD_SEP]);
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    const CSV: &str = "\
Division_code,Subdivision_Code,Group_Code,Family_Code,title_Code,2004_code,title_x,title_y,Description,Sector
1,11,111,1111,1111.0100,1111.10,Legislator,Legislator,Makes laws.,Public
2,21,211,2111,2111.0100,2111.10,Physicist,Physicist,Studies matter.,Science
2,21,212,2120,2120.0100,,Software Engineer,Software Engineer,Builds software.,IT
";

    fn store() -> RecordStore {
        RecordStore::from_reader(CSV.as_bytes(), &CatalogSchema::default()).unwrap()
    }

    #[test]
    fn test_load_preserves_codes_as_strings() {
        let store = store();
        assert_eq!(store.len(), 3);
        let r = store.get(0).unwrap();
        assert_eq!(r.code(), "1111.0100");
        assert_eq!(r.legacy_code(), Some("1111.10"));
        assert_eq!(r.extras(), &[("Sector".to_string(), "Public".to_string())]);
    }

    #[test]
    fn test_searchable_text_is_declared_order_and_drops_redundant_column() {
        let store = store();
        assert_eq!(
            store.get(0).unwrap().searchable_text(),
            "1 11 111 1111 1111.0100 1111.10 Legislator Makes laws. Public"
        );
        // empty legacy code is skipped, not rendered as a gap
        assert_eq!(
            store.get(2).unwrap().searchable_text(),
            "2 21 212 2120 2120.0100 Software Engineer Builds software. IT"
        );
    }

    #[test]
    fn test_missing_columns_reported() {
        let csv = "title_Code,title_x\n1,Legislator\n";
        let err = RecordStore::from_reader(csv.as_bytes(), &CatalogSchema::default()).unwrap_err();
        match err {
            SearchError::DataLoad(msg) => {
                assert!(msg.contains("Division_code"));
                assert!(msg.contains("Description"));
                assert!(!msg.contains("title_Code"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_empty_catalog_rejected() {
        let csv = "Division_code,Subdivision_Code,Group_Code,Family_Code,title_Code,title_x,Description\n";
        let err = RecordStore::from_reader(csv.as_bytes(), &CatalogSchema::default()).unwrap_err();
        assert!(matches!(err, SearchError::DataLoad(_)));
    }

    #[test]
    fn test_find_by_exact_code_is_case_sensitive_and_trims_records() {
        let records = vec![
            Record::new(RecordFields {
                code: " AB12 ".into(),
                title: "Alpha".into(),
                ..Default::default()
            }),
            Record::new(RecordFields {
                code: "ab12".into(),
                title: "Beta".into(),
                ..Default::default()
            }),
        ];
        let store = RecordStore::from_records(records).unwrap();
        let hits = store.find_by_exact_code("AB12");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].1.title(), "Alpha");
    }

    #[test]
    fn test_find_by_exact_title_ignores_case() {
        let store = store();
        assert_eq!(store.find_by_exact_title("software engineer ").len(), 1);
        assert_eq!(store.find_by_exact_title("Software Engineer").len(), 1);
        assert!(store.find_by_exact_title("Software").is_empty());
    }

    #[test]
    fn test_find_by_hierarchy_code() {
        let store = store();
        let positions: Vec<usize> = store
            .find_by_hierarchy_code("21")
            .into_iter()
            .map(|(i, _)| i)
            .collect();
        assert_eq!(positions, vec![1, 2]);
        assert_eq!(store.find_by_hierarchy_code("212").len(), 1);
        // family code is not part of the hierarchy tier
        assert!(store.find_by_hierarchy_code("2120").is_empty());
    }

    #[test]
    fn test_fingerprint_tracks_content_and_order() {
        let a = store();
        let b = store();
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().len(), 64);

        let mut records: Vec<Record> = a.iter().cloned().collect();
        records.reverse();
        let reversed = RecordStore::from_records(records).unwrap();
        assert_ne!(a.fingerprint(), reversed.fingerprint());
    }
}
