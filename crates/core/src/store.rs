//! YAML-backed record tables.
//!
//! Every record kind owns one table directory under the practice data directory. Each record
//! is a single YAML document in its own sharded directory:
//!
//! ```text
//! <data_dir>/
//!   <table>/
//!     <s1>/
//!       <s2>/
//!         <id>/
//!           record.yaml
//!           files/          # optional binary attachments (see nadym-files)
//! ```
//!
//! where `s1` and `s2` are the first four hex characters of the record id.
//!
//! [`RecordStore`] performs one file operation per call. Writes go through a temporary file
//! and a rename, so a reader never observes a half-written record, but there is no locking
//! between concurrent writers of the same record.
//!
//! Listing is forgiving in the same way as the rest of the system: a record file that cannot
//! be parsed is logged and skipped rather than failing the whole list.

use crate::config::CoreConfig;
use crate::constants::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE, RECORD_FILE_NAME};
use crate::error::{PracticeError, PracticeResult};
use chrono::{DateTime, Utc};
use nadym_uuid::RecordId;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fs;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

/// A record kind that can be stored in a [`RecordStore`].
pub trait Record: Serialize + DeserializeOwned + Clone {
    /// Table (directory) name under the data directory.
    const TABLE: &'static str;

    /// Human-readable kind used in "not found" errors.
    const KIND: &'static str;

    fn id(&self) -> RecordId;

    /// Stamps the record as modified at `now`.
    fn touch(&mut self, now: DateTime<Utc>);
}

/// Storage for one table of records.
#[derive(Debug)]
pub struct RecordStore<T> {
    table_dir: PathBuf,
    _record: PhantomData<fn() -> T>,
}

impl<T> Clone for RecordStore<T> {
    fn clone(&self) -> Self {
        Self {
            table_dir: self.table_dir.clone(),
            _record: PhantomData,
        }
    }
}

impl<T: Record> RecordStore<T> {
    pub fn new(cfg: &CoreConfig) -> Self {
        Self {
            table_dir: cfg.table_dir(T::TABLE),
            _record: PhantomData,
        }
    }

    pub fn table_dir(&self) -> &Path {
        &self.table_dir
    }

    /// Directory that holds the record and any attached files.
    pub fn record_dir(&self, id: RecordId) -> PathBuf {
        id.sharded_dir(&self.table_dir)
    }

    fn record_path(&self, id: RecordId) -> PathBuf {
        self.record_dir(id).join(RECORD_FILE_NAME)
    }

    /// Stores a new record.
    ///
    /// # Errors
    ///
    /// Returns [`PracticeError::Conflict`] if a record with the same id already exists, or an
    /// I/O / serialisation error if the file cannot be written.
    pub fn insert(&self, record: T) -> PracticeResult<T> {
        let id = record.id();
        let dir = self.record_dir(id);

        if dir.join(RECORD_FILE_NAME).exists() {
            return Err(PracticeError::Conflict(format!(
                "{} {} already exists",
                T::KIND,
                id
            )));
        }

        fs::create_dir_all(&dir).map_err(PracticeError::DirCreation)?;
        self.write(&record)?;

        tracing::debug!("inserted {} {}", T::KIND, id);
        Ok(record)
    }

    /// Returns the record or [`PracticeError::NotFound`].
    pub fn get(&self, id: RecordId) -> PracticeResult<T> {
        self.find(id)?
            .ok_or_else(|| PracticeError::not_found(T::KIND, id))
    }

    /// Returns the record if it exists.
    pub fn find(&self, id: RecordId) -> PracticeResult<Option<T>> {
        let path = self.record_path(id);
        if !path.is_file() {
            return Ok(None);
        }

        let contents = fs::read_to_string(&path).map_err(PracticeError::FileRead)?;
        let record = serde_yaml::from_str(&contents).map_err(PracticeError::YamlDeserialization)?;
        Ok(Some(record))
    }

    /// Loads a record, applies `change` and writes it back with a fresh `updated_at`.
    ///
    /// Nothing is written if `change` fails.
    pub fn update<F>(&self, id: RecordId, change: F) -> PracticeResult<T>
    where
        F: FnOnce(&mut T) -> PracticeResult<()>,
    {
        let mut record = self.get(id)?;
        change(&mut record)?;
        record.touch(Utc::now());
        self.write(&record)?;
        Ok(record)
    }

    /// Removes the record directory, attachments included.
    pub fn delete(&self, id: RecordId) -> PracticeResult<()> {
        let dir = self.record_dir(id);
        if !dir.join(RECORD_FILE_NAME).is_file() {
            return Err(PracticeError::not_found(T::KIND, id));
        }

        fs::remove_dir_all(&dir).map_err(PracticeError::DirRemoval)?;
        tracing::debug!("deleted {} {}", T::KIND, id);
        Ok(())
    }

    /// Lists every readable record in the table, in no particular order.
    ///
    /// A missing table directory yields an empty list. Unparsable record files are logged
    /// as warnings and skipped.
    pub fn list(&self) -> Vec<T> {
        let mut records = Vec::new();

        let s1_iter = match fs::read_dir(&self.table_dir) {
            Ok(it) => it,
            Err(_) => return records,
        };

        for s1 in s1_iter.flatten() {
            let s1_path = s1.path();
            if !s1_path.is_dir() {
                continue;
            }

            let s2_iter = match fs::read_dir(&s1_path) {
                Ok(it) => it,
                Err(_) => continue,
            };

            for s2 in s2_iter.flatten() {
                let s2_path = s2.path();
                if !s2_path.is_dir() {
                    continue;
                }

                let id_iter = match fs::read_dir(&s2_path) {
                    Ok(it) => it,
                    Err(_) => continue,
                };

                for id_ent in id_iter.flatten() {
                    let record_path = id_ent.path().join(RECORD_FILE_NAME);
                    if !record_path.is_file() {
                        continue;
                    }

                    let contents = match fs::read_to_string(&record_path) {
                        Ok(c) => c,
                        Err(e) => {
                            tracing::warn!(
                                "failed to read {}: {} - {}",
                                RECORD_FILE_NAME,
                                record_path.display(),
                                e
                            );
                            continue;
                        }
                    };

                    match serde_yaml::from_str::<T>(&contents) {
                        Ok(record) => records.push(record),
                        Err(e) => {
                            tracing::warn!(
                                "failed to parse {} record: {} - {}",
                                T::KIND,
                                record_path.display(),
                                e
                            );
                        }
                    }
                }
            }
        }

        records
    }

    pub fn count(&self) -> usize {
        self.list().len()
    }

    /// Runs `query` over the whole table.
    pub fn query(&self, query: &Query<'_, T>) -> Page<T> {
        query.apply(self.list())
    }

    fn write(&self, record: &T) -> PracticeResult<()> {
        let path = self.record_path(record.id());
        let yaml = serde_yaml::to_string(record).map_err(PracticeError::YamlSerialization)?;

        let tmp = path.with_extension("yaml.tmp");
        fs::write(&tmp, yaml).map_err(PracticeError::FileWrite)?;
        fs::rename(&tmp, &path).map_err(PracticeError::FileWrite)?;
        Ok(())
    }
}

/// Sort direction for [`Query::order_by`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

/// Zero-based page selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    page: usize,
    size: usize,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 0,
            size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl PageRequest {
    /// Builds a page request, defaulting the size to 20 and clamping it to `1..=100`.
    pub fn new(page: Option<usize>, size: Option<usize>) -> Self {
        Self {
            page: page.unwrap_or(0),
            size: size.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE),
        }
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn size(&self) -> usize {
        self.size
    }
}

type Predicate<'a, T> = Box<dyn Fn(&T) -> bool + Send + Sync + 'a>;
type Comparator<'a, T> = Box<dyn Fn(&T, &T) -> Ordering + Send + Sync + 'a>;

/// Filter, order and page selection over one table.
///
/// All filters must match. Without an explicit page the whole result is returned as a single
/// page.
pub struct Query<'a, T> {
    filters: Vec<Predicate<'a, T>>,
    order: Option<(Comparator<'a, T>, SortDirection)>,
    page: Option<PageRequest>,
}

impl<T> Default for Query<'_, T> {
    fn default() -> Self {
        Self {
            filters: Vec::new(),
            order: None,
            page: None,
        }
    }
}

impl<'a, T> Query<'a, T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, predicate: impl Fn(&T) -> bool + Send + Sync + 'a) -> Self {
        self.filters.push(Box::new(predicate));
        self
    }

    pub fn order_by(
        mut self,
        compare: impl Fn(&T, &T) -> Ordering + Send + Sync + 'a,
        direction: SortDirection,
    ) -> Self {
        self.order = Some((Box::new(compare), direction));
        self
    }

    pub fn paged(mut self, page: PageRequest) -> Self {
        self.page = Some(page);
        self
    }

    /// Applies the query to an in-memory set of records.
    pub fn apply(&self, records: Vec<T>) -> Page<T> {
        let mut matched: Vec<T> = records
            .into_iter()
            .filter(|r| self.filters.iter().all(|f| f(r)))
            .collect();

        if let Some((compare, direction)) = &self.order {
            matched.sort_by(|a, b| match direction {
                SortDirection::Asc => compare(a, b),
                SortDirection::Desc => compare(b, a),
            });
        }

        let total_items = matched.len();

        let Some(request) = self.page else {
            return Page {
                page: 0,
                size: total_items,
                total_pages: usize::from(total_items > 0),
                total_items,
                items: matched,
            };
        };

        let items: Vec<T> = matched
            .into_iter()
            .skip(request.page.saturating_mul(request.size))
            .take(request.size)
            .collect();

        Page {
            items,
            page: request.page,
            size: request.size,
            total_items,
            total_pages: total_items.div_ceil(request.size),
        }
    }
}

/// One page of query results.
#[derive(Debug, Clone, PartialEq, Serialize, utoipa::ToSchema)]
#[aliases(
    PatientPage = Page<crate::patients::Patient>,
    IntakePage = Page<crate::observance::MedicationIntake>,
    ConsultationPage = Page<crate::telemedicine::VideoConsultation>,
    ExpertiseRequestPage = Page<crate::teleexpertise::ExpertiseRequest>,
    TranscriptionPage = Page<crate::transcription::Transcription>
)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: usize,
    pub size: usize,
    pub total_items: usize,
    pub total_pages: usize,
}

impl<T> Page<T> {
    /// Maps every item, keeping the paging fields.
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            page: self.page,
            size: self.size,
            total_items: self.total_items,
            total_pages: self.total_pages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Note {
        id: RecordId,
        body: String,
        rank: u32,
        updated_at: DateTime<Utc>,
    }

    impl Record for Note {
        const TABLE: &'static str = "notes";
        const KIND: &'static str = "note";

        fn id(&self) -> RecordId {
            self.id
        }

        fn touch(&mut self, now: DateTime<Utc>) {
            self.updated_at = now;
        }
    }

    fn note(body: &str, rank: u32) -> Note {
        Note {
            id: RecordId::new(),
            body: body.into(),
            rank,
            updated_at: Utc::now(),
        }
    }

    fn test_store(dir: &Path) -> RecordStore<Note> {
        let cfg = Arc::new(
            CoreConfig::with_defaults(dir.to_path_buf()).expect("CoreConfig should build"),
        );
        RecordStore::new(&cfg)
    }

    #[test]
    fn test_insert_writes_sharded_record_file() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = test_store(temp_dir.path());
        let n = store.insert(note("first", 1)).expect("insert should succeed");

        let id = n.id.to_string();
        let expected = temp_dir
            .path()
            .join("notes")
            .join(&id[0..2])
            .join(&id[2..4])
            .join(&id)
            .join(RECORD_FILE_NAME);
        assert!(expected.is_file());
        assert_eq!(store.get(n.id).expect("get should succeed"), n);
    }

    #[test]
    fn test_insert_same_id_conflicts() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = test_store(temp_dir.path());
        let n = store.insert(note("first", 1)).unwrap();
        assert!(matches!(store.insert(n), Err(PracticeError::Conflict(_))));
    }

    #[test]
    fn test_get_missing_is_not_found() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = test_store(temp_dir.path());
        let result = store.get(RecordId::new());
        assert!(matches!(result, Err(PracticeError::NotFound { kind: "note", .. })));
        assert!(store.find(RecordId::new()).unwrap().is_none());
    }

    #[test]
    fn test_update_applies_change_and_touches() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = test_store(temp_dir.path());
        let mut n = note("draft", 1);
        n.updated_at = DateTime::<Utc>::MIN_UTC;
        let n = store.insert(n).unwrap();

        let updated = store
            .update(n.id, |r| {
                r.body = "final".into();
                Ok(())
            })
            .expect("update should succeed");

        assert_eq!(updated.body, "final");
        assert!(updated.updated_at > DateTime::<Utc>::MIN_UTC);
        assert_eq!(store.get(n.id).unwrap().body, "final");
    }

    #[test]
    fn test_failed_update_writes_nothing() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = test_store(temp_dir.path());
        let n = store.insert(note("keep", 1)).unwrap();

        let result = store.update(n.id, |r| {
            r.body = "lost".into();
            Err(PracticeError::InvalidInput("nope".into()))
        });

        assert!(result.is_err());
        assert_eq!(store.get(n.id).unwrap().body, "keep");
    }

    #[test]
    fn test_delete_removes_directory() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = test_store(temp_dir.path());
        let n = store.insert(note("gone", 1)).unwrap();

        store.delete(n.id).expect("delete should succeed");
        assert!(!store.record_dir(n.id).exists());
        assert!(matches!(store.delete(n.id), Err(PracticeError::NotFound { .. })));
    }

    #[test]
    fn test_list_returns_empty_for_nonexistent_directory() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = test_store(temp_dir.path());
        assert!(store.list().is_empty());
        assert_eq!(store.count(), 0);
    }

    #[test]
    fn test_list_skips_invalid_yaml() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = test_store(temp_dir.path());
        store.insert(note("valid", 1)).unwrap();

        let bad_dir = store.record_dir(RecordId::new());
        fs::create_dir_all(&bad_dir).unwrap();
        fs::write(bad_dir.join(RECORD_FILE_NAME), "invalid: yaml: content: [[[").unwrap();

        let notes = store.list();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].body, "valid");
    }

    #[test]
    fn test_query_filters_orders_and_pages() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = test_store(temp_dir.path());
        for rank in 1..=25 {
            store.insert(note(&format!("n{rank}"), rank)).unwrap();
        }

        let query = Query::new()
            .filter(|n: &Note| n.rank % 2 == 1)
            .order_by(|a, b| a.rank.cmp(&b.rank), SortDirection::Desc)
            .paged(PageRequest::new(Some(1), Some(5)));
        let page = store.query(&query);

        assert_eq!(page.total_items, 13);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.page, 1);
        let ranks: Vec<u32> = page.items.iter().map(|n| n.rank).collect();
        assert_eq!(ranks, [15, 13, 11, 9, 7]);
    }

    #[test]
    fn test_unpaged_query_returns_everything() {
        let page = Query::new()
            .order_by(|a: &u32, b: &u32| a.cmp(b), SortDirection::Asc)
            .apply(vec![3, 1, 2]);
        assert_eq!(page.items, [1, 2, 3]);
        assert_eq!(page.total_pages, 1);

        let empty = Query::<u32>::new().apply(vec![]);
        assert_eq!(empty.total_pages, 0);
    }

    #[test]
    fn test_page_request_defaults_and_clamps() {
        assert_eq!(PageRequest::new(None, None).size(), DEFAULT_PAGE_SIZE);
        assert_eq!(PageRequest::new(None, Some(0)).size(), 1);
        assert_eq!(PageRequest::new(Some(3), Some(500)).size(), MAX_PAGE_SIZE);
        assert_eq!(PageRequest::new(Some(3), None).page(), 3);
    }
}
