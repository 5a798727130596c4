use tracing::{info, warn};

use crate::error::StoreError;
use crate::records::{AttendanceRecord, Category};
use crate::store::RecordStore;

/// Every record of all three collections, tagged with its source category.
/// Taken once per view session and never modified afterwards.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    records: Vec<AttendanceRecord>,
}

impl Snapshot {
    pub fn new(records: Vec<AttendanceRecord>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[AttendanceRecord] {
        &self.records
    }

    /// Borrowed view of every record, the input shape of filters and stats.
    pub fn all(&self) -> Vec<&AttendanceRecord> {
        self.records.iter().collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn count(&self, category: Category) -> usize {
        self.records
            .iter()
            .filter(|r| r.category == category)
            .count()
    }
}

/// Fetch the three collections concurrently and merge them.
///
/// Any failed fetch fails the whole load so the view never shows partial
/// data. Payloads that are not JSON objects are skipped.
pub async fn load_snapshot<S: RecordStore>(store: &S) -> Result<Snapshot, StoreError> {
    let (in_person, social, cashier) = tokio::join!(
        store.fetch_all(Category::InPerson),
        store.fetch_all(Category::SocialChannel),
        store.fetch_all(Category::Cashier),
    );

    let mut records = Vec::new();
    for (category, fetched) in [
        (Category::InPerson, in_person),
        (Category::SocialChannel, social),
        (Category::Cashier, cashier),
    ] {
        for (key, payload) in fetched? {
            match AttendanceRecord::from_stored(category, key.clone(), payload) {
                Some(record) => records.push(record),
                None => warn!(%category, key = %key, "Skipping non-object record payload"),
            }
        }
    }

    info!(count = records.len(), "Loaded attendance snapshot");
    Ok(Snapshot::new(records))
}
