//! # src/storage/org_visits.rs
//!
//! Merkt sich, wann eine Organisation zuletzt angesehen wurde.

use super::collection::Collection;
use super::{DocumentStore, StorageError};
use crate::models::records::OrgVisitRecord;
use std::sync::Arc;

pub struct OrgVisitStore {
    visits: Collection<OrgVisitRecord>,
}

impl OrgVisitStore {
    pub fn new(store: Arc<dyn DocumentStore>, conflict_retries: u32) -> Self {
        OrgVisitStore {
            visits: Collection::new("org_visits", store, conflict_retries),
        }
    }

    pub async fn record_visit(&self, org_id: &str, time: i64) -> Result<(), StorageError> {
        self.visits
            .upsert(&OrgVisitRecord {
                org_id: org_id.to_string(),
                time,
            })
            .await
    }

    pub async fn last_visit(&self, org_id: &str) -> Result<Option<i64>, StorageError> {
        Ok(self.visits.get(org_id).await?.map(|v| v.time))
    }
}
