//! Repository Implementation

use crate::{SightingLedger, StorageError};
use chrono::{DateTime, Utc};
use plate_tracker::Panel;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

/// Ledger row for one plate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SightingRecord {
    pub license_plate_number: String,
    /// First time the plate was recorded
    pub input_time: DateTime<Utc>,
    /// Most recent time the plate was recorded
    pub output_time: DateTime<Utc>,
    /// Panel of the most recent sighting
    pub last_panel: Panel,
    pub sightings: u32,
}

/// Repository for sighting records (in-memory implementation)
pub struct Repository {
    records: Mutex<VecDeque<SightingRecord>>,
    /// Oldest records are evicted past this size
    max_records: usize,
}

impl Repository {
    /// Create a new in-memory repository
    pub fn new(max_records: usize) -> Self {
        info!("Creating in-memory sighting ledger (max {} records)", max_records);
        Self {
            records: Mutex::new(VecDeque::new()),
            max_records: max_records.max(1),
        }
    }

    fn records(&self) -> Result<MutexGuard<'_, VecDeque<SightingRecord>>, StorageError> {
        self.records
            .lock()
            .map_err(|e| StorageError::Unavailable(format!("Lock error: {}", e)))
    }

    /// Look up a plate
    pub fn get(&self, plate: &str) -> Result<SightingRecord, StorageError> {
        let records = self.records()?;
        records
            .iter()
            .find(|r| r.license_plate_number == plate)
            .cloned()
            .ok_or(StorageError::NotFound)
    }

    /// Most recently updated records first
    pub fn recent(&self, limit: usize) -> Result<Vec<SightingRecord>, StorageError> {
        let records = self.records()?;
        Ok(records.iter().rev().take(limit).cloned().collect())
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clear all data
    pub fn clear(&self) {
        if let Ok(mut records) = self.records.lock() {
            records.clear();
        }
    }
}

impl Default for Repository {
    fn default() -> Self {
        Self::new(10_000)
    }
}

impl SightingLedger for Repository {
    fn record(&self, plate: &str, panel: Panel, at: DateTime<Utc>) -> Result<(), StorageError> {
        let mut records = self.records()?;

        // Updated rows move to the back so eviction drops the stalest plate
        let record = match records.iter().position(|r| r.license_plate_number == plate) {
            Some(index) => {
                let mut existing = records.remove(index).ok_or(StorageError::NotFound)?;
                existing.output_time = at;
                existing.last_panel = panel;
                existing.sightings += 1;
                debug!("Updated ledger entry for {} ({} sightings)", plate, existing.sightings);
                existing
            }
            None => {
                debug!("New ledger entry for {} at {}", plate, panel);
                SightingRecord {
                    license_plate_number: plate.to_string(),
                    input_time: at,
                    output_time: at,
                    last_panel: panel,
                    sightings: 1,
                }
            }
        };

        while records.len() >= self.max_records {
            records.pop_front();
        }
        records.push_back(record);
        Ok(())
    }
}
