// In-memory storage of the reported shares, with a cache of the seat tables.

use crate::portal::*;

use crate::portal::ingest::IngestIssue;

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, RwLock};

#[derive(Eq, PartialEq, Debug, Clone, Hash, Ord, PartialOrd)]
pub struct SnapshotKey {
    pub district: String,
    pub chamber: Chamber,
}

impl SnapshotKey {
    pub fn new(district: &str, chamber: Chamber) -> SnapshotKey {
        SnapshotKey {
            district: district.to_string(),
            chamber,
        }
    }
}

/// The reported share of one list. A list without a record is pending.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct ScrutinyRecord {
    pub list_id: String,
    pub order: u32,
    pub percentage: Percentage,
}

/// A consistent view of one district and chamber: the records and the seats
/// computed from exactly these records.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct ChamberSnapshot {
    /// Sorted by order, then list.
    pub records: Vec<ScrutinyRecord>,
    pub revision: u64,
    pub seats: ApportionmentResult,
}

impl ChamberSnapshot {
    pub fn record(&self, list_id: &str) -> Option<&ScrutinyRecord> {
        self.records.iter().find(|r| r.list_id == list_id)
    }

    pub fn total(&self) -> Percentage {
        self.records.iter().map(|r| r.percentage).sum()
    }
}

/// A set of changes to apply at once. `None` deletes the record of a list.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct StagedBatch {
    pub key: SnapshotKey,
    pub changes: BTreeMap<String, Option<ScrutinyRecord>>,
}

#[derive(Debug, Clone, Default)]
struct ChamberRecords {
    records: BTreeMap<String, ScrutinyRecord>,
    revision: u64,
}

impl ChamberRecords {
    fn sorted(&self) -> Vec<ScrutinyRecord> {
        let mut v: Vec<ScrutinyRecord> = self.records.values().cloned().collect();
        v.sort_by(|a, b| (a.order, &a.list_id).cmp(&(b.order, &b.list_id)));
        v
    }
}

/// The records of all districts and chambers.
///
/// Batches are applied under the write lock, so readers see either all of a batch
/// or none of it. Seat tables are cached per key and dropped by the write that
/// makes them stale. Locks are always taken records first, then cache.
#[derive(Debug, Default)]
pub struct ScrutinyStore {
    records: RwLock<BTreeMap<SnapshotKey, ChamberRecords>>,
    seats: Mutex<HashMap<SnapshotKey, Arc<ChamberSnapshot>>>,
}

impl ScrutinyStore {
    pub fn new() -> ScrutinyStore {
        ScrutinyStore::default()
    }

    /// Applies all the changes of a batch, or none of them. Returns the new revision.
    pub fn commit(&self, batch: StagedBatch) -> PortalResult<u64> {
        let mut all = self
            .records
            .write()
            .map_err(|_| StorePoisonedSnafu {}.build())?;
        let mut next = all.get(&batch.key).cloned().unwrap_or_default();
        for (list_id, change) in batch.changes.into_iter() {
            match change {
                Some(record) => {
                    next.records.insert(list_id, record);
                }
                None => {
                    next.records.remove(&list_id);
                }
            }
        }
        let total: Percentage = next.records.values().map(|r| r.percentage).sum();
        if total > Percentage::FULL {
            return RejectedSnafu {
                district: batch.key.district.clone(),
                chamber: batch.key.chamber,
                issues: vec![IngestIssue::SumExceeded { total }],
            }
            .fail();
        }
        next.revision += 1;
        let revision = next.revision;

        let mut cache = self.seats.lock().map_err(|_| StorePoisonedSnafu {}.build())?;
        cache.remove(&batch.key);
        all.insert(batch.key.clone(), next);
        debug!(
            "commit: {}/{} now at revision {}",
            batch.key.district, batch.key.chamber, revision
        );
        Ok(revision)
    }

    #[cfg(test)]
    pub fn records(&self, key: &SnapshotKey) -> PortalResult<Vec<ScrutinyRecord>> {
        let all = self
            .records
            .read()
            .map_err(|_| StorePoisonedSnafu {}.build())?;
        Ok(all.get(key).map(|c| c.sorted()).unwrap_or_default())
    }

    #[cfg(test)]
    pub fn has_records(&self, key: &SnapshotKey) -> PortalResult<bool> {
        let all = self
            .records
            .read()
            .map_err(|_| StorePoisonedSnafu {}.build())?;
        Ok(all.get(key).map(|c| !c.records.is_empty()).unwrap_or(false))
    }

    #[cfg(test)]
    pub fn is_reported(&self, key: &SnapshotKey, list_id: &str) -> PortalResult<bool> {
        let all = self
            .records
            .read()
            .map_err(|_| StorePoisonedSnafu {}.build())?;
        Ok(all
            .get(key)
            .map(|c| c.records.contains_key(list_id))
            .unwrap_or(false))
    }

    /// Number of batches applied to a key so far.
    #[cfg(test)]
    pub fn revision(&self, key: &SnapshotKey) -> PortalResult<u64> {
        let all = self
            .records
            .read()
            .map_err(|_| StorePoisonedSnafu {}.build())?;
        Ok(all.get(key).map(|c| c.revision).unwrap_or(0))
    }

    /// The records of a key together with their seats. The seats are computed by
    /// `compute` on a miss and kept until the next write to that key.
    ///
    /// Errors are returned to the caller and never cached.
    pub fn snapshot<F>(&self, key: &SnapshotKey, compute: F) -> PortalResult<Arc<ChamberSnapshot>>
    where
        F: FnOnce(&[ScrutinyRecord]) -> PortalResult<ApportionmentResult>,
    {
        // The read lock is held until the snapshot is cached, so that no write can
        // slip in between the records and their seats.
        let all = self
            .records
            .read()
            .map_err(|_| StorePoisonedSnafu {}.build())?;
        let (records, revision) = match all.get(key) {
            Some(c) => (c.sorted(), c.revision),
            None => (Vec::new(), 0),
        };
        {
            let cache = self.seats.lock().map_err(|_| StorePoisonedSnafu {}.build())?;
            if let Some(snap) = cache.get(key) {
                if snap.revision == revision {
                    return Ok(snap.clone());
                }
            }
        }

        let seats = compute(&records)?;
        let snap = Arc::new(ChamberSnapshot {
            records,
            revision,
            seats,
        });
        let mut cache = self.seats.lock().map_err(|_| StorePoisonedSnafu {}.build())?;
        cache.insert(key.clone(), snap.clone());
        Ok(snap)
    }

    #[cfg(test)]
    pub fn is_cached(&self, key: &SnapshotKey) -> PortalResult<bool> {
        let cache = self.seats.lock().map_err(|_| StorePoisonedSnafu {}.build())?;
        Ok(cache.contains_key(key))
    }
}

/// The snapshot of a district and chamber, with the seats apportioned under the
/// rules of the election.
pub fn apportioned_snapshot(
    election: &Election,
    store: &ScrutinyStore,
    key: &SnapshotKey,
) -> PortalResult<Arc<ChamberSnapshot>> {
    let district = election.district(&key.district)?;
    let seats = district.seats(key.chamber);
    store.snapshot(key, |records| {
        let shares: Vec<ListShare> = records
            .iter()
            .map(|r| ListShare {
                list_id: r.list_id.clone(),
                order: r.order,
                percentage: r.percentage,
            })
            .collect();
        let res = apportion(key.chamber, &shares, seats, &election.rules);
        if let Err(e) = &res {
            error!(
                "apportioned_snapshot: {}/{} could not be apportioned: {}",
                key.district, key.chamber, e
            );
        }
        res.context(ApportionmentSnafu {
            district: key.district.clone(),
            chamber: key.chamber,
        })
    })
}
