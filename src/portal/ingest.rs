use crate::portal::*;

use crate::portal::store::{
    apportioned_snapshot, ChamberSnapshot, ScrutinyRecord, SnapshotKey, StagedBatch,
};

use std::collections::{BTreeMap, HashSet};
use std::fmt::Display;
use std::sync::Arc;

/// Why a submission was refused.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum IngestIssue {
    UnknownDistrict { district: String },
    NotANumber { list: String, raw: String },
    OutOfRange { list: String, raw: String },
    UnknownList { list: String },
    DuplicateList { list: String },
    SumExceeded { total: Percentage },
}

impl Display for IngestIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IngestIssue::UnknownDistrict { district } => {
                write!(f, "unknown district {}", district)
            }
            IngestIssue::NotANumber { list, raw } => {
                write!(f, "list {}: {:?} is not a percentage", list, raw)
            }
            IngestIssue::OutOfRange { list, raw } => {
                write!(f, "list {}: {} is outside [0, 100]", list, raw)
            }
            IngestIssue::UnknownList { list } => {
                write!(f, "list {} does not run for this chamber", list)
            }
            IngestIssue::DuplicateList { list } => write!(f, "list {} is given twice", list),
            IngestIssue::SumExceeded { total } => {
                write!(f, "percentages add up to {}, above 100", total)
            }
        }
    }
}

/// A full set of values for one district and chamber, as typed by an operator.
/// `None` or a blank string is a blank entry.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Submission {
    pub district: String,
    pub chamber: Chamber,
    pub entries: Vec<(String, Option<String>)>,
}

#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub key: SnapshotKey,
    pub snapshot: Arc<ChamberSnapshot>,
}

fn rejected(submission: &Submission, issues: Vec<IngestIssue>) -> PortalError {
    RejectedSnafu {
        district: submission.district.clone(),
        chamber: submission.chamber,
        issues,
    }
    .build()
}

/// Validates a submission as a whole and turns it into a batch that replaces
/// every record of the district and chamber.
///
/// Registered lists missing from the submission are blank.
pub fn stage_submission(election: &Election, submission: &Submission) -> PortalResult<StagedBatch> {
    if election.district(&submission.district).is_err() {
        return Err(rejected(
            submission,
            vec![IngestIssue::UnknownDistrict {
                district: submission.district.clone(),
            }],
        ));
    }
    let lists = election.lists_for(&submission.district, submission.chamber);

    let mut issues: Vec<IngestIssue> = Vec::new();
    let mut seen: HashSet<&str> = HashSet::new();
    let mut values: BTreeMap<&str, Percentage> = BTreeMap::new();
    for (list_id, raw_o) in submission.entries.iter() {
        if !lists.iter().any(|l| &l.code == list_id) {
            issues.push(IngestIssue::UnknownList {
                list: list_id.clone(),
            });
            continue;
        }
        if !seen.insert(list_id.as_str()) {
            issues.push(IngestIssue::DuplicateList {
                list: list_id.clone(),
            });
            continue;
        }
        let raw = match raw_o.as_deref().map(str::trim) {
            None | Some("") => continue,
            Some(raw) => raw,
        };
        match Percentage::parse_hundredths(raw) {
            Err(_) => issues.push(IngestIssue::NotANumber {
                list: list_id.clone(),
                raw: raw.to_string(),
            }),
            Ok(h) if !(0..=(Percentage::FULL.hundredths() as i64)).contains(&h) => {
                issues.push(IngestIssue::OutOfRange {
                    list: list_id.clone(),
                    raw: raw.to_string(),
                })
            }
            Ok(h) => {
                values.insert(list_id.as_str(), Percentage::from_hundredths(h as u32));
            }
        }
    }
    let total: Percentage = values.values().cloned().sum();
    if total > Percentage::FULL {
        issues.push(IngestIssue::SumExceeded { total });
    }
    if !issues.is_empty() {
        debug!("stage_submission: issues {:?}", issues);
        return Err(rejected(submission, issues));
    }

    let changes: BTreeMap<String, Option<ScrutinyRecord>> = lists
        .iter()
        .map(|l| {
            let record = values.get(l.code.as_str()).map(|p| ScrutinyRecord {
                list_id: l.code.clone(),
                order: l.order,
                percentage: *p,
            });
            (l.code.clone(), record)
        })
        .collect();
    Ok(StagedBatch {
        key: SnapshotKey::new(&submission.district, submission.chamber),
        changes,
    })
}

/// Validates and applies a submission atomically, then returns the fresh seat table.
/// A rejected submission leaves the stored records untouched.
pub fn ingest(
    election: &Election,
    store: &ScrutinyStore,
    submission: &Submission,
) -> PortalResult<IngestOutcome> {
    let batch = stage_submission(election, submission)?;
    let key = batch.key.clone();
    let revision = store.commit(batch)?;
    info!(
        "ingest: {}/{} updated to revision {}",
        key.district, key.chamber, revision
    );
    let snapshot = apportioned_snapshot(election, store, &key)?;
    Ok(IngestOutcome { key, snapshot })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::portal::registry::{District, ElectionList};

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn election() -> Election {
        let district = District {
            id: "a".to_string(),
            name: "Alfa".to_string(),
            lower_seats: 5,
            upper_seats: 3,
            total_deputies: None,
            total_senators: None,
            registered_voters: 0,
            votes_cast: None,
            tables_reporting: 0,
            tables_total: 0,
        };
        let lists = ["A", "B", "C"]
            .iter()
            .enumerate()
            .map(|(i, code)| ElectionList {
                district: "a".to_string(),
                code: code.to_string(),
                name: format!("Lista {}", code),
                national_alignment: None,
                order: i as u32 + 1,
                chambers: Chamber::ALL.to_vec(),
            })
            .collect();
        Election::new(
            "test".to_string(),
            ApportionmentRules::DEFAULT_RULES,
            vec![district],
            lists,
        )
        .unwrap()
    }

    fn submission(chamber: Chamber, entries: &[(&str, &str)]) -> Submission {
        Submission {
            district: "a".to_string(),
            chamber,
            entries: entries
                .iter()
                .map(|(l, v)| (l.to_string(), Some(v.to_string())))
                .collect(),
        }
    }

    fn percentages(snap: &ChamberSnapshot) -> Vec<(String, String)> {
        snap.records
            .iter()
            .map(|r| (r.list_id.clone(), r.percentage.to_string()))
            .collect()
    }

    #[test]
    fn accepted_submission_is_apportioned() {
        init();
        let e = election();
        let store = ScrutinyStore::new();
        let out = ingest(
            &e,
            &store,
            &submission(Chamber::Lower, &[("A", "50"), ("B", "30"), ("C", "20")]),
        )
        .unwrap();
        assert_eq!(out.snapshot.revision, 1);
        assert_eq!(out.snapshot.seats.seats_for("A"), 3);
        assert_eq!(out.snapshot.seats.seats_for("B"), 1);
        assert_eq!(out.snapshot.seats.seats_for("C"), 1);

        let out = ingest(
            &e,
            &store,
            &submission(Chamber::Upper, &[("A", "45"), ("B", "35"), ("C", "20")]),
        )
        .unwrap();
        assert_eq!(out.snapshot.seats.seats_for("A"), 2);
        assert_eq!(out.snapshot.seats.seats_for("B"), 1);
    }

    #[test]
    fn rejected_submission_keeps_previous_records() {
        init();
        let e = election();
        let store = ScrutinyStore::new();
        ingest(&e, &store, &submission(Chamber::Lower, &[("A", "60"), ("B", "40")])).unwrap();

        let res = ingest(&e, &store, &submission(Chamber::Lower, &[("A", "70"), ("B", "40")]));
        match res {
            Err(PortalError::Rejected { issues, .. }) => assert_eq!(
                issues,
                vec![IngestIssue::SumExceeded {
                    total: Percentage::from_hundredths(11000)
                }]
            ),
            x => panic!("unexpected result {:?}", x),
        }
        let key = SnapshotKey::new("a", Chamber::Lower);
        assert_eq!(store.revision(&key).unwrap(), 1);
        let snap = apportioned_snapshot(&e, &store, &key).unwrap();
        assert_eq!(
            percentages(&snap),
            vec![
                ("A".to_string(), "60.00".to_string()),
                ("B".to_string(), "40.00".to_string())
            ]
        );
    }

    #[test]
    fn same_submission_twice_gives_same_records() {
        let e = election();
        let store = ScrutinyStore::new();
        let s = submission(Chamber::Lower, &[("A", "50.5"), ("B", "0"), ("C", "")]);
        let first = ingest(&e, &store, &s).unwrap();
        let second = ingest(&e, &store, &s).unwrap();
        assert_eq!(first.snapshot.records, second.snapshot.records);
        assert_eq!(first.snapshot.seats, second.snapshot.seats);
        assert_eq!(second.snapshot.revision, 2);
        assert_eq!(
            percentages(&second.snapshot),
            vec![
                ("A".to_string(), "50.50".to_string()),
                ("B".to_string(), "0.00".to_string())
            ]
        );
    }

    #[test]
    fn blank_deletes_the_record() {
        let e = election();
        let store = ScrutinyStore::new();
        ingest(&e, &store, &submission(Chamber::Lower, &[("A", "60"), ("B", "40")])).unwrap();
        let out = ingest(&e, &store, &submission(Chamber::Lower, &[("A", "60"), ("B", "")])).unwrap();
        let key = SnapshotKey::new("a", Chamber::Lower);
        assert!(!store.is_reported(&key, "B").unwrap());
        assert_eq!(out.snapshot.seats.seats_for("B"), 0);
        assert_eq!(out.snapshot.seats.seats_for("A"), 5);

        // Lists left out of the submission are blank too.
        let out = ingest(&e, &store, &submission(Chamber::Lower, &[("C", "10")])).unwrap();
        assert_eq!(
            percentages(&out.snapshot),
            vec![("C".to_string(), "10.00".to_string())]
        );
    }

    #[test]
    fn invalid_values_are_all_reported() {
        let e = election();
        let store = ScrutinyStore::new();
        let res = ingest(
            &e,
            &store,
            &submission(
                Chamber::Lower,
                &[("A", "abc"), ("B", "-1"), ("C", "100.01"), ("Z", "1"), ("A", "2")],
            ),
        );
        match res {
            Err(PortalError::Rejected { issues, .. }) => assert_eq!(
                issues,
                vec![
                    IngestIssue::NotANumber {
                        list: "A".to_string(),
                        raw: "abc".to_string()
                    },
                    IngestIssue::OutOfRange {
                        list: "B".to_string(),
                        raw: "-1".to_string()
                    },
                    IngestIssue::OutOfRange {
                        list: "C".to_string(),
                        raw: "100.01".to_string()
                    },
                    IngestIssue::UnknownList {
                        list: "Z".to_string()
                    },
                    IngestIssue::DuplicateList {
                        list: "A".to_string()
                    },
                ]
            ),
            x => panic!("unexpected result {:?}", x),
        }
        assert!(!store
            .has_records(&SnapshotKey::new("a", Chamber::Lower))
            .unwrap());
    }

    #[test]
    fn unknown_district_is_rejected() {
        let e = election();
        let store = ScrutinyStore::new();
        let res = ingest(
            &e,
            &store,
            &Submission {
                district: "zz".to_string(),
                chamber: Chamber::Lower,
                entries: vec![],
            },
        );
        assert!(matches!(res, Err(PortalError::Rejected { .. })));
    }

    #[test]
    fn rejection_message_names_the_total() {
        let e = election();
        let err = stage_submission(&e, &submission(Chamber::Upper, &[("A", "70"), ("B", "40")]))
            .unwrap_err();
        assert!(err.to_string().contains("110.00"));
    }
}
