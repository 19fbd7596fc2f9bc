// Read-side views: the dashboard across districts and the detail of one district.

use crate::portal::*;

use crate::portal::registry::District;
use crate::portal::store::{apportioned_snapshot, ChamberSnapshot, SnapshotKey};

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Which chambers a view shows. The two chambers are shown side by side, never added up.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum ChamberFilter {
    Lower,
    Upper,
    Both,
}

impl ChamberFilter {
    /// Unknown or missing values fall back to both chambers.
    pub fn parse_or_default(s: Option<&str>) -> ChamberFilter {
        match s.map(|x| x.trim().to_lowercase()).as_deref() {
            None | Some("") | Some("both") | Some("ambos") => ChamberFilter::Both,
            Some("lower") | Some("diputados") => ChamberFilter::Lower,
            Some("upper") | Some("senadores") => ChamberFilter::Upper,
            Some(x) => {
                warn!("Unknown chamber filter {:?}, showing both chambers", x);
                ChamberFilter::Both
            }
        }
    }

    pub fn chambers(&self) -> Vec<Chamber> {
        match self {
            ChamberFilter::Lower => vec![Chamber::Lower],
            ChamberFilter::Upper => vec![Chamber::Upper],
            ChamberFilter::Both => Chamber::ALL.to_vec(),
        }
    }

    pub fn includes(&self, chamber: Chamber) -> bool {
        self.chambers().contains(&chamber)
    }

    pub fn code(&self) -> &'static str {
        match self {
            ChamberFilter::Lower => "lower",
            ChamberFilter::Upper => "upper",
            ChamberFilter::Both => "both",
        }
    }
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct DashboardQuery {
    pub district: Option<String>,
    pub filter: ChamberFilter,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListRow {
    pub list: String,
    pub name: String,
    pub alignment: String,
    pub order: u32,
    /// `None` while the list is pending.
    pub percentage: Option<String>,
    pub status: String,
    pub seats: u32,
    pub passes_threshold: bool,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChamberTable {
    pub chamber: String,
    pub method: String,
    pub seats: u32,
    pub reported: bool,
    pub revision: u64,
    pub others_percentage: Option<String>,
    pub rows: Vec<ListRow>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DistrictView {
    pub id: String,
    pub name: String,
    pub registered_voters: u64,
    pub total_deputies: Option<u32>,
    pub total_senators: Option<u32>,
    pub participation_percentage: Option<String>,
    pub coverage_percentage: Option<String>,
    pub lower: Option<ChamberTable>,
    pub upper: Option<ChamberTable>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize)]
pub struct AlignmentRow {
    pub name: String,
    pub seats: u32,
    pub share: String,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize)]
pub struct OverallDistribution {
    pub chamber: String,
    pub method: String,
    pub items: Vec<AlignmentRow>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub districts_with_data: usize,
    pub lower_seats_in_dispute: Option<u32>,
    pub upper_seats_in_dispute: Option<u32>,
    pub reporting_lists: usize,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DistrictStatus {
    pub id: String,
    pub name: String,
    pub has_lower: bool,
    pub has_upper: bool,
    pub lower_seats: u32,
    pub upper_seats: u32,
    /// Registered voters of the district over the registered voters of the election.
    pub weight_percentage: Option<String>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    pub chamber_filter: String,
    pub stats: DashboardStats,
    pub overall: Vec<OverallDistribution>,
    pub districts: Vec<DistrictView>,
    pub district_statuses: Vec<DistrictStatus>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DistrictDetail {
    pub district: String,
    pub name: String,
    pub chamber: String,
    pub method: String,
    pub threshold: Option<String>,
    pub seats: u32,
    pub revision: u64,
    pub others_percentage: Option<String>,
    /// Reporting lists only, highest percentage first.
    pub rows: Vec<ListRow>,
}

fn list_rows(
    election: &Election,
    district: &District,
    chamber: Chamber,
    snap: &ChamberSnapshot,
) -> Vec<ListRow> {
    election
        .lists_for(&district.id, chamber)
        .iter()
        .map(|l| {
            let allocation = snap
                .seats
                .allocations
                .iter()
                .find(|a| a.list_id == l.code);
            ListRow {
                list: l.code.clone(),
                name: l.name.clone(),
                alignment: l.alignment().to_string(),
                order: l.order,
                percentage: snap.record(&l.code).map(|r| r.percentage.to_string()),
                status: if allocation.is_some() {
                    "reported".to_string()
                } else {
                    "pending".to_string()
                },
                seats: allocation.map(|a| a.seats).unwrap_or(0),
                passes_threshold: allocation.map(|a| a.qualified).unwrap_or(false),
            }
        })
        .collect()
}

fn others_percentage(snap: &ChamberSnapshot) -> Option<String> {
    if snap.records.is_empty() {
        None
    } else {
        Some(Percentage::FULL.saturating_sub(snap.total()).to_string())
    }
}

fn chamber_table(
    election: &Election,
    district: &District,
    chamber: Chamber,
    snap: &ChamberSnapshot,
) -> ChamberTable {
    ChamberTable {
        chamber: chamber.code().to_string(),
        method: chamber.method().to_string(),
        seats: district.seats(chamber),
        reported: !snap.records.is_empty(),
        revision: snap.revision,
        others_percentage: others_percentage(snap),
        rows: list_rows(election, district, chamber, snap),
    }
}

// A district, a chamber and the snapshot read for them.
type Table<'a> = (&'a District, Chamber, Arc<ChamberSnapshot>);

fn find_snapshot<'a>(
    tables: &'a [Table],
    district_id: &str,
    chamber: Chamber,
) -> Option<&'a Arc<ChamberSnapshot>> {
    tables
        .iter()
        .find(|(d, c, _)| d.id == district_id && *c == chamber)
        .map(|(_, _, s)| s)
}

fn has_data(tables: &[Table], district_id: &str, chamber: Chamber) -> bool {
    find_snapshot(tables, district_id, chamber)
        .map(|s| !s.records.is_empty())
        .unwrap_or(false)
}

// sum / weight, in hundredths, rounded half up.
fn weighted_share(sum: u128, weight: u128) -> Percentage {
    if weight == 0 {
        return Percentage::ZERO;
    }
    let h = (sum + weight / 2) / weight;
    Percentage::from_hundredths(h.min(u32::MAX as u128) as u32)
}

fn overall_distribution(
    election: &Election,
    chamber: Chamber,
    tables: &[Table],
) -> OverallDistribution {
    let mut seats: BTreeMap<String, u32> = BTreeMap::new();
    let mut weighted: BTreeMap<String, u128> = BTreeMap::new();
    let mut voters: u128 = 0;
    for (district, _, snap) in tables.iter().filter(|(_, c, _)| *c == chamber) {
        if snap.records.is_empty() {
            continue;
        }
        let weight = district.registered_voters as u128;
        voters += weight;
        for l in election.lists_for(&district.id, chamber) {
            let record = match snap.record(&l.code) {
                Some(r) => r,
                None => continue,
            };
            let name = l.alignment().to_string();
            *seats.entry(name.clone()).or_insert(0) += snap.seats.seats_for(&l.code);
            *weighted.entry(name).or_insert(0) += record.percentage.hundredths() as u128 * weight;
        }
    }
    let mut items: Vec<(AlignmentRow, Percentage)> = seats
        .iter()
        .map(|(name, s)| {
            let share = weighted_share(weighted.get(name).cloned().unwrap_or(0), voters);
            (
                AlignmentRow {
                    name: name.clone(),
                    seats: *s,
                    share: share.to_string(),
                },
                share,
            )
        })
        .collect();
    items.sort_by(|(a, pa), (b, pb)| {
        b.seats
            .cmp(&a.seats)
            .then_with(|| pb.cmp(pa))
            .then_with(|| a.name.cmp(&b.name))
    });
    OverallDistribution {
        chamber: chamber.code().to_string(),
        method: chamber.method().to_string(),
        items: items.into_iter().map(|(row, _)| row).collect(),
    }
}

/// Builds the dashboard for the districts and chambers selected by the query.
pub fn build_dashboard(
    election: &Election,
    store: &ScrutinyStore,
    query: &DashboardQuery,
) -> PortalResult<Dashboard> {
    let districts: Vec<&District> = match &query.district {
        Some(id) => vec![election.district(id)?],
        None => election.districts().iter().collect(),
    };
    let chambers = query.filter.chambers();

    // Every snapshot is taken once, so that all the views agree with each other.
    let mut tables: Vec<Table> = Vec::new();
    for d in districts.iter() {
        for c in Chamber::ALL.iter() {
            let snap = apportioned_snapshot(election, store, &SnapshotKey::new(&d.id, *c))?;
            tables.push((*d, *c, snap));
        }
    }

    let mut views: Vec<DistrictView> = Vec::new();
    for d in districts.iter() {
        let table_for = |chamber: Chamber| -> Option<ChamberTable> {
            if !query.filter.includes(chamber) {
                return None;
            }
            find_snapshot(&tables, &d.id, chamber).map(|s| chamber_table(election, d, chamber, s))
        };
        views.push(DistrictView {
            id: d.id.clone(),
            name: d.name.clone(),
            registered_voters: d.registered_voters,
            total_deputies: d.total_deputies,
            total_senators: d.total_senators,
            participation_percentage: d.participation().map(|p| p.to_string()),
            coverage_percentage: d.coverage().map(|p| p.to_string()),
            lower: table_for(Chamber::Lower),
            upper: table_for(Chamber::Upper),
        });
    }

    let seats_in_dispute = |chamber: Chamber| -> Option<u32> {
        if !query.filter.includes(chamber) {
            return None;
        }
        Some(
            districts
                .iter()
                .filter(|d| has_data(&tables, &d.id, chamber))
                .map(|d| d.seats(chamber))
                .sum(),
        )
    };
    let stats = DashboardStats {
        districts_with_data: districts
            .iter()
            .filter(|d| chambers.iter().any(|c| has_data(&tables, &d.id, *c)))
            .count(),
        lower_seats_in_dispute: seats_in_dispute(Chamber::Lower),
        upper_seats_in_dispute: seats_in_dispute(Chamber::Upper),
        reporting_lists: tables
            .iter()
            .filter(|(_, c, _)| query.filter.includes(*c))
            .map(|(_, _, s)| s.records.len())
            .sum(),
    };

    let overall: Vec<OverallDistribution> = chambers
        .iter()
        .map(|c| overall_distribution(election, *c, &tables))
        .collect();

    // The weight is relative to the whole election, whatever the query shows.
    let total_voters: u64 = election
        .districts()
        .iter()
        .map(|d| d.registered_voters)
        .sum();
    let district_statuses: Vec<DistrictStatus> = districts
        .iter()
        .map(|d| DistrictStatus {
            id: d.id.clone(),
            name: d.name.clone(),
            has_lower: has_data(&tables, &d.id, Chamber::Lower),
            has_upper: has_data(&tables, &d.id, Chamber::Upper),
            lower_seats: d.lower_seats,
            upper_seats: d.upper_seats,
            weight_percentage: if d.registered_voters == 0 {
                None
            } else {
                Percentage::ratio(d.registered_voters, total_voters).map(|p| p.to_string())
            },
        })
        .collect();

    debug!(
        "build_dashboard: {} districts, filter {}",
        views.len(),
        query.filter.code()
    );
    Ok(Dashboard {
        chamber_filter: query.filter.code().to_string(),
        stats,
        overall,
        districts: views,
        district_statuses,
    })
}

/// The reporting lists of one district and chamber, ranked by percentage.
pub fn district_detail(
    election: &Election,
    store: &ScrutinyStore,
    district_id: &str,
    chamber: Chamber,
) -> PortalResult<DistrictDetail> {
    let district = election.district(district_id)?;
    let snap = apportioned_snapshot(election, store, &SnapshotKey::new(district_id, chamber))?;
    let mut rows: Vec<ListRow> = list_rows(election, district, chamber, &snap)
        .into_iter()
        .filter(|r| r.percentage.is_some())
        .collect();
    rows.sort_by(|a, b| {
        let pa = snap.record(&a.list).map(|r| r.percentage);
        let pb = snap.record(&b.list).map(|r| r.percentage);
        pb.cmp(&pa)
            .then_with(|| a.order.cmp(&b.order))
            .then_with(|| a.list.cmp(&b.list))
    });
    Ok(DistrictDetail {
        district: district.id.clone(),
        name: district.name.clone(),
        chamber: chamber.code().to_string(),
        method: chamber.method().to_string(),
        threshold: match chamber {
            Chamber::Lower => Some(election.rules.lower_threshold.to_string()),
            Chamber::Upper => None,
        },
        seats: district.seats(chamber),
        revision: snap.revision,
        others_percentage: others_percentage(&snap),
        rows,
    })
}
