use crate::portal::*;

use std::collections::HashSet;

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct District {
    pub id: String,
    pub name: String,
    /// Lower chamber seats renewed in this election.
    pub lower_seats: u32,
    /// Upper chamber seats renewed in this election: 0 or 3.
    pub upper_seats: u32,
    pub total_deputies: Option<u32>,
    pub total_senators: Option<u32>,
    pub registered_voters: u64,
    pub votes_cast: Option<u64>,
    pub tables_reporting: u64,
    pub tables_total: u64,
}

impl District {
    pub fn seats(&self, chamber: Chamber) -> u32 {
        match chamber {
            Chamber::Lower => self.lower_seats,
            Chamber::Upper => self.upper_seats,
        }
    }

    pub fn participation(&self) -> Option<Percentage> {
        self.votes_cast
            .and_then(|v| Percentage::ratio(v, self.registered_voters))
    }

    pub fn coverage(&self) -> Option<Percentage> {
        Percentage::ratio(self.tables_reporting, self.tables_total)
    }
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct ElectionList {
    pub district: String,
    pub code: String,
    pub name: String,
    pub national_alignment: Option<String>,
    pub order: u32,
    pub chambers: Vec<Chamber>,
}

impl ElectionList {
    /// The national force this list belongs to, or its own name.
    pub fn alignment(&self) -> &str {
        self.national_alignment.as_deref().unwrap_or(&self.name)
    }

    pub fn contests(&self, chamber: Chamber) -> bool {
        self.chambers.contains(&chamber)
    }
}

/// The registered districts and lists. Immutable once built.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Election {
    pub name: String,
    pub rules: ApportionmentRules,
    // Sorted by name.
    districts: Vec<District>,
    // Sorted by district, order and code.
    lists: Vec<ElectionList>,
}

impl Election {
    pub fn new(
        name: String,
        rules: ApportionmentRules,
        districts: Vec<District>,
        lists: Vec<ElectionList>,
    ) -> PortalResult<Election> {
        let mut district_ids: HashSet<&str> = HashSet::new();
        for d in districts.iter() {
            if !district_ids.insert(d.id.as_str()) {
                return InvalidConfigSnafu {
                    message: format!("district {} is declared twice", d.id),
                }
                .fail();
            }
            if d.lower_seats > ApportionmentRules::MAX_LOWER_SEATS {
                return InvalidConfigSnafu {
                    message: format!(
                        "district {} renews {} lower seats, at most {} are possible",
                        d.id,
                        d.lower_seats,
                        ApportionmentRules::MAX_LOWER_SEATS
                    ),
                }
                .fail();
            }
            if d.upper_seats != 0 && d.upper_seats != ApportionmentRules::UPPER_SEATS {
                return InvalidConfigSnafu {
                    message: format!(
                        "district {} renews {} upper seats, only 0 or {} are possible",
                        d.id,
                        d.upper_seats,
                        ApportionmentRules::UPPER_SEATS
                    ),
                }
                .fail();
            }
        }

        let mut list_keys: HashSet<(&str, &str)> = HashSet::new();
        for l in lists.iter() {
            if !district_ids.contains(l.district.as_str()) {
                return InvalidConfigSnafu {
                    message: format!("list {} refers to unknown district {}", l.code, l.district),
                }
                .fail();
            }
            if !list_keys.insert((l.district.as_str(), l.code.as_str())) {
                return InvalidConfigSnafu {
                    message: format!("list {} is declared twice in {}", l.code, l.district),
                }
                .fail();
            }
            if l.chambers.is_empty() {
                return InvalidConfigSnafu {
                    message: format!("list {} of {} runs for no chamber", l.code, l.district),
                }
                .fail();
            }
        }

        let mut districts = districts;
        districts.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        let mut lists = lists;
        lists.sort_by(|a, b| {
            (a.district.as_str(), a.order, a.code.as_str()).cmp(&(
                b.district.as_str(),
                b.order,
                b.code.as_str(),
            ))
        });
        Ok(Election {
            name,
            rules,
            districts,
            lists,
        })
    }

    pub fn districts(&self) -> &[District] {
        &self.districts
    }

    pub fn district(&self, id: &str) -> PortalResult<&District> {
        self.districts
            .iter()
            .find(|d| d.id == id)
            .context(UnknownDistrictSnafu { district: id })
    }

    /// The lists running for a chamber in a district, by ballot order.
    pub fn lists_for(&self, district: &str, chamber: Chamber) -> Vec<&ElectionList> {
        self.lists
            .iter()
            .filter(|l| l.district == district && l.contests(chamber))
            .collect()
    }
}
