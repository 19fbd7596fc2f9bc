use crate::portal::*;

use crate::portal::ingest::Submission;
use crate::portal::registry::{District, Election, ElectionList};

use serde::{Deserialize, Serialize};
use serde_json::Value as JSValue;

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct OutputSettings {
    #[serde(rename = "electionName")]
    pub election_name: String,
    #[serde(rename = "electionDate")]
    pub election_date: Option<String>,
    #[serde(rename = "outputPath")]
    pub output_path: Option<String>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    pub election: String,
    pub date: Option<String>,
    pub threshold: String,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize, Default)]
pub struct PortalRules {
    #[serde(rename = "lowerThreshold")]
    pub lower_threshold: Option<JSValue>,
    #[serde(rename = "tiebreakMode")]
    pub tiebreak_mode: Option<String>,
    #[serde(rename = "randomSeed")]
    pub random_seed: Option<JSValue>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct DistrictConfig {
    pub id: String,
    pub name: String,
    #[serde(rename = "lowerSeats")]
    pub lower_seats: u32,
    #[serde(rename = "upperSeats", default)]
    pub upper_seats: u32,
    #[serde(rename = "totalDeputies")]
    pub total_deputies: Option<u32>,
    #[serde(rename = "totalSenators")]
    pub total_senators: Option<u32>,
    #[serde(rename = "registeredVoters", default)]
    pub registered_voters: u64,
    #[serde(rename = "votesCast")]
    pub votes_cast: Option<u64>,
    #[serde(rename = "tablesReporting", default)]
    pub tables_reporting: u64,
    #[serde(rename = "tablesTotal", default)]
    pub tables_total: u64,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct ListConfig {
    pub district: String,
    pub code: String,
    pub name: String,
    #[serde(rename = "nationalAlignment")]
    pub national_alignment: Option<String>,
    pub order: Option<u32>,
    pub chambers: Option<Vec<String>>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct ScrutinyEntry {
    pub district: String,
    pub chamber: String,
    pub list: String,
    pub percentage: Option<JSValue>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct FileSource {
    pub provider: String,
    #[serde(rename = "filePath")]
    pub file_path: String,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct PortalConfig {
    #[serde(rename = "outputSettings")]
    pub output_settings: OutputSettings,
    #[serde(default)]
    pub rules: PortalRules,
    pub districts: Vec<DistrictConfig>,
    pub lists: Vec<ListConfig>,
    #[serde(default)]
    pub scrutiny: Vec<ScrutinyEntry>,
    #[serde(rename = "scrutinySources", default)]
    pub scrutiny_sources: Vec<FileSource>,
}

pub fn read_config(path: &str) -> PortalResult<PortalConfig> {
    let config_str = fs::read_to_string(path).context(OpeningJsonSnafu { path })?;
    serde_json::from_str(&config_str).context(ParsingJsonSnafu { path })
}

pub fn read_summary(path: &str) -> PortalResult<JSValue> {
    let contents = fs::read_to_string(path).context(OpeningJsonSnafu { path })?;
    debug!("read content: {:?}", contents);
    let js: JSValue = serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu { path })?;
    Ok(js)
}

/// The raw text of a percentage, as an operator would have typed it.
/// `None` stands for a blank entry.
pub fn read_js_percentage(x: &Option<JSValue>) -> Option<String> {
    match x {
        None | Some(JSValue::Null) => None,
        Some(JSValue::String(s)) => Some(s.clone()),
        Some(JSValue::Number(n)) => Some(n.to_string()),
        Some(other) => Some(other.to_string()),
    }
}

fn read_js_int(x: &Option<JSValue>) -> Option<u32> {
    match x {
        Some(JSValue::Number(n)) => n.as_u64().and_then(|x| u32::try_from(x).ok()),
        Some(JSValue::String(s)) => s.trim().parse::<u32>().ok(),
        _ => None,
    }
}

fn parse_chamber(s: &str) -> PortalResult<Chamber> {
    match s.parse::<Chamber>() {
        Ok(c) => Ok(c),
        Err(message) => InvalidConfigSnafu { message }.fail(),
    }
}

pub fn validate_rules(rules: &PortalRules) -> PortalResult<ApportionmentRules> {
    let lower_threshold = match read_js_percentage(&rules.lower_threshold) {
        None => ApportionmentRules::DEFAULT_RULES.lower_threshold,
        Some(raw) => match raw.parse::<Percentage>() {
            Ok(p) => p,
            Err(e) => {
                return InvalidConfigSnafu {
                    message: format!("lowerThreshold: {}", e),
                }
                .fail()
            }
        },
    };
    let tiebreak_mode = match rules.tiebreak_mode.as_deref() {
        None | Some("useListOrder") => TieBreakMode::UseListOrder,
        Some("random") => match read_js_int(&rules.random_seed) {
            Some(seed) => TieBreakMode::Random(seed),
            None => {
                return InvalidConfigSnafu {
                    message: format!(
                        "tiebreak mode random needs a numeric randomSeed, got {:?}",
                        rules.random_seed
                    ),
                }
                .fail()
            }
        },
        Some(x) => {
            return InvalidConfigSnafu {
                message: format!("Cannot use tiebreak mode {:?}", x),
            }
            .fail()
        }
    };
    Ok(ApportionmentRules {
        tiebreak_mode,
        lower_threshold,
    })
}

pub fn build_election(config: &PortalConfig) -> PortalResult<Election> {
    let rules = validate_rules(&config.rules)?;

    let districts: Vec<District> = config
        .districts
        .iter()
        .map(|d| District {
            id: d.id.clone(),
            name: d.name.clone(),
            lower_seats: d.lower_seats,
            upper_seats: d.upper_seats,
            total_deputies: d.total_deputies,
            total_senators: d.total_senators,
            registered_voters: d.registered_voters,
            votes_cast: d.votes_cast,
            tables_reporting: d.tables_reporting,
            tables_total: d.tables_total,
        })
        .collect();

    let mut lists: Vec<ElectionList> = Vec::new();
    for l in config.lists.iter() {
        let chambers = match &l.chambers {
            None => Chamber::ALL.to_vec(),
            Some(cs) => cs
                .iter()
                .map(|c| parse_chamber(c))
                .collect::<PortalResult<Vec<Chamber>>>()?,
        };
        lists.push(ElectionList {
            district: l.district.clone(),
            code: l.code.clone(),
            name: l.name.clone(),
            national_alignment: match l.national_alignment.clone() {
                Some(x) if x.trim().is_empty() => None,
                x => x,
            },
            order: l.order.unwrap_or(0),
            chambers,
        });
    }

    Election::new(
        config.output_settings.election_name.clone(),
        rules,
        districts,
        lists,
    )
}

/// Groups the inline scrutiny entries into one submission per district and chamber,
/// in order of first appearance.
pub fn inline_submissions(entries: &[ScrutinyEntry]) -> PortalResult<Vec<Submission>> {
    let mut res: Vec<Submission> = Vec::new();
    for e in entries.iter() {
        let chamber = parse_chamber(&e.chamber)?;
        let value = read_js_percentage(&e.percentage);
        match res
            .iter_mut()
            .find(|s| s.district == e.district && s.chamber == chamber)
        {
            Some(s) => s.entries.push((e.list.clone(), value)),
            None => res.push(Submission {
                district: e.district.clone(),
                chamber,
                entries: vec![(e.list.clone(), value)],
            }),
        }
    }
    Ok(res)
}
