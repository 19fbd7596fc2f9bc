use log::{debug, error, info, warn};

use seat_apportionment::*;
use snafu::{prelude::*, ErrorCompat, Snafu};

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::json;
use serde_json::Value as JSValue;
use text_diff::print_diff;

use crate::portal::config_reader::*;
use crate::portal::dashboard::{build_dashboard, district_detail, ChamberFilter, DashboardQuery};
use crate::portal::ingest::{ingest, IngestIssue, Submission};
use crate::portal::registry::Election;
use crate::portal::store::ScrutinyStore;

mod config_reader;
mod dashboard;
mod ingest;
mod io_csv;
mod registry;
mod store;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum PortalError {
    #[snafu(display("Error opening file {path}"))]
    OpeningJson {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error parsing JSON file {path}"))]
    ParsingJson {
        source: serde_json::Error,
        path: String,
    },
    #[snafu(display("The configuration file has no parent directory"))]
    MissingParentDir {},
    #[snafu(display("Error serializing the summary"))]
    WritingJson { source: serde_json::Error },
    #[snafu(display("Error writing the summary to {path}"))]
    WritingOutput {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error opening CSV file {path}"))]
    CsvOpen { source: csv::Error, path: String },
    #[snafu(display("Error parsing CSV line {lineno}"))]
    CsvLineParse { source: csv::Error, lineno: usize },
    #[snafu(display("CSV line {lineno}: unknown chamber {value:?}"))]
    CsvInvalidChamber { lineno: usize, value: String },
    #[snafu(display("Invalid configuration: {message}"))]
    InvalidConfig { message: String },
    #[snafu(display("Unknown district {district}"))]
    UnknownDistrict { district: String },
    #[snafu(display(
        "Submission for {district}/{chamber} rejected: {}",
        render_issues(issues)
    ))]
    Rejected {
        district: String,
        chamber: Chamber,
        issues: Vec<IngestIssue>,
    },
    #[snafu(display("Internal error while apportioning {district}/{chamber}"))]
    Apportionment {
        source: ApportionmentErrors,
        district: String,
        chamber: Chamber,
    },
    #[snafu(display("The scrutiny store is unusable after a panic in a writer"))]
    StorePoisoned {},

    #[snafu(whatever, display("{message}"))]
    Whatever {
        message: String,
        #[snafu(source(from(Box<dyn std::error::Error>, Some)))]
        source: Option<Box<dyn std::error::Error>>,
    },
}

pub type PortalResult<T> = Result<T, PortalError>;

fn render_issues(issues: &[IngestIssue]) -> String {
    issues
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<String>>()
        .join("; ")
}

/// Everything the command line can ask for.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct RunOptions {
    pub config_path: String,
    pub extra_sheets: Vec<String>,
    pub chamber: Option<String>,
    pub district: Option<String>,
    pub detail: bool,
    pub out: Option<String>,
    pub reference: Option<String>,
}

/// The summary of a run and where it should be written.
#[derive(PartialEq, Debug, Clone)]
pub struct PortalRun {
    pub summary: JSValue,
    pub output_path: Option<String>,
}

/// Loads the election, replays all the submissions through the ingestion handler and
/// returns the resulting summary.
pub fn run_portal(opts: &RunOptions) -> PortalResult<PortalRun> {
    let config_p = Path::new(opts.config_path.as_str());
    let config = read_config(&opts.config_path)?;
    debug!("config: {:?}", config);

    let election = build_election(&config)?;
    let store = ScrutinyStore::new();
    info!(
        "Loaded election {:?}: {} districts",
        election.name,
        election.districts().len()
    );

    let root_p = config_p.parent().context(MissingParentDirSnafu {})?;
    let mut submissions: Vec<Submission> = inline_submissions(&config.scrutiny)?;
    for src in config.scrutiny_sources.iter() {
        let p: PathBuf = root_p.join(src.file_path.as_str());
        let p2 = p.as_path().display().to_string();
        info!("Attempting to read scrutiny sheet {:?}", p2);
        let mut file_submissions = match src.provider.as_str() {
            "csv" => io_csv::read_csv_submissions(&p2)?,
            x => whatever!("Provider not implemented {:?}", x),
        };
        submissions.append(&mut file_submissions);
    }
    for sheet in opts.extra_sheets.iter() {
        info!("Attempting to read scrutiny sheet {:?}", sheet);
        let mut file_submissions = io_csv::read_csv_submissions(sheet)?;
        submissions.append(&mut file_submissions);
    }

    let mut rejected: Vec<String> = Vec::new();
    for submission in submissions.iter() {
        match ingest(&election, &store, submission) {
            Ok(outcome) => debug!(
                "run_portal: {}/{} at revision {}",
                outcome.key.district, outcome.key.chamber, outcome.snapshot.revision
            ),
            Err(e @ PortalError::Rejected { .. }) => {
                warn!("{}", e);
                eprintln!("{}", e);
                rejected.push(e.to_string());
            }
            Err(e) => return Err(e),
        }
    }

    let filter = ChamberFilter::parse_or_default(opts.chamber.as_deref());
    let results: JSValue = if opts.detail {
        let district = match opts.district.as_deref() {
            Some(d) => d,
            None => whatever!("The district detail needs a district"),
        };
        let chamber = match filter {
            ChamberFilter::Lower => Chamber::Lower,
            ChamberFilter::Upper => Chamber::Upper,
            ChamberFilter::Both => whatever!("The district detail needs a single chamber"),
        };
        let detail = district_detail(&election, &store, district, chamber)?;
        serde_json::to_value(&detail).context(WritingJsonSnafu {})?
    } else {
        let query = DashboardQuery {
            district: opts.district.clone(),
            filter,
        };
        let dashboard = build_dashboard(&election, &store, &query)?;
        serde_json::to_value(&dashboard).context(WritingJsonSnafu {})?
    };

    Ok(PortalRun {
        summary: build_summary_js(&election, &config, results, &rejected),
        output_path: opts
            .out
            .clone()
            .or_else(|| config.output_settings.output_path.clone()),
    })
}

fn build_summary_js(
    election: &Election,
    config: &PortalConfig,
    results: JSValue,
    rejected: &[String],
) -> JSValue {
    let c = OutputConfig {
        election: election.name.clone(),
        date: config.output_settings.election_date.clone(),
        threshold: election.rules.lower_threshold.to_string(),
    };
    json!({
        "config": c,
        "results": results,
        "rejectedSubmissions": rejected
    })
}

/// Runs the portal, writes the summary and checks it against a reference if one is given.
pub fn run_and_report(opts: &RunOptions) -> PortalResult<()> {
    let run = run_portal(opts)?;
    let pretty_js_stats =
        serde_json::to_string_pretty(&run.summary).context(WritingJsonSnafu {})?;

    match run.output_path.as_deref() {
        None | Some("stdout") => println!("{}", pretty_js_stats),
        Some(p) => {
            info!("Writing summary to {:?}", p);
            fs::write(p, pretty_js_stats.as_bytes()).context(WritingOutputSnafu { path: p })?;
        }
    }

    // The reference summary, if provided for comparison
    if let Some(summary_p) = opts.reference.clone() {
        let summary_ref = read_summary(&summary_p)?;
        let pretty_js_summary_ref =
            serde_json::to_string_pretty(&summary_ref).context(WritingJsonSnafu {})?;
        if pretty_js_summary_ref != pretty_js_stats {
            warn!("Found differences with the reference string");
            print_diff(
                pretty_js_summary_ref.as_str(),
                pretty_js_stats.as_ref(),
                "\n",
            );
            whatever!("Difference detected between calculated summary and reference summary")
        }
    }
    Ok(())
}

pub fn report_error(e: &PortalError) {
    warn!("Error occured {:?}", e);
    eprintln!("An error occured {}", e);
    if let Some(bt) = ErrorCompat::backtrace(e) {
        eprintln!("trace: {}", bt);
    }
}

#[cfg(test)]
pub(crate) fn test_wrapper(test_name: &str) -> PortalResult<()> {
    let test_dir = format!("{}/tests/data", env!("CARGO_MANIFEST_DIR"));
    run_and_report(&RunOptions {
        config_path: format!("{}/{}/{}_config.json", test_dir, test_name, test_name),
        reference: Some(format!(
            "{}/{}/{}_expected_summary.json",
            test_dir, test_name, test_name
        )),
        out: Some("stdout".to_string()),
        ..RunOptions::default()
    })
}

#[cfg(test)]
mod tests {

    use super::*;

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    #[test]
    fn two_districts() {
        init();
        let res = test_wrapper("two_districts");
        if let Err(e) = &res {
            report_error(e);
        }
        assert!(res.is_ok());
    }

    #[test]
    fn rejected_sheet_keeps_previous_records() {
        init();
        let test_dir = format!("{}/tests/data", env!("CARGO_MANIFEST_DIR"));
        let summary = run_portal(&RunOptions {
            config_path: format!("{}/two_districts/two_districts_config.json", test_dir),
            extra_sheets: vec![format!("{}/two_districts/over_100.csv", test_dir)],
            chamber: Some("lower".to_string()),
            district: Some("norte".to_string()),
            ..RunOptions::default()
        })
        .unwrap()
        .summary;

        let rejected = summary["rejectedSubmissions"].as_array().unwrap();
        assert_eq!(rejected.len(), 1);
        assert!(rejected[0].as_str().unwrap().contains("110.00"));

        let rows = summary["results"]["districts"][0]["lower"]["rows"]
            .as_array()
            .unwrap();
        let pcts: Vec<&str> = rows
            .iter()
            .map(|r| r["percentage"].as_str().unwrap_or("pending"))
            .collect();
        assert_eq!(pcts, vec!["60.00", "40.00"]);
    }

    #[test]
    fn district_detail_needs_single_chamber() {
        init();
        let test_dir = format!("{}/tests/data", env!("CARGO_MANIFEST_DIR"));
        let res = run_portal(&RunOptions {
            config_path: format!("{}/two_districts/two_districts_config.json", test_dir),
            district: Some("norte".to_string()),
            detail: true,
            ..RunOptions::default()
        });
        assert!(matches!(res, Err(PortalError::Whatever { .. })));

        let summary = run_portal(&RunOptions {
            config_path: format!("{}/two_districts/two_districts_config.json", test_dir),
            district: Some("norte".to_string()),
            chamber: Some("upper".to_string()),
            detail: true,
            ..RunOptions::default()
        })
        .unwrap()
        .summary;
        assert_eq!(summary["results"]["method"], "Majority 2 + first minority 1");
    }

    #[test]
    fn missing_config_is_reported() {
        init();
        let res = run_portal(&RunOptions {
            config_path: "/nonexistent/election.json".to_string(),
            ..RunOptions::default()
        });
        assert!(matches!(res, Err(PortalError::OpeningJson { .. })));
    }
}
