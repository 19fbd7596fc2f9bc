// Reading scrutiny sheets from CSV files.

use std::io::Read;

use crate::portal::ingest::Submission;
use crate::portal::*;

/// Reads a sheet with the columns `district,chamber,list,percentage`.
///
/// Rows are grouped into one submission per district and chamber, in order of
/// first appearance.
pub fn read_csv_submissions(path: &str) -> PortalResult<Vec<Submission>> {
    let rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(path)
        .context(CsvOpenSnafu { path })?;
    let res = parse_submissions(rdr)?;
    info!(
        "read_csv_submissions: {:?}: {} submissions",
        path,
        res.len()
    );
    Ok(res)
}

fn parse_submissions<R: Read>(rdr: csv::Reader<R>) -> PortalResult<Vec<Submission>> {
    let mut res: Vec<Submission> = Vec::new();
    for (idx, line_r) in rdr.into_records().enumerate() {
        // Line 1 is the header.
        let lineno = idx + 2;
        let line = line_r.context(CsvLineParseSnafu { lineno })?;
        debug!("parse_submissions: lineno: {:?} row: {:?}", lineno, line);
        let district = line.get(0).unwrap_or("");
        let chamber_s = line.get(1).unwrap_or("");
        let list = line.get(2).unwrap_or("");
        if district.is_empty() && list.is_empty() {
            continue;
        }
        let chamber: Chamber = match chamber_s.parse() {
            Ok(c) => c,
            Err(_) => {
                return CsvInvalidChamberSnafu {
                    lineno,
                    value: chamber_s,
                }
                .fail()
            }
        };
        let value = line
            .get(3)
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string());
        match res
            .iter_mut()
            .find(|s| s.district == district && s.chamber == chamber)
        {
            Some(s) => s.entries.push((list.to_string(), value)),
            None => res.push(Submission {
                district: district.to_string(),
                chamber,
                entries: vec![(list.to_string(), value)],
            }),
        }
    }
    Ok(res)
}
