use clap::Parser;

/// Seat apportionment portal: loads an election, ingests scrutiny sheets and prints
/// the seats of each district.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (file path) The JSON file describing the districts, the lists and the rules.
    /// See the manual of seat_apportionment for the format.
    #[clap(short, long, value_parser)]
    pub config: String,

    /// (file path, repeatable) Additional CSV scrutiny sheets, ingested after the ones
    /// declared in the configuration, in the order given.
    #[clap(short, long, value_parser)]
    pub ingest: Vec<String>,

    /// (lower, upper or both) The chambers to show. Unknown values show both chambers.
    #[clap(long, value_parser)]
    pub chamber: Option<String>,

    /// (district id, optional) Restricts the output to one district.
    #[clap(short, long, value_parser)]
    pub district: Option<String>,

    /// If passed, prints the ranked detail of one district and one chamber instead of
    /// the dashboard. Needs --district and --chamber.
    #[clap(long, takes_value = false)]
    pub detail: bool,

    /// (file path, 'stdout' or empty) If specified, the summary will be written in JSON format to the given
    /// location. Setting this option overrides the path that may be specified with the --config option.
    #[clap(short, long, value_parser)]
    pub out: Option<String>,

    /// (file path) A reference file containing the expected summary in JSON format. If provided, seatportal will
    /// check that the output matches the reference.
    #[clap(short, long, value_parser)]
    pub reference: Option<String>,

    // Other arguments
    /// If passed as an argument, will turn on verbose logging to the standard output.
    #[clap(long, takes_value = false)]
    pub verbose: bool,
}
