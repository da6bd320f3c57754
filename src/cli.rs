use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::aggregate::Aggregation;
use crate::group::{Binning, SortPolicy};

#[derive(Debug, Parser)]
#[command(author, version, about = "Tabular analytics for inspection report data", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Classify the columns of a record batch (temporal/numeric/boolean/categorical)
    Probe(ProbeArgs),
    /// Run an analysis query and print the resulting series
    Query(QueryArgs),
    /// List the built-in preset analytical views
    Presets(PresetsArgs),
}

#[derive(Debug, Args)]
pub struct ProbeArgs {
    /// Input record batch (.csv with headers, or .json array of objects)
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
}

#[derive(Debug, Args)]
pub struct QueryArgs {
    /// Input record batch (.csv with headers, or .json array of objects)
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Run a preset view by id instead of a custom query (see `presets`)
    #[arg(long)]
    pub preset: Option<String>,
    /// Field to group along the x axis
    #[arg(short = 'x', long = "x-field")]
    pub x_field: Option<String>,
    /// Optional second dimension: one output series per distinct value
    #[arg(short = 's', long = "series-field")]
    pub series_field: Option<String>,
    /// Numeric field to aggregate (mutually exclusive with --expr)
    #[arg(short = 'm', long = "measure")]
    pub measure: Option<String>,
    /// Derived expression over falseCalls/totalBoards/totalParts
    #[arg(long = "expr")]
    pub expr: Option<String>,
    /// Reduction applied per group
    #[arg(short = 'a', long = "agg", value_enum, default_value_t = AggregationArg::Sum)]
    pub aggregation: AggregationArg,
    /// Temporal binning for a date-valued x field
    #[arg(short = 'b', long = "bin", value_enum, default_value_t = BinningArg::Day)]
    pub binning: BinningArg,
    /// Label ordering for categorical x fields
    #[arg(long = "sort", value_enum, default_value_t = SortArg::AlphaAsc)]
    pub sort: SortArg,
    /// Inclusive start of the date window (YYYY-MM-DD)
    #[arg(long = "from")]
    pub date_start: Option<NaiveDate>,
    /// Inclusive end of the date window (YYYY-MM-DD)
    #[arg(long = "to")]
    pub date_end: Option<NaiveDate>,
    /// Field the date window applies to
    #[arg(long = "date-field", default_value = "Report Date")]
    pub date_field: String,
    /// Membership predicates such as `Line=SMT-1,SMT-2` (repeatable)
    #[arg(long = "where", action = clap::ArgAction::Append)]
    pub predicates: Vec<String>,
    /// Case-insensitive substring predicates such as `Customer~acme` (repeatable)
    #[arg(long = "contains", action = clap::ArgAction::Append)]
    pub contains: Vec<String>,
    /// Attach mean +/- 3 sigma control limits to single-series output
    #[arg(long = "control-limits")]
    pub control_limits: bool,
    /// Drop x groups whose summed qualifying field is below THRESHOLD
    /// (format: `field:threshold`, e.g. `Total Boards:7`)
    #[arg(long = "min-sample")]
    pub min_sample: Option<String>,
    /// Output format
    #[arg(long = "format", value_enum, default_value_t = OutputFormat::Table)]
    pub format: OutputFormat,
}

#[derive(Debug, Args)]
pub struct PresetsArgs {
    /// Output format
    #[arg(long = "format", value_enum, default_value_t = OutputFormat::Table)]
    pub format: OutputFormat,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum AggregationArg {
    Sum,
    Average,
    Min,
    Max,
    Count,
}

impl From<AggregationArg> for Aggregation {
    fn from(value: AggregationArg) -> Self {
        match value {
            AggregationArg::Sum => Aggregation::Sum,
            AggregationArg::Average => Aggregation::Average,
            AggregationArg::Min => Aggregation::Min,
            AggregationArg::Max => Aggregation::Max,
            AggregationArg::Count => Aggregation::Count,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum BinningArg {
    Day,
    Week,
    Month,
    Quarter,
    Year,
}

impl From<BinningArg> for Binning {
    fn from(value: BinningArg) -> Self {
        match value {
            BinningArg::Day => Binning::Day,
            BinningArg::Week => Binning::Week,
            BinningArg::Month => Binning::Month,
            BinningArg::Quarter => Binning::Quarter,
            BinningArg::Year => Binning::Year,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum SortArg {
    AlphaAsc,
    AlphaDesc,
    FreqAsc,
    FreqDesc,
}

impl From<SortArg> for SortPolicy {
    fn from(value: SortArg) -> Self {
        match value {
            SortArg::AlphaAsc => SortPolicy::AlphaAscending,
            SortArg::AlphaDesc => SortPolicy::AlphaDescending,
            SortArg::FreqAsc => SortPolicy::FrequencyAscending,
            SortArg::FreqDesc => SortPolicy::FrequencyDescending,
        }
    }
}
