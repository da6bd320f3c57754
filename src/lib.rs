pub mod aggregate;
pub mod cli;
pub mod data;
pub mod expr;
pub mod filter;
pub mod group;
pub mod infer;
pub mod load;
pub mod preset;
pub mod query;
pub mod saved;
pub mod stats;
pub mod table;

use std::{env, sync::OnceLock};

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use log::{info, LevelFilter};

use crate::cli::{Cli, Commands, OutputFormat, PresetsArgs, ProbeArgs, QueryArgs};
use crate::filter::RecordFilter;
use crate::group::Grouping;
use crate::query::{Measure, MinSampleRule, QueryRequest, SeriesBundle};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("inspection_analytics", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Probe(args) => handle_probe(&args),
        Commands::Query(args) => handle_query(&args),
        Commands::Presets(args) => handle_presets(&args),
    }
}

fn handle_probe(args: &ProbeArgs) -> Result<()> {
    let records = load::load_records(&args.input)?;
    let profile = infer::profile_columns(&records);
    if profile.is_empty() {
        info!("No records in {:?}; nothing to classify", args.input);
        return Ok(());
    }
    let headers = vec!["field".to_string(), "type".to_string()];
    let rows: Vec<Vec<String>> = profile
        .field_order
        .iter()
        .map(|field| {
            vec![
                field.clone(),
                profile.column_type(field).as_str().to_string(),
            ]
        })
        .collect();
    table::print_table(&headers, &rows);
    info!(
        "Classified {} field(s) from {} record(s)",
        rows.len(),
        records.len()
    );
    Ok(())
}

fn handle_query(args: &QueryArgs) -> Result<()> {
    let records = load::load_records(&args.input)?;
    let filter = build_filter(args)?;

    if let Some(preset_id) = &args.preset {
        let definition = preset::find(preset_id)
            .ok_or_else(|| anyhow!("Unknown preset '{preset_id}' (see `presets`)"))?;
        let output = preset::run_preset(definition, &records, &filter);
        match args.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&output)?),
            OutputFormat::Table => print_bundle(&output.bundle),
        }
        return Ok(());
    }

    let x_field = args
        .x_field
        .as_deref()
        .ok_or_else(|| anyhow!("--x-field is required without --preset"))?;
    let profile = infer::profile_columns(&records);
    let grouping = Grouping::new(x_field, profile.column_type(x_field))
        .binned(args.binning.into())
        .sorted(args.sort.into());

    let measure = match (&args.measure, &args.expr) {
        (Some(_), Some(_)) => return Err(anyhow!("--measure and --expr are mutually exclusive")),
        (Some(field), None) => Measure::field(field.clone()),
        (None, Some(expression)) => Measure::derived(expression.clone()),
        (None, None) => return Err(anyhow!("One of --measure or --expr is required")),
    };

    let request = QueryRequest {
        filter,
        grouping,
        series_field: args.series_field.clone(),
        measure,
        aggregation: args.aggregation.into(),
        bindings: expr::FieldBindings::default(),
        min_sample: parse_min_sample(args.min_sample.as_deref())?,
        with_control_limits: args.control_limits,
    };
    let bundle = query::run_query(&records, &request);
    if let Some(message) = &bundle.measure_error {
        return Err(anyhow!("Invalid derived expression: {message}"));
    }

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&bundle)?),
        OutputFormat::Table => print_bundle(&bundle),
    }
    info!(
        "Query produced {} label(s) across {} series",
        bundle.labels.len(),
        bundle.series.len()
    );
    Ok(())
}

fn handle_presets(args: &PresetsArgs) -> Result<()> {
    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(preset::catalog())?),
        OutputFormat::Table => {
            let headers = vec![
                "id".to_string(),
                "shape".to_string(),
                "display name".to_string(),
            ];
            let rows: Vec<Vec<String>> = preset::catalog()
                .iter()
                .map(|p| {
                    vec![
                        p.id.to_string(),
                        format!("{:?}", p.shape),
                        p.display_name.to_string(),
                    ]
                })
                .collect();
            table::print_table(&headers, &rows);
        }
    }
    Ok(())
}

fn build_filter(args: &QueryArgs) -> Result<RecordFilter> {
    let mut filter = RecordFilter::new();
    if args.date_start.is_some() || args.date_end.is_some() {
        filter = filter.date_window(args.date_field.clone(), args.date_start, args.date_end);
    }
    for predicate in &args.predicates {
        let (field, values) = predicate
            .split_once('=')
            .ok_or_else(|| anyhow!("Predicate '{predicate}' is not of the form field=v1,v2"))?;
        let values: Vec<String> = values
            .split(',')
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .collect();
        filter = filter.allow(field.trim(), values);
    }
    for predicate in &args.contains {
        let (field, needle) = predicate
            .split_once('~')
            .ok_or_else(|| anyhow!("Predicate '{predicate}' is not of the form field~text"))?;
        filter = filter.containing(field.trim(), needle.trim());
    }
    Ok(filter)
}

fn parse_min_sample(arg: Option<&str>) -> Result<Option<MinSampleRule>> {
    let Some(arg) = arg else {
        return Ok(None);
    };
    let (field, threshold) = arg
        .rsplit_once(':')
        .ok_or_else(|| anyhow!("--min-sample expects field:threshold, got '{arg}'"))?;
    let threshold: f64 = threshold
        .trim()
        .parse()
        .with_context(|| format!("Parsing min-sample threshold from '{arg}'"))?;
    Ok(Some(MinSampleRule {
        qualifying_field: field.trim().to_string(),
        threshold,
    }))
}

fn print_bundle(bundle: &SeriesBundle) {
    let mut headers = vec!["label".to_string()];
    headers.extend(bundle.series.iter().map(|s| s.label.clone()));
    let rows: Vec<Vec<String>> = bundle
        .labels
        .iter()
        .enumerate()
        .map(|(idx, label)| {
            let mut row = vec![label.clone()];
            for series in &bundle.series {
                let cell = series
                    .values
                    .get(idx)
                    .copied()
                    .flatten()
                    .map(format_value)
                    .unwrap_or_default();
                row.push(cell);
            }
            row
        })
        .collect();
    table::print_table(&headers, &rows);
    if let Some(limits) = &bundle.control_limits {
        println!(
            "mean={} ucl={} lcl={}",
            format_value(limits.mean),
            format_value(limits.upper),
            format_value(limits.lower)
        );
    }
    if bundle.has_unknown_bucket {
        println!("note: some records had unparseable dates (grouped under 'unknown')");
    }
}

fn format_value(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{value:.0}")
    } else {
        format!("{value:.4}")
    }
}
