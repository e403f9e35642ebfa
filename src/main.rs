mod args;
mod cms;
mod common;
mod constants;
mod export;
mod matching;
mod model;
mod ramp;
mod targets;

use anyhow::{Context, Result, bail};
use clap::Parser;
use std::fs;
use tracing::{info, warn};

use args::{Args, InputMode};
use matching::{MatchBatch, PortfolioRow};
use model::{Assumptions, ProForma, RowFinancials};

#[tokio::main]
async fn main() -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = Args::parse();

    let text = fs::read_to_string(&args.input)
        .with_context(|| format!("Failed reading target list {}", args.input.display()))?;
    let targets = match args.mode {
        InputMode::Names => targets::parse_names(&text),
        InputMode::Npis => targets::parse_npis(&text),
    };
    if targets.is_empty() {
        bail!("No targets found in {}", args.input.display());
    }
    info!(count = targets.len(), "parsed targets");

    let assumptions = match &args.assumptions {
        Some(path) => Assumptions::load(path)?,
        None => Assumptions::default(),
    };

    let client = cms::CmsClient::new(&args)?;
    info!(dataset = constants::CMS_DATASET_DOC_URL, "resolving targets");
    let batch = matching::match_targets(
        &client,
        &targets,
        args.concurrency,
        args.requests_per_second,
    )
    .await;

    let (rows, sample) = resolve_batch(batch);

    let financials: Vec<RowFinancials> = rows
        .iter()
        .map(|r| model::compute_row(r, &assumptions))
        .collect();
    let totals = model::portfolio_totals(&financials);
    let pro_forma = ProForma::build(totals, &assumptions);

    print_summary(&rows, &pro_forma, sample);

    export::write_csv(
        &args.physicians_csv,
        &export::physician_columns(),
        &export::physician_rows(&rows, &assumptions),
    )?;
    info!(path = %args.physicians_csv.display(), "wrote physicians CSV");

    export::write_csv(
        &args.pro_forma_csv,
        &export::label_value_columns(),
        &export::pro_forma_rows(&pro_forma, &assumptions, rows.len()),
    )?;
    info!(path = %args.pro_forma_csv.display(), "wrote pro forma CSV");

    if let Some(path) = &args.monthly_csv {
        export::write_csv(
            path,
            &export::monthly_columns(),
            &export::monthly_rows(&pro_forma.months),
        )?;
        info!(path = %path.display(), "wrote monthly projection CSV");
    }

    Ok(())
}

/// Apply the degraded-batch policy: when no usable matches came back,
/// warn and fall back to the labeled sample portfolio.
fn resolve_batch(batch: MatchBatch) -> (Vec<PortfolioRow>, bool) {
    if batch.is_degraded() {
        warn!(
            requested = batch.requested,
            failed = batch.failed,
            "no usable matches from CMS lookups; substituting sample portfolio"
        );
        (matching::sample_portfolio(), true)
    } else {
        (batch.rows, false)
    }
}

fn print_summary(rows: &[PortfolioRow], pf: &ProForma, sample: bool) {
    let tag = if sample { " (sample data)" } else { "" };
    let month1 = &pf.months[0];
    let per_md = pf.totals.adjusted_ffs / rows.len().max(1) as f64;

    println!("Pro forma summary{tag}:");
    println!("  Physicians: {}", rows.len());
    println!(
        "  Eligible patients: {} (FFS {}, MA {})",
        pf.totals.total_eligible.round(),
        pf.totals.adjusted_ffs.round(),
        pf.totals.ma_benes.round()
    );
    println!(
        "  Enrolled at full scale: {} ({:.0}% cap)",
        pf.enrolled_full_scale().round(),
        pf.cap * 100.0
    );
    println!(
        "  Month 1: enrolled {}, events {}, revenue ${}, profit ${}",
        month1.enrolled.round(),
        month1.events.round(),
        month1.revenue.round(),
        month1.profit.round()
    );
    println!(
        "  Monthly at full scale: revenue ${}, variable cost ${}, profit ${}",
        pf.full_scale.revenue.round(),
        pf.full_scale.variable_cost.round(),
        pf.full_scale.profit().round()
    );
    println!(
        "  Annual at full scale: revenue ${}, profit ${}",
        pf.annual_revenue().round(),
        pf.annual_profit().round()
    );
    println!("  Medicare patients per MD: {}", per_md.round());
    println!(
        "  Billable events: year 1 {}, annualized full scale {}",
        pf.year1_events().round(),
        pf.annualized_events().round()
    );
    println!(
        "  Observed FFS revenue (reference): ${}",
        pf.totals.observed_revenue.round()
    );
    println!("Matches:");
    for row in rows {
        println!(
            "  {:<24} NPI {:<12} {:<2} score {:.2} ({})",
            export::title_case(&row.name),
            if row.npi.is_empty() { "-" } else { row.npi.as_str() },
            row.state,
            row.match_score,
            matching::confidence_band(row.match_score)
        );
    }
}
