use anyhow::{Context, Result};
use serde::Deserialize;
use std::{fs, path::Path};

use crate::matching::PortfolioRow;
use crate::ramp;

pub fn clamp01(x: f64) -> f64 {
    x.clamp(0.0, 1.0)
}

/// Shared assumption set for the financial model. Values are stored as
/// given; each formula clamps to its declared range at the point of use,
/// so out-of-range tuning inputs never fail outright.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Assumptions {
    /// Fraction of reported FFS beneficiaries deemed addressable.
    pub bene_scale_down: f64,
    /// Multiplier estimating MA beneficiaries from the FFS count.
    pub ma_bene_factor: f64,
    /// Relative reimbursement rate for MA enrolled patients vs FFS.
    pub ma_rate_factor: f64,
    /// Fraction of enrolled patients generating one billable event/month.
    pub qualification_rate: f64,
    /// Fraction of billed revenue actually collected.
    pub collection_rate: f64,
    /// Average reimbursement per billable event (CPT 99490), dollars.
    pub ccm99490: f64,
    /// Marginal cost incurred per billable event, dollars.
    pub variable_cost_per_event: f64,
    /// Annual fixed cost; informational, not subtracted from profit.
    pub fixed_annual_overhead: f64,
    /// Penetration fraction at day 0.
    pub enroll_start_pct: f64,
    /// Target penetration fraction at day 60.
    pub enroll_day60_pct: f64,
    /// Full-scale penetration fraction.
    pub enroll_max_pct: f64,
    /// Day at which full-scale penetration is reached.
    pub enroll_full_days: f64,
}

impl Default for Assumptions {
    fn default() -> Self {
        Self {
            bene_scale_down: 0.9,
            ma_bene_factor: 0.85,
            ma_rate_factor: 1.0,
            qualification_rate: 1.0,
            collection_rate: 1.0,
            ccm99490: 62.0,
            variable_cost_per_event: 32.0,
            fixed_annual_overhead: 0.0,
            enroll_start_pct: 0.02,
            enroll_day60_pct: 0.30,
            enroll_max_pct: 0.60,
            enroll_full_days: 180.0,
        }
    }
}

impl Assumptions {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed reading assumptions file {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("Invalid assumptions JSON in {}", path.display()))
    }

    /// Ramp end day, floored and held to [61, 365] so the smoothstep
    /// segment always has positive width.
    pub fn enroll_full_days_clamped(&self) -> f64 {
        self.enroll_full_days.floor().clamp(61.0, 365.0)
    }
}

/// Per-physician beneficiary estimates derived from one matched row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RowFinancials {
    pub adjusted_ffs: f64,
    pub ma_benes: f64,
    pub total_eligible: f64,
    pub observed_revenue: f64,
}

pub fn compute_row(row: &PortfolioRow, a: &Assumptions) -> RowFinancials {
    let benes = row.total_beneficiaries;
    let adjusted_ffs = benes * clamp01(a.bene_scale_down);
    let ma_benes = (benes * a.ma_bene_factor.clamp(0.0, 1.2)).max(0.0);
    RowFinancials {
        adjusted_ffs,
        ma_benes,
        total_eligible: adjusted_ffs + ma_benes,
        observed_revenue: row.total_payment_amount,
    }
}

/// Field-wise sums across all matched rows.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PortfolioTotals {
    pub adjusted_ffs: f64,
    pub ma_benes: f64,
    pub total_eligible: f64,
    pub observed_revenue: f64,
}

impl From<RowFinancials> for PortfolioTotals {
    fn from(r: RowFinancials) -> Self {
        Self {
            adjusted_ffs: r.adjusted_ffs,
            ma_benes: r.ma_benes,
            total_eligible: r.total_eligible,
            observed_revenue: r.observed_revenue,
        }
    }
}

pub fn portfolio_totals(rows: &[RowFinancials]) -> PortfolioTotals {
    rows.iter().fold(PortfolioTotals::default(), |mut acc, r| {
        acc.adjusted_ffs += r.adjusted_ffs;
        acc.ma_benes += r.ma_benes;
        acc.total_eligible += r.total_eligible;
        acc.observed_revenue += r.observed_revenue;
        acc
    })
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MonthlyFigures {
    pub enrolled: f64,
    pub events: f64,
    pub revenue: f64,
    pub variable_cost: f64,
}

impl MonthlyFigures {
    pub fn profit(&self) -> f64 {
        self.revenue - self.variable_cost
    }
}

/// One month of the projection at enrollment fraction `f`. Revenue
/// splits enrolled patients by the portfolio's own FFS/MA shares, with
/// the MA share earning at `ma_rate_factor`.
pub fn monthly_at(t: &PortfolioTotals, a: &Assumptions, f: f64) -> MonthlyFigures {
    let enrolled = t.total_eligible * f;
    let (ffs_share, ma_share) = if t.total_eligible > 0.0 {
        (
            t.adjusted_ffs / t.total_eligible,
            t.ma_benes / t.total_eligible,
        )
    } else {
        (0.0, 0.0)
    };
    let events = enrolled * clamp01(a.qualification_rate);
    let revenue = (enrolled * ffs_share + enrolled * ma_share * clamp01(a.ma_rate_factor))
        * a.ccm99490.max(0.0)
        * clamp01(a.collection_rate);
    let variable_cost = events * a.variable_cost_per_event.max(0.0);
    MonthlyFigures {
        enrolled,
        events,
        revenue,
        variable_cost,
    }
}

/// One entry of the 12-month series. Full precision throughout; values
/// are rounded at export time only.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectionMonth {
    pub month: &'static str,
    pub enrolled_pct: u32,
    pub enrolled: f64,
    pub events: f64,
    pub revenue: f64,
    pub variable_cost: f64,
    pub profit: f64,
}

/// The 12-month series evaluated at each month's whole-percent ramp
/// value divided by 100, matching what the enrollment chart shows.
pub fn monthly_series(t: &PortfolioTotals, a: &Assumptions) -> Vec<ProjectionMonth> {
    ramp::monthly_ramp(a)
        .into_iter()
        .map(|p| {
            let m = monthly_at(t, a, f64::from(p.enrolled_pct) / 100.0);
            ProjectionMonth {
                month: p.month,
                enrolled_pct: p.enrolled_pct,
                enrolled: m.enrolled,
                events: m.events,
                revenue: m.revenue,
                variable_cost: m.variable_cost,
                profit: m.profit(),
            }
        })
        .collect()
}

/// Portfolio-level projection: month-by-month series plus full-scale
/// steady state at the enrollment cap.
#[derive(Debug, Clone)]
pub struct ProForma {
    pub totals: PortfolioTotals,
    pub cap: f64,
    pub full_scale: MonthlyFigures,
    pub months: Vec<ProjectionMonth>,
}

impl ProForma {
    pub fn build(totals: PortfolioTotals, a: &Assumptions) -> Self {
        let cap = clamp01(a.enroll_max_pct);
        Self {
            totals,
            cap,
            full_scale: monthly_at(&totals, a, cap),
            months: monthly_series(&totals, a),
        }
    }

    pub fn annual_revenue(&self) -> f64 {
        self.full_scale.revenue * 12.0
    }

    pub fn annual_variable_cost(&self) -> f64 {
        self.full_scale.variable_cost * 12.0
    }

    pub fn annual_profit(&self) -> f64 {
        self.annual_revenue() - self.annual_variable_cost()
    }

    pub fn enrolled_full_scale(&self) -> f64 {
        self.totals.total_eligible * self.cap
    }

    /// Ramp-weighted events across the first twelve months. Distinct
    /// from `annualized_events`, which assumes full scale all year.
    pub fn year1_events(&self) -> f64 {
        self.months.iter().map(|m| m.events).sum()
    }

    pub fn annualized_events(&self) -> f64 {
        self.full_scale.events * 12.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(benes: f64, pay: f64) -> PortfolioRow {
        PortfolioRow {
            id: "t1".to_string(),
            npi: "1234567890".to_string(),
            name: "NGUYEN AMELIA".to_string(),
            state: "TX".to_string(),
            city: "Austin".to_string(),
            total_beneficiaries: benes,
            total_services: 0.0,
            total_payment_amount: pay,
            match_score: 0.9,
        }
    }

    #[test]
    fn compute_row_matches_reference_scenario() {
        // beneScaleDown 0.9, maBeneFactor 0.85 on 780 beneficiaries
        let a = Assumptions::default();
        let fin = compute_row(&row(780.0, 160_400.0), &a);
        assert!((fin.adjusted_ffs - 702.0).abs() < 1e-9);
        assert!((fin.ma_benes - 663.0).abs() < 1e-9);
        assert!((fin.total_eligible - 1365.0).abs() < 1e-9);
        assert!((fin.observed_revenue - 160_400.0).abs() < 1e-9);
    }

    #[test]
    fn compute_row_is_never_negative() {
        let a = Assumptions {
            ma_bene_factor: -2.0,
            bene_scale_down: 1.5,
            ..Assumptions::default()
        };
        let fin = compute_row(&row(500.0, 0.0), &a);
        assert!(fin.adjusted_ffs >= 0.0);
        assert!(fin.ma_benes >= 0.0);
        assert!(fin.total_eligible >= 0.0);
        // bene_scale_down clamps to 1.0
        assert!((fin.adjusted_ffs - 500.0).abs() < 1e-9);
    }

    #[test]
    fn aggregation_round_trips_beneficiary_counts() {
        let a = Assumptions {
            bene_scale_down: 1.0,
            ma_bene_factor: 0.0,
            ..Assumptions::default()
        };
        let fins: Vec<RowFinancials> = [100.0, 250.0, 7.0]
            .iter()
            .map(|&b| compute_row(&row(b, 0.0), &a))
            .collect();
        let totals = portfolio_totals(&fins);
        assert!((totals.total_eligible - 357.0).abs() < 1e-9);
        assert!((totals.ma_benes).abs() < 1e-9);
    }

    #[test]
    fn monthly_at_empty_portfolio_is_all_zero() {
        let a = Assumptions::default();
        let m = monthly_at(&PortfolioTotals::default(), &a, 0.6);
        assert_eq!(m, MonthlyFigures::default());
    }

    #[test]
    fn monthly_at_applies_shares_and_rates() {
        let a = Assumptions {
            qualification_rate: 0.5,
            collection_rate: 0.8,
            ma_rate_factor: 0.5,
            ccm99490: 60.0,
            variable_cost_per_event: 10.0,
            ..Assumptions::default()
        };
        let totals = PortfolioTotals {
            adjusted_ffs: 600.0,
            ma_benes: 400.0,
            total_eligible: 1000.0,
            observed_revenue: 0.0,
        };
        let m = monthly_at(&totals, &a, 0.5);
        assert!((m.enrolled - 500.0).abs() < 1e-9);
        assert!((m.events - 250.0).abs() < 1e-9);
        // (500*0.6 + 500*0.4*0.5) * 60 * 0.8 = (300 + 100) * 48
        assert!((m.revenue - 19_200.0).abs() < 1e-9);
        assert!((m.variable_cost - 2500.0).abs() < 1e-9);
        assert!((m.profit() - 16_700.0).abs() < 1e-9);
    }

    #[test]
    fn out_of_range_rates_clamp_instead_of_failing() {
        let a = Assumptions {
            qualification_rate: 3.0,
            collection_rate: -1.0,
            ..Assumptions::default()
        };
        let totals = PortfolioTotals {
            adjusted_ffs: 100.0,
            ma_benes: 0.0,
            total_eligible: 100.0,
            observed_revenue: 0.0,
        };
        let m = monthly_at(&totals, &a, 1.0);
        assert!((m.events - 100.0).abs() < 1e-9);
        assert!(m.revenue.abs() < 1e-9);
    }

    #[test]
    fn year1_events_differ_from_annualized_under_default_ramp() {
        let a = Assumptions::default();
        let totals = PortfolioTotals {
            adjusted_ffs: 702.0,
            ma_benes: 663.0,
            total_eligible: 1365.0,
            observed_revenue: 0.0,
        };
        let pf = ProForma::build(totals, &a);
        assert_eq!(pf.months.len(), 12);
        // the ramp spends months below the cap, so year 1 comes in short
        assert!(pf.year1_events() < pf.annualized_events());
        assert!(pf.annual_profit() <= pf.annual_revenue());
    }

    #[test]
    fn assumptions_deserialize_with_partial_fields() {
        let a: Assumptions =
            serde_json::from_str(r#"{"beneScaleDown":0.8,"enrollFullDays":90}"#).unwrap();
        assert!((a.bene_scale_down - 0.8).abs() < 1e-9);
        assert!((a.enroll_full_days - 90.0).abs() < 1e-9);
        // untouched fields keep their defaults
        assert!((a.ccm99490 - 62.0).abs() < 1e-9);
    }

    #[test]
    fn full_days_clamps_to_valid_window() {
        let mut a = Assumptions::default();
        a.enroll_full_days = 10.0;
        assert!((a.enroll_full_days_clamped() - 61.0).abs() < 1e-9);
        a.enroll_full_days = 1000.0;
        assert!((a.enroll_full_days_clamped() - 365.0).abs() < 1e-9);
        a.enroll_full_days = 180.9;
        assert!((a.enroll_full_days_clamped() - 180.0).abs() < 1e-9);
    }
}
