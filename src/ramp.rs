use crate::constants::MONTHS;
use crate::model::{Assumptions, clamp01};

fn smoothstep(x: f64) -> f64 {
    if x <= 0.0 {
        0.0
    } else if x >= 1.0 {
        1.0
    } else {
        x * x * (3.0 - 2.0 * x)
    }
}

/// Penetration fraction reached `day` days after program start.
///
/// Quadratic ease-in from the day-0 start to the day-60 target, then a
/// smoothstep S-curve up to the full-scale cap, flat from there on. All
/// percentage inputs are clamped to [0, 1] before use.
pub fn day_pct(day: f64, a: &Assumptions) -> f64 {
    let start = clamp01(a.enroll_start_pct);
    let day60 = clamp01(a.enroll_day60_pct);
    let cap = clamp01(a.enroll_max_pct);
    let full = a.enroll_full_days_clamped();
    if day <= 60.0 {
        let x = day / 60.0;
        start + (day60 - start) * x * x
    } else if day >= full {
        cap
    } else {
        let x = (day - 60.0) / (full - 60.0);
        day60 + (cap - day60) * smoothstep(x)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RampMonth {
    pub month: &'static str,
    pub enrolled_pct: u32,
}

/// Sample the ramp on the 15th of each modeled month, as whole percents.
pub fn monthly_ramp(a: &Assumptions) -> Vec<RampMonth> {
    (0..12)
        .map(|i| {
            let day = 15.0 + 30.0 * i as f64;
            RampMonth {
                month: MONTHS[i],
                enrolled_pct: (day_pct(day, a) * 100.0).round() as u32,
            }
        })
        .collect()
}
