use anyhow::{Context, Result};
use csv::Writer;
use std::{collections::HashMap, fs, path::Path};

use crate::matching::PortfolioRow;
use crate::model::{Assumptions, ProForma, ProjectionMonth, clamp01, compute_row, monthly_at};

/// Export column: row key plus display label.
pub struct Column {
    pub key: &'static str,
    pub label: &'static str,
}

pub type Row = HashMap<&'static str, String>;

const fn col(key: &'static str) -> Column {
    Column { key, label: key }
}

fn round(x: f64) -> i64 {
    x.round() as i64
}

fn fmt_num(x: f64) -> String {
    round(x).to_string()
}

/// Title-case a display name ("NGUYEN AMELIA" -> "Nguyen Amelia").
pub fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut at_word_start = true;
    for ch in s.to_lowercase().chars() {
        if at_word_start && ch.is_alphanumeric() {
            out.extend(ch.to_uppercase());
            at_word_start = false;
        } else {
            if !ch.is_alphanumeric() {
                at_word_start = true;
            }
            out.push(ch);
        }
    }
    out
}

/// Write `rows` under `columns`, via a temp file renamed into place.
/// Cells missing from a row are left empty.
pub fn write_csv(path: &Path, columns: &[Column], rows: &[Row]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed creating export dir {}", parent.display()))?;
        }
    }
    let file_name = path
        .file_name()
        .and_then(|x| x.to_str())
        .unwrap_or("export.csv");
    let tmp_path = path.with_file_name(format!("{file_name}.tmp"));

    let mut writer = Writer::from_path(&tmp_path)
        .with_context(|| format!("Failed creating temp export CSV {}", tmp_path.display()))?;
    writer
        .write_record(columns.iter().map(|c| c.label))
        .context("Failed writing export CSV header")?;
    for row in rows {
        writer
            .write_record(
                columns
                    .iter()
                    .map(|c| row.get(c.key).map(String::as_str).unwrap_or("")),
            )
            .context("Failed writing export CSV row")?;
    }
    writer.flush().context("Failed flushing export CSV")?;

    fs::rename(&tmp_path, path).with_context(|| {
        format!(
            "Failed moving temp export {} to {}",
            tmp_path.display(),
            path.display()
        )
    })?;
    Ok(())
}

pub fn physician_columns() -> Vec<Column> {
    vec![
        col("Physician"),
        col("NPI"),
        col("State"),
        col("City"),
        col("Adj_FFS_Medicare_Benes"),
        col("Est_MA_Benes"),
        col("Total_Eligible"),
        col("Monthly_Enrolled_at_Full_Scale"),
        col("Monthly_Events"),
        col("Monthly_Revenue"),
        col("Monthly_Var_Cost"),
        col("Monthly_Net_before_Fixed"),
        col("Annual_Revenue_at_Full_Scale"),
        col("Annual_Net_before_Fixed"),
    ]
}

/// One export row per physician, monthly figures at the full-scale
/// fraction using that physician's own FFS/MA split.
pub fn physician_rows(rows: &[PortfolioRow], a: &Assumptions) -> Vec<Row> {
    let cap = clamp01(a.enroll_max_pct);
    rows.iter()
        .map(|r| {
            let fin = compute_row(r, a);
            let monthly = monthly_at(&fin.into(), a, cap);
            let annual_revenue = monthly.revenue * 12.0;
            let annual_net = monthly.profit() * 12.0;
            Row::from([
                ("Physician", title_case(&r.name)),
                ("NPI", r.npi.clone()),
                ("State", r.state.clone()),
                ("City", r.city.clone()),
                ("Adj_FFS_Medicare_Benes", fmt_num(fin.adjusted_ffs)),
                ("Est_MA_Benes", fmt_num(fin.ma_benes)),
                ("Total_Eligible", fmt_num(fin.total_eligible)),
                ("Monthly_Enrolled_at_Full_Scale", fmt_num(monthly.enrolled)),
                ("Monthly_Events", fmt_num(monthly.events)),
                ("Monthly_Revenue", fmt_num(monthly.revenue)),
                ("Monthly_Var_Cost", fmt_num(monthly.variable_cost)),
                ("Monthly_Net_before_Fixed", fmt_num(monthly.profit())),
                ("Annual_Revenue_at_Full_Scale", fmt_num(annual_revenue)),
                ("Annual_Net_before_Fixed", fmt_num(annual_net)),
            ])
        })
        .collect()
}

pub fn label_value_columns() -> Vec<Column> {
    vec![col("Label"), col("Value")]
}

fn label_value(label: &'static str, value: String) -> Row {
    Row::from([("Label", label.to_string()), ("Value", value)])
}

/// Pro forma summary rows: portfolio metrics, a blank separator, then
/// every assumption value as entered (assumptions are not rounded).
pub fn pro_forma_rows(pf: &ProForma, a: &Assumptions, physician_count: usize) -> Vec<Row> {
    let per_md = pf.totals.adjusted_ffs / physician_count.max(1) as f64;
    vec![
        label_value("Adj_FFS_Medicare_Benes", fmt_num(pf.totals.adjusted_ffs)),
        label_value("Est_MA_Benes", fmt_num(pf.totals.ma_benes)),
        label_value("Total_Eligible_Patients", fmt_num(pf.totals.total_eligible)),
        label_value(
            "Monthly_Revenue_at_Full_Scale",
            fmt_num(pf.full_scale.revenue),
        ),
        label_value("Monthly_Events_at_Full_Scale", fmt_num(pf.full_scale.events)),
        label_value(
            "Monthly_Variable_Cost_at_Full_Scale",
            fmt_num(pf.full_scale.variable_cost),
        ),
        label_value("Annual_Revenue_at_Full_Scale", fmt_num(pf.annual_revenue())),
        label_value(
            "Annual_Variable_Costs_at_Full_Scale",
            fmt_num(pf.annual_variable_cost()),
        ),
        label_value("Annual_Profit_at_Full_Scale", fmt_num(pf.annual_profit())),
        label_value(
            "Enrolled_Patients_Full_Scale",
            fmt_num(pf.enrolled_full_scale()),
        ),
        label_value("Medicare_Patients_per_MD", fmt_num(per_md)),
        label_value("Total_Billable_Events_Year1", fmt_num(pf.year1_events())),
        label_value(
            "Total_Billable_Events_Annualized_Full_Scale",
            fmt_num(pf.annualized_events()),
        ),
        label_value("", String::new()),
        label_value("Assumption_Bene_Scale_Down", a.bene_scale_down.to_string()),
        label_value("Assumption_MA_Bene_Factor", a.ma_bene_factor.to_string()),
        label_value(
            "Assumption_Qualification_Rate",
            a.qualification_rate.to_string(),
        ),
        label_value("Assumption_MA_Rate_Factor", a.ma_rate_factor.to_string()),
        label_value("Assumption_Collection_Rate", a.collection_rate.to_string()),
        label_value("Assumption_99490_Reimbursement", a.ccm99490.to_string()),
        label_value(
            "Assumption_Variable_Cost_per_Event",
            a.variable_cost_per_event.to_string(),
        ),
        label_value(
            "Assumption_Fixed_Annual_Overhead",
            a.fixed_annual_overhead.to_string(),
        ),
        label_value("Assumption_Enroll_Start_%", a.enroll_start_pct.to_string()),
        label_value("Assumption_Enroll_Day60_%", a.enroll_day60_pct.to_string()),
        label_value("Assumption_Enroll_Max_%", a.enroll_max_pct.to_string()),
        label_value("Assumption_Enroll_Full_Days", a.enroll_full_days.to_string()),
    ]
}

pub fn monthly_columns() -> Vec<Column> {
    vec![
        col("Month"),
        col("Enrolled_Pct"),
        col("Enrolled_Patients"),
        col("Events"),
        col("Revenue"),
        col("Variable_Cost"),
        col("Profit"),
    ]
}

pub fn monthly_rows(months: &[ProjectionMonth]) -> Vec<Row> {
    months
        .iter()
        .map(|m| {
            Row::from([
                ("Month", m.month.to_string()),
                ("Enrolled_Pct", m.enrolled_pct.to_string()),
                ("Enrolled_Patients", fmt_num(m.enrolled)),
                ("Events", fmt_num(m.events)),
                ("Revenue", fmt_num(m.revenue)),
                ("Variable_Cost", fmt_num(m.variable_cost)),
                ("Profit", fmt_num(m.profit)),
            ])
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matching::sample_portfolio;
    use crate::model::{compute_row, portfolio_totals};

    #[test]
    fn title_case_handles_multiword_names() {
        assert_eq!(title_case("NGUYEN AMELIA"), "Nguyen Amelia");
        assert_eq!(title_case("o'brien-smith"), "O'Brien-Smith");
        assert_eq!(title_case(""), "");
    }

    #[test]
    fn physician_rows_round_at_export_only() {
        let a = Assumptions::default();
        let rows = sample_portfolio();
        let out = physician_rows(&rows, &a);
        assert_eq!(out.len(), 3);
        let first = &out[0];
        assert_eq!(first["Physician"], "Nguyen Amelia");
        assert_eq!(first["NPI"], "1234567890");
        // 780 * 0.9 = 702, 780 * 0.85 = 663, total 1365, 60% cap = 819
        assert_eq!(first["Adj_FFS_Medicare_Benes"], "702");
        assert_eq!(first["Est_MA_Benes"], "663");
        assert_eq!(first["Total_Eligible"], "1365");
        assert_eq!(first["Monthly_Enrolled_at_Full_Scale"], "819");
    }

    #[test]
    fn pro_forma_rows_cover_metrics_and_assumptions() {
        let a = Assumptions::default();
        let rows = sample_portfolio();
        let fins: Vec<_> = rows.iter().map(|r| compute_row(r, &a)).collect();
        let pf = ProForma::build(portfolio_totals(&fins), &a);
        let out = pro_forma_rows(&pf, &a, rows.len());
        // 13 metrics + separator + 12 assumptions
        assert_eq!(out.len(), 26);
        assert_eq!(out[0]["Label"], "Adj_FFS_Medicare_Benes");
        assert_eq!(out[13]["Label"], "");
        assert_eq!(out[14]["Label"], "Assumption_Bene_Scale_Down");
        assert_eq!(out[14]["Value"], "0.9");
        assert_eq!(out[25]["Label"], "Assumption_Enroll_Full_Days");
    }

    #[test]
    fn per_md_count_floors_at_one_physician() {
        let a = Assumptions::default();
        let pf = ProForma::build(Default::default(), &a);
        let out = pro_forma_rows(&pf, &a, 0);
        let per_md = out.iter().find(|r| r["Label"] == "Medicare_Patients_per_MD");
        assert_eq!(per_md.unwrap()["Value"], "0");
    }

    #[test]
    fn monthly_rows_are_one_per_month() {
        let a = Assumptions::default();
        let rows = sample_portfolio();
        let fins: Vec<_> = rows.iter().map(|r| compute_row(r, &a)).collect();
        let pf = ProForma::build(portfolio_totals(&fins), &a);
        let out = monthly_rows(&pf.months);
        assert_eq!(out.len(), 12);
        assert_eq!(out[0]["Month"], "Jan");
        assert_eq!(out[11]["Month"], "Dec");
    }

    #[test]
    fn write_csv_emits_header_and_quotes_cells() {
        let dir = std::env::temp_dir().join(format!("ccm_proforma_test_{}", std::process::id()));
        let path = dir.join("out.csv");
        let columns = vec![col("A"), col("B")];
        let rows = vec![
            Row::from([("A", "plain".to_string()), ("B", "needs,quoting".to_string())]),
            Row::from([("A", "second".to_string())]),
        ];
        write_csv(&path, &columns, &rows).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text, "A,B\nplain,\"needs,quoting\"\nsecond,\n");
        fs::remove_dir_all(&dir).unwrap();
    }
}
