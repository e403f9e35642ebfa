use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use crate::constants::DEFAULT_CMS_API_BASE_URL;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum InputMode {
    /// One physician per line: "First Last, ST".
    Names,
    /// One physician per line: "NPI, ST".
    Npis,
}

#[derive(Debug, Parser)]
#[command(name = "ccm_proforma")]
#[command(about = "Match physicians against Medicare provider utilization data and build a CCM pro forma")]
pub struct Args {
    /// Target list file, one physician per line.
    #[arg(long)]
    pub input: PathBuf,

    /// How input lines are interpreted.
    #[arg(long, value_enum, default_value_t = InputMode::Names)]
    pub mode: InputMode,

    /// Optional JSON file overriding model assumptions. Missing fields
    /// fall back to their defaults.
    #[arg(long)]
    pub assumptions: Option<PathBuf>,

    /// Physician-level export CSV path.
    #[arg(long, default_value = "physicians.csv")]
    pub physicians_csv: PathBuf,

    /// Pro forma summary export CSV path.
    #[arg(long, default_value = "pro_forma.csv")]
    pub pro_forma_csv: PathBuf,

    /// Optional 12-month projection series CSV path.
    #[arg(long)]
    pub monthly_csv: Option<PathBuf>,

    /// Max concurrent in-flight CMS lookups.
    #[arg(long, default_value_t = 2)]
    pub concurrency: usize,

    /// Global request start rate for CMS lookups. 0 disables pacing.
    #[arg(long, default_value_t = 2)]
    pub requests_per_second: u32,

    /// Per-request timeout in seconds. A timed-out lookup yields a
    /// fallback row; it is not retried.
    #[arg(long, default_value_t = 8)]
    pub timeout_secs: u64,

    /// Page size for CMS candidate queries.
    #[arg(long, default_value_t = 50)]
    pub limit: u32,

    /// CMS data API base URL.
    ///
    /// Dataset reference:
    /// https://data.cms.gov/provider-summary-by-type-of-service/medicare-physician-other-practitioners/medicare-physician-other-practitioners-by-provider
    #[arg(long, default_value = DEFAULT_CMS_API_BASE_URL)]
    pub api_base_url: String,
}
