use anyhow::{Context, Result, bail};
use reqwest::Client;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::time::Duration;

use crate::args::Args;
use crate::common::truncate_for_log;
use crate::targets::{MatchMode, Target, digits};

/// One record from the CMS Medicare Physician & Other Practitioners
/// dataset. Treated as untrusted: numeric fields arrive as numbers,
/// numeric strings, or not at all, and default to zero.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawCandidate {
    #[serde(default, rename = "Rndrng_NPI")]
    pub npi: String,
    #[serde(default, rename = "Rndrng_Prvdr_Last_Org_Name")]
    pub last_org_name: String,
    #[serde(default, rename = "Rndrng_Prvdr_First_Name")]
    pub first_name: String,
    #[serde(default, rename = "Rndrng_Prvdr_State_Abrvtn")]
    pub state: String,
    #[serde(default, rename = "Rndrng_Prvdr_City")]
    pub city: String,
    #[serde(
        default,
        rename = "Tot_Benes",
        alias = "Tot_benes",
        deserialize_with = "loose_number"
    )]
    pub total_beneficiaries: f64,
    #[serde(
        default,
        rename = "Tot_Srvcs",
        alias = "Tot_srvcs",
        deserialize_with = "loose_number"
    )]
    pub total_services: f64,
    #[serde(
        default,
        rename = "Tot_Mdcr_Pymt_Amt",
        alias = "Tot_Mdcr_Pymt_Amt_CY",
        deserialize_with = "loose_number"
    )]
    pub total_payment_amount: f64,
}

fn loose_number<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    })
}

pub struct CmsClient {
    client: Client,
    base_url: String,
    limit: u32,
}

impl CmsClient {
    pub fn new(args: &Args) -> Result<Self> {
        let client = Client::builder()
            .user_agent("ccm-proforma/0.1")
            .timeout(Duration::from_secs(args.timeout_secs))
            .build()
            .context("Failed creating HTTP client")?;
        Ok(Self {
            client,
            base_url: args.api_base_url.clone(),
            limit: args.limit,
        })
    }

    /// `filter[...]` query params for one target. Empty values are
    /// omitted; states are upper-cased and cut to two letters.
    fn filters(target: &Target) -> Vec<(String, String)> {
        let mut out = Vec::new();
        match target.mode {
            MatchMode::Npi => {
                let npi = digits(&target.npi);
                if !npi.is_empty() {
                    out.push(("filter[Rndrng_NPI]".to_string(), npi));
                }
            }
            MatchMode::Name => {
                let last = target.last.trim().to_uppercase();
                if !last.is_empty() {
                    out.push(("filter[Rndrng_Prvdr_Last_Org_Name]".to_string(), last));
                }
                let first = target.first.trim().to_uppercase();
                if !first.is_empty() {
                    out.push(("filter[Rndrng_Prvdr_First_Name]".to_string(), first));
                }
                let state: String = target.state.trim().to_uppercase().chars().take(2).collect();
                if !state.is_empty() {
                    out.push(("filter[Rndrng_Prvdr_State_Abrvtn]".to_string(), state));
                }
            }
        }
        out
    }

    /// Fetch candidate records for one target. A single attempt; any
    /// transport, timeout, or parse error surfaces to the caller.
    pub async fn lookup(&self, target: &Target) -> Result<Vec<RawCandidate>> {
        let mut query = Self::filters(target);
        query.push(("limit".to_string(), self.limit.to_string()));

        let response = self
            .client
            .get(&self.base_url)
            .query(&query)
            .send()
            .await
            .with_context(|| format!("CMS request failed for target {}", target.id))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!(
                "CMS API status {} for target {}. Body: {}",
                status,
                target.id,
                truncate_for_log(&body)
            );
        }

        response
            .json()
            .await
            .with_context(|| format!("Invalid CMS JSON for target {}", target.id))
    }
}
