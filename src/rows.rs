//! # rows — Bulk Rows Collaborator
//!
//! Fetches one page of historical rows for seeding a view.
//!
//! `GET {ROWS_URL}?page=N` may answer with either a bare JSON array of rows
//! or a paged envelope `{ "data": [...], "page": N, "total_pages": M }`.

use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::models::HistoricalRow;

/// One decoded page; a bare array is reported as the only page.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RowPage {
    pub rows:        Vec<HistoricalRow>,
    pub page:        u32,
    pub total_pages: u32,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RowsResponse {
    Bare(Vec<HistoricalRow>),
    Paged {
        #[serde(default)]
        data:        Vec<HistoricalRow>,
        page:        Option<u32>,
        #[serde(alias = "totalPages")]
        total_pages: Option<u32>,
    },
}

impl RowsResponse {
    fn into_page(self, requested: u32) -> RowPage {
        match self {
            RowsResponse::Bare(rows) => RowPage {
                rows,
                page:        requested,
                total_pages: requested,
            },
            RowsResponse::Paged { data, page, total_pages } => {
                let page = page.unwrap_or(requested);
                RowPage {
                    rows: data,
                    page,
                    total_pages: total_pages.unwrap_or(page).max(page),
                }
            }
        }
    }
}

/// Decode a response body already read as JSON.
pub fn parse_rows(body: serde_json::Value, requested_page: u32) -> anyhow::Result<RowPage> {
    let response: RowsResponse = serde_json::from_value(body)
        .context("Rows response is neither an array nor a { data: [...] } page")?;
    Ok(response.into_page(requested_page))
}

/// Fetch page `page` (1-based) from the rows endpoint.
pub async fn fetch_rows(
    client: &reqwest::Client,
    base_url: &str,
    page: u32,
    timeout: Duration,
) -> anyhow::Result<RowPage> {
    let page = page.max(1);
    debug!(base_url, page, "Fetching historical rows");

    let response = client
        .get(base_url)
        .query(&[("page", page)])
        .timeout(timeout)
        .send()
        .await
        .context("Rows API unreachable")?;

    let status = response.status();
    if !status.is_success() {
        warn!(%status, page, "Rows API returned an error status");
        anyhow::bail!("Rows API returned {status}");
    }

    let body: serde_json::Value = response
        .json()
        .await
        .context("Failed to parse rows response")?;

    parse_rows(body, page)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_bare_array_is_a_single_page() {
        let page = parse_rows(
            json!([{ "symbol": "NIFTY", "ltp": 25000.0 }, { "symbol": "BANKNIFTY", "close": 51000.0 }]),
            1,
        )
        .unwrap();
        assert_eq!(page.rows.len(), 2);
        assert_eq!((page.page, page.total_pages), (1, 1));
        assert_eq!(page.rows[0].price(), Some(25000.0));
    }

    #[test]
    fn test_paged_envelope() {
        let page = parse_rows(
            json!({
                "data": [{ "symbol": "NIFTY25000CE", "strike": 25000, "option_type": "CE", "premium": 120.5 }],
                "page": 2,
                "total_pages": 7
            }),
            2,
        )
        .unwrap();
        assert_eq!(page.rows.len(), 1);
        assert_eq!((page.page, page.total_pages), (2, 7));
    }

    #[test]
    fn test_unexpected_shape_is_an_error() {
        assert!(parse_rows(json!("rows"), 1).is_err());
    }
}
