use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info};

use crate::data::types::{near50_flag, sanitize_finite, sanitize_volume, MarketRecord};

pub struct GammaApiClient {
    client: Client,
    base_url: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GammaMarket {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    slug: Option<String>,
    #[serde(default)]
    question: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    end_date: Option<String>,
    #[serde(default)]
    volume_num: Option<f64>,
    #[serde(default)]
    volume: Option<String>,
    #[serde(default, rename = "volume24hr")]
    volume_24hr: Option<f64>,
    #[serde(default)]
    spread: Option<f64>,
    #[serde(default)]
    best_bid: Option<f64>,
    #[serde(default)]
    best_ask: Option<f64>,
    /// JSON-encoded array of price strings, e.g. `["0.52","0.49"]`.
    #[serde(default)]
    outcome_prices: Option<String>,
}

impl GammaApiClient {
    pub fn new(base_url: String, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent("polymarket-digest/0.1")
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client, base_url })
    }

    async fn fetch_page(&self, url: &str, limit: usize, offset: usize) -> Result<Vec<GammaMarket>> {
        self.client
            .get(url)
            .query(&[
                ("closed", "false".to_string()),
                ("limit", limit.to_string()),
                ("offset", offset.to_string()),
                ("order", "volumeNum".to_string()),
                ("ascending", "false".to_string()),
            ])
            .send()
            .await
            .context("Failed to fetch markets")?
            .error_for_status()
            .context("Gamma API returned an error status")?
            .json()
            .await
            .context("Failed to parse markets response")
    }

    /// Fetch all open markets, highest lifetime volume first.
    pub async fn fetch_open_markets(
        &self,
        page_size: usize,
        max_pages: usize,
    ) -> Result<Vec<MarketRecord>> {
        let url = format!("{}/markets", self.base_url);
        let url = url.as_str();
        let now = Utc::now();

        let markets = collect_pages(page_size, max_pages, move |offset| {
            self.fetch_page(url, page_size, offset)
        })
        .await?;
        let records: Vec<MarketRecord> = markets
            .into_iter()
            .map(|gm| convert_gamma_market(gm, now))
            .collect();

        info!("Fetched {} open markets from Gamma", records.len());
        Ok(records)
    }
}

/// Request pages at increasing offsets until one comes back empty or
/// `max_pages` have been read.
pub async fn collect_pages<F, Fut>(
    page_size: usize,
    max_pages: usize,
    mut fetch: F,
) -> Result<Vec<GammaMarket>>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<Vec<GammaMarket>>>,
{
    let mut markets = Vec::new();
    for page in 0..max_pages {
        let batch = fetch(page * page_size).await?;
        debug!("Gamma page {} returned {} markets", page, batch.len());
        if batch.is_empty() {
            break;
        }
        markets.extend(batch);
    }
    Ok(markets)
}

/// Convert a Gamma payload into a ranking record, observed at `now`.
pub fn convert_gamma_market(gm: GammaMarket, now: DateTime<Utc>) -> MarketRecord {
    let prices = gm
        .outcome_prices
        .as_deref()
        .and_then(|s| serde_json::from_str::<Vec<String>>(s).ok())
        .map(|v| v.iter().filter_map(|p| p.trim().parse::<f64>().ok()).collect::<Vec<_>>())
        .unwrap_or_default();

    let avg_spread = gm.spread.or(match (gm.best_bid, gm.best_ask) {
        (Some(bid), Some(ask)) if ask >= bid => Some(ask - bid),
        _ => None,
    });

    let underround = if prices.is_empty() {
        None
    } else {
        Some(prices.iter().sum::<f64>() - 1.0)
    };

    let midpoint = match (gm.best_bid, gm.best_ask) {
        (Some(bid), Some(ask)) if bid > 0.0 && ask > 0.0 => Some((bid + ask) / 2.0),
        _ if prices.len() == 2 => Some(prices[0]),
        _ => None,
    };

    let end_date = gm
        .end_date
        .as_deref()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc));
    let time_to_resolve_days =
        end_date.map(|end| (end - now).num_seconds() as f64 / 86_400.0);

    let url = gm
        .slug
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(|s| format!("https://polymarket.com/event/{}", s));

    MarketRecord {
        id: gm.id,
        url,
        slug: gm.slug,
        question: gm.question,
        category: gm.category.filter(|c| !c.trim().is_empty()),
        volume_lifetime: sanitize_volume(
            gm.volume_num
                .or_else(|| gm.volume.as_deref().and_then(|v| v.parse::<f64>().ok())),
        ),
        volume_24h: sanitize_volume(gm.volume_24hr),
        avg_spread: sanitize_finite(avg_spread),
        underround: sanitize_finite(underround),
        near50_flag: near50_flag(midpoint),
        time_to_resolve_days,
        end_date_iso: end_date.map(|dt| dt.to_rfc3339()),
    }
}
