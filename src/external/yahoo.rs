use std::time::Duration;

use crate::external::price_provider::{DateRange, ExternalPricePoint, PriceProvider, PriceProviderError};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;

pub const DEFAULT_BASE_URL: &str = "https://query1.finance.yahoo.com";

/// Yahoo Finance chart API. No API key required.
pub struct YahooProvider {
    client: reqwest::Client,
    base_url: String,
}

impl YahooProvider {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::builder()
                .user_agent("Mozilla/5.0 (compatible; pricecast/0.1)")
                .timeout(timeout)
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

// Minimal response structs (only what we need)
#[derive(Debug, Deserialize)]
struct YahooChartResponse {
    chart: YahooChart,
}

#[derive(Debug, Deserialize)]
struct YahooChart {
    result: Option<Vec<YahooResult>>,
    error: Option<YahooError>,
}

#[derive(Debug, Deserialize)]
struct YahooError {
    description: String,
}

#[derive(Debug, Deserialize)]
struct YahooResult {
    // Absent when the requested window holds no trading days
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: YahooIndicators,
}

#[derive(Debug, Deserialize)]
struct YahooIndicators {
    quote: Vec<YahooQuote>,
}

#[derive(Debug, Deserialize)]
struct YahooQuote {
    #[serde(default)]
    close: Vec<Option<f64>>,
}

fn unix_midnight(date: NaiveDate) -> i64 {
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp())
        .unwrap_or_default()
}

fn parse_chart_response(body: YahooChartResponse) -> Result<Vec<ExternalPricePoint>, PriceProviderError> {
    if let Some(error) = body.chart.error {
        if error.description.contains("No data found") {
            return Err(PriceProviderError::NotFound);
        }
        return Err(PriceProviderError::BadResponse(error.description));
    }

    let result = body
        .chart
        .result
        .and_then(|mut r| r.pop())
        .ok_or_else(|| PriceProviderError::BadResponse("missing result".into()))?;

    if result.timestamp.is_empty() {
        return Ok(Vec::new());
    }

    // timestamp aligns with close list by index
    let closes = &result
        .indicators
        .quote
        .first()
        .ok_or_else(|| PriceProviderError::BadResponse("missing quote".into()))?
        .close;

    if closes.len() != result.timestamp.len() {
        return Err(PriceProviderError::Parse(
            "Timestamp and close price arrays have different lengths".into(),
        ));
    }

    let mut points = Vec::with_capacity(closes.len());
    for (ts, close) in result.timestamp.iter().zip(closes.iter()) {
        // skip missing closes
        let Some(close) = *close else { continue };

        let date = chrono::DateTime::from_timestamp(*ts, 0)
            .map(|dt| dt.date_naive())
            .ok_or_else(|| PriceProviderError::Parse("bad timestamp".into()))?;

        points.push(ExternalPricePoint { date, close });
    }

    // Ensure ascending by date, one close per day
    points.sort_by_key(|p| p.date);
    points.dedup_by_key(|p| p.date);

    Ok(points)
}

#[async_trait]
impl PriceProvider for YahooProvider {
    async fn fetch_daily_history(
        &self,
        ticker: &str,
        range: Option<DateRange>,
    ) -> Result<Vec<ExternalPricePoint>, PriceProviderError> {
        let url = format!("{}/v8/finance/chart/{}", self.base_url, ticker);

        let mut query: Vec<(&str, String)> = vec![("interval", "1d".to_string())];
        match range {
            Some(range) => {
                query.push(("period1", unix_midnight(range.start).to_string()));
                query.push(("period2", unix_midnight(range.end).to_string()));
            }
            None => query.push(("range", "max".to_string())),
        }

        let resp = self
            .client
            .get(&url)
            .query(&query)
            .send()
            .await
            .map_err(|e| PriceProviderError::Network(e.to_string()))?;

        if resp.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(PriceProviderError::RateLimited);
        }
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(PriceProviderError::NotFound);
        }
        if !resp.status().is_success() {
            return Err(PriceProviderError::BadResponse(format!("HTTP {}", resp.status())));
        }

        let body = resp
            .json::<YahooChartResponse>()
            .await
            .map_err(|e| PriceProviderError::Parse(e.to_string()))?;

        parse_chart_response(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Result<Vec<ExternalPricePoint>, PriceProviderError> {
        parse_chart_response(serde_json::from_str(json).unwrap())
    }

    #[test]
    fn test_parses_closes_and_skips_nulls() {
        // 2024-01-02, 2024-01-03, 2024-01-04 at 14:30 UTC
        let json = r#"{"chart":{"result":[{"timestamp":[1704205800,1704292200,1704378600],
            "indicators":{"quote":[{"close":[185.5,null,181.9]}]}}],"error":null}}"#;

        let points = parse(json).unwrap();

        assert_eq!(points.len(), 2);
        assert_eq!(points[0].date, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        assert_eq!(points[0].close, 185.5);
        assert_eq!(points[1].date, NaiveDate::from_ymd_opt(2024, 1, 4).unwrap());
    }

    #[test]
    fn test_missing_timestamps_is_empty_not_error() {
        let json = r#"{"chart":{"result":[{"indicators":{"quote":[{}]}}],"error":null}}"#;
        assert!(parse(json).unwrap().is_empty());
    }

    #[test]
    fn test_no_data_error_maps_to_not_found() {
        let json = r#"{"chart":{"result":null,"error":{"code":"Not Found","description":"No data found, symbol may be delisted"}}}"#;
        assert!(matches!(parse(json), Err(PriceProviderError::NotFound)));
    }

    #[test]
    fn test_mismatched_lengths_is_parse_error() {
        let json = r#"{"chart":{"result":[{"timestamp":[1704205800,1704292200],
            "indicators":{"quote":[{"close":[185.5]}]}}],"error":null}}"#;
        assert!(matches!(parse(json), Err(PriceProviderError::Parse(_))));
    }

    #[test]
    fn test_unix_midnight() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        assert_eq!(unix_midnight(date), 1704153600);
    }
}
