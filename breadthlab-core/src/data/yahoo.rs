//! Yahoo Finance close-history provider.
//!
//! Fetches daily closes from Yahoo's v8 chart API using a `range` query, so
//! the request is expressed as a lookback rather than absolute dates and the
//! provider never consults the local clock. Handles retries with exponential
//! backoff and feeds the circuit breaker.
//!
//! Yahoo Finance has no official API and is subject to unannounced format
//! changes. `CsvDirProvider` is the fallback when Yahoo is unavailable.

use super::circuit_breaker::CircuitBreaker;
use super::provider::{
    ClosePoint, DataError, DataSource, Lookback, PriceHistory, PriceHistoryProvider,
};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartResult,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    result: Option<Vec<ChartData>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    meta: Option<ChartMeta>,
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct ChartMeta {
    /// Exchange offset from UTC in seconds.
    gmtoffset: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<QuoteData>,
}

#[derive(Debug, Deserialize)]
struct QuoteData {
    close: Vec<Option<f64>>,
}

pub struct YahooProvider {
    client: reqwest::blocking::Client,
    circuit_breaker: Arc<CircuitBreaker>,
    max_retries: u32,
    base_delay: Duration,
}

impl YahooProvider {
    pub fn new(circuit_breaker: Arc<CircuitBreaker>) -> Result<Self, DataError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36")
            .build()
            .map_err(|e| DataError::Other(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            circuit_breaker,
            max_retries: 3,
            base_delay: Duration::from_millis(500),
        })
    }

    fn chart_url(symbol: &str, lookback: Lookback) -> String {
        format!(
            "https://query2.finance.yahoo.com/v8/finance/chart/{symbol}\
             ?range={}d&interval=1d",
            lookback.as_days()
        )
    }

    /// Parse the chart response into close points, ascending by date.
    ///
    /// Sessions with a null close are kept as missing points; the engine
    /// decides what is usable.
    fn parse_response(symbol: &str, resp: ChartResponse) -> Result<Vec<ClosePoint>, DataError> {
        let result = resp.chart.result.ok_or_else(|| match resp.chart.error {
            Some(err) if err.code == "Not Found" => DataError::SymbolNotFound {
                symbol: symbol.to_string(),
            },
            Some(err) => {
                DataError::ResponseFormatChanged(format!("{}: {}", err.code, err.description))
            }
            None => DataError::ResponseFormatChanged("empty result with no error".into()),
        })?;

        let data = match result.into_iter().next() {
            Some(data) => data,
            None => return Ok(Vec::new()),
        };

        // Yahoo omits `timestamp` entirely when the range holds no sessions.
        let timestamps = match data.timestamp {
            Some(ts) => ts,
            None => return Ok(Vec::new()),
        };

        let offset = data.meta.and_then(|m| m.gmtoffset).unwrap_or(0);

        let quote = data
            .indicators
            .quote
            .into_iter()
            .next()
            .ok_or_else(|| DataError::ResponseFormatChanged("no quote data".into()))?;

        let mut points = Vec::with_capacity(timestamps.len());
        for (i, &ts) in timestamps.iter().enumerate() {
            let date = chrono::DateTime::from_timestamp(ts + offset, 0)
                .map(|dt| dt.naive_utc().date())
                .ok_or_else(|| {
                    DataError::ResponseFormatChanged(format!("invalid timestamp: {ts}"))
                })?;
            let close = quote.close.get(i).copied().flatten();
            points.push(ClosePoint { date, close });
        }

        Ok(points)
    }

    fn fetch_with_retry(&self, symbol: &str, lookback: Lookback) -> Result<Vec<ClosePoint>, DataError> {
        if !self.circuit_breaker.is_allowed() {
            tracing::debug!(
                symbol,
                remaining = ?self.circuit_breaker.remaining_cooldown(),
                "circuit breaker open, request refused"
            );
            return Err(DataError::CircuitBreakerTripped);
        }

        let url = Self::chart_url(symbol, lookback);
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = self.base_delay * 2u32.pow(attempt - 1);
                tracing::debug!(symbol, attempt, ?delay, "retrying Yahoo request");
                std::thread::sleep(delay);
            }

            if !self.circuit_breaker.is_allowed() {
                return Err(DataError::CircuitBreakerTripped);
            }

            match self.client.get(&url).send() {
                Ok(resp) => {
                    let status = resp.status();

                    if status == reqwest::StatusCode::FORBIDDEN {
                        self.circuit_breaker.trip();
                        return Err(DataError::CircuitBreakerTripped);
                    }

                    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                        self.circuit_breaker.record_failure();
                        let retry_after = resp
                            .headers()
                            .get("retry-after")
                            .and_then(|v| v.to_str().ok())
                            .and_then(|v| v.parse::<u64>().ok())
                            .unwrap_or(60);
                        last_error = Some(DataError::RateLimited {
                            retry_after_secs: retry_after,
                        });
                        continue;
                    }

                    if status == reqwest::StatusCode::NOT_FOUND {
                        return Err(DataError::SymbolNotFound {
                            symbol: symbol.to_string(),
                        });
                    }

                    if !status.is_success() {
                        self.circuit_breaker.record_failure();
                        last_error = Some(DataError::Other(format!("HTTP {status} for {symbol}")));
                        continue;
                    }

                    let chart: ChartResponse = resp.json().map_err(|e| {
                        DataError::ResponseFormatChanged(format!(
                            "failed to parse response for {symbol}: {e}"
                        ))
                    })?;

                    let points = Self::parse_response(symbol, chart)?;
                    self.circuit_breaker.record_success();
                    return Ok(points);
                }
                Err(e) => {
                    if e.is_connect() || e.is_timeout() {
                        last_error = Some(DataError::NetworkUnreachable(e.to_string()));
                        continue;
                    }
                    return Err(DataError::NetworkUnreachable(e.to_string()));
                }
            }
        }

        Err(last_error.unwrap_or_else(|| DataError::Other("max retries exceeded".into())))
    }
}

impl PriceHistoryProvider for YahooProvider {
    fn name(&self) -> &str {
        "yahoo_finance"
    }

    fn fetch_closes(&self, identifier: &str, lookback: Lookback) -> Result<PriceHistory, DataError> {
        let points = self.fetch_with_retry(identifier, lookback)?;
        Ok(PriceHistory {
            identifier: identifier.to_string(),
            points,
            source: DataSource::YahooFinance,
        })
    }

    fn is_available(&self) -> bool {
        self.circuit_breaker.is_allowed()
    }
}
