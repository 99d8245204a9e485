use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use lendsim_common::errors::PriceDataError;
use serde::Deserialize;

use crate::errors::EngineError;

pub const ONE_HOUR_IN_SECONDS: i64 = 3600;
const GRANULARITY_LIMIT_DAYS: i64 = 90;
const BASE_URL: &str = "https://api.coingecko.com/api/v3/coins";

fn symbol_to_coin_id(symbol: &str) -> Result<&'static str, PriceDataError> {
    match symbol.to_ascii_uppercase().as_str() {
        "BTC" => Ok("bitcoin"),
        "ETH" => Ok("ethereum"),
        "SOL" => Ok("solana"),
        "AVAX" => Ok("avalanche"),
        "ATOM" => Ok("cosmos-hub"),
        other => Err(PriceDataError::PriceNotFound(other.to_string())),
    }
}

/// CSV-backed cache for one symbol's historical prices, topped up from the
/// market-chart API when stale. Each row: `time` (unix seconds), `price`.
#[derive(Clone, Debug)]
pub struct PriceStore {
    pub data_dir: PathBuf,
}

impl Default for PriceStore {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
        }
    }
}

impl PriceStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    fn cache_path(&self, symbol: &str) -> PathBuf {
        self.data_dir.join(format!("{symbol}.csv"))
    }

    /// Returns the cached series, rows with `time <= end_time`, topping up
    /// the cache first if it's more than an hour stale.
    pub fn get_data(&self, symbol: &str, end_time: i64) -> Result<Vec<(i64, f64)>, EngineError> {
        let mut rows = self.read_cache(symbol)?;

        let is_stale = rows
            .last()
            .is_none_or(|&(t, _)| t < end_time - ONE_HOUR_IN_SECONDS);
        if is_stale {
            let start = rows.last().map_or(end_time - GRANULARITY_LIMIT_DAYS * 86_400, |&(t, _)| t);
            let fetched = self.fetch_from_coingecko(symbol, start, end_time)?;
            let oldest_cached = rows.last().map_or(i64::MIN, |&(t, _)| t);
            rows.extend(
                fetched
                    .into_iter()
                    .filter(|&(t, _)| t > oldest_cached),
            );
            self.write_cache(symbol, &rows)?;
        }

        Ok(rows.into_iter().filter(|&(t, _)| t <= end_time).collect())
    }

    fn read_cache(&self, symbol: &str) -> Result<Vec<(i64, f64)>, EngineError> {
        let path = self.cache_path(symbol);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let mut reader = csv::Reader::from_path(&path).map_err(|e| EngineError::Io {
            path: path.display().to_string(),
            source: std::io::Error::new(std::io::ErrorKind::Other, e),
        })?;
        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| EngineError::Io {
                path: path.display().to_string(),
                source: std::io::Error::new(std::io::ErrorKind::Other, e),
            })?;
            let time: i64 = record[0].parse().unwrap_or_default();
            let price: f64 = record[1].parse().unwrap_or_default();
            rows.push((time, price));
        }
        rows.sort_by_key(|&(t, _)| t);
        Ok(rows)
    }

    fn write_cache(&self, symbol: &str, rows: &[(i64, f64)]) -> Result<(), EngineError> {
        std::fs::create_dir_all(&self.data_dir).map_err(|e| EngineError::Io {
            path: self.data_dir.display().to_string(),
            source: e,
        })?;
        let path = self.cache_path(symbol);
        let mut writer = csv::Writer::from_path(&path).map_err(|e| EngineError::Io {
            path: path.display().to_string(),
            source: std::io::Error::new(std::io::ErrorKind::Other, e),
        })?;
        writer.write_record(["time", "price"]).ok();
        for &(t, p) in rows {
            writer.write_record([t.to_string(), p.to_string()]).ok();
        }
        writer.flush().map_err(|e| EngineError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        Ok(())
    }

    /// Fetches `[start, end]` (unix seconds) from the market-chart API.
    /// Rejects ranges over 90 days, and pads short ranges back by 86401
    /// seconds to force hourly (rather than daily) granularity out of the
    /// upstream API, matching its documented behavior.
    fn fetch_from_coingecko(
        &self,
        symbol: &str,
        start: i64,
        end: i64,
    ) -> Result<Vec<(i64, f64)>, EngineError> {
        let coin_id = symbol_to_coin_id(symbol)?;
        let days = ((end - start) / 86_400).abs();
        if days > GRANULARITY_LIMIT_DAYS {
            return Err(EngineError::PriceData(PriceDataError::Granularity));
        }
        let start = if days < 1 { start - 86_401 } else { start };

        let url = format!(
            "{BASE_URL}/{coin_id}/market_chart/range?vs_currency=usd&from={start}&to={end}"
        );
        let response: MarketChartResponse = reqwest::blocking::get(&url)
            .map_err(|e| EngineError::Http(e.to_string()))?
            .json()
            .map_err(|e| EngineError::Http(e.to_string()))?;

        Ok(map_and_filter_coingecko_data(response.prices, start))
    }
}

#[derive(Deserialize)]
struct MarketChartResponse {
    prices: Vec<(i64, f64)>,
}

/// `[unix_millis, price]` pairs -> `[unix_seconds, price rounded to 1dp]`,
/// keeping only rows newer than `oldest_time` (seconds).
fn map_and_filter_coingecko_data(prices: Vec<(i64, f64)>, oldest_time: i64) -> Vec<(i64, f64)> {
    prices
        .into_iter()
        .map(|(ms, price)| (ms / 1000, (price * 10.0).round() / 10.0))
        .filter(|&(t, _)| t > oldest_time)
        .collect()
}

/// Reads a whole CSV into an in-memory map, for tests/fixtures that don't
/// want the staleness-check/network path.
pub fn load_fixture_csv(path: impl AsRef<Path>) -> Result<BTreeMap<i64, f64>, EngineError> {
    let path = path.as_ref();
    let mut reader = csv::Reader::from_path(path).map_err(|e| EngineError::Io {
        path: path.display().to_string(),
        source: std::io::Error::new(std::io::ErrorKind::Other, e),
    })?;
    let mut out = BTreeMap::new();
    for record in reader.records() {
        let record = record.map_err(|e| EngineError::Io {
            path: path.display().to_string(),
            source: std::io::Error::new(std::io::ErrorKind::Other, e),
        })?;
        out.insert(record[0].parse().unwrap_or_default(), record[1].parse().unwrap_or_default());
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbol_mapping_matches_contract() {
        assert_eq!(symbol_to_coin_id("BTC").unwrap(), "bitcoin");
        assert_eq!(symbol_to_coin_id("ATOM").unwrap(), "cosmos-hub");
        assert!(symbol_to_coin_id("DOGE").is_err());
    }

    #[test]
    fn map_and_filter_floors_ms_and_rounds_price() {
        let rows = map_and_filter_coingecko_data(vec![(1_000_500, 123.456), (2_000_000, 10.0)], 1);
        assert_eq!(rows, vec![(1000, 123.5), (2000, 10.0)]);
    }

    #[test]
    fn map_and_filter_drops_rows_not_newer_than_oldest() {
        let rows = map_and_filter_coingecko_data(vec![(1_000_000, 1.0), (2_000_000, 2.0)], 1500);
        assert_eq!(rows, vec![(2000, 2.0)]);
    }
}
