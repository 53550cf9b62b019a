use std::env;
use std::fs::File;
use std::io::BufRead;
use std::io::BufReader;
use std::path::Path;

use anyhow::bail;
use anyhow::Context;
use anyhow::Result;
use chrono::NaiveDate;
use ndarray::Array2;
use portfolio_rs::quant::portfolio::AllocationReport;
use portfolio_rs::quant::portfolio::Metric;
use portfolio_rs::quant::portfolio::PortfolioEngine;
use portfolio_rs::quant::portfolio::PortfolioEngineConfig;
use portfolio_rs::quant::portfolio::PriceMatrix;
use prettytable::row;
use prettytable::Table;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: portfolio-rs <prices.csv> [risk_free_pct] [sharpe|sortino]";

fn main() -> Result<()> {
  tracing_subscriber::registry()
    .with(tracing_subscriber::fmt::layer())
    .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .init();

  let args: Vec<String> = env::args().skip(1).collect();
  let Some(path) = args.first() else {
    bail!(USAGE);
  };
  let risk_free_rate = match args.get(1) {
    Some(raw) => raw
      .parse::<f64>()
      .with_context(|| format!("invalid risk-free rate {raw:?}\n{USAGE}"))?,
    None => 0.0,
  };
  let metric = match args.get(2) {
    Some(raw) => raw.parse::<Metric>()?,
    None => Metric::default(),
  };

  let prices = read_price_csv(path)?;
  info!(
    path = %path,
    assets = prices.n_assets(),
    rows = prices.n_rows(),
    "loaded price matrix"
  );

  let engine = PortfolioEngine::new(PortfolioEngineConfig {
    metric,
    risk_free_rate,
    ..PortfolioEngineConfig::default()
  });
  let report = engine.optimize(&prices)?;
  print_report(&report);

  Ok(())
}

fn read_price_csv(path: impl AsRef<Path>) -> Result<PriceMatrix> {
  let path = path.as_ref();
  let file = File::open(path).with_context(|| format!("cannot open {}", path.display()))?;
  parse_price_csv(BufReader::new(file)).with_context(|| format!("cannot parse {}", path.display()))
}

/// `date,T1,T2,...` header, one `YYYY-MM-DD` row per date, empty cells are missing prices.
fn parse_price_csv<R: BufRead>(reader: R) -> Result<PriceMatrix> {
  let mut lines = reader
    .lines()
    .enumerate()
    .filter(|(_, line)| line.as_ref().map_or(true, |l| !l.trim().is_empty()));

  let Some((_, header)) = lines.next() else {
    bail!("empty price file");
  };
  let header = header?;
  let tickers: Vec<String> = header
    .split(',')
    .skip(1)
    .map(|t| t.trim().to_string())
    .collect();
  if tickers.is_empty() {
    bail!("header has no ticker columns");
  }

  let mut dates = Vec::new();
  let mut flat = Vec::new();
  for (idx, line) in lines {
    let line = line?;
    let lineno = idx + 1;
    let cells: Vec<&str> = line.split(',').map(str::trim).collect();
    if cells.len() != tickers.len() + 1 {
      bail!(
        "line {lineno}: expected {} columns, found {}",
        tickers.len() + 1,
        cells.len()
      );
    }

    let date = NaiveDate::parse_from_str(cells[0], "%Y-%m-%d")
      .with_context(|| format!("line {lineno}: invalid date {:?}", cells[0]))?;
    dates.push(date);

    for cell in &cells[1..] {
      let price = if cell.is_empty() {
        f64::NAN
      } else {
        cell
          .parse::<f64>()
          .with_context(|| format!("line {lineno}: invalid price {cell:?}"))?
      };
      flat.push(price);
    }
  }

  let prices = Array2::from_shape_vec((dates.len(), tickers.len()), flat)?;
  Ok(PriceMatrix::new(tickers, prices)?.with_dates(dates)?)
}

fn print_report(report: &AllocationReport) {
  let mut weights = Table::new();
  weights.set_titles(row!["Ticker", "Weight"]);
  for (ticker, weight) in report.allocations() {
    weights.add_row(row![ticker, r->format!("{:.2}%", weight * 100.0)]);
  }
  weights.printstd();

  let risk = &report.risk;
  let mut summary = Table::new();
  summary.add_row(row![format!("{}", report.metric), r->format!("{:.4}", report.score)]);
  summary.add_row(row!["Annualized return", r->format!("{:.2}%", risk.annualized_return * 100.0)]);
  summary.add_row(row![
    "Annualized volatility",
    r->format!("{:.2}%", risk.annualized_volatility * 100.0)
  ]);
  summary.add_row(row![
    format!("1-day VaR ({:.0}%)", risk.confidence * 100.0),
    r->format!("{:.2}%", risk.var * 100.0)
  ]);
  summary.add_row(row![
    format!("1-day CVaR ({:.0}%)", risk.confidence * 100.0),
    r->format!("{:.2}%", risk.cvar * 100.0)
  ]);
  summary.add_row(row!["Converged", r->report.converged]);
  summary.add_row(row!["Iterations", r->report.iterations]);
  summary.printstd();
}

#[cfg(test)]
mod tests {
  use std::io::Cursor;
  use std::io::Write;

  use tempfile::NamedTempFile;

  use super::*;

  const CSV: &str = "date,AAA,BBB\n\
    2024-01-02,100.0,50.0\n\
    2024-01-03,101.0,50.5\n\
    \n\
    2024-01-04,,50.0\n\
    2024-01-05,103.0,51.0\n\
    2024-01-08,102.0,50.8\n";

  #[test]
  fn reads_prices_with_missing_cells() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(CSV.as_bytes()).unwrap();

    let prices = read_price_csv(file.path()).unwrap();
    assert_eq!(prices.tickers(), ["AAA".to_string(), "BBB".to_string()]);
    assert_eq!(prices.n_rows(), 5);
    assert!(prices.prices()[[2, 0]].is_nan());
    assert_eq!(prices.prices()[[4, 1]], 50.8);
    assert_eq!(
      prices.dates().unwrap()[0],
      NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()
    );
    assert_eq!(prices.complete_rows(), 4);
  }

  #[test]
  fn ragged_rows_are_reported_with_line_number() {
    let err = parse_price_csv(Cursor::new("date,AAA,BBB\n2024-01-02,1.0\n")).unwrap_err();
    assert!(err.to_string().contains("line 2"), "{err}");
  }

  #[test]
  fn bad_dates_and_prices_are_rejected() {
    assert!(parse_price_csv(Cursor::new("date,AAA\n02/01/2024,1.0\n")).is_err());
    assert!(parse_price_csv(Cursor::new("date,AAA\n2024-01-02,abc\n")).is_err());
    assert!(parse_price_csv(Cursor::new("")).is_err());
    assert!(parse_price_csv(Cursor::new("date\n")).is_err());
  }

  #[test]
  fn missing_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(read_price_csv(dir.path().join("nope.csv")).is_err());
  }

  #[test]
  fn parsed_prices_feed_the_engine() {
    let prices = parse_price_csv(Cursor::new(CSV)).unwrap();
    let report = PortfolioEngine::default().optimize(&prices).unwrap();

    assert_eq!(report.weights.len(), 2);
    assert!((report.weights.iter().sum::<f64>() - 1.0).abs() < 1e-9);
  }
}
