//! CSV and JSON export of recorded run metrics.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde_json::{Map, Value, json};
use tracing::info;

use crate::error::SimError;
use crate::sim::types::{AgentMetric, MarketMetric, MetricsLog};

/// Column header for per-period market CSV export.
const MARKET_HEADER: &str = "time,clearing_type,clearing_price,clearing_quantity,\
                             marginal_quantity,marginal_fraction,buyer_count,seller_count,\
                             lmp,refload_kw,consumer_surplus,average_consumer_surplus,\
                             supplier_surplus,unresponsive_supplier_surplus";

/// Column header for per-bid agent CSV export.
const AGENT_HEADER: &str = "time,agent,bid_price,bid_quantity";

/// Legend of the clearing type codes in the auction metrics file.
const CLEARING_TYPE_UNITS: &str = "[0..5]=[Null,Fail,Price,Exact,Seller,Buyer]";

/// Writes market records as CSV to any writer.
///
/// One row per period, in record order. Identical input produces identical
/// output.
///
/// # Errors
///
/// Returns a `csv::Error` if writing fails.
pub fn write_market_csv(metrics: &[MarketMetric], writer: impl Write) -> Result<(), csv::Error> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);
    wtr.write_record(MARKET_HEADER.split(',').map(str::trim))?;

    for m in metrics {
        wtr.write_record(&[
            m.time.to_string(),
            m.kind.code().to_string(),
            format!("{:.6}", m.price),
            format!("{:.4}", m.quantity),
            format!("{:.4}", m.marginal_quantity),
            format!("{:.4}", m.marginal_fraction),
            m.buyer_count.to_string(),
            m.seller_count.to_string(),
            format!("{:.6}", m.lmp),
            format!("{:.4}", m.refload),
            format!("{:.6}", m.surplus.consumer),
            format!("{:.6}", m.surplus.average_consumer),
            format!("{:.6}", m.surplus.supplier),
            format!("{:.6}", m.surplus.unresponsive_supplier),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}

/// Writes agent bid records as CSV to any writer.
///
/// # Errors
///
/// Returns a `csv::Error` if writing fails.
pub fn write_agent_csv(metrics: &[AgentMetric], writer: impl Write) -> Result<(), csv::Error> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);
    wtr.write_record(AGENT_HEADER.split(','))?;
    for m in metrics {
        wtr.write_record(&[
            m.time.to_string(),
            m.agent.clone(),
            format!("{:.6}", m.bid_price),
            format!("{:.4}", m.bid_quantity),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

fn column(units: &str, index: usize) -> Value {
    json!({ "units": units, "index": index })
}

/// Builds the auction metrics document.
///
/// `Metadata` describes the five value columns, `StartTime` carries the run
/// start, and every clearing time maps the market name to
/// `[price, type, consumer, average consumer, supplier]`.
pub fn auction_metrics_json(log: &MetricsLog) -> Value {
    let mut meta = Map::new();
    meta.insert("clearing_price".into(), column("USD", 0));
    meta.insert("clearing_type".into(), column(CLEARING_TYPE_UNITS, 1));
    meta.insert("consumer_surplus".into(), column("USD", 2));
    meta.insert("average_consumer_surplus".into(), column("USD", 3));
    meta.insert("supplier_surplus".into(), column("USD", 4));

    let mut doc = Map::new();
    doc.insert("Metadata".into(), Value::Object(meta));
    doc.insert("StartTime".into(), Value::String(log.start_time.clone()));
    for m in &log.markets {
        let mut row = Map::new();
        row.insert(
            log.market_name.clone(),
            json!([
                m.price,
                m.kind.code(),
                m.surplus.consumer,
                m.surplus.average_consumer,
                m.surplus.supplier
            ]),
        );
        doc.insert(m.time.to_string(), Value::Object(row));
    }
    Value::Object(doc)
}

/// Builds the controller metrics document.
///
/// Every clearing time maps each bidding agent's name to
/// `[bid price, bid quantity]`.
pub fn controller_metrics_json(log: &MetricsLog) -> Value {
    let mut meta = Map::new();
    meta.insert("bid_price".into(), column("USD", 0));
    meta.insert("bid_quantity".into(), column(&log.unit, 1));

    let mut doc = Map::new();
    doc.insert("Metadata".into(), Value::Object(meta));
    doc.insert("StartTime".into(), Value::String(log.start_time.clone()));
    for m in &log.agents {
        let entry = doc
            .entry(m.time.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(row) = entry {
            row.insert(m.agent.clone(), json!([m.bid_price, m.bid_quantity]));
        }
    }
    Value::Object(doc)
}

fn write_json(value: &Value, path: &Path) -> Result<(), SimError> {
    let buf = io::BufWriter::new(File::create(path)?);
    serde_json::to_writer(buf, value)?;
    Ok(())
}

/// Writes every metrics file for a run into `dir`.
///
/// Files written: `auction_<root>_metrics.json`,
/// `controller_<root>_metrics.json`, `market_<root>.csv` and
/// `agents_<root>.csv`. The directory is created if missing.
///
/// # Returns
///
/// The paths written, in the order above.
///
/// # Errors
///
/// Returns a `SimError` if the directory or any file cannot be written.
pub fn export_metrics(log: &MetricsLog, dir: &Path, root: &str) -> Result<Vec<PathBuf>, SimError> {
    fs::create_dir_all(dir)?;

    let auction = dir.join(format!("auction_{root}_metrics.json"));
    write_json(&auction_metrics_json(log), &auction)?;

    let controller = dir.join(format!("controller_{root}_metrics.json"));
    write_json(&controller_metrics_json(log), &controller)?;

    let market_csv = dir.join(format!("market_{root}.csv"));
    write_market_csv(&log.markets, io::BufWriter::new(File::create(&market_csv)?))?;

    let agent_csv = dir.join(format!("agents_{root}.csv"));
    write_agent_csv(&log.agents, io::BufWriter::new(File::create(&agent_csv)?))?;

    info!(
        dir = %dir.display(),
        periods = log.markets.len(),
        bids = log.agents.len(),
        "metrics written"
    );
    Ok(vec![auction, controller, market_csv, agent_csv])
}
