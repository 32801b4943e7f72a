use anyhow::{bail, Context, Result};
use open_bid::{
    distance_label, load_bids, telemetry, write_comparison_csv, BidService, Category, GeoPoint,
    MemoryStore, SpeckleClient, SpeckleConfig,
};
use std::env;
use std::path::Path;
use std::sync::Arc;

const USAGE: &str = "\
Usage: open-bid [--offline] [-v|-vv] <command>

Commands:
  models                          List model branches
  names <category>                Distinct item names (concrete|lighting)
  quantities <category>           Volumes (concrete) or piece counts (lighting)
  summary                         Totals for both categories
  compare <category> <bids.json>  Price comparison as CSV (--chart for JSON chart data)
  push <bids.json>                Write every contractor's prices back to the model
  distance <lat> <lon>            Distance to the project site

Environment:
  SPECKLE_API, SPECKLE_STREAM_ID  Required unless --offline
  SPECKLE_HOST                    Defaults to https://app.speckle.systems
  RUST_LOG                        Log filter override";

struct Options {
    offline: bool,
    verbosity: u8,
    chart: bool,
    args: Vec<String>,
}

fn parse_options(raw: impl Iterator<Item = String>) -> Options {
    let mut options = Options {
        offline: false,
        verbosity: 0,
        chart: false,
        args: Vec::new(),
    };

    for arg in raw {
        match arg.as_str() {
            "--offline" => options.offline = true,
            "--chart" => options.chart = true,
            "-v" => options.verbosity += 1,
            "-vv" => options.verbosity += 2,
            _ => options.args.push(arg),
        }
    }
    options
}

fn main() -> Result<()> {
    let options = parse_options(env::args().skip(1));
    telemetry::init_logging(options.verbosity)?;

    let args: Vec<&str> = options.args.iter().map(String::as_str).collect();

    match args.as_slice() {
        ["distance", lat, lon] => run_distance(lat, lon),
        ["models"] => run_models(&connect(options.offline)?),
        ["names", category] => run_names(&connect(options.offline)?, category.parse()?),
        ["quantities", category] => run_quantities(&connect(options.offline)?, category.parse()?),
        ["summary"] => run_summary(&connect(options.offline)?),
        ["compare", category, bids] => {
            run_compare(&connect(options.offline)?, category.parse()?, Path::new(bids), options.chart)
        }
        ["push", bids] => run_push(&connect(options.offline)?, Path::new(bids)),
        _ => {
            eprintln!("{}", USAGE);
            std::process::exit(2);
        }
    }
}

fn connect(offline: bool) -> Result<BidService> {
    if offline {
        let store = MemoryStore::demo().context("Failed to build demo model store")?;
        return Ok(BidService::new(Arc::new(store)));
    }

    let config = SpeckleConfig::from_env()?;
    tracing::debug!(?config, "connecting to model store");
    Ok(BidService::new(Arc::new(SpeckleClient::new(config))))
}

fn run_models(service: &BidService) -> Result<()> {
    for name in service.list_models()? {
        println!("{}", name);
    }
    Ok(())
}

fn run_names(service: &BidService, category: Category) -> Result<()> {
    for name in service.names(category)? {
        println!("{}", name);
    }
    Ok(())
}

fn run_quantities(service: &BidService, category: Category) -> Result<()> {
    let unit = category.unit();
    for (name, quantity) in service.quantities(category)? {
        println!("{}\t{:.2} {}", name, quantity, unit);
    }
    Ok(())
}

fn run_summary(service: &BidService) -> Result<()> {
    for summary in service.quantity_summary()? {
        println!("{}: {}", summary.category.label(), summary.total_label);
        for line in &summary.lines {
            println!("  {:<30} {}", line.name, line.label);
        }
    }
    Ok(())
}

fn run_compare(service: &BidService, category: Category, bids_path: &Path, chart: bool) -> Result<()> {
    let bids = load_bids(bids_path)?;

    if chart {
        let chart = service.comparison_chart(&bids, category)?;
        println!("{}", serde_json::to_string_pretty(&chart)?);
        return Ok(());
    }

    let rows = service.compare(&bids, category)?;
    write_comparison_csv(&rows, std::io::stdout().lock()).context("Failed to write CSV")?;
    Ok(())
}

fn run_push(service: &BidService, bids_path: &Path) -> Result<()> {
    let bids = load_bids(bids_path)?;
    if bids.is_empty() {
        bail!("{} contains no contractor bids", bids_path.display());
    }

    println!("💶 Pushing prices from {} contractors...", bids.len());
    for receipt in service.push_all(&bids)? {
        println!(
            "✓ {}: {} items priced, commit {} (object {})",
            receipt.branch_name, receipt.items_priced, receipt.commit_id, receipt.object_id
        );
    }
    Ok(())
}

fn run_distance(lat: &str, lon: &str) -> Result<()> {
    let lat: f64 = lat.parse().with_context(|| format!("Invalid latitude '{}'", lat))?;
    let lon: f64 = lon.parse().with_context(|| format!("Invalid longitude '{}'", lon))?;
    if let Some(label) = distance_label(Some(&GeoPoint::new(lat, lon))) {
        println!("{}", label);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(args: &[&str]) -> impl Iterator<Item = String> {
        args.iter().map(|a| a.to_string()).collect::<Vec<_>>().into_iter()
    }

    #[test]
    fn test_parse_options() {
        let options = parse_options(strings(&["--offline", "-v", "compare", "concrete", "bids.json", "--chart"]));
        assert!(options.offline);
        assert!(options.chart);
        assert_eq!(options.verbosity, 1);
        assert_eq!(options.args, vec!["compare", "concrete", "bids.json"]);
    }

    #[test]
    fn test_parse_defaults() {
        let options = parse_options(strings(&["models"]));
        assert!(!options.offline);
        assert_eq!(options.verbosity, 0);
        assert_eq!(options.args, vec!["models"]);
    }
}
