//! Transactive market simulator entry point: CLI wiring and config-driven
//! scheduler construction against the synthetic federate.

use std::path::PathBuf;
use std::process;

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt as _, util::SubscriberInitExt as _};

use transactive_sim::agents::ThermostatAgent;
use transactive_sim::config::ScenarioConfig;
use transactive_sim::io::export::export_metrics;
use transactive_sim::market::DoubleAuction;
use transactive_sim::sim::{MarketKpi, MetricsLog, PeriodScheduler, SimConfig, SyntheticBus};

/// Transactive energy market simulator.
///
/// Runs a retail double auction with price-responsive thermostats against a
/// synthetic wholesale price and feeder load.
#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Load the scenario from a TOML file
    #[arg(long, conflicts_with = "preset")]
    scenario: Option<PathBuf>,

    /// Use a built-in preset (baseline, no_market, tight_supply)
    #[arg(long)]
    preset: Option<String>,

    /// Override the run length in hours
    #[arg(long)]
    hours: Option<f64>,

    /// Override the random seed of the synthetic feed
    #[arg(long)]
    seed: Option<u64>,

    /// Formulate bids but never enter them into the market
    #[arg(long)]
    no_market: bool,

    /// Write metrics files into this directory
    #[arg(long)]
    metrics_out: Option<PathBuf>,
}

fn load_scenario(cli: &Cli) -> ScenarioConfig {
    let loaded = if let Some(ref path) = cli.scenario {
        ScenarioConfig::from_toml_file(path)
    } else if let Some(ref name) = cli.preset {
        ScenarioConfig::from_preset(name)
    } else {
        Ok(ScenarioConfig::baseline())
    };
    match loaded {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("{e}");
            process::exit(1);
        }
    }
}

fn main() {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let mut scenario = load_scenario(&cli);

    if let Some(hours) = cli.hours {
        scenario.simulation.hour_stop = hours;
    }
    if let Some(seed) = cli.seed {
        scenario.simulation.seed = seed;
    }
    if cli.no_market {
        scenario.simulation.with_market = false;
    }

    let errors = scenario.validate();
    if !errors.is_empty() {
        for e in &errors {
            eprintln!("{e}");
        }
        process::exit(1);
    }
    let sim_config = match SimConfig::from_scenario(&scenario) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("{e}");
            process::exit(1);
        }
    };

    let market = &scenario.market;
    let auction = DoubleAuction::new(market.name.clone(), market);
    let agents: Vec<ThermostatAgent> = scenario
        .controllers
        .iter()
        .map(|(name, c)| ThermostatAgent::new(name.clone(), c, auction.stats()))
        .collect();
    let bus = SyntheticBus::new(
        scenario.feed.clone(),
        scenario
            .controllers
            .iter()
            .map(|(name, c)| (name.as_str(), c.rated_kw)),
        scenario.simulation.seed,
    );
    let metrics = MetricsLog::new(&market.name, &market.unit, &scenario.simulation.start_time);

    let mut scheduler = PeriodScheduler::new(sim_config, auction, agents, bus, metrics);
    let outcome = scheduler.run();
    let (_, metrics) = scheduler.into_parts();

    for m in &metrics.markets {
        println!("{m}");
    }
    println!("\n{}", MarketKpi::from_metrics(&metrics.markets));

    // partial metrics are still written when the bus failed
    if let Some(ref dir) = cli.metrics_out {
        match export_metrics(&metrics, dir, &scenario.simulation.metrics_root) {
            Ok(paths) => {
                for p in paths {
                    eprintln!("Metrics written to {}", p.display());
                }
            }
            Err(e) => {
                eprintln!("error: failed to write metrics: {e}");
                process::exit(1);
            }
        }
    }

    if let Err(e) = outcome {
        eprintln!("error: {e}");
        process::exit(1);
    }
}
