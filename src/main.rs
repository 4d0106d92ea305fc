//! capset-exchange CLI
//!
//! Replay queue snapshots through the allocation engine from the command line.
//!
//! # Usage
//!
//! ```bash
//! # Print target worker counts for every queue snapshot in a scenario
//! capset-exchange plan --input scenario.json
//!
//! # Output as JSON
//! capset-exchange plan --input scenario.json --format json
//!
//! # Inspect the trade market of a roster
//! capset-exchange market --input scenario.json
//!
//! # Generate a random scenario for testing
//! capset-exchange generate --variants 5 --ticks 10
//! ```

use capset_exchange::core::capability::{CapabilitySet, CapsetCounts};
use capset_exchange::core::resource::{ResourceKind, Source};
use capset_exchange::exchange::config::ExchangeConfig;
use capset_exchange::exchange::engine::CapsetExchange;
use capset_exchange::market::vector::TradeKey;
use capset_exchange::simulation::workload::{generate_workload, WorkloadConfig};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rust_decimal::Decimal;
use std::fs;
use std::process;

fn print_usage() {
    eprintln!(
        r#"capset-exchange — resource-bartering allocation for task-queue worker pools

USAGE:
    capset-exchange <COMMAND> [OPTIONS]

COMMANDS:
    plan        Replay queue snapshots and print target worker counts per tick
    market      Print every trade of the market built for a scenario
    generate    Generate a random scenario (for testing)
    help        Show this message

OPTIONS (plan, market):
    --input <FILE>      Path to JSON scenario file
    --format <FORMAT>   Output format: text (default) or json

OPTIONS (generate):
    --variants <N>      Number of worker variants (default: 4)
    --kinds <LIST>      Comma-separated resource kinds (default: cpu,mem)
    --ticks <N>         Number of queue snapshots (default: 5)
    --seed <N>          Random seed (default: random)
    --output <FILE>     Write to file instead of stdout

EXAMPLES:
    capset-exchange plan --input scenario.json
    capset-exchange plan --input scenario.json --format json
    capset-exchange market --input scenario.json
    capset-exchange generate --variants 6 --ticks 20 --seed 7
    capset-exchange generate --kinds cpu,mem,gpu --output scenario.json

Set RUST_LOG=debug (or trace) to follow market construction and every trade."#
    );
}

/// JSON schema for a scenario file.
#[derive(serde::Serialize, serde::Deserialize)]
struct ScenarioFile {
    variants: Vec<CapabilitySet>,
    sources: Vec<Source>,
    #[serde(default)]
    config: ExchangeConfig,
    #[serde(default)]
    ticks: Vec<Vec<QueueEntry>>,
}

#[derive(serde::Serialize, serde::Deserialize)]
struct QueueEntry {
    requirement: CapabilitySet,
    count: u64,
}

/// JSON output schema for one plan tick.
#[derive(serde::Serialize)]
struct TickOutput {
    tick: usize,
    queued: u64,
    steps: Option<usize>,
    unmet: Option<u64>,
    running: Vec<RunningOutput>,
    error: Option<String>,
}

#[derive(serde::Serialize)]
struct RunningOutput {
    variant: String,
    count: u64,
}

#[derive(serde::Serialize)]
struct TradeOutput {
    sources: Vec<(String, i64)>,
    placements: Vec<(String, i64)>,
}

fn load_scenario(path: &str) -> ScenarioFile {
    let content = fs::read_to_string(path).unwrap_or_else(|e| {
        eprintln!("Error reading file '{}': {}", path, e);
        process::exit(1);
    });

    serde_json::from_str(&content).unwrap_or_else(|e| {
        eprintln!("Error parsing JSON: {}", e);
        eprintln!("Expected format:");
        eprintln!(r#"{{
  "variants": [ [ {{ "name": "small", "resources": {{ "cpu": "1" }} }} ] ],
  "sources": [ {{ "kind": "cpu", "capacity": "4" }} ],
  "config": {{ "max_barter_size": 3 }},
  "ticks": [ [ {{ "requirement": [ {{ "resources": {{ "cpu": "1" }} }} ], "count": 5 }} ] ]
}}"#);
        process::exit(1);
    })
}

fn build_exchange(scenario: &ScenarioFile) -> CapsetExchange {
    CapsetExchange::with_config(
        scenario.variants.clone(),
        scenario.sources.clone(),
        scenario.config.clone(),
    )
    .unwrap_or_else(|e| {
        eprintln!("Error building exchange: {}", e);
        process::exit(1);
    })
}

fn queue_of(entries: &[QueueEntry]) -> CapsetCounts {
    let mut queue = CapsetCounts::new();
    for entry in entries {
        *queue.entry(entry.requirement.clone()).or_insert(0) += entry.count;
    }
    queue
}

/// Parse `--input` and `--format`, shared by `plan` and `market`.
fn parse_input_args(args: &[String]) -> (String, String) {
    let mut input_path = None;
    let mut format = "text".to_string();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--input" => {
                i += 1;
                input_path = Some(args.get(i).cloned().unwrap_or_else(|| {
                    eprintln!("--input requires a file path");
                    process::exit(1);
                }));
            }
            "--format" => {
                i += 1;
                format = args.get(i).cloned().unwrap_or_else(|| {
                    eprintln!("--format requires 'text' or 'json'");
                    process::exit(1);
                });
            }
            _ => {
                eprintln!("Unknown option: {}", args[i]);
                process::exit(1);
            }
        }
        i += 1;
    }

    let path = input_path.unwrap_or_else(|| {
        eprintln!("Error: --input <FILE> is required");
        process::exit(1);
    });
    (path, format)
}

fn cmd_plan(args: &[String]) {
    let (path, format) = parse_input_args(args);
    let scenario = load_scenario(&path);
    let mut exchange = build_exchange(&scenario);

    let mut ticks = Vec::new();
    for (tick, entries) in scenario.ticks.iter().enumerate() {
        let queue = queue_of(entries);
        let queued = queue.values().sum();
        let output = match exchange.rebalance_detailed(&queue) {
            Ok(outcome) => TickOutput {
                tick,
                queued,
                steps: Some(outcome.steps),
                unmet: Some(outcome.unmet_after),
                running: running_output(&outcome.running),
                error: None,
            },
            Err(e) => TickOutput {
                tick,
                queued,
                steps: None,
                unmet: None,
                running: running_output(&exchange.actors_running()),
                error: Some(e.to_string()),
            },
        };
        ticks.push(output);
    }

    if format == "json" {
        match serde_json::to_string_pretty(&ticks) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Error serializing output: {}", e);
                process::exit(1);
            }
        }
        return;
    }

    println!("Roster:");
    for (v, variant) in exchange.roster().iter().enumerate() {
        println!("  [{}] {}", v, variant);
    }
    println!("Sources:");
    for (i, source) in exchange.sources().iter().enumerate() {
        println!("  [{}] {}", i, source);
    }
    println!("Market: {} trades\n", exchange.market().len());

    for tick in &ticks {
        match &tick.error {
            None => println!(
                "Tick {}: {} queued, {} unmet after {} steps",
                tick.tick,
                tick.queued,
                tick.unmet.unwrap_or(0),
                tick.steps.unwrap_or(0)
            ),
            Some(e) => println!("Tick {}: {} queued, {}", tick.tick, tick.queued, e),
        }
        for running in tick.running.iter().filter(|r| r.count > 0) {
            println!("    {:>4} × {}", running.count, running.variant);
        }
    }

    println!();
    for kind in exchange.granules().kinds() {
        println!("Utilization {}: {:.1}%", kind, exchange.utilization(kind) * 100.0);
    }
}

fn running_output(running: &CapsetCounts) -> Vec<RunningOutput> {
    running
        .iter()
        .map(|(variant, count)| RunningOutput {
            variant: variant.to_string(),
            count: *count,
        })
        .collect()
}

fn cmd_market(args: &[String]) {
    let (path, format) = parse_input_args(args);
    let scenario = load_scenario(&path);
    let exchange = build_exchange(&scenario);

    let label = |key: &TradeKey| match key {
        TradeKey::Source(i) => format!("{}#{}", exchange.sources()[*i].kind, i),
        TradeKey::Placement(p) => {
            let placement = &exchange.market().placements()[*p];
            format!("{}@{}", exchange.roster()[placement.variant], placement.draw)
        }
    };

    if format == "json" {
        let trades: Vec<TradeOutput> = exchange
            .market()
            .iter()
            .map(|trade| TradeOutput {
                sources: trade
                    .iter()
                    .filter(|(k, _)| matches!(k, TradeKey::Source(_)))
                    .map(|(k, v)| (label(k), v))
                    .collect(),
                placements: trade
                    .iter()
                    .filter(|(k, _)| matches!(k, TradeKey::Placement(_)))
                    .map(|(k, v)| (label(k), v))
                    .collect(),
            })
            .collect();
        match serde_json::to_string_pretty(&trades) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Error serializing output: {}", e);
                process::exit(1);
            }
        }
        return;
    }

    println!("Granules:");
    for kind in exchange.granules().kinds() {
        if let Some(granule) = exchange.granules().granule(kind) {
            println!("  {} = {}", kind, granule);
        }
    }
    println!("\nMarket ({} trades):", exchange.market().len());
    for (i, trade) in exchange.market().iter().enumerate() {
        let parts: Vec<String> = trade
            .iter()
            .map(|(k, v)| format!("{:+} {}", v, label(k)))
            .collect();
        println!("  {:>4}: {}", i, parts.join(", "));
    }
}

fn cmd_generate(args: &[String]) {
    let mut config = WorkloadConfig::default();
    let mut ticks = 5usize;
    let mut seed: Option<u64> = None;
    let mut output_path: Option<String> = None;
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--variants" => {
                i += 1;
                config.variant_count = args
                    .get(i)
                    .and_then(|s| s.parse().ok())
                    .unwrap_or_else(|| {
                        eprintln!("--variants requires a number");
                        process::exit(1);
                    });
            }
            "--kinds" => {
                i += 1;
                let kinds = args.get(i).cloned().unwrap_or_else(|| {
                    eprintln!("--kinds requires a comma-separated list");
                    process::exit(1);
                });
                config.kinds = kinds.split(',').map(|s| ResourceKind::new(s.trim())).collect();
            }
            "--ticks" => {
                i += 1;
                ticks = args
                    .get(i)
                    .and_then(|s| s.parse().ok())
                    .unwrap_or_else(|| {
                        eprintln!("--ticks requires a number");
                        process::exit(1);
                    });
            }
            "--seed" => {
                i += 1;
                seed = Some(args.get(i).and_then(|s| s.parse().ok()).unwrap_or_else(|| {
                    eprintln!("--seed requires a number");
                    process::exit(1);
                }));
            }
            "--output" => {
                i += 1;
                output_path = Some(args.get(i).cloned().unwrap_or_else(|| {
                    eprintln!("--output requires a file path");
                    process::exit(1);
                }));
            }
            _ => {
                eprintln!("Unknown option: {}", args[i]);
                process::exit(1);
            }
        }
        i += 1;
    }

    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let workload = generate_workload(&config, ticks, &mut rng);

    let scenario = ScenarioFile {
        variants: workload.roster,
        sources: workload.sources,
        config: ExchangeConfig::default(),
        ticks: workload
            .snapshots
            .into_iter()
            .map(|snapshot| {
                snapshot
                    .into_iter()
                    .map(|(requirement, count)| QueueEntry { requirement, count })
                    .collect()
            })
            .collect(),
    };

    let json = serde_json::to_string_pretty(&scenario).unwrap_or_else(|e| {
        eprintln!("Error serializing scenario: {}", e);
        process::exit(1);
    });

    if let Some(path) = output_path {
        fs::write(&path, &json).unwrap_or_else(|e| {
            eprintln!("Error writing to '{}': {}", path, e);
            process::exit(1);
        });
        let capacity: Decimal = scenario.sources.iter().map(|s| s.capacity).sum();
        eprintln!(
            "Generated {} variants, {} sources (total capacity {}), {} ticks → {}",
            scenario.variants.len(),
            scenario.sources.len(),
            capacity,
            scenario.ticks.len(),
            path
        );
    } else {
        println!("{}", json);
    }
}

fn main() {
    env_logger::init();
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        print_usage();
        process::exit(1);
    }

    let command = args[1].as_str();
    let rest = &args[2..];

    match command {
        "plan" => cmd_plan(rest),
        "market" => cmd_market(rest),
        "generate" => cmd_generate(rest),
        "help" | "--help" | "-h" => print_usage(),
        _ => {
            eprintln!("Unknown command: {}", command);
            print_usage();
            process::exit(1);
        }
    }
}
