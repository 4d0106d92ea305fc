//! Basic rebalancing example.
//!
//! Demonstrates how the exchange grows and shrinks a worker pool as the
//! queue changes, and how supply moves from one worker variant to another.

use capset_exchange::prelude::*;
use rust_decimal_macros::dec;

fn print_running(exchange: &CapsetExchange) {
    for (variant, count) in exchange.actors_running() {
        println!("  {:<28} {:>3} running", variant.to_string(), count);
    }
    let cpu = ResourceKind::new("cpu");
    println!("  cpu utilization: {:.0}%\n", exchange.utilization(&cpu) * 100.0);
}

fn main() {
    println!("╔═══════════════════════════════════════════════╗");
    println!("║  capset-exchange: Basic Rebalancing Example   ║");
    println!("╚═══════════════════════════════════════════════╝\n");

    let small = CapabilitySet::new(vec![Capability::named("small", [("cpu", dec!(0.5))])]);
    let large = CapabilitySet::new(vec![Capability::named("large", [("cpu", dec!(2))])]);

    let mut exchange = match CapsetExchange::new(
        vec![small.clone(), large.clone()],
        vec![Source::new("cpu", dec!(4))],
    ) {
        Ok(exchange) => exchange,
        Err(e) => {
            eprintln!("cannot build exchange: {}", e);
            return;
        }
    };
    println!("Market: {} trades\n", exchange.market().len());

    // --- Scenario 1: A burst of small tasks ---
    println!("━━━ Scenario 1: 20 small tasks queued ━━━\n");

    let mut queue = CapsetCounts::new();
    queue.insert(small.clone(), 20);
    if let Ok(outcome) = exchange.rebalance_detailed(&queue) {
        println!("  {} trades applied, {} tasks still waiting", outcome.steps, outcome.unmet_after);
    }
    print_running(&exchange);

    // --- Scenario 2: Demand moves to large tasks ---
    println!("━━━ Scenario 2: small queue drained, 2 large tasks queued ━━━\n");

    let mut queue = CapsetCounts::new();
    queue.insert(large.clone(), 2);
    if let Ok(outcome) = exchange.rebalance_detailed(&queue) {
        println!("  {} trades applied, {} tasks still waiting", outcome.steps, outcome.unmet_after);
    }
    print_running(&exchange);

    // --- Scenario 3: Queue empty ---
    println!("━━━ Scenario 3: everything done ━━━\n");

    if let Ok(outcome) = exchange.rebalance_detailed(&CapsetCounts::new()) {
        println!("  {} trades applied", outcome.steps);
    }
    print_running(&exchange);
    println!("  idle: {}", exchange.is_idle());
}
