//! Worker barter example.
//!
//! A single large worker holds the whole resource. When the queue switches
//! to two different small task types, the scheduler retires it and starts
//! one worker of each small variant from the freed resource, in one trade.

use capset_exchange::prelude::*;
use rust_decimal_macros::dec;

fn main() {
    println!("╔══════════════════════════════════════════╗");
    println!("║  capset-exchange: Worker Barter Example  ║");
    println!("╚══════════════════════════════════════════╝\n");

    let x = CapabilitySet::new(vec![Capability::named("X", [("A", dec!(2))])]);
    let y = CapabilitySet::new(vec![Capability::named("Y", [("A", dec!(1))])]);
    let z = CapabilitySet::new(vec![Capability::named("Z", [("A", dec!(1))])]);

    let exchange = match CapsetExchange::new(
        vec![x.clone(), y.clone(), z.clone()],
        vec![Source::new("A", dec!(2))],
    ) {
        Ok(exchange) => exchange,
        Err(e) => {
            eprintln!("cannot build exchange: {}", e);
            return;
        }
    };

    println!("Placements:");
    for (p, placement) in exchange.market().placements().iter().enumerate() {
        println!(
            "  placement#{} = {} drawing {}",
            p,
            exchange.roster()[placement.variant],
            placement.draw
        );
    }
    println!("\nMarket ({} trades):", exchange.market().len());
    for trade in exchange.market().iter() {
        println!("  {}", trade);
    }
    println!();

    let mut scheduler = Scheduler::new(exchange, InMemoryPool::new());

    println!("━━━ Step 1: one X task ━━━\n");
    scheduler.enqueue(x.clone(), 1);
    match scheduler.reorganize() {
        Ok(report) => println!("  started {}, stopped {}", report.started, report.stopped),
        Err(e) => println!("  {}", e),
    }
    for event in scheduler.pool_mut().drain_events() {
        println!("  {:?}", event);
    }

    println!("\n━━━ Step 2: X done, one Y and one Z task ━━━\n");
    scheduler.take(&x, 1);
    scheduler.enqueue(y.clone(), 1);
    scheduler.enqueue(z.clone(), 1);
    match scheduler.reorganize() {
        Ok(report) => println!("  started {}, stopped {}", report.started, report.stopped),
        Err(e) => println!("  {}", e),
    }
    for event in scheduler.pool_mut().drain_events() {
        println!("  {:?}", event);
    }

    println!("\n━━━ Routing ━━━\n");
    for requirement in [&x, &y, &z] {
        match scheduler.route(requirement) {
            Some(worker) => println!("  {} → {}", requirement, worker),
            None => println!("  {} → (no running worker)", requirement),
        }
    }

    if let Err(e) = scheduler.shutdown() {
        eprintln!("shutdown failed: {}", e);
    }
    println!("\n  workers left after shutdown: {}", scheduler.worker_total());
}
