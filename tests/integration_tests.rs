use approx::assert_relative_eq;
use capset_exchange::core::capability::{Capability, CapabilitySet, CapsetCounts};
use capset_exchange::core::error::ExchangeError;
use capset_exchange::core::resource::{ResourceKind, Source};
use capset_exchange::exchange::config::ExchangeConfig;
use capset_exchange::exchange::engine::CapsetExchange;
use capset_exchange::market::vector::{Trade, TradeKey};
use capset_exchange::orchestration::pool::{InMemoryPool, PoolEvent};
use capset_exchange::orchestration::scheduler::Scheduler;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn capset(name: &str, resources: &[(&str, Decimal)]) -> CapabilitySet {
    CapabilitySet::new(vec![Capability::named(name, resources.iter().copied())])
}

fn queue(entries: &[(&CapabilitySet, u64)]) -> CapsetCounts {
    entries.iter().map(|(c, n)| ((*c).clone(), *n)).collect()
}

/// The trade key of a variant that has exactly one placement.
fn sole_placement(exchange: &CapsetExchange, capset: &CapabilitySet) -> TradeKey {
    let variant = exchange.position(capset).unwrap();
    let placements: Vec<usize> = exchange.market().placements_of(variant).collect();
    assert_eq!(placements.len(), 1);
    TradeKey::Placement(placements[0])
}

/// Every source's idle supply plus what its running workers hold equals its capacity.
fn assert_packed(exchange: &CapsetExchange) {
    for ((idle, held), capacity) in exchange
        .idle_sources()
        .iter()
        .zip(exchange.held())
        .zip(exchange.capacities())
    {
        assert!(*idle >= 0);
        assert_eq!(idle + held, capacity);
    }
}

/// A roster variant that can never start is rejected up front.
#[test]
fn unlaunchable_variant_is_rejected() {
    let cap1 = capset("cap1", &[("A", dec!(1))]);
    let cap2 = capset("cap2", &[("A", dec!(2))]);

    let err = CapsetExchange::new(vec![cap1, cap2.clone()], vec![Source::new("A", dec!(1))]).unwrap_err();
    assert_eq!(err, ExchangeError::NotEnoughResources { capset: cap2 });
}

/// Draining a queue one task at a time gives every granule back.
#[test]
fn draining_the_queue_restores_all_supply() {
    let cap1 = capset("cap1", &[("A", dec!(1))]);
    let mut exchange = CapsetExchange::new(vec![cap1.clone()], vec![Source::new("A", dec!(1))]).unwrap();

    for remaining in (0..=6).rev() {
        let running = exchange.rebalance(&queue(&[(&cap1, remaining)])).unwrap();
        let expected = if remaining > 0 { 1 } else { 0 };
        assert_eq!(running[&cap1], expected, "with {} queued", remaining);
    }

    assert_eq!(exchange.running_count(&cap1), 0);
    assert_eq!(exchange.idle_sources(), &[1]);
    assert!(exchange.is_idle());
}

/// An engine with nothing to allocate is idle and stays that way.
#[test]
fn empty_engine_is_idle() {
    let mut exchange = CapsetExchange::new(Vec::new(), Vec::new()).unwrap();
    assert!(exchange.is_idle());
    assert!(exchange.market().is_empty());

    let outcome = exchange.rebalance_detailed(&CapsetCounts::new()).unwrap();
    assert!(outcome.running.is_empty());
    assert_eq!(outcome.steps, 0);
    assert!(exchange.is_idle());
}

/// Retiring one large worker funds two small ones.
#[test]
fn large_worker_is_bartered_for_two_small_ones() {
    let x = capset("X", &[("A", dec!(2))]);
    let y = capset("Y", &[("A", dec!(1))]);
    let z = capset("Z", &[("A", dec!(1))]);
    let mut exchange = CapsetExchange::new(
        vec![x.clone(), y.clone(), z.clone()],
        vec![Source::new("A", dec!(2))],
    )
    .unwrap();

    let running = exchange.rebalance(&queue(&[(&x, 1)])).unwrap();
    assert_eq!(running[&x], 1);
    assert_eq!(exchange.idle_sources(), &[0]);

    let outcome = exchange.rebalance_detailed(&queue(&[(&y, 1), (&z, 1)])).unwrap();
    assert_eq!(outcome.running[&x], 0);
    assert_eq!(outcome.running[&y], 1);
    assert_eq!(outcome.running[&z], 1);
    assert_eq!(outcome.steps, 1);
    assert_eq!(outcome.unmet_after, 0);
    assert_eq!(exchange.idle_sources(), &[0]);

    let barter: Trade = [
        (sole_placement(&exchange, &x), -1),
        (sole_placement(&exchange, &y), 1),
        (sole_placement(&exchange, &z), 1),
    ]
    .into_iter()
    .collect();
    assert!(exchange.market().contains(&barter));
    assert!(exchange.market().contains(&-&barter));
}

/// When demand moves from small to large tasks, small workers are retired
/// and their supply funds a large one.
#[test]
fn shifting_demand_moves_supply_between_variants() {
    let small = capset("small", &[("cpu", dec!(1))]);
    let large = capset("large", &[("cpu", dec!(2))]);
    let mut exchange = CapsetExchange::new(
        vec![small.clone(), large.clone()],
        vec![Source::new("cpu", dec!(2))],
    )
    .unwrap();

    let running = exchange.rebalance(&queue(&[(&small, 5)])).unwrap();
    assert_eq!(running[&small], 2);
    assert_eq!(running[&large], 0);

    let outcome = exchange.rebalance_detailed(&queue(&[(&large, 1)])).unwrap();
    assert_eq!(outcome.running[&small], 0);
    assert_eq!(outcome.running[&large], 1);
    assert_eq!(outcome.unmet_before, 1);
    assert_eq!(outcome.unmet_after, 0);
    assert_eq!(outcome.slack_after, 0);
}

#[test]
fn multi_kind_workers_share_sources() {
    let cpu_worker = capset("cpu", &[("cpu", dec!(1))]);
    let gpu_worker = capset("gpu", &[("cpu", dec!(2)), ("gpu", dec!(1))]);
    let mut exchange = CapsetExchange::new(
        vec![cpu_worker.clone(), gpu_worker.clone()],
        vec![Source::new("cpu", dec!(4)), Source::new("gpu", dec!(1))],
    )
    .unwrap();

    let outcome = exchange.rebalance_detailed(&queue(&[(&gpu_worker, 2)])).unwrap();
    assert_eq!(outcome.running[&gpu_worker], 1);
    assert_eq!(outcome.running[&cpu_worker], 0);
    assert_eq!(outcome.unmet_after, 1);
    assert_eq!(exchange.idle_sources(), &[2, 0]);

    // the running gpu worker picks up one cpu task, two cpu workers take the rest
    let outcome = exchange
        .rebalance_detailed(&queue(&[(&gpu_worker, 1), (&cpu_worker, 2)]))
        .unwrap();
    assert_eq!(outcome.running[&gpu_worker], 1);
    assert_eq!(outcome.running[&cpu_worker], 2);
    assert_eq!(outcome.unmet_after, 0);
    assert_eq!(exchange.idle_sources(), &[0, 0]);
}

/// A worker's demand for one kind is never split across sources.
#[test]
fn demand_is_drawn_from_a_single_source() {
    let worker = capset("w", &[("cpu", dec!(2))]);
    let mut exchange = CapsetExchange::new(
        vec![worker.clone()],
        vec![Source::new("cpu", dec!(3)), Source::new("cpu", dec!(3))],
    )
    .unwrap();

    let running = exchange.rebalance(&queue(&[(&worker, 5)])).unwrap();
    assert_eq!(running[&worker], 2);
    assert_eq!(exchange.idle_sources(), &[1, 1]);

    let too_big = capset("big", &[("cpu", dec!(4))]);
    let err = CapsetExchange::new(
        vec![too_big],
        vec![Source::new("cpu", dec!(3)), Source::new("cpu", dec!(3))],
    )
    .unwrap_err();
    assert!(matches!(err, ExchangeError::NotEnoughResources { .. }));
}

/// Workers stay packed into the sources they were placed on while demand
/// moves between sizes, and every stop hands supply back to its own source.
#[test]
fn placements_stay_packed_across_two_sources() {
    let v1 = capset("v1", &[("a", dec!(1))]);
    let v2 = capset("v2", &[("a", dec!(2))]);
    let v3 = capset("v3", &[("a", dec!(3))]);
    let mut exchange = CapsetExchange::new(
        vec![v1.clone(), v2.clone(), v3.clone()],
        vec![Source::new("a", dec!(3)), Source::new("a", dec!(3))],
    )
    .unwrap();

    let snapshots = [[3, 0, 1], [0, 1, 0], [3, 3, 0], [2, 3, 0], [0, 3, 0]];
    for counts in snapshots {
        let snapshot = queue(&[(&v1, counts[0]), (&v2, counts[1]), (&v3, counts[2])]);
        exchange.rebalance(&snapshot).unwrap();
        assert_packed(&exchange);
        // a capacity-3 source fits one a:2 worker
        assert!(exchange.running_count(&v2) <= 2);
        for (placement, count) in exchange.placements_running(&v2) {
            assert_eq!(count, 1, "two v2 workers on {}", placement.draw);
        }
    }

    exchange.rebalance(&CapsetCounts::new()).unwrap();
    assert!(exchange.is_idle());
    assert_eq!(exchange.idle_sources().to_vec(), exchange.capacities());
}

/// A worker serving its own task is not retired to start a lighter one for
/// another task, even though that would free supply.
#[test]
fn served_task_keeps_its_worker() {
    let x = capset("X", &[("a", dec!(2))]);
    let y = capset("Y", &[("a", dec!(1))]);
    let mut exchange =
        CapsetExchange::new(vec![x.clone(), y.clone()], vec![Source::new("a", dec!(2))]).unwrap();

    exchange.rebalance(&queue(&[(&x, 1)])).unwrap();
    assert_eq!(exchange.running_count(&x), 1);
    assert_eq!(exchange.idle_sources(), &[0]);

    let outcome = exchange.rebalance_detailed(&queue(&[(&x, 1), (&y, 1)])).unwrap();
    assert_eq!(outcome.running[&x], 1);
    assert_eq!(outcome.running[&y], 0);
    assert_eq!(outcome.unmet_before, 1);
    assert_eq!(outcome.unmet_after, 1);
    assert_eq!(outcome.steps, 0);

    // once the X task is done the supply goes to Y
    let running = exchange.rebalance(&queue(&[(&y, 1)])).unwrap();
    assert_eq!(running[&x], 0);
    assert_eq!(running[&y], 1);
}

#[test]
fn fractional_quantities_use_granules() {
    let worker = capset("w", &[("mem", dec!(0.5))]);
    let mut exchange = CapsetExchange::new(vec![worker.clone()], vec![Source::new("mem", dec!(1.5))]).unwrap();
    let mem = ResourceKind::new("mem");

    assert_eq!(exchange.granules().granule(&mem), Some(dec!(0.5)));
    assert_eq!(exchange.capacities(), vec![3]);

    exchange.rebalance(&queue(&[(&worker, 2)])).unwrap();
    assert_eq!(exchange.running_count(&worker), 2);
    assert_eq!(exchange.idle_amount(0), Some(dec!(0.5)));
    assert_relative_eq!(exchange.utilization(&mem), 2.0 / 3.0, epsilon = 1e-12);
}

#[test]
fn tasks_nobody_can_serve_are_a_dead_end() {
    let worker = capset("w", &[("cpu", dec!(1))]);
    let gpu_task = capset("task", &[("gpu", dec!(1))]);
    let mut exchange = CapsetExchange::new(vec![worker.clone()], vec![Source::new("cpu", dec!(2))]).unwrap();

    let err = exchange.rebalance(&queue(&[(&gpu_task, 3)])).unwrap_err();
    assert_eq!(err, ExchangeError::NotEnoughResourcesToContinue { queued: 3 });

    // servable work alongside keeps the engine going
    let running = exchange
        .rebalance(&queue(&[(&gpu_task, 3), (&worker, 1)]))
        .unwrap();
    assert_eq!(running[&worker], 1);
}

#[test]
fn second_rebalance_with_same_queue_is_a_noop() {
    let small = capset("small", &[("cpu", dec!(1))]);
    let large = capset("large", &[("cpu", dec!(3)), ("mem", dec!(2))]);
    let mut exchange = CapsetExchange::new(
        vec![small.clone(), large.clone()],
        vec![Source::new("cpu", dec!(6)), Source::new("mem", dec!(4))],
    )
    .unwrap();
    let snapshot = queue(&[(&small, 4), (&large, 2)]);

    let first = exchange.rebalance_detailed(&snapshot).unwrap();
    let second = exchange.rebalance_detailed(&snapshot).unwrap();
    assert_eq!(second.steps, 0);
    assert_eq!(first.running, second.running);
}

#[test]
fn barter_size_limit_shrinks_the_market() {
    let x = capset("X", &[("A", dec!(2))]);
    let y = capset("Y", &[("A", dec!(1))]);
    let z = capset("Z", &[("A", dec!(1))]);
    let roster = vec![x, y, z];
    let sources = vec![Source::new("A", dec!(2))];

    let unbounded = CapsetExchange::new(roster.clone(), sources.clone()).unwrap();
    let bounded = CapsetExchange::with_config(
        roster,
        sources,
        ExchangeConfig {
            max_barter_size: Some(1),
            ..ExchangeConfig::default()
        },
    )
    .unwrap();

    assert!(bounded.market().len() < unbounded.market().len());
    assert!(bounded.market().iter().all(|t| unbounded.market().contains(t)));
}

#[test]
fn scheduler_drives_an_in_memory_pool() {
    let small = capset("small", &[("cpu", dec!(1))]);
    let large = capset("large", &[("cpu", dec!(2))]);
    let exchange = CapsetExchange::new(
        vec![small.clone(), large.clone()],
        vec![Source::new("cpu", dec!(2))],
    )
    .unwrap();
    let mut scheduler = Scheduler::new(exchange, InMemoryPool::new());

    scheduler.enqueue(small.clone(), 5);
    let report = scheduler.reorganize().unwrap();
    assert_eq!(report.started, 2);
    assert_eq!(scheduler.route(&small), Some(&small));
    assert_eq!(scheduler.route(&large), None);

    scheduler.take(&small, 5);
    scheduler.enqueue(large.clone(), 1);
    scheduler.pool_mut().drain_events();
    let report = scheduler.reorganize().unwrap();
    assert_eq!(report.stopped, 2);
    assert_eq!(report.started, 1);
    assert_eq!(
        scheduler.pool().events(),
        &[
            PoolEvent::Stopped(small.clone()),
            PoolEvent::Stopped(small.clone()),
            PoolEvent::Started(large.clone()),
        ]
    );
    assert_eq!(scheduler.route(&small), Some(&large));

    scheduler.shutdown().unwrap();
    assert_eq!(scheduler.into_pool().total_running(), 0);
}

#[test]
fn scenario_json_drives_the_engine() {
    let json = r#"{
        "variants": [
            [ { "name": "small", "resources": { "cpu": "0.5", "mem": "1" } } ],
            [ { "name": "large", "resources": { "cpu": "2" } }, { "resources": { "mem": "4" } } ]
        ],
        "sources": [
            { "kind": "cpu", "capacity": "4" },
            { "kind": "mem", "capacity": "8" }
        ],
        "config": { "max_barter_size": 2 }
    }"#;

    #[derive(serde::Deserialize)]
    struct Scenario {
        variants: Vec<CapabilitySet>,
        sources: Vec<Source>,
        config: ExchangeConfig,
    }

    let scenario: Scenario = serde_json::from_str(json).unwrap();
    assert_eq!(scenario.config.max_barter_size, Some(2));
    let large = scenario.variants[1].clone();
    assert_eq!(large.uses(&ResourceKind::new("mem")), dec!(4));

    let mut exchange =
        CapsetExchange::with_config(scenario.variants, scenario.sources, scenario.config).unwrap();
    let running = exchange.rebalance(&queue(&[(&large, 3)])).unwrap();
    assert_eq!(running[&large], 2);
    assert_eq!(exchange.consumed(&ResourceKind::new("mem")), 8);
}

#[test]
fn negative_amounts_in_json_are_rejected() {
    let json = r#"[ { "resources": { "cpu": "-1" } } ]"#;
    assert!(serde_json::from_str::<CapabilitySet>(json).is_err());
}
