//! Runs on small networks with merges, diverges and signals.

mod common;

use common::*;
use meso_traffic::{
    Demand, LinkAttributes, LinkId, NodeAttributes, NodeId, PlatoonState, Signal, Simulation,
};

/// Two approaches of 1 km merging into a single road.
fn merge(sim: &mut Simulation, priorities: [f64; 2]) -> ([NodeId; 2], NodeId, [LinkId; 2]) {
    let a = sim.add_node(&NodeAttributes::default()).unwrap();
    let b = sim.add_node(&NodeAttributes::default()).unwrap();
    let m = sim.add_node(&NodeAttributes::default()).unwrap();
    let d = sim.add_node(&NodeAttributes::default()).unwrap();
    let approach = |from, priority| LinkAttributes {
        from,
        to: m,
        merge_priority: Some(priority),
        ..road(20.0, 0.2)
    };
    let la = sim.add_link(&approach(a, priorities[0])).unwrap();
    let lb = sim.add_link(&approach(b, priorities[1])).unwrap();
    sim.add_link(&LinkAttributes {
        from: m,
        to: d,
        ..road(20.0, 0.2)
    })
    .unwrap();
    ([a, b], d, [la, lb])
}

fn departed(sim: &Simulation, link: LinkId) -> f64 {
    sim.get_link(link)
        .cum_departure()
        .last()
        .copied()
        .unwrap_or_default()
}

#[test]
fn merge_shares_capacity_by_priority() {
    let mut sim = new_sim(5, 1500.0);
    let (origins, d, approaches) = merge(&mut sim, [2.0, 1.0]);
    for origin in origins {
        sim.add_demand(&Demand::new(origin, d, 0.0, 1000.0, 0.8))
            .unwrap();
    }
    sim.run_until(800.0);

    let ratio = departed(&sim, approaches[0]) / departed(&sim, approaches[1]);
    assert!((1.8..=2.2).contains(&ratio), "ratio = {}", ratio);
}

#[test]
fn merge_with_equal_priority_alternates() {
    let mut sim = new_sim(5, 1500.0);
    let (origins, d, approaches) = merge(&mut sim, [1.0, 1.0]);
    for origin in origins {
        sim.add_demand(&Demand::new(origin, d, 0.0, 1000.0, 0.8))
            .unwrap();
    }
    sim.run_until(800.0);

    let difference = departed(&sim, approaches[0]) - departed(&sim, approaches[1]);
    assert!(difference.abs() <= 5.0, "difference = {}", difference);
}

#[test]
fn diverge_serves_both_destinations() {
    let mut sim = new_sim(5, 1000.0);
    let o = sim.add_node(&NodeAttributes::default()).unwrap();
    let m = sim.add_node(&NodeAttributes::default()).unwrap();
    let d1 = sim.add_node(&NodeAttributes::default()).unwrap();
    let d2 = sim.add_node(&NodeAttributes::default()).unwrap();
    for (from, to) in [(o, m), (m, d1), (m, d2)] {
        sim.add_link(&LinkAttributes {
            from,
            to,
            ..road(20.0, 0.2)
        })
        .unwrap();
    }
    sim.add_demand(&Demand::new(o, d1, 0.0, 400.0, 0.2)).unwrap();
    sim.add_demand(&Demand::new(o, d2, 0.0, 400.0, 0.2)).unwrap();
    sim.run();

    let stats = sim.stats();
    assert_close(stats.trips_completed, 160.0);
    // Platoons released together leave the origin one step apart.
    assert!(stats.average_delay < 10.0, "delay = {}", stats.average_delay);
    for dest in [d1, d2] {
        let arrived = sim.iter_completed().filter(|p| p.destination() == dest).count();
        assert_eq!(arrived, 16);
    }
}

#[test]
fn signal_only_serves_green_groups() {
    let mut sim = new_sim(5, 1200.0);
    let a = sim.add_node(&NodeAttributes::default()).unwrap();
    let b = sim.add_node(&NodeAttributes::default()).unwrap();
    let m = sim
        .add_node(&NodeAttributes {
            signal: Signal::from_durations(&[30.0, 30.0]).unwrap(),
            ..Default::default()
        })
        .unwrap();
    let d = sim.add_node(&NodeAttributes::default()).unwrap();
    let approaches = [(a, 0), (b, 1)].map(|(from, signal_group)| {
        sim.add_link(&LinkAttributes {
            from,
            to: m,
            signal_group,
            ..road(20.0, 0.2)
        })
        .unwrap()
    });
    sim.add_link(&LinkAttributes {
        from: m,
        to: d,
        ..road(20.0, 0.2)
    })
    .unwrap();
    sim.add_demand(&Demand::new(a, d, 0.0, 800.0, 0.3)).unwrap();
    sim.add_demand(&Demand::new(b, d, 0.0, 800.0, 0.3)).unwrap();

    let mut before = approaches.map(|link| departed(&sim, link));
    while sim.is_running() {
        sim.step();
        let after = approaches.map(|link| departed(&sim, link));
        let phase = sim.get_node(m).signal().phase().unwrap();
        for (group, link) in approaches.iter().enumerate() {
            if group != phase {
                assert_eq!(after[group], before[group], "red link {:?} released a platoon", link);
            }
        }
        before = after;
    }
    assert!(before.iter().all(|n| *n > 0.0));
}

/// Mean flow into the exit of a saturated two link corridor over ten whole
/// cycles of a `[60, 60]` signal, or the same window without a signal.
fn saturated_throughput(signal: Signal) -> f64 {
    let mut sim = new_sim(5, 2000.0);
    let mut nodes = plain_nodes(3);
    nodes[1].signal = signal;
    let (nodes, links) = corridor(&mut sim, &nodes, &[road(20.0, 0.2), road(20.0, 0.2)]);
    sim.add_demand(&Demand::new(nodes[0], nodes[2], 0.0, 2000.0, 2.0))
        .unwrap();
    sim.run_until(1600.0);

    // A cycle is 26 steps: each phase is served while its elapsed time has
    // not passed 60 s.
    let (first, last) = (51, 51 + 10 * 26);
    let entered = sim.get_link(links[1]).cum_arrival();
    let dt = sim.clock().dt();
    (entered[last] - entered[first]) / ((last - first) as f64 * dt)
}

#[test]
fn signal_halves_saturated_capacity() {
    let uncontrolled = saturated_throughput(Signal::NoSignal);
    assert_close(uncontrolled, 0.8);

    let signalised = saturated_throughput(Signal::from_durations(&[60.0, 60.0]).unwrap());
    assert!(signalised <= 0.4 * 1.1, "flow = {}", signalised);
    let share = signalised / uncontrolled;
    assert!((0.45..=0.55).contains(&share), "share = {}", share);
}

#[test]
fn vehicles_are_conserved() {
    let mut sim = new_sim(5, 1500.0);
    let (nodes, links) = corridor(
        &mut sim,
        &plain_nodes(4),
        &[
            road(20.0, 0.2),
            LinkAttributes {
                capacity_out: Some(0.3),
                ..road(15.0, 0.15)
            },
            road(20.0, 0.2),
        ],
    );
    sim.add_demand_nodes2nodes(&nodes[..2], &nodes[2..], 0.0, 1200.0, 0.7)
        .unwrap();

    let deltan = sim.deltan();
    while sim.is_running() {
        sim.step();
        let stats = sim.stats();
        assert!(stats.unaccounted().abs() < 1e-9);
        let running = sim
            .iter_platoons()
            .filter(|p| p.state() == PlatoonState::Running)
            .count() as f64
            * deltan;
        let on_links = links
            .iter()
            .map(|id| sim.get_link(*id).vehicles(deltan))
            .sum::<f64>();
        assert_eq!(running, on_links);
        assert_eq!(stats.trips_running, on_links);
        for id in &links {
            let link = sim.get_link(*id);
            let (arrived, departed) = (link.cum_arrival(), link.cum_departure());
            let step = arrived.len() - 1;
            assert_eq!(arrived[step] - departed[step], link.vehicles(deltan));
        }
    }
    assert!(sim.stats().trips_completed > 0.0);
}

#[test]
fn coarse_and_fine_platoons_agree() {
    let run = |deltan| {
        let mut sim = new_sim(deltan, 2000.0);
        let (nodes, _) = corridor(
            &mut sim,
            &plain_nodes(3),
            &[road(20.0, 0.2), road(10.0, 0.2)],
        );
        sim.add_demand(&Demand::new(nodes[0], nodes[2], 0.0, 500.0, 0.5))
            .unwrap();
        sim.run();
        sim.stats()
    };
    let coarse = run(5);
    let fine = run(1);
    assert_close(coarse.trips_completed, fine.trips_completed);
    assert_close(coarse.total_travel_time, fine.total_travel_time);
    assert_close(coarse.average_travel_time, fine.average_travel_time);
}

#[test]
fn resumes_after_checkpoint() {
    let build = || {
        let mut sim = new_sim(5, 1000.0);
        let (nodes, _) = corridor(&mut sim, &plain_nodes(2), &[road(20.0, 0.2)]);
        sim.add_demand(&Demand::new(nodes[0], nodes[1], 0.0, 600.0, 0.6))
            .unwrap();
        sim
    };
    let mut whole = build();
    whole.run();

    let mut split = build();
    split.run_until(300.0);
    assert!(split.is_running());
    assert_eq!(split.clock().step(), 60);
    split.run();

    assert_eq!(whole.stats(), split.stats());
}
