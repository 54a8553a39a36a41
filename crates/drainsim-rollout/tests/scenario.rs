//! End-to-end rollout scenarios.

use drainsim_core::{
    Connection, GracePeriod, Meeting, RolloutConfig, ShardTopology, SimulationConfig, Timestamp,
};
use drainsim_placement::RoundRobinPolicy;
use drainsim_rollout::{Downtime, RolloutOrchestrator, SimulationOutcome};

const T0: u64 = 1_696_250_000;

fn at(offset_secs: u64) -> Timestamp {
    Timestamp::from_secs(T0 + offset_secs)
}

fn meeting(id: &str, start: u64, finish: u64) -> Meeting {
    Meeting::from_connections(
        id,
        format!("room-{id}"),
        vec![Connection {
            meeting_id: id.to_string(),
            peer_id: "peer-0".to_string(),
            joined: at(start),
            left: at(finish),
        }],
    )
    .unwrap()
}

fn downtime(offset: u64, meeting: &str, from: usize, to: usize) -> Downtime {
    Downtime {
        at: at(offset),
        meeting: meeting.to_string(),
        from,
        to,
    }
}

struct Fleet {
    islands: Vec<usize>,
    budget: usize,
    restart_secs: u64,
    grace_secs: u64,
}

fn run_round_robin(fleet: Fleet, meetings: Vec<Meeting>, rollout_offsets: &[u64]) -> SimulationOutcome {
    let config = RolloutConfig {
        start_times: rollout_offsets.iter().map(|&o| at(o)).collect(),
        disruption_budget: fleet.budget,
        node_restart_secs: fleet.restart_secs,
    };
    let policy = RoundRobinPolicy::new(GracePeriod::Fixed {
        secs: fleet.grace_secs,
    });
    RolloutOrchestrator::new(
        meetings,
        &config,
        ShardTopology::new(fleet.islands).unwrap(),
        Box::new(policy),
    )
    .unwrap()
    .run()
    .unwrap()
}

#[test]
fn single_meeting_follows_the_rollout_around_the_fleet() {
    let fleet = Fleet {
        islands: vec![3],
        budget: 1,
        restart_secs: 120,
        grace_secs: 60,
    };
    let outcome = run_round_robin(fleet, vec![meeting("m", 0, 600)], &[10]);

    assert_eq!(outcome.rollouts.len(), 1);
    let rollout = &outcome.rollouts[0];
    assert_eq!(rollout.start, at(10));
    assert_eq!(
        rollout.downtimes,
        vec![
            downtime(70, "m", 0, 1),
            downtime(250, "m", 1, 2),
            downtime(430, "m", 2, 0),
        ]
    );
    assert_eq!(rollout.finish, Some(at(550)));
    assert_eq!(outcome.peak_disruption, 1);

    // Node 1 only goes down once node 0 is back.
    let ledger = &outcome.ledger;
    assert!(ledger.is_in_maintenance(0, at(189)));
    assert!(!ledger.is_in_maintenance(1, at(189)));
    assert!(!ledger.is_in_maintenance(0, at(190)));
    assert!(ledger.is_in_maintenance(1, at(190)));
    assert!(ledger.nodes_in_maintenance(at(550)).is_empty());

    assert_eq!(ledger.hosted_on("m", at(500)), Some(0));
    assert_eq!(ledger.hosted_on("m", at(600)), None);
}

#[test]
fn early_drain_skips_the_rest_of_the_grace_period() {
    let fleet = Fleet {
        islands: vec![2],
        budget: 1,
        restart_secs: 60,
        grace_secs: 300,
    };
    let outcome = run_round_robin(fleet, vec![meeting("m", 0, 100)], &[10]);

    let rollout = &outcome.rollouts[0];
    assert!(rollout.downtimes.is_empty());
    // Node 0 empties at +100 and restarts at once; node 1 follows at +160.
    assert_eq!(rollout.finish, Some(at(220)));

    let ledger = &outcome.ledger;
    assert!(ledger.is_in_maintenance(0, at(159)));
    assert!(!ledger.is_in_maintenance(0, at(160)));
    assert!(ledger.is_in_maintenance(1, at(160)));
    assert!(!ledger.is_in_maintenance(1, at(220)));
}

#[test]
fn early_drain_overtakes_an_earlier_grace_deadline() {
    let fleet = Fleet {
        islands: vec![4],
        budget: 2,
        restart_secs: 20,
        grace_secs: 300,
    };
    let outcome = run_round_robin(
        fleet,
        vec![meeting("a", 0, 1000), meeting("b", 0, 50)],
        &[10],
    );

    // Nodes 0 and 1 both drain until +310; node 1 empties at +50 and
    // restarts ahead of node 0, freeing budget for nodes 2 and 3.
    let rollout = &outcome.rollouts[0];
    assert_eq!(rollout.downtimes, vec![downtime(310, "a", 0, 2)]);
    assert_eq!(rollout.finish, Some(at(330)));
    assert_eq!(outcome.peak_disruption, 2);

    let ledger = &outcome.ledger;
    assert!(ledger.is_in_maintenance(1, at(50)));
    assert!(!ledger.is_in_maintenance(1, at(70)));
    assert!(ledger.is_in_maintenance(2, at(70)));
    assert!(ledger.is_in_maintenance(3, at(90)));
    assert!(ledger.is_in_maintenance(0, at(309)));
    assert!(ledger.nodes_in_maintenance(at(330)).is_empty());
    assert_eq!(ledger.hosted_on("a", at(500)), Some(2));
}

#[test]
fn new_rollout_waits_for_nodes_still_out_from_the_previous_one() {
    let fleet = Fleet {
        islands: vec![3],
        budget: 2,
        restart_secs: 100,
        grace_secs: 500,
    };
    let outcome = run_round_robin(fleet, vec![meeting("m", 0, 2000)], &[10, 300]);

    assert_eq!(outcome.rollouts.len(), 2);
    let first = &outcome.rollouts[0];
    let second = &outcome.rollouts[1];

    // The second rollout supersedes the first while node 0 is still draining.
    assert_eq!(first.finish, Some(at(300)));
    assert_eq!(second.start, at(300));
    // Downtimes belong to the rollout that took the node out.
    assert_eq!(first.downtimes, vec![downtime(510, "m", 0, 1)]);
    assert_eq!(second.downtimes, vec![downtime(1110, "m", 1, 2)]);
    assert_eq!(second.finish, Some(at(1210)));
    assert_eq!(outcome.peak_disruption, 2);

    // Node 0 is restarted again by the second rollout once it has returned.
    let ledger = &outcome.ledger;
    assert!(ledger.is_in_maintenance(0, at(400)));
    assert!(ledger.is_in_maintenance(0, at(650)));
    assert!(!ledger.is_in_maintenance(0, at(710)));
}

#[test]
fn per_meeting_grace_from_toml_config() {
    let toml = format!(
        r#"
[fleet]
islands = [2]

[rollout]
start_times = [{}]
disruption_budget = 1
node_restart_secs = 30

[policy]
kind = "round_robin"
grace = {{ kind = "per_meeting", base_secs = 10, per_meeting_secs = 20, max_secs = 100 }}
"#,
        at(10).as_millis()
    );
    let config = SimulationConfig::from_toml_str(&toml).unwrap();
    let meetings = vec![
        meeting("a", 0, 1000),
        meeting("b", 0, 1000),
        meeting("c", 0, 1000),
    ];

    let outcome = RolloutOrchestrator::from_config(meetings, &config)
        .unwrap()
        .run()
        .unwrap();

    // Node 0 holds a and c: 10 + 2 * 20 = 50s of grace. Node 1 then holds
    // all three: 10 + 3 * 20 = 70s.
    let rollout = &outcome.rollouts[0];
    assert_eq!(
        rollout.downtimes,
        vec![
            downtime(60, "a", 0, 1),
            downtime(60, "c", 0, 1),
            downtime(160, "a", 1, 0),
            downtime(160, "b", 1, 0),
            downtime(160, "c", 1, 0),
        ]
    );
    assert_eq!(rollout.finish, Some(at(190)));
    assert_eq!(outcome.total_downtimes(), 5);
}

// ── Larger fleet ───────────────────────────────────────────────────

fn busy_day() -> Vec<Meeting> {
    (0..80u64)
        .map(|i| {
            let id = format!("rm{i}");
            let start = (i * 37) % 1800;
            let finish = start + 120 + (i * 53) % 900;
            let connections = (0..1 + i % 3)
                .map(|j| Connection {
                    meeting_id: id.clone(),
                    peer_id: format!("peer-{j}"),
                    joined: at(start + j * 5),
                    left: at(finish - j * 7),
                })
                .collect();
            Meeting::from_connections(id.clone(), "room", connections).unwrap()
        })
        .collect()
}

fn island_config() -> SimulationConfig {
    let toml = format!(
        r#"
[fleet]
islands = [4, 4, 4]

[rollout]
start_times = [{}, {}]
disruption_budget = 3

[policy]
kind = "island_least_loaded"
seed = 42
"#,
        at(2400).as_millis(),
        at(300).as_millis()
    );
    SimulationConfig::from_toml_str(&toml).unwrap()
}

fn run_busy_day() -> SimulationOutcome {
    RolloutOrchestrator::from_config(busy_day(), &island_config())
        .unwrap()
        .run()
        .unwrap()
}

#[test]
fn disruption_never_exceeds_the_budget() {
    let outcome = run_busy_day();
    assert!(outcome.peak_disruption >= 1);
    assert!(outcome.peak_disruption <= 3);

    // Schedule is sorted on intake.
    assert_eq!(outcome.rollouts.len(), 2);
    assert_eq!(outcome.rollouts[0].start, at(300));
    assert!(outcome.rollouts.iter().all(|r| r.is_finished()));

    for snapshot in outcome.ledger.maintenance_history() {
        assert!(snapshot.value.len() <= 3, "{} nodes down at {}", snapshot.value.len(), snapshot.at);
    }
}

#[test]
fn migrations_move_meetings_off_maintenance_nodes() {
    let outcome = run_busy_day();
    let ledger = &outcome.ledger;

    assert!(outcome.total_downtimes() > 0);
    for d in outcome.downtimes() {
        assert_ne!(d.from, d.to);
        assert!(ledger.is_in_maintenance(d.from, d.at), "{d:?}");
        // The target may enter maintenance later in the same instant, never before.
        let just_before = Timestamp::from_millis(d.at.as_millis() - 1);
        assert!(!ledger.is_in_maintenance(d.to, just_before), "{d:?}");
        assert_eq!(ledger.hosted_on(&d.meeting, d.at), Some(d.to));
    }

    for m in outcome.meetings.meetings() {
        assert!(ledger.hosted_on(&m.id, m.start).is_some(), "{} never placed", m.id);
        assert_eq!(ledger.hosted_on(&m.id, m.finish), None, "{} still hosted", m.id);
    }
}

#[test]
fn runs_are_deterministic() {
    let first = serde_json::to_value(run_busy_day()).unwrap();
    let second = serde_json::to_value(run_busy_day()).unwrap();
    assert_eq!(first, second);
    assert_eq!(first["rollouts"].as_array().unwrap().len(), 2);
}

#[test]
fn outcome_serializes_downtimes() {
    let fleet = Fleet {
        islands: vec![2],
        budget: 1,
        restart_secs: 10,
        grace_secs: 5,
    };
    let outcome = run_round_robin(fleet, vec![meeting("m", 0, 100)], &[1]);
    let json = serde_json::to_value(&outcome).unwrap();

    let first = &json["rollouts"][0]["downtimes"][0];
    assert_eq!(first["meeting"], "m");
    assert_eq!(first["from"], 0);
    assert_eq!(first["to"], 1);
    assert_eq!(first["at"], at(6).as_millis());
    assert_eq!(json["peak_disruption"], 1);
}
