//! Spec §8 scenario 5: checkpoint & reconfigure. The checkpoint file
//! format and round-robin redistribution are exercised directly against
//! `checkpoint.rs`, and a full run -> checkpoint -> restart -> resume
//! cycle is driven through `Engine` itself, checking that restarting on
//! a different process count still lands on the same final incumbent as
//! running the same instance to completion in one go.

mod common;

use common::Knapsack;
use parabb::application::Application;
use parabb::checkpoint::{
    all_processes_present, file_path, is_complete, mark_complete, read_checkpoint, write_checkpoint, CheckpointHeader,
    ProcessSnapshot,
};
use parabb::config::Config;
use parabb::ids::ProcessId;
use parabb::runtime::Engine;

fn snapshot(app: &Knapsack, sequence: u64, process_id: ProcessId, taken: &[bool]) -> ProcessSnapshot {
    let mut node = app.root_subproblem();
    node.index = taken.len();
    node.taken = taken.to_vec();
    for (i, &t) in taken.iter().enumerate() {
        if t {
            node.weight += app.items[i].0;
            node.value += app.items[i].1;
        }
    }
    ProcessSnapshot {
        header: CheckpointHeader {
            sequence,
            process_id,
            topology_descriptor: "2x1".to_string(),
            timestamp_secs: 0,
        },
        local_pool_bounds: vec![(0, 0, node.value)],
        token_pool: Vec::new(),
        packed_payloads: vec![(0, 0, app.pack(&node))],
        incumbent: None,
        rebalance_count: 0,
        in_flight_acks: Vec::new(),
    }
}

#[test]
fn checkpoint_round_trips_and_redistributes_round_robin() {
    let app = Knapsack::reference_instance();
    let dir = tempfile::tempdir().unwrap();
    let process_ids = vec![ProcessId(0), ProcessId(1)];

    for &pid in &process_ids {
        let snap = snapshot(&app, 1, pid, &[pid.0 == 1]);
        write_checkpoint(dir.path(), &snap).unwrap();
    }
    assert!(all_processes_present(dir.path(), 1, &process_ids));
    mark_complete(dir.path(), 1).unwrap();
    assert!(is_complete(dir.path(), 1));

    let mut restored_payloads = Vec::new();
    for &pid in &process_ids {
        let path = file_path(dir.path(), 1, pid);
        let snap = read_checkpoint(&path).unwrap();
        for (_slot, _gen, bytes) in snap.packed_payloads {
            restored_payloads.push(bytes);
        }
    }
    assert_eq!(restored_payloads.len(), 2);

    let new_process_ids: Vec<ProcessId> = (0..4).map(ProcessId).collect();
    let redistributed = parabb::checkpoint::redistribute_round_robin(restored_payloads, &new_process_ids);
    assert_eq!(redistributed.len(), 2);
    assert_eq!(redistributed[0].0, ProcessId(0));
    assert_eq!(redistributed[1].0, ProcessId(1));

    for (_pid, bytes) in &redistributed {
        let node = app.unpack(bytes).unwrap();
        assert_eq!(node.index, 1);
    }
}

/// Spec §8 scenario 5, driven through `Engine` directly: run on 2
/// processes, checkpoint after 10 subproblems explored, restart on 4
/// processes with `reconfigure = true`, and run to completion. The
/// restarted incumbent must equal a from-scratch run of the same
/// instance (scenario 1's optimum, value 7.0).
#[test]
fn checkpoint_then_restart_on_more_processes_matches_from_scratch() {
    let baseline = Engine::new(Knapsack::reference_instance(), Config::default());
    let baseline_value = baseline.run().incumbent.unwrap().0;
    assert_eq!(baseline_value, 7.0);

    let dir = tempfile::tempdir().unwrap();
    let mut checkpoint_config = Config::default();
    checkpoint_config.cluster_size = 2;
    checkpoint_config.checkpoint_dir = dir.path().to_path_buf();
    let engine = Engine::new(Knapsack::reference_instance(), checkpoint_config);
    engine.run_until_checkpoint(10, 1).unwrap();
    assert!(is_complete(dir.path(), 1));

    let mut restart_config = Config::default();
    restart_config.cluster_size = 4;
    restart_config.checkpoint_dir = dir.path().to_path_buf();
    restart_config.reconfigure = true;
    let restarted = Engine::restart_from_checkpoint(Knapsack::reference_instance(), restart_config, 1).unwrap();

    assert_eq!(restarted.incumbent.unwrap().0, baseline_value);
}
