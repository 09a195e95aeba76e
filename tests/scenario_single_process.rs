//! Spec §8 scenario 1: knapsack, single process, no hub at all.

mod common;

use common::Knapsack;
use parabb::config::Config;
use parabb::error::ExitCode;
use parabb::ids::ProcessId;
use parabb::runtime::Engine;

#[test]
fn single_process_finds_the_optimum() {
    let app = Knapsack::reference_instance();
    let mut config = Config::default();
    config.cluster_size = 1;

    let engine = Engine::new(app, config);
    let outcome = engine.run();

    let (value, source, solution) = outcome.incumbent.expect("a feasible solution exists");
    assert_eq!(value, 7.0);
    assert_eq!(source, ProcessId(0));
    let mut items = solution;
    items.sort_unstable();
    assert_eq!(items, vec![0, 1]);
    assert_eq!(outcome.exit_code, ExitCode::Normal);
}
