//! Spec §8 scenario 3: scenario 2's topology with `rampUpOnly=true`.

mod common;

use common::Knapsack;
use parabb::config::Config;
use parabb::error::ExitCode;
use parabb::runtime::Engine;

#[test]
fn ramp_up_only_terminates_with_unknown_incumbent() {
    let app = Knapsack::reference_instance();
    let mut config = Config::default();
    config.cluster_size = 4;
    config.hubs_dont_work_size = 3;
    config.ramp_up_only = true;
    config.min_ramp_up_subprobs_created = 8;

    let engine = Engine::new(app, config);
    let outcome = engine.run();

    assert!(outcome.incumbent.is_none(), "ramp-up-only must report the incumbent as unknown");
    assert_eq!(outcome.exit_code, ExitCode::Normal);
}
