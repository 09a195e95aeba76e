//! Tunable scheduler parameters (spec §6's configuration table). This is
//! the core engine's own knob set, not an application CLI or file-format
//! parser — those stay out of scope per spec §1. Defaults are documented
//! inline; a [`Config`] can additionally be loaded from a TOML file via
//! the `config` crate, the way `jim60105-subx-cli` layers its own
//! settings.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // --- Topology ---
    /// Maximum workers per hub.
    pub cluster_size: usize,
    /// Minimum number of hub clusters.
    pub num_clusters: usize,
    /// Cluster size above which a hub does no local worker-style solving.
    pub hubs_dont_work_size: usize,

    // --- Ramp-up ---
    pub ramp_up_pool_limit: usize,
    pub ramp_up_pool_limit_fac: f64,
    pub min_ramp_up_subprobs_created: usize,

    // --- Inter-cluster load balancer pacing ---
    pub max_load_bal_rate: f64,
    pub load_bal_seconds: f64,
    pub load_bal_idle_increase: f64,

    // --- Message batching caps ---
    pub max_tokens_in_hub_msg: usize,
    pub max_sp_packing: usize,
    pub max_dispatch_packing: usize,
    pub max_load_bal_size: usize,
    pub max_token_queuing: usize,
    /// Receiver's assumed buffer size (bytes) for a packed subproblem
    /// until told otherwise; a dispatch larger than the peer's last-known
    /// size is preceded by a `spBufferWarning` (spec §5 back-pressure).
    pub sp_receive_buf: usize,

    // --- Target load fractions ---
    pub hub_load_fac: f64,
    pub low_load_fac: f64,
    pub high_load_fac: f64,

    // --- Upward rebalance policy ---
    pub rebalancing: bool,
    pub rebal_load_fac: f64,
    pub rebal_load_diff: f64,
    pub worker_keep_count: usize,

    // --- Release probability shaping ---
    pub min_scatter_prob: f64,
    pub target_scatter_prob: f64,
    pub max_scatter_prob: f64,
    pub scatter_fac: f64,
    pub init_force_releases: usize,

    // --- Inter-cluster scatter ---
    pub min_non_local_scatter_prob: f64,
    pub target_non_local_scatter_prob: f64,
    pub max_non_local_scatter_prob: f64,
    pub cluster_low_load_ratio: f64,
    pub cluster_high_load_ratio: f64,

    // --- Inter-cluster load-balancer shaping ---
    pub load_bal_tree_radix: usize,
    pub load_bal_donor_fac: f64,
    pub load_bal_receiver_fac: f64,
    pub load_bal_min_source_count: usize,
    pub load_bal_early_rounds: usize,

    // --- Incumbent thread policy ---
    pub incumb_tree_radix: usize,
    pub inc_search_max_control: f64,
    pub use_incumbent_thread: bool,
    pub inc_thread_bias_factor: f64,
    pub inc_thread_bias_power: f64,
    pub inc_thread_min_bias: f64,
    pub inc_thread_max_bias: f64,
    pub no_incumbent_min_bias: f64,
    pub inc_thread_gap_slices: usize,

    // --- Cooperative scheduler tuning ---
    pub time_slice: f64,
    pub worker_thread_bias: f64,
    pub max_worker_control: f64,

    // --- Checkpointing ---
    pub checkpoint_minutes: f64,
    pub checkpoint_min_interval: f64,
    pub checkpoint_dir: PathBuf,
    pub restart: bool,
    pub reconfigure: bool,

    // --- Termination / mode forcing ---
    pub ramp_up_only: bool,
    pub force_parallel: bool,

    // --- Diagnostics ---
    pub workers_print_status: bool,
    pub hubs_print_status: bool,
    pub track_incumbent: bool,
    pub abort_debug: u8,
    pub worker_debug: u8,

    // --- Protocol strictness ---
    /// When set, a token/subproblem id mismatch on delivery is a fatal
    /// protocol error; otherwise it is logged and the token honored
    /// anyway (spec §7).
    pub check_tokens_match: bool,

    // --- Hub co-residency ---
    pub hub_busy_inflate: f64,
    pub hub_busy_adjust: f64,
    pub quality_balance: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            cluster_size: 4,
            num_clusters: 1,
            hubs_dont_work_size: 3,

            ramp_up_pool_limit: 1000,
            ramp_up_pool_limit_fac: 2.0,
            min_ramp_up_subprobs_created: 8,

            max_load_bal_rate: 1.0,
            load_bal_seconds: 1.0,
            load_bal_idle_increase: 4.0,

            max_tokens_in_hub_msg: 32,
            max_sp_packing: 8,
            max_dispatch_packing: 8,
            max_load_bal_size: 16,
            max_token_queuing: 64,
            sp_receive_buf: 4096,

            hub_load_fac: 1.0,
            low_load_fac: 0.5,
            high_load_fac: 1.5,

            rebalancing: true,
            rebal_load_fac: 1.5,
            rebal_load_diff: 2.0,
            worker_keep_count: 1,

            min_scatter_prob: 0.01,
            target_scatter_prob: 0.1,
            max_scatter_prob: 0.5,
            scatter_fac: 1.0,
            init_force_releases: 2,

            min_non_local_scatter_prob: 0.0,
            target_non_local_scatter_prob: 0.05,
            max_non_local_scatter_prob: 0.25,
            cluster_low_load_ratio: 0.5,
            cluster_high_load_ratio: 1.5,

            load_bal_tree_radix: 2,
            load_bal_donor_fac: 1.5,
            load_bal_receiver_fac: 0.5,
            load_bal_min_source_count: 2,
            load_bal_early_rounds: 4,

            incumb_tree_radix: 2,
            inc_search_max_control: 1.0,
            use_incumbent_thread: true,
            inc_thread_bias_factor: 1.0,
            inc_thread_bias_power: 1.0,
            inc_thread_min_bias: 0.05,
            inc_thread_max_bias: 1.0,
            no_incumbent_min_bias: 0.5,
            inc_thread_gap_slices: 4,

            time_slice: 0.1,
            worker_thread_bias: 1.0,
            max_worker_control: 1.0,

            checkpoint_minutes: 0.0,
            checkpoint_min_interval: 1.0,
            checkpoint_dir: PathBuf::from("checkpoints"),
            restart: false,
            reconfigure: false,

            ramp_up_only: false,
            force_parallel: false,

            workers_print_status: false,
            hubs_print_status: false,
            track_incumbent: false,
            abort_debug: 0,
            worker_debug: 0,

            check_tokens_match: true,

            hub_busy_inflate: 1.1,
            hub_busy_adjust: 0.9,
            quality_balance: true,
        }
    }
}

impl Config {
    /// Loads a config, layering a TOML file (if present) over
    /// [`Config::default`], mirroring the `config` crate idiom used
    /// elsewhere in the retrieved pack for layered settings.
    pub fn load(path: Option<&std::path::Path>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&Config::default())?);
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(false));
        }
        builder.build()?.try_deserialize()
    }

    /// `targetFraction` from spec §4.3's release-decision formula:
    /// `(1 - hubLoadFraction) * localWorkerTimeFraction / adjustedWorkerCount`.
    pub fn target_fraction(&self, hub_load_fraction: f64, local_worker_time_fraction: f64, adjusted_worker_count: f64) -> f64 {
        if adjusted_worker_count <= 0.0 {
            return 0.0;
        }
        (1.0 - hub_load_fraction) * local_worker_time_fraction / adjusted_worker_count
    }
}
