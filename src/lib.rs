//! Hub/worker parallel branch-and-bound scheduler.
//!
//! The engine owns only the scheduling machinery described in the design
//! doc: subproblem handling, local/token pools, worker and hub loops,
//! inter-cluster load balancing, incumbent broadcast, checkpointing, and
//! the cooperative pseudo-thread scheduler. The search itself (bounding,
//! separation, child construction) is supplied by an [`application::Application`]
//! implementation.

pub mod application;
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod handler;
pub mod hub;
pub mod ids;
pub mod incumbent;
pub mod load_balancer;
pub mod message;
pub mod pool;
pub mod registry;
pub mod runtime;
pub mod scheduler;
pub mod stats;
pub mod subproblem;
pub mod token;
pub mod utils;
pub mod worker;

pub use application::{Application, Sense};
pub use config::Config;
pub use error::EngineError;
pub use runtime::Engine;
