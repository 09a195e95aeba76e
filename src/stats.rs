//! Status-line printing, gated on `Config::workers_print_status` /
//! `hubs_print_status` / `track_incumbent` (spec §7 "user-visible failure
//! behaviour"). Mirrors the teacher's `comfy_table`-based
//! `worker::stats::print_worker_stats_summary`.

use crate::ids::ProcessId;
use comfy_table::{Cell, ContentArrangement, Table};
use log::info;

/// One row of a worker's reported state, as surfaced to `print_worker_table`.
#[derive(Debug, Clone, Copy)]
pub struct WorkerRow {
    pub id: ProcessId,
    pub local_count: usize,
    pub best_bound: f64,
    pub rebalance_count: u64,
}

/// Prints a table of current worker load, analogous to the teacher's
/// per-thread push/pop/steal summary but keyed on pool occupancy.
pub fn print_worker_table(rows: &[WorkerRow]) {
    let mut table = Table::new();
    table
        .load_preset(comfy_table::presets::UTF8_HORIZONTAL_ONLY)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Worker", "LocalPool", "BestBound", "Rebalances"]);

    for column in table.column_iter_mut() {
        column.set_padding((0, 0));
    }

    for row in rows {
        table.add_row(vec![
            Cell::new(row.id),
            Cell::new(row.local_count),
            Cell::new(format!("{:.3}", row.best_bound)),
            Cell::new(row.rebalance_count),
        ]);
    }

    println!("\n{table}");
}

/// Logs an incumbent-tracking line, gated on `Config::track_incumbent`.
pub fn log_incumbent_improvement(value: f64, source: ProcessId) {
    info!("new incumbent {value} from {source}");
}

/// Logs one hub status line (cluster load, token pool size), gated on
/// `Config::hubs_print_status`.
pub fn log_hub_status(id: ProcessId, token_count: usize, aggregate_bound: f64) {
    info!("hub {id}: {token_count} tokens queued, aggregate bound {aggregate_bound:.3}");
}
