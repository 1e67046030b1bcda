// SPDX-FileCopyrightText: 2026 Coffer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metric registration and recording helpers.
//!
//! Uses the metrics-rs facade so any installed recorder can collect these.
//! Without a recorder every call is a no-op.

use metrics::describe_counter;

/// Register all Coffer metric descriptions.
pub fn register_metrics() {
    describe_counter!(
        "coffer_operations_total",
        "Store operations by name and outcome"
    );
    describe_counter!(
        "coffer_decrypt_failures_total",
        "Records that failed authenticated decryption"
    );
    describe_counter!(
        "coffer_purged_records_total",
        "Records permanently removed by purge passes"
    );
    describe_counter!("coffer_rotations_total", "Completed key rotations");
}

/// Record the outcome of a public store operation.
pub fn record_operation(op: &'static str, outcome: &'static str) {
    metrics::counter!("coffer_operations_total", "op" => op, "outcome" => outcome).increment(1);
}

pub fn record_decrypt_failure() {
    metrics::counter!("coffer_decrypt_failures_total").increment(1);
}

pub fn record_purged(count: usize) {
    metrics::counter!("coffer_purged_records_total").increment(count as u64);
}

pub fn record_rotation() {
    metrics::counter!("coffer_rotations_total").increment(1);
}
