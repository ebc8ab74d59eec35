//! Shared test helpers for `mintwalk-core` unit tests.

use std::sync::Arc;
use std::time::Duration;

use crate::node::AccountNode;
use crate::throttle::{ManualClock, Throttle};
use crate::types::TransferRecord;

/// `Mint1 -> {Acc2 -> {Acc4}, Acc3}`: the tree a two-step crawl of the
/// reference scenario produces.
pub fn scenario_tree() -> AccountNode {
    let mut root = AccountNode::root("Mint1");
    let acc2 = root.add_child("Acc2");
    root.add_child("Acc3");
    root.node_at_mut(&[acc2])
        .expect("Acc2 was just added")
        .add_child("Acc4");
    root
}

/// A transfer record with the same defaults `MockApi::with_recipients` uses.
pub fn transfer(from: &str, to: &str) -> TransferRecord {
    TransferRecord {
        from_address: from.to_owned(),
        to_address: to.to_owned(),
        amount: Some(1),
        block_time: Some(0),
    }
}

/// A throttle on a manual clock, so spacing is recorded instead of slept.
pub fn manual_throttle(interval_ms: u64) -> (Arc<ManualClock>, Arc<Throttle>) {
    let clock = Arc::new(ManualClock::new());
    let throttle = Arc::new(Throttle::new(
        Duration::from_millis(interval_ms),
        clock.clone(),
    ));
    (clock, throttle)
}
