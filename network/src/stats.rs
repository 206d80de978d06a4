//! Message and rejection counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// One direction's per-type message counts.
#[derive(Default)]
pub struct MessageCounters {
    pub keepalive: AtomicU64,
    pub publish: AtomicU64,
    pub confirm_req: AtomicU64,
    pub confirm_ack: AtomicU64,
}

/// Counters for the UDP channel. Rejections are counted, never raised.
#[derive(Default)]
pub struct NetworkStats {
    pub incoming: MessageCounters,
    pub outgoing: MessageCounters,
    pub bad_sender: AtomicU64,
    pub insufficient_work: AtomicU64,
    pub parse_error: AtomicU64,
    pub send_error: AtomicU64,
}

impl NetworkStats {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }
}
