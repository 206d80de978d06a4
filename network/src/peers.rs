//! The peer table.
//!
//! One entry per endpoint with the contact, attempt, bootstrap, and
//! rep-crawl timestamps the maintenance loops order by, plus the observed
//! representative weight. The table is small (hundreds of peers), so the
//! secondary orderings are computed on demand rather than kept as separate
//! indexes.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use raze_types::{Amount, Endpoint, NetworkId};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::reserved::reserved_address;

/// Everything known about one peer.
#[derive(Clone, Debug)]
pub struct PeerInfo {
    pub endpoint: Endpoint,
    pub network_version: u8,
    pub last_contact: Instant,
    pub last_attempt: Instant,
    pub last_bootstrap_attempt: Option<Instant>,
    pub last_rep_request: Option<Instant>,
    pub last_rep_response: Option<Instant>,
    pub rep_weight: Amount,
}

impl PeerInfo {
    fn new(endpoint: Endpoint, network_version: u8, now: Instant) -> Self {
        Self {
            endpoint,
            network_version,
            last_contact: now,
            last_attempt: now,
            last_bootstrap_attempt: None,
            last_rep_request: None,
            last_rep_response: None,
            rep_weight: Amount::ZERO,
        }
    }
}

type EndpointObserver = Box<dyn Fn(Endpoint) + Send + Sync>;
type DisconnectObserver = Box<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct Table {
    peers: HashMap<Endpoint, PeerInfo>,
    /// Endpoints we've reached out to; purged on the same cutoff as peers.
    attempts: HashMap<Endpoint, Instant>,
}

/// Thread-safe peer registry for one node.
pub struct PeerContainer {
    table: Mutex<Table>,
    rng: Mutex<StdRng>,
    self_endpoint: Endpoint,
    network: NetworkId,
    peer_observer: Mutex<Option<EndpointObserver>>,
    disconnect_observer: Mutex<Option<DisconnectObserver>>,
}

impl PeerContainer {
    pub fn new(self_endpoint: Endpoint, network: NetworkId, rng_seed: u64) -> Self {
        Self {
            table: Mutex::new(Table::default()),
            rng: Mutex::new(StdRng::seed_from_u64(rng_seed)),
            self_endpoint,
            network,
            peer_observer: Mutex::new(None),
            disconnect_observer: Mutex::new(None),
        }
    }

    /// Install the new-peer observer. Called once while wiring the node.
    pub fn set_peer_observer(&self, observer: EndpointObserver) {
        *self.peer_observer.lock().unwrap_or_else(|e| e.into_inner()) = Some(observer);
    }

    /// Install the table-emptied observer. Called once while wiring the node.
    pub fn set_disconnect_observer(&self, observer: DisconnectObserver) {
        *self
            .disconnect_observer
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(observer);
    }

    /// Whether `endpoint` must never be inserted: unspecified, reserved, or
    /// this node itself.
    pub fn not_a_peer(&self, endpoint: &Endpoint) -> bool {
        endpoint.is_unspecified()
            || reserved_address(endpoint, self.network)
            || *endpoint == self.self_endpoint
    }

    /// Record contact with a peer, inserting it when new. Returns `true`
    /// when the peer was already known (or is not insertable). Genuinely new
    /// peers fire the peer observer.
    pub fn insert(&self, endpoint: Endpoint, version: u8) -> bool {
        if self.not_a_peer(&endpoint) {
            return true;
        }
        let now = Instant::now();
        let inserted_new = {
            let mut table = self.lock();
            match table.peers.get_mut(&endpoint) {
                Some(info) => {
                    info.last_contact = now;
                    info.network_version = version;
                    false
                }
                None => {
                    table.peers.insert(endpoint, PeerInfo::new(endpoint, version, now));
                    true
                }
            }
        };
        if inserted_new {
            debug!(peer = %endpoint, "peer inserted");
            if let Some(observer) = &*self.peer_observer.lock().unwrap_or_else(|e| e.into_inner())
            {
                observer(endpoint);
            }
        }
        !inserted_new
    }

    /// Refresh `last_contact` for a sender, inserting it when new.
    pub fn contacted(&self, endpoint: Endpoint, version: u8) {
        self.insert(endpoint, version);
    }

    pub fn known_peer(&self, endpoint: &Endpoint) -> bool {
        self.lock().peers.contains_key(endpoint)
    }

    /// Whether we should *not* reach out to `endpoint` with a keepalive:
    /// invalid, already known, or already attempted recently. Records the
    /// attempt either way.
    pub fn reachout(&self, endpoint: &Endpoint) -> bool {
        let mut result = self.not_a_peer(endpoint);
        result |= self.known_peer(endpoint);
        let mut table = self.lock();
        result |= table.attempts.contains_key(endpoint);
        table.attempts.insert(*endpoint, Instant::now());
        result
    }

    /// Record a representative weight observation. The stored weight only
    /// moves up within a session; returns `true` when it did.
    pub fn rep_response(&self, endpoint: &Endpoint, weight: Amount) -> bool {
        let mut table = self.lock();
        let Some(info) = table.peers.get_mut(endpoint) else {
            return false;
        };
        info.last_rep_response = Some(Instant::now());
        if info.rep_weight < weight {
            info.rep_weight = weight;
            true
        } else {
            false
        }
    }

    /// Stamp `last_rep_request` for a peer we just queried.
    pub fn rep_request(&self, endpoint: &Endpoint) {
        if let Some(info) = self.lock().peers.get_mut(endpoint) {
            info.last_rep_request = Some(Instant::now());
        }
    }

    /// Up to `count` distinct random peers; sampling is attempted `2·count`
    /// times, then the set is topped up with the most recently contacted.
    pub fn random_set(&self, count: usize) -> Vec<Endpoint> {
        let table = self.lock();
        let all: Vec<&PeerInfo> = table.peers.values().collect();
        let mut result: Vec<Endpoint> = Vec::with_capacity(count);
        if all.is_empty() || count == 0 {
            return result;
        }
        {
            let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
            for _ in 0..count * 2 {
                if result.len() >= count {
                    break;
                }
                let pick = all[rng.gen_range(0..all.len())].endpoint;
                if !result.contains(&pick) {
                    result.push(pick);
                }
            }
        }
        if result.len() < count {
            let mut by_contact = all;
            by_contact.sort_by(|a, b| b.last_contact.cmp(&a.last_contact));
            for info in by_contact {
                if result.len() >= count {
                    break;
                }
                if !result.contains(&info.endpoint) {
                    result.push(info.endpoint);
                }
            }
        }
        result
    }

    /// Fill the eight keepalive slots; unused slots stay unspecified.
    pub fn random_fill(&self, target: &mut [Endpoint; 8]) {
        target.fill(Endpoint::UNSPECIFIED);
        for (slot, endpoint) in target.iter_mut().zip(self.random_set(8)) {
            *slot = endpoint;
        }
    }

    /// Fanout set for republishing: ⌈2·√(table size)⌉ random peers. A
    /// sub-linear fanout still reaches the whole mesh with high probability.
    pub fn list_fanout(&self) -> Vec<Endpoint> {
        self.random_set(self.fanout_size())
    }

    /// ⌈2·√n⌉ for the current table size.
    pub fn fanout_size(&self) -> usize {
        (2.0 * (self.size() as f64).sqrt()).ceil() as usize
    }

    /// All peers, shuffled.
    pub fn list(&self) -> Vec<Endpoint> {
        let mut result: Vec<Endpoint> = self.lock().peers.keys().copied().collect();
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        result.shuffle(&mut *rng);
        result
    }

    /// Top `count` peers by known representative weight, non-zero only.
    pub fn representatives(&self, count: usize) -> Vec<PeerInfo> {
        let table = self.lock();
        let mut reps: Vec<PeerInfo> = table
            .peers
            .values()
            .filter(|info| !info.rep_weight.is_zero())
            .cloned()
            .collect();
        reps.sort_by(|a, b| b.rep_weight.cmp(&a.rep_weight));
        reps.truncate(count);
        reps
    }

    /// The eight peers we least recently asked to prove representation,
    /// oldest first. Never-queried peers sort before all queried ones.
    pub fn rep_crawl(&self) -> Vec<Endpoint> {
        let table = self.lock();
        let mut peers: Vec<&PeerInfo> = table.peers.values().collect();
        peers.sort_by(|a, b| a.last_rep_request.cmp(&b.last_rep_request));
        peers.iter().take(8).map(|info| info.endpoint).collect()
    }

    /// Pick the peer least recently used for bootstrap and stamp it.
    pub fn bootstrap_peer(&self) -> Option<Endpoint> {
        let mut table = self.lock();
        let pick = table
            .peers
            .values()
            .min_by_key(|info| info.last_bootstrap_attempt)
            .map(|info| info.endpoint)?;
        if let Some(info) = table.peers.get_mut(&pick) {
            info.last_bootstrap_attempt = Some(Instant::now());
        }
        Some(pick)
    }

    /// Peers we should keepalive: `last_attempt` older than `period`.
    /// Stamps `last_attempt` on the returned peers.
    pub fn keepalive_candidates(&self, period: Duration) -> Vec<Endpoint> {
        let now = Instant::now();
        let mut table = self.lock();
        let mut result = Vec::new();
        for info in table.peers.values_mut() {
            if now.duration_since(info.last_attempt) > period {
                info.last_attempt = now;
                result.push(info.endpoint);
            }
        }
        result
    }

    /// Remove and return peers silent since before `cutoff`, along with
    /// stale reachout attempts. Fires the disconnect observer when the
    /// table ends up empty.
    pub fn purge_list(&self, cutoff: Instant) -> Vec<PeerInfo> {
        let purged: Vec<PeerInfo>;
        let now_empty;
        {
            let mut table = self.lock();
            purged = table
                .peers
                .values()
                .filter(|info| info.last_contact < cutoff)
                .cloned()
                .collect();
            table.peers.retain(|_, info| info.last_contact >= cutoff);
            table.attempts.retain(|_, attempted| *attempted >= cutoff);
            now_empty = table.peers.is_empty();
        }
        if !purged.is_empty() {
            debug!(count = purged.len(), "purged silent peers");
        }
        if now_empty && !purged.is_empty() {
            if let Some(observer) = &*self
                .disconnect_observer
                .lock()
                .unwrap_or_else(|e| e.into_inner())
            {
                observer();
            }
        }
        purged
    }

    pub fn size(&self) -> usize {
        self.lock().peers.len()
    }

    pub fn empty(&self) -> bool {
        self.size() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Table> {
        self.table.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn container() -> PeerContainer {
        PeerContainer::new(
            "[::ffff:10.0.0.250]:54000".parse().unwrap(),
            NetworkId::Test,
            7,
        )
    }

    fn ep(last: u8) -> Endpoint {
        format!("10.0.0.{last}:54000").parse().unwrap()
    }

    #[test]
    fn insert_new_then_known() {
        let peers = container();
        assert!(!peers.insert(ep(1), 1));
        assert!(peers.insert(ep(1), 1));
        assert_eq!(peers.size(), 1);
    }

    #[test]
    fn reserved_endpoint_not_inserted() {
        let peers = container();
        assert!(peers.insert("192.0.2.1:54000".parse().unwrap(), 1));
        assert!(peers.empty());
    }

    #[test]
    fn self_endpoint_not_inserted() {
        let peers = container();
        assert!(peers.insert("[::ffff:10.0.0.250]:54000".parse().unwrap(), 1));
        assert!(peers.empty());
    }

    #[test]
    fn peer_observer_fires_once_per_new_peer() {
        let peers = container();
        let count = Arc::new(AtomicUsize::new(0));
        let seen = count.clone();
        peers.set_peer_observer(Box::new(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        }));
        peers.insert(ep(1), 1);
        peers.insert(ep(1), 1);
        peers.insert(ep(2), 1);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn reachout_known_or_attempted() {
        let peers = container();
        // First reachout to an unknown peer: go ahead.
        assert!(!peers.reachout(&ep(1)));
        // Second: already attempted.
        assert!(peers.reachout(&ep(1)));
        // Known peers are never reached out to.
        peers.insert(ep(2), 1);
        assert!(peers.reachout(&ep(2)));
        // Reserved are refused outright.
        assert!(peers.reachout(&"224.0.0.1:54000".parse().unwrap()));
    }

    #[test]
    fn rep_response_is_monotone() {
        let peers = container();
        peers.insert(ep(1), 1);
        assert!(peers.rep_response(&ep(1), Amount::new(100)));
        assert!(!peers.rep_response(&ep(1), Amount::new(50)));
        assert!(peers.rep_response(&ep(1), Amount::new(200)));
        assert_eq!(peers.representatives(10)[0].rep_weight, Amount::new(200));
    }

    #[test]
    fn representatives_ranked_by_weight_nonzero_only() {
        let peers = container();
        for i in 1..=4 {
            peers.insert(ep(i), 1);
        }
        peers.rep_response(&ep(1), Amount::new(10));
        peers.rep_response(&ep(2), Amount::new(30));
        peers.rep_response(&ep(3), Amount::new(20));

        let reps = peers.representatives(2);
        assert_eq!(reps.len(), 2);
        assert_eq!(reps[0].endpoint, ep(2));
        assert_eq!(reps[1].endpoint, ep(3));
    }

    #[test]
    fn random_set_caps_at_table_size() {
        let peers = container();
        for i in 1..=3 {
            peers.insert(ep(i), 1);
        }
        let set = peers.random_set(10);
        assert_eq!(set.len(), 3);
        // No duplicates.
        let mut dedup = set.clone();
        dedup.sort();
        dedup.dedup();
        assert_eq!(dedup.len(), set.len());
    }

    #[test]
    fn random_fill_pads_with_unspecified() {
        let peers = container();
        peers.insert(ep(1), 1);
        let mut slots = [Endpoint::UNSPECIFIED; 8];
        peers.random_fill(&mut slots);
        assert_eq!(slots[0], ep(1));
        assert!(slots[1..].iter().all(Endpoint::is_unspecified));
    }

    #[test]
    fn fanout_is_two_root_n() {
        let peers = container();
        for i in 1..=16 {
            peers.insert(ep(i), 1);
        }
        assert_eq!(peers.fanout_size(), 8);
        assert_eq!(peers.list_fanout().len(), 8);
    }

    #[test]
    fn fanout_covers_small_tables_entirely() {
        let peers = container();
        for i in 1..=4 {
            peers.insert(ep(i), 1);
        }
        // ⌈2·√4⌉ = 4: every peer targeted.
        assert_eq!(peers.list_fanout().len(), 4);
    }

    #[test]
    fn rep_crawl_prefers_least_recently_queried() {
        let peers = container();
        for i in 1..=10 {
            peers.insert(ep(i), 1);
        }
        // Query two peers; they should drop to the back of the crawl order.
        peers.rep_request(&ep(1));
        peers.rep_request(&ep(2));
        let crawl = peers.rep_crawl();
        assert_eq!(crawl.len(), 8);
        assert!(!crawl.contains(&ep(1)));
        assert!(!crawl.contains(&ep(2)));
    }

    #[test]
    fn purge_removes_only_silent_peers() {
        let peers = container();
        peers.insert(ep(1), 1);
        std::thread::sleep(Duration::from_millis(20));
        let cutoff = Instant::now();
        std::thread::sleep(Duration::from_millis(5));
        peers.insert(ep(2), 1);

        let purged = peers.purge_list(cutoff);
        assert_eq!(purged.len(), 1);
        assert_eq!(purged[0].endpoint, ep(1));
        assert!(purged.iter().all(|info| info.last_contact < cutoff));
        assert!(peers.known_peer(&ep(2)));
        assert!(!peers.known_peer(&ep(1)));
    }

    #[test]
    fn purge_to_empty_fires_disconnect_observer() {
        let peers = container();
        let fired = Arc::new(AtomicUsize::new(0));
        let observed = fired.clone();
        peers.set_disconnect_observer(Box::new(move || {
            observed.fetch_add(1, Ordering::SeqCst);
        }));
        peers.insert(ep(1), 1);
        std::thread::sleep(Duration::from_millis(10));
        peers.purge_list(Instant::now());
        assert!(peers.empty());
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn bootstrap_peer_rotates() {
        let peers = container();
        peers.insert(ep(1), 1);
        peers.insert(ep(2), 1);
        let first = peers.bootstrap_peer().unwrap();
        let second = peers.bootstrap_peer().unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn keepalive_candidates_stamps_attempts() {
        let peers = container();
        peers.insert(ep(1), 1);
        std::thread::sleep(Duration::from_millis(10));
        let due = peers.keepalive_candidates(Duration::from_millis(1));
        assert_eq!(due, vec![ep(1)]);
        // Just stamped; not due again.
        assert!(peers.keepalive_candidates(Duration::from_millis(1)).is_empty());
    }
}
