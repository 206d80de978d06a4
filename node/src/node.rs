//! The node: component ownership, message handling, and periodic loops.
//!
//! Spawned tasks hold a `Weak` handle; after shutdown they upgrade to
//! nothing and drop silently. Lock order, where locks nest: elections →
//! store transaction → gap cache. No lock is held across an await.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use raze_consensus::{ActiveTransactions, BlockArrival, Confirmation, GapCache, RepCrawler};
use raze_ledger::{Block, Genesis, Ledger, ProcessReturn, Store, Vote, VoteCode};
use raze_messages::{Message, KEEPALIVE_PEERS, PROTOCOL_VERSION};
use raze_network::{InboundHandler, PeerContainer, UdpChannel};
use raze_types::{BlockHash, Endpoint, NetworkId};
use raze_work::{WorkPeer, WorkPool};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use crate::alarm::Alarm;
use crate::block_processor::{BlockProcessor, ProcessorContext};
use crate::bootstrap::BootstrapInitiator;
use crate::callback::{post_confirmation, CallbackTarget};
use crate::config::NodeConfig;
use crate::error::NodeError;
use crate::local_reps::LocalRepSet;
use crate::vote_processor::VoteProcessor;

/// A peer replaying a sequence this far behind ours gets our newer vote
/// echoed back, once. Large enough that network reordering never trips it.
const REPLAY_ECHO_GAP: u64 = 10_000;

type ConfirmationObserver = Box<dyn Fn(&Block, bool) + Send + Sync>;

fn announce_interval(network: NetworkId) -> Duration {
    match network {
        NetworkId::Test => Duration::from_millis(500),
        _ => Duration::from_secs(16),
    }
}

fn keepalive_period(network: NetworkId) -> Duration {
    match network {
        NetworkId::Test => Duration::from_secs(1),
        _ => Duration::from_secs(60),
    }
}

fn peer_cutoff(network: NetworkId) -> Duration {
    keepalive_period(network) * 5
}

fn rep_crawl_period(network: NetworkId) -> Duration {
    match network {
        NetworkId::Test => Duration::from_secs(1),
        _ => Duration::from_secs(5),
    }
}

fn gap_bootstrap_delay(network: NetworkId) -> Duration {
    match network {
        NetworkId::Test => Duration::from_millis(5),
        _ => Duration::from_secs(5),
    }
}

/// One participant in the gossip network.
pub struct Node {
    pub config: NodeConfig,
    pub store: Arc<Store>,
    pub ledger: Arc<Ledger>,
    pub genesis: Genesis,
    pub peers: Arc<PeerContainer>,
    pub active: Mutex<ActiveTransactions>,
    pub gap_cache: Arc<Mutex<GapCache>>,
    pub rep_crawler: RepCrawler,
    pub block_arrival: Arc<BlockArrival>,
    pub block_processor: Arc<BlockProcessor>,
    pub vote_processor: VoteProcessor,
    pub udp: Arc<UdpChannel>,
    pub alarm: Alarm,
    pub work: Arc<WorkPool>,
    pub bootstrap: Arc<dyn BootstrapInitiator>,
    pub local_reps: LocalRepSet,
    confirmation_observer: Mutex<Option<ConfirmationObserver>>,
    processor_thread: Mutex<Option<std::thread::JoinHandle<()>>>,
    runtime: Handle,
    http: reqwest::Client,
    rng: Mutex<StdRng>,
    warmed_up: AtomicU32,
    stopped: AtomicBool,
}

struct Inbound {
    node: Weak<Node>,
}

impl InboundHandler for Inbound {
    fn receive(&self, message: Message, sender: Endpoint) {
        if let Some(node) = self.node.upgrade() {
            node.receive(message, sender);
        }
    }
}

impl Node {
    /// Construct a node: open the store, write genesis on first boot, bind
    /// the socket. Fails here abort startup.
    pub async fn new(
        config: NodeConfig,
        bootstrap: Arc<dyn BootstrapInitiator>,
    ) -> Result<Arc<Self>, NodeError> {
        let inactive_supply = config.inactive_supply_raw()?;
        let local_reps = LocalRepSet::from_seeds(&config.representative_seeds)?;
        let network = config.network;

        let store = Arc::new(Store::new());
        let ledger = Arc::new(Ledger::new(Genesis::AMOUNT, inactive_supply));
        let genesis = Genesis::for_network(network);
        {
            let mut txn = store.write();
            if txn.accounts_empty() {
                genesis.initialize(&mut txn);
            }
        }

        let udp = UdpChannel::bind(network, config.peering_port).await?;
        let self_endpoint = udp.local_endpoint()?;
        let peers = Arc::new(PeerContainer::new(self_endpoint, network, rand::random()));
        let work = WorkPool::new(config.work_threads.max(1));

        let node = Arc::new(Self {
            store: store.clone(),
            ledger: ledger.clone(),
            genesis,
            peers,
            active: Mutex::new(ActiveTransactions::new()),
            gap_cache: Arc::new(Mutex::new(GapCache::new(
                config.bootstrap_fraction_numerator as u128,
            ))),
            rep_crawler: RepCrawler::new(),
            block_arrival: Arc::new(BlockArrival::new()),
            block_processor: Arc::new(BlockProcessor::new()),
            vote_processor: VoteProcessor::new(store, ledger),
            udp,
            alarm: Alarm::new(Handle::current()),
            work,
            bootstrap,
            local_reps,
            confirmation_observer: Mutex::new(None),
            processor_thread: Mutex::new(None),
            runtime: Handle::current(),
            http: reqwest::Client::new(),
            rng: Mutex::new(StdRng::from_entropy()),
            warmed_up: AtomicU32::new(0),
            stopped: AtomicBool::new(false),
            config,
        });

        // A new peer gets a keepalive and a representative probe.
        let weak = Arc::downgrade(&node);
        node.peers.set_peer_observer(Box::new(move |endpoint| {
            if let Some(node) = weak.upgrade() {
                node.send_keepalive(endpoint);
                node.rep_query(vec![endpoint]);
            }
        }));
        let weak = Arc::downgrade(&node);
        node.peers.set_disconnect_observer(Box::new(move || {
            if let Some(node) = weak.upgrade() {
                debug!(node = %node.endpoint(), "all peers gone silent");
            }
        }));

        info!(network = network.as_str(), endpoint = %node.endpoint(), "node starting");
        Ok(node)
    }

    /// Spawn the processor thread and the receive loop; schedule the
    /// periodic work.
    pub fn start(self: &Arc<Self>) {
        let ctx = self.processor_context();
        let processor = self.block_processor.clone();
        let thread = std::thread::Builder::new()
            .name("blck_proc".to_string())
            .spawn(move || processor.run(&ctx))
            .expect("spawning a named thread only fails on OOM");
        *self
            .processor_thread
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(thread);

        let handler = Arc::new(Inbound {
            node: Arc::downgrade(self),
        });
        self.runtime.spawn(self.udp.clone().run(handler));

        self.ongoing_keepalive();
        self.ongoing_rep_crawl();
        self.ongoing_bootstrap();
        self.ongoing_announcements();
    }

    /// Idempotent shutdown: stop components, join threads.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("node stopping");
        self.block_processor.stop();
        if let Some(thread) = self
            .processor_thread
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            let _ = thread.join();
        }
        self.active.lock().unwrap_or_else(|e| e.into_inner()).stop();
        self.udp.stop();
        self.work.stop();
        self.bootstrap.stop();
        self.alarm.stop();
    }

    pub fn endpoint(&self) -> Endpoint {
        self.udp
            .local_endpoint()
            .unwrap_or(Endpoint::UNSPECIFIED)
    }

    /// Install the confirmation observer. Called once while wiring.
    pub fn set_confirmation_observer(&self, observer: ConfirmationObserver) {
        *self
            .confirmation_observer
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(observer);
    }

    // ── Inbound messages ────────────────────────────────────────────────

    fn receive(self: &Arc<Self>, message: Message, sender: Endpoint) {
        match message {
            Message::Keepalive(endpoints) => {
                debug!(%sender, "keepalive received");
                self.peers.contacted(sender, PROTOCOL_VERSION);
                self.merge_peers(&endpoints);
            }
            Message::Publish(block) => {
                debug!(%sender, block = %block.hash(), "publish received");
                self.peers.contacted(sender, PROTOCOL_VERSION);
                self.process_active(block);
            }
            Message::ConfirmReq(block) => {
                debug!(%sender, block = %block.hash(), "confirm_req received");
                self.peers.contacted(sender, PROTOCOL_VERSION);
                let exists = {
                    let txn = self.store.read();
                    txn.block_exists(&block.hash())
                };
                self.process_active(block.clone());
                if exists {
                    self.confirm_block_to(&block, &[sender]);
                }
            }
            Message::ConfirmAck(vote) => {
                debug!(
                    %sender,
                    block = %vote.block.hash(),
                    sequence = vote.sequence,
                    "confirm_ack received"
                );
                self.peers.contacted(sender, PROTOCOL_VERSION);
                self.process_active(vote.block.clone());
                let result = self.vote_processor.vote(&vote);
                match result.code {
                    VoteCode::Vote | VoteCode::Vote2 => self.observe_vote(&vote, sender),
                    VoteCode::Replay => {
                        // Replaying our newer vote heals peers with truncated
                        // sequence state. One message in, at most one out, so
                        // this cannot amplify.
                        if result.vote.sequence.saturating_sub(vote.sequence) > REPLAY_ECHO_GAP {
                            self.udp.send(&Message::ConfirmAck(result.vote), sender);
                        }
                    }
                    VoteCode::Invalid => {}
                }
            }
        }
    }

    /// Reach out to endpoints learned from a keepalive.
    fn merge_peers(&self, endpoints: &[Endpoint; KEEPALIVE_PEERS]) {
        for endpoint in endpoints {
            if !endpoint.is_unspecified() && !self.peers.reachout(endpoint) {
                self.send_keepalive(*endpoint);
            }
        }
    }

    /// Queue a network-arrived block for processing.
    pub fn process_active(&self, block: Block) {
        self.block_arrival.add(block.hash());
        self.block_processor.add(block, false);
    }

    /// Fan a validated vote out to the election, the gap cache, and
    /// representative discovery.
    fn observe_vote(self: &Arc<Self>, vote: &Vote, sender: Endpoint) {
        let outcome = {
            let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
            let txn = self.store.read();
            active.vote(&self.ledger, &txn, vote)
        };
        if outcome.republish {
            self.flood_vote(vote.clone());
        }
        if let Some(confirmation) = outcome.confirmation {
            self.handle_confirmation(confirmation);
        }

        let trigger = {
            let txn = self.store.read();
            self.gap_cache
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .vote(&self.ledger, &txn, vote)
        };
        if let Some(hash) = trigger {
            self.schedule_gap_bootstrap(hash);
        }

        if self.rep_crawler.exists(&vote.block.hash()) {
            // A valid non-replay vote for a block we probed: the sender is
            // a representative.
            let weight = {
                let txn = self.store.read();
                self.ledger.weight(&txn, &vote.account)
            };
            if self.peers.rep_response(&sender, weight) {
                info!(peer = %sender, "found a representative");
            }
        }
    }

    // ── Elections ───────────────────────────────────────────────────────

    fn handle_confirmation(&self, confirmation: Confirmation) {
        if let Some(force) = confirmation.force {
            self.block_processor.add(force, true);
        }
        info!(winner = %confirmation.winner.hash(), "election confirmed");
        if let Some(observer) = &*self
            .confirmation_observer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
        {
            observer(&confirmation.winner, confirmation.exceeded_min_threshold);
        }
    }

    /// Broadcast our decision for one root: a signed confirm_ack when this
    /// node represents weight, a plain publish otherwise.
    fn republish_block(self: &Arc<Self>, block: &Block) {
        let targets = self.peers.list_fanout();
        if !self.confirm_block_to(block, &targets) {
            for target in &targets {
                self.udp.send(&Message::Publish(block.clone()), *target);
            }
            debug!(block = %block.hash(), peers = targets.len(), "block republished");
        }
    }

    /// Send this node's representative votes for `block` to `targets`.
    /// Returns `false` when the node holds no voting keys.
    fn confirm_block_to(&self, block: &Block, targets: &[Endpoint]) -> bool {
        if !self.config.enable_voting || self.local_reps.is_empty() {
            return false;
        }
        let votes: Vec<Vote> = {
            let mut txn = self.store.write();
            self.local_reps
                .iter()
                .flat_map(|rep| {
                    let (legacy, current) = self.ledger.vote_generate(
                        &mut txn,
                        &rep.public,
                        &rep.private,
                        block.clone(),
                    );
                    [legacy, current]
                })
                .collect()
        };
        for vote in votes {
            let message = Message::ConfirmAck(vote);
            for target in targets {
                self.udp.send(&message, *target);
            }
        }
        true
    }

    /// Flood a vote we decided is worth relaying.
    fn flood_vote(&self, vote: Vote) {
        let message = Message::ConfirmAck(vote);
        for target in self.peers.list_fanout() {
            self.udp.send(&message, target);
        }
    }

    /// Cast our own representative votes into a fresh election.
    fn vote_locally(&self, block: &Block) {
        if !self.config.enable_voting || self.local_reps.is_empty() {
            return;
        }
        let votes: Vec<Vote> = {
            let mut txn = self.store.write();
            self.local_reps
                .iter()
                .map(|rep| {
                    self.ledger
                        .vote_generate(&mut txn, &rep.public, &rep.private, block.clone())
                        .1
                })
                .collect()
        };
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        for vote in votes {
            active.vote_local(&vote);
        }
    }

    // ── Periodic loops ──────────────────────────────────────────────────

    fn ongoing_announcements(self: &Arc<Self>) {
        let outcome = {
            let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
            let txn = self.store.read();
            active.announce_tick(&self.ledger, &txn)
        };
        for confirmation in outcome.confirmations {
            self.handle_confirmation(confirmation);
        }
        for block in &outcome.broadcasts {
            self.republish_block(block);
        }
        if outcome.bootstrap_needed {
            self.bootstrap.bootstrap();
        }
        let weak = Arc::downgrade(self);
        self.alarm.add(
            Instant::now() + announce_interval(self.config.network),
            move || {
                if let Some(node) = weak.upgrade() {
                    node.ongoing_announcements();
                }
            },
        );
    }

    fn ongoing_keepalive(self: &Arc<Self>) {
        for host in &self.config.preconfigured_peers {
            self.keepalive_host(host.clone());
        }
        let network = self.config.network;
        self.peers.purge_list(Instant::now() - peer_cutoff(network));
        for endpoint in self.peers.keepalive_candidates(keepalive_period(network)) {
            self.send_keepalive(endpoint);
        }
        let weak = Arc::downgrade(self);
        self.alarm
            .add(Instant::now() + keepalive_period(network), move || {
                if let Some(node) = weak.upgrade() {
                    node.ongoing_keepalive();
                }
            });
    }

    fn ongoing_rep_crawl(self: &Arc<Self>) {
        self.rep_query(self.peers.rep_crawl());
        let weak = Arc::downgrade(self);
        self.alarm.add(
            Instant::now() + rep_crawl_period(self.config.network),
            move || {
                if let Some(node) = weak.upgrade() {
                    node.ongoing_rep_crawl();
                }
            },
        );
    }

    fn ongoing_bootstrap(self: &Arc<Self>) {
        let mut next_wakeup = Duration::from_secs(300);
        if self.warmed_up.load(Ordering::SeqCst) < 3 {
            // Bootstrap more aggressively until the peer table fills in.
            next_wakeup = Duration::from_secs(5);
            if !self.bootstrap.in_progress() && !self.peers.empty() {
                self.warmed_up.fetch_add(1, Ordering::SeqCst);
            }
        }
        self.bootstrap.bootstrap();
        let weak = Arc::downgrade(self);
        self.alarm.add(Instant::now() + next_wakeup, move || {
            if let Some(node) = weak.upgrade() {
                node.ongoing_bootstrap();
            }
        });
    }

    // ── Outbound helpers ────────────────────────────────────────────────

    /// Keepalive one endpoint, carrying eight random peers.
    pub fn send_keepalive(&self, endpoint: Endpoint) {
        let mut slots = [Endpoint::UNSPECIFIED; KEEPALIVE_PEERS];
        self.peers.random_fill(&mut slots);
        self.udp.send(&Message::Keepalive(slots), endpoint);
    }

    /// Resolve a "host:port" string and keepalive every address found.
    fn keepalive_host(self: &Arc<Self>, host: String) {
        if let Ok(endpoint) = host.parse::<Endpoint>() {
            self.send_keepalive(endpoint);
            return;
        }
        let weak = Arc::downgrade(self);
        self.runtime.spawn(async move {
            match tokio::net::lookup_host(&host).await {
                Ok(addresses) => {
                    if let Some(node) = weak.upgrade() {
                        for address in addresses {
                            node.send_keepalive(Endpoint::from_socket_addr(address));
                        }
                    }
                }
                Err(error) => {
                    warn!(%host, %error, "error resolving preconfigured peer");
                }
            }
        });
    }

    /// Probe `targets` with a confirm_req for a random stored block; votes
    /// coming back inside the window identify representatives.
    fn rep_query(self: &Arc<Self>, targets: Vec<Endpoint>) {
        if targets.is_empty() {
            return;
        }
        let block = {
            let txn = self.store.read();
            let sample = self.rng.lock().unwrap_or_else(|e| e.into_inner()).gen();
            txn.block_sample(sample).cloned()
        };
        let Some(block) = block else {
            return;
        };
        let hash = block.hash();
        self.rep_crawler.add(hash);
        for target in &targets {
            self.peers.rep_request(target);
            self.udp.send(&Message::ConfirmReq(block.clone()), *target);
        }
        let weak = Arc::downgrade(self);
        self.alarm
            .add(Instant::now() + Duration::from_secs(5), move || {
                if let Some(node) = weak.upgrade() {
                    node.rep_crawler.remove(&hash);
                }
            });
    }

    /// After the gap-cache threshold fires, give the block a grace period
    /// to arrive normally before synchronizing.
    fn schedule_gap_bootstrap(self: &Arc<Self>, hash: BlockHash) {
        let weak = Arc::downgrade(self);
        self.alarm.add(
            Instant::now() + gap_bootstrap_delay(self.config.network),
            move || {
                let Some(node) = weak.upgrade() else {
                    return;
                };
                let exists = {
                    let txn = node.store.read();
                    txn.block_exists(&hash)
                };
                if !exists {
                    if !node.bootstrap.in_progress() {
                        info!(block = %hash, "missing confirmed block");
                    }
                    node.bootstrap.bootstrap();
                }
            },
        );
    }

    /// Distributed proof-of-work for `root`: configured work peers race the
    /// local pool, first valid nonce wins.
    pub async fn generate_work(&self, root: BlockHash) -> Option<u64> {
        let peers: Vec<WorkPeer> = self
            .config
            .work_peers
            .iter()
            .filter_map(|entry| {
                let (address, port) = entry.rsplit_once(':')?;
                Some(WorkPeer {
                    address: address.to_string(),
                    port: port.parse().ok()?,
                })
            })
            .collect();
        raze_work::distributed_work(
            &self.http,
            &peers,
            self.work.clone(),
            root,
            self.config.network.work_threshold(),
        )
        .await
    }

    fn processor_context(self: &Arc<Self>) -> ProcessorContext {
        let weak = Arc::downgrade(self);
        ProcessorContext {
            store: self.store.clone(),
            ledger: self.ledger.clone(),
            block_arrival: self.block_arrival.clone(),
            gap_cache: self.gap_cache.clone(),
            bootstrap: self.bootstrap.clone(),
            progress_observer: Box::new(move |block, result| {
                if let Some(node) = weak.upgrade() {
                    node.on_progress(block, result);
                }
            }),
        }
    }

    /// Runs after every applied block, outside the write transaction.
    fn on_progress(self: &Arc<Self>, block: &Block, result: &ProcessReturn) {
        if !self.block_arrival.recent(&block.hash()) {
            // Bootstrap traffic: no election, no callback.
            return;
        }
        let started = {
            let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
            !active.start(block)
        };
        if started {
            self.vote_locally(block);
        }
        if self.config.callback_enabled() {
            let callback = CallbackTarget {
                address: self.config.callback_address.clone(),
                port: self.config.callback_port,
                target: self.config.callback_target.clone(),
            };
            self.runtime.spawn(post_confirmation(
                self.http.clone(),
                callback,
                block.clone(),
                result.account,
                result.amount,
            ));
        }
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        self.stop();
    }
}
