//! The node coordinator.
//!
//! Wires the block and vote pipelines, the elections engine, the peer set,
//! and the UDP overlay together; hosts the maintenance timers and the
//! observer fan-out. Scheduled tasks hold a `Weak` back-reference and no-op
//! once the node is torn down.

use crate::alarm::Alarm;
use crate::block_arrival::BlockArrival;
use crate::block_processor::{BlockItem, BlockProcessor};
use crate::config::NodeConfig;
use crate::error::NodeError;
use crate::gap_cache::GapCache;
use crate::network::Network;
use crate::observers::{BlockEvent, Observers, VoteEvent};
use crate::stats::{Direction, StatDetail, StatType, Stats};
use crate::vote_processor::{VoteCode, VoteProcessor};
use chratos_consensus::{
    ActiveElections, AnnounceAction, AnnounceContext, OnlineReps, PeerRep, RepCrawler,
    TallyContext, ANNOUNCE_INTERVAL_MS,
};
use chratos_crypto::generate_keypair;
use chratos_ledger::{
    Block, BootstrapInitiator, Ledger, ProcessOutcome, Store, Vote, Wallets, MAX_VOTE_BLOCKS,
};
use chratos_messages::{
    HandshakePayload, Message, MessageHeader, ParseError, KEEPALIVE_PEERS, NODE_ID_VERSION,
    PROTOCOL_VERSION_MIN,
};
use chratos_types::{Account, Amount, BlockHash, Endpoint, KeyPair, Timestamp};
use std::net::{Ipv6Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::UnboundedReceiver;

/// Peers quiet for longer than this are purged.
const PEER_CUTOFF_MS: u64 = 5 * 60 * 1000;
/// Cadence of the keepalive/purge round.
const PERIOD_MS: u64 = 60 * 1000;
/// SYN cookies older than this are purged.
const SYN_COOKIE_CUTOFF_MS: u64 = 5 * 1000;
/// Cadence of the online-stake rebuild.
const STAKE_RECALC_MS: u64 = 5 * 60 * 1000;
/// Forks younger than this are dropped rather than escalated, so
/// freshly-minted forks don't spam bootstrap.
const FORK_ESCALATION_AGE_MS: u64 = 15 * 1000;
/// How long a rep-crawl query hash stays active.
const REP_QUERY_TTL_MS: u64 = 5 * 1000;
/// Peers probed per rep-crawl round.
const REP_CRAWL_PEERS: usize = 8;

/// The consensus and propagation core of a Chratos node.
pub struct Node {
    pub config: NodeConfig,
    pub stats: Arc<Stats>,
    pub ledger: Arc<dyn Ledger>,
    pub store: Arc<dyn Store>,
    pub bootstrap: Arc<dyn BootstrapInitiator>,
    pub wallets: Arc<dyn Wallets>,
    pub peers: Mutex<chratos_network::PeerSet>,
    pub syn_cookies: Mutex<chratos_network::SynCookieTable>,
    pub active: Mutex<ActiveElections>,
    pub online_reps: Mutex<OnlineReps>,
    pub rep_crawler: Mutex<RepCrawler>,
    pub gap_cache: Mutex<GapCache>,
    pub block_arrival: Mutex<BlockArrival>,
    pub block_processor: Arc<BlockProcessor>,
    pub vote_processor: Arc<VoteProcessor>,
    pub network: Arc<Network>,
    pub alarm: Arc<Alarm>,
    pub observers: Arc<Observers>,
    /// This node's transport identity, used in handshakes.
    pub node_id: KeyPair,
    stopped: AtomicBool,
    threads: Mutex<Vec<JoinHandle<()>>>,
    runtime: Mutex<Option<tokio::runtime::Runtime>>,
    outbound_rx: Mutex<Option<UnboundedReceiver<(Endpoint, Vec<u8>)>>>,
}

impl Node {
    pub fn new(
        config: NodeConfig,
        ledger: Arc<dyn Ledger>,
        store: Arc<dyn Store>,
        bootstrap: Arc<dyn BootstrapInitiator>,
        wallets: Arc<dyn Wallets>,
    ) -> Arc<Self> {
        let stats = Arc::new(Stats::new());
        let (network, outbound_rx) = Network::new(stats.clone());
        let self_endpoint = Endpoint::new(Ipv6Addr::UNSPECIFIED, config.peering_port);
        let work_threshold = config.network.work_threshold();
        let node_id = generate_keypair();

        let node = Arc::new(Self {
            peers: Mutex::new(chratos_network::PeerSet::new(
                self_endpoint,
                PROTOCOL_VERSION_MIN,
                NODE_ID_VERSION,
            )),
            syn_cookies: Mutex::new(chratos_network::SynCookieTable::new()),
            active: Mutex::new(ActiveElections::new()),
            online_reps: Mutex::new(OnlineReps::new(
                OnlineReps::DEFAULT_CUTOFF_MS,
                Amount::new(config.online_weight_minimum),
            )),
            rep_crawler: Mutex::new(RepCrawler::new()),
            gap_cache: Mutex::new(GapCache::new()),
            block_arrival: Mutex::new(BlockArrival::new()),
            block_processor: Arc::new(BlockProcessor::new(work_threshold)),
            vote_processor: Arc::new(VoteProcessor::new()),
            network,
            alarm: Alarm::new(),
            observers: Arc::new(Observers::new()),
            node_id,
            stats,
            ledger,
            store,
            bootstrap,
            wallets,
            config,
            stopped: AtomicBool::new(false),
            threads: Mutex::new(Vec::new()),
            runtime: Mutex::new(None),
            outbound_rx: Mutex::new(Some(outbound_rx)),
        });
        node.wire_observers();
        tracing::info!(
            node_id = %chratos_crypto::encode_address(&Account::from(node.node_id.public)),
            "node starting"
        );
        node
    }

    /// Take the outbound datagram queue; `start()` hands it to the socket
    /// drain task, tests capture it directly.
    pub fn take_outbound(&self) -> Option<UnboundedReceiver<(Endpoint, Vec<u8>)>> {
        self.outbound_rx.lock().unwrap().take()
    }

    pub fn stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    fn weight_of(&self) -> impl Fn(&Account) -> Amount + '_ {
        move |account| self.ledger.weight(account)
    }

    fn online_stake(&self) -> Amount {
        self.online_reps.lock().unwrap().online_stake()
    }

    /// The quorum delta: the margin the leading tally must clear.
    pub fn delta(&self) -> Amount {
        Amount::new(self.online_stake().raw() / 100 * self.config.online_weight_quorum as u128)
    }

    // ── Observer wiring ─────────────────────────────────────────────────

    fn wire_observers(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        self.observers.votes.add(move |event: &VoteEvent| {
            if let Some(node) = weak.upgrade() {
                node.on_processed_vote(&event.vote, event.endpoint);
            }
        });

        let weak = Arc::downgrade(self);
        self.observers.endpoints.add(move |endpoint: &Endpoint| {
            if let Some(node) = weak.upgrade() {
                let mut payload = [Endpoint::unspecified(); KEEPALIVE_PEERS];
                node.peers.lock().unwrap().random_fill(&mut payload);
                node.network.send_keepalive(*endpoint, payload);
                node.rep_query(*endpoint);
            }
        });
    }

    /// Everything that happens to a fresh (non-replay) vote after election
    /// routing: gap-cache accumulation, online-weight tracking, and
    /// representative discovery.
    fn on_processed_vote(self: &Arc<Self>, vote: &Vote, endpoint: Endpoint) {
        let now = Timestamp::now();
        let weight_of = self.weight_of();

        // Gap cache: enough voting weight behind a missing block schedules a
        // bootstrap check.
        let threshold = GapCache::bootstrap_threshold(
            self.online_stake(),
            self.config.bootstrap_fraction_numerator,
        );
        let triggered = self.gap_cache.lock().unwrap().vote(
            vote.account,
            vote.hashes(),
            &weight_of,
            threshold,
        );
        for hash in triggered {
            let weak = Arc::downgrade(self);
            self.alarm.add(
                Instant::now() + Duration::from_millis(GapCache::BOOTSTRAP_CHECK_DELAY_MS),
                move || {
                    if let Some(node) = weak.upgrade() {
                        node.gap_bootstrap_check(hash);
                    }
                },
            );
        }

        self.online_reps.lock().unwrap().vote(vote.account, now, &weight_of);

        // Representative discovery: a valid vote covering a crawled hash
        // identifies the sender as a representative.
        let rep_weight = self.ledger.weight(&vote.account);
        let min_rep_weight = Amount::new(self.online_stake().raw() / 1000);
        if rep_weight > min_rep_weight {
            let crawled = {
                let crawler = self.rep_crawler.lock().unwrap();
                vote.hashes().any(|hash| crawler.exists(&hash))
            };
            if crawled {
                let newly_found = self.peers.lock().unwrap().rep_response(
                    &endpoint,
                    vote.account,
                    rep_weight,
                    now,
                );
                if newly_found {
                    tracing::info!(%endpoint, "found a representative");
                    // Bring the new representative up to speed on every
                    // active election.
                    let winners = self.active.lock().unwrap().list_blocks();
                    for winner in winners {
                        self.network.send_confirm_req(endpoint, winner);
                    }
                }
            }
        }
    }

    fn gap_bootstrap_check(&self, hash: BlockHash) {
        if self.ledger.block_exists(&hash) {
            return;
        }
        if !self.bootstrap.in_progress() {
            tracing::info!(block = %hash, "missing confirmed block, bootstrapping");
            self.bootstrap.bootstrap();
            self.stats
                .inc(StatType::Bootstrap, StatDetail::Initiated, Direction::Out);
        }
    }

    // ── Inbound dispatch ────────────────────────────────────────────────

    /// Parse and dispatch one received datagram.
    pub fn process_datagram(self: &Arc<Self>, buffer: &[u8], sender: SocketAddr) {
        let endpoint = Endpoint::from_socket_addr(sender);
        if self.peers.lock().unwrap().not_a_peer(
            &endpoint,
            self.config.network.blacklist_loopback(),
        ) {
            tracing::debug!(%endpoint, "dropping datagram from reserved sender");
            self.stats
                .inc(StatType::Error, StatDetail::BadSender, Direction::In);
            return;
        }
        self.stats.add(
            StatType::Traffic,
            StatDetail::All,
            Direction::In,
            buffer.len() as u64,
        );
        match Message::from_datagram(buffer, self.config.network.work_threshold()) {
            Ok((header, message)) => self.dispatch_message(endpoint, header, message),
            Err(error) => {
                let detail = match error {
                    ParseError::InsufficientWork => StatDetail::InsufficientWork,
                    _ => StatDetail::InvalidMessage,
                };
                tracing::debug!(%endpoint, %error, "datagram parse failed");
                self.stats.inc(StatType::Error, detail, Direction::In);
            }
        }
    }

    fn dispatch_message(self: &Arc<Self>, sender: Endpoint, header: MessageHeader, message: Message) {
        let now = Timestamp::now();
        match message {
            Message::Keepalive(peers) => {
                self.stats
                    .inc(StatType::Message, StatDetail::Keepalive, Direction::In);
                let handshake_needed = self
                    .peers
                    .lock()
                    .unwrap()
                    .contacted(sender, header.version_using, now);
                if handshake_needed {
                    let cookie = self.syn_cookies.lock().unwrap().assign(sender, now);
                    if let Some(cookie) = cookie {
                        self.network.send_node_id_handshake(sender, Some(cookie), None);
                    }
                }
                self.merge_peers(&peers);
            }
            Message::Publish(block) => {
                self.stats
                    .inc(StatType::Message, StatDetail::Publish, Direction::In);
                self.peers
                    .lock()
                    .unwrap()
                    .contacted(sender, header.version_using, now);
                self.process_active(block.clone());
                let online_stake = self.online_stake();
                self.active.lock().unwrap().publish(&block, online_stake);
            }
            Message::ConfirmReq(block) => {
                self.stats
                    .inc(StatType::Message, StatDetail::ConfirmReq, Direction::In);
                self.peers
                    .lock()
                    .unwrap()
                    .contacted(sender, header.version_using, now);
                self.process_active(block.clone());
                let online_stake = self.online_stake();
                self.active.lock().unwrap().publish(&block, online_stake);
                // Answer with our winner for this position, signed by every
                // local representative.
                if let Some(successor) = self.ledger.successor(&block.root()) {
                    self.confirm_block(sender, &successor);
                }
            }
            Message::ConfirmAck(vote) => {
                self.stats
                    .inc(StatType::Message, StatDetail::ConfirmAck, Direction::In);
                self.peers
                    .lock()
                    .unwrap()
                    .contacted(sender, header.version_using, now);
                let online_stake = self.online_stake();
                for block in vote.blocks.iter().filter_map(|item| item.as_block()) {
                    self.process_active(block.clone());
                    self.active.lock().unwrap().publish(block, online_stake);
                }
                self.vote_processor.vote(vote, sender);
            }
            Message::NodeIdHandshake(payload) => {
                self.stats
                    .inc(StatType::Message, StatDetail::NodeIdHandshake, Direction::In);
                self.node_id_handshake(sender, header, payload);
            }
        }
    }

    fn node_id_handshake(self: &Arc<Self>, sender: Endpoint, header: MessageHeader, payload: HandshakePayload) {
        let mut validated = false;
        if let Some((node_id, signature)) = payload.response {
            let valid = self
                .syn_cookies
                .lock()
                .unwrap()
                .validate(&sender, node_id, &signature);
            if valid {
                validated = true;
                if node_id != Account::from(self.node_id.public) {
                    let inserted = self.peers.lock().unwrap().insert(
                        sender,
                        header.version_using,
                        Timestamp::now(),
                    );
                    if inserted == chratos_network::InsertResult::Inserted {
                        self.peers.lock().unwrap().set_node_id(&sender, node_id);
                        self.observers.endpoints.notify(&sender);
                    }
                }
            } else {
                tracing::debug!(%sender, "failed to validate SYN cookie signature");
                self.stats
                    .inc(StatType::Error, StatDetail::HandshakeFailed, Direction::In);
            }
        }

        let out_response = payload.query.map(|cookie| {
            let signature = chratos_crypto::sign_message(&cookie, &self.node_id.private);
            (Account::from(self.node_id.public), signature)
        });
        let out_query = if !validated && !self.peers.lock().unwrap().known_peer(&sender) {
            self.syn_cookies.lock().unwrap().assign(sender, Timestamp::now())
        } else {
            None
        };
        if out_query.is_some() || out_response.is_some() {
            self.network
                .send_node_id_handshake(sender, out_query, out_response);
        }
    }

    /// Keepalive gossip: reach out to announced peers we don't know yet.
    fn merge_peers(&self, peers: &[Endpoint; KEEPALIVE_PEERS]) {
        let now = Timestamp::now();
        for endpoint in peers {
            let skip = self.peers.lock().unwrap().reachout(*endpoint, now);
            if !skip {
                let mut payload = [Endpoint::unspecified(); KEEPALIVE_PEERS];
                self.peers.lock().unwrap().random_fill(&mut payload);
                self.network.send_keepalive(*endpoint, payload);
            }
        }
    }

    /// First-arrival gate: deduplicate by hash, then queue for processing.
    pub fn process_active(&self, block: Block) {
        let now = Timestamp::now();
        let already_seen = self.block_arrival.lock().unwrap().add(block.hash(), now);
        if !already_seen {
            self.block_processor.add(block, now);
        }
    }

    /// Generate and unicast confirm_acks for `block` from every local
    /// representative key.
    fn confirm_block(&self, target: Endpoint, block: &Block) {
        if !self.config.enable_voting {
            return;
        }
        let hash = block.hash();
        let store = self.store.clone();
        let network = self.network.clone();
        self.wallets.foreach_representative(&mut |account, key| {
            let vote = store.vote_generate(account, key, vec![hash]);
            network.send_confirm_ack(target, vote);
        });
    }

    // ── Block pipeline ──────────────────────────────────────────────────

    /// The worker-side dispatch for one queued block.
    pub fn dispatch_block(self: &Arc<Self>, item: BlockItem) {
        let block = &item.block;
        let hash = block.hash();
        if item.forced {
            if let Some(successor) = self.ledger.successor(&block.root()) {
                if successor.hash() != hash {
                    tracing::info!(
                        rolled_back = %successor.hash(),
                        winner = %hash,
                        "rolling back losing fork"
                    );
                    self.ledger.rollback(&successor.hash());
                }
            }
        }

        let outcome = self.ledger.process(block);
        match outcome {
            ProcessOutcome::Progress => {
                self.stats
                    .inc(StatType::Ledger, StatDetail::Progress, Direction::In);
                let recent = self
                    .block_arrival
                    .lock()
                    .unwrap()
                    .recent(&hash, Timestamp::now());
                if recent {
                    self.election_start(block.clone());
                }
                self.queue_unchecked(&hash);
            }
            ProcessOutcome::GapPrevious => {
                tracing::debug!(block = %hash, "gap previous");
                self.stats.inc(StatType::Ledger, StatDetail::Gap, Direction::In);
                self.store.unchecked_put(block.previous(), block);
                self.gap_cache
                    .lock()
                    .unwrap()
                    .add(block.previous(), Timestamp::now());
            }
            ProcessOutcome::GapSource => {
                tracing::debug!(block = %hash, "gap source");
                self.stats.inc(StatType::Ledger, StatDetail::Gap, Direction::In);
                let source = self.ledger.block_source(block);
                self.store.unchecked_put(source, block);
                self.gap_cache.lock().unwrap().add(source, Timestamp::now());
            }
            ProcessOutcome::Old => {
                self.stats.inc(StatType::Ledger, StatDetail::Old, Direction::In);
                // A duplicate arrival can still unblock queued descendants.
                self.queue_unchecked(&hash);
            }
            ProcessOutcome::IncorrectDividend => {
                tracing::debug!(block = %hash, "dividend must be claimed first");
                self.store.unchecked_put(block.dividend(), block);
            }
            ProcessOutcome::Fork => {
                self.stats.inc(StatType::Ledger, StatDetail::Fork, Direction::In);
                if Self::originated_long_ago(item.origination) {
                    self.process_fork(block);
                }
                tracing::debug!(block = %hash, root = %block.root(), "fork");
            }
            ProcessOutcome::DividendFork => {
                self.stats.inc(StatType::Ledger, StatDetail::Fork, Direction::In);
                if Self::originated_long_ago(item.origination) {
                    self.process_dividend_fork(block);
                }
            }
            ProcessOutcome::BadSignature
            | ProcessOutcome::NegativeSpend
            | ProcessOutcome::Unreceivable
            | ProcessOutcome::OpenedBurnAccount
            | ProcessOutcome::BalanceMismatch
            | ProcessOutcome::RepresentativeMismatch
            | ProcessOutcome::BlockPosition
            | ProcessOutcome::OutstandingPendings
            | ProcessOutcome::DividendTooSmall
            | ProcessOutcome::InvalidDividendAccount => {
                tracing::debug!(block = %hash, ?outcome, "block rejected");
                self.stats
                    .inc(StatType::Ledger, StatDetail::Rejected, Direction::In);
            }
        }
    }

    /// Re-queued unchecked blocks carry a zero origination so the fork path
    /// skips them.
    fn originated_long_ago(origination: Timestamp) -> bool {
        origination != Timestamp::EPOCH
            && origination.has_expired(FORK_ESCALATION_AGE_MS, Timestamp::now())
    }

    /// Drain blocks that were waiting for `hash` and re-queue them.
    fn queue_unchecked(&self, hash: &BlockHash) {
        for block in self.store.unchecked_get(hash) {
            self.store.unchecked_del(hash, &block.hash());
            self.block_processor.add(block, Timestamp::EPOCH);
        }
        self.gap_cache.lock().unwrap().erase(hash);
    }

    fn election_start(self: &Arc<Self>, block: Block) {
        let weak = Arc::downgrade(self);
        let result = self.active.lock().unwrap().start(
            block,
            Timestamp::now(),
            Box::new(move |winner| {
                if let Some(node) = weak.upgrade() {
                    node.process_confirmed(winner.clone());
                }
            }),
        );
        // An election already running for this root is fine.
        let _ = result;
    }

    /// A competing block for a position our ledger already filled: start a
    /// fork election between our block and the peer's.
    fn process_fork(self: &Arc<Self>, block: &Block) {
        let root = block.root();
        if self.ledger.block_exists(&block.hash()) || !self.ledger.root_exists(&root) {
            return;
        }
        let Some(ledger_block) = self.ledger.forked_block(block) else {
            return;
        };
        let weak = Arc::downgrade(self);
        let started = {
            let online_stake = self.online_stake();
            self.active.lock().unwrap().start_fork(
                ledger_block.clone(),
                block.clone(),
                online_stake,
                Timestamp::now(),
                Box::new(move |_winner| {
                    // Once resolved, have any running bootstrap re-pull the
                    // disputed chain so the loser is cleaned up everywhere.
                    if let Some(node) = weak.upgrade() {
                        if node.bootstrap.in_progress() {
                            match node.ledger.account(&root) {
                                Some(account) => node.bootstrap.requeue_pull(account, root),
                                None => node
                                    .bootstrap
                                    .requeue_pull(Account::new(*root.as_bytes()), BlockHash::ZERO),
                            }
                        }
                    }
                }),
            )
        };
        if started.is_ok() {
            tracing::info!(
                ours = %ledger_block.hash(),
                theirs = %block.hash(),
                root = %root,
                "resolving fork"
            );
            self.broadcast_confirm_req(ledger_block);
        }
    }

    /// Competing dividend declarations have no rollback path through the
    /// ledger oracle; record and drop.
    fn process_dividend_fork(&self, block: &Block) {
        tracing::warn!(block = %block.hash(), "dividend fork observed, not contested");
    }

    /// A block reached quorum: make sure it is in the ledger, then hand it
    /// to the wallet hooks and block observers.
    fn process_confirmed(self: &Arc<Self>, block: Block) {
        let hash = block.hash();
        if !self.ledger.block_exists(&hash) {
            self.block_processor.force(block.clone());
        }
        let amount = self.ledger.amount(&hash);
        let account = self.ledger.account(&hash).unwrap_or_else(|| block.account());
        let is_send = self.ledger.is_send(&block);
        match &block {
            Block::State(_) => {
                if is_send && amount >= Amount::new(self.config.receive_minimum) {
                    self.wallets
                        .receive_async(&block, block.representative(), amount);
                }
            }
            Block::Dividend(_) => {
                if amount >= Amount::new(self.config.dividend_minimum) {
                    self.wallets
                        .claim_dividend_async(&block, block.account(), block.representative());
                }
            }
            Block::Claim(_) => {}
        }
        self.observers.blocks.notify(&BlockEvent {
            block,
            account,
            amount,
            is_send,
        });
    }

    // ── Vote pipeline ───────────────────────────────────────────────────

    /// The worker-side dispatch for one queued vote.
    pub fn vote_blocking(self: &Arc<Self>, vote: Vote, endpoint: Endpoint) -> VoteCode {
        if !vote.validate() {
            self.stats
                .inc(StatType::Vote, StatDetail::VoteInvalid, Direction::In);
            return VoteCode::Invalid;
        }

        let max_vote = self.store.vote_max(&vote);
        let routing = {
            let online_stake = self.online_stake();
            let weight_of = self.weight_of();
            let ctx = TallyContext {
                online_stake,
                quorum_percent: self.config.online_weight_quorum,
                online_weight_minimum: Amount::new(self.config.online_weight_minimum),
                weight_of: &weight_of,
            };
            self.active.lock().unwrap().vote(&vote, Timestamp::now(), &ctx)
        };
        for winner in routing.winner_changes {
            self.block_processor.force(winner);
        }

        let code = if routing.replay || max_vote.sequence > vote.sequence {
            VoteCode::Replay
        } else {
            VoteCode::Vote
        };
        match code {
            VoteCode::Vote => {
                self.stats
                    .inc(StatType::Vote, StatDetail::VoteValid, Direction::In);
                self.observers.votes.notify(&VoteEvent {
                    vote: vote.clone(),
                    endpoint,
                });
            }
            VoteCode::Replay => {
                self.stats
                    .inc(StatType::Vote, StatDetail::VoteReplay, Direction::In);
            }
            VoteCode::Invalid => unreachable!("invalid votes return early"),
        }
        if routing.processed {
            let fanout = self.peers.lock().unwrap().list_fanout();
            self.network.republish_vote(&vote, &fanout);
        }

        // Replay our max vote back to reps that have lost track of their own
        // sequence. One reply per inbound message keeps this
        // amplification-safe, and the large margin tolerates reordering.
        if max_vote.sequence > vote.sequence.saturating_add(10_000) {
            self.network.send_confirm_ack(endpoint, max_vote);
        }

        tracing::trace!(
            account = %vote.account,
            sequence = vote.sequence,
            ?code,
            "vote processed"
        );
        code
    }

    // ── Announcements ───────────────────────────────────────────────────

    /// One announcement pass: tick the elections engine and execute the
    /// transmissions it asks for.
    pub fn announce(self: &Arc<Self>) {
        let representatives: Vec<PeerRep> = {
            let peers = self.peers.lock().unwrap();
            peers
                .representatives(usize::MAX)
                .into_iter()
                .map(|info| PeerRep {
                    endpoint: info.endpoint,
                    account: info.probable_rep_account,
                    weight: info.rep_weight,
                })
                .collect()
        };
        let summary = {
            let ledger = self.ledger.clone();
            let could_fit = move |block: &Block| ledger.could_fit(block);
            let ctx = AnnounceContext {
                representatives,
                online_weight_minimum: Amount::new(self.config.online_weight_minimum),
                could_fit: &could_fit,
            };
            self.active.lock().unwrap().announce_tick(&ctx)
        };

        let mut winner_bundle: Vec<BlockHash> = Vec::new();
        for action in summary.actions {
            match action {
                AnnounceAction::BroadcastWinner(block) => {
                    let fanout = self.peers.lock().unwrap().list_fanout();
                    self.network.republish_block(&block, &fanout);
                    if self.config.enable_voting {
                        winner_bundle.push(block.hash());
                        if winner_bundle.len() >= MAX_VOTE_BLOCKS {
                            self.generate_rep_votes(std::mem::take(&mut winner_bundle));
                        }
                    }
                }
                AnnounceAction::SolicitRepresentatives { block, endpoints } => {
                    self.network
                        .broadcast_confirm_req(&self.alarm, block, endpoints);
                }
                AnnounceAction::SolicitAllPeers(block) => {
                    let endpoints = self.peers.lock().unwrap().list();
                    self.network
                        .broadcast_confirm_req(&self.alarm, block, endpoints);
                }
            }
        }
        if !winner_bundle.is_empty() {
            self.generate_rep_votes(winner_bundle);
        }
    }

    /// Sign a hash bundle with every local representative key and feed the
    /// votes through our own pipeline so they tally and propagate.
    fn generate_rep_votes(&self, hashes: Vec<BlockHash>) {
        let local = Endpoint::new(Ipv6Addr::LOCALHOST, self.config.peering_port);
        let store = self.store.clone();
        let vote_processor = self.vote_processor.clone();
        self.wallets.foreach_representative(&mut |account, key| {
            let vote = store.vote_generate(account, key, hashes.clone());
            vote_processor.vote(vote, local);
        });
    }

    /// Ask the network to confirm `block`, preferring known representatives
    /// and degrading to all peers while reachable voting weight is thin.
    pub fn broadcast_confirm_req(self: &Arc<Self>, block: Block) {
        let endpoints = {
            let mut peers = self.peers.lock().unwrap();
            let reps = peers.representatives(usize::MAX);
            let weight = peers.total_weight();
            if reps.is_empty() || weight < Amount::new(self.config.online_weight_minimum) {
                peers.list()
            } else {
                reps.into_iter().map(|info| info.endpoint).collect()
            }
        };
        self.network
            .broadcast_confirm_req(&self.alarm, block, endpoints);
    }

    // ── Representative crawling ─────────────────────────────────────────

    /// Probe an endpoint with a confirm_req for a random ledger block; its
    /// vote response will reveal whether it is a representative.
    fn rep_query(self: &Arc<Self>, endpoint: Endpoint) {
        let Some(block) = self.ledger.random_block() else {
            return;
        };
        let hash = block.hash();
        self.rep_crawler.lock().unwrap().add(hash);
        self.peers.lock().unwrap().rep_request(&endpoint, Timestamp::now());
        self.network.send_confirm_req(endpoint, block);

        let weak = Arc::downgrade(self);
        self.alarm.add(
            Instant::now() + Duration::from_millis(REP_QUERY_TTL_MS),
            move || {
                if let Some(node) = weak.upgrade() {
                    node.rep_crawler.lock().unwrap().remove(&hash);
                }
            },
        );
    }

    // ── Maintenance timers ──────────────────────────────────────────────

    fn ongoing_keepalive(self: &Arc<Self>) {
        if self.stopped() {
            return;
        }
        let cutoff = Timestamp::now().saturating_sub(PEER_CUTOFF_MS);
        let survivors = self.peers.lock().unwrap().purge(cutoff);
        if survivors.is_empty() && !self.config.preconfigured_peers.is_empty() {
            self.observers.disconnect.notify(&());
        }
        for info in survivors {
            let mut payload = [Endpoint::unspecified(); KEEPALIVE_PEERS];
            self.peers.lock().unwrap().random_fill(&mut payload);
            self.network.send_keepalive(info.endpoint, payload);
        }
        for target in &self.config.preconfigured_peers {
            self.keepalive_preconfigured(target);
        }

        let weak = Arc::downgrade(self);
        self.alarm
            .add(Instant::now() + Duration::from_millis(PERIOD_MS), move || {
                if let Some(node) = weak.upgrade() {
                    node.ongoing_keepalive();
                }
            });
    }

    fn keepalive_preconfigured(&self, target: &str) {
        use std::net::ToSocketAddrs;
        match target.to_socket_addrs() {
            Ok(addrs) => {
                for addr in addrs {
                    let endpoint = Endpoint::from_socket_addr(addr);
                    let mut payload = [Endpoint::unspecified(); KEEPALIVE_PEERS];
                    self.peers.lock().unwrap().random_fill(&mut payload);
                    self.network.send_keepalive(endpoint, payload);
                }
            }
            Err(error) => {
                tracing::warn!(%target, %error, "failed to resolve preconfigured peer");
            }
        }
    }

    fn ongoing_syn_cookie_cleanup(self: &Arc<Self>) {
        if self.stopped() {
            return;
        }
        let cutoff = Timestamp::now().saturating_sub(SYN_COOKIE_CUTOFF_MS);
        self.syn_cookies.lock().unwrap().purge(cutoff);

        let weak = Arc::downgrade(self);
        self.alarm.add(
            Instant::now() + Duration::from_millis(SYN_COOKIE_CUTOFF_MS * 2),
            move || {
                if let Some(node) = weak.upgrade() {
                    node.ongoing_syn_cookie_cleanup();
                }
            },
        );
    }

    fn ongoing_rep_calculation(self: &Arc<Self>) {
        if self.stopped() {
            return;
        }
        {
            let weight_of = self.weight_of();
            self.online_reps.lock().unwrap().recalculate_stake(&weight_of);
        }

        let weak = Arc::downgrade(self);
        self.alarm.add(
            Instant::now() + Duration::from_millis(STAKE_RECALC_MS),
            move || {
                if let Some(node) = weak.upgrade() {
                    node.ongoing_rep_calculation();
                }
            },
        );
    }

    fn ongoing_gap_purge(self: &Arc<Self>) {
        if self.stopped() {
            return;
        }
        self.gap_cache.lock().unwrap().purge_old(Timestamp::now());

        let weak = Arc::downgrade(self);
        self.alarm
            .add(Instant::now() + Duration::from_secs(10), move || {
                if let Some(node) = weak.upgrade() {
                    node.ongoing_gap_purge();
                }
            });
    }

    fn ongoing_rep_crawl(self: &Arc<Self>) {
        if self.stopped() {
            return;
        }
        let targets = self.peers.lock().unwrap().rep_crawl(REP_CRAWL_PEERS);
        for endpoint in targets {
            self.rep_query(endpoint);
        }

        let weak = Arc::downgrade(self);
        self.alarm
            .add(Instant::now() + Duration::from_secs(60), move || {
                if let Some(node) = weak.upgrade() {
                    node.ongoing_rep_crawl();
                }
            });
    }

    // ── Lifecycle ───────────────────────────────────────────────────────

    /// Bind the socket, spawn the workers, and arm the maintenance timers.
    pub fn start(self: &Arc<Self>) -> Result<(), NodeError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(self.config.io_threads.max(1))
            .thread_name("chratos-io")
            .enable_all()
            .build()?;

        let socket = {
            let _guard = runtime.enter();
            let bind = SocketAddr::new(Ipv6Addr::UNSPECIFIED.into(), self.config.peering_port);
            let std_socket = std::net::UdpSocket::bind(bind)?;
            std_socket.set_nonblocking(true)?;
            Arc::new(tokio::net::UdpSocket::from_std(std_socket)?)
        };
        tracing::info!(port = self.config.peering_port, "listening for datagrams");

        // Outbound drain: send completions are observed here.
        let mut outbound_rx = self
            .take_outbound()
            .ok_or_else(|| NodeError::Config("node already started".to_string()))?;
        let send_socket = socket.clone();
        let stats = self.stats.clone();
        runtime.spawn(async move {
            while let Some((endpoint, datagram)) = outbound_rx.recv().await {
                if let Err(error) = send_socket
                    .send_to(&datagram, endpoint.to_socket_addr())
                    .await
                {
                    tracing::debug!(%endpoint, %error, "datagram send failed");
                    stats.inc(StatType::Error, StatDetail::All, Direction::Out);
                }
            }
        });

        // Receive loop: one logical receiver, reissued per packet.
        let weak = Arc::downgrade(self);
        runtime.spawn(async move {
            // Large enough for a vote carrying twelve full blocks.
            let mut buffer = vec![0u8; 16 * 1024];
            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((size, sender)) => {
                        let Some(node) = weak.upgrade() else { break };
                        if node.stopped() {
                            break;
                        }
                        node.process_datagram(&buffer[..size], sender);
                    }
                    Err(error) => {
                        let Some(node) = weak.upgrade() else { break };
                        if node.stopped() {
                            break;
                        }
                        tracing::debug!(%error, "udp receive error");
                    }
                }
            }
        });
        *self.runtime.lock().unwrap() = Some(runtime);

        let mut threads = self.threads.lock().unwrap();

        // Block processor worker: the single ledger writer.
        let weak = Arc::downgrade(self);
        let processor = self.block_processor.clone();
        threads.push(
            std::thread::Builder::new()
                .name("block processing".to_string())
                .spawn(move || {
                    processor.run(|item| {
                        if let Some(node) = weak.upgrade() {
                            node.dispatch_block(item);
                        }
                    });
                })
                .expect("failed to spawn block processor thread"),
        );

        // Vote processor worker.
        let weak = Arc::downgrade(self);
        let processor = self.vote_processor.clone();
        threads.push(
            std::thread::Builder::new()
                .name("vote processing".to_string())
                .spawn(move || {
                    processor.run(|vote, endpoint| match weak.upgrade() {
                        Some(node) => node.vote_blocking(vote, endpoint),
                        None => VoteCode::Invalid,
                    });
                })
                .expect("failed to spawn vote processor thread"),
        );

        // Announcement loop.
        let weak = Arc::downgrade(self);
        threads.push(
            std::thread::Builder::new()
                .name("announcements".to_string())
                .spawn(move || loop {
                    let Some(node) = weak.upgrade() else { break };
                    if node.stopped() {
                        break;
                    }
                    node.announce();
                    drop(node);
                    std::thread::sleep(Duration::from_millis(ANNOUNCE_INTERVAL_MS));
                })
                .expect("failed to spawn announcement thread"),
        );
        drop(threads);

        self.ongoing_keepalive();
        self.ongoing_syn_cookie_cleanup();
        self.ongoing_rep_calculation();
        self.ongoing_gap_purge();
        self.ongoing_rep_crawl();
        Ok(())
    }

    /// Stop workers, cancel timers, and close the socket.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::info!("node stopping");
        self.alarm.stop();
        self.block_processor.stop();
        self.vote_processor.stop();
        let current = std::thread::current().id();
        for handle in self.threads.lock().unwrap().drain(..) {
            if handle.thread().id() != current {
                let _ = handle.join();
            }
        }
        if let Some(runtime) = self.runtime.lock().unwrap().take() {
            runtime.shutdown_background();
        }
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        self.stop();
    }
}
