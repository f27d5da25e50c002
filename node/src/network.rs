//! Outbound message plumbing.
//!
//! [`Network`] serializes messages and places `(endpoint, datagram)` pairs
//! on an unbounded queue; the node's I/O runtime drains the queue onto the
//! UDP socket and observes send completions. Keeping senders queue-based
//! means no component ever blocks on the wire, and tests can capture the
//! exact outbound traffic by holding the receiver themselves.

use crate::alarm::Alarm;
use crate::stats::{Direction, StatDetail, StatType, Stats};
use chratos_ledger::{Block, Vote};
use chratos_messages::{HandshakePayload, Message, MessageKind, KEEPALIVE_PEERS};
use chratos_types::{Account, Endpoint, Signature};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// Representatives asked per confirm_req round.
const CONFIRM_REQ_REPS_PER_ROUND: usize = 10;
/// Spacing between confirm_req rounds.
const CONFIRM_REQ_SPACING: Duration = Duration::from_millis(50);

fn kind_detail(kind: MessageKind) -> StatDetail {
    match kind {
        MessageKind::Keepalive => StatDetail::Keepalive,
        MessageKind::Publish => StatDetail::Publish,
        MessageKind::ConfirmReq => StatDetail::ConfirmReq,
        MessageKind::ConfirmAck => StatDetail::ConfirmAck,
        MessageKind::NodeIdHandshake => StatDetail::NodeIdHandshake,
        _ => StatDetail::All,
    }
}

/// Queue-backed outbound sender.
pub struct Network {
    outbound_tx: mpsc::UnboundedSender<(Endpoint, Vec<u8>)>,
    stats: Arc<Stats>,
}

impl Network {
    /// Create the sender and hand back the queue's receiving end for the
    /// socket drain task (or a test harness).
    pub fn new(stats: Arc<Stats>) -> (Arc<Self>, mpsc::UnboundedReceiver<(Endpoint, Vec<u8>)>) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                outbound_tx,
                stats,
            }),
            outbound_rx,
        )
    }

    /// Serialize and queue one message.
    pub fn send(&self, endpoint: Endpoint, message: &Message) {
        let datagram = message.to_datagram();
        self.stats
            .inc(StatType::Message, kind_detail(message.kind()), Direction::Out);
        self.stats.add(
            StatType::Traffic,
            StatDetail::All,
            Direction::Out,
            datagram.len() as u64,
        );
        if self.outbound_tx.send((endpoint, datagram)).is_err() {
            tracing::debug!(%endpoint, "outbound queue closed, dropping message");
        }
    }

    pub fn send_keepalive(&self, endpoint: Endpoint, peers: [Endpoint; KEEPALIVE_PEERS]) {
        tracing::trace!(%endpoint, "keepalive sent");
        self.send(endpoint, &Message::Keepalive(peers));
    }

    pub fn send_node_id_handshake(
        &self,
        endpoint: Endpoint,
        query: Option<[u8; 32]>,
        response: Option<(Account, Signature)>,
    ) {
        self.send(
            endpoint,
            &Message::NodeIdHandshake(HandshakePayload { query, response }),
        );
    }

    pub fn send_publish(&self, endpoint: Endpoint, block: Block) {
        self.send(endpoint, &Message::Publish(block));
    }

    pub fn send_confirm_req(&self, endpoint: Endpoint, block: Block) {
        self.send(endpoint, &Message::ConfirmReq(block));
    }

    pub fn send_confirm_ack(&self, endpoint: Endpoint, vote: Vote) {
        self.send(endpoint, &Message::ConfirmAck(vote));
    }

    /// Publish a block to a fanout set.
    pub fn republish_block(&self, block: &Block, targets: &[Endpoint]) {
        for endpoint in targets {
            self.send_publish(*endpoint, block.clone());
        }
        tracing::debug!(block = %block.hash(), peers = targets.len(), "block republished");
    }

    /// Re-broadcast a processed vote to a fanout set.
    pub fn republish_vote(&self, vote: &Vote, targets: &[Endpoint]) {
        for endpoint in targets {
            self.send_confirm_ack(*endpoint, vote.clone());
        }
    }

    /// Send confirm_req to up to ten endpoints now and schedule the rest in
    /// 50 ms rounds through the alarm.
    pub fn broadcast_confirm_req(
        self: &Arc<Self>,
        alarm: &Arc<Alarm>,
        block: Block,
        mut endpoints: Vec<Endpoint>,
    ) {
        let round = endpoints.len().min(CONFIRM_REQ_REPS_PER_ROUND);
        tracing::debug!(
            block = %block.hash(),
            peers = round,
            remaining = endpoints.len().saturating_sub(round),
            "broadcasting confirm_req"
        );
        for endpoint in endpoints.drain(..round) {
            self.send_confirm_req(endpoint, block.clone());
        }
        if !endpoints.is_empty() {
            let network = Arc::downgrade(self);
            let alarm_weak = Arc::downgrade(alarm);
            alarm.add(Instant::now() + CONFIRM_REQ_SPACING, move || {
                if let (Some(network), Some(alarm)) = (network.upgrade(), alarm_weak.upgrade()) {
                    network.broadcast_confirm_req(&alarm, block, endpoints);
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chratos_ledger::StateBlock;
    use chratos_types::{Amount, BlockHash};
    use std::net::Ipv6Addr;

    fn endpoint(host: u16) -> Endpoint {
        Endpoint::new(Ipv6Addr::new(0x2001, 0xdb9, 0, 0, 0, 0, 0, host), 7075)
    }

    fn make_block() -> Block {
        let mut block = Block::State(StateBlock {
            account: Account::new([1; 32]),
            previous: BlockHash::ZERO,
            representative: Account::new([2; 32]),
            balance: Amount::new(10),
            link: BlockHash::ZERO,
            dividend: BlockHash::ZERO,
            work: 0,
            signature: Signature::ZERO,
            hash: BlockHash::ZERO,
        });
        block.compute_hash();
        block
    }

    #[test]
    fn send_queues_datagram_and_counts() {
        let stats = Arc::new(Stats::new());
        let (network, mut rx) = Network::new(stats.clone());
        network.send_publish(endpoint(1), make_block());

        let (target, datagram) = rx.try_recv().unwrap();
        assert_eq!(target, endpoint(1));
        assert!(!datagram.is_empty());
        assert_eq!(
            stats.count(StatType::Message, StatDetail::Publish, Direction::Out),
            1
        );
        assert!(stats.count(StatType::Traffic, StatDetail::All, Direction::Out) > 0);
    }

    #[test]
    fn republish_block_hits_every_target() {
        let stats = Arc::new(Stats::new());
        let (network, mut rx) = Network::new(stats);
        let targets = vec![endpoint(1), endpoint(2), endpoint(3)];
        network.republish_block(&make_block(), &targets);

        let mut received = Vec::new();
        while let Ok((target, _)) = rx.try_recv() {
            received.push(target);
        }
        assert_eq!(received, targets);
    }

    #[test]
    fn confirm_req_rounds_are_capped_and_spaced() {
        let stats = Arc::new(Stats::new());
        let (network, mut rx) = Network::new(stats);
        let alarm = Alarm::new();
        let endpoints: Vec<Endpoint> = (1..=25).map(endpoint).collect();

        network.broadcast_confirm_req(&alarm, make_block(), endpoints);

        // First round goes out immediately.
        let mut immediate = 0;
        while rx.try_recv().is_ok() {
            immediate += 1;
        }
        assert_eq!(immediate, 10);

        // Remaining rounds arrive via the alarm within a few spacings.
        std::thread::sleep(Duration::from_millis(300));
        let mut delayed = 0;
        while rx.try_recv().is_ok() {
            delayed += 1;
        }
        assert_eq!(delayed, 15);
        alarm.stop();
    }
}
