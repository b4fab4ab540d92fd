use crate::network::packet::ParsedPacket;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::net::IpAddr;
use std::time::{Duration, Instant};

/// 送信元と宛先のアドレスの組で識別するフロー。
///
/// 向きを区別するため、応答方向のパケットは別のフローとして扱われる。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FlowKey {
    pub source: IpAddr,
    pub destination: IpAddr,
}

impl FlowKey {
    pub fn new(source: IpAddr, destination: IpAddr) -> Self {
        Self {
            source,
            destination,
        }
    }

    pub fn from_packet(packet: &ParsedPacket) -> Self {
        Self::new(packet.source, packet.destination)
    }
}

impl fmt::Display for FlowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.source, self.destination)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
    Blocked,
}

/// フローテーブルの保持方針。既定ではどちらも無制限。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlowPolicy {
    pub ttl: Option<Duration>,
    pub max_entries: Option<usize>,
}

#[derive(Debug, Clone, Copy)]
struct FlowEntry {
    state: FlowState,
    marked_at: Instant,
    seq: u64,
}

// 並び順の余分なエントリがこの数を超えたら詰め直す
const ORDER_SLACK: usize = 64;

#[derive(Debug, Default)]
pub struct FlowTracker {
    flows: HashMap<FlowKey, FlowEntry>,
    // 記録した順の(キー, 通し番号)。再記録や削除で古くなったものは読み飛ばす
    order: VecDeque<(FlowKey, u64)>,
    next_seq: u64,
    policy: FlowPolicy,
}

impl FlowTracker {
    pub fn new(policy: FlowPolicy) -> Self {
        Self {
            flows: HashMap::new(),
            order: VecDeque::new(),
            next_seq: 0,
            policy,
        }
    }

    pub fn policy(&self) -> FlowPolicy {
        self.policy
    }

    pub fn is_blocked(&mut self, key: &FlowKey) -> bool {
        self.state(key) == Some(FlowState::Blocked)
    }

    pub fn state(&mut self, key: &FlowKey) -> Option<FlowState> {
        let now = Instant::now();
        let entry = *self.flows.get(key)?;

        if self.is_expired(&entry, now) {
            self.flows.remove(key);
            return None;
        }
        Some(entry.state)
    }

    pub fn mark_blocked(&mut self, key: FlowKey) {
        let now = Instant::now();
        self.purge_expired(now);

        if !self.flows.contains_key(&key) {
            if let Some(max) = self.policy.max_entries {
                if max == 0 {
                    return;
                }
                while self.flows.len() >= max && self.evict_oldest() {}
            }
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.flows.insert(
            key,
            FlowEntry {
                state: FlowState::Blocked,
                marked_at: now,
                seq,
            },
        );
        self.order.push_back((key, seq));
        self.compact_order();
    }

    pub fn clear(&mut self) {
        self.flows.clear();
        self.order.clear();
    }

    pub fn len(&self) -> usize {
        self.flows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }

    fn is_expired(&self, entry: &FlowEntry, now: Instant) -> bool {
        match self.policy.ttl {
            Some(ttl) => now.duration_since(entry.marked_at) >= ttl,
            None => false,
        }
    }

    fn live_entry(&self, key: &FlowKey, seq: u64) -> Option<&FlowEntry> {
        self.flows.get(key).filter(|entry| entry.seq == seq)
    }

    // 生きているエントリは記録順に並ぶので、期限内のものに当たった時点で打ち切れる
    fn purge_expired(&mut self, now: Instant) {
        if self.policy.ttl.is_none() {
            return;
        }
        while let Some(&(key, seq)) = self.order.front() {
            if let Some(entry) = self.live_entry(&key, seq) {
                if !self.is_expired(entry, now) {
                    break;
                }
                self.flows.remove(&key);
            }
            self.order.pop_front();
        }
    }

    fn evict_oldest(&mut self) -> bool {
        while let Some((key, seq)) = self.order.pop_front() {
            if self.live_entry(&key, seq).is_some() {
                self.flows.remove(&key);
                return true;
            }
        }
        false
    }

    fn compact_order(&mut self) {
        if self.order.len() <= self.flows.len() * 2 + ORDER_SLACK {
            return;
        }
        let flows = &self.flows;
        self.order
            .retain(|(key, seq)| flows.get(key).is_some_and(|entry| entry.seq == *seq));
    }
}
