use crate::inspector::{dns, http, tls};
use crate::network::packet::{PacketError, ParsedPacket, TransportProtocol};
use crate::security::blocklist::Blocklist;
use crate::security::flow::{FlowKey, FlowPolicy, FlowTracker};
use log::{debug, info, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Forward,
    Drop,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    /// 既にブロック済みのフローに属するTCPパケット
    StickyFlow,
    Dns(String),
    Tls(String),
    Http(String),
}

impl DropReason {
    pub fn host(&self) -> Option<&str> {
        match self {
            DropReason::StickyFlow => None,
            DropReason::Dns(host) | DropReason::Tls(host) | DropReason::Http(host) => Some(host),
        }
    }
}

/// 1パケットに対する判定結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Forward,
    /// 解析できなかったパケット。そのまま転送される。
    Unparsed(PacketError),
    Drop(DropReason),
}

impl Decision {
    pub fn verdict(&self) -> Verdict {
        match self {
            Decision::Forward | Decision::Unparsed(_) => Verdict::Forward,
            Decision::Drop(_) => Verdict::Drop,
        }
    }
}

/// ブロックリストとフローテーブルを組み合わせてパケットの転送可否を決める。
///
/// 解析や抽出に失敗したパケットは常に転送する。
pub struct DecisionPolicy {
    blocklist: Blocklist,
    flows: FlowTracker,
}

impl DecisionPolicy {
    pub fn new(blocklist: Blocklist, flow_policy: FlowPolicy) -> Self {
        Self {
            blocklist,
            flows: FlowTracker::new(flow_policy),
        }
    }

    pub fn decide(&mut self, packet: &[u8]) -> Verdict {
        self.evaluate(packet).verdict()
    }

    pub fn evaluate(&mut self, packet: &[u8]) -> Decision {
        match ParsedPacket::parse(packet) {
            Ok(parsed) => self.evaluate_parsed(&parsed, packet),
            Err(e) => {
                trace!("解析できないパケットをそのまま転送します: {}", e);
                Decision::Unparsed(e)
            }
        }
    }

    fn evaluate_parsed(&mut self, parsed: &ParsedPacket, packet: &[u8]) -> Decision {
        let key = FlowKey::from_packet(parsed);

        if parsed.transport == TransportProtocol::Tcp && self.flows.is_blocked(&key) {
            debug!("ブロック済みフローのパケットを破棄しました: {}", key);
            return Decision::Drop(DropReason::StickyFlow);
        }

        let payload = parsed.payload(packet);
        let reason = if parsed.is_udp_to(dns::PORT) {
            dns::extract(payload).map(DropReason::Dns)
        } else if parsed.is_tcp_to(http::PORT) {
            http::extract(payload).map(DropReason::Http)
        } else if parsed.is_tcp_to(tls::PORT) {
            tls::extract(payload).map(DropReason::Tls)
        } else {
            None
        };

        match reason {
            Some(reason) if reason.host().is_some_and(|host| self.blocklist.contains(host)) => {
                info!(
                    "ブロック対象のドメインへの通信を遮断しました: {:?} ({})",
                    reason, key
                );
                self.flows.mark_blocked(key);
                Decision::Drop(reason)
            }
            _ => Decision::Forward,
        }
    }

    pub fn blocklist(&self) -> &Blocklist {
        &self.blocklist
    }

    pub fn flows(&self) -> &FlowTracker {
        &self.flows
    }

    pub fn flows_mut(&mut self) -> &mut FlowTracker {
        &mut self.flows
    }
}
