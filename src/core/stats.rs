use crate::security::policy::{Decision, DropReason};
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// パケットポンプの統計カウンター。制御側からロックなしで読める。
#[derive(Debug, Default)]
pub struct PumpStats {
    packets_read: AtomicU64,
    empty_reads: AtomicU64,
    forwarded: AtomicU64,
    unparsed: AtomicU64,
    dns_blocked: AtomicU64,
    tls_blocked: AtomicU64,
    http_blocked: AtomicU64,
    flow_blocked: AtomicU64,
}

impl PumpStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_read(&self) {
        self.packets_read.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_empty_read(&self) {
        self.empty_reads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_decision(&self, decision: &Decision) {
        let counter = match decision {
            Decision::Forward => &self.forwarded,
            Decision::Unparsed(_) => {
                self.unparsed.fetch_add(1, Ordering::Relaxed);
                &self.forwarded
            }
            Decision::Drop(DropReason::StickyFlow) => &self.flow_blocked,
            Decision::Drop(DropReason::Dns(_)) => &self.dns_blocked,
            Decision::Drop(DropReason::Tls(_)) => &self.tls_blocked,
            Decision::Drop(DropReason::Http(_)) => &self.http_blocked,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            packets_read: self.packets_read.load(Ordering::Relaxed),
            empty_reads: self.empty_reads.load(Ordering::Relaxed),
            forwarded: self.forwarded.load(Ordering::Relaxed),
            unparsed: self.unparsed.load(Ordering::Relaxed),
            dns_blocked: self.dns_blocked.load(Ordering::Relaxed),
            tls_blocked: self.tls_blocked.load(Ordering::Relaxed),
            http_blocked: self.http_blocked.load(Ordering::Relaxed),
            flow_blocked: self.flow_blocked.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub packets_read: u64,
    pub empty_reads: u64,
    pub forwarded: u64,
    /// 解析できずにそのまま転送したパケット数 (forwardedに含まれる)
    pub unparsed: u64,
    pub dns_blocked: u64,
    pub tls_blocked: u64,
    pub http_blocked: u64,
    pub flow_blocked: u64,
}

impl StatsSnapshot {
    pub fn dropped(&self) -> u64 {
        self.dns_blocked + self.tls_blocked + self.http_blocked + self.flow_blocked
    }
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "読み込み: {}, 転送: {} (解析不能: {}), 破棄: {} (DNS: {}, TLS: {}, HTTP: {}, フロー: {})",
            self.packets_read,
            self.forwarded,
            self.unparsed,
            self.dropped(),
            self.dns_blocked,
            self.tls_blocked,
            self.http_blocked,
            self.flow_blocked
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::packet::PacketError;

    #[test]
    fn decisions_are_counted_by_reason() {
        let stats = PumpStats::new();
        stats.record_read();
        stats.record_read();
        stats.record_read();
        stats.record_decision(&Decision::Forward);
        stats.record_decision(&Decision::Unparsed(PacketError::Malformed("test")));
        stats.record_decision(&Decision::Drop(DropReason::Dns("youtube.com".to_string())));
        stats.record_decision(&Decision::Drop(DropReason::StickyFlow));

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.packets_read, 3);
        assert_eq!(snapshot.forwarded, 2);
        assert_eq!(snapshot.unparsed, 1);
        assert_eq!(snapshot.dns_blocked, 1);
        assert_eq!(snapshot.flow_blocked, 1);
        assert_eq!(snapshot.dropped(), 2);
    }

    #[test]
    fn snapshot_serializes_to_json() {
        let stats = PumpStats::new();
        stats.record_decision(&Decision::Drop(DropReason::Tls("a.test".to_string())));

        let json = serde_json::to_value(stats.snapshot()).unwrap();
        assert_eq!(json["tls_blocked"], 1);
        assert_eq!(json["forwarded"], 0);
    }
}
