use crate::core::stats::{PumpStats, StatsSnapshot};
use crate::network::channel::{DuplexPacketChannel, ReadOutcome};
use crate::security::blocklist::Blocklist;
use crate::security::flow::FlowPolicy;
use crate::security::policy::{DecisionPolicy, Verdict};
use bytes::Bytes;
use log::{debug, error, info, trace};
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{sleep, Duration};

pub const DEFAULT_READ_BACKOFF: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpState {
    Running,
    Stopping,
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// 停止シグナルを受け取った
    Cancelled,
    ChannelClosed,
    Failed(String),
}

#[derive(Debug, Clone, Copy)]
pub struct PumpOptions {
    pub read_backoff: Duration,
    pub flow_policy: FlowPolicy,
}

impl Default for PumpOptions {
    fn default() -> Self {
        Self {
            read_backoff: DEFAULT_READ_BACKOFF,
            flow_policy: FlowPolicy::default(),
        }
    }
}

/// 停止したポンプの結果。チャネルは呼び出し側に返される。
pub struct PumpExit {
    pub reason: StopReason,
    pub stats: StatsSnapshot,
    pub channel: Box<dyn DuplexPacketChannel>,
}

impl fmt::Debug for PumpExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PumpExit")
            .field("reason", &self.reason)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

/// 実行中のポンプを外から操作するためのハンドル
#[derive(Debug)]
pub struct PumpControl {
    stop: watch::Sender<bool>,
    state: watch::Receiver<PumpState>,
}

impl PumpControl {
    pub fn stop(&self) {
        self.stop.send_replace(true);
    }

    pub fn state(&self) -> PumpState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<PumpState> {
        self.state.clone()
    }
}

/// チャネルからパケットを1つずつ読み、判定に従って書き戻すか破棄する。
pub struct PacketPump {
    channel: Box<dyn DuplexPacketChannel>,
    policy: DecisionPolicy,
    stats: Arc<PumpStats>,
    read_backoff: Duration,
    state: watch::Sender<PumpState>,
    stop: watch::Receiver<bool>,
}

impl PacketPump {
    pub fn new(
        channel: Box<dyn DuplexPacketChannel>,
        blocklist: Blocklist,
        stats: Arc<PumpStats>,
        options: PumpOptions,
    ) -> (Self, PumpControl) {
        let (stop_tx, stop_rx) = watch::channel(false);
        let (state_tx, state_rx) = watch::channel(PumpState::Running);

        let pump = Self {
            channel,
            policy: DecisionPolicy::new(blocklist, options.flow_policy),
            stats,
            read_backoff: options.read_backoff,
            state: state_tx,
            stop: stop_rx,
        };
        let control = PumpControl {
            stop: stop_tx,
            state: state_rx,
        };
        (pump, control)
    }

    pub async fn run(mut self) -> PumpExit {
        info!("パケットポンプを開始します");

        let reason = self.pump().await;
        self.state.send_replace(PumpState::Stopping);

        let blocked_flows = self.policy.flows().len();
        self.policy.flows_mut().clear();
        debug!("フローテーブルを消去しました: {}件", blocked_flows);

        let stats = self.stats.snapshot();
        info!("パケットポンプを停止しました ({:?}): {}", reason, stats);
        self.state.send_replace(PumpState::Stopped);

        PumpExit {
            reason,
            stats,
            channel: self.channel,
        }
    }

    async fn pump(&mut self) -> StopReason {
        loop {
            let outcome = tokio::select! {
                biased;
                _ = stop_requested(&mut self.stop) => return StopReason::Cancelled,
                outcome = self.channel.read_packet() => outcome,
            };

            match outcome {
                Ok(ReadOutcome::Packet(packet)) => {
                    if let Err(e) = self.handle_packet(packet).await {
                        error!("パケットの書き込みに失敗しました: {}", e);
                        return StopReason::Failed(e.to_string());
                    }
                }
                Ok(ReadOutcome::Empty) => {
                    self.stats.record_empty_read();
                    trace!("読み込むパケットがありません");
                    tokio::select! {
                        biased;
                        _ = stop_requested(&mut self.stop) => return StopReason::Cancelled,
                        _ = sleep(self.read_backoff) => {}
                    }
                }
                Ok(ReadOutcome::Closed) => {
                    info!("チャネルが閉じられました");
                    return StopReason::ChannelClosed;
                }
                Err(e) => {
                    error!("パケットの読み込みに失敗しました: {}", e);
                    return StopReason::Failed(e.to_string());
                }
            }
        }
    }

    async fn handle_packet(&mut self, packet: Bytes) -> crate::core::error::TunnelResult<()> {
        self.stats.record_read();

        let decision = self.policy.evaluate(&packet);
        self.stats.record_decision(&decision);

        match decision.verdict() {
            Verdict::Forward => self.channel.write_packet(&packet).await,
            Verdict::Drop => Ok(()),
        }
    }
}

// 送信側が破棄された場合は停止要求が来ないものとして待ち続ける
async fn stop_requested(stop: &mut watch::Receiver<bool>) {
    let requested = stop.wait_for(|stop| *stop).await.is_ok();
    if !requested {
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::channel::MemoryChannel;

    fn dns_packet(name: &str) -> Vec<u8> {
        let mut query = vec![0xab, 0xcd, 0x01, 0x00, 0x00, 0x01, 0, 0, 0, 0, 0, 0];
        for label in name.split('.') {
            query.push(label.len() as u8);
            query.extend_from_slice(label.as_bytes());
        }
        query.extend_from_slice(&[0, 0, 1, 0, 1]);

        let mut udp = Vec::new();
        udp.extend_from_slice(&5353u16.to_be_bytes());
        udp.extend_from_slice(&53u16.to_be_bytes());
        udp.extend_from_slice(&((8 + query.len()) as u16).to_be_bytes());
        udp.extend_from_slice(&[0, 0]);
        udp.extend_from_slice(&query);

        let mut packet = vec![0x45, 0, 0, 0, 0, 0, 0, 0, 64, 17, 0, 0, 10, 0, 0, 2, 9, 9, 9, 9];
        let total = (20 + udp.len()) as u16;
        packet[2..4].copy_from_slice(&total.to_be_bytes());
        packet.extend_from_slice(&udp);
        packet
    }

    fn spawn_pump(
        channel: MemoryChannel,
        options: PumpOptions,
    ) -> (tokio::task::JoinHandle<PumpExit>, PumpControl, Arc<PumpStats>) {
        let stats = Arc::new(PumpStats::new());
        let (pump, control) = PacketPump::new(Box::new(channel), Blocklist::new(), stats.clone(), options);
        (tokio::spawn(pump.run()), control, stats)
    }

    #[tokio::test]
    async fn forwards_allowed_and_drops_blocked() {
        let (channel, mut handle) = MemoryChannel::pair();
        let (task, _control, _stats) = spawn_pump(channel, PumpOptions::default());

        let allowed = dns_packet("wikipedia.org");
        handle.inject(dns_packet("youtube.com"));
        handle.inject(allowed.clone());
        handle.inject_closed();

        let exit = task.await.unwrap();
        assert_eq!(exit.reason, StopReason::ChannelClosed);
        assert_eq!(exit.stats.packets_read, 2);
        assert_eq!(exit.stats.dns_blocked, 1);
        assert_eq!(handle.try_written().as_deref(), Some(allowed.as_slice()));
        assert_eq!(handle.try_written(), None);
    }

    #[tokio::test]
    async fn stop_unblocks_pending_read() {
        let (channel, handle) = MemoryChannel::pair();
        let (task, control, _stats) = spawn_pump(channel, PumpOptions::default());
        let mut state = control.subscribe();

        tokio::task::yield_now().await;
        assert_eq!(control.state(), PumpState::Running);

        control.stop();
        let exit = task.await.unwrap();
        assert_eq!(exit.reason, StopReason::Cancelled);
        assert_eq!(*state.borrow_and_update(), PumpState::Stopped);
        drop(handle);
    }

    #[tokio::test]
    async fn stop_interrupts_backoff() {
        let (channel, handle) = MemoryChannel::pair();
        let options = PumpOptions {
            read_backoff: Duration::from_secs(3600),
            ..PumpOptions::default()
        };
        let (task, control, stats) = spawn_pump(channel, options);

        handle.inject_empty();
        while stats.snapshot().empty_reads == 0 {
            tokio::task::yield_now().await;
        }

        control.stop();
        let exit = tokio::time::timeout(Duration::from_secs(5), task).await.unwrap().unwrap();
        assert_eq!(exit.reason, StopReason::Cancelled);
    }

    #[tokio::test]
    async fn write_failure_stops_pump() {
        let (channel, mut handle) = MemoryChannel::pair();
        let (task, _control, _stats) = spawn_pump(channel, PumpOptions::default());

        handle.close_written();
        handle.inject(dns_packet("wikipedia.org"));

        let exit = task.await.unwrap();
        assert!(matches!(exit.reason, StopReason::Failed(_)));
        assert_eq!(exit.stats.packets_read, 1);
    }

    #[tokio::test]
    async fn flows_are_cleared_and_channel_returned() {
        let (channel, mut handle) = MemoryChannel::pair();
        let (task, control, stats) = spawn_pump(channel, PumpOptions::default());

        handle.inject(dns_packet("facebook.com"));
        handle.inject_empty();
        while stats.snapshot().empty_reads == 0 {
            tokio::task::yield_now().await;
        }
        control.stop();

        let mut exit = task.await.unwrap();
        assert_eq!(exit.reason, StopReason::Cancelled);
        assert_eq!(exit.stats.dns_blocked, 1);

        exit.channel.write_packet(b"still usable").await.unwrap();
        assert_eq!(handle.next_written().await.as_deref(), Some(&b"still usable"[..]));
    }
}
