//! フィルターの制御面
//!
//! ブロックリストの編集とパケットポンプの起動・停止をまとめて扱う。
//! ブロックリストの編集はポンプの状態に関係なくいつでも行え、実行中のポンプには
//! 次に読み込むパケットから反映される。

use crate::core::error::{TunnelError, TunnelResult};
use crate::core::stats::{PumpStats, StatsSnapshot};
use crate::core::tunnel::{PacketPump, PumpControl, PumpExit, PumpOptions, PumpState};
use crate::network::channel::DuplexPacketChannel;
use crate::security::blocklist::Blocklist;
use log::{error, info, warn};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

struct RunningPump {
    control: PumpControl,
    task: JoinHandle<PumpExit>,
}

pub struct FilterService {
    blocklist: Blocklist,
    options: PumpOptions,
    stats: Arc<PumpStats>,
    running: Option<RunningPump>,
}

impl FilterService {
    pub fn new(blocklist: Blocklist, options: PumpOptions) -> Self {
        Self {
            blocklist,
            options,
            stats: Arc::new(PumpStats::new()),
            running: None,
        }
    }

    pub fn add_domain(&self, domain: &str) -> bool {
        self.blocklist.add(domain)
    }

    pub fn remove_domain(&self, domain: &str) -> bool {
        self.blocklist.remove(domain)
    }

    pub fn reset_domains(&self) {
        self.blocklist.reset();
    }

    /// ポンプを新しいタスクで起動する。tokioランタイム上で呼び出すこと。
    pub fn start<C>(&mut self, channel: C) -> TunnelResult<()>
    where
        C: DuplexPacketChannel + 'static,
    {
        if let Some(running) = &self.running {
            if running.control.state() != PumpState::Stopped {
                return Err(TunnelError::AlreadyRunning);
            }
            warn!("前回のポンプの結果は回収されずに破棄されます");
        }

        let (pump, control) = PacketPump::new(
            Box::new(channel),
            self.blocklist.clone(),
            Arc::clone(&self.stats),
            self.options,
        );
        let task = tokio::spawn(pump.run());
        self.running = Some(RunningPump { control, task });

        info!("フィルターを開始しました (ブロック対象: {}件)", self.blocklist.len());
        Ok(())
    }

    /// ポンプに停止を要求し、終了するまで待つ。実行中でなければ`None`。
    pub async fn stop(&mut self) -> Option<PumpExit> {
        let running = self.running.take()?;
        running.control.stop();

        match running.task.await {
            Ok(exit) => Some(exit),
            Err(e) => {
                error!("パケットポンプのタスクが異常終了しました: {}", e);
                None
            }
        }
    }

    pub fn state(&self) -> PumpState {
        self.running
            .as_ref()
            .map(|running| running.control.state())
            .unwrap_or(PumpState::Stopped)
    }

    pub fn is_active(&self) -> bool {
        self.state() == PumpState::Running
    }

    pub fn subscribe_state(&self) -> Option<watch::Receiver<PumpState>> {
        self.running.as_ref().map(|running| running.control.subscribe())
    }

    /// 起動以降の累積値
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn blocklist(&self) -> &Blocklist {
        &self.blocklist
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tunnel::StopReason;
    use crate::network::channel::MemoryChannel;

    #[tokio::test]
    async fn stop_when_idle_returns_none() {
        let mut service = FilterService::new(Blocklist::new(), PumpOptions::default());
        assert!(service.stop().await.is_none());
        assert_eq!(service.state(), PumpState::Stopped);
        assert!(!service.is_active());
    }

    #[tokio::test]
    async fn second_start_is_rejected_while_running() {
        let mut service = FilterService::new(Blocklist::new(), PumpOptions::default());
        let (first, _first_handle) = MemoryChannel::pair();
        let (second, _second_handle) = MemoryChannel::pair();

        service.start(first).unwrap();
        assert!(service.is_active());
        assert!(matches!(service.start(second), Err(TunnelError::AlreadyRunning)));

        let exit = service.stop().await.unwrap();
        assert_eq!(exit.reason, StopReason::Cancelled);
        assert!(!service.is_active());
    }

    #[tokio::test]
    async fn can_restart_after_channel_closes() {
        let mut service = FilterService::new(Blocklist::new(), PumpOptions::default());
        let (first, first_handle) = MemoryChannel::pair();
        service.start(first).unwrap();

        let mut state = service.subscribe_state().unwrap();
        drop(first_handle);
        state.wait_for(|state| *state == PumpState::Stopped).await.unwrap();

        let (second, _second_handle) = MemoryChannel::pair();
        service.start(second).unwrap();
        assert!(service.is_active());
        service.stop().await.unwrap();
    }

    #[test]
    fn domain_operations_work_without_a_runtime() {
        let service = FilterService::new(Blocklist::from_domains(Vec::<String>::new()), PumpOptions::default());

        assert!(service.add_domain("Wikipedia.org"));
        assert!(service.blocklist().contains("en.wikipedia.org"));
        assert!(service.remove_domain("wikipedia.org"));
        assert!(!service.remove_domain("wikipedia.org"));

        service.reset_domains();
        assert_eq!(service.blocklist().len(), 3);
    }
}
