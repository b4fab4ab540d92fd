use crate::core::error::TunnelResult;
use async_trait::async_trait;
use bytes::Bytes;
use std::io;
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    Packet(Bytes),
    /// 今は読めるデータがない。しばらく待ってから再試行する。
    Empty,
    Closed,
}

/// IPデータグラムを1つずつ読み書きする双方向チャネル。
///
/// `read_packet`は停止シグナルと競合させて途中で破棄されることがあるため、
/// 破棄されてもデータを失わない実装でなければならない。
#[async_trait]
pub trait DuplexPacketChannel: Send {
    async fn read_packet(&mut self) -> TunnelResult<ReadOutcome>;
    async fn write_packet(&mut self, packet: &[u8]) -> TunnelResult<()>;
    async fn close(&mut self) -> TunnelResult<()>;
}

/// プロセス内で完結するチャネル。相手側は`MemoryChannelHandle`で操作する。
pub struct MemoryChannel {
    inbound: mpsc::UnboundedReceiver<ReadOutcome>,
    outbound: mpsc::UnboundedSender<Bytes>,
    closed: bool,
}

pub struct MemoryChannelHandle {
    inbound: mpsc::UnboundedSender<ReadOutcome>,
    outbound: mpsc::UnboundedReceiver<Bytes>,
}

impl MemoryChannel {
    pub fn pair() -> (MemoryChannel, MemoryChannelHandle) {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        (
            MemoryChannel {
                inbound: inbound_rx,
                outbound: outbound_tx,
                closed: false,
            },
            MemoryChannelHandle {
                inbound: inbound_tx,
                outbound: outbound_rx,
            },
        )
    }
}

#[async_trait]
impl DuplexPacketChannel for MemoryChannel {
    async fn read_packet(&mut self) -> TunnelResult<ReadOutcome> {
        if self.closed {
            return Ok(ReadOutcome::Closed);
        }
        // 送信側が全て破棄されたらチャネルは閉じている
        Ok(self.inbound.recv().await.unwrap_or(ReadOutcome::Closed))
    }

    async fn write_packet(&mut self, packet: &[u8]) -> TunnelResult<()> {
        self.outbound
            .send(Bytes::copy_from_slice(packet))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "受信側が閉じられています"))?;
        Ok(())
    }

    async fn close(&mut self) -> TunnelResult<()> {
        self.closed = true;
        self.inbound.close();
        Ok(())
    }
}

impl MemoryChannelHandle {
    pub fn inject(&self, packet: impl Into<Bytes>) -> bool {
        self.inbound.send(ReadOutcome::Packet(packet.into())).is_ok()
    }

    pub fn inject_empty(&self) -> bool {
        self.inbound.send(ReadOutcome::Empty).is_ok()
    }

    pub fn inject_closed(&self) -> bool {
        self.inbound.send(ReadOutcome::Closed).is_ok()
    }

    pub async fn next_written(&mut self) -> Option<Bytes> {
        self.outbound.recv().await
    }

    pub fn try_written(&mut self) -> Option<Bytes> {
        self.outbound.try_recv().ok()
    }

    /// 書き込み側を閉じる。以降の`write_packet`はエラーになる。
    pub fn close_written(&mut self) {
        self.outbound.close();
    }
}
