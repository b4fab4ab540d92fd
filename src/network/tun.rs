use crate::core::error::{TunnelError, TunnelResult};
use crate::network::channel::{DuplexPacketChannel, ReadOutcome};
use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;
use ipnetwork::IpNetwork;
use log::{debug, info};
use rtnetlink::Handle;
use tokio::io::unix::AsyncFd;
use tun_tap::{Iface, Mode};

/// TUNデバイスを非同期に読み書きするチャネル
pub struct TunChannel {
    iface: AsyncFd<Iface>,
    buffer: Vec<u8>,
    closed: bool,
}

impl TunChannel {
    pub fn open(name: &str, buffer_size: usize) -> TunnelResult<Self> {
        // パケット情報ヘッダーなしで開くと1回の読み込みがそのままIPデータグラムになる
        let iface = Iface::without_packet_info(name, Mode::Tun)?;
        iface.set_non_blocking()?;
        info!("TUNインターフェースを作成しました: {}", iface.name());

        Ok(Self {
            iface: AsyncFd::new(iface)?,
            buffer: vec![0u8; buffer_size],
            closed: false,
        })
    }

    pub fn name(&self) -> &str {
        self.iface.get_ref().name()
    }

    /// 開いたデバイスにアドレスを割り当ててリンクを上げる
    pub async fn configure(&self, address: IpNetwork) -> TunnelResult<()> {
        configure_interface(self.name(), address).await
    }
}

fn netlink_error(context: &str) -> impl FnOnce(rtnetlink::Error) -> TunnelError + '_ {
    move |e| TunnelError::VirtualInterface(format!("{}: {}", context, e))
}

async fn link_index(handle: &Handle, name: &str) -> TunnelResult<u32> {
    let mut links = handle.link().get().match_name(name.to_string()).execute();
    match links.try_next().await.map_err(netlink_error("リンク情報の取得に失敗"))? {
        Some(link) => Ok(link.header.index),
        None => Err(TunnelError::VirtualInterface(format!(
            "インターフェースが見つかりません: {}",
            name
        ))),
    }
}

/// 名前で指定したインターフェースをnetlink経由で設定する
pub async fn configure_interface(name: &str, address: IpNetwork) -> TunnelResult<()> {
    let (connection, handle, _) = rtnetlink::new_connection().map_err(|e| {
        TunnelError::VirtualInterface(format!("netlink接続の作成に失敗: {}", e))
    })?;
    let connection = tokio::spawn(connection);

    let result = async {
        let index = link_index(&handle, name).await?;
        handle
            .address()
            .add(index, address.ip(), address.prefix())
            .execute()
            .await
            .map_err(netlink_error("アドレスの設定に失敗"))?;
        handle
            .link()
            .set(index)
            .up()
            .execute()
            .await
            .map_err(netlink_error("リンクの有効化に失敗"))
    }
    .await;

    connection.abort();
    result?;
    info!("{}に{}を割り当てて有効化しました", name, address);
    Ok(())
}

#[async_trait]
impl DuplexPacketChannel for TunChannel {
    async fn read_packet(&mut self) -> TunnelResult<ReadOutcome> {
        if self.closed {
            return Ok(ReadOutcome::Closed);
        }

        loop {
            let mut guard = self.iface.readable().await?;
            let buffer = &mut self.buffer;

            match guard.try_io(|inner| inner.get_ref().recv(buffer)) {
                Ok(Ok(0)) => return Ok(ReadOutcome::Empty),
                Ok(Ok(len)) => {
                    return Ok(ReadOutcome::Packet(Bytes::copy_from_slice(&buffer[..len])))
                }
                Ok(Err(e)) => return Err(e.into()),
                Err(_would_block) => continue,
            }
        }
    }

    async fn write_packet(&mut self, packet: &[u8]) -> TunnelResult<()> {
        loop {
            let mut guard = self.iface.writable().await?;

            match guard.try_io(|inner| inner.get_ref().send(packet)) {
                Ok(result) => {
                    result?;
                    return Ok(());
                }
                Err(_would_block) => continue,
            }
        }
    }

    async fn close(&mut self) -> TunnelResult<()> {
        // デバイス自体はドロップ時に閉じられる
        debug!("TUNチャネルを閉じます: {}", self.name());
        self.closed = true;
        Ok(())
    }
}
