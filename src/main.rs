use log::{error, info, warn};
use std::sync::Arc;
use tun_domain_filter::core::tunnel::{PumpState, StopReason};
use tun_domain_filter::network::TunChannel;
use tun_domain_filter::setup_logger::setup_logger;
use tun_domain_filter::storage::JsonFileStore;
use tun_domain_filter::{Blocklist, Configuration, FilterService, TunnelResult};

#[tokio::main]
async fn main() -> TunnelResult<()> {
    let config = Configuration::from_env()?;
    setup_logger(&config.logging)?;
    info!("設定を読み込みました: {:?}", config);

    let channel = TunChannel::open(&config.network.tun_name, config.network.buffer_size)?;
    if config.network.configure_interface {
        channel.configure(config.network.tun_address).await?;
    }

    let blocklist = match &config.filter.blocklist_path {
        Some(path) => Blocklist::with_store(Arc::new(JsonFileStore::new(path))),
        None => Blocklist::new(),
    };

    let mut service = FilterService::new(blocklist, config.pump_options());
    service.start(channel)?;

    if let Some(mut state) = service.subscribe_state() {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    warn!("シグナルの待機に失敗しました: {}", e);
                }
                info!("終了シグナルを受信しました");
            }
            _ = state.wait_for(|state| *state == PumpState::Stopped) => {
                warn!("パケットポンプが停止しました");
            }
        }
    }

    if let Some(mut exit) = service.stop().await {
        if let Err(e) = exit.channel.close().await {
            warn!("チャネルを閉じられませんでした: {}", e);
        }
        if let StopReason::Failed(reason) = &exit.reason {
            error!("パケットポンプが異常終了しました: {}", reason);
        }
        info!("統計: {}", exit.stats);
    }

    Ok(())
}
