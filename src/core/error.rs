use thiserror::Error;

#[derive(Error, Debug)]
pub enum TunnelError {
    #[error("設定エラー: {0}")]
    Config(String),

    #[error("チャネルI/Oエラー: {0}")]
    Channel(#[from] std::io::Error),

    #[error("ブロックリストストアのエラー: {0}")]
    Store(String),

    #[error("パケットポンプは既に実行中です")]
    AlreadyRunning,

    #[error("仮想インターフェースのエラー: {0}")]
    VirtualInterface(String),

    #[error("ロガーのセットアップに失敗しました: {0}")]
    Logger(String),
}

pub type TunnelResult<T> = Result<T, TunnelError>;
