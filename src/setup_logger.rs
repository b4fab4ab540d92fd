use crate::core::config::LoggingConfig;
use crate::core::error::{TunnelError, TunnelResult};
use env_logger::{Builder, Target};
use log::LevelFilter;
use std::fs::File;
use std::io::Write;
use std::str::FromStr;

pub fn setup_logger(config: &LoggingConfig) -> TunnelResult<()> {
    let level = LevelFilter::from_str(&config.level)
        .map_err(|_| TunnelError::Logger(format!("不明なログレベルです: {}", config.level)))?;

    let mut builder = Builder::new();
    builder
        .filter_level(level)
        // RUST_LOGが設定されていればそちらを優先する
        .parse_default_env()
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] {} - {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.target(),
                record.args()
            )
        });

    match &config.file {
        Some(path) => {
            let file = File::create(path).map_err(|e| {
                TunnelError::Logger(format!("ログファイルを作成できません ({}): {}", path.display(), e))
            })?;
            builder.target(Target::Pipe(Box::new(file)));
        }
        None => {
            builder.target(Target::Stdout);
        }
    }

    builder
        .try_init()
        .map_err(|e| TunnelError::Logger(e.to_string()))
}
