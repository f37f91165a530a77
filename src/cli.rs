use clap::{Parser, Subcommand, ValueEnum};
use std::fmt;
use std::path::PathBuf;

/// clapでコマンドラインの構造を定義します。
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Variational PINN loss pipeline for the anisotropic Poisson problem",
    long_about = None
)]
pub struct Cli {
    /// 設定ファイル（TOML）
    #[arg(short, long, default_value = "config/default.toml")]
    pub config: PathBuf,
    /// ログレベル（`RUST_LOG` が設定されていればそちらが優先されます）
    #[arg(value_enum, short, long, default_value_t = LogLevel::Info)]
    pub log_level: LogLevel,
    #[command(subcommand)]
    pub command: Commands,
}

/// 実行するサブコマンドを定義します（assemble または infer）。
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// メッシュから有限要素空間を組み立て、厳密解で損失を検算します
    Assemble,
    /// 保存済みのモデルを読み込み、テスト点で誤差を評価します
    Infer,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        };
        f.write_str(level)
    }
}
