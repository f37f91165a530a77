//! # 変分PINN 前処理・評価プログラム
//!
//! 単位円板上の異方性 Poisson 方程式 `-∇·(ε ∇u) = f` について、
//! 有限要素空間の組み立てと学習済みモデルの評価を行います。
//!
//! ## 使い方
//!
//! ### 組み立てと厳密解による検算
//! ```bash
//! cargo run --release -- assemble
//! ```
//!
//! ### 推論
//! ```bash
//! cargo run --release -- --config config/default.toml infer
//! ```

use clap::Parser;
use vpinn::cli::{Cli, Commands};
use vpinn::config::RunConfig;
use vpinn::{inference, telemetry};

/// プログラムのエントリーポイント。
///
/// コマンドライン引数を解析し、`assemble`または`infer`の処理に振り分けます。
fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    telemetry::init_subscriber(telemetry::get_subscriber(cli.log_level))?;

    let config = RunConfig::load(&cli.config)?;
    tracing::debug!(?config, "設定を読み込みました");

    match &cli.command {
        Commands::Assemble => inference::run_assemble(&config),
        Commands::Infer => inference::run(&config),
    }
}
