use crate::cli::LogLevel;
use tracing::{Subscriber, subscriber::set_global_default};
use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt};

/// 標準エラー出力に書き出すサブスクライバを作成します。
///
/// `RUST_LOG` が設定されていればそれを、なければ `level` をフィルタに使います。
pub fn get_subscriber(level: LogLevel) -> impl Subscriber + Send + Sync {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    let fmt_layer = tracing_subscriber::fmt::Layer::new()
        .with_writer(std::io::stderr)
        .with_target(false);

    Registry::default().with(env_filter).with(fmt_layer)
}

pub fn init_subscriber(subscriber: impl Subscriber + Send + Sync) -> color_eyre::Result<()> {
    set_global_default(subscriber)?;
    Ok(())
}
