use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// `RUST_LOG` があればそれを、なければ既定のフィルタでサブスクライバを登録する。
/// 二重に呼ばれても失敗しない。
pub fn init() {
    let result = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ecolearn_lib=debug,ecolearn_syncd=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();

    if result.is_ok() {
        tracing::info!("logging initialized");
    }
}
