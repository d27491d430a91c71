use anyhow::Result;
use kengine::{Engine, EngineConfig};
use tracing::error;
use tracing_subscriber::FmtSubscriber;

fn main() -> Result<()> {
    let config = EngineConfig::default();
    let subscriber = FmtSubscriber::builder()
        .with_max_level(config.log_level)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut engine = Engine::new(config);
    let result = engine.init().and_then(|_| engine.run());
    engine.cleanup();
    if let Err(e) = &result {
        error!("{e:#}");
    }
    result
}
