use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

pub(crate) fn init_tracing(logging: bool) {
    let default_level = if logging {
        LevelFilter::INFO
    } else {
        LevelFilter::WARN
    };
    let env_filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}
