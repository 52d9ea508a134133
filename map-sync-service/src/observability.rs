use tracing_subscriber::EnvFilter;

pub fn init_tracing() {
    let filter = EnvFilter::from_default_env()
        .add_directive(directive("map_sync_service=info"))
        .add_directive(directive("meter_client=info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn directive(s: &str) -> tracing_subscriber::filter::Directive {
    s.parse().unwrap_or_else(|_| tracing_subscriber::filter::LevelFilter::INFO.into())
}
