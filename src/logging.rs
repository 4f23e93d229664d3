use env_logger::{Builder, Env};

/// Honours `RUST_LOG`; defaults to info for this crate only.
pub fn init() {
    let mut builder = Builder::from_env(Env::default().default_filter_or("fingerpick=info"));
    builder.format_timestamp_millis();
    let _ = builder.try_init();
}
