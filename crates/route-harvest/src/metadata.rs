/// Log the name and version of this build
pub fn log_version_info() {
    tracing::info!("{}", short_version_info());
    tracing::debug!(
        "Built for {} ({})",
        std::env::consts::ARCH,
        if cfg!(debug_assertions) { "debug" } else { "release" }
    );
}

pub fn short_version_info() -> String {
    format!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
}
