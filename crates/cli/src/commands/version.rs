use std::env;
use tracing::instrument;

#[instrument]
pub fn get_version_info() -> String {
    let version = env!("CARGO_PKG_VERSION");
    let name = env!("CARGO_PKG_NAME");
    let description = env!("CARGO_PKG_DESCRIPTION");

    tracing::debug!(
        package_name = name,
        package_version = version,
        "Gathering package information"
    );

    let target = env::var("TARGET").unwrap_or_else(|_| "unknown".to_string());

    format!(
        "{name} {version} - {description}\n\
        Target: {target}\n\
        Correlation ID: {}",
        crate::tracing::correlation_id()
    )
}
