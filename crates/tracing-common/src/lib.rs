use anyhow::Context as _;
use tracing_subscriber::{
    layer::SubscriberExt as _, util::SubscriberInitExt as _, EnvFilter, Layer as _, Registry,
};
use tracing_tree::HierarchicalLayer;

/// Build the filter directive for a run.
///
/// An explicit `level` applies to every target in `targets` and keeps
/// everything else at `warn`. Without one, `RUST_LOG` is used, then plain
/// `warn`.
pub fn filter_directive(targets: &[&str], level: Option<&str>) -> String {
    match level {
        Some(level) => std::iter::once("warn".to_string())
            .chain(targets.iter().map(|target| format!("{target}={level}")))
            .collect::<Vec<_>>()
            .join(","),
        None => std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".to_string()),
    }
}

/// Sets up tracing for a command line tool.
///
/// Diagnostics always go to STDERR so STDOUT stays free for progress output.
///
/// # Environment Variables
///
/// - `RUST_LOG`: Log filter when no `level` is given (defaults to `warn`)
/// - `JSON_LOGS`: If set, outputs JSON logs instead of hierarchical
pub fn setup_tracing(targets: &[&str], level: Option<&str>) -> anyhow::Result<()> {
    let directive = filter_directive(targets, level);

    let env_filter = EnvFilter::builder()
        .parse(&directive)
        .with_context(|| format!("Couldn't create env filter from {directive}"))?;

    let stderr_layer = if std::env::var("JSON_LOGS").is_ok() {
        tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        HierarchicalLayer::default()
            .with_writer(std::io::stderr)
            .with_indent_lines(true)
            .with_indent_amount(2)
            .with_verbose_exit(true)
            .with_verbose_entry(true)
            .with_targets(true)
            .boxed()
    };

    Registry::default()
        .with(stderr_layer)
        .with(env_filter)
        .try_init()
        .context("Tracing was already initialized")?;

    Ok(())
}
