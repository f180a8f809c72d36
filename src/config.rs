//! [`NodeConfig`]: node construction parameters.
//!
//! All configuration is constructor arguments; there is no config file or
//! environment variable beyond the `RUST_LOG`-style log filter `init_tracing`
//! reads.

/// The reserved `_zocp_version` value this crate advertises on startup.
pub const PROTOCOL_VERSION: &str = "1";

/// Header key/value advertised on join.
pub const HEADER_KEY: &str = "X-ZOCP";
/// Header value advertised alongside [`HEADER_KEY`] on join.
pub const HEADER_VALUE: &str = "1";

/// The well-known group every node joins on startup.
pub const DEFAULT_GROUP: &str = "ZOCP";

/// Builder for [`crate::node::Node`] construction.
///
/// Takes an optional pre-built substrate (a separate constructor argument,
/// since it's generic over [`crate::substrate::Substrate`] and not something
/// `NodeConfig` itself can own) and an optional initial capability mapping
/// via `initial`.
#[derive(Clone, Debug, Default)]
pub struct NodeConfig {
    pub(crate) name: String,
    pub(crate) group: String,
    pub(crate) initial: Option<serde_json::Map<String, serde_json::Value>>,
}

impl NodeConfig {
    /// Starts a config for a node named `name`, joining [`DEFAULT_GROUP`]
    /// with no initial capability-tree content.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            group: DEFAULT_GROUP.to_string(),
            initial: None,
        }
    }

    /// Overrides the group joined on startup. Defaults to `"ZOCP"`.
    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    /// Seeds the capability tree's reserved root keys before any parameter
    /// is registered.
    pub fn initial(mut self, initial: serde_json::Map<String, serde_json::Value>) -> Self {
        self.initial = Some(initial);
        self
    }
}

/// Installs a `tracing` subscriber driven by `RUST_LOG`/`EnvFilter`
/// (default `"info"`). Safe to call more than once or alongside a host
/// application's own subscriber: both the global-subscriber install and the
/// panic hook are best-effort.
pub fn init_tracing() {
    use tracing_subscriber::fmt::format::FmtSpan;
    use tracing_subscriber::EnvFilter;

    tracing_log::LogTracer::init().ok();
    let env = std::env::var(EnvFilter::DEFAULT_ENV).unwrap_or_else(|_| "info".to_owned());
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_span_events(FmtSpan::ACTIVE | FmtSpan::CLOSE)
        .with_env_filter(EnvFilter::new(env))
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();
    log_panics::init();
}
