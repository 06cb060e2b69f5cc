//! Logging setup.
//!
//! Library code only emits events through the prelude macros. Installing a
//! subscriber is left to the binary, which calls [`init_stderr`] once at
//! startup.

use tracing_subscriber::{
    filter::{EnvFilter, LevelFilter},
    prelude::*,
};

pub mod prelude {
    #[allow(unused_imports)]
    pub use tracing::{debug, error, info, trace, warn};
}

/// Log to stderr, filtering according to `RUST_LOG` with INFO as the
/// default level. Stdout is kept free for reports.
pub fn init_stderr() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .with_env_var("RUST_LOG")
        .from_env_lossy();

    // A second call (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true),
        )
        .try_init();
}
