use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

#[doc(hidden)]
pub use tracing as __tracing;

/// Installs the global subscriber. `RUST_LOG` overrides the `info` default.
///
/// Safe to call more than once; later calls are ignored.
pub fn init_logger() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(false)
                .with_level(true)
                .with_thread_names(true)
                .with_line_number(false)
                .with_file(false)
                .compact(),
        )
        .with(filter)
        .try_init();
}

/// Runs a block and logs how long it took.
///
/// ```ignore
/// let tables = timeit!("listed tables", { backend.get_existing_models().await? });
/// ```
#[macro_export]
macro_rules! timeit {
    ($label:expr, $body:block) => {{
        let __started = ::std::time::Instant::now();
        let __out = $body;
        $crate::__tracing::info!(
            "{} ({}ms)",
            $label,
            __started.elapsed().as_millis()
        );
        __out
    }};
}
