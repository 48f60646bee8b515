use clap::Parser;
use presence_scanner::app::{self, Options, RealDiscoverer};
use presence_scanner::report::HttpSink;
use std::panic::{self, PanicHookInfo};
use tracing_subscriber::EnvFilter;

/// Exit codes for the application
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_PANIC: i32 = 2;

/// Initialize tracing with an env-filter; `--verbose` lowers the default
/// level to debug so every outgoing payload is logged.
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Set up panic hook to ensure clean exit codes for process managers
    // (e.g., systemd) that monitor exit status
    panic::set_hook(Box::new(move |info: &PanicHookInfo| {
        eprintln!("Panic! {}", info);
        std::process::exit(EXIT_PANIC);
    }));

    let options = Options::parse();
    init_tracing(options.verbose);

    let sink = match HttpSink::new(options.endpoint.clone()) {
        Ok(sink) => sink,
        Err(why) => {
            eprintln!("error: {}", why);
            std::process::exit(EXIT_ERROR);
        }
    };

    tracing::info!(
        endpoint = %options.endpoint,
        location = %options.location,
        backend = %options.backend,
        interval = ?options.interval,
        "starting presence scanner"
    );

    let shutdown = async {
        // No handler means no stop request will ever arrive
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    app::run(options, &RealDiscoverer, &sink, shutdown).await;

    eprintln!("interrupted, exiting");
    std::process::exit(EXIT_SUCCESS);
}
