use std::process::exit;

use gitpress::cli::{self, Cli};
use gitpress::ui::output;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn main() {
    let cli = Cli::parse_args();
    init_tracing(cli.debug);

    if let Err(err) = cli::run(cli) {
        output::error(format!("{err:#}"));
        exit(1);
    }
}

/// `--debug` turns on debug events for this crate; otherwise `RUST_LOG`
/// applies, defaulting to warnings only.
fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::new("gitpress=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .with_writer(std::io::stderr);
    tracing_subscriber::registry().with(layer).with(filter).init();
}
