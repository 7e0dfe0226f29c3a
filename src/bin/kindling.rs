//! Post to Campfire rooms and run the polling daemon.
//!
//! ```bash
//! kindling setup
//! kindling say subdomain=acme room=watercooler good morning
//! git diff | kindling paste --from stdin
//! kindling start
//! kindling log tail
//! kindling stop
//! ```

use arrrg::CommandLine;
use kindling::cli::{self, Args};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let (args, free) = Args::from_command_line_relaxed(cli::USAGE);
    if let Err(err) = cli::run(args, free).await {
        eprintln!("kindling: {err}");
        std::process::exit(1);
    }
}
