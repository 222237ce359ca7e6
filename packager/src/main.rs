mod args;
mod matrix;
mod runner;

use clap::Parser;
use tracing::{Level, error};

use crate::args::{Args, split_known_args};

fn main() {
    let (known, forwarded) = split_known_args(std::env::args());
    let args = Args::parse_from(known);

    tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(Level::INFO)
        .init();

    let jobs = match matrix::expand(args.target.as_deref(), args.target_arch.as_deref()) {
        Ok(jobs) => jobs,
        Err(err) => {
            error!("{err}");
            std::process::exit(2);
        }
    };

    let code = runner::run_all(&jobs, &forwarded, args.dry_run);
    if code != 0 {
        std::process::exit(code);
    }

    if args.smoke && !args.dry_run {
        if let Err(err) = runner::smoke_check() {
            error!(%err, "smoke check failed");
            std::process::exit(1);
        }
    }
}
