use std::process::Command;

use sql_bridge::prelude::*;
use tracing::{error, info};

use crate::matrix::BuildJob;

/// Run every job in order and stop at the first failure, returning its exit status.
pub(crate) fn run_all(jobs: &[BuildJob], forwarded: &[String], dry_run: bool) -> i32 {
    for (n, job) in jobs.iter().enumerate() {
        let args = job.cargo_args(forwarded);
        info!(
            job = n + 1,
            total = jobs.len(),
            toolchain = job.toolchain.as_deref().unwrap_or("default"),
            arch = %job.arch.map_or_else(|| "host".to_string(), |a| a.to_string()),
            "cargo {}",
            args.join(" ")
        );
        if dry_run {
            continue;
        }
        match Command::new("cargo").args(&args).status() {
            Ok(status) if status.success() => {}
            Ok(status) => {
                let code = status.code().unwrap_or(1);
                error!(code, "build failed");
                return code;
            }
            Err(err) => {
                error!(%err, "could not start cargo");
                return 1;
            }
        }
    }
    0
}

/// Open an in-memory database through the library and run one query.
pub(crate) fn smoke_check() -> Result<(), SqlBridgeError> {
    let db = Database::builder().fetch_mode(FetchMode::Array).build()?;
    db.open(":memory:")?;
    let out = db.query("select 1 as COLINT, 'x' as COLTEXT")?;
    info!(rows = out.rows().len(), "smoke query ran");
    db.close()
}
