// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon entry point: parse configuration, init logging, run until
//! shutdown.

use clap::Parser;

use forkline::config::Config;
use forkline::logging;
use forkline::run::run;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    if let Err(e) = config.validate() {
        eprintln!("forkline: invalid configuration: {e}");
        std::process::exit(1);
    }

    logging::init(&config);

    match run(config).await {
        Ok(result) => std::process::exit(result.exit_code),
        Err(e) => {
            eprintln!("forkline: fatal: {e}");
            std::process::exit(1);
        }
    }
}
