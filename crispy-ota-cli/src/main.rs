// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Host tool driving the update engine against a file-backed flash image.

mod cli;
mod commands;
mod settings;
mod storage;
mod transport;

use std::process::ExitCode;

use clap::Parser;
use log::LevelFilter;

use crispy_ota::OtaError;

use cli::Cli;

/// Exit status for failures that do not come from the engine.
const EXIT_OTHER: u8 = 100;

/// Exit status for a rejected command line: 0 for `--help` and `--version`.
fn parse_exit_code(err: &clap::Error) -> u8 {
    if err.use_stderr() {
        EXIT_OTHER
    } else {
        0
    }
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return ExitCode::from(parse_exit_code(&err));
        }
    };

    let level = match cli.verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .format_timestamp(None)
        .parse_env("CRISPY_LOG")
        .init();

    match cli::run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:#}");
            let code = err
                .downcast_ref::<OtaError>()
                .map_or(EXIT_OTHER, |e| e.code());
            ExitCode::from(code)
        }
    }
}
