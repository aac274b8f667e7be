// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

// CLI entrypoint for js2f.

use std::fs;

use clap::Parser;

use js2f::compiler::cli::{validate_cli, Cli};

fn main() {
    let cli = Cli::parse();
    let config = match validate_cli(&cli) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(1);
        }
    };

    let use_color = std::env::var("NO_COLOR").is_err();
    match js2f::compiler::run_with_cli(&cli) {
        Ok(reports) => {
            if config.quiet {
                return;
            }
            for report in &reports {
                for diag in report.diagnostics() {
                    eprintln!(
                        "{}",
                        diag.format_with_context(Some(report.source_lines()), use_color)
                    );
                }
            }
        }
        Err(err) => {
            for diag in err.diagnostics() {
                eprintln!(
                    "{}",
                    diag.format_with_context(Some(err.source_lines()), use_color)
                );
            }
            if let Some(path) = &config.debug_partial {
                if !err.partial_lines().is_empty() {
                    let mut partial = err.partial_lines().join("\n");
                    partial.push('\n');
                    if let Err(io_err) = fs::write(path, partial) {
                        eprintln!("Failed to write debug output to {}: {io_err}", path.display());
                    }
                }
            }
            std::process::exit(1);
        }
    }
}
