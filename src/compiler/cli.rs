// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Command-line interface parsing and argument validation.

use std::path::PathBuf;

use clap::{ArgAction, Parser, ValueEnum};

use crate::core::error::{CodegenError, CodegenErrorKind};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

const LONG_ABOUT: &str = "Compiles a restricted JavaScript subset into textual bytecode assembly \
for the Flash Player 8 (AS2) virtual machine.

Inputs are AST files in the JSON shape produced by a mainstream JavaScript
parser (@babel/parser). The emitted assembly is consumed by an external
assembler; each instruction line is annotated with a symbolic reconstruction
of the stack it leaves behind unless --no-annotate is given.
Use -o/--outfile to route output to a file; with multiple inputs -o must be
a directory and each input produces <stem>.fasm inside it.";

#[derive(Parser, Debug)]
#[command(
    name = "js2f",
    version = VERSION,
    about = "JavaScript-subset to AS2 bytecode assembly compiler",
    long_about = LONG_ABOUT
)]
pub struct Cli {
    #[arg(
        value_name = "AST",
        required = true,
        num_args = 1..,
        long_help = "Input AST files (JSON, @babel/parser shape). Each input compiles independently."
    )]
    pub inputs: Vec<PathBuf>,
    #[arg(
        short = 'o',
        long = "outfile",
        value_name = "FILE",
        long_help = "Write assembly to FILE instead of stdout. With multiple inputs, FILE must be a directory."
    )]
    pub outfile: Option<PathBuf>,
    #[arg(
        long = "source",
        value_name = "FILE",
        long_help = "The original .js source. Used to frame error locations and for --echo-source."
    )]
    pub source: Option<PathBuf>,
    #[arg(
        long = "no-annotate",
        action = ArgAction::SetTrue,
        long_help = "Skip the stack simulation pass; emit bare instructions without // stack annotations."
    )]
    pub no_annotate: bool,
    #[arg(
        long = "no-coalesce",
        action = ArgAction::SetTrue,
        long_help = "Skip the push-coalescing peephole pass. Mainly useful when diffing generator output."
    )]
    pub no_coalesce: bool,
    #[arg(
        long = "echo-source",
        action = ArgAction::SetTrue,
        requires = "source",
        long_help = "Interleave //-- comments echoing the original source span of each statement. Requires --source."
    )]
    pub echo_source: bool,
    #[arg(
        long = "debug-partial",
        value_name = "FILE",
        long_help = "On failure, write the instructions emitted before the error to FILE for inspection."
    )]
    pub debug_partial: Option<PathBuf>,
    #[arg(
        short = 'q',
        long = "quiet",
        action = ArgAction::SetTrue,
        long_help = "Suppress diagnostic output for successful runs. Errors are still reported."
    )]
    pub quiet: bool,
    #[arg(
        long = "format",
        value_enum,
        default_value_t = OutputFormat::Text,
        long_help = "Select output format. text emits the assembly listing; json wraps lines and diagnostics in a JSON object."
    )]
    pub format: OutputFormat,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Validated CLI configuration.
#[derive(Debug)]
pub struct CliConfig {
    pub inputs: Vec<PathBuf>,
    pub outfile: Option<PathBuf>,
    pub source: Option<PathBuf>,
    pub annotate: bool,
    pub coalesce: bool,
    pub echo_source: bool,
    pub debug_partial: Option<PathBuf>,
    pub quiet: bool,
    pub format: OutputFormat,
}

pub fn validate_cli(cli: &Cli) -> Result<CliConfig, CodegenError> {
    if cli.inputs.is_empty() {
        return Err(cli_error("at least one input AST file is required"));
    }
    if cli.inputs.len() > 1 {
        match &cli.outfile {
            Some(path) if !path.is_dir() => {
                return Err(cli_error(
                    "with multiple inputs, -o/--outfile must be a directory",
                ));
            }
            _ => {}
        }
    }
    if cli.echo_source && cli.source.is_none() {
        return Err(cli_error("--echo-source requires --source"));
    }
    Ok(CliConfig {
        inputs: cli.inputs.clone(),
        outfile: cli.outfile.clone(),
        source: cli.source.clone(),
        annotate: !cli.no_annotate,
        coalesce: !cli.no_coalesce,
        echo_source: cli.echo_source,
        debug_partial: cli.debug_partial.clone(),
        quiet: cli.quiet,
        format: cli.format,
    })
}

fn cli_error(message: &str) -> CodegenError {
    CodegenError::new(CodegenErrorKind::Cli, message)
}

/// Resolve where one input's output goes: the explicit file for a single
/// input, `<dir>/<stem>.fasm` when routing into a directory, `None` for
/// stdout.
pub fn resolve_output_path(input: &PathBuf, config: &CliConfig) -> Option<PathBuf> {
    let out = config.outfile.as_ref()?;
    if out.is_dir() || config.inputs.len() > 1 {
        let stem = input
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "out".to_string());
        let stem = stem.strip_suffix(".ast").unwrap_or(&stem).to_string();
        Some(out.join(format!("{stem}.fasm")))
    } else {
        Some(out.clone())
    }
}
