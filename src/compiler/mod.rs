// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! The compilation pipeline: AST loading, code generation, push
//! coalescing, stack annotation, and output routing.

pub mod cli;

use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde_json::json;

use crate::codegen::coalesce::coalesce_pushes;
use crate::codegen::simulator::annotate_lines;
use crate::codegen::{Generator, GeneratorOptions};
use crate::core::ast::Program;
use crate::core::ast_json::program_from_value;
use crate::core::error::{
    CodegenError, CodegenErrorKind, Diagnostic, RunError, RunReport, Severity,
};

use cli::{resolve_output_path, validate_cli, Cli, CliConfig, OutputFormat};

pub use cli::VERSION;

/// Library-level compilation options; the CLI maps onto this.
#[derive(Debug, Clone)]
pub struct CompileOptions {
    pub coalesce: bool,
    pub annotate: bool,
    pub echo_source: bool,
    /// Original source text, used for echo comments.
    pub source: Option<String>,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            coalesce: true,
            annotate: true,
            echo_source: false,
            source: None,
        }
    }
}

pub struct CompileOutput {
    pub lines: Vec<String>,
    pub warnings: Vec<Diagnostic>,
}

/// A failed compilation, carrying whatever was emitted before the error.
pub struct CompileFailure {
    pub error: CodegenError,
    pub partial_lines: Vec<String>,
}

/// Compile one program through the full pipeline.
pub fn compile_program(
    program: &Program,
    options: &CompileOptions,
) -> Result<CompileOutput, CompileFailure> {
    let mut generator = Generator::new(GeneratorOptions {
        echo_source: options.echo_source,
        source: options.source.clone(),
    });
    if let Err(error) = generator.emit_program(program) {
        let (partial_lines, _) = generator.into_parts();
        return Err(CompileFailure {
            error,
            partial_lines,
        });
    }
    let (mut lines, warnings) = generator.into_parts();

    if options.coalesce {
        coalesce_pushes(&mut lines);
    }
    if options.annotate {
        match annotate_lines(&lines) {
            Ok(annotated) => lines = annotated,
            Err(error) => {
                return Err(CompileFailure {
                    error,
                    partial_lines: lines,
                });
            }
        }
    }
    Ok(CompileOutput { lines, warnings })
}

/// Drive a full CLI invocation: validate, compile each input, route output.
pub fn run_with_cli(cli: &Cli) -> Result<Vec<RunReport>, RunError> {
    let config = validate_cli(cli).map_err(|error| RunError::new(error, Vec::new(), Vec::new()))?;

    let source_text = match &config.source {
        Some(path) => Some(read_text(path, &[])?),
        None => None,
    };
    let source_lines: Arc<Vec<String>> = Arc::new(
        source_text
            .as_deref()
            .map(|text| text.lines().map(str::to_string).collect())
            .unwrap_or_default(),
    );
    let source_name = config
        .source
        .as_ref()
        .map(|path| path.to_string_lossy().into_owned());

    let options = CompileOptions {
        coalesce: config.coalesce,
        annotate: config.annotate,
        echo_source: config.echo_source,
        source: source_text,
    };

    let mut reports = Vec::new();
    for input in &config.inputs {
        let report = run_one_input(input, &config, &options, &source_lines, &source_name)?;
        reports.push(report);
    }
    Ok(reports)
}

fn run_one_input(
    input: &std::path::PathBuf,
    config: &CliConfig,
    options: &CompileOptions,
    source_lines: &Arc<Vec<String>>,
    source_name: &Option<String>,
) -> Result<RunReport, RunError> {
    let text = read_text(input, source_lines)?;
    let value: serde_json::Value = serde_json::from_str(&text).map_err(|err| {
        let error = CodegenError::new(
            CodegenErrorKind::Io,
            format!("Error parsing AST JSON from {}: {err}", input.display()),
        );
        fail(error, source_lines, source_name)
    })?;
    let program = program_from_value(&value)
        .map_err(|error| fail(error, source_lines, source_name))?;

    let output = compile_program(&program, options).map_err(|failure| {
        fail(failure.error, source_lines, source_name)
            .with_partial_lines(failure.partial_lines)
    })?;

    let rendered = render_output(input, &output, config);
    write_output(input, &rendered, config, source_lines)?;

    let diagnostics = output
        .warnings
        .into_iter()
        .map(|diag| diag.with_file(source_name.clone()))
        .collect();
    Ok(RunReport::new(diagnostics, Arc::clone(source_lines)))
}

fn render_output(input: &Path, output: &CompileOutput, config: &CliConfig) -> String {
    match config.format {
        OutputFormat::Text => {
            let mut text = output.lines.join("\n");
            text.push('\n');
            text
        }
        OutputFormat::Json => {
            let diagnostics: Vec<String> = output
                .warnings
                .iter()
                .map(|diag| diag.format())
                .collect();
            let payload = json!({
                "file": input.to_string_lossy(),
                "lines": output.lines,
                "diagnostics": diagnostics,
            });
            let mut text = payload.to_string();
            text.push('\n');
            text
        }
    }
}

fn write_output(
    input: &std::path::PathBuf,
    rendered: &str,
    config: &CliConfig,
    source_lines: &Arc<Vec<String>>,
) -> Result<(), RunError> {
    match resolve_output_path(input, config) {
        Some(path) => fs::write(&path, rendered).map_err(|err| {
            let error = CodegenError::new(
                CodegenErrorKind::Io,
                format!("Error writing output file {}: {err}", path.display()),
            );
            RunError::new(error, Vec::new(), Arc::clone(source_lines))
        }),
        None => {
            print!("{rendered}");
            Ok(())
        }
    }
}

fn read_text(path: &Path, source_lines: &[String]) -> Result<String, RunError> {
    fs::read_to_string(path).map_err(|err| {
        let error = CodegenError::new(
            CodegenErrorKind::Io,
            format!("Error reading {}: {err}", path.display()),
        );
        RunError::new(error, Vec::new(), source_lines.to_vec())
    })
}

fn fail(error: CodegenError, source_lines: &Arc<Vec<String>>, source_name: &Option<String>) -> RunError {
    let diagnostic = Diagnostic::new(Severity::Error, error.clone()).with_file(source_name.clone());
    RunError::new(error, vec![diagnostic], Arc::clone(source_lines))
}
