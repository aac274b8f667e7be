// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! The code generator: an AST-directed emitter producing stack-machine
//! assembly for the Flash Player 8 (AS2) virtual machine.
//!
//! Two invariants govern every visitor: an expression leaves exactly one
//! value on the stack, a statement leaves zero. Indentation is a structural
//! property of nesting, not of syntax.

pub mod coalesce;
pub mod contexts;
mod directives;
mod expr;
pub mod registers;
pub mod simulator;

use std::collections::HashSet;

use crate::core::ast::{Function, Program, Statement, StatementKind, VariableDeclarator};
use crate::core::error::{CodegenError, CodegenErrorKind, Diagnostic, Severity};

use contexts::{ContextStack, FunctionContext, LoopContext, RegisterVariablesContext};
use registers::Register;

const INDENT_UNIT: &str = "  ";

/// How the parent wants an expression's value delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExprMode {
    /// The value must end up on the stack.
    Value,
    /// The parent offers to discard the value; the visitor may leave the
    /// stack clean and report `Emitted::Consumed`.
    Void,
}

/// What an expression visitor actually did with its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Emitted {
    /// One value was left on the stack.
    Value,
    /// The stack was left clean, either because the visitor accepted the
    /// void offer or because the emitted form leaves no value at all
    /// (the postfix-update store on a global).
    Consumed,
}

/// How far member-expression emission should go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberAccess {
    /// Push object and property, then `getMember`.
    Load,
    /// Stop after object and property; the parent consumes them
    /// (`setMember`, `callMethod`).
    AddressOnly,
}

#[derive(Debug, Clone, Default)]
pub struct GeneratorOptions {
    /// Interleave `//--` / `/*--[[ ... --]]*/` echoes of the original
    /// source before statements. Requires `source`.
    pub echo_source: bool,
    /// The original source text, used for echo comments.
    pub source: Option<String>,
}

/// The AST-directed instruction emitter.
pub struct Generator {
    lines: Vec<String>,
    depth: u32,
    label_counter: u32,
    pub(crate) functions: ContextStack<FunctionContext>,
    pub(crate) register_variables: ContextStack<RegisterVariablesContext>,
    loops: ContextStack<LoopContext>,
    warnings: Vec<Diagnostic>,
    directives_seen: HashSet<(u32, u32)>,
    options: GeneratorOptions,
}

impl Generator {
    pub fn new(options: GeneratorOptions) -> Self {
        Self {
            lines: Vec::new(),
            depth: 0,
            label_counter: 0,
            functions: ContextStack::new(),
            register_variables: ContextStack::new(),
            loops: ContextStack::new(),
            warnings: Vec::new(),
            directives_seen: HashSet::new(),
            options,
        }
    }

    pub fn emit_program(&mut self, program: &Program) -> Result<(), CodegenError> {
        for stmt in &program.body {
            self.emit_statement(stmt)?;
        }
        Ok(())
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Consume the generator, yielding the emitted lines and any warning
    /// diagnostics. Valid after a failed run too; the lines are then the
    /// partial state for debug output.
    pub fn into_parts(self) -> (Vec<String>, Vec<Diagnostic>) {
        (self.lines, self.warnings)
    }

    // ----- line primitives -------------------------------------------------

    pub(crate) fn emit(&mut self, text: &str) {
        let indent = INDENT_UNIT.repeat(self.depth as usize);
        self.lines.push(format!("{indent}{text}"));
    }

    /// Labels sit one indent level outside the code they bracket.
    pub(crate) fn emit_label(&mut self, label: &str) {
        let indent = INDENT_UNIT.repeat(self.depth.saturating_sub(1) as usize);
        self.lines.push(format!("{indent}{label}:"));
    }

    pub(crate) fn indent(&mut self) {
        self.depth += 1;
    }

    pub(crate) fn deindent(&mut self) {
        if self.depth == 0 {
            self.warnings.push(Diagnostic::new(
                Severity::Warning,
                CodegenError::new(
                    CodegenErrorKind::Internal,
                    "Indentation underflow; clamped to zero",
                ),
            ));
            return;
        }
        self.depth -= 1;
    }

    fn next_label_id(&mut self) -> u32 {
        self.label_counter += 1;
        self.label_counter
    }

    // ----- scopes ----------------------------------------------------------

    /// Run `body` inside a fresh function scope. The function context and
    /// its register-variables projection are pushed together and popped
    /// together, so the stacks stay balanced whatever `body` returns.
    pub(crate) fn with_function_scope<R>(
        &mut self,
        context: FunctionContext,
        body: impl FnOnce(&mut Self) -> Result<R, CodegenError>,
    ) -> Result<R, CodegenError> {
        let functions_before = self.functions.len();
        let variables_before = self.register_variables.len();
        self.functions.push(context);
        self.register_variables.push(RegisterVariablesContext::Function);
        let result = body(self);
        self.register_variables.pop();
        self.functions.pop();
        debug_assert_eq!(self.functions.len(), functions_before);
        debug_assert_eq!(self.register_variables.len(), variables_before);
        result
    }

    fn with_loop_scope<R>(
        &mut self,
        end_label: String,
        body: impl FnOnce(&mut Self) -> Result<R, CodegenError>,
    ) -> Result<R, CodegenError> {
        let loops_before = self.loops.len();
        self.loops.push(LoopContext::new(end_label));
        let result = body(self);
        self.loops.pop();
        debug_assert_eq!(self.loops.len(), loops_before);
        result
    }

    /// Resolve a variable through the innermost register-variables context.
    pub(crate) fn lookup_variable_register(&self, name: &str) -> Option<Register> {
        match self.register_variables.peek()? {
            RegisterVariablesContext::Function => self
                .functions
                .peek()
                .and_then(|ctx| ctx.get_variable_register(name))
                .cloned(),
            RegisterVariablesContext::Explicit(entries) => entries
                .iter()
                .find(|(entry, _)| entry == name)
                .map(|(_, register)| register.clone()),
        }
    }

    // ----- statements ------------------------------------------------------

    fn emit_statement(&mut self, stmt: &Statement) -> Result<(), CodegenError> {
        self.process_directive_comments(&stmt.leading_comments)?;
        self.echo_statement_source(stmt);

        match &stmt.kind {
            StatementKind::Expression(expr) => {
                match self.emit_expression(expr, ExprMode::Void)? {
                    Emitted::Consumed => {}
                    Emitted::Value => self.emit("pop"),
                }
            }
            StatementKind::VariableDeclaration { kind, declarations } => {
                if kind != "var" {
                    return Err(CodegenError::new(
                        CodegenErrorKind::UnimplementedFeature,
                        format!("Only 'var' declarations are supported, not '{kind}'"),
                    )
                    .with_span(stmt.span));
                }
                for decl in declarations {
                    self.emit_declarator(decl)?;
                }
            }
            StatementKind::Block(body) => {
                for inner in body {
                    self.emit_statement(inner)?;
                }
            }
            StatementKind::Empty => {}
            StatementKind::If {
                test,
                consequent,
                alternate,
            } => {
                let id = self.next_label_id();
                let true_label = format!("true_{id}");
                let false_label = format!("false_{id}");
                let end_label = format!("end_{id}");

                self.emit_expression(test, ExprMode::Value)?;
                self.emit("not");
                self.emit(&format!("branchIfTrue {false_label}"));
                self.indent();
                self.emit_label(&true_label);
                self.emit_statement(consequent)?;
                self.emit(&format!("branch {end_label}"));
                self.emit_label(&false_label);
                if let Some(alternate) = alternate {
                    self.emit_statement(alternate)?;
                }
                self.emit_label(&end_label);
                self.deindent();
            }
            StatementKind::While { test, body } => {
                let id = self.next_label_id();
                let test_label = format!("test_{id}");
                let end_label = format!("end_{id}");

                self.indent();
                self.emit_label(&test_label);
                self.with_loop_scope(end_label.clone(), |gen| {
                    gen.emit_expression(test, ExprMode::Value)?;
                    gen.emit("not");
                    gen.emit(&format!("branchIfTrue {end_label}"));
                    gen.emit_statement(body)?;
                    gen.emit(&format!("branch {test_label}"));
                    Ok(())
                })?;
                self.emit_label(&end_label);
                self.deindent();
            }
            StatementKind::Break { label } => {
                if label.is_some() {
                    return Err(CodegenError::new(
                        CodegenErrorKind::UnimplementedFeature,
                        "Labeled break is not supported",
                    )
                    .with_span(stmt.span));
                }
                let target = match self.loops.peek() {
                    Some(ctx) => ctx.break_label().to_string(),
                    None => {
                        return Err(CodegenError::new(
                            CodegenErrorKind::BreakOutsideLoop,
                            "Break outside of a loop",
                        )
                        .with_span(stmt.span));
                    }
                };
                self.emit(&format!("branch {target}"));
            }
            StatementKind::Return { argument } => {
                match argument {
                    Some(arg) => {
                        self.emit_expression(arg, ExprMode::Value)?;
                    }
                    None => self.emit("push UNDEF"),
                }
                self.emit("return");
            }
            StatementKind::FunctionDeclaration(func) => {
                self.emit_function(func)?;
            }
        }

        self.process_directive_comments(&stmt.trailing_comments)?;
        Ok(())
    }

    fn emit_declarator(&mut self, decl: &VariableDeclarator) -> Result<(), CodegenError> {
        if self.functions.is_empty() {
            if decl.init.is_some() {
                return Err(CodegenError::new(
                    CodegenErrorKind::GlobalsUnsupported,
                    format!("Global variable '{}' cannot have an initializer", decl.name),
                )
                .with_span(decl.span));
            }
            return Ok(());
        }

        match self.functions.peek_mut() {
            Some(ctx) => {
                ctx.declare_variable(&decl.name)
                    .map_err(|err| err.or_span(decl.span))?;
            }
            None => {
                return Err(CodegenError::new(
                    CodegenErrorKind::Internal,
                    "Function stack empty while declaring a variable",
                )
                .with_span(decl.span));
            }
        }

        if let Some(init) = &decl.init {
            self.emit_expression(init, ExprMode::Value)?;
            if let Some(register) = self.lookup_variable_register(&decl.name) {
                self.emit(&format!("setRegister {register}"));
                self.emit("pop");
            }
        }
        Ok(())
    }

    /// Emit a `function2` definition. Function expressions arrive here with
    /// a `None` name and compile to the anonymous header form.
    pub(crate) fn emit_function(&mut self, func: &Function) -> Result<(), CodegenError> {
        let mut context = FunctionContext::new();
        context
            .declare_meta("this")
            .map_err(|err| err.or_span(func.span))?;
        for param in &func.params {
            context
                .declare_argument(&param.name)
                .map_err(|err| err.or_span(param.span))?;
        }

        let header = match &func.name {
            Some(name) => format!(
                "function2 '{name}' ({}) ({})",
                context.args_header(),
                context.meta_header()
            ),
            None => format!(
                "function2 ({}) ({})",
                context.args_header(),
                context.meta_header()
            ),
        };
        self.emit(&header);
        self.indent();
        let result = self.with_function_scope(context, |gen| {
            for stmt in &func.body {
                gen.emit_statement(stmt)?;
            }
            Ok(())
        });
        self.deindent();
        result?;
        match &func.name {
            Some(name) => self.emit(&format!("end // of function {name}")),
            None => self.emit("end"),
        }
        Ok(())
    }

    // ----- source echo -----------------------------------------------------

    fn echo_statement_source(&mut self, stmt: &Statement) {
        if !self.options.echo_source {
            return;
        }
        if !matches!(
            stmt.kind,
            StatementKind::Expression(_)
                | StatementKind::VariableDeclaration { .. }
                | StatementKind::Return { .. }
                | StatementKind::Break { .. }
        ) {
            return;
        }
        let text = match &self.options.source {
            Some(source) => {
                let start = stmt.span.start as usize;
                let end = stmt.span.end as usize;
                if start >= end || end > source.len() {
                    return;
                }
                source[start..end].to_string()
            }
            None => return,
        };
        if text.contains('\n') {
            let mut lines = text.lines();
            if let Some(first) = lines.next() {
                self.emit(&format!("/*--[[ {first}"));
            }
            for line in lines {
                self.lines.push(line.to_string());
            }
            self.lines.push("--]]*/".to_string());
        } else {
            self.emit(&format!("//-- {text}"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ast::{Expression, ExpressionKind, NodeSpan};

    fn stmt(kind: StatementKind) -> Statement {
        Statement::new(kind, NodeSpan::default())
    }

    fn ident(name: &str) -> Expression {
        Expression::new(
            ExpressionKind::Identifier(name.to_string()),
            NodeSpan::default(),
        )
    }

    #[test]
    fn deindent_underflow_clamps_with_warning() {
        let mut gen = Generator::new(GeneratorOptions::default());
        gen.deindent();
        gen.emit("pop");
        let (lines, warnings) = gen.into_parts();
        assert_eq!(lines, vec!["pop".to_string()]);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].severity(), Severity::Warning);
    }

    #[test]
    fn labels_sit_one_level_out() {
        let mut gen = Generator::new(GeneratorOptions::default());
        gen.indent();
        gen.indent();
        gen.emit_label("end_1");
        gen.emit("pop");
        let (lines, _) = gen.into_parts();
        assert_eq!(lines, vec!["  end_1:".to_string(), "    pop".to_string()]);
    }

    #[test]
    fn break_outside_loop_is_rejected() {
        let mut gen = Generator::new(GeneratorOptions::default());
        let err = gen
            .emit_statement(&stmt(StatementKind::Break { label: None }))
            .unwrap_err();
        assert_eq!(err.kind(), CodegenErrorKind::BreakOutsideLoop);
    }

    #[test]
    fn labeled_break_is_rejected() {
        let mut gen = Generator::new(GeneratorOptions::default());
        let err = gen
            .emit_statement(&stmt(StatementKind::Break {
                label: Some("out".to_string()),
            }))
            .unwrap_err();
        assert_eq!(err.kind(), CodegenErrorKind::UnimplementedFeature);
    }

    #[test]
    fn let_declarations_are_rejected() {
        let mut gen = Generator::new(GeneratorOptions::default());
        let err = gen
            .emit_statement(&stmt(StatementKind::VariableDeclaration {
                kind: "let".to_string(),
                declarations: Vec::new(),
            }))
            .unwrap_err();
        assert_eq!(err.kind(), CodegenErrorKind::UnimplementedFeature);
    }

    #[test]
    fn global_initializer_is_rejected() {
        let mut gen = Generator::new(GeneratorOptions::default());
        let err = gen
            .emit_statement(&stmt(StatementKind::VariableDeclaration {
                kind: "var".to_string(),
                declarations: vec![VariableDeclarator {
                    name: "x".to_string(),
                    init: Some(Expression::new(
                        ExpressionKind::NumericLiteral(1.0),
                        NodeSpan::default(),
                    )),
                    span: NodeSpan::default(),
                }],
            }))
            .unwrap_err();
        assert_eq!(err.kind(), CodegenErrorKind::GlobalsUnsupported);

        // A bare global declaration is a no-op.
        let mut gen = Generator::new(GeneratorOptions::default());
        gen.emit_statement(&stmt(StatementKind::VariableDeclaration {
            kind: "var".to_string(),
            declarations: vec![VariableDeclarator {
                name: "x".to_string(),
                init: None,
                span: NodeSpan::default(),
            }],
        }))
        .unwrap();
        assert!(gen.lines().is_empty());
    }

    #[test]
    fn return_without_argument_pushes_undef() {
        let mut gen = Generator::new(GeneratorOptions::default());
        gen.emit_statement(&stmt(StatementKind::Return { argument: None }))
            .unwrap();
        let (lines, _) = gen.into_parts();
        assert_eq!(lines, vec!["push UNDEF".to_string(), "return".to_string()]);
    }

    #[test]
    fn expression_statement_pops_unconsumed_values() {
        let mut gen = Generator::new(GeneratorOptions::default());
        gen.emit_statement(&stmt(StatementKind::Expression(ident("n"))))
            .unwrap();
        let (lines, _) = gen.into_parts();
        assert_eq!(
            lines,
            vec![
                "push 'n'".to_string(),
                "getVariable".to_string(),
                "pop".to_string()
            ]
        );
    }
}
