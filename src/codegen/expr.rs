// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Expression emission.
//!
//! Every visitor here leaves exactly one value on the stack unless the
//! parent offered `ExprMode::Void` and the visitor reports
//! `Emitted::Consumed`.

use crate::core::ast::{Expression, ExpressionKind, NodeSpan};
use crate::core::error::{CodegenError, CodegenErrorKind};

use super::registers::Register;
use super::{Emitted, ExprMode, Generator, MemberAccess};

impl Generator {
    pub(crate) fn emit_expression(
        &mut self,
        expr: &Expression,
        mode: ExprMode,
    ) -> Result<Emitted, CodegenError> {
        match &expr.kind {
            ExpressionKind::NumericLiteral(value) => {
                self.emit(&format!("push {}", number_literal(*value)));
            }
            ExpressionKind::StringLiteral(value) => {
                self.emit(&format!("push {}", string_literal(value)));
            }
            ExpressionKind::BooleanLiteral(value) => {
                self.emit(if *value { "push TRUE" } else { "push FALSE" });
            }
            ExpressionKind::NullLiteral => self.emit("push NULL"),
            ExpressionKind::BigIntLiteral(digits) => {
                self.emit(&format!("push {digits}"));
            }
            ExpressionKind::RegExpLiteral { pattern, flags } => {
                self.emit(&format!(
                    "push {}",
                    string_literal(&format!("/{pattern}/{flags}"))
                ));
            }
            ExpressionKind::Identifier(name) => {
                if name == "undefined" {
                    self.emit("push UNDEF");
                } else if let Some(register) = self.lookup_variable_register(name) {
                    self.emit(&format!("push {register}"));
                } else {
                    self.emit(&format!("push {}", string_literal(name)));
                    self.emit("getVariable");
                }
            }
            ExpressionKind::TemplateLiteral { quasis, expressions } => {
                self.emit("push ''");
                for (index, chunk) in quasis.iter().enumerate() {
                    self.emit(&format!("push {}", string_literal(chunk)));
                    if let Some(value) = expressions.get(index) {
                        self.emit_expression(value, ExprMode::Value)?;
                        self.emit("add");
                    }
                    self.emit("add");
                }
            }
            ExpressionKind::This => {
                match self.lookup_variable_register("this") {
                    Some(register) => self.emit(&format!("push {register}")),
                    None => {
                        if self.functions.is_empty() {
                            return Err(CodegenError::new(
                                CodegenErrorKind::ThisOutsideFunction,
                                "'this' used outside of a function",
                            )
                            .with_span(expr.span));
                        }
                        return Err(CodegenError::new(
                            CodegenErrorKind::Internal,
                            "'this' is not registered in the function context",
                        )
                        .with_span(expr.span));
                    }
                }
            }
            ExpressionKind::Array(elements) => {
                for element in elements.iter().rev() {
                    self.emit_expression(element, ExprMode::Value)?;
                }
                self.emit(&format!("push {}", elements.len()));
                self.emit("initArray");
            }
            ExpressionKind::Member { .. } => {
                self.emit_member(expr, MemberAccess::Load)?;
            }
            ExpressionKind::New { callee, arguments } => {
                let class_name = match &callee.kind {
                    ExpressionKind::Identifier(name) => name,
                    _ => {
                        return Err(CodegenError::new(
                            CodegenErrorKind::UnimplementedFeature,
                            "The callee of 'new' must be an identifier",
                        )
                        .with_span(callee.span));
                    }
                };
                for argument in arguments.iter().rev() {
                    self.emit_expression(argument, ExprMode::Value)?;
                }
                self.emit(&format!("push {}", arguments.len()));
                self.emit(&format!("push {}", string_literal(class_name)));
                self.emit("new");
            }
            ExpressionKind::Call { callee, arguments } => {
                self.emit_call(expr.span, callee, arguments)?;
            }
            ExpressionKind::Binary {
                operator,
                left,
                right,
            } => {
                self.emit_expression(left, ExprMode::Value)?;
                self.emit_expression(right, ExprMode::Value)?;
                self.emit_binary_operator(operator, expr.span)?;
            }
            ExpressionKind::Unary {
                operator,
                prefix,
                argument,
            } => {
                if operator != "!" || !prefix {
                    return Err(CodegenError::new(
                        CodegenErrorKind::UnimplementedFeature,
                        format!("Unsupported unary operator '{operator}'"),
                    )
                    .with_span(expr.span));
                }
                self.emit_expression(argument, ExprMode::Value)?;
                self.emit("not");
            }
            ExpressionKind::Update {
                operator,
                prefix,
                argument,
            } => {
                return self.emit_update(expr.span, operator, *prefix, argument);
            }
            ExpressionKind::Assignment {
                operator,
                left,
                right,
            } => {
                return self.emit_assignment(expr.span, operator, left, right, mode);
            }
            ExpressionKind::Function(func) => {
                self.emit_function(func)?;
            }
        }
        Ok(Emitted::Value)
    }

    /// Push a member expression's object and property, concluding with
    /// `getMember` unless the parent consumes the pair itself.
    fn emit_member(
        &mut self,
        expr: &Expression,
        access: MemberAccess,
    ) -> Result<(), CodegenError> {
        let (object, property, computed) = match &expr.kind {
            ExpressionKind::Member {
                object,
                property,
                computed,
            } => (object, property, *computed),
            _ => {
                return Err(CodegenError::new(
                    CodegenErrorKind::Internal,
                    "emit_member called on a non-member expression",
                )
                .with_span(expr.span));
            }
        };

        match &object.kind {
            ExpressionKind::Identifier(_)
            | ExpressionKind::New { .. }
            | ExpressionKind::This => {
                self.emit_expression(object, ExprMode::Value)?;
            }
            ExpressionKind::Member { .. } => {
                self.emit_member(object, MemberAccess::Load)?;
            }
            _ => {
                return Err(CodegenError::new(
                    CodegenErrorKind::UnimplementedFeature,
                    "Unsupported object in member expression",
                )
                .with_span(object.span));
            }
        }

        if computed {
            self.emit_expression(property, ExprMode::Value)?;
        } else {
            match &property.kind {
                ExpressionKind::Identifier(name) => {
                    self.emit(&format!("push {}", string_literal(name)));
                }
                _ => {
                    return Err(CodegenError::new(
                        CodegenErrorKind::UnimplementedFeature,
                        "Member property must be an identifier",
                    )
                    .with_span(property.span));
                }
            }
        }

        if access == MemberAccess::Load {
            self.emit("getMember");
        }
        Ok(())
    }

    fn emit_call(
        &mut self,
        span: NodeSpan,
        callee: &Expression,
        arguments: &[Expression],
    ) -> Result<(), CodegenError> {
        if let ExpressionKind::Identifier(name) = &callee.kind {
            match name.as_str() {
                "trace" => {
                    return Err(CodegenError::new(
                        CodegenErrorKind::UnsupportedIntrinsic,
                        "trace() is not supported by the target player",
                    )
                    .with_span(span));
                }
                "int" => {
                    if arguments.len() != 1 {
                        return Err(CodegenError::new(
                            CodegenErrorKind::WrongArity,
                            format!("int() takes exactly one argument, got {}", arguments.len()),
                        )
                        .with_span(span));
                    }
                    self.emit_expression(&arguments[0], ExprMode::Value)?;
                    self.emit("int");
                    return Ok(());
                }
                _ => {}
            }
        }

        for argument in arguments.iter().rev() {
            self.emit_expression(argument, ExprMode::Value)?;
        }
        self.emit(&format!("push {}", arguments.len()));

        match &callee.kind {
            ExpressionKind::Identifier(name) => {
                if let Some(register) = self.lookup_variable_register(name) {
                    self.emit(&format!("push {register}"));
                } else {
                    self.emit(&format!("push {}", string_literal(name)));
                }
                self.emit("callFunction");
            }
            ExpressionKind::Member { .. } => {
                self.emit_member(callee, MemberAccess::AddressOnly)?;
                self.emit("callMethod");
            }
            _ => {
                return Err(CodegenError::new(
                    CodegenErrorKind::UnimplementedFeature,
                    "Unsupported callee expression",
                )
                .with_span(callee.span));
            }
        }
        Ok(())
    }

    fn emit_binary_operator(
        &mut self,
        operator: &str,
        span: NodeSpan,
    ) -> Result<(), CodegenError> {
        // NOTE: the VM opcode names for the bitwise pair are transposed
        // relative to the operator glyphs; the downstream assembler expects
        // exactly this mapping.
        let (opcode, negate) = match operator {
            "==" => ("equals", false),
            "!=" => ("equals", true),
            "===" => ("strictEquals", false),
            "!==" => ("strictEquals", true),
            "<" => ("lessThan", false),
            ">=" => ("lessThan", true),
            ">" => ("greaterThan", false),
            "<=" => ("greaterThan", true),
            "<<" => ("shiftLeft", false),
            ">>" => ("shiftRight", false),
            ">>>" => ("shiftRight2", false),
            "+" => ("add", false),
            "-" => ("subtract", false),
            "*" => ("multiply", false),
            "/" => ("divide", false),
            "%" => ("modulo", false),
            "|" => ("bitwiseAnd", false),
            "^" => ("bitwiseXor", false),
            "&" => ("bitwiseOr", false),
            "instanceof" => ("instanceOf", false),
            _ => {
                return Err(CodegenError::new(
                    CodegenErrorKind::UnimplementedFeature,
                    format!("Unsupported binary operator '{operator}'"),
                )
                .with_span(span));
            }
        };
        self.emit(opcode);
        if negate {
            self.emit("not");
        }
        Ok(())
    }

    fn emit_update(
        &mut self,
        span: NodeSpan,
        operator: &str,
        prefix: bool,
        argument: &Expression,
    ) -> Result<Emitted, CodegenError> {
        if prefix {
            return Err(CodegenError::new(
                CodegenErrorKind::UnimplementedFeature,
                "Prefix update expressions are not supported",
            )
            .with_span(span));
        }
        let opcode = match operator {
            "++" => "increment",
            "--" => "decrement",
            _ => {
                return Err(CodegenError::new(
                    CodegenErrorKind::UnimplementedFeature,
                    format!("Unsupported update operator '{operator}'"),
                )
                .with_span(span));
            }
        };
        let name = match &argument.kind {
            ExpressionKind::Identifier(name) => name,
            _ => {
                return Err(CodegenError::new(
                    CodegenErrorKind::UnimplementedFeature,
                    "Update expressions only apply to identifiers",
                )
                .with_span(argument.span));
            }
        };

        if let Some(register) = self.lookup_variable_register(name) {
            self.emit(&format!("push {register}"));
            self.emit(opcode);
            self.emit(&format!("setRegister {register}"));
            Ok(Emitted::Value)
        } else {
            // The setVariable round trip leaves nothing behind.
            self.emit(&format!("push {}", string_literal(name)));
            self.emit(&format!("push {}", string_literal(name)));
            self.emit("getVariable");
            self.emit(opcode);
            self.emit("setVariable");
            Ok(Emitted::Consumed)
        }
    }

    /// Assignment is a case analysis over the target shape, the value
    /// shape, and whether the parent offered to discard the result.
    fn emit_assignment(
        &mut self,
        span: NodeSpan,
        operator: &str,
        left: &Expression,
        right: &Expression,
        mode: ExprMode,
    ) -> Result<Emitted, CodegenError> {
        if operator != "=" {
            return Err(CodegenError::new(
                CodegenErrorKind::UnimplementedFeature,
                format!("Unsupported assignment operator '{operator}'"),
            )
            .with_span(span));
        }

        let target_register = match &left.kind {
            ExpressionKind::Identifier(name) => self.lookup_variable_register(name),
            ExpressionKind::Member { .. } => None,
            _ => {
                return Err(CodegenError::new(
                    CodegenErrorKind::UnimplementedFeature,
                    "Assignment target must be an identifier or member expression",
                )
                .with_span(left.span));
            }
        };
        let is_member = matches!(left.kind, ExpressionKind::Member { .. });
        let store_opcode = if is_member { "setMember" } else { "setVariable" };

        // Target lives in a register: setRegister leaves the value on the
        // stack for free.
        if let Some(register) = target_register {
            self.emit_expression(right, ExprMode::Value)?;
            self.emit(&format!("setRegister {register}"));
            if mode == ExprMode::Void {
                self.emit("pop");
                return Ok(Emitted::Consumed);
            }
            return Ok(Emitted::Value);
        }

        // The parent discards the result; let the store consume it.
        if mode == ExprMode::Void {
            self.emit_assignment_target(left)?;
            self.emit_expression(right, ExprMode::Value)?;
            self.emit(store_opcode);
            return Ok(Emitted::Consumed);
        }

        // Literals have no side effects, so the cheapest way to keep the
        // value is to push it twice.
        if right.kind.is_pushable_literal() {
            self.emit_assignment_target(left)?;
            self.emit_expression(right, ExprMode::Value)?;
            self.emit(store_opcode);
            self.emit_expression(right, ExprMode::Value)?;
            return Ok(Emitted::Value);
        }

        // Inside a function a scratch register preserves the value across
        // the consuming store.
        if !self.functions.is_empty() {
            self.emit_assignment_target(left)?;
            self.emit_expression(right, ExprMode::Value)?;
            let temp = match self.functions.peek_mut() {
                Some(ctx) => ctx
                    .alloc_temporary_register()
                    .map_err(|err| err.or_span(span))?,
                None => {
                    return Err(CodegenError::new(
                        CodegenErrorKind::Internal,
                        "Function stack empty while allocating a temporary",
                    )
                    .with_span(span));
                }
            };
            self.emit(&format!("setRegister {temp}"));
            self.emit(store_opcode);
            self.emit(&format!("push {temp}"));
            if let Some(ctx) = self.functions.peek_mut() {
                ctx.free_temporary_register(&temp);
            }
            return Ok(Emitted::Value);
        }

        // At the root there is no allocator, so borrow global register 1:
        // save its old value on the stack, park the assigned value in r:1
        // across the consuming store, push it back, then restore r:1 from
        // the saved copy and drop it.
        let borrowed = Register::bare(1);
        self.emit(&format!("push {borrowed}"));
        self.emit_assignment_target(left)?;
        self.emit_expression(right, ExprMode::Value)?;
        self.emit(&format!("setRegister {borrowed}"));
        self.emit(store_opcode);
        self.emit(&format!("push {borrowed}"));
        self.emit("swap");
        self.emit(&format!("setRegister {borrowed}"));
        self.emit("pop");
        Ok(Emitted::Value)
    }

    /// Push the parts of an assignment target the store opcode consumes:
    /// `'<name>'` for identifiers, object + property for members.
    fn emit_assignment_target(&mut self, left: &Expression) -> Result<(), CodegenError> {
        match &left.kind {
            ExpressionKind::Identifier(name) => {
                self.emit(&format!("push {}", string_literal(name)));
                Ok(())
            }
            ExpressionKind::Member { .. } => self.emit_member(left, MemberAccess::AddressOnly),
            _ => Err(CodegenError::new(
                CodegenErrorKind::UnimplementedFeature,
                "Assignment target must be an identifier or member expression",
            )
            .with_span(left.span)),
        }
    }
}

/// Render a string literal: single-quoted, with control characters and
/// quote/backslash escaped.
pub(crate) fn string_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\u{8}' => out.push_str("\\b"),
            '\u{c}' => out.push_str("\\f"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out.push('\'');
    out
}

/// Render a numeric literal the way source code wrote it: integral values
/// without a fraction, everything else in shortest form.
pub(crate) fn number_literal(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::GeneratorOptions;
    use crate::core::ast::{Function, Param};

    fn expr(kind: ExpressionKind) -> Expression {
        Expression::new(kind, NodeSpan::default())
    }

    fn ident(name: &str) -> Expression {
        expr(ExpressionKind::Identifier(name.to_string()))
    }

    fn num(value: f64) -> Expression {
        expr(ExpressionKind::NumericLiteral(value))
    }

    fn emit_value(expression: &Expression) -> Vec<String> {
        let mut gen = Generator::new(GeneratorOptions::default());
        gen.emit_expression(expression, ExprMode::Value).unwrap();
        gen.into_parts().0
    }

    fn emit_value_err(expression: &Expression) -> CodegenError {
        let mut gen = Generator::new(GeneratorOptions::default());
        gen.emit_expression(expression, ExprMode::Value).unwrap_err()
    }

    #[test]
    fn literals_push_their_rendered_form() {
        assert_eq!(emit_value(&num(123.0)), vec!["push 123"]);
        assert_eq!(emit_value(&num(1.5)), vec!["push 1.5"]);
        assert_eq!(
            emit_value(&expr(ExpressionKind::BooleanLiteral(true))),
            vec!["push TRUE"]
        );
        assert_eq!(emit_value(&ident("undefined")), vec!["push UNDEF"]);
        assert_eq!(
            emit_value(&expr(ExpressionKind::StringLiteral("a\tb".to_string()))),
            vec!["push 'a\\tb'"]
        );
    }

    #[test]
    fn global_identifier_loads_through_getvariable() {
        assert_eq!(emit_value(&ident("score")), vec!["push 'score'", "getVariable"]);
    }

    #[test]
    fn template_literal_folds_left_to_right() {
        let template = expr(ExpressionKind::TemplateLiteral {
            quasis: vec!["a".to_string(), "b".to_string()],
            expressions: vec![ident("n")],
        });
        assert_eq!(
            emit_value(&template),
            vec![
                "push ''",
                "push 'a'",
                "push 'n'",
                "getVariable",
                "add",
                "add",
                "push 'b'",
                "add",
            ]
        );
    }

    #[test]
    fn array_elements_push_in_reverse() {
        let array = expr(ExpressionKind::Array(vec![num(1.0), num(2.0), num(3.0)]));
        assert_eq!(
            emit_value(&array),
            vec!["push 3", "push 2", "push 1", "push 3", "initArray"]
        );
    }

    #[test]
    fn new_expression_pushes_argc_and_class() {
        let new = expr(ExpressionKind::New {
            callee: Box::new(ident("Point")),
            arguments: vec![num(4.0), num(5.0)],
        });
        assert_eq!(
            emit_value(&new),
            vec!["push 5", "push 4", "push 2", "push 'Point'", "new"]
        );
    }

    #[test]
    fn call_of_global_function_skips_getvariable_on_callee() {
        let call = expr(ExpressionKind::Call {
            callee: Box::new(ident("f")),
            arguments: vec![num(7.0)],
        });
        assert_eq!(
            emit_value(&call),
            vec!["push 7", "push 1", "push 'f'", "callFunction"]
        );
    }

    #[test]
    fn method_call_goes_through_callmethod() {
        let call = expr(ExpressionKind::Call {
            callee: Box::new(expr(ExpressionKind::Member {
                object: Box::new(ident("obj")),
                property: Box::new(ident("run")),
                computed: false,
            })),
            arguments: vec![],
        });
        assert_eq!(
            emit_value(&call),
            vec![
                "push 0",
                "push 'obj'",
                "getVariable",
                "push 'run'",
                "callMethod"
            ]
        );
    }

    #[test]
    fn trace_is_rejected() {
        let call = expr(ExpressionKind::Call {
            callee: Box::new(ident("trace")),
            arguments: vec![num(1.0)],
        });
        assert_eq!(
            emit_value_err(&call).kind(),
            CodegenErrorKind::UnsupportedIntrinsic
        );
    }

    #[test]
    fn int_requires_exactly_one_argument() {
        let good = expr(ExpressionKind::Call {
            callee: Box::new(ident("int")),
            arguments: vec![num(2.5)],
        });
        assert_eq!(emit_value(&good), vec!["push 2.5", "int"]);

        let bad = expr(ExpressionKind::Call {
            callee: Box::new(ident("int")),
            arguments: vec![],
        });
        assert_eq!(emit_value_err(&bad).kind(), CodegenErrorKind::WrongArity);
    }

    #[test]
    fn negated_comparisons_append_not() {
        let le = expr(ExpressionKind::Binary {
            operator: "<=".to_string(),
            left: Box::new(num(1.0)),
            right: Box::new(num(2.0)),
        });
        assert_eq!(
            emit_value(&le),
            vec!["push 1", "push 2", "greaterThan", "not"]
        );
    }

    #[test]
    fn bitwise_opcodes_follow_the_assembler_mapping() {
        let or = expr(ExpressionKind::Binary {
            operator: "|".to_string(),
            left: Box::new(num(1.0)),
            right: Box::new(num(2.0)),
        });
        assert_eq!(
            emit_value(&or),
            vec!["push 1", "push 2", "bitwiseAnd"]
        );
        let and = expr(ExpressionKind::Binary {
            operator: "&".to_string(),
            left: Box::new(num(1.0)),
            right: Box::new(num(2.0)),
        });
        assert_eq!(
            emit_value(&and),
            vec!["push 1", "push 2", "bitwiseOr"]
        );
    }

    #[test]
    fn unsupported_binary_operator_is_rejected() {
        let op = expr(ExpressionKind::Binary {
            operator: "&&".to_string(),
            left: Box::new(num(1.0)),
            right: Box::new(num(2.0)),
        });
        assert_eq!(
            emit_value_err(&op).kind(),
            CodegenErrorKind::UnimplementedFeature
        );
    }

    #[test]
    fn postfix_update_on_global_round_trips_through_setvariable() {
        let update = expr(ExpressionKind::Update {
            operator: "++".to_string(),
            prefix: false,
            argument: Box::new(ident("i")),
        });
        assert_eq!(
            emit_value(&update),
            vec![
                "push 'i'",
                "push 'i'",
                "getVariable",
                "increment",
                "setVariable"
            ]
        );
    }

    #[test]
    fn prefix_update_is_rejected() {
        let update = expr(ExpressionKind::Update {
            operator: "--".to_string(),
            prefix: true,
            argument: Box::new(ident("i")),
        });
        assert_eq!(
            emit_value_err(&update).kind(),
            CodegenErrorKind::UnimplementedFeature
        );
    }

    #[test]
    fn this_outside_function_is_rejected() {
        let err = emit_value_err(&expr(ExpressionKind::This));
        assert_eq!(err.kind(), CodegenErrorKind::ThisOutsideFunction);
    }

    #[test]
    fn root_value_assignment_borrows_register_one() {
        // x = f() used as a value at the root.
        let assignment = expr(ExpressionKind::Assignment {
            operator: "=".to_string(),
            left: Box::new(ident("x")),
            right: Box::new(expr(ExpressionKind::Call {
                callee: Box::new(ident("f")),
                arguments: vec![],
            })),
        });
        assert_eq!(
            emit_value(&assignment),
            vec![
                "push r:1",
                "push 'x'",
                "push 0",
                "push 'f'",
                "callFunction",
                "setRegister r:1",
                "setVariable",
                "push r:1",
                "swap",
                "setRegister r:1",
                "pop",
            ]
        );
    }

    #[test]
    fn compound_assignment_is_rejected() {
        let assignment = expr(ExpressionKind::Assignment {
            operator: "+=".to_string(),
            left: Box::new(ident("x")),
            right: Box::new(num(1.0)),
        });
        assert_eq!(
            emit_value_err(&assignment).kind(),
            CodegenErrorKind::UnimplementedFeature
        );
    }

    #[test]
    fn function_expression_compiles_to_anonymous_function2() {
        let func = expr(ExpressionKind::Function(Function {
            name: None,
            params: vec![Param {
                name: "v".to_string(),
                span: NodeSpan::default(),
            }],
            body: vec![],
            span: NodeSpan::default(),
        }));
        assert_eq!(
            emit_value(&func),
            vec!["function2 (r:2='v') (r:1='this')", "end"]
        );
    }

    #[test]
    fn string_literal_escapes() {
        assert_eq!(string_literal("it's"), "'it\\'s'");
        assert_eq!(string_literal("a\\b"), "'a\\\\b'");
        assert_eq!(string_literal("\u{8}\u{c}\n\r\t"), "'\\b\\f\\n\\r\\t'");
    }

    #[test]
    fn number_literal_renders_integers_bare() {
        assert_eq!(number_literal(0.0), "0");
        assert_eq!(number_literal(-3.0), "-3");
        assert_eq!(number_literal(0.25), "0.25");
    }
}
