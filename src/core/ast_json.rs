// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Loads the AST from the JSON serialization of a mainstream JavaScript
//! parser (the `@babel/parser` shape).
//!
//! Conversion is deliberate manual `Value` walking. Node kinds outside the
//! supported subset surface as *UnimplementedNode* / *UnimplementedFeature*
//! here, carrying the node's span so the CLI can frame the source.

use serde_json::Value;

use crate::core::ast::{
    Comment, Expression, ExpressionKind, Function, NodeSpan, Param, Program, Statement,
    StatementKind, VariableDeclarator,
};
use crate::core::error::{CodegenError, CodegenErrorKind};

type Result<T> = std::result::Result<T, CodegenError>;

/// Convert a parsed JSON document (a `File` or `Program` node) into a
/// [`Program`].
pub fn program_from_value(value: &Value) -> Result<Program> {
    let node = match node_type(value)? {
        "File" => field(value, "program")?,
        _ => value,
    };
    if node_type(node)? != "Program" {
        return Err(unimplemented_node(node_type(node)?, span_of(node)));
    }
    let body = array_field(node, "body")?;
    let mut statements = Vec::with_capacity(body.len());
    for stmt in body {
        statements.push(statement_from_value(stmt)?);
    }
    Ok(Program { body: statements })
}

fn statement_from_value(value: &Value) -> Result<Statement> {
    let span = span_of(value);
    let kind = match node_type(value)? {
        "ExpressionStatement" => {
            StatementKind::Expression(expression_from_value(field(value, "expression")?)?)
        }
        "VariableDeclaration" => {
            let kind = string_field(value, "kind")?;
            let mut declarations = Vec::new();
            for decl in array_field(value, "declarations")? {
                declarations.push(declarator_from_value(decl)?);
            }
            StatementKind::VariableDeclaration { kind, declarations }
        }
        "BlockStatement" => {
            let mut body = Vec::new();
            for stmt in array_field(value, "body")? {
                body.push(statement_from_value(stmt)?);
            }
            StatementKind::Block(body)
        }
        "EmptyStatement" => StatementKind::Empty,
        "IfStatement" => StatementKind::If {
            test: expression_from_value(field(value, "test")?)?,
            consequent: Box::new(statement_from_value(field(value, "consequent")?)?),
            alternate: match optional_field(value, "alternate") {
                Some(alt) => Some(Box::new(statement_from_value(alt)?)),
                None => None,
            },
        },
        "WhileStatement" => StatementKind::While {
            test: expression_from_value(field(value, "test")?)?,
            body: Box::new(statement_from_value(field(value, "body")?)?),
        },
        "BreakStatement" => StatementKind::Break {
            label: match optional_field(value, "label") {
                Some(label) => Some(identifier_name(label)?),
                None => None,
            },
        },
        "ReturnStatement" => StatementKind::Return {
            argument: match optional_field(value, "argument") {
                Some(arg) => Some(expression_from_value(arg)?),
                None => None,
            },
        },
        "FunctionDeclaration" => {
            let name = match optional_field(value, "id") {
                Some(id) => Some(identifier_name(id)?),
                None => None,
            };
            StatementKind::FunctionDeclaration(function_from_value(value, name)?)
        }
        other => return Err(unimplemented_node(other, span)),
    };

    let mut statement = Statement::new(kind, span);
    statement.leading_comments = comments_field(value, "leadingComments")?;
    statement.trailing_comments = comments_field(value, "trailingComments")?;
    Ok(statement)
}

fn declarator_from_value(value: &Value) -> Result<VariableDeclarator> {
    let span = span_of(value);
    if node_type(value)? != "VariableDeclarator" {
        return Err(unimplemented_node(node_type(value)?, span));
    }
    let id = field(value, "id")?;
    if node_type(id)? != "Identifier" {
        return Err(CodegenError::new(
            CodegenErrorKind::UnimplementedFeature,
            "Only identifier declarators are supported",
        )
        .with_span(span_of(id)));
    }
    Ok(VariableDeclarator {
        name: string_field(id, "name")?,
        init: match optional_field(value, "init") {
            Some(init) => Some(expression_from_value(init)?),
            None => None,
        },
        span,
    })
}

fn function_from_value(value: &Value, name: Option<String>) -> Result<Function> {
    let span = span_of(value);
    let mut params = Vec::new();
    for param in array_field(value, "params")? {
        if node_type(param)? != "Identifier" {
            return Err(CodegenError::new(
                CodegenErrorKind::UnimplementedFeature,
                "Only identifier parameters are supported",
            )
            .with_span(span_of(param)));
        }
        params.push(Param {
            name: string_field(param, "name")?,
            span: span_of(param),
        });
    }
    let body = field(value, "body")?;
    if node_type(body)? != "BlockStatement" {
        return Err(unimplemented_node(node_type(body)?, span_of(body)));
    }
    let mut statements = Vec::new();
    for stmt in array_field(body, "body")? {
        statements.push(statement_from_value(stmt)?);
    }
    Ok(Function {
        name,
        params,
        body: statements,
        span,
    })
}

fn expression_from_value(value: &Value) -> Result<Expression> {
    let span = span_of(value);
    let kind = match node_type(value)? {
        "NumericLiteral" => ExpressionKind::NumericLiteral(f64_field(value, "value")?),
        "StringLiteral" => ExpressionKind::StringLiteral(string_field(value, "value")?),
        "BooleanLiteral" => ExpressionKind::BooleanLiteral(bool_field(value, "value")?),
        "NullLiteral" => ExpressionKind::NullLiteral,
        "BigIntLiteral" => ExpressionKind::BigIntLiteral(string_field(value, "value")?),
        "RegExpLiteral" => ExpressionKind::RegExpLiteral {
            pattern: string_field(value, "pattern")?,
            flags: string_field(value, "flags")?,
        },
        "Identifier" => ExpressionKind::Identifier(string_field(value, "name")?),
        "ThisExpression" => ExpressionKind::This,
        "TemplateLiteral" => {
            let mut quasis = Vec::new();
            for quasi in array_field(value, "quasis")? {
                let cooked = field(quasi, "value").and_then(|v| string_field(v, "cooked"))?;
                quasis.push(cooked);
            }
            let mut expressions = Vec::new();
            for expr in array_field(value, "expressions")? {
                expressions.push(expression_from_value(expr)?);
            }
            ExpressionKind::TemplateLiteral { quasis, expressions }
        }
        "ArrayExpression" => {
            let mut elements = Vec::new();
            for element in array_field(value, "elements")? {
                if element.is_null() {
                    return Err(CodegenError::new(
                        CodegenErrorKind::UnimplementedFeature,
                        "Array holes are not supported",
                    )
                    .with_span(span));
                }
                elements.push(expression_from_value(element)?);
            }
            ExpressionKind::Array(elements)
        }
        "MemberExpression" => ExpressionKind::Member {
            object: Box::new(expression_from_value(field(value, "object")?)?),
            property: Box::new(expression_from_value(field(value, "property")?)?),
            computed: bool_field(value, "computed")?,
        },
        "NewExpression" => ExpressionKind::New {
            callee: Box::new(expression_from_value(field(value, "callee")?)?),
            arguments: expressions_field(value, "arguments")?,
        },
        "CallExpression" => ExpressionKind::Call {
            callee: Box::new(expression_from_value(field(value, "callee")?)?),
            arguments: expressions_field(value, "arguments")?,
        },
        "BinaryExpression" => ExpressionKind::Binary {
            operator: string_field(value, "operator")?,
            left: Box::new(expression_from_value(field(value, "left")?)?),
            right: Box::new(expression_from_value(field(value, "right")?)?),
        },
        "UnaryExpression" => ExpressionKind::Unary {
            operator: string_field(value, "operator")?,
            prefix: bool_field(value, "prefix").unwrap_or(true),
            argument: Box::new(expression_from_value(field(value, "argument")?)?),
        },
        "UpdateExpression" => ExpressionKind::Update {
            operator: string_field(value, "operator")?,
            prefix: bool_field(value, "prefix")?,
            argument: Box::new(expression_from_value(field(value, "argument")?)?),
        },
        "AssignmentExpression" => ExpressionKind::Assignment {
            operator: string_field(value, "operator")?,
            left: Box::new(expression_from_value(field(value, "left")?)?),
            right: Box::new(expression_from_value(field(value, "right")?)?),
        },
        "FunctionExpression" => ExpressionKind::Function(function_from_value(value, None)?),
        other => return Err(unimplemented_node(other, span)),
    };
    Ok(Expression::new(kind, span))
}

fn expressions_field(value: &Value, name: &str) -> Result<Vec<Expression>> {
    let mut out = Vec::new();
    for entry in array_field(value, name)? {
        out.push(expression_from_value(entry)?);
    }
    Ok(out)
}

fn comments_field(value: &Value, name: &str) -> Result<Vec<Comment>> {
    let entries = match optional_field(value, name) {
        Some(Value::Array(entries)) => entries,
        _ => return Ok(Vec::new()),
    };
    let mut out = Vec::new();
    for entry in entries {
        let block = match node_type(entry)? {
            "CommentLine" => false,
            "CommentBlock" => true,
            other => return Err(unimplemented_node(other, span_of(entry))),
        };
        out.push(Comment {
            block,
            text: string_field(entry, "value")?,
            span: span_of(entry),
        });
    }
    Ok(out)
}

fn identifier_name(value: &Value) -> Result<String> {
    if node_type(value)? != "Identifier" {
        return Err(unimplemented_node(node_type(value)?, span_of(value)));
    }
    string_field(value, "name")
}

fn node_type(value: &Value) -> Result<&str> {
    value
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| malformed("node without a type tag"))
}

fn span_of(value: &Value) -> NodeSpan {
    let start = value.get("start").and_then(Value::as_u64).unwrap_or(0) as u32;
    let end = value.get("end").and_then(Value::as_u64).unwrap_or(start as u64) as u32;
    let loc_start = value.get("loc").and_then(|loc| loc.get("start"));
    let line = loc_start
        .and_then(|pos| pos.get("line"))
        .and_then(Value::as_u64)
        .unwrap_or(0) as u32;
    let column = loc_start
        .and_then(|pos| pos.get("column"))
        .and_then(Value::as_u64)
        .unwrap_or(0) as u32;
    NodeSpan {
        start,
        end,
        line,
        column,
    }
}

fn field<'a>(value: &'a Value, name: &str) -> Result<&'a Value> {
    value
        .get(name)
        .filter(|v| !v.is_null())
        .ok_or_else(|| malformed(&format!("missing field '{name}'")))
}

fn optional_field<'a>(value: &'a Value, name: &str) -> Option<&'a Value> {
    value.get(name).filter(|v| !v.is_null())
}

fn array_field<'a>(value: &'a Value, name: &str) -> Result<&'a Vec<Value>> {
    field(value, name)?
        .as_array()
        .ok_or_else(|| malformed(&format!("field '{name}' is not an array")))
}

fn string_field(value: &Value, name: &str) -> Result<String> {
    Ok(field(value, name)?
        .as_str()
        .ok_or_else(|| malformed(&format!("field '{name}' is not a string")))?
        .to_string())
}

fn f64_field(value: &Value, name: &str) -> Result<f64> {
    field(value, name)?
        .as_f64()
        .ok_or_else(|| malformed(&format!("field '{name}' is not a number")))
}

fn bool_field(value: &Value, name: &str) -> Result<bool> {
    field(value, name)?
        .as_bool()
        .ok_or_else(|| malformed(&format!("field '{name}' is not a boolean")))
}

fn malformed(detail: &str) -> CodegenError {
    CodegenError::new(
        CodegenErrorKind::UnimplementedNode,
        format!("Malformed AST input: {detail}"),
    )
}

fn unimplemented_node(kind: &str, span: NodeSpan) -> CodegenError {
    CodegenError::new(
        CodegenErrorKind::UnimplementedNode,
        format!("Unsupported AST node: {kind}"),
    )
    .with_span(span)
}
