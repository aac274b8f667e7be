// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Symbolic stack simulation over the emitted instruction stream.
//!
//! Each instruction line is right-padded and suffixed with a `// ...`
//! reconstruction of the stack it leaves behind, as a human verification
//! aid. The simulator cannot track control flow: the first `branch` or
//! `branchIfTrue` inside a function suppresses annotation for the rest of
//! that function. It is a debugging aid, not a verifier, with one
//! exception: a `return` with more than one value on the stack is a hard
//! error.

use std::collections::HashMap;

use crate::core::error::{CodegenError, CodegenErrorKind};

/// One function's symbolic stack. The simulator keeps a stack of these,
/// entered by `function2` and left by `end`.
#[derive(Debug, Default)]
struct FunctionSim {
    stack: Vec<String>,
    /// Values parked by `setRegister`, recalled when the register is
    /// pushed again.
    registers: HashMap<String, String>,
    suppressed: bool,
    /// Nested `function2` depth seen while suppressed, so the matching
    /// `end` is still found.
    nested: u32,
}

/// Annotate the (coalesced) instruction lines with symbolic stack contents.
pub fn annotate_lines(lines: &[String]) -> Result<Vec<String>, CodegenError> {
    let width = annotation_width(lines);
    let mut sims = vec![FunctionSim::default()];
    let mut in_block_comment = false;
    let mut out = Vec::with_capacity(lines.len());
    for line in lines {
        out.push(process_line(line, width, &mut sims, &mut in_block_comment)?);
    }
    Ok(out)
}

/// 4 columns past the longest line that can carry an annotation.
fn annotation_width(lines: &[String]) -> usize {
    let mut in_block_comment = false;
    let mut longest = 0;
    for line in lines {
        let trimmed = line.trim_start();
        if in_block_comment {
            if trimmed.contains("*/") {
                in_block_comment = false;
            }
            continue;
        }
        if trimmed.starts_with("//") || trimmed.starts_with("--]]*/") {
            continue;
        }
        if trimmed.starts_with("/*") {
            if !trimmed.contains("*/") {
                in_block_comment = true;
            }
            continue;
        }
        if trimmed.starts_with("function2") {
            continue;
        }
        longest = longest.max(line.chars().count());
    }
    longest + 4
}

fn process_line(
    line: &str,
    width: usize,
    sims: &mut Vec<FunctionSim>,
    in_block_comment: &mut bool,
) -> Result<String, CodegenError> {
    let trimmed = line.trim_start();

    if *in_block_comment {
        if trimmed.contains("*/") {
            *in_block_comment = false;
        }
        return Ok(line.to_string());
    }
    if trimmed.starts_with("//") || trimmed.starts_with("--]]*/") || trimmed.is_empty() {
        return Ok(line.to_string());
    }
    if trimmed.starts_with("/*") {
        if !trimmed.contains("*/") {
            *in_block_comment = true;
        }
        return Ok(line.to_string());
    }
    if trimmed.trim_end().ends_with(':') {
        return Ok(line.to_string());
    }

    let (opcode, operands) = split_instruction(trimmed);

    if current(sims).suppressed {
        return Ok(process_suppressed(line, width, sims, opcode));
    }

    match opcode {
        "function2" => {
            // An anonymous function leaves a function value behind in the
            // enclosing frame.
            if !operands.trim_start().starts_with('\'') {
                current(sims).stack.push("function".to_string());
            }
            sims.push(FunctionSim::default());
            return Ok(annotate(line, width, &current(sims).stack));
        }
        "end" => {
            if sims.len() > 1 {
                sims.pop();
            } else {
                current(sims).stack.clear();
            }
            return Ok(annotate_or_pass(line, width, sims));
        }
        _ => {}
    }

    let mut suppress_after = false;
    apply_opcode(opcode, operands, current(sims), &mut suppress_after)?;
    let annotated = annotate(line, width, &current(sims).stack);
    if suppress_after {
        current(sims).suppressed = true;
    }
    Ok(annotated)
}

fn process_suppressed(
    line: &str,
    width: usize,
    sims: &mut Vec<FunctionSim>,
    opcode: &str,
) -> String {
    match opcode {
        "function2" => {
            current(sims).nested += 1;
            line.to_string()
        }
        "end" => {
            if current(sims).nested > 0 {
                current(sims).nested -= 1;
                return line.to_string();
            }
            if sims.len() > 1 {
                sims.pop();
            } else {
                let sim = current(sims);
                sim.suppressed = false;
                sim.stack.clear();
            }
            annotate_or_pass(line, width, sims)
        }
        _ => line.to_string(),
    }
}

fn apply_opcode(
    opcode: &str,
    operands: &str,
    sim: &mut FunctionSim,
    suppress_after: &mut bool,
) -> Result<(), CodegenError> {
    match opcode {
        "push" => {
            for token in split_push_operands(operands) {
                let value = sim.registers.get(&token).cloned().unwrap_or(token);
                sim.stack.push(value);
            }
        }
        "pop" => {
            sim.stack.pop();
        }
        "getVariable" => {
            let token = pop_operand(sim);
            sim.stack.push(match unquote(&token) {
                Some(inner) => inner.to_string(),
                None => token,
            });
        }
        "getMember" => {
            let property = pop_operand(sim);
            let object = pop_operand(sim);
            let rendered = match unquote(&property) {
                Some(name) if is_identifier_like(name) => format!("{object}.{name}"),
                _ => format!("{object}[{property}]"),
            };
            sim.stack.push(rendered);
        }
        "setVariable" => drop_values(sim, 2),
        "setMember" => drop_values(sim, 3),
        "setRegister" => {
            if let Some(value) = sim.stack.last() {
                let target = strip_debug_tag(operands.trim()).to_string();
                sim.registers.insert(target, value.clone());
            }
        }
        "swap" => {
            let top = pop_operand(sim);
            let below = pop_operand(sim);
            sim.stack.push(top);
            sim.stack.push(below);
        }
        "not" => {
            let value = pop_operand(sim);
            sim.stack.push(format!("!({value})"));
        }
        "increment" => {
            let value = pop_operand(sim);
            sim.stack.push(format!("{} + 1", wrap_operand(&value, "+")));
        }
        "decrement" => {
            let value = pop_operand(sim);
            sim.stack.push(format!("{} - 1", wrap_operand(&value, "-")));
        }
        "int" => {
            let value = pop_operand(sim);
            sim.stack.push(format!("int({value})"));
        }
        "new" => {
            let class = pop_operand(sim);
            let class = unquote(&class).unwrap_or(&class).to_string();
            let args = pop_arguments(sim);
            sim.stack.push(format!("new {class}({})", args.join(", ")));
        }
        "callFunction" => {
            let name = pop_operand(sim);
            let name = unquote(&name).unwrap_or(&name).to_string();
            let args = pop_arguments(sim);
            sim.stack.push(format!("{name}({})", args.join(", ")));
        }
        "callMethod" => {
            let name = pop_operand(sim);
            let name = unquote(&name).unwrap_or(&name).to_string();
            let object = pop_operand(sim);
            let args = pop_arguments(sim);
            sim.stack
                .push(format!("{object}.{name}({})", args.join(", ")));
        }
        "initArray" => {
            let args = pop_arguments(sim);
            sim.stack.push(format!("[{}]", args.join(", ")));
        }
        "branchIfTrue" => {
            sim.stack.pop();
            *suppress_after = true;
        }
        "branch" => {
            *suppress_after = true;
        }
        "return" => {
            if sim.stack.len() > 1 {
                return Err(CodegenError::new(
                    CodegenErrorKind::StackInvariantViolation,
                    format!(
                        "return with {} values on the stack: {}",
                        sim.stack.len(),
                        sim.stack.join("|")
                    ),
                ));
            }
            sim.stack.pop();
        }
        _ => {
            if let Some(symbol) = binary_symbol(opcode) {
                let right = pop_operand(sim);
                let left = pop_operand(sim);
                sim.stack.push(format!(
                    "{} {symbol} {}",
                    wrap_operand(&left, symbol),
                    wrap_operand(&right, symbol)
                ));
            }
            // Unknown opcodes have no tracked stack effect.
        }
    }
    Ok(())
}

fn current(sims: &mut Vec<FunctionSim>) -> &mut FunctionSim {
    if sims.is_empty() {
        sims.push(FunctionSim::default());
    }
    let last = sims.len() - 1;
    &mut sims[last]
}

fn annotate(line: &str, width: usize, stack: &[String]) -> String {
    let contents = if stack.is_empty() {
        "--".to_string()
    } else {
        stack.join("|")
    };
    format!("{line:<width$}// {contents}")
}

fn annotate_or_pass(line: &str, width: usize, sims: &mut Vec<FunctionSim>) -> String {
    let sim = current(sims);
    if sim.suppressed {
        line.to_string()
    } else {
        annotate(line, width, &sim.stack)
    }
}

fn split_instruction(trimmed: &str) -> (&str, &str) {
    match trimmed.split_once(' ') {
        Some((opcode, operands)) => (opcode, operands),
        None => (trimmed, ""),
    }
}

fn pop_operand(sim: &mut FunctionSim) -> String {
    sim.stack.pop().unwrap_or_else(|| "?".to_string())
}

fn drop_values(sim: &mut FunctionSim, count: usize) {
    for _ in 0..count {
        sim.stack.pop();
    }
}

/// Pop an argument count, then splice that many entries off the stack top.
/// Arguments were pushed in reverse, so the spliced slice is reversed back
/// into source order.
fn pop_arguments(sim: &mut FunctionSim) -> Vec<String> {
    let count = pop_operand(sim).parse::<usize>().unwrap_or(0);
    let count = count.min(sim.stack.len());
    let mut args = sim.stack.split_off(sim.stack.len() - count);
    args.reverse();
    args
}

/// Split a coalesced `push` operand list on commas, respecting single and
/// double quotes and backslash escapes. Debug-tag comments are dropped
/// from the symbolic tokens.
fn split_push_operands(operands: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut token = String::new();
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for ch in operands.chars() {
        if escaped {
            token.push(ch);
            escaped = false;
            continue;
        }
        match ch {
            '\\' if quote.is_some() => {
                token.push(ch);
                escaped = true;
            }
            '\'' | '"' => {
                match quote {
                    Some(open) if open == ch => quote = None,
                    None => quote = Some(ch),
                    _ => {}
                }
                token.push(ch);
            }
            ',' if quote.is_none() => {
                push_token(&mut out, &token);
                token.clear();
            }
            _ => token.push(ch),
        }
    }
    push_token(&mut out, &token);
    out
}

fn push_token(out: &mut Vec<String>, token: &str) {
    let token = strip_debug_tag(token.trim());
    if !token.is_empty() {
        out.push(token.to_string());
    }
}

/// Drop a trailing ` /*...*/` debug tag from a register operand.
fn strip_debug_tag(token: &str) -> &str {
    if token.ends_with("*/") {
        if let Some(at) = token.rfind(" /*") {
            return token[..at].trim_end();
        }
    }
    token
}

fn unquote(token: &str) -> Option<&str> {
    if token.len() >= 2 && token.starts_with('\'') && token.ends_with('\'') {
        Some(&token[1..token.len() - 1])
    } else {
        None
    }
}

fn is_identifier_like(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' || first == '$' => {}
        _ => return false,
    }
    chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '$')
}

fn binary_symbol(opcode: &str) -> Option<&'static str> {
    Some(match opcode {
        "add" => "+",
        "subtract" => "-",
        "multiply" => "*",
        "divide" => "/",
        "modulo" => "%",
        "equals" => "==",
        "strictEquals" => "===",
        "lessThan" => "<",
        "greaterThan" => ">",
        "shiftLeft" => "<<",
        "shiftRight" => ">>",
        "shiftRight2" => ">>>",
        "bitwiseAnd" => "&",
        "bitwiseOr" => "|",
        "bitwiseXor" => "^",
        "instanceOf" => "instanceof",
        _ => return None,
    })
}

/// Parenthesize an operand if the operator symbol already occurs in it at
/// an unquoted, unparenthesized position. Prevents visually incorrect
/// associativity in the rendered expression.
fn wrap_operand(operand: &str, symbol: &str) -> String {
    if contains_top_level(operand, symbol) {
        format!("({operand})")
    } else {
        operand.to_string()
    }
}

fn contains_top_level(text: &str, symbol: &str) -> bool {
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut depth: u32 = 0;
    for (index, ch) in text.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if quote.is_some() => escaped = true,
            '\'' | '"' => match quote {
                Some(open) if open == ch => quote = None,
                None => quote = Some(ch),
                _ => {}
            },
            '(' | '[' if quote.is_none() => depth += 1,
            ')' | ']' if quote.is_none() => depth = depth.saturating_sub(1),
            _ => {
                if quote.is_none() && depth == 0 && text[index..].starts_with(symbol) {
                    return true;
                }
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(input: &[&str]) -> Vec<String> {
        input.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn annotates_pushes_and_stores() {
        let input = lines(&["push 'a', 'b', 123", "setVariable", "push 123", "setVariable"]);
        let out = annotate_lines(&input).unwrap();
        // Longest line is `push 'a', 'b', 123` (18 chars) -> width 22.
        assert_eq!(out[0], "push 'a', 'b', 123    // 'a'|'b'|123");
        assert_eq!(out[1], "setVariable           // 'a'");
        assert_eq!(out[2], "push 123              // 'a'|123");
        assert_eq!(out[3], "setVariable           // --");
    }

    #[test]
    fn getvariable_unquotes_the_name() {
        let input = lines(&["push 'n'", "getVariable"]);
        let out = annotate_lines(&input).unwrap();
        assert!(out[1].ends_with("// n"));
    }

    #[test]
    fn getmember_renders_dotted_access() {
        let input = lines(&["push 'atv'", "getVariable", "push 'bar'", "getMember"]);
        let out = annotate_lines(&input).unwrap();
        assert!(out[3].ends_with("// atv.bar"));

        let computed = lines(&["push 'atv'", "getVariable", "push 3", "getMember"]);
        let out = annotate_lines(&computed).unwrap();
        assert!(out[3].ends_with("// atv[3]"));
    }

    #[test]
    fn calls_render_arguments_in_source_order() {
        let input = lines(&["push 2, 1, 2, 'f'", "callFunction"]);
        let out = annotate_lines(&input).unwrap();
        assert!(out[1].ends_with("// f(1, 2)"));
    }

    #[test]
    fn method_calls_render_receiver_and_name() {
        let input = lines(&[
            "push 1, 1, 'obj'",
            "getVariable",
            "push 'run'",
            "callMethod",
        ]);
        let out = annotate_lines(&input).unwrap();
        assert!(out[3].ends_with("// obj.run(1)"));
    }

    #[test]
    fn new_renders_constructor_call() {
        let input = lines(&["push 5, 4, 2, 'Point'", "new"]);
        let out = annotate_lines(&input).unwrap();
        assert!(out[1].ends_with("// new Point(4, 5)"));
    }

    #[test]
    fn binary_operands_parenthesize_on_symbol_collision() {
        let input = lines(&["push 'x', r:2, 1", "add", "add"]);
        let out = annotate_lines(&input).unwrap();
        assert!(out[1].ends_with("// 'x'|r:2 + 1"));
        assert!(out[2].ends_with("// 'x' + (r:2 + 1)"));
    }

    #[test]
    fn quoted_symbols_do_not_force_parens() {
        let input = lines(&["push 'a+b', 1", "add"]);
        let out = annotate_lines(&input).unwrap();
        assert!(out[1].ends_with("// 'a+b' + 1"));
    }

    #[test]
    fn comments_and_labels_pass_through_unchanged() {
        let input = lines(&[
            "// a note",
            "/*--[[ var x = 1;",
            "var y = 2;",
            "--]]*/",
            "test_1:",
            "push 1",
        ]);
        let out = annotate_lines(&input).unwrap();
        assert_eq!(out[0], input[0]);
        assert_eq!(out[1], input[1]);
        assert_eq!(out[2], input[2]);
        assert_eq!(out[3], input[3]);
        assert_eq!(out[4], input[4]);
        assert!(out[5].starts_with("push 1"));
        assert!(out[5].ends_with("// 1"));
    }

    #[test]
    fn branch_suppresses_the_rest_of_the_function() {
        let input = lines(&[
            "function2 'f' () (r:1='this')",
            "  push 'n'",
            "  getVariable",
            "  not",
            "  branchIfTrue end_1",
            "  push 1",
            "  pop",
            "end // of function f",
        ]);
        let out = annotate_lines(&input).unwrap();
        assert!(out[1].contains("//"));
        assert!(out[4].contains("//"), "the branch line itself is annotated");
        assert_eq!(out[5], input[5], "lines after the branch pass through");
        assert_eq!(out[6], input[6]);
        assert!(out[7].contains("// --"), "end annotates from the outer frame");
    }

    #[test]
    fn anonymous_function2_pushes_a_function_value_outside() {
        let input = lines(&[
            "push 'handler'",
            "function2 () (r:1='this')",
            "end",
            "setVariable",
        ]);
        let out = annotate_lines(&input).unwrap();
        assert!(out[2].ends_with("// 'handler'|function"));
        assert!(out[3].ends_with("// --"));
    }

    #[test]
    fn named_function2_does_not_touch_the_outer_stack() {
        let input = lines(&["function2 'f' () (r:1='this')", "end // of function f"]);
        let out = annotate_lines(&input).unwrap();
        assert!(out[1].ends_with("// --"));
    }

    #[test]
    fn return_with_excess_stack_is_an_error() {
        let input = lines(&["push 1, 2", "return"]);
        let err = annotate_lines(&input).unwrap_err();
        assert_eq!(err.kind(), CodegenErrorKind::StackInvariantViolation);
    }

    #[test]
    fn return_with_one_value_is_fine() {
        let input = lines(&["push 1", "return"]);
        let out = annotate_lines(&input).unwrap();
        assert!(out[1].ends_with("// --"));
    }

    #[test]
    fn setregister_leaves_the_stack_alone() {
        let input = lines(&["push 1", "setRegister r:2 /*local:x*/", "pop"]);
        let out = annotate_lines(&input).unwrap();
        assert!(out[1].ends_with("// 1"));
        assert!(out[2].ends_with("// --"));
    }

    #[test]
    fn swap_exchanges_the_top_two_values() {
        let input = lines(&["push 1, 2", "swap"]);
        let out = annotate_lines(&input).unwrap();
        assert!(out[1].ends_with("// 2|1"));
    }

    #[test]
    fn push_recalls_values_parked_by_setregister() {
        let input = lines(&[
            "push 'f'",
            "getVariable",
            "setRegister r:1",
            "pop",
            "push r:1",
        ]);
        let out = annotate_lines(&input).unwrap();
        assert!(out[4].ends_with("// f"));
    }

    #[test]
    fn root_borrow_sequence_restores_stack_and_register() {
        let input = lines(&[
            "push r:1, 'a', 0, 'f'",
            "callFunction",
            "setRegister r:1",
            "setVariable",
            "push r:1",
            "swap",
            "setRegister r:1",
            "pop",
        ]);
        let out = annotate_lines(&input).unwrap();
        assert!(out[3].ends_with("// r:1"), "only the saved register value remains");
        assert!(out[7].ends_with("// f()"), "the call result survives the borrow");
    }

    #[test]
    fn split_push_operands_respects_quotes_and_escapes() {
        assert_eq!(
            split_push_operands("'a, b', 1, 'it\\'s', r:2 /*local:x*/"),
            vec!["'a, b'", "1", "'it\\'s'", "r:2"]
        );
    }

    #[test]
    fn width_ignores_comments_and_function_headers() {
        let input = lines(&[
            "function2 'averylongfunctionname' () (r:1='this')",
            "// a very very long comment line that should not matter",
            "  push 1",
            "  pop",
            "end",
        ]);
        let out = annotate_lines(&input).unwrap();
        // Longest countable line is `end` vs `  push 1` (8 chars) -> width 12.
        assert_eq!(out[2], "  push 1    // 1");
    }
}
