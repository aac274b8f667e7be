// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Comment-embedded compiler directives.
//!
//! Code destined to be spliced into externally-provided functions can
//! declare which VM registers hold which variable names:
//!
//! ```text
//! // @js2f/push-register-context: r:2=velocity r:3=accel
//! velocity = velocity + accel;
//! // @js2f/pop-register-context
//! ```

use crate::core::ast::Comment;
use crate::core::error::{CodegenError, CodegenErrorKind};

use super::contexts::RegisterVariablesContext;
use super::registers::{Register, MAX_REGISTER_ID, MIN_REGISTER_ID};
use super::Generator;

const DIRECTIVE_PREFIX: &str = "@js2f/";
const PUSH_REGISTER_CONTEXT: &str = "push-register-context";
const POP_REGISTER_CONTEXT: &str = "pop-register-context";

impl Generator {
    /// Scan a statement's attached line comments for directives. Comments
    /// shared between a trailing and the next leading attachment are
    /// processed once, keyed by span.
    pub(crate) fn process_directive_comments(
        &mut self,
        comments: &[Comment],
    ) -> Result<(), CodegenError> {
        for comment in comments {
            if comment.block {
                continue;
            }
            let text = comment.text.trim();
            let rest = match text.strip_prefix(DIRECTIVE_PREFIX) {
                Some(rest) => rest,
                None => continue,
            };
            if !self
                .directives_seen
                .insert((comment.span.start, comment.span.end))
            {
                continue;
            }
            self.process_directive(rest, comment)?;
        }
        Ok(())
    }

    fn process_directive(&mut self, text: &str, comment: &Comment) -> Result<(), CodegenError> {
        let (name, args) = match text.split_once(':') {
            Some((name, args)) => (name.trim(), args.trim()),
            None => (text.trim(), ""),
        };
        match name {
            PUSH_REGISTER_CONTEXT => self.push_register_context(args, comment),
            POP_REGISTER_CONTEXT => self.pop_register_context(comment),
            other => Err(CodegenError::new(
                CodegenErrorKind::DirectiveMalformed,
                format!("Unknown directive '{DIRECTIVE_PREFIX}{other}'"),
            )
            .with_span(comment.span)),
        }
    }

    fn push_register_context(
        &mut self,
        args: &str,
        comment: &Comment,
    ) -> Result<(), CodegenError> {
        if !self.functions.is_empty() {
            return Err(CodegenError::new(
                CodegenErrorKind::DirectiveMisplaced,
                format!("{PUSH_REGISTER_CONTEXT} may only appear outside of a function"),
            )
            .with_span(comment.span));
        }
        if args.is_empty() {
            return Err(malformed_assignment("missing register assignments", comment));
        }

        let mut entries: Vec<(String, Register)> = Vec::new();
        for token in args.split_whitespace() {
            let (id, name) = parse_register_assignment(token)
                .ok_or_else(|| malformed_assignment(token, comment))?;
            if entries.iter().any(|(entry, _)| entry == &name) {
                return Err(CodegenError::new(
                    CodegenErrorKind::DirectiveMalformed,
                    format!("Register name '{name}' assigned twice"),
                )
                .with_span(comment.span));
            }
            entries.push((name.clone(), Register::new(id, Some(name), None)));
        }

        self.register_variables
            .push(RegisterVariablesContext::explicit(entries));
        Ok(())
    }

    fn pop_register_context(&mut self, comment: &Comment) -> Result<(), CodegenError> {
        match self.register_variables.peek() {
            Some(RegisterVariablesContext::Explicit(_)) => {
                self.register_variables.pop();
                Ok(())
            }
            _ => Err(CodegenError::new(
                CodegenErrorKind::DirectiveMisplaced,
                "No register context to pop",
            )
            .with_span(comment.span)),
        }
    }
}

/// Parse one `r:<n>=<name>` token.
fn parse_register_assignment(token: &str) -> Option<(u8, String)> {
    let rest = token.strip_prefix("r:")?;
    let (id_text, name) = rest.split_once('=')?;
    let id: u8 = id_text.parse().ok()?;
    if !(MIN_REGISTER_ID..=MAX_REGISTER_ID).contains(&id) || name.is_empty() {
        return None;
    }
    Some((id, name.to_string()))
}

fn malformed_assignment(detail: &str, comment: &Comment) -> CodegenError {
    CodegenError::new(
        CodegenErrorKind::DirectiveMalformed,
        format!("Malformed register assignment in {PUSH_REGISTER_CONTEXT}: {detail}"),
    )
    .with_span(comment.span)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::GeneratorOptions;
    use crate::core::ast::NodeSpan;

    fn line_comment(text: &str) -> Comment {
        Comment {
            block: false,
            text: text.to_string(),
            span: NodeSpan::default(),
        }
    }

    fn comment_at(text: &str, start: u32) -> Comment {
        Comment {
            block: false,
            text: text.to_string(),
            span: NodeSpan {
                start,
                end: start + text.len() as u32,
                line: 1,
                column: 0,
            },
        }
    }

    #[test]
    fn push_and_pop_register_context() {
        let mut gen = Generator::new(GeneratorOptions::default());
        gen.process_directive_comments(&[comment_at(
            " @js2f/push-register-context: r:2=velocity r:3=accel",
            0,
        )])
        .unwrap();
        assert_eq!(
            gen.lookup_variable_register("velocity").map(|r| r.id()),
            Some(2)
        );
        assert_eq!(
            gen.lookup_variable_register("velocity").unwrap().to_string(),
            "r:velocity"
        );

        gen.process_directive_comments(&[comment_at(" @js2f/pop-register-context", 100)])
            .unwrap();
        assert!(gen.lookup_variable_register("velocity").is_none());
    }

    #[test]
    fn duplicate_names_are_malformed() {
        let mut gen = Generator::new(GeneratorOptions::default());
        let err = gen
            .process_directive_comments(&[line_comment(
                "@js2f/push-register-context: r:2=v r:3=v",
            )])
            .unwrap_err();
        assert_eq!(err.kind(), CodegenErrorKind::DirectiveMalformed);
    }

    #[test]
    fn bad_register_tokens_are_malformed() {
        for args in ["r:0=v", "r:255=v", "r:x=v", "r:2", "velocity"] {
            let mut gen = Generator::new(GeneratorOptions::default());
            let err = gen
                .process_directive_comments(&[line_comment(&format!(
                    "@js2f/push-register-context: {args}"
                ))])
                .unwrap_err();
            assert_eq!(err.kind(), CodegenErrorKind::DirectiveMalformed, "{args}");
        }
    }

    #[test]
    fn pop_without_context_is_misplaced() {
        let mut gen = Generator::new(GeneratorOptions::default());
        let err = gen
            .process_directive_comments(&[line_comment("@js2f/pop-register-context")])
            .unwrap_err();
        assert_eq!(err.kind(), CodegenErrorKind::DirectiveMisplaced);
    }

    #[test]
    fn unknown_directives_are_malformed() {
        let mut gen = Generator::new(GeneratorOptions::default());
        let err = gen
            .process_directive_comments(&[line_comment("@js2f/set-register-context: r:2=v")])
            .unwrap_err();
        assert_eq!(err.kind(), CodegenErrorKind::DirectiveMalformed);
    }

    #[test]
    fn ordinary_comments_are_ignored() {
        let mut gen = Generator::new(GeneratorOptions::default());
        gen.process_directive_comments(&[line_comment(" just a note")])
            .unwrap();
        assert!(gen.register_variables.is_empty());
    }

    #[test]
    fn shared_comment_spans_process_once() {
        let mut gen = Generator::new(GeneratorOptions::default());
        let shared = comment_at(" @js2f/push-register-context: r:2=v", 10);
        gen.process_directive_comments(&[shared.clone()]).unwrap();
        gen.process_directive_comments(&[shared]).unwrap();
        assert_eq!(gen.register_variables.len(), 1);
    }
}
