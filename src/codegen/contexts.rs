// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Compilation contexts: per-function register bookkeeping, register
//! variable scopes, and loop scopes.
//!
//! The generator keeps three LIFO stacks of these. All pushes are matched
//! by pops through scoped helpers on the generator, so the stacks are
//! structurally balanced across any subtree visit.

use crate::core::error::{CodegenError, CodegenErrorKind};

use super::registers::{Register, RegisterAllocator};

/// A plain LIFO stack for nesting-sensitive compilation state.
#[derive(Debug, Default)]
pub struct ContextStack<T> {
    items: Vec<T>,
}

impl<T> ContextStack<T> {
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    pub fn push(&mut self, value: T) {
        self.items.push(value);
    }

    pub fn pop(&mut self) -> Option<T> {
        self.items.pop()
    }

    pub fn peek(&self) -> Option<&T> {
        self.items.last()
    }

    pub fn peek_mut(&mut self) -> Option<&mut T> {
        self.items.last_mut()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Register bookkeeping for one function body.
///
/// Meta registers hold pseudo-variables (`this`), argument registers are
/// reserved up front from the parameter list, and locals are reserved
/// lazily by their declarators.
#[derive(Debug)]
pub struct FunctionContext {
    allocator: RegisterAllocator,
    meta: Vec<(String, Register)>,
    args: Vec<(String, Register)>,
    locals: Vec<(String, Register)>,
}

impl FunctionContext {
    pub fn new() -> Self {
        Self {
            allocator: RegisterAllocator::new(),
            meta: Vec::new(),
            args: Vec::new(),
            locals: Vec::new(),
        }
    }

    /// Reserve a register for a pseudo-variable such as `this`.
    pub fn declare_meta(&mut self, name: &str) -> Result<Register, CodegenError> {
        self.check_duplicate(name)?;
        let register = self.allocator.allocate(None, None)?;
        self.meta.push((name.to_string(), register.clone()));
        Ok(register)
    }

    /// Reserve a register for a positional parameter.
    pub fn declare_argument(&mut self, name: &str) -> Result<Register, CodegenError> {
        self.check_duplicate(name)?;
        let register = self.allocator.allocate(None, None)?;
        self.args.push((name.to_string(), register.clone()));
        Ok(register)
    }

    /// Reserve a register for a local variable declarator.
    pub fn declare_variable(&mut self, name: &str) -> Result<Register, CodegenError> {
        self.check_duplicate(name)?;
        let register = self
            .allocator
            .allocate(None, Some(&format!("local:{name}")))?;
        self.locals.push((name.to_string(), register.clone()));
        Ok(register)
    }

    /// Claim a short-lived scratch register.
    pub fn alloc_temporary_register(&mut self) -> Result<Register, CodegenError> {
        self.allocator.allocate(None, Some("temp"))
    }

    pub fn free_temporary_register(&mut self, register: &Register) {
        self.allocator.free(register);
    }

    /// Resolve a variable name, searching locals, then args, then meta.
    pub fn get_variable_register(&self, name: &str) -> Option<&Register> {
        lookup(&self.locals, name)
            .or_else(|| lookup(&self.args, name))
            .or_else(|| lookup(&self.meta, name))
    }

    /// Argument register list for the `function2` header, sorted by id.
    pub fn args_header(&self) -> String {
        header_entries(&self.args)
    }

    /// Meta register list for the `function2` header, sorted by id.
    pub fn meta_header(&self) -> String {
        header_entries(&self.meta)
    }

    fn check_duplicate(&self, name: &str) -> Result<(), CodegenError> {
        if self.get_variable_register(name).is_some() {
            return Err(CodegenError::new(
                CodegenErrorKind::DuplicateDeclaration,
                format!("'{name}' is already declared in this function"),
            ));
        }
        Ok(())
    }
}

impl Default for FunctionContext {
    fn default() -> Self {
        Self::new()
    }
}

fn lookup<'a>(entries: &'a [(String, Register)], name: &str) -> Option<&'a Register> {
    entries
        .iter()
        .find(|(entry, _)| entry == name)
        .map(|(_, register)| register)
}

fn header_entries(entries: &[(String, Register)]) -> String {
    let mut sorted: Vec<&(String, Register)> = entries.iter().collect();
    sorted.sort_by_key(|(_, register)| register.id());
    sorted
        .iter()
        .map(|(name, register)| format!("r:{}='{}'", register.id(), name))
        .collect::<Vec<_>>()
        .join(", ")
}

/// A scope mapping variable names to registers.
///
/// A function pushes a `Function` entry (resolved against the innermost
/// [`FunctionContext`]); a `push-register-context` directive pushes an
/// `Explicit` entry with its own fixed assignments.
#[derive(Debug)]
pub enum RegisterVariablesContext {
    Function,
    Explicit(Vec<(String, Register)>),
}

impl RegisterVariablesContext {
    pub fn explicit(entries: Vec<(String, Register)>) -> Self {
        Self::Explicit(entries)
    }
}

/// The enclosing loop's break target.
#[derive(Debug)]
pub struct LoopContext {
    end_label: String,
}

impl LoopContext {
    pub fn new(end_label: String) -> Self {
        Self { end_label }
    }

    /// The label a `break` must jump to.
    pub fn break_label(&self) -> &str {
        &self.end_label
    }
}
