// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! VM registers and the per-function register allocator.
//!
//! The target VM exposes a 255-slot register file per `function2` frame.
//! Slot 0 is reserved (some player configurations place `this` or
//! `arguments` there), leaving ids 1..=254 for allocation.

use std::fmt;

use crate::core::error::{CodegenError, CodegenErrorKind};

pub const MIN_REGISTER_ID: u8 = 1;
pub const MAX_REGISTER_ID: u8 = 254;

/// Keywords of the downstream assembler. A register whose symbolic name
/// collides with one of these must be rendered quoted (`r:'new'`).
const RESERVED_REGISTER_NAMES: &[&str] = &[
    "push", "pop", "getVariable", "setVariable", "getMember", "setMember", "setRegister",
    "callFunction", "callMethod", "new", "initArray", "add", "subtract", "multiply", "divide",
    "modulo", "equals", "strictEquals", "lessThan", "greaterThan", "not", "branch",
    "branchIfTrue", "return", "int", "increment", "decrement", "shiftLeft", "shiftRight",
    "shiftRight2", "bitwiseAnd", "bitwiseOr", "bitwiseXor", "instanceOf", "swap", "function",
    "function2", "end", "true", "false", "null", "undef", "r",
];

fn is_reserved_name(name: &str) -> bool {
    RESERVED_REGISTER_NAMES
        .iter()
        .any(|reserved| reserved.eq_ignore_ascii_case(name))
}

/// A named slot in the register file. Equality is by id; the symbolic name
/// and debug tag only affect rendering.
#[derive(Debug, Clone)]
pub struct Register {
    id: u8,
    name: Option<String>,
    debug_tag: Option<String>,
}

impl Register {
    pub fn new(id: u8, name: Option<String>, debug_tag: Option<String>) -> Self {
        Self { id, name, debug_tag }
    }

    /// A plain unnamed, untagged register reference.
    pub fn bare(id: u8) -> Self {
        Self::new(id, None, None)
    }

    pub fn id(&self) -> u8 {
        self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

impl PartialEq for Register {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Register {}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) if is_reserved_name(name) => write!(f, "r:'{name}'")?,
            Some(name) => write!(f, "r:{name}")?,
            None => write!(f, "r:{}", self.id)?,
        }
        if let Some(tag) = &self.debug_tag {
            write!(f, " /*{tag}*/")?;
        }
        Ok(())
    }
}

/// Linear-scan allocator over the 254-slot register file.
///
/// One allocator exists per enclosing function; each function constructs
/// its own.
#[derive(Debug, Default)]
pub struct RegisterAllocator {
    held: Vec<Option<Register>>,
}

impl RegisterAllocator {
    pub fn new() -> Self {
        Self {
            held: vec![None; MAX_REGISTER_ID as usize + 1],
        }
    }

    /// Claim the lowest free id.
    pub fn allocate(
        &mut self,
        name: Option<&str>,
        debug_tag: Option<&str>,
    ) -> Result<Register, CodegenError> {
        for id in MIN_REGISTER_ID..=MAX_REGISTER_ID {
            if self.held[id as usize].is_none() {
                return Ok(self.claim(id, name, debug_tag));
            }
        }
        Err(CodegenError::new(
            CodegenErrorKind::OutOfRegisters,
            "Out of registers: all 254 slots are in use",
        ))
    }

    /// Claim a specific id, failing if it is already held.
    pub fn assign(
        &mut self,
        id: u8,
        name: Option<&str>,
        debug_tag: Option<&str>,
    ) -> Result<Register, CodegenError> {
        if !(MIN_REGISTER_ID..=MAX_REGISTER_ID).contains(&id) {
            return Err(CodegenError::new(
                CodegenErrorKind::RegisterConflict,
                format!("Register id {id} is outside the usable range 1..254"),
            ));
        }
        if self.held[id as usize].is_some() {
            return Err(CodegenError::new(
                CodegenErrorKind::RegisterConflict,
                format!("Register {id} is already in use"),
            ));
        }
        Ok(self.claim(id, name, debug_tag))
    }

    /// Release the slot for `register`. Freeing an already-free slot is a
    /// no-op.
    pub fn free(&mut self, register: &Register) {
        self.held[register.id as usize] = None;
    }

    pub fn is_held(&self, id: u8) -> bool {
        self.held
            .get(id as usize)
            .map(Option::is_some)
            .unwrap_or(false)
    }

    fn claim(&mut self, id: u8, name: Option<&str>, debug_tag: Option<&str>) -> Register {
        let register = Register::new(
            id,
            name.map(str::to_string),
            debug_tag.map(str::to_string),
        );
        self.held[id as usize] = Some(register.clone());
        register
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_returns_lowest_free_id() {
        let mut alloc = RegisterAllocator::new();
        let a = alloc.allocate(None, None).unwrap();
        let b = alloc.allocate(None, None).unwrap();
        assert_eq!(a.id(), 1);
        assert_eq!(b.id(), 2);

        alloc.free(&a);
        let c = alloc.allocate(None, None).unwrap();
        assert_eq!(c.id(), 1);
    }

    #[test]
    fn assign_fails_on_occupied_slot() {
        let mut alloc = RegisterAllocator::new();
        alloc.assign(5, None, None).unwrap();
        let err = alloc.assign(5, None, None).unwrap_err();
        assert_eq!(err.kind(), CodegenErrorKind::RegisterConflict);
    }

    #[test]
    fn allocation_exhausts_at_254() {
        let mut alloc = RegisterAllocator::new();
        for expected in 1..=254u8 {
            assert_eq!(alloc.allocate(None, None).unwrap().id(), expected);
        }
        let err = alloc.allocate(None, None).unwrap_err();
        assert_eq!(err.kind(), CodegenErrorKind::OutOfRegisters);
    }

    #[test]
    fn free_is_idempotent() {
        let mut alloc = RegisterAllocator::new();
        let a = alloc.allocate(None, None).unwrap();
        alloc.free(&a);
        alloc.free(&a);
        assert!(!alloc.is_held(1));
    }

    #[test]
    fn renders_name_over_id() {
        assert_eq!(Register::new(3, Some("velocity".into()), None).to_string(), "r:velocity");
        assert_eq!(Register::bare(7).to_string(), "r:7");
    }

    #[test]
    fn quotes_reserved_names() {
        assert_eq!(Register::new(2, Some("new".into()), None).to_string(), "r:'new'");
        assert_eq!(Register::new(2, Some("End".into()), None).to_string(), "r:'End'");
    }

    #[test]
    fn renders_debug_tag_as_trailing_comment() {
        let reg = Register::new(2, None, Some("local:x".into()));
        assert_eq!(reg.to_string(), "r:2 /*local:x*/");
    }

    #[test]
    fn equality_is_by_id() {
        let a = Register::new(4, Some("a".into()), None);
        let b = Register::new(4, Some("b".into()), Some("t".into()));
        assert_eq!(a, b);
    }
}
