/*
 * Copyright (c) 2026 Mohamad Al-Zawahreh (dba Sovereign Systems).
 *
 * This file is part of the Imp Compiler.
 *
 * LICENSE: DUAL-LICENSED (AGPLv3 or COMMERCIAL).
 *
 * 1. OPEN SOURCE: You may use this file under the terms of the GNU Affero
 * General Public License v3.0. If you link to this code, your ENTIRE
 * application must be open-sourced under AGPLv3.
 *
 * 2. COMMERCIAL: For proprietary use, you must obtain a Commercial License
 * from Sovereign Systems.
 *
 * PATENT NOTICE: Protected by US Patent App #63/935,467.
 * NO IMPLIED LICENSE to rights of Mohamad Al-Zawahreh or Sovereign Systems.
 */

//! Structured instruction IR, one step above the binary format.
//!
//! Control flow is back in tree form (`If`/`Loop` own their bodies) and
//! everything refers to types, functions, locals, and labels by name;
//! resolving names to indices is the encoder's job.

use crate::types::ValType;

#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    pub fields: Vec<ModuleField>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ModuleField {
    Type(TypeDecl),
    Import(Import),
    Func(Func),
    Export(Export),
    Start { func: String },
}

/// A named function type.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeDecl {
    pub id: String,
    pub params: Vec<(String, ValType)>,
    pub results: Vec<ValType>,
}

/// A function import; `type_use` names a `TypeDecl`.
#[derive(Debug, Clone, PartialEq)]
pub struct Import {
    pub module: String,
    pub name: String,
    pub id: String,
    pub type_use: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Func {
    pub id: String,
    pub type_use: String,
    /// The first `param_count` entries of `locals` are the parameters,
    /// which the format declares in the type rather than the body.
    pub param_count: usize,
    pub locals: Vec<Local>,
    pub body: Vec<Instr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Local {
    pub id: String,
    pub ty: ValType,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Export {
    pub name: String,
    pub func: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Instr {
    LocalGet(String),
    LocalSet(String),
    I32Const(i32),

    I32Add,
    I32Sub,
    I32Mul,
    I32DivS,
    I32RemS,
    I32And,
    I32Or,
    I32Xor,
    I32Eq,
    I32Ne,
    I32LtS,
    I32GtS,
    I32LeS,
    I32GeS,

    Call(String),
    /// Branch to the structured instruction carrying this label.
    Br(String),
    Return,

    If {
        label: String,
        then_body: Vec<Instr>,
        else_body: Option<Vec<Instr>>,
    },
    Loop {
        label: String,
        body: Vec<Instr>,
    },
}
