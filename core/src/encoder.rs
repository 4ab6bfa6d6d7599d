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

//! Binary emission of the structured IR.
//!
//! Symbols become indices through append-only tables filled in one
//! declaration pass before any body is encoded: types in field order,
//! functions with imports first, and per-function locals with the
//! parameters first. Branch labels resolve to relative nesting depth
//! through a stack pushed and popped as structured instructions open
//! and close.
//!
//! The failure modes here are internal faults (a name no table knows),
//! not user errors; structural validity of the input is not re-checked.

use crate::lir::{Func, Instr, Module, ModuleField};
use crate::types::ValType;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum EmitError {
    #[error("Unknown type '{0}'")]
    UnknownType(String),
    #[error("Unknown function '{0}'")]
    UnknownFunction(String),
    #[error("Unknown local '{0}'")]
    UnknownLocal(String),
    #[error("Unknown label '{0}'")]
    UnknownLabel(String),
}

const MAGIC: [u8; 4] = [0x00, 0x61, 0x73, 0x6D];
const VERSION: [u8; 4] = [0x01, 0x00, 0x00, 0x00];

const SECTION_TYPE: u8 = 1;
const SECTION_IMPORT: u8 = 2;
const SECTION_FUNCTION: u8 = 3;
const SECTION_EXPORT: u8 = 7;
const SECTION_START: u8 = 8;
const SECTION_CODE: u8 = 10;

const FUNCTYPE: u8 = 0x60;
const DESC_FUNC: u8 = 0x00;
const BLOCKTYPE_EMPTY: u8 = 0x40;

const OP_LOOP: u8 = 0x03;
const OP_IF: u8 = 0x04;
const OP_ELSE: u8 = 0x05;
const OP_END: u8 = 0x0B;
const OP_BR: u8 = 0x0C;
const OP_RETURN: u8 = 0x0F;
const OP_CALL: u8 = 0x10;
const OP_LOCAL_GET: u8 = 0x20;
const OP_LOCAL_SET: u8 = 0x21;
const OP_I32_CONST: u8 = 0x41;
const OP_I32_EQ: u8 = 0x46;
const OP_I32_NE: u8 = 0x47;
const OP_I32_LT_S: u8 = 0x48;
const OP_I32_GT_S: u8 = 0x4A;
const OP_I32_LE_S: u8 = 0x4C;
const OP_I32_GE_S: u8 = 0x4E;
const OP_I32_ADD: u8 = 0x6A;
const OP_I32_SUB: u8 = 0x6B;
const OP_I32_MUL: u8 = 0x6C;
const OP_I32_DIV_S: u8 = 0x6D;
const OP_I32_REM_S: u8 = 0x6F;
const OP_I32_AND: u8 = 0x71;
const OP_I32_OR: u8 = 0x72;
const OP_I32_XOR: u8 = 0x73;

/// Encode a structured module into its binary form.
pub fn encode(module: &Module) -> Result<Vec<u8>, EmitError> {
    let mut types = Vec::new();
    let mut imports = Vec::new();
    let mut funcs = Vec::new();
    let mut exports = Vec::new();
    let mut start = None;
    for field in &module.fields {
        match field {
            ModuleField::Type(ty) => types.push(ty),
            ModuleField::Import(import) => imports.push(import),
            ModuleField::Func(func) => funcs.push(func),
            ModuleField::Export(export) => exports.push(export),
            ModuleField::Start { func } => start = Some(func.as_str()),
        }
    }

    // Declaration pass. Imported functions index before defined ones.
    let mut type_table = SymbolTable::default();
    for ty in &types {
        type_table.declare(&ty.id);
    }
    let mut func_table = SymbolTable::default();
    for import in &imports {
        func_table.declare(&import.id);
    }
    for func in &funcs {
        func_table.declare(&func.id);
    }

    let mut out = Vec::new();
    out.extend_from_slice(&MAGIC);
    out.extend_from_slice(&VERSION);

    let mut content = Vec::new();
    write_uleb128(&mut content, types.len() as u32);
    for ty in &types {
        content.push(FUNCTYPE);
        write_uleb128(&mut content, ty.params.len() as u32);
        for (_, ty) in &ty.params {
            content.push(valtype_byte(*ty));
        }
        write_uleb128(&mut content, ty.results.len() as u32);
        for ty in &ty.results {
            content.push(valtype_byte(*ty));
        }
    }
    write_section(&mut out, SECTION_TYPE, &content);

    let mut content = Vec::new();
    write_uleb128(&mut content, imports.len() as u32);
    for import in &imports {
        write_name(&mut content, &import.module);
        write_name(&mut content, &import.name);
        content.push(DESC_FUNC);
        let idx = type_table
            .resolve(&import.type_use)
            .ok_or_else(|| EmitError::UnknownType(import.type_use.clone()))?;
        write_uleb128(&mut content, idx);
    }
    write_section(&mut out, SECTION_IMPORT, &content);

    let mut content = Vec::new();
    write_uleb128(&mut content, funcs.len() as u32);
    for func in &funcs {
        let idx = type_table
            .resolve(&func.type_use)
            .ok_or_else(|| EmitError::UnknownType(func.type_use.clone()))?;
        write_uleb128(&mut content, idx);
    }
    write_section(&mut out, SECTION_FUNCTION, &content);

    let mut content = Vec::new();
    write_uleb128(&mut content, exports.len() as u32);
    for export in &exports {
        write_name(&mut content, &export.name);
        content.push(DESC_FUNC);
        let idx = func_table
            .resolve(&export.func)
            .ok_or_else(|| EmitError::UnknownFunction(export.func.clone()))?;
        write_uleb128(&mut content, idx);
    }
    write_section(&mut out, SECTION_EXPORT, &content);

    if let Some(name) = start {
        let mut content = Vec::new();
        let idx = func_table
            .resolve(name)
            .ok_or_else(|| EmitError::UnknownFunction(name.to_string()))?;
        write_uleb128(&mut content, idx);
        write_section(&mut out, SECTION_START, &content);
    }

    let mut content = Vec::new();
    write_uleb128(&mut content, funcs.len() as u32);
    for func in &funcs {
        encode_code(func, &func_table, &mut content)?;
    }
    write_section(&mut out, SECTION_CODE, &content);

    Ok(out)
}

/// One size-prefixed code entry: local declarations, then the body
/// expression closed by `end`.
fn encode_code(func: &Func, funcs: &SymbolTable, out: &mut Vec<u8>) -> Result<(), EmitError> {
    let mut local_table = SymbolTable::default();
    for local in &func.locals {
        local_table.declare(&local.id);
    }

    let mut body = Vec::new();
    // Parameters are declared by the function's type and only occupy
    // index space; the remaining locals are all i32, one run.
    let extra = func.locals.len() - func.param_count;
    if extra > 0 {
        write_uleb128(&mut body, 1);
        write_uleb128(&mut body, extra as u32);
        body.push(valtype_byte(ValType::I32));
    } else {
        write_uleb128(&mut body, 0);
    }

    let mut labels = Vec::new();
    encode_instrs(&func.body, &local_table, funcs, &mut labels, &mut body)?;
    body.push(OP_END);

    write_uleb128(out, body.len() as u32);
    out.extend_from_slice(&body);
    Ok(())
}

fn encode_instrs(
    instrs: &[Instr],
    locals: &SymbolTable,
    funcs: &SymbolTable,
    labels: &mut Vec<String>,
    out: &mut Vec<u8>,
) -> Result<(), EmitError> {
    for instr in instrs {
        match instr {
            Instr::LocalGet(name) => {
                out.push(OP_LOCAL_GET);
                let idx = locals
                    .resolve(name)
                    .ok_or_else(|| EmitError::UnknownLocal(name.clone()))?;
                write_uleb128(out, idx);
            }
            Instr::LocalSet(name) => {
                out.push(OP_LOCAL_SET);
                let idx = locals
                    .resolve(name)
                    .ok_or_else(|| EmitError::UnknownLocal(name.clone()))?;
                write_uleb128(out, idx);
            }
            Instr::I32Const(value) => {
                out.push(OP_I32_CONST);
                write_sleb128(out, *value);
            }
            Instr::I32Add => out.push(OP_I32_ADD),
            Instr::I32Sub => out.push(OP_I32_SUB),
            Instr::I32Mul => out.push(OP_I32_MUL),
            Instr::I32DivS => out.push(OP_I32_DIV_S),
            Instr::I32RemS => out.push(OP_I32_REM_S),
            Instr::I32And => out.push(OP_I32_AND),
            Instr::I32Or => out.push(OP_I32_OR),
            Instr::I32Xor => out.push(OP_I32_XOR),
            Instr::I32Eq => out.push(OP_I32_EQ),
            Instr::I32Ne => out.push(OP_I32_NE),
            Instr::I32LtS => out.push(OP_I32_LT_S),
            Instr::I32GtS => out.push(OP_I32_GT_S),
            Instr::I32LeS => out.push(OP_I32_LE_S),
            Instr::I32GeS => out.push(OP_I32_GE_S),
            Instr::Call(name) => {
                out.push(OP_CALL);
                let idx = funcs
                    .resolve(name)
                    .ok_or_else(|| EmitError::UnknownFunction(name.clone()))?;
                write_uleb128(out, idx);
            }
            Instr::Br(label) => {
                out.push(OP_BR);
                // Label depth counts outward from the innermost
                // enclosing structured instruction.
                let depth = labels
                    .iter()
                    .rev()
                    .position(|known| known == label)
                    .ok_or_else(|| EmitError::UnknownLabel(label.clone()))?;
                write_uleb128(out, depth as u32);
            }
            Instr::Return => out.push(OP_RETURN),
            Instr::If {
                label,
                then_body,
                else_body,
            } => {
                out.push(OP_IF);
                out.push(BLOCKTYPE_EMPTY);
                labels.push(label.clone());
                encode_instrs(then_body, locals, funcs, labels, out)?;
                if let Some(else_body) = else_body {
                    out.push(OP_ELSE);
                    encode_instrs(else_body, locals, funcs, labels, out)?;
                }
                out.push(OP_END);
                labels.pop();
            }
            Instr::Loop { label, body } => {
                out.push(OP_LOOP);
                out.push(BLOCKTYPE_EMPTY);
                labels.push(label.clone());
                encode_instrs(body, locals, funcs, labels, out)?;
                out.push(OP_END);
                labels.pop();
            }
        }
    }
    Ok(())
}

// =============================================================================
// Primitives
// =============================================================================

/// Name → index in declaration order.
#[derive(Default)]
struct SymbolTable {
    names: Vec<String>,
}

impl SymbolTable {
    fn declare(&mut self, name: &str) {
        self.names.push(name.to_string());
    }

    fn resolve(&self, name: &str) -> Option<u32> {
        self.names
            .iter()
            .position(|known| known == name)
            .map(|idx| idx as u32)
    }
}

fn valtype_byte(ty: ValType) -> u8 {
    match ty {
        ValType::I32 => 0x7F,
        ValType::I64 => 0x7E,
        ValType::F32 => 0x7D,
        ValType::F64 => 0x7C,
    }
}

fn write_section(out: &mut Vec<u8>, id: u8, content: &[u8]) {
    out.push(id);
    write_uleb128(out, content.len() as u32);
    out.extend_from_slice(content);
}

fn write_name(out: &mut Vec<u8>, name: &str) {
    write_uleb128(out, name.len() as u32);
    out.extend_from_slice(name.as_bytes());
}

fn write_uleb128(out: &mut Vec<u8>, mut value: u32) {
    loop {
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if value == 0 {
            break;
        }
    }
}

fn write_sleb128(out: &mut Vec<u8>, value: i32) {
    let mut value = i64::from(value);
    loop {
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        let sign = byte & 0x40 != 0;
        if (value == 0 && !sign) || (value == -1 && sign) {
            out.push(byte);
            break;
        }
        out.push(byte | 0x80);
    }
}
