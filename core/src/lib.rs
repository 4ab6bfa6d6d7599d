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

//! Compiler core for the Imp language.
//!
//! Takes the parser's syntax tree to a binary WebAssembly core module in
//! four stages:
//!
//! 1. `checker` — types and disambiguates names, producing `hir`;
//! 2. `cfg` — flattens control flow into per-function graphs (`mir`);
//! 3. `wasm_codegen` — rebuilds structured control flow (`lir`);
//! 4. `encoder` — emits the length-prefixed binary.
//!
//! The host environment is expected to supply `env.print(i32)`; the
//! module's top-level statements run through the start function, which
//! is also exported as `"start"`.

pub mod ast;
pub mod cfg;
pub mod checker;
pub mod encoder;
pub mod hir;
pub mod lir;
pub mod mir;
pub mod types;
pub mod wasm_codegen;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CompileError {
    #[error(transparent)]
    Type(#[from] checker::TypeError),
    #[error(transparent)]
    Emit(#[from] encoder::EmitError),
}

/// Compile a parsed module into a binary WebAssembly module. Nothing is
/// produced on failure.
pub fn compile(module: &ast::Module) -> Result<Vec<u8>, CompileError> {
    let hir = checker::resolve(module)?;
    let mir = cfg::lower(&hir);
    let lir = wasm_codegen::lower(&mir);
    Ok(encoder::encode(&lir)?)
}
