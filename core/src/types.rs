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

use serde::{Deserialize, Serialize};
use std::fmt;

/// Source-level types of the Imp language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ty {
    Int32,
    Bool,
    Void,
}

impl Ty {
    /// Whether a value of this type can sit in a variable or flow
    /// through an expression.
    pub fn is_value(self) -> bool {
        !matches!(self, Ty::Void)
    }
}

impl fmt::Display for Ty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ty::Int32 => write!(f, "int32"),
            Ty::Bool => write!(f, "bool"),
            Ty::Void => write!(f, "void"),
        }
    }
}

/// Numeric value types of the target format. Only `I32` is produced by
/// the current backend; booleans are lowered to 0/1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValType {
    I32,
    I64,
    F32,
    F64,
}

impl fmt::Display for ValType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValType::I32 => write!(f, "i32"),
            ValType::I64 => write!(f, "i64"),
            ValType::F32 => write!(f, "f32"),
            ValType::F64 => write!(f, "f64"),
        }
    }
}

/// Resolved signature of a declared function. `symbol` is the
/// disambiguated name the backend stages refer to.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FuncSig {
    pub params: Vec<Ty>,
    pub return_type: Ty,
    pub symbol: String,
}
