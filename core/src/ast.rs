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

//! Untyped syntax tree handed over by the parser.
//!
//! Names are still the raw source identifiers and operators the raw
//! surface tokens; the resolver (`checker`) turns this into the typed
//! tree in `hir`. Everything derives serde so a front end can hand the
//! tree over as JSON.

use crate::types::Ty;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Module {
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Stmt {
    Expression {
        expression: Expr,
    },
    VarDecl {
        name: String,
        #[serde(default)]
        annotation: Option<Ty>,
        #[serde(default)]
        init: Option<Expr>,
    },
    Block {
        body: Vec<Stmt>,
    },
    If {
        test: Expr,
        consequent: Box<Stmt>,
        #[serde(default)]
        alternate: Option<Box<Stmt>>,
    },
    Loop {
        test: Expr,
        body: Box<Stmt>,
    },
    Function {
        name: String,
        params: Vec<ParamDecl>,
        #[serde(default)]
        return_type: Option<Ty>,
        body: Vec<Stmt>,
    },
    Return {
        #[serde(default)]
        value: Option<Expr>,
    },
    Print {
        expression: Expr,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamDecl {
    pub name: String,
    pub annotation: Ty,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Expr {
    Assign {
        target: String,
        value: Box<Expr>,
    },
    Binary {
        left: Box<Expr>,
        operator: BinaryOp,
        right: Box<Expr>,
    },
    Call {
        callee: String,
        args: Vec<Expr>,
    },
    Bool {
        value: bool,
    },
    Number {
        value: i32,
    },
    Identifier {
        name: String,
    },
}

/// Surface binary operator tokens, as the parser sees them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOp {
    LogicalOr,
    LogicalAnd,
    BitwiseOr,
    BitwiseXor,
    BitwiseAnd,
    Equal,
    NotEqual,
    Less,
    Greater,
    LessEqual,
    GreaterEqual,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let token = match self {
            BinaryOp::LogicalOr => "||",
            BinaryOp::LogicalAnd => "&&",
            BinaryOp::BitwiseOr => "|",
            BinaryOp::BitwiseXor => "^",
            BinaryOp::BitwiseAnd => "&",
            BinaryOp::Equal => "==",
            BinaryOp::NotEqual => "!=",
            BinaryOp::Less => "<",
            BinaryOp::Greater => ">",
            BinaryOp::LessEqual => "<=",
            BinaryOp::GreaterEqual => ">=",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
        };
        write!(f, "{token}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_round_trips_through_json() {
        let module = Module {
            body: vec![Stmt::VarDecl {
                name: "x".into(),
                annotation: Some(Ty::Int32),
                init: Some(Expr::Number { value: 2 }),
            }],
        };
        let json = serde_json::to_string(&module).unwrap();
        let back: Module = serde_json::from_str(&json).unwrap();
        assert_eq!(back, module);
    }

    #[test]
    fn test_optional_fields_may_be_omitted_in_json() {
        let json = r#"{ "type": "var_decl", "name": "x", "init": { "type": "number", "value": 1 } }"#;
        let stmt: Stmt = serde_json::from_str(json).unwrap();
        assert_eq!(
            stmt,
            Stmt::VarDecl {
                name: "x".into(),
                annotation: None,
                init: Some(Expr::Number { value: 1 }),
            }
        );
    }
}
