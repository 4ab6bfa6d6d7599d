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

//! Typed tree produced by the resolver.
//!
//! Same shape as `ast`, but every expression carries its resolved type,
//! identifiers are disambiguated (`name_{scope_id}`), and operators are
//! the closed `Binop` set.

use crate::ast::BinaryOp;
use crate::types::Ty;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Module {
    pub body: Vec<Stmt>,
}

impl Module {
    /// Pretty JSON dump for debugging the resolver output.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Stmt {
    Expression {
        expression: Expr,
    },
    VarDecl {
        name: String,
        ty: Ty,
        init: Option<Expr>,
    },
    Block {
        body: Vec<Stmt>,
    },
    If {
        test: Expr,
        consequent: Box<Stmt>,
        alternate: Option<Box<Stmt>>,
    },
    Loop {
        test: Expr,
        body: Box<Stmt>,
    },
    Function(FuncDecl),
    Return {
        value: Option<Expr>,
    },
    Print {
        expression: Expr,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FuncDecl {
    /// Disambiguated name; also the backend symbol of the function.
    pub name: String,
    pub params: Vec<Param>,
    pub return_type: Ty,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Param {
    pub name: String,
    pub ty: Ty,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Expr {
    pub ty: Ty,
    #[serde(flatten)]
    pub kind: ExprKind,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExprKind {
    Assign {
        target: String,
        value: Box<Expr>,
    },
    Binary {
        left: Box<Expr>,
        op: Binop,
        right: Box<Expr>,
    },
    Call {
        callee: String,
        args: Vec<Expr>,
    },
    Bool(bool),
    Number(i32),
    Ident(String),
}

/// Resolved binary operators. Unlike the surface tokens these are
/// closed over the operand type: the resolver only emits a `Binop`
/// together with the result type the table below assigns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Binop {
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

impl fmt::Display for Binop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let token = match self {
            Binop::LogicalOr => "||",
            Binop::LogicalAnd => "&&",
            Binop::BitwiseOr => "|",
            Binop::BitwiseXor => "^",
            Binop::BitwiseAnd => "&",
            Binop::Equal => "==",
            Binop::NotEqual => "!=",
            Binop::Less => "<",
            Binop::Greater => ">",
            Binop::LessEqual => "<=",
            Binop::GreaterEqual => ">=",
            Binop::Add => "+",
            Binop::Sub => "-",
            Binop::Mul => "*",
            Binop::Div => "/",
            Binop::Rem => "%",
        };
        write!(f, "{token}")
    }
}

/// Operator table: given a surface operator and the (already equal)
/// operand type, yields the resolved operator and the result type.
///
/// Logical operators work on `bool` and yield `bool`. Bitwise and
/// arithmetic operators work on `int32` and yield `int32`. Equality
/// and relational comparisons work on `int32` and yield `bool`.
/// Anything else has no entry and fails resolution.
pub fn resolve_operator(op: BinaryOp, operand: Ty) -> Option<(Binop, Ty)> {
    let entry = match (op, operand) {
        (BinaryOp::LogicalOr, Ty::Bool) => (Binop::LogicalOr, Ty::Bool),
        (BinaryOp::LogicalAnd, Ty::Bool) => (Binop::LogicalAnd, Ty::Bool),

        (BinaryOp::BitwiseOr, Ty::Int32) => (Binop::BitwiseOr, Ty::Int32),
        (BinaryOp::BitwiseXor, Ty::Int32) => (Binop::BitwiseXor, Ty::Int32),
        (BinaryOp::BitwiseAnd, Ty::Int32) => (Binop::BitwiseAnd, Ty::Int32),

        (BinaryOp::Equal, Ty::Int32) => (Binop::Equal, Ty::Bool),
        (BinaryOp::NotEqual, Ty::Int32) => (Binop::NotEqual, Ty::Bool),
        (BinaryOp::Less, Ty::Int32) => (Binop::Less, Ty::Bool),
        (BinaryOp::Greater, Ty::Int32) => (Binop::Greater, Ty::Bool),
        (BinaryOp::LessEqual, Ty::Int32) => (Binop::LessEqual, Ty::Bool),
        (BinaryOp::GreaterEqual, Ty::Int32) => (Binop::GreaterEqual, Ty::Bool),

        (BinaryOp::Add, Ty::Int32) => (Binop::Add, Ty::Int32),
        (BinaryOp::Sub, Ty::Int32) => (Binop::Sub, Ty::Int32),
        (BinaryOp::Mul, Ty::Int32) => (Binop::Mul, Ty::Int32),
        (BinaryOp::Div, Ty::Int32) => (Binop::Div, Ty::Int32),
        (BinaryOp::Rem, Ty::Int32) => (Binop::Rem, Ty::Int32),

        _ => return None,
    };
    Some(entry)
}
