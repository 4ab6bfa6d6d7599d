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

//! Type resolver: turns the untyped `ast` tree into the typed `hir` tree.
//!
//! Scopes live in an arena indexed by creation order; a variable declared
//! in scope `n` is renamed to `name_n`, which makes every binding unique
//! across the whole module and lets the later stages treat names as flat
//! symbols. Functions live in a separate module-wide namespace.
//! Resolution is fail-fast: the first violated rule aborts the walk.

use crate::ast;
use crate::hir;
use crate::types::{FuncSig, Ty};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum TypeError {
    #[error("Unresolved identifier '{0}'")]
    UnresolvedIdentifier(String),
    #[error("Unresolved function '{0}'")]
    UnresolvedFunction(String),
    #[error("'{0}' is a variable, not a function")]
    NotAFunction(String),
    #[error("Function '{0}' cannot be used as a value")]
    FunctionAsValue(String),
    #[error("Variable '{0}' is already declared in this scope")]
    DuplicateVariable(String),
    #[error("Function '{0}' is already declared")]
    DuplicateFunction(String),
    #[error("Operand types do not match: {left} vs {right}")]
    OperandMismatch { left: Ty, right: Ty },
    #[error("Operator '{op}' is not supported for type {ty}")]
    UnsupportedOperator { op: ast::BinaryOp, ty: Ty },
    #[error("Cannot assign {value} to '{name}' of type {target}")]
    AssignMismatch { name: String, target: Ty, value: Ty },
    #[error("Declaration of '{name}' is annotated {annotated} but initialized with {inferred}")]
    DeclMismatch {
        name: String,
        annotated: Ty,
        inferred: Ty,
    },
    #[error("Declaration of '{0}' has neither a type annotation nor an initializer")]
    MissingVarType(String),
    #[error("Void is not a value type in {0}")]
    VoidValue(String),
    #[error("Return type mismatch: expected {expected}, found {found}")]
    ReturnMismatch { expected: Ty, found: Ty },
    #[error("Call to '{callee}' expects {expected} argument(s), found {found}")]
    CallArityMismatch {
        callee: String,
        expected: usize,
        found: usize,
    },
    #[error("Call to '{callee}' has mismatched argument type(s) at index(es) {indices:?}")]
    CallArgMismatch { callee: String, indices: Vec<usize> },
}

/// Resolve a whole module. Entry point of the stage.
pub fn resolve(module: &ast::Module) -> Result<hir::Module, TypeError> {
    let mut checker = Checker::new();
    let body = checker.resolve_body(ROOT, &module.body)?;
    Ok(hir::Module { body })
}

const ROOT: usize = 0;

struct Scope {
    parent: Option<usize>,
    vars: HashMap<String, Ty>,
    /// Declared return type of the enclosing function, if this scope
    /// opens a function body. The root scope carries `Void` so that a
    /// bare top-level `return` resolves.
    return_type: Option<Ty>,
}

struct Checker {
    scopes: Vec<Scope>,
    functions: HashMap<String, FuncSig>,
}

impl Checker {
    fn new() -> Self {
        Checker {
            scopes: vec![Scope {
                parent: None,
                vars: HashMap::new(),
                return_type: Some(Ty::Void),
            }],
            functions: HashMap::new(),
        }
    }

    // =========================================================================
    // Scope arena
    // =========================================================================

    fn new_scope(&mut self, parent: Option<usize>, return_type: Option<Ty>) -> usize {
        self.scopes.push(Scope {
            parent,
            vars: HashMap::new(),
            return_type,
        });
        self.scopes.len() - 1
    }

    fn declare(&mut self, scope: usize, name: &str, ty: Ty) -> Result<String, TypeError> {
        let vars = &mut self.scopes[scope].vars;
        if vars.contains_key(name) {
            return Err(TypeError::DuplicateVariable(name.to_string()));
        }
        vars.insert(name.to_string(), ty);
        Ok(format!("{name}_{scope}"))
    }

    fn lookup(&self, scope: usize, name: &str) -> Option<(Ty, String)> {
        let mut current = scope;
        loop {
            if let Some(ty) = self.scopes[current].vars.get(name) {
                return Some((*ty, format!("{name}_{current}")));
            }
            current = self.scopes[current].parent?;
        }
    }

    fn return_type(&self, scope: usize) -> Ty {
        let mut current = scope;
        loop {
            if let Some(ty) = self.scopes[current].return_type {
                return ty;
            }
            match self.scopes[current].parent {
                Some(parent) => current = parent,
                None => return Ty::Void,
            }
        }
    }

    // =========================================================================
    // Statements
    // =========================================================================

    fn resolve_body(
        &mut self,
        scope: usize,
        body: &[ast::Stmt],
    ) -> Result<Vec<hir::Stmt>, TypeError> {
        body.iter()
            .map(|stmt| self.resolve_stmt(scope, stmt))
            .collect()
    }

    fn resolve_stmt(&mut self, scope: usize, stmt: &ast::Stmt) -> Result<hir::Stmt, TypeError> {
        match stmt {
            ast::Stmt::Expression { expression } => Ok(hir::Stmt::Expression {
                expression: self.resolve_expr(scope, expression)?,
            }),
            ast::Stmt::VarDecl {
                name,
                annotation,
                init,
            } => self.resolve_var_decl(scope, name, *annotation, init.as_ref()),
            ast::Stmt::Block { body } => {
                let child = self.new_scope(Some(scope), None);
                Ok(hir::Stmt::Block {
                    body: self.resolve_body(child, body)?,
                })
            }
            ast::Stmt::If {
                test,
                consequent,
                alternate,
            } => {
                let test = self.resolve_expr(scope, test)?;
                if !test.ty.is_value() {
                    return Err(TypeError::VoidValue("an if condition".into()));
                }
                let consequent = Box::new(self.resolve_stmt(scope, consequent)?);
                let alternate = match alternate {
                    Some(stmt) => Some(Box::new(self.resolve_stmt(scope, stmt)?)),
                    None => None,
                };
                Ok(hir::Stmt::If {
                    test,
                    consequent,
                    alternate,
                })
            }
            ast::Stmt::Loop { test, body } => {
                let test = self.resolve_expr(scope, test)?;
                if !test.ty.is_value() {
                    return Err(TypeError::VoidValue("a loop condition".into()));
                }
                let body = Box::new(self.resolve_stmt(scope, body)?);
                Ok(hir::Stmt::Loop { test, body })
            }
            ast::Stmt::Function {
                name,
                params,
                return_type,
                body,
            } => self.resolve_function(name, params, *return_type, body),
            ast::Stmt::Return { value } => {
                let expected = self.return_type(scope);
                let value = value
                    .as_ref()
                    .map(|expr| self.resolve_expr(scope, expr))
                    .transpose()?;
                let found = value.as_ref().map_or(Ty::Void, |expr| expr.ty);
                if found != expected {
                    return Err(TypeError::ReturnMismatch { expected, found });
                }
                Ok(hir::Stmt::Return { value })
            }
            ast::Stmt::Print { expression } => {
                let expression = self.resolve_expr(scope, expression)?;
                if !expression.ty.is_value() {
                    return Err(TypeError::VoidValue("a print statement".into()));
                }
                Ok(hir::Stmt::Print { expression })
            }
        }
    }

    fn resolve_var_decl(
        &mut self,
        scope: usize,
        name: &str,
        annotation: Option<Ty>,
        init: Option<&ast::Expr>,
    ) -> Result<hir::Stmt, TypeError> {
        // The initializer resolves before the name is declared, so
        // `var x = x;` refers to an outer `x` or fails.
        let init = init
            .map(|expr| self.resolve_expr(scope, expr))
            .transpose()?;
        let ty = match (annotation, &init) {
            (Some(annotated), Some(expr)) => {
                if annotated != expr.ty {
                    return Err(TypeError::DeclMismatch {
                        name: name.to_string(),
                        annotated,
                        inferred: expr.ty,
                    });
                }
                annotated
            }
            (Some(annotated), None) => annotated,
            (None, Some(expr)) => expr.ty,
            (None, None) => return Err(TypeError::MissingVarType(name.to_string())),
        };
        if !ty.is_value() {
            return Err(TypeError::VoidValue(format!("the declaration of '{name}'")));
        }
        let name = self.declare(scope, name, ty)?;
        Ok(hir::Stmt::VarDecl { name, ty, init })
    }

    fn resolve_function(
        &mut self,
        name: &str,
        params: &[ast::ParamDecl],
        return_type: Option<Ty>,
        body: &[ast::Stmt],
    ) -> Result<hir::Stmt, TypeError> {
        if self.functions.contains_key(name) {
            return Err(TypeError::DuplicateFunction(name.to_string()));
        }
        let return_type = return_type.unwrap_or(Ty::Void);

        // Functions are lifted to the top level by the CFG builder and
        // top-level variables are locals of the synthetic start function,
        // so a body must not see any enclosing binding. The parameter
        // scope is detached: lookups stop here.
        let param_scope = self.new_scope(None, Some(return_type));
        let mut resolved_params = Vec::with_capacity(params.len());
        for param in params {
            if !param.annotation.is_value() {
                return Err(TypeError::VoidValue(format!(
                    "the parameter '{}'",
                    param.name
                )));
            }
            let symbol = self.declare(param_scope, &param.name, param.annotation)?;
            resolved_params.push(hir::Param {
                name: symbol,
                ty: param.annotation,
            });
        }

        // Registered before the body resolves so recursion works.
        let symbol = format!("{name}_{ROOT}");
        self.functions.insert(
            name.to_string(),
            FuncSig {
                params: params.iter().map(|p| p.annotation).collect(),
                return_type,
                symbol: symbol.clone(),
            },
        );

        let body_scope = self.new_scope(Some(param_scope), None);
        let body = self.resolve_body(body_scope, body)?;
        Ok(hir::Stmt::Function(hir::FuncDecl {
            name: symbol,
            params: resolved_params,
            return_type,
            body,
        }))
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    fn resolve_expr(&mut self, scope: usize, expr: &ast::Expr) -> Result<hir::Expr, TypeError> {
        match expr {
            ast::Expr::Assign { target, value } => {
                let (target_ty, symbol) = self
                    .lookup(scope, target)
                    .ok_or_else(|| TypeError::UnresolvedIdentifier(target.clone()))?;
                let value = self.resolve_expr(scope, value)?;
                if value.ty != target_ty {
                    return Err(TypeError::AssignMismatch {
                        name: target.clone(),
                        target: target_ty,
                        value: value.ty,
                    });
                }
                Ok(hir::Expr {
                    ty: target_ty,
                    kind: hir::ExprKind::Assign {
                        target: symbol,
                        value: Box::new(value),
                    },
                })
            }
            ast::Expr::Binary {
                left,
                operator,
                right,
            } => {
                let left = self.resolve_expr(scope, left)?;
                let right = self.resolve_expr(scope, right)?;
                if left.ty != right.ty {
                    return Err(TypeError::OperandMismatch {
                        left: left.ty,
                        right: right.ty,
                    });
                }
                let (op, ty) = hir::resolve_operator(*operator, left.ty).ok_or(
                    TypeError::UnsupportedOperator {
                        op: *operator,
                        ty: left.ty,
                    },
                )?;
                Ok(hir::Expr {
                    ty,
                    kind: hir::ExprKind::Binary {
                        left: Box::new(left),
                        op,
                        right: Box::new(right),
                    },
                })
            }
            ast::Expr::Call { callee, args } => self.resolve_call(scope, callee, args),
            ast::Expr::Bool { value } => Ok(hir::Expr {
                ty: Ty::Bool,
                kind: hir::ExprKind::Bool(*value),
            }),
            ast::Expr::Number { value } => Ok(hir::Expr {
                ty: Ty::Int32,
                kind: hir::ExprKind::Number(*value),
            }),
            ast::Expr::Identifier { name } => match self.lookup(scope, name) {
                Some((ty, symbol)) => Ok(hir::Expr {
                    ty,
                    kind: hir::ExprKind::Ident(symbol),
                }),
                None if self.functions.contains_key(name) => {
                    Err(TypeError::FunctionAsValue(name.clone()))
                }
                None => Err(TypeError::UnresolvedIdentifier(name.clone())),
            },
        }
    }

    fn resolve_call(
        &mut self,
        scope: usize,
        callee: &str,
        args: &[ast::Expr],
    ) -> Result<hir::Expr, TypeError> {
        let sig = match self.functions.get(callee) {
            Some(sig) => sig.clone(),
            None if self.lookup(scope, callee).is_some() => {
                return Err(TypeError::NotAFunction(callee.to_string()));
            }
            None => return Err(TypeError::UnresolvedFunction(callee.to_string())),
        };
        let args = args
            .iter()
            .map(|arg| self.resolve_expr(scope, arg))
            .collect::<Result<Vec<_>, _>>()?;
        if args.len() != sig.params.len() {
            return Err(TypeError::CallArityMismatch {
                callee: callee.to_string(),
                expected: sig.params.len(),
                found: args.len(),
            });
        }
        // Every offending position is reported in one error.
        let indices: Vec<usize> = sig
            .params
            .iter()
            .zip(&args)
            .enumerate()
            .filter(|(_, (param, arg))| **param != arg.ty)
            .map(|(index, _)| index)
            .collect();
        if !indices.is_empty() {
            return Err(TypeError::CallArgMismatch {
                callee: callee.to_string(),
                indices,
            });
        }
        Ok(hir::Expr {
            ty: sig.return_type,
            kind: hir::ExprKind::Call {
                callee: sig.symbol,
                args,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{BinaryOp, Expr, Module, ParamDecl, Stmt};

    fn num(value: i32) -> Expr {
        Expr::Number { value }
    }

    fn boolean(value: bool) -> Expr {
        Expr::Bool { value }
    }

    fn ident(name: &str) -> Expr {
        Expr::Identifier { name: name.into() }
    }

    fn binary(left: Expr, operator: BinaryOp, right: Expr) -> Expr {
        Expr::Binary {
            left: Box::new(left),
            operator,
            right: Box::new(right),
        }
    }

    fn decl(name: &str, annotation: Option<Ty>, init: Option<Expr>) -> Stmt {
        Stmt::VarDecl {
            name: name.into(),
            annotation,
            init,
        }
    }

    fn module(body: Vec<Stmt>) -> Module {
        Module { body }
    }

    #[test]
    fn test_declaration_infers_type_from_initializer() {
        let hir = resolve(&module(vec![
            decl("x", None, Some(num(1))),
            Stmt::Print {
                expression: ident("x"),
            },
        ]))
        .unwrap();
        match &hir.body[0] {
            hir::Stmt::VarDecl { name, ty, .. } => {
                assert_eq!(name, "x_0");
                assert_eq!(*ty, Ty::Int32);
            }
            other => panic!("expected var decl, got {other:?}"),
        }
    }

    #[test]
    fn test_declaration_annotation_must_match_initializer() {
        let err = resolve(&module(vec![decl("x", Some(Ty::Bool), Some(num(1)))])).unwrap_err();
        assert_eq!(
            err,
            TypeError::DeclMismatch {
                name: "x".into(),
                annotated: Ty::Bool,
                inferred: Ty::Int32,
            }
        );
    }

    #[test]
    fn test_declaration_needs_annotation_or_initializer() {
        let err = resolve(&module(vec![decl("x", None, None)])).unwrap_err();
        assert_eq!(err, TypeError::MissingVarType("x".into()));
    }

    #[test]
    fn test_initializer_resolves_before_the_name_is_declared() {
        let err = resolve(&module(vec![decl("x", None, Some(ident("x")))])).unwrap_err();
        assert_eq!(err, TypeError::UnresolvedIdentifier("x".into()));
    }

    #[test]
    fn test_duplicate_declaration_in_one_scope_fails() {
        let err = resolve(&module(vec![
            decl("x", None, Some(num(1))),
            decl("x", None, Some(num(2))),
        ]))
        .unwrap_err();
        assert_eq!(err, TypeError::DuplicateVariable("x".into()));
    }

    #[test]
    fn test_shadowing_in_a_child_scope_gets_a_distinct_symbol() {
        let hir = resolve(&module(vec![
            decl("x", None, Some(num(1))),
            Stmt::Block {
                body: vec![
                    decl("x", None, Some(boolean(true))),
                    Stmt::Print {
                        expression: binary(num(1), BinaryOp::Add, num(2)),
                    },
                ],
            },
        ]))
        .unwrap();
        let inner = match &hir.body[1] {
            hir::Stmt::Block { body } => body,
            other => panic!("expected block, got {other:?}"),
        };
        match &inner[0] {
            hir::Stmt::VarDecl { name, ty, .. } => {
                assert_eq!(name, "x_1");
                assert_eq!(*ty, Ty::Bool);
            }
            other => panic!("expected var decl, got {other:?}"),
        }
    }

    #[test]
    fn test_block_locals_are_invisible_to_the_enclosing_scope() {
        let err = resolve(&module(vec![
            Stmt::Block {
                body: vec![decl("x", None, Some(num(1)))],
            },
            Stmt::Print {
                expression: ident("x"),
            },
        ]))
        .unwrap_err();
        assert_eq!(err, TypeError::UnresolvedIdentifier("x".into()));
    }

    #[test]
    fn test_operands_of_different_types_fail() {
        let err = resolve(&module(vec![Stmt::Print {
            expression: binary(num(1), BinaryOp::Add, boolean(true)),
        }]))
        .unwrap_err();
        assert_eq!(
            err,
            TypeError::OperandMismatch {
                left: Ty::Int32,
                right: Ty::Bool,
            }
        );
    }

    #[test]
    fn test_arithmetic_on_bool_is_unsupported() {
        let err = resolve(&module(vec![Stmt::Print {
            expression: binary(boolean(true), BinaryOp::Add, boolean(false)),
        }]))
        .unwrap_err();
        assert_eq!(
            err,
            TypeError::UnsupportedOperator {
                op: BinaryOp::Add,
                ty: Ty::Bool,
            }
        );
    }

    #[test]
    fn test_comparison_result_is_bool() {
        let hir = resolve(&module(vec![decl(
            "b",
            Some(Ty::Bool),
            Some(binary(num(1), BinaryOp::Less, num(2))),
        )]))
        .unwrap();
        match &hir.body[0] {
            hir::Stmt::VarDecl { ty, .. } => assert_eq!(*ty, Ty::Bool),
            other => panic!("expected var decl, got {other:?}"),
        }
    }

    #[test]
    fn test_assignment_type_mismatch_fails() {
        let err = resolve(&module(vec![
            decl("x", None, Some(num(1))),
            Stmt::Expression {
                expression: Expr::Assign {
                    target: "x".into(),
                    value: Box::new(boolean(true)),
                },
            },
        ]))
        .unwrap_err();
        assert_eq!(
            err,
            TypeError::AssignMismatch {
                name: "x".into(),
                target: Ty::Int32,
                value: Ty::Bool,
            }
        );
    }

    fn func(name: &str, params: Vec<(&str, Ty)>, return_type: Option<Ty>, body: Vec<Stmt>) -> Stmt {
        Stmt::Function {
            name: name.into(),
            params: params
                .into_iter()
                .map(|(name, annotation)| ParamDecl {
                    name: name.into(),
                    annotation,
                })
                .collect(),
            return_type,
            body,
        }
    }

    #[test]
    fn test_return_type_mismatch_fails() {
        let err = resolve(&module(vec![func(
            "f",
            vec![],
            Some(Ty::Int32),
            vec![Stmt::Return {
                value: Some(boolean(true)),
            }],
        )]))
        .unwrap_err();
        assert_eq!(
            err,
            TypeError::ReturnMismatch {
                expected: Ty::Int32,
                found: Ty::Bool,
            }
        );
    }

    #[test]
    fn test_bare_return_at_the_top_level_is_void() {
        assert!(resolve(&module(vec![Stmt::Return { value: None }])).is_ok());
        let err = resolve(&module(vec![Stmt::Return {
            value: Some(num(1)),
        }]))
        .unwrap_err();
        assert_eq!(
            err,
            TypeError::ReturnMismatch {
                expected: Ty::Void,
                found: Ty::Int32,
            }
        );
    }

    #[test]
    fn test_call_collects_every_mismatched_argument_index() {
        let err = resolve(&module(vec![
            func(
                "f",
                vec![("a", Ty::Int32), ("b", Ty::Int32), ("c", Ty::Bool)],
                None,
                vec![],
            ),
            Stmt::Expression {
                expression: Expr::Call {
                    callee: "f".into(),
                    args: vec![boolean(true), num(1), num(2)],
                },
            },
        ]))
        .unwrap_err();
        assert_eq!(
            err,
            TypeError::CallArgMismatch {
                callee: "f".into(),
                indices: vec![0, 2],
            }
        );
    }

    #[test]
    fn test_call_arity_mismatch_fails() {
        let err = resolve(&module(vec![
            func("f", vec![("a", Ty::Int32)], None, vec![]),
            Stmt::Expression {
                expression: Expr::Call {
                    callee: "f".into(),
                    args: vec![],
                },
            },
        ]))
        .unwrap_err();
        assert_eq!(
            err,
            TypeError::CallArityMismatch {
                callee: "f".into(),
                expected: 1,
                found: 0,
            }
        );
    }

    #[test]
    fn test_calling_an_unknown_function_fails() {
        let err = resolve(&module(vec![Stmt::Expression {
            expression: Expr::Call {
                callee: "f".into(),
                args: vec![],
            },
        }]))
        .unwrap_err();
        assert_eq!(err, TypeError::UnresolvedFunction("f".into()));
    }

    #[test]
    fn test_calling_a_variable_fails() {
        let err = resolve(&module(vec![
            decl("x", None, Some(num(1))),
            Stmt::Expression {
                expression: Expr::Call {
                    callee: "x".into(),
                    args: vec![],
                },
            },
        ]))
        .unwrap_err();
        assert_eq!(err, TypeError::NotAFunction("x".into()));
    }

    #[test]
    fn test_using_a_function_as_a_value_fails() {
        let err = resolve(&module(vec![
            func("f", vec![], None, vec![]),
            Stmt::Print {
                expression: ident("f"),
            },
        ]))
        .unwrap_err();
        assert_eq!(err, TypeError::FunctionAsValue("f".into()));
    }

    #[test]
    fn test_duplicate_function_declaration_fails() {
        let err = resolve(&module(vec![
            func("f", vec![], None, vec![]),
            func("f", vec![], None, vec![]),
        ]))
        .unwrap_err();
        assert_eq!(err, TypeError::DuplicateFunction("f".into()));
    }

    #[test]
    fn test_recursion_resolves() {
        let result = resolve(&module(vec![func(
            "f",
            vec![("n", Ty::Int32)],
            Some(Ty::Int32),
            vec![Stmt::Return {
                value: Some(Expr::Call {
                    callee: "f".into(),
                    args: vec![ident("n")],
                }),
            }],
        )]));
        assert!(result.is_ok());
    }

    #[test]
    fn test_function_bodies_do_not_capture_enclosing_locals() {
        let err = resolve(&module(vec![
            decl("x", None, Some(num(1))),
            func(
                "f",
                vec![],
                Some(Ty::Int32),
                vec![Stmt::Return {
                    value: Some(ident("x")),
                }],
            ),
        ]))
        .unwrap_err();
        assert_eq!(err, TypeError::UnresolvedIdentifier("x".into()));
    }

    #[test]
    fn test_print_of_a_void_call_fails() {
        let err = resolve(&module(vec![
            func("f", vec![], None, vec![]),
            Stmt::Print {
                expression: Expr::Call {
                    callee: "f".into(),
                    args: vec![],
                },
            },
        ]))
        .unwrap_err();
        assert_eq!(err, TypeError::VoidValue("a print statement".into()));
    }

    #[test]
    fn test_void_annotation_is_rejected() {
        let err = resolve(&module(vec![decl("x", Some(Ty::Void), None)])).unwrap_err();
        assert_eq!(
            err,
            TypeError::VoidValue("the declaration of 'x'".into())
        );
    }
}
