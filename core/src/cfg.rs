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

//! CFG builder: flattens the typed tree into basic blocks.
//!
//! Statement lowering threads the "current" block and returns whichever
//! block the following statements land in. Expression lowering flattens
//! nested expressions into three-address instructions, materializing
//! intermediate results in `t{n}` temporaries unless the caller supplies
//! a destination. Function declarations are lifted: each one becomes its
//! own CFG appended to the module list, and the top-level statements form
//! the synthetic `start` function.
//!
//! Lowering is total on well-typed input; nothing here can fail.

use crate::hir;
use crate::mir::{BlockArena, BlockId, Function, Inst, Module, Operand, Param, Terminator};
use crate::types::{Ty, ValType};

/// Lower a resolved module into its control-flow graph form.
pub fn lower(module: &hir::Module) -> Module {
    Builder::default().lower_module(module)
}

/// Per-invocation naming state, so two runs over the same tree produce
/// identical graphs.
#[derive(Default)]
struct Builder {
    if_id: u32,
    loop_id: u32,
    temp_id: u32,
}

impl Builder {
    fn lower_module(mut self, module: &hir::Module) -> Module {
        let mut functions = Vec::new();
        let start = self.lower_function("start", &[], Ty::Void, &module.body, &mut functions);
        Module { start, functions }
    }

    fn lower_function(
        &mut self,
        name: &str,
        params: &[hir::Param],
        return_type: Ty,
        body: &[hir::Stmt],
        lifted: &mut Vec<Function>,
    ) -> Function {
        let mut blocks = BlockArena::new();
        let entry = blocks.alloc("entry");
        let exit = self.lower_body(body, entry, &mut blocks, lifted);
        // A function that falls off its end returns void.
        blocks.set_terminator(exit, Terminator::Return { value: None });
        let reachable = blocks.reachable_from(entry);
        Function {
            name: name.to_string(),
            params: params
                .iter()
                .map(|param| Param {
                    name: param.name.clone(),
                    ty: ValType::I32,
                })
                .collect(),
            return_type: match return_type {
                Ty::Void => None,
                Ty::Int32 | Ty::Bool => Some(ValType::I32),
            },
            entry,
            blocks,
            reachable,
        }
    }

    fn lower_body(
        &mut self,
        body: &[hir::Stmt],
        mut current: BlockId,
        blocks: &mut BlockArena,
        lifted: &mut Vec<Function>,
    ) -> BlockId {
        for stmt in body {
            current = self.lower_stmt(stmt, current, blocks, lifted);
        }
        current
    }

    fn lower_stmt(
        &mut self,
        stmt: &hir::Stmt,
        current: BlockId,
        blocks: &mut BlockArena,
        lifted: &mut Vec<Function>,
    ) -> BlockId {
        match stmt {
            hir::Stmt::Expression { expression } => {
                let (_, insts) = self.lower_expr(expression, None);
                blocks[current].insts.extend(insts);
                current
            }
            hir::Stmt::VarDecl { name, init, .. } => {
                if let Some(init) = init {
                    let (_, insts) = self.lower_expr(init, Some(name));
                    blocks[current].insts.extend(insts);
                }
                current
            }
            hir::Stmt::Block { body } => self.lower_body(body, current, blocks, lifted),
            hir::Stmt::If {
                test,
                consequent,
                alternate,
            } => self.lower_if(test, consequent, alternate.as_deref(), current, blocks, lifted),
            hir::Stmt::Loop { test, body } => self.lower_loop(test, body, current, blocks, lifted),
            hir::Stmt::Function(decl) => {
                let function =
                    self.lower_function(&decl.name, &decl.params, decl.return_type, &decl.body, lifted);
                lifted.push(function);
                current
            }
            hir::Stmt::Return { value } => {
                let value = value.as_ref().map(|expr| {
                    let (operand, insts) = self.lower_expr(expr, None);
                    blocks[current].insts.extend(insts);
                    operand
                });
                blocks.set_terminator(current, Terminator::Return { value });
                current
            }
            hir::Stmt::Print { expression } => {
                let (operand, insts) = self.lower_expr(expression, None);
                blocks[current].insts.extend(insts);
                blocks[current].insts.push(Inst::Print { operand });
                current
            }
        }
    }

    fn lower_if(
        &mut self,
        test: &hir::Expr,
        consequent: &hir::Stmt,
        alternate: Option<&hir::Stmt>,
        current: BlockId,
        blocks: &mut BlockArena,
        lifted: &mut Vec<Function>,
    ) -> BlockId {
        let id = self.if_id;
        self.if_id += 1;

        // The test evaluates in the block that branches.
        let (test_op, test_insts) = self.lower_expr(test, None);
        blocks[current].insts.extend(test_insts);

        let join = blocks.alloc(format!("end_if_{id}"));
        let consequent_id = blocks.alloc(format!("consequent_{id}"));
        let consequent_exit = self.lower_stmt(consequent, consequent_id, blocks, lifted);
        blocks.set_terminator(consequent_exit, Terminator::Goto { target: join });

        let alternate_id = match alternate {
            Some(stmt) => {
                let alternate_id = blocks.alloc(format!("alternate_{id}"));
                let alternate_exit = self.lower_stmt(stmt, alternate_id, blocks, lifted);
                blocks.set_terminator(alternate_exit, Terminator::Goto { target: join });
                alternate_id
            }
            // No else branch: the false edge falls through to the join.
            None => join,
        };

        blocks.set_terminator(
            current,
            Terminator::IfGoto {
                test: test_op,
                consequent: consequent_id,
                alternate: alternate_id,
                join,
            },
        );
        join
    }

    fn lower_loop(
        &mut self,
        test: &hir::Expr,
        body: &hir::Stmt,
        current: BlockId,
        blocks: &mut BlockArena,
        lifted: &mut Vec<Function>,
    ) -> BlockId {
        let id = self.loop_id;
        self.loop_id += 1;

        // The test re-evaluates on every iteration, so its instructions
        // live in the header, not in the entering block.
        let (test_op, test_insts) = self.lower_expr(test, None);
        let header = blocks.alloc(format!("begin_loop_{id}"));
        blocks[header].insts = test_insts;

        let end = blocks.alloc(format!("end_loop_{id}"));
        let body_id = blocks.alloc(format!("loop_body_{id}"));
        let body_exit = self.lower_stmt(body, body_id, blocks, lifted);

        blocks.set_terminator(
            header,
            Terminator::Loop {
                test: test_op,
                body: body_id,
                end,
            },
        );
        blocks.set_terminator(body_exit, Terminator::Goto { target: header });
        blocks.set_terminator(current, Terminator::Goto { target: header });
        end
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    /// Flatten one expression. Returns the operand holding its value and
    /// the instructions computing it. `dst` lets initializers and
    /// assignments write straight into their variable instead of going
    /// through a temporary.
    fn lower_expr(&mut self, expr: &hir::Expr, dst: Option<&str>) -> (Operand, Vec<Inst>) {
        match &expr.kind {
            hir::ExprKind::Assign { target, value } => {
                let (operand, mut insts) = self.lower_expr(value, Some(target));
                match dst {
                    // `x = (y = v)`: the inner assignment lands in y,
                    // then x copies it.
                    Some(outer) if outer != target.as_str() => {
                        insts.push(Inst::Assign {
                            dst: outer.to_string(),
                            value: operand,
                        });
                        (var(outer), insts)
                    }
                    _ => (operand, insts),
                }
            }
            hir::ExprKind::Binary { left, op, right } => {
                let (left_op, mut insts) = self.lower_expr(left, None);
                let (right_op, right_insts) = self.lower_expr(right, None);
                insts.extend(right_insts);
                let dst = self.target(dst);
                insts.push(Inst::Binop {
                    dst: dst.clone(),
                    op: *op,
                    left: left_op,
                    right: right_op,
                    operand_type: ValType::I32,
                });
                (var(&dst), insts)
            }
            hir::ExprKind::Call { callee, args } => {
                let mut insts = Vec::new();
                for arg in args {
                    let (operand, arg_insts) = self.lower_expr(arg, None);
                    insts.extend(arg_insts);
                    insts.push(Inst::PushArg { operand });
                }
                let target = self.target(dst);
                insts.push(Inst::Call {
                    dst: if expr.ty == Ty::Void {
                        None
                    } else {
                        Some(target.clone())
                    },
                    callee: callee.clone(),
                    arg_count: args.len(),
                });
                (var(&target), insts)
            }
            hir::ExprKind::Bool(value) => materialize(Operand::Const { value: i32::from(*value) }, dst),
            hir::ExprKind::Number(value) => materialize(Operand::Const { value: *value }, dst),
            hir::ExprKind::Ident(name) => materialize(var(name), dst),
        }
    }

    fn target(&mut self, dst: Option<&str>) -> String {
        match dst {
            Some(name) => name.to_string(),
            None => {
                let temp = format!("t{}", self.temp_id);
                self.temp_id += 1;
                temp
            }
        }
    }
}

fn var(name: &str) -> Operand {
    Operand::Var {
        name: name.to_string(),
    }
}

fn materialize(value: Operand, dst: Option<&str>) -> (Operand, Vec<Inst>) {
    match dst {
        Some(dst) => (
            var(dst),
            vec![Inst::Assign {
                dst: dst.to_string(),
                value,
            }],
        ),
        None => (value, Vec::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hir::{Binop, Expr, ExprKind, FuncDecl, Module as HirModule, Param, Stmt};
    use crate::mir;

    fn int(value: i32) -> Expr {
        Expr {
            ty: Ty::Int32,
            kind: ExprKind::Number(value),
        }
    }

    fn ident(name: &str, ty: Ty) -> Expr {
        Expr {
            ty,
            kind: ExprKind::Ident(name.into()),
        }
    }

    fn binary(left: Expr, op: Binop, right: Expr, ty: Ty) -> Expr {
        Expr {
            ty,
            kind: ExprKind::Binary {
                left: Box::new(left),
                op,
                right: Box::new(right),
            },
        }
    }

    fn decl(name: &str, ty: Ty, init: Expr) -> Stmt {
        Stmt::VarDecl {
            name: name.into(),
            ty,
            init: Some(init),
        }
    }

    fn print(expression: Expr) -> Stmt {
        Stmt::Print { expression }
    }

    fn block(body: Vec<Stmt>) -> Box<Stmt> {
        Box::new(Stmt::Block { body })
    }

    #[test]
    fn test_straight_line_code_stays_in_the_entry_block() {
        let module = lower(&HirModule {
            body: vec![decl("x_0", Ty::Int32, int(2)), print(ident("x_0", Ty::Int32))],
        });
        assert_eq!(module.start.blocks.len(), 1);
        let entry = &module.start.blocks[module.start.entry];
        assert_eq!(
            entry.insts,
            vec![
                Inst::Assign {
                    dst: "x_0".into(),
                    value: Operand::Const { value: 2 },
                },
                Inst::Print {
                    operand: Operand::Var { name: "x_0".into() },
                },
            ]
        );
        assert_eq!(entry.terminator, Some(Terminator::Return { value: None }));
    }

    #[test]
    fn test_nested_expressions_flatten_into_temporaries() {
        // print 2 + 3 * 4
        let module = lower(&HirModule {
            body: vec![print(binary(
                int(2),
                Binop::Add,
                binary(int(3), Binop::Mul, int(4), Ty::Int32),
                Ty::Int32,
            ))],
        });
        let entry = &module.start.blocks[module.start.entry];
        assert_eq!(
            entry.insts,
            vec![
                Inst::Binop {
                    dst: "t0".into(),
                    op: Binop::Mul,
                    left: Operand::Const { value: 3 },
                    right: Operand::Const { value: 4 },
                    operand_type: ValType::I32,
                },
                Inst::Binop {
                    dst: "t1".into(),
                    op: Binop::Add,
                    left: Operand::Const { value: 2 },
                    right: Operand::Var { name: "t0".into() },
                    operand_type: ValType::I32,
                },
                Inst::Print {
                    operand: Operand::Var { name: "t1".into() },
                },
            ]
        );
    }

    #[test]
    fn test_if_without_else_branches_to_the_join() {
        let module = lower(&HirModule {
            body: vec![
                Stmt::If {
                    test: ident("b_0", Ty::Bool),
                    consequent: block(vec![print(int(1))]),
                    alternate: None,
                },
                print(int(2)),
            ],
        });
        let start = &module.start;
        let entry = &start.blocks[start.entry];
        match entry.terminator.as_ref() {
            Some(Terminator::IfGoto {
                consequent,
                alternate,
                join,
                ..
            }) => {
                assert_eq!(start.blocks[*consequent].name, "consequent_0");
                assert_eq!(alternate, join);
                assert_eq!(start.blocks[*join].name, "end_if_0");
                // The statement after the if lands in the join block.
                assert_eq!(
                    start.blocks[*join].insts,
                    vec![Inst::Print {
                        operand: Operand::Const { value: 2 },
                    }]
                );
            }
            other => panic!("expected if-goto, got {other:?}"),
        }
    }

    #[test]
    fn test_loop_header_holds_the_test() {
        // while (i < 3) { i = i + 1; }
        let module = lower(&HirModule {
            body: vec![
                decl("i_0", Ty::Int32, int(0)),
                Stmt::Loop {
                    test: binary(ident("i_0", Ty::Int32), Binop::Less, int(3), Ty::Bool),
                    body: block(vec![Stmt::Expression {
                        expression: Expr {
                            ty: Ty::Int32,
                            kind: ExprKind::Assign {
                                target: "i_0".into(),
                                value: Box::new(binary(
                                    ident("i_0", Ty::Int32),
                                    Binop::Add,
                                    int(1),
                                    Ty::Int32,
                                )),
                            },
                        },
                    }]),
                },
            ],
        });
        let start = &module.start;
        let entry = &start.blocks[start.entry];
        let header = match entry.terminator.as_ref() {
            Some(Terminator::Goto { target }) => *target,
            other => panic!("expected goto to the loop header, got {other:?}"),
        };
        assert_eq!(start.blocks[header].name, "begin_loop_0");
        assert_eq!(
            start.blocks[header].insts,
            vec![Inst::Binop {
                dst: "t0".into(),
                op: Binop::Less,
                left: Operand::Var { name: "i_0".into() },
                right: Operand::Const { value: 3 },
                operand_type: ValType::I32,
            }]
        );
        match start.blocks[header].terminator.as_ref() {
            Some(Terminator::Loop { test, body, end }) => {
                assert_eq!(
                    test,
                    &Operand::Var { name: "t0".into() }
                );
                assert_eq!(start.blocks[*body].name, "loop_body_0");
                assert_eq!(start.blocks[*end].name, "end_loop_0");
                // The body jumps back to the header.
                assert_eq!(
                    start.blocks[*body].terminator,
                    Some(Terminator::Goto { target: header })
                );
            }
            other => panic!("expected loop terminator, got {other:?}"),
        }
    }

    #[test]
    fn test_return_in_a_branch_is_not_clobbered_by_the_join_goto() {
        let module = lower(&HirModule {
            body: vec![Stmt::Function(FuncDecl {
                name: "pick_0".into(),
                params: vec![Param {
                    name: "b_1".into(),
                    ty: Ty::Bool,
                }],
                return_type: Ty::Int32,
                body: vec![Stmt::If {
                    test: ident("b_1", Ty::Bool),
                    consequent: block(vec![Stmt::Return {
                        value: Some(int(1)),
                    }]),
                    alternate: Some(block(vec![Stmt::Return {
                        value: Some(int(2)),
                    }])),
                }],
            })],
        });
        let function = &module.functions[0];
        assert_eq!(function.name, "pick_0");
        let entry = &function.blocks[function.entry];
        match entry.terminator.as_ref() {
            Some(Terminator::IfGoto {
                consequent,
                alternate,
                ..
            }) => {
                assert_eq!(
                    function.blocks[*consequent].terminator,
                    Some(Terminator::Return {
                        value: Some(Operand::Const { value: 1 }),
                    })
                );
                assert_eq!(
                    function.blocks[*alternate].terminator,
                    Some(Terminator::Return {
                        value: Some(Operand::Const { value: 2 }),
                    })
                );
            }
            other => panic!("expected if-goto, got {other:?}"),
        }
    }

    #[test]
    fn test_call_arguments_push_in_evaluation_order() {
        let module = lower(&HirModule {
            body: vec![
                Stmt::Function(FuncDecl {
                    name: "add_0".into(),
                    params: vec![
                        Param {
                            name: "a_1".into(),
                            ty: Ty::Int32,
                        },
                        Param {
                            name: "b_1".into(),
                            ty: Ty::Int32,
                        },
                    ],
                    return_type: Ty::Int32,
                    body: vec![Stmt::Return {
                        value: Some(binary(
                            ident("a_1", Ty::Int32),
                            Binop::Add,
                            ident("b_1", Ty::Int32),
                            Ty::Int32,
                        )),
                    }],
                }),
                print(Expr {
                    ty: Ty::Int32,
                    kind: ExprKind::Call {
                        callee: "add_0".into(),
                        args: vec![int(2), int(3)],
                    },
                }),
            ],
        });
        let entry = &module.start.blocks[module.start.entry];
        assert_eq!(
            entry.insts,
            vec![
                Inst::PushArg {
                    operand: Operand::Const { value: 2 },
                },
                Inst::PushArg {
                    operand: Operand::Const { value: 3 },
                },
                // t0 was consumed by the function body's own lowering.
                Inst::Call {
                    dst: Some("t1".into()),
                    callee: "add_0".into(),
                    arg_count: 2,
                },
                Inst::Print {
                    operand: Operand::Var { name: "t1".into() },
                },
            ]
        );
    }

    #[test]
    fn test_lowering_is_deterministic() {
        let hir = HirModule {
            body: vec![
                decl("i_0", Ty::Int32, int(0)),
                Stmt::Loop {
                    test: binary(ident("i_0", Ty::Int32), Binop::Less, int(3), Ty::Bool),
                    body: block(vec![print(ident("i_0", Ty::Int32))]),
                },
            ],
        };
        let first = mir::pretty_print(&lower(&hir));
        let second = mir::pretty_print(&lower(&hir));
        assert_eq!(first, second);
    }
}
