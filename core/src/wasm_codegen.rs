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

//! Rebuilds structured control flow from the CFG.
//!
//! The graphs the CFG builder emits are reducible by construction, so a
//! recursive walk with two pieces of ambient context is enough: the join
//! block of the innermost if (a goto there is a structural fallthrough)
//! and the header of the innermost loop (a goto there is a `br`, i.e. a
//! continue). Any other goto target has a single predecessor and is
//! inlined where the goto stood.
//!
//! Every MIR variable becomes one i32 local, allocated on first touch.
//! Reads of a never-written variable observe the format's zero default.

use crate::hir::Binop;
use crate::lir::{Export, Func, Import, Instr, Local, Module, ModuleField, TypeDecl};
use crate::mir;
use crate::types::ValType;

const START: &str = "start";
const PRINT: &str = "print";

/// Lower a CFG module into the structured form.
pub fn lower(module: &mir::Module) -> Module {
    let mut fields = vec![
        ModuleField::Type(TypeDecl {
            id: PRINT.into(),
            params: vec![("x".into(), ValType::I32)],
            results: vec![],
        }),
        ModuleField::Import(Import {
            module: "env".into(),
            name: PRINT.into(),
            id: PRINT.into(),
            type_use: PRINT.into(),
        }),
        ModuleField::Start { func: START.into() },
        ModuleField::Export(Export {
            name: START.into(),
            func: START.into(),
        }),
    ];
    for function in module.iter_functions() {
        let (ty, func) = lower_function(function);
        fields.push(ModuleField::Type(ty));
        fields.push(ModuleField::Func(func));
    }
    Module { fields }
}

fn lower_function(function: &mir::Function) -> (TypeDecl, Func) {
    let mut locals = LocalTable::default();
    // Parameters take the first local slots.
    for param in &function.params {
        locals.ensure(&param.name);
    }
    let body = lower_block(function, function.entry, &mut locals, Ctx::default());
    let ty = TypeDecl {
        id: function.name.clone(),
        params: function
            .params
            .iter()
            .map(|param| (param.name.clone(), param.ty))
            .collect(),
        results: function.return_type.into_iter().collect(),
    };
    let func = Func {
        id: function.name.clone(),
        type_use: function.name.clone(),
        param_count: function.params.len(),
        locals: locals.into_locals(),
        body,
    };
    (ty, func)
}

/// Ambient structural context for goto resolution.
#[derive(Clone, Copy, Default)]
struct Ctx {
    if_join: Option<mir::BlockId>,
    loop_header: Option<mir::BlockId>,
}

fn lower_block(
    function: &mir::Function,
    id: mir::BlockId,
    locals: &mut LocalTable,
    ctx: Ctx,
) -> Vec<Instr> {
    let block = &function.blocks[id];
    let mut instrs = lower_insts(&block.insts, locals);

    match &block.terminator {
        None => instrs,
        Some(mir::Terminator::Goto { target }) => {
            if Some(*target) == ctx.if_join {
                // Falling through the end of a structured if.
                instrs
            } else if Some(*target) == ctx.loop_header {
                instrs.push(Instr::Br(function.blocks[*target].name.clone()));
                instrs
            } else {
                instrs.extend(lower_block(function, *target, locals, ctx));
                instrs
            }
        }
        Some(mir::Terminator::IfGoto {
            test,
            consequent,
            alternate,
            join,
        }) => {
            let inner = Ctx {
                if_join: Some(*join),
                loop_header: ctx.loop_header,
            };
            let then_body = lower_block(function, *consequent, locals, inner);
            let else_body = if alternate == join {
                None
            } else {
                let body = lower_block(function, *alternate, locals, inner);
                if body.is_empty() {
                    None
                } else {
                    Some(body)
                }
            };
            instrs.push(resolve_operand(test, locals));
            instrs.push(Instr::If {
                label: function.blocks[*join].name.clone(),
                then_body,
                else_body,
            });
            instrs.extend(lower_block(function, *join, locals, ctx));
            instrs
        }
        Some(mir::Terminator::Loop { test, body, end }) => {
            // `instrs` holds the loop test here; it re-runs every
            // iteration, so the whole thing nests inside the loop.
            let inner = Ctx {
                if_join: None,
                loop_header: Some(id),
            };
            let body_instrs = lower_block(function, *body, locals, inner);
            instrs.push(resolve_operand(test, locals));
            instrs.push(Instr::If {
                label: function.blocks[*body].name.clone(),
                then_body: body_instrs,
                else_body: None,
            });
            let mut result = vec![Instr::Loop {
                label: block.name.clone(),
                body: instrs,
            }];
            result.extend(lower_block(function, *end, locals, ctx));
            result
        }
        Some(mir::Terminator::Return { value }) => {
            if let Some(value) = value {
                instrs.push(resolve_operand(value, locals));
            }
            instrs.push(Instr::Return);
            instrs
        }
    }
}

fn lower_insts(insts: &[mir::Inst], locals: &mut LocalTable) -> Vec<Instr> {
    let mut out = Vec::new();
    for inst in insts {
        match inst {
            mir::Inst::Assign { dst, value } => {
                out.push(resolve_operand(value, locals));
                locals.ensure(dst);
                out.push(Instr::LocalSet(dst.clone()));
            }
            mir::Inst::Binop {
                dst,
                op,
                left,
                right,
                ..
            } => {
                out.push(resolve_operand(left, locals));
                out.push(resolve_operand(right, locals));
                out.push(binop_instr(*op));
                locals.ensure(dst);
                out.push(Instr::LocalSet(dst.clone()));
            }
            mir::Inst::PushArg { operand } => out.push(resolve_operand(operand, locals)),
            mir::Inst::Call { dst, callee, .. } => {
                out.push(Instr::Call(callee.clone()));
                if let Some(dst) = dst {
                    locals.ensure(dst);
                    out.push(Instr::LocalSet(dst.clone()));
                }
            }
            mir::Inst::Print { operand } => {
                out.push(resolve_operand(operand, locals));
                out.push(Instr::Call(PRINT.into()));
            }
        }
    }
    out
}

fn resolve_operand(operand: &mir::Operand, locals: &mut LocalTable) -> Instr {
    match operand {
        mir::Operand::Var { name } => {
            locals.ensure(name);
            Instr::LocalGet(name.clone())
        }
        mir::Operand::Const { value } => Instr::I32Const(*value),
    }
}

/// Both logical and bitwise operators land on the same i32 opcodes;
/// the resolver already guaranteed logical operands are 0/1.
fn binop_instr(op: Binop) -> Instr {
    match op {
        Binop::LogicalOr | Binop::BitwiseOr => Instr::I32Or,
        Binop::LogicalAnd | Binop::BitwiseAnd => Instr::I32And,
        Binop::BitwiseXor => Instr::I32Xor,
        Binop::Equal => Instr::I32Eq,
        Binop::NotEqual => Instr::I32Ne,
        Binop::Less => Instr::I32LtS,
        Binop::Greater => Instr::I32GtS,
        Binop::LessEqual => Instr::I32LeS,
        Binop::GreaterEqual => Instr::I32GeS,
        Binop::Add => Instr::I32Add,
        Binop::Sub => Instr::I32Sub,
        Binop::Mul => Instr::I32Mul,
        Binop::Div => Instr::I32DivS,
        Binop::Rem => Instr::I32RemS,
    }
}

/// Name → slot table in first-touch order.
#[derive(Default)]
struct LocalTable {
    names: Vec<String>,
}

impl LocalTable {
    fn ensure(&mut self, name: &str) {
        if !self.names.iter().any(|known| known == name) {
            self.names.push(name.to_string());
        }
    }

    fn into_locals(self) -> Vec<Local> {
        self.names
            .into_iter()
            .map(|id| Local { id, ty: ValType::I32 })
            .collect()
    }
}
