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

//! Control-flow graph IR.
//!
//! Every function is a set of basic blocks held in a `BlockArena` and
//! addressed by `BlockId`, so the graph can share targets freely without
//! ownership cycles. A block runs its instructions top to bottom and then
//! transfers control through its single terminator.

use crate::hir::Binop;
use crate::types::ValType;
use serde::Serialize;
use std::fmt;
use std::ops::{Index, IndexMut};

/// Index of a block inside its function's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct BlockId(pub usize);

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Operand {
    Var { name: String },
    Const { value: i32 },
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Var { name } => write!(f, "{name}"),
            Operand::Const { value } => write!(f, "{value}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Inst {
    Assign {
        dst: String,
        value: Operand,
    },
    Binop {
        dst: String,
        op: Binop,
        left: Operand,
        right: Operand,
        operand_type: ValType,
    },
    /// Stages one argument for the next `Call` in the block.
    PushArg {
        operand: Operand,
    },
    Call {
        dst: Option<String>,
        callee: String,
        arg_count: usize,
    },
    Print {
        operand: Operand,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Terminator {
    Goto {
        target: BlockId,
    },
    IfGoto {
        test: Operand,
        consequent: BlockId,
        alternate: BlockId,
        /// Where both branches meet again. When there is no else branch,
        /// `alternate` equals `join`.
        join: BlockId,
    },
    Loop {
        test: Operand,
        body: BlockId,
        end: BlockId,
    },
    Return {
        value: Option<Operand>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Block {
    pub name: String,
    pub insts: Vec<Inst>,
    pub terminator: Option<Terminator>,
}

/// Owns every block of one function.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlockArena {
    blocks: Vec<Block>,
}

impl BlockArena {
    pub fn new() -> Self {
        BlockArena { blocks: Vec::new() }
    }

    pub fn alloc(&mut self, name: impl Into<String>) -> BlockId {
        self.blocks.push(Block {
            name: name.into(),
            insts: Vec::new(),
            terminator: None,
        });
        BlockId(self.blocks.len() - 1)
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// First write wins: a block that already ended (say, with a return
    /// inside an if branch) must not be re-terminated by the goto the
    /// enclosing construct appends to its branches.
    pub fn set_terminator(&mut self, id: BlockId, terminator: Terminator) {
        let block = &mut self.blocks[id.0];
        if block.terminator.is_none() {
            block.terminator = Some(terminator);
        }
    }

    /// Depth-first traversal over terminator edges, each block once, in
    /// first-visit order. Loop terminators contribute both the body and
    /// the end block, so code after a loop stays reachable.
    pub fn reachable_from(&self, entry: BlockId) -> Vec<BlockId> {
        let mut seen = vec![false; self.blocks.len()];
        let mut order = Vec::new();
        let mut stack = vec![entry];
        while let Some(id) = stack.pop() {
            if seen[id.0] {
                continue;
            }
            seen[id.0] = true;
            order.push(id);
            // Pushed in reverse so the first successor is visited first.
            match &self.blocks[id.0].terminator {
                Some(Terminator::Goto { target }) => stack.push(*target),
                Some(Terminator::IfGoto {
                    consequent,
                    alternate,
                    ..
                }) => {
                    stack.push(*alternate);
                    stack.push(*consequent);
                }
                Some(Terminator::Loop { body, end, .. }) => {
                    stack.push(*end);
                    stack.push(*body);
                }
                Some(Terminator::Return { .. }) | None => {}
            }
        }
        order
    }
}

impl Default for BlockArena {
    fn default() -> Self {
        Self::new()
    }
}

impl Index<BlockId> for BlockArena {
    type Output = Block;

    fn index(&self, id: BlockId) -> &Block {
        &self.blocks[id.0]
    }
}

impl IndexMut<BlockId> for BlockArena {
    fn index_mut(&mut self, id: BlockId) -> &mut Block {
        &mut self.blocks[id.0]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Param {
    pub name: String,
    pub ty: ValType,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Function {
    pub name: String,
    pub params: Vec<Param>,
    /// `None` encodes a void function.
    pub return_type: Option<ValType>,
    pub entry: BlockId,
    pub blocks: BlockArena,
    /// Blocks reachable from `entry`, in visit order.
    pub reachable: Vec<BlockId>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Module {
    /// Synthetic function holding the top-level statements.
    pub start: Function,
    pub functions: Vec<Function>,
}

impl Module {
    pub fn iter_functions(&self) -> impl Iterator<Item = &Function> {
        std::iter::once(&self.start).chain(self.functions.iter())
    }

    /// Pretty JSON dump for debugging the CFG builder output.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

// =============================================================================
// Pretty printer
// =============================================================================

impl fmt::Display for Inst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Inst::Assign { dst, value } => write!(f, "{dst} = {value}"),
            Inst::Binop {
                dst,
                op,
                left,
                right,
                operand_type,
            } => write!(f, "{dst} = {left} {op} {right} ({operand_type})"),
            Inst::PushArg { operand } => write!(f, "push_arg {operand}"),
            Inst::Call {
                dst: Some(dst),
                callee,
                arg_count,
            } => write!(f, "{dst} = call {callee} [{arg_count} args]"),
            Inst::Call {
                dst: None,
                callee,
                arg_count,
            } => write!(f, "call {callee} [{arg_count} args]"),
            Inst::Print { operand } => write!(f, "print {operand}"),
        }
    }
}

/// Text rendering of a whole module, one `$label:` paragraph per
/// reachable block.
pub fn pretty_print(module: &Module) -> String {
    let mut out = String::new();
    for function in module.iter_functions() {
        let params: Vec<String> = function
            .params
            .iter()
            .map(|p| format!("{}: {}", p.name, p.ty))
            .collect();
        let returns = match function.return_type {
            Some(ty) => ty.to_string(),
            None => "void".to_string(),
        };
        out.push_str(&format!(
            "function {}({}) returns ({}) {{\n",
            function.name,
            params.join(", "),
            returns
        ));
        for id in &function.reachable {
            let block = &function.blocks[*id];
            out.push_str(&format!("${}:\n", block.name));
            for inst in &block.insts {
                out.push_str(&format!("  {inst}\n"));
            }
            match &block.terminator {
                Some(Terminator::Goto { target }) => {
                    out.push_str(&format!("  goto ${}\n", function.blocks[*target].name));
                }
                Some(Terminator::IfGoto {
                    test,
                    consequent,
                    alternate,
                    ..
                }) => {
                    out.push_str(&format!(
                        "  if {} goto ${} else ${}\n",
                        test,
                        function.blocks[*consequent].name,
                        function.blocks[*alternate].name
                    ));
                }
                Some(Terminator::Loop { test, body, end }) => {
                    out.push_str(&format!(
                        "  loop {} body ${} end ${}\n",
                        test,
                        function.blocks[*body].name,
                        function.blocks[*end].name
                    ));
                }
                Some(Terminator::Return { value: Some(value) }) => {
                    out.push_str(&format!("  return {value}\n"));
                }
                Some(Terminator::Return { value: None }) => out.push_str("  return\n"),
                None => {}
            }
        }
        out.push_str("}\n");
    }
    out
}
