//! Bytecode disassembler. Debugging surface only — the dispatch loop never
//! goes through here.

use crate::error::VmError;

use super::{decode, CallMode, Literal, Op};

/// Render one instruction as `pc  mnemonic operands`.
pub fn render_op(op: &Op) -> String {
    match op {
        Op::PushLocal(n) => format!("push-local {}", n),
        Op::StoreLocal(n) => format!("store-local {}", n),
        Op::PushInt(v) => format!("push-int {}", v),
        Op::Drop(n) => format!("drop {}", n),
        Op::PushGlobal(n) => format!("push-global {}", n),
        Op::StoreGlobal(n) => format!("store-global {}", n),
        Op::Skip(n) => format!("skip +{}", n),
        Op::SkipUnless(n) => format!("skip-unless +{}", n),
        Op::Call { entry, argc } => format!("call {:#06x} argc={}", entry, argc),
        Op::MakeClosure { entry, frame_size } => {
            format!("make-closure {:#06x} fsize={}", entry, frame_size)
        }
        Op::MakeStackClosure { entry, frame_size } => {
            format!("make-stack-closure {:#06x} fsize={}", entry, frame_size)
        }
        Op::Apply { argc } => format!("apply argc={}", argc),
        Op::FreeVar { up, offset } => format!("free-var up={} offset={}", up, offset),
        Op::Prelude { mode, arity, opt } => {
            let m = match mode {
                CallMode::Normal => "normal",
                CallMode::TailCall => "tail-call",
                CallMode::TailRec => "tail-rec",
            };
            format!("prelude {} arity={} opt={}", m, arity, opt)
        }
        Op::Jump(t) => format!("jump {:#06x}", t),
        Op::JumpUnless(t) => format!("jump-unless {:#06x}", t),
        Op::JumpIf(t) => format!("jump-if {:#06x}", t),
        Op::Primitive(id) => format!("primitive {}", id),
        Op::Object(lit) => format!("object {}", render_literal(lit)),
        Op::Halt => "halt".to_string(),
        Op::Restore => "restore".to_string(),
    }
}

fn render_literal(lit: &Literal) -> String {
    match lit {
        Literal::Int(v) => format!("int {}", v),
        Literal::Real(v) => format!("real {}", v),
        Literal::Rational(n, d) => format!("rational {}/{}", n, d),
        Literal::Complex(re, im) => format!("complex {}+{}i", re, im),
        Literal::Bool(b) => format!("bool {}", if *b { "#t" } else { "#f" }),
        Literal::Char(c) => format!("char {:?}", c),
        Literal::Str { len, .. } => format!("string len={}", len),
        Literal::Symbol(id) => format!("symbol {}", id),
        Literal::List(n) => format!("list count={}", n),
        Literal::Vector(n) => format!("vector count={}", n),
        Literal::Bytevector { len, .. } => format!("bytevector len={}", len),
        Literal::Procedure(e) => format!("procedure {:#06x}", e),
        Literal::Primitive(id) => format!("primitive {}", id),
        Literal::EmptyList => "empty-list".to_string(),
        Literal::Unspecified => "unspecified".to_string(),
    }
}

/// Disassemble a whole code segment. Stops at the first byte that does not
/// decode and reports it inline — useful when inspecting a corrupt image.
pub fn disassemble(code: &[u8]) -> String {
    let mut out = String::new();
    let mut pc = 0;
    while pc < code.len() {
        match decode(code, pc) {
            Ok((op, next)) => {
                out.push_str(&format!("{:#06x}  {}\n", pc, render_op(&op)));
                pc = next;
            }
            Err(VmError::IllegalInstruction { byte, .. }) => {
                out.push_str(&format!("{:#06x}  .byte {:#04x} (illegal)\n", pc, byte));
                break;
            }
            Err(_) => {
                out.push_str(&format!("{:#06x}  (truncated)\n", pc));
                break;
            }
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
