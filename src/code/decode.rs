use crate::error::VmError;

use super::{
    f64_from, i32_from, u16_from, u32_from, CallMode, Literal, Op, LIT_BOOL, LIT_BYTEVECTOR,
    LIT_CHAR, LIT_COMPLEX, LIT_EMPTY_LIST, LIT_INT32, LIT_LIST, LIT_PRIMITIVE, LIT_PROCEDURE,
    LIT_RATIONAL, LIT_REAL, LIT_STR, LIT_SYMBOL, LIT_UNSPECIFIED, LIT_VECTOR,
};

// ---------------------------------------------------------------------------
// Operand Readers
// ---------------------------------------------------------------------------

fn need(code: &[u8], pc: usize, at: usize, n: usize) -> Result<(), VmError> {
    if at + n > code.len() {
        Err(VmError::TruncatedInstruction { pc })
    } else {
        Ok(())
    }
}

fn read_u8(code: &[u8], pc: usize, at: usize) -> Result<u8, VmError> {
    need(code, pc, at, 1)?;
    Ok(code[at])
}

fn read_u16(code: &[u8], pc: usize, at: usize) -> Result<u16, VmError> {
    need(code, pc, at, 2)?;
    Ok(u16_from([code[at], code[at + 1]]))
}

fn read_i32(code: &[u8], pc: usize, at: usize) -> Result<i32, VmError> {
    need(code, pc, at, 4)?;
    Ok(i32_from([code[at], code[at + 1], code[at + 2], code[at + 3]]))
}

fn read_u32(code: &[u8], pc: usize, at: usize) -> Result<u32, VmError> {
    need(code, pc, at, 4)?;
    Ok(u32_from([code[at], code[at + 1], code[at + 2], code[at + 3]]))
}

fn read_f64(code: &[u8], pc: usize, at: usize) -> Result<f64, VmError> {
    need(code, pc, at, 8)?;
    let mut b = [0u8; 8];
    b.copy_from_slice(&code[at..at + 8]);
    Ok(f64_from(b))
}

// ---------------------------------------------------------------------------
// Decoder
// ---------------------------------------------------------------------------

/// Decode one instruction at `pc`. Returns the instruction and the pc of the
/// next one. The class tag (top nibble of the first byte) selects the shape;
/// everything that does not decode is a fatal `IllegalInstruction` — the
/// compiler is trusted, so a stray byte means a corrupt image or a VM bug.
pub fn decode(code: &[u8], pc: usize) -> Result<(Op, usize), VmError> {
    let byte = *code
        .get(pc)
        .ok_or(VmError::TruncatedInstruction { pc })?;
    let class = byte >> 4;
    let n = byte & 0x0F;

    match class {
        // -- single-byte classes --
        0x0 => Ok((Op::PushLocal(n as u16), pc + 1)),
        0x1 => Ok((Op::StoreLocal(n as u16), pc + 1)),
        0x2 => Ok((Op::PushInt(n as i32), pc + 1)),
        0x3 => Ok((Op::Drop(n), pc + 1)),
        0x4 => Ok((Op::PushGlobal(n as u16), pc + 1)),
        0x5 => Ok((Op::StoreGlobal(n as u16), pc + 1)),
        0x6 => Ok((Op::Skip(n), pc + 1)),
        0x7 => Ok((Op::SkipUnless(n), pc + 1)),

        // -- quadruple-byte class --
        0x8 => {
            let entry = read_u16(code, pc, pc + 1)?;
            let third = read_u8(code, pc, pc + 3)?;
            match n {
                0 => Ok((Op::Call { entry, argc: third }, pc + 4)),
                1 => Ok((
                    Op::MakeClosure {
                        entry,
                        frame_size: third,
                    },
                    pc + 4,
                )),
                2 => Ok((
                    Op::MakeStackClosure {
                        entry,
                        frame_size: third,
                    },
                    pc + 4,
                )),
                _ => Err(VmError::IllegalInstruction { pc, byte }),
            }
        }

        // -- double-byte class --
        0xA => {
            let b = read_u8(code, pc, pc + 1)?;
            match n {
                0 => Ok((Op::PushLocal(b as u16), pc + 2)),
                1 => Ok((Op::StoreLocal(b as u16), pc + 2)),
                2 => Ok((Op::PushInt(b as i8 as i32), pc + 2)),
                3 => Ok((Op::Apply { argc: b }, pc + 2)),
                4 => Ok((
                    Op::FreeVar {
                        up: b >> 4,
                        offset: b & 0x0F,
                    },
                    pc + 2,
                )),
                _ => Err(VmError::IllegalInstruction { pc, byte }),
            }
        }

        // -- triple-byte class --
        0xB => match n {
            0 | 1 | 2 => {
                let arity = read_u8(code, pc, pc + 1)?;
                let opt = read_u8(code, pc, pc + 2)?;
                let mode = match n {
                    0 => CallMode::Normal,
                    1 => CallMode::TailCall,
                    _ => CallMode::TailRec,
                };
                Ok((Op::Prelude { mode, arity, opt }, pc + 3))
            }
            3 => Ok((Op::Jump(read_u16(code, pc, pc + 1)?), pc + 3)),
            4 => Ok((Op::JumpUnless(read_u16(code, pc, pc + 1)?), pc + 3)),
            5 => Ok((Op::JumpIf(read_u16(code, pc, pc + 1)?), pc + 3)),
            6 => Ok((Op::PushGlobal(read_u16(code, pc, pc + 1)?), pc + 3)),
            7 => Ok((Op::StoreGlobal(read_u16(code, pc, pc + 1)?), pc + 3)),
            8 => {
                let up = read_u8(code, pc, pc + 1)?;
                let offset = read_u8(code, pc, pc + 2)?;
                Ok((Op::FreeVar { up, offset }, pc + 3))
            }
            _ => Err(VmError::IllegalInstruction { pc, byte }),
        },

        // -- special classes --
        0xC => Ok((Op::Primitive(n as u16), pc + 1)),
        0xD => {
            let b = read_u8(code, pc, pc + 1)?;
            Ok((Op::Primitive((n as u16) << 8 | b as u16), pc + 2))
        }
        0xE => decode_literal(code, pc, n),
        0xF => match n {
            0 => Ok((Op::Halt, pc + 1)),
            1 => Ok((Op::Restore, pc + 1)),
            _ => Err(VmError::IllegalInstruction { pc, byte }),
        },

        // 0x9 is unassigned.
        _ => Err(VmError::IllegalInstruction { pc, byte }),
    }
}

fn decode_literal(code: &[u8], pc: usize, tag: u8) -> Result<(Op, usize), VmError> {
    let at = pc + 1;
    match tag {
        LIT_INT32 => Ok((Op::Object(Literal::Int(read_i32(code, pc, at)?)), at + 4)),
        LIT_REAL => Ok((Op::Object(Literal::Real(read_f64(code, pc, at)?)), at + 8)),
        LIT_RATIONAL => {
            let num = read_i32(code, pc, at)?;
            let den = read_i32(code, pc, at + 4)?;
            Ok((Op::Object(Literal::Rational(num, den)), at + 8))
        }
        LIT_COMPLEX => {
            let re = read_f64(code, pc, at)?;
            let im = read_f64(code, pc, at + 8)?;
            Ok((Op::Object(Literal::Complex(re, im)), at + 16))
        }
        LIT_BOOL => {
            let b = read_u8(code, pc, at)?;
            Ok((Op::Object(Literal::Bool(b != 0)), at + 1))
        }
        LIT_CHAR => {
            let scalar = read_u32(code, pc, at)?;
            let c = char::from_u32(scalar).ok_or(VmError::IllegalInstruction {
                pc,
                byte: code[pc],
            })?;
            Ok((Op::Object(Literal::Char(c)), at + 4))
        }
        LIT_STR => {
            let len = read_u16(code, pc, at)?;
            need(code, pc, at + 2, len as usize)?;
            Ok((
                Op::Object(Literal::Str {
                    pos: (at + 2) as u32,
                    len,
                }),
                at + 2 + len as usize,
            ))
        }
        LIT_SYMBOL => Ok((
            Op::Object(Literal::Symbol(read_u16(code, pc, at)?)),
            at + 2,
        )),
        LIT_LIST => Ok((Op::Object(Literal::List(read_u16(code, pc, at)?)), at + 2)),
        LIT_VECTOR => Ok((
            Op::Object(Literal::Vector(read_u16(code, pc, at)?)),
            at + 2,
        )),
        LIT_BYTEVECTOR => {
            let len = read_u16(code, pc, at)?;
            need(code, pc, at + 2, len as usize)?;
            Ok((
                Op::Object(Literal::Bytevector {
                    pos: (at + 2) as u32,
                    len,
                }),
                at + 2 + len as usize,
            ))
        }
        LIT_PROCEDURE => Ok((
            Op::Object(Literal::Procedure(read_u16(code, pc, at)?)),
            at + 2,
        )),
        LIT_PRIMITIVE => Ok((
            Op::Object(Literal::Primitive(read_u16(code, pc, at)?)),
            at + 2,
        )),
        LIT_EMPTY_LIST => Ok((Op::Object(Literal::EmptyList), at)),
        LIT_UNSPECIFIED => Ok((Op::Object(Literal::Unspecified), at)),
        _ => Err(VmError::IllegalInstruction {
            pc,
            byte: code[pc],
        }),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
