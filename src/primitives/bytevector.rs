use crate::error::PrimError;
use crate::heap::{Boxed, BoxedRef};
use crate::object::{Object, TypeTag};

use super::{type_error, want_int, PrimCtx};

fn want_bytevector(args: &[Object], i: usize) -> Result<BoxedRef, PrimError> {
    match args[i] {
        Object::Bytevector(h) => Ok(h),
        other => Err(type_error(TypeTag::Bytevector, other)),
    }
}

fn bytes_len(ctx: &PrimCtx<'_>, h: BoxedRef) -> usize {
    match ctx.heap.boxed.get(h) {
        Boxed::Bytes { data, .. } => data.len(),
        Boxed::Str(_) => panic!("object contract violation: string in bytevector slot"),
    }
}

pub fn prim_make_bytevector(ctx: &mut PrimCtx<'_>, args: &[Object]) -> Result<Object, PrimError> {
    let len = want_int(args, 0)?;
    if len < 0 {
        return Err(PrimError::IndexOutOfRange { index: 0, len: 0 });
    }
    let fill = want_int(args, 1)?;
    if !(0..=255).contains(&fill) {
        return Err(PrimError::IndexOutOfRange {
            index: fill.max(0) as usize,
            len: 256,
        });
    }
    ctx.heap.alloc_bytevector(vec![fill as u8; len as usize], true)
}

pub fn prim_bytevector_length(
    ctx: &mut PrimCtx<'_>,
    args: &[Object],
) -> Result<Object, PrimError> {
    let h = want_bytevector(args, 0)?;
    Ok(Object::Int(bytes_len(ctx, h) as i32))
}

pub fn prim_u8_ref(ctx: &mut PrimCtx<'_>, args: &[Object]) -> Result<Object, PrimError> {
    let h = want_bytevector(args, 0)?;
    let len = bytes_len(ctx, h);
    let idx = super::want_index(args, 1, len)?;
    match ctx.heap.boxed.get(h) {
        Boxed::Bytes { data, .. } => Ok(Object::Int(data[idx] as i32)),
        Boxed::Str(_) => unreachable!(),
    }
}

/// Element update; refused on the immutable variant (literal bytevectors).
pub fn prim_u8_set(ctx: &mut PrimCtx<'_>, args: &[Object]) -> Result<Object, PrimError> {
    let h = want_bytevector(args, 0)?;
    let len = bytes_len(ctx, h);
    let idx = super::want_index(args, 1, len)?;
    let v = want_int(args, 2)?;
    if !(0..=255).contains(&v) {
        return Err(PrimError::IndexOutOfRange {
            index: v.max(0) as usize,
            len: 256,
        });
    }
    match ctx.heap.boxed.get_mut(h) {
        Boxed::Bytes { data, mutable } => {
            if !*mutable {
                return Err(PrimError::ImmutableWrite);
            }
            data[idx] = v as u8;
            Ok(Object::Unspecified)
        }
        Boxed::Str(_) => unreachable!(),
    }
}

/// `bytevector-copy bv start end` — a fresh mutable bytevector of the
/// half-open range `[start, end)`.
pub fn prim_bytevector_copy(ctx: &mut PrimCtx<'_>, args: &[Object]) -> Result<Object, PrimError> {
    let h = want_bytevector(args, 0)?;
    let len = bytes_len(ctx, h);
    let start = want_int(args, 1)?;
    let end = want_int(args, 2)?;
    if start < 0 || end < start || end as usize > len {
        return Err(PrimError::IndexOutOfRange {
            index: end.max(0) as usize,
            len,
        });
    }
    let slice = match ctx.heap.boxed.get(h) {
        Boxed::Bytes { data, .. } => data[start as usize..end as usize].to_vec(),
        Boxed::Str(_) => unreachable!(),
    };
    ctx.heap.alloc_bytevector(slice, true)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
