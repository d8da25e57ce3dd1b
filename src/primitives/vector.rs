use crate::error::PrimError;
use crate::heap::VectorRef;
use crate::object::{Object, TypeTag};

use super::{type_error, want_index, want_int, PrimCtx};

fn want_vector(args: &[Object], i: usize) -> Result<VectorRef, PrimError> {
    match args[i] {
        Object::Vector(h) => Ok(h),
        other => Err(type_error(TypeTag::Vector, other)),
    }
}

/// `make-vector` — the length is fixed here, once, for the vector's lifetime.
pub fn prim_make_vector(ctx: &mut PrimCtx<'_>, args: &[Object]) -> Result<Object, PrimError> {
    let len = want_int(args, 0)?;
    if len < 0 {
        return Err(PrimError::IndexOutOfRange { index: 0, len: 0 });
    }
    ctx.heap.alloc_vector(vec![args[1]; len as usize])
}

pub fn prim_vector_length(ctx: &mut PrimCtx<'_>, args: &[Object]) -> Result<Object, PrimError> {
    let h = want_vector(args, 0)?;
    Ok(Object::Int(ctx.heap.vectors.get(h).items.len() as i32))
}

pub fn prim_vector_ref(ctx: &mut PrimCtx<'_>, args: &[Object]) -> Result<Object, PrimError> {
    let h = want_vector(args, 0)?;
    let len = ctx.heap.vectors.get(h).items.len();
    let idx = want_index(args, 1, len)?;
    Ok(ctx.heap.vectors.get(h).items[idx])
}

pub fn prim_vector_set(ctx: &mut PrimCtx<'_>, args: &[Object]) -> Result<Object, PrimError> {
    let h = want_vector(args, 0)?;
    let len = ctx.heap.vectors.get(h).items.len();
    let idx = want_index(args, 1, len)?;
    ctx.heap.vectors.get_mut(h).items[idx] = args[2];
    Ok(Object::Unspecified)
}

pub fn prim_vector_fill(ctx: &mut PrimCtx<'_>, args: &[Object]) -> Result<Object, PrimError> {
    let h = want_vector(args, 0)?;
    for slot in ctx.heap.vectors.get_mut(h).items.iter_mut() {
        *slot = args[1];
    }
    Ok(Object::Unspecified)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
