use crate::error::PrimError;
use crate::heap::{Boxed, BoxedRef};
use crate::object::{Object, TypeTag};

use super::{type_error, want_int, PrimCtx};

fn want_string(args: &[Object], i: usize) -> Result<BoxedRef, PrimError> {
    match args[i] {
        Object::Str(h) => Ok(h),
        other => Err(type_error(TypeTag::Str, other)),
    }
}

fn str_ref<'a>(ctx: &'a PrimCtx<'_>, h: BoxedRef) -> &'a str {
    match ctx.heap.boxed.get(h) {
        Boxed::Str(s) => s,
        Boxed::Bytes { .. } => panic!("object contract violation: bytevector in string slot"),
    }
}

pub fn prim_string_length(ctx: &mut PrimCtx<'_>, args: &[Object]) -> Result<Object, PrimError> {
    let h = want_string(args, 0)?;
    Ok(Object::Int(str_ref(ctx, h).chars().count() as i32))
}

pub fn prim_string_ref(ctx: &mut PrimCtx<'_>, args: &[Object]) -> Result<Object, PrimError> {
    let h = want_string(args, 0)?;
    let k = want_int(args, 1)?;
    let s = str_ref(ctx, h);
    if k < 0 {
        return Err(PrimError::IndexOutOfRange {
            index: 0,
            len: s.chars().count(),
        });
    }
    match s.chars().nth(k as usize) {
        Some(c) => Ok(Object::Char(c)),
        None => Err(PrimError::IndexOutOfRange {
            index: k as usize,
            len: s.chars().count(),
        }),
    }
}

pub fn prim_string_append(ctx: &mut PrimCtx<'_>, args: &[Object]) -> Result<Object, PrimError> {
    let a = want_string(args, 0)?;
    let b = want_string(args, 1)?;
    let mut s = String::with_capacity(str_ref(ctx, a).len() + str_ref(ctx, b).len());
    s.push_str(str_ref(ctx, a));
    s.push_str(str_ref(ctx, b));
    ctx.heap.alloc_str(&s)
}

pub fn prim_symbol_to_string(ctx: &mut PrimCtx<'_>, args: &[Object]) -> Result<Object, PrimError> {
    match args[0] {
        Object::Symbol(id) => {
            let name = ctx.symbols.resolve(id).to_string();
            ctx.heap.alloc_str(&name)
        }
        other => Err(type_error(TypeTag::Symbol, other)),
    }
}

pub fn prim_string_to_symbol(ctx: &mut PrimCtx<'_>, args: &[Object]) -> Result<Object, PrimError> {
    let h = want_string(args, 0)?;
    let name = str_ref(ctx, h).to_string();
    match ctx.symbols.intern(&name) {
        Some(id) => Ok(Object::Symbol(id)),
        // 16-bit id space exhausted.
        None => Err(PrimError::IndexOutOfRange {
            index: u16::MAX as usize + 1,
            len: u16::MAX as usize,
        }),
    }
}

pub fn prim_char_to_integer(_: &mut PrimCtx<'_>, args: &[Object]) -> Result<Object, PrimError> {
    match args[0] {
        Object::Char(c) => Ok(Object::Int(c as i32)),
        other => Err(type_error(TypeTag::Char, other)),
    }
}

pub fn prim_integer_to_char(_: &mut PrimCtx<'_>, args: &[Object]) -> Result<Object, PrimError> {
    let v = want_int(args, 0)?;
    match u32::try_from(v).ok().and_then(char::from_u32) {
        Some(c) => Ok(Object::Char(c)),
        None => Err(PrimError::IndexOutOfRange {
            index: v.max(0) as usize,
            len: char::MAX as usize,
        }),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
