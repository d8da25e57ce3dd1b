use crate::error::PrimError;
use crate::object::{obj_eq, obj_equal, obj_eqv, Object, TypeTag};

use super::PrimCtx;

// ---------------------------------------------------------------------------
// Equality
// ---------------------------------------------------------------------------

pub fn prim_eq(_: &mut PrimCtx<'_>, args: &[Object]) -> Result<Object, PrimError> {
    Ok(Object::Bool(obj_eq(args[0], args[1])))
}

pub fn prim_eqv(_: &mut PrimCtx<'_>, args: &[Object]) -> Result<Object, PrimError> {
    Ok(Object::Bool(obj_eqv(args[0], args[1])))
}

pub fn prim_equal(ctx: &mut PrimCtx<'_>, args: &[Object]) -> Result<Object, PrimError> {
    Ok(Object::Bool(obj_equal(ctx.heap, args[0], args[1])))
}

pub fn prim_not(_: &mut PrimCtx<'_>, args: &[Object]) -> Result<Object, PrimError> {
    Ok(Object::Bool(!args[0].is_truthy()))
}

// ---------------------------------------------------------------------------
// Type Predicates
// ---------------------------------------------------------------------------

fn tag_is(args: &[Object], tag: TypeTag) -> Result<Object, PrimError> {
    Ok(Object::Bool(args[0].tag() == tag))
}

pub fn prim_is_null(_: &mut PrimCtx<'_>, args: &[Object]) -> Result<Object, PrimError> {
    tag_is(args, TypeTag::EmptyList)
}

pub fn prim_is_pair(_: &mut PrimCtx<'_>, args: &[Object]) -> Result<Object, PrimError> {
    // A list chain's head answers `pair?` too: both shapes carry a car.
    Ok(Object::Bool(matches!(
        args[0],
        Object::Pair(_) | Object::List(_)
    )))
}

pub fn prim_is_list(_: &mut PrimCtx<'_>, args: &[Object]) -> Result<Object, PrimError> {
    Ok(Object::Bool(matches!(
        args[0],
        Object::List(_) | Object::EmptyList
    )))
}

pub fn prim_is_symbol(_: &mut PrimCtx<'_>, args: &[Object]) -> Result<Object, PrimError> {
    tag_is(args, TypeTag::Symbol)
}

pub fn prim_is_number(_: &mut PrimCtx<'_>, args: &[Object]) -> Result<Object, PrimError> {
    Ok(Object::Bool(args[0].is_number()))
}

pub fn prim_is_string(_: &mut PrimCtx<'_>, args: &[Object]) -> Result<Object, PrimError> {
    tag_is(args, TypeTag::Str)
}

pub fn prim_is_char(_: &mut PrimCtx<'_>, args: &[Object]) -> Result<Object, PrimError> {
    tag_is(args, TypeTag::Char)
}

pub fn prim_is_boolean(_: &mut PrimCtx<'_>, args: &[Object]) -> Result<Object, PrimError> {
    tag_is(args, TypeTag::Bool)
}

pub fn prim_is_vector(_: &mut PrimCtx<'_>, args: &[Object]) -> Result<Object, PrimError> {
    tag_is(args, TypeTag::Vector)
}

pub fn prim_is_bytevector(_: &mut PrimCtx<'_>, args: &[Object]) -> Result<Object, PrimError> {
    tag_is(args, TypeTag::Bytevector)
}

pub fn prim_is_procedure(_: &mut PrimCtx<'_>, args: &[Object]) -> Result<Object, PrimError> {
    Ok(Object::Bool(matches!(
        args[0],
        Object::Procedure(_) | Object::Closure(_) | Object::Primitive(_)
    )))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::{Heap, HeapConfig};
    use crate::platform::Platform;
    use crate::symbol::SymbolTable;

    fn with_ctx<R>(f: impl FnOnce(&mut PrimCtx<'_>) -> R) -> R {
        let mut heap = Heap::new(HeapConfig::default());
        let mut platform = Platform::host();
        let mut symbols = SymbolTable::new();
        let mut ctx = PrimCtx {
            heap: &mut heap,
            platform: &mut platform,
            symbols: &mut symbols,
        };
        f(&mut ctx)
    }

    #[test]
    fn eq_and_equal_disagree_on_distinct_lists() {
        with_ctx(|ctx| {
            let a = ctx
                .heap
                .alloc_list_from(&[Object::Int(1), Object::Int(2), Object::Int(3)])
                .unwrap();
            let b = ctx
                .heap
                .alloc_list_from(&[Object::Int(1), Object::Int(2), Object::Int(3)])
                .unwrap();
            assert_eq!(prim_eq(ctx, &[a, b]).unwrap(), Object::Bool(false));
            assert_eq!(prim_equal(ctx, &[a, b]).unwrap(), Object::Bool(true));
        });
    }

    #[test]
    fn not_follows_scheme_truthiness() {
        with_ctx(|ctx| {
            assert_eq!(
                prim_not(ctx, &[Object::Bool(false)]).unwrap(),
                Object::Bool(true)
            );
            assert_eq!(prim_not(ctx, &[Object::Int(0)]).unwrap(), Object::Bool(false));
        });
    }

    #[test]
    fn procedure_predicate_covers_all_callables() {
        with_ctx(|ctx| {
            let clo = ctx.heap.alloc_closure(vec![], 0, 0x10).unwrap();
            for obj in [Object::Procedure(1), Object::Primitive(2), clo] {
                assert_eq!(
                    prim_is_procedure(ctx, &[obj]).unwrap(),
                    Object::Bool(true)
                );
            }
            assert_eq!(
                prim_is_procedure(ctx, &[Object::Int(1)]).unwrap(),
                Object::Bool(false)
            );
        });
    }
}
