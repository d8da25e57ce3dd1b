//! Pair and list primitives.
//!
//! `cons` and `append` copy node structure (the chain links) while the
//! element payloads stay shared — they are objects copied by value, whose
//! heap storage is never duplicated. `append` follows R7RS in sharing its
//! final argument's chain.

use crate::error::PrimError;
use crate::heap::ListRef;
use crate::object::{Object, TypeTag};

use super::{type_error, want_int, PrimCtx};

// ---------------------------------------------------------------------------
// cons / car / cdr
// ---------------------------------------------------------------------------

pub fn prim_cons(ctx: &mut PrimCtx<'_>, args: &[Object]) -> Result<Object, PrimError> {
    let (head, tail) = (args[0], args[1]);
    match tail {
        // Consing onto a list copies the tail's chain and prepends one node;
        // a single-element construction is a list of exactly one node.
        Object::EmptyList => ctx.heap.alloc_list_from(&[head]),
        Object::List(h) => {
            let mut items = vec![head];
            items.extend(ctx.heap.list_items(Some(h)));
            ctx.heap.alloc_list_from(&items)
        }
        // Improper tail: a dotted pair.
        _ => ctx.heap.alloc_pair(head, tail),
    }
}

pub fn prim_car(ctx: &mut PrimCtx<'_>, args: &[Object]) -> Result<Object, PrimError> {
    match args[0] {
        Object::Pair(h) => Ok(ctx.heap.pairs.get(h).car),
        Object::List(h) => Ok(ctx.heap.lists.get(h).item),
        other => Err(type_error(TypeTag::Pair, other)),
    }
}

pub fn prim_cdr(ctx: &mut PrimCtx<'_>, args: &[Object]) -> Result<Object, PrimError> {
    match args[0] {
        Object::Pair(h) => Ok(ctx.heap.pairs.get(h).cdr),
        Object::List(h) => Ok(match ctx.heap.lists.get(h).next {
            Some(n) => Object::List(n),
            None => Object::EmptyList,
        }),
        other => Err(type_error(TypeTag::Pair, other)),
    }
}

pub fn prim_set_car(ctx: &mut PrimCtx<'_>, args: &[Object]) -> Result<Object, PrimError> {
    match args[0] {
        Object::Pair(h) => {
            ctx.heap.pairs.get_mut(h).car = args[1];
            Ok(Object::Unspecified)
        }
        Object::List(h) => {
            ctx.heap.lists.get_mut(h).item = args[1];
            Ok(Object::Unspecified)
        }
        other => Err(type_error(TypeTag::Pair, other)),
    }
}

pub fn prim_set_cdr(ctx: &mut PrimCtx<'_>, args: &[Object]) -> Result<Object, PrimError> {
    match args[0] {
        Object::Pair(h) => {
            ctx.heap.pairs.get_mut(h).cdr = args[1];
            Ok(Object::Unspecified)
        }
        other => Err(type_error(TypeTag::Pair, other)),
    }
}

// ---------------------------------------------------------------------------
// List Walking
// ---------------------------------------------------------------------------

fn want_list(args: &[Object], i: usize) -> Result<Option<ListRef>, PrimError> {
    match args[i] {
        Object::EmptyList => Ok(None),
        Object::List(h) => Ok(Some(h)),
        other => Err(type_error(TypeTag::List, other)),
    }
}

pub fn prim_length(ctx: &mut PrimCtx<'_>, args: &[Object]) -> Result<Object, PrimError> {
    let mut node = want_list(args, 0)?;
    let mut len: i32 = 0;
    while let Some(h) = node {
        len += 1;
        node = ctx.heap.lists.get(h).next;
    }
    Ok(Object::Int(len))
}

fn nth_node(
    ctx: &PrimCtx<'_>,
    mut node: Option<ListRef>,
    k: usize,
) -> Result<ListRef, PrimError> {
    let mut remaining = k;
    let mut seen = 0;
    loop {
        match node {
            Some(h) => {
                if remaining == 0 {
                    return Ok(h);
                }
                remaining -= 1;
                seen += 1;
                node = ctx.heap.lists.get(h).next;
            }
            None => {
                return Err(PrimError::IndexOutOfRange {
                    index: k,
                    len: seen,
                })
            }
        }
    }
}

pub fn prim_list_ref(ctx: &mut PrimCtx<'_>, args: &[Object]) -> Result<Object, PrimError> {
    let head = want_list(args, 0)?;
    let k = want_int(args, 1)?;
    if k < 0 {
        return Err(PrimError::IndexOutOfRange { index: 0, len: 0 });
    }
    let node = nth_node(ctx, head, k as usize)?;
    Ok(ctx.heap.lists.get(node).item)
}

/// `list-set!` replaces a node's payload in place.
pub fn prim_list_set(ctx: &mut PrimCtx<'_>, args: &[Object]) -> Result<Object, PrimError> {
    let head = want_list(args, 0)?;
    let k = want_int(args, 1)?;
    if k < 0 {
        return Err(PrimError::IndexOutOfRange { index: 0, len: 0 });
    }
    let node = nth_node(ctx, head, k as usize)?;
    ctx.heap.lists.get_mut(node).item = args[2];
    Ok(Object::Unspecified)
}

pub fn prim_list_tail(ctx: &mut PrimCtx<'_>, args: &[Object]) -> Result<Object, PrimError> {
    let head = want_list(args, 0)?;
    let k = want_int(args, 1)?;
    if k < 0 {
        return Err(PrimError::IndexOutOfRange { index: 0, len: 0 });
    }
    if k == 0 {
        return Ok(args[0]);
    }
    let node = nth_node(ctx, head, k as usize - 1)?;
    Ok(match ctx.heap.lists.get(node).next {
        Some(n) => Object::List(n),
        None => Object::EmptyList,
    })
}

// ---------------------------------------------------------------------------
// append / reverse
// ---------------------------------------------------------------------------

pub fn prim_append(ctx: &mut PrimCtx<'_>, args: &[Object]) -> Result<Object, PrimError> {
    let first = want_list(args, 0)?;
    // Validate the second argument even when the first is empty.
    let second = want_list(args, 1)?;
    let items = ctx.heap.list_items(first);
    if items.is_empty() {
        return Ok(args[1]);
    }
    // Fresh nodes for the first chain; the second chain is shared (R7RS).
    let mut next = second;
    for &item in items.iter().rev() {
        next = Some(ctx.heap.alloc_list_node(item, next)?);
    }
    Ok(Object::List(next.expect("non-empty chain")))
}

pub fn prim_reverse(ctx: &mut PrimCtx<'_>, args: &[Object]) -> Result<Object, PrimError> {
    let head = want_list(args, 0)?;
    let mut items = ctx.heap.list_items(head);
    items.reverse();
    ctx.heap.alloc_list_from(&items)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
