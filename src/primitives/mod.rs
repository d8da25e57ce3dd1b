mod arith;
mod bytevector;
mod io;
mod list;
mod predicates;
mod strings;
mod vector;

pub use arith::number_to_f64;

use crate::error::PrimError;
use crate::heap::Heap;
use crate::object::{Object, TypeTag};
use crate::platform::Platform;
use crate::symbol::SymbolTable;

// ---------------------------------------------------------------------------
// Primitive Registry
// ---------------------------------------------------------------------------

/// Context a primitive runs in: the heap for allocation, the platform for
/// console/storage, the symbol table for symbol↔string conversions. Passed
/// explicitly — primitives never reach for global state.
pub struct PrimCtx<'a> {
    pub heap: &'a mut Heap,
    pub platform: &'a mut Platform,
    pub symbols: &'a mut SymbolTable,
}

/// A native primitive. Arguments arrive as a borrowed stack slice (still
/// rooted, so a collection during retry cannot free them); the result is
/// pushed by the dispatch loop.
pub type PrimFn = fn(&mut PrimCtx<'_>, &[Object]) -> Result<Object, PrimError>;

/// Table entry: implementation plus name and declared arity. Name and arity
/// feed arity checking and diagnostics.
pub struct PrimEntry {
    pub name: &'static str,
    pub arity: u8,
    pub func: PrimFn,
}

/// Dispatch table from primitive id to native implementation. Embedders may
/// register platform-specific primitives (GPIO, I2C, SPI) in the free id
/// space without touching the dispatch loop.
pub struct Primitives {
    entries: Vec<Option<PrimEntry>>,
}

impl Primitives {
    pub fn empty() -> Self {
        Primitives {
            entries: Vec::new(),
        }
    }

    /// The core table every VM starts with.
    pub fn core() -> Self {
        let mut p = Primitives::empty();
        register_all(&mut p);
        p
    }

    pub fn register(&mut self, id: u16, name: &'static str, arity: u8, func: PrimFn) {
        let idx = id as usize;
        if idx >= self.entries.len() {
            self.entries.resize_with(idx + 1, || None);
        }
        debug_assert!(
            self.entries[idx].is_none(),
            "primitive id {} registered twice",
            id
        );
        self.entries[idx] = Some(PrimEntry { name, arity, func });
    }

    pub fn lookup(&self, id: u16) -> Option<&PrimEntry> {
        self.entries.get(id as usize).and_then(|e| e.as_ref())
    }

    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| e.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ---------------------------------------------------------------------------
// Primitive Ids
// ---------------------------------------------------------------------------

/// Ids 0–15 encode as a single byte; the arithmetic/list core lives there.
pub mod ids {
    pub const ADD: u16 = 0;
    pub const SUB: u16 = 1;
    pub const MUL: u16 = 2;
    pub const DIV: u16 = 3;
    pub const NUM_EQ: u16 = 4;
    pub const LT: u16 = 5;
    pub const GT: u16 = 6;
    pub const LE: u16 = 7;
    pub const GE: u16 = 8;
    pub const CONS: u16 = 9;
    pub const CAR: u16 = 10;
    pub const CDR: u16 = 11;
    pub const NOT: u16 = 12;
    pub const EQ: u16 = 13;
    pub const EQV: u16 = 14;
    pub const IS_NULL: u16 = 15;

    pub const EQUAL: u16 = 16;
    pub const IS_PAIR: u16 = 17;
    pub const IS_LIST: u16 = 18;
    pub const IS_SYMBOL: u16 = 19;
    pub const IS_NUMBER: u16 = 20;
    pub const IS_STRING: u16 = 21;
    pub const IS_CHAR: u16 = 22;
    pub const IS_BOOLEAN: u16 = 23;
    pub const IS_VECTOR: u16 = 24;
    pub const IS_BYTEVECTOR: u16 = 25;
    pub const IS_PROCEDURE: u16 = 26;
    pub const IS_ZERO: u16 = 27;
    pub const QUOTIENT: u16 = 28;
    pub const REMAINDER: u16 = 29;
    pub const MODULO: u16 = 30;
    pub const ABS: u16 = 31;
    pub const MIN: u16 = 32;
    pub const MAX: u16 = 33;
    pub const SET_CAR: u16 = 34;
    pub const SET_CDR: u16 = 35;
    pub const LENGTH: u16 = 36;
    pub const LIST_REF: u16 = 37;
    pub const LIST_SET: u16 = 38;
    pub const APPEND: u16 = 39;
    pub const REVERSE: u16 = 40;
    pub const LIST_TAIL: u16 = 41;
    pub const MAKE_VECTOR: u16 = 42;
    pub const VECTOR_LENGTH: u16 = 43;
    pub const VECTOR_REF: u16 = 44;
    pub const VECTOR_SET: u16 = 45;
    pub const VECTOR_FILL: u16 = 46;
    pub const MAKE_BYTEVECTOR: u16 = 47;
    pub const BYTEVECTOR_LENGTH: u16 = 48;
    pub const BYTEVECTOR_U8_REF: u16 = 49;
    pub const BYTEVECTOR_U8_SET: u16 = 50;
    pub const BYTEVECTOR_COPY: u16 = 51;
    pub const STRING_LENGTH: u16 = 52;
    pub const STRING_REF: u16 = 53;
    pub const STRING_APPEND: u16 = 54;
    pub const SYMBOL_TO_STRING: u16 = 55;
    pub const STRING_TO_SYMBOL: u16 = 56;
    pub const CHAR_TO_INTEGER: u16 = 57;
    pub const INTEGER_TO_CHAR: u16 = 58;
    pub const READ_CHAR: u16 = 59;
    pub const WRITE_CHAR: u16 = 60;
    pub const DISPLAY: u16 = 61;
    pub const NEWLINE: u16 = 62;
    pub const STORAGE_READ_U8: u16 = 63;
    pub const STORAGE_WRITE_U8: u16 = 64;

    /// First id guaranteed free for embedder-registered primitives.
    pub const FIRST_PLATFORM: u16 = 96;
}

fn register_all(p: &mut Primitives) {
    use ids::*;

    // -- arithmetic --
    p.register(ADD, "int-add", 2, arith::prim_add);
    p.register(SUB, "int-sub", 2, arith::prim_sub);
    p.register(MUL, "int-mul", 2, arith::prim_mul);
    p.register(DIV, "int-div", 2, arith::prim_div);
    p.register(NUM_EQ, "num-eq", 2, arith::prim_num_eq);
    p.register(LT, "num-lt", 2, arith::prim_lt);
    p.register(GT, "num-gt", 2, arith::prim_gt);
    p.register(LE, "num-le", 2, arith::prim_le);
    p.register(GE, "num-ge", 2, arith::prim_ge);
    p.register(QUOTIENT, "quotient", 2, arith::prim_quotient);
    p.register(REMAINDER, "remainder", 2, arith::prim_remainder);
    p.register(MODULO, "modulo", 2, arith::prim_modulo);
    p.register(ABS, "abs", 1, arith::prim_abs);
    p.register(MIN, "min", 2, arith::prim_min);
    p.register(MAX, "max", 2, arith::prim_max);
    p.register(IS_ZERO, "zero?", 1, arith::prim_is_zero);

    // -- equality and predicates --
    p.register(NOT, "not", 1, predicates::prim_not);
    p.register(EQ, "eq?", 2, predicates::prim_eq);
    p.register(EQV, "eqv?", 2, predicates::prim_eqv);
    p.register(EQUAL, "equal?", 2, predicates::prim_equal);
    p.register(IS_NULL, "null?", 1, predicates::prim_is_null);
    p.register(IS_PAIR, "pair?", 1, predicates::prim_is_pair);
    p.register(IS_LIST, "list?", 1, predicates::prim_is_list);
    p.register(IS_SYMBOL, "symbol?", 1, predicates::prim_is_symbol);
    p.register(IS_NUMBER, "number?", 1, predicates::prim_is_number);
    p.register(IS_STRING, "string?", 1, predicates::prim_is_string);
    p.register(IS_CHAR, "char?", 1, predicates::prim_is_char);
    p.register(IS_BOOLEAN, "boolean?", 1, predicates::prim_is_boolean);
    p.register(IS_VECTOR, "vector?", 1, predicates::prim_is_vector);
    p.register(IS_BYTEVECTOR, "bytevector?", 1, predicates::prim_is_bytevector);
    p.register(IS_PROCEDURE, "procedure?", 1, predicates::prim_is_procedure);

    // -- pairs and lists --
    p.register(CONS, "cons", 2, list::prim_cons);
    p.register(CAR, "car", 1, list::prim_car);
    p.register(CDR, "cdr", 1, list::prim_cdr);
    p.register(SET_CAR, "set-car!", 2, list::prim_set_car);
    p.register(SET_CDR, "set-cdr!", 2, list::prim_set_cdr);
    p.register(LENGTH, "length", 1, list::prim_length);
    p.register(LIST_REF, "list-ref", 2, list::prim_list_ref);
    p.register(LIST_SET, "list-set!", 3, list::prim_list_set);
    p.register(APPEND, "append", 2, list::prim_append);
    p.register(REVERSE, "reverse", 1, list::prim_reverse);
    p.register(LIST_TAIL, "list-tail", 2, list::prim_list_tail);

    // -- vectors --
    p.register(MAKE_VECTOR, "make-vector", 2, vector::prim_make_vector);
    p.register(VECTOR_LENGTH, "vector-length", 1, vector::prim_vector_length);
    p.register(VECTOR_REF, "vector-ref", 2, vector::prim_vector_ref);
    p.register(VECTOR_SET, "vector-set!", 3, vector::prim_vector_set);
    p.register(VECTOR_FILL, "vector-fill!", 2, vector::prim_vector_fill);

    // -- bytevectors --
    p.register(MAKE_BYTEVECTOR, "make-bytevector", 2, bytevector::prim_make_bytevector);
    p.register(BYTEVECTOR_LENGTH, "bytevector-length", 1, bytevector::prim_bytevector_length);
    p.register(BYTEVECTOR_U8_REF, "bytevector-u8-ref", 2, bytevector::prim_u8_ref);
    p.register(BYTEVECTOR_U8_SET, "bytevector-u8-set!", 3, bytevector::prim_u8_set);
    p.register(BYTEVECTOR_COPY, "bytevector-copy", 3, bytevector::prim_bytevector_copy);

    // -- strings and symbols --
    p.register(STRING_LENGTH, "string-length", 1, strings::prim_string_length);
    p.register(STRING_REF, "string-ref", 2, strings::prim_string_ref);
    p.register(STRING_APPEND, "string-append", 2, strings::prim_string_append);
    p.register(SYMBOL_TO_STRING, "symbol->string", 1, strings::prim_symbol_to_string);
    p.register(STRING_TO_SYMBOL, "string->symbol", 1, strings::prim_string_to_symbol);
    p.register(CHAR_TO_INTEGER, "char->integer", 1, strings::prim_char_to_integer);
    p.register(INTEGER_TO_CHAR, "integer->char", 1, strings::prim_integer_to_char);

    // -- console and storage --
    p.register(READ_CHAR, "read-char", 0, io::prim_read_char);
    p.register(WRITE_CHAR, "write-char", 1, io::prim_write_char);
    p.register(DISPLAY, "display", 1, io::prim_display);
    p.register(NEWLINE, "newline", 0, io::prim_newline);
    p.register(STORAGE_READ_U8, "storage-read-u8", 1, io::prim_storage_read_u8);
    p.register(STORAGE_WRITE_U8, "storage-write-u8", 2, io::prim_storage_write_u8);
}

// ---------------------------------------------------------------------------
// Argument Helpers
// ---------------------------------------------------------------------------

pub(crate) fn want_int(args: &[Object], i: usize) -> Result<i32, PrimError> {
    match args[i] {
        Object::Int(v) => Ok(v),
        other => Err(PrimError::Type {
            expected: TypeTag::Int,
            got: other.tag(),
        }),
    }
}

pub(crate) fn want_index(args: &[Object], i: usize, len: usize) -> Result<usize, PrimError> {
    let v = want_int(args, i)?;
    let idx = v as usize;
    if v < 0 || idx >= len {
        return Err(PrimError::IndexOutOfRange {
            index: v.max(0) as usize,
            len,
        });
    }
    Ok(idx)
}

pub(crate) fn type_error(expected: TypeTag, got: Object) -> PrimError {
    PrimError::Type {
        expected,
        got: got.tag(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_table_is_dense_enough_for_single_byte_dispatch() {
        let p = Primitives::core();
        // Every id below 16 must be taken: they encode as one byte.
        for id in 0..16 {
            assert!(p.lookup(id).is_some(), "hot primitive id {} unassigned", id);
        }
    }

    #[test]
    fn lookup_unknown_id_is_none() {
        let p = Primitives::core();
        assert!(p.lookup(4095).is_none());
    }

    #[test]
    fn embedder_registration_hook() {
        fn gpio_write(_: &mut PrimCtx<'_>, _: &[Object]) -> Result<Object, PrimError> {
            Ok(Object::Unspecified)
        }
        let mut p = Primitives::core();
        p.register(ids::FIRST_PLATFORM, "gpio-write", 2, gpio_write);
        let entry = p.lookup(ids::FIRST_PLATFORM).unwrap();
        assert_eq!(entry.name, "gpio-write");
        assert_eq!(entry.arity, 2);
    }

    #[test]
    fn entries_carry_name_and_arity() {
        let p = Primitives::core();
        let cons = p.lookup(ids::CONS).unwrap();
        assert_eq!(cons.name, "cons");
        assert_eq!(cons.arity, 2);
    }
}
