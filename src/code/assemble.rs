//! Bytecode assembler. The compiling collaborator (and this crate's tests)
//! build code images through this; jump and call targets are labels patched
//! at finish time.

use super::{
    f64_bytes, i32_bytes, u16_bytes, CallMode, LIT_BOOL, LIT_BYTEVECTOR, LIT_CHAR, LIT_COMPLEX,
    LIT_EMPTY_LIST, LIT_INT32, LIT_LIST, LIT_PRIMITIVE, LIT_PROCEDURE, LIT_RATIONAL, LIT_REAL,
    LIT_STR, LIT_SYMBOL, LIT_UNSPECIFIED, LIT_VECTOR,
};

/// A forward-referenceable code offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Label(usize);

#[derive(Debug, Default)]
pub struct Asm {
    code: Vec<u8>,
    labels: Vec<Option<u16>>,
    patches: Vec<(usize, usize)>, // (operand byte position, label index)
}

impl Asm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current code offset. Code images are capped at 64 KB.
    pub fn pos(&self) -> u16 {
        debug_assert!(self.code.len() <= u16::MAX as usize);
        self.code.len() as u16
    }

    pub fn new_label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() - 1)
    }

    /// Bind a label to the current position.
    pub fn bind(&mut self, label: Label) {
        assert!(self.labels[label.0].is_none(), "label bound twice");
        self.labels[label.0] = Some(self.pos());
    }

    /// Create a label already bound to the current position.
    pub fn here(&mut self) -> Label {
        let l = self.new_label();
        self.bind(l);
        l
    }

    fn emit_label_u16(&mut self, label: Label) {
        self.patches.push((self.code.len(), label.0));
        self.code.extend_from_slice(&u16_bytes(0));
    }

    // -- locals / globals / stack -------------------------------------------

    pub fn push_local(&mut self, slot: u16) -> &mut Self {
        if slot < 16 {
            self.code.push(slot as u8);
        } else {
            assert!(slot < 256, "local slot {} out of encodable range", slot);
            self.code.push(0xA0);
            self.code.push(slot as u8);
        }
        self
    }

    pub fn store_local(&mut self, slot: u16) -> &mut Self {
        if slot < 16 {
            self.code.push(0x10 | slot as u8);
        } else {
            assert!(slot < 256, "local slot {} out of encodable range", slot);
            self.code.push(0xA1);
            self.code.push(slot as u8);
        }
        self
    }

    /// Push a small exact integer, choosing the densest encoding.
    pub fn push_int(&mut self, v: i32) -> &mut Self {
        if (0..16).contains(&v) {
            self.code.push(0x20 | v as u8);
        } else if (i8::MIN as i32..=i8::MAX as i32).contains(&v) {
            self.code.push(0xA2);
            self.code.push(v as i8 as u8);
        } else {
            self.lit_int(v);
        }
        self
    }

    pub fn drop_n(&mut self, n: u8) -> &mut Self {
        assert!(n < 16, "Drop immediate is 4-bit");
        self.code.push(0x30 | n);
        self
    }

    pub fn push_global(&mut self, slot: u16) -> &mut Self {
        if slot < 16 {
            self.code.push(0x40 | slot as u8);
        } else {
            self.code.push(0xB6);
            self.code.extend_from_slice(&u16_bytes(slot));
        }
        self
    }

    pub fn store_global(&mut self, slot: u16) -> &mut Self {
        if slot < 16 {
            self.code.push(0x50 | slot as u8);
        } else {
            self.code.push(0xB7);
            self.code.extend_from_slice(&u16_bytes(slot));
        }
        self
    }

    // -- control flow --------------------------------------------------------

    pub fn skip(&mut self, n: u8) -> &mut Self {
        assert!(n < 16, "Skip immediate is 4-bit");
        self.code.push(0x60 | n);
        self
    }

    pub fn skip_unless(&mut self, n: u8) -> &mut Self {
        assert!(n < 16, "SkipUnless immediate is 4-bit");
        self.code.push(0x70 | n);
        self
    }

    pub fn jump(&mut self, target: Label) -> &mut Self {
        self.code.push(0xB3);
        self.emit_label_u16(target);
        self
    }

    pub fn jump_unless(&mut self, target: Label) -> &mut Self {
        self.code.push(0xB4);
        self.emit_label_u16(target);
        self
    }

    pub fn jump_if(&mut self, target: Label) -> &mut Self {
        self.code.push(0xB5);
        self.emit_label_u16(target);
        self
    }

    pub fn halt(&mut self) -> &mut Self {
        self.code.push(0xF0);
        self
    }

    pub fn restore(&mut self) -> &mut Self {
        self.code.push(0xF1);
        self
    }

    // -- calls ---------------------------------------------------------------

    pub fn call(&mut self, entry: Label, argc: u8) -> &mut Self {
        self.code.push(0x80);
        self.emit_label_u16(entry);
        self.code.push(argc);
        self
    }

    pub fn make_closure(&mut self, entry: Label, frame_size: u8) -> &mut Self {
        self.code.push(0x81);
        self.emit_label_u16(entry);
        self.code.push(frame_size);
        self
    }

    pub fn make_stack_closure(&mut self, entry: Label, frame_size: u8) -> &mut Self {
        self.code.push(0x82);
        self.emit_label_u16(entry);
        self.code.push(frame_size);
        self
    }

    pub fn apply(&mut self, argc: u8) -> &mut Self {
        self.code.push(0xA3);
        self.code.push(argc);
        self
    }

    pub fn free_var(&mut self, up: u8, offset: u8) -> &mut Self {
        if up < 16 && offset < 16 {
            self.code.push(0xA4);
            self.code.push(up << 4 | offset);
        } else {
            self.code.push(0xB8);
            self.code.push(up);
            self.code.push(offset);
        }
        self
    }

    pub fn prelude(&mut self, mode: CallMode, arity: u8, opt: u8) -> &mut Self {
        self.code.push(0xB0 | mode as u8);
        self.code.push(arity);
        self.code.push(opt);
        self
    }

    pub fn primitive(&mut self, id: u16) -> &mut Self {
        if id < 16 {
            self.code.push(0xC0 | id as u8);
        } else {
            assert!(id < 0x1000, "primitive id {} out of encodable range", id);
            self.code.push(0xD0 | (id >> 8) as u8);
            self.code.push(id as u8);
        }
        self
    }

    // -- literals ------------------------------------------------------------

    fn lit(&mut self, tag: u8) {
        self.code.push(0xE0 | tag);
    }

    pub fn lit_int(&mut self, v: i32) -> &mut Self {
        self.lit(LIT_INT32);
        self.code.extend_from_slice(&i32_bytes(v));
        self
    }

    pub fn lit_real(&mut self, v: f64) -> &mut Self {
        self.lit(LIT_REAL);
        self.code.extend_from_slice(&f64_bytes(v));
        self
    }

    pub fn lit_rational(&mut self, num: i32, den: i32) -> &mut Self {
        self.lit(LIT_RATIONAL);
        self.code.extend_from_slice(&i32_bytes(num));
        self.code.extend_from_slice(&i32_bytes(den));
        self
    }

    pub fn lit_complex(&mut self, re: f64, im: f64) -> &mut Self {
        self.lit(LIT_COMPLEX);
        self.code.extend_from_slice(&f64_bytes(re));
        self.code.extend_from_slice(&f64_bytes(im));
        self
    }

    pub fn lit_bool(&mut self, b: bool) -> &mut Self {
        self.lit(LIT_BOOL);
        self.code.push(b as u8);
        self
    }

    pub fn lit_char(&mut self, c: char) -> &mut Self {
        self.lit(LIT_CHAR);
        self.code.extend_from_slice(&super::u32_bytes(c as u32));
        self
    }

    pub fn lit_str(&mut self, s: &str) -> &mut Self {
        assert!(s.len() <= u16::MAX as usize, "string literal too long");
        self.lit(LIT_STR);
        self.code.extend_from_slice(&u16_bytes(s.len() as u16));
        self.code.extend_from_slice(s.as_bytes());
        self
    }

    pub fn lit_symbol(&mut self, id: u16) -> &mut Self {
        self.lit(LIT_SYMBOL);
        self.code.extend_from_slice(&u16_bytes(id));
        self
    }

    /// Assemble the top `count` stack values into a list.
    pub fn lit_list(&mut self, count: u16) -> &mut Self {
        self.lit(LIT_LIST);
        self.code.extend_from_slice(&u16_bytes(count));
        self
    }

    pub fn lit_vector(&mut self, count: u16) -> &mut Self {
        self.lit(LIT_VECTOR);
        self.code.extend_from_slice(&u16_bytes(count));
        self
    }

    pub fn lit_bytevector(&mut self, bytes: &[u8]) -> &mut Self {
        assert!(bytes.len() <= u16::MAX as usize, "bytevector literal too long");
        self.lit(LIT_BYTEVECTOR);
        self.code.extend_from_slice(&u16_bytes(bytes.len() as u16));
        self.code.extend_from_slice(bytes);
        self
    }

    pub fn lit_procedure(&mut self, entry: Label) -> &mut Self {
        self.lit(LIT_PROCEDURE);
        self.emit_label_u16(entry);
        self
    }

    pub fn lit_primitive(&mut self, id: u16) -> &mut Self {
        self.lit(LIT_PRIMITIVE);
        self.code.extend_from_slice(&u16_bytes(id));
        self
    }

    pub fn lit_empty_list(&mut self) -> &mut Self {
        self.lit(LIT_EMPTY_LIST);
        self
    }

    pub fn lit_unspecified(&mut self) -> &mut Self {
        self.lit(LIT_UNSPECIFIED);
        self
    }

    // -- finish --------------------------------------------------------------

    /// Resolve every label patch and return the code image.
    pub fn finish(mut self) -> Vec<u8> {
        for (pos, label) in self.patches.drain(..) {
            let target = self.labels[label].expect("unbound label at finish");
            self.code[pos..pos + 2].copy_from_slice(&u16_bytes(target));
        }
        self.code
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
