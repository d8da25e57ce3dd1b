pub mod frame;

use log::debug;

use crate::code::{decode, CallMode, Literal, Op};
use crate::error::{PrimError, VmError};
use crate::heap::{gc, Heap, HeapConfig, Roots};
use crate::lef::ProgramImage;
use crate::object::Object;
use crate::platform::Platform;
use crate::primitives::{PrimCtx, Primitives};
use crate::symbol::{SymId, SymbolTable};

use frame::{Frame, FrameStack, RETURN_TO_HOST};

// ---------------------------------------------------------------------------
// Limits
// ---------------------------------------------------------------------------

/// Default frame-stack depth limit. Tail calls and tail recursion do not
/// consume frames, so this only bounds genuine nesting.
const DEFAULT_MAX_FRAMES: usize = 1024;

/// Default value-stack limit in slots.
const DEFAULT_MAX_STACK: usize = 16 * 1024;

/// Execution limits and heap sizing for one VM instance.
#[derive(Debug, Clone, Copy)]
pub struct VmConfig {
    pub max_frames: usize,
    pub max_stack: usize,
    pub heap: HeapConfig,
}

impl Default for VmConfig {
    fn default() -> Self {
        VmConfig {
            max_frames: DEFAULT_MAX_FRAMES,
            max_stack: DEFAULT_MAX_STACK,
            heap: HeapConfig::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// VM
// ---------------------------------------------------------------------------

/// Call state between a `Call`/`Apply` and the callee's `Prelude`.
#[derive(Debug, Clone, Copy)]
struct PendingCall {
    return_pc: u32,
    argc: u8,
    closure: Option<crate::heap::ClosureRef>,
}

/// One virtual machine instance. Owns every piece of mutable state — value
/// stack, frame stack, heap pools, global table, symbol table, primitive
/// table, platform — and is threaded explicitly through every operation.
/// Single-threaded; one instance per loaded program, never a hidden global.
pub struct Vm {
    config: VmConfig,
    code: Vec<u8>,
    pc: usize,
    stack: Vec<Object>,
    frames: FrameStack,
    globals: Vec<Object>,
    global_count: u16,
    pending: Option<PendingCall>,
    heap: Heap,
    symbols: SymbolTable,
    prims: Primitives,
    platform: Platform,
    peak_stack: usize,
    peak_frames: usize,
}

impl Vm {
    /// Build a VM around a loaded program image.
    pub fn new(image: ProgramImage, config: VmConfig) -> Vm {
        let global_count = image.global_count;
        let mut vm = Vm {
            config,
            code: image.code,
            pc: 0,
            stack: Vec::with_capacity(256),
            frames: FrameStack::new(config.max_frames),
            globals: Vec::new(),
            global_count,
            pending: None,
            heap: Heap::new(config.heap),
            symbols: SymbolTable::from_names(image.symbols),
            prims: Primitives::core(),
            platform: Platform::default(),
            peak_stack: 0,
            peak_frames: 0,
        };
        vm.reset();
        vm
    }

    /// Rewind to the image's initial state: stack and frames cleared, heap
    /// rebuilt, globals reseeded. Symbols persist — their ids are fixed by
    /// the image.
    pub fn reset(&mut self) {
        self.stack.clear();
        self.frames.clear();
        self.frames.push(Frame::base(0));
        self.pc = 0;
        self.pending = None;
        self.heap = Heap::new(self.config.heap);
        self.globals = vec![Object::Unspecified; self.global_count as usize];
        self.peak_stack = 0;
        self.peak_frames = 1;
    }

    // -- accessors -----------------------------------------------------------

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    /// Registration hook for embedder primitives (GPIO, I2C, SPI and
    /// friends) — see `primitives::ids::FIRST_PLATFORM`.
    pub fn primitives_mut(&mut self) -> &mut Primitives {
        &mut self.prims
    }

    pub fn set_platform(&mut self, platform: Platform) {
        self.platform = platform;
    }

    pub fn global(&self, index: usize) -> Option<Object> {
        self.globals.get(index).copied()
    }

    pub fn stack_len(&self) -> usize {
        self.stack.len()
    }

    pub fn frames_len(&self) -> usize {
        self.frames.len()
    }

    /// High-water marks, for the stack-boundedness guarantees.
    pub fn peak_stack(&self) -> usize {
        self.peak_stack
    }

    pub fn peak_frames(&self) -> usize {
        self.peak_frames
    }

    /// Mark everything currently reachable from the global table PERMANENT.
    /// Called by the embedder after the program's global-initialization pass.
    pub fn seal_globals(&mut self) {
        let roots = Roots {
            globals: &self.globals,
            ..Default::default()
        };
        gc::seal(&mut self.heap, &roots);
    }

    /// External representation of an object under this VM's heap.
    pub fn render(&self, obj: Object) -> String {
        let mut out = String::new();
        crate::object::write_obj(&self.heap, obj, &mut out);
        out
    }

    // -- collection ----------------------------------------------------------

    fn collect(&mut self, hurt: bool) {
        let extra: Vec<Object> = self
            .pending
            .as_ref()
            .and_then(|p| p.closure)
            .map(Object::Closure)
            .into_iter()
            .collect();
        let roots = Roots {
            stack: &self.stack,
            globals: &self.globals,
            frames: self.frames.as_slice(),
            extra: &extra,
        };
        gc::collect(&mut self.heap, &roots, hurt);
    }

    /// Run an allocating operation with the collect-and-retry contract:
    /// try → collect → try → hurt-collect → try → out of memory. The
    /// operation must leave its inputs on the stack (rooted) and be safe to
    /// re-run; partial allocations from a failed attempt are unreachable and
    /// the next collection reclaims them.
    fn alloc_retry<T>(
        &mut self,
        at: usize,
        op: impl Fn(&mut Vm) -> Result<T, PrimError>,
    ) -> Result<T, VmError> {
        for attempt in 0..3 {
            match op(self) {
                Ok(v) => return Ok(v),
                Err(PrimError::Exhausted { pool }) => {
                    if attempt == 2 {
                        return Err(VmError::OutOfMemory { pool });
                    }
                    debug!("allocation failed in {} pool, collecting", pool);
                    self.collect(attempt == 1);
                }
                Err(e) => return Err(map_prim_err(e, at)),
            }
        }
        unreachable!("retry loop returns within three attempts")
    }

    // -- stack helpers -------------------------------------------------------

    fn push(&mut self, v: Object) -> Result<(), VmError> {
        if self.stack.len() >= self.config.max_stack {
            return Err(VmError::StackLimit {
                size: self.config.max_stack,
            });
        }
        self.stack.push(v);
        Ok(())
    }

    fn pop(&mut self, at: usize) -> Result<Object, VmError> {
        self.stack.pop().ok_or(VmError::StackUnderflow { pc: at })
    }

    // -- dispatch loop -------------------------------------------------------

    /// Fetch-decode-execute until `Halt` (or a `Restore` of the base frame).
    /// Synchronous and non-preemptive: instructions are atomic with respect
    /// to collection, which runs only at allocation-failure points.
    pub fn run(&mut self) -> Result<Object, VmError> {
        loop {
            let at = self.pc;
            let (op, next) = decode(&self.code, at)?;
            self.pc = next;
            if self.stack.len() > self.peak_stack {
                self.peak_stack = self.stack.len();
            }

            match op {
                Op::PushLocal(slot) => {
                    let idx = self.frames.last().base as usize + slot as usize;
                    let v = *self
                        .stack
                        .get(idx)
                        .ok_or(VmError::StackUnderflow { pc: at })?;
                    self.push(v)?;
                }

                Op::StoreLocal(slot) => {
                    let v = self.pop(at)?;
                    let idx = self.frames.last().base as usize + slot as usize;
                    if idx >= self.stack.len() {
                        return Err(VmError::StackUnderflow { pc: at });
                    }
                    self.stack[idx] = v;
                }

                Op::PushInt(v) => self.push(Object::Int(v))?,

                Op::Drop(n) => {
                    for _ in 0..n {
                        self.pop(at)?;
                    }
                }

                Op::PushGlobal(i) => {
                    let v = *self.globals.get(i as usize).ok_or(VmError::GlobalOutOfRange {
                        pc: at,
                        index: i as usize,
                        len: self.globals.len(),
                    })?;
                    self.push(v)?;
                }

                Op::StoreGlobal(i) => {
                    let v = self.pop(at)?;
                    let len = self.globals.len();
                    let slot =
                        self.globals
                            .get_mut(i as usize)
                            .ok_or(VmError::GlobalOutOfRange {
                                pc: at,
                                index: i as usize,
                                len,
                            })?;
                    *slot = v;
                }

                Op::Skip(n) => self.pc += n as usize,

                Op::SkipUnless(n) => {
                    if !self.pop(at)?.is_truthy() {
                        self.pc += n as usize;
                    }
                }

                Op::Jump(target) => self.pc = target as usize,

                Op::JumpUnless(target) => {
                    if !self.pop(at)?.is_truthy() {
                        self.pc = target as usize;
                    }
                }

                Op::JumpIf(target) => {
                    if self.pop(at)?.is_truthy() {
                        self.pc = target as usize;
                    }
                }

                Op::Call { entry, argc } => {
                    self.pending = Some(PendingCall {
                        return_pc: self.pc as u32,
                        argc,
                        closure: None,
                    });
                    self.pc = entry as usize;
                }

                Op::Apply { argc } => self.do_apply(argc, at)?,

                Op::Prelude { mode, arity, opt } => self.do_prelude(mode, arity, opt, at)?,

                Op::Restore => {
                    if let Some(result) = self.do_restore(at)? {
                        return Ok(result);
                    }
                }

                Op::FreeVar { up, offset } => self.do_free_var(up, offset, at)?,

                Op::MakeClosure { entry, frame_size } => {
                    self.do_make_closure(entry, frame_size, at)?
                }

                Op::MakeStackClosure { .. } => {
                    return Err(VmError::UnsupportedInstruction {
                        pc: at,
                        what: "stack-resident closure",
                    })
                }

                Op::Primitive(id) => self.call_primitive(id, at)?,

                Op::Object(lit) => self.do_literal(lit, at)?,

                Op::Halt => {
                    return Ok(self.stack.last().copied().unwrap_or(Object::Unspecified))
                }
            }
        }
    }

    // -- calls ---------------------------------------------------------------

    fn do_apply(&mut self, argc: u8, at: usize) -> Result<(), VmError> {
        let n = argc as usize;
        if self.stack.len() < n + 1 {
            return Err(VmError::StackUnderflow { pc: at });
        }
        let callee_pos = self.stack.len() - n - 1;
        let callee = self.stack[callee_pos];
        match callee {
            Object::Procedure(entry) => {
                self.stack.remove(callee_pos);
                self.pending = Some(PendingCall {
                    return_pc: self.pc as u32,
                    argc,
                    closure: None,
                });
                self.pc = entry as usize;
                Ok(())
            }
            Object::Closure(h) => {
                let entry = self.heap.closures.get(h).entry;
                self.stack.remove(callee_pos);
                self.pending = Some(PendingCall {
                    return_pc: self.pc as u32,
                    argc,
                    closure: Some(h),
                });
                self.pc = entry as usize;
                Ok(())
            }
            // Primitives bypass frame creation entirely.
            Object::Primitive(id) => {
                self.stack.remove(callee_pos);
                self.call_primitive(id, at)
            }
            other => Err(VmError::NotCallable {
                pc: at,
                tag: other.tag(),
            }),
        }
    }

    /// Bind arguments at procedure entry. With `opt < arity` the procedure
    /// is variadic: `opt` fixed parameters plus a rest list; the excess
    /// arguments are collected off the stack into a fresh list in push order.
    /// Returns the resulting local-slot count.
    fn bind_args(&mut self, arity: u8, opt: u8, argc: u8, at: usize) -> Result<usize, VmError> {
        if opt < arity {
            if argc < opt {
                return Err(VmError::ArityMismatch {
                    entry: at as u16,
                    expected: opt,
                    got: argc,
                });
            }
            let excess = (argc - opt) as usize;
            if self.stack.len() < excess {
                return Err(VmError::StackUnderflow { pc: at });
            }
            let start = self.stack.len() - excess;
            let rest =
                self.alloc_retry(at, |vm| vm.heap.alloc_list_from(&vm.stack[start..]))?;
            self.stack.truncate(start);
            self.push(rest)?;
            Ok(opt as usize + 1)
        } else {
            if argc != arity {
                return Err(VmError::ArityMismatch {
                    entry: at as u16,
                    expected: arity,
                    got: argc,
                });
            }
            Ok(arity as usize)
        }
    }

    fn do_prelude(&mut self, mode: CallMode, arity: u8, opt: u8, at: usize) -> Result<(), VmError> {
        match mode {
            CallMode::Normal => {
                let pend = self.pending.take().ok_or(VmError::IllegalInstruction {
                    pc: at,
                    byte: 0xB0,
                })?;
                if self.frames.len() >= self.config.max_frames {
                    return Err(VmError::FrameOverflow {
                        depth: self.frames.len(),
                    });
                }
                let locals = self.bind_args(arity, opt, pend.argc, at)?;
                if self.stack.len() < locals {
                    return Err(VmError::StackUnderflow { pc: at });
                }
                let base = (self.stack.len() - locals) as u32;
                self.frames.push(Frame {
                    return_pc: pend.return_pc,
                    base,
                    mode,
                    closure: pend.closure,
                });
                if self.frames.len() > self.peak_frames {
                    self.peak_frames = self.frames.len();
                }
                Ok(())
            }

            // Frame reused verbatim: nothing pushed, nothing copied; the
            // frame keeps its original return address and closure binding.
            CallMode::TailCall => {
                self.pending = None;
                Ok(())
            }

            CallMode::TailRec => {
                let pend = self.pending.take().ok_or(VmError::IllegalInstruction {
                    pc: at,
                    byte: 0xB2,
                })?;
                let locals = self.bind_args(arity, opt, pend.argc, at)?;
                let base = self.frames.last().base as usize;
                if self.stack.len() < locals || self.stack.len() - locals < base {
                    return Err(VmError::StackUnderflow { pc: at });
                }
                // Copy the shadow frame down into the reused frame's local
                // slots, then discard everything above them. The existing
                // closure binding carries over; pend.closure is dropped.
                let src = self.stack.len() - locals;
                for i in 0..locals {
                    self.stack[base + i] = self.stack[src + i];
                }
                self.stack.truncate(base + locals);
                Ok(())
            }
        }
    }

    fn do_restore(&mut self, at: usize) -> Result<Option<Object>, VmError> {
        let ret = self.pop(at)?;
        let f = self.frames.pop();
        self.stack.truncate(f.base as usize);
        self.push(ret)?;
        if f.return_pc == RETURN_TO_HOST {
            return Ok(Some(ret));
        }
        self.pc = f.return_pc as usize;
        Ok(None)
    }

    /// Resolve a free variable: walk `up` frames down the call stack, then
    /// read either the closure environment covering that frame or the
    /// frame's own locals. Offsets below the environment length select the
    /// captured values; offsets past it land in the locals.
    fn do_free_var(&mut self, up: u8, offset: u8, at: usize) -> Result<(), VmError> {
        let depth = self.frames.len();
        let f = *self
            .frames
            .walk_up(up as usize)
            .ok_or(VmError::FreeVarDepth { pc: at, up, depth })?;
        let v = match f.closure {
            Some(cl) => {
                let env = &self.heap.closures.get(cl).env;
                let off = offset as usize;
                if off < env.len() {
                    env[off]
                } else {
                    let idx = f.base as usize + off - env.len();
                    *self
                        .stack
                        .get(idx)
                        .ok_or(VmError::StackUnderflow { pc: at })?
                }
            }
            None => {
                let idx = f.base as usize + offset as usize;
                *self
                    .stack
                    .get(idx)
                    .ok_or(VmError::StackUnderflow { pc: at })?
            }
        };
        self.push(v)
    }

    fn do_make_closure(&mut self, entry: u16, frame_size: u8, at: usize) -> Result<(), VmError> {
        let base = self.frames.last().base as usize;
        let fsize = frame_size as usize;
        if base + fsize > self.stack.len() {
            return Err(VmError::StackUnderflow { pc: at });
        }
        // The closure's arity is read off the callee's prelude; a target
        // without one is a zero-argument body.
        let arity = match decode(&self.code, entry as usize) {
            Ok((Op::Prelude { arity, .. }, _)) => arity,
            _ => 0,
        };
        let clo = self.alloc_retry(at, |vm| {
            let env = vm.stack[base..base + fsize].to_vec();
            vm.heap.alloc_closure(env, arity, entry)
        })?;
        self.push(clo)
    }

    // -- primitives ----------------------------------------------------------

    fn call_primitive(&mut self, id: u16, at: usize) -> Result<(), VmError> {
        let entry = self
            .prims
            .lookup(id)
            .ok_or(VmError::UnknownPrimitive { pc: at, id })?;
        let (arity, func) = (entry.arity, entry.func);
        let n = arity as usize;
        if self.stack.len() < n {
            return Err(VmError::StackUnderflow { pc: at });
        }
        let start = self.stack.len() - n;

        // Arguments stay on the stack (rooted) across the retry loop, so a
        // collection between attempts cannot free what they reference.
        let mut attempt = 0;
        loop {
            let result = {
                let Vm {
                    ref stack,
                    ref mut heap,
                    ref mut platform,
                    ref mut symbols,
                    ..
                } = *self;
                let mut ctx = PrimCtx {
                    heap,
                    platform,
                    symbols,
                };
                func(&mut ctx, &stack[start..])
            };
            match result {
                Ok(v) => {
                    self.stack.truncate(start);
                    self.push(v)?;
                    return Ok(());
                }
                Err(PrimError::Exhausted { pool }) => {
                    if attempt == 2 {
                        return Err(VmError::OutOfMemory { pool });
                    }
                    debug!("primitive {} exhausted {} pool, collecting", id, pool);
                    self.collect(attempt == 1);
                    attempt += 1;
                }
                Err(e) => return Err(map_prim_err(e, at)),
            }
        }
    }

    // -- literal construction ------------------------------------------------

    fn do_literal(&mut self, lit: Literal, at: usize) -> Result<(), VmError> {
        match lit {
            Literal::Int(v) => self.push(Object::Int(v)),
            Literal::Real(v) => self.push(Object::Real(v)),
            Literal::Rational(n, d) => {
                if d == 0 {
                    return Err(VmError::DivideByZero { pc: at });
                }
                self.push(Object::rational(n, d))
            }
            Literal::Complex(re, im) => self.push(Object::Complex(re, im)),
            Literal::Bool(b) => self.push(Object::Bool(b)),
            Literal::Char(c) => self.push(Object::Char(c)),
            Literal::EmptyList => self.push(Object::EmptyList),
            Literal::Unspecified => self.push(Object::Unspecified),
            Literal::Procedure(entry) => self.push(Object::Procedure(entry)),
            Literal::Primitive(id) => self.push(Object::Primitive(id)),

            Literal::Symbol(id) => {
                if id as usize >= self.symbols.len() {
                    return Err(VmError::IndexOutOfRange {
                        pc: at,
                        index: id as usize,
                        len: self.symbols.len(),
                    });
                }
                self.push(Object::Symbol(SymId(id)))
            }

            Literal::Str { pos, len } => {
                let bytes = &self.code[pos as usize..pos as usize + len as usize];
                let s = std::str::from_utf8(bytes)
                    .map_err(|_| VmError::IllegalInstruction {
                        pc: at,
                        byte: self.code[at],
                    })?
                    .to_owned();
                let obj = self.alloc_retry(at, |vm| vm.heap.alloc_str(&s))?;
                self.push(obj)
            }

            Literal::Bytevector { pos, len } => {
                let data = self.code[pos as usize..pos as usize + len as usize].to_vec();
                // Literal bytevectors are the immutable variant.
                let obj = self.alloc_retry(at, |vm| vm.heap.alloc_bytevector(data.clone(), false))?;
                self.push(obj)
            }

            Literal::List(count) => {
                let n = count as usize;
                if self.stack.len() < n {
                    return Err(VmError::StackUnderflow { pc: at });
                }
                let start = self.stack.len() - n;
                let obj = self.alloc_retry(at, |vm| vm.heap.alloc_list_from(&vm.stack[start..]))?;
                self.stack.truncate(start);
                self.push(obj)
            }

            Literal::Vector(count) => {
                let n = count as usize;
                if self.stack.len() < n {
                    return Err(VmError::StackUnderflow { pc: at });
                }
                let start = self.stack.len() - n;
                let obj =
                    self.alloc_retry(at, |vm| vm.heap.alloc_vector(vm.stack[start..].to_vec()))?;
                self.stack.truncate(start);
                self.push(obj)
            }
        }
    }
}

fn map_prim_err(e: PrimError, at: usize) -> VmError {
    match e {
        PrimError::Type { expected, got } => VmError::TypeMismatch {
            pc: at,
            expected,
            got,
        },
        PrimError::IndexOutOfRange { index, len } => VmError::IndexOutOfRange {
            pc: at,
            index,
            len,
        },
        PrimError::DivideByZero => VmError::DivideByZero { pc: at },
        PrimError::ImmutableWrite => VmError::ImmutableWrite { pc: at },
        PrimError::Exhausted { pool } => VmError::OutOfMemory { pool },
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code::Asm;
    use crate::primitives::ids;

    fn run_vm(build: impl FnOnce(&mut Asm)) -> (Vm, Result<Object, VmError>) {
        let mut asm = Asm::new();
        build(&mut asm);
        let image = ProgramImage::from_code(asm.finish());
        let mut vm = Vm::new(image, VmConfig::default());
        let result = vm.run();
        (vm, result)
    }

    fn run_code(build: impl FnOnce(&mut Asm)) -> Result<Object, VmError> {
        run_vm(build).1
    }

    #[test]
    fn push_int_add_halt_leaves_seven() {
        // The canonical two-pushes-one-primitive program.
        let result = run_code(|asm| {
            asm.push_int(3).push_int(4).primitive(ids::ADD).halt();
        })
        .unwrap();
        assert_eq!(result, Object::Int(7));
    }

    #[test]
    fn locals_read_and_write() {
        let result = run_code(|asm| {
            asm.push_int(10); // local 0 of the base frame
            asm.push_int(5);
            asm.store_local(0); // local 0 = 5
            asm.push_local(0);
            asm.halt();
        })
        .unwrap();
        assert_eq!(result, Object::Int(5));
    }

    #[test]
    fn globals_round_trip() {
        let image = ProgramImage::from_code(
            {
                let mut asm = Asm::new();
                asm.push_int(9).store_global(2).push_global(2).halt();
                asm.finish()
            },
        )
        .with_globals(3);
        let mut vm = Vm::new(image, VmConfig::default());
        assert_eq!(vm.run().unwrap(), Object::Int(9));
        assert_eq!(vm.global(2), Some(Object::Int(9)));
    }

    #[test]
    fn global_out_of_range_is_fatal() {
        let err = run_code(|asm| {
            asm.push_global(0).halt();
        })
        .unwrap_err();
        assert!(matches!(err, VmError::GlobalOutOfRange { index: 0, len: 0, .. }));
    }

    #[test]
    fn conditional_jumps() {
        let result = run_code(|asm| {
            let else_ = asm.new_label();
            let end = asm.new_label();
            asm.lit_bool(false);
            asm.jump_unless(else_);
            asm.push_int(1);
            asm.jump(end);
            asm.bind(else_);
            asm.push_int(2);
            asm.bind(end);
            asm.halt();
        })
        .unwrap();
        assert_eq!(result, Object::Int(2));
    }

    #[test]
    fn short_skip_forward() {
        let result = run_code(|asm| {
            asm.lit_bool(true);
            asm.skip_unless(1); // true: fall through, push 1
            asm.push_int(1);
            asm.halt();
        })
        .unwrap();
        assert_eq!(result, Object::Int(1));
    }

    #[test]
    fn normal_call_and_restore() {
        // (define (add1 x) (+ x 1))  (add1 41)
        let result = run_code(|asm| {
            let proc = asm.new_label();
            asm.push_int(41);
            asm.call(proc, 1);
            asm.halt();
            asm.bind(proc);
            asm.prelude(CallMode::Normal, 1, 1);
            asm.push_local(0);
            asm.push_int(1);
            asm.primitive(ids::ADD);
            asm.restore();
        })
        .unwrap();
        assert_eq!(result, Object::Int(42));
    }

    #[test]
    fn arity_mismatch_is_fatal() {
        let err = run_code(|asm| {
            let proc = asm.new_label();
            asm.push_int(1);
            asm.call(proc, 1);
            asm.halt();
            asm.bind(proc);
            asm.prelude(CallMode::Normal, 2, 2);
            asm.restore();
        })
        .unwrap_err();
        assert!(matches!(
            err,
            VmError::ArityMismatch {
                expected: 2,
                got: 1,
                ..
            }
        ));
    }

    #[test]
    fn variadic_rest_binding_preserves_order() {
        // (define (f x . rest) rest)  (f 1 2 3 4) => (2 3 4)
        let (vm, result) = run_vm(|asm| {
            let proc = asm.new_label();
            asm.push_int(1).push_int(2).push_int(3).push_int(4);
            asm.call(proc, 4);
            asm.halt();
            asm.bind(proc);
            asm.prelude(CallMode::Normal, 2, 1); // 1 fixed + rest
            asm.push_local(1); // the rest list
            asm.restore();
        });
        match result.unwrap() {
            Object::List(h) => {
                assert_eq!(
                    vm.heap().list_items(Some(h)),
                    vec![Object::Int(2), Object::Int(3), Object::Int(4)]
                );
            }
            other => panic!("expected rest list, got {:?}", other),
        }
    }

    #[test]
    fn apply_calls_procedure_object() {
        let result = run_code(|asm| {
            let proc = asm.new_label();
            asm.lit_procedure(proc);
            asm.push_int(20);
            asm.push_int(22);
            asm.apply(2);
            asm.halt();
            asm.bind(proc);
            asm.prelude(CallMode::Normal, 2, 2);
            asm.push_local(0);
            asm.push_local(1);
            asm.primitive(ids::ADD);
            asm.restore();
        })
        .unwrap();
        assert_eq!(result, Object::Int(42));
    }

    #[test]
    fn apply_primitive_object_bypasses_frames() {
        let result = run_code(|asm| {
            asm.lit_primitive(ids::MUL);
            asm.push_int(6);
            asm.push_int(7);
            asm.apply(2);
            asm.halt();
        })
        .unwrap();
        assert_eq!(result, Object::Int(42));
    }

    #[test]
    fn apply_non_callable_is_fatal() {
        let err = run_code(|asm| {
            asm.push_int(3);
            asm.apply(0);
            asm.halt();
        })
        .unwrap_err();
        assert!(matches!(err, VmError::NotCallable { .. }));
    }

    #[test]
    fn make_stack_closure_is_unsupported() {
        let err = run_code(|asm| {
            let l = asm.here();
            asm.make_stack_closure(l, 0);
            asm.halt();
        })
        .unwrap_err();
        assert!(matches!(err, VmError::UnsupportedInstruction { .. }));
    }

    #[test]
    fn literal_list_assembles_pushed_elements_in_order() {
        let result = run_code(|asm| {
            asm.push_int(1).push_int(2).push_int(3);
            asm.lit_list(3);
            asm.halt();
        })
        .unwrap();
        match result {
            Object::List(_) => {}
            other => panic!("expected list, got {:?}", other),
        }
    }

    #[test]
    fn unknown_primitive_is_fatal() {
        let err = run_code(|asm| {
            asm.primitive(900);
            asm.halt();
        })
        .unwrap_err();
        assert!(matches!(err, VmError::UnknownPrimitive { id: 900, .. }));
    }

    #[test]
    fn halt_on_empty_stack_yields_unspecified() {
        let result = run_code(|asm| {
            asm.halt();
        })
        .unwrap();
        assert_eq!(result, Object::Unspecified);
    }

    #[test]
    fn restore_of_base_frame_ends_the_program() {
        let result = run_code(|asm| {
            asm.push_int(5);
            asm.restore();
        })
        .unwrap();
        assert_eq!(result, Object::Int(5));
    }

    #[test]
    fn reset_rewinds_to_image_state() {
        let image = ProgramImage::from_code({
            let mut asm = Asm::new();
            asm.push_int(1).push_int(2).primitive(ids::ADD).halt();
            asm.finish()
        });
        let mut vm = Vm::new(image, VmConfig::default());
        assert_eq!(vm.run().unwrap(), Object::Int(3));
        vm.reset();
        assert_eq!(vm.run().unwrap(), Object::Int(3));
    }
}
