//! End-to-end programs through the assembler and the dispatch loop.

use lefvm::code::{Asm, CallMode};
use lefvm::primitives::ids;
use lefvm::{HeapConfig, Object, ProgramImage, Vm, VmConfig, VmError};

fn run(build: impl FnOnce(&mut Asm)) -> (Vm, Result<Object, VmError>) {
    run_with(VmConfig::default(), build)
}

fn run_with(config: VmConfig, build: impl FnOnce(&mut Asm)) -> (Vm, Result<Object, VmError>) {
    let mut asm = Asm::new();
    build(&mut asm);
    let image = ProgramImage::from_code(asm.finish());
    let mut vm = Vm::new(image, config);
    let result = vm.run();
    (vm, result)
}

// ---------------------------------------------------------------------------
// The canonical scenario
// ---------------------------------------------------------------------------

#[test]
fn push_push_add_halt() {
    let (_, result) = run(|asm| {
        asm.push_int(3).push_int(4).primitive(ids::ADD).halt();
    });
    assert_eq!(result.unwrap(), Object::Int(7));
}

// ---------------------------------------------------------------------------
// Tail recursion
// ---------------------------------------------------------------------------

/// A counted self-tail-recursive loop of 100 000 iterations must run in O(1)
/// frames and O(1) value-stack, independent of N.
#[test]
fn tail_recursion_runs_in_constant_stack() {
    const N: i32 = 100_000;
    let (vm, result) = run(|asm| {
        let f = asm.new_label();
        let f_tail = asm.new_label();
        let body = asm.new_label();
        let recur = asm.new_label();

        asm.push_int(N);
        asm.call(f, 1);
        asm.halt();

        asm.bind(f);
        asm.prelude(CallMode::Normal, 1, 1);
        asm.jump(body);

        asm.bind(f_tail);
        asm.prelude(CallMode::TailRec, 1, 1);

        asm.bind(body);
        asm.push_local(0);
        asm.push_int(0);
        asm.primitive(ids::NUM_EQ);
        asm.jump_unless(recur);
        asm.push_local(0);
        asm.restore();

        asm.bind(recur);
        asm.push_local(0);
        asm.push_int(1);
        asm.primitive(ids::SUB);
        asm.call(f_tail, 1);
    });

    assert_eq!(result.unwrap(), Object::Int(0));
    // Base frame + one procedure frame, regardless of iteration count.
    assert_eq!(vm.peak_frames(), 2);
    assert!(
        vm.peak_stack() < 16,
        "value stack grew with N: peak {}",
        vm.peak_stack()
    );
}

/// TailCall mode reuses the frame without touching the locals.
#[test]
fn tail_call_reuses_frame_verbatim() {
    let (vm, result) = run(|asm| {
        let f = asm.new_label();
        let g = asm.new_label();

        asm.push_int(5);
        asm.call(f, 1);
        asm.halt();

        // f(x) tail-calls g, which sees the same frame shape.
        asm.bind(f);
        asm.prelude(CallMode::Normal, 1, 1);
        asm.call(g, 0);

        asm.bind(g);
        asm.prelude(CallMode::TailCall, 1, 1);
        asm.push_local(0);
        asm.push_int(1);
        asm.primitive(ids::ADD);
        asm.restore();
    });
    assert_eq!(result.unwrap(), Object::Int(6));
    assert_eq!(vm.peak_frames(), 2);
}

// ---------------------------------------------------------------------------
// Closures
// ---------------------------------------------------------------------------

/// A closure with frame_size = 2 capturing two locals still reads them after
/// the defining frame is gone — resolution goes through the frame's closure
/// binding, not a frame-pointer walk.
#[test]
fn closure_capture_outlives_defining_frame() {
    let (_, result) = run(|asm| {
        let maker = asm.new_label();
        let body = asm.new_label();

        asm.push_int(10);
        asm.push_int(32);
        asm.call(maker, 2);
        // maker's frame is popped here; now invoke the closure.
        asm.apply(0);
        asm.halt();

        asm.bind(maker);
        asm.prelude(CallMode::Normal, 2, 2);
        asm.make_closure(body, 2);
        asm.restore();

        asm.bind(body);
        asm.prelude(CallMode::Normal, 0, 0);
        asm.free_var(0, 0);
        asm.free_var(0, 1);
        asm.primitive(ids::ADD);
        asm.restore();
    });
    assert_eq!(result.unwrap(), Object::Int(42));
}

/// Offsets past the captured environment read the frame's own locals.
#[test]
fn free_var_offsets_split_env_and_locals() {
    let (_, result) = run(|asm| {
        let maker = asm.new_label();
        let body = asm.new_label();

        asm.push_int(40);
        asm.call(maker, 1);
        asm.push_int(2);
        asm.apply(1);
        asm.halt();

        asm.bind(maker);
        asm.prelude(CallMode::Normal, 1, 1);
        asm.make_closure(body, 1);
        asm.restore();

        // body(y): env = [40]; offset 0 → env, offset 1 → local y.
        asm.bind(body);
        asm.prelude(CallMode::Normal, 1, 1);
        asm.free_var(0, 0);
        asm.free_var(0, 1);
        asm.primitive(ids::ADD);
        asm.restore();
    });
    assert_eq!(result.unwrap(), Object::Int(42));
}

/// `FreeVar` with up > 0 walks the frame chain into the caller.
#[test]
fn free_var_walks_caller_frames() {
    let (_, result) = run(|asm| {
        let outer = asm.new_label();
        let inner = asm.new_label();

        asm.push_int(41);
        asm.call(outer, 1);
        asm.halt();

        asm.bind(outer);
        asm.prelude(CallMode::Normal, 1, 1);
        asm.call(inner, 0);
        asm.restore();

        asm.bind(inner);
        asm.prelude(CallMode::Normal, 0, 0);
        asm.free_var(1, 0); // caller's local 0
        asm.push_int(1);
        asm.primitive(ids::ADD);
        asm.restore();
    });
    assert_eq!(result.unwrap(), Object::Int(42));
}

// ---------------------------------------------------------------------------
// Equality laws (program level)
// ---------------------------------------------------------------------------

#[test]
fn equal_lists_eq_handles() {
    // Two structurally identical, distinctly-allocated (1 2 3) lists:
    // equal? => #t, eq? => #f.
    let (_, result) = run(|asm| {
        asm.push_int(1).push_int(2).push_int(3);
        asm.lit_list(3);
        asm.push_int(1).push_int(2).push_int(3);
        asm.lit_list(3);
        asm.primitive(ids::EQUAL);
        asm.halt();
    });
    assert_eq!(result.unwrap(), Object::Bool(true));

    let (_, result) = run(|asm| {
        asm.push_int(1).push_int(2).push_int(3);
        asm.lit_list(3);
        asm.push_int(1).push_int(2).push_int(3);
        asm.lit_list(3);
        asm.primitive(ids::EQ);
        asm.halt();
    });
    assert_eq!(result.unwrap(), Object::Bool(false));
}

#[test]
fn eqv_compares_exact_numbers_by_value() {
    let (_, result) = run(|asm| {
        asm.lit_rational(2, 4);
        asm.lit_rational(1, 2);
        asm.primitive(ids::EQV);
        asm.halt();
    });
    assert_eq!(result.unwrap(), Object::Bool(true));
}

// ---------------------------------------------------------------------------
// Collection under pressure
// ---------------------------------------------------------------------------

/// A loop that allocates and discards list structure on a tiny heap must run
/// to completion, with collections reclaiming each iteration's garbage.
#[test]
fn gc_reclaims_loop_garbage_on_tiny_heap() {
    let config = VmConfig {
        heap: HeapConfig::tiny(),
        ..VmConfig::default()
    };
    let (vm, result) = run_with(config, |asm| {
        let f = asm.new_label();
        let f_tail = asm.new_label();
        let body = asm.new_label();
        let recur = asm.new_label();

        asm.push_int(100);
        asm.call(f, 1);
        asm.halt();

        asm.bind(f);
        asm.prelude(CallMode::Normal, 1, 1);
        asm.jump(body);

        asm.bind(f_tail);
        asm.prelude(CallMode::TailRec, 1, 1);

        asm.bind(body);
        // Build a two-element list and drop it: pure garbage.
        asm.push_local(0);
        asm.push_local(0);
        asm.lit_list(2);
        asm.drop_n(1);

        asm.push_local(0);
        asm.push_int(0);
        asm.primitive(ids::NUM_EQ);
        asm.jump_unless(recur);
        asm.push_local(0);
        asm.restore();

        asm.bind(recur);
        asm.push_local(0);
        asm.push_int(1);
        asm.primitive(ids::SUB);
        asm.call(f_tail, 1);
    });

    assert_eq!(result.unwrap(), Object::Int(0));
    assert!(
        vm.heap().stats.cycles > 0,
        "a tiny heap must have collected at least once"
    );
    assert!(vm.heap().stats.freed > 0);
}

/// When a normal pass frees nothing and memory is still needed, the hurt
/// fallback sacrifices aged survivors so allocation can proceed.
#[test]
fn hurt_fallback_sacrifices_survivors_to_keep_allocating() {
    let config = VmConfig {
        heap: HeapConfig::tiny(),
        ..VmConfig::default()
    };
    let (vm, result) = run_with(config, |asm| {
        // Keep ten vectors alive on the base frame's stack — more than the
        // tiny vector pool holds.
        for _ in 0..10 {
            asm.push_int(2);
            asm.push_int(0);
            asm.primitive(ids::MAKE_VECTOR);
        }
        asm.halt();
    });
    assert!(result.is_ok());
    assert!(
        vm.heap().stats.hurt_cycles > 0,
        "a fully live tiny pool must have needed a hurt pass"
    );
}

/// PERMANENT objects are beyond even the hurt pass: once the pool is full of
/// sealed data, allocation ends in OutOfMemory rather than a panic.
#[test]
fn sealed_globals_cause_out_of_memory_when_pool_is_full() {
    let config = VmConfig {
        heap: HeapConfig::tiny(), // 8 list nodes, no growth
        ..VmConfig::default()
    };
    let mut asm = Asm::new();
    // Phase 1 — global-initialization: an 8-node list fills the pool.
    for i in 0..8 {
        asm.push_int(i);
    }
    asm.lit_list(8);
    asm.store_global(0);
    asm.lit_unspecified();
    asm.halt();
    // Phase 2 — one more node is one too many.
    asm.drop_n(1);
    asm.push_int(0);
    asm.lit_list(1);
    asm.halt();

    let image = ProgramImage::from_code(asm.finish()).with_globals(1);
    let mut vm = Vm::new(image, config);
    vm.run().unwrap();
    vm.seal_globals();
    match vm.run() {
        Err(VmError::OutOfMemory { pool }) => assert_eq!(pool, "list"),
        other => panic!("expected OutOfMemory, got {:?}", other),
    }
}

// ---------------------------------------------------------------------------
// Bytevectors (program level)
// ---------------------------------------------------------------------------

#[test]
fn bytevector_literal_copy_range() {
    let (vm, result) = run(|asm| {
        asm.lit_bytevector(&[1, 2, 3, 4, 5]);
        asm.push_int(2);
        asm.push_int(4);
        asm.primitive(ids::BYTEVECTOR_COPY);
        asm.halt();
    });
    let obj = result.unwrap();
    assert_eq!(vm.render(obj), "#u8(3 4)");
}

#[test]
fn bytevector_literal_is_immutable() {
    let (_, result) = run(|asm| {
        asm.lit_bytevector(&[1, 2]);
        asm.push_int(0);
        asm.push_int(9);
        asm.primitive(ids::BYTEVECTOR_U8_SET);
        asm.halt();
    });
    assert!(matches!(result, Err(VmError::ImmutableWrite { .. })));
}

#[test]
fn bytevector_out_of_range_is_fatal_with_range() {
    let (_, result) = run(|asm| {
        asm.push_int(5);
        asm.push_int(0);
        asm.primitive(ids::MAKE_BYTEVECTOR);
        asm.push_int(5);
        asm.primitive(ids::BYTEVECTOR_U8_REF);
        asm.halt();
    });
    match result {
        Err(VmError::IndexOutOfRange { index: 5, len: 5, .. }) => {}
        other => panic!("expected IndexOutOfRange, got {:?}", other),
    }
}

// ---------------------------------------------------------------------------
// Frame depth
// ---------------------------------------------------------------------------

#[test]
fn unbounded_recursion_hits_the_frame_limit() {
    let config = VmConfig {
        max_frames: 64,
        ..VmConfig::default()
    };
    let (_, result) = run_with(config, |asm| {
        let f = asm.new_label();
        asm.call(f, 0);
        asm.halt();
        asm.bind(f);
        asm.prelude(CallMode::Normal, 0, 0);
        asm.call(f, 0); // non-tail self call
    });
    assert!(matches!(result, Err(VmError::FrameOverflow { .. })));
}

// ---------------------------------------------------------------------------
// Symbols and display
// ---------------------------------------------------------------------------

#[test]
fn symbols_come_from_the_image_table() {
    let mut asm = Asm::new();
    asm.lit_symbol(1);
    asm.primitive(ids::SYMBOL_TO_STRING);
    asm.halt();
    let image = ProgramImage::from_code(asm.finish())
        .with_symbols(vec!["car".into(), "lambda".into()]);
    let mut vm = Vm::new(image, VmConfig::default());
    let obj = vm.run().unwrap();
    assert_eq!(vm.render(obj), "\"lambda\"");
}
