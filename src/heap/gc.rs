use log::{debug, warn};

use crate::exec::frame::Frame;
use crate::object::Object;

use super::slab::{GcState, Slab};
use super::Heap;

// ---------------------------------------------------------------------------
// Roots
// ---------------------------------------------------------------------------

/// The active root set of a collection cycle: every value-stack slot (locals
/// and temporaries of all live frames), the global table, each frame's bound
/// closure, and any values the interpreter is holding between instructions
/// (`extra`, e.g. the pending closure of a call in flight).
#[derive(Clone, Copy, Default)]
pub struct Roots<'a> {
    pub stack: &'a [Object],
    pub globals: &'a [Object],
    pub frames: &'a [Frame],
    pub extra: &'a [Object],
}

// ---------------------------------------------------------------------------
// Mark Bitmaps
// ---------------------------------------------------------------------------

/// The active-root index: one bitmap per pool, rebuilt from scratch every
/// cycle and dropped at cycle end. Doubles as the visited set during the
/// trace, which makes the recursive insertion cycle-safe.
struct Marks {
    pairs: Vec<bool>,
    lists: Vec<bool>,
    vectors: Vec<bool>,
    closures: Vec<bool>,
    boxed: Vec<bool>,
}

impl Marks {
    fn for_heap(heap: &Heap) -> Self {
        Marks {
            pairs: vec![false; heap.pairs.len()],
            lists: vec![false; heap.lists.len()],
            vectors: vec![false; heap.vectors.len()],
            closures: vec![false; heap.closures.len()],
            boxed: vec![false; heap.boxed.len()],
        }
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// Outcome of one collection cycle.
#[derive(Debug, Clone, Copy, Default)]
pub struct GcReport {
    pub freed: usize,
    pub promoted: usize,
    pub hurt: bool,
}

// ---------------------------------------------------------------------------
// Trace
// ---------------------------------------------------------------------------

/// Insert everything reachable from `roots` into the mark bitmaps. Explicit
/// worklist instead of recursion: list chains and pair trees can be deeper
/// than the native stack allows.
///
/// Handles whose slots were reclaimed by an earlier hurt pass may still sit
/// in live roots; the trace skips them (they simply drop out of the root
/// graph) rather than treating them as contract violations — that check
/// belongs to the accessors the program runs through.
fn trace(heap: &Heap, marks: &mut Marks, roots: &Roots) {
    let mut work: Vec<Object> = Vec::with_capacity(64);
    work.extend_from_slice(roots.stack);
    work.extend_from_slice(roots.globals);
    work.extend_from_slice(roots.extra);
    for frame in roots.frames {
        if let Some(h) = frame.closure {
            work.push(Object::Closure(h));
        }
    }

    while let Some(obj) = work.pop() {
        match obj {
            Object::Pair(h) => {
                if !heap.pairs.is_current(h) {
                    continue;
                }
                let i = h.index() as usize;
                if marks.pairs[i] {
                    continue;
                }
                marks.pairs[i] = true;
                let p = heap.pairs.get(h);
                work.push(p.car);
                work.push(p.cdr);
            }
            Object::List(h) => {
                let mut node = Some(h);
                while let Some(n) = node {
                    if !heap.lists.is_current(n) {
                        break;
                    }
                    let i = n.index() as usize;
                    if marks.lists[i] {
                        break;
                    }
                    marks.lists[i] = true;
                    let ln = heap.lists.get(n);
                    work.push(ln.item);
                    node = ln.next;
                }
            }
            Object::Vector(h) => {
                if !heap.vectors.is_current(h) {
                    continue;
                }
                let i = h.index() as usize;
                if marks.vectors[i] {
                    continue;
                }
                marks.vectors[i] = true;
                work.extend_from_slice(&heap.vectors.get(h).items);
            }
            Object::Closure(h) => {
                if !heap.closures.is_current(h) {
                    continue;
                }
                let i = h.index() as usize;
                if marks.closures[i] {
                    continue;
                }
                marks.closures[i] = true;
                work.extend_from_slice(&heap.closures.get(h).env);
            }
            Object::Str(h) | Object::Bytevector(h) => {
                if heap.boxed.is_current(h) {
                    marks.boxed[h.index() as usize] = true;
                }
            }
            // Inline scalars reference no storage.
            _ => {}
        }
    }
}

// ---------------------------------------------------------------------------
// Sweep
// ---------------------------------------------------------------------------

/// Sweep one pool against its mark bitmap.
///
/// `finalize = true` frees in one step; `finalize = false` only retires dead
/// slots (state change, payload kept) and relies on a later
/// `finalize_retired` pass — the two-phase treatment the boxed pool gets so
/// container reachability is fully settled before leaf storage is dropped.
fn sweep_pool<T>(
    slab: &mut Slab<T>,
    marks: &[bool],
    hurt: bool,
    finalize: bool,
    report: &mut GcReport,
) {
    for i in 0..marks.len() {
        if !slab.occupied(i) {
            continue;
        }
        let state = slab.raw_state(i);
        if state == GcState::Permanent {
            continue;
        }
        let reachable = marks[i];
        if reachable {
            match state {
                GcState::Gen1 => {
                    slab.set_raw_state(i, GcState::Gen2);
                    report.promoted += 1;
                }
                GcState::Gen2 if hurt => {
                    // Emergency sacrifice of aged survivors; stale-handle
                    // stamps turn any later touch into a contract panic.
                    if finalize {
                        slab.release(i);
                    } else {
                        slab.retire(i);
                    }
                    report.freed += 1;
                }
                _ => {}
            }
        } else {
            if finalize {
                slab.release(i);
            } else {
                slab.retire(i);
            }
            report.freed += 1;
        }
    }
}

// ---------------------------------------------------------------------------
// Collection
// ---------------------------------------------------------------------------

/// One collection cycle. `hurt = false` is the normal, opportunistic pass
/// invoked on allocation failure; `hurt = true` is the emergency pass that
/// also reclaims GEN2 survivors when a normal pass freed nothing and memory
/// is still needed.
///
/// Sweep order is fixed: pairs → vectors → lists → closures → boxed. The
/// boxed pool is swept twice (soft, then hard) so composite pools release
/// their references before leaf payloads are dropped.
pub fn collect(heap: &mut Heap, roots: &Roots, hurt: bool) -> GcReport {
    let mut marks = Marks::for_heap(heap);
    trace(heap, &mut marks, roots);

    let mut report = GcReport {
        hurt,
        ..Default::default()
    };
    sweep_pool(&mut heap.pairs, &marks.pairs, hurt, true, &mut report);
    sweep_pool(&mut heap.vectors, &marks.vectors, hurt, true, &mut report);
    sweep_pool(&mut heap.lists, &marks.lists, hurt, true, &mut report);
    sweep_pool(&mut heap.closures, &marks.closures, hurt, true, &mut report);
    sweep_pool(&mut heap.boxed, &marks.boxed, hurt, false, &mut report);
    heap.boxed.finalize_retired();

    heap.stats.cycles += 1;
    heap.stats.freed += report.freed as u64;
    heap.stats.promoted += report.promoted as u64;
    if hurt {
        heap.stats.hurt_cycles += 1;
        warn!(
            "hurt collection: freed {} (promoted {}), {} live",
            report.freed,
            report.promoted,
            heap.live_objects()
        );
    } else {
        debug!(
            "gc cycle {}: freed {}, promoted {}, {} live",
            heap.stats.cycles,
            report.freed,
            report.promoted,
            heap.live_objects()
        );
    }
    report
}

/// Mark everything reachable from `roots` as PERMANENT. Used once after the
/// global-initialization pass: globals, and whatever they reference, are
/// never collected afterwards.
pub fn seal(heap: &mut Heap, roots: &Roots) {
    let mut marks = Marks::for_heap(heap);
    trace(heap, &mut marks, roots);

    fn seal_pool<T>(slab: &mut Slab<T>, marks: &[bool]) {
        for (i, &m) in marks.iter().enumerate() {
            if m && slab.occupied(i) {
                slab.set_raw_state(i, GcState::Permanent);
            }
        }
    }
    seal_pool(&mut heap.pairs, &marks.pairs);
    seal_pool(&mut heap.vectors, &marks.vectors);
    seal_pool(&mut heap.lists, &marks.lists);
    seal_pool(&mut heap.closures, &marks.closures);
    seal_pool(&mut heap.boxed, &marks.boxed);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::HeapConfig;

    fn stack_roots(stack: &[Object]) -> Roots<'_> {
        Roots {
            stack,
            ..Default::default()
        }
    }

    #[test]
    fn unreachable_pair_is_reclaimed() {
        let mut heap = Heap::new(HeapConfig::default());
        let _garbage = heap.alloc_pair(Object::Int(1), Object::Int(2)).unwrap();
        let keep = heap.alloc_pair(Object::Int(3), Object::Int(4)).unwrap();

        let stack = [keep];
        let report = collect(&mut heap, &stack_roots(&stack), false);
        assert_eq!(report.freed, 1);
        assert_eq!(heap.pairs.live(), 1);
        if let Object::Pair(h) = keep {
            assert_eq!(heap.pairs.get(h).car, Object::Int(3));
        }
    }

    #[test]
    fn reachable_chain_survives_through_nesting() {
        let mut heap = Heap::new(HeapConfig::default());
        let inner = heap.alloc_pair(Object::Int(1), Object::EmptyList).unwrap();
        let vec = heap.alloc_vector(vec![inner, Object::Int(2)]).unwrap();
        let outer = heap.alloc_pair(vec, Object::EmptyList).unwrap();

        let stack = [outer];
        collect(&mut heap, &stack_roots(&stack), false);
        assert_eq!(heap.pairs.live(), 2);
        assert_eq!(heap.vectors.live(), 1);
    }

    #[test]
    fn survivors_age_gen1_to_gen2_and_no_further() {
        let mut heap = Heap::new(HeapConfig::default());
        let keep = heap.alloc_pair(Object::Int(0), Object::EmptyList).unwrap();
        let h = match keep {
            Object::Pair(h) => h,
            _ => unreachable!(),
        };
        assert_eq!(heap.pairs.state(h), GcState::Gen1);

        let stack = [keep];
        let r1 = collect(&mut heap, &stack_roots(&stack), false);
        assert_eq!(r1.promoted, 1);
        assert_eq!(heap.pairs.state(h), GcState::Gen2);

        let r2 = collect(&mut heap, &stack_roots(&stack), false);
        assert_eq!(r2.promoted, 0);
        assert_eq!(heap.pairs.state(h), GcState::Gen2);
    }

    #[test]
    fn normal_pass_never_frees_reachable_gen2() {
        let mut heap = Heap::new(HeapConfig::default());
        let keep = heap.alloc_pair(Object::Int(7), Object::EmptyList).unwrap();
        let stack = [keep];
        for _ in 0..5 {
            collect(&mut heap, &stack_roots(&stack), false);
        }
        if let Object::Pair(h) = keep {
            assert_eq!(heap.pairs.get(h).car, Object::Int(7));
        }
    }

    #[test]
    fn hurt_pass_sacrifices_aged_survivors() {
        let mut heap = Heap::new(HeapConfig::default());
        let keep = heap.alloc_pair(Object::Int(7), Object::EmptyList).unwrap();
        let stack = [keep];
        collect(&mut heap, &stack_roots(&stack), false); // promote to GEN2
        let report = collect(&mut heap, &stack_roots(&stack), true);
        assert_eq!(report.freed, 1);
        assert_eq!(heap.pairs.live(), 0);
    }

    #[test]
    fn hurt_pass_spares_gen1() {
        let mut heap = Heap::new(HeapConfig::default());
        let fresh = heap.alloc_pair(Object::Int(1), Object::EmptyList).unwrap();
        let stack = [fresh];
        let report = collect(&mut heap, &stack_roots(&stack), true);
        // Fresh (GEN1) and reachable: promoted, not sacrificed.
        assert_eq!(report.freed, 0);
        assert_eq!(report.promoted, 1);
    }

    #[test]
    fn permanent_objects_are_never_swept() {
        let mut heap = Heap::new(HeapConfig::default());
        let global = heap.alloc_pair(Object::Int(9), Object::EmptyList).unwrap();
        let globals = [global];
        seal(
            &mut heap,
            &Roots {
                globals: &globals,
                ..Default::default()
            },
        );

        // Now unreachable from any root — still survives, even hurt.
        collect(&mut heap, &Roots::default(), true);
        if let Object::Pair(h) = global {
            assert_eq!(heap.pairs.state(h), GcState::Permanent);
            assert_eq!(heap.pairs.get(h).car, Object::Int(9));
        }
    }

    #[test]
    fn cyclic_pairs_do_not_hang_the_trace() {
        let mut heap = Heap::new(HeapConfig::default());
        let a = heap.alloc_pair(Object::Int(1), Object::EmptyList).unwrap();
        let b = heap.alloc_pair(Object::Int(2), a).unwrap();
        if let (Object::Pair(ha), Object::Pair(_)) = (a, b) {
            heap.pairs.get_mut(ha).cdr = b; // a → b → a
        }
        let stack = [a];
        let report = collect(&mut heap, &stack_roots(&stack), false);
        assert_eq!(report.freed, 0);
        assert_eq!(heap.pairs.live(), 2);
    }

    #[test]
    fn closure_env_is_traced_via_frame_binding() {
        let mut heap = Heap::new(HeapConfig::default());
        let captured = heap.alloc_pair(Object::Int(5), Object::EmptyList).unwrap();
        let clo = heap.alloc_closure(vec![captured], 1, 0x40).unwrap();
        let ch = match clo {
            Object::Closure(h) => h,
            _ => unreachable!(),
        };

        // The closure is referenced only through a frame's binding, not
        // through any stack slot.
        let frames = [Frame::base(0).with_closure(ch)];
        let roots = Roots {
            frames: &frames,
            ..Default::default()
        };
        let report = collect(&mut heap, &roots, false);
        assert_eq!(report.freed, 0);
        assert_eq!(heap.pairs.live(), 1);
        assert_eq!(heap.closures.live(), 1);
    }

    #[test]
    fn boxed_pool_two_phase_sweep_reclaims_strings() {
        let mut heap = Heap::new(HeapConfig::default());
        let keep = heap.alloc_str("keep").unwrap();
        let _dead = heap.alloc_str("dead").unwrap();
        let pair = heap.alloc_pair(keep, Object::EmptyList).unwrap();

        let stack = [pair];
        let report = collect(&mut heap, &stack_roots(&stack), false);
        assert_eq!(report.freed, 1);
        assert_eq!(heap.boxed.live(), 1);
    }
}
