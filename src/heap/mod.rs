pub mod gc;
mod slab;

pub use gc::{collect, GcReport, Roots};
pub use slab::{GcState, Handle, Slab};

use crate::error::PrimError;
use crate::object::Object;

// ---------------------------------------------------------------------------
// Object Shapes
// ---------------------------------------------------------------------------

/// Two object slots; each side is independently mutable (`set-car!`,
/// `set-cdr!`).
#[derive(Debug, Clone, Copy)]
pub struct Pair {
    pub car: Object,
    pub cdr: Object,
}

/// One node of a list chain. `cons`/`append` copy node structure while the
/// `item` payloads stay shared.
#[derive(Debug, Clone, Copy)]
pub struct ListNode {
    pub item: Object,
    pub next: Option<ListRef>,
}

/// Fixed-length array of objects; the length is set at creation and never
/// changes.
#[derive(Debug)]
pub struct VectorObj {
    pub items: Box<[Object]>,
}

/// Heap-resident closure: captured environment, arity, and code entry.
#[derive(Debug)]
pub struct ClosureObj {
    pub env: Box<[Object]>,
    pub arity: u8,
    pub entry: u16,
}

/// Payloads of the generic ("boxed scalar") pool: strings and bytevectors.
#[derive(Debug)]
pub enum Boxed {
    Str(Box<str>),
    Bytes { data: Box<[u8]>, mutable: bool },
}

pub type PairRef = Handle<Pair>;
pub type ListRef = Handle<ListNode>;
pub type VectorRef = Handle<VectorObj>;
pub type ClosureRef = Handle<ClosureObj>;
pub type BoxedRef = Handle<Boxed>;

/// Bytevector sizes are recorded in 16 bits.
pub const MAX_BYTEVECTOR: usize = u16::MAX as usize;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Pool sizing. `*_base` slots are pre-allocated; each pool may grow up to
/// `growth` times its base, after which allocation fails over to the
/// collector and, if that does not help, to `OutOfMemory`. There is no
/// silent unbounded growth.
#[derive(Debug, Clone, Copy)]
pub struct HeapConfig {
    pub pairs_base: usize,
    pub lists_base: usize,
    pub vectors_base: usize,
    pub closures_base: usize,
    pub boxed_base: usize,
    /// Hard cap multiplier over the base capacity of every pool.
    pub growth: usize,
}

impl Default for HeapConfig {
    fn default() -> Self {
        HeapConfig {
            pairs_base: 512,
            lists_base: 512,
            vectors_base: 64,
            closures_base: 64,
            boxed_base: 128,
            growth: 4,
        }
    }
}

impl HeapConfig {
    /// A deliberately tiny heap, used by tests that want to provoke
    /// collections and exhaustion quickly.
    pub fn tiny() -> Self {
        HeapConfig {
            pairs_base: 8,
            lists_base: 8,
            vectors_base: 4,
            closures_base: 4,
            boxed_base: 8,
            growth: 1,
        }
    }
}

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

/// Lifecycle counters, accumulated across collections.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeapStats {
    pub cycles: u64,
    pub hurt_cycles: u64,
    pub freed: u64,
    pub promoted: u64,
}

impl std::fmt::Display for HeapStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "gc cycles: {} ({} hurt)  freed: {}  promoted: {}",
            self.cycles, self.hurt_cycles, self.freed, self.promoted
        )
    }
}

// ---------------------------------------------------------------------------
// Heap
// ---------------------------------------------------------------------------

/// All pooled storage of one VM instance. One slab per object shape; the
/// slot tables double as the collector's bookkeeping index over every live
/// allocation.
pub struct Heap {
    pub pairs: Slab<Pair>,
    pub lists: Slab<ListNode>,
    pub vectors: Slab<VectorObj>,
    pub closures: Slab<ClosureObj>,
    pub boxed: Slab<Boxed>,
    pub stats: HeapStats,
    config: HeapConfig,
}

impl Heap {
    pub fn new(config: HeapConfig) -> Self {
        let g = config.growth.max(1);
        Heap {
            pairs: Slab::new("pair", config.pairs_base, config.pairs_base * g),
            lists: Slab::new("list", config.lists_base, config.lists_base * g),
            vectors: Slab::new("vector", config.vectors_base, config.vectors_base * g),
            closures: Slab::new("closure", config.closures_base, config.closures_base * g),
            boxed: Slab::new("boxed", config.boxed_base, config.boxed_base * g),
            stats: HeapStats::default(),
            config,
        }
    }

    pub fn config(&self) -> HeapConfig {
        self.config
    }

    pub fn live_objects(&self) -> usize {
        self.pairs.live()
            + self.lists.live()
            + self.vectors.live()
            + self.closures.live()
            + self.boxed.live()
    }

    // -- allocation ----------------------------------------------------------
    //
    // All of these return `PrimError::Exhausted` when the pool is full; the
    // dispatch loop catches that, collects, and retries the whole operation.
    // Multi-node constructions may leave partial chains behind on failure;
    // those are unreachable and the retry's collection reclaims them.

    pub fn alloc_pair(&mut self, car: Object, cdr: Object) -> Result<Object, PrimError> {
        self.pairs
            .alloc(Pair { car, cdr })
            .map(Object::Pair)
            .ok_or(PrimError::Exhausted { pool: "pair" })
    }

    pub fn alloc_list_node(
        &mut self,
        item: Object,
        next: Option<ListRef>,
    ) -> Result<ListRef, PrimError> {
        self.lists
            .alloc(ListNode { item, next })
            .ok_or(PrimError::Exhausted { pool: "list" })
    }

    /// Build a list chain from a slice, back to front. An empty slice is the
    /// empty list (no node — a single-element list is exactly one node).
    pub fn alloc_list_from(&mut self, items: &[Object]) -> Result<Object, PrimError> {
        let mut next = None;
        for &item in items.iter().rev() {
            next = Some(self.alloc_list_node(item, next)?);
        }
        Ok(match next {
            Some(h) => Object::List(h),
            None => Object::EmptyList,
        })
    }

    /// Collect a list chain's payloads into a vec (payload sharing: the
    /// objects are copied by value, their storage is not).
    pub fn list_items(&self, mut node: Option<ListRef>) -> Vec<Object> {
        let mut items = Vec::new();
        while let Some(h) = node {
            let n = self.lists.get(h);
            items.push(n.item);
            node = n.next;
        }
        items
    }

    pub fn alloc_vector(&mut self, items: Vec<Object>) -> Result<Object, PrimError> {
        self.vectors
            .alloc(VectorObj {
                items: items.into_boxed_slice(),
            })
            .map(Object::Vector)
            .ok_or(PrimError::Exhausted { pool: "vector" })
    }

    pub fn alloc_closure(
        &mut self,
        env: Vec<Object>,
        arity: u8,
        entry: u16,
    ) -> Result<Object, PrimError> {
        self.closures
            .alloc(ClosureObj {
                env: env.into_boxed_slice(),
                arity,
                entry,
            })
            .map(Object::Closure)
            .ok_or(PrimError::Exhausted { pool: "closure" })
    }

    pub fn alloc_str(&mut self, s: &str) -> Result<Object, PrimError> {
        self.boxed
            .alloc(Boxed::Str(s.into()))
            .map(Object::Str)
            .ok_or(PrimError::Exhausted { pool: "boxed" })
    }

    pub fn alloc_bytevector(&mut self, data: Vec<u8>, mutable: bool) -> Result<Object, PrimError> {
        if data.len() > MAX_BYTEVECTOR {
            return Err(PrimError::IndexOutOfRange {
                index: data.len(),
                len: MAX_BYTEVECTOR,
            });
        }
        self.boxed
            .alloc(Boxed::Bytes {
                data: data.into_boxed_slice(),
                mutable,
            })
            .map(Object::Bytevector)
            .ok_or(PrimError::Exhausted { pool: "boxed" })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
