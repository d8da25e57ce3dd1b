//! lefvm — an embedded bytecode virtual machine for a Scheme-like language.
//!
//! The crate covers the execution core: the tagged object model, the
//! pool-based generational garbage collector, the variable-width bytecode
//! decoder and dispatch loop, and the call/frame machinery with proper tail
//! recursion. Programs arrive as LEF container images; platform services
//! (console, storage) and extra primitives are supplied by the embedder.
//!
//! ```
//! use lefvm::{code::Asm, lef::ProgramImage, primitives::ids, Object, Vm, VmConfig};
//!
//! let mut asm = Asm::new();
//! asm.push_int(3).push_int(4).primitive(ids::ADD).halt();
//! let image = ProgramImage::from_code(asm.finish());
//!
//! let mut vm = Vm::new(image, VmConfig::default());
//! assert_eq!(vm.run().unwrap(), Object::Int(7));
//! ```

pub mod code;
pub mod error;
pub mod exec;
pub mod heap;
pub mod lef;
pub mod object;
pub mod platform;
pub mod primitives;
pub mod symbol;

pub use error::{LefError, PrimError, VmError};
pub use exec::{Vm, VmConfig};
pub use heap::{GcReport, Heap, HeapConfig};
pub use lef::ProgramImage;
pub use object::{Object, TypeTag};
pub use platform::Platform;

/// Parse a LEF container. Failures are recoverable: a malformed upload means
/// the caller (the shell collaborator) takes over instead of running a
/// program.
pub fn load_program(bytes: &[u8]) -> Result<ProgramImage, LefError> {
    lef::parse(bytes)
}
