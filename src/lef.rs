//! LEF program-image container.
//!
//! ```text
//! header   sig: 3 bytes "LEF" · ver: 3 bytes · msize: u32 · psize: u32 ·
//!          csize: u32
//! body     memory segment (msize) · program segment (psize) ·
//!          clean segment (csize)
//! ```
//!
//! The memory segment carries the global-table size and the symbol blob:
//! `global_count: u16 · symbol_count: u16 · flat NUL-terminated names`.
//! Every loader failure is recoverable — a bad upload hands control back to
//! the shell collaborator instead of taking anything down.

use crate::code::{u16_bytes, u16_from, u32_bytes, u32_from};
use crate::error::LefError;

pub const LEF_SIGNATURE: [u8; 3] = *b"LEF";
pub const HEADER_LEN: usize = 18;

// ---------------------------------------------------------------------------
// Program Image
// ---------------------------------------------------------------------------

/// A validated, decoded LEF image — everything the VM needs to start.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgramImage {
    pub version: [u8; 3],
    pub global_count: u16,
    pub symbols: Vec<Box<str>>,
    pub code: Vec<u8>,
    /// Opaque trailer segment; carried for collaborators, unused by the core.
    pub clean: Vec<u8>,
}

impl ProgramImage {
    /// A minimal image wrapping a code segment — the path tests and embedded
    /// compilers use.
    pub fn from_code(code: Vec<u8>) -> Self {
        ProgramImage {
            version: [0, 1, 0],
            global_count: 0,
            symbols: Vec::new(),
            code,
            clean: Vec::new(),
        }
    }

    pub fn with_globals(mut self, count: u16) -> Self {
        self.global_count = count;
        self
    }

    pub fn with_symbols(mut self, symbols: Vec<Box<str>>) -> Self {
        self.symbols = symbols;
        self
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse and validate a LEF byte image.
pub fn parse(bytes: &[u8]) -> Result<ProgramImage, LefError> {
    if bytes.len() < HEADER_LEN {
        return Err(LefError::ShortHeader { len: bytes.len() });
    }
    if bytes[0..3] != LEF_SIGNATURE {
        return Err(LefError::BadSignature {
            found: [bytes[0], bytes[1], bytes[2]],
        });
    }
    let version = [bytes[3], bytes[4], bytes[5]];
    let msize = u32_from([bytes[6], bytes[7], bytes[8], bytes[9]]) as usize;
    let psize = u32_from([bytes[10], bytes[11], bytes[12], bytes[13]]) as usize;
    let csize = u32_from([bytes[14], bytes[15], bytes[16], bytes[17]]) as usize;

    let declared = msize
        .checked_add(psize)
        .and_then(|s| s.checked_add(csize))
        .ok_or(LefError::Truncated {
            declared: usize::MAX,
            available: bytes.len() - HEADER_LEN,
        })?;
    let available = bytes.len() - HEADER_LEN;
    if declared > available {
        return Err(LefError::Truncated {
            declared,
            available,
        });
    }
    if psize == 0 {
        return Err(LefError::EmptyProgram);
    }

    let memory = &bytes[HEADER_LEN..HEADER_LEN + msize];
    let code = &bytes[HEADER_LEN + msize..HEADER_LEN + msize + psize];
    let clean = &bytes[HEADER_LEN + msize + psize..HEADER_LEN + declared];

    let (global_count, symbols) = parse_memory_segment(memory)?;

    Ok(ProgramImage {
        version,
        global_count,
        symbols,
        code: code.to_vec(),
        clean: clean.to_vec(),
    })
}

fn parse_memory_segment(memory: &[u8]) -> Result<(u16, Vec<Box<str>>), LefError> {
    if memory.is_empty() {
        return Ok((0, Vec::new()));
    }
    if memory.len() < 4 {
        return Err(LefError::BadMemorySegment);
    }
    let global_count = u16_from([memory[0], memory[1]]);
    let symbol_count = u16_from([memory[2], memory[3]]);

    let mut symbols = Vec::with_capacity(symbol_count as usize);
    let mut rest = &memory[4..];
    for index in 0..symbol_count {
        let nul = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or(LefError::BadSymbolTable { index })?;
        let name = std::str::from_utf8(&rest[..nul])
            .map_err(|_| LefError::BadSymbolTable { index })?;
        symbols.push(name.into());
        rest = &rest[nul + 1..];
    }
    if !rest.is_empty() {
        return Err(LefError::BadMemorySegment);
    }
    Ok((global_count, symbols))
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Serialize an image back to container bytes. Used by tooling and tests;
/// the on-device loader only parses.
pub fn encode(image: &ProgramImage) -> Vec<u8> {
    let mut memory = Vec::new();
    if image.global_count != 0 || !image.symbols.is_empty() {
        memory.extend_from_slice(&u16_bytes(image.global_count));
        memory.extend_from_slice(&u16_bytes(image.symbols.len() as u16));
        for sym in &image.symbols {
            memory.extend_from_slice(sym.as_bytes());
            memory.push(0);
        }
    }

    let mut out = Vec::with_capacity(HEADER_LEN + memory.len() + image.code.len());
    out.extend_from_slice(&LEF_SIGNATURE);
    out.extend_from_slice(&image.version);
    out.extend_from_slice(&u32_bytes(memory.len() as u32));
    out.extend_from_slice(&u32_bytes(image.code.len() as u32));
    out.extend_from_slice(&u32_bytes(image.clean.len() as u32));
    out.extend_from_slice(&memory);
    out.extend_from_slice(&image.code);
    out.extend_from_slice(&image.clean);
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
