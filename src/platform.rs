use std::cell::RefCell;
use std::io::Write as _;
use std::rc::Rc;

// ---------------------------------------------------------------------------
// Collaborator Traits
// ---------------------------------------------------------------------------

/// Character console supplied by the embedding platform. The VM only needs
/// single-character input (for the shell/REPL collaborator) and raw byte
/// output.
pub trait Console {
    /// `None` when no input is pending.
    fn read_char(&mut self) -> Option<u8>;
    fn write(&mut self, bytes: &[u8]);
}

/// Raw byte storage (flash on the real target). Reads and writes report
/// success; the primitive layer turns failures into range errors.
pub trait Storage {
    fn read(&mut self, offset: usize, buf: &mut [u8]) -> bool;
    fn write(&mut self, offset: usize, bytes: &[u8]) -> bool;
}

/// The platform services one VM instance talks to.
pub struct Platform {
    pub console: Box<dyn Console>,
    pub storage: Box<dyn Storage>,
}

impl Platform {
    /// Host-process platform: stdout console (no input), 4 KB RAM-backed
    /// storage.
    pub fn host() -> Self {
        Platform {
            console: Box::new(StdConsole),
            storage: Box::new(MemStorage::new(4096)),
        }
    }

    /// Fully in-memory platform for tests; returns shared handles to the
    /// console buffers.
    pub fn buffered(input: &[u8]) -> (Self, Rc<RefCell<Vec<u8>>>) {
        let (console, output) = BufferConsole::new(input);
        (
            Platform {
                console: Box::new(console),
                storage: Box::new(MemStorage::new(4096)),
            },
            output,
        )
    }
}

impl Default for Platform {
    fn default() -> Self {
        Platform::host()
    }
}

// ---------------------------------------------------------------------------
// Default Implementations
// ---------------------------------------------------------------------------

/// Console bound to the host process stdout; input always empty.
pub struct StdConsole;

impl Console for StdConsole {
    fn read_char(&mut self) -> Option<u8> {
        None
    }

    fn write(&mut self, bytes: &[u8]) {
        let mut out = std::io::stdout().lock();
        let _ = out.write_all(bytes);
        let _ = out.flush();
    }
}

/// In-memory console: reads from a preloaded input buffer, collects output
/// into a shared vec the test can inspect.
pub struct BufferConsole {
    input: Vec<u8>,
    cursor: usize,
    output: Rc<RefCell<Vec<u8>>>,
}

impl BufferConsole {
    pub fn new(input: &[u8]) -> (Self, Rc<RefCell<Vec<u8>>>) {
        let output = Rc::new(RefCell::new(Vec::new()));
        (
            BufferConsole {
                input: input.to_vec(),
                cursor: 0,
                output: Rc::clone(&output),
            },
            output,
        )
    }
}

impl Console for BufferConsole {
    fn read_char(&mut self) -> Option<u8> {
        let b = self.input.get(self.cursor).copied();
        if b.is_some() {
            self.cursor += 1;
        }
        b
    }

    fn write(&mut self, bytes: &[u8]) {
        self.output.borrow_mut().extend_from_slice(bytes);
    }
}

/// RAM-backed storage of a fixed size.
pub struct MemStorage {
    bytes: Vec<u8>,
}

impl MemStorage {
    pub fn new(size: usize) -> Self {
        MemStorage {
            bytes: vec![0; size],
        }
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        MemStorage { bytes }
    }
}

impl Storage for MemStorage {
    fn read(&mut self, offset: usize, buf: &mut [u8]) -> bool {
        match self.bytes.get(offset..offset + buf.len()) {
            Some(src) => {
                buf.copy_from_slice(src);
                true
            }
            None => false,
        }
    }

    fn write(&mut self, offset: usize, bytes: &[u8]) -> bool {
        match self.bytes.get_mut(offset..offset + bytes.len()) {
            Some(dst) => {
                dst.copy_from_slice(bytes);
                true
            }
            None => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
