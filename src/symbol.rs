use std::collections::HashMap;

// ---------------------------------------------------------------------------
// Symbols
// ---------------------------------------------------------------------------

/// Interned symbol id — a 16-bit index into the VM's symbol table, matching
/// the width of the bytecode's symbol-literal operand. Comparing two ids is
/// string equality within one image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SymId(pub u16);

/// Per-VM symbol table. Seeded once from the program image's symbol section;
/// `string->symbol` may intern additional names at runtime. Symbols are never
/// garbage-collected — ids stay valid until the VM is torn down.
#[derive(Debug, Default)]
pub struct SymbolTable {
    names: Vec<Box<str>>,
    index: HashMap<Box<str>, u16>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from the image's decoded symbol section, in image order (the
    /// bytecode's 16-bit symbol operands index this order).
    pub fn from_names(names: Vec<Box<str>>) -> Self {
        let mut table = SymbolTable::new();
        for name in names {
            let id = table.names.len() as u16;
            table.index.insert(name.clone(), id);
            table.names.push(name);
        }
        table
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Intern a name, returning its id; `None` once the 16-bit id space is
    /// exhausted.
    pub fn intern(&mut self, name: &str) -> Option<SymId> {
        if let Some(&id) = self.index.get(name) {
            return Some(SymId(id));
        }
        if self.names.len() > u16::MAX as usize {
            return None;
        }
        let id = self.names.len() as u16;
        self.index.insert(name.into(), id);
        self.names.push(name.into());
        Some(SymId(id))
    }

    /// Resolve an id back to its name. Ids come from decoded bytecode, so an
    /// out-of-table id is a contract violation, not a recoverable error.
    pub fn resolve(&self, id: SymId) -> &str {
        self.names
            .get(id.0 as usize)
            .unwrap_or_else(|| panic!("symbol id {} outside table of {}", id.0, self.names.len()))
    }

    pub fn lookup(&self, name: &str) -> Option<SymId> {
        self.index.get(name).map(|&id| SymId(id))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
