//! Console and storage primitives — the bridge to the platform collaborators.

use crate::error::PrimError;
use crate::object::{write_obj, Object, TypeTag};

use super::{type_error, want_int, PrimCtx};

pub fn prim_read_char(ctx: &mut PrimCtx<'_>, _: &[Object]) -> Result<Object, PrimError> {
    Ok(match ctx.platform.console.read_char() {
        Some(b) => Object::Char(b as char),
        // End of input is the eof-ish false, matching the shell collaborator's
        // polling convention.
        None => Object::Bool(false),
    })
}

pub fn prim_write_char(ctx: &mut PrimCtx<'_>, args: &[Object]) -> Result<Object, PrimError> {
    match args[0] {
        Object::Char(c) => {
            let mut buf = [0u8; 4];
            let s = c.encode_utf8(&mut buf);
            ctx.platform.console.write(s.as_bytes());
            Ok(Object::Unspecified)
        }
        other => Err(type_error(TypeTag::Char, other)),
    }
}

pub fn prim_display(ctx: &mut PrimCtx<'_>, args: &[Object]) -> Result<Object, PrimError> {
    let mut out = String::new();
    write_obj(ctx.heap, args[0], &mut out);
    ctx.platform.console.write(out.as_bytes());
    Ok(Object::Unspecified)
}

pub fn prim_newline(ctx: &mut PrimCtx<'_>, _: &[Object]) -> Result<Object, PrimError> {
    ctx.platform.console.write(b"\n");
    Ok(Object::Unspecified)
}

pub fn prim_storage_read_u8(ctx: &mut PrimCtx<'_>, args: &[Object]) -> Result<Object, PrimError> {
    let offset = want_int(args, 0)?;
    if offset < 0 {
        return Err(PrimError::IndexOutOfRange { index: 0, len: 0 });
    }
    let mut buf = [0u8; 1];
    if ctx.platform.storage.read(offset as usize, &mut buf) {
        Ok(Object::Int(buf[0] as i32))
    } else {
        Err(PrimError::IndexOutOfRange {
            index: offset as usize,
            len: 0,
        })
    }
}

pub fn prim_storage_write_u8(ctx: &mut PrimCtx<'_>, args: &[Object]) -> Result<Object, PrimError> {
    let offset = want_int(args, 0)?;
    let v = want_int(args, 1)?;
    if offset < 0 || !(0..=255).contains(&v) {
        return Err(PrimError::IndexOutOfRange {
            index: v.max(0) as usize,
            len: 256,
        });
    }
    if ctx.platform.storage.write(offset as usize, &[v as u8]) {
        Ok(Object::Unspecified)
    } else {
        Err(PrimError::IndexOutOfRange {
            index: offset as usize,
            len: 0,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::{Heap, HeapConfig};
    use crate::platform::Platform;
    use crate::symbol::SymbolTable;

    #[test]
    fn display_and_read_char_through_buffered_platform() {
        let mut heap = Heap::new(HeapConfig::default());
        let (mut platform, output) = Platform::buffered(b"x");
        let mut symbols = SymbolTable::new();
        let mut ctx = PrimCtx {
            heap: &mut heap,
            platform: &mut platform,
            symbols: &mut symbols,
        };

        assert_eq!(
            prim_read_char(&mut ctx, &[]).unwrap(),
            Object::Char('x')
        );
        assert_eq!(prim_read_char(&mut ctx, &[]).unwrap(), Object::Bool(false));

        prim_display(&mut ctx, &[Object::Int(42)]).unwrap();
        prim_newline(&mut ctx, &[]).unwrap();
        assert_eq!(&*output.borrow(), b"42\n");
    }

    #[test]
    fn storage_round_trip_and_bounds() {
        let mut heap = Heap::new(HeapConfig::default());
        let (mut platform, _) = Platform::buffered(b"");
        let mut symbols = SymbolTable::new();
        let mut ctx = PrimCtx {
            heap: &mut heap,
            platform: &mut platform,
            symbols: &mut symbols,
        };

        prim_storage_write_u8(&mut ctx, &[Object::Int(10), Object::Int(7)]).unwrap();
        assert_eq!(
            prim_storage_read_u8(&mut ctx, &[Object::Int(10)]).unwrap(),
            Object::Int(7)
        );
        assert!(prim_storage_read_u8(&mut ctx, &[Object::Int(1 << 20)]).is_err());
    }
}
