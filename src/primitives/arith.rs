//! Numeric primitives. Exact integers and rationals stay exact while the
//! result fits the 32-bit encoding; on overflow the value demotes to an
//! inexact real. Complex numbers participate in `+ - * /` and numeric
//! equality only — ordering is defined on real-valued numbers.

use crate::error::PrimError;
use crate::object::{Object, TypeTag};

use super::{type_error, want_int, PrimCtx};

// ---------------------------------------------------------------------------
// Tower Helpers
// ---------------------------------------------------------------------------

fn gcd64(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

/// Canonicalize an i64 ratio, demoting to `Real` when it cannot be encoded
/// exactly in 32 bits.
fn rational64(n: i64, d: i64) -> Object {
    debug_assert!(d != 0);
    let g = gcd64(n.unsigned_abs(), d.unsigned_abs()).max(1) as i64;
    let (mut n, mut d) = (n / g, d / g);
    if d < 0 {
        n = -n;
        d = -d;
    }
    if d == 1 {
        match i32::try_from(n) {
            Ok(v) => Object::Int(v),
            Err(_) => Object::Real(n as f64),
        }
    } else {
        match (i32::try_from(n), i32::try_from(d)) {
            (Ok(nn), Ok(dd)) => Object::Rational(nn, dd),
            _ => Object::Real(n as f64 / d as f64),
        }
    }
}

/// Exact value as a ratio of i64s.
fn exact_parts(o: Object) -> Option<(i64, i64)> {
    match o {
        Object::Int(v) => Some((v as i64, 1)),
        Object::Rational(n, d) => Some((n as i64, d as i64)),
        _ => None,
    }
}

/// Real-valued number as f64; `None` for complex and non-numbers.
pub fn number_to_f64(o: Object) -> Option<f64> {
    match o {
        Object::Int(v) => Some(v as f64),
        Object::Rational(n, d) => Some(n as f64 / d as f64),
        Object::Real(r) => Some(r),
        _ => None,
    }
}

fn as_complex(o: Object) -> Option<(f64, f64)> {
    match o {
        Object::Complex(re, im) => Some((re, im)),
        _ => number_to_f64(o).map(|re| (re, 0.0)),
    }
}

fn want_number(o: Object) -> Result<(), PrimError> {
    if o.is_number() {
        Ok(())
    } else {
        Err(type_error(TypeTag::Int, o))
    }
}

// ---------------------------------------------------------------------------
// + - * /
// ---------------------------------------------------------------------------

fn binary_num(
    a: Object,
    b: Object,
    exact: impl Fn(i64, i64, i64, i64) -> Option<(i64, i64)>,
    real: impl Fn(f64, f64) -> f64,
    complex: impl Fn(f64, f64, f64, f64) -> (f64, f64),
) -> Result<Object, PrimError> {
    want_number(a)?;
    want_number(b)?;
    if let (Some((n1, d1)), Some((n2, d2))) = (exact_parts(a), exact_parts(b)) {
        if let Some((n, d)) = exact(n1, d1, n2, d2) {
            return Ok(rational64(n, d));
        }
        // Exact arithmetic overflowed i64 — fall through to inexact.
    }
    match (a, b) {
        (Object::Complex(..), _) | (_, Object::Complex(..)) => {
            let (r1, i1) = as_complex(a).expect("checked number");
            let (r2, i2) = as_complex(b).expect("checked number");
            let (re, im) = complex(r1, i1, r2, i2);
            Ok(Object::Complex(re, im))
        }
        _ => {
            let x = number_to_f64(a).expect("checked number");
            let y = number_to_f64(b).expect("checked number");
            Ok(Object::Real(real(x, y)))
        }
    }
}

pub fn prim_add(_: &mut PrimCtx<'_>, args: &[Object]) -> Result<Object, PrimError> {
    binary_num(
        args[0],
        args[1],
        |n1, d1, n2, d2| {
            let n = n1.checked_mul(d2)?.checked_add(n2.checked_mul(d1)?)?;
            Some((n, d1.checked_mul(d2)?))
        },
        |x, y| x + y,
        |r1, i1, r2, i2| (r1 + r2, i1 + i2),
    )
}

pub fn prim_sub(_: &mut PrimCtx<'_>, args: &[Object]) -> Result<Object, PrimError> {
    binary_num(
        args[0],
        args[1],
        |n1, d1, n2, d2| {
            let n = n1.checked_mul(d2)?.checked_sub(n2.checked_mul(d1)?)?;
            Some((n, d1.checked_mul(d2)?))
        },
        |x, y| x - y,
        |r1, i1, r2, i2| (r1 - r2, i1 - i2),
    )
}

pub fn prim_mul(_: &mut PrimCtx<'_>, args: &[Object]) -> Result<Object, PrimError> {
    binary_num(
        args[0],
        args[1],
        |n1, d1, n2, d2| Some((n1.checked_mul(n2)?, d1.checked_mul(d2)?)),
        |x, y| x * y,
        |r1, i1, r2, i2| (r1 * r2 - i1 * i2, r1 * i2 + i1 * r2),
    )
}

pub fn prim_div(_: &mut PrimCtx<'_>, args: &[Object]) -> Result<Object, PrimError> {
    // Exact division by exact zero is an error before the generic path runs.
    if args[0].is_exact() {
        if let Some((n2, _)) = exact_parts(args[1]) {
            if n2 == 0 {
                return Err(PrimError::DivideByZero);
            }
        }
    }
    binary_num(
        args[0],
        args[1],
        |n1, d1, n2, d2| {
            if n2 == 0 {
                return None;
            }
            Some((n1.checked_mul(d2)?, d1.checked_mul(n2)?))
        },
        |x, y| x / y,
        |r1, i1, r2, i2| {
            let den = r2 * r2 + i2 * i2;
            ((r1 * r2 + i1 * i2) / den, (i1 * r2 - r1 * i2) / den)
        },
    )
}

// ---------------------------------------------------------------------------
// Comparisons
// ---------------------------------------------------------------------------

pub fn prim_num_eq(_: &mut PrimCtx<'_>, args: &[Object]) -> Result<Object, PrimError> {
    let (a, b) = (args[0], args[1]);
    want_number(a)?;
    want_number(b)?;
    let eq = if let (Some((n1, d1)), Some((n2, d2))) = (exact_parts(a), exact_parts(b)) {
        n1 * d2 == n2 * d1
    } else {
        let (r1, i1) = as_complex(a).expect("checked number");
        let (r2, i2) = as_complex(b).expect("checked number");
        r1 == r2 && i1 == i2
    };
    Ok(Object::Bool(eq))
}

fn order(a: Object, b: Object) -> Result<std::cmp::Ordering, PrimError> {
    if let (Some((n1, d1)), Some((n2, d2))) = (exact_parts(a), exact_parts(b)) {
        return Ok((n1 * d2).cmp(&(n2 * d1)));
    }
    let x = number_to_f64(a).ok_or_else(|| type_error(TypeTag::Real, a))?;
    let y = number_to_f64(b).ok_or_else(|| type_error(TypeTag::Real, b))?;
    x.partial_cmp(&y)
        .ok_or_else(|| type_error(TypeTag::Real, Object::Real(f64::NAN)))
}

pub fn prim_lt(_: &mut PrimCtx<'_>, args: &[Object]) -> Result<Object, PrimError> {
    Ok(Object::Bool(order(args[0], args[1])?.is_lt()))
}

pub fn prim_gt(_: &mut PrimCtx<'_>, args: &[Object]) -> Result<Object, PrimError> {
    Ok(Object::Bool(order(args[0], args[1])?.is_gt()))
}

pub fn prim_le(_: &mut PrimCtx<'_>, args: &[Object]) -> Result<Object, PrimError> {
    Ok(Object::Bool(order(args[0], args[1])?.is_le()))
}

pub fn prim_ge(_: &mut PrimCtx<'_>, args: &[Object]) -> Result<Object, PrimError> {
    Ok(Object::Bool(order(args[0], args[1])?.is_ge()))
}

pub fn prim_is_zero(_: &mut PrimCtx<'_>, args: &[Object]) -> Result<Object, PrimError> {
    want_number(args[0])?;
    let zero = match args[0] {
        Object::Int(v) => v == 0,
        Object::Rational(n, _) => n == 0,
        Object::Real(r) => r == 0.0,
        Object::Complex(re, im) => re == 0.0 && im == 0.0,
        _ => unreachable!(),
    };
    Ok(Object::Bool(zero))
}

// ---------------------------------------------------------------------------
// Integer Division
// ---------------------------------------------------------------------------

fn int_div_args(args: &[Object]) -> Result<(i32, i32), PrimError> {
    let a = want_int(args, 0)?;
    let b = want_int(args, 1)?;
    if b == 0 {
        return Err(PrimError::DivideByZero);
    }
    Ok((a, b))
}

pub fn prim_quotient(_: &mut PrimCtx<'_>, args: &[Object]) -> Result<Object, PrimError> {
    let (a, b) = int_div_args(args)?;
    Ok(Object::Int(a.wrapping_div(b)))
}

pub fn prim_remainder(_: &mut PrimCtx<'_>, args: &[Object]) -> Result<Object, PrimError> {
    let (a, b) = int_div_args(args)?;
    Ok(Object::Int(a.wrapping_rem(b)))
}

/// Result takes the sign of the divisor, per R7RS `modulo`.
pub fn prim_modulo(_: &mut PrimCtx<'_>, args: &[Object]) -> Result<Object, PrimError> {
    let (a, b) = int_div_args(args)?;
    let m = a.rem_euclid(b.wrapping_abs());
    Ok(Object::Int(if b < 0 && m != 0 {
        m - b.wrapping_abs()
    } else {
        m
    }))
}

// ---------------------------------------------------------------------------
// abs / min / max
// ---------------------------------------------------------------------------

pub fn prim_abs(_: &mut PrimCtx<'_>, args: &[Object]) -> Result<Object, PrimError> {
    match args[0] {
        Object::Int(v) => Ok(rational64((v as i64).abs(), 1)),
        Object::Rational(n, d) => Ok(rational64((n as i64).abs(), d as i64)),
        Object::Real(r) => Ok(Object::Real(r.abs())),
        other => Err(type_error(TypeTag::Real, other)),
    }
}

pub fn prim_min(_: &mut PrimCtx<'_>, args: &[Object]) -> Result<Object, PrimError> {
    Ok(if order(args[0], args[1])?.is_le() {
        args[0]
    } else {
        args[1]
    })
}

pub fn prim_max(_: &mut PrimCtx<'_>, args: &[Object]) -> Result<Object, PrimError> {
    Ok(if order(args[0], args[1])?.is_ge() {
        args[0]
    } else {
        args[1]
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
