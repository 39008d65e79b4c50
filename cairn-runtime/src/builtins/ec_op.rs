//! Elliptic-curve operation builtin
//!
//! Seven cells per slot: P = (x, y), Q = (x, y), the scalar m, then the
//! derived R = P + m * Q. Points live on the curve y^2 = x^3 + alpha*x +
//! beta over the field; both inputs are checked against the curve equation.

use crate::error::MemoryError;
use crate::memory::Memory;
use cairn_spec::{Felt, MaybeRelocatable, Relocatable};
use once_cell::sync::Lazy;

pub const CELLS_PER_INSTANCE: usize = 7;
pub const INPUT_CELLS: usize = 5;

/// Curve coefficient alpha
pub static ALPHA: Lazy<Felt> = Lazy::new(Felt::one);

/// Curve coefficient beta
pub static BETA: Lazy<Felt> = Lazy::new(|| {
    Felt::from_hex("0x6f21413efbe40de150e596d72f7a8c5609ad26c15c915c1f4cdfcb99cee9e89")
        .expect("curve constant is valid hex")
});

/// An affine point; `None` is the point at infinity
type Point = Option<(Felt, Felt)>;

fn on_curve(x: &Felt, y: &Felt) -> bool {
    let lhs = y * y;
    let rhs = &(&(&(x * x) * x) + &(&*ALPHA * x)) + &*BETA;
    lhs == rhs
}

fn ec_double(p: &(Felt, Felt)) -> Result<(Felt, Felt), MemoryError> {
    let (x, y) = p;
    let three = Felt::from(3u64);
    let two = Felt::from(2u64);
    let numerator = &(&three * &(x * x)) + &*ALPHA;
    let denominator = &two * y;
    let slope = numerator
        .field_div(&denominator)
        .ok_or(cairn_spec::MathError::DividedByZero)?;
    let rx = &(&slope * &slope) - &(&two * x);
    let ry = &(&slope * &(x - &rx)) - y;
    Ok((rx, ry))
}

fn ec_add_points(p: &(Felt, Felt), q: &(Felt, Felt)) -> Result<(Felt, Felt), MemoryError> {
    if p.0 == q.0 {
        if p.1 == q.1 {
            return ec_double(p);
        }
        // P + (-P): the affine representation has no point at infinity
        return Err(cairn_spec::MathError::DividedByZero.into());
    }
    let slope = (&p.1 - &q.1)
        .field_div(&(&p.0 - &q.0))
        .ok_or(cairn_spec::MathError::DividedByZero)?;
    let rx = &(&(&slope * &slope) - &p.0) - &q.0;
    let ry = &(&slope * &(&p.0 - &rx)) - &p.1;
    Ok((rx, ry))
}

fn ec_accumulate(acc: Point, addend: &(Felt, Felt)) -> Result<Point, MemoryError> {
    match acc {
        None => Ok(Some(addend.clone())),
        Some(point) => Ok(Some(ec_add_points(&point, addend)?)),
    }
}

/// R = P + m * Q via double-and-add over the bits of m
fn ec_op(p: (Felt, Felt), q: (Felt, Felt), m: &Felt) -> Result<(Felt, Felt), MemoryError> {
    let mut acc: Point = Some(p);
    let mut addend = q;
    let bits = m.to_biguint().bits();
    for i in 0..bits {
        if m.to_biguint().bit(i) {
            acc = ec_accumulate(acc, &addend)?;
        }
        if i + 1 < bits {
            addend = ec_double(&addend)?;
        }
    }
    acc.ok_or_else(|| cairn_spec::MathError::DividedByZero.into())
}

#[derive(Debug, Default)]
pub struct EcOpBuiltinRunner {
    pub base: Option<Relocatable>,
}

impl EcOpBuiltinRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deduce_memory_cell(
        &self,
        addr: Relocatable,
        memory: &Memory,
    ) -> Result<Option<MaybeRelocatable>, MemoryError> {
        let index = addr.offset % CELLS_PER_INSTANCE;
        if index < INPUT_CELLS {
            return Ok(None);
        }
        let slot = addr.sub_usize(index)?;
        let mut inputs = Vec::with_capacity(INPUT_CELLS);
        for i in 0..INPUT_CELLS {
            match memory.get(&slot.add_usize(i)?) {
                Some(value) => inputs.push(value.get_int()?.clone()),
                None => return Ok(None),
            }
        }
        let p = (inputs[0].clone(), inputs[1].clone());
        let q = (inputs[2].clone(), inputs[3].clone());
        for point in [&p, &q] {
            if !on_curve(&point.0, &point.1) {
                return Err(MemoryError::PointNotOnCurve {
                    x: point.0.clone(),
                    y: point.1.clone(),
                });
            }
        }
        let (rx, ry) = ec_op(p, q, &inputs[4])?;
        Ok(Some(MaybeRelocatable::Int(if index == INPUT_CELLS {
            rx
        } else {
            ry
        })))
    }
}
