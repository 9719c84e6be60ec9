//! Transistor network shapes.
//!
//! A shape is a series/parallel network of up to five gate inputs, stored as
//! an input count and an activation mask: bit `i` of the mask is set when the
//! network conducts for the input combination `i` (bit `j` of `i` meaning
//! gate `j` is at its active level).
//!
//! The table is the closure of the single switch under series and parallel
//! composition with the three base shapes. Each entry records, for every base
//! shape that may join it, which shape the combination produces.

use std::collections::HashMap;
use std::sync::LazyLock;

/// Index into [`SHAPES`].
pub type ShapeId = u8;

/// Never conducts.
pub const SHAPE_OFF: ShapeId = 0;
/// Always conducts; depletion loads.
pub const SHAPE_ON: ShapeId = 1;
/// One gate.
pub const SHAPE_SINGLE: ShapeId = 2;
/// Two gates in series.
pub const SHAPE_SERIES2: ShapeId = 3;
/// Two gates in parallel.
pub const SHAPE_PARALLEL2: ShapeId = 4;

/// Most gates a network may carry.
pub const MAX_INPUTS: usize = 5;

/// Number of base shapes a combination table is indexed by.
const BASES: usize = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Combine {
    Series,
    Parallel,
}

/// One precomputed network.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NetworkShape {
    pub inputs: u8,
    pub mask: u32,
    /// Shape produced by putting base shape `SHAPE_SINGLE + k` in parallel
    /// after this one, or -1.
    pub parallel: [i8; BASES],
    /// Same for series.
    pub series: [i8; BASES],
}

impl NetworkShape {
    const fn base(inputs: u8, mask: u32) -> Self {
        Self {
            inputs,
            mask,
            parallel: [-1; BASES],
            series: [-1; BASES],
        }
    }

    /// Whether the network conducts for the given active-gate bits.
    pub fn conducts(&self, active: u32) -> bool {
        (self.mask >> active) & 1 == 1
    }

    fn table(&self, how: Combine) -> &[i8; BASES] {
        match how {
            Combine::Series => &self.series,
            Combine::Parallel => &self.parallel,
        }
    }
}

/// All shapes, indexed by [`ShapeId`].
pub static SHAPES: LazyLock<Vec<NetworkShape>> = LazyLock::new(build_shapes);

/// Activation mask of `x` followed by `y`; `y`'s gates take the high bits.
pub fn compose_mask(x: (u8, u32), y: (u8, u32), how: Combine) -> u32 {
    let (nx, mx) = x;
    let (ny, my) = y;
    let low = (1u32 << nx) - 1;
    let mut mask = 0;
    for i in 0..(1u32 << (nx + ny)) {
        let a = (mx >> (i & low)) & 1 == 1;
        let b = (my >> (i >> nx)) & 1 == 1;
        let on = match how {
            Combine::Series => a && b,
            Combine::Parallel => a || b,
        };
        if on {
            mask |= 1 << i;
        }
    }
    mask
}

fn build_shapes() -> Vec<NetworkShape> {
    let mut shapes = vec![
        NetworkShape::base(0, 0),
        NetworkShape::base(0, 1),
        NetworkShape::base(1, 0b10),
        NetworkShape::base(2, 0b1000),
        NetworkShape::base(2, 0b1110),
    ];
    let mut known: HashMap<(u8, u32), usize> = shapes
        .iter()
        .enumerate()
        .map(|(id, s)| ((s.inputs, s.mask), id))
        .collect();

    let mut big = SHAPE_SINGLE as usize;
    while big < shapes.len() {
        let x = shapes[big];
        for k in 0..BASES {
            let y = shapes[SHAPE_SINGLE as usize + k];
            if x.inputs < y.inputs || (x.inputs + y.inputs) as usize > MAX_INPUTS {
                continue;
            }
            for how in [Combine::Parallel, Combine::Series] {
                let key = (
                    x.inputs + y.inputs,
                    compose_mask((x.inputs, x.mask), (y.inputs, y.mask), how),
                );
                let id = *known.entry(key).or_insert_with(|| {
                    shapes.push(NetworkShape::base(key.0, key.1));
                    shapes.len() - 1
                });
                match how {
                    Combine::Parallel => shapes[big].parallel[k] = id as i8,
                    Combine::Series => shapes[big].series[k] = id as i8,
                }
            }
        }
        big += 1;
    }
    shapes
}

/// Looks up the shape of `x` combined with `y`.
///
/// Returns the resulting shape and whether `x`'s gates come first. `None`
/// means no table entry exists and the two must not be merged.
pub fn combine(x: ShapeId, y: ShapeId, how: Combine) -> Option<(ShapeId, bool)> {
    lookup(x, y, how)
        .map(|s| (s, true))
        .or_else(|| lookup(y, x, how).map(|s| (s, false)))
}

fn lookup(big: ShapeId, small: ShapeId, how: Combine) -> Option<ShapeId> {
    let k = small.checked_sub(SHAPE_SINGLE)? as usize;
    if k >= BASES {
        return None;
    }
    let entry = SHAPES.get(big as usize)?.table(how)[k];
    (entry >= 0).then_some(entry as ShapeId)
}

pub fn shape(id: ShapeId) -> &'static NetworkShape {
    &SHAPES[id as usize]
}
