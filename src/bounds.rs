use rayon::prelude::*;
use ultraviolet::DVec2;

use crate::body::Body;

/// Axis-aligned bounding box of the body set, recomputed from scratch
/// every iteration.
#[derive(Clone, Copy, Debug)]
pub struct Boundary {
    pub min: DVec2,
    pub max: DVec2,
}

impl Boundary {
    pub fn seed(body: &Body) -> Self {
        Self {
            min: body.pos,
            max: body.pos,
        }
    }

    pub fn include(mut self, p: DVec2) -> Self {
        self.min = self.min.min_by_component(p);
        self.max = self.max.max_by_component(p);
        self
    }

    pub fn combine(self, other: Self) -> Self {
        Self {
            min: self.min.min_by_component(other.min),
            max: self.max.max_by_component(other.max),
        }
    }

    /// Side of the square simulation domain anchored at `min`.
    pub fn side(&self) -> f64 {
        (self.max.x - self.min.x).max(self.max.y - self.min.y)
    }

    /// Min/max reduction over `partitions` equal body ranges, seeded from
    /// the first body. Partial results combine commutatively, so range
    /// order does not matter.
    pub fn reduce(bodies: &[Body], partitions: usize) -> Self {
        let seed = Self::seed(&bodies[0]);
        let chunk = bodies.len().div_ceil(partitions.max(1));
        bodies
            .par_chunks(chunk)
            .map(|range| range.iter().fold(seed, |b, body| b.include(body.pos)))
            .reduce(|| seed, Self::combine)
    }
}

/// Maps a position to its sector on the `per_axis` x `per_axis` grid.
/// Bodies sitting exactly on the max edge clamp into the last row/column;
/// a degenerate (zero-sized) domain maps everything to sector 0.
pub fn sector_of(pos: DVec2, origin: DVec2, sector_side: f64, per_axis: usize) -> usize {
    if sector_side <= 0.0 {
        return 0;
    }
    let mut sx = ((pos.x - origin.x) / sector_side) as usize;
    let mut sy = ((pos.y - origin.y) / sector_side) as usize;
    if sx >= per_axis {
        sx = per_axis - 1;
    }
    if sy >= per_axis {
        sy = per_axis - 1;
    }
    sx + per_axis * sy
}

/// Rewrites every body's sector, in parallel over equal ranges; each task
/// touches only its own range.
pub fn assign_sectors(
    bodies: &mut [Body],
    boundary: &Boundary,
    per_axis: usize,
    partitions: usize,
) {
    let sector_side = boundary.side() / per_axis as f64;
    let origin = boundary.min;
    let chunk = bodies.len().div_ceil(partitions.max(1));
    bodies.par_chunks_mut(chunk).for_each(|range| {
        for body in range {
            body.sector = sector_of(body.pos, origin, sector_side, per_axis) as u32;
        }
    });
}
