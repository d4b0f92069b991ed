use log::debug;
use rayon::prelude::*;
use ultraviolet::DVec2;

use crate::body::Body;
use crate::bounds::{self, Boundary};
use crate::config::SimConfig;
use crate::errors::{Result, SimError};
use crate::quadtree::{
    self, ChunkPool, QuadArena, ScratchPool, analytic_chunk_cap, merge_node_count,
};

/// Owns the simulation state and sequences the per-iteration phases:
/// boundary reduction, sector assignment, per-sector tree builds, the
/// global merge, and the force/integration sweep. Parallel phases fan out
/// over disjoint body ranges or disjoint arena chunks and every phase
/// joins before the next starts, so no locks are needed anywhere.
pub struct Simulation {
    pub config: SimConfig,
    pub bodies: Vec<Body>,
    pub boundary: Boundary,
    pub arena: QuadArena,
    /// Iterations completed so far.
    pub frame: usize,
    sector_members: Vec<Vec<u32>>,
    chunk_cap: usize,
}

impl Simulation {
    /// A simulation over the stock two-galaxy initial condition.
    pub fn new(config: SimConfig) -> Result<Self> {
        config.validate()?;
        let bodies = crate::utils::spawn_galaxies(&config);
        Self::with_bodies(config, bodies)
    }

    /// A simulation over caller-supplied bodies. Stable indices are
    /// (re)assigned contiguously in storage order.
    pub fn with_bodies(config: SimConfig, mut bodies: Vec<Body>) -> Result<Self> {
        config.validate()?;
        if bodies.is_empty() {
            return Err(SimError::InvalidConfig("need at least one body".into()));
        }
        for (i, body) in bodies.iter_mut().enumerate() {
            body.index = i as u32;
        }
        let chunk_cap = config
            .chunk_cap
            .unwrap_or_else(|| analytic_chunk_cap(config.sector_exp))
            .max(1);
        let sectors = config.sector_count();
        let boundary = Boundary::seed(&bodies[0]);
        Ok(Self {
            arena: QuadArena::new(sectors, chunk_cap),
            sector_members: vec![Vec::new(); sectors],
            chunk_cap,
            config,
            bodies,
            boundary,
            frame: 0,
        })
    }

    /// One full iteration: rebuild the global tree, then apply forces and
    /// integrate. Arena or work-stack exhaustion aborts the run; a failed
    /// iteration commits nothing.
    pub fn step(&mut self) -> Result<()> {
        let root = self.build_tree()?;
        self.apply_forces(root)?;
        self.frame += 1;
        Ok(())
    }

    /// Runs the tree phases alone: boundary, sector assignment, the sizing
    /// preflight when no fixed capacity was given, the parallel per-sector
    /// builds, and the sequential merge. Returns the global root. Exposed
    /// separately so the finished tree can be inspected without moving any
    /// bodies.
    pub fn build_tree(&mut self) -> Result<i32> {
        let partitions = self.config.parallelism;
        let per_axis = self.config.sectors_per_axis();

        self.boundary = Boundary::reduce(&self.bodies, partitions);
        bounds::assign_sectors(&mut self.bodies, &self.boundary, per_axis, partitions);
        self.collect_sector_members();

        if self.config.chunk_cap.is_none() {
            let needed = self
                .preflight()?
                .max(merge_node_count(per_axis))
                .max(1);
            if needed != self.chunk_cap {
                debug!("arena chunk capacity {} -> {}", self.chunk_cap, needed);
                self.chunk_cap = needed;
            }
        }
        self.arena.reset(self.chunk_cap);
        self.build_sector_trees()?;
        quadtree::merge_sectors(&mut self.arena, &self.boundary, per_axis)
    }

    fn collect_sector_members(&mut self) {
        for members in &mut self.sector_members {
            members.clear();
        }
        for (i, body) in self.bodies.iter().enumerate() {
            self.sector_members[body.sector as usize].push(i as u32);
        }
    }

    /// Runs the builder per sector into scratch storage to learn the exact
    /// chunk capacity this iteration needs.
    fn preflight(&self) -> Result<usize> {
        let per_axis = self.config.sectors_per_axis();
        let side = self.boundary.side() / per_axis as f64;
        let origin = self.boundary.min;
        let leaf_cap = self.config.leaf_cap;
        let bodies = &self.bodies;
        self.sector_members
            .par_iter()
            .enumerate()
            .map(|(sector, members)| -> Result<usize> {
                let mut pool = ScratchPool::default();
                let center = sector_center(origin, side, sector, per_axis);
                quadtree::build_sector(&mut pool, bodies, members, center, side, leaf_cap)?;
                Ok(pool.allocated())
            })
            .try_reduce(|| 0, |a, b| Ok(a.max(b)))
    }

    fn build_sector_trees(&mut self) -> Result<()> {
        let per_axis = self.config.sectors_per_axis();
        let side = self.boundary.side() / per_axis as f64;
        let origin = self.boundary.min;
        let cap = self.arena.chunk_cap;
        let sectors = self.arena.sectors;
        let leaf_cap = self.config.leaf_cap;
        let bodies = &self.bodies;
        let members = &self.sector_members;
        self.arena.nodes[..sectors * cap]
            .par_chunks_mut(cap)
            .enumerate()
            .try_for_each(|(sector, chunk)| {
                let mut pool = ChunkPool::new(chunk, sector * cap, sector);
                let center = sector_center(origin, side, sector, per_axis);
                quadtree::build_sector(&mut pool, bodies, &members[sector], center, side, leaf_cap)
                    .map(|_| ())
            })
    }

    /// Force and integration in one sweep: parallel over equal body
    /// ranges, every task reading the finished tree and writing only its
    /// own bodies. Each body's accumulator is rebuilt from zero before the
    /// integrator consumes it.
    fn apply_forces(&mut self, root: i32) -> Result<()> {
        let nodes = &self.arena.nodes;
        let (g, theta, epsilon, dt) = (
            self.config.gravity,
            self.config.theta,
            self.config.epsilon,
            self.config.dt,
        );
        let chunk = self.bodies.len().div_ceil(self.config.parallelism);
        self.bodies
            .par_chunks_mut(chunk)
            .try_for_each(|range| -> Result<()> {
                for body in range {
                    body.force = quadtree::accumulate_force(nodes, root, body, g, theta, epsilon)?;
                    body.integrate(dt);
                }
                Ok(())
            })
    }
}

fn sector_center(origin: DVec2, side: f64, sector: usize, per_axis: usize) -> DVec2 {
    let sx = (sector % per_axis) as f64;
    let sy = (sector / per_axis) as f64;
    DVec2::new(origin.x + (sx + 0.5) * side, origin.y + (sy + 0.5) * side)
}
