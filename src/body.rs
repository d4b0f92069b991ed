use ultraviolet::DVec2;

/// A single simulated body.
#[derive(Clone, Copy, Debug)]
pub struct Body {
    /// Position.
    pub pos: DVec2,
    /// Velocity.
    pub vel: DVec2,
    /// Force accumulated over the current iteration.
    pub force: DVec2,
    /// Mass.
    pub mass: f64,
    /// Sector on the S x S grid, rewritten every iteration.
    pub sector: u32,
    /// Colour tag used by the frame writer.
    pub color: u8,
    /// Stable identifier, unique per body, assigned at init. Suppresses
    /// self-interaction inside a leaf bucket.
    pub index: u32,
}

impl Body {
    pub fn new(pos: DVec2, vel: DVec2, mass: f64, color: u8) -> Self {
        Self {
            pos,
            vel,
            force: DVec2::zero(),
            mass,
            sector: 0,
            color,
            index: 0,
        }
    }

    /// Semi-implicit Euler update: the velocity absorbs the freshly
    /// accumulated force, then the position moves with the updated
    /// velocity. The ordering keeps long-run energy drift bounded and is
    /// fixed.
    pub fn integrate(&mut self, dt: f64) {
        self.vel += self.force / self.mass * dt;
        self.pos += self.vel * dt;
    }
}
