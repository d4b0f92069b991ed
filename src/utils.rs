use std::f64::consts::TAU;

use ultraviolet::DVec2;

use crate::body::Body;
use crate::config::SimConfig;

/// Generates the initial condition: a small galaxy around the origin and a
/// larger one approaching from (-1800, -1200). Each galaxy is a heavy
/// central body plus a disc of unit-order bodies on circular orbits.
pub fn spawn_galaxies(config: &SimConfig) -> Vec<Body> {
    let mut rng = fastrand::Rng::with_seed(config.seed);
    let num1 = config.num_bodies / 8;
    let num2 = config.num_bodies - num1;

    let mut bodies = Vec::with_capacity(config.num_bodies);
    spawn_galaxy(
        &mut bodies,
        &mut rng,
        num1,
        DVec2::zero(),
        300.0,
        1,
        config.gravity,
    );
    spawn_galaxy(
        &mut bodies,
        &mut rng,
        num2,
        DVec2::new(-1800.0, -1200.0),
        350.0,
        2,
        config.gravity,
    );
    for (i, body) in bodies.iter_mut().enumerate() {
        body.index = i as u32;
    }
    bodies
}

fn spawn_galaxy(
    out: &mut Vec<Body>,
    rng: &mut fastrand::Rng,
    population: usize,
    center: DVec2,
    disc_radius: f64,
    color: u8,
    g: f64,
) {
    if population == 0 {
        return;
    }
    // the central body carries the galaxy's aggregate mass
    out.push(Body::new(center, DVec2::zero(), population as f64, 0));

    let n = population as f64;
    for _ in 1..population {
        let angle = rng.f64() * TAU;
        let u = rng.f64();
        let radius = 25.0 + disc_radius * u;
        // circular-orbit speed against the central mass plus the disc
        // mass enclosed at this radius
        let speed =
            (g * n / radius + g * 1.5 * n * radius * radius / disc_radius.powi(3)).sqrt();
        let pos = center + DVec2::new(angle.cos(), angle.sin()) * radius;
        let vel = DVec2::new(-angle.sin(), angle.cos()) * speed;
        out.push(Body::new(pos, vel, 1.0 + u, color));
    }
}

/// Kinetic plus pairwise potential energy; coincident pairs are skipped.
/// O(n^2): meant for diagnostics and tests, not the hot path.
pub fn total_energy(bodies: &[Body], g: f64) -> f64 {
    let kinetic: f64 = bodies.iter().map(|b| 0.5 * b.mass * b.vel.mag_sq()).sum();
    let mut potential = 0.0;
    for i in 0..bodies.len() {
        for j in (i + 1)..bodies.len() {
            let d = (bodies[j].pos - bodies[i].pos).mag();
            if d > 0.0 {
                potential -= g * bodies[i].mass * bodies[j].mass / d;
            }
        }
    }
    kinetic + potential
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generator_is_deterministic_and_indexed() {
        let config = SimConfig {
            num_bodies: 64,
            ..SimConfig::default()
        };
        let a = spawn_galaxies(&config);
        let b = spawn_galaxies(&config);
        assert_eq!(a.len(), 64);
        for (x, y) in a.iter().zip(&b) {
            assert_eq!(x.pos, y.pos);
            assert_eq!(x.vel, y.vel);
            assert_eq!(x.mass, y.mass);
        }
        for (i, body) in a.iter().enumerate() {
            assert_eq!(body.index, i as u32);
        }
    }

    #[test]
    fn central_bodies_carry_the_population_mass() {
        let config = SimConfig {
            num_bodies: 64,
            ..SimConfig::default()
        };
        let bodies = spawn_galaxies(&config);
        let num1 = 64 / 8;
        assert_eq!(bodies[0].mass, num1 as f64);
        assert_eq!(bodies[0].color, 0);
        assert_eq!(bodies[0].pos, DVec2::zero());
        assert_eq!(bodies[num1].mass, (64 - num1) as f64);
        assert_eq!(bodies[num1].pos, DVec2::new(-1800.0, -1200.0));

        let blue = bodies.iter().filter(|b| b.color == 1).count();
        let orange = bodies.iter().filter(|b| b.color == 2).count();
        assert_eq!(blue, num1 - 1);
        assert_eq!(orange, 64 - num1 - 1);
    }

    #[test]
    fn disc_bodies_orbit_between_inner_and_outer_radius() {
        let config = SimConfig {
            num_bodies: 128,
            ..SimConfig::default()
        };
        let bodies = spawn_galaxies(&config);
        let num1 = 128 / 8;
        for body in &bodies[1..num1] {
            let r = body.pos.mag();
            assert!(r >= 25.0 && r <= 25.0 + 300.0);
            // tangential: velocity is orthogonal to the radius vector
            assert!(body.pos.dot(body.vel).abs() < 1e-6 * r * body.vel.mag());
        }
    }
}
