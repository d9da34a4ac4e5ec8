//! Simulation oracle contract
//! ---
//!
//! The physics engine driving the robots is an external collaborator.  The
//! engine talks to it through [`Simulation`]: one value per world instance,
//! created by the implementing crate, cloned with [`Simulation::snapshot`]
//! and released on drop.  Cloned instances share no mutable state with their
//! source.  Operations that need a controlled robot return `None` (after a
//! `log` warning) until [`Simulation::bind_robot`] has been called; callers
//! tolerate the nullable result and skip the requested action.
//!
//! [`SimPool`] owns the instances used during evolution: one pristine
//! initial world, one default world per sampled starting position, and a
//! grid of working copies (one row per controller slot).  Starting-position
//! policies reshape the defaults; every epoch begins by restoring all
//! working copies from them.

use rand::distributions::{Distribution, Uniform};
use rand::SeedableRng;
use rand_xorshift::XorShiftRng;

/// Ticks driven through the physics when a default position advances.
const ADVANCE_TICKS: u32 = 10;

/// One simulated world holding the robot a controller drives.
pub trait Simulation: Send {
    /// Binds the robot the controller commands.
    fn bind_robot(&mut self, robot_id: u32);

    /// Commands the bound robot's wheel speeds.  Warns and no-ops when no
    /// robot is bound.
    fn set_speed(&mut self, left: f64, right: f64);

    /// Advances the world by `ticks` simulation steps.
    fn step(&mut self, ticks: u32);

    /// Current sensor readings of the bound robot, or `None` when no robot
    /// is bound.
    fn sensors(&mut self) -> Option<&[f32]>;

    /// Current `(x, y)` position of the bound robot, or `None` when no
    /// robot is bound.
    fn position(&self) -> Option<(i32, i32)>;

    /// Teleports the bound robot to a random pose.
    fn move_robot_random(&mut self, rng: &mut XorShiftRng);

    /// Clones the world.  The copy shares no mutable state with `self`.
    fn snapshot(&self) -> Self
    where
        Self: Sized;

    /// Rewinds the world to the state captured by `source`.
    fn restore(&mut self, source: &Self)
    where
        Self: Sized;
}

/// Simulation instances for one evolutionary run.
///
/// Holds `slots` rows of `positions` working instances each; controller `i`
/// evaluates against row `i`, scoring once per starting position.
pub struct SimPool<S: Simulation> {
    initial: S,
    defaults: Vec<S>,
    slots: Vec<Vec<S>>,
    rng: XorShiftRng,
}

impl<S: Simulation> SimPool<S> {
    /// Builds a pool of `slots * positions` copies of `initial`.
    ///
    /// `initial` must already have its robot bound.
    pub fn new(initial: S, slots: usize, positions: usize, seed: u64) -> SimPool<S> {
        assert!(positions > 0, "need at least one starting position");
        let defaults: Vec<S> = (0..positions).map(|_| initial.snapshot()).collect();
        let slots = (0..slots)
            .map(|_| defaults.iter().map(|d| d.snapshot()).collect())
            .collect();
        SimPool {
            initial,
            defaults,
            slots,
            rng: XorShiftRng::seed_from_u64(seed),
        }
    }

    /// Number of controller slots.
    pub fn num_slots(&self) -> usize {
        self.slots.len()
    }

    /// Number of starting positions sampled per controller.
    pub fn positions(&self) -> usize {
        self.defaults.len()
    }

    /// The pristine world the pool was built from.
    pub fn initial(&self) -> &S {
        &self.initial
    }

    /// Working instances, one row per controller slot.
    pub fn slots_mut(&mut self) -> &mut [Vec<S>] {
        &mut self.slots
    }

    /// Robot position of the first default world, for reporting.
    pub fn default_position(&self) -> Option<(i32, i32)> {
        self.defaults.first().and_then(|d| d.position())
    }

    /// Redraws every default starting position at random.
    pub fn shuffle_defaults(&mut self) {
        for default in self.defaults.iter_mut() {
            default.restore(&self.initial);
            default.move_robot_random(&mut self.rng);
        }
    }

    /// Drifts every default position by driving the robot `step` wheel units
    /// (individually jittered by up to `noise`) through the physics.
    pub fn advance_defaults(&mut self, step: f64, noise: f64) {
        let jitter = Uniform::new_inclusive(-noise.abs(), noise.abs());
        for default in self.defaults.iter_mut() {
            let left = step + jitter.sample(&mut self.rng);
            let right = step + jitter.sample(&mut self.rng);
            default.set_speed(left, right);
            default.step(ADVANCE_TICKS);
            default.set_speed(0.0, 0.0);
        }
    }

    /// Restores every working instance from its default.
    pub fn reset_to_defaults(&mut self) {
        for row in self.slots.iter_mut() {
            for (sim, default) in row.iter_mut().zip(self.defaults.iter()) {
                sim.restore(default);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::MockSim;

    fn pool() -> SimPool<MockSim> {
        let mut initial = MockSim::new(vec![0.5; 8]);
        initial.bind_robot(0);
        SimPool::new(initial, 4, 2, 7)
    }

    #[test]
    fn test_pool_shape() {
        let mut pool = pool();
        assert_eq!(pool.num_slots(), 4);
        assert_eq!(pool.positions(), 2);
        for row in pool.slots_mut() {
            assert_eq!(row.len(), 2);
        }
    }

    #[test]
    fn test_reset_to_defaults() {
        let mut pool = pool();
        pool.slots_mut()[0][0].step(50);
        pool.slots_mut()[0][0].set_speed(3.0, -3.0);
        pool.reset_to_defaults();
        assert_eq!(pool.slots_mut()[0][0].steps, 0);
        assert_eq!(pool.slots_mut()[0][0].last_speed, (0.0, 0.0));
    }

    #[test]
    fn test_shuffle_defaults_moves_robot() {
        let mut pool = pool();
        let before = pool.default_position().unwrap();
        pool.shuffle_defaults();
        pool.reset_to_defaults();
        let after = pool.default_position().unwrap();
        // MockSim teleports to a random grid cell away from the origin
        assert_ne!(before, after);
        assert_eq!(pool.slots_mut()[0][0].pos, after);
    }

    #[test]
    fn test_advance_defaults_steps_physics() {
        let mut pool = pool();
        pool.advance_defaults(2.0, 0.5);
        pool.reset_to_defaults();
        assert_eq!(pool.slots_mut()[0][0].steps, ADVANCE_TICKS);
    }
}
