//! Fitness functions
//! ---
//!
//! Per-cycle scoring functions of `(post-step sensors, left, right)`.  All
//! of them stay in `[0, 1]` so roulette-wheel selection keeps a positive
//! fitness mass.

/// Rewards fast, straight motion away from obstacles: mean absolute wheel
/// speed, damped by the square root of the speed differential and by the
/// strongest proximity reading.  Motor commands are expected in `[-1, 1]`.
pub fn avoid_collision(sensors: &[f32], left: f32, right: f32) -> f32 {
    let speed = (left.abs() + right.abs()) / 2.0;
    let straight = 1.0 - ((left - right).abs() / 2.0).sqrt();
    let proximity = sensors.iter().cloned().fold(0f32, f32::max);
    speed * straight * (1.0 - proximity)
}

/// Rewards raw forward speed, ignoring the surroundings.
pub fn keep_moving(_sensors: &[f32], left: f32, right: f32) -> f32 {
    ((left + right) / 2.0).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_avoid_collision_peaks_when_fast_straight_and_clear() {
        let clear = vec![0.0; 8];
        assert!((avoid_collision(&clear, 1.0, 1.0) - 1.0).abs() < 1e-6);
        // slower is worse
        assert!(avoid_collision(&clear, 0.5, 0.5) < 1.0);
        // spinning is worse than driving straight
        assert!(avoid_collision(&clear, 1.0, -1.0) < avoid_collision(&clear, 1.0, 1.0));
        // a wall at touching distance zeroes the score
        let blocked = vec![1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0];
        assert_eq!(avoid_collision(&blocked, 1.0, 1.0), 0.0);
    }

    #[test]
    fn test_avoid_collision_is_bounded() {
        let sensors = vec![0.3; 8];
        for &(l, r) in &[(1.0, 1.0), (-1.0, 1.0), (0.2, -0.7), (0.0, 0.0)] {
            let score = avoid_collision(&sensors, l, r);
            assert!(score >= 0.0 && score <= 1.0);
        }
    }

    #[test]
    fn test_keep_moving_clamps_reverse() {
        assert_eq!(keep_moving(&[], -1.0, -1.0), 0.0);
        assert_eq!(keep_moving(&[], 0.6, 0.2), 0.4);
    }
}
