//! A rectangular walled arena with one differential-drive robot.
//!
//! Geometry is measured in millimeters.  Eight proximity sensors are mounted
//! around the body, six forward and two rear, each reporting an activation
//! in `[0, 1]` that rises as the nearest wall along its ray gets closer.

use std::f64::consts::PI;

use log::warn;
use rand::distributions::{Distribution, Uniform};
use rand_xorshift::XorShiftRng;

use evobot_core::sim::Simulation;

/// Sensor mounting angles, radians counter-clockwise from the heading.
const SENSOR_ANGLES: [f64; 8] = [
    -PI / 2.0,
    -PI / 4.0,
    -PI / 18.0,
    PI / 18.0,
    PI / 4.0,
    PI / 2.0,
    PI - PI / 12.0,
    -(PI - PI / 12.0),
];

/// Distance at which a sensor starts responding.
const SENSOR_RANGE: f64 = 100.0;
/// Body radius; walls are sensed and hit from the body edge.
const ROBOT_RADIUS: f64 = 25.0;
/// Wheel separation.
const AXLE_LENGTH: f64 = 52.0;
/// Millimeters travelled per tick per wheel-speed unit.
const SPEED_SCALE: f64 = 0.8;

/// One arena world implementing the simulation contract.
#[derive(Clone, Debug)]
pub struct ArenaSim {
    width: f64,
    height: f64,
    x: f64,
    y: f64,
    heading: f64,
    left: f64,
    right: f64,
    robot_id: Option<u32>,
    sensor_cache: Option<Vec<f32>>,
}

impl ArenaSim {
    /// A walled arena of the given size with the robot parked at its center.
    pub fn new(width: f64, height: f64) -> ArenaSim {
        assert!(width > 4.0 * ROBOT_RADIUS && height > 4.0 * ROBOT_RADIUS);
        ArenaSim {
            width,
            height,
            x: width / 2.0,
            y: height / 2.0,
            heading: 0.0,
            left: 0.0,
            right: 0.0,
            robot_id: None,
            sensor_cache: None,
        }
    }

    fn bound(&self) -> bool {
        self.robot_id.is_some()
    }

    fn warn_unbound() {
        warn!("no robot to control; call bind_robot first");
    }

    /// Distance from the body edge to the nearest wall along the ray.
    fn wall_distance(&self, angle: f64) -> f64 {
        let (dx, dy) = (angle.cos(), angle.sin());
        let mut distance = std::f64::INFINITY;
        if dx > 1e-9 {
            distance = distance.min((self.width - ROBOT_RADIUS - self.x) / dx);
        }
        if dx < -1e-9 {
            distance = distance.min((ROBOT_RADIUS - self.x) / dx);
        }
        if dy > 1e-9 {
            distance = distance.min((self.height - ROBOT_RADIUS - self.y) / dy);
        }
        if dy < -1e-9 {
            distance = distance.min((ROBOT_RADIUS - self.y) / dy);
        }
        distance.max(0.0)
    }

    fn compute_sensors(&self) -> Vec<f32> {
        SENSOR_ANGLES
            .iter()
            .map(|offset| {
                let distance = self.wall_distance(self.heading + offset);
                (1.0 - (distance / SENSOR_RANGE).min(1.0)) as f32
            })
            .collect()
    }

    fn tick(&mut self) {
        let forward = (self.left + self.right) / 2.0 * SPEED_SCALE;
        let turn = (self.right - self.left) * SPEED_SCALE / AXLE_LENGTH;
        self.heading = wrap_angle(self.heading + turn);
        self.x = (self.x + forward * self.heading.cos())
            .max(ROBOT_RADIUS)
            .min(self.width - ROBOT_RADIUS);
        self.y = (self.y + forward * self.heading.sin())
            .max(ROBOT_RADIUS)
            .min(self.height - ROBOT_RADIUS);
    }
}

impl Default for ArenaSim {
    fn default() -> ArenaSim {
        ArenaSim::new(1000.0, 1000.0)
    }
}

impl Simulation for ArenaSim {
    fn bind_robot(&mut self, robot_id: u32) {
        self.robot_id = Some(robot_id);
        self.sensor_cache = None;
    }

    fn set_speed(&mut self, left: f64, right: f64) {
        if !self.bound() {
            ArenaSim::warn_unbound();
            return;
        }
        self.left = left;
        self.right = right;
    }

    fn step(&mut self, ticks: u32) {
        for _ in 0..ticks {
            self.tick();
        }
        self.sensor_cache = None;
    }

    fn sensors(&mut self) -> Option<&[f32]> {
        if !self.bound() {
            ArenaSim::warn_unbound();
            return None;
        }
        if self.sensor_cache.is_none() {
            self.sensor_cache = Some(self.compute_sensors());
        }
        self.sensor_cache.as_ref().map(|values| values.as_slice())
    }

    fn position(&self) -> Option<(i32, i32)> {
        if !self.bound() {
            ArenaSim::warn_unbound();
            return None;
        }
        Some((self.x as i32, self.y as i32))
    }

    fn move_robot_random(&mut self, rng: &mut XorShiftRng) {
        if !self.bound() {
            ArenaSim::warn_unbound();
            return;
        }
        let xs = Uniform::new(ROBOT_RADIUS, self.width - ROBOT_RADIUS);
        let ys = Uniform::new(ROBOT_RADIUS, self.height - ROBOT_RADIUS);
        let angles = Uniform::new(-PI, PI);
        self.x = xs.sample(rng);
        self.y = ys.sample(rng);
        self.heading = angles.sample(rng);
        self.sensor_cache = None;
    }

    fn snapshot(&self) -> ArenaSim {
        self.clone()
    }

    fn restore(&mut self, source: &ArenaSim) {
        *self = source.clone();
    }
}

fn wrap_angle(angle: f64) -> f64 {
    let mut wrapped = angle;
    while wrapped > PI {
        wrapped -= 2.0 * PI;
    }
    while wrapped < -PI {
        wrapped += 2.0 * PI;
    }
    wrapped
}
