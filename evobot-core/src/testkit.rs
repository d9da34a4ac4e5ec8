//! Shared fixtures for engine tests.

use std::io;
use std::path::Path;

use rand::Rng;
use rand_xorshift::XorShiftRng;

use crate::controller::Controller;
use crate::model::{Matrix, Model};
use crate::sim::Simulation;

/// World stub with constant sensors and counters for every interaction.
#[derive(Clone, Debug)]
pub struct MockSim {
    pub sensor_values: Vec<f32>,
    pub bound: bool,
    pub steps: u32,
    pub last_speed: (f64, f64),
    pub pos: (i32, i32),
}

impl MockSim {
    pub fn new(sensor_values: Vec<f32>) -> MockSim {
        MockSim {
            sensor_values,
            bound: false,
            steps: 0,
            last_speed: (0.0, 0.0),
            pos: (0, 0),
        }
    }
}

impl Simulation for MockSim {
    fn bind_robot(&mut self, _robot_id: u32) {
        self.bound = true;
    }

    fn set_speed(&mut self, left: f64, right: f64) {
        if self.bound {
            self.last_speed = (left, right);
        }
    }

    fn step(&mut self, ticks: u32) {
        self.steps += ticks;
    }

    fn sensors(&mut self) -> Option<&[f32]> {
        if self.bound {
            Some(&self.sensor_values)
        } else {
            None
        }
    }

    fn position(&self) -> Option<(i32, i32)> {
        if self.bound {
            Some(self.pos)
        } else {
            None
        }
    }

    fn move_robot_random(&mut self, rng: &mut XorShiftRng) {
        self.pos = (rng.gen_range(1, 1000), rng.gen_range(1, 1000));
    }

    fn snapshot(&self) -> MockSim {
        self.clone()
    }

    fn restore(&mut self, source: &MockSim) {
        *self = source.clone();
    }
}

/// Model stub with a single 1x1 layer whose sole weight is echoed as both
/// motor commands, making fitness a pure function of the genome.
pub struct EchoModel;

impl Model for EchoModel {
    fn predict(&self, _sensors: &[f32], weights: &[Matrix], _biases: &[Vec<f32>]) -> (f32, f32) {
        let w = weights[0][0][0];
        (w, w)
    }

    fn random_weights(&self, limits: (f32, f32), rng: &mut XorShiftRng) -> Vec<Matrix> {
        vec![vec![vec![rng.gen_range(limits.0, limits.1)]]]
    }

    fn random_biases(&self, limits: (f32, f32), rng: &mut XorShiftRng) -> Vec<Vec<f32>> {
        vec![vec![rng.gen_range(limits.0, limits.1)]]
    }

    fn save_genome(
        &self,
        path: &Path,
        weights: &[Matrix],
        biases: &[Vec<f32>],
    ) -> io::Result<()> {
        use std::io::Write;
        let mut file = std::fs::File::create(path)?;
        writeln!(file, "{} {}", weights[0][0][0], biases[0][0])
    }
}

/// Builds a controller for [`EchoModel`] with the given scalar genome.
pub fn echo_controller(w: f32) -> Controller {
    Controller::new(vec![vec![vec![w]]], vec![vec![0.0]])
}

/// Fitness function returning the commanded left speed.
pub fn left_speed(_sensors: &[f32], left: f32, _right: f32) -> f32 {
    left
}
