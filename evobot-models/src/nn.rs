//! Defines a fully connected feed-forward network for controller genomes.
//!
//! The network owns only the topology: layer sizes and activations.  The
//! weight and bias tensors live in the controllers and are handed back for
//! every prediction, so a single network value serves an entire population.

use std::error::Error;
use std::f32::consts::E;
use std::fmt;
use std::fs::File;
use std::io;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use rand::distributions::{Distribution, Uniform};
use rand_xorshift::XorShiftRng;

use evobot_core::model::{Matrix, Model};

#[derive(Serialize, Deserialize, Clone, Debug, Copy, PartialEq)]
/// Defines the different activation functions between layers
pub enum Activation {
    /// ReLu
    ReLu,
    /// Tanh
    Tanh,
    /// Sigmoid
    Sigmoid,
    /// Linear. Note this isn't non-linear
    Linear,
}

impl Activation {
    #[inline]
    /// Applies the specified function
    fn eval(&self, f: f32) -> f32 {
        use self::Activation::*;
        match self {
            &ReLu => f.max(0f32),
            &Tanh => f.tanh(),
            &Sigmoid => 1. / (1. + E.powf(-f)),
            &Linear => f,
        }
    }

    /// Name written into persisted genomes.
    pub fn name(&self) -> &'static str {
        match self {
            Activation::ReLu => "relu",
            Activation::Tanh => "tanh",
            Activation::Sigmoid => "sigmoid",
            Activation::Linear => "linear",
        }
    }

    /// Parses a persisted activation name.
    pub fn parse(raw: &str) -> Result<Activation, ModelError> {
        match raw {
            "relu" => Ok(Activation::ReLu),
            "tanh" => Ok(Activation::Tanh),
            "sigmoid" => Ok(Activation::Sigmoid),
            "linear" => Ok(Activation::Linear),
            _ => Err(ModelError::Parse(format!(
                "unknown activation \"{}\"",
                raw
            ))),
        }
    }
}

#[derive(Clone, Debug)]
struct LayerSpec {
    inputs: usize,
    outputs: usize,
    activation: Activation,
}

/// Topology of a fully connected network: layer sizes and activations.
#[derive(Clone, Debug)]
pub struct NeuralNet {
    input_len: usize,
    layers: Vec<LayerSpec>,
}

impl NeuralNet {
    /// A network reading `input_len` sensor values and no layers yet.
    pub fn new(input_len: usize) -> NeuralNet {
        assert!(input_len > 0);
        NeuralNet {
            input_len,
            layers: Vec::new(),
        }
    }

    /// Appends a fully connected layer of `outputs` units.
    pub fn layer(mut self, outputs: usize, activation: Activation) -> NeuralNet {
        assert!(outputs > 0);
        let inputs = self.output_len();
        self.layers.push(LayerSpec {
            inputs,
            outputs,
            activation,
        });
        self
    }

    /// Width of the last layer (or the input when no layer was added).
    pub fn output_len(&self) -> usize {
        self.layers
            .last()
            .map(|layer| layer.outputs)
            .unwrap_or(self.input_len)
    }

    /// Number of sensor inputs.
    pub fn input_len(&self) -> usize {
        self.input_len
    }

    /// Number of layers.
    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    /// Runs the forward pass over caller-owned tensors.
    pub fn forward(&self, input: &[f32], weights: &[Matrix], biases: &[Vec<f32>]) -> Vec<f32> {
        debug_assert_eq!(weights.len(), self.layers.len());
        debug_assert_eq!(biases.len(), self.layers.len());
        let mut acc = input.to_vec();
        for (layer_idx, layer) in self.layers.iter().enumerate() {
            let w = &weights[layer_idx];
            let b = &biases[layer_idx];
            let mut out = Vec::with_capacity(layer.outputs);
            for (row, bias) in w.iter().zip(b.iter()) {
                out.push(layer.activation.eval(dot(row, &acc) + bias));
            }
            acc = out;
        }
        acc
    }
}

impl Model for NeuralNet {
    fn predict(&self, sensors: &[f32], weights: &[Matrix], biases: &[Vec<f32>]) -> (f32, f32) {
        let out = self.forward(sensors, weights, biases);
        assert!(
            out.len() >= 2,
            "the output layer must provide left and right motor commands"
        );
        (out[0], out[1])
    }

    fn random_weights(&self, limits: (f32, f32), rng: &mut XorShiftRng) -> Vec<Matrix> {
        let draw = Uniform::new_inclusive(limits.0, limits.1);
        self.layers
            .iter()
            .map(|layer| {
                (0..layer.outputs)
                    .map(|_| (0..layer.inputs).map(|_| draw.sample(rng)).collect())
                    .collect()
            })
            .collect()
    }

    fn random_biases(&self, limits: (f32, f32), rng: &mut XorShiftRng) -> Vec<Vec<f32>> {
        let draw = Uniform::new_inclusive(limits.0, limits.1);
        self.layers
            .iter()
            .map(|layer| (0..layer.outputs).map(|_| draw.sample(rng)).collect())
            .collect()
    }

    fn save_genome(
        &self,
        path: &Path,
        weights: &[Matrix],
        biases: &[Vec<f32>],
    ) -> io::Result<()> {
        let file = File::create(path)?;
        let mut out = BufWriter::new(file);
        writeln!(out, "{}", self.layers.len())?;
        for (layer_idx, layer) in self.layers.iter().enumerate() {
            let w = &weights[layer_idx];
            let b = &biases[layer_idx];
            writeln!(out, "{}", layer.activation.name())?;
            writeln!(out, "{} {}", w.len(), layer.inputs)?;
            for row in w.iter() {
                writeln!(out, "{}", join(row))?;
            }
            writeln!(out, "{}", b.len())?;
            writeln!(out, "{}", join(b))?;
        }
        out.flush()
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

fn join(values: &[f32]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<String>>()
        .join(" ")
}

#[derive(Debug)]
/// Error conditions while reading a persisted genome
pub enum ModelError {
    /// Error from the underlying reader
    Io(io::Error),
    /// Malformed genome layout
    Parse(String),
}

impl fmt::Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ModelError::Io(err) => write!(f, "i/o failure: {}", err),
            ModelError::Parse(msg) => write!(f, "malformed genome: {}", msg),
        }
    }
}

impl Error for ModelError {}

impl From<io::Error> for ModelError {
    fn from(err: io::Error) -> ModelError {
        ModelError::Io(err)
    }
}

/// Reads a genome persisted by [`Model::save_genome`], returning the
/// reconstructed topology and its tensors.
pub fn load_genome<R: BufRead>(
    reader: R,
) -> Result<(NeuralNet, Vec<Matrix>, Vec<Vec<f32>>), ModelError> {
    let mut lines = reader.lines();
    let layer_count: usize = parse_line(&mut lines, "layer count")?;

    let mut activations = Vec::with_capacity(layer_count);
    let mut weights = Vec::with_capacity(layer_count);
    let mut biases = Vec::with_capacity(layer_count);
    for _ in 0..layer_count {
        let activation = Activation::parse(next_line(&mut lines, "activation")?.trim())?;

        let shape = next_line(&mut lines, "weight shape")?;
        let dims = parse_row::<usize>(&shape)?;
        if dims.len() != 2 {
            return Err(ModelError::Parse(format!(
                "weight shape needs two dimensions, got \"{}\"",
                shape.trim()
            )));
        }
        let (rows, cols) = (dims[0], dims[1]);
        let mut matrix = Vec::with_capacity(rows);
        for _ in 0..rows {
            let row = parse_row::<f32>(&next_line(&mut lines, "weight row")?)?;
            if row.len() != cols {
                return Err(ModelError::Parse(format!(
                    "weight row holds {} values, expected {}",
                    row.len(),
                    cols
                )));
            }
            matrix.push(row);
        }

        let len: usize = parse_line(&mut lines, "bias shape")?;
        let bias = parse_row::<f32>(&next_line(&mut lines, "bias values")?)?;
        if bias.len() != len || len != rows {
            return Err(ModelError::Parse(format!(
                "bias holds {} values, expected {}",
                bias.len(),
                rows
            )));
        }

        activations.push(activation);
        weights.push(matrix);
        biases.push(bias);
    }

    let input_len = weights
        .first()
        .map(|matrix| matrix[0].len())
        .ok_or_else(|| ModelError::Parse("genome holds no layers".to_string()))?;
    let mut net = NeuralNet::new(input_len);
    for (matrix, activation) in weights.iter().zip(activations.into_iter()) {
        net = net.layer(matrix.len(), activation);
    }
    Ok((net, weights, biases))
}

/// Reads a persisted genome from a file path.
pub fn load_genome_file(
    path: &Path,
) -> Result<(NeuralNet, Vec<Matrix>, Vec<Vec<f32>>), ModelError> {
    let file = File::open(path)?;
    load_genome(BufReader::new(file))
}

fn next_line<B: BufRead>(
    lines: &mut io::Lines<B>,
    what: &str,
) -> Result<String, ModelError> {
    match lines.next() {
        Some(line) => Ok(line?),
        None => Err(ModelError::Parse(format!(
            "unexpected end of genome while reading {}",
            what
        ))),
    }
}

fn parse_line<B: BufRead, T: std::str::FromStr>(
    lines: &mut io::Lines<B>,
    what: &str,
) -> Result<T, ModelError> {
    let line = next_line(lines, what)?;
    line.trim()
        .parse()
        .map_err(|_| ModelError::Parse(format!("could not parse {} from \"{}\"", what, line)))
}

fn parse_row<T: std::str::FromStr>(line: &str) -> Result<Vec<T>, ModelError> {
    line.split_whitespace()
        .map(|piece| {
            piece
                .parse()
                .map_err(|_| ModelError::Parse(format!("could not parse value \"{}\"", piece)))
        })
        .collect()
}

#[cfg(test)]
mod test_nn {
    use super::*;
    use rand::SeedableRng;

    fn toy_net() -> NeuralNet {
        NeuralNet::new(2)
            .layer(2, Activation::ReLu)
            .layer(2, Activation::Linear)
    }

    #[test]
    fn test_forward_by_hand() {
        let net = toy_net();
        let weights = vec![
            vec![vec![1.0, 0.0], vec![0.0, -1.0]],
            vec![vec![1.0, 1.0], vec![0.5, 0.0]],
        ];
        let biases = vec![vec![0.0, 0.0], vec![0.1, -0.1]];

        // layer 1: relu([3, -4]) = [3, 0]; layer 2: [3 + 0.1, 1.5 - 0.1]
        let out = net.forward(&[3.0, 4.0], &weights, &biases);
        assert_eq!(out.len(), 2);
        assert!((out[0] - 3.1).abs() < 1e-6);
        assert!((out[1] - 1.4).abs() < 1e-6);

        let (left, right) = net.predict(&[3.0, 4.0], &weights, &biases);
        assert!((left - 3.1).abs() < 1e-6);
        assert!((right - 1.4).abs() < 1e-6);
    }

    #[test]
    fn test_activations() {
        assert_eq!(Activation::ReLu.eval(-2.0), 0.0);
        assert_eq!(Activation::ReLu.eval(2.0), 2.0);
        assert!((Activation::Sigmoid.eval(0.0) - 0.5).abs() < 1e-6);
        assert!((Activation::Tanh.eval(0.0)).abs() < 1e-6);
        assert_eq!(Activation::Linear.eval(-7.5), -7.5);
        for activation in &[
            Activation::ReLu,
            Activation::Tanh,
            Activation::Sigmoid,
            Activation::Linear,
        ] {
            assert_eq!(Activation::parse(activation.name()).unwrap(), *activation);
        }
        assert!(Activation::parse("softmax").is_err());
    }

    #[test]
    fn test_random_tensor_shapes_and_limits() {
        let mut rng = XorShiftRng::seed_from_u64(7);
        let net = NeuralNet::new(8)
            .layer(5, Activation::ReLu)
            .layer(2, Activation::Tanh);
        let weights = net.random_weights((-0.5, 0.5), &mut rng);
        let biases = net.random_biases((-0.5, 0.5), &mut rng);

        assert_eq!(weights.len(), 2);
        assert_eq!(weights[0].len(), 5);
        assert_eq!(weights[0][0].len(), 8);
        assert_eq!(weights[1].len(), 2);
        assert_eq!(weights[1][0].len(), 5);
        assert_eq!(biases[0].len(), 5);
        assert_eq!(biases[1].len(), 2);
        for value in weights.iter().flatten().flatten() {
            assert!(*value >= -0.5 && *value <= 0.5);
        }
    }

    #[test]
    fn test_genome_round_trip() {
        let mut rng = XorShiftRng::seed_from_u64(19);
        let net = NeuralNet::new(3)
            .layer(4, Activation::ReLu)
            .layer(2, Activation::Tanh);
        let weights = net.random_weights((-1.0, 1.0), &mut rng);
        let biases = net.random_biases((-1.0, 1.0), &mut rng);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("genome.nn");
        net.save_genome(&path, &weights, &biases).unwrap();

        let (reloaded, loaded_weights, loaded_biases) = load_genome_file(&path).unwrap();
        assert_eq!(reloaded.num_layers(), 2);
        assert_eq!(reloaded.input_len(), 3);
        assert_eq!(reloaded.output_len(), 2);

        assert_eq!(loaded_weights.len(), weights.len());
        for (layer, reference) in loaded_weights.iter().zip(weights.iter()) {
            for (row, reference_row) in layer.iter().zip(reference.iter()) {
                for (value, reference_value) in row.iter().zip(reference_row.iter()) {
                    assert!((value - reference_value).abs() < 1e-6);
                }
            }
        }
        for (bias, reference) in loaded_biases.iter().zip(biases.iter()) {
            for (value, reference_value) in bias.iter().zip(reference.iter()) {
                assert!((value - reference_value).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn test_malformed_genomes_are_rejected() {
        use std::io::Cursor;
        // truncated file
        assert!(load_genome(Cursor::new("2\nrelu\n2 2\n")).is_err());
        // bad activation
        assert!(load_genome(Cursor::new("1\nsoftmax\n1 1\n0.5\n1\n0.1\n")).is_err());
        // row width mismatch
        assert!(load_genome(Cursor::new("1\nrelu\n1 2\n0.5\n1\n0.1\n")).is_err());
    }
}
