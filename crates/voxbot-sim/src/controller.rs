//! Controllers map a sensor vector to an actuation vector once per tick.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SimError};

/// Shared interface implemented by every controller.
pub trait Controller {
    /// Expected input length, or `None` for open-loop controllers that ignore
    /// their inputs.
    fn input_dim(&self) -> Option<usize>;

    /// Length of every output vector.
    fn output_dim(&self) -> usize;

    /// Evaluate the controller at simulated time `t`.
    fn control(&mut self, t: f64, inputs: &[f64]) -> Result<Vec<f64>>;
}

/// Open-loop sinusoids, one per output: `amplitude * sin(2π f t + phase)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseSinController {
    /// Oscillation frequency in Hz.
    pub frequency: f64,
    /// Peak output.
    pub amplitude: f64,
    /// Per-output phase offset in radians.
    pub phases: Vec<f64>,
}

impl Controller for PhaseSinController {
    fn input_dim(&self) -> Option<usize> {
        None
    }

    fn output_dim(&self) -> usize {
        self.phases.len()
    }

    fn control(&mut self, t: f64, _inputs: &[f64]) -> Result<Vec<f64>> {
        let omega = 2.0 * std::f64::consts::PI * self.frequency;
        Ok(self
            .phases
            .iter()
            .map(|phase| self.amplitude * (omega * t + phase).sin())
            .collect())
    }
}

/// Fixed outputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstantController {
    /// Value returned on every call.
    pub values: Vec<f64>,
}

impl Controller for ConstantController {
    fn input_dim(&self) -> Option<usize> {
        None
    }

    fn output_dim(&self) -> usize {
        self.values.len()
    }

    fn control(&mut self, _t: f64, _inputs: &[f64]) -> Result<Vec<f64>> {
        Ok(self.values.clone())
    }
}

/// Fully connected feed-forward network with `tanh` activations on every layer.
///
/// Weights are stored flat, layer after layer; within a layer each output
/// neuron owns `inputs + 1` consecutive weights, the last one being its bias.
#[derive(Debug, Clone, PartialEq)]
pub struct MlpController {
    layers: Vec<usize>,
    weights: Vec<f64>,
}

impl MlpController {
    /// Build a network with layer sizes `layers` (input first, output last).
    pub fn new(layers: Vec<usize>, weights: Vec<f64>) -> Result<Self> {
        if layers.len() < 2 || layers.contains(&0) {
            return Err(SimError::InvalidConfig(format!(
                "mlp needs at least two non-empty layers, got {layers:?}"
            )));
        }
        let expected = Self::parameter_count(&layers);
        if weights.len() != expected {
            return Err(SimError::DimensionMismatch {
                what: "mlp weights",
                expected,
                actual: weights.len(),
            });
        }
        Ok(Self { layers, weights })
    }

    /// Number of weights a network with `layers` needs.
    pub fn parameter_count(layers: &[usize]) -> usize {
        layers.windows(2).map(|w| (w[0] + 1) * w[1]).sum()
    }

    /// Layer sizes.
    pub fn layers(&self) -> &[usize] {
        &self.layers
    }
}

impl Controller for MlpController {
    fn input_dim(&self) -> Option<usize> {
        self.layers.first().copied()
    }

    fn output_dim(&self) -> usize {
        self.layers.last().copied().unwrap_or(0)
    }

    fn control(&mut self, _t: f64, inputs: &[f64]) -> Result<Vec<f64>> {
        let expected = self.layers[0];
        if inputs.len() != expected {
            return Err(SimError::DimensionMismatch {
                what: "controller input",
                expected,
                actual: inputs.len(),
            });
        }
        let mut activations = inputs.to_vec();
        let mut offset = 0;
        for w in self.layers.windows(2) {
            let (n_in, n_out) = (w[0], w[1]);
            let mut next = Vec::with_capacity(n_out);
            for _ in 0..n_out {
                let row = &self.weights[offset..offset + n_in + 1];
                let sum: f64 = row[..n_in].iter().zip(&activations).map(|(w, x)| w * x).sum();
                next.push((sum + row[n_in]).tanh());
                offset += n_in + 1;
            }
            activations = next;
        }
        Ok(activations)
    }
}

/// Serializable controller description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ControllerSpec {
    /// See [`PhaseSinController`].
    PhaseSin {
        /// Frequency in Hz.
        frequency: f64,
        /// Peak output.
        amplitude: f64,
        /// Per-output phase offsets.
        phases: Vec<f64>,
    },
    /// See [`MlpController`].
    Mlp {
        /// Layer sizes, input first.
        layers: Vec<usize>,
        /// Flat weights.
        weights: Vec<f64>,
    },
    /// See [`ConstantController`].
    Constant {
        /// Fixed outputs.
        values: Vec<f64>,
    },
}

impl ControllerSpec {
    /// Instantiate the described controller.
    pub fn into_controller(self) -> Result<Box<dyn Controller>> {
        Ok(match self {
            ControllerSpec::PhaseSin {
                frequency,
                amplitude,
                phases,
            } => Box::new(PhaseSinController {
                frequency,
                amplitude,
                phases,
            }),
            ControllerSpec::Mlp { layers, weights } => Box::new(MlpController::new(layers, weights)?),
            ControllerSpec::Constant { values } => Box::new(ConstantController { values }),
        })
    }
}
