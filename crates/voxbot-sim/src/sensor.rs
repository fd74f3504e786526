//! Voxel sensors.
//!
//! Stateless sensors read a [`Readings`] sample taken from the world. Touch and
//! near-field sensors are accumulate/read-and-clear state machines: the world
//! feeds them during the collision passes, the control step drains them.

use serde::{Deserialize, Serialize};
use voxbot_math::Vec3;

use crate::error::{Result, SimError};
use crate::signal::SIDES;

/// Sensor declaration, as it appears in a robot description.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SensorKind {
    /// 1.0 when the voxel touched another component since the last read.
    Touch,
    /// Relative volume change, `current / rest - 1`.
    Volume,
    /// Centroid velocity normalized by `max_speed`.
    Velocity {
        /// Speed mapped to ±1.
        max_speed: f64,
    },
    /// Signal sums per struck side, any channel.
    NearFieldSignal,
    /// Signal sums per channel, any side.
    NearFieldCommunication,
}

impl SensorKind {
    /// Number of values the sensor contributes to the input vector.
    pub fn dimension(&self) -> usize {
        match self {
            SensorKind::Touch | SensorKind::Volume => 1,
            SensorKind::Velocity { .. } => 3,
            SensorKind::NearFieldSignal | SensorKind::NearFieldCommunication => SIDES,
        }
    }

    /// Whether the sensor receives signal rays.
    pub fn detects_signals(&self) -> bool {
        matches!(
            self,
            SensorKind::NearFieldSignal | SensorKind::NearFieldCommunication
        )
    }

    /// Reject unusable ranges before any simulation starts.
    pub fn validate(&self) -> Result<()> {
        match *self {
            SensorKind::Velocity { max_speed } if !(max_speed > 0.0 && max_speed.is_finite()) => {
                Err(SimError::InvalidSensor(format!(
                    "velocity sensor max_speed must be positive, got {max_speed}"
                )))
            }
            _ => Ok(()),
        }
    }
}

/// Geometric sample of a voxel used by stateless sensors.
#[derive(Debug, Clone, Copy)]
pub struct Readings {
    /// `current_volume / rest_volume`.
    pub volume_ratio: f64,
    /// Centroid velocity.
    pub velocity: Vec3,
}

#[derive(Debug, Clone, PartialEq)]
enum State {
    Stateless,
    Touch(bool),
    Sums([f64; SIDES]),
}

/// A sensor instance attached to one voxel.
#[derive(Debug, Clone, PartialEq)]
pub struct Sensor {
    kind: SensorKind,
    state: State,
}

impl Sensor {
    /// Create a sensor with empty accumulators.
    pub fn new(kind: SensorKind) -> Result<Self> {
        kind.validate()?;
        let state = match kind {
            SensorKind::Touch => State::Touch(false),
            SensorKind::NearFieldSignal | SensorKind::NearFieldCommunication => {
                State::Sums([0.0; SIDES])
            }
            SensorKind::Volume | SensorKind::Velocity { .. } => State::Stateless,
        };
        Ok(Self { kind, state })
    }

    /// Declared kind.
    pub fn kind(&self) -> SensorKind {
        self.kind
    }

    /// Mark a contact with another component.
    pub fn touch(&mut self) {
        if let State::Touch(flag) = &mut self.state {
            *flag = true;
        }
    }

    /// Accumulate a signal that struck `side` on `channel`.
    pub fn receive(&mut self, side: usize, channel: u8, value: f64) {
        let slot = match self.kind {
            SensorKind::NearFieldSignal => side,
            SensorKind::NearFieldCommunication => usize::from(channel),
            _ => return,
        };
        if let State::Sums(sums) = &mut self.state {
            if let Some(sum) = sums.get_mut(slot) {
                *sum += value;
            }
        }
    }

    /// Append the current values to `out`, clearing any accumulator.
    pub fn read_into(&mut self, readings: &Readings, out: &mut Vec<f64>) {
        match (&self.kind, &mut self.state) {
            (SensorKind::Volume, _) => out.push((readings.volume_ratio - 1.0).clamp(-1.0, 1.0)),
            (SensorKind::Velocity { max_speed }, _) => {
                out.extend(readings.velocity.iter().map(|v| (v / max_speed).clamp(-1.0, 1.0)));
            }
            (_, State::Touch(flag)) => {
                out.push(if *flag { 1.0 } else { 0.0 });
                *flag = false;
            }
            (_, State::Sums(sums)) => {
                out.extend(sums.iter().map(|s| s.clamp(-1.0, 1.0)));
                *sums = [0.0; SIDES];
            }
            (_, State::Stateless) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn readings() -> Readings {
        Readings {
            volume_ratio: 1.2,
            velocity: Vec3::new(1.0, -4.0, 0.0),
        }
    }

    fn read(sensor: &mut Sensor) -> Vec<f64> {
        let mut out = Vec::new();
        sensor.read_into(&readings(), &mut out);
        out
    }

    #[test]
    fn test_signal_sums_clamp_and_reset() {
        let mut sensor = Sensor::new(SensorKind::NearFieldSignal).unwrap();
        sensor.receive(2, 0, 0.7);
        sensor.receive(2, 5, 0.6);
        sensor.receive(4, 1, -0.25);

        let first = read(&mut sensor);
        assert_eq!(first, vec![0.0, 0.0, 1.0, 0.0, -0.25, 0.0]);
        assert_eq!(read(&mut sensor), vec![0.0; SIDES]);
    }

    #[test]
    fn test_communication_indexed_by_channel() {
        let mut sensor = Sensor::new(SensorKind::NearFieldCommunication).unwrap();
        sensor.receive(0, 3, 0.5);
        sensor.receive(1, 3, 0.25);
        sensor.receive(1, 40, 0.25);
        assert_eq!(read(&mut sensor), vec![0.0, 0.0, 0.0, 0.75, 0.0, 0.0]);
    }

    #[test]
    fn test_touch_read_and_clear() {
        let mut sensor = Sensor::new(SensorKind::Touch).unwrap();
        sensor.touch();
        assert_eq!(read(&mut sensor), vec![1.0]);
        assert_eq!(read(&mut sensor), vec![0.0]);
    }

    #[test]
    fn test_stateless_sensors() {
        let mut volume = Sensor::new(SensorKind::Volume).unwrap();
        let v = read(&mut volume);
        assert!((v[0] - 0.2).abs() < 1e-12);

        let mut velocity = Sensor::new(SensorKind::Velocity { max_speed: 2.0 }).unwrap();
        assert_eq!(read(&mut velocity), vec![0.5, -1.0, 0.0]);
    }

    #[test]
    fn test_invalid_velocity_range() {
        assert!(matches!(
            Sensor::new(SensorKind::Velocity { max_speed: 0.0 }),
            Err(SimError::InvalidSensor(_))
        ));
    }

    #[test]
    fn test_dimensions() {
        assert_eq!(SensorKind::Touch.dimension(), 1);
        assert_eq!(SensorKind::Velocity { max_speed: 1.0 }.dimension(), 3);
        assert_eq!(SensorKind::NearFieldCommunication.dimension(), 6);
    }
}
