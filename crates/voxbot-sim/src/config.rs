//! World configuration.

use serde::{Deserialize, Serialize};
use voxbot_math::Vec3;

use crate::error::{Result, SimError};

/// Terrain generator used to populate the static collision geometry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Terrain {
    /// A square slab whose top face lies at `z = 0`.
    Flat {
        /// Half of the slab's width along X and Y.
        half_size: f64,
    },
    /// Uphill stairs along +X, starting at `x = 0`, on top of a flat slab.
    Steps {
        /// Length of each step along X.
        step_length: f64,
        /// Rise of each step.
        step_height: f64,
        /// Number of steps.
        count: u32,
    },
}

impl Terrain {
    /// Height of the walkable surface at `(x, y)`.
    pub fn height_at(&self, x: f64, _y: f64) -> f64 {
        match *self {
            Terrain::Flat { .. } => 0.0,
            Terrain::Steps {
                step_length,
                step_height,
                count,
            } => {
                if x < 0.0 || step_length <= 0.0 {
                    return 0.0;
                }
                let index = ((x / step_length).floor() as u32 + 1).min(count);
                f64::from(index) * step_height
            }
        }
    }

    fn validate(&self) -> Result<()> {
        match *self {
            Terrain::Flat { half_size } if !(half_size > 0.0) => Err(SimError::InvalidConfig(
                format!("flat terrain half_size must be positive, got {half_size}"),
            )),
            Terrain::Steps {
                step_length,
                step_height,
                ..
            } if !(step_length > 0.0) || !(step_height >= 0.0) => {
                Err(SimError::InvalidConfig(format!(
                    "steps need positive length and non-negative height, got {step_length} x {step_height}"
                )))
            }
            _ => Ok(()),
        }
    }
}

/// Parameters fixed for the lifetime of a [`World`](crate::World).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Fixed simulation timestep in seconds.
    pub dt: f64,
    /// Gravity acceleration.
    pub gravity: Vec3,
    /// Terrain generator; `None` is rejected at construction.
    pub terrain: Option<Terrain>,
    /// Half-width of the search cube and maximum joint length for attachment.
    pub max_attach_distance: f64,
    /// Maximum centroid distance to a target for attachment and attraction.
    pub max_attract_distance: f64,
    /// Rest length of springs created by attachment.
    pub attach_spring_rest_distance: f64,
    /// Force applied per attracted body.
    pub attract_force_module: f64,
    /// Default stiffness of attachment springs.
    pub attach_spring_constant: f64,
    /// Default damping of attachment springs.
    pub attach_damping_constant: f64,
    /// Maximum range of signal rays.
    pub nfc_range: f64,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            dt: 1.0 / 60.0,
            gravity: Vec3::new(0.0, 0.0, -9.81),
            terrain: Some(Terrain::Flat { half_size: 50.0 }),
            max_attach_distance: 1.0,
            max_attract_distance: 2.0,
            attach_spring_rest_distance: 0.05,
            attract_force_module: 5.0,
            attach_spring_constant: 300.0,
            attach_damping_constant: 5.0,
            nfc_range: 2.0,
        }
    }
}

impl WorldConfig {
    /// Check every option, failing on the first invalid one.
    pub fn validate(&self) -> Result<()> {
        if !self.dt.is_finite() || self.dt <= 0.0 {
            return Err(SimError::InvalidTimestep(self.dt));
        }
        let terrain = self.terrain.as_ref().ok_or(SimError::MissingTerrain)?;
        terrain.validate()?;
        if !self.gravity.iter().all(|g| g.is_finite()) {
            return Err(SimError::InvalidConfig("gravity must be finite".into()));
        }

        let non_negative = [
            ("max_attach_distance", self.max_attach_distance),
            ("max_attract_distance", self.max_attract_distance),
            ("attach_spring_rest_distance", self.attach_spring_rest_distance),
            ("attract_force_module", self.attract_force_module),
            ("attach_damping_constant", self.attach_damping_constant),
            ("nfc_range", self.nfc_range),
        ];
        for (name, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(SimError::InvalidConfig(format!(
                    "{name} must be non-negative, got {value}"
                )));
            }
        }
        if !(self.attach_spring_constant > 0.0) {
            return Err(SimError::InvalidConfig(format!(
                "attach_spring_constant must be positive, got {}",
                self.attach_spring_constant
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        WorldConfig::default().validate().unwrap();
    }

    #[test]
    fn test_rejects_bad_timestep() {
        for dt in [0.0, -0.01, f64::NAN, f64::INFINITY] {
            let config = WorldConfig {
                dt,
                ..WorldConfig::default()
            };
            assert!(matches!(config.validate(), Err(SimError::InvalidTimestep(_))));
        }
    }

    #[test]
    fn test_rejects_missing_terrain() {
        let config = WorldConfig {
            terrain: None,
            ..WorldConfig::default()
        };
        assert!(matches!(config.validate(), Err(SimError::MissingTerrain)));
    }

    #[test]
    fn test_steps_height() {
        let steps = Terrain::Steps {
            step_length: 2.0,
            step_height: 0.1,
            count: 3,
        };
        assert_eq!(steps.height_at(-1.0, 0.0), 0.0);
        assert!((steps.height_at(0.5, 0.0) - 0.1).abs() < 1e-12);
        assert!((steps.height_at(2.5, 0.0) - 0.2).abs() < 1e-12);
        assert!((steps.height_at(100.0, 0.0) - 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: WorldConfig = serde_json::from_str(r#"{ "dt": 0.01 }"#).unwrap();
        assert_eq!(config.dt, 0.01);
        assert_eq!(config.nfc_range, WorldConfig::default().nfc_range);
    }
}
