//! Near-field signal encoding.
//!
//! A signal is a short ray that lives for exactly one tick. A pulse fans one
//! signal over several rays, and a component hears a pulse at most once. Its scalar value
//! travels bit-exact in the ray's 64-bit category word; its channel is packed
//! into the 64-bit collide mask as the bitwise complement of the channel
//! index, so the low bits carry the inverted index and every higher bit is
//! set.

use serde::{Deserialize, Serialize};
use voxbot_math::Vec3;

use crate::component::ComponentId;
use crate::error::{Result, SimError};

/// Number of cube faces, and of per-side sensor slots.
pub const SIDES: usize = 6;

/// Highest channel index the mask encoding can carry.
pub const MAX_CHANNEL: u8 = 63;

/// Collide bits of a body that listens on every channel.
pub const DETECT_ALL: u64 = u64::MAX;

/// Category and collide words of a signal ray.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SignalBits {
    /// Bit pattern of the transmitted value.
    pub category: u64,
    /// Complemented channel index.
    pub mask: u64,
}

impl SignalBits {
    /// Pack `channel` and `value`.
    pub fn encode(channel: u8, value: f64) -> Self {
        Self {
            category: value.to_bits(),
            mask: !u64::from(channel),
        }
    }

    /// Transmitted channel.
    pub fn channel(&self) -> u8 {
        (!self.mask & u64::from(MAX_CHANNEL)) as u8
    }

    /// Transmitted value.
    pub fn value(&self) -> f64 {
        f64::from_bits(self.category)
    }

    /// Whether a detector with `collide` bits accepts this ray.
    pub fn accepted_by(&self, collide: u64) -> bool {
        self.mask & collide != 0
    }
}

/// A signal ray in flight during one tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalRay {
    /// Component that emitted the ray.
    pub emitter: ComponentId,
    /// Ray origin.
    pub origin: Vec3,
    /// Unit direction.
    pub direction: Vec3,
    /// Maximum reach.
    pub range: f64,
    /// Encoded channel and value.
    pub bits: SignalBits,
}

impl SignalRay {
    /// Build a ray. Fails if `direction` has no length or `channel` exceeds
    /// [`MAX_CHANNEL`].
    pub fn new(
        emitter: ComponentId,
        origin: Vec3,
        direction: &Vec3,
        range: f64,
        channel: u8,
        value: f64,
    ) -> Result<Self> {
        if channel > MAX_CHANNEL {
            return Err(SimError::InvalidSignal(format!(
                "channel {channel} exceeds {MAX_CHANNEL}"
            )));
        }
        let direction = direction
            .try_normalize(f64::EPSILON)
            .ok_or_else(|| SimError::InvalidSignal("ray direction has no length".into()))?;
        Ok(Self {
            emitter,
            origin,
            direction,
            range,
            bits: SignalBits::encode(channel, value),
        })
    }
}

/// Axis (0 = X, 1 = Y, 2 = Z) of cube side `side`.
pub fn side_axis(side: usize) -> usize {
    side / 2
}

/// Whether `side` faces the positive end of its axis.
pub fn side_is_positive(side: usize) -> bool {
    side % 2 == 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use slotmap::SlotMap;

    #[test]
    fn test_mask_layout() {
        let bits = SignalBits::encode(5, 0.0);
        assert_eq!(bits.mask, !5u64);
        assert_eq!(bits.mask >> 6, u64::MAX >> 6);
        assert_eq!(bits.channel(), 5);
    }

    #[test]
    fn test_negative_zero_survives() {
        let bits = SignalBits::encode(0, -0.0);
        assert!(bits.value().is_sign_negative());
    }

    #[test]
    fn test_detect_all_accepts_every_channel() {
        for channel in 0..=MAX_CHANNEL {
            assert!(SignalBits::encode(channel, 1.0).accepted_by(DETECT_ALL));
        }
    }

    #[test]
    fn test_ray_direction_normalized() {
        let mut ids: SlotMap<ComponentId, ()> = SlotMap::with_key();
        let emitter = ids.insert(());
        let ray = SignalRay::new(emitter, Vec3::zeros(), &Vec3::new(0.0, 3.0, 4.0), 2.0, 1, 0.5)
            .unwrap();
        assert!((ray.direction.norm() - 1.0).abs() < 1e-12);
        assert!(matches!(
            SignalRay::new(emitter, Vec3::zeros(), &Vec3::zeros(), 2.0, 1, 0.5),
            Err(SimError::InvalidSignal(_))
        ));
    }

    #[test]
    fn test_channel_out_of_range_rejected() {
        let mut ids: SlotMap<ComponentId, ()> = SlotMap::with_key();
        let emitter = ids.insert(());
        let x = Vec3::new(1.0, 0.0, 0.0);
        assert!(SignalRay::new(emitter, Vec3::zeros(), &x, 2.0, MAX_CHANNEL, 0.5).is_ok());
        assert!(matches!(
            SignalRay::new(emitter, Vec3::zeros(), &x, 2.0, MAX_CHANNEL + 1, 0.5),
            Err(SimError::InvalidSignal(_))
        ));
    }

    #[test]
    fn test_sides() {
        assert_eq!(side_axis(0), 0);
        assert_eq!(side_axis(5), 2);
        assert!(!side_is_positive(4));
        assert!(side_is_positive(3));
    }

    proptest! {
        #[test]
        fn prop_signal_round_trip(channel in 0u8..=MAX_CHANNEL, value in any::<f64>().prop_filter("finite", |v| v.is_finite())) {
            let bits = SignalBits::encode(channel, value);
            prop_assert_eq!(bits.channel(), channel);
            prop_assert_eq!(bits.value().to_bits(), value.to_bits());
        }
    }
}
