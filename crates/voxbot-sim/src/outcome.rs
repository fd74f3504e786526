//! Aggregation of a run's snapshots into fitness values.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::snapshot::Snapshot;

/// Maximum number of cached sub-ranges.
const CACHE_SIZE: usize = 3;

/// How values over a time range are reduced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregate {
    /// Arithmetic mean.
    Average,
    /// Value at the last snapshot of the range.
    Final,
    /// Minimum.
    Min,
    /// Maximum.
    Max,
}

/// Built-in per-snapshot scalars, evaluated on the first agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// Centroid X.
    CentroidX,
    /// Centroid Y.
    CentroidY,
    /// Centroid Z.
    CentroidZ,
}

impl Metric {
    /// Evaluate on one snapshot.
    pub fn evaluate(&self, snapshot: &Snapshot) -> Option<f64> {
        let c = snapshot.first_agent_centroid()?;
        Some(match self {
            Metric::CentroidX => c.x,
            Metric::CentroidY => c.y,
            Metric::CentroidZ => c.z,
        })
    }
}

/// The ordered snapshots of one run.
#[derive(Debug, Default)]
pub struct Outcome {
    snapshots: Vec<Snapshot>,
    ranges: RefCell<VecDeque<((u64, u64), Range<usize>)>>,
}

impl Outcome {
    /// Empty outcome.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the snapshot of the next tick.
    pub fn push(&mut self, snapshot: Snapshot) {
        self.snapshots.push(snapshot);
        self.ranges.borrow_mut().clear();
    }

    /// Every snapshot, in tick order.
    pub fn snapshots(&self) -> &[Snapshot] {
        &self.snapshots
    }

    /// Snapshots with `from <= t <= to`.
    pub fn range(&self, from: f64, to: f64) -> &[Snapshot] {
        let key = (from.to_bits(), to.to_bits());
        let cached = self
            .ranges
            .borrow()
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, r)| r.clone());
        let range = cached.unwrap_or_else(|| {
            let start = self.snapshots.partition_point(|s| s.t < from);
            let end = self.snapshots.partition_point(|s| s.t <= to).max(start);
            let mut ranges = self.ranges.borrow_mut();
            if ranges.len() == CACHE_SIZE {
                ranges.pop_front();
            }
            ranges.push_back((key, start..end));
            start..end
        });
        &self.snapshots[range]
    }

    /// Reduce `f` over the snapshots in `[from, to]`. Snapshots where `f`
    /// yields `None` are skipped.
    pub fn aggregate_with<F>(&self, from: f64, to: f64, aggregate: Aggregate, f: F) -> Option<f64>
    where
        F: Fn(&Snapshot) -> Option<f64>,
    {
        let values: Vec<f64> = self.range(from, to).iter().filter_map(f).collect();
        match aggregate {
            Aggregate::Average if !values.is_empty() => {
                Some(values.iter().sum::<f64>() / values.len() as f64)
            }
            Aggregate::Average => None,
            Aggregate::Final => values.last().copied(),
            Aggregate::Min => values.into_iter().reduce(f64::min),
            Aggregate::Max => values.into_iter().reduce(f64::max),
        }
    }

    /// Reduce a built-in metric over `[from, to]`.
    pub fn aggregate(&self, metric: Metric, from: f64, to: f64, aggregate: Aggregate) -> Option<f64> {
        self.aggregate_with(from, to, aggregate, |s| metric.evaluate(s))
    }

    /// Mean of `metric` over `[from, to]`.
    pub fn average(&self, metric: Metric, from: f64, to: f64) -> Option<f64> {
        self.aggregate(metric, from, to, Aggregate::Average)
    }

    /// Last value of `metric` in `[from, to]`.
    pub fn final_value(&self, metric: Metric, from: f64, to: f64) -> Option<f64> {
        self.aggregate(metric, from, to, Aggregate::Final)
    }

    /// Minimum of `metric` over `[from, to]`.
    pub fn min(&self, metric: Metric, from: f64, to: f64) -> Option<f64> {
        self.aggregate(metric, from, to, Aggregate::Min)
    }

    /// Maximum of `metric` over `[from, to]`.
    pub fn max(&self, metric: Metric, from: f64, to: f64) -> Option<f64> {
        self.aggregate(metric, from, to, Aggregate::Max)
    }

    /// Planar displacement of the first agent between the first and last
    /// snapshot.
    pub fn distance(&self) -> Option<f64> {
        let start = self.snapshots.first()?.first_agent_centroid()?;
        let end = self.snapshots.last()?.first_agent_centroid()?;
        Some((end.xy() - start.xy()).norm())
    }

    /// [`distance`](Self::distance) over elapsed simulated time.
    pub fn velocity(&self) -> Option<f64> {
        let elapsed = self.snapshots.last()?.t - self.snapshots.first()?.t;
        (elapsed > 0.0).then_some(self.distance()? / elapsed)
    }

    #[cfg(test)]
    fn cached_ranges(&self) -> usize {
        self.ranges.borrow().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentId;
    use crate::snapshot::{AgentSnapshot, ComponentSnapshot};
    use approx::assert_relative_eq;
    use slotmap::SlotMap;
    use voxbot_math::{BoundingBox, Vec3};

    fn snapshot(t: f64, x: f64) -> Snapshot {
        let mut ids: SlotMap<crate::component::ComponentId, ()> = SlotMap::with_key();
        let centroid = Vec3::new(x, 2.0 * x, 0.5);
        Snapshot {
            t,
            agents: vec![AgentSnapshot {
                id: AgentId(0),
                components: vec![ComponentSnapshot {
                    id: ids.insert(()),
                    mass: 1.0,
                    centroid,
                    bounding_box: BoundingBox::around(&centroid, 0.5),
                    corners: vec![centroid],
                }],
            }],
            passive: vec![],
            actions: vec![],
            spring_joints: vec![],
            fixed_joints: vec![],
        }
    }

    fn outcome() -> Outcome {
        let mut outcome = Outcome::new();
        for i in 0..5 {
            outcome.push(snapshot(i as f64, i as f64));
        }
        outcome
    }

    #[test]
    fn test_aggregates() {
        let o = outcome();
        assert_relative_eq!(o.average(Metric::CentroidX, 1.0, 3.0).unwrap(), 2.0);
        assert_relative_eq!(o.final_value(Metric::CentroidX, 0.0, 2.5).unwrap(), 2.0);
        assert_relative_eq!(o.min(Metric::CentroidY, 1.0, 4.0).unwrap(), 2.0);
        assert_relative_eq!(o.max(Metric::CentroidZ, 0.0, 4.0).unwrap(), 0.5);
        assert!(o.average(Metric::CentroidX, 10.0, 20.0).is_none());
    }

    #[test]
    fn test_custom_metric() {
        let o = outcome();
        let v = o.aggregate_with(0.0, 4.0, Aggregate::Max, |s| Some(s.t * 10.0));
        assert_relative_eq!(v.unwrap(), 40.0);
    }

    #[test]
    fn test_range_cache_evicts_oldest() {
        let o = outcome();
        o.range(0.0, 1.0);
        o.range(0.0, 2.0);
        o.range(0.0, 3.0);
        o.range(0.0, 1.0);
        assert_eq!(o.cached_ranges(), 3);
        o.range(1.0, 4.0);
        assert_eq!(o.cached_ranges(), 3);
        assert_eq!(o.range(1.0, 4.0).len(), 4);
    }

    #[test]
    fn test_distance_and_velocity() {
        let o = outcome();
        let expected = (16.0f64 + 64.0).sqrt();
        assert_relative_eq!(o.distance().unwrap(), expected, epsilon = 1e-12);
        assert_relative_eq!(o.velocity().unwrap(), expected / 4.0, epsilon = 1e-12);
        assert!(Outcome::new().distance().is_none());
    }
}
