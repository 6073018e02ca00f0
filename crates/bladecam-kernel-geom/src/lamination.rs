//! Lamination: layered re-sampling between two span bounds.

use serde::{Deserialize, Serialize};

use crate::error::{GeomError, Result};

/// Partition of `[start%, end%]` of the span into layers.
///
/// `N` layers produce `N + 1` stations, both bounds included. The schedule
/// is derived data: rebuild a new one whenever sampling parameters change.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LaminationSchedule {
    start_percent: f64,
    end_percent: f64,
    layers: usize,
}

impl LaminationSchedule {
    /// Validate and create a schedule.
    ///
    /// Fails with [`GeomError::InvalidRange`] unless
    /// `0 <= start < end <= 100`.
    pub fn new(start_percent: f64, end_percent: f64, layers: usize) -> Result<Self> {
        let in_bounds = |p: f64| (0.0..=100.0).contains(&p);
        if !(in_bounds(start_percent) && in_bounds(end_percent) && start_percent < end_percent) {
            return Err(GeomError::InvalidRange {
                start: start_percent,
                end: end_percent,
            });
        }
        if layers == 0 {
            return Err(GeomError::InvalidParameter(
                "lamination needs at least one layer".into(),
            ));
        }
        Ok(Self {
            start_percent,
            end_percent,
            layers,
        })
    }

    /// Full span in a single layer.
    pub fn full(layers: usize) -> Result<Self> {
        Self::new(0.0, 100.0, layers)
    }

    /// Range start in percent.
    pub fn start_percent(&self) -> f64 {
        self.start_percent
    }

    /// Range end in percent.
    pub fn end_percent(&self) -> f64 {
        self.end_percent
    }

    /// Number of layers.
    pub fn layers(&self) -> usize {
        self.layers
    }

    /// Stations in `[0, 1]`, one per layer boundary.
    pub fn stations(&self) -> Vec<f64> {
        let a = self.start_percent / 100.0;
        let b = self.end_percent / 100.0;
        (0..=self.layers)
            .map(|i| a + (b - a) * i as f64 / self.layers as f64)
            .collect()
    }
}
