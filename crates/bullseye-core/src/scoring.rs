//! Fixed bullseye ring-scoring model on the target plane.

use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// Validation errors for [`BullseyeModel`].
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum BullseyeModelError {
    #[error("ring radius table is empty")]
    EmptyRings,
    #[error("ring radii must be strictly ascending (ring {index} is not)")]
    RingsNotAscending { index: usize },
    #[error("expected {expected} point values for {rings} rings, got {got}")]
    PointsLengthMismatch {
        rings: usize,
        expected: usize,
        got: usize,
    },
}

/// Scoring pattern: plane center, ascending ring radii and the point value
/// per ring, plus one trailing value for hits outside every ring.
///
/// Immutable for the session.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BullseyeModel {
    /// Target-plane center in plane units.
    pub center: [f32; 2],
    /// Ring radii, strictly ascending, in plane units.
    pub rings: Vec<f32>,
    /// Point values, `rings.len() + 1` entries; the last is the
    /// outside-all-rings score.
    pub points: Vec<u32>,
}

impl Default for BullseyeModel {
    fn default() -> Self {
        Self {
            center: [450.0, 600.0],
            rings: vec![120.0, 220.0, 320.0, 420.0],
            points: vec![10, 9, 8, 7, 6],
        }
    }
}

impl BullseyeModel {
    pub fn validate(&self) -> Result<(), BullseyeModelError> {
        if self.rings.is_empty() {
            return Err(BullseyeModelError::EmptyRings);
        }
        for (i, w) in self.rings.windows(2).enumerate() {
            if w[1] <= w[0] {
                return Err(BullseyeModelError::RingsNotAscending { index: i + 1 });
            }
        }
        let expected = self.rings.len() + 1;
        if self.points.len() != expected {
            return Err(BullseyeModelError::PointsLengthMismatch {
                rings: self.rings.len(),
                expected,
                got: self.points.len(),
            });
        }
        Ok(())
    }

    /// Score a target-plane point: first ring whose radius is >= the
    /// distance from center wins (boundary inclusive); beyond all rings
    /// the trailing value applies.
    pub fn score(&self, p: Point2<f32>) -> u32 {
        let dx = p.x - self.center[0];
        let dy = p.y - self.center[1];
        let d = (dx * dx + dy * dy).sqrt();
        for (i, &r) in self.rings.iter().enumerate() {
            if d <= r {
                return self.points[i];
            }
        }
        self.points.last().copied().unwrap_or(0)
    }
}
