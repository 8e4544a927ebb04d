//! Snapshot sources.
//!
//! The pipeline pulls one [`SensorSnapshot`] per tick from a
//! [`SnapshotSource`]. [`SimulatedSource`] draws readings uniformly from
//! fixed ranges with a seedable RNG so runs and tests are reproducible.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::metric_names::{
    METRIC_CRACK_WIDTH, METRIC_PRESSURE, METRIC_RAINFALL, METRIC_SEISMIC, METRIC_TEMPERATURE,
    METRIC_TILT, METRIC_VIBRATION, METRIC_WATER_LEVEL,
};
use crate::snapshot::SensorSnapshot;
use crate::types::Timestamp;

/// Produces one snapshot per call.
pub trait SnapshotSource: Send {
    fn next_snapshot(&mut self, now: Timestamp) -> SensorSnapshot;
}

/// `(metric, low, high)` ranges for simulated readings.
pub const SIMULATED_RANGES: [(&str, f64, f64); 8] = [
    (METRIC_WATER_LEVEL, 85.0, 100.0),
    (METRIC_VIBRATION, 2.5, 4.5),
    (METRIC_PRESSURE, 4.0, 5.0),
    (METRIC_TEMPERATURE, 25.0, 30.0),
    (METRIC_RAINFALL, 0.0, 20.0),
    (METRIC_SEISMIC, 0.7, 1.2),
    (METRIC_CRACK_WIDTH, 0.25, 0.45),
    (METRIC_TILT, 0.01, 0.03),
];

/// Random readings within [`SIMULATED_RANGES`].
#[derive(Debug)]
pub struct SimulatedSource {
    rng: StdRng,
}

impl SimulatedSource {
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_os_rng(),
        }
    }
}

impl SnapshotSource for SimulatedSource {
    fn next_snapshot(&mut self, now: Timestamp) -> SensorSnapshot {
        SIMULATED_RANGES
            .iter()
            .fold(SensorSnapshot::new(now), |snap, (metric, low, high)| {
                let value = self.rng.random_range(*low..*high);
                snap.with_reading(*metric, value)
            })
    }
}

/// Replays a fixed list of snapshots, restamped with the tick time. Repeats
/// the last one once exhausted.
#[derive(Debug, Clone)]
pub struct ScriptedSource {
    frames: Vec<SensorSnapshot>,
    cursor: usize,
}

impl ScriptedSource {
    pub fn new(frames: Vec<SensorSnapshot>) -> Self {
        Self { frames, cursor: 0 }
    }
}

impl SnapshotSource for ScriptedSource {
    fn next_snapshot(&mut self, now: Timestamp) -> SensorSnapshot {
        let Some(frame) = self
            .frames
            .get(self.cursor)
            .or_else(|| self.frames.last())
        else {
            return SensorSnapshot::new(now);
        };
        self.cursor = self.cursor.saturating_add(1);
        frame
            .readings()
            .iter()
            .fold(SensorSnapshot::new(now), |snap, (k, v)| snap.with_reading(k.clone(), *v))
    }
}
