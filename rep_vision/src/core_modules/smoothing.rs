// THEORY:
// The `SmoothingBuffer` is the noise-reduction layer between the raw landmark stream
// and the detectors. Pose extractors jitter by a few thousandths of the frame from
// one frame to the next, which is enough to flap a threshold comparison. Averaging
// the last few samples of a tracked quantity cancels that jitter.
//
// Key architectural principles:
// 1.  **Sliding Window**: Each buffer keeps at most N samples; the oldest is evicted
//     first. N is small (3 by default) so that the lag stays below a tenth of a second.
// 2.  **Recency Weighting**: Once full, a buffer in `RecencyWeighted` mode weights its
//     samples with a linear ramp from 0.5 (oldest) to 1.0 (newest), normalized to sum
//     to 1. While filling up, it falls back to the plain mean.
// 3.  **One Buffer per Quantity**: Buffers are generic over the sample type (scalars
//     or `Point`s) and each tracked quantity owns an independent instance.
// 4.  **Passthrough**: A zero-length window is legal and returns the latest sample.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::ops::{Add, Mul};

pub const DEFAULT_SMOOTHING_WINDOW: usize = 3;

const OLDEST_WEIGHT: f64 = 0.5;
const NEWEST_WEIGHT: f64 = 1.0;

/// How a full buffer combines its samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SmoothingMode {
    /// Always the unweighted mean.
    Mean,
    /// Unweighted mean while filling, recency-weighted average once full.
    #[default]
    RecencyWeighted,
}

/// Anything that can be averaged: scalars, points.
pub trait Sample: Copy + Default + Add<Output = Self> + Mul<f64, Output = Self> {}

impl<T> Sample for T where T: Copy + Default + Add<Output = T> + Mul<f64, Output = T> {}

/// A fixed-capacity FIFO window over one tracked quantity.
#[derive(Debug, Clone)]
pub struct SmoothingBuffer<T: Sample> {
    capacity: usize,
    mode: SmoothingMode,
    samples: VecDeque<T>,
    latest: Option<T>,
}

impl<T: Sample> SmoothingBuffer<T> {
    pub fn new(capacity: usize, mode: SmoothingMode) -> Self {
        Self {
            capacity,
            mode,
            samples: VecDeque::with_capacity(capacity + 1),
            latest: None,
        }
    }

    pub fn push(&mut self, sample: T) {
        self.latest = Some(sample);
        if self.capacity == 0 {
            return;
        }
        self.samples.push_back(sample);
        if self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
    }

    /// The current smoothed estimate, or `None` before the first sample.
    pub fn value(&self) -> Option<T> {
        if self.capacity == 0 {
            return self.latest;
        }
        if self.samples.is_empty() {
            return None;
        }

        let weighted = self.mode == SmoothingMode::RecencyWeighted && self.is_full();
        let weights = if weighted {
            recency_weights(self.samples.len())
        } else {
            vec![1.0 / self.samples.len() as f64; self.samples.len()]
        };

        Some(
            self.samples
                .iter()
                .zip(weights)
                .fold(T::default(), |acc, (sample, weight)| acc + *sample * weight),
        )
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty() && self.latest.is_none()
    }

    pub fn is_full(&self) -> bool {
        self.samples.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn mode(&self) -> SmoothingMode {
        self.mode
    }

    pub fn clear(&mut self) {
        self.samples.clear();
        self.latest = None;
    }
}

/// Linear ramp from 0.5 to 1.0 over `len` samples, normalized to sum to 1.
pub fn recency_weights(len: usize) -> Vec<f64> {
    match len {
        0 => Vec::new(),
        1 => vec![1.0],
        _ => {
            let step = (NEWEST_WEIGHT - OLDEST_WEIGHT) / (len - 1) as f64;
            let ramp: Vec<f64> = (0..len).map(|i| OLDEST_WEIGHT + step * i as f64).collect();
            let total: f64 = ramp.iter().sum();
            ramp.into_iter().map(|w| w / total).collect()
        }
    }
}
