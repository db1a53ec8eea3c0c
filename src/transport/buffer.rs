//! Outbound write buffer and its flow-control thresholds.

use super::error::TransportError;
use std::collections::VecDeque;

pub const DEFAULT_HIGH_WATER_MARK: usize = 64 * 1024;
pub const DEFAULT_LOW_WATER_MARK: usize = 16 * 1024;

/// High/low thresholds for pausing and resuming the writer.
///
/// Two thresholds instead of one keep the pause signal from flapping when
/// the buffer hovers around a single cutoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaterMarks {
    high: usize,
    low: usize,
}

impl Default for WaterMarks {
    fn default() -> Self {
        Self {
            high: DEFAULT_HIGH_WATER_MARK,
            low: DEFAULT_LOW_WATER_MARK,
        }
    }
}

impl WaterMarks {
    pub fn new(high: usize, low: usize) -> Result<Self, TransportError> {
        if low > high {
            return Err(TransportError::InvalidWaterMarks { high, low });
        }
        Ok(Self { high, low })
    }

    /// Fill in missing limits: `high` defaults to `4 * low` (or 64 KiB when
    /// both are missing) and `low` defaults to `high / 4`.
    pub fn resolve(high: Option<usize>, low: Option<usize>) -> Result<Self, TransportError> {
        let high = match (high, low) {
            (Some(high), _) => high,
            (None, Some(low)) => low.saturating_mul(4),
            (None, None) => DEFAULT_HIGH_WATER_MARK,
        };
        let low = low.unwrap_or(high / 4);
        Self::new(high, low)
    }

    pub fn high(&self) -> usize {
        self.high
    }

    pub fn low(&self) -> usize {
        self.low
    }
}

/// Bytes accepted by `write` but not yet taken by the device.
///
/// Append at the tail, consume from the head, never reorder.
#[derive(Debug, Default)]
pub(crate) struct WriteBuffer {
    bytes: VecDeque<u8>,
}

impl WriteBuffer {
    pub fn push(&mut self, data: &[u8]) {
        self.bytes.extend(data);
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Everything pending, as one slice for a single device write.
    pub fn pending(&mut self) -> &[u8] {
        self.bytes.make_contiguous()
    }

    /// Drop `n` bytes the device accepted.
    pub fn consume(&mut self, n: usize) {
        let n = n.min(self.bytes.len());
        self.bytes.drain(..n);
    }

    pub fn clear(&mut self) {
        self.bytes.clear();
    }
}
