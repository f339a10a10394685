//! The measurement sample exchanged with producers and consumers.

/// One measurement: which point, when, how trustworthy, and what value.
///
/// Equality compares `value` by its bit pattern, so `NaN == NaN` and
/// `0.0 != -0.0`. This is the equality the codec preserves.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sample {
    /// Runtime point index, stable for the life of a session.
    pub point_id: u16,
    /// Timestamp in ticks.
    pub timestamp: i64,
    /// Quality / state flags.
    pub quality: u32,
    /// Measured value.
    pub value: f32,
}

impl Sample {
    /// Creates a sample.
    #[inline]
    pub const fn new(point_id: u16, timestamp: i64, quality: u32, value: f32) -> Self {
        Self {
            point_id,
            timestamp,
            quality,
            value,
        }
    }
}

impl PartialEq for Sample {
    fn eq(&self, other: &Self) -> bool {
        self.point_id == other.point_id
            && self.timestamp == other.timestamp
            && self.quality == other.quality
            && self.value.to_bits() == other.value.to_bits()
    }
}

impl Eq for Sample {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equality_is_bitwise() {
        let nan = Sample::new(1, 2, 3, f32::NAN);
        assert_eq!(nan, nan);
        assert_ne!(Sample::new(1, 2, 3, 0.0), Sample::new(1, 2, 3, -0.0));
        assert_ne!(Sample::new(1, 2, 3, 1.0), Sample::new(1, 2, 4, 1.0));
    }
}
