//! Tumbling windows for aggregate conditions.
//!
//! Each complex subscription owns one `WindowManager` per windowed field.
//! Windows count events, not time: the buffer holds exactly `capacity`
//! samples, emits one aggregate when full, and clears.

use crate::subscription::Aggregation;

/// Fixed-capacity tumbling window over float samples.
#[derive(Debug, Clone)]
pub struct WindowManager {
    capacity: usize,
    aggregation: Aggregation,
    buffer: Vec<f64>,
    filled_once: bool,
}

impl WindowManager {
    /// Creates a window. Capacity is clamped to at least one sample.
    #[must_use]
    pub fn new(capacity: usize, aggregation: Aggregation) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            aggregation,
            buffer: Vec::with_capacity(capacity),
            filled_once: false,
        }
    }

    /// Appends one sample.
    ///
    /// Returns `(false, None)` while the buffer is below capacity. On the
    /// capacity-th sample the aggregate is computed, the buffer is cleared
    /// (tumbling, not sliding), and `(true, Some(aggregate))` is returned.
    pub fn add(&mut self, value: f64) -> (bool, Option<f64>) {
        self.buffer.push(value);
        if self.buffer.len() < self.capacity {
            return (false, None);
        }

        let aggregated = self.aggregate();
        self.buffer.clear();
        self.filled_once = true;
        (true, Some(aggregated))
    }

    fn aggregate(&self) -> f64 {
        let sum: f64 = self.buffer.iter().sum();
        match self.aggregation {
            Aggregation::Avg => sum / self.buffer.len() as f64,
            Aggregation::Max => self.buffer.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            Aggregation::Min => self.buffer.iter().copied().fold(f64::INFINITY, f64::min),
            Aggregation::Sum => sum,
        }
    }

    /// Samples currently buffered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// True when no samples are buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Window capacity.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// True once the window has filled (and fired) at least once.
    #[must_use]
    pub const fn has_filled(&self) -> bool {
        self.filled_once
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_only_at_capacity() {
        let mut window = WindowManager::new(3, Aggregation::Avg);
        assert_eq!(window.add(1.0), (false, None));
        assert_eq!(window.add(2.0), (false, None));
        let (fired, agg) = window.add(3.0);
        assert!(fired);
        assert!((agg.unwrap() - 2.0).abs() < f64::EPSILON);
        assert!(window.has_filled());
    }

    #[test]
    fn tumbles_rather_than_slides() {
        let mut window = WindowManager::new(2, Aggregation::Sum);
        assert_eq!(window.add(1.0), (false, None));
        assert_eq!(window.add(2.0), (true, Some(3.0)));
        // Buffer cleared: the next fire needs a full new window.
        assert_eq!(window.len(), 0);
        assert_eq!(window.add(10.0), (false, None));
        assert_eq!(window.add(20.0), (true, Some(30.0)));
    }

    #[test]
    fn aggregations_reduce_the_full_sample() {
        let samples = [4.0, 1.5, 2.5, 8.0];
        let fill = |aggregation: Aggregation| {
            let mut window = WindowManager::new(4, aggregation);
            let mut result = None;
            for v in samples {
                let (fired, agg) = window.add(v);
                if fired {
                    result = agg;
                }
            }
            result.unwrap()
        };
        assert!((fill(Aggregation::Avg) - 4.0).abs() < 1e-9);
        assert!((fill(Aggregation::Max) - 8.0).abs() < 1e-9);
        assert!((fill(Aggregation::Min) - 1.5).abs() < 1e-9);
        assert!((fill(Aggregation::Sum) - 16.0).abs() < 1e-9);
    }

    #[test]
    fn window_of_one_fires_every_sample() {
        let mut window = WindowManager::new(1, Aggregation::Max);
        assert_eq!(window.add(5.0), (true, Some(5.0)));
        assert_eq!(window.add(7.0), (true, Some(7.0)));
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let mut window = WindowManager::new(0, Aggregation::Avg);
        assert_eq!(window.capacity(), 1);
        assert_eq!(window.add(2.0), (true, Some(2.0)));
    }
}
