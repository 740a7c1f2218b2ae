use std::collections::VecDeque;

use crate::types::LocalPosition;

/// Moving average over the most recent local positions
pub struct PositionSmoother {
    window: VecDeque<LocalPosition>,
    window_size: usize,
}

impl PositionSmoother {
    /// Create a new smoother with given depth (5 on the flight computer)
    pub fn new(window_size: usize) -> Self {
        let window_size = window_size.max(1);
        PositionSmoother {
            window: VecDeque::with_capacity(window_size),
            window_size,
        }
    }

    /// Add a sample, dropping the oldest once the window is full
    pub fn push(&mut self, position: LocalPosition) {
        self.window.push_back(position);
        while self.window.len() > self.window_size {
            self.window.pop_front();
        }
    }

    /// Mean of the buffered samples, `None` before the first push
    pub fn average(&self) -> Option<LocalPosition> {
        if self.window.is_empty() {
            return None;
        }
        let sum = self
            .window
            .iter()
            .fold(nalgebra::Vector3::zeros(), |acc, p| acc + p.to_vector());
        Some(LocalPosition::from_vector(sum / self.window.len() as f64))
    }

    /// Push then average
    pub fn apply(&mut self, position: LocalPosition) -> LocalPosition {
        self.push(position);
        self.average().unwrap_or(position)
    }

    /// Get current window size (actual, not max)
    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_empty_has_no_average() {
        let smoother = PositionSmoother::new(5);
        assert!(smoother.is_empty());
        assert_eq!(smoother.average(), None);
    }

    #[test]
    fn test_three_samples_average() {
        let mut smoother = PositionSmoother::new(5);
        smoother.push(LocalPosition::new(1.0, 1.0, 1.0));
        smoother.push(LocalPosition::new(2.0, 2.0, 2.0));
        let avg = smoother.apply(LocalPosition::new(3.0, 3.0, 3.0));
        assert_abs_diff_eq!(avg.x, 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(avg.y, 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(avg.z, 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_window_drops_oldest() {
        let mut smoother = PositionSmoother::new(5);
        for i in 0..7 {
            smoother.push(LocalPosition::new(i as f64, 0.0, 0.0));
        }
        assert_eq!(smoother.len(), 5);
        // 2..=6
        assert_abs_diff_eq!(smoother.average().unwrap().x, 4.0, epsilon = 1e-12);
    }

    #[test]
    fn test_repeated_sample_is_stable() {
        let mut smoother = PositionSmoother::new(5);
        let p = LocalPosition::new(0.0, 0.0, 760.0);
        let first = smoother.apply(p);
        let second = smoother.apply(p);
        assert_eq!(first, second);
    }
}
