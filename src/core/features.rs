//! Feature assembly from sample windows.
//!
//! The model consumes raw accelerometer values, so "features" here are the
//! window flattened in canonical axis order: `x0, y0, z0, x1, y1, z1, ...`.

use crate::core::window::Window;
use crate::core::AXES;

/// Flattened model input built from a complete window.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector(Vec<f32>);

impl FeatureVector {
    /// Wrap raw values. Length is checked by the classifier, not here.
    pub fn from_vec(values: Vec<f32>) -> Self {
        Self(values)
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }
}

/// The window did not hold enough samples yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Incomplete {
    pub have: usize,
    pub need: usize,
}

impl std::fmt::Display for Incomplete {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "incomplete window: {} of {} samples", self.have, self.need)
    }
}

impl std::error::Error for Incomplete {}

/// Turns complete windows into feature vectors.
#[derive(Debug, Clone, Copy)]
pub struct FeatureAssembler {
    capacity: usize,
}

impl FeatureAssembler {
    /// Create an assembler for windows of `capacity` samples.
    pub fn new(capacity: usize) -> Self {
        Self { capacity }
    }

    /// Samples required per window.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Length of every vector this assembler produces.
    pub fn output_len(&self) -> usize {
        self.capacity * AXES
    }

    /// Flatten a window, or report how far it is from complete.
    pub fn assemble(&self, window: &Window) -> Result<FeatureVector, Incomplete> {
        if window.len() < self.capacity {
            return Err(Incomplete {
                have: window.len(),
                need: self.capacity,
            });
        }

        let mut values = Vec::with_capacity(self.output_len());
        for sample in window.samples().iter().take(self.capacity) {
            values.extend_from_slice(&sample.axes());
        }

        Ok(FeatureVector(values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::types::Sample;

    fn window_of(n: usize, capacity: usize) -> Window {
        let samples = (0..n)
            .map(|i| Sample::now(i as f32, i as f32 + 0.1, i as f32 + 0.2))
            .collect();
        Window::from_samples(samples, capacity)
    }

    #[test]
    fn test_underfilled_windows_are_incomplete() {
        let assembler = FeatureAssembler::new(125);

        for n in [0, 1, 64, 124] {
            let err = assembler.assemble(&window_of(n, 125)).unwrap_err();
            assert_eq!(err, Incomplete { have: n, need: 125 });
        }
    }

    #[test]
    fn test_canonical_axis_order() {
        let assembler = FeatureAssembler::new(2);
        let vector = assembler.assemble(&window_of(2, 2)).unwrap();

        assert_eq!(vector.as_slice(), &[0.0, 0.1, 0.2, 1.0, 1.1, 1.2]);
    }

    #[test]
    fn test_assembly_is_deterministic() {
        let assembler = FeatureAssembler::new(125);
        let window = window_of(125, 125);

        let a = assembler.assemble(&window).unwrap();
        let b = assembler.assemble(&window).unwrap();

        assert_eq!(a.as_slice().len(), 375);
        let a_bits: Vec<u32> = a.as_slice().iter().map(|v| v.to_bits()).collect();
        let b_bits: Vec<u32> = b.as_slice().iter().map(|v| v.to_bits()).collect();
        assert_eq!(a_bits, b_bits);
    }
}
