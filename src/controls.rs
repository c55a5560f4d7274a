//! Threshold control
//!
//! A bounded discrete UI input (0..=8) mapped linearly onto the detection
//! confidence threshold (0.0..=0.8, steps of 0.1).

use crate::pipeline::{ControlHandle, PipelineError};

pub const MAX_LEVEL: i32 = 8;
pub const DEFAULT_LEVEL: i32 = 5;
pub const THRESHOLD_STEP: f32 = 0.1;

/// Threshold for a UI step, clamped to `0..=MAX_LEVEL`.
pub fn threshold_of(step: i32) -> f32 {
    THRESHOLD_STEP * step.clamp(0, MAX_LEVEL) as f32
}

/// Label shown next to the slider: the step as a share of the full range.
pub fn percent_label(step: i32) -> String {
    let step = step.clamp(0, MAX_LEVEL);
    format!("{}%", (step as f64 / 0.08) as i64)
}

/// Anything showing detections that must be blanked when the threshold moves.
pub trait Overlay {
    fn clear(&mut self);
}

pub struct ThresholdController {
    level: i32,
    control: ControlHandle,
}

impl ThresholdController {
    pub fn new(control: ControlHandle) -> Self {
        Self::with_level(control, DEFAULT_LEVEL)
    }

    /// Controller whose worker was started at `threshold_of(level)`.
    pub fn with_level(control: ControlHandle, level: i32) -> Self {
        Self {
            level: level.clamp(0, MAX_LEVEL),
            control,
        }
    }

    pub fn level(&self) -> i32 {
        self.level
    }

    pub fn threshold(&self) -> f32 {
        threshold_of(self.level)
    }

    /// Apply a new slider level: rebuild the detector with the new threshold
    /// on the next frame and clear the overlay now.
    pub fn set_level<O: Overlay + ?Sized>(
        &mut self,
        step: i32,
        overlay: &mut O,
    ) -> Result<f32, PipelineError> {
        self.level = step.clamp(0, MAX_LEVEL);
        let threshold = threshold_of(self.level);
        overlay.clear();
        self.control.set_threshold(threshold)?;
        Ok(threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_is_linear_in_level() {
        assert_eq!(threshold_of(0), 0.0);
        assert!((threshold_of(5) - 0.5).abs() < 1e-6);
        assert!((threshold_of(8) - 0.8).abs() < 1e-6);
    }

    #[test]
    fn out_of_range_levels_clamp() {
        assert_eq!(threshold_of(-3), 0.0);
        assert!((threshold_of(12) - 0.8).abs() < 1e-6);
    }

    #[test]
    fn percent_label_spans_full_range() {
        assert_eq!(percent_label(0), "0%");
        assert_eq!(percent_label(4), "50%");
        assert_eq!(percent_label(8), "100%");
    }
}
