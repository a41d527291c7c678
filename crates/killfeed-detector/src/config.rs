use std::fmt;
use std::str::FromStr;

use killfeed_types::{ConfigurationError, RoiConfig};

/// Edge of the region the killfeed stacks from; slot 0 is the box nearest it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StackAnchor {
    #[default]
    Right,
    Left,
}

impl StackAnchor {
    pub fn as_str(&self) -> &'static str {
        match self {
            StackAnchor::Right => "right",
            StackAnchor::Left => "left",
        }
    }
}

impl fmt::Display for StackAnchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StackAnchor {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "right" => Ok(StackAnchor::Right),
            "left" => Ok(StackAnchor::Left),
            other => Err(ConfigurationError::invalid(format!(
                "unknown stack anchor '{other}' (expected 'right' or 'left')"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectionOptions {
    pub roi: RoiConfig,
    /// Pixels strictly brighter than this are foreground.
    pub brightness_threshold: u8,
    pub min_area: u64,
    pub max_area: u64,
    pub aspect_ratio_min: Option<f64>,
    pub aspect_ratio_max: Option<f64>,
    /// Square kernel for close-then-open clean-up; `None` skips it.
    pub morphology_kernel: Option<usize>,
    pub anchor: StackAnchor,
}

impl Default for DetectionOptions {
    fn default() -> Self {
        Self {
            roi: RoiConfig::default(),
            brightness_threshold: 200,
            min_area: 100,
            max_area: 5000,
            aspect_ratio_min: Some(0.3),
            aspect_ratio_max: Some(3.0),
            morphology_kernel: Some(3),
            anchor: StackAnchor::Right,
        }
    }
}

impl DetectionOptions {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        self.roi.validate()?;
        for (field, value) in [
            ("brightness_threshold", u64::from(self.brightness_threshold)),
            ("min_area", self.min_area),
            ("max_area", self.max_area),
        ] {
            if value == 0 {
                return Err(ConfigurationError::NonPositive { field, value: 0.0 });
            }
        }
        if self.min_area > self.max_area {
            return Err(ConfigurationError::invalid(format!(
                "min_area ({}) must not exceed max_area ({})",
                self.min_area, self.max_area
            )));
        }
        for (field, bound) in [
            ("aspect_ratio_min", self.aspect_ratio_min),
            ("aspect_ratio_max", self.aspect_ratio_max),
        ] {
            if let Some(value) = bound
                && (!value.is_finite() || value <= 0.0)
            {
                return Err(ConfigurationError::NonPositive { field, value });
            }
        }
        if let (Some(min), Some(max)) = (self.aspect_ratio_min, self.aspect_ratio_max)
            && min > max
        {
            return Err(ConfigurationError::invalid(format!(
                "aspect_ratio_min ({min}) must not exceed aspect_ratio_max ({max})"
            )));
        }
        if self.morphology_kernel == Some(0) {
            return Err(ConfigurationError::NonPositive {
                field: "morph_kernel_size",
                value: 0.0,
            });
        }
        Ok(())
    }
}
