//! Filter graph builder
//!
//! Produces the ordered ffmpeg filter chain shared by the GIF and video
//! encoders: frame-rate resample, then crop, then proportional scale.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::WatermarkConfig;

/// A crop keeping the full width and a horizontal band of the frame height
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CropRegion {
    /// Share of the input height kept (0, 1]
    pub height_fraction: f64,
    /// Share of the input height skipped from the top
    pub y_offset_fraction: f64,
}

impl CropRegion {
    /// Cuts the top and bottom 8% of the frame, where platforms overlay
    /// their watermark. A fixed region, not a detector.
    pub const WATERMARK: CropRegion = CropRegion {
        height_fraction: 0.84,
        y_offset_fraction: 0.08,
    };
}

impl Default for CropRegion {
    fn default() -> Self {
        Self::WATERMARK
    }
}

impl From<&WatermarkConfig> for CropRegion {
    fn from(cfg: &WatermarkConfig) -> Self {
        Self {
            height_fraction: cfg.height_fraction,
            y_offset_fraction: cfg.y_offset_fraction,
        }
    }
}

/// One stage of a filter pipeline
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FilterStage {
    Fps(u32),
    Crop(CropRegion),
    /// Lanczos scale to `width`, height follows the aspect ratio
    Scale { width: u32 },
}

impl fmt::Display for FilterStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterStage::Fps(fps) => write!(f, "fps={}", fps),
            FilterStage::Crop(region) => write!(
                f,
                "crop=iw:ih*{}:0:ih*{}",
                region.height_fraction, region.y_offset_fraction
            ),
            FilterStage::Scale { width } => write!(f, "scale={}:-1:flags=lanczos", width),
        }
    }
}

/// Ordered, side-effect free description of per-frame transforms
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterPipeline {
    stages: Vec<FilterStage>,
}

impl FilterPipeline {
    pub fn stages(&self) -> &[FilterStage] {
        &self.stages
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// The chain as ffmpeg expects it in `-vf`, e.g. `fps=12,scale=480:-1:flags=lanczos`
    pub fn to_filter_string(&self) -> String {
        self.stages
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",")
    }

    /// The chain followed by `tail`, without a dangling comma when empty
    pub fn then(&self, tail: &str) -> String {
        if self.is_empty() {
            tail.to_string()
        } else {
            format!("{},{}", self.to_filter_string(), tail)
        }
    }
}

impl fmt::Display for FilterPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_filter_string())
    }
}

/// Build the filter pipeline; omitting every input yields a pass-through
pub fn build_filters(
    crop: Option<CropRegion>,
    width: Option<u32>,
    fps: Option<u32>,
) -> FilterPipeline {
    let mut stages = Vec::with_capacity(3);
    if let Some(fps) = fps {
        stages.push(FilterStage::Fps(fps));
    }
    if let Some(region) = crop {
        stages.push(FilterStage::Crop(region));
    }
    if let Some(width) = width {
        stages.push(FilterStage::Scale { width });
    }
    FilterPipeline { stages }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_full_pipeline_string() {
        let pipeline = build_filters(Some(CropRegion::WATERMARK), Some(480), Some(12));
        assert_eq!(
            pipeline.to_filter_string(),
            "fps=12,crop=iw:ih*0.84:0:ih*0.08,scale=480:-1:flags=lanczos"
        );
    }

    #[test]
    fn test_empty_pipeline_is_pass_through() {
        let pipeline = build_filters(None, None, None);
        assert!(pipeline.is_empty());
        assert_eq!(pipeline.to_filter_string(), "");
        assert_eq!(pipeline.then("palettegen"), "palettegen");
    }

    #[test]
    fn test_then_appends_tail() {
        let pipeline = build_filters(None, Some(320), None);
        assert_eq!(
            pipeline.then("palettegen=max_colors=256"),
            "scale=320:-1:flags=lanczos,palettegen=max_colors=256"
        );
    }

    #[test]
    fn test_crop_region_from_config() {
        let cfg = WatermarkConfig {
            height_fraction: 0.9,
            y_offset_fraction: 0.05,
        };
        let stage = FilterStage::Crop(CropRegion::from(&cfg));
        assert_eq!(stage.to_string(), "crop=iw:ih*0.9:0:ih*0.05");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_stage_order_is_fps_crop_scale(
            crop in proptest::bool::ANY,
            width in proptest::option::of(1u32..4096),
            fps in proptest::option::of(1u32..120),
        ) {
            let region = crop.then_some(CropRegion::WATERMARK);
            let pipeline = build_filters(region, width, fps);
            let stages = pipeline.stages();

            let expected_len = crop as usize + width.is_some() as usize + fps.is_some() as usize;
            prop_assert_eq!(stages.len(), expected_len);

            let rank = |s: &FilterStage| match s {
                FilterStage::Fps(_) => 0,
                FilterStage::Crop(_) => 1,
                FilterStage::Scale { .. } => 2,
            };
            prop_assert!(stages.windows(2).all(|w| rank(&w[0]) < rank(&w[1])));

            let rendered = pipeline.to_filter_string();
            prop_assert!(!rendered.starts_with(','));
            prop_assert!(!rendered.ends_with(','));
        }
    }
}
