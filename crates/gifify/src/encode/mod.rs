//! Encoding modules for GIFify

pub mod gif;
pub mod video;

pub use gif::{
    clamp_start_width, seek_target_size, DegradationPolicy, EncodeAttempt, FfmpegGifPass,
    GifEncodeParams, GifEncoder, GifError, GifOutcome, GifPass, GifPassRunner,
};
pub use video::{build_video_args, VideoEncodeParams, VideoEncoder, VideoError, VideoFormat};

use serde::{Deserialize, Serialize};

/// Optional clip window applied to the input of every encode pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Trim {
    /// Seek offset into the source, in seconds
    pub start_secs: Option<f64>,
    /// Length of the clip, in seconds
    pub duration_secs: Option<f64>,
}

impl Trim {
    pub fn new(start_secs: Option<f64>, duration_secs: Option<f64>) -> Self {
        Self {
            start_secs,
            duration_secs,
        }
    }

    /// `-ss`/`-t` input options; they precede `-i` so ffmpeg seeks the input
    pub fn input_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(start) = self.start_secs {
            args.push("-ss".to_string());
            args.push(format_seconds(start));
        }
        if let Some(duration) = self.duration_secs {
            args.push("-t".to_string());
            args.push(format_seconds(duration));
        }
        args
    }
}

/// Seconds as ffmpeg accepts them: `5` or `2.500`
pub fn format_seconds(secs: f64) -> String {
    if secs.fract() == 0.0 {
        format!("{}", secs as u64)
    } else {
        format!("{:.3}", secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trim_args() {
        assert!(Trim::default().input_args().is_empty());
        assert_eq!(
            Trim::new(Some(5.0), Some(2.5)).input_args(),
            vec!["-ss", "5", "-t", "2.500"]
        );
        assert_eq!(Trim::new(None, Some(3.0)).input_args(), vec!["-t", "3"]);
    }
}
