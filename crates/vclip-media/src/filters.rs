//! FFmpeg video filter chains for clip output geometry.

use vclip_models::encoding::{output_dimensions, FAST_PATH_FPS};
use vclip_models::ClipOptions;

/// Build the geometry filter chain for a clip.
///
/// - explicit crop: crop, then scale to the output size
/// - named aspect ratio: fit inside the canvas and letterbox with black bars
/// - original aspect: scale down only, never up
pub fn build_filter_chain(options: &ClipOptions, source_width: u32, source_height: u32) -> String {
    let (width, height) = output_dimensions(options, source_width, source_height);

    if let Some(crop) = options.crop {
        return format!(
            "crop={}:{}:{}:{},scale={}:{},setsar=1",
            crop.width, crop.height, crop.x, crop.y, width, height
        );
    }

    if options.aspect_ratio.canvas_size().is_some() {
        return filter_letterbox(width, height);
    }

    format!("scale={}:{},setsar=1", width, height)
}

/// Filter chain for the in-process encoder: geometry, constant frame rate, 4:2:0 planar.
pub fn build_fast_path_filter(options: &ClipOptions, source_width: u32, source_height: u32) -> String {
    format!(
        "{},fps={},format=yuv420p",
        build_filter_chain(options, source_width, source_height),
        FAST_PATH_FPS
    )
}

/// Scale to fit inside `width`x`height` and pad the remainder.
pub fn filter_letterbox(width: u32, height: u32) -> String {
    format!(
        "scale={w}:{h}:force_original_aspect_ratio=decrease,pad={w}:{h}:(ow-iw)/2:(oh-ih)/2:color=black,setsar=1",
        w = width,
        h = height
    )
}

/// Build filter for analysis frame thumbnails.
pub fn filter_thumbnail(width: u32) -> String {
    format!("scale={}:-2", width)
}

#[cfg(test)]
mod tests {
    use super::*;
    use vclip_models::{CropRect, TargetAspect};

    #[test]
    fn test_crop_then_scale() {
        let options = ClipOptions {
            crop: Some(CropRect::new(656, 0, 608, 1080)),
            aspect_ratio: TargetAspect::Portrait,
            ..Default::default()
        };
        let filter = build_filter_chain(&options, 1920, 1080);
        assert!(filter.starts_with("crop=608:1080:656:0,scale=608:1080"));
    }

    #[test]
    fn test_letterbox_for_named_aspect() {
        let options = ClipOptions {
            aspect_ratio: TargetAspect::Square,
            ..Default::default()
        };
        let filter = build_filter_chain(&options, 1920, 1080);
        assert!(filter.contains("force_original_aspect_ratio=decrease"));
        assert!(filter.contains("pad=720:720"));
    }

    #[test]
    fn test_original_scales_down_only() {
        let options = ClipOptions::default();
        assert_eq!(build_filter_chain(&options, 3840, 2160), "scale=1280:720,setsar=1");
        assert_eq!(build_filter_chain(&options, 640, 360), "scale=640:360,setsar=1");
    }

    #[test]
    fn test_fast_path_filter() {
        let filter = build_fast_path_filter(&ClipOptions::default(), 1280, 720);
        assert!(filter.ends_with("fps=30,format=yuv420p"));
    }
}
