use std::fs;
use std::path::{Path, PathBuf};

use image::{GrayImage, ImageError, ImageFormat, RgbImage};

use crate::error::{ExtractError, Result};
use crate::frame::VideoFrame;

/// Stable, index-addressable file name for a keyframe.
pub fn keyframe_file_name(frame_number: usize) -> String {
    format!("keyframe_{frame_number:06}.png")
}

pub fn ensure_output_dir(output_dir: &Path) -> Result<()> {
    fs::create_dir_all(output_dir).map_err(|source| ExtractError::IoFailure {
        path: output_dir.to_path_buf(),
        source,
    })
}

/// Encode `frame` as PNG into `output_dir`; returns the written path.
pub fn write_keyframe_image(frame: &VideoFrame, output_dir: &Path) -> Result<PathBuf> {
    let path = output_dir.join(keyframe_file_name(frame.frame_number()));
    let (width, height) = (frame.width() as u32, frame.height() as u32);

    let saved = match frame.channels() {
        1 => GrayImage::from_raw(width, height, frame.data().to_vec())
            .map(|img| img.save_with_format(&path, ImageFormat::Png)),
        3 => RgbImage::from_raw(width, height, frame.data().to_vec())
            .map(|img| img.save_with_format(&path, ImageFormat::Png)),
        _ => None,
    };

    match saved {
        Some(Ok(())) => Ok(path),
        Some(Err(e)) => Err(ExtractError::IoFailure {
            path,
            source: into_io_error(e),
        }),
        None => Err(ExtractError::invalid(format!(
            "frame {}: cannot encode {} channel image",
            frame.frame_number(),
            frame.channels()
        ))),
    }
}

fn into_io_error(err: ImageError) -> std::io::Error {
    match err {
        ImageError::IoError(e) => e,
        other => std::io::Error::other(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_file_names_are_stable() {
        assert_eq!(keyframe_file_name(0), "keyframe_000000.png");
        assert_eq!(keyframe_file_name(1234), "keyframe_001234.png");
    }

    #[test]
    fn test_write_gray_and_rgb() {
        let dir = tempdir().unwrap();
        let gray = VideoFrame::new(3, 4, 2, (0..8).collect()).unwrap();
        let rgb = VideoFrame::with_channels(9, 2, 2, 3, vec![200u8; 12]).unwrap();

        let gray_path = write_keyframe_image(&gray, dir.path()).unwrap();
        let rgb_path = write_keyframe_image(&rgb, dir.path()).unwrap();

        assert_eq!(gray_path, dir.path().join("keyframe_000003.png"));
        let decoded = image::open(&gray_path).unwrap().into_luma8();
        assert_eq!(decoded.dimensions(), (4, 2));
        assert_eq!(decoded.into_raw(), (0..8).collect::<Vec<u8>>());

        let decoded = image::open(&rgb_path).unwrap().into_rgb8();
        assert_eq!(decoded.dimensions(), (2, 2));
    }

    #[test]
    fn test_write_failure_is_io_failure() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("does-not-exist");
        let frame = VideoFrame::new(0, 2, 2, vec![0u8; 4]).unwrap();

        let err = write_keyframe_image(&frame, &missing).unwrap_err();
        assert!(matches!(err, ExtractError::IoFailure { .. }));
    }
}
