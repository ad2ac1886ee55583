//! Image resizing for pre-processing source frames.

use std::path::Path;

use image::imageops::FilterType;

/// Target geometry: exact pixel dimensions or a uniform scale factor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ResizeSpec {
    Exact { width: u32, height: u32 },
    Scale(f32),
}

/// Errors from resize operations.
#[derive(Debug, thiserror::Error)]
pub enum ResizeError {
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("invalid resize spec: {0}")]
    InvalidSpec(String),
}

impl ResizeSpec {
    /// Resolve the output dimensions for a source of `width` x `height`.
    pub fn target_dimensions(&self, width: u32, height: u32) -> Result<(u32, u32), ResizeError> {
        match *self {
            ResizeSpec::Exact { width: w, height: h } => {
                if w == 0 || h == 0 {
                    return Err(ResizeError::InvalidSpec("dimensions must be non-zero".into()));
                }
                Ok((w, h))
            }
            ResizeSpec::Scale(factor) => {
                if !(factor.is_finite() && factor > 0.0) {
                    return Err(ResizeError::InvalidSpec(format!(
                        "scale factor must be positive and finite, got {factor}"
                    )));
                }
                let w = ((width as f32) * factor).round().max(1.0) as u32;
                let h = ((height as f32) * factor).round().max(1.0) as u32;
                Ok((w, h))
            }
        }
    }
}

/// Resize the image at `src` and write the result to `dest`.
///
/// The output format follows the `dest` extension. Aspect ratio is not
/// preserved for [`ResizeSpec::Exact`]; that is the caller's choice.
pub fn resize_image(
    src: impl AsRef<Path>,
    spec: ResizeSpec,
    dest: impl AsRef<Path>,
) -> Result<(), ResizeError> {
    let img = image::open(src)?;
    let (w, h) = spec.target_dimensions(img.width(), img.height())?;
    let resized = img.resize_exact(w, h, FilterType::Lanczos3);
    resized.save(dest)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_spec_returns_requested_dimensions() {
        let spec = ResizeSpec::Exact { width: 512, height: 768 };
        assert_eq!(spec.target_dimensions(1024, 1024).unwrap(), (512, 768));
    }

    #[test]
    fn scale_spec_multiplies_both_axes() {
        let spec = ResizeSpec::Scale(0.5);
        assert_eq!(spec.target_dimensions(1024, 768).unwrap(), (512, 384));
    }

    #[test]
    fn tiny_scale_never_collapses_to_zero() {
        let spec = ResizeSpec::Scale(0.001);
        assert_eq!(spec.target_dimensions(100, 100).unwrap(), (1, 1));
    }

    #[test]
    fn zero_dimensions_rejected() {
        let spec = ResizeSpec::Exact { width: 0, height: 10 };
        assert!(spec.target_dimensions(100, 100).is_err());
    }

    #[test]
    fn non_positive_scale_rejected() {
        assert!(ResizeSpec::Scale(0.0).target_dimensions(10, 10).is_err());
        assert!(ResizeSpec::Scale(-1.0).target_dimensions(10, 10).is_err());
        assert!(ResizeSpec::Scale(f32::NAN).target_dimensions(10, 10).is_err());
    }
}
