use image::{DynamicImage, GrayImage};
use imgprep_core::{PreprocessConfig, StrategyKind};
use imgprep_storage::StorageError;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::transform;

/// Upper bound on output pixels; larger results are refused rather than
/// allocated.
pub const MAX_OUTPUT_PIXELS: u64 = 25_000_000;

#[derive(Debug, Error)]
pub enum PreprocessError {
    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to load image {}: {source}", path.display())]
    Load {
        path: PathBuf,
        source: image::ImageError,
    },
    #[error("Image {} has no pixels", path.display())]
    Empty { path: PathBuf },
    #[error("Image {} would produce a {width}x{height} output", path.display())]
    TooLarge { path: PathBuf, width: u32, height: u32 },
    #[error("Failed to encode processed image {}: {reason}", path.display())]
    Encode { path: PathBuf, reason: String },
    #[error("Failed to store processed image {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: StorageError,
    },
    #[error("Source has no file name: {}", .0.display())]
    NoFileName(PathBuf),
}

impl PreprocessError {
    /// The image the failure relates to.
    pub fn source_path(&self) -> &Path {
        match self {
            PreprocessError::Read { path, .. }
            | PreprocessError::Load { path, .. }
            | PreprocessError::Empty { path }
            | PreprocessError::TooLarge { path, .. }
            | PreprocessError::Encode { path, .. }
            | PreprocessError::Write { path, .. } => path,
            PreprocessError::NoFileName(path) => path,
        }
    }
}

/// The fixed transform sequence applied to every image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PreprocessStrategy {
    /// grayscale → median denoise → fit → center-pad on white.
    OcrPrep {
        canvas_width: u32,
        canvas_height: u32,
        median_radius: u32,
    },
    /// grayscale → resize to `base_width` → Gaussian blur → Otsu binarization.
    VisionPrep { base_width: u32, blur_sigma: f32 },
}

impl PreprocessStrategy {
    pub fn from_config(cfg: &PreprocessConfig) -> Self {
        match cfg.strategy {
            StrategyKind::Ocr => PreprocessStrategy::OcrPrep {
                canvas_width: cfg.canvas_width,
                canvas_height: cfg.canvas_height,
                median_radius: cfg.median_radius,
            },
            StrategyKind::Vision => PreprocessStrategy::VisionPrep {
                base_width: cfg.base_width,
                blur_sigma: cfg.blur_sigma,
            },
        }
    }

    pub fn kind(&self) -> StrategyKind {
        match self {
            PreprocessStrategy::OcrPrep { .. } => StrategyKind::Ocr,
            PreprocessStrategy::VisionPrep { .. } => StrategyKind::Vision,
        }
    }

    /// Size of the image [`PreprocessStrategy::apply`] returns for a
    /// `width × height` input.
    pub fn output_dimensions(&self, width: u32, height: u32) -> (u32, u32) {
        match *self {
            PreprocessStrategy::OcrPrep { canvas_width, canvas_height, .. } => {
                (canvas_width, canvas_height)
            }
            PreprocessStrategy::VisionPrep { base_width, .. } => {
                (base_width, transform::scaled_height(width, height, base_width))
            }
        }
    }

    pub fn apply(&self, img: &DynamicImage) -> GrayImage {
        let gray = transform::grayscale(img);
        match *self {
            PreprocessStrategy::OcrPrep { canvas_width, canvas_height, median_radius } => {
                let denoised = transform::median_denoise(&gray, median_radius);
                transform::resize_and_pad(&denoised, canvas_width, canvas_height, transform::WHITE)
            }
            PreprocessStrategy::VisionPrep { base_width, blur_sigma } => {
                let resized = transform::resize_to_width(&gray, base_width);
                let blurred = transform::gaussian_blur(&resized, blur_sigma);
                transform::otsu_binarize(&blurred)
            }
        }
    }
}

pub struct Preprocessor {
    strategy: PreprocessStrategy,
}

impl Preprocessor {
    pub fn new(strategy: PreprocessStrategy) -> Self {
        Self { strategy }
    }

    pub fn from_config(cfg: &PreprocessConfig) -> Self {
        Self::new(PreprocessStrategy::from_config(cfg))
    }

    pub fn strategy(&self) -> PreprocessStrategy {
        self.strategy
    }

    /// Same base filename as `source`, under `out_dir`.
    pub fn output_path(source: &Path, out_dir: &Path) -> Result<PathBuf, PreprocessError> {
        let name = source
            .file_name()
            .ok_or_else(|| PreprocessError::NoFileName(source.to_path_buf()))?;
        Ok(out_dir.join(name))
    }

    /// Transform the image at `source` and store it under `out_dir`.
    /// Blocking; run on a blocking thread from async code.
    pub fn process_file(&self, source: &Path, out_dir: &Path) -> Result<PathBuf, PreprocessError> {
        let dest = Self::output_path(source, out_dir)?;
        let data = std::fs::read(source).map_err(|e| PreprocessError::Read {
            path: source.to_path_buf(),
            source: e,
        })?;
        let encoded = self.process_bytes(&data, source)?;
        imgprep_storage::write_atomic_blocking(&dest, &encoded).map_err(|e| {
            PreprocessError::Write { path: source.to_path_buf(), source: e }
        })?;
        tracing::info!("Preprocessed and saved image: {}", dest.display());
        Ok(dest)
    }

    /// Decode `data` (any supported format), transform it, and return JPEG
    /// bytes. `origin` names the image in errors.
    pub fn process_bytes(&self, data: &[u8], origin: &Path) -> Result<Vec<u8>, PreprocessError> {
        let img = image::load_from_memory(data).map_err(|e| PreprocessError::Load {
            path: origin.to_path_buf(),
            source: e,
        })?;
        if img.width() == 0 || img.height() == 0 {
            return Err(PreprocessError::Empty { path: origin.to_path_buf() });
        }
        let (width, height) = self.strategy.output_dimensions(img.width(), img.height());
        if u64::from(width) * u64::from(height) > MAX_OUTPUT_PIXELS {
            return Err(PreprocessError::TooLarge { path: origin.to_path_buf(), width, height });
        }
        encode_as_jpeg(self.strategy.apply(&img), origin)
    }
}

fn encode_as_jpeg(img: GrayImage, origin: &Path) -> Result<Vec<u8>, PreprocessError> {
    let mut buf = Vec::new();
    DynamicImage::ImageLuma8(img)
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Jpeg)
        .map_err(|e| PreprocessError::Encode {
            path: origin.to_path_buf(),
            reason: e.to_string(),
        })?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Luma, Rgb, RgbImage};

    fn png_bytes(img: DynamicImage) -> Vec<u8> {
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png).unwrap();
        buf
    }

    fn product_photo(width: u32, height: u32) -> DynamicImage {
        // Dark label on a light background.
        let img: RgbImage = ImageBuffer::from_fn(width, height, |x, y| {
            let on_label = x > width / 4 && x < 3 * width / 4 && y > height / 3 && y < 2 * height / 3;
            if on_label { Rgb([20, 30, 40]) } else { Rgb([230, 225, 210]) }
        });
        DynamicImage::ImageRgb8(img)
    }

    fn ocr() -> Preprocessor {
        Preprocessor::from_config(&PreprocessConfig {
            strategy: StrategyKind::Ocr,
            ..PreprocessConfig::default()
        })
    }

    fn vision() -> Preprocessor {
        Preprocessor::from_config(&PreprocessConfig::default())
    }

    #[test]
    fn ocr_prep_produces_fixed_canvas() {
        let out = ocr().strategy().apply(&product_photo(400, 200));
        assert_eq!(out.dimensions(), (256, 256));
        // Padding band above the content is pure white.
        assert!((0..256).all(|x| out.get_pixel(x, 0)[0] == 255));
    }

    #[test]
    fn vision_prep_resizes_to_base_width_and_binarizes() {
        let out = vision().strategy().apply(&product_photo(1000, 400));
        assert_eq!(out.dimensions(), (500, 200));
        assert!(out.pixels().all(|p| p[0] == 0 || p[0] == 255));
        assert_eq!(out.get_pixel(250, 100)[0], 0);
        assert_eq!(out.get_pixel(5, 5)[0], 255);
    }

    #[test]
    fn vision_prep_upscales_small_images() {
        let out = vision().strategy().apply(&product_photo(100, 50));
        assert_eq!(out.dimensions(), (500, 250));
    }

    #[test]
    fn strategy_from_config_carries_parameters() {
        let cfg = PreprocessConfig {
            strategy: StrategyKind::Ocr,
            canvas_width: 128,
            canvas_height: 64,
            median_radius: 2,
            ..PreprocessConfig::default()
        };
        assert_eq!(
            PreprocessStrategy::from_config(&cfg),
            PreprocessStrategy::OcrPrep { canvas_width: 128, canvas_height: 64, median_radius: 2 }
        );
        assert_eq!(PreprocessStrategy::from_config(&cfg).kind(), StrategyKind::Ocr);
    }

    #[test]
    fn process_bytes_returns_jpeg() {
        let out = ocr()
            .process_bytes(&png_bytes(product_photo(64, 64)), Path::new("mem.png"))
            .unwrap();
        // JPEG SOI marker.
        assert_eq!(&out[..2], &[0xFF, 0xD8]);
        let decoded = image::load_from_memory(&out).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (256, 256));
    }

    #[test]
    fn corrupt_bytes_fail_with_origin() {
        let err = vision()
            .process_bytes(b"<html>not an image</html>", Path::new("raw/3_x.jpg"))
            .unwrap_err();
        assert!(matches!(err, PreprocessError::Load { .. }));
        assert_eq!(err.source_path(), Path::new("raw/3_x.jpg"));
    }

    #[test]
    fn process_file_keeps_base_name() {
        let dir = tempfile::tempdir().unwrap();
        let raw = dir.path().join("raw");
        let out = dir.path().join("processed");
        std::fs::create_dir_all(&raw).unwrap();
        let source = raw.join("0_item_weight.jpg");
        // Real downloads are often PNG or WEBP behind a .jpg name.
        std::fs::write(&source, png_bytes(product_photo(300, 120))).unwrap();

        let dest = vision().process_file(&source, &out).unwrap();
        assert_eq!(dest, out.join("0_item_weight.jpg"));
        let decoded = image::open(&dest).unwrap();
        assert_eq!(decoded.width(), 500);
    }

    #[test]
    fn process_file_missing_source() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("gone.jpg");
        let err = vision().process_file(&source, dir.path()).unwrap_err();
        assert!(matches!(err, PreprocessError::Read { .. }));
        assert_eq!(err.source_path(), source.as_path());
    }

    #[test]
    fn extreme_aspect_ratio_is_refused_before_resizing() {
        let sliver = DynamicImage::ImageLuma8(ImageBuffer::from_pixel(1, 4000, Luma([40u8])));
        let err = vision()
            .process_bytes(&png_bytes(sliver.clone()), Path::new("raw/7_x.jpg"))
            .unwrap_err();
        assert!(matches!(
            err,
            PreprocessError::TooLarge { width: 500, height: 2_000_000, .. }
        ));
        assert_eq!(err.source_path(), Path::new("raw/7_x.jpg"));

        // The fixed canvas is unaffected by the input's shape.
        let out = ocr().process_bytes(&png_bytes(sliver), Path::new("raw/7_x.jpg")).unwrap();
        assert_eq!(image::load_from_memory(&out).unwrap().height(), 256);
    }

    #[test]
    fn output_dimensions_match_apply() {
        let photo = product_photo(300, 120);
        for p in [ocr(), vision()] {
            let out = p.strategy().apply(&photo);
            assert_eq!(p.strategy().output_dimensions(300, 120), out.dimensions());
        }
    }

    #[test]
    fn grayscale_input_is_accepted() {
        let img: GrayImage = ImageBuffer::from_fn(40, 40, |x, _| Luma([(x * 6) as u8]));
        let out = ocr().strategy().apply(&DynamicImage::ImageLuma8(img));
        assert_eq!(out.dimensions(), (256, 256));
    }
}
