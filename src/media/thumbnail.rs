//! Thumbnail rendering into a fixed 320x180 PNG.
//!
//! - video: one frame 1 second in (needs the `ffmpeg` feature, otherwise a
//!   placeholder card)
//! - image: aspect-preserving fit, letterboxed on black
//! - audio: synthesized waveform
//!
//! Rendering runs on the background queue; callers only see logged errors.

use std::io::Cursor;
use std::path::Path;

use anyhow::{Context, Result};
use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use log::trace;
use uuid::Uuid;

use crate::entities::MediaType;
use crate::store::atomic;

pub const THUMB_WIDTH: u32 = 320;
pub const THUMB_HEIGHT: u32 = 180;
pub const VIDEO_SEEK_SECONDS: f64 = 1.0;

const BACKGROUND: Rgba<u8> = Rgba([16, 16, 20, 255]);

#[derive(Debug, Clone, Copy)]
pub struct Thumbnailer {
    width: u32,
    height: u32,
}

impl Default for Thumbnailer {
    fn default() -> Self {
        Self {
            width: THUMB_WIDTH,
            height: THUMB_HEIGHT,
        }
    }
}

impl Thumbnailer {
    /// Render a thumbnail of `source` to `target` (PNG).
    pub fn render(&self, source: &Path, media_type: MediaType, seed: Uuid, target: &Path) -> Result<()> {
        let canvas = match media_type {
            MediaType::Image => {
                let img = image::open(source)
                    .with_context(|| format!("decode image {}", source.display()))?;
                self.fit(&img)
            }
            MediaType::Audio => self.waveform(seed_of(seed)),
            MediaType::Video => self.video_frame(source, seed)?,
        };
        self.write_png(canvas, target)?;
        trace!("Thumbnail {} -> {}", source.display(), target.display());
        Ok(())
    }

    /// Cover image for a whole project.
    pub fn render_package_card(&self, title: &str, project_id: Uuid, target: &Path) -> Result<()> {
        let canvas = self.placeholder(seed_of(project_id));
        self.write_png(canvas, target)
            .with_context(|| format!("package thumbnail for '{}'", title))
    }

    /// Scale into the canvas keeping aspect ratio, centered.
    fn fit(&self, img: &DynamicImage) -> RgbaImage {
        let scaled = img.resize(self.width, self.height, FilterType::Triangle).to_rgba8();
        let mut canvas = RgbaImage::from_pixel(self.width, self.height, BACKGROUND);
        let x = (self.width - scaled.width().min(self.width)) / 2;
        let y = (self.height - scaled.height().min(self.height)) / 2;
        imageops::overlay(&mut canvas, &scaled, x as i64, y as i64);
        canvas
    }

    fn waveform(&self, seed: u64) -> RgbaImage {
        let mut canvas = RgbaImage::from_pixel(self.width, self.height, BACKGROUND);
        let mid = self.height as f64 / 2.0;
        let phase = (seed % 997) as f64 / 97.0;
        let bar = Rgba([88, 196, 255, 255]);

        for x in (0..self.width).step_by(4) {
            let t = x as f64;
            let envelope = 0.35 + 0.65 * ((t / self.width as f64) * std::f64::consts::PI).sin();
            let wobble = ((t * 0.13 + phase).sin() * 0.6 + (t * 0.041 + phase * 1.7).sin() * 0.4).abs();
            let amplitude = (wobble * envelope * mid * 0.85).max(1.0);
            let top = (mid - amplitude).max(0.0) as u32;
            let bottom = ((mid + amplitude) as u32).min(self.height - 1);
            for px in x..(x + 3).min(self.width) {
                for py in top..=bottom {
                    canvas.put_pixel(px, py, bar);
                }
            }
        }
        canvas
    }

    /// Diagonal gradient tinted by `seed`.
    fn placeholder(&self, seed: u64) -> RgbaImage {
        let tint = [(seed & 0xff) as u8, ((seed >> 8) & 0xff) as u8, ((seed >> 16) & 0xff) as u8];
        RgbaImage::from_fn(self.width, self.height, |x, y| {
            let t = (x + y) as f32 / (self.width + self.height) as f32;
            let c = |v: u8| (v as f32 * (0.25 + 0.5 * t) + 20.0).min(255.0) as u8;
            Rgba([c(tint[0]), c(tint[1]), c(tint[2]), 255])
        })
    }

    #[cfg(feature = "ffmpeg")]
    fn video_frame(&self, source: &Path, _seed: Uuid) -> Result<RgbaImage> {
        let frame = super::extract_video_frame(source, VIDEO_SEEK_SECONDS)?;
        Ok(self.fit(&DynamicImage::ImageRgba8(frame)))
    }

    #[cfg(not(feature = "ffmpeg"))]
    fn video_frame(&self, source: &Path, seed: Uuid) -> Result<RgbaImage> {
        log::debug!(
            "No video decoder (built without ffmpeg), placeholder thumbnail for {}",
            source.display()
        );
        Ok(self.placeholder(seed_of(seed)))
    }

    fn write_png(&self, canvas: RgbaImage, target: &Path) -> Result<()> {
        let mut bytes = Vec::new();
        DynamicImage::ImageRgba8(canvas)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .context("encode PNG")?;
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        atomic::write_atomic(target, &bytes)
            .with_context(|| format!("write {}", target.display()))?;
        Ok(())
    }
}

fn seed_of(id: Uuid) -> u64 {
    let v = id.as_u128();
    (v as u64) ^ ((v >> 64) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn assert_thumb(path: &Path) {
        let img = image::open(path).unwrap();
        assert_eq!((img.width(), img.height()), (THUMB_WIDTH, THUMB_HEIGHT));
    }

    #[test]
    fn test_image_is_letterboxed() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("tall.png");
        RgbaImage::from_pixel(100, 400, Rgba([255, 0, 0, 255]))
            .save(&source)
            .unwrap();

        let target = tmp.path().join("thumbnails/a.png");
        Thumbnailer::default()
            .render(&source, MediaType::Image, Uuid::new_v4(), &target)
            .unwrap();
        assert_thumb(&target);

        let thumb = image::open(&target).unwrap().to_rgba8();
        // Tall source: bars left and right, content in the middle
        assert_eq!(*thumb.get_pixel(0, 90), BACKGROUND);
        assert_eq!(thumb.get_pixel(160, 90)[0], 255);
    }

    #[test]
    fn test_audio_waveform_is_deterministic() {
        let tmp = TempDir::new().unwrap();
        let id = Uuid::new_v4();
        let a = tmp.path().join("a.png");
        let b = tmp.path().join("b.png");
        let t = Thumbnailer::default();
        t.render(Path::new("unused.wav"), MediaType::Audio, id, &a).unwrap();
        t.render(Path::new("unused.wav"), MediaType::Audio, id, &b).unwrap();
        assert_thumb(&a);
        assert_eq!(std::fs::read(&a).unwrap(), std::fs::read(&b).unwrap());
    }

    #[test]
    fn test_broken_image_errors() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("broken.png");
        std::fs::write(&source, b"nope").unwrap();
        let target = tmp.path().join("t.png");
        assert!(
            Thumbnailer::default()
                .render(&source, MediaType::Image, Uuid::new_v4(), &target)
                .is_err()
        );
        assert!(!target.exists());
    }

    #[test]
    fn test_package_card() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("package.png");
        Thumbnailer::default()
            .render_package_card("Show", Uuid::new_v4(), &target)
            .unwrap();
        assert_thumb(&target);
    }
}
