//! FFmpeg-backed frame extraction (feature `ffmpeg`).

use std::path::Path;
use std::sync::Once;

use anyhow::{Context, Result, anyhow};
use image::RgbaImage;
use log::debug;
use playa_ffmpeg as ffmpeg;

static FFMPEG_INIT: Once = Once::new();

pub fn ffmpeg_init() {
    FFMPEG_INIT.call_once(|| {
        if let Err(e) = ffmpeg::init() {
            log::warn!("FFmpeg init failed: {}", e);
        }
        unsafe {
            // Silence libav's own stderr logging
            ffmpeg::ffi::av_log_set_level(ffmpeg::ffi::AV_LOG_QUIET);
        }
    });
}

/// Decode the first frame at or after `at_seconds` as RGBA.
///
/// Clips shorter than `at_seconds` fall back to their first frame.
pub fn extract_video_frame(path: &Path, at_seconds: f64) -> Result<RgbaImage> {
    ffmpeg_init();

    let mut ictx = ffmpeg::format::input(&path).with_context(|| format!("open {}", path.display()))?;

    let (stream_idx, params) = {
        let stream = ictx
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| anyhow!("No video stream found"))?;
        (stream.index(), stream.parameters())
    };

    let decoder_ctx = ffmpeg::codec::context::Context::from_parameters(params)
        .context("create decoder context")?;
    let mut decoder = decoder_ctx.decoder().video().context("create video decoder")?;
    let (width, height) = (decoder.width(), decoder.height());

    let mut scaler = ffmpeg::software::scaling::Context::get(
        decoder.format(),
        width,
        height,
        ffmpeg::format::Pixel::RGBA,
        width,
        height,
        ffmpeg::software::scaling::Flags::BILINEAR,
    )
    .context("create scaler")?;

    let target_ts = (at_seconds * ffmpeg::ffi::AV_TIME_BASE as f64) as i64;
    let duration = ictx.duration();
    if duration <= 0 || duration > target_ts {
        if let Err(e) = ictx.seek(target_ts, ..target_ts) {
            debug!("Seek to {}s failed for {}: {}", at_seconds, path.display(), e);
        }
    }

    let mut decoded = ffmpeg::util::frame::video::Video::empty();
    for (stream, packet) in ictx.packets() {
        if stream.index() != stream_idx {
            continue;
        }
        if decoder.send_packet(&packet).is_err() {
            continue;
        }
        if decoder.receive_frame(&mut decoded).is_ok() {
            return to_image(&mut scaler, &decoded, width, height);
        }
    }

    decoder.send_eof().ok();
    if decoder.receive_frame(&mut decoded).is_ok() {
        return to_image(&mut scaler, &decoded, width, height);
    }
    Err(anyhow!("No decodable frame in {}", path.display()))
}

fn to_image(
    scaler: &mut ffmpeg::software::scaling::Context,
    decoded: &ffmpeg::util::frame::video::Video,
    width: u32,
    height: u32,
) -> Result<RgbaImage> {
    let mut rgba = ffmpeg::util::frame::video::Video::empty();
    scaler.run(decoded, &mut rgba).context("convert frame to RGBA")?;

    let stride = rgba.stride(0);
    let data = rgba.data(0);
    let row_bytes = width as usize * 4;
    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        pixels.extend_from_slice(&data[start..start + row_bytes]);
    }
    RgbaImage::from_raw(width, height, pixels).ok_or_else(|| anyhow!("frame buffer size mismatch"))
}
