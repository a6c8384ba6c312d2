//! Frame post-processing: alpha flattening, JPEG/GIF encoding and MP4 muxing

use std::io::ErrorKind;
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::Duration;

use image::codecs::gif::{GifEncoder, Repeat};
use image::codecs::jpeg::JpegEncoder;
use image::{Delay, DynamicImage, ExtendedColorType, Frame, ImageEncoder, ImageFormat, Rgb, RgbImage};

use crate::{Error, OutputKind, RenderConfig, Result};

const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";

/// Decode a PNG frame as captured by a backend
pub fn decode_png(bytes: &[u8]) -> Result<DynamicImage> {
    if !bytes.starts_with(PNG_SIGNATURE) {
        return Err(Error::EncodeError("frame is not PNG data".into()));
    }
    Ok(image::load_from_memory_with_format(bytes, ImageFormat::Png)?)
}

/// Composite the image over an opaque white background.
pub fn flatten_onto_white(image: &DynamicImage) -> RgbImage {
    let rgba = image.to_rgba8();
    let (width, height) = rgba.dimensions();
    let mut out = RgbImage::new(width, height);

    for (x, y, px) in rgba.enumerate_pixels() {
        let [r, g, b, a] = px.0;
        let alpha = a as u32;
        let blend = |c: u8| ((c as u32 * alpha + 255 * (255 - alpha) + 127) / 255) as u8;
        out.put_pixel(x, y, Rgb([blend(r), blend(g), blend(b)]));
    }
    out
}

/// Re-encode a PNG frame as JPEG on a white background
pub fn encode_jpeg(frame: &[u8], quality: u8) -> Result<Vec<u8>> {
    let rgb = flatten_onto_white(&decode_png(frame)?);
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100)).write_image(
        rgb.as_raw(),
        rgb.width(),
        rgb.height(),
        ExtendedColorType::Rgb8,
    )?;
    Ok(out)
}

/// Compose PNG frames into a GIF that loops forever, showing each frame for `frame_delay`.
pub fn encode_gif(frames: &[Vec<u8>], frame_delay: Duration) -> Result<Vec<u8>> {
    if frames.is_empty() {
        return Err(Error::EncodeError("no frames to encode".into()));
    }

    let delay = Delay::from_numer_denom_ms(frame_delay.as_millis() as u32, 1);
    let mut out = Vec::new();
    {
        let mut encoder = GifEncoder::new_with_speed(&mut out, 10);
        encoder.set_repeat(Repeat::Infinite)?;
        for bytes in frames {
            let flat = flatten_onto_white(&decode_png(bytes)?);
            let rgba = DynamicImage::ImageRgb8(flat).to_rgba8();
            encoder.encode_frame(Frame::from_parts(rgba, 0, 0, delay))?;
        }
    }
    Ok(out)
}

/// Turn captured frames into the bytes of the requested still/animated format.
pub fn encode_frames(kind: OutputKind, frames: Vec<Vec<u8>>, config: &RenderConfig) -> Result<Vec<u8>> {
    match kind {
        OutputKind::Png => {
            let first = frames
                .into_iter()
                .next()
                .ok_or_else(|| Error::EncodeError("no frame captured".into()))?;
            if !first.starts_with(PNG_SIGNATURE) {
                return Err(Error::EncodeError("frame is not PNG data".into()));
            }
            Ok(first)
        }
        OutputKind::Jpeg => {
            let first = frames
                .first()
                .ok_or_else(|| Error::EncodeError("no frame captured".into()))?;
            encode_jpeg(first, config.jpeg_quality)
        }
        OutputKind::Gif => encode_gif(&frames, config.gif_interval()),
        OutputKind::Mp4 => Err(Error::Unsupported(
            "video is recorded by a backend, not encoded from stills".into(),
        )),
    }
}

/// Mux a numbered PNG sequence (`frame_00000.png`, ...) in `frames_dir` into an
/// H.264 MP4 at `output` using `ffmpeg`.
pub fn mux_mp4(ffmpeg: &Path, frames_dir: &Path, frame_rate: f64, output: &Path) -> Result<()> {
    let result = Command::new(ffmpeg)
        .arg("-y")
        .args(["-loglevel", "error"])
        .args(["-framerate", &format!("{:.3}", frame_rate)])
        .arg("-i")
        .arg(frames_dir.join("frame_%05d.png"))
        .args(["-c:v", "libx264", "-pix_fmt", "yuv420p"])
        // libx264 needs even dimensions
        .args(["-vf", "scale=trunc(iw/2)*2:trunc(ih/2)*2"])
        .args(["-movflags", "+faststart"])
        .arg(output)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output();

    let out = match result {
        Ok(out) => out,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(Error::Unsupported(format!(
                "{} not found; cannot encode video",
                ffmpeg.display()
            )))
        }
        Err(e) => return Err(Error::Io(e)),
    };

    if !out.status.success() {
        let stderr = String::from_utf8_lossy(&out.stderr);
        return Err(Error::RenderError(format!(
            "ffmpeg exited with {}: {}",
            out.status,
            stderr.trim()
        )));
    }
    Ok(())
}
