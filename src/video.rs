//! ffmpeg-backed video decoding into GL textures.
//!
//! `ffprobe` reports the stream size and frame rate once; a long-lived `ffmpeg`
//! child then streams raw `rgb24` frames over its stdout. A short read is end of
//! stream, and rewinding respawns the child.

use std::io::Read;
use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::rc::Rc;

use glow::HasContext;
use serde::Deserialize;

use warpeye_engine::texture::{
    FrameDecoder, LoopingTexture, SourceFactory, TextureHandle, TextureSink, VideoFrame, VideoTextureSource,
};
use warpeye_engine::{logd, logw, EngineError};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamInfo {
    pub width: u32,
    pub height: u32,
    pub fps: Option<f32>,
}

#[derive(Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
}

#[derive(Deserialize)]
struct ProbeOut {
    streams: Vec<ProbeStream>,
}

/// `"30000/1001"` -> 29.97. Zero or malformed rates are unknown.
fn parse_rate(raw: &str) -> Option<f32> {
    let (num, den) = raw.split_once('/').unwrap_or((raw, "1"));
    let num: f32 = num.trim().parse().ok()?;
    let den: f32 = den.trim().parse().ok()?;
    let fps = num / den;
    (fps.is_finite() && fps > 0.0).then_some(fps)
}

fn parse_probe(path: &Path, json: &[u8]) -> Result<StreamInfo, EngineError> {
    let parsed: ProbeOut = serde_json::from_slice(json).map_err(|e| EngineError::Json {
        path: path.to_path_buf(),
        source: e,
    })?;
    let stream = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| EngineError::playback(path, "no video stream"))?;
    let (Some(width), Some(height)) = (stream.width, stream.height) else {
        return Err(EngineError::playback(path, "video stream has no size"));
    };
    if width == 0 || height == 0 {
        return Err(EngineError::playback(path, "video stream has zero size"));
    }
    let fps = stream
        .avg_frame_rate
        .as_deref()
        .and_then(parse_rate)
        .or_else(|| stream.r_frame_rate.as_deref().and_then(parse_rate));
    Ok(StreamInfo { width, height, fps })
}

pub fn probe(path: &Path) -> Result<StreamInfo, EngineError> {
    let out = Command::new("ffprobe")
        .args(["-v", "error", "-print_format", "json", "-show_streams"])
        .arg(path)
        .output()
        .map_err(|e| EngineError::playback(path, format!("failed to run ffprobe: {e}")))?;
    if !out.status.success() {
        return Err(EngineError::playback(
            path,
            format!("ffprobe failed: {}", String::from_utf8_lossy(&out.stderr).trim()),
        ));
    }
    parse_probe(path, &out.stdout)
}

pub struct FfmpegDecoder {
    path: PathBuf,
    info: StreamInfo,
    child: Option<Child>,
    stdout: Option<ChildStdout>,
    frame: VideoFrame,
}

impl FfmpegDecoder {
    pub fn open(path: &Path) -> Result<Self, EngineError> {
        let info = probe(path)?;
        let mut dec = Self {
            path: path.to_path_buf(),
            info,
            child: None,
            stdout: None,
            frame: VideoFrame {
                width: info.width,
                height: info.height,
                data: vec![0; info.width as usize * info.height as usize * 3],
            },
        };
        dec.spawn()?;
        Ok(dec)
    }

    pub fn info(&self) -> StreamInfo {
        self.info
    }

    fn spawn(&mut self) -> Result<(), EngineError> {
        // GL wants the bottom row first.
        let mut child = Command::new("ffmpeg")
            .args(["-v", "error", "-nostdin", "-i"])
            .arg(&self.path)
            .args(["-an", "-vf", "vflip", "-f", "rawvideo", "-pix_fmt", "rgb24", "pipe:1"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| EngineError::playback(&self.path, format!("failed to run ffmpeg: {e}")))?;
        self.stdout = child.stdout.take();
        self.child = Some(child);
        logd!("VIDEO", "ffmpeg spawned for {}", self.path.display());
        Ok(())
    }
}

impl FrameDecoder for FfmpegDecoder {
    fn read_frame(&mut self) -> Option<&VideoFrame> {
        let stdout = self.stdout.as_mut()?;
        match stdout.read_exact(&mut self.frame.data) {
            Ok(()) => Some(&self.frame),
            Err(e) => {
                if e.kind() != std::io::ErrorKind::UnexpectedEof {
                    logw!("VIDEO", "read failed for {}: {e}", self.path.display());
                }
                None
            }
        }
    }

    fn rewind(&mut self) -> Result<(), EngineError> {
        self.close();
        self.spawn()
    }

    fn fps(&self) -> Option<f32> {
        self.info.fps
    }

    fn close(&mut self) {
        self.stdout = None;
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

impl Drop for FfmpegDecoder {
    fn drop(&mut self) {
        self.close();
    }
}

/// Uploads frames into GL textures. Must only be used with the context current.
pub struct GlTextureSink {
    gl: Rc<glow::Context>,
    // size of the storage last allocated, reallocated when a frame differs
    allocated: Option<(u32, u32)>,
}

impl GlTextureSink {
    pub fn new(gl: Rc<glow::Context>) -> Self {
        Self { gl, allocated: None }
    }
}

fn native(handle: TextureHandle) -> Option<glow::NativeTexture> {
    NonZeroU32::new(handle.0).map(glow::NativeTexture)
}

impl TextureSink for GlTextureSink {
    fn create(&mut self) -> Result<TextureHandle, EngineError> {
        let gl = &self.gl;
        unsafe {
            let tex = gl
                .create_texture()
                .map_err(|e| EngineError::playback("<gl>", format!("create_texture: {e}")))?;
            gl.bind_texture(glow::TEXTURE_2D, Some(tex));
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MAG_FILTER, glow::LINEAR as i32);
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MIN_FILTER, glow::LINEAR_MIPMAP_LINEAR as i32);
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_WRAP_S, glow::REPEAT as i32);
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_WRAP_T, glow::REPEAT as i32);
            gl.bind_texture(glow::TEXTURE_2D, None);
            Ok(TextureHandle(tex.0.get()))
        }
    }

    fn upload(&mut self, handle: TextureHandle, frame: &VideoFrame) {
        let Some(tex) = native(handle) else {
            return;
        };
        let gl = &self.gl;
        let (w, h) = (frame.width as i32, frame.height as i32);
        unsafe {
            gl.bind_texture(glow::TEXTURE_2D, Some(tex));
            gl.pixel_store_i32(glow::UNPACK_ALIGNMENT, 1);
            if self.allocated == Some((frame.width, frame.height)) {
                gl.tex_sub_image_2d(
                    glow::TEXTURE_2D,
                    0,
                    0,
                    0,
                    w,
                    h,
                    glow::RGB,
                    glow::UNSIGNED_BYTE,
                    glow::PixelUnpackData::Slice(Some(&frame.data)),
                );
            } else {
                gl.tex_image_2d(
                    glow::TEXTURE_2D,
                    0,
                    glow::RGB8 as i32,
                    w,
                    h,
                    0,
                    glow::RGB,
                    glow::UNSIGNED_BYTE,
                    glow::PixelUnpackData::Slice(Some(&frame.data)),
                );
                self.allocated = Some((frame.width, frame.height));
            }
            gl.generate_mipmap(glow::TEXTURE_2D);
            gl.bind_texture(glow::TEXTURE_2D, None);
        }
    }

    fn delete(&mut self, handle: TextureHandle) {
        if let Some(tex) = native(handle) {
            unsafe { self.gl.delete_texture(tex) };
        }
        self.allocated = None;
    }
}

/// Opens scene videos as looping GL textures.
pub struct GlSourceFactory {
    gl: Rc<glow::Context>,
}

impl GlSourceFactory {
    pub fn new(gl: Rc<glow::Context>) -> Self {
        Self { gl }
    }
}

impl SourceFactory for GlSourceFactory {
    fn open(&mut self, path: &Path) -> Result<Box<dyn VideoTextureSource>, EngineError> {
        let decoder = FfmpegDecoder::open(path)?;
        let info = decoder.info();
        logd!("VIDEO", "{}: {}x{} fps={:?}", path.display(), info.width, info.height, info.fps);
        let source = LoopingTexture::new(path, decoder, GlTextureSink::new(self.gl.clone()))?;
        Ok(Box::new(source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_frame_rates() {
        assert_eq!(parse_rate("25/1"), Some(25.0));
        assert!((parse_rate("30000/1001").unwrap() - 29.97).abs() < 1e-2);
        assert_eq!(parse_rate("24"), Some(24.0));
        assert_eq!(parse_rate("0/0"), None);
        assert_eq!(parse_rate("n/a"), None);
    }

    #[test]
    fn probe_picks_the_video_stream() {
        let json = br#"{
            "streams": [
                { "codec_type": "audio" },
                { "codec_type": "video", "width": 1280, "height": 720,
                  "avg_frame_rate": "0/0", "r_frame_rate": "25/1" }
            ]
        }"#;
        let info = parse_probe(Path::new("eye.mp4"), json).unwrap();
        assert_eq!(info, StreamInfo { width: 1280, height: 720, fps: Some(25.0) });
    }

    #[test]
    fn probe_without_video_is_a_playback_error() {
        let json = br#"{ "streams": [ { "codec_type": "audio" } ] }"#;
        let err = parse_probe(Path::new("song.mp3"), json).unwrap_err();
        assert!(matches!(err, EngineError::Playback { .. }));
    }
}
