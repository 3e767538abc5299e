//! Video as a texture: the contract the scene layer relies on.
//!
//! The engine never decodes or touches GL. A `SourceFactory` opens a
//! `VideoTextureSource` per scene start; `LoopingTexture` implements the
//! loop-on-end-of-stream rule over any `FrameDecoder` + `TextureSink` pair.

use std::path::{Path, PathBuf};

use crate::error::EngineError;
use crate::{logd, logi};

/// Opaque GPU texture name. `0` is "no texture".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TextureHandle(pub u32);

impl TextureHandle {
    pub const NONE: TextureHandle = TextureHandle(0);

    pub fn is_none(self) -> bool {
        self == Self::NONE
    }
}

/// One decoded frame, tightly packed RGB, bottom row first.
#[derive(Debug, Clone, Default)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

pub trait VideoTextureSource {
    /// Upload the next frame and return its texture. On end of stream the source
    /// rewinds and retries once; a second failure is a `Playback` error.
    /// Returns `TextureHandle::NONE` once released.
    fn next_frame(&mut self) -> Result<TextureHandle, EngineError>;

    /// Free the texture and the decoder. Idempotent.
    fn release(&mut self);

    /// Frame rate reported by the container, if any.
    fn fps(&self) -> Option<f32>;

    fn path(&self) -> &Path;
}

pub trait SourceFactory {
    fn open(&mut self, path: &Path) -> Result<Box<dyn VideoTextureSource>, EngineError>;
}

/// Frame producer for `LoopingTexture`.
pub trait FrameDecoder {
    /// Next frame, or `None` at end of stream (or on a read failure).
    fn read_frame(&mut self) -> Option<&VideoFrame>;

    /// Go back to the first frame (seek or reopen).
    fn rewind(&mut self) -> Result<(), EngineError>;

    fn fps(&self) -> Option<f32>;

    /// Release the decode handle. Idempotent.
    fn close(&mut self);
}

/// Texture storage for `LoopingTexture`.
pub trait TextureSink {
    fn create(&mut self) -> Result<TextureHandle, EngineError>;
    fn upload(&mut self, handle: TextureHandle, frame: &VideoFrame);
    fn delete(&mut self, handle: TextureHandle);
}

pub struct LoopingTexture<D: FrameDecoder, S: TextureSink> {
    path: PathBuf,
    decoder: Option<D>,
    sink: S,
    handle: Option<TextureHandle>,
    fps: Option<f32>,
}

impl<D: FrameDecoder, S: TextureSink> LoopingTexture<D, S> {
    pub fn new(path: impl Into<PathBuf>, decoder: D, mut sink: S) -> Result<Self, EngineError> {
        let path = path.into();
        let handle = sink.create()?;
        let fps = decoder.fps();
        logi!("TEXTURE", "opened {} fps={fps:?}", path.display());
        Ok(Self {
            path,
            decoder: Some(decoder),
            sink,
            handle: Some(handle),
            fps,
        })
    }
}

impl<D: FrameDecoder, S: TextureSink> VideoTextureSource for LoopingTexture<D, S> {
    fn next_frame(&mut self) -> Result<TextureHandle, EngineError> {
        let (Some(handle), Some(decoder)) = (self.handle, self.decoder.as_mut()) else {
            return Ok(TextureHandle::NONE);
        };

        if decoder.read_frame().is_none() {
            logd!("TEXTURE", "end of stream, rewinding {}", self.path.display());
            decoder.rewind()?;
        }
        // After a rewind this is the single retry.
        let frame = decoder
            .read_frame()
            .ok_or_else(|| EngineError::playback(&self.path, "no frames after rewind"))?;

        self.sink.upload(handle, frame);
        Ok(handle)
    }

    fn release(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.sink.delete(handle);
        }
        if let Some(mut decoder) = self.decoder.take() {
            decoder.close();
            logi!("TEXTURE", "released {}", self.path.display());
        }
        self.fps = None;
    }

    fn fps(&self) -> Option<f32> {
        self.fps
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl<D: FrameDecoder, S: TextureSink> Drop for LoopingTexture<D, S> {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Plays `frames` frames per pass, forever.
    struct FakeDecoder {
        frames: usize,
        pos: usize,
        frame: VideoFrame,
        closed: Rc<RefCell<usize>>,
    }

    impl FrameDecoder for FakeDecoder {
        fn read_frame(&mut self) -> Option<&VideoFrame> {
            if self.pos >= self.frames {
                return None;
            }
            self.pos += 1;
            self.frame.data = vec![self.pos as u8; 3];
            Some(&self.frame)
        }
        fn rewind(&mut self) -> Result<(), EngineError> {
            self.pos = 0;
            Ok(())
        }
        fn fps(&self) -> Option<f32> {
            Some(30.0)
        }
        fn close(&mut self) {
            *self.closed.borrow_mut() += 1;
        }
    }

    #[derive(Default)]
    struct FakeSink {
        uploads: Rc<RefCell<Vec<u8>>>,
        deleted: Rc<RefCell<Vec<TextureHandle>>>,
    }

    impl TextureSink for FakeSink {
        fn create(&mut self) -> Result<TextureHandle, EngineError> {
            Ok(TextureHandle(7))
        }
        fn upload(&mut self, _handle: TextureHandle, frame: &VideoFrame) {
            self.uploads.borrow_mut().push(frame.data[0]);
        }
        fn delete(&mut self, handle: TextureHandle) {
            self.deleted.borrow_mut().push(handle);
        }
    }

    fn source(frames: usize) -> (LoopingTexture<FakeDecoder, FakeSink>, Rc<RefCell<Vec<u8>>>, Rc<RefCell<usize>>) {
        let closed = Rc::new(RefCell::new(0));
        let sink = FakeSink::default();
        let uploads = sink.uploads.clone();
        let dec = FakeDecoder {
            frames,
            pos: 0,
            frame: VideoFrame::default(),
            closed: closed.clone(),
        };
        (LoopingTexture::new("loop.mp4", dec, sink).unwrap(), uploads, closed)
    }

    #[test]
    fn loops_at_end_of_stream() {
        let (mut tex, uploads, _) = source(2);
        for _ in 0..5 {
            assert_eq!(tex.next_frame().unwrap(), TextureHandle(7));
        }
        assert_eq!(*uploads.borrow(), vec![1, 2, 1, 2, 1]);
        assert_eq!(tex.fps(), Some(30.0));
    }

    #[test]
    fn empty_stream_is_a_playback_error() {
        let (mut tex, uploads, _) = source(0);
        let err = tex.next_frame().unwrap_err();
        assert!(matches!(err, EngineError::Playback { ref path, .. } if path == Path::new("loop.mp4")));
        assert!(uploads.borrow().is_empty());
    }

    #[test]
    fn release_is_idempotent() {
        let (mut tex, _, closed) = source(3);
        tex.release();
        tex.release();
        assert_eq!(*closed.borrow(), 1);
        assert_eq!(tex.next_frame().unwrap(), TextureHandle::NONE);
        assert_eq!(tex.fps(), None);
        drop(tex);
        assert_eq!(*closed.borrow(), 1);
    }

    #[test]
    fn drop_releases() {
        let (tex, _, closed) = source(3);
        drop(tex);
        assert_eq!(*closed.borrow(), 1);
    }
}
