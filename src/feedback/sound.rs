use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use log::{debug, info};
use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink, Source};
use crate::feedback::FeedbackError;
/// One looping feedback sound with an independently controlled volume.
pub trait SoundChannel {
    /// `volume` is expected in `[0, 1]`.
    fn set_volume(&mut self, volume: f32);
    fn volume(&self) -> f32;
    fn play_looped(&mut self);
    fn is_playing(&self) -> bool;
}
fn sound_error(path: &Path, reason: impl ToString) -> FeedbackError {
    FeedbackError::Sound {
        path: path.display().to_string(),
        reason: reason.to_string(),
    }
}
/// Opens and decodes `path` as an endlessly repeating source.
fn decode_looped(path: &Path) -> Result<impl Source<Item = i16> + Send + 'static, FeedbackError> {
    let file = File::open(path).map_err(|e| sound_error(path, e))?;
    let decoder = Decoder::new(BufReader::new(file)).map_err(|e| sound_error(path, e))?;
    Ok(decoder.repeat_infinite())
}
/// Default audio output device. Must outlive every sound created from it.
pub struct AudioOutput {
    _stream: OutputStream,
    handle: OutputStreamHandle,
}
impl AudioOutput {
    pub fn open_default() -> Result<Self, FeedbackError> {
        let (stream, handle) = OutputStream::try_default().map_err(|e| FeedbackError::Sound {
            path: "<default output>".into(),
            reason: e.to_string(),
        })?;
        info!("Audio output opened");
        Ok(Self {
            _stream: stream,
            handle,
        })
    }
    /// Decodes `path` into a paused, looping sound on this output.
    pub fn load(&self, path: impl AsRef<Path>) -> Result<DeviceSound, FeedbackError> {
        let path = path.as_ref().to_path_buf();
        let source = decode_looped(&path)?;
        let sink = Sink::try_new(&self.handle).map_err(|e| sound_error(&path, e))?;
        sink.pause();
        sink.append(source);
        debug!("{}: loaded", path.display());
        Ok(DeviceSound { path, sink })
    }
}
/// Sound played on the audio device through a rodio sink.
pub struct DeviceSound {
    path: PathBuf,
    sink: Sink,
}
impl SoundChannel for DeviceSound {
    fn set_volume(&mut self, volume: f32) {
        debug!("{}: volume {:.3} -> {:.3}", self.path.display(), self.sink.volume(), volume);
        self.sink.set_volume(volume);
    }
    fn volume(&self) -> f32 {
        self.sink.volume()
    }
    fn play_looped(&mut self) {
        debug!("{}: looping", self.path.display());
        self.sink.play();
    }
    fn is_playing(&self) -> bool {
        !self.sink.is_paused()
    }
}
/// In-memory sound that remembers every volume it was given.
#[derive(Clone, Debug, Default)]
pub struct MemorySound {
    pub volumes: Vec<f32>,
    pub playing: bool,
}
impl SoundChannel for MemorySound {
    fn set_volume(&mut self, volume: f32) {
        self.volumes.push(volume);
    }
    fn volume(&self) -> f32 {
        self.volumes.last().copied().unwrap_or(1.0)
    }
    fn play_looped(&mut self) {
        self.playing = true;
    }
    fn is_playing(&self) -> bool {
        self.playing
    }
}
