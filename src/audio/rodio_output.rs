//! rodio-backed audio output
//!
//! rodio's `OutputStream` must stay on the thread that created it, so every
//! started handle owns a dedicated output thread that keeps the stream alive
//! until the handle is cleared. The `Sink` itself is shared with the handle.

use async_trait::async_trait;
use crossbeam_channel::{bounded, Sender};
use parking_lot::Mutex;
use rodio::{Decoder, OutputStream, Sink};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::sync::oneshot;

use crate::audio::device::find_output_device;
use crate::audio::output::{AudioHandle, AudioOutput};
use crate::config::DEFAULT_DEVICE;
use crate::constants::END_POLL_INTERVAL_MS;
use crate::error::AudioError;

/// Audio output on the local sound system
#[derive(Debug, Default, Clone)]
pub struct RodioOutput;

impl RodioOutput {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AudioOutput for RodioOutput {
    async fn open(&self, path: &Path) -> Result<Arc<dyn AudioHandle>, AudioError> {
        let path = path.to_path_buf();
        let probe_path = path.clone();

        // Decode the header once so unreadable files fail here, not on play
        tokio::task::spawn_blocking(move || open_decoder(&probe_path).map(|_| ()))
            .await
            .map_err(|e| AudioError::StreamError(e.to_string()))??;

        Ok(Arc::new(RodioHandle::new(path)))
    }
}

fn open_decoder(path: &Path) -> Result<Decoder<BufReader<File>>, AudioError> {
    let file = File::open(path).map_err(|e| AudioError::OpenFailed {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    Decoder::new(BufReader::new(file)).map_err(|e| AudioError::OpenFailed {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}

/// Settings captured before the sink exists
struct HandleState {
    volume: f32,
    speed: f32,
    looping: bool,
    position: Duration,
    device_id: String,
    paused: bool,
    cleared: bool,
    sink: Option<Arc<Sink>>,
    /// Dropping this releases the output thread
    stream_guard: Option<Sender<()>>,
}

/// Handle to one clip played through rodio
pub struct RodioHandle {
    path: PathBuf,
    state: Mutex<HandleState>,
}

impl RodioHandle {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            state: Mutex::new(HandleState {
                volume: 1.0,
                speed: 1.0,
                looping: false,
                position: Duration::ZERO,
                device_id: DEFAULT_DEVICE.to_string(),
                paused: true,
                cleared: false,
                sink: None,
                stream_guard: None,
            }),
        }
    }

    fn sink(&self) -> Option<Arc<Sink>> {
        self.state.lock().sink.clone()
    }
}

/// Parameters the output thread builds the sink from
struct StartRequest {
    path: PathBuf,
    device_id: String,
    volume: f32,
    speed: f32,
    looping: bool,
    position: Duration,
}

/// Spawn the thread that owns the output stream
///
/// Resolves with the sink once the stream is running, or with the reason the
/// device refused.
fn spawn_output_thread(
    request: StartRequest,
) -> Result<(oneshot::Receiver<Result<Arc<Sink>, AudioError>>, Sender<()>), AudioError> {
    let (ready_tx, ready_rx) = oneshot::channel();
    let (guard_tx, guard_rx) = bounded::<()>(1);

    thread::Builder::new()
        .name("soundboard-output".to_string())
        .spawn(move || {
            let started = (|| {
                let device = find_output_device(&request.device_id)?;
                let (stream, stream_handle) = OutputStream::try_from_device(&device)
                    .map_err(|e| AudioError::StreamError(e.to_string()))?;
                let sink = Sink::try_new(&stream_handle)
                    .map_err(|e| AudioError::PlaybackRejected(e.to_string()))?;

                let file = File::open(&request.path).map_err(|e| AudioError::OpenFailed {
                    path: request.path.display().to_string(),
                    reason: e.to_string(),
                })?;
                let reader = BufReader::new(file);
                if request.looping {
                    let source = Decoder::new_looped(reader)
                        .map_err(|e| AudioError::PlaybackRejected(e.to_string()))?;
                    sink.append(source);
                } else {
                    let source = Decoder::new(reader)
                        .map_err(|e| AudioError::PlaybackRejected(e.to_string()))?;
                    sink.append(source);
                }

                sink.set_volume(request.volume);
                sink.set_speed(request.speed);
                if request.position > Duration::ZERO {
                    if let Err(e) = sink.try_seek(request.position) {
                        tracing::warn!("Seek to {:?} failed: {}", request.position, e);
                    }
                }
                sink.play();
                Ok::<_, AudioError>((stream, Arc::new(sink)))
            })();

            match started {
                Ok((stream, sink)) => {
                    let _ = ready_tx.send(Ok(sink));
                    // Keep the stream alive until the handle lets go
                    let _ = guard_rx.recv();
                    drop(stream);
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                }
            }
        })
        .map_err(|e| AudioError::StreamError(e.to_string()))?;

    Ok((ready_rx, guard_tx))
}

#[async_trait]
impl AudioHandle for RodioHandle {
    fn set_volume(&self, volume: f32) {
        let mut state = self.state.lock();
        state.volume = volume;
        if let Some(sink) = &state.sink {
            sink.set_volume(volume);
        }
    }

    fn set_speed(&self, speed: f32) {
        let mut state = self.state.lock();
        state.speed = speed;
        if let Some(sink) = &state.sink {
            sink.set_speed(speed);
        }
    }

    fn set_looping(&self, looping: bool) {
        // Takes effect when the sink is built
        self.state.lock().looping = looping;
    }

    fn seek(&self, position: Duration) -> Result<(), AudioError> {
        let sink = {
            let mut state = self.state.lock();
            state.position = position;
            state.sink.clone()
        };
        let Some(sink) = sink else {
            return Ok(());
        };

        // try_seek blocks until the output thread applies it
        thread::Builder::new()
            .name("soundboard-seek".to_string())
            .spawn(move || {
                if let Err(e) = sink.try_seek(position) {
                    tracing::debug!("{}", AudioError::SeekFailed(e.to_string()));
                }
            })
            .map(|_| ())
            .map_err(|e| AudioError::SeekFailed(e.to_string()))
    }

    fn position(&self) -> Duration {
        let state = self.state.lock();
        match &state.sink {
            Some(sink) => sink.get_pos(),
            None => state.position,
        }
    }

    async fn bind_output(&self, device_id: &str) -> Result<(), AudioError> {
        let id = device_id.to_string();
        let lookup = id.clone();
        tokio::task::spawn_blocking(move || find_output_device(&lookup).map(|_| ()))
            .await
            .map_err(|e| AudioError::StreamError(e.to_string()))??;
        self.state.lock().device_id = id;
        Ok(())
    }

    async fn play(&self) -> Result<(), AudioError> {
        if let Some(sink) = self.sink() {
            sink.play();
            self.state.lock().paused = false;
            return Ok(());
        }

        let request = {
            let state = self.state.lock();
            if state.cleared {
                return Err(AudioError::PlaybackRejected("handle was cleared".to_string()));
            }
            StartRequest {
                path: self.path.clone(),
                device_id: state.device_id.clone(),
                volume: state.volume,
                speed: state.speed,
                looping: state.looping,
                position: state.position,
            }
        };

        let (ready_rx, guard) = spawn_output_thread(request)?;
        let sink = ready_rx
            .await
            .map_err(|_| AudioError::StreamError("output thread exited".to_string()))??;

        let mut state = self.state.lock();
        if state.cleared {
            // Cleared while the stream was starting
            sink.stop();
            return Err(AudioError::PlaybackRejected("handle was cleared".to_string()));
        }
        state.sink = Some(sink);
        state.stream_guard = Some(guard);
        state.paused = false;
        tracing::debug!("Playing {} on {}", self.path.display(), state.device_id);
        Ok(())
    }

    fn pause(&self) {
        let mut state = self.state.lock();
        state.paused = true;
        if let Some(sink) = &state.sink {
            sink.pause();
        }
    }

    fn clear(&self) {
        let mut state = self.state.lock();
        state.cleared = true;
        state.paused = true;
        if let Some(sink) = state.sink.take() {
            sink.stop();
        }
        state.stream_guard = None;
    }

    fn is_paused(&self) -> bool {
        self.state.lock().paused
    }

    fn is_finished(&self) -> bool {
        let state = self.state.lock();
        if state.cleared {
            return true;
        }
        state.sink.as_ref().map(|sink| sink.empty()).unwrap_or(false)
    }

    async fn ended(&self) {
        let mut ticker = tokio::time::interval(Duration::from_millis(END_POLL_INTERVAL_MS));
        loop {
            ticker.tick().await;
            if self.is_finished() {
                return;
            }
        }
    }
}

impl Drop for RodioHandle {
    fn drop(&mut self) {
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rodio::source::SineWave;

    #[test]
    fn test_seek_returns_before_output_applies_it() {
        // Nothing drains the idle sink, so a blocking seek would never return
        let (sink, _queue) = Sink::new_idle();
        sink.append(SineWave::new(440.0));
        let handle = RodioHandle::new(PathBuf::from("tone.wav"));
        handle.state.lock().sink = Some(Arc::new(sink));

        handle.seek(Duration::from_secs(2)).unwrap();
        assert!(handle.state.try_lock().is_some());
        assert_eq!(handle.state.lock().position, Duration::from_secs(2));
    }

    #[test]
    fn test_seek_before_start_only_records_position() {
        let handle = RodioHandle::new(PathBuf::from("tone.wav"));
        handle.seek(Duration::from_millis(1500)).unwrap();
        assert_eq!(handle.position(), Duration::from_millis(1500));
    }
}
