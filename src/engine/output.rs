//! Audio outputs - where rendered blocks go
//!
//! An engine hands a render factory to an [`OutputBackend`]. The backend
//! opens its device, learns the sample rate, builds the render callback from
//! the factory and then drives it with mono blocks of at most
//! [`MAX_BLOCK_SIZE`] frames, zeroed before each call.
//!
//! [`CpalOutput`] talks to the host's default device. [`OfflineOutput`] is
//! pulled by hand through its [`OfflineTap`] and never touches hardware.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{bounded, Sender};
use parking_lot::Mutex;

use crate::error::{EngineError, EngineResult};
use crate::MAX_BLOCK_SIZE;

/// Fills one zeroed mono block.
pub type RenderFn = Box<dyn FnMut(&mut [f32]) + Send>;

/// Builds the render callback once the output format is known.
pub type RenderFactory = Box<dyn FnOnce(OutputInfo) -> RenderFn + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputInfo {
    pub sample_rate: u32,
    pub channels: u16,
}

pub trait OutputBackend: Send {
    /// Open the device and start pulling from the render callback.
    /// Opening an already open backend replaces its callback.
    fn open(&mut self, factory: RenderFactory) -> EngineResult<OutputInfo>;

    /// Release the device. Sound stops immediately.
    fn close(&mut self);

    fn is_open(&self) -> bool;
}

/// Default output device of the default cpal host.
///
/// cpal streams are not `Send` on every platform, so the stream lives on a
/// thread of its own and is dropped there when the output closes.
#[derive(Default)]
pub struct CpalOutput {
    worker: Option<StreamWorker>,
}

struct StreamWorker {
    stop: Sender<()>,
    thread: JoinHandle<()>,
}

impl CpalOutput {
    pub fn new() -> Self {
        Self { worker: None }
    }
}

impl OutputBackend for CpalOutput {
    fn open(&mut self, factory: RenderFactory) -> EngineResult<OutputInfo> {
        self.close();

        let (ready_tx, ready_rx) = bounded::<EngineResult<OutputInfo>>(1);
        let (stop_tx, stop_rx) = bounded::<()>(1);

        let thread = thread::Builder::new()
            .name("polybeat-audio".into())
            .spawn(move || match build_stream(factory) {
                Ok((stream, info)) => {
                    let _ = ready_tx.send(Ok(info));
                    // blocks until close() sends or drops the sender
                    let _ = stop_rx.recv();
                    drop(stream);
                }
                Err(err) => {
                    let _ = ready_tx.send(Err(err));
                }
            })
            .map_err(|e| EngineError::Build(e.to_string()))?;

        let info = match ready_rx.recv() {
            Ok(result) => result,
            Err(_) => Err(EngineError::Build("audio thread exited early".into())),
        };

        match info {
            Ok(info) => {
                log::info!(
                    "audio output open: {} Hz, {} channel(s)",
                    info.sample_rate,
                    info.channels
                );
                self.worker = Some(StreamWorker {
                    stop: stop_tx,
                    thread,
                });
                Ok(info)
            }
            Err(err) => {
                let _ = thread.join();
                Err(err)
            }
        }
    }

    fn close(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = worker.stop.send(());
            if worker.thread.join().is_err() {
                log::error!("audio thread panicked");
            }
            log::debug!("audio output closed");
        }
    }

    fn is_open(&self) -> bool {
        self.worker.is_some()
    }
}

impl Drop for CpalOutput {
    fn drop(&mut self) {
        self.close();
    }
}

fn build_stream(factory: RenderFactory) -> EngineResult<(cpal::Stream, OutputInfo)> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or(EngineError::NoOutputDevice)?;
    let supported = device
        .default_output_config()
        .map_err(|e| EngineError::Config(e.to_string()))?;

    if supported.sample_format() != cpal::SampleFormat::F32 {
        return Err(EngineError::UnsupportedFormat(format!(
            "{:?}",
            supported.sample_format()
        )));
    }

    let info = OutputInfo {
        sample_rate: supported.sample_rate().0,
        channels: supported.channels(),
    };
    let channels = info.channels as usize;
    let mut render = factory(info);
    let mut block = vec![0.0f32; MAX_BLOCK_SIZE];

    let stream = device
        .build_output_stream(
            &supported.into(),
            move |data: &mut [f32], _| {
                let total_frames = data.len() / channels;
                let mut frames_written = 0;

                while frames_written < total_frames {
                    let frames = (total_frames - frames_written).min(MAX_BLOCK_SIZE);
                    let chunk = &mut block[..frames];
                    chunk.fill(0.0);
                    render(chunk);

                    // mono to all channels
                    let out_off = frames_written * channels;
                    for (i, &s) in chunk.iter().enumerate() {
                        for ch in 0..channels {
                            data[out_off + i * channels + ch] = s;
                        }
                    }
                    frames_written += frames;
                }
            },
            |err| log::warn!("audio stream error: {err}"),
            None,
        )
        .map_err(|e| EngineError::Build(e.to_string()))?;

    stream
        .play()
        .map_err(|e| EngineError::Play(e.to_string()))?;

    Ok((stream, info))
}

/// A device-less output pulled by hand.
#[derive(Clone)]
pub struct OfflineOutput {
    shared: Arc<Mutex<OfflineState>>,
    sample_rate: u32,
}

/// Test-side handle on an [`OfflineOutput`].
#[derive(Clone)]
pub struct OfflineTap {
    shared: Arc<Mutex<OfflineState>>,
}

#[derive(Default)]
struct OfflineState {
    render: Option<RenderFn>,
    failure: Option<String>,
    opens: u32,
}

impl OfflineOutput {
    pub fn new(sample_rate: u32) -> (Self, OfflineTap) {
        let shared = Arc::new(Mutex::new(OfflineState::default()));
        (
            Self {
                shared: shared.clone(),
                sample_rate,
            },
            OfflineTap { shared },
        )
    }
}

impl OutputBackend for OfflineOutput {
    fn open(&mut self, factory: RenderFactory) -> EngineResult<OutputInfo> {
        let mut state = self.shared.lock();
        if let Some(reason) = &state.failure {
            return Err(EngineError::Unavailable(reason.clone()));
        }
        let info = OutputInfo {
            sample_rate: self.sample_rate,
            channels: 1,
        };
        state.render = Some(factory(info));
        state.opens += 1;
        Ok(info)
    }

    fn close(&mut self) {
        self.shared.lock().render = None;
    }

    fn is_open(&self) -> bool {
        self.shared.lock().render.is_some()
    }
}

impl OfflineTap {
    /// Pull `frames` mono frames. Silence while the output is closed.
    pub fn render(&self, frames: usize) -> Vec<f32> {
        let mut out = vec![0.0f32; frames];
        let mut state = self.shared.lock();
        if let Some(render) = state.render.as_mut() {
            for chunk in out.chunks_mut(MAX_BLOCK_SIZE) {
                render(chunk);
            }
        }
        out
    }

    /// Make every following `open` fail (or succeed again with `None`).
    pub fn set_failure(&self, reason: Option<&str>) {
        self.shared.lock().failure = reason.map(str::to_string);
    }

    pub fn is_open(&self) -> bool {
        self.shared.lock().render.is_some()
    }

    /// Successful opens so far.
    pub fn opens(&self) -> u32 {
        self.shared.lock().opens
    }
}
