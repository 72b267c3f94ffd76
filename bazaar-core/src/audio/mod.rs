//! Audio capture via cpal backend.
//!
//! # Design constraints
//!
//! The cpal input callback runs on an OS audio thread at elevated (TIME_CRITICAL on
//! Windows) priority. It **must not**:
//! - Allocate heap memory
//! - Block on a mutex or condvar
//! - Perform I/O
//!
//! This module satisfies that contract by writing directly into an SPSC ring buffer
//! producer whose `push_slice` is lock-free and allocation-free. Resampling to 16 kHz
//! and framing into fixed-size `AudioFrame`s both happen off the callback, in
//! [`framing::FrameAssembler`], which runs on the pipeline thread where allocation
//! is allowed.
//!
//! # Threading note
//!
//! `cpal::Stream` is `!Send` on most platforms (COM on Windows, CoreAudio on macOS).
//! `CpalCapture` therefore must be created and dropped on the same thread.
//! The pipeline accomplishes this by calling `start` inside `spawn_blocking`.

pub mod cpal_capture;
pub mod device;
pub mod framing;
pub mod null_capture;
pub mod resample;

pub use cpal_capture::CpalCapture;
pub use null_capture::NullCapture;

use crate::error::Result;

/// Lifecycle contract every capture backend implements. `pause`/`resume`
/// keep the underlying stream open (avoiding the device-reopen latency of a
/// full stop/start cycle) while suppressing frame delivery — used by the
/// adaptive sleep controller during deep-sleep polling.
pub trait AudioCapture: Send {
    fn start(&mut self) -> Result<()>;
    fn stop(&mut self) -> Result<()>;
    fn pause(&mut self) -> Result<()>;
    fn resume(&mut self) -> Result<()>;
}
