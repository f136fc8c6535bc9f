//! Progress reporting shared by the stages and GDAL callbacks

use indicatif::{ProgressBar, ProgressStyle};
use std::ffi::{c_char, c_int, c_void};
use std::time::Duration;

/// Progress collaborator handed to each stage.
///
/// A hidden `Progress` discards every update, so library callers and tests
/// never draw to the terminal.
#[derive(Clone)]
pub struct Progress {
    bar: ProgressBar,
    quiet: bool,
}

impl Progress {
    /// Progress that renders nothing
    pub fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
            quiet: true,
        }
    }

    /// Bar counting `len` steps
    pub fn bar(len: u64, msg: &str) -> Self {
        let bar = ProgressBar::new(len);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} {msg} [{bar:30.cyan/blue}] {pos}/{len} ({elapsed})")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
        bar.set_message(msg.to_string());
        Self { bar, quiet: false }
    }

    /// Spinner for steps of unknown length
    pub fn spinner(msg: &str) -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg} [{elapsed_precise}]")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.set_message(msg.to_string());
        bar.enable_steady_tick(Duration::from_millis(100));
        Self { bar, quiet: false }
    }

    pub fn is_hidden(&self) -> bool {
        self.quiet
    }

    /// Start a new phase of `len` steps on the same bar
    pub fn start(&self, len: u64, msg: &str) {
        self.bar.reset();
        self.bar.set_length(len);
        self.bar.set_message(msg.to_string());
    }

    pub fn inc(&self, delta: u64) {
        self.bar.inc(delta);
    }

    pub fn finish(&self, msg: &str) {
        self.bar.finish_with_message(msg.to_string());
    }

    /// Callback and argument pair for GDAL routines taking a `GDALProgressFunc`.
    ///
    /// The bar is driven in percent. The returned pointer borrows `self` and
    /// must not outlive it.
    pub fn gdal_callback(&self) -> (gdal_sys::GDALProgressFunc, *mut c_void) {
        if self.is_hidden() {
            return (None, std::ptr::null_mut());
        }
        self.bar.set_length(100);
        self.bar.set_position(0);
        (
            Some(gdal_progress),
            &self.bar as *const ProgressBar as *mut c_void,
        )
    }
}

impl Default for Progress {
    fn default() -> Self {
        Self::hidden()
    }
}

unsafe extern "C" fn gdal_progress(complete: f64, _message: *const c_char, arg: *mut c_void) -> c_int {
    if !arg.is_null() {
        // SAFETY: arg was produced by Progress::gdal_callback from a live &ProgressBar
        let bar = &*(arg as *const ProgressBar);
        bar.set_position((complete.clamp(0.0, 1.0) * 100.0) as u64);
    }
    1
}
