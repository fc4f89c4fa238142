#![warn(missing_docs)]
//! # veil-affinity
//!
//! ## Purpose
//! Provides best-effort screen-capture shielding for one top-level window.
//!
//! ## Responsibilities
//! - Define a backend-agnostic trait over the OS display-affinity surface.
//! - Expose the real Win32 backend on supported platforms.
//! - Expose an inert backend for other platforms and for unit tests.
//! - Drive the apply/reset state machine through [`CaptureShield`].
//!
//! ## Data flow
//! The app shell realizes its window -> wraps the handle in [`WindowHandle`]
//! -> [`CaptureShield::apply`] hides the window from the task switcher and
//! excludes it from capture -> every teardown path calls
//! [`CaptureShield::reset`] before the handle is invalidated.
//!
//! ## Ownership and lifetimes
//! The shield owns its handle value for the lifetime of the window. Handles
//! are plain integers to the OS; the caller guarantees the window outlives
//! the shield's use of it.
//!
//! ## Error model
//! Backend calls return [`AffinityError`]. The shield itself never fails:
//! `apply` and `reset` collect backend outcomes into report values the caller
//! may log, and shield state stays queryable either way.
//!
//! ## Security and privacy notes
//! Shielding is best effort. Capture tooling that uses the exclusion API
//! honors it; anything reading the physical monitor output does not. A failed
//! apply leaves a normally capturable window and must be surfaced to the
//! operator through status, never hidden.

use std::sync::Arc;

use thiserror::Error;

/// Extended style bit that removes the window from the task switcher.
///
/// Matches `WS_EX_TOOLWINDOW`; kept as a crate constant so the shield logic
/// compiles on every platform.
pub const TOOL_WINDOW_STYLE_BIT: i32 = 0x0000_0080;

/// Display affinity requested for a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AffinityMode {
    /// Window participates in capture normally (`WDA_NONE`).
    Normal,
    /// Window contents render only on the physical monitor (`WDA_MONITOR`).
    MonitorOnly,
    /// Window is invisible to capture APIs (`WDA_EXCLUDEFROMCAPTURE`).
    ExcludedFromCapture,
}

impl AffinityMode {
    /// Returns the numeric affinity value fixed by the OS contract.
    pub fn os_value(self) -> u32 {
        match self {
            AffinityMode::Normal => 0x0000_0000,
            AffinityMode::MonitorOnly => 0x0000_0001,
            AffinityMode::ExcludedFromCapture => 0x0000_0011,
        }
    }
}

/// Opaque top-level window identity used by affinity calls.
///
/// Created once when the shell realizes its window and never reused after
/// that window is destroyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowHandle(isize);

impl WindowHandle {
    /// Wraps a raw window handle value.
    pub fn new(raw: isize) -> Self {
        Self(raw)
    }

    /// Returns the raw handle value.
    pub fn raw(self) -> isize {
        self.0
    }
}

/// Trait implemented by concrete affinity providers.
pub trait AffinityBackend: Send + Sync {
    /// Reads the window's extended style word.
    ///
    /// # Errors
    /// Returns [`AffinityError::Os`] on OS rejection and
    /// [`AffinityError::Unsupported`] where the platform has no style word.
    fn read_extended_style(&self, window: WindowHandle) -> Result<i32, AffinityError>;

    /// Writes the window's extended style word.
    ///
    /// # Errors
    /// Same contract as [`AffinityBackend::read_extended_style`].
    fn write_extended_style(&self, window: WindowHandle, style: i32) -> Result<(), AffinityError>;

    /// Sets the window display affinity.
    ///
    /// # Errors
    /// Same contract as [`AffinityBackend::read_extended_style`].
    fn set_display_affinity(
        &self,
        window: WindowHandle,
        mode: AffinityMode,
    ) -> Result<(), AffinityError>;
}

/// Real affinity backend for Windows targets.
///
/// # Notes
/// Extended styles go through the 32-bit `GetWindowLongW`/`SetWindowLongW`
/// pair; the style word fits 32 bits on every architecture.
#[derive(Debug, Clone, Copy, Default)]
pub struct Win32AffinityBackend;

impl Win32AffinityBackend {
    /// Creates the Win32 backend.
    pub fn new() -> Self {
        Self
    }
}

impl AffinityBackend for Win32AffinityBackend {
    fn read_extended_style(&self, window: WindowHandle) -> Result<i32, AffinityError> {
        #[cfg(windows)]
        {
            use windows_sys::Win32::Foundation::{GetLastError, HWND, SetLastError};
            use windows_sys::Win32::UI::WindowsAndMessaging::{GWL_EXSTYLE, GetWindowLongW};

            // Safety: the handle names a live window owned by the caller;
            // GetWindowLongW has no other preconditions. Last-error is
            // cleared first because zero is also a valid style word.
            let style = unsafe {
                SetLastError(0);
                GetWindowLongW(window.raw() as HWND, GWL_EXSTYLE)
            };
            if style == 0 {
                // Safety: reads the calling thread's last-error slot.
                let code = unsafe { GetLastError() };
                if code != 0 {
                    return Err(AffinityError::Os {
                        call: "GetWindowLongW",
                        code,
                    });
                }
            }
            Ok(style)
        }

        #[cfg(not(windows))]
        {
            let _ = window;
            Err(AffinityError::Unsupported)
        }
    }

    fn write_extended_style(&self, window: WindowHandle, style: i32) -> Result<(), AffinityError> {
        #[cfg(windows)]
        {
            use windows_sys::Win32::Foundation::{GetLastError, HWND, SetLastError};
            use windows_sys::Win32::UI::WindowsAndMessaging::{GWL_EXSTYLE, SetWindowLongW};

            // Safety: same handle contract as the read path. SetWindowLongW
            // returns the previous value, which may legitimately be zero.
            let previous = unsafe {
                SetLastError(0);
                SetWindowLongW(window.raw() as HWND, GWL_EXSTYLE, style)
            };
            if previous == 0 {
                // Safety: reads the calling thread's last-error slot.
                let code = unsafe { GetLastError() };
                if code != 0 {
                    return Err(AffinityError::Os {
                        call: "SetWindowLongW",
                        code,
                    });
                }
            }
            Ok(())
        }

        #[cfg(not(windows))]
        {
            let _ = (window, style);
            Err(AffinityError::Unsupported)
        }
    }

    fn set_display_affinity(
        &self,
        window: WindowHandle,
        mode: AffinityMode,
    ) -> Result<(), AffinityError> {
        #[cfg(windows)]
        {
            use windows_sys::Win32::Foundation::{GetLastError, HWND};
            use windows_sys::Win32::UI::WindowsAndMessaging::{
                SetWindowDisplayAffinity, WDA_EXCLUDEFROMCAPTURE, WDA_MONITOR, WDA_NONE,
            };

            let affinity = match mode {
                AffinityMode::Normal => WDA_NONE,
                AffinityMode::MonitorOnly => WDA_MONITOR,
                AffinityMode::ExcludedFromCapture => WDA_EXCLUDEFROMCAPTURE,
            };

            // Safety: the handle names a live window owned by the calling
            // process; affinity can only be set on windows of that process.
            let result = unsafe { SetWindowDisplayAffinity(window.raw() as HWND, affinity) };
            if result == 0 {
                // Safety: reads the calling thread's last-error slot.
                let code = unsafe { GetLastError() };
                return Err(AffinityError::Os {
                    call: "SetWindowDisplayAffinity",
                    code,
                });
            }
            Ok(())
        }

        #[cfg(not(windows))]
        {
            let _ = (window, mode);
            Err(AffinityError::Unsupported)
        }
    }
}

/// Inert backend for platforms without display affinity control.
///
/// Every operation reports [`AffinityError::Unsupported`]; a shield driven by
/// this backend leaves the window untouched and its state at
/// [`AffinityMode::Normal`].
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAffinityBackend;

impl NoopAffinityBackend {
    /// Creates the inert backend.
    pub fn new() -> Self {
        Self
    }
}

impl AffinityBackend for NoopAffinityBackend {
    fn read_extended_style(&self, _window: WindowHandle) -> Result<i32, AffinityError> {
        Err(AffinityError::Unsupported)
    }

    fn write_extended_style(&self, _window: WindowHandle, _style: i32) -> Result<(), AffinityError> {
        Err(AffinityError::Unsupported)
    }

    fn set_display_affinity(
        &self,
        _window: WindowHandle,
        _mode: AffinityMode,
    ) -> Result<(), AffinityError> {
        Err(AffinityError::Unsupported)
    }
}

/// Selects the affinity backend for the current platform.
pub fn detect_backend() -> Arc<dyn AffinityBackend> {
    #[cfg(windows)]
    {
        Arc::new(Win32AffinityBackend::new())
    }

    #[cfg(not(windows))]
    {
        Arc::new(NoopAffinityBackend::new())
    }
}

/// Outcome of one [`CaptureShield::apply`] attempt.
#[derive(Debug)]
pub struct ApplyReport {
    /// Affinity state after the attempt.
    pub mode: AffinityMode,
    /// Whether the window now carries the tool-window style bit.
    pub style_hidden: bool,
    /// Failure from the style snapshot/write path, if any.
    pub style_error: Option<AffinityError>,
    /// Failure from the exclude-from-capture attempt, if any.
    pub exclude_error: Option<AffinityError>,
    /// Failure from the monitor-only fallback attempt, if any.
    pub monitor_error: Option<AffinityError>,
}

impl ApplyReport {
    /// Returns `true` when any capture protection is active.
    pub fn is_protected(&self) -> bool {
        self.mode != AffinityMode::Normal
    }
}

/// Outcome of one [`CaptureShield::reset`] attempt.
#[derive(Debug)]
pub struct ResetReport {
    /// Whether the saved style word was written back.
    pub style_restored: bool,
    /// Whether affinity was written back to [`AffinityMode::Normal`].
    pub affinity_cleared: bool,
    /// Failures encountered while restoring.
    pub errors: Vec<AffinityError>,
}

impl ResetReport {
    /// Returns `true` when nothing needed doing or everything succeeded.
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Best-effort capture shield state machine for one window.
///
/// Tracks the applied affinity and a one-shot snapshot of the extended style
/// word so teardown can restore the window bit for bit. Neither operation
/// returns an error; outcomes travel in report values.
pub struct CaptureShield {
    window: WindowHandle,
    backend: Arc<dyn AffinityBackend>,
    mode: AffinityMode,
    saved_style: Option<i32>,
}

impl CaptureShield {
    /// Creates a shield for `window` over the given backend.
    pub fn new(window: WindowHandle, backend: Arc<dyn AffinityBackend>) -> Self {
        Self {
            window,
            backend,
            mode: AffinityMode::Normal,
            saved_style: None,
        }
    }

    /// Returns the shielded window handle.
    pub fn window(&self) -> WindowHandle {
        self.window
    }

    /// Returns the currently applied affinity state.
    pub fn mode(&self) -> AffinityMode {
        self.mode
    }

    /// Returns `true` when a style snapshot is pending restore.
    pub fn has_style_snapshot(&self) -> bool {
        self.saved_style.is_some()
    }

    /// Applies the capture shield.
    ///
    /// Snapshots the extended style word (first call only), sets the
    /// tool-window bit, then requests exclusion from capture with a fallback
    /// to monitor-only affinity. State changes only on successful OS writes;
    /// every failure is carried in the returned report.
    pub fn apply(&mut self) -> ApplyReport {
        let mut report = ApplyReport {
            mode: self.mode,
            style_hidden: false,
            style_error: None,
            exclude_error: None,
            monitor_error: None,
        };

        match self.hide_from_task_switcher() {
            Ok(()) => report.style_hidden = true,
            Err(error) => report.style_error = Some(error),
        }

        match self
            .backend
            .set_display_affinity(self.window, AffinityMode::ExcludedFromCapture)
        {
            Ok(()) => self.mode = AffinityMode::ExcludedFromCapture,
            Err(error) => {
                report.exclude_error = Some(error);
                match self
                    .backend
                    .set_display_affinity(self.window, AffinityMode::MonitorOnly)
                {
                    Ok(()) => self.mode = AffinityMode::MonitorOnly,
                    Err(error) => report.monitor_error = Some(error),
                }
            }
        }

        report.mode = self.mode;
        report
    }

    /// Restores the window to its pre-apply state.
    ///
    /// Writes the saved style word back verbatim and clears the display
    /// affinity when one was applied. Safe to call multiple times and safe
    /// without a prior [`CaptureShield::apply`]; successful restores are
    /// consumed so repeats become no-ops, failed ones stay pending for a
    /// later attempt.
    pub fn reset(&mut self) -> ResetReport {
        let mut report = ResetReport {
            style_restored: false,
            affinity_cleared: false,
            errors: Vec::new(),
        };

        if let Some(saved) = self.saved_style {
            match self.backend.write_extended_style(self.window, saved) {
                Ok(()) => {
                    self.saved_style = None;
                    report.style_restored = true;
                }
                Err(error) => report.errors.push(error),
            }
        }

        if self.mode != AffinityMode::Normal {
            match self
                .backend
                .set_display_affinity(self.window, AffinityMode::Normal)
            {
                Ok(()) => {
                    self.mode = AffinityMode::Normal;
                    report.affinity_cleared = true;
                }
                Err(error) => report.errors.push(error),
            }
        }

        report
    }

    fn hide_from_task_switcher(&mut self) -> Result<(), AffinityError> {
        let current = self.backend.read_extended_style(self.window)?;
        if self.saved_style.is_none() {
            self.saved_style = Some(current);
        }

        let hidden = current | TOOL_WINDOW_STYLE_BIT;
        if hidden != current {
            self.backend.write_extended_style(self.window, hidden)?;
        }
        Ok(())
    }
}

/// Affinity layer error type.
#[derive(Debug, Error)]
pub enum AffinityError {
    /// Platform provides no display affinity control.
    #[error("display affinity is not supported on this platform")]
    Unsupported,
    /// OS rejected an affinity or style call.
    #[error("{call} failed with OS error {code}")]
    Os {
        /// Failing OS entry point.
        call: &'static str,
        /// Error code from the thread's last-error slot.
        code: u32,
    },
}

#[cfg(test)]
mod tests {
    //! Unit tests for the numeric OS contract.

    use super::*;

    #[test]
    fn affinity_values_match_os_contract() {
        assert_eq!(AffinityMode::Normal.os_value(), 0x0);
        assert_eq!(AffinityMode::MonitorOnly.os_value(), 0x1);
        assert_eq!(AffinityMode::ExcludedFromCapture.os_value(), 0x11);
        assert_eq!(TOOL_WINDOW_STYLE_BIT, 0x80);
    }
}
