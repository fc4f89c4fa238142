//! Shared backend fixtures for shield tests.

use std::sync::Mutex;

use veil_affinity::{AffinityBackend, AffinityError, AffinityMode, WindowHandle};

/// In-memory affinity backend with scriptable rejections.
///
/// Records every style write and affinity request so tests can assert call
/// order and bitwise restoration.
pub struct FakeAffinityBackend {
    style: Mutex<i32>,
    style_writes: Mutex<Vec<i32>>,
    affinity_requests: Mutex<Vec<AffinityMode>>,
    reject_exclude: bool,
    reject_monitor: bool,
    reject_style_read: bool,
}

#[allow(dead_code)]
impl FakeAffinityBackend {
    /// Backend that accepts everything, starting from `initial_style`.
    pub fn new(initial_style: i32) -> Self {
        Self {
            style: Mutex::new(initial_style),
            style_writes: Mutex::new(Vec::new()),
            affinity_requests: Mutex::new(Vec::new()),
            reject_exclude: false,
            reject_monitor: false,
            reject_style_read: false,
        }
    }

    /// Backend that rejects exclude-from-capture but accepts monitor-only.
    pub fn rejecting_exclude(initial_style: i32) -> Self {
        Self {
            reject_exclude: true,
            ..Self::new(initial_style)
        }
    }

    /// Backend that rejects every non-normal affinity request.
    pub fn rejecting_all_affinity(initial_style: i32) -> Self {
        Self {
            reject_exclude: true,
            reject_monitor: true,
            ..Self::new(initial_style)
        }
    }

    /// Backend whose style word cannot be read.
    pub fn rejecting_style_read(initial_style: i32) -> Self {
        Self {
            reject_style_read: true,
            ..Self::new(initial_style)
        }
    }

    /// Returns the style word the window currently carries.
    pub fn current_style(&self) -> i32 {
        *self.style.lock().expect("style lock should not be poisoned")
    }

    /// Overwrites the style word behind the shield's back.
    pub fn mutate_style(&self, style: i32) {
        *self.style.lock().expect("style lock should not be poisoned") = style;
    }

    /// Returns every style word written through the backend.
    pub fn style_writes(&self) -> Vec<i32> {
        self.style_writes
            .lock()
            .expect("write log lock should not be poisoned")
            .clone()
    }

    /// Returns every affinity request in call order, including rejected ones.
    pub fn affinity_requests(&self) -> Vec<AffinityMode> {
        self.affinity_requests
            .lock()
            .expect("request log lock should not be poisoned")
            .clone()
    }
}

impl AffinityBackend for FakeAffinityBackend {
    fn read_extended_style(&self, _window: WindowHandle) -> Result<i32, AffinityError> {
        if self.reject_style_read {
            return Err(AffinityError::Os {
                call: "GetWindowLongW",
                code: 1400,
            });
        }
        Ok(self.current_style())
    }

    fn write_extended_style(&self, _window: WindowHandle, style: i32) -> Result<(), AffinityError> {
        self.style_writes
            .lock()
            .expect("write log lock should not be poisoned")
            .push(style);
        *self.style.lock().expect("style lock should not be poisoned") = style;
        Ok(())
    }

    fn set_display_affinity(
        &self,
        _window: WindowHandle,
        mode: AffinityMode,
    ) -> Result<(), AffinityError> {
        self.affinity_requests
            .lock()
            .expect("request log lock should not be poisoned")
            .push(mode);

        let rejected = match mode {
            AffinityMode::Normal => false,
            AffinityMode::MonitorOnly => self.reject_monitor,
            AffinityMode::ExcludedFromCapture => self.reject_exclude,
        };
        if rejected {
            return Err(AffinityError::Os {
                call: "SetWindowDisplayAffinity",
                code: 87,
            });
        }
        Ok(())
    }
}

/// Window handle fixture for shield tests.
#[allow(dead_code)]
pub fn fixture_window() -> WindowHandle {
    WindowHandle::new(0x4242)
}
