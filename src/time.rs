// src/time.rs
//! Frame clock for the render loop.
//!
//! Elapsed time is measured from a fixed epoch taken when the clock is
//! created; the per-frame delta is whatever the host delivered, with no
//! smoothing or clamping. Natively the epoch is an [`Instant`], in the
//! browser it is `Date.now()`.

/// Snapshot of timing data for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Time {
    /// Seconds since the previous tick.
    pub delta: f32,
    /// Seconds since the epoch.
    pub elapsed: f64,
    pub frame: u64,
}

#[cfg(not(target_arch = "wasm32"))]
#[derive(Debug, Clone, Copy)]
struct Epoch(std::time::Instant);

#[cfg(not(target_arch = "wasm32"))]
impl Epoch {
    #[inline(always)]
    fn now() -> Self {
        Self(std::time::Instant::now())
    }

    #[inline(always)]
    fn seconds_since(&self) -> f64 {
        self.0.elapsed().as_secs_f64()
    }
}

#[cfg(target_arch = "wasm32")]
#[derive(Debug, Clone, Copy)]
struct Epoch(f64);

#[cfg(target_arch = "wasm32")]
impl Epoch {
    #[inline(always)]
    fn now() -> Self {
        Self(js_sys::Date::now())
    }

    #[inline(always)]
    fn seconds_since(&self) -> f64 {
        (js_sys::Date::now() - self.0) / 1000.0
    }
}

#[derive(Debug)]
pub struct Clock {
    epoch: Epoch,
    last: f64,
    frame: u64,
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock {
    pub fn new() -> Self {
        Self { epoch: Epoch::now(), last: 0.0, frame: 0 }
    }

    /// Seconds since the epoch, without advancing the clock.
    #[inline(always)]
    pub fn elapsed(&self) -> f64 {
        self.epoch.seconds_since()
    }

    /// Advances to `now` seconds since the epoch. Time never runs backwards.
    pub fn tick_at(&mut self, now: f64) -> Time {
        let now = now.max(self.last);
        let delta = (now - self.last) as f32;
        self.last = now;
        self.frame += 1;
        Time { delta, elapsed: now, frame: self.frame }
    }
}

// ================ SCOPED TRACING TIMER ================
/// Runs `$block` inside an `info` span and logs how long it took.
#[macro_export]
macro_rules! timed {
    ($name:literal, $block:expr) => {{
        let _span = tracing::info_span!($name).entered();
        let clock = $crate::time::Clock::new();
        let result = $block;
        let elapsed = clock.elapsed() as f32;
        tracing::debug!(?elapsed, concat!($name, " took"));
        result
    }};
}
