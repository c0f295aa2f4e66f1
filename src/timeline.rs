// src/timeline.rs
//! Chained tween timeline driven by explicit frame deltas.
//!
//! Each [`Tween`] is a small state machine (`Pending → Running → Completed`)
//! that eases one scalar from `from` to `to` after a start delay. A
//! [`Timeline`] runs its tweens strictly one after another: the next entry's
//! delay only starts counting once the previous entry completed, and time left
//! over from a frame that completes an entry flows into the next one.
//!
//! Tweens are single-shot. There is no stop, reset or restart.

use serde::{Deserialize, Serialize};
use std::f32::consts::PI;
use std::fmt;

/// Easing curves. Config names use the `power2.inOut` form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Ease {
    #[default]
    #[serde(rename = "none")]
    Linear,
    #[serde(rename = "power1.in")]
    Power1In,
    #[serde(rename = "power1.out")]
    Power1Out,
    #[serde(rename = "power1.inOut")]
    Power1InOut,
    #[serde(rename = "power2.in")]
    Power2In,
    #[serde(rename = "power2.out")]
    Power2Out,
    #[serde(rename = "power2.inOut")]
    Power2InOut,
    #[serde(rename = "power3.in")]
    Power3In,
    #[serde(rename = "power3.out")]
    Power3Out,
    #[serde(rename = "power3.inOut")]
    Power3InOut,
    #[serde(rename = "power4.in")]
    Power4In,
    #[serde(rename = "power4.out")]
    Power4Out,
    #[serde(rename = "power4.inOut")]
    Power4InOut,
    #[serde(rename = "sine.inOut")]
    SineInOut,
}

#[derive(Clone, Copy)]
enum Shape {
    In,
    Out,
    InOut,
}

impl Ease {
    /// Maps normalized time `t` in [0, 1] to eased progress in [0, 1].
    pub fn apply(self, t: f32) -> f32 {
        let t = t.clamp(0.0, 1.0);
        let (power, shape) = match self {
            Ease::Linear => return t,
            Ease::SineInOut => return -((PI * t).cos() - 1.0) / 2.0,
            Ease::Power1In => (2, Shape::In),
            Ease::Power1Out => (2, Shape::Out),
            Ease::Power1InOut => (2, Shape::InOut),
            Ease::Power2In => (3, Shape::In),
            Ease::Power2Out => (3, Shape::Out),
            Ease::Power2InOut => (3, Shape::InOut),
            Ease::Power3In => (4, Shape::In),
            Ease::Power3Out => (4, Shape::Out),
            Ease::Power3InOut => (4, Shape::InOut),
            Ease::Power4In => (5, Shape::In),
            Ease::Power4Out => (5, Shape::Out),
            Ease::Power4InOut => (5, Shape::InOut),
        };
        match shape {
            Shape::In => t.powi(power),
            Shape::Out => 1.0 - (1.0 - t).powi(power),
            Shape::InOut if t < 0.5 => (2.0 * t).powi(power) / 2.0,
            Shape::InOut => 1.0 - (2.0 - 2.0 * t).powi(power) / 2.0,
        }
    }
}

/// Lifecycle of one tween.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TweenState {
    Pending,
    Running,
    Completed,
}

type ApplyFn<C> = Box<dyn FnMut(&mut C, f32)>;
type HookFn<C> = Box<dyn FnMut(&mut C)>;

/// One timeline entry. `C` is the state the callbacks write into.
pub struct Tween<C> {
    label: String,
    delay: f32,
    duration: f32,
    ease: Ease,
    from: f32,
    to: f32,
    elapsed: f32,
    value: f32,
    state: TweenState,
    apply: ApplyFn<C>,
    on_start: Option<HookFn<C>>,
    on_update: Option<ApplyFn<C>>,
    on_complete: Option<HookFn<C>>,
}

impl<C> Tween<C> {
    /// `apply` receives every interpolated value, including `from` on start and
    /// exactly `to` on completion.
    pub fn new(
        label: impl Into<String>,
        from: f32,
        to: f32,
        duration: f32,
        apply: impl FnMut(&mut C, f32) + 'static,
    ) -> Self {
        Self {
            label: label.into(),
            delay: 0.0,
            duration: duration.max(0.0),
            ease: Ease::Linear,
            from,
            to,
            elapsed: 0.0,
            value: from,
            state: TweenState::Pending,
            apply: Box::new(apply),
            on_start: None,
            on_update: None,
            on_complete: None,
        }
    }

    pub fn delay(mut self, seconds: f32) -> Self {
        self.delay = seconds.max(0.0);
        self
    }

    pub fn ease(mut self, ease: Ease) -> Self {
        self.ease = ease;
        self
    }

    pub fn on_start(mut self, f: impl FnMut(&mut C) + 'static) -> Self {
        self.on_start = Some(Box::new(f));
        self
    }

    /// Called after `apply` on every tick while running, with the same value.
    pub fn on_update(mut self, f: impl FnMut(&mut C, f32) + 'static) -> Self {
        self.on_update = Some(Box::new(f));
        self
    }

    pub fn on_complete(mut self, f: impl FnMut(&mut C) + 'static) -> Self {
        self.on_complete = Some(Box::new(f));
        self
    }

    #[inline]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[inline]
    pub fn state(&self) -> TweenState {
        self.state
    }

    #[inline]
    pub fn is_completed(&self) -> bool {
        self.state == TweenState::Completed
    }

    /// Last value handed to `apply` (`from` while pending).
    #[inline]
    pub fn value(&self) -> f32 {
        self.value
    }

    /// Advances by `dt` seconds. Returns the part of `dt` that was not consumed
    /// because the tween completed during this step.
    pub fn advance(&mut self, ctx: &mut C, dt: f32) -> f32 {
        let mut dt = dt.max(0.0);

        if self.state == TweenState::Completed {
            return dt;
        }

        if self.state == TweenState::Pending {
            let wait = self.delay - self.elapsed;
            if dt < wait {
                self.elapsed += dt;
                return 0.0;
            }
            dt -= wait;
            self.elapsed = self.delay;
            self.state = TweenState::Running;
            log::debug!("tween '{}' started", self.label);
            if let Some(hook) = self.on_start.as_mut() {
                hook(ctx);
            }
            self.value = self.from;
            (self.apply)(ctx, self.from);
        }

        let remaining = self.duration - (self.elapsed - self.delay);
        if dt >= remaining {
            self.elapsed = self.delay + self.duration;
            self.emit(ctx, self.to);
            self.state = TweenState::Completed;
            log::debug!("tween '{}' completed", self.label);
            if let Some(hook) = self.on_complete.as_mut() {
                hook(ctx);
            }
            return dt - remaining;
        }

        self.elapsed += dt;
        let t = (self.elapsed - self.delay) / self.duration;
        let value = self.from + (self.to - self.from) * self.ease.apply(t);
        self.emit(ctx, value);
        0.0
    }

    fn emit(&mut self, ctx: &mut C, value: f32) {
        self.value = value;
        (self.apply)(ctx, value);
        if let Some(hook) = self.on_update.as_mut() {
            hook(ctx, value);
        }
    }
}

impl<C> fmt::Debug for Tween<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tween")
            .field("label", &self.label)
            .field("delay", &self.delay)
            .field("duration", &self.duration)
            .field("ease", &self.ease)
            .field("state", &self.state)
            .field("value", &self.value)
            .finish()
    }
}

/// Strictly sequential chain of tweens.
pub struct Timeline<C> {
    entries: Vec<Tween<C>>,
    current: usize,
}

impl<C> Default for Timeline<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> Timeline<C> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            current: 0,
        }
    }

    /// Appends an entry that starts once every earlier entry completed.
    pub fn then(mut self, tween: Tween<C>) -> Self {
        self.entries.push(tween);
        self
    }

    pub fn advance(&mut self, ctx: &mut C, dt: f32) {
        let mut dt = dt;
        while let Some(entry) = self.entries.get_mut(self.current) {
            dt = entry.advance(ctx, dt);
            if !entry.is_completed() {
                break;
            }
            self.current += 1;
        }
    }

    /// The entry currently waiting or running.
    pub fn active(&self) -> Option<&Tween<C>> {
        self.entries.get(self.current)
    }

    #[inline]
    pub fn is_finished(&self) -> bool {
        self.current >= self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Probe {
        start_prog: f32,
        progress: f32,
        retargets: u32,
        log: Vec<&'static str>,
    }

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-5
    }

    fn reveal() -> Timeline<Probe> {
        Timeline::new()
            .then(
                Tween::new("start", 0.0, 1.0, 2.0, |p: &mut Probe, v| p.start_prog = v)
                    .delay(1.0)
                    .on_start(|p: &mut Probe| p.log.push("start:begin"))
                    .on_update(|p: &mut Probe, _| p.retargets += 1)
                    .on_complete(|p: &mut Probe| p.log.push("start:end")),
            )
            .then(
                Tween::new("progress", 0.0, 1.0, 4.0, |p: &mut Probe, v| p.progress = v)
                    .on_start(|p: &mut Probe| p.log.push("progress:begin"))
                    .on_complete(|p: &mut Probe| p.log.push("progress:end")),
            )
    }

    #[test]
    fn test_ease_endpoints() {
        let all = [
            Ease::Linear,
            Ease::Power1In,
            Ease::Power1Out,
            Ease::Power1InOut,
            Ease::Power2In,
            Ease::Power2Out,
            Ease::Power2InOut,
            Ease::Power3In,
            Ease::Power3Out,
            Ease::Power3InOut,
            Ease::Power4In,
            Ease::Power4Out,
            Ease::Power4InOut,
            Ease::SineInOut,
        ];
        for ease in all {
            assert!(approx(ease.apply(0.0), 0.0), "{ease:?} at 0");
            assert!(approx(ease.apply(1.0), 1.0), "{ease:?} at 1");
            let mut last = 0.0;
            for step in 1..=20 {
                let v = ease.apply(step as f32 / 20.0);
                assert!(v + 1e-6 >= last, "{ease:?} not monotonic");
                last = v;
            }
        }
    }

    #[test]
    fn test_power2_in_out_midpoints() {
        assert!(approx(Ease::Power2InOut.apply(0.5), 0.5));
        assert!(approx(Ease::Power2InOut.apply(0.25), 4.0 * 0.25f32.powi(3)));
        assert!(approx(Ease::Power2Out.apply(0.5), 1.0 - 0.125));
    }

    #[test]
    fn test_ease_serde_names() {
        let ease: Ease = serde_json::from_str("\"power2.inOut\"").unwrap();
        assert_eq!(ease, Ease::Power2InOut);
        assert_eq!(serde_json::to_string(&Ease::Linear).unwrap(), "\"none\"");
    }

    #[test]
    fn test_tween_waits_for_delay() {
        let mut probe = Probe::default();
        let mut tween = Tween::new("t", 0.0, 1.0, 2.0, |p: &mut Probe, v| p.start_prog = v).delay(1.0);
        assert_eq!(tween.advance(&mut probe, 0.5), 0.0);
        assert_eq!(tween.state(), TweenState::Pending);
        assert_eq!(probe.start_prog, 0.0);

        tween.advance(&mut probe, 1.5);
        assert_eq!(tween.state(), TweenState::Running);
        assert!(approx(probe.start_prog, 0.5));
        assert!(approx(tween.value(), 0.5));
    }

    #[test]
    fn test_tween_returns_leftover() {
        let mut probe = Probe::default();
        let mut tween = Tween::new("t", 2.0, 4.0, 1.0, |p: &mut Probe, v| p.progress = v);
        let left = tween.advance(&mut probe, 1.25);
        assert!(approx(left, 0.25));
        assert!(tween.is_completed());
        assert_eq!(probe.progress, 4.0);
        assert!(approx(tween.advance(&mut probe, 0.5), 0.5));
    }

    #[test]
    fn test_zero_duration_completes_immediately() {
        let mut probe = Probe::default();
        let mut tween = Tween::new("snap", 0.0, 1.0, 0.0, |p: &mut Probe, v| p.progress = v);
        tween.advance(&mut probe, 0.0);
        assert!(tween.is_completed());
        assert_eq!(probe.progress, 1.0);
    }

    #[test]
    fn test_timeline_is_strictly_sequential() {
        let mut probe = Probe::default();
        let mut timeline = reveal();

        timeline.advance(&mut probe, 2.0);
        assert!(approx(probe.start_prog, 0.5));
        assert_eq!(probe.progress, 0.0);
        assert_eq!(timeline.active().map(Tween::label), Some("start"));

        timeline.advance(&mut probe, 1.0);
        assert_eq!(probe.start_prog, 1.0);
        assert_eq!(probe.log, vec!["start:begin", "start:end", "progress:begin"]);
        assert_eq!(probe.progress, 0.0);

        timeline.advance(&mut probe, 2.0);
        assert!(approx(probe.progress, 0.5));

        timeline.advance(&mut probe, 10.0);
        assert!(timeline.is_finished());
        assert_eq!(probe.progress, 1.0);
        assert_eq!(probe.log.last(), Some(&"progress:end"));
    }

    #[test]
    fn test_leftover_flows_into_next_entry() {
        let mut probe = Probe::default();
        let mut timeline = reveal();
        // 1s delay + 2s run, then 1s into the 4s progress tween.
        timeline.advance(&mut probe, 4.0);
        assert_eq!(probe.start_prog, 1.0);
        assert!(approx(probe.progress, 0.25));
    }

    #[test]
    fn test_update_hook_runs_each_running_tick() {
        let mut probe = Probe::default();
        let mut timeline = reveal();
        for _ in 0..10 {
            timeline.advance(&mut probe, 0.5);
        }
        // Ticks at 1.0 (start, zero progress), 1.5, 2.0, 2.5, 3.0 (completion).
        assert_eq!(probe.retargets, 5);
    }

    #[test]
    fn test_finished_timeline_ignores_time() {
        let mut probe = Probe::default();
        let mut timeline = reveal();
        timeline.advance(&mut probe, 100.0);
        assert!(timeline.is_finished());
        probe.progress = 0.3;
        timeline.advance(&mut probe, 1.0);
        assert_eq!(probe.progress, 0.3);
        assert!(timeline.active().is_none());
    }
}
