//! Simulated progress for operations of unknown duration.
//!
//! `ProgressIndicator` is a pure state machine: timers are deadlines it holds
//! and fires from `poll(now)`. Cancelling a timer clears its deadline, so no
//! stale step can land after `done()` or `destroy()`.

use std::time::{Duration, Instant};
use tracing::trace;

/// Percent a new cycle starts at unless told otherwise.
pub const DEFAULT_INITIAL_PERCENT: f64 = 5.0;

/// Automatic advancement stops here; only `done()` reports completion.
const AUTO_CEILING: f64 = 99.0;

const MIN_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSettings {
  /// Ordered targets the automatic timer steps through
  pub steps: Vec<f64>,
  /// Delay between automatic steps
  pub step_interval: Duration,
  /// Added per step once `steps` is exhausted
  pub trickle_amount: f64,
  /// How long the full bar stays visible after `done()`
  pub hide_delay: Duration,
  pub show_percentage: bool,
}

impl Default for ProgressSettings {
  fn default() -> Self {
    Self {
      steps: vec![10.0, 20.0, 40.0, 60.0, 80.0, 90.0, 95.0, 98.0],
      step_interval: Duration::from_millis(200),
      trickle_amount: 0.5,
      hide_delay: Duration::from_millis(300),
      show_percentage: true,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressPhase {
  Idle,
  Active,
  Completing,
}

/// What the rendering adapter paints.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ProgressState {
  pub is_active: bool,
  pub current_percent: f64,
  pub percent_label_visible: bool,
}

#[derive(Debug)]
pub struct ProgressIndicator {
  settings: ProgressSettings,
  phase: ProgressPhase,
  percent: f64,
  next_step: usize,
  step_at: Option<Instant>,
  hide_at: Option<Instant>,
  completed_cycles: u64,
}

impl ProgressIndicator {
  pub fn new(mut settings: ProgressSettings) -> Self {
    settings.step_interval = settings.step_interval.max(MIN_INTERVAL);
    Self {
      settings,
      phase: ProgressPhase::Idle,
      percent: 0.0,
      next_step: 0,
      step_at: None,
      hide_at: None,
      completed_cycles: 0,
    }
  }

  /// Begin a cycle at the default initial percent.
  pub fn start(&mut self, now: Instant) {
    self.start_from(DEFAULT_INITIAL_PERCENT, now);
  }

  /// Begin a cycle at `initial` percent. A running or completing cycle is
  /// left alone.
  pub fn start_from(&mut self, initial: f64, now: Instant) {
    if self.phase != ProgressPhase::Idle {
      return;
    }

    self.phase = ProgressPhase::Active;
    self.percent = clamp(initial);
    self.next_step = 0;
    self.step_at = Some(now + self.settings.step_interval);
  }

  /// Jump to `percent`. Ignored outside an active cycle; never moves back.
  #[allow(dead_code)]
  pub fn set(&mut self, percent: f64) {
    if self.phase == ProgressPhase::Active {
      self.percent = self.percent.max(clamp(percent));
    }
  }

  /// Advance by `amount`. Ignored outside an active cycle; never moves back.
  pub fn increment(&mut self, amount: f64) {
    if self.phase == ProgressPhase::Active {
      self.percent = self.percent.max(clamp(self.percent + amount));
    }
  }

  /// Fill the bar and hide it after the hide delay.
  pub fn done(&mut self, now: Instant) {
    if self.phase != ProgressPhase::Active {
      return;
    }

    self.step_at = None;
    self.percent = 100.0;
    self.phase = ProgressPhase::Completing;
    self.hide_at = Some(now + self.settings.hide_delay);
  }

  /// Cancel everything and reset, whatever the current phase.
  pub fn destroy(&mut self) {
    self.phase = ProgressPhase::Idle;
    self.percent = 0.0;
    self.next_step = 0;
    self.step_at = None;
    self.hide_at = None;
  }

  /// Fire every timer due at `now`. Returns whether anything changed.
  pub fn poll(&mut self, now: Instant) -> bool {
    match self.phase {
      ProgressPhase::Idle => false,
      ProgressPhase::Active => {
        let mut changed = false;
        while let Some(at) = self.step_at.filter(|at| *at <= now) {
          self.advance();
          self.step_at = Some(at + self.settings.step_interval);
          changed = true;
        }
        changed
      }
      ProgressPhase::Completing => match self.hide_at {
        Some(at) if at <= now => {
          self.hide_at = None;
          self.phase = ProgressPhase::Idle;
          self.percent = 0.0;
          self.completed_cycles += 1;
          trace!(cycles = self.completed_cycles, "progress cycle finished");
          true
        }
        _ => false,
      },
    }
  }

  /// Room left before automatic advancement stops.
  pub fn headroom(&self) -> f64 {
    (AUTO_CEILING - self.percent).max(0.0)
  }

  pub fn phase(&self) -> ProgressPhase {
    self.phase
  }

  pub fn state(&self) -> ProgressState {
    let is_active = self.phase != ProgressPhase::Idle;
    ProgressState {
      is_active,
      current_percent: self.percent,
      percent_label_visible: is_active && self.settings.show_percentage,
    }
  }

  /// Cycles that ran all the way through the hide delay.
  #[cfg(test)]
  pub fn completed_cycles(&self) -> u64 {
    self.completed_cycles
  }

  fn advance(&mut self) {
    let target = match self.settings.steps.get(self.next_step) {
      Some(step) => {
        self.next_step += 1;
        *step
      }
      None => self.percent + self.settings.trickle_amount,
    };
    self.percent = self.percent.max(target.min(AUTO_CEILING));
  }
}

fn clamp(percent: f64) -> f64 {
  if percent.is_nan() {
    return 0.0;
  }
  percent.clamp(0.0, 100.0)
}
