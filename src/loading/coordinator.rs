//! Global loading signal derived from the query engine's in-flight counters.
//!
//! Raw counter changes restart a debounce window; the show/hide decision is
//! taken once the window passes quietly and applied through a small
//! transition table over `Quiet` and `Loading`. A fetch that started and
//! finished inside one window still shows the loader, and the hide follows
//! one quiet window later. While loading, a trickle interval keeps nudging
//! the progress bar forward.

use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::debug;

use super::progress::{ProgressIndicator, ProgressPhase, ProgressState};
use crate::query::{InFlight, QueryEngine};

#[derive(Debug, Clone, PartialEq)]
pub struct LoaderSettings {
  /// Fetches that must be in flight before the loader shows
  pub min_query_count: usize,
  /// When false, any running mutation suppresses the loader
  pub count_mutations: bool,
  pub debounce_delay: Duration,
  pub trickle_interval: Duration,
  pub trickle_amount: f64,
}

impl Default for LoaderSettings {
  fn default() -> Self {
    Self {
      min_query_count: 1,
      count_mutations: true,
      debounce_delay: Duration::from_millis(150),
      trickle_interval: Duration::from_millis(500),
      trickle_amount: 2.0,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadingPhase {
  Quiet,
  Loading,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Decision {
  Show,
  Hide,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transition {
  Enter,
  Leave,
}

fn transition(phase: LoadingPhase, decision: Decision) -> Option<Transition> {
  match (phase, decision) {
    (LoadingPhase::Quiet, Decision::Show) => Some(Transition::Enter),
    (LoadingPhase::Loading, Decision::Hide) => Some(Transition::Leave),
    _ => None,
  }
}

struct Sources {
  fetching: watch::Receiver<usize>,
  mutating: watch::Receiver<usize>,
}

pub struct LoadingCoordinator {
  settings: LoaderSettings,
  progress: ProgressIndicator,
  phase: LoadingPhase,
  /// Latest raw counters, not yet acted upon
  observed: InFlight,
  /// Highest counters seen since the window opened
  window_peak: InFlight,
  /// Fetch count seen by the previous debounced evaluation
  settled_fetching: usize,
  manual_override: bool,
  debounce_at: Option<Instant>,
  trickle_at: Option<Instant>,
  backdrop_visible: bool,
  sources: Option<Sources>,
  torn_down: bool,
}

impl LoadingCoordinator {
  pub fn new(settings: LoaderSettings, progress: ProgressIndicator) -> Self {
    let trickle_interval = settings.trickle_interval.max(Duration::from_millis(1));
    Self {
      settings: LoaderSettings {
        trickle_interval,
        ..settings
      },
      progress,
      phase: LoadingPhase::Quiet,
      observed: InFlight::default(),
      window_peak: InFlight::default(),
      settled_fetching: 0,
      manual_override: false,
      debounce_at: None,
      trickle_at: None,
      backdrop_visible: false,
      sources: None,
      torn_down: false,
    }
  }

  /// Follow `engine`'s in-flight counters from now on.
  pub fn attach<E: QueryEngine + ?Sized>(&mut self, engine: &E, now: Instant) {
    if self.torn_down {
      return;
    }
    self.sources = Some(Sources {
      fetching: engine.watch_fetching(),
      mutating: engine.watch_mutating(),
    });
    self.observe(engine.in_flight(), now);
  }

  /// Record raw counters and restart the debounce window if they changed.
  pub fn observe(&mut self, counts: InFlight, now: Instant) {
    if self.torn_down || counts == self.observed {
      return;
    }
    self.observed = counts;
    self.window_peak = InFlight {
      fetching: self.window_peak.fetching.max(counts.fetching),
      mutating: self.window_peak.mutating.max(counts.mutating),
    };
    self.debounce_at = Some(now + self.settings.debounce_delay);
  }

  /// Fire every timer due at `now`. Returns whether anything visible changed.
  pub fn poll(&mut self, now: Instant) -> bool {
    if self.torn_down {
      return false;
    }

    if let Some(counts) = self.read_sources() {
      self.observe(counts, now);
    }

    let mut changed = false;

    if let Some(at) = self.debounce_at.filter(|at| *at <= now) {
      self.debounce_at = None;
      changed |= self.evaluate(at);
    }

    while let Some(at) = self.trickle_at.filter(|at| *at <= now) {
      let amount = self.settings.trickle_amount.min(self.progress.headroom());
      if amount > 0.0 {
        self.progress.increment(amount);
        changed = true;
      }
      self.trickle_at = Some(at + self.settings.trickle_interval);
    }

    changed | self.progress.poll(now)
  }

  /// Force the loader on regardless of counters.
  pub fn show_loader(&mut self, now: Instant) {
    if self.torn_down {
      return;
    }
    self.manual_override = true;
    self.apply(Decision::Show, now);
  }

  /// Drop the manual override and stop the loader.
  pub fn hide_loader(&mut self, now: Instant) {
    if self.torn_down {
      return;
    }
    self.manual_override = false;
    self.apply(Decision::Hide, now);
  }

  pub fn toggle_loader(&mut self, now: Instant) {
    if self.manual_override {
      self.hide_loader(now);
    } else {
      self.show_loader(now);
    }
  }

  /// Unsubscribe and cancel every timer. Later calls do nothing.
  pub fn teardown(&mut self) {
    self.sources = None;
    self.debounce_at = None;
    self.trickle_at = None;
    self.window_peak = InFlight::default();
    self.progress.destroy();
    self.backdrop_visible = false;
    self.phase = LoadingPhase::Quiet;
    self.torn_down = true;
  }

  /// The aggregate "show global loading UI" signal.
  pub fn is_loading(&self) -> bool {
    self.phase == LoadingPhase::Loading
  }

  #[allow(dead_code)]
  pub fn phase(&self) -> LoadingPhase {
    self.phase
  }

  pub fn backdrop_visible(&self) -> bool {
    self.backdrop_visible
  }

  #[allow(dead_code)]
  pub fn manual_override(&self) -> bool {
    self.manual_override
  }

  pub fn progress(&self) -> ProgressState {
    self.progress.state()
  }

  fn read_sources(&mut self) -> Option<InFlight> {
    let sources = self.sources.as_mut()?;

    // A closed channel means the engine is gone; keep the last value
    let fetching_changed = sources.fetching.has_changed().unwrap_or(false);
    let mutating_changed = sources.mutating.has_changed().unwrap_or(false);
    if !fetching_changed && !mutating_changed {
      return None;
    }

    Some(InFlight {
      fetching: *sources.fetching.borrow_and_update(),
      mutating: *sources.mutating.borrow_and_update(),
    })
  }

  fn decide(&self, counts: InFlight) -> Decision {
    let busy = counts.fetching >= self.settings.min_query_count
      && (self.settings.count_mutations || counts.mutating == 0);
    if busy || self.manual_override {
      Decision::Show
    } else {
      Decision::Hide
    }
  }

  fn evaluate(&mut self, now: Instant) -> bool {
    let counts = self.observed;
    let peak = std::mem::replace(&mut self.window_peak, counts);
    let rising = peak.fetching > self.settled_fetching;
    self.settled_fetching = counts.fetching;

    let settled = self.decide(counts);
    let decision = if rising && self.decide(peak) == Decision::Show {
      Decision::Show
    } else {
      settled
    };

    debug!(?counts, ?peak, ?decision, rising, "debounced loading decision");

    let changed = match transition(self.phase, decision) {
      // Already-settled queries don't re-trigger the loader
      Some(Transition::Enter) if !rising && !self.manual_override => false,
      _ => self.apply(decision, now),
    };

    // The burst is over; settle on the final counts one window later
    if decision != settled {
      self.debounce_at = Some(now + self.settings.debounce_delay);
    }
    changed
  }

  fn apply(&mut self, decision: Decision, now: Instant) -> bool {
    match transition(self.phase, decision) {
      Some(Transition::Enter) => {
        // A bar still fading out from the last cycle would swallow `start`
        if self.progress.phase() == ProgressPhase::Completing {
          self.progress.destroy();
        }
        self.progress.start(now);
        self.trickle_at = Some(now + self.settings.trickle_interval);
        self.backdrop_visible = true;
        self.phase = LoadingPhase::Loading;
        debug!("global loader shown");
        true
      }
      Some(Transition::Leave) => {
        self.trickle_at = None;
        self.progress.done(now);
        self.backdrop_visible = false;
        self.phase = LoadingPhase::Quiet;
        debug!("global loader hidden");
        true
      }
      None => false,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::loading::progress::{ProgressSettings, DEFAULT_INITIAL_PERCENT};
  use crate::query::QueryClient;

  const DEBOUNCE: Duration = Duration::from_millis(150);
  const TICK: Duration = Duration::from_millis(10);

  fn coordinator(settings: LoaderSettings) -> LoadingCoordinator {
    LoadingCoordinator::new(settings, ProgressIndicator::new(ProgressSettings::default()))
  }

  fn fetching(n: usize) -> InFlight {
    InFlight {
      fetching: n,
      mutating: 0,
    }
  }

  /// Feed `counts` one tick apart, then keep polling until `until`, and
  /// report every change of the loading signal.
  fn drive(
    loader: &mut LoadingCoordinator,
    start: Instant,
    counts: &[usize],
    until: Duration,
  ) -> Vec<bool> {
    let mut transitions = Vec::new();
    let mut last = loader.is_loading();
    let mut now = start;

    let mut step = |loader: &mut LoadingCoordinator, now: Instant| {
      loader.poll(now);
      if loader.is_loading() != last {
        last = loader.is_loading();
        transitions.push(last);
      }
    };

    for n in counts {
      loader.observe(fetching(*n), now);
      step(&mut *loader, now);
      now += TICK;
    }
    while now <= start + until {
      step(&mut *loader, now);
      now += TICK;
    }
    transitions
  }

  #[test]
  fn test_shows_after_quiet_window() {
    let start = Instant::now();
    let mut loader = coordinator(LoaderSettings::default());

    loader.observe(fetching(1), start);
    loader.poll(start + DEBOUNCE - TICK);
    assert!(!loader.is_loading());

    loader.poll(start + DEBOUNCE);
    assert!(loader.is_loading());
    assert!(loader.backdrop_visible());
    assert_eq!(loader.progress.phase(), ProgressPhase::Active);
  }

  #[test]
  fn test_burst_inside_one_window_shows_and_hides_once() {
    let start = Instant::now();
    let mut loader = coordinator(LoaderSettings::default());

    let transitions = drive(&mut loader, start, &[0, 1, 2, 1, 0], Duration::from_secs(1));

    assert_eq!(transitions, vec![true, false]);
    assert!(!loader.backdrop_visible());
  }

  #[test]
  fn test_at_most_one_transition_per_window() {
    let start = Instant::now();
    let mut loader = coordinator(LoaderSettings::default());

    loader.observe(fetching(1), start);
    loader.observe(fetching(0), start + TICK);

    // Shown when the window closes, still shown right after
    loader.poll(start + TICK + DEBOUNCE);
    assert!(loader.is_loading());
    loader.poll(start + TICK + DEBOUNCE + TICK);
    assert!(loader.is_loading());

    // Hidden once a further quiet window has passed
    loader.poll(start + TICK + DEBOUNCE * 2);
    assert!(!loader.is_loading());
  }

  #[test]
  fn test_rise_while_bar_fades_out_restarts_progress() {
    let start = Instant::now();
    let mut loader = coordinator(LoaderSettings::default());

    // Show, then settle back to zero: the bar is now completing
    loader.observe(fetching(1), start);
    loader.poll(start + DEBOUNCE);
    loader.observe(fetching(0), start + DEBOUNCE);
    let hidden_at = start + DEBOUNCE * 2;
    loader.poll(hidden_at);
    assert!(!loader.is_loading());
    assert_eq!(loader.progress.phase(), ProgressPhase::Completing);

    // A new fetch within the hide delay
    loader.observe(fetching(1), hidden_at);
    loader.poll(hidden_at + DEBOUNCE);
    assert!(loader.is_loading());
    assert_eq!(loader.progress.phase(), ProgressPhase::Active);

    let mut now = hidden_at + DEBOUNCE;
    while now < hidden_at + Duration::from_secs(3) {
      loader.poll(now);
      now += TICK;
    }
    let progress = loader.progress();
    assert!(loader.is_loading());
    assert!(loader.backdrop_visible());
    assert!(progress.is_active);
    assert!(progress.current_percent > DEFAULT_INITIAL_PERCENT);
  }

  #[test]
  fn test_intermediate_drop_does_not_flicker() {
    let start = Instant::now();
    let mut loader = coordinator(LoaderSettings::default());

    // 0 -> 1 settles and shows the loader
    let shown = drive(&mut loader, start, &[0, 1], DEBOUNCE * 2);
    assert_eq!(shown, vec![true]);

    // 2 -> 1 -> 0 inside a single window hides it exactly once
    let later = start + DEBOUNCE * 3;
    let hidden = drive(&mut loader, later, &[2, 1, 0], DEBOUNCE * 4);
    assert_eq!(hidden, vec![false]);
  }

  #[test]
  fn test_settled_queries_do_not_retrigger() {
    let start = Instant::now();
    let mut loader = coordinator(LoaderSettings::default());

    loader.observe(fetching(2), start);
    loader.poll(start + DEBOUNCE);
    assert!(loader.is_loading());

    // Operator hides the loader while two queries keep running
    loader.hide_loader(start + DEBOUNCE);

    // One of them finishes: a decrease must not bring the loader back
    loader.observe(fetching(1), start + DEBOUNCE * 2);
    loader.poll(start + DEBOUNCE * 3);
    assert!(!loader.is_loading());

    // A new query starts: genuine increase
    loader.observe(fetching(2), start + DEBOUNCE * 4);
    loader.poll(start + DEBOUNCE * 5);
    assert!(loader.is_loading());
  }

  #[test]
  fn test_min_query_count() {
    let start = Instant::now();
    let mut loader = coordinator(LoaderSettings {
      min_query_count: 2,
      ..LoaderSettings::default()
    });

    loader.observe(fetching(1), start);
    loader.poll(start + DEBOUNCE);
    assert!(!loader.is_loading());

    loader.observe(fetching(2), start + DEBOUNCE);
    loader.poll(start + DEBOUNCE * 2);
    assert!(loader.is_loading());
  }

  #[test]
  fn test_mutations_suppress_when_not_counted() {
    let start = Instant::now();
    let mut loader = coordinator(LoaderSettings {
      count_mutations: false,
      ..LoaderSettings::default()
    });

    loader.observe(
      InFlight {
        fetching: 1,
        mutating: 1,
      },
      start,
    );
    loader.poll(start + DEBOUNCE);
    assert!(!loader.is_loading());
  }

  #[test]
  fn test_manual_override_independent_of_counts() {
    let start = Instant::now();
    let mut loader = coordinator(LoaderSettings::default());

    loader.show_loader(start);
    assert!(loader.is_loading());
    assert!(loader.backdrop_visible());

    // Zero counts settling does not hide a manual loader
    loader.observe(fetching(0), start);
    loader.poll(start + DEBOUNCE);
    assert!(loader.is_loading());

    loader.hide_loader(start + DEBOUNCE);
    assert!(!loader.is_loading());
    assert!(!loader.backdrop_visible());
  }

  #[test]
  fn test_toggle_loader() {
    let start = Instant::now();
    let mut loader = coordinator(LoaderSettings::default());

    loader.toggle_loader(start);
    assert!(loader.manual_override());
    assert!(loader.is_loading());

    loader.toggle_loader(start);
    assert!(!loader.manual_override());
    assert!(!loader.is_loading());
  }

  #[test]
  fn test_trickle_advances_progress_but_never_completes() {
    let start = Instant::now();
    let mut loader = coordinator(LoaderSettings::default());
    loader.show_loader(start);

    let mut last = loader.progress().current_percent;
    for i in 1..200 {
      loader.poll(start + Duration::from_millis(100) * i);
      let percent = loader.progress().current_percent;
      assert!(percent >= last);
      last = percent;
    }
    assert!(last > 90.0 && last < 100.0);
  }

  #[test]
  fn test_hide_completes_progress_cycle() {
    let start = Instant::now();
    let mut loader = coordinator(LoaderSettings::default());
    loader.show_loader(start);
    loader.hide_loader(start);

    assert_eq!(loader.progress().current_percent, 100.0);
    loader.poll(start + Duration::from_secs(1));
    assert!(!loader.progress().is_active);
    assert_eq!(loader.progress.completed_cycles(), 1);
  }

  #[test]
  fn test_teardown_silences_everything() {
    let start = Instant::now();
    let mut loader = coordinator(LoaderSettings::default());
    loader.show_loader(start);
    loader.observe(fetching(3), start);

    loader.teardown();

    assert!(!loader.poll(start + Duration::from_secs(5)));
    loader.show_loader(start);
    assert!(!loader.is_loading());
    assert!(!loader.backdrop_visible());
    assert!(!loader.progress().is_active);
  }

  #[tokio::test]
  async fn test_follows_engine_counters() {
    let engine = QueryClient::new(chrono::Duration::minutes(5));
    let mut loader = coordinator(LoaderSettings::default());
    let start = Instant::now();
    loader.attach(&engine, start);

    let (release, wait) = tokio::sync::oneshot::channel::<()>();
    let handle = engine
      .fetch(&crate::query::tests::TestKey("slow"), move || async move {
        let _ = wait.await;
        Ok(1)
      })
      .unwrap();

    loader.poll(start);
    loader.poll(start + DEBOUNCE);
    assert!(loader.is_loading());

    release.send(()).unwrap();
    handle.await.unwrap();

    loader.poll(start + DEBOUNCE * 2);
    loader.poll(start + DEBOUNCE * 3);
    assert!(!loader.is_loading());
  }
}
