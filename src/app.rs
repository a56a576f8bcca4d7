use crate::cache::{
  self, CacheAdministration, CacheInfo, CacheSubscription, PersistOptions, PersistentCacheStore,
  SlotStorage,
};
use crate::catalog::{Article, CatalogClient, CatalogQueryKey, CatalogRow, Prompt, Tool};
use crate::commands::{self, Command, CommandAction};
use crate::config::Config;
use crate::event::{Event, EventHandler};
use crate::loading::{LoadingCoordinator, ProgressIndicator};
use crate::query::{QueryClient, QueryKey, QueryState};
use crate::ui::{self, overlay::OverlayStyle};
use color_eyre::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use crossterm::terminal::{
  disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::prelude::*;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::io::stdout;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Fast enough for a smooth progress bar
const TICK_RATE: Duration = Duration::from_millis(50);

/// Input mode
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
  Normal,
  Command,
}

/// Catalog section shown in the main list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tab {
  Tools,
  Articles,
  Prompts,
}

impl Tab {
  pub const ALL: [Tab; 3] = [Tab::Tools, Tab::Articles, Tab::Prompts];

  pub fn title(self) -> &'static str {
    match self {
      Tab::Tools => "Tools",
      Tab::Articles => "Articles",
      Tab::Prompts => "Prompts",
    }
  }

  fn query_key(self) -> CatalogQueryKey {
    match self {
      Tab::Tools => CatalogQueryKey::Tools,
      Tab::Articles => CatalogQueryKey::Articles,
      Tab::Prompts => CatalogQueryKey::Prompts,
    }
  }

  fn next(self) -> Self {
    match self {
      Tab::Tools => Tab::Articles,
      Tab::Articles => Tab::Prompts,
      Tab::Prompts => Tab::Tools,
    }
  }

  fn previous(self) -> Self {
    self.next().next()
  }
}

/// Main application state
pub struct App {
  tab: Tab,
  selected: usize,

  /// Current input mode
  mode: Mode,

  /// Command input buffer (after pressing :)
  command_input: String,

  /// Selected autocomplete suggestion index
  selected_suggestion: usize,

  show_cache_panel: bool,

  /// One-line message for the status bar
  status: Option<String>,

  /// Application configuration
  config: Config,

  catalog: Option<CatalogClient>,
  queries: QueryClient,
  persistence: PersistentCacheStore<Box<dyn SlotStorage>>,
  cache_events: CacheSubscription,
  loader: LoadingCoordinator,
  overlay: OverlayStyle,

  /// Whether to quit
  should_quit: bool,
}

impl App {
  pub fn new(config: Config) -> Self {
    let queries = QueryClient::new(config.cache.stale_time());
    let persistence = PersistentCacheStore::new(
      cache::open_storage(&config.cache),
      PersistOptions::from_config(&config.cache),
    );

    if let Some(snapshot) = persistence.restore(&queries) {
      info!(queries = snapshot.entries.len(), "warm start from persisted cache");
    }
    let cache_events = CacheSubscription::new(&queries);

    let (catalog, status) = match CatalogClient::new(&config) {
      Ok(client) => (Some(client), None),
      Err(e) => {
        warn!(error = %e, "catalog unavailable");
        (None, Some(e.to_string()))
      }
    };

    let loader = LoadingCoordinator::new(
      config.loader.loader_settings(),
      ProgressIndicator::new(config.loader.progress_settings()),
    );
    let overlay = OverlayStyle::from_config(&config.loader);

    Self {
      tab: Tab::Tools,
      selected: 0,
      mode: Mode::Normal,
      command_input: String::new(),
      selected_suggestion: 0,
      show_cache_panel: false,
      status,
      config,
      catalog,
      queries,
      persistence,
      cache_events,
      loader,
      overlay,
      should_quit: false,
    }
  }

  pub async fn run(&mut self) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    // Create event handler
    let mut events = EventHandler::new(TICK_RATE);
    self.loader.attach(&self.queries, Instant::now());

    // Initial data load
    self.load_current(false);

    // Main loop
    while !self.should_quit {
      // Draw UI
      terminal.draw(|frame| ui::draw(frame, self))?;

      // Handle events
      match events.next().await {
        Some(event) => self.handle_event(event),
        None => break,
      }
    }

    self.shutdown();

    // Cleanup terminal
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    Ok(())
  }

  fn handle_event(&mut self, event: Event) {
    match event {
      Event::Key(key) => self.handle_key(key),
      Event::Resize | Event::Tick => {}
    }
    self.tick(Instant::now());
  }

  /// Advance every timer and flush cache changes to storage
  fn tick(&mut self, now: Instant) {
    self.loader.poll(now);
    self
      .persistence
      .sync(&mut self.cache_events, &self.queries);
  }

  fn shutdown(&mut self) {
    self.loader.teardown();
    self
      .persistence
      .sync(&mut self.cache_events, &self.queries);
  }

  fn handle_key(&mut self, key: KeyEvent) {
    match self.mode {
      Mode::Normal => self.handle_normal_mode_key(key),
      Mode::Command => self.handle_command_mode_key(key),
    }
  }

  fn handle_normal_mode_key(&mut self, key: KeyEvent) {
    let now = Instant::now();
    match key.code {
      KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
        self.should_quit = true;
      }
      KeyCode::Char('q') => {
        if self.show_cache_panel {
          self.show_cache_panel = false;
        } else {
          self.should_quit = true;
        }
      }
      KeyCode::Esc => self.show_cache_panel = false,

      // Navigation
      KeyCode::Up | KeyCode::Char('k') => self.move_selection(-1),
      KeyCode::Down | KeyCode::Char('j') => self.move_selection(1),
      KeyCode::Tab => self.switch_tab(self.tab.next()),
      KeyCode::BackTab => self.switch_tab(self.tab.previous()),
      KeyCode::Char('1') => self.switch_tab(Tab::Tools),
      KeyCode::Char('2') => self.switch_tab(Tab::Articles),
      KeyCode::Char('3') => self.switch_tab(Tab::Prompts),

      // Actions
      KeyCode::Char('r') => self.run_action(CommandAction::Refresh, now),
      KeyCode::Char('l') => self.run_action(CommandAction::ToggleLoader, now),
      KeyCode::Char('i') => self.show_cache_panel = !self.show_cache_panel,
      KeyCode::Char('x') if self.show_cache_panel => {
        self.run_action(CommandAction::ClearCache, now)
      }

      // Mode switches
      KeyCode::Char(':') => {
        self.mode = Mode::Command;
        self.command_input.clear();
      }

      _ => {}
    }
  }

  fn handle_command_mode_key(&mut self, key: KeyEvent) {
    match key.code {
      KeyCode::Esc => {
        self.mode = Mode::Normal;
        self.command_input.clear();
        self.selected_suggestion = 0;
      }
      KeyCode::Enter => {
        self.execute_command();
        self.mode = Mode::Normal;
        self.selected_suggestion = 0;
      }
      KeyCode::Tab | KeyCode::Down => {
        // Navigate autocomplete suggestions
        let count = commands::get_suggestions(&self.command_input).len();
        if count > 0 {
          self.selected_suggestion = (self.selected_suggestion + 1) % count;
        }
      }
      KeyCode::BackTab | KeyCode::Up => {
        let count = commands::get_suggestions(&self.command_input).len();
        if count > 0 {
          self.selected_suggestion = (self.selected_suggestion + count - 1) % count;
        }
      }
      KeyCode::Backspace => {
        self.command_input.pop();
        self.selected_suggestion = 0; // Reset selection on input change
      }
      KeyCode::Char(c) => {
        self.command_input.push(c);
        self.selected_suggestion = 0; // Reset selection on input change
      }
      _ => {}
    }
  }

  fn execute_command(&mut self) {
    let action = commands::get_suggestions(&self.command_input)
      .get(self.selected_suggestion)
      .map(|cmd| cmd.action);

    match action {
      Some(action) => self.run_action(action, Instant::now()),
      None => self.status = Some(format!("Unknown command: {}", self.command_input.trim())),
    }
    self.command_input.clear();
  }

  fn run_action(&mut self, action: CommandAction, now: Instant) {
    match action {
      CommandAction::ShowTools => self.switch_tab(Tab::Tools),
      CommandAction::ShowArticles => self.switch_tab(Tab::Articles),
      CommandAction::ShowPrompts => self.switch_tab(Tab::Prompts),
      CommandAction::Refresh => self.load_current(true),
      CommandAction::CachePanel => self.show_cache_panel = true,
      CommandAction::ClearCache => {
        CacheAdministration::new(&self.persistence, &self.queries).clear_cache();
        self.status = Some("Cache cleared".to_string());
        self.load_current(false);
      }
      CommandAction::ToggleLoader => self.loader.toggle_loader(now),
      CommandAction::Quit => self.should_quit = true,
    }
  }

  fn switch_tab(&mut self, tab: Tab) {
    if self.tab != tab {
      self.tab = tab;
      self.selected = 0;
    }
    self.load_current(false);
  }

  /// Fetch the current tab; `force` refetches even fresh data
  fn load_current(&self, force: bool) {
    let key = self.tab.query_key();
    if force {
      self.queries.invalidate(&key);
    }

    let Some(catalog) = self.catalog.clone() else {
      return;
    };
    match self.tab {
      Tab::Tools => self.ensure(key, move || async move { catalog.tools().await }),
      Tab::Articles => self.ensure(key, move || async move { catalog.articles().await }),
      Tab::Prompts => self.ensure(key, move || async move { catalog.prompts().await }),
    }
  }

  fn ensure<T, F, Fut>(&self, key: CatalogQueryKey, fetcher: F)
  where
    T: Serialize + Send + 'static,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>> + Send + 'static,
  {
    if self.queries.ensure(&key, fetcher).is_some() {
      debug!(query = %key.description(), "fetch started");
    }
  }

  fn move_selection(&mut self, delta: i32) {
    let len = self.rows().data().map_or(0, Vec::len);
    if len > 0 {
      self.selected = (self.selected as i32 + delta).rem_euclid(len as i32) as usize;
    }
  }

  // Accessors for UI rendering

  /// Rows of the current tab
  pub fn rows(&self) -> QueryState<Vec<CatalogRow>> {
    match self.tab {
      Tab::Tools => self.rows_for::<Tool>(),
      Tab::Articles => self.rows_for::<Article>(),
      Tab::Prompts => self.rows_for::<Prompt>(),
    }
  }

  fn rows_for<T>(&self) -> QueryState<Vec<CatalogRow>>
  where
    T: DeserializeOwned,
    for<'a> CatalogRow: From<&'a T>,
  {
    match self.queries.state::<_, Vec<T>>(&self.tab.query_key()) {
      QueryState::Success(items) => QueryState::Success(items.iter().map(CatalogRow::from).collect()),
      QueryState::Loading => QueryState::Loading,
      QueryState::Error(e) => QueryState::Error(e),
      QueryState::Idle => QueryState::Idle,
    }
  }

  pub fn tab(&self) -> Tab {
    self.tab
  }

  pub fn selected(&self) -> usize {
    self.selected
  }

  pub fn mode(&self) -> &Mode {
    &self.mode
  }

  pub fn command_input(&self) -> &str {
    &self.command_input
  }

  pub fn status(&self) -> Option<&str> {
    self.status.as_deref()
  }

  pub fn title(&self) -> &str {
    self.config.title.as_deref().unwrap_or("toolshelf")
  }

  pub fn catalog_url(&self) -> &str {
    self.config.catalog.url.as_deref().unwrap_or("")
  }

  pub fn show_cache_panel(&self) -> bool {
    self.show_cache_panel
  }

  pub fn cache_info(&self) -> CacheInfo {
    CacheAdministration::new(&self.persistence, &self.queries).cache_info()
  }

  pub fn loader(&self) -> &LoadingCoordinator {
    &self.loader
  }

  pub fn overlay_style(&self) -> &OverlayStyle {
    &self.overlay
  }

  pub fn autocomplete_suggestions(&self) -> Vec<&'static Command> {
    commands::get_suggestions(&self.command_input)
  }

  pub fn selected_suggestion(&self) -> usize {
    self.selected_suggestion
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::CacheConfig;
  use crossterm::event::KeyEventState;

  fn app() -> App {
    App::new(Config {
      cache: CacheConfig {
        enabled: false,
        ..CacheConfig::default()
      },
      ..Config::default()
    })
  }

  fn press(app: &mut App, code: KeyCode) {
    app.handle_event(Event::Key(KeyEvent {
      code,
      modifiers: KeyModifiers::NONE,
      kind: crossterm::event::KeyEventKind::Press,
      state: KeyEventState::NONE,
    }));
  }

  #[test]
  fn test_tab_cycle() {
    assert_eq!(Tab::Tools.next(), Tab::Articles);
    assert_eq!(Tab::Tools.previous(), Tab::Prompts);
    assert_eq!(Tab::Prompts.next(), Tab::Tools);
  }

  #[test]
  fn test_missing_catalog_is_reported() {
    let app = app();
    assert!(app.status().unwrap().contains("No catalog URL"));
    assert!(matches!(app.rows(), QueryState::Idle));
  }

  #[test]
  fn test_rows_come_from_query_cache() {
    let mut app = app();
    app
      .queries
      .set_query_data(
        &CatalogQueryKey::Prompts,
        &vec![Prompt {
          id: "1".into(),
          title: "Summarize".into(),
          body: "Summarize the text\nin three bullets".into(),
          tags: vec!["writing".into()],
        }],
      )
      .unwrap();

    press(&mut app, KeyCode::Char('3'));
    let rows = app.rows();
    let rows = rows.data().unwrap();
    assert_eq!(rows[0].title, "Summarize");
    assert_eq!(rows[0].detail, "Summarize the text");
  }

  #[test]
  fn test_loader_key_toggles_manual_override() {
    let mut app = app();

    press(&mut app, KeyCode::Char('l'));
    assert!(app.loader().is_loading());

    press(&mut app, KeyCode::Char('l'));
    assert!(!app.loader().is_loading());
  }

  #[test]
  fn test_command_mode_executes_suggestion() {
    let mut app = app();

    press(&mut app, KeyCode::Char(':'));
    for c in "art".chars() {
      press(&mut app, KeyCode::Char(c));
    }
    press(&mut app, KeyCode::Enter);

    assert_eq!(app.tab(), Tab::Articles);
    assert_eq!(app.mode(), &Mode::Normal);
  }

  #[test]
  fn test_clear_cache_from_panel() {
    let mut app = app();
    app.queries.set_query_data(&CatalogQueryKey::Tools, &Vec::<Tool>::new()).unwrap();

    press(&mut app, KeyCode::Char('i'));
    assert!(app.show_cache_panel());
    press(&mut app, KeyCode::Char('x'));

    assert_eq!(app.cache_info().query_count, 0);
    assert_eq!(app.status(), Some("Cache cleared"));
  }
}
