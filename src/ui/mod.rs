mod components;
pub mod overlay;
mod renderfns;
mod views;

use crate::app::{App, Mode};
use ratatui::prelude::*;
use ratatui::widgets::Paragraph;

/// Main draw function
pub fn draw(frame: &mut Frame, app: &App) {
  let chunks = Layout::default()
    .direction(Direction::Vertical)
    .constraints([
      Constraint::Length(1), // Header
      Constraint::Min(1),    // Main content
      Constraint::Length(1), // Status bar
    ])
    .split(frame.area());

  renderfns::draw_header(frame, chunks[0], app.title(), app.catalog_url(), app.tab());

  views::catalog_list::draw_catalog_list(
    frame,
    chunks[1],
    app.tab().title(),
    &app.rows(),
    app.selected(),
  );

  if app.show_cache_panel() {
    views::cache_panel::draw_cache_panel(frame, chunks[1], &app.cache_info());
  }

  if *app.mode() == Mode::Command {
    components::draw_command_overlay(
      frame,
      chunks[1],
      app.command_input(),
      &app.autocomplete_suggestions(),
      app.selected_suggestion(),
    );
  }

  draw_status_bar(frame, chunks[2], app);

  // Loader sits above everything else
  let loader = app.loader();
  overlay::draw_overlay(
    frame,
    frame.area(),
    app.overlay_style(),
    loader.progress(),
    loader.backdrop_visible(),
  );
}

fn draw_status_bar(frame: &mut Frame, area: Rect, app: &App) {
  let (content, style) = match (app.mode(), app.status()) {
    (Mode::Command, _) => (
      format!(":{}", app.command_input()),
      Style::default().fg(Color::Yellow),
    ),
    (Mode::Normal, Some(status)) => (format!(" {}", status), Style::default().fg(Color::Yellow)),
    (Mode::Normal, None) => (
      " :command  1-3/Tab:section  j/k:nav  r:refresh  l:loader  i:cache  q:quit".to_string(),
      Style::default().fg(Color::DarkGray),
    ),
  };

  let paragraph = Paragraph::new(content).style(style);
  frame.render_widget(paragraph, area);
}
