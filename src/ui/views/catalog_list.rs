use crate::catalog::CatalogRow;
use crate::query::QueryState;
use crate::ui::renderfns::truncate;
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph};

pub fn draw_catalog_list(
  frame: &mut Frame,
  area: Rect,
  name: &str,
  rows: &QueryState<Vec<CatalogRow>>,
  selected: usize,
) {
  let title = if rows.is_loading() {
    format!(" {} (loading...) ", name)
  } else if let Some(rows) = rows.data() {
    format!(" {} ({}) ", name, rows.len())
  } else {
    format!(" {} ", name)
  };

  let block = Block::default()
    .title(title)
    .borders(Borders::ALL)
    .border_style(Style::default().fg(Color::Blue));

  let rows = match rows.data() {
    Some(rows) if !rows.is_empty() => rows,
    data => {
      let (content, color) = match (rows.error(), data) {
        (Some(e), _) => (format!("Failed to load: {}", e), Color::Red),
        (None, Some(_)) => ("Nothing here yet.".to_string(), Color::DarkGray),
        (None, None) => (String::new(), Color::DarkGray),
      };
      let paragraph = Paragraph::new(content)
        .block(block)
        .style(Style::default().fg(color));
      frame.render_widget(paragraph, area);
      return;
    }
  };

  let items: Vec<ListItem> = rows
    .iter()
    .map(|row| {
      let line = Line::from(vec![
        Span::styled(
          format!("{:<28}", truncate(&row.title, 28)),
          Style::default().fg(Color::Cyan),
        ),
        Span::raw(" "),
        Span::styled(
          format!("{:<14}", truncate(&row.tag, 14)),
          Style::default().fg(Color::Yellow),
        ),
        Span::raw(" "),
        Span::raw(truncate(&row.detail, 60)),
      ]);
      ListItem::new(line)
    })
    .collect();

  let list = List::new(items)
    .block(block)
    .highlight_style(
      Style::default()
        .bg(Color::DarkGray)
        .add_modifier(Modifier::BOLD),
    )
    .highlight_symbol("> ");

  let mut state = ListState::default();
  state.select(Some(selected.min(rows.len() - 1)));

  frame.render_stateful_widget(list, area, &mut state);
}
