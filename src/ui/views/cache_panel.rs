use crate::cache::CacheInfo;
use crate::ui::renderfns::centered_rect;
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Clear, Paragraph};

/// Popup listing what the persisted cache holds
pub fn draw_cache_panel(frame: &mut Frame, area: Rect, info: &CacheInfo) {
  let rows = info.rows();
  let panel = centered_rect(area, 48, rows.len() as u16 + 4);

  frame.render_widget(Clear, panel);

  let mut lines: Vec<Line> = rows
    .into_iter()
    .map(|(label, value)| {
      Line::from(vec![
        Span::styled(format!(" {:<14}", label), Style::default().fg(Color::DarkGray)),
        Span::styled(value, Style::default().fg(Color::White)),
      ])
    })
    .collect();

  lines.push(Line::default());
  lines.push(Line::from(vec![
    Span::styled(" <x>", Style::default().fg(Color::Cyan)),
    Span::styled(" clear   ", Style::default().fg(Color::DarkGray)),
    Span::styled("<Esc>", Style::default().fg(Color::Cyan)),
    Span::styled(" close", Style::default().fg(Color::DarkGray)),
  ]));

  let block = Block::default()
    .title(" Cache ")
    .borders(Borders::ALL)
    .border_style(Style::default().fg(Color::Yellow));

  frame.render_widget(Paragraph::new(lines).block(block), panel);
}

#[cfg(test)]
mod tests {
  use super::*;
  use ratatui::backend::TestBackend;

  #[test]
  fn test_panel_lists_cache_info() {
    let info = CacheInfo {
      size: 2048,
      query_count: 3,
      mutation_count: 0,
      timestamp: 0,
      version: "v1".to_string(),
    };

    let mut terminal = Terminal::new(TestBackend::new(60, 12)).unwrap();
    terminal
      .draw(|frame| {
        let area = frame.area();
        draw_cache_panel(frame, area, &info);
      })
      .unwrap();

    let buffer = terminal.backend().buffer();
    let text: String = (0..buffer.area.height)
      .flat_map(|y| (0..buffer.area.width).map(move |x| (x, y)))
      .map(|pos| buffer[pos].symbol().to_string())
      .collect();

    assert!(text.contains("Cache"));
    assert!(text.contains("2.0 KiB"));
    assert!(text.contains("never"));
  }
}
