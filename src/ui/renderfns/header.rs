use crate::app::Tab;
use ratatui::prelude::*;
use ratatui::widgets::Paragraph;

/// Draw the header bar with title, catalog host, tabs, and shortcuts
pub fn draw_header(frame: &mut Frame, area: Rect, title: &str, catalog_url: &str, active: Tab) {
  let domain = extract_domain(catalog_url);

  let mut spans = vec![
    Span::styled(format!(" {} ", title), Style::default().fg(Color::Cyan).bold()),
    Span::styled("│", Style::default().fg(Color::DarkGray)),
    Span::styled(format!(" {} ", domain), Style::default().fg(Color::White)),
    Span::styled("│", Style::default().fg(Color::DarkGray)),
  ];

  for (i, tab) in Tab::ALL.iter().enumerate() {
    let label = format!(" {}:{} ", i + 1, tab.title());
    let style = if *tab == active {
      Style::default().fg(Color::Yellow).bold()
    } else {
      Style::default().fg(Color::DarkGray)
    };
    spans.push(Span::styled(label, style));
  }

  // Shortcuts - keys highlighted, descriptions dimmed
  for (key, description) in [("<:>", " command"), ("<r>", " refresh"), ("<i>", " cache")] {
    spans.push(Span::raw("   "));
    spans.push(Span::styled(key, Style::default().fg(Color::Cyan)));
    spans.push(Span::styled(description, Style::default().fg(Color::DarkGray)));
  }

  let paragraph = Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::Black));

  frame.render_widget(paragraph, area);
}

/// Extract the host from the catalog URL
fn extract_domain(url: &str) -> &str {
  url
    .strip_prefix("https://")
    .or_else(|| url.strip_prefix("http://"))
    .unwrap_or(url)
    .split('/')
    .next()
    .unwrap_or(url)
}
