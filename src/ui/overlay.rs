use crate::config::LoaderConfig;
use crate::loading::ProgressState;
use ratatui::prelude::*;
use ratatui::widgets::{Clear, Gauge};
use std::str::FromStr;
use tracing::warn;

/// Look of the global progress bar
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlayStyle {
  pub color: Color,
  /// Rows taken by the bar
  pub height: u16,
}

impl Default for OverlayStyle {
  fn default() -> Self {
    Self {
      color: Color::Cyan,
      height: 1,
    }
  }
}

impl OverlayStyle {
  pub fn from_config(config: &LoaderConfig) -> Self {
    let color = Color::from_str(&config.color).unwrap_or_else(|_| {
      warn!(color = %config.color, "unknown loader color, using cyan");
      Color::Cyan
    });

    Self {
      color,
      height: config.height.clamp(1, 3),
    }
  }
}

/// Draw the dimmed backdrop and the progress bar along the top edge
pub fn draw_overlay(
  frame: &mut Frame,
  area: Rect,
  style: &OverlayStyle,
  progress: ProgressState,
  backdrop: bool,
) {
  if backdrop {
    frame.buffer_mut().set_style(
      area,
      Style::default()
        .fg(Color::DarkGray)
        .add_modifier(Modifier::DIM),
    );
  }

  if !progress.is_active || area.height == 0 {
    return;
  }

  let bar = Rect {
    height: style.height.min(area.height),
    ..area
  };
  let label = if progress.percent_label_visible {
    format!("{:.0}%", progress.current_percent)
  } else {
    String::new()
  };

  let gauge = Gauge::default()
    .gauge_style(Style::default().fg(style.color).bg(Color::Black))
    .ratio((progress.current_percent / 100.0).clamp(0.0, 1.0))
    .label(Span::styled(label, Style::default().fg(Color::White).bold()));

  frame.render_widget(Clear, bar);
  frame.render_widget(gauge, bar);
}

#[cfg(test)]
mod tests {
  use super::*;
  use ratatui::backend::TestBackend;

  fn render(progress: ProgressState, backdrop: bool) -> Buffer {
    let mut terminal = Terminal::new(TestBackend::new(20, 4)).unwrap();
    terminal
      .draw(|frame| {
        let area = frame.area();
        draw_overlay(frame, area, &OverlayStyle::default(), progress, backdrop);
      })
      .unwrap();
    terminal.backend().buffer().clone()
  }

  fn row(buffer: &Buffer, y: u16) -> String {
    (0..buffer.area.width)
      .map(|x| buffer[(x, y)].symbol().to_string())
      .collect()
  }

  #[test]
  fn test_bar_shows_percentage() {
    let buffer = render(
      ProgressState {
        is_active: true,
        current_percent: 42.0,
        percent_label_visible: true,
      },
      true,
    );

    assert!(row(&buffer, 0).contains("42%"));
    assert!(buffer[(0, 3)].modifier.contains(Modifier::DIM));
  }

  #[test]
  fn test_label_can_be_hidden() {
    let buffer = render(
      ProgressState {
        is_active: true,
        current_percent: 42.0,
        percent_label_visible: false,
      },
      false,
    );

    assert!(!row(&buffer, 0).contains('%'));
  }

  #[test]
  fn test_idle_draws_nothing() {
    let buffer = render(ProgressState::default(), false);

    assert_eq!(row(&buffer, 0).trim(), "");
    assert!(!buffer[(0, 3)].modifier.contains(Modifier::DIM));
  }

  #[test]
  fn test_style_from_config() {
    let style = OverlayStyle::from_config(&LoaderConfig {
      color: "#3b82f6".to_string(),
      height: 9,
      ..LoaderConfig::default()
    });
    assert_eq!(style.color, Color::Rgb(0x3b, 0x82, 0xf6));
    assert_eq!(style.height, 3);

    let style = OverlayStyle::from_config(&LoaderConfig {
      color: "not-a-color".to_string(),
      ..LoaderConfig::default()
    });
    assert_eq!(style.color, Color::Cyan);
  }
}
