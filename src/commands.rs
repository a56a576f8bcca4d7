/// Available commands and autocomplete logic

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandAction {
  ShowTools,
  ShowArticles,
  ShowPrompts,
  Refresh,
  CachePanel,
  ClearCache,
  ToggleLoader,
  Quit,
}

#[derive(Debug, Clone)]
pub struct Command {
  pub name: &'static str,
  pub aliases: &'static [&'static str],
  pub description: &'static str,
  pub action: CommandAction,
}

/// All available commands
pub const COMMANDS: &[Command] = &[
  Command {
    name: "tools",
    aliases: &["t", "tool"],
    description: "Browse AI tools",
    action: CommandAction::ShowTools,
  },
  Command {
    name: "articles",
    aliases: &["a", "article", "blog"],
    description: "Browse articles",
    action: CommandAction::ShowArticles,
  },
  Command {
    name: "prompts",
    aliases: &["p", "prompt"],
    description: "Browse prompts",
    action: CommandAction::ShowPrompts,
  },
  Command {
    name: "refresh",
    aliases: &["r", "reload"],
    description: "Refetch the current list",
    action: CommandAction::Refresh,
  },
  Command {
    name: "cache",
    aliases: &["c", "info"],
    description: "Show persisted cache info",
    action: CommandAction::CachePanel,
  },
  Command {
    name: "clear-cache",
    aliases: &["purge"],
    description: "Delete the persisted cache",
    action: CommandAction::ClearCache,
  },
  Command {
    name: "loader",
    aliases: &["l"],
    description: "Toggle the loading indicator",
    action: CommandAction::ToggleLoader,
  },
  Command {
    name: "quit",
    aliases: &["q", "exit"],
    description: "Exit toolshelf",
    action: CommandAction::Quit,
  },
];

/// Rank of a command for `input`, lower is better
fn rank(cmd: &Command, input: &str) -> Option<u8> {
  let aliases = || cmd.aliases.iter();

  if cmd.name == input {
    Some(0)
  } else if aliases().any(|a| *a == input) {
    Some(1)
  } else if cmd.name.starts_with(input) {
    Some(2)
  } else if aliases().any(|a| a.starts_with(input)) {
    Some(3)
  } else if cmd.name.contains(input) {
    Some(4)
  } else if aliases().any(|a| a.contains(input)) {
    Some(5)
  } else {
    None
  }
}

/// Get autocomplete suggestions for a given input
pub fn get_suggestions(input: &str) -> Vec<&'static Command> {
  let input_lower = input.trim().to_lowercase();

  if input_lower.is_empty() {
    return COMMANDS.iter().collect();
  }

  let mut matches: Vec<(&Command, u8)> = COMMANDS
    .iter()
    .filter_map(|cmd| rank(cmd, &input_lower).map(|r| (cmd, r)))
    .collect();

  // Stable sort keeps declaration order within a rank
  matches.sort_by_key(|(_, priority)| *priority);

  matches.into_iter().map(|(cmd, _)| cmd).collect()
}
