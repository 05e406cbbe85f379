//! Terminal output for the operator console
//!
//! Worker lines are printed above the prompt: the current line is cleared,
//! the log line printed and the prompt drawn again.

use crossterm::cursor::{MoveTo, MoveToColumn};
use crossterm::style::{Attribute, Color, Print, ResetColor, SetAttribute, SetForegroundColor};
use crossterm::terminal::{Clear, ClearType};
use crossterm::{execute, queue};
use std::io::{self, Write};

use crate::infrastructure::logging::{LogLevel, LogMessage};

pub const PROMPT: &str = "> ";

const HELP: &[(&str, &str)] = &[
    ("help", "Show this help"),
    ("status", "Uptime, channels, modules, active users"),
    ("channels", "List connected channels"),
    ("modules", "List modules and their state"),
    ("reload <name>", "Reload a module"),
    ("load <name>", "Load a module"),
    ("unload <name>", "Unload a module"),
    ("send <text> [#channel]", "Send a message to chat"),
    ("points <see|add|remove|reset|top>", "Manage Elchcoins"),
    ("chat <user> <text> [#channel]", "Simulate a chat message"),
    ("clear", "Clear the screen"),
    ("exit", "Stop the bot"),
];

fn style(level: LogLevel) -> (&'static str, Option<Color>) {
    match level {
        LogLevel::Debug => ("[DEBUG]", Some(Color::DarkGrey)),
        LogLevel::Info => ("[INFO]", Some(Color::Cyan)),
        LogLevel::Success => ("[OK]", Some(Color::Green)),
        LogLevel::Warning => ("[WARN]", Some(Color::Yellow)),
        LogLevel::Error => ("[ERROR]", Some(Color::Red)),
        LogLevel::Fatal => ("[FATAL]", Some(Color::Magenta)),
        LogLevel::Raw => ("", None),
    }
}

pub struct Renderer<W: Write> {
    out: W,
}

impl Renderer<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> Renderer<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    pub fn prompt(&mut self) -> io::Result<()> {
        execute!(self.out, Print(PROMPT))
    }

    /// Print a log line above the prompt
    pub fn line(&mut self, message: &LogMessage) -> io::Result<()> {
        let (label, color) = style(message.level);
        queue!(self.out, MoveToColumn(0), Clear(ClearType::CurrentLine))?;
        match color {
            Some(color) => queue!(
                self.out,
                SetForegroundColor(color),
                Print(label),
                ResetColor,
                Print(" "),
                Print(&message.text),
                Print("\n")
            )?,
            None => queue!(self.out, Print(&message.text), Print("\n"))?,
        }
        self.prompt()
    }

    /// Console-side problem, shown like a worker error
    pub fn error(&mut self, text: impl Into<String>) -> io::Result<()> {
        self.line(&LogMessage::new(LogLevel::Error, text))
    }

    pub fn banner(&mut self, version: &str) -> io::Result<()> {
        queue!(
            self.out,
            SetForegroundColor(Color::Green),
            SetAttribute(Attribute::Bold),
            Print(format!("🦌 elchbot v{}\n", version)),
            SetAttribute(Attribute::Reset),
            ResetColor,
            Print("Type 'help' for the list of commands.\n")
        )?;
        self.prompt()
    }

    pub fn help(&mut self) -> io::Result<()> {
        let width = HELP.iter().map(|(cmd, _)| cmd.len()).max().unwrap_or(0);
        let rule = "─".repeat(width + 4 + HELP.iter().map(|(_, d)| d.len()).max().unwrap_or(0));

        queue!(self.out, Print(format!("┌{}┐\n", rule)))?;
        for (command, description) in HELP {
            queue!(
                self.out,
                Print("│ "),
                SetForegroundColor(Color::Yellow),
                Print(format!("{:width$}", command, width = width)),
                ResetColor,
                Print(format!("   {}\n", description))
            )?;
        }
        queue!(self.out, Print(format!("└{}┘\n", rule)))?;
        self.prompt()
    }

    pub fn newline(&mut self) -> io::Result<()> {
        execute!(self.out, Print("\n"))
    }

    pub fn clear(&mut self) -> io::Result<()> {
        queue!(self.out, Clear(ClearType::All), MoveTo(0, 0))?;
        self.prompt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rendered(f: impl FnOnce(&mut Renderer<Vec<u8>>) -> io::Result<()>) -> String {
        let mut renderer = Renderer::new(Vec::new());
        f(&mut renderer).unwrap();
        String::from_utf8(renderer.into_inner()).unwrap()
    }

    #[test]
    fn line_is_labelled_and_prompt_redrawn() {
        let out = rendered(|r| r.line(&LogMessage::new(LogLevel::Success, "Reloaded module dice")));
        let label = out.find("[OK]").unwrap();
        let text = out.find("Reloaded module dice").unwrap();
        assert!(label < text);
        assert!(out.ends_with(PROMPT));
    }

    #[test]
    fn raw_lines_are_printed_verbatim() {
        let out = rendered(|r| r.line(&LogMessage::new(LogLevel::Raw, "thread 'main' panicked")));
        assert!(out.contains("thread 'main' panicked\n"));
        assert!(!out.contains("[INFO]"));
    }

    #[test]
    fn help_lists_every_command() {
        let out = rendered(|r| r.help());
        for (command, _) in HELP {
            assert!(out.contains(command), "missing {}", command);
        }
    }
}
