use std::fmt::Display;
use termion::color;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Level {
    Info,
    Success,
    Warn,
    Error,
}

/// Human readable status lines, colored when enabled
#[derive(Debug, Clone, Copy)]
pub struct Output {
    color: bool,
}

impl Output {
    pub fn new(color: bool) -> Self {
        Output { color }
    }

    pub fn format(&self, level: Level, message: impl Display) -> String {
        if !self.color {
            return message.to_string();
        }
        let prefix = match level {
            Level::Info => color::Fg(color::Blue).to_string(),
            Level::Success => color::Fg(color::Green).to_string(),
            Level::Warn => color::Fg(color::Yellow).to_string(),
            Level::Error => color::Fg(color::Red).to_string(),
        };
        format!("{}{}{}", prefix, message, color::Fg(color::Reset))
    }

    pub fn info(&self, message: impl Display) {
        println!("{}", self.format(Level::Info, message));
    }

    pub fn success(&self, message: impl Display) {
        println!("{}", self.format(Level::Success, message));
    }

    pub fn warn(&self, message: impl Display) {
        println!("{}", self.format(Level::Warn, message));
    }

    pub fn error(&self, message: impl Display) {
        eprintln!("{}", self.format(Level::Error, message));
    }

    pub fn summary<I, S>(&self, title: &str, lines: I)
    where
        I: IntoIterator<Item = S>,
        S: Display,
    {
        println!();
        self.info(title);
        for line in lines {
            println!("  {}", line);
        }
    }
}

#[test]
fn test_plain_output() {
    let output = Output::new(false);
    assert_eq!(output.format(Level::Error, "broken"), "broken");
}

#[test]
fn test_colored_output() {
    let output = Output::new(true);
    assert_eq!(
        output.format(Level::Success, "done"),
        "\x1b[38;5;2mdone\x1b[39m"
    );
}
