//! Terminal I/O for operator prompts
//!
//! Secrets are read in raw mode without echo when stdin is a terminal, and
//! as one plain line otherwise. Ctrl-C and end of input at any prompt
//! become `ReplicaError::Interrupted`.

use std::io::{self, BufRead, IsTerminal, Write};

use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};

use crate::errors::{ReplicaError, ReplicaResult};
use crate::preflight::Prompter;

/// Leaves raw mode when dropped
struct RawMode;

impl RawMode {
    fn enable() -> io::Result<Self> {
        enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawMode {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
    }
}

/// Parse a yes/no answer; `None` asks again.
pub fn parse_answer(line: &str, default: bool) -> Option<bool> {
    match line.trim().to_ascii_lowercase().as_str() {
        "" => Some(default),
        "y" | "yes" => Some(true),
        "n" | "no" => Some(false),
        _ => None,
    }
}

fn read_line(input: &mut impl BufRead) -> ReplicaResult<String> {
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Err(ReplicaError::Interrupted);
    }
    Ok(line.trim_end_matches(&['\r', '\n'][..]).to_string())
}

fn read_secret_raw() -> ReplicaResult<String> {
    let _raw = RawMode::enable()?;
    let mut secret = String::new();

    loop {
        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }
        match key.code {
            KeyCode::Enter => return Ok(secret),
            KeyCode::Char('c') | KeyCode::Char('d') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                return Err(ReplicaError::Interrupted);
            }
            KeyCode::Backspace => {
                secret.pop();
            }
            KeyCode::Char(c) => secret.push(c),
            _ => {}
        }
    }
}

/// Prompter on the controlling terminal
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalPrompter;

impl Prompter for TerminalPrompter {
    fn read_password(&self, label: &str) -> ReplicaResult<Option<String>> {
        let mut stderr = io::stderr();
        write!(stderr, "{}: ", label)?;
        stderr.flush()?;

        let secret = if io::stdin().is_terminal() {
            let secret = read_secret_raw();
            writeln!(stderr)?;
            secret?
        } else {
            read_line(&mut io::stdin().lock())?
        };

        Ok(if secret.is_empty() { None } else { Some(secret) })
    }

    fn confirm(&self, question: &str, default: bool) -> ReplicaResult<bool> {
        let hint = if default { "yes" } else { "no" };
        let stdin = io::stdin();
        let mut input = stdin.lock();
        let mut stderr = io::stderr();

        loop {
            write!(stderr, "{} [yes/no] ({}): ", question, hint)?;
            stderr.flush()?;
            if let Some(answer) = parse_answer(&read_line(&mut input)?, default) {
                return Ok(answer);
            }
        }
    }
}
