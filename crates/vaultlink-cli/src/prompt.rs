//! Terminal credential prompt.
//!
//! Email is read as a visible line (an empty line accepts the seed); the
//! master password is read in raw mode with no echo. Esc, Ctrl-C, or EOF
//! cancel the prompt.

use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::terminal;
use std::io::{self, BufRead, Write};
use vaultlink_core::{Credential, CredentialPrompt};

/// Prompt on the controlling terminal.
pub struct TerminalPrompt;

impl CredentialPrompt for TerminalPrompt {
    fn prompt(&mut self, seed_email: Option<&str>) -> Option<Credential> {
        let email = match seed_email {
            Some(seed) => {
                let line = read_visible_line(&format!("Email [{seed}]: "))?;
                if line.trim().is_empty() {
                    seed.to_string()
                } else {
                    line.trim().to_string()
                }
            }
            None => read_visible_line("Email: ")?.trim().to_string(),
        };

        let password = read_hidden_line("Master password: ")?;
        Some(Credential { email, password })
    }
}

/// Read an echoed line from stdin. `None` on EOF or I/O failure.
fn read_visible_line(label: &str) -> Option<String> {
    print!("{label}");
    io::stdout().flush().ok()?;
    let mut line = String::new();
    match io::stdin().lock().read_line(&mut line) {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(line),
    }
}

/// Read a line in raw mode without echoing. `None` on cancel.
fn read_hidden_line(label: &str) -> Option<String> {
    print!("{label}");
    io::stdout().flush().ok()?;
    terminal::enable_raw_mode().ok()?;
    let input = collect_hidden();
    let _ = terminal::disable_raw_mode();
    println!();
    input
}

fn collect_hidden() -> Option<String> {
    let mut input = String::new();
    loop {
        match event::read().ok()? {
            Event::Key(key) if key.kind == KeyEventKind::Press => match key.code {
                KeyCode::Enter => return Some(input),
                KeyCode::Esc => return None,
                KeyCode::Backspace => {
                    input.pop();
                }
                KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                    return None;
                }
                KeyCode::Char(c) => input.push(c),
                _ => {}
            },
            _ => {}
        }
    }
}
