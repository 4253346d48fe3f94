use stackshift_core::migrate::Confirm;
use std::io::{BufRead, IsTerminal, Write};

/// Asks on stderr, reads a y/N answer from stdin.
pub struct StdinConfirm;

impl StdinConfirm {
    pub fn available() -> bool {
        std::io::stdin().is_terminal()
    }
}

impl Confirm for StdinConfirm {
    fn confirm(&mut self, prompt: &str) -> bool {
        let mut stderr = std::io::stderr();
        if write!(stderr, "{prompt} [y/N] ").and_then(|_| stderr.flush()).is_err() {
            return false;
        }
        let mut answer = String::new();
        if std::io::stdin().lock().read_line(&mut answer).is_err() {
            return false;
        }
        is_yes(&answer)
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}
