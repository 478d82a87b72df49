//! Confirmation capability for destructive operations
//!
//! The restore executor asks for an affirmative answer before its first
//! destructive receive call. The capability is a trait so tests inject
//! scripted answers and `--force` swaps in the always-yes variant.

use std::io::{self, BufRead, Write};

/// Asks the operator to confirm a destructive action
pub trait Confirm {
    /// Present `message` and return whether the operator agreed
    fn confirm(&self, message: &str) -> bool;
}

/// Interactive prompt on stdin; only a literal "yes" proceeds
pub struct StdinConfirm;

impl Confirm for StdinConfirm {
    fn confirm(&self, message: &str) -> bool {
        eprintln!("{}", message);
        eprint!("Type 'yes' to proceed: ");
        let _ = io::stderr().flush();

        let mut answer = String::new();
        if io::stdin().lock().read_line(&mut answer).is_err() {
            return false;
        }
        answer.trim() == "yes"
    }
}

/// Bypass used by `--force`; always proceeds
pub struct AssumeYes;

impl Confirm for AssumeYes {
    fn confirm(&self, _message: &str) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assume_yes_always_confirms() {
        assert!(AssumeYes.confirm("overwrite everything?"));
    }
}
