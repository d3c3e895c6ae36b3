use std::fmt;
use std::io::{self, BufRead, Write};

use clap::ValueEnum;
use log::warn;

/// Answers a yes/no question before a risky step goes ahead
pub trait Confirm {
    fn confirm(&mut self, question: &str) -> io::Result<bool>;
}

/// Choice of [`Confirm`] implementation on the command line
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
pub enum ConfirmPolicy {
    Ask,
    Yes,
    No
}

impl fmt::Display for ConfirmPolicy {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConfirmPolicy::Ask => write!(f, "ask"),
            ConfirmPolicy::Yes => write!(f, "yes"),
            ConfirmPolicy::No => write!(f, "no")
        }
    }
}

impl ConfirmPolicy {
    pub fn into_confirm(self) -> Box<dyn Confirm> {
        match self {
            ConfirmPolicy::Ask => Box::new(Prompt::new(io::stdin().lock(), io::stderr())),
            ConfirmPolicy::Yes => Box::new(AutoConfirm(true)),
            ConfirmPolicy::No => Box::new(AutoConfirm(false)),
        }
    }
}

/// Always gives the same answer, for unattended runs
pub struct AutoConfirm(pub bool);

impl Confirm for AutoConfirm {
    fn confirm(&mut self, question: &str) -> io::Result<bool> {
        warn!("{} answering {}", question, if self.0 { "yes" } else { "no" });
        Ok(self.0)
    }
}

/// Asks on `output` and blocks until `input` gives a y/n answer
///
/// Unrecognised answers repeat the question. End of input counts as no.
pub struct Prompt<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> Prompt<R, W> {
    pub fn new(input: R, output: W) -> Prompt<R, W> {
        Prompt { input, output }
    }
}

impl<R: BufRead, W: Write> Confirm for Prompt<R, W> {
    fn confirm(&mut self, question: &str) -> io::Result<bool> {
        loop {
            write!(self.output, "{} [y/n] ", question)?;
            self.output.flush()?;

            let mut answer = String::new();
            if self.input.read_line(&mut answer)? == 0 {
                return Ok(false);
            }
            match answer.trim().to_lowercase().as_str() {
                "y" | "yes" => return Ok(true),
                "n" | "no" => return Ok(false),
                _ => writeln!(self.output, "Please answer y or n")?,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn prompt_reads_answer() {
        let mut out = Vec::new();
        let mut prompt = Prompt::new(Cursor::new("y\n"), &mut out);
        assert!(prompt.confirm("Continue?").unwrap());
        assert_eq!(String::from_utf8(out).unwrap(), "Continue? [y/n] ");
    }

    #[test]
    fn prompt_repeats_until_understood() {
        let mut out = Vec::new();
        let mut prompt = Prompt::new(Cursor::new("maybe\nNO\n"), &mut out);
        assert!(!prompt.confirm("Continue?").unwrap());
        let printed = String::from_utf8(out).unwrap();
        assert_eq!(printed.matches("Continue?").count(), 2);
    }

    #[test]
    fn prompt_eof_is_no() {
        let mut prompt = Prompt::new(Cursor::new(""), Vec::new());
        assert!(!prompt.confirm("Continue?").unwrap());
    }

    #[test]
    fn auto_policies() {
        assert!(ConfirmPolicy::Yes.into_confirm().confirm("?").unwrap());
        assert!(!ConfirmPolicy::No.into_confirm().confirm("?").unwrap());
        assert_eq!(ConfirmPolicy::Ask.to_string(), "ask");
    }
}
