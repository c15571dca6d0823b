use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, BufRead, Write};
use std::time::Duration;

/// Interactive decisions the operations may ask the user for
pub trait Prompt: Send + Sync {
    /// Yes/no question, `false` unless the user agrees
    fn confirm(&self, message: &str) -> bool;

    /// Pick one of `options`, `None` when nothing was picked
    fn select(&self, message: &str, options: &[String]) -> Option<String>;

    /// Pick any subset of `options`
    ///
    /// # Arguments
    /// * `select_all` - An empty answer selects every option instead of none
    /// * `filterable` - Options may also be picked by typing their name
    fn multiselect(
        &self,
        message: &str,
        options: &[String],
        select_all: bool,
        filterable: bool,
    ) -> Vec<String>;
}

/// Line based prompts on stderr/stdin
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalPrompt;

impl TerminalPrompt {
    fn ask(message: &str) -> String {
        eprint!("{message} ");
        io::stderr().flush().ok();

        let mut line = String::new();
        if let Err(e) = io::stdin().lock().read_line(&mut line) {
            tracing::warn!("Failed to read answer: {e}");
        }
        line.trim().to_string()
    }

    fn list(options: &[String]) {
        for (i, option) in options.iter().enumerate() {
            eprintln!("  {}) {option}", i + 1);
        }
    }
}

impl Prompt for TerminalPrompt {
    fn confirm(&self, message: &str) -> bool {
        let answer = Self::ask(&format!("{message} [y/N]"));
        matches!(answer.to_lowercase().as_str(), "y" | "yes")
    }

    fn select(&self, message: &str, options: &[String]) -> Option<String> {
        if options.is_empty() {
            return None;
        }
        eprintln!("{message}");
        Self::list(options);
        let answer = Self::ask("Choice:");
        parse_selection(&answer, options, false, true).into_iter().next()
    }

    fn multiselect(
        &self,
        message: &str,
        options: &[String],
        select_all: bool,
        filterable: bool,
    ) -> Vec<String> {
        if options.is_empty() {
            return Vec::new();
        }
        eprintln!("{message}");
        Self::list(options);
        let hint = if select_all {
            "Numbers separated by commas (empty for all):"
        } else {
            "Numbers separated by commas (empty for none):"
        };
        let answer = Self::ask(hint);
        let selected = parse_selection(&answer, options, select_all, filterable);
        if !selected.is_empty() {
            eprintln!("Selected: {}", selected.join(", "));
        }
        selected
    }
}

/// Resolve a comma separated answer to options, in option order
///
/// Entries are 1-based indexes, or option names when `filterable`. Unknown
/// entries are ignored.
#[must_use]
pub fn parse_selection(
    answer: &str,
    options: &[String],
    select_all: bool,
    filterable: bool,
) -> Vec<String> {
    if answer.trim().is_empty() {
        return if select_all {
            options.to_vec()
        } else {
            Vec::new()
        };
    }

    let mut picked = vec![false; options.len()];
    for entry in answer.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        if let Ok(index) = entry.parse::<usize>() {
            if (1..=options.len()).contains(&index) {
                picked[index - 1] = true;
            }
        } else if filterable {
            if let Some(pos) = options.iter().position(|o| o == entry) {
                picked[pos] = true;
            }
        }
    }

    options
        .iter()
        .zip(picked)
        .filter_map(|(option, keep)| keep.then(|| option.clone()))
        .collect()
}

/// Spinner shown while a fetch runs
#[must_use]
pub fn spinner(message: String) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner} {msg}") {
        bar.set_style(style);
    }
    bar.set_message(message);
    bar.enable_steady_tick(Duration::from_millis(120));
    bar
}
