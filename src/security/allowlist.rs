//! Command allowlist management.
//!
//! This module maintains a set of allowed base commands. A request is allowed
//! only when its first word is in the set and, unless configured otherwise,
//! it uses no shell composition at all.

use std::collections::HashSet;

use super::{CommandPolicy, Verdict};

#[derive(Debug, Clone)]
pub struct Allowlist {
    allowed: HashSet<String>,
    deny_shell_operators: bool,
}

impl Default for Allowlist {
    fn default() -> Self {
        Self::new()
    }
}

impl Allowlist {
    pub fn new() -> Self {
        Self {
            allowed: HashSet::new(),
            deny_shell_operators: true,
        }
    }

    pub fn from_commands<I, S>(commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut list = Self::new();
        for cmd in commands {
            list.allow(cmd);
        }
        list
    }

    /// Permit pipes, redirects and friends in allowed commands.
    ///
    /// With this off the allowlist only checks the first word, so
    /// `ls; rm -rf ~` passes as `ls`.
    pub fn with_shell_operators(mut self, permit: bool) -> Self {
        self.deny_shell_operators = !permit;
        self
    }

    pub fn allow(&mut self, cmd: impl Into<String>) {
        self.allowed.insert(cmd.into());
    }

    pub fn is_allowed(&self, cmd: &str) -> bool {
        self.evaluate(cmd).is_allowed()
    }
}

impl CommandPolicy for Allowlist {
    fn evaluate(&self, cmd: &str) -> Verdict {
        let trimmed = cmd.trim();

        // Extract the base command (first word)
        let Some(base_cmd) = trimmed.split_whitespace().next() else {
            return Verdict::deny("empty command");
        };

        if self.deny_shell_operators && contains_shell_composition(trimmed) {
            return Verdict::deny(format!("'{}' contains shell operators", trimmed));
        }

        if !self.allowed.contains(base_cmd) {
            return Verdict::deny(format!("'{}' is not in the allowlist", base_cmd));
        }

        Verdict::Allow
    }

    fn name(&self) -> &'static str {
        "allowlist"
    }
}

/// Check if command contains shell composition tokens
/// (|, ;, &&, ||, >, <, $(, backticks, &, newlines).
pub fn contains_shell_composition(cmd: &str) -> bool {
    // Pipe, sequencing, redirects and newlines
    if cmd.contains(['|', ';', '>', '<', '\n']) {
        return true;
    }

    // Check for logical and
    if cmd.contains("&&") {
        return true;
    }

    // Check for command substitution
    if cmd.contains("$(") || cmd.contains('`') {
        return true;
    }

    // Check for background execution
    // A lone & is background; every & that is not half of && counts
    let ampersand_count = cmd.matches('&').count();
    let double_ampersand_count = cmd.matches("&&").count();
    if ampersand_count > double_ampersand_count * 2 {
        return true;
    }

    false
}
