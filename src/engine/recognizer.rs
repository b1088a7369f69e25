//! Command recognizer - whole-token trigger matching
//!
//! Determines whether a comment body contains a command trigger, independent
//! of parsing. A trigger matches only as a whole token: preceded by start of
//! text or whitespace, and followed by whitespace or end of text, so "!tip"
//! never fires on "!tipping". Aliases containing regex metacharacters (the
//! markdown-image-style "![gif]" trigger, for example) are escaped before
//! compilation.

use regex::Regex;

/// A compiled command trigger with one or more aliases
pub struct CommandTrigger {
    pattern: Regex,
    aliases: Vec<String>,
}

impl CommandTrigger {
    /// Compile a trigger from literal aliases
    ///
    /// Aliases are matched case-insensitively and treated as literals, never
    /// as regex syntax. Empty aliases are ignored.
    pub fn new(aliases: &[&str]) -> Result<Self, Box<dyn std::error::Error>> {
        let kept: Vec<String> = aliases
            .iter()
            .filter(|a| !a.is_empty())
            .map(|a| a.to_lowercase())
            .collect();

        if kept.is_empty() {
            return Err("command trigger needs at least one alias".into());
        }

        let escaped: Vec<String> = kept.iter().map(|a| regex::escape(a)).collect();
        let pattern = Regex::new(&format!(r"(?:^|\s)(?:{})(?:\s|$)", escaped.join("|")))?;

        Ok(Self {
            pattern,
            aliases: kept,
        })
    }

    /// True iff the trigger appears as a whole token in the body
    ///
    /// Absence of a match is `false`, never an error; empty input is fine.
    pub fn matches(&self, body: &str) -> bool {
        self.pattern.is_match(&body.to_lowercase())
    }

    /// The primary alias, used in user-facing messages
    pub fn primary(&self) -> &str {
        &self.aliases[0]
    }
}
