//! Classifies mentions of the bot by keyword.
//!
//! This is a classification, not a command language: there are no arguments
//! and a message selects at most one command.

use std::fmt;

use nostr_sdk::Event;
use regex::Regex;

use crate::config::{CommandKeywords, ConfigError};
use crate::keyword::whole_word;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Stats,
    Total,
    Top,
    Missed,
    Unknown,
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CommandKind::Stats => "stats",
            CommandKind::Total => "total",
            CommandKind::Top => "top",
            CommandKind::Missed => "missed",
            CommandKind::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

pub struct CommandParser {
    // Priority order: first match wins
    patterns: [(CommandKind, Regex); 4],
}

impl CommandParser {
    pub fn new(keywords: &CommandKeywords) -> Result<Self, ConfigError> {
        let compile = |keyword: &str| {
            whole_word(keyword).map_err(|source| ConfigError::Keyword {
                keyword: keyword.to_string(),
                source,
            })
        };

        Ok(Self {
            patterns: [
                (CommandKind::Stats, compile(&keywords.stats)?),
                (CommandKind::Total, compile(&keywords.total)?),
                (CommandKind::Top, compile(&keywords.top)?),
                (CommandKind::Missed, compile(&keywords.missed)?),
            ],
        })
    }

    pub fn classify_content(&self, content: &str) -> CommandKind {
        self.patterns
            .iter()
            .find(|(_, pattern)| pattern.is_match(content))
            .map(|(kind, _)| *kind)
            .unwrap_or(CommandKind::Unknown)
    }

    pub fn classify(&self, event: &Event) -> CommandKind {
        self.classify_content(&event.content)
    }
}
