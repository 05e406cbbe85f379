//! Command parser - splits chat text into command name and arguments

/// A prefixed command found in chat text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand<'a> {
    /// Command name without the prefix, case preserved
    pub name: &'a str,
    /// Everything after the command token, leading whitespace removed
    pub args: &'a str,
}

/// Recognises `<prefix><name> [args]` in the first whitespace token
#[derive(Debug, Clone)]
pub struct CommandParser {
    prefix: String,
}

impl CommandParser {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// `None` when the text is not a command
    pub fn parse<'a>(&self, text: &'a str) -> Option<ParsedCommand<'a>> {
        if self.prefix.is_empty() {
            return None;
        }

        let text = text.trim_start();
        let token_end = text.find(char::is_whitespace).unwrap_or(text.len());
        let (token, rest) = text.split_at(token_end);

        let name = token.strip_prefix(self.prefix.as_str())?;
        if name.is_empty() {
            return None;
        }

        Some(ParsedCommand {
            name,
            args: rest.trim(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_name_and_args() {
        let parser = CommandParser::new("!");
        assert_eq!(
            parser.parse("!dice  20 extra "),
            Some(ParsedCommand {
                name: "dice",
                args: "20 extra"
            })
        );
        assert_eq!(
            parser.parse("!ping"),
            Some(ParsedCommand {
                name: "ping",
                args: ""
            })
        );
    }

    #[test]
    fn non_commands_are_rejected() {
        let parser = CommandParser::new("!");
        assert_eq!(parser.parse("hello !ping"), None);
        assert_eq!(parser.parse("!"), None);
        assert_eq!(parser.parse(""), None);
        assert_eq!(parser.parse("?ping"), None);
    }

    #[test]
    fn multi_character_prefix_and_case_are_kept() {
        let parser = CommandParser::new("%%");
        let parsed = parser.parse("%%Dice 6").unwrap();
        assert_eq!(parsed.name, "Dice");
        assert!(parser.parse("%Dice").is_none());
    }
}
