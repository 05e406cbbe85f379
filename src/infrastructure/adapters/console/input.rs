//! Operator input - one console line into one action

use crate::application::errors::ControlError;
use crate::infrastructure::channel::{ControlMessage, PointsAction};
use crate::plugins::builtin::points::TOP_LIMIT;

/// What the console does with a line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleAction {
    /// Forward to the worker
    Control(ControlMessage),
    Help,
    Clear,
    Exit,
    /// Blank line
    Nothing,
}

/// Parse one operator line. Keywords are case-insensitive, arguments are
/// kept as typed.
pub fn parse_line(line: &str) -> Result<ConsoleAction, ControlError> {
    let line = line.trim();
    let (keyword, rest) = match line.split_once(char::is_whitespace) {
        Some((keyword, rest)) => (keyword, rest.trim()),
        None => (line, ""),
    };
    if keyword.is_empty() {
        return Ok(ConsoleAction::Nothing);
    }

    let control = match keyword.to_lowercase().as_str() {
        "help" => return Ok(ConsoleAction::Help),
        "clear" => return Ok(ConsoleAction::Clear),
        "exit" | "quit" => return Ok(ConsoleAction::Exit),
        "status" => ControlMessage::Status,
        "channels" => ControlMessage::ListChannels,
        "modules" => ControlMessage::ListModules,
        "reload" => ControlMessage::ReloadModule { name: module_name(rest, "reload <name>")? },
        "load" => ControlMessage::LoadModule { name: module_name(rest, "load <name>")? },
        "unload" => ControlMessage::UnloadModule { name: module_name(rest, "unload <name>")? },
        "send" => {
            let (text, channel) = split_channel(rest);
            if text.is_empty() {
                return Err(usage("send <text> [#channel]"));
            }
            ControlMessage::Broadcast {
                text: text.to_string(),
                channel,
            }
        }
        "chat" => {
            let (author, text) = rest
                .split_once(char::is_whitespace)
                .ok_or_else(|| usage("chat <user> <text> [#channel]"))?;
            let (text, channel) = split_channel(text.trim());
            if text.is_empty() {
                return Err(usage("chat <user> <text> [#channel]"));
            }
            ControlMessage::SimulateChat {
                author: author.to_string(),
                text: text.to_string(),
                channel,
            }
        }
        "points" => ControlMessage::Points {
            action: points_action(rest)?,
        },
        _ => return Err(ControlError::UnknownCommand(keyword.to_string())),
    };
    Ok(ConsoleAction::Control(control))
}

fn usage(text: &str) -> ControlError {
    ControlError::Usage(text.to_string())
}

fn module_name(rest: &str, form: &str) -> Result<String, ControlError> {
    let mut words = rest.split_whitespace();
    match (words.next(), words.next()) {
        (Some(name), None) => Ok(name.to_string()),
        _ => Err(usage(form)),
    }
}

/// Split a trailing `#channel` off the text
fn split_channel(text: &str) -> (&str, Option<String>) {
    let (head, last) = text.rsplit_once(char::is_whitespace).unwrap_or(("", text));
    match channel_token(last) {
        Some(channel) => (head.trim_end(), Some(channel)),
        None => (text, None),
    }
}

fn channel_token(token: &str) -> Option<String> {
    let name = token.strip_prefix('#')?;
    (!name.is_empty() && !name.contains('#')).then(|| name.to_lowercase())
}

fn points_action(rest: &str) -> Result<PointsAction, ControlError> {
    const FORM: &str = "points <see|add|remove|reset|top> [user] [amount]";
    let words: Vec<&str> = rest.split_whitespace().collect();
    let action = words.first().map(|w| w.to_lowercase());

    let amount = |raw: &str| {
        raw.parse::<u64>()
            .map_err(|_| ControlError::Usage(format!("amount must be a positive number, got {:?}", raw)))
    };

    match (action.as_deref(), &words[..]) {
        (Some("see"), [_, user]) => Ok(PointsAction::See { user: user.to_string() }),
        (Some("reset"), [_, user]) => Ok(PointsAction::Reset { user: user.to_string() }),
        (Some("add"), [_, user, raw]) => Ok(PointsAction::Add {
            user: user.to_string(),
            amount: amount(raw)?,
        }),
        (Some("remove"), [_, user, raw]) => Ok(PointsAction::Remove {
            user: user.to_string(),
            amount: amount(raw)?,
        }),
        (Some("top"), [_]) => Ok(PointsAction::Top { limit: TOP_LIMIT }),
        (Some("top"), [_, raw]) => {
            let limit = raw
                .parse::<usize>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| usage("points top [count]"))?;
            Ok(PointsAction::Top { limit })
        }
        _ => Err(usage(FORM)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn control(line: &str) -> ControlMessage {
        match parse_line(line) {
            Ok(ConsoleAction::Control(message)) => message,
            other => panic!("{:?} parsed to {:?}", line, other),
        }
    }

    #[test]
    fn keywords_are_case_insensitive() {
        assert_eq!(control("STATUS"), ControlMessage::Status);
        assert_eq!(control("  Modules "), ControlMessage::ListModules);
        assert_eq!(parse_line("Exit").unwrap(), ConsoleAction::Exit);
        assert_eq!(parse_line("").unwrap(), ConsoleAction::Nothing);
    }

    #[test]
    fn send_takes_an_optional_trailing_channel() {
        assert_eq!(
            control("send hello world"),
            ControlMessage::Broadcast { text: "hello world".into(), channel: None }
        );
        assert_eq!(
            control("send hello #Foo"),
            ControlMessage::Broadcast { text: "hello".into(), channel: Some("foo".into()) }
        );
        assert_eq!(
            control("send #1 fan"),
            ControlMessage::Broadcast { text: "#1 fan".into(), channel: None }
        );
        assert!(matches!(parse_line("send"), Err(ControlError::Usage(_))));
        assert!(matches!(parse_line("send #foo"), Err(ControlError::Usage(_))));
    }

    #[test]
    fn module_commands_need_exactly_one_name() {
        assert_eq!(control("reload dice"), ControlMessage::ReloadModule { name: "dice".into() });
        assert_eq!(control("LOAD Rank"), ControlMessage::LoadModule { name: "Rank".into() });
        assert!(matches!(parse_line("unload"), Err(ControlError::Usage(_))));
        assert!(matches!(parse_line("reload a b"), Err(ControlError::Usage(_))));
    }

    #[test]
    fn points_subcommands() {
        assert_eq!(
            control("points add alice 50"),
            ControlMessage::Points {
                action: PointsAction::Add { user: "alice".into(), amount: 50 }
            }
        );
        assert_eq!(
            control("points SEE alice"),
            ControlMessage::Points { action: PointsAction::See { user: "alice".into() } }
        );
        assert_eq!(
            control("points top"),
            ControlMessage::Points { action: PointsAction::Top { limit: 3 } }
        );
        assert!(matches!(parse_line("points add alice lots"), Err(ControlError::Usage(_))));
        assert!(matches!(parse_line("points add alice -5"), Err(ControlError::Usage(_))));
        assert!(matches!(parse_line("points steal alice"), Err(ControlError::Usage(_))));
    }

    #[test]
    fn chat_needs_author_and_text() {
        assert_eq!(
            control("chat bob !dice 20 #elch"),
            ControlMessage::SimulateChat {
                author: "bob".into(),
                text: "!dice 20".into(),
                channel: Some("elch".into()),
            }
        );
        assert!(matches!(parse_line("chat bob"), Err(ControlError::Usage(_))));
    }

    #[test]
    fn unknown_keywords_are_rejected() {
        match parse_line("dance now") {
            Err(ControlError::UnknownCommand(word)) => assert_eq!(word, "dance"),
            other => panic!("unexpected {:?}", other),
        }
    }
}
