//! Command routing.

use teloxide::types::BotCommand;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    /// Forced classification.
    Check,
    /// Text completion, as `/complete` or `/beende`.
    Complete,
}

/// Callnames, their command, and the menu description. `None` hides the
/// entry from the menu.
const CALLNAMES: &[(&str, Command, Option<&str>)] = &[
    ("start", Command::Start, None),
    ("help", Command::Help, Some("Was kann dieser Bot?")),
    ("check", Command::Check, Some("Ist das eine Verschwörungstheorie?")),
    ("complete", Command::Complete, Some("Satz vervollständigen")),
    ("beende", Command::Complete, Some("Satz zu Ende schreiben")),
];

/// What a message asks the bot to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Command(Command),
    /// Plain text, classified silently.
    Passive,
    /// A command for another bot, or one we don't know.
    Ignore,
}

impl Command {
    fn from_callname(callname: &str) -> Option<Self> {
        CALLNAMES
            .iter()
            .find(|(name, _, _)| name.eq_ignore_ascii_case(callname))
            .map(|(_, command, _)| *command)
    }
}

/// Decide how to handle `text`. `bot_username` is ours, without `@`.
pub fn route(text: &str, bot_username: &str) -> Route {
    let Some(rest) = text.trim_start().strip_prefix('/') else {
        return Route::Passive;
    };
    let token = rest.split_whitespace().next().unwrap_or("");

    // "/check@Some_Bot": only ours if the username matches.
    let callname = match token.split_once('@') {
        Some((callname, target)) => {
            if !target.eq_ignore_ascii_case(bot_username) {
                return Route::Ignore;
            }
            callname
        }
        None => token,
    };

    match Command::from_callname(callname) {
        Some(command) => Route::Command(command),
        None => Route::Ignore,
    }
}

/// Entries for Telegram's command menu.
pub fn bot_commands() -> Vec<BotCommand> {
    CALLNAMES
        .iter()
        .filter_map(|(name, _, description)| description.map(|d| BotCommand::new(*name, d)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const ME: &str = "AluhutBot";

    #[test]
    fn test_plain_text_is_passive() {
        assert_eq!(route("Die Erde ist flach", ME), Route::Passive);
        assert_eq!(route("", ME), Route::Passive);
        assert_eq!(route("a /check in the middle", ME), Route::Passive);
    }

    #[test]
    fn test_known_commands() {
        assert_eq!(route("/start", ME), Route::Command(Command::Start));
        assert_eq!(route("/help", ME), Route::Command(Command::Help));
        assert_eq!(route("/check Mondlandung", ME), Route::Command(Command::Check));
        assert_eq!(route("/complete Es war", ME), Route::Command(Command::Complete));
        assert_eq!(route("/beende Es war", ME), Route::Command(Command::Complete));
    }

    #[test]
    fn test_commands_ignore_case() {
        assert_eq!(route("/Check hello", ME), Route::Command(Command::Check));
        assert_eq!(route("/BEENDE x", ME), Route::Command(Command::Complete));
    }

    #[test]
    fn test_addressed_commands() {
        assert_eq!(route("/check@AluhutBot x", ME), Route::Command(Command::Check));
        assert_eq!(route("/check@aluhutbot x", ME), Route::Command(Command::Check));
        assert_eq!(route("/check@OtherBot x", ME), Route::Ignore);
    }

    #[test]
    fn test_unknown_commands_are_ignored() {
        assert_eq!(route("/settings", ME), Route::Ignore);
        assert_eq!(route("/", ME), Route::Ignore);
        assert_eq!(route("/checkout", ME), Route::Ignore);
    }

    #[test]
    fn test_menu() {
        let commands = bot_commands();
        let names: Vec<&str> = commands.iter().map(|c| c.command.as_str()).collect();
        assert_eq!(names, ["help", "check", "complete", "beende"]);
        assert!(commands.iter().all(|c| !c.description.is_empty()));
    }
}
