use crate::world::direction::Direction;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Join(String),
    Exit,
    Look,
    Take(String),
    Drop(String),
    Say(String),
    Move(Direction),
    Invalid(InvalidReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidReason {
    BadArity,
    UnknownCommand,
}

/// Turns one line of player input into a `Command`. Never fails; malformed
/// input becomes `Invalid` and is reported by the dispatcher.
pub fn parse_command(line: &str) -> Command {
    let trimmed = line.trim();
    let mut words = trimmed.split_whitespace();
    let Some(first) = words.next() else {
        return Command::Invalid(InvalidReason::UnknownCommand);
    };

    if let Some(direction) = Direction::parse(first) {
        return Command::Move(direction);
    }

    match first {
        "join" => match single_argument(words) {
            Some(name) => Command::Join(name),
            None => Command::Invalid(InvalidReason::BadArity),
        },
        "take" => match single_argument(words) {
            Some(item) => Command::Take(item),
            None => Command::Invalid(InvalidReason::BadArity),
        },
        "drop" => match single_argument(words) {
            Some(item) => Command::Drop(item),
            None => Command::Invalid(InvalidReason::BadArity),
        },
        "exit" => match words.next() {
            None => Command::Exit,
            Some(_) => Command::Invalid(InvalidReason::BadArity),
        },
        "look" => match words.next() {
            None => Command::Look,
            Some(_) => Command::Invalid(InvalidReason::BadArity),
        },
        "say" => {
            let text = trimmed
                .splitn(2, char::is_whitespace)
                .nth(1)
                .unwrap_or("");
            Command::Say(text.to_string())
        }
        _ => Command::Invalid(InvalidReason::UnknownCommand),
    }
}

fn single_argument(mut words: std::str::SplitWhitespace<'_>) -> Option<String> {
    let argument = words.next()?;
    if words.next().is_some() {
        return None;
    }
    Some(argument.to_string())
}
