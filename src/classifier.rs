//! Message classification
//!
//! An ordered rule list is evaluated top to bottom and the first match wins.
//! Text rules use substring containment on the normalized body, not tokens,
//! so "they" counts as a greeting because it contains "hey".

use crate::messages::{normalize, InboundMessage};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

/// Response category for an inbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Category {
    EphemeralMedia,
    Greeting,
    LocationQuery,
    Command(Command),
    Thanks,
    Unclassified,
}

/// Fixed command vocabulary
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Ping,
    Help,
    Status,
    Time,
    Joke,
    Quote,
    Info,
    Echo(String),
    GetStatus(String),
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Category::EphemeralMedia => write!(f, "ephemeral_media"),
            Category::Greeting => write!(f, "greeting"),
            Category::LocationQuery => write!(f, "location_query"),
            Category::Command(cmd) => write!(f, "command:{}", cmd.name()),
            Category::Thanks => write!(f, "thanks"),
            Category::Unclassified => write!(f, "unclassified"),
        }
    }
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Ping => "ping",
            Command::Help => "help",
            Command::Status => "status",
            Command::Time => "time",
            Command::Joke => "joke",
            Command::Quote => "quote",
            Command::Info => "info",
            Command::Echo(_) => "echo",
            Command::GetStatus(_) => "getstatus",
        }
    }
}

pub const GREETING_PHRASES: &[&str] = &[
    "hello",
    "hi",
    "hey",
    "hola",
    "howdy",
    "greetings",
    "good morning",
    "good afternoon",
    "good evening",
];

pub const LOCATION_PHRASES: &[&str] = &[
    "where are you",
    "where are u",
    "where r u",
    "where you at",
    "your location",
    "wya",
];

pub const THANKS_PHRASES: &[&str] = &["thank", "thx", "appreciate", "cheers"];

/// Commands accept an optional `!` or `/` marker
static SIMPLE_COMMAND: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[!/]?(ping|help|status|time|joke|quote|info)$").expect("Invalid command regex")
});

static ECHO_COMMAND: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)^[!/]?echo\s+(.+)$").expect("Invalid echo regex"));

static GETSTATUS_COMMAND: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)^[!/]?getstatus\s+(.+)$").expect("Invalid getstatus regex"));

/// What the rules look at
struct Input<'a> {
    normalized: &'a str,
    raw: &'a str,
    ephemeral_media: bool,
}

/// One classification rule
struct Rule {
    name: &'static str,
    apply: fn(&Input) -> Option<Category>,
}

/// Rules in priority order
static RULES: &[Rule] = &[
    Rule {
        name: "ephemeral_media",
        apply: ephemeral_rule,
    },
    Rule {
        name: "greeting",
        apply: greeting_rule,
    },
    Rule {
        name: "location",
        apply: location_rule,
    },
    Rule {
        name: "command",
        apply: command_rule,
    },
    Rule {
        name: "thanks",
        apply: thanks_rule,
    },
];

fn ephemeral_rule(input: &Input) -> Option<Category> {
    input.ephemeral_media.then_some(Category::EphemeralMedia)
}

fn greeting_rule(input: &Input) -> Option<Category> {
    contains_any(input.normalized, GREETING_PHRASES).then_some(Category::Greeting)
}

fn location_rule(input: &Input) -> Option<Category> {
    contains_any(input.normalized, LOCATION_PHRASES).then_some(Category::LocationQuery)
}

fn command_rule(input: &Input) -> Option<Category> {
    parse_command(input.normalized, input.raw).map(Category::Command)
}

fn thanks_rule(input: &Input) -> Option<Category> {
    contains_any(input.normalized, THANKS_PHRASES).then_some(Category::Thanks)
}

/// Classify a full inbound message (media flags checked before text)
pub fn classify(message: &InboundMessage) -> Category {
    evaluate(&message.body, message.is_ephemeral_media())
}

/// Classify message text alone
pub fn classify_text(text: &str) -> Category {
    evaluate(text, false)
}

/// Names of the rules in evaluation order
pub fn rule_order() -> Vec<&'static str> {
    RULES.iter().map(|r| r.name).collect()
}

fn evaluate(body: &str, ephemeral_media: bool) -> Category {
    let normalized = normalize(body);
    let input = Input {
        normalized: &normalized,
        raw: body.trim(),
        ephemeral_media,
    };

    RULES
        .iter()
        .find_map(|rule| (rule.apply)(&input))
        .unwrap_or(Category::Unclassified)
}

fn contains_any(text: &str, phrases: &[&str]) -> bool {
    phrases.iter().any(|p| text.contains(p))
}

fn parse_command(normalized: &str, raw: &str) -> Option<Command> {
    if let Some(caps) = SIMPLE_COMMAND.captures(normalized) {
        return match &caps[1] {
            "ping" => Some(Command::Ping),
            "help" => Some(Command::Help),
            "status" => Some(Command::Status),
            "time" => Some(Command::Time),
            "joke" => Some(Command::Joke),
            "quote" => Some(Command::Quote),
            "info" => Some(Command::Info),
            _ => None,
        };
    }

    // Arguments keep their original casing
    if let Some(caps) = ECHO_COMMAND.captures(raw) {
        return Some(Command::Echo(caps[1].trim().to_string()));
    }
    if let Some(caps) = GETSTATUS_COMMAND.captures(raw) {
        return Some(Command::GetStatus(caps[1].trim().to_string()));
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use proptest::prelude::*;

    fn msg(body: &str, has_media: bool, is_view_once: bool) -> InboundMessage {
        InboundMessage {
            id: "m1".to_string(),
            chat_id: "1@c.us".to_string(),
            sender_id: "1@c.us".to_string(),
            body: body.to_string(),
            has_media,
            is_view_once,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_rule_order() {
        assert_eq!(
            rule_order(),
            vec!["ephemeral_media", "greeting", "location", "command", "thanks"]
        );
    }

    #[test]
    fn test_greetings() {
        assert_eq!(classify_text("Hey there!"), Category::Greeting);
        assert_eq!(classify_text("HELLO"), Category::Greeting);
        assert_eq!(classify_text("  good evening all "), Category::Greeting);
    }

    #[test]
    fn test_location() {
        assert_eq!(classify_text("where are you"), Category::LocationQuery);
        assert_eq!(classify_text("Where R U??"), Category::LocationQuery);
    }

    #[test]
    fn test_commands_with_and_without_marker() {
        for text in ["ping", "!ping", "/ping", "  !PING  "] {
            assert_eq!(classify_text(text), Category::Command(Command::Ping), "{}", text);
        }
        assert_eq!(classify_text("!help"), Category::Command(Command::Help));
        assert_eq!(classify_text("status"), Category::Command(Command::Status));
        assert_eq!(classify_text("!time"), Category::Command(Command::Time));
        assert_eq!(classify_text("joke"), Category::Command(Command::Joke));
        assert_eq!(classify_text("!quote"), Category::Command(Command::Quote));
        assert_eq!(classify_text("/info"), Category::Command(Command::Info));
    }

    #[test]
    fn test_command_must_be_exact() {
        assert_eq!(classify_text("ping me later"), Category::Unclassified);
        assert_eq!(classify_text("!!ping"), Category::Unclassified);
    }

    #[test]
    fn test_echo_keeps_original_case() {
        assert_eq!(
            classify_text("!echo Rust Is Fun"),
            Category::Command(Command::Echo("Rust Is Fun".to_string()))
        );
        assert_eq!(
            classify_text("ECHO  spaced  "),
            Category::Command(Command::Echo("spaced".to_string()))
        );
    }

    #[test]
    fn test_getstatus_argument() {
        assert_eq!(
            classify_text("!getstatus Alice"),
            Category::Command(Command::GetStatus("Alice".to_string()))
        );
    }

    #[test]
    fn test_thanks() {
        assert_eq!(classify_text("Thanks a lot"), Category::Thanks);
        assert_eq!(classify_text("thx"), Category::Thanks);
    }

    #[test]
    fn test_unclassified() {
        assert_eq!(classify_text("what's for dinner"), Category::Unclassified);
        assert_eq!(classify_text(""), Category::Unclassified);
    }

    #[test]
    fn test_media_precedes_text() {
        let m = msg("hello there", true, true);
        assert_eq!(classify(&m), Category::EphemeralMedia);

        // Regular media without view-once falls through to text rules
        let m = msg("hello there", true, false);
        assert_eq!(classify(&m), Category::Greeting);
    }

    #[test]
    fn test_greeting_beats_later_rules() {
        assert_eq!(classify_text("hi, where are you"), Category::Greeting);
        assert_eq!(classify_text("hey thanks"), Category::Greeting);
    }

    // Substring matching hazards: these document current behavior, not intent
    #[test]
    fn test_substring_false_positives() {
        assert_eq!(classify_text("they left"), Category::Greeting); // "hey"
        assert_eq!(classify_text("this is fine"), Category::Greeting); // "hi"
        assert_eq!(classify_text("echo hello"), Category::Greeting); // greeting outranks echo
        assert_eq!(classify_text("anywhere is fine"), Category::Unclassified);
    }

    #[test]
    fn test_category_display() {
        assert_eq!(Category::Greeting.to_string(), "greeting");
        assert_eq!(
            Category::Command(Command::Echo("x".into())).to_string(),
            "command:echo"
        );
    }

    fn mixed_case(phrase: &str, upper: &[bool]) -> String {
        phrase
            .chars()
            .zip(upper.iter().cycle())
            .map(|(c, &up)| if up { c.to_ascii_uppercase() } else { c })
            .collect()
    }

    proptest! {
        #[test]
        fn prop_greeting_substring_always_greeting(
            prefix in ".{0,24}",
            suffix in ".{0,24}",
            index in 0..GREETING_PHRASES.len(),
            upper in proptest::collection::vec(any::<bool>(), 1..16),
        ) {
            let phrase = mixed_case(GREETING_PHRASES[index], &upper);
            let text = format!("{}{}{}", prefix, phrase, suffix);
            prop_assert_eq!(classify_text(&text), Category::Greeting);
        }

        #[test]
        fn prop_view_once_beats_any_text(body in ".*") {
            prop_assert_eq!(classify(&msg(&body, true, true)), Category::EphemeralMedia);
        }

        #[test]
        fn prop_media_without_view_once_matches_text(body in ".*") {
            prop_assert_eq!(classify(&msg(&body, true, false)), classify_text(&body));
        }
    }
}
