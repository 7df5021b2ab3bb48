//! Chat line classification
//!
//! Maps loosely phrased chat lines onto router intents. Anything that is not
//! a recognized command is free text for the active agent.

use agentdeck_core::Intent;
use once_cell::sync::Lazy;
use regex::Regex;

/// One line of user input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Intent(Intent),
    Quit,
    Empty,
}

static START: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:start|launch|open)(?:\s+(?:agent\s+)?(\S+))?$").expect("valid regex")
});

static STOP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:stop|halt|close)(?:\s+(?:agent\s+)?(\S+))?$").expect("valid regex")
});

static SWITCH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:switch(?:\s+to)?|use|talk\s+to)\s+(\S+)$").expect("valid regex")
});

static RESCAN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(?:rescan|scan|refresh|list)$").expect("valid regex"));

static HELP: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^(?:help|\?)$").expect("valid regex"));

static RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)^run\s+(.+)$").expect("valid regex"));

static QUIT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(?:quit|exit|/q)$").expect("valid regex"));

pub fn classify(line: &str) -> Input {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Input::Empty;
    }
    if QUIT.is_match(trimmed) {
        return Input::Quit;
    }

    let intent = if let Some(caps) = START.captures(trimmed) {
        match caps.get(1).map(|m| m.as_str()) {
            Some(target) if target.eq_ignore_ascii_case("all") => Intent::StartAll,
            target => Intent::Start(target.map(str::to_string)),
        }
    } else if let Some(caps) = STOP.captures(trimmed) {
        match caps.get(1).map(|m| m.as_str()) {
            Some(target) if target.eq_ignore_ascii_case("all") => Intent::StopAll,
            target => Intent::Stop(target.map(str::to_string)),
        }
    } else if let Some(caps) = SWITCH.captures(trimmed) {
        Intent::Switch(caps[1].to_string())
    } else if RESCAN.is_match(trimmed) {
        Intent::Rescan
    } else if HELP.is_match(trimmed) {
        Intent::Help
    } else if let Some(caps) = RUN.captures(trimmed) {
        Intent::RunOnce(caps[1].to_string())
    } else {
        // Free text goes through untrimmed
        Intent::Send(line.trim_end_matches(['\r', '\n']).to_string())
    };

    Input::Intent(intent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn intent(line: &str) -> Intent {
        match classify(line) {
            Input::Intent(intent) => intent,
            other => panic!("{:?} classified as {:?}", line, other),
        }
    }

    #[test]
    fn test_start_and_stop_targets() {
        assert_eq!(intent("start"), Intent::Start(None));
        assert_eq!(intent("Start codex"), Intent::Start(Some("codex".to_string())));
        assert_eq!(intent("launch agent gemini"), Intent::Start(Some("gemini".to_string())));
        assert_eq!(intent("start all"), Intent::StartAll);
        assert_eq!(intent("stop"), Intent::Stop(None));
        assert_eq!(intent("stop ALL"), Intent::StopAll);
        assert_eq!(intent("halt aider"), Intent::Stop(Some("aider".to_string())));
    }

    #[test]
    fn test_switch_phrasings() {
        assert_eq!(intent("switch codex"), Intent::Switch("codex".to_string()));
        assert_eq!(intent("switch to claude"), Intent::Switch("claude".to_string()));
        assert_eq!(intent("use gemini"), Intent::Switch("gemini".to_string()));
    }

    #[test]
    fn test_simple_commands() {
        assert_eq!(intent("rescan"), Intent::Rescan);
        assert_eq!(intent("  help "), Intent::Help);
        assert_eq!(intent("run fix the tests"), Intent::RunOnce("fix the tests".to_string()));
        assert_eq!(classify("quit"), Input::Quit);
        assert_eq!(classify("   "), Input::Empty);
    }

    #[test]
    fn test_everything_else_is_sent() {
        assert_eq!(
            intent("start the refactor from main.rs please"),
            Intent::Send("start the refactor from main.rs please".to_string())
        );
        assert_eq!(intent("  indented code\r\n"), Intent::Send("  indented code".to_string()));
        assert_eq!(intent("switch"), Intent::Send("switch".to_string()));
    }
}
