//! Line classifier for the upstream application's log.
//!
//! Four regexes are tried in a fixed order (world enter, instance join,
//! player join, player leave) and the first match wins. The patterns come
//! from config so a log format change does not need a rebuild; each one
//! must expose the named groups its event needs.

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::event::EventKind;
use crate::error::{Error, Result};

/// Regex sources for each line shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternConfig {
    /// Needs `world_name`.
    pub world_enter: String,
    /// Needs `world_id` and `instance_id`; `region` is optional.
    pub instance_join: String,
    /// Needs `display_name` and `user_id`.
    pub player_join: String,
    /// Needs `display_name` and `user_id`.
    pub player_leave: String,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            world_enter: r"\[Behaviour\] Entering Room: (?P<world_name>.+)$".to_string(),
            instance_join: r"\[Behaviour\] Joining (?P<world_id>wrld_[0-9A-Za-z-]+):(?P<instance_id>[^~\s]+)(?:\S*?~region\((?P<region>[0-9A-Za-z-]+)\))?"
                .to_string(),
            player_join: r"\[Behaviour\] OnPlayerJoined (?P<display_name>.+?) \((?P<user_id>usr_[0-9A-Za-z-]+)\)$"
                .to_string(),
            player_leave: r"\[Behaviour\] OnPlayerLeft (?P<display_name>.+?) \((?P<user_id>usr_[0-9A-Za-z-]+)\)$"
                .to_string(),
        }
    }
}

/// Compiled classifier. Pure: no state between lines.
#[derive(Debug, Clone)]
pub struct LogParser {
    world_enter: Regex,
    instance_join: Regex,
    player_join: Regex,
    player_leave: Regex,
}

impl LogParser {
    pub fn new(patterns: &PatternConfig) -> Result<Self> {
        Ok(Self {
            world_enter: compile("world_enter", &patterns.world_enter, &["world_name"])?,
            instance_join: compile(
                "instance_join",
                &patterns.instance_join,
                &["world_id", "instance_id"],
            )?,
            player_join: compile(
                "player_join",
                &patterns.player_join,
                &["display_name", "user_id"],
            )?,
            player_leave: compile(
                "player_leave",
                &patterns.player_leave,
                &["display_name", "user_id"],
            )?,
        })
    }

    /// Classify one line. Unrecognised lines yield `None`.
    pub fn classify(&self, line: &str) -> Option<EventKind> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        if let Some(caps) = self.world_enter.captures(line) {
            return Some(EventKind::WorldEnter {
                world_name: group(&caps, "world_name")?,
            });
        }

        if let Some(caps) = self.instance_join.captures(line) {
            return Some(EventKind::InstanceJoin {
                world_id: group(&caps, "world_id")?,
                instance_id: group(&caps, "instance_id")?,
                region: group(&caps, "region"),
            });
        }

        if let Some(caps) = self.player_join.captures(line) {
            return Some(EventKind::PlayerJoin {
                user_id: group(&caps, "user_id")?,
                display_name: group(&caps, "display_name")?,
            });
        }

        if let Some(caps) = self.player_leave.captures(line) {
            return Some(EventKind::PlayerLeave {
                user_id: group(&caps, "user_id")?,
                display_name: group(&caps, "display_name")?,
            });
        }

        None
    }
}

fn compile(name: &'static str, pattern: &str, required: &[&str]) -> Result<Regex> {
    let re = Regex::new(pattern).map_err(|e| Error::Pattern {
        name,
        reason: e.to_string(),
    })?;

    let names: Vec<&str> = re.capture_names().flatten().collect();
    if let Some(missing) = required.iter().find(|r| !names.contains(r)) {
        return Err(Error::Pattern {
            name,
            reason: format!("missing named group `{missing}`"),
        });
    }

    Ok(re)
}

fn group(caps: &regex::Captures<'_>, name: &str) -> Option<String> {
    caps.name(name)
        .map(|m| m.as_str().trim())
        .filter(|s| !s.is_empty())
        .map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PREFIX: &str = "2024.05.01 21:14:03 Log        -  ";

    fn parser() -> LogParser {
        LogParser::new(&PatternConfig::default()).unwrap()
    }

    fn line(body: &str) -> String {
        format!("{PREFIX}{body}")
    }

    /// Every matcher that fires for a line, ignoring priority.
    fn matchers_hit(parser: &LogParser, line: &str) -> Vec<&'static str> {
        let line = line.trim();
        let mut hits = Vec::new();
        if parser.world_enter.is_match(line) {
            hits.push("world_enter");
        }
        if parser.instance_join.is_match(line) {
            hits.push("instance_join");
        }
        if parser.player_join.is_match(line) {
            hits.push("player_join");
        }
        if parser.player_leave.is_match(line) {
            hits.push("player_leave");
        }
        hits
    }

    #[test]
    fn parses_world_enter() {
        assert_eq!(
            parser().classify(&line("[Behaviour] Entering Room: The Great Pug  ")),
            Some(EventKind::WorldEnter {
                world_name: "The Great Pug".to_string()
            })
        );
    }

    #[test]
    fn parses_instance_join_with_region() {
        let event = parser().classify(&line(
            "[Behaviour] Joining wrld_6b2a8f2e-1111-4c2b-9a0e-1a2b3c4d5e6f:48213~hidden(usr_aa11)~region(jp)",
        ));
        assert_eq!(
            event,
            Some(EventKind::InstanceJoin {
                world_id: "wrld_6b2a8f2e-1111-4c2b-9a0e-1a2b3c4d5e6f".to_string(),
                instance_id: "48213".to_string(),
                region: Some("jp".to_string()),
            })
        );
    }

    #[test]
    fn parses_instance_join_without_region() {
        let event = parser().classify(&line("[Behaviour] Joining wrld_abc:12345"));
        assert_eq!(
            event,
            Some(EventKind::InstanceJoin {
                world_id: "wrld_abc".to_string(),
                instance_id: "12345".to_string(),
                region: None,
            })
        );
    }

    #[test]
    fn parses_players_with_parentheses_in_name() {
        let p = parser();
        assert_eq!(
            p.classify(&line("[Behaviour] OnPlayerJoined Mika (JP) (usr_1f2e3d4c)")),
            Some(EventKind::PlayerJoin {
                user_id: "usr_1f2e3d4c".to_string(),
                display_name: "Mika (JP)".to_string(),
            })
        );
        assert_eq!(
            p.classify(&line("[Behaviour] OnPlayerLeft Mika (JP) (usr_1f2e3d4c)")),
            Some(EventKind::PlayerLeave {
                user_id: "usr_1f2e3d4c".to_string(),
                display_name: "Mika (JP)".to_string(),
            })
        );
    }

    #[test]
    fn matchers_are_exclusive_over_corpus() {
        let p = parser();
        let positives = [
            (line("[Behaviour] Entering Room: Midnight Rooftop"), "world_enter"),
            (
                line("[Behaviour] Joining wrld_4cf5:8841~friends(usr_x)~region(use)"),
                "instance_join",
            ),
            (line("[Behaviour] OnPlayerJoined Kaz (usr_0a1b2c3d)"), "player_join"),
            (line("[Behaviour] OnPlayerLeft Kaz (usr_0a1b2c3d)"), "player_leave"),
            (
                line("[Behaviour] OnPlayerJoined Entering Room: x (usr_99)"),
                "player_join",
            ),
        ];
        for (text, expected) in &positives {
            assert_eq!(matchers_hit(&p, text), vec![*expected], "line: {text}");
            assert_eq!(p.classify(text).map(|e| e.name()), Some(*expected));
        }

        let noise = [
            String::new(),
            "   ".to_string(),
            line("[Behaviour] Joining or Creating Room: Midnight Rooftop"),
            line("[Behaviour] OnPlayerLeftRoom"),
            line("[Behaviour] OnPlayerJoined Kaz"),
            line("[Behaviour] Initialized PlayerAPI \"Kaz\" is local"),
            line("[Network Processing] RPC invoked SwitchAvatar on AvatarPedestal"),
            "[behaviour] entering room: lowercase".to_string(),
        ];
        for text in &noise {
            assert!(matchers_hit(&p, text).is_empty(), "line: {text}");
            assert_eq!(p.classify(text), None);
        }
    }

    #[test]
    fn custom_patterns_are_used() {
        let patterns = PatternConfig {
            world_enter: r"^WORLD (?P<world_name>\w+)$".to_string(),
            ..PatternConfig::default()
        };
        let p = LogParser::new(&patterns).unwrap();
        assert_eq!(
            p.classify("WORLD lobby"),
            Some(EventKind::WorldEnter {
                world_name: "lobby".to_string()
            })
        );
        assert_eq!(p.classify(&line("[Behaviour] Entering Room: lobby")), None);
    }

    #[test]
    fn rejects_pattern_without_required_group() {
        let patterns = PatternConfig {
            player_join: r"OnPlayerJoined (?P<name>.+)".to_string(),
            ..PatternConfig::default()
        };
        let err = LogParser::new(&patterns).unwrap_err();
        assert!(matches!(err, Error::Pattern { name: "player_join", .. }));
    }

    #[test]
    fn rejects_invalid_regex() {
        let patterns = PatternConfig {
            world_enter: "(unclosed".to_string(),
            ..PatternConfig::default()
        };
        assert!(matches!(
            LogParser::new(&patterns),
            Err(Error::Pattern { name: "world_enter", .. })
        ));
    }
}
