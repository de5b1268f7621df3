use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;

use crate::model::PersistedCommand;

const ID_SCORE: i64 = 1200;
const EXACT_BASE: i64 = 1000;
const PREFIX_BASE: i64 = 800;

/// Match result with score
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchResult {
    pub score: i64,
}

/// FZF-style filter over stored commands. Strategies in priority order:
/// command id, exact substring, prefix, then skim fuzzy matching.
pub struct CommandMatcher {
    matcher: SkimMatcherV2,
}

impl CommandMatcher {
    pub fn new() -> Self {
        Self {
            matcher: SkimMatcherV2::default().ignore_case(),
        }
    }

    /// Text a command is matched against: id, title and script.
    pub fn searchable_text(command: &PersistedCommand) -> String {
        format!("{} {} {}", command.id, command.title, command.script)
    }

    fn id_match(&self, pattern: &str, command: &PersistedCommand) -> Option<MatchResult> {
        let id = pattern.strip_prefix('#').unwrap_or(pattern);
        if !id.is_empty() && id.chars().all(|c| c.is_ascii_digit()) && id == command.id.to_string() {
            Some(MatchResult { score: ID_SCORE })
        } else {
            None
        }
    }

    fn exact_match(&self, pattern: &str, text: &str) -> Option<MatchResult> {
        text.to_lowercase().contains(&pattern.to_lowercase()).then(|| MatchResult {
            score: EXACT_BASE + (pattern.len() * 10) as i64,
        })
    }

    fn prefix_match(&self, pattern: &str, text: &str) -> Option<MatchResult> {
        text.starts_with(pattern).then(|| MatchResult {
            score: PREFIX_BASE + (pattern.len() * 8) as i64,
        })
    }

    fn fuzzy_match(&self, pattern: &str, text: &str) -> Option<MatchResult> {
        self.matcher.fuzzy_match(text, pattern).map(|score| MatchResult { score })
    }

    /// Try each strategy by priority. An empty pattern matches everything.
    pub fn match_command(&self, pattern: &str, command: &PersistedCommand) -> Option<MatchResult> {
        let pattern = pattern.trim();
        if pattern.is_empty() {
            return Some(MatchResult { score: 0 });
        }

        if let Some(result) = self.id_match(pattern, command) {
            return Some(result);
        }

        let body = format!("{} {}", command.title, command.script);
        self.exact_match(pattern, &body)
            .or_else(|| self.prefix_match(pattern, &command.script))
            .or_else(|| self.fuzzy_match(pattern, &Self::searchable_text(command)))
    }

    /// Indices into `commands` that match `pattern`, best first. Ties keep
    /// the incoming order, so an empty pattern returns the list unchanged.
    pub fn filter(&self, pattern: &str, commands: &[PersistedCommand]) -> Vec<usize> {
        let mut results: Vec<(usize, i64)> = commands
            .iter()
            .enumerate()
            .filter_map(|(i, cmd)| self.match_command(pattern, cmd).map(|m| (i, m.score)))
            .collect();

        results.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        results.into_iter().map(|(i, _)| i).collect()
    }
}

impl Default for CommandMatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NewCommand;
    use chrono::DateTime;

    fn commands(scripts: &[&str]) -> Vec<PersistedCommand> {
        let ts = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        scripts
            .iter()
            .enumerate()
            .map(|(i, s)| NewCommand::imported(s, 0, ts).into_persisted(i as i64 + 1))
            .collect()
    }

    #[test]
    fn empty_pattern_keeps_order() {
        let cmds = commands(&["ls", "pwd", "git status"]);
        assert_eq!(CommandMatcher::new().filter("  ", &cmds), vec![0, 1, 2]);
    }

    #[test]
    fn exact_beats_fuzzy() {
        let cmds = commands(&["git stash pop", "git status", "gst"]);
        let found = CommandMatcher::new().filter("status", &cmds);
        assert_eq!(found.first(), Some(&1));
        assert!(!found.contains(&2));
    }

    #[test]
    fn fuzzy_finds_subsequence() {
        let cmds = commands(&["docker compose up -d", "ls"]);
        assert_eq!(CommandMatcher::new().filter("dcup", &cmds), vec![0]);
    }

    #[test]
    fn id_match_ranks_first() {
        let cmds = commands(&["echo 2", "sleep 1", "tail -n 20 log"]);
        let matcher = CommandMatcher::new();
        assert_eq!(matcher.match_command("2", &cmds[1]).map(|m| m.score), Some(ID_SCORE));
        assert_eq!(matcher.filter("#2", &cmds).first(), Some(&1));
    }

    #[test]
    fn title_is_searched() {
        let mut cmds = commands(&["kubectl get pods -A", "ls"]);
        cmds[0].title = "List pods".into();
        assert_eq!(CommandMatcher::new().filter("list pods", &cmds), vec![0]);
    }
}
