// Output console abstraction
// Everything the operator sees about a run is written through an OutputSink.

use crate::models::SavedTransformation;
use chrono::{SecondsFormat, Utc};
use regex::Regex;
use std::io::Write;
use std::sync::{Arc, Mutex, RwLock};
use tracing::warn;

/// Prefix used on engine announcements
pub const ANNOUNCE_PREFIX: &str = "SFCC_JOBS";

/// Line-oriented text console
pub trait OutputSink: Send + Sync {
    /// Append one line (the text may itself contain newlines)
    fn append_line(&self, text: &str);

    /// Remove everything written so far
    fn clear(&self);
}

/// Write a timestamped engine announcement and mirror it to the log
pub fn announce(sink: &dyn OutputSink, text: &str) {
    tracing::info!("{}", text);
    sink.append_line(&format!(
        "[{}] {}: {}",
        Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        ANNOUNCE_PREFIX,
        text
    ));
}

/// Sink writing to standard output
#[derive(Debug, Default, Clone)]
pub struct ConsoleSink;

impl OutputSink for ConsoleSink {
    fn append_line(&self, text: &str) {
        let mut stdout = std::io::stdout().lock();
        // A closed stdout must not abort a run
        let _ = writeln!(stdout, "{}", text);
    }

    fn clear(&self) {
        let mut stdout = std::io::stdout().lock();
        let _ = write!(stdout, "\x1B[2J\x1B[H");
        let _ = stdout.flush();
    }
}

/// Sink keeping every line in memory
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    lines: Arc<Mutex<Vec<String>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the lines written so far
    pub fn lines(&self) -> Vec<String> {
        match self.lines.lock() {
            Ok(lines) => lines.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Lines written through [`announce`], without their timestamp prefix
    pub fn announcements(&self) -> Vec<String> {
        let marker = format!("] {}: ", ANNOUNCE_PREFIX);
        self.lines()
            .into_iter()
            .filter_map(|line| {
                if !line.starts_with('[') {
                    return None;
                }
                line.find(&marker)
                    .map(|index| line[index + marker.len()..].to_string())
            })
            .collect()
    }

    /// Concatenation of every line that is not an announcement
    pub fn content(&self) -> String {
        let marker = format!("] {}: ", ANNOUNCE_PREFIX);
        self.lines()
            .into_iter()
            .filter(|line| !(line.starts_with('[') && line.contains(&marker)))
            .collect::<Vec<_>>()
            .concat()
    }
}

impl OutputSink for MemorySink {
    fn append_line(&self, text: &str) {
        match self.lines.lock() {
            Ok(mut lines) => lines.push(text.to_string()),
            Err(poisoned) => poisoned.into_inner().push(text.to_string()),
        }
    }

    fn clear(&self) {
        match self.lines.lock() {
            Ok(mut lines) => lines.clear(),
            Err(poisoned) => poisoned.into_inner().clear(),
        }
    }
}

struct CompiledRule {
    regex: Regex,
    replacement: String,
}

/// Sink applying the enabled transformation rules before forwarding each line
pub struct FilteredSink {
    inner: Arc<dyn OutputSink>,
    rules: RwLock<Vec<CompiledRule>>,
}

impl FilteredSink {
    pub fn new(inner: Arc<dyn OutputSink>) -> Self {
        Self {
            inner,
            rules: RwLock::new(Vec::new()),
        }
    }

    /// Replace the active rules. Disabled rules are dropped, the rest apply
    /// in ascending position order. Rules whose pattern does not compile are
    /// skipped with a warning.
    pub fn set_rules(&self, rules: &[SavedTransformation]) {
        let mut enabled: Vec<&SavedTransformation> = rules.iter().filter(|r| r.enabled).collect();
        enabled.sort_by_key(|rule| rule.position);

        let compiled: Vec<CompiledRule> = enabled
            .into_iter()
            .filter_map(|rule| match Regex::new(&rule.pattern) {
                Ok(regex) => Some(CompiledRule {
                    regex,
                    replacement: rule.replacement.clone(),
                }),
                Err(e) => {
                    warn!(rule_id = %rule.id, error = %e, "Skipping transformation with invalid pattern");
                    None
                }
            })
            .collect();

        match self.rules.write() {
            Ok(mut guard) => *guard = compiled,
            Err(poisoned) => *poisoned.into_inner() = compiled,
        }
    }

    pub fn rule_count(&self) -> usize {
        match self.rules.read() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    fn transform(&self, text: &str) -> String {
        let apply = |rules: &Vec<CompiledRule>| {
            rules.iter().fold(text.to_string(), |message, rule| {
                rule.regex
                    .replace_all(&message, rule.replacement.as_str())
                    .into_owned()
            })
        };

        match self.rules.read() {
            Ok(guard) => apply(&guard),
            Err(poisoned) => apply(&poisoned.into_inner()),
        }
    }
}

impl OutputSink for FilteredSink {
    fn append_line(&self, text: &str) {
        let transformed = self.transform(text);
        self.inner.append_line(&transformed);
    }

    fn clear(&self) {
        self.inner.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(id: &str, pattern: &str, replacement: &str, position: i64, enabled: bool) -> SavedTransformation {
        SavedTransformation {
            id: id.to_string(),
            pattern: pattern.to_string(),
            replacement: replacement.to_string(),
            position,
            enabled,
        }
    }

    #[test]
    fn test_memory_sink_clear() {
        let sink = MemorySink::new();
        sink.append_line("one");
        sink.append_line("two");
        assert_eq!(sink.lines().len(), 2);
        sink.clear();
        assert!(sink.lines().is_empty());
    }

    #[test]
    fn test_announce_prefix() {
        let sink = MemorySink::new();
        announce(&sink, "Job started");
        sink.append_line("raw log content");

        let lines = sink.lines();
        assert!(lines[0].starts_with('['));
        assert!(lines[0].ends_with("SFCC_JOBS: Job started"));
        assert_eq!(sink.announcements(), vec!["Job started".to_string()]);
        assert_eq!(sink.content(), "raw log content");
    }

    #[test]
    fn test_filtered_sink_applies_rules_in_position_order() {
        let memory = MemorySink::new();
        let filtered = FilteredSink::new(Arc::new(memory.clone()));
        filtered.set_rules(&[
            rule("second", "beta", "gamma", 2, true),
            rule("first", "alpha", "beta", 1, true),
        ]);

        filtered.append_line("alpha alpha");
        assert_eq!(memory.lines(), vec!["gamma gamma".to_string()]);
    }

    #[test]
    fn test_filtered_sink_ignores_disabled_and_invalid_rules() {
        let memory = MemorySink::new();
        let filtered = FilteredSink::new(Arc::new(memory.clone()));
        filtered.set_rules(&[
            rule("off", "secret", "***", 0, false),
            rule("broken", "(unclosed", "x", 1, true),
            rule("dates", r"\d{4}-\d{2}-\d{2}", "<date>", 2, true),
        ]);

        assert_eq!(filtered.rule_count(), 1);
        filtered.append_line("secret on 2023-01-31");
        assert_eq!(memory.lines(), vec!["secret on <date>".to_string()]);
    }

    #[test]
    fn test_filtered_sink_capture_groups() {
        let memory = MemorySink::new();
        let filtered = FilteredSink::new(Arc::new(memory.clone()));
        filtered.set_rules(&[rule("swap", r"(\w+)@(\w+)", "$2 at $1", 0, true)]);

        filtered.append_line("job@site");
        assert_eq!(memory.lines(), vec!["site at job".to_string()]);
    }
}
