//! Detection of a model that keeps issuing the same tool call.

use stepwise_config::ToolCallCheckerConfig;
use stepwise_core::message::MessageToolCall;

#[derive(Debug, Clone)]
struct Entry<T> {
    value: T,
    distance: usize,
    occurrences: usize,
}

/// Counts how often equal values were seen among the recent updates.
///
/// Every update ages all entries by one; entries older than `window` are
/// dropped before the new value is matched.
#[derive(Debug, Clone)]
pub struct OccurrencesCounter<T> {
    window: usize,
    entries: Vec<Entry<T>>,
}

impl<T> OccurrencesCounter<T> {
    pub fn new(window: usize) -> Self {
        Self {
            window,
            entries: Vec::new(),
        }
    }

    /// Record `value` and return how many times it occurs in the window.
    pub fn update_by<F>(&mut self, value: T, same: F) -> usize
    where
        F: Fn(&T, &T) -> bool,
    {
        let window = self.window;
        for entry in &mut self.entries {
            entry.distance += 1;
        }
        self.entries.retain(|entry| entry.distance <= window);

        if let Some(entry) = self.entries.iter_mut().find(|entry| same(&entry.value, &value)) {
            entry.occurrences += 1;
            return entry.occurrences;
        }

        self.entries.push(Entry {
            value,
            distance: 0,
            occurrences: 1,
        });
        1
    }

    pub fn reset(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T: PartialEq> OccurrencesCounter<T> {
    pub fn update(&mut self, value: T) -> usize {
        self.update_by(value, |a, b| a == b)
    }
}

/// Flags repeated identical tool calls, either back to back or too often
/// within a window.
#[derive(Debug, Clone)]
pub struct ToolCallChecker {
    config: ToolCallCheckerConfig,
    strike: OccurrencesCounter<MessageToolCall>,
    occurrences: OccurrencesCounter<MessageToolCall>,
    cycle_found: bool,
}

impl ToolCallChecker {
    pub fn new(config: ToolCallCheckerConfig) -> Self {
        let strike_window = config.max_strike_length + 1;
        let occurrence_window = (config.max_total_occurrences + 1).max(config.window_size);
        Self {
            config,
            strike: OccurrencesCounter::new(strike_window),
            occurrences: OccurrencesCounter::new(occurrence_window),
            cycle_found: false,
        }
    }

    pub fn enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn cycle_found(&self) -> bool {
        self.cycle_found
    }

    /// No-op when the checker is disabled.
    pub fn register(&mut self, call: &MessageToolCall) {
        if !self.config.enabled {
            return;
        }

        let strike = self.strike.update_by(call.clone(), MessageToolCall::is_same_call);
        if strike > self.config.max_strike_length {
            self.cycle_found = true;
        }

        let total = self
            .occurrences
            .update_by(call.clone(), MessageToolCall::is_same_call);
        if total > self.config.max_total_occurrences {
            self.cycle_found = true;
        }
    }

    pub fn reset(&mut self) {
        self.strike.reset();
        self.occurrences.reset();
        self.cycle_found = false;
    }
}
