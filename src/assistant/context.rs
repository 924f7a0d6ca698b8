//! Heuristic Context Analyzer
//!
//! Keyword detectors consulted only when no registry rule matched. Each
//! detector tests its own keyword set; the sets are disjoint, so a text can
//! fire several detectors at once. A fixed precedence picks at most one
//! secondary intent: greeting, then count question, then urgency.

use serde::Serialize;

use super::types::Intent;

/// Intents the fallback path may select. The registry must define each.
pub const HEURISTIC_TARGETS: [Intent; 3] = [Intent::Greeting, Intent::Stats, Intent::CriticalSearch];

const GREETING_WORDS: &[&str] = &["hello", "hi", "hey", "hiya", "howdy", "greetings", "morning", "evening", "afternoon"];
const QUESTION_WORDS: &[&str] = &[
    "what", "how", "when", "where", "who", "which", "why", "is", "are", "can", "could", "does", "do", "should",
];
const COMMAND_WORDS: &[&str] = &[
    "create", "add", "show", "list", "find", "search", "assign", "mark", "update", "close", "open", "give",
    "get", "set", "delete", "remove",
];
const COUNT_WORDS: &[&str] = &["many", "count", "total", "number"];
const URGENCY_WORDS: &[&str] = &[
    "urgent", "urgently", "emergency", "critical", "asap", "immediately", "danger", "dangerous", "hazard", "fire",
    "flood", "flooding",
];
const LOCATION_WORDS: &[&str] = &[
    "near", "around", "street", "st", "avenue", "ave", "road", "rd", "block", "park", "corner", "downtown",
    "district", "neighborhood", "neighbourhood",
];

/// Independent detector outcomes for one text
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ContextSignals {
    pub is_greeting: bool,
    pub is_question: bool,
    pub is_command: bool,
    pub has_urgency_cue: bool,
    pub has_location_cue: bool,
    /// Question asking for a count ("how many ...", "total number of ...")
    pub is_count_question: bool,
}

impl ContextSignals {
    pub fn any(&self) -> bool {
        self.is_greeting
            || self.is_question
            || self.is_command
            || self.has_urgency_cue
            || self.has_location_cue
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ContextAnalyzer;

impl ContextAnalyzer {
    pub fn new() -> Self {
        Self
    }

    pub fn analyze_context(&self, text: &str) -> ContextSignals {
        let lowered = text.trim().to_lowercase();
        let words: Vec<&str> = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();
        let has = |set: &[&str]| words.iter().any(|w| set.contains(w));
        let first_in = |set: &[&str]| words.first().map_or(false, |w| set.contains(w));

        let is_question = lowered.ends_with('?') || first_in(QUESTION_WORDS);

        ContextSignals {
            is_greeting: first_in(GREETING_WORDS) || lowered.starts_with("good "),
            is_question,
            is_command: first_in(COMMAND_WORDS),
            has_urgency_cue: has(URGENCY_WORDS),
            has_location_cue: has(LOCATION_WORDS),
            is_count_question: is_question && has(COUNT_WORDS),
        }
    }

    /// Pick the secondary intent for an unmatched text, if any.
    ///
    /// Precedence: greeting > count question > urgency. Anything else is left
    /// to the generic clarification response.
    pub fn select_fallback(&self, signals: &ContextSignals) -> Option<Intent> {
        if signals.is_greeting {
            Some(Intent::Greeting)
        } else if signals.is_count_question {
            Some(Intent::Stats)
        } else if signals.has_urgency_cue {
            Some(Intent::CriticalSearch)
        } else {
            None
        }
    }
}
