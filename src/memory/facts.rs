//! Visitor fact extraction
//!
//! Scans user-authored messages with a declarative table of patterns and
//! produces a sparse [`FactRecord`]. Extraction never fails: a pattern that
//! does not match, or whose capture normalizes to nothing, simply leaves the
//! field absent.

use crate::memory::session::{Message, MessageRole};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Kind of interview the visitor says they are running
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum InterviewType {
    Technical,
    Behavioral,
    Hr,
    Informal,
}

impl fmt::Display for InterviewType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            InterviewType::Technical => "technical",
            InterviewType::Behavioral => "behavioral",
            InterviewType::Hr => "hr",
            InterviewType::Informal => "informal",
        };
        f.write_str(label)
    }
}

/// Structured facts inferred about a visitor from their own messages
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FactRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experience: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub interests: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interview_type: Option<InterviewType>,
}

impl FactRecord {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.role.is_none()
            && self.company.is_none()
            && self.email.is_none()
            && self.experience.is_none()
            && self.interests.is_empty()
            && self.interview_type.is_none()
    }

    fn slot_mut(&mut self, field: Field) -> &mut Option<String> {
        match field {
            Field::Name => &mut self.name,
            Field::Role => &mut self.role,
            Field::Company => &mut self.company,
            Field::Email => &mut self.email,
            Field::Experience => &mut self.experience,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Name,
    Role,
    Company,
    Email,
    Experience,
}

/// Which part of a match becomes the candidate value
#[derive(Debug, Clone, Copy)]
enum Capture {
    Group,
    Whole,
}

struct FieldPattern {
    field: Field,
    regex: Regex,
    capture: Capture,
    normalize: fn(&str) -> Option<String>,
}

impl FieldPattern {
    fn new(field: Field, pattern: &str, capture: Capture, normalize: fn(&str) -> Option<String>) -> Self {
        Self {
            field,
            regex: Regex::new(pattern).expect("fact pattern must compile"),
            capture,
            normalize,
        }
    }

    /// First normalized candidate in the text, scanning matches left to right
    fn find(&self, text: &str) -> Option<String> {
        self.regex.captures_iter(text).find_map(|caps| {
            let raw = match self.capture {
                Capture::Group => caps.get(1),
                Capture::Whole => caps.get(0),
            }?;
            (self.normalize)(raw.as_str())
        })
    }
}

/// Words that end a name candidate ("jane doe and i work..." → "jane doe")
const NAME_STOP_WORDS: &[&str] = &[
    "a", "an", "the", "and", "but", "or", "from", "at", "with", "of", "for", "in", "on", "to",
    "i", "i'm", "im", "am", "is", "here", "speaking", "working", "work", "looking", "interested",
    "hiring", "recruiting", "calling", "reaching", "trying", "just", "currently", "also",
    "really", "very", "so", "not", "glad", "happy", "excited", "curious", "wondering", "new",
    "your", "you", "this", "that", "who", "what", "which", "hi", "hello", "hey", "there",
    "recruiter", "engineer", "developer", "manager", "interviewer", "student", "designer",
    "going", "doing", "good", "fine", "great", "well", "sorry", "back",
];

/// Words that follow "i'm" or "this is" in ordinary sentences but never open a name
const INTRO_NON_NAMES: &[&str] = &[
    "sure", "interested", "afraid", "confused", "impressed", "based", "actually", "still",
    "available", "ready", "able", "familiar", "aware", "done", "busy", "tired", "ok", "okay",
    "awesome", "cool", "amazing", "interesting", "impressive", "nice", "helpful", "perfect",
    "correct", "true", "right", "wrong", "weird", "fun", "exactly", "about", "my", "our", "his",
    "her", "their", "it", "how", "why", "where", "when", "all", "one", "more", "pretty", "quite",
    "definitely", "probably", "responsible", "part", "impossible", "possible", "great",
];

/// Shortest word treated as a gerund by its "-ing" suffix ("asking", not "king")
const MIN_GERUND_LEN: usize = 6;

const ROLE_STOP_WORDS: &[&str] = &[
    "at", "for", "from", "with", "in", "and", "on", "who", "here", "looking", "interested",
    "to", "but", "so", "because", "i", "we", "and",
];

const COMPANY_STOP_WORDS: &[&str] = &[
    "and", "as", "where", "in", "to", "who", "we", "i", "but", "so", "because", "looking",
    "interested", "about", "on", "your", "you", "my", "for", "here", "which", "that", "with",
    "today", "now",
];

const MAX_NAME_WORDS: usize = 3;
const MAX_ROLE_WORDS: usize = 5;
const MAX_COMPANY_WORDS: usize = 5;

lazy_static! {
    /// Ordered pattern table; earlier rows win for the same field
    static ref FIELD_PATTERNS: Vec<FieldPattern> = vec![
        // Name
        FieldPattern::new(
            Field::Name,
            r"\b(?:my name is|my name's|call me)\s+([a-z][a-z'\-\s]{0,40})",
            Capture::Group,
            normalize_name,
        ),
        FieldPattern::new(
            Field::Name,
            r"\b(?:i'm|i am|this is)\s+([a-z][a-z'\-\s]{0,40})",
            Capture::Group,
            normalize_intro_name,
        ),
        FieldPattern::new(
            Field::Name,
            r"^(?:hi|hello|hey)?[\s,!.]*([a-z]+(?:\s+[a-z]+)?)\s+(?:here|speaking)\b",
            Capture::Group,
            normalize_name,
        ),
        // Role
        FieldPattern::new(
            Field::Role,
            r"\b(?:i'm an?|i am an?|i'm the|i am the|i work as an?|i work as|working as an?|my role is|my title is)\s+([a-z][a-z\s\-]{1,50})",
            Capture::Group,
            normalize_role,
        ),
        FieldPattern::new(
            Field::Role,
            r"\b(?:senior|junior|lead|principal|staff)\s+[a-z]+\b",
            Capture::Whole,
            normalize_role,
        ),
        FieldPattern::new(
            Field::Role,
            r"\b(?:hiring manager|engineering manager|product manager|talent acquisition|recruiter|interviewer|hr|developer|engineer|manager|director|founder|ceo|cto|analyst|designer)\b",
            Capture::Whole,
            normalize_role,
        ),
        // Company
        FieldPattern::new(
            Field::Company,
            r"\b(?:work(?:ing)? (?:at|for)|employed (?:at|by)|(?:i'm|i am|we're|we are) (?:with|from)|(?:here|calling|reaching out) from|(?:recruiting|hiring) for|represent(?:ing)?|from)\s+([a-z0-9][a-z0-9&.\-\s]{1,50})",
            Capture::Group,
            normalize_company,
        ),
        FieldPattern::new(
            Field::Company,
            r"\b(?:company|organization|organisation|firm|startup)\s+(?:called|named)\s+([a-z0-9][a-z0-9&.\-\s]{1,50})",
            Capture::Group,
            normalize_company,
        ),
        FieldPattern::new(
            Field::Company,
            r"\b([a-z][a-z&\-]*\s+(?:inc|corp|corporation|ltd|llc|gmbh))\b",
            Capture::Group,
            normalize_company,
        ),
        // Email
        FieldPattern::new(
            Field::Email,
            r"[a-z0-9._%+\-]+@[a-z0-9.\-]+\.[a-z]{2,}",
            Capture::Whole,
            normalize_plain,
        ),
        // Experience
        FieldPattern::new(
            Field::Experience,
            r"\b(\d{1,2})\+?\s*(?:years?|yrs?)\s+(?:of\s+)?(?:experience|exp)\b",
            Capture::Group,
            normalize_years,
        ),
        FieldPattern::new(
            Field::Experience,
            r"\b(?:experience|background)\s+(?:in|with)\s+([a-z][a-z0-9\s,+#/\-]{1,100})",
            Capture::Group,
            normalize_plain,
        ),
    ];

    /// Interview triggers in priority order
    static ref INTERVIEW_TRIGGERS: Vec<(InterviewType, Regex)> = vec![
        (
            InterviewType::Technical,
            Regex::new(r"\b(?:technical|coding|programming|system design)\s+(?:interview|round|session|screen)")
                .expect("interview pattern must compile"),
        ),
        (
            InterviewType::Behavioral,
            Regex::new(r"\b(?:behavioral|behavioural|culture(?:\s+fit)?|personality)\s+(?:interview|round|session|screen)")
                .expect("interview pattern must compile"),
        ),
        (
            InterviewType::Hr,
            Regex::new(r"\b(?:hr|human resources)\s+(?:interview|round|session|screen)")
                .expect("interview pattern must compile"),
        ),
        (
            InterviewType::Informal,
            Regex::new(r"\b(?:informal|casual)\s+(?:chat|conversation|interview|call)")
                .expect("interview pattern must compile"),
        ),
    ];

    static ref INTEREST_PATTERNS: Vec<(&'static str, Regex)> = INTEREST_VOCABULARY
        .iter()
        .map(|keyword| {
            let pattern = format!(r"\b{}\b", regex::escape(keyword));
            (*keyword, Regex::new(&pattern).expect("interest pattern must compile"))
        })
        .collect();
}

const INTEREST_VOCABULARY: &[&str] = &[
    "javascript",
    "typescript",
    "python",
    "react",
    "node",
    "laravel",
    "php",
    "mysql",
    "postgresql",
    "mongodb",
    "aws",
    "docker",
    "kubernetes",
    "ai",
    "machine learning",
    "blockchain",
    "unity",
    "rust",
];

/// Pattern-driven fact extractor
pub struct FactExtractor;

impl FactExtractor {
    /// Derive facts from a message log. Assistant messages are ignored.
    pub fn extract<'a, I>(messages: I) -> FactRecord
    where
        I: IntoIterator<Item = &'a Message>,
    {
        let mut record = FactRecord::default();

        for message in messages {
            if message.role != MessageRole::User {
                continue;
            }
            Self::scan_into(&mut record, &message.content);
        }

        record
    }

    /// Facts found in a single piece of text
    pub fn extract_text(text: &str) -> FactRecord {
        let mut record = FactRecord::default();
        Self::scan_into(&mut record, text);
        record
    }

    fn scan_into(record: &mut FactRecord, text: &str) {
        let content = text.trim().to_lowercase();
        if content.is_empty() {
            return;
        }

        for pattern in FIELD_PATTERNS.iter() {
            let slot = record.slot_mut(pattern.field);
            if slot.is_some() {
                continue;
            }
            if let Some(value) = pattern.find(&content) {
                *slot = Some(value);
            }
        }

        if record.interview_type.is_none() {
            record.interview_type = INTERVIEW_TRIGGERS
                .iter()
                .find(|(_, regex)| regex.is_match(&content))
                .map(|(kind, _)| *kind);
        }

        for (keyword, regex) in INTEREST_PATTERNS.iter() {
            if regex.is_match(&content) {
                record.interests.insert((*keyword).to_string());
            }
        }
    }
}

// =============================
// Normalizers
// =============================

fn words_until_stop<'a>(raw: &'a str, stops: &[&str]) -> Vec<&'a str> {
    raw.split_whitespace()
        .take_while(|word| !stops.contains(word))
        .collect()
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn normalize_name(raw: &str) -> Option<String> {
    let words = words_until_stop(raw, NAME_STOP_WORDS);
    if words.is_empty() || words.len() > MAX_NAME_WORDS {
        return None;
    }

    let name = words
        .iter()
        .map(|word| word.trim_matches(|c: char| c == '\'' || c == '-'))
        .filter(|word| !word.is_empty())
        .map(title_case)
        .collect::<Vec<_>>()
        .join(" ");

    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

/// Bare introductions ("i'm ...") also open ordinary sentences, so the first
/// word must not read as a verb or an adjective.
fn normalize_intro_name(raw: &str) -> Option<String> {
    let first = raw.split_whitespace().next()?;
    let gerund = first.len() >= MIN_GERUND_LEN && first.ends_with("ing");
    if gerund || INTRO_NON_NAMES.contains(&first) {
        return None;
    }
    normalize_name(raw)
}

fn normalize_role(raw: &str) -> Option<String> {
    let words = words_until_stop(raw, ROLE_STOP_WORDS);
    if words.is_empty() || words.len() > MAX_ROLE_WORDS {
        return None;
    }
    Some(words.join(" "))
}

fn normalize_company(raw: &str) -> Option<String> {
    let trimmed = raw.trim_start_matches("the ");
    let words: Vec<&str> = words_until_stop(trimmed, COMPANY_STOP_WORDS)
        .into_iter()
        .map(|word| word.trim_end_matches(|c: char| c == '.' || c == '-' || c == '&'))
        .filter(|word| !word.is_empty())
        .collect();

    if words.is_empty() || words.len() > MAX_COMPANY_WORDS {
        return None;
    }

    Some(words.iter().map(|word| title_case(word)).collect::<Vec<_>>().join(" "))
}

fn normalize_years(raw: &str) -> Option<String> {
    let years: u32 = raw.trim().parse().ok()?;
    Some(match years {
        1 => "1 year".to_string(),
        n => format!("{} years", n),
    })
}

fn normalize_plain(raw: &str) -> Option<String> {
    let value = raw
        .trim()
        .trim_end_matches(|c: char| c == ',' || c == '.' || c == '-')
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}
