//! Reply texts: template sets, random picking, and composition.
//!
//! Replies use Telegram's legacy Markdown, where `_` wraps italics.

use rand::Rng;

pub const START_TEXT: &str = "Moin! Versuche /help um herauszufinden was ich alles kann";

pub const HELP_TEXT: &str = "Versuche /check um herauszufinden, ob etwas eine Verschwörungstheorie ist oder nicht.\n\
Mit /complete oder /beende schreibe ich deinen Satz zu Ende.";

pub const FAILURE_TEXT: &str = "Da ist leider etwas schiefgelaufen. Versuch es später nochmal.";

pub const GENERATION_UNAVAILABLE_TEXT: &str = "Textvervollständigung ist gerade nicht verfügbar.";

pub const ITALIC: char = '_';

pub const ANGRY_EMOJIS: &[&str] = &["😠", "😒", "💩", "🤡", "💀"];
pub const ANGRY_PHRASES: &[&str] = &[
    "FAKE NEWS von",
    "Lüg mich nicht an",
    "Ich zensier dich gleich",
    "Recherchier lieber nochmal",
    "Wie kommst du auf sowas Unsinniges",
];

pub const HAPPY_EMOJIS: &[&str] = &["😎", "👍", "🙂", "✅"];
pub const HAPPY_PHRASES: &[&str] = &[
    "Sieht gut aus",
    "Klingt vernünftig",
    "Da ist nichts faul",
    "Passt schon",
];

pub const EXCLUDED_PHRASES: &[&str] = &[
    "🎓 Über meine Heimat sage ich nichts Schlechtes,",
    "🏛️ Kein Kommentar zur Uni Hamburg,",
    "🤐 Da halte ich mich lieber raus,",
];

pub const COMPLETION_PHRASES: &[&str] = &[
    "✍️ Ich hab das mal zu Ende gedacht,",
    "🔮 So geht es weiter,",
    "📜 Die Fortsetzung für dich,",
];

/// Source of template choices.
pub trait Picker {
    /// An index in `0..len`. `len` is never zero.
    fn pick(&mut self, len: usize) -> usize;
}

/// Uniformly random picks from the thread-local generator.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadPicker;

impl Picker for ThreadPicker {
    fn pick(&mut self, len: usize) -> usize {
        rand::rng().random_range(0..len)
    }
}

/// Replays a fixed sequence of indices, cycling when exhausted. Indices are
/// reduced modulo the candidate count.
#[derive(Debug, Clone)]
pub struct SequencePicker {
    indices: Vec<usize>,
    next: usize,
}

impl SequencePicker {
    pub fn new(indices: Vec<usize>) -> Self {
        Self { indices, next: 0 }
    }
}

impl Picker for SequencePicker {
    fn pick(&mut self, len: usize) -> usize {
        if self.indices.is_empty() {
            return 0;
        }
        let index = self.indices[self.next % self.indices.len()];
        self.next += 1;
        index % len
    }
}

fn choose<'a>(picker: &mut impl Picker, candidates: &[&'a str]) -> &'a str {
    candidates[picker.pick(candidates.len())]
}

/// Why a reply is being composed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Explicit `/check`: always answer.
    Command,
    /// Plain message: only answer conspiracies.
    Passive,
}

/// Outcome of looking at a message.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Verdict {
    /// Matched the exclusion filter; never classified.
    Excluded,
    /// Conspiracy probability from the classifier.
    Scored(f32),
}

/// Truncated percentage, e.g. `0.919` -> `91`.
pub fn percentage(probability: f32) -> u32 {
    (probability.clamp(0.0, 1.0) * 100.0) as u32
}

fn echo(name: &str, text: &str) -> String {
    format!("{name}:\n{ITALIC}{text}{ITALIC}")
}

/// Compose the reply for a verdict, or `None` when the bot stays silent.
///
/// Only probabilities strictly above `threshold` count as conspiracies.
pub fn compose_verdict(
    verdict: Verdict,
    trigger: Trigger,
    threshold: f32,
    name: &str,
    text: &str,
    picker: &mut impl Picker,
) -> Option<String> {
    match verdict {
        Verdict::Excluded => {
            let phrase = choose(picker, EXCLUDED_PHRASES);
            Some(format!("{phrase} {}", echo(name, text)))
        }
        Verdict::Scored(p) => {
            let (emojis, phrases) = if p > threshold {
                (ANGRY_EMOJIS, ANGRY_PHRASES)
            } else if trigger == Trigger::Command {
                (HAPPY_EMOJIS, HAPPY_PHRASES)
            } else {
                return None;
            };
            let emoji = choose(picker, emojis);
            let phrase = choose(picker, phrases);
            Some(format!(
                "{emoji}{phrase} {}\n\n{}% eine Verschwörungstheorie",
                echo(name, text),
                percentage(p)
            ))
        }
    }
}

/// Remove path separators from generated text.
pub fn sanitize_completion(text: &str) -> String {
    text.replace(['/', '\\'], "").trim().to_string()
}

pub fn compose_completion(completion: &str, name: &str, picker: &mut impl Picker) -> String {
    let phrase = choose(picker, COMPLETION_PHRASES);
    format!("{phrase} {name}:\n{}", sanitize_completion(completion))
}
