//! Verb vocabulary shared by the strict and loose intent parsers.
//!
//! This table is the only place where action synonyms live.

use machguard_types::Operation;

/// What a verb phrase asks the machine to do.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VerbAction {
    /// A grammar operation that takes a numeric operand from the phrase.
    Op(Operation),
    /// Switch a subsystem on (`true`) or off (`false`).
    Switch(bool),
    /// Multiply by a fixed factor ("double", "halve").
    Scale(f64),
}

/// `(phrase, action)` pairs.  Phrases are lower-case and matched on word
/// boundaries.
pub const VERBS: &[(&str, VerbAction)] = &[
    ("set", VerbAction::Op(Operation::Set)),
    ("change", VerbAction::Op(Operation::Set)),
    ("adjust", VerbAction::Op(Operation::Set)),
    ("make", VerbAction::Op(Operation::Set)),
    ("increase", VerbAction::Op(Operation::Increase)),
    ("raise", VerbAction::Op(Operation::Increase)),
    ("boost", VerbAction::Op(Operation::Increase)),
    ("ramp up", VerbAction::Op(Operation::Increase)),
    ("speed up", VerbAction::Op(Operation::Increase)),
    ("decrease", VerbAction::Op(Operation::Decrease)),
    ("reduce", VerbAction::Op(Operation::Decrease)),
    ("lower", VerbAction::Op(Operation::Decrease)),
    ("slow down", VerbAction::Op(Operation::Decrease)),
    ("cut", VerbAction::Op(Operation::Decrease)),
    ("multiply", VerbAction::Op(Operation::Multiply)),
    ("scale", VerbAction::Op(Operation::Multiply)),
    ("double", VerbAction::Scale(2.0)),
    ("triple", VerbAction::Scale(3.0)),
    ("halve", VerbAction::Scale(0.5)),
    ("toggle", VerbAction::Op(Operation::Toggle)),
    ("turn on", VerbAction::Switch(true)),
    ("switch on", VerbAction::Switch(true)),
    ("enable", VerbAction::Switch(true)),
    ("activate", VerbAction::Switch(true)),
    ("engage", VerbAction::Switch(true)),
    ("start", VerbAction::Switch(true)),
    ("turn off", VerbAction::Switch(false)),
    ("switch off", VerbAction::Switch(false)),
    ("shut off", VerbAction::Switch(false)),
    ("disable", VerbAction::Switch(false)),
    ("deactivate", VerbAction::Switch(false)),
    ("disengage", VerbAction::Switch(false)),
    ("stop", VerbAction::Switch(false)),
];

/// Words that end the strict grammar.
pub const MODIFIERS: [&str; 2] = ["absolute", "relative"];

/// Single-word connectives that separate several commands in one request.
/// A preceding `and` is folded into the separator by the splitter.
pub const SEPARATORS: [&str; 1] = ["then"];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_grammar_operation_has_a_synonym() {
        for op in Operation::ALL {
            assert!(
                VERBS.iter().any(|(_, a)| *a == VerbAction::Op(op)),
                "{op} has no verb"
            );
        }
    }

    #[test]
    fn phrases_are_lower_case_and_unique() {
        let mut seen = std::collections::HashSet::new();
        for (phrase, _) in VERBS {
            assert_eq!(*phrase, phrase.to_lowercase());
            assert!(seen.insert(*phrase), "duplicate verb {phrase}");
        }
    }

    #[test]
    fn separators_are_single_words() {
        for sep in SEPARATORS {
            assert!(!sep.contains(char::is_whitespace), "{sep:?} can never match a word");
        }
    }
}
