//! [`IntentParser`] – turns command text into [`Intent`]s.
//!
//! Two layers cooperate:
//!
//! 1. **Strict grammar** ([`IntentParser::parse`]): exactly four tokens,
//!    `<operation> <parameter> <number>[%] <absolute|relative>`.  Anything
//!    else is "no intent", never an error.
//! 2. **Normalizer** ([`IntentParser::normalize`]): a looser keyword matcher
//!    that finds an action verb from [`VERBS`] and the first known parameter
//!    in a free-form phrase and re-serialises them into the strict grammar.
//!
//! [`IntentParser::parse_request`] splits a request into lines and runs each
//! one through the strict grammar, falling back to the normalizer.
//!
//! # Example
//!
//! ```
//! use machguard_kernel::intent_parser::IntentParser;
//! use machguard_types::Operation;
//!
//! let parser = IntentParser::default();
//!
//! let intent = parser.parse("increase rpm 10% absolute").unwrap();
//! assert_eq!(intent.operation, Operation::Increase);
//! assert!(intent.operand_is_percentage);
//!
//! assert_eq!(
//!     parser.normalize("please disable the sprinkler").as_deref(),
//!     Some("toggle sprinkler 0 absolute"),
//! );
//! assert!(parser.parse("make it go faster").is_none());
//! ```

use machguard_types::{Intent, Operation};
use tracing::debug;

use crate::registry::{earliest, find_words, ParameterRegistry};
use crate::vocabulary::{VerbAction, MODIFIERS, SEPARATORS, VERBS};

/// A free-form phrase rewritten into the strict grammar.
#[derive(Debug, Clone, PartialEq)]
pub struct Rewrite {
    pub phrase: String,
    pub command: String,
}

/// Result of parsing a whole request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedRequest {
    /// Intents in request order.
    pub intents: Vec<Intent>,
    /// One strict-grammar command per intent.
    pub normalized: Vec<String>,
    pub rewrites: Vec<Rewrite>,
    /// Lines that yielded no intent.
    pub skipped: Vec<String>,
}

/// Command-text parser bound to a [`ParameterRegistry`].
#[derive(Debug, Clone, Copy, Default)]
pub struct IntentParser {
    registry: ParameterRegistry,
}

impl IntentParser {
    pub fn new(registry: ParameterRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ParameterRegistry {
        &self.registry
    }

    /// Parse one strict-grammar line.
    pub fn parse(&self, line: &str) -> Option<Intent> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let [op, param, magnitude, modifier] = tokens.as_slice() else {
            return None;
        };
        let operation = Operation::from_keyword(op)?;
        let spec = self.registry.resolve(param)?;
        if !MODIFIERS.iter().any(|m| m.eq_ignore_ascii_case(modifier)) {
            return None;
        }
        let (operand, operand_is_percentage) = parse_magnitude(magnitude)?;
        Some(Intent {
            parameter_key: spec.key.to_string(),
            operation,
            operand,
            operand_is_percentage,
            raw_phrase: line.trim().to_string(),
        })
    }

    /// Rewrite a free-form phrase into the strict grammar.
    ///
    /// Returns `None` when no verb, no known parameter, or (for verbs that
    /// need one) no number can be found.
    pub fn normalize(&self, phrase: &str) -> Option<String> {
        let lower = phrase.to_lowercase();
        let aliases = self.registry.matches_in(&lower);

        // A verb embedded in a longer alias ("stop" in "emergency stop") is
        // part of the parameter name, and an alias embedded in a verb
        // ("speed" in "speed up") is part of the verb.
        let verbs: Vec<(usize, usize, VerbAction)> = VERBS
            .iter()
            .flat_map(|(p, a)| find_words(&lower, p).into_iter().map(move |(s, e)| (s, e, *a)))
            .filter(|(s, e, _)| {
                !aliases
                    .iter()
                    .any(|m| m.start <= *s && *e <= m.end && m.end - m.start > e - s)
            })
            .collect();
        let aliases = aliases
            .into_iter()
            .filter(|m| !verbs.iter().any(|(s, e, _)| *s <= m.start && m.end <= *e))
            .collect();

        let (verb_start, verb_end, action) = verbs
            .iter()
            .copied()
            .min_by(|a, b| a.0.cmp(&b.0).then((b.1 - b.0).cmp(&(a.1 - a.0))))?;
        let param = earliest(aliases)?;
        let number = first_number(&lower, &[(verb_start, verb_end), (param.start, param.end)]);

        let (operation, operand, pct) = match action {
            VerbAction::Switch(on) if param.spec.field.is_switch() => {
                (Operation::Toggle, if on { 1.0 } else { 0.0 }, false)
            }
            VerbAction::Switch(false) => (Operation::Set, 0.0, false),
            VerbAction::Switch(true) => return None,
            VerbAction::Scale(factor) => (Operation::Multiply, factor, false),
            VerbAction::Op(op) => {
                let (n, pct) = number?;
                (op, n, pct)
            }
        };

        let command = render(operation, param.spec.key, operand, pct);
        debug!(phrase, command = %command, "normalized free-form command");
        Some(command)
    }

    /// Split `raw` into command lines and parse each one.
    pub fn parse_request(&self, raw: &str) -> ParsedRequest {
        let mut out = ParsedRequest::default();
        for line in split_commands(raw) {
            if let Some(intent) = self.parse(&line) {
                out.normalized.push(render_intent(&intent));
                out.intents.push(intent);
                continue;
            }
            match self.normalize(&line).and_then(|cmd| self.parse(&cmd).map(|i| (cmd, i))) {
                Some((command, mut intent)) => {
                    intent.raw_phrase = line.clone();
                    out.rewrites.push(Rewrite {
                        phrase: line,
                        command: command.clone(),
                    });
                    out.normalized.push(command);
                    out.intents.push(intent);
                }
                None => out.skipped.push(line),
            }
        }
        out
    }
}

/// Serialise an intent back into the strict grammar.
pub fn render_intent(intent: &Intent) -> String {
    render(
        intent.operation,
        &intent.parameter_key,
        intent.operand,
        intent.operand_is_percentage,
    )
}

fn render(op: Operation, key: &str, operand: f64, pct: bool) -> String {
    let number = if operand.fract() == 0.0 && operand.abs() < 1e15 {
        format!("{}", operand as i64)
    } else {
        format!("{operand}")
    };
    format!(
        "{} {} {}{} {}",
        op.keyword(),
        key,
        number,
        if pct { "%" } else { "" },
        if pct { "relative" } else { "absolute" }
    )
}

/// Split a request into candidate command lines on newlines, `;`, and the
/// [`SEPARATORS`] words.  An `and` directly before a separator is dropped,
/// so `and then` splits like `then`.
pub fn split_commands(raw: &str) -> Vec<String> {
    let mut lines = Vec::new();
    for chunk in raw.split(['\n', ';']) {
        let mut current: Vec<&str> = Vec::new();
        for word in chunk.split_whitespace() {
            if SEPARATORS.contains(&word.to_lowercase().as_str()) {
                if current.last().is_some_and(|w| w.eq_ignore_ascii_case("and")) {
                    current.pop();
                }
                flush(&mut current, &mut lines);
            } else {
                current.push(word);
            }
        }
        flush(&mut current, &mut lines);
    }
    lines
}

fn flush(current: &mut Vec<&str>, lines: &mut Vec<String>) {
    if !current.is_empty() {
        lines.push(current.join(" "));
        current.clear();
    }
}

fn parse_magnitude(token: &str) -> Option<(f64, bool)> {
    let (digits, pct) = match token.strip_suffix('%') {
        Some(d) => (d, true),
        None => (token, false),
    };
    let value: f64 = digits.parse().ok()?;
    (value.is_finite() && value >= 0.0).then_some((value, pct))
}

/// First numeral in `text` outside the `excluded` byte ranges.  A numeral
/// glued to a preceding letter (`axis2`) is not a number.
fn first_number(text: &str, excluded: &[(usize, usize)]) -> Option<(f64, bool)> {
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if !bytes[i].is_ascii_digit() {
            i += 1;
            continue;
        }
        let start = i;
        while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'.') {
            i += 1;
        }
        let glued = start > 0 && (bytes[start - 1].is_ascii_alphabetic() || bytes[start - 1] == b'_');
        let inside = excluded.iter().any(|(s, e)| *s <= start && start < *e);
        if glued || inside {
            continue;
        }
        let digits = text[start..i].trim_end_matches('.');
        let pct = bytes.get(i) == Some(&b'%');
        if let Some((value, _)) = parse_magnitude(digits) {
            return Some((value, pct));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> IntentParser {
        IntentParser::default()
    }

    // ------------------------------------------------------------------ strict grammar

    #[test]
    fn strict_set_absolute() {
        let intent = parser().parse("set rpm 1500 absolute").unwrap();
        assert_eq!(intent.parameter_key, "rpm");
        assert_eq!(intent.operation, Operation::Set);
        assert_eq!(intent.operand, 1500.0);
        assert!(!intent.operand_is_percentage);
    }

    #[test]
    fn strict_accepts_aliases_and_case() {
        let intent = parser().parse("TOGGLE fire_suppression 0 Absolute").unwrap();
        assert_eq!(intent.parameter_key, "sprinkler");
        assert_eq!(intent.operation, Operation::Toggle);
    }

    #[test]
    fn strict_rejects_malformed_lines() {
        let p = parser();
        assert!(p.parse("set rpm 1500").is_none());
        assert!(p.parse("spin rpm 1500 absolute").is_none());
        assert!(p.parse("set warp 1500 absolute").is_none());
        assert!(p.parse("set rpm fast absolute").is_none());
        assert!(p.parse("set rpm -5 absolute").is_none());
        assert!(p.parse("set rpm 1500 sideways").is_none());
        assert!(p.parse("").is_none());
    }

    // ------------------------------------------------------------------ normalizer

    #[test]
    fn normalize_percentage_is_relative() {
        assert_eq!(
            parser().normalize("Increase the spindle speed by 10%").as_deref(),
            Some("increase rpm 10% relative")
        );
    }

    #[test]
    fn normalize_plain_number_is_absolute() {
        assert_eq!(
            parser().normalize("set rpm to 1500 please").as_deref(),
            Some("set rpm 1500 absolute")
        );
    }

    #[test]
    fn normalize_switch_verbs() {
        let p = parser();
        assert_eq!(p.normalize("turn on the igniter").as_deref(), Some("toggle igniter 1 absolute"));
        assert_eq!(p.normalize("shut off ventilation").as_deref(), Some("toggle ventilation 0 absolute"));
        assert_eq!(p.normalize("engage the emergency stop").as_deref(), Some("toggle estop 1 absolute"));
    }

    #[test]
    fn normalize_stop_on_numeric_parameter_sets_zero() {
        assert_eq!(
            parser().normalize("stop the spindle").as_deref(),
            Some("set rpm 0 absolute")
        );
        assert!(parser().normalize("start the spindle").is_none());
    }

    #[test]
    fn normalize_scale_verbs_and_axis_numbers() {
        assert_eq!(
            parser().normalize("double the axis2 speed").as_deref(),
            Some("multiply axis2_rpm 2 absolute")
        );
        assert_eq!(
            parser().normalize("reduce axis2 torque by 40").as_deref(),
            Some("decrease axis2_torque 40 absolute")
        );
    }

    #[test]
    fn normalize_verb_containing_alias_is_a_verb() {
        assert_eq!(
            parser().normalize("speed up the spindle by 20%").as_deref(),
            Some("increase rpm 20% relative")
        );
    }

    #[test]
    fn normalize_requires_number_for_numeric_verbs() {
        assert!(parser().normalize("increase the rpm a lot").is_none());
        assert!(parser().normalize("hello there").is_none());
    }

    // ------------------------------------------------------------------ requests

    #[test]
    fn split_on_separators() {
        assert_eq!(
            split_commands("set rpm 100 absolute; turn on fan\nraise torque by 5 and then stop pump"),
            vec![
                "set rpm 100 absolute",
                "turn on fan",
                "raise torque by 5",
                "stop pump"
            ]
        );
    }

    #[test]
    fn and_then_splits_like_then() {
        let expected = vec!["engage the interlock", "set rpm 1200 absolute"];
        assert_eq!(split_commands("engage the interlock and then set rpm 1200 absolute"), expected);
        assert_eq!(split_commands("engage the interlock AND THEN set rpm 1200 absolute"), expected);
        assert_eq!(split_commands("engage the interlock then set rpm 1200 absolute"), expected);
    }

    #[test]
    fn parse_request_mixes_strict_and_free_form() {
        let parsed = parser().parse_request("set rpm 1200 absolute then disable the sprinkler; sing a song");
        assert_eq!(parsed.intents.len(), 2);
        assert_eq!(
            parsed.normalized,
            vec!["set rpm 1200 absolute", "toggle sprinkler 0 absolute"]
        );
        assert_eq!(parsed.rewrites.len(), 1);
        assert_eq!(parsed.rewrites[0].phrase, "disable the sprinkler");
        assert_eq!(parsed.intents[1].raw_phrase, "disable the sprinkler");
        assert_eq!(parsed.skipped, vec!["sing a song"]);
    }

    #[test]
    fn render_roundtrips_through_strict_parser() {
        let p = parser();
        let intent = p.parse("multiply voltage 1.25 absolute").unwrap();
        let again = p.parse(&render_intent(&intent)).unwrap();
        assert_eq!(again.operand, 1.25);
        assert_eq!(again.operation, Operation::Multiply);
    }
}
