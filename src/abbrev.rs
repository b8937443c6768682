//! Grammar-label abbreviation.
//!
//! Dictionary grammar codes and usage notes spell terms out in full.
//! Two substitution tables shorten them: one for grammar terminology,
//! one for the `something`/`somebody` shorthand used inside patterns.
//! Both passes are idempotent because no replacement value matches a
//! table key.

use once_cell::sync::Lazy;
use regex::Regex;

/// Grammar terminology replacements, applied to `.gram`, `.prop`,
/// `.registerlab` and heading text.
pub static GRAMMAR_TABLE: &[(&str, &str)] = &[
    ("[", "\u{27e8}"),
    ("]", "\u{27e9}"),
    ("uncountable", "U"),
    ("countable", "C"),
    ("singular", "sing"),
    ("plural", "pl"),
    ("intransitive", "I"),
    ("transitive", "T"),
    ("passive", "psv"),
    ("after", "aft"),
    ("before", "bf"),
    ("often", "oft"),
    ("usually", "usu"),
    ("adjective", "adj"),
    ("adverb", "adv"),
    ("abbreviation", "abbr"),
    ("phrasal verb", "phrv"),
    ("exclamation", "interj"),
    ("conjunction", "conj"),
    ("preposition", "prep"),
    ("number", "num"),
    ("pronoun", "pron"),
    ("determiner", "det"),
    ("British English", "BrE"),
    ("American English", "AmE"),
];

/// Pattern shorthand used inside collocation and grammar patterns.
pub static SHORTHAND_TABLE: &[(&str, &str)] = &[
    ("something", "sth."),
    ("somebody", "sb."),
    ("someone", "sb."),
];

static GRAMMAR_RE: Lazy<Regex> = Lazy::new(|| table_regex(GRAMMAR_TABLE));
static SHORTHAND_RE: Lazy<Regex> = Lazy::new(|| table_regex(SHORTHAND_TABLE));

fn table_regex(table: &[(&str, &str)]) -> Regex {
    let alternation = table
        .iter()
        .map(|(key, _)| regex::escape(key))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&alternation).expect("escaped alternation always parses")
}

fn apply(table: &[(&str, &str)], re: &Regex, input: &str) -> String {
    re.replace_all(input, |caps: &regex::Captures<'_>| {
        let matched = &caps[0];
        table
            .iter()
            .find(|(key, _)| *key == matched)
            .map(|(_, value)| (*value).to_string())
            .unwrap_or_else(|| matched.to_string())
    })
    .into_owned()
}

/// Applies the grammar terminology table. `uncountable` is listed before
/// `countable` so the longer key wins under leftmost-first alternation.
pub fn abbreviate_grammar(input: &str) -> String {
    apply(GRAMMAR_TABLE, &GRAMMAR_RE, input)
}

/// Applies the `something`/`somebody` shorthand table.
pub fn abbreviate_shorthand(input: &str) -> String {
    apply(SHORTHAND_TABLE, &SHORTHAND_RE, input)
}
