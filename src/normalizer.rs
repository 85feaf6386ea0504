use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

const NBSP: char = '\u{00A0}';
const SPACED_ASTERISK_TOKEN: &str = " [*] ";

lazy_static! {
    // `[^\]]*` stops at the first `]` and is allowed to cross line breaks.
    static ref WILDCARD_TOKEN_REGEX: Regex = Regex::new(r"\s*\[[^\]]*\]\s*").unwrap();
    static ref ASTERISK_TOKEN_REGEX: Regex = Regex::new(r"\s*\[\*\]\s*").unwrap();
}

/// Which bracket tokens get collapsed into a `/` separator.
///
/// `Wildcard` is the reference behaviour. The other two reproduce the
/// stricter rules earlier adopters relied on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BracketMode {
    /// `[` + anything up to the next `]`, with any surrounding whitespace.
    #[default]
    Wildcard,
    /// Only `[*]`, with any (or no) surrounding whitespace.
    Asterisk,
    /// Only the literal ` [*] ` with exactly one space on each side.
    Spaced,
}

impl BracketMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            BracketMode::Wildcard => "wildcard",
            BracketMode::Asterisk => "asterisk",
            BracketMode::Spaced => "spaced",
        }
    }
}

impl fmt::Display for BracketMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BracketMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "wildcard" => Ok(BracketMode::Wildcard),
            "asterisk" => Ok(BracketMode::Asterisk),
            "spaced" => Ok(BracketMode::Spaced),
            other => Err(format!(
                "unknown bracket mode '{}' (expected wildcard, asterisk or spaced)",
                other
            )),
        }
    }
}

/// The cell text cleanup rule.
///
/// For every input the rule:
/// 1. turns non-breaking spaces into ordinary spaces,
/// 2. collapses bracket tokens (see [`BracketMode`]) into a single `/`,
/// 3. strips leading whitespace and leading `/` separators, layer by layer.
///
/// The rule is total: there is no input it rejects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Normalizer {
    mode: BracketMode,
}

impl Normalizer {
    pub fn new(mode: BracketMode) -> Self {
        Normalizer { mode }
    }

    pub fn mode(&self) -> BracketMode {
        self.mode
    }

    /// Apply the rule to one piece of cell text.
    ///
    /// # Examples
    /// ```
    /// use sheet_scrub::normalizer::Normalizer;
    ///
    /// let rule = Normalizer::default();
    /// assert_eq!(rule.normalize("A [XYZ] B"), "A/B");
    /// assert_eq!(rule.normalize(" [001] value"), "value");
    /// ```
    pub fn normalize(&self, text: &str) -> String {
        if text.is_empty() {
            return String::new();
        }

        let spaced = text.replace(NBSP, " ");
        let collapsed = match self.mode {
            BracketMode::Wildcard => WILDCARD_TOKEN_REGEX.replace_all(&spaced, "/").into_owned(),
            BracketMode::Asterisk => ASTERISK_TOKEN_REGEX.replace_all(&spaced, "/").into_owned(),
            BracketMode::Spaced => spaced.replace(SPACED_ASTERISK_TOKEN, "/"),
        };

        strip_leading_separators(&collapsed).to_string()
    }

    /// Normalize `text` in place, returning whether it changed.
    pub fn normalize_in_place(&self, text: &mut String) -> bool {
        let normalized = self.normalize(text);
        if normalized == *text {
            return false;
        }
        *text = normalized;
        true
    }
}

/// Shorthand for [`Normalizer::normalize`] with the default wildcard rule.
pub fn normalize(text: &str) -> String {
    Normalizer::default().normalize(text)
}

fn strip_leading_separators(text: &str) -> &str {
    let mut rest = text.trim_start();
    while let Some(stripped) = rest.strip_prefix('/') {
        rest = stripped.trim_start();
    }
    rest
}
