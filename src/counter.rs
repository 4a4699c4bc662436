//! Counter formatting: letters, roman numerals, symbols and tag templates.

use crate::error::ConfigError;
use std::fmt;
use std::sync::Arc;

/// Lowercase letters: 1 → a, 26 → z, 27 → aa.
pub fn alph(n: usize) -> String {
    let mut n = n;
    let mut out = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        out.push((b'a' + rem as u8) as char);
        n = (n - 1) / 26;
    }
    out.iter().rev().collect()
}

/// Uppercase letters.
pub fn alph_upper(n: usize) -> String {
    alph(n).to_uppercase()
}

const ROMAN: &[(usize, &str)] = &[
    (1000, "m"),
    (900, "cm"),
    (500, "d"),
    (400, "cd"),
    (100, "c"),
    (90, "xc"),
    (50, "l"),
    (40, "xl"),
    (10, "x"),
    (9, "ix"),
    (5, "v"),
    (4, "iv"),
    (1, "i"),
];

/// Lowercase roman numerals.
pub fn roman(n: usize) -> String {
    let mut n = n;
    let mut out = String::new();
    for &(value, digits) in ROMAN {
        while n >= value {
            out.push_str(digits);
            n -= value;
        }
    }
    out
}

/// Uppercase roman numerals.
pub fn roman_upper(n: usize) -> String {
    roman(n).to_uppercase()
}

pub fn arabic(n: usize) -> String {
    n.to_string()
}

const FNSYMBOLS: &[&str] = &["*", "†", "‡", "§", "¶", "‖"];

/// Footnote symbols, doubled once exhausted (`**`, `††`, ...).
pub fn fnsymbol(n: usize) -> String {
    if n == 0 {
        return String::new();
    }
    let symbol = FNSYMBOLS[(n - 1) % FNSYMBOLS.len()];
    symbol.repeat((n - 1) / FNSYMBOLS.len() + 1)
}

/// Counter style selected by a sentinel character.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterStyle {
    Arabic,
    Alph,
    AlphUpper,
    Roman,
    RomanUpper,
    FnSymbol,
}

impl CounterStyle {
    /// Look up a standard formatter by name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "arabic" => Some(Self::Arabic),
            "alph" => Some(Self::Alph),
            "Alph" => Some(Self::AlphUpper),
            "roman" => Some(Self::Roman),
            "Roman" => Some(Self::RomanUpper),
            "fnsymbol" => Some(Self::FnSymbol),
            _ => None,
        }
    }

    fn from_sentinel(c: char) -> Option<Self> {
        match c {
            'a' => Some(Self::Alph),
            'A' => Some(Self::AlphUpper),
            'i' => Some(Self::Roman),
            'I' => Some(Self::RomanUpper),
            '1' => Some(Self::Arabic),
            _ => None,
        }
    }

    pub fn format(&self, n: usize) -> String {
        match self {
            Self::Arabic => arabic(n),
            Self::Alph => alph(n),
            Self::AlphUpper => alph_upper(n),
            Self::Roman => roman(n),
            Self::RomanUpper => roman_upper(n),
            Self::FnSymbol => fnsymbol(n),
        }
    }
}

/// Maps a 1-based counter value to LaTeX-like source text.
#[derive(Clone)]
pub enum CounterFormatter {
    /// The same literal for every value (e.g. a bullet)
    Literal(String),
    /// A style spliced between a literal prefix and suffix
    Template {
        prefix: String,
        style: CounterStyle,
        suffix: String,
    },
    Custom(Arc<dyn Fn(usize) -> String + Send + Sync>),
}

impl CounterFormatter {
    /// Build a formatter from a tag template such as `(1)`, `a.` or `•`.
    ///
    /// The first sentinel character (`a`, `A`, `i`, `I`, `1`) is replaced by
    /// the counter value; a template without one is used verbatim.
    pub fn from_template(template: &str) -> Self {
        for (idx, c) in template.char_indices() {
            if let Some(style) = CounterStyle::from_sentinel(c) {
                return CounterFormatter::Template {
                    prefix: template[..idx].to_string(),
                    style,
                    suffix: template[idx + c.len_utf8()..].to_string(),
                };
            }
        }
        CounterFormatter::Literal(template.to_string())
    }

    /// Resolve a standard formatter name, falling back to a tag template.
    pub fn from_name_or_template(spec: &str) -> Self {
        match CounterStyle::from_name(spec) {
            Some(style) => CounterFormatter::from_style(style),
            None => CounterFormatter::from_template(spec),
        }
    }

    /// Resolve a standard formatter name only.
    pub fn from_name(name: &str) -> Result<Self, ConfigError> {
        CounterStyle::from_name(name)
            .map(CounterFormatter::from_style)
            .ok_or_else(|| ConfigError::UnknownCounterFormatter(name.to_string()))
    }

    pub fn from_style(style: CounterStyle) -> Self {
        CounterFormatter::Template {
            prefix: String::new(),
            style,
            suffix: String::new(),
        }
    }

    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(usize) -> String + Send + Sync + 'static,
    {
        CounterFormatter::Custom(Arc::new(f))
    }

    pub fn format(&self, n: usize) -> String {
        match self {
            CounterFormatter::Literal(s) => s.clone(),
            CounterFormatter::Template {
                prefix,
                style,
                suffix,
            } => format!("{}{}{}", prefix, style.format(n), suffix),
            CounterFormatter::Custom(f) => f(n),
        }
    }
}

impl fmt::Debug for CounterFormatter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CounterFormatter::Literal(s) => f.debug_tuple("Literal").field(s).finish(),
            CounterFormatter::Template {
                prefix,
                style,
                suffix,
            } => f
                .debug_struct("Template")
                .field("prefix", prefix)
                .field("style", style)
                .field("suffix", suffix)
                .finish(),
            CounterFormatter::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_alph() {
        assert_eq!(alph(1), "a");
        assert_eq!(alph(26), "z");
        assert_eq!(alph(27), "aa");
        assert_eq!(alph_upper(3), "C");
    }

    #[test]
    fn test_roman() {
        assert_eq!(roman(4), "iv");
        assert_eq!(roman_upper(1994), "MCMXCIV");
        assert_eq!(roman_upper(3), "III");
    }

    #[test]
    fn test_fnsymbol() {
        assert_eq!(fnsymbol(1), "*");
        assert_eq!(fnsymbol(2), "†");
        assert_eq!(fnsymbol(7), "**");
    }

    #[test]
    fn test_template_labels() {
        let paren = CounterFormatter::from_template("(1)");
        let labels: Vec<_> = (1..=3).map(|n| paren.format(n)).collect();
        assert_eq!(labels, vec!["(1)", "(2)", "(3)"]);

        let letters = CounterFormatter::from_template("a.");
        let labels: Vec<_> = (1..=3).map(|n| letters.format(n)).collect();
        assert_eq!(labels, vec!["a.", "b.", "c."]);

        let upper_roman = CounterFormatter::from_template("I");
        let labels: Vec<_> = (1..=3).map(|n| upper_roman.format(n)).collect();
        assert_eq!(labels, vec!["I", "II", "III"]);
    }

    #[test]
    fn test_bullet_template_is_literal() {
        let bullet = CounterFormatter::from_template("•");
        assert_eq!(bullet.format(1), "•");
        assert_eq!(bullet.format(42), "•");
    }

    #[test]
    fn test_named_formatter() {
        assert_eq!(CounterFormatter::from_name("Roman").unwrap().format(9), "IX");
        assert!(CounterFormatter::from_name("nope").is_err());
        assert_eq!(CounterFormatter::from_name_or_template("[a]").format(2), "[b]");
    }
}
