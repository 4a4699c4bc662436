//! BibTeX bibliography parsing and a citation provider backed by it.

use crate::context::ResourceInfo;
use crate::error::{RenderError, Result};
use crate::feature::cite::CitationProvider;
use nom::{
    branch::alt,
    bytes::complete::take_while1,
    character::complete::{char, multispace0},
    combinator::map,
    sequence::{delimited, preceded, separated_pair, terminated},
    IResult,
};
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

/// A bibliography entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BibEntry {
    pub key: String,
    /// Lowercased entry type, e.g. `article`
    pub entry_type: String,
    pub authors: Vec<String>,
    pub title: Option<String>,
    pub year: Option<String>,
    pub journal: Option<String>,
    pub booktitle: Option<String>,
    pub publisher: Option<String>,
    pub volume: Option<String>,
    pub number: Option<String>,
    pub pages: Option<String>,
    pub doi: Option<String>,
    pub url: Option<String>,
    /// Any other fields, by lowercased name
    pub extra: HashMap<String, String>,
}

/// Parse BibTeX source into entries by citation key.
///
/// `@comment`, `@preamble` and `@string` blocks are skipped. A malformed
/// entry is skipped up to the next `@`.
pub fn parse_bibtex(input: &str) -> Result<HashMap<String, BibEntry>> {
    let mut entries = HashMap::new();
    let mut remaining = input;

    while let Some(at) = remaining.find('@') {
        remaining = &remaining[at..];
        match entry(remaining) {
            Ok((rest, parsed)) => {
                if let Some(parsed) = parsed {
                    entries.insert(parsed.key.clone(), parsed);
                }
                remaining = rest;
            }
            Err(_) => remaining = &remaining[1..],
        }
    }

    Ok(entries)
}

fn identifier(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_alphanumeric() || matches!(c, '_' | '-' | ':' | '.' | '/'))(input)
}

fn entry(input: &str) -> IResult<&str, Option<BibEntry>> {
    let (input, entry_type) =
        preceded(char('@'), take_while1(|c: char| c.is_alphanumeric()))(input)?;
    let (input, _) = multispace0(input)?;
    let entry_type = entry_type.to_lowercase();

    if matches!(entry_type.as_str(), "comment" | "preamble" | "string") {
        let (input, _) = balanced_braces(input)?;
        return Ok((input, None));
    }

    let (input, _) = terminated(char('{'), multispace0)(input)?;
    let (mut input, key) =
        terminated(identifier, delimited(multispace0, char(','), multispace0))(input)?;

    let mut fields = HashMap::new();
    while let Ok((rest, (name, value))) = field(input) {
        fields.insert(name.to_lowercase(), value);
        input = rest.trim_start();
        if let Some(rest) = input.strip_prefix(',') {
            input = rest.trim_start();
        }
    }
    let (input, _) = char('}')(input)?;

    Ok((input, Some(build_entry(key, entry_type, fields))))
}

fn field(input: &str) -> IResult<&str, (&str, String)> {
    separated_pair(
        identifier,
        delimited(multispace0, char('='), multispace0),
        alt((
            map(balanced_braces, clean_value),
            map(quoted, clean_value),
            map(take_while1(|c: char| c.is_ascii_digit()), str::to_string),
        )),
    )(input)
}

/// Content of a `{...}` group, nested braces included.
fn balanced_braces(input: &str) -> IResult<&str, &str> {
    let (body, _) = char('{')(input)?;
    let mut depth = 1;
    for (idx, c) in body.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Ok((&body[idx + 1..], &body[..idx]));
                }
            }
            _ => {}
        }
    }
    Err(nom::Err::Error(nom::error::Error::new(
        input,
        nom::error::ErrorKind::Char,
    )))
}

fn quoted(input: &str) -> IResult<&str, &str> {
    let (body, _) = char('"')(input)?;
    let mut escaped = false;
    for (idx, c) in body.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '"' => return Ok((&body[idx + 1..], &body[..idx])),
            _ => {}
        }
    }
    Err(nom::Err::Error(nom::error::Error::new(
        input,
        nom::error::ErrorKind::Char,
    )))
}

/// Drop case-protecting braces and normalize whitespace.
fn clean_value(value: &str) -> String {
    let stripped: String = value.chars().filter(|c| !matches!(c, '{' | '}')).collect();
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn build_entry(key: &str, entry_type: String, mut fields: HashMap<String, String>) -> BibEntry {
    let authors = fields
        .remove("author")
        .map(|a| {
            a.split(" and ")
                .map(str::trim)
                .filter(|a| !a.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    BibEntry {
        key: key.to_string(),
        entry_type,
        authors,
        title: fields.remove("title"),
        year: fields.remove("year"),
        journal: fields.remove("journal"),
        booktitle: fields.remove("booktitle"),
        publisher: fields.remove("publisher"),
        volume: fields.remove("volume"),
        number: fields.remove("number"),
        pages: fields.remove("pages"),
        doi: fields.remove("doi"),
        url: fields.remove("url"),
        extra: fields,
    }
}

/// Escape bibliography text so it parses as plain characters.
///
/// `~` and `--` are left alone, they mean the same in BibTeX.
fn escape_source(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\textbackslash{}"),
            '&' | '%' | '$' | '#' | '_' | '{' | '}' => {
                out.push('\\');
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}

fn join_authors(authors: &[String]) -> String {
    match authors {
        [] => String::new(),
        [one] => one.clone(),
        [init @ .., last] => format!("{} and {}", init.join(", "), last),
    }
}

/// Full citation text for an entry, as source for the fragment parser.
///
/// Shaped like `Authors (year). \emph{Title}. Journal, vol(num), pages.
/// Publisher.`, leaving out whatever the entry lacks.
pub fn format_entry(entry: &BibEntry) -> String {
    let mut sentences = Vec::new();

    let authors = join_authors(&entry.authors);
    match (&entry.year, authors.is_empty()) {
        (Some(year), false) => sentences.push(format!(
            "{} ({})",
            escape_source(&authors),
            escape_source(year)
        )),
        (Some(year), true) => sentences.push(format!("({})", escape_source(year))),
        (None, false) => sentences.push(escape_source(&authors)),
        (None, true) => {}
    }

    if let Some(title) = &entry.title {
        sentences.push(format!("\\emph{{{}}}", escape_source(title)));
    }

    if let Some(venue) = entry.journal.as_ref().or(entry.booktitle.as_ref()) {
        let mut venue = escape_source(venue);
        if let Some(volume) = &entry.volume {
            venue.push_str(&format!(", {}", escape_source(volume)));
            if let Some(number) = &entry.number {
                venue.push_str(&format!("({})", escape_source(number)));
            }
        }
        if let Some(pages) = &entry.pages {
            venue.push_str(&format!(", {}", escape_source(pages)));
        }
        sentences.push(venue);
    }

    if let Some(publisher) = &entry.publisher {
        sentences.push(escape_source(publisher));
    }
    if sentences.is_empty() {
        sentences.push(escape_source(&entry.key));
    }

    sentences
        .into_iter()
        .map(|s| if s.ends_with('.') { s } else { format!("{}.", s) })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Citation provider answering from a parsed `.bib` bibliography.
///
/// Citation keys may carry the `bib` prefix or none at all.
#[derive(Debug, Clone, Default)]
pub struct BibtexProvider {
    entries: HashMap<String, BibEntry>,
}

impl BibtexProvider {
    pub fn new(entries: HashMap<String, BibEntry>) -> Self {
        Self { entries }
    }

    pub fn from_bibtex(source: &str) -> Result<Self> {
        Ok(Self::new(parse_bibtex(source)?))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)?;
        let provider = Self::from_bibtex(&source)?;
        debug!(path = %path.display(), entries = provider.entries.len(), "Loaded bibliography");
        Ok(provider)
    }

    pub fn entry(&self, key: &str) -> Option<&BibEntry> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl CitationProvider for BibtexProvider {
    fn full_text(
        &self,
        prefix: Option<&str>,
        key: &str,
        _resource_info: &ResourceInfo,
    ) -> Result<String> {
        if let Some(prefix) = prefix.filter(|p| *p != "bib") {
            return Err(RenderError::Provider(format!(
                "unsupported citation prefix ‘{}’ for key ‘{}’",
                prefix, key
            ))
            .into());
        }
        let entry = self
            .entries
            .get(key)
            .ok_or_else(|| {
                RenderError::Provider(format!("no bibliography entry for ‘{}’", key))
            })?;
        Ok(format_entry(entry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use pretty_assertions::assert_eq;

    const KNUTH: &str = r#"
@article{knuth1984,
    author = {Donald E. Knuth},
    title = {Literate {P}rogramming},
    journal = {The Computer Journal},
    year = 1984,
    volume = {27},
    number = {2},
    pages = {97--111}
}
"#;

    #[test]
    fn test_parse_simple_entry() {
        let entries = parse_bibtex(KNUTH).unwrap();
        assert_eq!(entries.len(), 1);

        let entry = &entries["knuth1984"];
        assert_eq!(entry.entry_type, "article");
        assert_eq!(entry.title.as_deref(), Some("Literate Programming"));
        assert_eq!(entry.authors, vec!["Donald E. Knuth"]);
        assert_eq!(entry.year.as_deref(), Some("1984"));
        assert_eq!(entry.pages.as_deref(), Some("97--111"));
    }

    #[test]
    fn test_skips_comments_and_broken_entries() {
        let input = r#"
% a comment line
@comment{ignored {nested} }
@article{broken
@book{dragon2006,
    author = "Alfred V. Aho and Monica S. Lam and Ravi Sethi",
    title = {Compilers},
    publisher = {Addison-Wesley},
    note = {2nd ed.},
}
"#;
        let entries = parse_bibtex(input).unwrap();
        assert_eq!(entries.len(), 1);
        let entry = &entries["dragon2006"];
        assert_eq!(entry.authors.len(), 3);
        assert_eq!(entry.extra.get("note").map(String::as_str), Some("2nd ed."));
    }

    #[test]
    fn test_format_entry() {
        let entries = parse_bibtex(KNUTH).unwrap();
        assert_eq!(
            format_entry(&entries["knuth1984"]),
            "Donald E. Knuth (1984). \\emph{Literate Programming}. The Computer Journal, 27(2), 97--111."
        );
    }

    #[test]
    fn test_format_escapes_specials() {
        let entry = BibEntry {
            key: "k".into(),
            authors: vec!["A".into(), "B".into(), "C".into()],
            title: Some("100% R&D".into()),
            ..BibEntry::default()
        };
        assert_eq!(format_entry(&entry), "A, B and C. \\emph{100\\% R\\&D}.");
    }

    #[test]
    fn test_provider_lookup() {
        let provider = BibtexProvider::from_bibtex(KNUTH).unwrap();
        let info = ResourceInfo::default();
        assert!(provider.full_text(Some("bib"), "knuth1984", &info).is_ok());
        assert!(matches!(
            provider.full_text(None, "missing", &info),
            Err(Error::Render(RenderError::Provider(_)))
        ));
        assert!(matches!(
            provider.full_text(Some("arxiv"), "knuth1984", &info),
            Err(Error::Render(RenderError::Provider(_)))
        ));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = BibtexProvider::from_file("/nonexistent/refs.bib").unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
