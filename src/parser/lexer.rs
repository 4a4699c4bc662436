//! Token-level recognizers for LaTeX-like source.

use nom::{
    bytes::complete::{tag, take_until, take_while1},
    character::complete::{anychar, char, line_ending, multispace0, not_line_ending, space0},
    combinator::{opt, recognize},
    sequence::{delimited, preceded, tuple},
    IResult,
};

/// A blank line (two line endings with only spaces between), together with
/// any further blank lines and leading indentation.
pub fn blank_line(input: &str) -> IResult<&str, &str> {
    recognize(tuple((line_ending, space0, line_ending, multispace0)))(input)
}

/// A `%` comment up to and including the end of line.
pub fn comment(input: &str) -> IResult<&str, &str> {
    let (input, text) = preceded(char('%'), not_line_ending)(input)?;
    let (input, _) = opt(line_ending)(input)?;
    Ok((input, text))
}

/// A control sequence name: letters, or a single non-letter character.
///
/// Spaces after a letter name are swallowed, as in TeX.
pub fn macro_name(input: &str) -> IResult<&str, &str> {
    let (rest, _) = char('\\')(input)?;
    let letters =
        take_while1::<_, _, nom::error::Error<&str>>(|c: char| c.is_ascii_alphabetic());
    if let Ok((rest, name)) = letters(rest) {
        let (rest, _) = space0(rest)?;
        return Ok((rest, name));
    }
    let (after, c) = anychar(rest)?;
    let len = c.len_utf8();
    Ok((after, &rest[..len]))
}

fn environment_name(input: &str) -> IResult<&str, &str> {
    delimited(
        char('{'),
        take_while1(|c: char| c.is_ascii_alphanumeric() || c == '*' || c == '-' || c == '_'),
        char('}'),
    )(input)
}

/// `\begin{name}`
pub fn begin_environment(input: &str) -> IResult<&str, &str> {
    preceded(tag("\\begin"), preceded(space0, environment_name))(input)
}

/// `\end{name}`
pub fn end_environment(input: &str) -> IResult<&str, &str> {
    preceded(tag("\\end"), preceded(space0, environment_name))(input)
}

/// Math opening delimiter, returning the matching closing delimiter.
pub fn math_open(input: &str) -> IResult<&str, (&str, &'static str)> {
    for (open, close) in MATH_DELIMITERS {
        if let Ok((rest, open)) = tag::<_, _, nom::error::Error<&str>>(open)(input) {
            return Ok((rest, (open, close)));
        }
    }
    Err(nom::Err::Error(nom::error::Error::new(
        input,
        nom::error::ErrorKind::Tag,
    )))
}

const MATH_DELIMITERS: [(&str, &str); 4] = [
    ("$$", "$$"),
    ("$", "$"),
    ("\\(", "\\)"),
    ("\\[", "\\]"),
];

/// Raw math source up to (not including) the closing delimiter.
pub fn math_body<'a>(input: &'a str, close: &str) -> IResult<&'a str, &'a str> {
    take_until(close)(input)
}

/// Optional whitespace before an argument: spaces and at most one line
/// ending, never a blank line.
pub fn argument_space(input: &str) -> IResult<&str, &str> {
    recognize(tuple((space0, opt(line_ending), space0)))(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_line() {
        let (rest, _) = blank_line("\n  \n\nnext").unwrap();
        assert_eq!(rest, "next");
        assert!(blank_line("\nnext").is_err());
    }

    #[test]
    fn test_macro_name() {
        assert_eq!(macro_name("\\section {x}").unwrap(), ("{x}", "section"));
        assert_eq!(macro_name("\\%rest").unwrap(), ("rest", "%"));
    }

    #[test]
    fn test_environment_delimiters() {
        assert_eq!(begin_environment("\\begin{itemize}x").unwrap(), ("x", "itemize"));
        assert_eq!(end_environment("\\end{figure*}").unwrap(), ("", "figure*"));
    }

    #[test]
    fn test_math_open() {
        assert_eq!(math_open("$$x$$").unwrap().1, ("$$", "$$"));
        assert_eq!(math_open("\\(x\\)").unwrap().1, ("\\(", "\\)"));
        assert_eq!(math_body("a+b$ rest", "$").unwrap(), ("$ rest", "a+b"));
    }

    #[test]
    fn test_comment() {
        assert_eq!(comment("% note\nnext").unwrap(), ("next", " note"));
    }
}
