//! Line-oriented delimited text parsing.
//!
//! Each line is parsed on its own; a quoted span never continues onto the
//! next line. Malformed quoting is tolerated: an unterminated quote simply
//! runs to the end of the line.

use std::iter::Peekable;
use std::str::Chars;

pub const DEFAULT_SEPARATOR: char = ',';

const QUOTE: char = '"';

/// Split one line into trimmed fields, honouring `"` quoting and `""` escapes.
pub fn parse_line(line: &str, separator: char) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars: Peekable<Chars<'_>> = line.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == QUOTE {
            if in_quotes && chars.peek() == Some(&QUOTE) {
                current.push(QUOTE);
                chars.next();
            } else {
                in_quotes = !in_quotes;
            }
        } else if ch == separator && !in_quotes {
            fields.push(current.trim().to_string());
            current.clear();
        } else {
            current.push(ch);
        }
    }
    fields.push(current.trim().to_string());
    fields
}

/// Non-blank lines of `text` after the header line.
pub fn data_lines(text: &str) -> impl Iterator<Item = &str> {
    text.lines().filter(|line| !line.trim().is_empty()).skip(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoted_separator_stays_in_field() {
        assert_eq!(parse_line("a,\"b,c\",d", ','), vec!["a", "b,c", "d"]);
    }

    #[test]
    fn doubled_quote_is_a_literal_quote() {
        assert_eq!(parse_line("a,\"b\"\"c\",d", ','), vec!["a", "b\"c", "d"]);
    }

    #[test]
    fn fields_are_trimmed_and_trailing_field_emitted() {
        assert_eq!(parse_line("  a , b ,c  ", ','), vec!["a", "b", "c"]);
        assert_eq!(parse_line("a,b,", ','), vec!["a", "b", ""]);
        assert_eq!(parse_line("", ','), vec![""]);
    }

    #[test]
    fn unterminated_quote_runs_to_end_of_line() {
        assert_eq!(parse_line("a,\"b,c", ','), vec!["a", "b,c"]);
    }

    #[test]
    fn custom_separator() {
        assert_eq!(parse_line("x;\"y;z\";w", ';'), vec!["x", "y;z", "w"]);
    }

    #[test]
    fn carriage_returns_are_trimmed() {
        assert_eq!(parse_line("a,b\r", ','), vec!["a", "b"]);
    }

    #[test]
    fn data_lines_skip_header_and_blanks() {
        let text = "\nh1,h2\r\n1,2\n\n  \n3,4\n";
        let rows: Vec<_> = data_lines(text).collect();
        assert_eq!(rows, vec!["1,2", "3,4"]);
    }
}
