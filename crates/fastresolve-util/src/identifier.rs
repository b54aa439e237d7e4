//! Request identifier parsing.
//!
//! A request string is `path[?query][#fragment]`. A leading `#` belongs to the
//! path (package imports), and `\0` escapes the following character so paths
//! may contain literal `?` or `#`.

/// A request split into its path, query and fragment parts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identifier {
    /// Unescaped path part.
    pub request: String,
    /// Query including the leading `?`, or empty.
    pub query: String,
    /// Fragment including the leading `#`, or empty.
    pub fragment: String,
}

/// Parse a request identifier.
///
/// Returns `None` when the identifier contains a dangling `\0` escape.
#[must_use]
pub fn parse_identifier(identifier: &str) -> Option<Identifier> {
    let mut chars = identifier.chars().peekable();
    let mut parsed = Identifier::default();

    if chars.peek() == Some(&'#') {
        parsed.request.push('#');
        chars.next();
    }

    while let Some(&c) = chars.peek() {
        match c {
            '?' | '#' => break,
            '\0' => {
                chars.next();
                parsed.request.push(chars.next()?);
            }
            _ => {
                parsed.request.push(c);
                chars.next();
            }
        }
    }

    if chars.peek() == Some(&'?') {
        while let Some(&c) = chars.peek() {
            match c {
                '#' => break,
                '\0' => {
                    chars.next();
                    parsed.query.push(chars.next()?);
                }
                _ => {
                    parsed.query.push(c);
                    chars.next();
                }
            }
        }
    }

    parsed.fragment = chars.collect();
    Some(parsed)
}

/// Escape `#` so a resolved path survives a later [`parse_identifier`].
#[must_use]
pub fn escape_hash(s: &str) -> String {
    s.replace('#', "\0#")
}
