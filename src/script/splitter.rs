//! Statement splitter.
//!
//! A forward scan over the script text with an explicit position. Quoted
//! regions and comments hide the terminator; `DELIMITER <token>` at the
//! start of a statement switches it.

use nom::{
    IResult,
    bytes::complete::{tag_no_case, take_till1},
    character::complete::space1,
    sequence::{pair, preceded},
};

use crate::dialect::ScanRules;

/// One statement cut from a script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement<'s> {
    /// Trimmed text without the terminator.
    pub sql: &'s str,
    /// Terminator that ended it; empty for a trailing statement without one.
    pub terminator: String,
    /// Byte offset of `sql` in the script.
    pub offset: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Region {
    Quote { close: char, backslash: bool },
    LineComment,
    BlockComment,
    Bracket,
    Dollar(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum State {
    Normal,
    DelimiterDirective,
    InQuotedRegion(Region),
    StatementBoundary { end: usize, terminated: bool },
}

/// `DELIMITER <token>`; returns the token.
fn delimiter_directive(input: &str) -> IResult<&str, &str> {
    preceded(
        pair(tag_no_case("DELIMITER"), space1),
        take_till1(|c: char| c.is_whitespace()),
    )(input)
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

fn dash_comment(rest: &str, rules: &ScanRules) -> bool {
    let Some(after) = rest.strip_prefix("--") else {
        return false;
    };
    !rules.dash_comment_needs_space || after.chars().next().is_none_or(char::is_whitespace)
}

/// `$tag$` opening a dollar-quoted string.
fn dollar_tag(rest: &str) -> Option<&str> {
    let body = rest.strip_prefix('$')?;
    let len = body
        .char_indices()
        .take_while(|&(i, c)| c.is_alphabetic() || c == '_' || (i > 0 && c.is_ascii_digit()))
        .map(|(i, c)| i + c.len_utf8())
        .last()
        .unwrap_or(0);
    body[len..].starts_with('$').then(|| &rest[..len + 2])
}

/// Skip whitespace and comments. MySQL `/*! ... */` runs as code, so it stays.
fn skip_blank(text: &str, mut pos: usize, rules: &ScanRules) -> usize {
    loop {
        let rest = &text[pos..];
        let trimmed = rest.trim_start();
        pos += rest.len() - trimmed.len();
        if trimmed.starts_with("/*") && !trimmed.starts_with("/*!") {
            pos = match trimmed[2..].find("*/") {
                Some(i) => pos + 2 + i + 2,
                None => text.len(),
            };
        } else if dash_comment(trimmed, rules) || (rules.hash_comments && trimmed.starts_with('#')) {
            pos = match trimmed.find('\n') {
                Some(i) => pos + i + 1,
                None => text.len(),
            };
        } else {
            return pos;
        }
    }
}

/// Iterator over the statements of a script.
///
/// ```
/// use dbdeck::dialect::Backend;
/// use dbdeck::script::Splitter;
///
/// let rules = Backend::MySql.dialect().scan_rules(true);
/// let sql: Vec<_> = Splitter::new("SELECT 1; SELECT ';'", rules).map(|s| s.sql).collect();
/// assert_eq!(sql, ["SELECT 1", "SELECT ';'"]);
/// ```
pub struct Splitter<'s> {
    text: &'s str,
    rules: ScanRules,
    terminator: String,
    start: usize,
    pos: usize,
}

impl<'s> Splitter<'s> {
    pub fn new(text: &'s str, rules: ScanRules) -> Self {
        Self {
            text,
            rules,
            terminator: ";".to_string(),
            start: 0,
            pos: 0,
        }
    }

    /// Terminator in effect at the current position.
    pub fn terminator(&self) -> &str {
        &self.terminator
    }

    /// Position on the next statement's first token; `None` at the end.
    fn begin_statement(&mut self) -> Option<State> {
        self.pos = skip_blank(self.text, self.pos, &self.rules);
        self.start = self.pos;
        if self.pos >= self.text.len() {
            return None;
        }
        if delimiter_directive(&self.text[self.pos..]).is_ok() {
            Some(State::DelimiterDirective)
        } else {
            Some(State::Normal)
        }
    }

    fn consume_directive(&mut self) {
        let rest = &self.text[self.pos..];
        if let Ok((_, token)) = delimiter_directive(rest) {
            tracing::debug!(terminator = %token, "delimiter");
            self.terminator = token.to_string();
        }
        self.pos = match rest.find('\n') {
            Some(i) => self.pos + i + 1,
            None => self.text.len(),
        };
    }

    fn opener(&self, rest: &str) -> Option<(Region, usize)> {
        let rules = &self.rules;
        let after_word = self.text[..self.pos].chars().next_back().is_some_and(is_word_char);
        let c = rest.chars().next()?;
        let region = match c {
            '\'' | '"' => (
                Region::Quote {
                    close: c,
                    backslash: rules.backslash_escapes,
                },
                1,
            ),
            '`' if rules.backticks => (
                Region::Quote {
                    close: '`',
                    backslash: false,
                },
                1,
            ),
            '[' if rules.brackets => (Region::Bracket, 1),
            '#' if rules.hash_comments => (Region::LineComment, 1),
            '/' if rest.starts_with("/*") => (Region::BlockComment, 2),
            '-' if dash_comment(rest, rules) => (Region::LineComment, 2),
            'E' | 'e' if rules.e_strings && !after_word && rest[1..].starts_with('\'') => (
                Region::Quote {
                    close: '\'',
                    backslash: true,
                },
                2,
            ),
            '$' if rules.dollar_quotes && !after_word => {
                let tag = dollar_tag(rest)?;
                (Region::Dollar(tag.to_string()), tag.len())
            }
            _ => return None,
        };
        Some(region)
    }

    fn scan_normal(&mut self) -> State {
        while self.pos < self.text.len() {
            let rest = &self.text[self.pos..];
            if let Some((region, len)) = self.opener(rest) {
                self.pos += len;
                return State::InQuotedRegion(region);
            }
            if rest.starts_with(self.terminator.as_str()) {
                let end = self.pos;
                self.pos += self.terminator.len();
                return State::StatementBoundary { end, terminated: true };
            }
            self.pos += rest.chars().next().map_or(1, char::len_utf8);
        }
        State::StatementBoundary {
            end: self.text.len(),
            terminated: false,
        }
    }

    /// Move past the region's closing token; an unclosed region runs to the end.
    fn scan_region(&mut self, region: Region) -> State {
        let rest = &self.text[self.pos..];
        let closed_at = match region {
            Region::Quote { close, backslash } => {
                let mut chars = rest.char_indices().peekable();
                let mut found = None;
                while let Some((i, c)) = chars.next() {
                    if backslash && c == '\\' {
                        chars.next();
                    } else if c == close {
                        // A doubled quote closes and reopens the region.
                        if chars.peek().is_some_and(|&(_, n)| n == close) {
                            chars.next();
                        } else {
                            found = Some(i + c.len_utf8());
                            break;
                        }
                    }
                }
                found
            }
            Region::Bracket => {
                let mut chars = rest.char_indices().peekable();
                let mut found = None;
                while let Some((i, c)) = chars.next() {
                    if c == ']' {
                        if chars.peek().is_some_and(|&(_, n)| n == ']') {
                            chars.next();
                        } else {
                            found = Some(i + 1);
                            break;
                        }
                    }
                }
                found
            }
            Region::LineComment => rest.find('\n').map(|i| i + 1),
            Region::BlockComment => rest.find("*/").map(|i| i + 2),
            Region::Dollar(tag) => rest.find(tag.as_str()).map(|i| i + tag.len()),
        };
        self.pos = closed_at.map_or(self.text.len(), |n| self.pos + n);
        State::Normal
    }
}

impl<'s> Iterator for Splitter<'s> {
    type Item = Statement<'s>;

    fn next(&mut self) -> Option<Statement<'s>> {
        let mut state = self.begin_statement()?;
        loop {
            state = match state {
                State::Normal => self.scan_normal(),
                State::DelimiterDirective => {
                    self.consume_directive();
                    self.begin_statement()?
                }
                State::InQuotedRegion(region) => self.scan_region(region),
                State::StatementBoundary { end, terminated } => {
                    let text = self.text;
                    let sql = text[self.start..end].trim_end();
                    if sql.is_empty() {
                        self.begin_statement()?
                    } else {
                        return Some(Statement {
                            sql,
                            terminator: if terminated { self.terminator.clone() } else { String::new() },
                            offset: self.start,
                        });
                    }
                }
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::Backend;
    use pretty_assertions::assert_eq;

    fn split(backend: Backend, text: &str) -> Vec<String> {
        let rules = backend.dialect().scan_rules(backend == Backend::MySql);
        Splitter::new(text, rules).map(|s| s.sql.to_string()).collect()
    }

    #[test]
    fn test_comment_hides_terminator() {
        assert_eq!(
            split(Backend::MySql, "SELECT 1; -- comment with ; inside\nSELECT 2;"),
            vec!["SELECT 1", "SELECT 2"]
        );
    }

    #[test]
    fn test_delimiter_directive() {
        let rules = Backend::MySql.dialect().scan_rules(true);
        let statements: Vec<_> = Splitter::new("DELIMITER $$\nSELECT 1$$\nDELIMITER ;\nSELECT 2;", rules)
            .map(|s| (s.sql, s.terminator))
            .collect();
        assert_eq!(statements, vec![("SELECT 1", "$$".to_string()), ("SELECT 2", ";".to_string())]);
    }

    #[test]
    fn test_delimiter_only_at_statement_start() {
        assert_eq!(
            split(Backend::MySql, "SELECT 'DELIMITER $$' AS x; SELECT 2"),
            vec!["SELECT 'DELIMITER $$' AS x", "SELECT 2"]
        );
    }

    #[test]
    fn test_quotes_and_escapes() {
        assert_eq!(
            split(Backend::MySql, "INSERT INTO t VALUES ('a;b', 'it''s', 'x\\';y');SELECT 2"),
            vec!["INSERT INTO t VALUES ('a;b', 'it''s', 'x\\';y')", "SELECT 2"]
        );
        assert_eq!(split(Backend::MySql, "SELECT `a;b` FROM t # ;\n;"), vec!["SELECT `a;b` FROM t # ;"]);
    }

    #[test]
    fn test_postgres_strings() {
        assert_eq!(
            split(
                Backend::Postgres,
                "CREATE FUNCTION f() RETURNS int AS $body$ SELECT 1; $body$ LANGUAGE sql; SELECT 2;"
            ),
            vec!["CREATE FUNCTION f() RETURNS int AS $body$ SELECT 1; $body$ LANGUAGE sql", "SELECT 2"]
        );
        assert_eq!(split(Backend::Postgres, "SELECT 'c\\'; SELECT 3;"), vec!["SELECT 'c\\'", "SELECT 3"]);
        assert_eq!(split(Backend::Postgres, "SELECT E'a\\';b'; SELECT 4"), vec!["SELECT E'a\\';b'", "SELECT 4"]);
    }

    #[test]
    fn test_brackets() {
        assert_eq!(split(Backend::MsSql, "SELECT [a;]]b] FROM t; SELECT 1"), vec!["SELECT [a;]]b] FROM t", "SELECT 1"]);
    }

    #[test]
    fn test_blank_statements_skipped() {
        assert_eq!(split(Backend::Sqlite, ";;  -- only a comment\n; /* and this */ ;"), Vec::<String>::new());
    }

    #[test]
    fn test_versioned_comment_is_a_statement() {
        assert_eq!(
            split(Backend::MySql, "/*!40101 SET NAMES utf8 */;\nSELECT 1"),
            vec!["/*!40101 SET NAMES utf8 */", "SELECT 1"]
        );
    }

    #[test]
    fn test_offsets_and_trailing_terminator() {
        let rules = Backend::Sqlite.dialect().scan_rules(false);
        let statements: Vec<_> = Splitter::new("  SELECT 1;\n SELECT 2", rules).collect();
        assert_eq!(statements[0].offset, 2);
        assert_eq!(statements[1].offset, 13);
        assert_eq!(statements[1].terminator, "");
    }

    #[test]
    fn test_dollar_tag() {
        assert_eq!(dollar_tag("$$ x"), Some("$$"));
        assert_eq!(dollar_tag("$fn_1$ x"), Some("$fn_1$"));
        assert_eq!(dollar_tag("$1 + 2"), None);
    }
}
