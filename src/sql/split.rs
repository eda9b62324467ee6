//! Splitting SQL text into statements.
//!
//! Semicolons inside string literals, quoted identifiers and comments do not
//! end a statement. Comments are dropped from the output.

#[derive(Clone, Copy, PartialEq)]
enum State {
    Normal,
    SingleQuote,
    DoubleQuote,
    LineComment,
    BlockComment,
}

struct Splitter {
    state: State,
    current: String,
    statements: Vec<String>,
}

impl Splitter {
    fn run(sql: &str) -> Self {
        let mut s = Splitter {
            state: State::Normal,
            current: String::new(),
            statements: Vec::new(),
        };
        let mut chars = sql.chars().peekable();
        while let Some(c) = chars.next() {
            match s.state {
                State::Normal => match c {
                    '\'' => {
                        s.state = State::SingleQuote;
                        s.current.push(c);
                    }
                    '"' => {
                        s.state = State::DoubleQuote;
                        s.current.push(c);
                    }
                    '-' if chars.peek() == Some(&'-') => {
                        chars.next();
                        s.state = State::LineComment;
                    }
                    '/' if chars.peek() == Some(&'*') => {
                        chars.next();
                        s.state = State::BlockComment;
                        s.current.push(' ');
                    }
                    ';' => s.finish(),
                    _ => s.current.push(c),
                },
                // a doubled quote re-enters the literal on the next char
                State::SingleQuote => {
                    s.current.push(c);
                    if c == '\'' {
                        s.state = State::Normal;
                    }
                }
                State::DoubleQuote => {
                    s.current.push(c);
                    if c == '"' {
                        s.state = State::Normal;
                    }
                }
                State::LineComment => {
                    if c == '\n' {
                        s.state = State::Normal;
                        s.current.push('\n');
                    }
                }
                State::BlockComment => {
                    if c == '*' && chars.peek() == Some(&'/') {
                        chars.next();
                        s.state = State::Normal;
                    }
                }
            }
        }
        s
    }

    fn finish(&mut self) {
        let stmt = self.current.trim();
        if !stmt.is_empty() {
            self.statements.push(stmt.to_string());
        }
        self.current.clear();
    }
}

/// Split a batch into statements, without their terminating semicolons.
/// A trailing statement without a semicolon is included.
pub fn split_statements(sql: &str) -> Vec<String> {
    let mut s = Splitter::run(sql);
    s.finish();
    s.statements
}

/// True if the text ends with a terminated statement (or is only whitespace
/// and comments), so a line-oriented shell can stop reading.
pub fn is_complete(sql: &str) -> bool {
    let s = Splitter::run(sql);
    s.state != State::SingleQuote
        && s.state != State::DoubleQuote
        && s.state != State::BlockComment
        && s.current.trim().is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_simple() {
        let stmts = split_statements("SELECT 1; SELECT 2; SELECT 3;");
        assert_eq!(stmts, vec!["SELECT 1", "SELECT 2", "SELECT 3"]);
    }

    #[test]
    fn test_split_with_comments() {
        let sql = "-- Comment\nSELECT 1; -- inline; comment\nSELECT /* ; */ 2;";
        let stmts = split_statements(sql);
        assert_eq!(stmts.len(), 2);
        assert_eq!(stmts[0], "SELECT 1");
        assert!(stmts[1].starts_with("SELECT"));
        assert!(stmts[1].ends_with('2'));
    }

    #[test]
    fn test_split_with_strings() {
        let sql = "INSERT INTO t VALUES ('a;b'); INSERT INTO t VALUES ('it''s;'); SELECT \"x;y\" FROM t";
        let stmts = split_statements(sql);
        assert_eq!(
            stmts,
            vec![
                "INSERT INTO t VALUES ('a;b')",
                "INSERT INTO t VALUES ('it''s;')",
                "SELECT \"x;y\" FROM t",
            ]
        );
    }

    #[test]
    fn test_is_complete() {
        assert!(is_complete("SELECT 1;"));
        assert!(is_complete("  -- nothing\n"));
        assert!(!is_complete("SELECT 1"));
        assert!(!is_complete("SELECT ';"));
        assert!(is_complete("SELECT ';';"));
    }
}
