//! Minimal CSV reader and writer for data files.
//!
//! The writer quotes a field when it is empty or holds the delimiter, the
//! quote, CR or LF, and writes SQL NULL as an empty unquoted field. The reader
//! keeps the quoted flag per field so the two cases stay apart on the way back.

use std::io::{self, BufRead, Write};

pub const QUOTE: char = '"';

/// Append one field to `out`. `None` is NULL.
pub fn push_field(out: &mut String, field: Option<&str>, delimiter: char) {
    let Some(text) = field else {
        return;
    };
    let needs_quotes = text.is_empty()
        || text
            .chars()
            .any(|c| c == delimiter || c == QUOTE || c == '\r' || c == '\n');
    if needs_quotes {
        out.push(QUOTE);
        for c in text.chars() {
            if c == QUOTE {
                out.push(QUOTE);
            }
            out.push(c);
        }
        out.push(QUOTE);
    } else {
        out.push_str(text);
    }
}

/// One record, `\n` terminated.
pub fn format_record<'a, I>(fields: I, delimiter: char) -> String
where
    I: IntoIterator<Item = Option<&'a str>>,
{
    let mut out = String::new();
    for (i, field) in fields.into_iter().enumerate() {
        if i > 0 {
            out.push(delimiter);
        }
        push_field(&mut out, field, delimiter);
    }
    out.push('\n');
    out
}

/// Record-at-a-time writer over any `Write`.
pub struct CsvWriter<W: Write> {
    inner: W,
    delimiter: char,
    line: String,
}

impl<W: Write> CsvWriter<W> {
    pub fn new(inner: W, delimiter: char) -> Self {
        Self {
            inner,
            delimiter,
            line: String::new(),
        }
    }

    pub fn write_record<'a, I>(&mut self, fields: I) -> io::Result<()>
    where
        I: IntoIterator<Item = Option<&'a str>>,
    {
        self.line.clear();
        for (i, field) in fields.into_iter().enumerate() {
            if i > 0 {
                self.line.push(self.delimiter);
            }
            push_field(&mut self.line, field, self.delimiter);
        }
        self.line.push('\n');
        self.inner.write_all(self.line.as_bytes())
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CsvField {
    pub text: String,
    /// The field was written in quotes, so it is text even when empty.
    pub quoted: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CsvRecord {
    /// Line the record starts on, counting from 1.
    pub line: u64,
    pub fields: Vec<CsvField>,
}

#[derive(Debug)]
pub enum CsvError {
    Io(io::Error),
    Malformed { line: u64, reason: String },
}

impl From<io::Error> for CsvError {
    fn from(e: io::Error) -> Self {
        CsvError::Io(e)
    }
}

/// Streaming reader; holds at most one record in memory.
pub struct CsvReader<R: BufRead> {
    inner: R,
    delimiter: char,
    line: u64,
    buf: String,
}

impl<R: BufRead> CsvReader<R> {
    pub fn new(inner: R, delimiter: char) -> Self {
        Self {
            inner,
            delimiter,
            line: 0,
            buf: String::new(),
        }
    }

    pub fn next_record(&mut self) -> Result<Option<CsvRecord>, CsvError> {
        self.buf.clear();
        if self.inner.read_line(&mut self.buf)? == 0 {
            return Ok(None);
        }
        self.line += 1;
        let start = self.line;

        let mut fields = Vec::new();
        let mut field = String::new();
        let mut quoted = false;
        let mut in_quotes = false;
        let mut closed = false;

        loop {
            let mut chars = self.buf.chars().peekable();
            while let Some(c) = chars.next() {
                if in_quotes {
                    if c == QUOTE {
                        if chars.peek() == Some(&QUOTE) {
                            chars.next();
                            field.push(QUOTE);
                        } else {
                            in_quotes = false;
                            closed = true;
                        }
                    } else {
                        field.push(c);
                    }
                    continue;
                }
                match c {
                    '\n' => break,
                    '\r' if matches!(chars.peek(), Some('\n') | None) => {}
                    c if c == self.delimiter => {
                        fields.push(CsvField {
                            text: std::mem::take(&mut field),
                            quoted,
                        });
                        quoted = false;
                        closed = false;
                    }
                    c if closed => {
                        return Err(CsvError::Malformed {
                            line: self.line,
                            reason: format!("unexpected {:?} after closing quote", c),
                        })
                    }
                    QUOTE if field.is_empty() && !quoted => {
                        quoted = true;
                        in_quotes = true;
                    }
                    c => field.push(c),
                }
            }
            if !in_quotes {
                break;
            }
            self.buf.clear();
            if self.inner.read_line(&mut self.buf)? == 0 {
                return Err(CsvError::Malformed {
                    line: start,
                    reason: "unterminated quoted field".into(),
                });
            }
            self.line += 1;
        }

        fields.push(CsvField { text: field, quoted });
        Ok(Some(CsvRecord { line: start, fields }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn read_all(text: &str, delimiter: char) -> Vec<CsvRecord> {
        let mut reader = CsvReader::new(Cursor::new(text.as_bytes()), delimiter);
        let mut out = Vec::new();
        while let Some(record) = reader.next_record().unwrap() {
            out.push(record);
        }
        out
    }

    #[test]
    fn test_writer_quoting() {
        let line = format_record(
            [Some("plain"), None, Some(""), Some("a,b"), Some("say \"hi\""), Some("x\ny")],
            ',',
        );
        assert_eq!(line, "plain,,\"\",\"a,b\",\"say \"\"hi\"\"\",\"x\ny\"\n");
        assert_eq!(format_record([Some("a,b")], '|'), "a,b\n");
    }

    #[test]
    fn test_reader_roundtrip() {
        let fields = [Some("plain"), None, Some(""), Some("a,b"), Some("q\"q"), Some("x\r\ny")];
        let mut writer = CsvWriter::new(Vec::new(), ',');
        writer.write_record(fields).unwrap();
        writer.write_record([Some("second"), None, None, None, None, None]).unwrap();
        let text = String::from_utf8(writer.into_inner()).unwrap();

        let records = read_all(&text, ',');
        assert_eq!(records.len(), 2);
        let first: Vec<Option<&str>> = records[0]
            .fields
            .iter()
            .map(|f| (f.quoted || !f.text.is_empty()).then_some(f.text.as_str()))
            .collect();
        assert_eq!(first, fields.to_vec());
        // the quoted newline keeps the second record on line 3
        assert_eq!(records[1].line, 3);
    }

    #[test]
    fn test_reader_crlf_and_blank_lines() {
        let records = read_all("a,b\r\n\nc,d", ',');
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].fields[1].text, "b");
        assert_eq!(records[1].fields, vec![CsvField { text: String::new(), quoted: false }]);
        assert_eq!(records[2].fields[1].text, "d");
    }

    #[test]
    fn test_reader_errors() {
        let mut reader = CsvReader::new(Cursor::new(&b"ok\n\"open,\nstill open"[..]), ',');
        assert!(reader.next_record().unwrap().is_some());
        match reader.next_record() {
            Err(CsvError::Malformed { line, reason }) => {
                assert_eq!(line, 2);
                assert!(reason.contains("unterminated"));
            }
            other => panic!("unexpected {:?}", other),
        }

        let mut reader = CsvReader::new(Cursor::new(&b"\"a\"b\n"[..]), ',');
        assert!(matches!(reader.next_record(), Err(CsvError::Malformed { line: 1, .. })));
    }
}
