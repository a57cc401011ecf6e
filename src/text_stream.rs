use std::fmt;

use thiserror::Error;

#[derive(Debug, Error)]
#[error("{position}: {message}")]
pub struct ParseError {
    pub position: Position,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub offset: usize,
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{0}:{1}", self.line, self.column)
    }
}

/// Character cursor over a source text, tracking line and column.
///
/// Parsers save a position with `tell` and rewind with `seek` when a
/// speculative parse does not pan out.
pub struct TextStream {
    data: Vec<char>,
    offset: usize,
    line: usize,
    column: usize,
}

impl TextStream {
    pub fn new(data: &str) -> Self {
        let data = data.replace("\r\n", "\n").replace('\r', "\n");
        Self {
            data: data.chars().collect(),
            offset: 0,
            line: 1,
            column: 1,
        }
    }

    /// Character `skip` places ahead, or `'\0'` past the end.
    pub fn peek(&self, skip: usize) -> char {
        if !self.has(skip) {
            return '\0';
        }
        self.data[self.offset + skip]
    }

    pub fn has(&self, skip: usize) -> bool {
        self.offset + skip < self.data.len()
    }

    pub fn next(&mut self) -> Result<char, ParseError> {
        if !self.has(0) {
            return Err(self.error("attempted to read past the end of the stream"));
        }
        let value = self.data[self.offset];
        self.offset += 1;
        if value == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Ok(value)
    }

    pub fn skip(&mut self, count: usize) {
        for _ in 0..count {
            if self.next().is_err() {
                break;
            }
        }
    }

    pub fn tell(&self) -> Position {
        Position {
            offset: self.offset,
            line: self.line,
            column: self.column,
        }
    }

    pub fn seek(&mut self, position: Position) {
        self.offset = position.offset;
        self.line = position.line;
        self.column = position.column;
    }

    pub fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError {
            position: self.tell(),
            message: message.into(),
        }
    }

    pub fn try_skip(&mut self, ch: char) -> bool {
        if self.peek(0) != ch || !self.has(0) {
            return false;
        }
        self.skip(1);
        true
    }

    pub fn try_skip_str(&mut self, s: &str) -> bool {
        let count = s.chars().count();
        if count == 0 || !self.has(count - 1) {
            return false;
        }
        for (i, ch) in s.chars().enumerate() {
            if self.peek(i) != ch {
                return false;
            }
        }
        self.skip(count);
        true
    }

    /// Skips any run of whitespace (including newlines) and comments.
    pub fn skip_space_comments(&mut self) -> Result<bool, ParseError> {
        let mut consumed = false;
        loop {
            consumed |= self.skip_space();
            if !self.skip_comment()? {
                break;
            }
            consumed = true;
        }
        Ok(consumed)
    }

    /// Skips horizontal whitespace and comments, stopping at newlines.
    pub fn skip_hspace_comments(&mut self) -> Result<bool, ParseError> {
        let mut consumed = false;
        loop {
            consumed |= self.skip_hspace();
            if !self.skip_comment()? {
                break;
            }
            consumed = true;
        }
        Ok(consumed)
    }

    fn skip_comment(&mut self) -> Result<bool, ParseError> {
        let start = self.tell();
        if self.try_skip_str("/*") {
            loop {
                if !self.has(0) {
                    self.seek(start);
                    return Err(self.error("unterminated multiline comment"));
                }
                if self.try_skip_str("*/") {
                    break;
                }
                self.skip(1);
            }
        } else if self.try_skip_str("//") {
            while self.has(0) && self.peek(0) != '\n' {
                self.skip(1);
            }
        } else {
            return Ok(false);
        }
        Ok(true)
    }

    fn skip_space(&mut self) -> bool {
        let mut consumed = false;
        while is_space(self.peek(0)) {
            self.skip(1);
            consumed = true;
        }
        consumed
    }

    fn skip_hspace(&mut self) -> bool {
        let mut consumed = false;
        while is_hspace(self.peek(0)) {
            self.skip(1);
            consumed = true;
        }
        consumed
    }
}

pub fn is_hspace(ch: char) -> bool {
    ch == '\t' || ch == ' '
}

pub fn is_space(ch: char) -> bool {
    is_hspace(ch) || ch == '\n'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positions() {
        let mut stream = TextStream::new("ab\ncd");
        assert_eq!(stream.tell().line, 1);
        stream.skip(3);
        let pos = stream.tell();
        assert_eq!((pos.line, pos.column), (2, 1));
        assert_eq!(stream.next().unwrap(), 'c');

        stream.seek(pos);
        assert_eq!(stream.peek(0), 'c');
    }

    #[test]
    fn test_newline_normalization() {
        let mut stream = TextStream::new("a\r\nb\rc");
        assert_eq!(stream.next().unwrap(), 'a');
        assert_eq!(stream.next().unwrap(), '\n');
        assert_eq!(stream.next().unwrap(), 'b');
        assert_eq!(stream.next().unwrap(), '\n');
        assert_eq!(stream.next().unwrap(), 'c');
    }

    #[test]
    fn test_skip_comments() {
        let mut stream = TextStream::new("  // line\n\t/* block\n */ x");
        stream.skip_space_comments().unwrap();
        assert_eq!(stream.peek(0), 'x');

        let mut stream = TextStream::new("/* open");
        assert!(stream.skip_space_comments().is_err());
    }

    #[test]
    fn test_hspace_stops_at_newline() {
        let mut stream = TextStream::new(" \t\nx");
        stream.skip_hspace_comments().unwrap();
        assert_eq!(stream.peek(0), '\n');
    }
}
