// Rune cursor with committed-region tracking: the parser's only view of the
// source text.
//
// The scanner keeps two offsets into the source: `start`, the beginning of
// the region accumulated since the last commit/ignore, and `pos`, the read
// cursor. `commit` hands the region to the caller and advances `start`;
// `ignore` discards it. All offsets are byte offsets; the indentation
// arithmetic callers perform on them only ever spans ASCII space/tab runs.

pub struct Scanner<'a> {
    src: &'a str,
    start: usize,
    pos: usize,
    last_width: usize,
}

impl<'a> Scanner<'a> {
    pub fn new(src: &'a str) -> Self {
        Scanner {
            src,
            start: 0,
            pos: 0,
            last_width: 0,
        }
    }

    /// Consume and return the next rune, or `None` at end of input.
    pub fn next(&mut self) -> Option<char> {
        let c = self.src[self.pos..].chars().next()?;
        self.last_width = c.len_utf8();
        self.pos += self.last_width;
        Some(c)
    }

    /// Look at the next rune without consuming it.
    pub fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    /// Step back over the rune returned by the last `next`. Only one step of
    /// backup is supported between reads.
    pub fn backup(&mut self) {
        self.pos -= self.last_width;
        self.last_width = 0;
    }

    /// Return the accumulated region and start a new one at the cursor.
    pub fn commit(&mut self) -> &'a str {
        let text = &self.src[self.start..self.pos];
        self.start = self.pos;
        text
    }

    /// Discard the accumulated region.
    pub fn ignore(&mut self) {
        self.start = self.pos;
    }

    /// Consume the next rune if it equals `c`.
    pub fn accept(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.next();
            return true;
        }
        false
    }

    /// Consume a run of runes drawn from `set`, returning how many were
    /// consumed.
    pub fn accept_run(&mut self, set: &str) -> usize {
        let mut count = 0;
        while let Some(c) = self.peek() {
            if !set.contains(c) {
                break;
            }
            self.next();
            count += 1;
        }
        count
    }

    /// Check whether the input at the cursor starts with `s`, without
    /// consuming anything.
    pub fn starts_with(&self, s: &str) -> bool {
        self.src[self.pos..].starts_with(s)
    }

    /// The unread remainder of the input.
    pub fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    /// Consume `s` if the input starts with it. The match stays in the
    /// uncommitted region until `commit` or `ignore`.
    pub fn prefix(&mut self, s: &str) -> bool {
        if self.starts_with(s) {
            self.pos += s.len();
            self.last_width = 0;
            return true;
        }
        false
    }

    /// Consume a line ending (`\n` or `\r\n`) and drop it from the region.
    pub fn accept_newline(&mut self) -> bool {
        if self.starts_with("\r\n") {
            self.pos += 2;
        } else if self.peek() == Some('\n') {
            self.pos += 1;
        } else {
            return false;
        }
        self.last_width = 0;
        self.ignore();
        true
    }

    /// Consume spaces and drop them from the region.
    pub fn skip_spaces(&mut self) {
        while self.peek() == Some(' ') {
            self.next();
        }
        self.ignore();
    }

    /// Consume a word: a letter or underscore followed by letters, digits,
    /// and underscores. Returns whether anything was consumed.
    pub fn scan_word(&mut self) -> bool {
        match self.peek() {
            Some(c) if c.is_alphabetic() || c == '_' => {}
            _ => return false,
        }
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                self.next();
            } else {
                break;
            }
        }
        true
    }

    /// Like `scan_word` but also accepts `-`, for tag, attribute, and class
    /// names.
    pub fn scan_html_word(&mut self) -> bool {
        match self.peek() {
            Some(c) if c.is_alphabetic() || c == '_' => {}
            _ => return false,
        }
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' || c == '-' {
                self.next();
            } else {
                break;
            }
        }
        true
    }

    /// Consume a number literal: digits with an optional fraction part.
    pub fn scan_number(&mut self) -> bool {
        match self.peek() {
            Some(c) if c.is_ascii_digit() => {}
            _ => return false,
        }
        self.accept_run("0123456789");
        if self.starts_with(".") {
            let after_dot = self.src[self.pos + 1..].chars().next();
            if matches!(after_dot, Some(c) if c.is_ascii_digit()) {
                self.next();
                self.accept_run("0123456789");
            }
        }
        true
    }

    /// Advance until a rune from `set` is consumed, returning it, or `None`
    /// when the input runs out first.
    pub fn run_to(&mut self, set: &str) -> Option<char> {
        while let Some(c) = self.next() {
            if set.contains(c) {
                return Some(c);
            }
        }
        None
    }

    pub fn is_eof(&self) -> bool {
        self.pos >= self.src.len()
    }

    pub fn is_newline(&self) -> bool {
        matches!(self.peek(), Some('\n') | Some('\r'))
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn start_position(&self) -> usize {
        self.start
    }

    pub fn set_position(&mut self, pos: usize) {
        self.pos = pos;
        self.last_width = 0;
    }

    pub fn set_start_position(&mut self, start: usize) {
        self.start = start;
    }

    /// Slide the region start forward by `n` bytes.
    pub fn move_start(&mut self, n: usize) {
        self.start += n;
    }

    /// 1-based line number at the cursor.
    pub fn line_number(&self) -> usize {
        crate::error::line_number(self.src, self.pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn smoke_test_next_peek_backup() {
        let mut s = Scanner::new("ab");
        assert_eq!(s.peek(), Some('a'));
        assert_eq!(s.next(), Some('a'));
        s.backup();
        assert_eq!(s.next(), Some('a'));
        assert_eq!(s.next(), Some('b'));
        assert_eq!(s.next(), None);
        assert!(s.is_eof());
    }

    #[test]
    fn smoke_test_commit_returns_region() {
        let mut s = Scanner::new("hello world");
        assert!(s.scan_word());
        assert_eq!(s.commit(), "hello");
        s.skip_spaces();
        assert!(s.scan_word());
        assert_eq!(s.commit(), "world");
    }

    #[test]
    fn smoke_test_prefix_stays_uncommitted() {
        let mut s = Scanner::new("!=rest");
        assert!(s.prefix("!="));
        assert_eq!(s.commit(), "!=");
        assert_eq!(s.next(), Some('r'));
    }

    #[test]
    fn smoke_test_accept_newline_handles_crlf() {
        let mut s = Scanner::new("\r\nx");
        assert!(s.accept_newline());
        assert_eq!(s.next(), Some('x'));
        let mut s = Scanner::new("x");
        assert!(!s.accept_newline());
    }

    #[test]
    fn smoke_test_scan_number_with_fraction() {
        let mut s = Scanner::new("3.25]");
        assert!(s.scan_number());
        assert_eq!(s.commit(), "3.25");
        let mut s = Scanner::new("7.concat");
        assert!(s.scan_number());
        // The dot belongs to a member chain, not the number.
        assert_eq!(s.commit(), "7");
    }

    #[test]
    fn smoke_test_html_word_accepts_dashes() {
        let mut s = Scanner::new("data-id=1");
        assert!(s.scan_html_word());
        assert_eq!(s.commit(), "data-id");
    }

    #[test]
    fn smoke_test_run_to_returns_terminator() {
        let mut s = Scanner::new("abc:rest");
        assert_eq!(s.run_to(":\n"), Some(':'));
        assert_eq!(s.commit(), "abc:");
        let mut s = Scanner::new("abc");
        assert_eq!(s.run_to(":\n"), None);
    }

    #[test]
    fn smoke_test_line_number_tracks_newlines() {
        let mut s = Scanner::new("a\nb\nc");
        assert_eq!(s.line_number(), 1);
        s.next();
        s.accept_newline();
        s.next();
        assert_eq!(s.line_number(), 2);
    }
}
