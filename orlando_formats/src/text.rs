//! Tokenizer for the obfuscated text resources (`.CCG`, `.MCC`, `.PCS`, ...).
//!
//! Every byte of an obfuscated file is stored as `!(b - 7)`. The transform is
//! its own inverse, so the same function encodes and decodes. Text between a
//! pair of `/` characters is a comment; each `/` toggles comment mode.

/// Apply the resource byte transform.
#[inline]
pub fn transform(byte: u8) -> u8 {
    !byte.wrapping_sub(7)
}

/// Obfuscate plain text the way the game tools store it.
pub fn encode(plain: &[u8]) -> Vec<u8> {
    plain.iter().map(|&b| transform(b)).collect()
}

pub fn decode(raw: &[u8]) -> Vec<u8> {
    encode(raw)
}

/// Parse a decimal integer token.
pub fn parse_int(token: &str) -> Option<i32> {
    token.parse::<i32>().ok()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub text: String,
    /// 1-based line the token started on.
    pub line: u32,
}

impl Token {
    pub fn is_section(&self) -> bool {
        self.text.starts_with('[')
    }

    /// Section name without the surrounding brackets.
    pub fn section_name(&self) -> Option<&str> {
        let inner = self.text.strip_prefix('[')?;
        Some(inner.strip_suffix(']').unwrap_or(inner))
    }
}

#[derive(Debug, Clone)]
pub struct TextParser {
    data: Vec<u8>,
    pos: usize,
    line: u32,
    in_comment: bool,
    last: Option<Token>,
    pushed_back: Option<Token>,
}

impl TextParser {
    pub fn new(raw: &[u8], obfuscated: bool) -> Self {
        let data = if obfuscated {
            decode(raw)
        } else {
            raw.to_vec()
        };
        Self {
            data,
            pos: 0,
            line: 1,
            in_comment: false,
            last: None,
            pushed_back: None,
        }
    }

    pub fn from_plain(text: &str) -> Self {
        Self::new(text.as_bytes(), false)
    }

    /// Next token, honouring a pending [`rewind`](Self::rewind).
    pub fn next_token(&mut self) -> Option<Token> {
        let token = match self.pushed_back.take() {
            Some(token) => Some(token),
            None => self.scan(),
        };
        if token.is_some() {
            self.last = token.clone();
        }
        token
    }

    pub fn read_string(&mut self) -> Option<String> {
        self.next_token().map(|token| token.text)
    }

    /// Next token as an integer; 0 when missing or non-numeric.
    pub fn read_int(&mut self) -> i32 {
        self.read_string()
            .and_then(|token| parse_int(&token))
            .unwrap_or(0)
    }

    /// Next token as a float; 0.0 when missing or non-numeric.
    pub fn read_float(&mut self) -> f32 {
        self.read_string()
            .and_then(|token| token.parse::<f32>().ok())
            .unwrap_or(0.0)
    }

    pub fn eof(&mut self) -> bool {
        if self.pushed_back.is_some() {
            return false;
        }
        self.skip_separators();
        self.pos >= self.data.len()
    }

    /// Push the last token back. Only one token of rewind is kept.
    pub fn rewind(&mut self) -> bool {
        if self.pushed_back.is_some() {
            log::warn!("text parser rewind requested twice in a row");
            return false;
        }
        match self.last.take() {
            Some(token) => {
                self.pushed_back = Some(token);
                true
            }
            None => false,
        }
    }

    /// Line of the most recently returned token.
    pub fn line(&self) -> u32 {
        self.last.as_ref().map(|token| token.line).unwrap_or(1)
    }

    fn skip_separators(&mut self) {
        while let Some(&byte) = self.data.get(self.pos) {
            if byte == b'/' {
                self.in_comment = !self.in_comment;
            } else if byte == b'\n' {
                self.line += 1;
            } else if !self.in_comment && !byte.is_ascii_whitespace() {
                return;
            }
            self.pos += 1;
        }
    }

    fn scan(&mut self) -> Option<Token> {
        self.skip_separators();
        if self.pos >= self.data.len() {
            return None;
        }

        let line = self.line;
        let mut text = String::new();
        while let Some(&byte) = self.data.get(self.pos) {
            if byte.is_ascii_whitespace() || byte == b'/' {
                break;
            }
            text.push(char::from(byte));
            self.pos += 1;
        }
        Some(Token { text, line })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transform_is_an_involution() {
        for byte in 0..=255u8 {
            assert_eq!(transform(transform(byte)), byte);
        }
        assert_eq!(decode(&encode(b"LET X 0\n")), b"LET X 0\n");
    }

    #[test]
    fn tokens_skip_comments_and_track_lines() {
        let mut parser = TextParser::from_plain("[INIT] /a comment/ LET X 5\n  INC/inline/X\n");
        let header = parser.next_token().unwrap();
        assert!(header.is_section());
        assert_eq!(header.section_name(), Some("INIT"));
        assert_eq!(parser.read_string().as_deref(), Some("LET"));
        assert_eq!(parser.read_string().as_deref(), Some("X"));
        assert_eq!(parser.read_int(), 5);
        let inc = parser.next_token().unwrap();
        assert_eq!((inc.text.as_str(), inc.line), ("INC", 2));
        assert_eq!(parser.read_string().as_deref(), Some("X"));
        assert!(parser.eof());
        assert_eq!(parser.read_string(), None);
    }

    #[test]
    fn numeric_readers_default_to_zero() {
        let mut parser = TextParser::from_plain("abc 2.5 nope");
        assert_eq!(parser.read_int(), 0);
        assert_eq!(parser.read_float(), 2.5);
        assert_eq!(parser.read_float(), 0.0);
        assert_eq!(parser.read_int(), 0);
    }

    #[test]
    fn rewind_returns_exactly_one_token() {
        let mut parser = TextParser::new(&encode(b"A B C"), true);
        assert_eq!(parser.read_string().as_deref(), Some("A"));
        assert_eq!(parser.read_string().as_deref(), Some("B"));
        assert!(parser.rewind());
        assert!(!parser.rewind());
        assert_eq!(parser.read_string().as_deref(), Some("B"));
        assert_eq!(parser.read_string().as_deref(), Some("C"));
    }
}
