//! Line-oriented tokenizer for the dlib and bench formats.
//!
//! Both formats are whitespace-and-comment-tolerant: `#` starts a comment
//! to end of line, blank lines are skipped, and a small set of single-byte
//! separators (`(),` plus `=` for bench) are kept as their own tokens.
//! Every token carries its 1-based line number and a byte span into the
//! original source for rendered reports.

use crate::error::{Error, Result, Span};

#[derive(Clone, Debug)]
pub struct Token {
    pub text: String,
    pub line: u32,
    pub span: Span,
}

/// One non-empty source line, tokenized.
#[derive(Clone, Debug)]
pub struct TokenLine {
    pub line: u32,
    pub tokens: Vec<Token>,
}

const DROP: &[u8] = b" \t\r";
const COMMENT: u8 = b'#';

/// Tokenize a whole source into its non-empty, non-comment lines.
pub fn tokenize(source: &str, keep_separators: &str) -> Vec<TokenLine> {
    let keep = keep_separators.as_bytes();
    let mut lines = Vec::new();
    let mut offset = 0usize;
    for (idx, raw) in source.split('\n').enumerate() {
        let line_no = idx as u32 + 1;
        let bytes = raw.as_bytes();
        let mut tokens = Vec::new();
        let mut i = 0usize;
        while i < bytes.len() {
            let b = bytes[i];
            if b == COMMENT {
                break;
            }
            if DROP.contains(&b) {
                i += 1;
                continue;
            }
            if keep.contains(&b) {
                tokens.push(Token {
                    text: (b as char).to_string(),
                    line: line_no,
                    span: Span::new((offset + i) as u32, (offset + i + 1) as u32),
                });
                i += 1;
                continue;
            }
            let start = i;
            while i < bytes.len() {
                let c = bytes[i];
                if c == COMMENT || DROP.contains(&c) || keep.contains(&c) {
                    break;
                }
                i += 1;
            }
            tokens.push(Token {
                text: raw[start..i].to_string(),
                line: line_no,
                span: Span::new((offset + start) as u32, (offset + i) as u32),
            });
        }
        if !tokens.is_empty() {
            lines.push(TokenLine {
                line: line_no,
                tokens,
            });
        }
        offset += raw.len() + 1;
    }
    lines
}

/// Cursor over one tokenized line. Consumption failures name the file, the
/// line, and the offending token, in the shape the parsers hand to callers.
pub struct LineParser<'a> {
    file: &'a str,
    line: u32,
    tokens: &'a [Token],
    pos: usize,
    prev: Option<&'a Token>,
}

impl<'a> LineParser<'a> {
    pub fn new(file: &'a str, line: &'a TokenLine) -> Self {
        Self {
            file,
            line: line.line,
            tokens: &line.tokens,
            pos: 0,
            prev: None,
        }
    }

    pub fn line_number(&self) -> u32 {
        self.line
    }

    fn take(&mut self) -> Result<&'a Token> {
        match self.tokens.get(self.pos) {
            Some(tok) => {
                self.pos += 1;
                self.prev = Some(tok);
                Ok(tok)
            }
            None => {
                let span = self
                    .prev
                    .map(|t| t.span)
                    .unwrap_or_else(Span::dummy);
                Err(Error::Parse {
                    file: self.file.to_string(),
                    line: self.line,
                    message: "unexpected termination".to_string(),
                    span,
                })
            }
        }
    }

    /// Error pointing at a specific token.
    pub fn unexpected(&self, token: &Token) -> Error {
        Error::Parse {
            file: self.file.to_string(),
            line: self.line,
            message: format!("unexpected token \"{}\"", token.text),
            span: token.span,
        }
    }

    /// Error pointing at the most recently consumed token.
    pub fn unexpected_previous(&self) -> Error {
        match self.prev {
            Some(tok) => self.unexpected(tok),
            None => Error::Parse {
                file: self.file.to_string(),
                line: self.line,
                message: "unexpected termination".to_string(),
                span: Span::dummy(),
            },
        }
    }

    /// The next token as a raw word.
    pub fn word(&mut self) -> Result<&'a Token> {
        self.take()
    }

    /// The next token parsed as a floating-point number.
    pub fn number(&mut self) -> Result<f64> {
        let tok = self.take()?;
        tok.text
            .parse::<f64>()
            .map_err(|_| self.unexpected(tok))
    }

    /// Require a specific separator.
    pub fn expect(&mut self, separator: char) -> Result<()> {
        let tok = self.take()?;
        if tok.text.len() == 1 && tok.text.as_bytes()[0] == separator as u8 {
            Ok(())
        } else {
            Err(self.unexpected(tok))
        }
    }

    /// Consume a one-byte separator token and return it.
    pub fn separator(&mut self) -> Result<char> {
        let tok = self.take()?;
        if tok.text.len() == 1 {
            Ok(tok.text.as_bytes()[0] as char)
        } else {
            Err(self.unexpected(tok))
        }
    }

    /// Require that the line is exhausted.
    pub fn finish(&mut self) -> Result<()> {
        match self.tokens.get(self.pos) {
            None => Ok(()),
            Some(tok) => Err(self.unexpected(tok)),
        }
    }
}
