//! Manifest Lexer
//!
//! Turns manifest text into a flat token stream. Newlines are significant
//! (they separate entries inside a block) so they are emitted as tokens;
//! other whitespace and comments are dropped.
//!
//! Comments: `# ...` and `// ...` to end of line, `/* ... */` blocks.

use std::fmt;

use crate::error::{ParseError, ParseErrorKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// Bare word: block kinds and keys
    Ident(String),
    /// Double-quoted string, escapes resolved
    Str(String),
    Equals,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Semicolon,
    Newline,
    Eof,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ident(word) => write!(f, "'{}'", word),
            Self::Str(text) => write!(f, "string \"{}\"", text),
            Self::Equals => write!(f, "'='"),
            Self::LBrace => write!(f, "'{{'"),
            Self::RBrace => write!(f, "'}}'"),
            Self::LBracket => write!(f, "'['"),
            Self::RBracket => write!(f, "']'"),
            Self::Comma => write!(f, "','"),
            Self::Semicolon => write!(f, "';'"),
            Self::Newline => write!(f, "end of line"),
            Self::Eof => write!(f, "end of input"),
        }
    }
}

/// A token with the 1-based position of its first character.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Spanned {
    pub token: Token,
    pub line: usize,
    pub column: usize,
}

struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: usize,
    column: usize,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            chars: source.chars().peekable(),
            line: 1,
            column: 1,
        }
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn error(&self, line: usize, column: usize, kind: ParseErrorKind) -> ParseError {
        ParseError::new(line, column, kind)
    }

    fn skip_line_comment(&mut self) {
        while let Some(&c) = self.chars.peek() {
            if c == '\n' {
                break;
            }
            self.bump();
        }
    }

    fn skip_block_comment(&mut self, line: usize, column: usize) -> Result<(), ParseError> {
        // Opening "/*" already consumed
        let mut previous = '\0';
        while let Some(c) = self.bump() {
            if previous == '*' && c == '/' {
                return Ok(());
            }
            previous = c;
        }
        Err(self.error(line, column, ParseErrorKind::UnterminatedComment))
    }

    fn string(&mut self, line: usize, column: usize) -> Result<String, ParseError> {
        // Opening quote already consumed
        let mut text = String::new();
        loop {
            let escape_line = self.line;
            let escape_column = self.column;
            match self.bump() {
                None | Some('\n') => {
                    return Err(self.error(line, column, ParseErrorKind::UnterminatedString))
                }
                Some('"') => return Ok(text),
                Some('\\') => match self.bump() {
                    Some('"') => text.push('"'),
                    Some('\\') => text.push('\\'),
                    Some('n') => text.push('\n'),
                    Some('t') => text.push('\t'),
                    Some('r') => text.push('\r'),
                    Some(other) => {
                        return Err(self.error(
                            escape_line,
                            escape_column,
                            ParseErrorKind::InvalidEscape(other),
                        ))
                    }
                    None => {
                        return Err(self.error(line, column, ParseErrorKind::UnterminatedString))
                    }
                },
                Some(c) => text.push(c),
            }
        }
    }

    fn ident(&mut self, first: char) -> String {
        let mut word = String::from(first);
        while let Some(&c) = self.chars.peek() {
            if !is_ident_char(c) {
                break;
            }
            word.push(c);
            self.bump();
        }
        word
    }

    fn tokenize(mut self) -> Result<Vec<Spanned>, ParseError> {
        let mut tokens = Vec::new();

        loop {
            let line = self.line;
            let column = self.column;
            let Some(c) = self.bump() else {
                tokens.push(Spanned {
                    token: Token::Eof,
                    line,
                    column,
                });
                return Ok(tokens);
            };

            let token = match c {
                '\n' => Token::Newline,
                c if c.is_whitespace() => continue,
                '#' => {
                    self.skip_line_comment();
                    continue;
                }
                '/' => match self.chars.peek().copied() {
                    Some('/') => {
                        self.skip_line_comment();
                        continue;
                    }
                    Some('*') => {
                        self.bump();
                        self.skip_block_comment(line, column)?;
                        continue;
                    }
                    _ => return Err(self.error(line, column, ParseErrorKind::UnexpectedChar('/'))),
                },
                '"' => Token::Str(self.string(line, column)?),
                '=' => Token::Equals,
                '{' => Token::LBrace,
                '}' => Token::RBrace,
                '[' => Token::LBracket,
                ']' => Token::RBracket,
                ',' => Token::Comma,
                ';' => Token::Semicolon,
                c if is_ident_start(c) => Token::Ident(self.ident(c)),
                other => return Err(self.error(line, column, ParseErrorKind::UnexpectedChar(other))),
            };

            tokens.push(Spanned {
                token,
                line,
                column,
            });
        }
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

/// Returns true if `word` can be written as a bare key.
pub fn is_identifier(word: &str) -> bool {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) if is_ident_start(first) => chars.all(is_ident_char),
        _ => false,
    }
}

/// Tokenizes manifest text. The returned stream always ends with `Token::Eof`.
pub fn tokenize(source: &str) -> Result<Vec<Spanned>, ParseError> {
    Lexer::new(source).tokenize()
}
