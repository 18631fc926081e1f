//! Tokens, spans and flat token streams for the ferrite semantic core.
//!
//! Macro invocations and macro definitions arrive as raw text; this crate
//! lexes them into a flat token stream (delimiters included as tokens) that
//! the fragment recognizers and the macro matcher walk with a cursor.

mod cancel;

pub use cancel::{Cancellation, Cancelled};

use logos::{FilterResult, Logos};
use thiserror::Error;

/// Reserved prefix of the identifier `$crate` expands to.
///
/// The full identifier is the prefix followed by `self` (expansion inside the
/// defining crate) or the defining crate's normalized name. It lexes as one
/// identifier so it survives nested macro calls, but users cannot write it.
pub const DOLLAR_CRATE_PREFIX: &str = "__ferrite_dollar_crate_";

/// Span in source code (byte offsets)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Smallest span covering both `self` and `other`
    pub fn cover(self, other: Span) -> Span {
        Span::new(self.start.min(other.start), self.end.max(other.end))
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// A token with its span
#[derive(Debug, Clone, PartialEq)]
pub struct SpannedToken {
    pub token: Token,
    pub span: Span,
}

#[derive(Logos, Debug, Clone, PartialEq, Eq, Hash)]
#[logos(skip r"[ \t\r\n\f]+")]
#[logos(skip r"//[^\n]*")]
pub enum Token {
    /// Never emitted; block comments are skipped by `block_comment`
    #[token("/*", block_comment)]
    BlockComment,

    // === Keywords ===
    #[token("as")]
    As,
    #[token("async")]
    Async,
    #[token("await")]
    Await,
    #[token("break")]
    Break,
    #[token("const")]
    Const,
    #[token("continue")]
    Continue,
    #[token("crate")]
    Crate,
    #[token("dyn")]
    Dyn,
    #[token("else")]
    Else,
    #[token("enum")]
    Enum,
    #[token("extern")]
    Extern,
    #[token("false")]
    False,
    #[token("fn")]
    Fn,
    #[token("for")]
    For,
    #[token("if")]
    If,
    #[token("impl")]
    Impl,
    #[token("in")]
    In,
    #[token("let")]
    Let,
    #[token("loop")]
    Loop,
    #[token("match")]
    Match,
    #[token("mod")]
    Mod,
    #[token("move")]
    Move,
    #[token("mut")]
    Mut,
    #[token("pub")]
    Pub,
    #[token("ref")]
    Ref,
    #[token("return")]
    Return,
    #[token("self")]
    SelfLower,
    #[token("Self")]
    SelfUpper,
    #[token("static")]
    Static,
    #[token("struct")]
    Struct,
    #[token("super")]
    Super,
    #[token("trait")]
    Trait,
    #[token("true")]
    True,
    #[token("type")]
    Type,
    #[token("unsafe")]
    Unsafe,
    #[token("use")]
    Use,
    #[token("where")]
    Where,
    #[token("while")]
    While,

    // === Literals (raw text, suffix included) ===
    #[regex(r"[0-9][0-9_]*([iu](8|16|32|64|128|size))?", |lex| lex.slice().to_string())]
    #[regex(r"0x[0-9a-fA-F_]+([iu](8|16|32|64|128|size))?", |lex| lex.slice().to_string())]
    #[regex(r"0o[0-7_]+([iu](8|16|32|64|128|size))?", |lex| lex.slice().to_string())]
    #[regex(r"0b[01_]+([iu](8|16|32|64|128|size))?", |lex| lex.slice().to_string())]
    IntLiteral(String),

    #[regex(r"[0-9][0-9_]*\.[0-9][0-9_]*([eE][+-]?[0-9_]+)?(f32|f64)?", |lex| lex.slice().to_string())]
    #[regex(r"[0-9][0-9_]*[eE][+-]?[0-9_]+(f32|f64)?", |lex| lex.slice().to_string())]
    #[regex(r"[0-9][0-9_]*(f32|f64)", |lex| lex.slice().to_string())]
    FloatLiteral(String),

    #[regex(r#"b?"([^"\\]|\\.)*""#, |lex| lex.slice().to_string())]
    #[regex(r#"b?r"[^"]*""#, |lex| lex.slice().to_string())]
    #[regex(r##"b?r#"([^"]|"[^#])*"#"##, |lex| lex.slice().to_string())]
    StrLiteral(String),

    #[regex(r"b?'([^'\\\n]|\\.|\\u\{[0-9a-fA-F]+\})'", |lex| lex.slice().to_string())]
    CharLiteral(String),

    // === Identifiers ===
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*", |lex| lex.slice().to_string())]
    #[regex(r"r#[a-zA-Z_][a-zA-Z0-9_]*", |lex| lex.slice()[2..].to_string())]
    Ident(String),

    #[regex(r"'[a-zA-Z_][a-zA-Z0-9_]*", |lex| lex.slice().to_string())]
    Lifetime(String),

    #[token("_", priority = 10)]
    Underscore,

    // === Operators ===
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("^")]
    Caret,
    #[token("!")]
    Not,
    #[token("&")]
    Amp,
    #[token("|")]
    Pipe,
    #[token("&&")]
    AndAnd,
    #[token("||")]
    OrOr,
    #[token("=")]
    Eq,
    #[token("==")]
    EqEq,
    #[token("!=")]
    NotEq,
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,
    #[token("<=")]
    LtEq,
    #[token(">=")]
    GtEq,
    #[token("+=")]
    PlusEq,
    #[token("-=")]
    MinusEq,
    #[token("*=")]
    StarEq,
    #[token("/=")]
    SlashEq,
    #[token("%=")]
    PercentEq,
    #[token("^=")]
    CaretEq,
    #[token("&=")]
    AmpEq,
    #[token("|=")]
    PipeEq,
    #[token("@")]
    At,
    #[token("?")]
    Question,
    #[token("~")]
    Tilde,

    // === Delimiters ===
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,

    // === Punctuation ===
    #[token(",")]
    Comma,
    #[token(";")]
    Semi,
    #[token(":")]
    Colon,
    #[token("::")]
    ColonColon,
    #[token(".")]
    Dot,
    #[token("..")]
    DotDot,
    #[token("...")]
    DotDotDot,
    #[token("..=")]
    DotDotEq,
    #[token("->")]
    Arrow,
    #[token("=>")]
    FatArrow,
    #[token("#")]
    Pound,
    #[token("$")]
    Dollar,
}

/// Bracket kind of a delimited token group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Delimiter {
    Paren,
    Brace,
    Bracket,
}

impl Delimiter {
    pub fn open(self) -> Token {
        match self {
            Delimiter::Paren => Token::LParen,
            Delimiter::Brace => Token::LBrace,
            Delimiter::Bracket => Token::LBracket,
        }
    }

    pub fn close(self) -> Token {
        match self {
            Delimiter::Paren => Token::RParen,
            Delimiter::Brace => Token::RBrace,
            Delimiter::Bracket => Token::RBracket,
        }
    }
}

impl Token {
    /// Identifier text of an identifier-like token.
    ///
    /// Keywords count as identifiers here: the surface grammar lexes them
    /// specially, but macro matching treats them as plain names.
    pub fn ident_text(&self) -> Option<&str> {
        match self {
            Token::Ident(name) => Some(name.as_str()),
            Token::Underscore => None,
            other => other.keyword_text(),
        }
    }

    /// Text of a keyword token, `None` for everything else
    pub fn keyword_text(&self) -> Option<&'static str> {
        let text = match self {
            Token::As => "as",
            Token::Async => "async",
            Token::Await => "await",
            Token::Break => "break",
            Token::Const => "const",
            Token::Continue => "continue",
            Token::Crate => "crate",
            Token::Dyn => "dyn",
            Token::Else => "else",
            Token::Enum => "enum",
            Token::Extern => "extern",
            Token::False => "false",
            Token::Fn => "fn",
            Token::For => "for",
            Token::If => "if",
            Token::Impl => "impl",
            Token::In => "in",
            Token::Let => "let",
            Token::Loop => "loop",
            Token::Match => "match",
            Token::Mod => "mod",
            Token::Move => "move",
            Token::Mut => "mut",
            Token::Pub => "pub",
            Token::Ref => "ref",
            Token::Return => "return",
            Token::SelfLower => "self",
            Token::SelfUpper => "Self",
            Token::Static => "static",
            Token::Struct => "struct",
            Token::Super => "super",
            Token::Trait => "trait",
            Token::True => "true",
            Token::Type => "type",
            Token::Unsafe => "unsafe",
            Token::Use => "use",
            Token::Where => "where",
            Token::While => "while",
            _ => return None,
        };
        Some(text)
    }

    pub fn is_literal(&self) -> bool {
        matches!(
            self,
            Token::IntLiteral(_)
                | Token::FloatLiteral(_)
                | Token::StrLiteral(_)
                | Token::CharLiteral(_)
                | Token::True
                | Token::False
        )
    }

    pub fn open_delimiter(&self) -> Option<Delimiter> {
        match self {
            Token::LParen => Some(Delimiter::Paren),
            Token::LBrace => Some(Delimiter::Brace),
            Token::LBracket => Some(Delimiter::Bracket),
            _ => None,
        }
    }

    pub fn close_delimiter(&self) -> Option<Delimiter> {
        match self {
            Token::RParen => Some(Delimiter::Paren),
            Token::RBrace => Some(Delimiter::Brace),
            Token::RBracket => Some(Delimiter::Bracket),
            _ => None,
        }
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(kw) = self.keyword_text() {
            return write!(f, "{}", kw);
        }
        match self {
            Token::IntLiteral(s)
            | Token::FloatLiteral(s)
            | Token::StrLiteral(s)
            | Token::CharLiteral(s)
            | Token::Lifetime(s)
            | Token::Ident(s) => write!(f, "{}", s),
            Token::Underscore => write!(f, "_"),
            Token::Plus => write!(f, "+"),
            Token::Minus => write!(f, "-"),
            Token::Star => write!(f, "*"),
            Token::Slash => write!(f, "/"),
            Token::Percent => write!(f, "%"),
            Token::Caret => write!(f, "^"),
            Token::Not => write!(f, "!"),
            Token::Amp => write!(f, "&"),
            Token::Pipe => write!(f, "|"),
            Token::AndAnd => write!(f, "&&"),
            Token::OrOr => write!(f, "||"),
            Token::Eq => write!(f, "="),
            Token::EqEq => write!(f, "=="),
            Token::NotEq => write!(f, "!="),
            Token::Lt => write!(f, "<"),
            Token::Gt => write!(f, ">"),
            Token::LtEq => write!(f, "<="),
            Token::GtEq => write!(f, ">="),
            Token::PlusEq => write!(f, "+="),
            Token::MinusEq => write!(f, "-="),
            Token::StarEq => write!(f, "*="),
            Token::SlashEq => write!(f, "/="),
            Token::PercentEq => write!(f, "%="),
            Token::CaretEq => write!(f, "^="),
            Token::AmpEq => write!(f, "&="),
            Token::PipeEq => write!(f, "|="),
            Token::At => write!(f, "@"),
            Token::Question => write!(f, "?"),
            Token::Tilde => write!(f, "~"),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::LBrace => write!(f, "{{"),
            Token::RBrace => write!(f, "}}"),
            Token::LBracket => write!(f, "["),
            Token::RBracket => write!(f, "]"),
            Token::Comma => write!(f, ","),
            Token::Semi => write!(f, ";"),
            Token::Colon => write!(f, ":"),
            Token::ColonColon => write!(f, "::"),
            Token::Dot => write!(f, "."),
            Token::DotDot => write!(f, ".."),
            Token::DotDotDot => write!(f, "..."),
            Token::DotDotEq => write!(f, "..="),
            Token::Arrow => write!(f, "->"),
            Token::FatArrow => write!(f, "=>"),
            Token::Pound => write!(f, "#"),
            Token::Dollar => write!(f, "$"),
            // keywords are handled above
            _ => Ok(()),
        }
    }
}

/// Skip a block comment after its opening `/*`. Comments nest, so
/// `/* a /* b */ c */` is one comment. An unterminated comment is a lex error.
fn block_comment(lex: &mut logos::Lexer<Token>) -> FilterResult<(), ()> {
    let rest = lex.remainder().as_bytes();
    let mut depth = 1usize;
    let mut i = 0;
    while i < rest.len() {
        match (rest[i], rest.get(i + 1)) {
            (b'/', Some(b'*')) => {
                depth += 1;
                i += 2;
            }
            (b'*', Some(b'/')) => {
                depth -= 1;
                i += 2;
                if depth == 0 {
                    lex.bump(i);
                    return FilterResult::Skip;
                }
            }
            _ => i += 1,
        }
    }
    lex.bump(rest.len());
    FilterResult::Error(())
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LexError {
    #[error("unexpected character '{text}' at {}..{}", span.start, span.end)]
    UnexpectedChar { text: String, span: Span },
    #[error("unmatched delimiter at {}..{}", span.start, span.end)]
    UnmatchedDelimiter { span: Span },
    #[error("unclosed delimiter opened at {}..{}", span.start, span.end)]
    UnclosedDelimiter { span: Span },
}

/// A lexed piece of source text.
///
/// Tokens are kept flat; delimiters appear as ordinary tokens and are
/// guaranteed to be balanced, so `matching_close` always succeeds on an
/// opening delimiter.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenStream {
    text: String,
    tokens: Vec<SpannedToken>,
}

impl TokenStream {
    /// Lex `text` and check delimiter balance
    pub fn lex(text: &str) -> Result<Self, LexError> {
        let mut lexer = Token::lexer(text);
        let mut tokens = Vec::new();
        let mut open: Vec<(Delimiter, Span)> = Vec::new();

        while let Some(result) = lexer.next() {
            let range = lexer.span();
            let span = Span::new(range.start, range.end);
            let token = result.map_err(|()| LexError::UnexpectedChar {
                text: lexer.slice().to_string(),
                span,
            })?;
            if let Some(delim) = token.open_delimiter() {
                open.push((delim, span));
            } else if let Some(delim) = token.close_delimiter() {
                match open.pop() {
                    Some((opened, _)) if opened == delim => {}
                    _ => return Err(LexError::UnmatchedDelimiter { span }),
                }
            }
            tokens.push(SpannedToken { token, span });
        }

        if let Some((_, span)) = open.pop() {
            return Err(LexError::UnclosedDelimiter { span });
        }

        Ok(Self {
            text: text.to_string(),
            tokens,
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn tokens(&self) -> &[SpannedToken] {
        &self.tokens
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Token> {
        self.tokens.get(index).map(|t| &t.token)
    }

    /// Source text covered by tokens `start..end` (original whitespace kept)
    pub fn slice(&self, start: usize, end: usize) -> &str {
        if start >= end || end > self.tokens.len() {
            return "";
        }
        let from = self.tokens[start].span.start;
        let to = self.tokens[end - 1].span.end;
        &self.text[from..to]
    }

    /// Index of the delimiter closing the one at `open_index`
    pub fn matching_close(&self, open_index: usize) -> Option<usize> {
        let mut depth = 0usize;
        for (i, t) in self.tokens.iter().enumerate().skip(open_index) {
            if t.token.open_delimiter().is_some() {
                depth += 1;
            } else if t.token.close_delimiter().is_some() {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_tokens() {
        let stream = TokenStream::lex("fn main() { let x = 5u8; }").unwrap();
        let tokens: Vec<_> = stream.tokens().iter().map(|t| t.token.clone()).collect();

        assert!(matches!(tokens[0], Token::Fn));
        assert!(matches!(tokens[1], Token::Ident(ref s) if s == "main"));
        assert!(matches!(tokens[2], Token::LParen));
        assert!(matches!(tokens[3], Token::RParen));
        assert!(matches!(tokens[4], Token::LBrace));
        assert!(matches!(tokens[5], Token::Let));
        assert!(matches!(tokens[8], Token::IntLiteral(ref s) if s == "5u8"));
        assert!(matches!(tokens[9], Token::Semi));
        assert!(matches!(tokens[10], Token::RBrace));
    }

    #[test]
    fn test_lifetime_and_char() {
        let stream = TokenStream::lex("'a 'b' 1.5f32 $x").unwrap();
        assert_eq!(stream.get(0), Some(&Token::Lifetime("'a".to_string())));
        assert_eq!(stream.get(1), Some(&Token::CharLiteral("'b'".to_string())));
        assert_eq!(stream.get(2), Some(&Token::FloatLiteral("1.5f32".to_string())));
        assert_eq!(stream.get(3), Some(&Token::Dollar));
    }

    #[test]
    fn test_range_is_not_float() {
        let stream = TokenStream::lex("0..10").unwrap();
        assert_eq!(stream.len(), 3);
        assert_eq!(stream.get(1), Some(&Token::DotDot));
    }

    #[test]
    fn test_keywords_are_ident_like() {
        assert_eq!(Token::Fn.ident_text(), Some("fn"));
        assert_eq!(Token::Ident("foo".into()).ident_text(), Some("foo"));
        assert_eq!(Token::Underscore.ident_text(), None);
        assert_eq!(Token::Plus.ident_text(), None);
    }

    #[test]
    fn test_slice_keeps_whitespace() {
        let stream = TokenStream::lex("a + ( b*c )").unwrap();
        assert_eq!(stream.slice(0, 7), "a + ( b*c )");
        assert_eq!(stream.slice(2, 7), "( b*c )");
        assert_eq!(stream.matching_close(2), Some(6));
    }

    #[test]
    fn test_unbalanced_delimiters() {
        assert!(matches!(
            TokenStream::lex("(a]"),
            Err(LexError::UnmatchedDelimiter { .. })
        ));
        assert!(matches!(
            TokenStream::lex("{a"),
            Err(LexError::UnclosedDelimiter { .. })
        ));
    }

    #[test]
    fn test_comments_skipped() {
        let stream = TokenStream::lex("a // comment\n /* block */ b").unwrap();
        assert_eq!(stream.len(), 2);
    }

    #[test]
    fn test_block_comments_nest() {
        let stream = TokenStream::lex("a /* outer /* inner */ still comment */ b /** doc */ c").unwrap();
        let names: Vec<_> = stream.tokens().iter().filter_map(|t| t.token.ident_text()).collect();
        assert_eq!(names, ["a", "b", "c"]);
        assert_eq!(stream.slice(0, 2), "a /* outer /* inner */ still comment */ b");
    }

    #[test]
    fn test_unterminated_block_comment_is_error() {
        assert!(matches!(
            TokenStream::lex("a /* open /* nested */"),
            Err(LexError::UnexpectedChar { .. })
        ));
    }

    #[test]
    fn test_underscore_is_not_an_ident() {
        let stream = TokenStream::lex("_ _x x_").unwrap();
        assert_eq!(stream.get(0), Some(&Token::Underscore));
        assert_eq!(stream.get(1), Some(&Token::Ident("_x".to_string())));
        assert_eq!(stream.get(2), Some(&Token::Ident("x_".to_string())));
    }
}
