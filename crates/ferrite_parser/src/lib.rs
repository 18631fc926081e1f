//! Fragment recognizers for macro matching.
//!
//! A macro binding such as `$e:expr` consumes exactly one syntactic fragment
//! from the invocation's token stream. The recognizers here walk the flat
//! token list (delimiters are ordinary, balanced tokens) and report where the
//! fragment ends; they do not build trees.

use ferrite_syntax::{Span, SpannedToken, Token};
use thiserror::Error;

/// Syntactic fragment kinds a macro binding can capture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FragmentKind {
    Ident,
    Path,
    Expr,
    Ty,
    Pat,
    /// `pat_param`: a pattern without top-level alternatives
    PatParam,
    Stmt,
    Block,
    Item,
    Meta,
    Vis,
    Tt,
    Lifetime,
    Literal,
}

impl FragmentKind {
    pub fn from_name(name: &str) -> Option<Self> {
        let kind = match name {
            "ident" => FragmentKind::Ident,
            "path" => FragmentKind::Path,
            "expr" => FragmentKind::Expr,
            "ty" => FragmentKind::Ty,
            "pat" => FragmentKind::Pat,
            "pat_param" => FragmentKind::PatParam,
            "stmt" => FragmentKind::Stmt,
            "block" => FragmentKind::Block,
            "item" => FragmentKind::Item,
            "meta" => FragmentKind::Meta,
            "vis" => FragmentKind::Vis,
            "tt" => FragmentKind::Tt,
            "lifetime" => FragmentKind::Lifetime,
            "literal" => FragmentKind::Literal,
            _ => return None,
        };
        Some(kind)
    }

    pub fn name(self) -> &'static str {
        match self {
            FragmentKind::Ident => "ident",
            FragmentKind::Path => "path",
            FragmentKind::Expr => "expr",
            FragmentKind::Ty => "ty",
            FragmentKind::Pat => "pat",
            FragmentKind::PatParam => "pat_param",
            FragmentKind::Stmt => "stmt",
            FragmentKind::Block => "block",
            FragmentKind::Item => "item",
            FragmentKind::Meta => "meta",
            FragmentKind::Vis => "vis",
            FragmentKind::Tt => "tt",
            FragmentKind::Lifetime => "lifetime",
            FragmentKind::Literal => "literal",
        }
    }

    /// Only visibility may match zero tokens
    pub fn allows_empty(self) -> bool {
        self == FragmentKind::Vis
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} at {}..{}", span.start, span.end)]
pub struct ParseError {
    pub message: String,
    pub span: Span,
}

pub type ParseResult<T> = Result<T, ParseError>;

/// Recognize one fragment of `kind` starting at token `start`.
///
/// Returns the index one past the last consumed token.
pub fn parse_fragment(tokens: &[SpannedToken], start: usize, kind: FragmentKind) -> ParseResult<usize> {
    let mut parser = Parser::new(tokens, start);
    match kind {
        FragmentKind::Ident => parser.parse_ident_fragment()?,
        FragmentKind::Path => parser.parse_path(PathMode::Type)?,
        FragmentKind::Expr => parser.parse_expr()?,
        FragmentKind::Ty => parser.parse_type()?,
        FragmentKind::Pat => parser.parse_pattern()?,
        FragmentKind::PatParam => parser.parse_pattern_no_alt()?,
        FragmentKind::Stmt => parser.parse_stmt()?,
        FragmentKind::Block => parser.parse_block()?,
        FragmentKind::Item => parser.parse_item()?,
        FragmentKind::Meta => parser.parse_meta()?,
        FragmentKind::Vis => parser.parse_vis()?,
        FragmentKind::Tt => parser.parse_token_tree()?,
        FragmentKind::Lifetime => {
            parser.expect_lifetime()?;
        }
        FragmentKind::Literal => parser.parse_literal()?,
    }
    Ok(parser.pos)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PathMode {
    /// Generic args need a turbofish
    Expr,
    /// Generic args follow directly
    Type,
}

pub struct Parser<'t> {
    tokens: &'t [SpannedToken],
    pos: usize,
}

impl<'t> Parser<'t> {
    pub fn new(tokens: &'t [SpannedToken], pos: usize) -> Self {
        Self { tokens, pos }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    // === Token Access ===

    fn peek(&self) -> Option<&'t Token> {
        self.tokens.get(self.pos).map(|t| &t.token)
    }

    fn peek_nth(&self, n: usize) -> Option<&'t Token> {
        self.tokens.get(self.pos + n).map(|t| &t.token)
    }

    fn peek_span(&self) -> Span {
        match self.tokens.get(self.pos) {
            Some(t) => t.span,
            None => self
                .tokens
                .last()
                .map(|t| Span::new(t.span.end, t.span.end))
                .unwrap_or_default(),
        }
    }

    fn advance(&mut self) {
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn check(&self, token: &Token) -> bool {
        self.peek() == Some(token)
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.check(token) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: Token) -> ParseResult<()> {
        if self.eat(&expected) {
            Ok(())
        } else {
            Err(self.error(format!("expected '{}'", expected)))
        }
    }

    fn error(&self, message: String) -> ParseError {
        let found = match self.peek() {
            Some(t) => format!("'{}'", t),
            None => "end of input".to_string(),
        };
        ParseError {
            message: format!("{}, found {}", message, found),
            span: self.peek_span(),
        }
    }

    fn expect_lifetime(&mut self) -> ParseResult<()> {
        match self.peek() {
            Some(Token::Lifetime(_)) => {
                self.advance();
                Ok(())
            }
            _ => Err(self.error("expected lifetime".to_string())),
        }
    }

    /// Skip a balanced delimited group starting at the current open delimiter
    fn skip_group(&mut self) -> ParseResult<()> {
        if self.peek().and_then(|t| t.open_delimiter()).is_none() {
            return Err(self.error("expected delimited group".to_string()));
        }
        let mut depth = 0usize;
        while let Some(tok) = self.peek() {
            if tok.open_delimiter().is_some() {
                depth += 1;
            } else if tok.close_delimiter().is_some() {
                depth -= 1;
                if depth == 0 {
                    self.advance();
                    return Ok(());
                }
            }
            self.advance();
        }
        Err(self.error("unclosed delimiter".to_string()))
    }

    fn expect_group(&mut self, open: Token) -> ParseResult<()> {
        if self.check(&open) {
            self.skip_group()
        } else {
            Err(self.error(format!("expected '{}'", open)))
        }
    }

    // === Simple fragments ===

    fn parse_ident_fragment(&mut self) -> ParseResult<()> {
        match self.peek().and_then(|t| t.ident_text()) {
            Some(_) => {
                self.advance();
                Ok(())
            }
            None => Err(self.error("expected identifier".to_string())),
        }
    }

    fn parse_token_tree(&mut self) -> ParseResult<()> {
        match self.peek() {
            Some(t) if t.open_delimiter().is_some() => self.skip_group(),
            Some(t) if t.close_delimiter().is_some() => Err(self.error("unexpected closing delimiter".to_string())),
            Some(_) => {
                self.advance();
                Ok(())
            }
            None => Err(self.error("expected token tree".to_string())),
        }
    }

    fn parse_literal(&mut self) -> ParseResult<()> {
        if self.check(&Token::Minus)
            && matches!(self.peek_nth(1), Some(Token::IntLiteral(_)) | Some(Token::FloatLiteral(_)))
        {
            self.advance();
        }
        match self.peek() {
            Some(t) if t.is_literal() => {
                self.advance();
                Ok(())
            }
            _ => Err(self.error("expected literal".to_string())),
        }
    }

    /// `pub`, `pub(crate)`, `pub(self)`, `pub(super)`, `pub(in path)` or nothing
    fn parse_vis(&mut self) -> ParseResult<()> {
        if !self.eat(&Token::Pub) {
            return Ok(());
        }
        if self.check(&Token::LParen)
            && matches!(
                self.peek_nth(1),
                Some(Token::Crate) | Some(Token::SelfLower) | Some(Token::Super) | Some(Token::In)
            )
        {
            self.skip_group()?;
        }
        Ok(())
    }

    fn parse_meta(&mut self) -> ParseResult<()> {
        self.parse_path(PathMode::Expr)?;
        match self.peek() {
            Some(t) if t.open_delimiter().is_some() => self.skip_group(),
            Some(Token::Eq) => {
                self.advance();
                self.parse_expr()
            }
            _ => Ok(()),
        }
    }

    // === Paths ===

    fn is_path_start(&self) -> bool {
        match self.peek() {
            Some(Token::ColonColon) | Some(Token::Lt) => true,
            Some(t) => t.ident_text().is_some() && !is_reserved_in_path(t),
            None => false,
        }
    }

    fn parse_path(&mut self, mode: PathMode) -> ParseResult<()> {
        if self.eat(&Token::Lt) {
            self.parse_type()?;
            if self.eat(&Token::As) {
                self.parse_path(PathMode::Type)?;
            }
            self.expect(Token::Gt)?;
            self.expect(Token::ColonColon)?;
        } else {
            self.eat(&Token::ColonColon);
        }

        loop {
            match self.peek() {
                Some(t) if t.ident_text().is_some() && !is_reserved_in_path(t) => self.advance(),
                _ => return Err(self.error("expected path segment".to_string())),
            }

            match mode {
                PathMode::Type => {
                    if self.check(&Token::Lt) {
                        self.parse_generic_args()?;
                    } else if self.check(&Token::ColonColon) && self.peek_nth(1) == Some(&Token::Lt) {
                        self.advance();
                        self.parse_generic_args()?;
                    } else if self.check(&Token::LParen) {
                        // Fn(A, B) -> C sugar
                        self.skip_group()?;
                        if self.eat(&Token::Arrow) {
                            self.parse_type_no_bounds()?;
                        }
                    }
                }
                PathMode::Expr => {
                    if self.check(&Token::ColonColon) && self.peek_nth(1) == Some(&Token::Lt) {
                        self.advance();
                        self.parse_generic_args()?;
                    }
                }
            }

            let continues = self.check(&Token::ColonColon)
                && self.peek_nth(1).map(|t| t.ident_text().is_some()).unwrap_or(false);
            if !continues {
                return Ok(());
            }
            self.advance();
        }
    }

    fn parse_generic_args(&mut self) -> ParseResult<()> {
        self.expect(Token::Lt)?;
        loop {
            if self.eat(&Token::Gt) {
                return Ok(());
            }
            match self.peek() {
                Some(Token::Lifetime(_)) => self.advance(),
                Some(t) if t.is_literal() => self.advance(),
                Some(Token::Minus) => self.parse_literal()?,
                Some(Token::LBrace) => self.skip_group()?,
                Some(Token::Ident(_)) if matches!(self.peek_nth(1), Some(Token::Eq) | Some(Token::Colon)) => {
                    let is_bound = self.peek_nth(1) == Some(&Token::Colon);
                    self.advance();
                    self.advance();
                    if is_bound {
                        self.parse_bounds()?;
                    } else {
                        self.parse_type()?;
                    }
                }
                Some(_) => self.parse_type()?,
                None => return Err(self.error("expected '>'".to_string())),
            }
            if !self.eat(&Token::Comma) {
                return self.expect(Token::Gt);
            }
        }
    }

    // === Types ===

    pub fn parse_type(&mut self) -> ParseResult<()> {
        self.parse_type_inner(true)
    }

    fn parse_type_no_bounds(&mut self) -> ParseResult<()> {
        self.parse_type_inner(false)
    }

    fn parse_type_inner(&mut self, allow_bounds: bool) -> ParseResult<()> {
        match self.peek() {
            Some(Token::Amp) | Some(Token::AndAnd) => {
                self.advance();
                if let Some(Token::Lifetime(_)) = self.peek() {
                    self.advance();
                }
                self.eat(&Token::Mut);
                self.parse_type_no_bounds()
            }
            Some(Token::Star) => {
                self.advance();
                if !self.eat(&Token::Mut) {
                    self.expect(Token::Const)?;
                }
                self.parse_type_no_bounds()
            }
            Some(Token::LParen) | Some(Token::LBracket) => self.skip_group(),
            Some(Token::Not) | Some(Token::Underscore) => {
                self.advance();
                Ok(())
            }
            Some(Token::Dyn) | Some(Token::Impl) => {
                self.advance();
                if allow_bounds {
                    self.parse_bounds()
                } else {
                    self.parse_bound()
                }
            }
            Some(Token::Fn) | Some(Token::Unsafe) | Some(Token::Extern) => self.parse_fn_ptr_type(),
            Some(Token::For) => {
                self.advance();
                self.parse_generic_args()?;
                self.parse_type_inner(allow_bounds)
            }
            Some(Token::Question) => {
                self.advance();
                self.parse_path(PathMode::Type)
            }
            _ if self.is_path_start() => {
                self.parse_path(PathMode::Type)?;
                if allow_bounds && self.check(&Token::Plus) {
                    // bare trait object with extra bounds
                    while self.eat(&Token::Plus) {
                        self.parse_bound()?;
                    }
                }
                Ok(())
            }
            _ => Err(self.error("expected type".to_string())),
        }
    }

    fn parse_fn_ptr_type(&mut self) -> ParseResult<()> {
        self.eat(&Token::Unsafe);
        if self.eat(&Token::Extern) {
            if let Some(Token::StrLiteral(_)) = self.peek() {
                self.advance();
            }
        }
        self.expect(Token::Fn)?;
        self.expect_group(Token::LParen)?;
        if self.eat(&Token::Arrow) {
            self.parse_type_no_bounds()?;
        }
        Ok(())
    }

    fn parse_bound(&mut self) -> ParseResult<()> {
        match self.peek() {
            Some(Token::Lifetime(_)) => {
                self.advance();
                Ok(())
            }
            Some(Token::Question) => {
                self.advance();
                self.parse_path(PathMode::Type)
            }
            Some(Token::LParen) => self.skip_group(),
            Some(Token::For) => {
                self.advance();
                self.parse_generic_args()?;
                self.parse_path(PathMode::Type)
            }
            _ => self.parse_path(PathMode::Type),
        }
    }

    fn parse_bounds(&mut self) -> ParseResult<()> {
        self.parse_bound()?;
        while self.eat(&Token::Plus) {
            if self.is_at_end() || !self.can_begin_bound() {
                break;
            }
            self.parse_bound()?;
        }
        Ok(())
    }

    fn can_begin_bound(&self) -> bool {
        matches!(
            self.peek(),
            Some(Token::Lifetime(_)) | Some(Token::Question) | Some(Token::LParen) | Some(Token::For)
        ) || self.is_path_start()
    }

    // === Patterns ===

    pub fn parse_pattern(&mut self) -> ParseResult<()> {
        self.eat(&Token::Pipe);
        self.parse_pattern_no_alt()?;
        while self.check(&Token::Pipe) {
            self.advance();
            self.parse_pattern_no_alt()?;
        }
        Ok(())
    }

    fn parse_pattern_no_alt(&mut self) -> ParseResult<()> {
        match self.peek() {
            Some(Token::Underscore) | Some(Token::DotDot) => {
                self.advance();
                Ok(())
            }
            Some(Token::Amp) | Some(Token::AndAnd) => {
                self.advance();
                self.eat(&Token::Mut);
                self.parse_pattern_no_alt()
            }
            Some(Token::LParen) | Some(Token::LBracket) => self.skip_group(),
            Some(Token::Ref) | Some(Token::Mut) => {
                self.eat(&Token::Ref);
                self.eat(&Token::Mut);
                self.parse_ident_fragment()?;
                if self.eat(&Token::At) {
                    self.parse_pattern_no_alt()?;
                }
                Ok(())
            }
            Some(Token::Minus) => {
                self.parse_literal()?;
                self.parse_range_pattern_tail()
            }
            Some(t) if t.is_literal() => {
                self.advance();
                self.parse_range_pattern_tail()
            }
            _ if self.is_path_start() => {
                let is_single_ident = matches!(self.peek(), Some(Token::Ident(_)))
                    && !matches!(self.peek_nth(1), Some(Token::ColonColon) | Some(Token::Lt));
                if is_single_ident && self.peek_nth(1) == Some(&Token::At) {
                    self.advance();
                    self.advance();
                    return self.parse_pattern_no_alt();
                }
                self.parse_path(PathMode::Expr)?;
                match self.peek() {
                    Some(Token::LParen) | Some(Token::LBrace) => self.skip_group(),
                    Some(Token::Not) => {
                        self.advance();
                        self.parse_token_tree()
                    }
                    _ => self.parse_range_pattern_tail(),
                }
            }
            _ => Err(self.error("expected pattern".to_string())),
        }
    }

    fn parse_range_pattern_tail(&mut self) -> ParseResult<()> {
        if self.eat(&Token::DotDotEq) || self.eat(&Token::DotDotDot) {
            match self.peek() {
                Some(Token::Minus) => self.parse_literal(),
                Some(t) if t.is_literal() => {
                    self.advance();
                    Ok(())
                }
                _ => self.parse_path(PathMode::Expr),
            }
        } else if self.eat(&Token::DotDot) {
            match self.peek() {
                Some(Token::Minus) => self.parse_literal(),
                Some(t) if t.is_literal() => {
                    self.advance();
                    Ok(())
                }
                _ => Ok(()),
            }
        } else {
            Ok(())
        }
    }

    // === Statements, blocks, items ===

    pub fn parse_block(&mut self) -> ParseResult<()> {
        self.expect_group(Token::LBrace)
    }

    pub fn parse_stmt(&mut self) -> ParseResult<()> {
        if self.eat(&Token::Let) {
            self.parse_pattern_no_alt()?;
            if self.eat(&Token::Colon) {
                self.parse_type()?;
            }
            if self.eat(&Token::Eq) {
                self.parse_expr()?;
                if self.eat(&Token::Else) {
                    self.parse_block()?;
                }
            }
            return Ok(());
        }
        if self.is_item_start() {
            return self.parse_item();
        }
        self.parse_expr()
    }

    fn is_item_start(&self) -> bool {
        let mut n = 0;
        // attributes and visibility may precede any item
        while self.peek_nth(n) == Some(&Token::Pound) {
            n += 2;
        }
        if self.peek_nth(n) == Some(&Token::Pub) {
            return true;
        }
        match self.peek_nth(n) {
            Some(Token::Fn) | Some(Token::Struct) | Some(Token::Enum) | Some(Token::Trait)
            | Some(Token::Impl) | Some(Token::Mod) | Some(Token::Use) | Some(Token::Static)
            | Some(Token::Type) | Some(Token::Extern) => true,
            Some(Token::Const) => self.peek_nth(n + 1) != Some(&Token::LBrace),
            Some(Token::Unsafe) => matches!(
                self.peek_nth(n + 1),
                Some(Token::Fn) | Some(Token::Impl) | Some(Token::Trait) | Some(Token::Extern)
            ),
            Some(Token::Async) => self.peek_nth(n + 1) == Some(&Token::Fn),
            Some(Token::Ident(name)) => {
                (name == "union" && matches!(self.peek_nth(n + 1), Some(Token::Ident(_))))
                    || (name == "macro_rules" && self.peek_nth(n + 1) == Some(&Token::Not))
            }
            _ => false,
        }
    }

    pub fn parse_item(&mut self) -> ParseResult<()> {
        while self.check(&Token::Pound) {
            self.advance();
            self.eat(&Token::Not);
            self.expect_group(Token::LBracket)?;
        }
        self.parse_vis()?;

        match self.peek() {
            Some(Token::Use) | Some(Token::Static) | Some(Token::Type) => self.skip_to_semi(),
            Some(Token::Const) if self.peek_nth(1) != Some(&Token::Fn) && self.peek_nth(1) != Some(&Token::Unsafe) => {
                self.skip_to_semi()
            }
            Some(Token::Extern) if self.peek_nth(1) == Some(&Token::Crate) => self.skip_to_semi(),
            Some(Token::Fn) | Some(Token::Struct) | Some(Token::Enum) | Some(Token::Trait)
            | Some(Token::Impl) | Some(Token::Mod) | Some(Token::Const) | Some(Token::Unsafe)
            | Some(Token::Async) | Some(Token::Extern) => self.skip_to_body_or_semi(),
            Some(Token::Ident(name)) if name == "union" || name == "auto" => self.skip_to_body_or_semi(),
            Some(Token::Ident(name)) if name == "macro_rules" && self.peek_nth(1) == Some(&Token::Not) => {
                self.advance();
                self.advance();
                self.parse_ident_fragment()?;
                let is_brace = self.check(&Token::LBrace);
                self.parse_token_tree()?;
                if !is_brace {
                    self.expect(Token::Semi)?;
                }
                Ok(())
            }
            _ if self.is_path_start() => {
                // item-position macro call
                self.parse_path(PathMode::Expr)?;
                self.expect(Token::Not)?;
                let is_brace = self.check(&Token::LBrace);
                self.parse_token_tree()?;
                if !is_brace {
                    self.eat(&Token::Semi);
                }
                Ok(())
            }
            _ => Err(self.error("expected item".to_string())),
        }
    }

    /// Consume up to and including the first top-level `;`
    fn skip_to_semi(&mut self) -> ParseResult<()> {
        while let Some(tok) = self.peek() {
            if tok.open_delimiter().is_some() {
                self.skip_group()?;
                continue;
            }
            if tok.close_delimiter().is_some() {
                break;
            }
            self.advance();
            if *tok == Token::Semi {
                return Ok(());
            }
        }
        Err(self.error("expected ';'".to_string()))
    }

    /// Consume up to and including a top-level `{ ... }` body or `;`
    fn skip_to_body_or_semi(&mut self) -> ParseResult<()> {
        while let Some(tok) = self.peek() {
            match tok {
                Token::LBrace => return self.skip_group(),
                Token::Semi => {
                    self.advance();
                    return Ok(());
                }
                t if t.open_delimiter().is_some() => self.skip_group()?,
                t if t.close_delimiter().is_some() => break,
                _ => self.advance(),
            }
        }
        Err(self.error("expected item body".to_string()))
    }

    // === Expressions ===

    pub fn parse_expr(&mut self) -> ParseResult<()> {
        self.parse_expr_inner(false)
    }

    fn parse_expr_no_struct(&mut self) -> ParseResult<()> {
        self.parse_expr_inner(true)
    }

    fn parse_expr_inner(&mut self, no_struct: bool) -> ParseResult<()> {
        if self.check(&Token::DotDot) || self.check(&Token::DotDotEq) {
            self.advance();
            if self.can_begin_expr() {
                self.parse_binary(no_struct)?;
            }
            return Ok(());
        }

        self.parse_binary(no_struct)?;

        if self.check(&Token::DotDot) || self.check(&Token::DotDotEq) {
            self.advance();
            if self.can_begin_expr() && !(no_struct && self.check(&Token::LBrace)) {
                self.parse_binary(no_struct)?;
            }
            return Ok(());
        }

        if is_assign_op(self.peek()) {
            self.advance();
            self.parse_expr_inner(no_struct)?;
        }
        Ok(())
    }

    fn parse_binary(&mut self, no_struct: bool) -> ParseResult<()> {
        self.parse_unary(no_struct)?;
        loop {
            if self.eat(&Token::As) {
                self.parse_type_no_bounds()?;
                continue;
            }
            let width = self.binop_width();
            if width == 0 {
                return Ok(());
            }
            for _ in 0..width {
                self.advance();
            }
            self.parse_unary(no_struct)?;
        }
    }

    /// Number of tokens forming the binary operator at the cursor (0 if none)
    fn binop_width(&self) -> usize {
        match self.peek() {
            Some(Token::Lt) if self.peek_nth(1) == Some(&Token::Lt) => 2,
            Some(Token::Gt) if self.peek_nth(1) == Some(&Token::Gt) => 2,
            Some(Token::Plus) | Some(Token::Minus) | Some(Token::Star) | Some(Token::Slash)
            | Some(Token::Percent) | Some(Token::Caret) | Some(Token::Amp) | Some(Token::Pipe)
            | Some(Token::AndAnd) | Some(Token::OrOr) | Some(Token::EqEq) | Some(Token::NotEq)
            | Some(Token::Lt) | Some(Token::Gt) | Some(Token::LtEq) | Some(Token::GtEq) => 1,
            _ => 0,
        }
    }

    fn parse_unary(&mut self, no_struct: bool) -> ParseResult<()> {
        match self.peek() {
            Some(Token::Minus) | Some(Token::Not) | Some(Token::Star) => {
                self.advance();
                self.parse_unary(no_struct)
            }
            Some(Token::Amp) | Some(Token::AndAnd) => {
                self.advance();
                self.eat(&Token::Mut);
                self.parse_unary(no_struct)
            }
            _ => self.parse_postfix(no_struct),
        }
    }

    fn parse_postfix(&mut self, no_struct: bool) -> ParseResult<()> {
        self.parse_primary(no_struct)?;
        loop {
            match self.peek() {
                Some(Token::Question) => self.advance(),
                Some(Token::LParen) | Some(Token::LBracket) => self.skip_group()?,
                Some(Token::Dot) => {
                    self.advance();
                    match self.peek() {
                        Some(Token::IntLiteral(_)) | Some(Token::FloatLiteral(_)) | Some(Token::Await) => {
                            self.advance()
                        }
                        Some(t) if t.ident_text().is_some() => {
                            self.advance();
                            if self.check(&Token::ColonColon) && self.peek_nth(1) == Some(&Token::Lt) {
                                self.advance();
                                self.parse_generic_args()?;
                            }
                        }
                        _ => return Err(self.error("expected field or method name".to_string())),
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn parse_primary(&mut self, no_struct: bool) -> ParseResult<()> {
        let Some(tok) = self.peek() else {
            return Err(self.error("expected expression".to_string()));
        };
        match tok {
            t if t.is_literal() => {
                self.advance();
                Ok(())
            }
            Token::LParen | Token::LBracket | Token::LBrace => self.skip_group(),
            Token::Lifetime(_) => {
                // labeled loop or block
                self.advance();
                self.expect(Token::Colon)?;
                self.parse_primary(no_struct)
            }
            Token::Unsafe | Token::Const => {
                self.advance();
                self.parse_block()
            }
            Token::Async => {
                self.advance();
                self.eat(&Token::Move);
                if self.check(&Token::Pipe) || self.check(&Token::OrOr) {
                    return self.parse_closure(no_struct);
                }
                self.parse_block()
            }
            Token::Move | Token::Pipe | Token::OrOr => self.parse_closure(no_struct),
            Token::If => self.parse_if(),
            Token::Match => {
                self.advance();
                self.parse_expr_no_struct()?;
                self.parse_block()
            }
            Token::Loop => {
                self.advance();
                self.parse_block()
            }
            Token::While => {
                self.advance();
                self.parse_condition()?;
                self.parse_block()
            }
            Token::For => {
                self.advance();
                self.parse_pattern()?;
                self.expect(Token::In)?;
                self.parse_expr_no_struct()?;
                self.parse_block()
            }
            Token::Return | Token::Break => {
                let is_break = *tok == Token::Break;
                self.advance();
                if is_break {
                    if let Some(Token::Lifetime(_)) = self.peek() {
                        self.advance();
                    }
                }
                if self.can_begin_expr() && !(no_struct && self.check(&Token::LBrace)) {
                    self.parse_expr_inner(no_struct)?;
                }
                Ok(())
            }
            Token::Continue => {
                self.advance();
                if let Some(Token::Lifetime(_)) = self.peek() {
                    self.advance();
                }
                Ok(())
            }
            _ if self.is_path_start() => {
                self.parse_path(PathMode::Expr)?;
                if self.check(&Token::Not) && self.peek_nth(1).and_then(|t| t.open_delimiter()).is_some() {
                    self.advance();
                    return self.skip_group();
                }
                if !no_struct && self.check(&Token::LBrace) {
                    self.skip_group()?;
                }
                Ok(())
            }
            _ => Err(self.error("expected expression".to_string())),
        }
    }

    fn parse_if(&mut self) -> ParseResult<()> {
        self.expect(Token::If)?;
        self.parse_condition()?;
        self.parse_block()?;
        if self.eat(&Token::Else) {
            if self.check(&Token::If) {
                return self.parse_if();
            }
            self.parse_block()?;
        }
        Ok(())
    }

    fn parse_condition(&mut self) -> ParseResult<()> {
        if self.eat(&Token::Let) {
            self.parse_pattern()?;
            self.expect(Token::Eq)?;
        }
        self.parse_expr_no_struct()?;
        while self.eat(&Token::AndAnd) {
            if self.eat(&Token::Let) {
                self.parse_pattern()?;
                self.expect(Token::Eq)?;
            }
            self.parse_expr_no_struct()?;
        }
        Ok(())
    }

    fn parse_closure(&mut self, no_struct: bool) -> ParseResult<()> {
        self.eat(&Token::Move);
        if !self.eat(&Token::OrOr) {
            self.expect(Token::Pipe)?;
            while !self.eat(&Token::Pipe) {
                match self.peek() {
                    Some(t) if t.open_delimiter().is_some() => self.skip_group()?,
                    Some(t) if t.close_delimiter().is_some() => {
                        return Err(self.error("unterminated closure parameters".to_string()));
                    }
                    Some(_) => self.advance(),
                    None => return Err(self.error("expected '|'".to_string())),
                }
            }
        }
        if self.eat(&Token::Arrow) {
            self.parse_type_no_bounds()?;
            return self.parse_block();
        }
        self.parse_expr_inner(no_struct)
    }

    fn can_begin_expr(&self) -> bool {
        match self.peek() {
            None => false,
            Some(t) if t.is_literal() => true,
            Some(
                Token::LParen
                | Token::LBracket
                | Token::LBrace
                | Token::Minus
                | Token::Not
                | Token::Star
                | Token::Amp
                | Token::AndAnd
                | Token::Pipe
                | Token::OrOr
                | Token::DotDot
                | Token::Lt
                | Token::ColonColon
                | Token::Lifetime(_)
                | Token::If
                | Token::Match
                | Token::Loop
                | Token::While
                | Token::For
                | Token::Return
                | Token::Break
                | Token::Continue
                | Token::Move
                | Token::Unsafe
                | Token::Async,
            ) => true,
            Some(_) => self.is_path_start(),
        }
    }
}

/// Keywords that can never start or continue a path
fn is_reserved_in_path(token: &Token) -> bool {
    matches!(
        token,
        Token::As
            | Token::Break
            | Token::Const
            | Token::Continue
            | Token::Else
            | Token::Enum
            | Token::Extern
            | Token::False
            | Token::Fn
            | Token::For
            | Token::If
            | Token::Impl
            | Token::In
            | Token::Let
            | Token::Loop
            | Token::Match
            | Token::Mod
            | Token::Move
            | Token::Mut
            | Token::Pub
            | Token::Ref
            | Token::Return
            | Token::Static
            | Token::Struct
            | Token::Trait
            | Token::True
            | Token::Type
            | Token::Unsafe
            | Token::Use
            | Token::Where
            | Token::While
            | Token::Async
            | Token::Await
            | Token::Dyn
    )
}

fn is_assign_op(token: Option<&Token>) -> bool {
    matches!(
        token,
        Some(
            Token::Eq
                | Token::PlusEq
                | Token::MinusEq
                | Token::StarEq
                | Token::SlashEq
                | Token::PercentEq
                | Token::CaretEq
                | Token::AmpEq
                | Token::PipeEq
        )
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferrite_syntax::TokenStream;

    /// Number of tokens a fragment of `kind` consumes from the start of `text`
    fn consumed(text: &str, kind: FragmentKind) -> Option<usize> {
        let stream = TokenStream::lex(text).unwrap();
        parse_fragment(stream.tokens(), 0, kind).ok()
    }

    #[test]
    fn test_expr_stops_at_comma() {
        assert_eq!(consumed("1 + 2 * x, 3", FragmentKind::Expr), Some(5));
        assert_eq!(consumed("foo(a, b).bar[0]?", FragmentKind::Expr), Some(12));
    }

    #[test]
    fn test_expr_keyword_forms() {
        assert_eq!(consumed("if a { b } else { c } => x", FragmentKind::Expr), Some(9));
        assert_eq!(consumed("match x { _ => 1 }", FragmentKind::Expr), Some(7));
        assert_eq!(consumed("|x| x + 1", FragmentKind::Expr), Some(6));
        assert_eq!(consumed("Point { x: 1 }", FragmentKind::Expr), Some(6));
    }

    #[test]
    fn test_if_condition_is_not_struct_literal() {
        assert_eq!(consumed("if x { 1 } else { 2 }", FragmentKind::Expr), Some(9));
    }

    #[test]
    fn test_type_fragment() {
        assert_eq!(consumed("Vec<Option<u8>> ;", FragmentKind::Ty), Some(7));
        assert_eq!(consumed("&'a mut [T; 4]", FragmentKind::Ty), Some(8));
        assert_eq!(consumed("fn(u8) -> bool", FragmentKind::Ty), Some(6));
        assert_eq!(consumed("<T as Iterator>::Item", FragmentKind::Ty), Some(7));
    }

    #[test]
    fn test_path_fragment() {
        assert_eq!(consumed("std::vec::Vec<u8> x", FragmentKind::Path), Some(8));
        assert_eq!(consumed("1", FragmentKind::Path), None);
    }

    #[test]
    fn test_pattern_fragment() {
        assert_eq!(consumed("Some(x) | None =>", FragmentKind::Pat), Some(6));
        assert_eq!(consumed("Some(x) | None =>", FragmentKind::PatParam), Some(4));
        assert_eq!(consumed("ref mut y @ 1..=5", FragmentKind::Pat), Some(7));
    }

    #[test]
    fn test_vis_may_be_empty() {
        assert_eq!(consumed("struct", FragmentKind::Vis), Some(0));
        assert_eq!(consumed("pub(crate) fn", FragmentKind::Vis), Some(4));
        assert_eq!(consumed("pub (u8)", FragmentKind::Vis), Some(1));
    }

    #[test]
    fn test_vis_with_cut_restriction_is_error() {
        let stream = TokenStream::lex("pub(crate) fn").unwrap();
        let cut = &stream.tokens()[..3];
        assert!(parse_fragment(cut, 0, FragmentKind::Vis).is_err());
        assert!(parse_fragment(cut, 0, FragmentKind::Item).is_err());
        assert_eq!(parse_fragment(stream.tokens(), 0, FragmentKind::Vis).ok(), Some(4));
    }

    #[test]
    fn test_item_fragment() {
        assert_eq!(consumed("fn f() -> u8 { 1 } fn g", FragmentKind::Item), Some(9));
        assert_eq!(consumed("pub struct S(u8); x", FragmentKind::Item), Some(7));
        assert_eq!(consumed("const X: u8 = { 1 }; y", FragmentKind::Item), Some(9));
        assert_eq!(consumed("1 + 1", FragmentKind::Item), None);
    }

    #[test]
    fn test_stmt_fragment() {
        assert_eq!(consumed("let x: u8 = 5; y", FragmentKind::Stmt), Some(6));
        assert_eq!(consumed("x += 1", FragmentKind::Stmt), Some(3));
    }

    #[test]
    fn test_simple_fragments() {
        assert_eq!(consumed("fn", FragmentKind::Ident), Some(1));
        assert_eq!(consumed("_", FragmentKind::Ident), None);
        assert_eq!(consumed("'a", FragmentKind::Lifetime), Some(1));
        assert_eq!(consumed("-1", FragmentKind::Literal), Some(2));
        assert_eq!(consumed("x", FragmentKind::Literal), None);
        assert_eq!(consumed("(a b) c", FragmentKind::Tt), Some(4));
        assert_eq!(consumed("{ 1 }", FragmentKind::Block), Some(3));
        assert_eq!(consumed("derive(Debug)", FragmentKind::Meta), Some(4));
        assert_eq!(consumed("doc = \"x\"", FragmentKind::Meta), Some(3));
    }

    #[test]
    fn test_fragment_kind_names() {
        assert_eq!(FragmentKind::from_name("expr"), Some(FragmentKind::Expr));
        assert_eq!(FragmentKind::from_name("bogus"), None);
        assert!(FragmentKind::Vis.allows_empty());
        assert!(!FragmentKind::Tt.allows_empty());
    }
}
