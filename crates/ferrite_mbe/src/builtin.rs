//! Compiler-provided macros evaluated without rule matching.

use ferrite_ast::{Path, PathKind};
use ferrite_syntax::{SpannedToken, Token, TokenStream};
use tracing::debug;

use crate::ExpandError;
use crate::expander::{Expander, join_fragment};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinMacro {
    Env,
    OptionEnv,
    Concat,
    Include,
    Stringify,
}

impl BuiltinMacro {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "env" => Some(BuiltinMacro::Env),
            "option_env" => Some(BuiltinMacro::OptionEnv),
            "concat" => Some(BuiltinMacro::Concat),
            "include" => Some(BuiltinMacro::Include),
            "stringify" => Some(BuiltinMacro::Stringify),
            _ => None,
        }
    }

    /// `env!`, `std::env!`, `::core::concat!` ...
    pub fn from_path(path: &Path) -> Option<Self> {
        if path.qualifier.is_some() {
            return None;
        }
        let (last, prefix) = path.segments.split_last()?;
        let prefix_ok = match (&path.kind, prefix) {
            (PathKind::Plain, []) => true,
            (PathKind::Plain | PathKind::Abs, [krate]) => krate.name == "std" || krate.name == "core",
            _ => false,
        };
        if !prefix_ok {
            return None;
        }
        Self::from_name(&last.name)
    }

    pub fn name(self) -> &'static str {
        match self {
            BuiltinMacro::Env => "env",
            BuiltinMacro::OptionEnv => "option_env",
            BuiltinMacro::Concat => "concat",
            BuiltinMacro::Include => "include",
            BuiltinMacro::Stringify => "stringify",
        }
    }
}

/// Value of a literal argument
#[derive(Debug, Clone, PartialEq)]
enum LitValue {
    Str(String),
    Char(char),
    /// Decimal text, sign included, suffix dropped
    Int(String),
    Float(String),
    Bool(bool),
}

impl LitValue {
    fn concat_text(&self) -> String {
        match self {
            LitValue::Str(s) => s.clone(),
            LitValue::Char(c) => c.to_string(),
            LitValue::Int(s) | LitValue::Float(s) => s.clone(),
            LitValue::Bool(b) => b.to_string(),
        }
    }
}

pub(crate) fn expand(
    expander: &Expander<'_>,
    builtin: BuiltinMacro,
    input: &str,
    depth: usize,
) -> Result<String, ExpandError> {
    let result = match builtin {
        BuiltinMacro::Stringify => stringify(input),
        BuiltinMacro::Env => {
            let args = arguments(expander, input, depth)?;
            let name = env_name(builtin, &args, 1..=2)?;
            match expander.host().env_var(name) {
                Some(value) => Ok(format!("{:?}", value)),
                None => Err(ExpandError::BuiltinFailed { name: builtin.name() }),
            }
        }
        BuiltinMacro::OptionEnv => {
            let args = arguments(expander, input, depth)?;
            let name = env_name(builtin, &args, 1..=1)?;
            match expander.host().env_var(name) {
                Some(value) => Ok(format!("Some({:?})", value)),
                None => Ok("None".to_string()),
            }
        }
        BuiltinMacro::Concat => {
            let args = arguments(expander, input, depth)?;
            let joined: String = args.iter().map(LitValue::concat_text).collect();
            Ok(format!("{:?}", joined))
        }
        BuiltinMacro::Include => {
            let args = arguments(expander, input, depth)?;
            match args.as_slice() {
                [LitValue::Str(path)] => expander
                    .host()
                    .read_file(path)
                    .ok_or(ExpandError::BuiltinFailed { name: builtin.name() }),
                _ => Err(ExpandError::BuiltinArgument { name: builtin.name() }),
            }
        }
    };
    if let Err(err) = &result {
        debug!(builtin = builtin.name(), error = %err, "builtin macro not expanded");
    }
    result
}

fn env_name(
    builtin: BuiltinMacro,
    args: &[LitValue],
    arity: std::ops::RangeInclusive<usize>,
) -> Result<&str, ExpandError> {
    if !arity.contains(&args.len()) {
        return Err(ExpandError::BuiltinArgument { name: builtin.name() });
    }
    match args.first() {
        Some(LitValue::Str(name)) => Ok(name),
        _ => Err(ExpandError::BuiltinArgument { name: builtin.name() }),
    }
}

fn stringify(input: &str) -> Result<String, ExpandError> {
    let stream = TokenStream::lex(input)?;
    let mut text = String::new();
    for i in 0..stream.len() {
        join_fragment(&mut text, stream.slice(i, i + 1));
    }
    Ok(format!("{:?}", text))
}

/// Evaluate the comma-separated arguments of a builtin. Each one must be a
/// literal or a macro invocation expanding to a literal.
fn arguments(expander: &Expander<'_>, input: &str, depth: usize) -> Result<Vec<LitValue>, ExpandError> {
    let stream = TokenStream::lex(input)?;
    let mut args = Vec::new();
    let mut start = 0;
    let mut i = 0;

    while i < stream.len() {
        match stream.get(i) {
            Some(Token::Comma) => {
                if i > start {
                    args.push(argument(expander, &stream, start, i, depth)?);
                }
                i += 1;
                start = i;
            }
            Some(t) if t.open_delimiter().is_some() => {
                i = stream.matching_close(i).map_or(stream.len(), |close| close + 1);
            }
            _ => i += 1,
        }
    }
    if start < stream.len() {
        args.push(argument(expander, &stream, start, stream.len(), depth)?);
    }
    Ok(args)
}

fn argument(
    expander: &Expander<'_>,
    stream: &TokenStream,
    start: usize,
    end: usize,
    depth: usize,
) -> Result<LitValue, ExpandError> {
    let tokens = &stream.tokens()[start..end];
    if let Some(value) = literal_value(tokens) {
        return Ok(value);
    }

    // `path!(...)` spanning the whole argument
    let bang = (start..end).find(|&i| stream.get(i) == Some(&Token::Not));
    let nested = bang.filter(|&b| {
        b > start
            && stream.get(b + 1).and_then(|t| t.open_delimiter()).is_some()
            && stream.matching_close(b + 1) == Some(end - 1)
    });
    let Some(bang) = nested else {
        return Err(ExpandError::BuiltinArgument { name: "argument" });
    };

    let path = Path::parse(stream.slice(start, bang));
    if path.segments.is_empty() {
        return Err(ExpandError::BuiltinArgument { name: "argument" });
    }
    let inner = stream.slice(bang + 2, end - 1);
    let expanded = expander.expand_path(&path, inner, depth + 1)?;
    let result = TokenStream::lex(&expanded)?;
    literal_value(result.tokens()).ok_or(ExpandError::BuiltinArgument { name: "argument" })
}

fn literal_value(tokens: &[SpannedToken]) -> Option<LitValue> {
    match tokens {
        [t] => single_literal(&t.token),
        [minus, t] if minus.token == Token::Minus => match single_literal(&t.token)? {
            LitValue::Int(s) => Some(LitValue::Int(format!("-{}", s))),
            LitValue::Float(s) => Some(LitValue::Float(format!("-{}", s))),
            _ => None,
        },
        _ => None,
    }
}

fn single_literal(token: &Token) -> Option<LitValue> {
    match token {
        Token::True => Some(LitValue::Bool(true)),
        Token::False => Some(LitValue::Bool(false)),
        Token::IntLiteral(text) => int_value(text).map(LitValue::Int),
        Token::FloatLiteral(text) => {
            let digits = text.trim_end_matches("f32").trim_end_matches("f64");
            Some(LitValue::Float(digits.replace('_', "")))
        }
        Token::StrLiteral(text) => string_value(text).map(LitValue::Str),
        Token::CharLiteral(text) => char_value(text).map(LitValue::Char),
        _ => None,
    }
}

const INT_SUFFIXES: [&str; 12] = [
    "i128", "u128", "isize", "usize", "i16", "u16", "i32", "u32", "i64", "u64", "i8", "u8",
];

fn int_value(text: &str) -> Option<String> {
    let mut digits = text;
    let (radix, body) = match digits.get(..2) {
        Some("0x") => (16, &digits[2..]),
        Some("0o") => (8, &digits[2..]),
        Some("0b") => (2, &digits[2..]),
        _ => (10, digits),
    };
    digits = body;
    if let Some(stripped) = INT_SUFFIXES.iter().find_map(|s| digits.strip_suffix(s)) {
        digits = stripped;
    }
    let cleaned: String = digits.chars().filter(|c| *c != '_').collect();
    u128::from_str_radix(&cleaned, radix).ok().map(|v| v.to_string())
}

fn string_value(text: &str) -> Option<String> {
    // byte strings are not valid `concat!` input
    if text.starts_with('b') {
        return None;
    }
    if let Some(raw) = text.strip_prefix('r') {
        let hashes = raw.len() - raw.trim_start_matches('#').len();
        return raw.get(hashes + 1..raw.len() - hashes - 1).map(str::to_string);
    }
    let inner = text.strip_prefix('"')?.strip_suffix('"')?;
    unescape(inner)
}

fn char_value(text: &str) -> Option<char> {
    if text.starts_with('b') {
        return None;
    }
    let inner = text.strip_prefix('\'')?.strip_suffix('\'')?;
    let value = unescape(inner)?;
    let mut chars = value.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Some(c),
        _ => None,
    }
}

fn unescape(text: &str) -> Option<String> {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next()? {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            '0' => out.push('\0'),
            '\\' => out.push('\\'),
            '\'' => out.push('\''),
            '"' => out.push('"'),
            'x' => {
                let hex: String = chars.by_ref().take(2).collect();
                let value = u8::from_str_radix(&hex, 16).ok()?;
                out.push(char::from(value));
            }
            'u' => {
                if chars.next()? != '{' {
                    return None;
                }
                let hex: String = chars.by_ref().take_while(|c| *c != '}').collect();
                let value = u32::from_str_radix(&hex.replace('_', ""), 16).ok()?;
                out.push(char::from_u32(value)?);
            }
            // line continuation
            '\n' => {
                while chars.peek().is_some_and(|c| c.is_whitespace()) {
                    chars.next();
                }
            }
            _ => return None,
        }
    }
    Some(out)
}
