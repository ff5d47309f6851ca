#![allow(clippy::module_name_repetitions)]

//! Lexer and parser for the presence console.
//!
//! The lexer uses `regal` to produce a bounded token stream, while the parser
//! composes `winnow` parsers over those tokens to build [`Command`] values.
//! Keywords and arguments match case-insensitively.

use core::fmt;
use core::ops::Range;
use core::str::FromStr;

use heapless::Vec as HeaplessVec;
use regal::IncrementalError;
use regal::TokenCache;
use regal_macros::RegalLexer;
#[allow(deprecated)]
use winnow::error::ErrorKind;
use winnow::error::{ErrMode, ParserError};
use winnow::prelude::*;
use winnow::stream::Stream;

use crate::state::Device;

/// Maximum number of tokens produced per console line.
pub const MAX_TOKENS: usize = 16;
const MAX_CACHE_RECORDS: usize = MAX_TOKENS * 2;

/// Tick count used when `tick` has no argument.
pub const DEFAULT_TICK_COUNT: u32 = 1;

/// Lexical token kinds recognized by the console grammar.
#[derive(RegalLexer, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum TokenKind {
    /// Unsigned decimal literal.
    #[regex(r"[0-9]+")]
    Integer,
    /// Keyword or help topic.
    #[regex(r"[A-Za-z][A-Za-z0-9-]*")]
    Ident,
    #[regex(r"[ \t]+", skip)]
    Whitespace,
    #[token("\r\n")]
    #[token("\n")]
    #[token("\r")]
    Eol,
    /// Anything else; always rejected by [`parse`].
    #[default]
    #[regex(r".", priority = 1024)]
    Error,
}

/// Token emitted by the lexer with a byte span back into the source line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub lexeme: &'a str,
    pub span: Range<usize>,
}

pub type TokenBuffer<'a> = HeaplessVec<Token<'a>, MAX_TOKENS>;

/// Lexer errors.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LexError {
    /// The line produced more tokens than [`MAX_TOKENS`].
    TooManyTokens { processed: usize },
    /// Underlying lexer reported an unrecoverable error.
    Engine,
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LexError::TooManyTokens { processed } => {
                write!(f, "token buffer exhausted after {processed} items")
            }
            LexError::Engine => write!(f, "lexer engine error"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GrammarErrorKind<'a> {
    UnexpectedToken {
        expected: &'static str,
        found: &'a str,
        span: Range<usize>,
    },
    UnexpectedEnd {
        expected: &'static str,
    },
    /// Integer literal that does not fit or is below the command's minimum.
    InvalidInteger {
        span: Range<usize>,
        lexeme: &'a str,
    },
    InvalidToken {
        span: Range<usize>,
        lexeme: &'a str,
    },
}

impl fmt::Display for GrammarErrorKind<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GrammarErrorKind::UnexpectedToken {
                expected, found, ..
            } => write!(f, "expected {expected}, found `{found}`"),
            GrammarErrorKind::UnexpectedEnd { expected } => {
                write!(f, "unexpected end of input, expected {expected}")
            }
            GrammarErrorKind::InvalidInteger { lexeme, .. } => {
                write!(f, "invalid count `{lexeme}`")
            }
            GrammarErrorKind::InvalidToken { lexeme, .. } => {
                write!(f, "unsupported token `{lexeme}`")
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GrammarError<'a> {
    pub kind: GrammarErrorKind<'a>,
}

impl fmt::Display for GrammarError<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.kind.fmt(f)
    }
}

impl<'a> GrammarError<'a> {
    fn unexpected(expected: &'static str, token: Option<&Token<'a>>) -> Self {
        GrammarError {
            kind: match token {
                Some(tok) => GrammarErrorKind::UnexpectedToken {
                    expected,
                    found: tok.lexeme,
                    span: tok.span.clone(),
                },
                None => GrammarErrorKind::UnexpectedEnd { expected },
            },
        }
    }

    fn invalid_integer(token: &Token<'a>) -> Self {
        GrammarError {
            kind: GrammarErrorKind::InvalidInteger {
                span: token.span.clone(),
                lexeme: token.lexeme,
            },
        }
    }

    fn invalid_token(token: &Token<'a>) -> Self {
        GrammarError {
            kind: GrammarErrorKind::InvalidToken {
                span: token.span.clone(),
                lexeme: token.lexeme,
            },
        }
    }
}

type Input<'src, 'slice> = &'slice [Token<'src>];

#[allow(deprecated)]
impl<'src, 'slice> ParserError<Input<'src, 'slice>> for GrammarError<'src>
where
    'src: 'slice,
{
    fn from_error_kind(input: &Input<'src, 'slice>, _kind: ErrorKind) -> Self {
        GrammarError::unexpected("token", input.first())
    }

    fn append(
        self,
        _input: &Input<'src, 'slice>,
        _token_start: &<Input<'src, 'slice> as Stream>::Checkpoint,
        _kind: ErrorKind,
    ) -> Self {
        self
    }

    fn or(self, other: Self) -> Self {
        other
    }
}

/// Combined lex/parse error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParseError<'a> {
    Lex(LexError),
    Grammar(GrammarError<'a>),
}

impl fmt::Display for ParseError<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::Lex(err) => err.fmt(f),
            ParseError::Grammar(err) => err.fmt(f),
        }
    }
}

/// Structured commands produced by the parser.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command<'a> {
    /// `ap|ec|servo high|low`
    Line(LineCommand),
    /// `tick [count]`
    Tick(TickCommand),
    /// `ignore on|off`
    Ignore(bool),
    /// `bitbang on|off`
    Bitbang(bool),
    Commit,
    Status,
    /// `log [count]`
    Log(LogCommand),
    /// `help [topic]`
    Help(HelpCommand<'a>),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LineCommand {
    pub device: Device,
    pub asserted: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TickCommand {
    /// Always at least one.
    pub count: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LogCommand {
    pub count: Option<usize>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HelpCommand<'a> {
    pub topic: Option<&'a str>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Keyword {
    Line(Device),
    Tick,
    Ignore,
    Bitbang,
    Commit,
    Status,
    Log,
    Help,
}

const KEYWORDS: [(&str, Keyword); 10] = [
    ("ap", Keyword::Line(Device::Ap)),
    ("ec", Keyword::Line(Device::Ec)),
    ("servo", Keyword::Line(Device::Servo)),
    ("tick", Keyword::Tick),
    ("ignore", Keyword::Ignore),
    ("bitbang", Keyword::Bitbang),
    ("commit", Keyword::Commit),
    ("status", Keyword::Status),
    ("log", Keyword::Log),
    ("help", Keyword::Help),
];

const LEVELS: [(&str, bool); 4] = [("high", true), ("1", true), ("low", false), ("0", false)];

const SWITCHES: [(&str, bool); 4] = [
    ("on", true),
    ("enable", true),
    ("off", false),
    ("disable", false),
];

pub(crate) fn parse_tokens_partial<'src, 'slice>(
    tokens: &'slice [Token<'src>],
) -> Result<(Command<'src>, &'slice [Token<'src>]), GrammarError<'src>>
where
    'src: 'slice,
{
    let mut input = tokens;
    match command().parse_next(&mut input) {
        Ok(cmd) => Ok((cmd, input)),
        Err(ErrMode::Backtrack(err) | ErrMode::Cut(err)) => Err(err),
        Err(ErrMode::Incomplete(_)) => Err(GrammarError::unexpected("token", input.first())),
    }
}

/// Tokenize the provided line.
pub fn lex(line: &str) -> Result<TokenBuffer<'_>, LexError> {
    let compiled = TokenKind::lexer();
    let mut cache: TokenCache<TokenKind, MAX_CACHE_RECORDS> = TokenCache::new();
    let partial = cache
        .rebuild(compiled, line)
        .map_err(map_incremental_error)?;
    let mut buffer = TokenBuffer::new();

    for record in cache.tokens() {
        if record.skipped {
            continue;
        }

        let span = record.start..record.end;
        let lexeme = &line[span.clone()];
        push_token(&mut buffer, record.token, lexeme, span)?;
    }

    // A trailing fragment the lexer could not finish is surfaced as an error token.
    if let Some(partial) = partial.filter(|partial| !partial.fragment.is_empty()) {
        let start = partial.start;
        let span = start..start + partial.fragment.len();
        push_token(&mut buffer, TokenKind::Error, partial.fragment, span)?;
    }

    Ok(buffer)
}

fn push_token<'a>(
    buffer: &mut TokenBuffer<'a>,
    kind: TokenKind,
    lexeme: &'a str,
    span: Range<usize>,
) -> Result<(), LexError> {
    buffer
        .push(Token { kind, lexeme, span })
        .map_err(|_| LexError::TooManyTokens {
            processed: buffer.len() + 1,
        })
}

fn map_incremental_error(error: IncrementalError) -> LexError {
    match error {
        IncrementalError::TokenOverflow => LexError::TooManyTokens {
            processed: MAX_TOKENS,
        },
        _ => LexError::Engine,
    }
}

/// Parse a console command from the provided line.
pub fn parse(line: &str) -> Result<Command<'_>, ParseError<'_>> {
    let tokens = lex(line).map_err(ParseError::Lex)?;

    if let Some(token) = tokens.iter().find(|token| token.kind == TokenKind::Error) {
        return Err(ParseError::Grammar(GrammarError::invalid_token(token)));
    }

    let (command, mut rest) =
        parse_tokens_partial(tokens.as_slice()).map_err(ParseError::Grammar)?;

    while let Some((token, remaining)) = rest.split_first() {
        if token.kind == TokenKind::Eol {
            rest = remaining;
        } else {
            return Err(ParseError::Grammar(GrammarError::unexpected(
                "end of command",
                Some(token),
            )));
        }
    }

    Ok(command)
}

fn command<'src, 'slice>() -> impl Parser<Input<'src, 'slice>, Command<'src>, GrammarError<'src>>
where
    'src: 'slice,
{
    move |input: &mut Input<'src, 'slice>| {
        let snapshot = *input;
        let keyword_token = expect_kind(TokenKind::Ident, "command keyword").parse_next(input)?;

        let Some(keyword) = lookup(&KEYWORDS, keyword_token.lexeme) else {
            *input = snapshot;
            return Err(ErrMode::Backtrack(GrammarError::unexpected(
                "command keyword",
                Some(&keyword_token),
            )));
        };

        match keyword {
            Keyword::Line(device) => {
                let asserted = choice(&LEVELS, "high or low").parse_next(input)?;
                Ok(Command::Line(LineCommand { device, asserted }))
            }
            Keyword::Tick => {
                let count = optional_count(1_u32, "tick count").parse_next(input)?;
                Ok(Command::Tick(TickCommand {
                    count: count.unwrap_or(DEFAULT_TICK_COUNT),
                }))
            }
            Keyword::Ignore => choice(&SWITCHES, "on or off")
                .parse_next(input)
                .map(Command::Ignore),
            Keyword::Bitbang => choice(&SWITCHES, "on or off")
                .parse_next(input)
                .map(Command::Bitbang),
            Keyword::Commit => Ok(Command::Commit),
            Keyword::Status => Ok(Command::Status),
            Keyword::Log => {
                let count = optional_count(0_usize, "log count").parse_next(input)?;
                Ok(Command::Log(LogCommand { count }))
            }
            Keyword::Help => {
                let topic = optional_topic().parse_next(input)?;
                Ok(Command::Help(HelpCommand { topic }))
            }
        }
    }
}

fn lookup<T: Copy>(table: &[(&'static str, T)], lexeme: &str) -> Option<T> {
    table
        .iter()
        .find(|(word, _)| word.eq_ignore_ascii_case(lexeme))
        .map(|(_, value)| *value)
}

/// One word out of `table`. Digits are accepted so `1`/`0` can stand in for
/// `high`/`low`.
fn choice<'src, 'slice>(
    table: &'static [(&'static str, bool)],
    label: &'static str,
) -> impl Parser<Input<'src, 'slice>, bool, GrammarError<'src>>
where
    'src: 'slice,
{
    move |input: &mut Input<'src, 'slice>| match input.split_first() {
        Some((token, rest)) if matches!(token.kind, TokenKind::Ident | TokenKind::Integer) => {
            if let Some(value) = lookup(table, token.lexeme) {
                *input = rest;
                Ok(value)
            } else {
                Err(ErrMode::Backtrack(GrammarError::unexpected(
                    label,
                    Some(token),
                )))
            }
        }
        Some((token, _)) => Err(ErrMode::Backtrack(GrammarError::unexpected(
            label,
            Some(token),
        ))),
        None => Err(ErrMode::Backtrack(GrammarError::unexpected(label, None))),
    }
}

/// Optional trailing integer no smaller than `min`.
fn optional_count<'src, 'slice, T>(
    min: T,
    label: &'static str,
) -> impl Parser<Input<'src, 'slice>, Option<T>, GrammarError<'src>>
where
    'src: 'slice,
    T: FromStr + PartialOrd + Copy,
{
    move |input: &mut Input<'src, 'slice>| match input.split_first() {
        Some((token, rest)) if token.kind == TokenKind::Integer => {
            let value = parse_integer(token, min).map_err(ErrMode::Cut)?;
            *input = rest;
            Ok(Some(value))
        }
        Some((token, _)) if token.kind == TokenKind::Eol => Ok(None),
        Some((token, _)) => Err(ErrMode::Backtrack(GrammarError::unexpected(
            label,
            Some(token),
        ))),
        None => Ok(None),
    }
}

fn optional_topic<'src, 'slice>()
-> impl Parser<Input<'src, 'slice>, Option<&'src str>, GrammarError<'src>>
where
    'src: 'slice,
{
    move |input: &mut Input<'src, 'slice>| match input.split_first() {
        Some((token, rest)) if token.kind == TokenKind::Ident => {
            *input = rest;
            Ok(Some(token.lexeme))
        }
        Some((token, _)) if token.kind == TokenKind::Eol => Ok(None),
        Some((token, _)) => Err(ErrMode::Backtrack(GrammarError::unexpected(
            "help topic",
            Some(token),
        ))),
        None => Ok(None),
    }
}

fn expect_kind<'src, 'slice>(
    kind: TokenKind,
    label: &'static str,
) -> impl Parser<Input<'src, 'slice>, Token<'src>, GrammarError<'src>>
where
    'src: 'slice,
{
    move |input: &mut Input<'src, 'slice>| match input.split_first() {
        Some((token, rest)) if token.kind == kind => {
            *input = rest;
            Ok(token.clone())
        }
        Some((token, _)) => Err(ErrMode::Backtrack(GrammarError::unexpected(
            label,
            Some(token),
        ))),
        None => Err(ErrMode::Backtrack(GrammarError::unexpected(label, None))),
    }
}

fn parse_integer<'a, T>(token: &Token<'a>, min: T) -> Result<T, GrammarError<'a>>
where
    T: FromStr + PartialOrd,
{
    token
        .lexeme
        .parse::<T>()
        .ok()
        .filter(|value| *value >= min)
        .ok_or_else(|| GrammarError::invalid_integer(token))
}
