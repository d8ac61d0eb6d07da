//! SQL merging
//!
//! Replaces literal values with `?` so that statements differing only in
//! their literals aggregate into one counter. `IN (...)` lists collapse to a
//! single placeholder, keywords are upper-cased and whitespace and comments
//! are normalized away.

use sqlparser::dialect::GenericDialect;
use sqlparser::keywords::Keyword;
use sqlparser::tokenizer::{Token, Tokenizer};

/// Normalize a statement for aggregation.
///
/// Statements that fail to tokenize are returned trimmed but otherwise
/// unchanged.
///
/// # Example
///
/// ```
/// use minidruid_monitor::merge_sql;
///
/// assert_eq!(
///     merge_sql("select * from t_user where u_age > 30"),
///     merge_sql("SELECT *  FROM t_user WHERE u_age > 42"),
/// );
/// ```
pub fn merge_sql(sql: &str) -> String {
    let dialect = GenericDialect {};
    let tokens = match Tokenizer::new(&dialect, sql).tokenize() {
        Ok(tokens) => tokens,
        Err(e) => {
            tracing::debug!(error = %e, "sql merge skipped, tokenizer failed");
            return sql.trim().to_string();
        }
    };

    let significant: Vec<Token> = tokens
        .into_iter()
        .filter(|t| !matches!(t, Token::Whitespace(_) | Token::EOF))
        .collect();

    let parameterized = parameterize(significant);
    let collapsed = collapse_in_lists(parameterized);
    render(&collapsed)
}

fn placeholder() -> Token {
    Token::Placeholder("?".to_string())
}

fn is_literal(token: &Token) -> bool {
    match token {
        Token::Number(_, _)
        | Token::SingleQuotedString(_)
        | Token::DoubleQuotedString(_)
        | Token::NationalStringLiteral(_)
        | Token::EscapedStringLiteral(_)
        | Token::HexStringLiteral(_)
        | Token::Placeholder(_) => true,
        Token::Word(w) => {
            w.quote_style.is_none() && matches!(w.keyword, Keyword::TRUE | Keyword::FALSE)
        }
        _ => false,
    }
}

/// Whether `token` ends an operand, making a following `-` a binary minus
fn ends_operand(token: &Token) -> bool {
    match token {
        Token::RParen | Token::Number(_, _) | Token::Placeholder(_) => true,
        Token::Word(w) => w.quote_style.is_some() || w.keyword == Keyword::NoKeyword,
        other => is_literal(other),
    }
}

fn parameterize(tokens: Vec<Token>) -> Vec<Token> {
    let mut out: Vec<Token> = Vec::with_capacity(tokens.len());
    let mut iter = tokens.into_iter().peekable();

    while let Some(token) = iter.next() {
        if token == Token::Minus {
            let unary = out.last().map_or(true, |prev| !ends_operand(prev));
            if unary && matches!(iter.peek(), Some(Token::Number(_, _))) {
                // the sign belongs to the literal
                continue;
            }
        }

        if is_literal(&token) {
            out.push(placeholder());
        } else {
            out.push(token);
        }
    }
    out
}

fn collapse_in_lists(tokens: Vec<Token>) -> Vec<Token> {
    let mut out: Vec<Token> = Vec::with_capacity(tokens.len());
    let mut i = 0;

    while i < tokens.len() {
        let is_in = matches!(&tokens[i], Token::Word(w) if w.keyword == Keyword::IN);
        if is_in && tokens.get(i + 1) == Some(&Token::LParen) {
            // find `? (, ?)* )`
            let mut j = i + 2;
            let mut values = 0;
            loop {
                match tokens.get(j) {
                    Some(Token::Placeholder(_)) => {
                        values += 1;
                        j += 1;
                        match tokens.get(j) {
                            Some(Token::Comma) => j += 1,
                            Some(Token::RParen) => break,
                            _ => {
                                values = 0;
                                break;
                            }
                        }
                    }
                    _ => {
                        values = 0;
                        break;
                    }
                }
            }

            if values > 0 {
                out.push(tokens[i].clone());
                out.push(Token::LParen);
                out.push(placeholder());
                out.push(Token::RParen);
                i = j + 1;
                continue;
            }
        }

        out.push(tokens[i].clone());
        i += 1;
    }
    out
}

fn render(tokens: &[Token]) -> String {
    let mut sql = String::new();
    let mut prev: Option<&Token> = None;

    for token in tokens {
        let space = match (prev, token) {
            (None, _) => false,
            (Some(Token::LParen | Token::Period), _) => false,
            (_, Token::RParen | Token::Comma | Token::Period) => false,
            // function call: no space between name and argument list
            (Some(Token::Word(w)), Token::LParen) => {
                w.keyword != Keyword::NoKeyword || w.quote_style.is_some()
            }
            _ => true,
        };

        if space {
            sql.push(' ');
        }
        match token {
            Token::Word(w) if w.quote_style.is_none() && w.keyword != Keyword::NoKeyword => {
                sql.push_str(&w.value.to_uppercase());
            }
            other => sql.push_str(&other.to_string()),
        }
        prev = Some(token);
    }
    sql
}
