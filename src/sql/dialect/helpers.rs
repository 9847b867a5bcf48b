//! Shared building blocks for the [`SqlDialect`](super::SqlDialect)
//! implementations.

use super::super::token::{Token, TokenStream};

// =============================================================================
// Identifier Quoting
// =============================================================================

/// Double quotes. Used by Postgres, DuckDB and SQLite.
pub fn quote_double(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Backticks. Used by MySQL.
pub fn quote_backtick(ident: &str) -> String {
    format!("`{}`", ident.replace('`', "``"))
}

/// Square brackets. Used by T-SQL.
pub fn quote_bracket(ident: &str) -> String {
    format!("[{}]", ident.replace(']', "]]"))
}

// =============================================================================
// String Quoting
// =============================================================================

pub fn quote_string_single(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// N'...' prefix for T-SQL unicode strings.
pub fn quote_string_unicode(s: &str) -> String {
    format!("N'{}'", s.replace('\'', "''"))
}

// =============================================================================
// Boolean Formatting
// =============================================================================

pub fn format_bool_literal(b: bool) -> &'static str {
    if b {
        "true"
    } else {
        "false"
    }
}

pub fn format_bool_numeric(b: bool) -> &'static str {
    if b {
        "1"
    } else {
        "0"
    }
}

// =============================================================================
// Pagination
// =============================================================================

/// `LIMIT n OFFSET m`.
pub fn emit_limit_offset_standard(limit: Option<u64>, offset: Option<u64>) -> TokenStream {
    let mut ts = TokenStream::new();

    if let Some(lim) = limit {
        ts.push(Token::Limit)
            .space()
            .push(Token::LitInt(lim as i64));
    }

    if let Some(off) = offset {
        if limit.is_some() {
            ts.space();
        }
        ts.push(Token::Offset)
            .space()
            .push(Token::LitInt(off as i64));
    }

    ts
}

/// SQLite only accepts OFFSET after a LIMIT; `-1` means unbounded.
pub fn emit_limit_offset_sqlite(limit: Option<u64>, offset: Option<u64>) -> TokenStream {
    match (limit, offset) {
        (None, Some(off)) => {
            let mut ts = TokenStream::new();
            ts.push(Token::Limit)
                .space()
                .push(Token::LitInt(-1))
                .space()
                .push(Token::Offset)
                .space()
                .push(Token::LitInt(off as i64));
            ts
        }
        _ => emit_limit_offset_standard(limit, offset),
    }
}

/// `OFFSET m ROWS FETCH NEXT n ROWS ONLY`. Requires ORDER BY in T-SQL.
pub fn emit_limit_offset_tsql(limit: Option<u64>, offset: Option<u64>) -> TokenStream {
    let mut ts = TokenStream::new();

    let off = offset.unwrap_or(0);
    ts.push(Token::Offset)
        .space()
        .push(Token::LitInt(off as i64))
        .space()
        .push(Token::Rows);

    if let Some(lim) = limit {
        ts.space()
            .push(Token::Fetch)
            .space()
            .push(Token::Next)
            .space()
            .push(Token::LitInt(lim as i64))
            .space()
            .push(Token::Rows)
            .space()
            .push(Token::Only);
    }

    ts
}

// =============================================================================
// Date part extraction
// =============================================================================

/// `EXTRACT(PART FROM operand)`.
pub fn emit_extract_standard(part: &str, operand: TokenStream) -> TokenStream {
    let mut ts = TokenStream::new();
    ts.push(Token::Extract)
        .lparen()
        .push(Token::DatePart(part.to_string()))
        .space()
        .push(Token::From)
        .space()
        .append(&operand)
        .rparen();
    ts
}

/// `DATEPART(PART, operand)`.
pub fn emit_extract_tsql(part: &str, operand: TokenStream) -> TokenStream {
    let mut ts = TokenStream::new();
    ts.push(Token::FunctionName("DATEPART".into()))
        .lparen()
        .push(Token::DatePart(part.to_string()))
        .comma()
        .space()
        .append(&operand)
        .rparen();
    ts
}

/// SQLite has no EXTRACT; map the part onto a strftime format and cast back.
pub fn emit_extract_sqlite(part: &str, operand: TokenStream) -> TokenStream {
    let format = match part.to_ascii_lowercase().as_str() {
        "year" => "%Y",
        "month" => "%m",
        "day" => "%d",
        "hour" => "%H",
        "minute" => "%M",
        "second" => "%S",
        "dow" | "weekday" => "%w",
        "doy" => "%j",
        "week" => "%W",
        _ => return emit_extract_standard(part, operand),
    };
    let mut ts = TokenStream::new();
    ts.push(Token::FunctionName("CAST".into()))
        .lparen()
        .push(Token::FunctionName("STRFTIME".into()))
        .lparen()
        .push(Token::LitString(format.into()))
        .comma()
        .space()
        .append(&operand)
        .rparen()
        .space()
        .push(Token::As)
        .space()
        .push(Token::Raw("INTEGER".into()))
        .rparen();
    ts
}

// =============================================================================
// Function Remapping
// =============================================================================

pub fn remap_function_postgres(name: &str) -> Option<&'static str> {
    match name.to_uppercase().as_str() {
        "STRFTIME" => Some("TO_CHAR"),
        "DATE_FORMAT" => Some("TO_CHAR"),
        "NVL" => Some("COALESCE"),
        "IFNULL" => Some("COALESCE"),
        "ISNULL" => Some("COALESCE"),
        _ => None,
    }
}

pub fn remap_function_duckdb(name: &str) -> Option<&'static str> {
    match name.to_uppercase().as_str() {
        "TO_CHAR" => Some("STRFTIME"),
        "DATE_FORMAT" => Some("STRFTIME"),
        "NVL" => Some("COALESCE"),
        "IFNULL" => Some("COALESCE"),
        "ISNULL" => Some("COALESCE"),
        _ => None,
    }
}

pub fn remap_function_mysql(name: &str) -> Option<&'static str> {
    match name.to_uppercase().as_str() {
        "STRFTIME" => Some("DATE_FORMAT"),
        "TO_CHAR" => Some("DATE_FORMAT"),
        "NVL" => Some("IFNULL"),
        "ISNULL" => Some("IFNULL"),
        "SUBSTR" => Some("SUBSTRING"),
        _ => None,
    }
}

pub fn remap_function_tsql(name: &str) -> Option<&'static str> {
    match name.to_uppercase().as_str() {
        "LENGTH" => Some("LEN"),
        "SUBSTR" => Some("SUBSTRING"),
        "NOW" => Some("GETDATE"),
        "STRFTIME" => Some("FORMAT"),
        "TO_CHAR" => Some("FORMAT"),
        "NVL" => Some("ISNULL"),
        "IFNULL" => Some("ISNULL"),
        "STDDEV" => Some("STDEV"),
        "VARIANCE" => Some("VAR"),
        _ => None,
    }
}

pub fn remap_function_sqlite(name: &str) -> Option<&'static str> {
    match name.to_uppercase().as_str() {
        "NVL" => Some("IFNULL"),
        "ISNULL" => Some("IFNULL"),
        "SUBSTRING" => Some("SUBSTR"),
        "LEN" => Some("LENGTH"),
        _ => None,
    }
}
