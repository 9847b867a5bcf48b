//! SQLite dialect, used by the bundled execution store.
//!
//! Double-quoted identifiers, 1/0 booleans, `strftime` based date parts.
//! OFFSET is only legal after a LIMIT.

use super::helpers;
use super::SqlDialect;
use crate::sql::token::TokenStream;

#[derive(Debug, Clone, Copy)]
pub struct Sqlite;

impl SqlDialect for Sqlite {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_double(ident)
    }

    fn format_bool(&self, b: bool) -> &'static str {
        helpers::format_bool_numeric(b)
    }

    fn emit_limit_offset(&self, limit: Option<u64>, offset: Option<u64>) -> TokenStream {
        helpers::emit_limit_offset_sqlite(limit, offset)
    }

    fn supports_nulls_ordering(&self) -> bool {
        // NULLS FIRST/LAST only since 3.30
        false
    }

    fn remap_function(&self, name: &str) -> Option<&'static str> {
        helpers::remap_function_sqlite(name)
    }

    fn emit_extract(&self, part: &str, operand: TokenStream) -> TokenStream {
        helpers::emit_extract_sqlite(part, operand)
    }
}
