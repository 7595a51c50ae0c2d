//! Keyword classification for EdgeQL.
//!
//! Reserved keywords map to dedicated token kinds. Unreserved keywords lex
//! as identifiers and are recognized positionally by the parser (e.g. `TYPE`
//! in DDL), so they remain usable as ordinary names.

use crate::lexer::token::TokenKind;

/// Looks up a reserved keyword, case-insensitively.
///
/// Returns `None` for anything else, including unreserved keywords.
pub fn lookup_keyword(text: &str) -> Option<TokenKind> {
    // `self` and `__subject__` are anchors with fixed spelling.
    match text {
        "self" => return Some(TokenKind::SelfKw),
        "__subject__" => return Some(TokenKind::Subject),
        _ => {}
    }

    let upper = text.to_ascii_uppercase();
    let kind = match upper.as_str() {
        "SELECT" => TokenKind::Select,
        "FOR" => TokenKind::For,
        "GROUP" => TokenKind::Group,
        "INSERT" => TokenKind::Insert,
        "UPDATE" => TokenKind::Update,
        "DELETE" => TokenKind::Delete,
        "WITH" => TokenKind::With,
        "MODULE" => TokenKind::Module,
        "FILTER" => TokenKind::Filter,
        "ORDER" => TokenKind::Order,
        "BY" => TokenKind::By,
        "OFFSET" => TokenKind::Offset,
        "LIMIT" => TokenKind::Limit,
        "UNION" => TokenKind::Union,
        "DISTINCT" => TokenKind::Distinct,
        "IF" => TokenKind::If,
        "ELSE" => TokenKind::Else,
        "OR" => TokenKind::Or,
        "AND" => TokenKind::And,
        "NOT" => TokenKind::Not,
        "IN" => TokenKind::In,
        "IS" => TokenKind::Is,
        "LIKE" => TokenKind::Like,
        "ILIKE" => TokenKind::Ilike,
        "EXISTS" => TokenKind::Exists,
        "TRUE" => TokenKind::True,
        "FALSE" => TokenKind::False,
        "EMPTY" => TokenKind::Empty,
        "SET" => TokenKind::Set,
        "CREATE" => TokenKind::Create,
        "ALTER" => TokenKind::Alter,
        "DROP" => TokenKind::Drop,
        "FROM" => TokenKind::From,
        "COMMIT" => TokenKind::Commit,
        "ROLLBACK" => TokenKind::Rollback,
        "FUNCTION" => TokenKind::Function,
        "AGGREGATE" => TokenKind::Aggregate,
        _ => return None,
    };
    Some(kind)
}

/// Unreserved keywords: contextual words the parser matches by text.
pub const UNRESERVED_KEYWORDS: &[&str] = &[
    "abstract",
    "action",
    "after",
    "asc",
    "attribute",
    "before",
    "cardinality",
    "constraint",
    "database",
    "delegated",
    "desc",
    "event",
    "extending",
    "final",
    "first",
    "initial",
    "into",
    "last",
    "link",
    "migration",
    "named",
    "of",
    "on",
    "only",
    "optional",
    "policy",
    "property",
    "rename",
    "required",
    "scalar",
    "source",
    "target",
    "then",
    "to",
    "transaction",
    "type",
    "using",
    "value",
    "variadic",
    "view",
];

/// True if `text` is an unreserved (contextual) keyword.
pub fn is_unreserved_keyword(text: &str) -> bool {
    let lower = text.to_ascii_lowercase();
    UNRESERVED_KEYWORDS.binary_search(&lower.as_str()).is_ok()
}

/// True if `text` spells a reserved keyword (any casing).
pub fn is_reserved_keyword(text: &str) -> bool {
    lookup_keyword(text).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_lookup_is_case_insensitive() {
        assert_eq!(lookup_keyword("select"), Some(TokenKind::Select));
        assert_eq!(lookup_keyword("Select"), Some(TokenKind::Select));
        assert_eq!(lookup_keyword("SELECT"), Some(TokenKind::Select));
    }

    #[test]
    fn anchors_are_exact_spelling() {
        assert_eq!(lookup_keyword("self"), Some(TokenKind::SelfKw));
        assert_eq!(lookup_keyword("SELF"), None);
        assert_eq!(lookup_keyword("__subject__"), Some(TokenKind::Subject));
    }

    #[test]
    fn unreserved_words_are_not_reserved() {
        assert_eq!(lookup_keyword("view"), None);
        assert!(is_unreserved_keyword("view"));
        assert!(is_unreserved_keyword("VIEW"));
        assert!(!is_unreserved_keyword("flavor"));
    }

    #[test]
    fn unreserved_table_is_sorted() {
        let mut sorted = UNRESERVED_KEYWORDS.to_vec();
        sorted.sort_unstable();
        assert_eq!(sorted, UNRESERVED_KEYWORDS);
    }

    #[test]
    fn reserved_covers_statement_starters() {
        for kw in ["SELECT", "FOR", "GROUP", "INSERT", "UPDATE", "DELETE", "WITH"] {
            assert!(is_reserved_keyword(kw), "{kw} must be reserved");
        }
    }
}
