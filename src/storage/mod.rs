pub mod migrations;
pub mod retention;
pub mod sqlite;
pub mod store;

pub use store::{NewStoreOptions, Store};

/// Plain SQL identifier: ASCII letter or underscore, then letters, digits or
/// underscores. Table names are interpolated into SQL, so nothing else passes.
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    name.len() <= 64 && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Double-quote an identifier that already passed `is_valid_identifier`.
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_validation() {
        assert!(is_valid_identifier("stats_visitor"));
        assert!(is_valid_identifier("_v2"));
        assert!(!is_valid_identifier(""));
        assert!(!is_valid_identifier("2fast"));
        assert!(!is_valid_identifier("visitor\"; DROP TABLE x; --"));
        assert!(!is_valid_identifier("with space"));
    }

    #[test]
    fn test_quote_identifier() {
        assert_eq!(quote_identifier("stats_visitor"), "\"stats_visitor\"");
    }
}
