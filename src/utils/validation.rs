//! Name and value validation shared by the emulation description loader and
//! the binding resolver.

use std::collections::HashSet;
use std::hash::Hash;

/// Check if `name` is a plain node or network name: ASCII letters, digits,
/// `_` and `-`, starting with a letter or `_`.
///
/// # Examples
/// ```
/// use seedemu::utils::validation::is_literal_name;
///
/// assert!(is_literal_name("web_1"));
/// assert!(!is_literal_name("web.*"));
/// ```
pub fn is_literal_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Validate a name used for nodes, networks and layers.
pub fn validate_name(what: &str, name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err(format!("{} name must not be empty", what));
    }
    if name.len() > 64 {
        return Err(format!("{} name '{}' is longer than 64 characters", what, name));
    }
    if !is_literal_name(name) {
        return Err(format!(
            "{} name '{}' may only contain letters, digits, '_' and '-'",
            what, name
        ));
    }
    Ok(())
}

/// Return the first item that appears twice.
pub fn find_duplicate<T, I>(items: I) -> Option<T>
where
    T: Eq + Hash + Clone,
    I: IntoIterator<Item = T>,
{
    let mut seen = HashSet::new();
    items.into_iter().find(|item| !seen.insert(item.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_names() {
        assert!(is_literal_name("router0"));
        assert!(is_literal_name("_hidden"));
        assert!(is_literal_name("web-east"));
        assert!(!is_literal_name(""));
        assert!(!is_literal_name("0router"));
        assert!(!is_literal_name("web[0-9]+"));
        assert!(!is_literal_name("a b"));
    }

    #[test]
    fn test_validate_name_messages() {
        assert!(validate_name("host", "web").is_ok());
        assert!(validate_name("host", "")
            .unwrap_err()
            .contains("must not be empty"));
        assert!(validate_name("network", "net.0")
            .unwrap_err()
            .contains("network name 'net.0'"));
        assert!(validate_name("host", &"a".repeat(65)).is_err());
    }

    #[test]
    fn test_find_duplicate() {
        assert_eq!(find_duplicate(vec![1, 2, 3, 2]), Some(2));
        assert_eq!(find_duplicate(vec!["a", "b"]), None);
    }
}
