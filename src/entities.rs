//! Entity and character reference decoding

use std::borrow::Cow;
use std::collections::HashMap;

use thiserror::Error;

/// General entities declared in a DTD: name to replacement text
pub type EntityMap = HashMap<String, String>;

/// Nested expansion limit for user-declared entities
const MAX_EXPANSION_DEPTH: usize = 16;

/// Upper bound on the decoded size of a single value
const MAX_EXPANDED_LEN: usize = 1 << 20;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EntityError {
    #[error("unterminated reference starting at byte {offset}")]
    Unterminated { offset: usize },

    #[error("undeclared entity '&{name};'")]
    Undeclared { name: String, offset: usize },

    #[error("invalid character reference '&{reference};'")]
    InvalidCharRef { reference: String, offset: usize },

    #[error("entity '&{name};' references itself")]
    Recursive { name: String, offset: usize },

    #[error("entity expansion exceeds {limit} bytes")]
    TooLarge { limit: usize },
}

impl EntityError {
    /// Byte offset of the offending reference inside the decoded input
    pub fn offset(&self) -> usize {
        match self {
            EntityError::Unterminated { offset }
            | EntityError::Undeclared { offset, .. }
            | EntityError::InvalidCharRef { offset, .. }
            | EntityError::Recursive { offset, .. } => *offset,
            EntityError::TooLarge { .. } => 0,
        }
    }
}

pub fn predefined(name: &str) -> Option<char> {
    match name {
        "lt" => Some('<'),
        "gt" => Some('>'),
        "amp" => Some('&'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        _ => None,
    }
}

fn char_reference(reference: &str) -> Option<char> {
    let code = if let Some(hex) = reference.strip_prefix("#x") {
        u32::from_str_radix(hex, 16).ok()?
    } else if let Some(dec) = reference.strip_prefix('#') {
        dec.parse::<u32>().ok()?
    } else {
        return None;
    };
    let c = char::from_u32(code)?;
    if crate::tokenizer::is_illegal_char(c) {
        None
    } else {
        Some(c)
    }
}

/// Decodes `&name;`, `&#N;` and `&#xH;` references in `raw`.
///
/// Returns the input unchanged (borrowed) when it contains no references.
pub fn decode<'a>(raw: &'a str, entities: &EntityMap) -> Result<Cow<'a, str>, EntityError> {
    if !raw.contains('&') {
        return Ok(Cow::Borrowed(raw));
    }
    let mut out = String::with_capacity(raw.len());
    let mut stack = Vec::new();
    expand_into(raw, entities, &mut out, &mut stack)?;
    Ok(Cow::Owned(out))
}

fn expand_into<'m>(
    raw: &str,
    entities: &'m EntityMap,
    out: &mut String,
    stack: &mut Vec<&'m str>,
) -> Result<(), EntityError> {
    let mut rest = raw;
    let mut consumed = 0usize;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let offset = consumed + amp;
        let after = &rest[amp + 1..];
        let Some(semi) = after.find(';') else {
            return Err(EntityError::Unterminated { offset });
        };
        let reference = &after[..semi];

        if reference.starts_with('#') {
            let c = char_reference(reference).ok_or_else(|| EntityError::InvalidCharRef {
                reference: reference.to_string(),
                offset,
            })?;
            out.push(c);
        } else if let Some(c) = predefined(reference) {
            out.push(c);
        } else if let Some((name, replacement)) = entities.get_key_value(reference) {
            if stack.contains(&name.as_str()) || stack.len() >= MAX_EXPANSION_DEPTH {
                return Err(EntityError::Recursive {
                    name: reference.to_string(),
                    offset,
                });
            }
            stack.push(name.as_str());
            expand_into(replacement, entities, out, stack)?;
            stack.pop();
        } else {
            if reference.is_empty() || !crate::tokenizer::is_valid_name(reference) {
                return Err(EntityError::Unterminated { offset });
            }
            return Err(EntityError::Undeclared {
                name: reference.to_string(),
                offset,
            });
        }

        if out.len() > MAX_EXPANDED_LEN {
            return Err(EntityError::TooLarge {
                limit: MAX_EXPANDED_LEN,
            });
        }
        let advance = amp + 1 + semi + 1;
        consumed += advance;
        rest = &rest[advance..];
    }
    out.push_str(rest);
    Ok(())
}

/// Attribute-value normalization: literal tab, newline and carriage return
/// become a space before references are decoded.
pub fn normalize_attribute<'a>(raw: &'a str) -> Cow<'a, str> {
    if !raw.contains(['\t', '\n', '\r']) {
        return Cow::Borrowed(raw);
    }
    Cow::Owned(raw.replace("\r\n", " ").replace(['\t', '\n', '\r'], " "))
}

/// End-of-line handling for character data: `\r\n` and lone `\r` become `\n`
pub fn normalize_newlines<'a>(raw: &'a str) -> Cow<'a, str> {
    if !raw.contains('\r') {
        return Cow::Borrowed(raw);
    }
    Cow::Owned(raw.replace("\r\n", "\n").replace('\r', "\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_references_borrows() {
        let decoded = decode("plain text", &EntityMap::new()).unwrap();
        assert!(matches!(decoded, Cow::Borrowed(_)));
    }

    #[test]
    fn test_predefined_and_char_refs() {
        let decoded = decode("a &lt; b &amp;&amp; &#65;&#x42; &quot;&apos;&gt;", &EntityMap::new()).unwrap();
        assert_eq!(decoded, "a < b && AB \"'>");
    }

    #[test]
    fn test_declared_entities_expand_recursively() {
        let mut entities = EntityMap::new();
        entities.insert("co".to_string(), "ACME &amp; &suffix;".to_string());
        entities.insert("suffix".to_string(), "Inc.".to_string());
        assert_eq!(decode("&co;", &entities).unwrap(), "ACME & Inc.");
    }

    #[test]
    fn test_undeclared_entity() {
        let err = decode("x &nope; y", &EntityMap::new()).unwrap_err();
        assert_eq!(
            err,
            EntityError::Undeclared {
                name: "nope".to_string(),
                offset: 2
            }
        );
    }

    #[test]
    fn test_recursive_entity_is_rejected() {
        let mut entities = EntityMap::new();
        entities.insert("a".to_string(), "&b;".to_string());
        entities.insert("b".to_string(), "&a;".to_string());
        assert!(matches!(
            decode("&a;", &entities),
            Err(EntityError::Recursive { .. })
        ));
    }

    #[test]
    fn test_invalid_references() {
        assert!(matches!(
            decode("&#0;", &EntityMap::new()),
            Err(EntityError::InvalidCharRef { .. })
        ));
        assert!(matches!(
            decode("&#xZZ;", &EntityMap::new()),
            Err(EntityError::InvalidCharRef { .. })
        ));
        assert!(matches!(
            decode("fish & chips", &EntityMap::new()),
            Err(EntityError::Unterminated { offset: 5 })
        ));
    }

    #[test]
    fn test_normalization() {
        assert_eq!(normalize_attribute("a\tb\r\nc"), "a b c");
        assert_eq!(normalize_newlines("a\r\nb\rc"), "a\nb\nc");
    }
}
