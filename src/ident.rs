use crate::error::Error;

/// TSDL keywords, a field or class cannot be named after one of these.
const RESERVED_KEYWORDS: &[&str] = &[
    "align",
    "callsite",
    "const",
    "char",
    "clock",
    "double",
    "enum",
    "env",
    "event",
    "floating_point",
    "float",
    "integer",
    "int",
    "long",
    "short",
    "signed",
    "stream",
    "string",
    "struct",
    "trace",
    "typealias",
    "typedef",
    "unsigned",
    "variant",
    "void",
    "_Bool",
    "_Complex",
    "_Imaginary",
];

pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let starts_ok = chars
        .next()
        .map(|c| c.is_ascii_alphabetic() || c == '_')
        .unwrap_or(false);
    starts_ok
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !RESERVED_KEYWORDS.contains(&name)
}

pub fn validate_identifier(name: &str) -> Result<(), Error> {
    if is_valid_identifier(name) {
        Ok(())
    } else {
        Err(Error::invalid_argument(format!(
            "'{name}' is not a valid identifier"
        )))
    }
}

/// A reference to another field (sequence length, variant tag) is a
/// dotted path. Scope prefixes like `stream.event.header` are made of
/// reserved words, so only the component shape is checked here.
pub fn validate_field_reference(reference: &str) -> Result<(), Error> {
    let well_formed = !reference.is_empty()
        && reference.split('.').all(|c| {
            let mut chars = c.chars();
            chars
                .next()
                .map(|f| f.is_ascii_alphabetic() || f == '_')
                .unwrap_or(false)
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        });
    if well_formed {
        Ok(())
    } else {
        Err(Error::invalid_argument(format!(
            "'{reference}' is not a valid field reference"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers() {
        assert!(is_valid_identifier("x"));
        assert!(is_valid_identifier("_len"));
        assert!(is_valid_identifier("sched_switch2"));
        assert!(!is_valid_identifier(""));
        assert!(!is_valid_identifier("2fast"));
        assert!(!is_valid_identifier("has space"));
        assert!(!is_valid_identifier("dotted.name"));
        assert!(!is_valid_identifier("struct"));
        assert!(!is_valid_identifier("event"));
        assert!(validate_identifier("align").is_err());
    }

    #[test]
    fn field_references() {
        assert!(validate_field_reference("len").is_ok());
        assert!(validate_field_reference("stream.event.header.id").is_ok());
        assert!(validate_field_reference("").is_err());
        assert!(validate_field_reference("a..b").is_err());
        assert!(validate_field_reference("a.").is_err());
    }
}
