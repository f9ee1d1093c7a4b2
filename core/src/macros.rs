//! Named byte sequences sent to the device on demand.
//!
//! Macro definitions are plain strings with backslash escapes:
//!
//! | Escape  | Byte        |
//! |---------|-------------|
//! | `\r`    | 0x0D        |
//! | `\n`    | 0x0A        |
//! | `\t`    | 0x09        |
//! | `\0`    | 0x00        |
//! | `\\`    | `\`         |
//! | `\xHH`  | 0xHH        |

use std::collections::BTreeMap;

use crate::errors::MacroError;

/// Parse a macro definition into the bytes it sends.
pub fn parse_macro(definition: &str) -> Result<Vec<u8>, MacroError> {
    let bytes = definition.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'\\' {
            out.push(bytes[i]);
            i += 1;
            continue;
        }

        let escape = *bytes.get(i + 1).ok_or(MacroError::DanglingEscape)?;
        match escape {
            b'r' => out.push(b'\r'),
            b'n' => out.push(b'\n'),
            b't' => out.push(b'\t'),
            b'0' => out.push(0),
            b'\\' => out.push(b'\\'),
            b'x' => {
                let value = bytes
                    .get(i + 2..i + 4)
                    .filter(|hex| hex.iter().all(u8::is_ascii_hexdigit))
                    .and_then(|hex| std::str::from_utf8(hex).ok())
                    .and_then(|hex| u8::from_str_radix(hex, 16).ok())
                    .ok_or(MacroError::InvalidHex { offset: i })?;
                out.push(value);
                i += 2;
            }
            _ => {
                let escape = definition[i + 1..].chars().next().unwrap_or('?');
                return Err(MacroError::UnknownEscape { escape, offset: i });
            }
        }
        i += 2;
    }

    Ok(out)
}

/// Parsed macros keyed by name.
#[derive(Debug, Clone, Default)]
pub struct MacroSet {
    macros: BTreeMap<String, Vec<u8>>,
}

impl MacroSet {
    /// Parse every definition; the first invalid one aborts.
    pub fn from_definitions(definitions: &BTreeMap<String, String>) -> Result<Self, MacroError> {
        let macros = definitions
            .iter()
            .map(|(name, def)| Ok((name.clone(), parse_macro(def)?)))
            .collect::<Result<_, MacroError>>()?;
        Ok(Self { macros })
    }

    /// Bytes for the macro called `name`.
    pub fn get(&self, name: &str) -> Result<&[u8], MacroError> {
        self.macros
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| MacroError::NotFound(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.macros.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.macros.len()
    }

    pub fn is_empty(&self) -> bool {
        self.macros.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text() {
        assert_eq!(parse_macro("AT").unwrap(), b"AT");
        assert!(parse_macro("").unwrap().is_empty());
    }

    #[test]
    fn control_escapes() {
        assert_eq!(parse_macro("AT\\r\\n").unwrap(), b"AT\r\n");
        assert_eq!(parse_macro("a\\tb\\0").unwrap(), b"a\tb\0");
        assert_eq!(parse_macro("C:\\\\dir").unwrap(), b"C:\\dir");
    }

    #[test]
    fn hex_escapes() {
        assert_eq!(parse_macro("\\x1B[2J").unwrap(), b"\x1b[2J");
        assert_eq!(parse_macro("\\xff\\x00").unwrap(), vec![0xFF, 0x00]);
    }

    #[test]
    fn short_hex_escape_is_error() {
        assert_eq!(
            parse_macro("ab\\x4"),
            Err(MacroError::InvalidHex { offset: 2 })
        );
        assert_eq!(
            parse_macro("\\xZZ"),
            Err(MacroError::InvalidHex { offset: 0 })
        );
    }

    #[test]
    fn signed_hex_escape_is_error() {
        assert_eq!(
            parse_macro("\\x+F"),
            Err(MacroError::InvalidHex { offset: 0 })
        );
        assert_eq!(
            parse_macro("A\\x-1"),
            Err(MacroError::InvalidHex { offset: 1 })
        );
    }

    #[test]
    fn unknown_escape_is_error() {
        assert_eq!(
            parse_macro("hi\\q"),
            Err(MacroError::UnknownEscape {
                escape: 'q',
                offset: 2
            })
        );
    }

    #[test]
    fn dangling_backslash_is_error() {
        assert_eq!(parse_macro("oops\\"), Err(MacroError::DanglingEscape));
    }

    #[test]
    fn non_ascii_passes_through() {
        assert_eq!(parse_macro("é").unwrap(), "é".as_bytes());
    }

    #[test]
    fn macro_set_lookup() {
        let defs = BTreeMap::from([
            ("reset".to_string(), "AT+RST\\r\\n".to_string()),
            ("ping".to_string(), "AT\\r".to_string()),
        ]);
        let set = MacroSet::from_definitions(&defs).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.get("reset").unwrap(), b"AT+RST\r\n");
        assert_eq!(set.names().collect::<Vec<_>>(), vec!["ping", "reset"]);
        assert_eq!(
            set.get("missing"),
            Err(MacroError::NotFound("missing".into()))
        );
    }

    #[test]
    fn macro_set_rejects_bad_definition() {
        let defs = BTreeMap::from([("bad".to_string(), "\\k".to_string())]);
        assert!(MacroSet::from_definitions(&defs).is_err());
    }
}
