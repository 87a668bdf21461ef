//! START-packet flag tokens.
//!
//! Flags are a comma-separated token list in the optional last START field:
//! `C` marks a gzip-compressed payload, `F{SCHEME}` names the FEC scheme.
//! Unknown tokens are ignored so newer senders stay compatible.

/// Decoded flag field of a START packet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StartFlags {
    /// Payload was gzip-compressed before chunking.
    pub compressed: bool,
    /// Scheme token from the first `F[A-Z_0-9]+` flag, without the `F`.
    pub fec_token: Option<String>,
}

impl StartFlags {
    /// Parse a raw flag field. Never fails; unrecognised tokens are skipped.
    pub fn parse(field: &str) -> Self {
        let mut flags = StartFlags::default();
        for token in field.split(',') {
            if token == "C" {
                flags.compressed = true;
            } else if let Some(scheme) = token.strip_prefix('F') {
                let well_formed = !scheme.is_empty()
                    && scheme
                        .bytes()
                        .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit() || b == b'_');
                if well_formed && flags.fec_token.is_none() {
                    flags.fec_token = Some(scheme.to_string());
                }
            }
        }
        flags
    }

    /// Render the flag field, or `None` when no flag is set (the START
    /// serialiser then omits the field and its separator entirely).
    pub fn serialize(&self) -> Option<String> {
        let mut tokens = Vec::new();
        if self.compressed {
            tokens.push("C".to_string());
        }
        if let Some(scheme) = &self.fec_token {
            tokens.push(format!("F{scheme}"));
        }
        if tokens.is_empty() {
            None
        } else {
            Some(tokens.join(","))
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.compressed && self.fec_token.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_compression_and_scheme() {
        let flags = StartFlags::parse("C,FSTRONG_OVERLAPPING_3");
        assert!(flags.compressed);
        assert_eq!(flags.fec_token.as_deref(), Some("STRONG_OVERLAPPING_3"));
    }

    #[test]
    fn parses_scheme_alone() {
        let flags = StartFlags::parse("FBASIC_4");
        assert!(!flags.compressed);
        assert_eq!(flags.fec_token.as_deref(), Some("BASIC_4"));
    }

    #[test]
    fn unknown_tokens_are_skipped() {
        let flags = StartFlags::parse("X,C,ZZ9,Fbad token");
        assert!(flags.compressed);
        assert_eq!(flags.fec_token, None);
    }

    #[test]
    fn first_scheme_token_wins() {
        let flags = StartFlags::parse("FBASIC_2,FBASIC_4");
        assert_eq!(flags.fec_token.as_deref(), Some("BASIC_2"));
    }

    #[test]
    fn lowercase_scheme_is_not_a_scheme() {
        let flags = StartFlags::parse("Fbasic");
        assert_eq!(flags.fec_token, None);
    }

    #[test]
    fn serialize_roundtrip_and_omission() {
        assert_eq!(StartFlags::default().serialize(), None);

        let flags = StartFlags {
            compressed: true,
            fec_token: Some("OVERLAPPING_3".to_string()),
        };
        let field = flags.serialize().unwrap();
        assert_eq!(field, "C,FOVERLAPPING_3");
        assert_eq!(StartFlags::parse(&field), flags);
    }
}
