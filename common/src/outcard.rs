use serde_json::Value;

use crate::DomainError;

pub const OUTCARD_TAG_LEN: usize = 4;

#[derive(Debug, Clone, PartialEq)]
pub enum Outcard {
    Json(Value),
    Text(String),
    /// Unrecognized 4-byte tag followed by opaque bytes.
    Binary { tag: [u8; 4], data: Vec<u8> },
}

impl Outcard {
    /// Decodes an emulator outcard: a 4-byte type tag followed by the payload.
    pub fn parse(raw: &[u8]) -> Result<Self, DomainError> {
        if raw.len() < OUTCARD_TAG_LEN {
            return Err(DomainError::OutcardTooShort(raw.len()));
        }
        let (tag, body) = raw.split_at(OUTCARD_TAG_LEN);
        match tag {
            b"JSON" => {
                let text = std::str::from_utf8(body).map_err(|_| DomainError::OutcardEncoding)?;
                let value = serde_json::from_str(text)
                    .map_err(|e| DomainError::OutcardJson(e.to_string()))?;
                Ok(Outcard::Json(value))
            }
            b"TEXT" => {
                let text = std::str::from_utf8(body).map_err(|_| DomainError::OutcardEncoding)?;
                Ok(Outcard::Text(text.to_string()))
            }
            _ => {
                log::debug!("outcard with unrecognized tag {:?}", String::from_utf8_lossy(tag));
                Ok(Outcard::Binary {
                    tag: [tag[0], tag[1], tag[2], tag[3]],
                    data: body.to_vec(),
                })
            }
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Outcard::Json(value) => Some(value),
            _ => None,
        }
    }

    /// Human-readable form, used for logging and the editor's outcard field.
    pub fn display_text(&self) -> String {
        match self {
            Outcard::Json(value) => value.to_string(),
            Outcard::Text(text) => text.clone(),
            Outcard::Binary { data, .. } => hex::encode(data),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_outcard() {
        let card = Outcard::parse(br#"JSON{"coins":3,"score":120}"#).unwrap();
        assert_eq!(card.as_json(), Some(&json!({"coins": 3, "score": 120})));
    }

    #[test]
    fn text_outcard() {
        let card = Outcard::parse(b"TEXTgame over").unwrap();
        assert_eq!(card, Outcard::Text("game over".into()));
        assert!(card.as_json().is_none());
    }

    #[test]
    fn unknown_tag_is_opaque() {
        let card = Outcard::parse(&[b'B', b'I', b'N', b'1', 0xde, 0xad]).unwrap();
        assert_eq!(
            card,
            Outcard::Binary { tag: *b"BIN1", data: vec![0xde, 0xad] }
        );
        assert_eq!(card.display_text(), "dead");
    }

    #[test]
    fn short_or_malformed_outcards_fail() {
        assert_eq!(Outcard::parse(b"JS"), Err(DomainError::OutcardTooShort(2)));
        assert!(matches!(
            Outcard::parse(b"JSON{not json"),
            Err(DomainError::OutcardJson(_))
        ));
        assert_eq!(
            Outcard::parse(&[b'T', b'E', b'X', b'T', 0xff, 0xfe]),
            Err(DomainError::OutcardEncoding)
        );
    }
}
