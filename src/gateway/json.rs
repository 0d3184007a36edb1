//! JSON marshalling helpers for the gateway.
//!
//! Generated messages derive serde with proto field names. Enum-typed fields
//! are stored as `i32` by prost; [`note_kind`] renders them by their proto
//! name and accepts either the name or the number on input.

use bytes::Bytes;
use serde::de::DeserializeOwned;

use super::error::GatewayError;

/// Decode a request body. An empty body yields the message defaults.
pub fn parse_body<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, GatewayError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    Ok(serde_json::from_slice(body)?)
}

/// `#[serde(with = "...")]` module for `NoteKind` fields.
pub mod note_kind {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::server::proto::NoteKind;

    pub fn serialize<S: Serializer>(kind: &i32, serializer: S) -> Result<S::Ok, S::Error> {
        match NoteKind::try_from(*kind) {
            Ok(kind) => serializer.serialize_str(kind.as_str_name()),
            Err(_) => serializer.serialize_i32(*kind),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i32, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Name(String),
            Number(i32),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Name(name) => NoteKind::from_str_name(&name)
                .map(|kind| kind as i32)
                .ok_or_else(|| D::Error::custom(format!("unknown note kind {name:?}"))),
            Repr::Number(number) => Ok(number),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::proto::{Note, NoteKind, Occurrence};

    #[test]
    fn kind_is_rendered_by_name() {
        let note = Note {
            name: "projects/demo/notes/cve-1".into(),
            kind: NoteKind::Vulnerability as i32,
            ..Default::default()
        };
        let json = serde_json::to_value(&note).unwrap();
        assert_eq!(json["kind"], "VULNERABILITY");
        assert_eq!(json["short_description"], "");
        assert_eq!(json["related_url"], serde_json::json!([]));
    }

    #[test]
    fn kind_accepts_name_or_number() {
        let by_name: Occurrence =
            serde_json::from_str(r#"{"note_name":"projects/demo/notes/n","kind":"BUILD"}"#)
                .unwrap();
        assert_eq!(by_name.kind, NoteKind::Build as i32);

        let by_number: Occurrence = serde_json::from_str(r#"{"kind":3}"#).unwrap();
        assert_eq!(by_number.kind, NoteKind::Image as i32);

        assert!(serde_json::from_str::<Note>(r#"{"kind":"NOPE"}"#).is_err());
    }

    #[test]
    fn empty_body_yields_defaults() {
        let note: Note = parse_body(&Bytes::new()).unwrap();
        assert_eq!(note, Note::default());

        let err = parse_body::<Note>(&Bytes::from_static(b"{not json")).unwrap_err();
        assert!(matches!(err, GatewayError::Body(_)));
    }
}
