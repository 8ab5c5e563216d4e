//! Record framing: one format byte followed by a postcard payload.

use crate::{CoreError, CoreResult};
use serde::{Serialize, de::DeserializeOwned};

/// Current record format byte.
pub const RECORD_FORMAT_V1: u8 = 1;

/// Encode a record for storage.
pub fn encode_record<T: Serialize>(value: &T) -> CoreResult<Vec<u8>> {
    let mut out = vec![RECORD_FORMAT_V1];
    let payload = postcard::to_allocvec(value)?;
    out.extend_from_slice(&payload);
    Ok(out)
}

/// Decode a stored record, rejecting unknown format bytes.
pub fn decode_record<T: DeserializeOwned>(bytes: &[u8]) -> CoreResult<T> {
    match bytes.split_first() {
        Some((&RECORD_FORMAT_V1, payload)) => Ok(postcard::from_bytes(payload)?),
        Some((other, _)) => Err(CoreError::Corrupt(format!(
            "unknown record format {other}"
        ))),
        None => Err(CoreError::Corrupt("empty record".to_string())),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::catalog::Faq;
    use crate::chat::Message;
    use crate::posts::Comment;
    use crate::{ChatGroupId, CommentId, MessageId, PostId, Timestamp, UploadId, UserId};
    use chrono::{TimeZone, Utc};
    use proptest::prelude::*;
    use serde::Deserialize;
    use std::collections::BTreeSet;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        id: u64,
        name: String,
        tags: Vec<String>,
        note: Option<String>,
    }

    #[test]
    fn framed_record_starts_with_format_byte() {
        let sample = Sample {
            id: 9,
            name: "x".into(),
            tags: vec!["a".into()],
            note: None,
        };
        let bytes = encode_record(&sample).unwrap();
        assert_eq!(bytes[0], RECORD_FORMAT_V1);
        let back: Sample = decode_record(&bytes).unwrap();
        assert_eq!(back, sample);
    }

    #[test]
    fn unknown_format_is_corrupt() {
        let err = decode_record::<Sample>(&[42, 0]).unwrap_err();
        assert!(matches!(err, CoreError::Corrupt(_)));
        let err = decode_record::<Sample>(&[]).unwrap_err();
        assert!(matches!(err, CoreError::Corrupt(_)));
    }

    fn at(secs: i64) -> Timestamp {
        Utc.timestamp_opt(secs, 0).single().unwrap_or_default()
    }

    fn faq() -> impl Strategy<Value = Faq> {
        (any::<u64>(), ".*", ".*").prop_map(|(id, question, answer)| Faq {
            id,
            question,
            answer,
        })
    }

    fn comment() -> impl Strategy<Value = Comment> {
        (
            any::<u64>(),
            any::<u64>(),
            proptest::option::of(any::<u64>()),
            any::<u64>(),
            ".*",
            0i64..4_000_000_000,
            any::<bool>(),
        )
            .prop_map(|(id, post, parent, author, body, secs, deleted)| Comment {
                id: CommentId(id),
                post_id: PostId(post),
                parent: parent.map(CommentId),
                author: UserId(author),
                body,
                created_at: at(secs),
                updated_at: at(secs),
                deleted,
            })
    }

    fn message() -> impl Strategy<Value = Message> {
        (
            any::<u64>(),
            any::<u64>(),
            any::<u64>(),
            proptest::option::of(".*"),
            proptest::option::of(any::<u64>()),
            0i64..4_000_000_000,
            proptest::collection::btree_set(any::<u64>(), 0..8),
            any::<bool>(),
        )
            .prop_map(
                |(id, chat, sender, body, attachment, secs, deleted_for, deleted_for_all)| Message {
                    id: MessageId(id),
                    chat_group_id: ChatGroupId(chat),
                    sender: UserId(sender),
                    body,
                    attachment_id: attachment.map(UploadId),
                    created_at: at(secs),
                    deleted_for: deleted_for.into_iter().map(UserId).collect::<BTreeSet<_>>(),
                    deleted_for_all,
                },
            )
    }

    proptest! {
        #[test]
        fn faq_survives_framing(faq in faq()) {
            let bytes = encode_record(&faq).unwrap();
            prop_assert_eq!(decode_record::<Faq>(&bytes).unwrap(), faq);
        }

        #[test]
        fn comment_survives_framing(comment in comment()) {
            let bytes = encode_record(&comment).unwrap();
            prop_assert_eq!(decode_record::<Comment>(&bytes).unwrap(), comment);
        }

        #[test]
        fn message_survives_framing(message in message()) {
            let bytes = encode_record(&message).unwrap();
            prop_assert_eq!(decode_record::<Message>(&bytes).unwrap(), message);
        }

        #[test]
        fn foreign_format_byte_is_rejected(faq in faq(), format in any::<u8>()) {
            prop_assume!(format != RECORD_FORMAT_V1);
            let mut bytes = encode_record(&faq).unwrap();
            bytes[0] = format;
            let decoded = decode_record::<Faq>(&bytes);
            prop_assert!(matches!(decoded, Err(CoreError::Corrupt(_))));
        }
    }
}
