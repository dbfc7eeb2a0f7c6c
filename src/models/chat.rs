use serde::{Deserialize, Serialize};

use crate::models::job::OriginId;

/// Telegram webhook update. Only the fields the pipeline reads are modelled.
#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    #[serde(default)]
    pub update_id: i64,
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub message_id: i64,
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
    /// Available sizes of the same photo, smallest first.
    #[serde(default)]
    pub photo: Option<Vec<PhotoSize>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PhotoSize {
    pub file_id: String,
    pub file_unique_id: String,
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub file_size: Option<u64>,
}

/// Transport-neutral view of an inbound chat message.
#[derive(Debug, Clone, PartialEq)]
pub struct IncomingMessage {
    pub origin_id: OriginId,
    pub photo: Option<PhotoAttachment>,
    pub text: Option<String>,
}

/// Reference to a photo held by the chat transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhotoAttachment {
    /// Handle used to download the file.
    pub file_id: String,
    /// Identifier that stays the same for the same file across retries.
    pub unique_id: String,
}

/// Raw photo bytes together with their stable attachment identifier.
#[derive(Debug, Clone)]
pub struct Photo {
    pub attachment_id: String,
    pub bytes: Vec<u8>,
}

impl From<Message> for IncomingMessage {
    fn from(msg: Message) -> Self {
        // Telegram lists sizes ascending; the last one is the original resolution.
        let photo = msg
            .photo
            .and_then(|sizes| sizes.into_iter().last())
            .map(|size| PhotoAttachment {
                file_id: size.file_id,
                unique_id: size.file_unique_id,
            });

        Self {
            origin_id: OriginId::from(msg.chat.id),
            photo,
            text: msg.text.or(msg.caption),
        }
    }
}

/// Reference to an image the transport can show to a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageRef {
    Url(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_photo_update_picks_largest_size() {
        let update: Update = serde_json::from_value(serde_json::json!({
            "update_id": 10,
            "message": {
                "message_id": 7,
                "chat": { "id": 42, "type": "private" },
                "caption": "what is this?",
                "photo": [
                    { "file_id": "small", "file_unique_id": "u-small", "width": 90, "height": 90 },
                    {
                        "file_id": "large",
                        "file_unique_id": "u-large",
                        "width": 1280,
                        "height": 960,
                        "file_size": 123456
                    }
                ]
            }
        }))
        .unwrap();

        let incoming = IncomingMessage::from(update.message.unwrap());
        assert_eq!(incoming.origin_id.as_str(), "42");
        assert_eq!(incoming.text.as_deref(), Some("what is this?"));
        let photo = incoming.photo.unwrap();
        assert_eq!(photo.file_id, "large");
        assert_eq!(photo.unique_id, "u-large");
    }

    #[test]
    fn test_text_update_has_no_photo() {
        let update: Update = serde_json::from_value(serde_json::json!({
            "update_id": 11,
            "message": {
                "message_id": 8,
                "chat": { "id": -5 },
                "text": "hello"
            }
        }))
        .unwrap();

        let incoming = IncomingMessage::from(update.message.unwrap());
        assert!(incoming.photo.is_none());
        assert_eq!(incoming.text.as_deref(), Some("hello"));
    }

    #[test]
    fn test_empty_photo_list() {
        let update: Update = serde_json::from_value(serde_json::json!({
            "update_id": 12,
            "message": { "message_id": 9, "chat": { "id": 1 }, "photo": [] }
        }))
        .unwrap();

        assert!(IncomingMessage::from(update.message.unwrap()).photo.is_none());
    }
}
