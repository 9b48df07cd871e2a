use crate::domain::{ChatId, UserId};

/// Kind of chat an event arrived in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChatKind {
    Private,
    Group,
    Supergroup,
    Channel,
}

impl ChatKind {
    pub fn is_group(self) -> bool {
        matches!(self, ChatKind::Group | ChatKind::Supergroup)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EntityKind {
    Mention,
    Other,
}

/// Text-range annotation attached to a message.
///
/// `offset` and `length` are in UTF-16 code units, as Telegram reports them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageEntity {
    pub kind: EntityKind,
    pub offset: usize,
    pub length: usize,
}

impl MessageEntity {
    pub fn mention(offset: usize, length: usize) -> Self {
        Self {
            kind: EntityKind::Mention,
            offset,
            length,
        }
    }

    /// The annotated slice of `text`, or `None` when the range is out of bounds
    /// or splits a surrogate pair.
    pub fn span(&self, text: &str) -> Option<String> {
        let units: Vec<u16> = text.encode_utf16().collect();
        let end = self.offset.checked_add(self.length)?;
        let slice = units.get(self.offset..end)?;
        String::from_utf16(slice).ok()
    }
}

/// Inbound chat event, already decoded from the platform update.
///
/// Fields the platform may omit stay optional; the router drops events that
/// lack any of text, chat or sender.
#[derive(Clone, Debug)]
pub struct InboundEvent {
    pub update_id: i64,
    pub user_id: Option<UserId>,
    pub chat_id: Option<ChatId>,
    pub chat_kind: ChatKind,
    pub text: Option<String>,
    pub entities: Vec<MessageEntity>,
}

/// Outgoing "chat action" (presence indicator).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChatAction {
    Typing,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_uses_utf16_offsets() {
        // The emoji takes two UTF-16 units.
        let text = "😀 @c3poh_bot hi";
        let e = MessageEntity::mention(3, 10);
        assert_eq!(e.span(text).as_deref(), Some("@c3poh_bot"));
    }

    #[test]
    fn span_out_of_range_is_none() {
        let e = MessageEntity::mention(5, 50);
        assert_eq!(e.span("short"), None);
    }

    #[test]
    fn group_kinds() {
        assert!(ChatKind::Group.is_group());
        assert!(ChatKind::Supergroup.is_group());
        assert!(!ChatKind::Private.is_group());
        assert!(!ChatKind::Channel.is_group());
    }
}
