use super::{LogKind, send_log};
use crate::{data::State, utils::clip};
use ahash::AHashMap;
use color_eyre::eyre::Result;
use parking_lot::Mutex;
use poise::serenity_prelude::{
    self as serenity, ChannelId, Colour, CreateEmbed, CreateEmbedFooter, GuildId, Mentionable,
    MessageId, MessageUpdateEvent, Timestamp, UserId,
};
use std::collections::VecDeque;

/// Embed field values are capped at this length.
const FIELD_LIMIT: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedMessage {
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
    pub author_id: UserId,
    pub content: String,
}

impl CachedMessage {
    fn display_content(&self) -> String {
        if self.content.is_empty() {
            "*[Image/Media]*".to_owned()
        } else {
            clip(&self.content, FIELD_LIMIT)
        }
    }
}

#[derive(Default)]
struct Inner {
    messages: AHashMap<MessageId, CachedMessage>,
    order: VecDeque<MessageId>,
}

/// The last few thousand server messages written by people, oldest evicted first.
///
/// Deletions arrive with only an id, this is where the content for the log comes from.
pub struct RecentMessages {
    capacity: usize,
    inner: Mutex<Inner>,
}

impl RecentMessages {
    pub fn new(capacity: usize) -> Self {
        RecentMessages {
            capacity: capacity.max(1),
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn insert(&self, id: MessageId, message: CachedMessage) {
        let mut inner = self.inner.lock();

        if inner.messages.insert(id, message).is_none() {
            inner.order.push_back(id);
        }

        while inner.order.len() > self.capacity {
            if let Some(oldest) = inner.order.pop_front() {
                inner.messages.remove(&oldest);
            }
        }
    }

    pub fn remember(&self, message: &serenity::Message) {
        let Some(guild_id) = message.guild_id else {
            return;
        };

        if message.author.bot {
            return;
        }

        self.insert(
            message.id,
            CachedMessage {
                guild_id,
                channel_id: message.channel_id,
                author_id: message.author.id,
                content: message.content.clone(),
            },
        );
    }

    pub fn take(&self, id: MessageId) -> Option<CachedMessage> {
        let mut inner = self.inner.lock();
        let message = inner.messages.remove(&id)?;
        inner.order.retain(|cached| *cached != id);

        Some(message)
    }

    /// Stores the edited content and hands back the message as it was before.
    pub fn replace_content(&self, id: MessageId, content: &str) -> Option<CachedMessage> {
        let mut inner = self.inner.lock();
        let message = inner.messages.get_mut(&id)?;

        let before = message.clone();
        message.content = content.to_owned();

        Some(before)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub async fn message_deleted(
    ctx: &serenity::Context,
    data: &State,
    message_id: MessageId,
) -> Result<()> {
    let Some(message) = data.recent_messages.take(message_id) else {
        tracing::debug!("Deleted message {} was not cached", message_id);
        return Ok(());
    };

    let embed = CreateEmbed::new()
        .title("🗑️ Message Deleted")
        .colour(Colour::RED)
        .timestamp(Timestamp::now())
        .field("Author", message.author_id.mention().to_string(), true)
        .field("Channel", message.channel_id.mention().to_string(), true)
        .field("Content", message.display_content(), false)
        .footer(CreateEmbedFooter::new(format!("ID: {}", message.author_id)));

    send_log(ctx, data, message.guild_id, LogKind::Delete, embed).await
}

pub async fn message_edited(
    ctx: &serenity::Context,
    data: &State,
    event: &MessageUpdateEvent,
) -> Result<()> {
    // embeds resolving also fire updates, those carry no content
    let Some(content) = event.content.as_deref() else {
        return Ok(());
    };

    let Some(before) = data.recent_messages.replace_content(event.id, content) else {
        return Ok(());
    };

    if before.content == content {
        return Ok(());
    }

    let after = CachedMessage {
        content: content.to_owned(),
        ..before.clone()
    };

    let embed = CreateEmbed::new()
        .title("✏️ Message Edited")
        .colour(Colour::BLUE)
        .timestamp(Timestamp::now())
        .field("Author", before.author_id.mention().to_string(), true)
        .field("Channel", before.channel_id.mention().to_string(), true)
        .field("Before", before.display_content(), false)
        .field("After", after.display_content(), false)
        .footer(CreateEmbedFooter::new(format!("ID: {}", before.author_id)));

    send_log(ctx, data, before.guild_id, LogKind::Edit, embed).await
}

#[cfg(test)]
mod test {
    use super::*;

    fn cached(content: &str) -> CachedMessage {
        CachedMessage {
            guild_id: GuildId::new(1),
            channel_id: ChannelId::new(2),
            author_id: UserId::new(3),
            content: content.to_owned(),
        }
    }

    #[test]
    fn oldest_messages_are_evicted() {
        let cache = RecentMessages::new(2);

        cache.insert(MessageId::new(1), cached("one"));
        cache.insert(MessageId::new(2), cached("two"));
        cache.insert(MessageId::new(3), cached("three"));

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.take(MessageId::new(1)), None);
        assert_eq!(
            cache.take(MessageId::new(3)).map(|m| m.content),
            Some("three".to_owned())
        );
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn edits_return_previous_content() {
        let cache = RecentMessages::new(10);
        cache.insert(MessageId::new(1), cached("typo"));

        let before = cache.replace_content(MessageId::new(1), "fixed").unwrap();
        assert_eq!(before.content, "typo");

        let before = cache.replace_content(MessageId::new(1), "fixed again").unwrap();
        assert_eq!(before.content, "fixed");

        assert_eq!(cache.replace_content(MessageId::new(9), "unknown"), None);
    }

    #[test]
    fn empty_content_shows_media_marker() {
        assert_eq!(cached("").display_content(), "*[Image/Media]*");
        assert_eq!(
            cached(&"x".repeat(2000)).display_content().chars().count(),
            FIELD_LIMIT
        );
    }
}
