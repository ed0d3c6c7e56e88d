use chrono::{DateTime, Utc};
use color_eyre::eyre::{Context, Result};
use data::PoiseContext;
use itertools::Itertools;
use poise::serenity_prelude::{
    Cache, CacheHttp, ChannelId, CreateMessage, EditMember, GuildId, Http, Member, Mentionable,
    UserId,
};
use std::{sync::Arc, time::Duration};

pub mod afk;
pub mod audit;
pub mod automod;
pub mod commands;
pub mod config;
pub mod data;
pub mod error;
pub mod event_handler;
pub mod operator;
pub mod streams;
mod utils;
pub mod welcome;

trait SendThenDelete {
    async fn send_then_delete(
        self,
        ctx: impl CacheHttp,
        message: CreateMessage,
        after: Duration,
    ) -> Result<()>;
}

impl SendThenDelete for ChannelId {
    async fn send_then_delete(
        self,
        ctx: impl CacheHttp,
        message: CreateMessage,
        after: Duration,
    ) -> Result<()> {
        let message = self
            .send_message(&ctx, message)
            .await
            .wrap_err("Failed to send short-lived message")?;

        tokio::time::sleep(after).await;
        message.delete(&ctx).await.ok();

        Ok(())
    }
}

/// Owned cache + http handle, for work spawned off an event.
#[derive(Clone)]
struct CloneableCtx(Arc<Cache>, Arc<Http>);

impl From<&poise::serenity_prelude::Context> for CloneableCtx {
    fn from(ctx: &poise::serenity_prelude::Context) -> Self {
        Self(Arc::clone(&ctx.cache), Arc::clone(&ctx.http))
    }
}

impl From<&PoiseContext<'_>> for CloneableCtx {
    fn from(ctx: &PoiseContext<'_>) -> Self {
        Self::from(ctx.serenity_context())
    }
}

impl CacheHttp for CloneableCtx {
    fn http(&self) -> &Http {
        &self.1
    }

    fn cache(&self) -> Option<&Arc<Cache>> {
        Some(&self.0)
    }
}

trait TimeoutExt {
    async fn timeout(
        &self,
        cache: impl CacheHttp,
        target: UserId,
        duration: Duration,
        reason: Option<&str>,
    ) -> Result<(Member, DateTime<Utc>)>;

    async fn remove_timeout(&self, cache: impl CacheHttp, target: UserId) -> Result<Member>;
}

impl TimeoutExt for GuildId {
    async fn timeout(
        &self,
        cache: impl CacheHttp,
        target: UserId,
        duration: Duration,
        reason: Option<&str>,
    ) -> Result<(Member, DateTime<Utc>)> {
        let timeout_end = chrono::Utc::now() + duration;

        let mut edit = EditMember::new().disable_communication_until(timeout_end.to_rfc3339());
        if let Some(reason) = reason {
            edit = edit.audit_log_reason(reason);
        }

        self.edit_member(cache, target, edit)
            .await
            .wrap_err("Failed to edit member")
            .map(|member| (member, timeout_end))
    }

    async fn remove_timeout(&self, cache: impl CacheHttp, target: UserId) -> Result<Member> {
        self.edit_member(cache, target, EditMember::new().enable_communication())
            .await
            .wrap_err("Failed to edit member")
    }
}

trait MentionableExt {
    fn mention_all(&self) -> String;
}

impl MentionableExt for Vec<UserId> {
    fn mention_all(&self) -> String {
        self.iter().map(|user| user.mention().to_string()).join(" ")
    }
}

impl MentionableExt for &[UserId] {
    fn mention_all(&self) -> String {
        self.iter().map(|user| user.mention().to_string()).join(" ")
    }
}
