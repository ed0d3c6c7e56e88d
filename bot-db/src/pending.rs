use crate::{BotDb, ReadWriteTree};
use color_eyre::eyre::Result;
use itertools::Itertools;
use poise::serenity_prelude::{ChannelId, GuildId, UserId};
use serde::{Deserialize, Serialize};
use sled::Tree;
use std::convert::Infallible;

/// A request waiting on somebody to press a button.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PendingRequest {
    ClanCreation {
        guild_id: u64,
        requester: u64,
        name: String,
        description: String,
    },
    Membership {
        guild_id: u64,
        clan_channel: u64,
        applicant: u64,
        message: String,
    },
    OwnershipTransfer {
        guild_id: u64,
        clan_channel: u64,
        requested_by: u64,
        requested_by_admin: bool,
        new_leader: u64,
    },
}

impl PendingRequest {
    pub fn guild(&self) -> GuildId {
        match self {
            PendingRequest::ClanCreation { guild_id, .. }
            | PendingRequest::Membership { guild_id, .. }
            | PendingRequest::OwnershipTransfer { guild_id, .. } => GuildId::new(*guild_id),
        }
    }

    /// The clan this request is about, if it already exists.
    pub fn clan_channel(&self) -> Option<ChannelId> {
        match self {
            PendingRequest::ClanCreation { .. } => None,
            PendingRequest::Membership { clan_channel, .. }
            | PendingRequest::OwnershipTransfer { clan_channel, .. } => {
                Some(ChannelId::new(*clan_channel))
            }
        }
    }
}

pub struct PendingDb {
    tree: Tree,
    db: BotDb,
}

impl PendingDb {
    pub fn new(db: &BotDb) -> Result<Self> {
        Ok(PendingDb {
            tree: db.open_tree("pending_requests")?,
            db: db.clone(),
        })
    }

    /// Stores the request and returns its id.
    pub fn open(&self, request: &PendingRequest) -> Result<u64> {
        let id = self.db.generate_id()?;
        self.tree.typed_insert::<u64, PendingRequest>(&id, request)?;

        tracing::debug!("Opened pending request {}: {:?}", id, request);

        Ok(id)
    }

    pub fn get(&self, id: u64) -> Result<Option<PendingRequest>> {
        self.tree.typed_get::<u64, PendingRequest>(&id)
    }

    /// Removes the request. Only the first caller gets it back.
    pub fn take(&self, id: u64) -> Result<Option<PendingRequest>> {
        self.tree.typed_remove::<u64, PendingRequest>(&id)
    }

    /// Puts a taken request back under its old id, for when answering it failed.
    ///
    /// Returns false and leaves the store alone if something already sits under `id`.
    pub fn restore(&self, id: u64, request: &PendingRequest) -> Result<bool> {
        let restored = self
            .tree
            .typed_transition::<u64, PendingRequest, bool, Infallible>(&id, |current| {
                Ok(match current {
                    Some(current) => (Some(current), false),
                    None => (Some(request.clone()), true),
                })
            })?
            .unwrap_or_else(|never| match never {});

        if restored {
            tracing::debug!("Restored pending request {}", id);
        }

        Ok(restored)
    }

    pub fn has_application(&self, clan_channel: ChannelId, user: UserId) -> Result<bool> {
        let (clan_channel, user) = (clan_channel.get(), user.get());

        for entry in self.tree.typed_iter::<u64, PendingRequest>() {
            if let (_, PendingRequest::Membership {
                clan_channel: channel,
                applicant,
                ..
            }) = entry?
            {
                if channel == clan_channel && applicant == user {
                    return Ok(true);
                }
            }
        }

        Ok(false)
    }

    /// Drops everything pointing at a clan that no longer exists. Returns how many went.
    pub fn discard_for_clan(&self, clan_channel: ChannelId) -> Result<usize> {
        let ids = self
            .tree
            .typed_iter::<u64, PendingRequest>()
            .filter_map_ok(|(id, request)| {
                (request.clan_channel() == Some(clan_channel)).then_some(id)
            })
            .collect::<Result<Vec<_>>>()?;

        for id in &ids {
            self.take(*id)?;
        }

        Ok(ids.len())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn application(applicant: u64) -> PendingRequest {
        PendingRequest::Membership {
            guild_id: 1,
            clan_channel: 100,
            applicant,
            message: "let me in".to_owned(),
        }
    }

    #[test]
    fn take_only_once() {
        let db = BotDb::temporary().unwrap();
        let pending = PendingDb::new(&db).unwrap();

        let id = pending.open(&application(7)).unwrap();

        assert_eq!(pending.get(id).unwrap(), Some(application(7)));
        assert_eq!(pending.take(id).unwrap(), Some(application(7)));
        assert_eq!(pending.take(id).unwrap(), None);
    }

    #[test]
    fn failed_answer_can_be_retried() {
        let db = BotDb::temporary().unwrap();
        let pending = PendingDb::new(&db).unwrap();

        let id = pending.open(&application(7)).unwrap();
        let taken = pending.take(id).unwrap().unwrap();

        assert!(pending.restore(id, &taken).unwrap());
        assert!(pending.has_application(ChannelId::new(100), UserId::new(7)).unwrap());
        assert_eq!(pending.take(id).unwrap(), Some(application(7)));
    }

    #[test]
    fn restore_never_overwrites() {
        let db = BotDb::temporary().unwrap();
        let pending = PendingDb::new(&db).unwrap();

        let id = pending.open(&application(7)).unwrap();

        assert!(!pending.restore(id, &application(8)).unwrap());
        assert_eq!(pending.get(id).unwrap(), Some(application(7)));
    }

    #[test]
    fn ids_are_unique() {
        let db = BotDb::temporary().unwrap();
        let pending = PendingDb::new(&db).unwrap();

        let first = pending.open(&application(7)).unwrap();
        let second = pending.open(&application(8)).unwrap();

        assert_ne!(first, second);
    }

    #[test]
    fn applications_are_tracked_per_clan() {
        let db = BotDb::temporary().unwrap();
        let pending = PendingDb::new(&db).unwrap();

        pending.open(&application(7)).unwrap();
        pending
            .open(&PendingRequest::ClanCreation {
                guild_id: 1,
                requester: 9,
                name: "Ants".to_owned(),
                description: String::new(),
            })
            .unwrap();

        assert!(pending.has_application(ChannelId::new(100), UserId::new(7)).unwrap());
        assert!(!pending.has_application(ChannelId::new(101), UserId::new(7)).unwrap());
        assert!(!pending.has_application(ChannelId::new(100), UserId::new(8)).unwrap());

        assert_eq!(pending.discard_for_clan(ChannelId::new(100)).unwrap(), 1);
        assert!(!pending.has_application(ChannelId::new(100), UserId::new(7)).unwrap());
    }
}
