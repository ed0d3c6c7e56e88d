use crate::{BotDb, ReadWriteTree};
use color_eyre::eyre::Result;
use itertools::Itertools;
use poise::serenity_prelude::{ChannelId, GuildId, RoleId, UserId};
use serde::{Deserialize, Serialize};
use sled::Tree;
use std::cmp::Reverse;

/// Maximum number of autocomplete suggestions discord accepts.
pub const MAX_SUGGESTIONS: usize = 25;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Clan {
    pub name: String,
    pub description: String,
    pub guild_id: u64,
    pub leader_id: u64,
    pub channel_id: u64,
    pub role_id: Option<u64>,
    /// Always contains the leader.
    pub members: Vec<u64>,
    /// Unix seconds.
    pub created_at: i64,
}

impl Clan {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        guild_id: GuildId,
        leader: UserId,
        channel_id: ChannelId,
        role_id: Option<RoleId>,
        created_at: i64,
    ) -> Self {
        let leader: u64 = leader.into();

        Clan {
            name: name.into(),
            description: description.into(),
            guild_id: guild_id.into(),
            leader_id: leader,
            channel_id: channel_id.into(),
            role_id: role_id.map(Into::into),
            members: vec![leader],
            created_at,
        }
    }

    pub fn guild(&self) -> GuildId {
        GuildId::new(self.guild_id)
    }

    pub fn leader(&self) -> UserId {
        UserId::new(self.leader_id)
    }

    pub fn channel(&self) -> ChannelId {
        ChannelId::new(self.channel_id)
    }

    pub fn role(&self) -> Option<RoleId> {
        self.role_id.map(RoleId::new)
    }

    pub fn member_ids(&self) -> Vec<UserId> {
        self.members.iter().copied().map(UserId::new).collect()
    }

    pub fn is_member(&self, user: UserId) -> bool {
        self.members.contains(&user.get())
    }

    pub fn is_leader(&self, user: UserId) -> bool {
        self.leader_id == user.get()
    }

    pub fn authorize(&self, actor: Actor) -> std::result::Result<(), ClanRefusal> {
        if actor.is_admin || self.is_leader(actor.user_id) {
            Ok(())
        } else {
            Err(ClanRefusal::NotLeader)
        }
    }

    pub fn ensure_can_apply(&self, applicant: UserId) -> std::result::Result<(), ClanRefusal> {
        if self.is_member(applicant) {
            Err(ClanRefusal::AlreadyMember)
        } else {
            Ok(())
        }
    }

    /// Returns whether the member list changed.
    fn add_member(&mut self, user: UserId) -> bool {
        if self.is_member(user) {
            return false;
        }

        self.members.push(user.get());
        true
    }

    fn remove_member(&mut self, user: UserId) -> std::result::Result<(), ClanRefusal> {
        let before = self.members.len();
        self.members.retain(|member| *member != user.get());

        if self.members.len() == before {
            Err(ClanRefusal::NotMember)
        } else {
            Ok(())
        }
    }
}

/// Who is attempting a clan operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub user_id: UserId,
    /// Server administrators may act on any clan.
    pub is_admin: bool,
}

impl Actor {
    pub fn member(user_id: UserId) -> Self {
        Actor {
            user_id,
            is_admin: false,
        }
    }

    pub fn admin(user_id: UserId) -> Self {
        Actor {
            user_id,
            is_admin: true,
        }
    }
}

/// Why a clan operation was refused. The record is left untouched in every case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ClanRefusal {
    #[error("This clan doesn't exist anymore.")]
    NotFound,
    #[error("Only the clan leader can do that.")]
    NotLeader,
    #[error("Leaders cannot leave. You must disband the clan or transfer ownership.")]
    LeaderCannotLeave,
    #[error("You are already in this clan (as a member or leader).")]
    AlreadyMember,
    #[error("That user is not a member of this clan.")]
    NotMember,
    #[error("The clan leader cannot be kicked.")]
    CannotKickLeader,
    #[error("That user already leads this clan.")]
    AlreadyLeader,
}

pub type Transition<T> = std::result::Result<T, ClanRefusal>;

/// Clans keyed by their channel id.
pub struct ClanDb(Tree);

impl ClanDb {
    pub fn new(db: &BotDb) -> Result<Self> {
        Ok(ClanDb(db.open_tree("clans")?))
    }

    pub fn create(&self, clan: &Clan) -> Result<()> {
        tracing::info!("Creating clan `{}` in channel {}", clan.name, clan.channel_id);
        self.0.typed_insert::<u64, Clan>(&clan.channel_id, clan)
    }

    pub fn get(&self, channel_id: ChannelId) -> Result<Option<Clan>> {
        let channel_id: u64 = channel_id.into();
        self.0.typed_get::<u64, Clan>(&channel_id)
    }

    pub fn iter_all(&self) -> impl Iterator<Item = Result<Clan>> {
        self.0
            .typed_iter::<u64, Clan>()
            .map(|entry| entry.map(|(_, clan)| clan))
    }

    pub fn list(&self, guild_id: GuildId) -> Result<Vec<Clan>> {
        let guild_id = guild_id.get();

        self.iter_all()
            .filter_ok(|clan| clan.guild_id == guild_id)
            .collect()
    }

    pub fn find_by_name(&self, guild_id: GuildId, name: &str) -> Result<Option<Clan>> {
        let name = name.trim().to_lowercase();

        Ok(self
            .list(guild_id)?
            .into_iter()
            .find(|clan| clan.name.to_lowercase() == name))
    }

    /// Names containing `partial`, case-insensitively, for autocompletion.
    pub fn search_names(&self, guild_id: GuildId, partial: &str) -> Result<Vec<String>> {
        let partial = partial.to_lowercase();

        Ok(self
            .list(guild_id)?
            .into_iter()
            .map(|clan| clan.name)
            .filter(|name| name.to_lowercase().contains(&partial))
            .sorted()
            .take(MAX_SUGGESTIONS)
            .collect())
    }

    /// Biggest clans first, ties broken by name.
    pub fn leaderboard(&self, guild_id: GuildId) -> Result<Vec<Clan>> {
        Ok(self
            .list(guild_id)?
            .into_iter()
            .sorted_by_key(|clan| (Reverse(clan.members.len()), clan.name.to_lowercase()))
            .collect())
    }

    /// Adds the applicant. Accepting someone who is already a member changes nothing.
    pub fn accept_member(
        &self,
        channel_id: ChannelId,
        actor: Actor,
        applicant: UserId,
    ) -> Result<Transition<Clan>> {
        self.transition(channel_id, |mut clan| {
            clan.authorize(actor)?;
            clan.add_member(applicant);
            Ok(Some(clan))
        })
    }

    pub fn leave(&self, channel_id: ChannelId, user: UserId) -> Result<Transition<Clan>> {
        self.transition(channel_id, |mut clan| {
            if clan.is_leader(user) {
                return Err(ClanRefusal::LeaderCannotLeave);
            }

            clan.remove_member(user)?;
            Ok(Some(clan))
        })
    }

    pub fn kick(
        &self,
        channel_id: ChannelId,
        actor: Actor,
        target: UserId,
    ) -> Result<Transition<Clan>> {
        self.transition(channel_id, |mut clan| {
            clan.authorize(actor)?;

            if clan.is_leader(target) {
                return Err(ClanRefusal::CannotKickLeader);
            }

            clan.remove_member(target)?;
            Ok(Some(clan))
        })
    }

    /// Checks a transfer could happen without changing anything, used before asking the
    /// nominee.
    pub fn check_transfer(
        &self,
        channel_id: ChannelId,
        actor: Actor,
        new_leader: UserId,
    ) -> Result<Transition<Clan>> {
        let Some(clan) = self.get(channel_id)? else {
            return Ok(Err(ClanRefusal::NotFound));
        };

        Ok(Self::validate_transfer(&clan, actor, new_leader).map(|()| clan))
    }

    /// Only the leader changes. The previous leader stays a member.
    pub fn transfer_ownership(
        &self,
        channel_id: ChannelId,
        actor: Actor,
        new_leader: UserId,
    ) -> Result<Transition<Clan>> {
        self.transition(channel_id, |mut clan| {
            Self::validate_transfer(&clan, actor, new_leader)?;
            clan.leader_id = new_leader.get();
            Ok(Some(clan))
        })
    }

    /// Removes the record and hands it back for cleanup.
    pub fn disband(&self, channel_id: ChannelId, actor: Actor) -> Result<Transition<Clan>> {
        self.transition(channel_id, |clan| {
            clan.authorize(actor)?;
            Ok(None)
        })
    }

    fn validate_transfer(clan: &Clan, actor: Actor, new_leader: UserId) -> Transition<()> {
        clan.authorize(actor)?;

        if clan.is_leader(new_leader) {
            return Err(ClanRefusal::AlreadyLeader);
        }

        if !clan.is_member(new_leader) {
            return Err(ClanRefusal::NotMember);
        }

        Ok(())
    }

    /// Runs `update` atomically on the clan behind `channel_id`.
    ///
    /// The returned clan is the new record, or the removed one when `update` returns `None`.
    fn transition(
        &self,
        channel_id: ChannelId,
        mut update: impl FnMut(Clan) -> Transition<Option<Clan>>,
    ) -> Result<Transition<Clan>> {
        let channel_id: u64 = channel_id.into();

        self.0
            .typed_transition::<u64, Clan, Clan, ClanRefusal>(&channel_id, |current| {
                let clan = current.ok_or(ClanRefusal::NotFound)?;
                let before = clan.clone();

                Ok(match update(clan)? {
                    Some(updated) => (Some(updated.clone()), updated),
                    None => (None, before),
                })
            })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const GUILD: GuildId = GuildId::new(1);
    const CHANNEL: ChannelId = ChannelId::new(100);
    const LEADER: UserId = UserId::new(10);
    const MEMBER: UserId = UserId::new(11);
    const OUTSIDER: UserId = UserId::new(12);
    const ADMIN: UserId = UserId::new(13);

    fn clan_db() -> (BotDb, ClanDb) {
        let db = BotDb::temporary().unwrap();
        let clans = ClanDb::new(&db).unwrap();

        let mut clan = Clan::new(
            "Night Owls",
            "we play late",
            GUILD,
            LEADER,
            CHANNEL,
            Some(RoleId::new(500)),
            0,
        );
        clan.members.push(MEMBER.get());
        clans.create(&clan).unwrap();

        (db, clans)
    }

    fn current(clans: &ClanDb) -> Clan {
        clans.get(CHANNEL).unwrap().unwrap()
    }

    #[test]
    fn accepting_twice_does_not_duplicate() {
        let (_db, clans) = clan_db();

        clans
            .accept_member(CHANNEL, Actor::member(LEADER), OUTSIDER)
            .unwrap()
            .unwrap();
        let clan = clans
            .accept_member(CHANNEL, Actor::member(LEADER), OUTSIDER)
            .unwrap()
            .unwrap();

        assert_eq!(
            clan.members.iter().filter(|m| **m == OUTSIDER.get()).count(),
            1
        );
        assert_eq!(current(&clans), clan);
    }

    #[test]
    fn member_cannot_reapply() {
        let (_db, clans) = clan_db();
        let before = current(&clans);

        assert_eq!(
            before.ensure_can_apply(MEMBER),
            Err(ClanRefusal::AlreadyMember)
        );
        assert_eq!(
            before.ensure_can_apply(LEADER),
            Err(ClanRefusal::AlreadyMember)
        );
        assert_eq!(before.ensure_can_apply(OUTSIDER), Ok(()));
        assert_eq!(current(&clans), before);
    }

    #[test]
    fn only_leader_or_admin_may_manage() {
        let (_db, clans) = clan_db();
        let before = current(&clans);
        let intruder = Actor::member(MEMBER);

        assert_eq!(
            clans.kick(CHANNEL, intruder, MEMBER).unwrap(),
            Err(ClanRefusal::NotLeader)
        );
        assert_eq!(
            clans.accept_member(CHANNEL, intruder, OUTSIDER).unwrap(),
            Err(ClanRefusal::NotLeader)
        );
        assert_eq!(
            clans.transfer_ownership(CHANNEL, intruder, MEMBER).unwrap(),
            Err(ClanRefusal::NotLeader)
        );
        assert_eq!(
            clans.disband(CHANNEL, intruder).unwrap(),
            Err(ClanRefusal::NotLeader)
        );
        assert_eq!(current(&clans), before);

        let clan = clans
            .kick(CHANNEL, Actor::admin(ADMIN), MEMBER)
            .unwrap()
            .unwrap();
        assert!(!clan.is_member(MEMBER));
    }

    #[test]
    fn leader_cannot_leave() {
        let (_db, clans) = clan_db();
        let before = current(&clans);

        assert_eq!(
            clans.leave(CHANNEL, LEADER).unwrap(),
            Err(ClanRefusal::LeaderCannotLeave)
        );

        let after = current(&clans);
        assert_eq!(after.leader_id, LEADER.get());
        assert_eq!(after.members, before.members);
    }

    #[test]
    fn member_can_leave_once() {
        let (_db, clans) = clan_db();

        let clan = clans.leave(CHANNEL, MEMBER).unwrap().unwrap();
        assert_eq!(clan.members, vec![LEADER.get()]);

        assert_eq!(
            clans.leave(CHANNEL, MEMBER).unwrap(),
            Err(ClanRefusal::NotMember)
        );
    }

    #[test]
    fn leader_cannot_be_kicked() {
        let (_db, clans) = clan_db();

        assert_eq!(
            clans.kick(CHANNEL, Actor::admin(ADMIN), LEADER).unwrap(),
            Err(ClanRefusal::CannotKickLeader)
        );
    }

    #[test]
    fn disband_removes_record() {
        let (_db, clans) = clan_db();

        let removed = clans.disband(CHANNEL, Actor::member(LEADER)).unwrap().unwrap();
        assert_eq!(removed.name, "Night Owls");

        assert_eq!(clans.get(CHANNEL).unwrap(), None);
        assert_eq!(clans.find_by_name(GUILD, "night owls").unwrap(), None);
        assert_eq!(
            clans.leave(CHANNEL, MEMBER).unwrap(),
            Err(ClanRefusal::NotFound)
        );
    }

    #[test]
    fn transfer_changes_only_the_leader() {
        let (_db, clans) = clan_db();
        let before = current(&clans);

        let after = clans
            .transfer_ownership(CHANNEL, Actor::member(LEADER), MEMBER)
            .unwrap()
            .unwrap();

        assert_eq!(after.leader_id, MEMBER.get());
        assert_eq!(after.members, before.members);
        assert!(after.is_member(LEADER));
        assert_eq!(
            Clan {
                leader_id: before.leader_id,
                ..after.clone()
            },
            before
        );
    }

    #[test]
    fn transfer_requires_a_member() {
        let (_db, clans) = clan_db();

        assert_eq!(
            clans
                .check_transfer(CHANNEL, Actor::member(LEADER), OUTSIDER)
                .unwrap(),
            Err(ClanRefusal::NotMember)
        );
        assert_eq!(
            clans
                .check_transfer(CHANNEL, Actor::member(LEADER), LEADER)
                .unwrap(),
            Err(ClanRefusal::AlreadyLeader)
        );
    }

    #[test]
    fn lookup_and_leaderboard() {
        let (_db, clans) = clan_db();

        let small = Clan::new("Ants", "", GUILD, OUTSIDER, ChannelId::new(101), None, 0);
        let elsewhere = Clan::new("Owls", "", GuildId::new(2), ADMIN, ChannelId::new(102), None, 0);
        clans.create(&small).unwrap();
        clans.create(&elsewhere).unwrap();

        assert_eq!(
            clans.find_by_name(GUILD, "NIGHT OWLS").unwrap().map(|c| c.channel_id),
            Some(CHANNEL.get())
        );
        assert_eq!(clans.search_names(GUILD, "owl").unwrap(), vec!["Night Owls"]);

        let names = clans
            .leaderboard(GUILD)
            .unwrap()
            .into_iter()
            .map(|clan| clan.name)
            .collect_vec();
        assert_eq!(names, vec!["Night Owls", "Ants"]);
    }
}
