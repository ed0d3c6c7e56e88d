use crate::{BotDb, ReadWriteTree};
use color_eyre::eyre::Result;
use poise::serenity_prelude::GuildId;
use serde::{Deserialize, Serialize};
use sled::Tree;
use std::collections::BTreeMap;

/// Setting names used across the bot. The record is open-ended, these are just the ones
/// something reads.
pub mod keys {
    pub const LOG_CHANNEL: &str = "log_channel";
    pub const LOG_JOIN: &str = "log_join_id";
    pub const LOG_LEAVE: &str = "log_leave_id";
    pub const LOG_MOD: &str = "log_mod_id";
    pub const LOG_VOICE: &str = "log_voice_id";
    pub const LOG_DELETE: &str = "log_delete_id";
    pub const LOG_EDIT: &str = "log_edit_id";
    pub const LOG_PROFILE: &str = "log_profile_id";
    pub const WELCOME_CHANNEL: &str = "welcome_channel_id";
    pub const STREAM_CHANNEL: &str = "stream_channel_id";
    pub const CLAN_LEADER_ROLE: &str = "clan_leader_role";
    pub const CLAN_APPROVE_CHANNEL: &str = "clan_approve_channel";
    pub const CLAN_LOG_CHANNEL: &str = "clan_log_channel";
    pub const CLAN_CATEGORY: &str = "clan_category";
    pub const STATUS_CHANNEL: &str = "status_channel_id";
    pub const STATUS_MESSAGE: &str = "status_message_id";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SettingValue {
    /// A channel, role or message snowflake.
    Id(u64),
    Text(String),
}

impl SettingValue {
    pub fn as_id(&self) -> Option<u64> {
        match self {
            SettingValue::Id(id) => Some(*id),
            SettingValue::Text(_) => None,
        }
    }
}

impl std::fmt::Display for SettingValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SettingValue::Id(id) => write!(f, "`{id}`"),
            SettingValue::Text(text) => write!(f, "{text}"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuildSettings(BTreeMap<String, SettingValue>);

impl GuildSettings {
    pub fn get(&self, key: &str) -> Option<&SettingValue> {
        self.0.get(key)
    }

    pub fn id(&self, key: &str) -> Option<u64> {
        self.get(key).and_then(SettingValue::as_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SettingValue)> {
        self.0.iter().map(|(key, value)| (key.as_str(), value))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// What gets merged into a [`GuildSettings`] record. `None` clears the key.
#[derive(Debug, Serialize, Deserialize)]
struct SettingChange {
    key: String,
    value: Option<SettingValue>,
}

pub struct SettingsDb(Tree);

impl SettingsDb {
    pub fn new(db: &BotDb) -> Result<Self> {
        let db = db.open_tree("server_settings")?;

        fn apply_change(
            _key: &[u8],
            old_value: Option<&[u8]>,
            merged_bytes: &[u8],
        ) -> Option<Vec<u8>> {
            BotDb::create_update_with_deserialization::<GuildSettings>(
                old_value,
                |mut settings| {
                    let Ok(change) = bincode::deserialize::<SettingChange>(merged_bytes) else {
                        tracing::error!("Failed to deserialize setting change, {:?}", merged_bytes);
                        return settings;
                    };

                    match change.value {
                        Some(value) => {
                            settings.0.insert(change.key, value);
                        }
                        None => {
                            settings.0.remove(&change.key);
                        }
                    }

                    settings
                },
                Default::default,
            )
        }

        db.set_merge_operator(apply_change);

        Ok(SettingsDb(db))
    }

    /// The whole record, empty if the server never configured anything.
    pub fn get(&self, guild_id: GuildId) -> Result<GuildSettings> {
        let guild_id: u64 = guild_id.into();
        Ok(self
            .0
            .typed_get::<u64, GuildSettings>(&guild_id)?
            .unwrap_or_default())
    }

    pub fn get_value(&self, guild_id: GuildId, key: &str) -> Result<Option<SettingValue>> {
        Ok(self.get(guild_id)?.get(key).cloned())
    }

    pub fn get_id(&self, guild_id: GuildId, key: &str) -> Result<Option<u64>> {
        Ok(self.get(guild_id)?.id(key))
    }

    pub fn set(&self, guild_id: GuildId, key: &str, value: SettingValue) -> Result<()> {
        self.merge(guild_id, key, Some(value))
    }

    pub fn set_id(&self, guild_id: GuildId, key: &str, id: impl Into<u64>) -> Result<()> {
        self.set(guild_id, key, SettingValue::Id(id.into()))
    }

    pub fn unset(&self, guild_id: GuildId, key: &str) -> Result<()> {
        self.merge(guild_id, key, None)
    }

    pub fn iter_all(&self) -> impl Iterator<Item = Result<(GuildId, GuildSettings)>> {
        self.0
            .typed_iter::<u64, GuildSettings>()
            .map(|entry| entry.map(|(guild_id, settings)| (GuildId::new(guild_id), settings)))
    }

    fn merge(&self, guild_id: GuildId, key: &str, value: Option<SettingValue>) -> Result<()> {
        let guild_id: u64 = guild_id.into();
        let change = SettingChange {
            key: key.to_owned(),
            value,
        };

        tracing::debug!("Setting change for {}: {:?}", guild_id, change);

        self.0.typed_merge::<u64, SettingChange>(&guild_id, &change)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn settings() -> (BotDb, SettingsDb) {
        let db = BotDb::temporary().unwrap();
        let settings = SettingsDb::new(&db).unwrap();
        (db, settings)
    }

    #[test]
    fn written_setting_reads_back() {
        let (_db, settings) = settings();
        let guild = GuildId::new(42);

        settings.set_id(guild, keys::WELCOME_CHANNEL, 1234u64).unwrap();
        settings
            .set(guild, "motd", SettingValue::Text("be nice".to_owned()))
            .unwrap();

        assert_eq!(
            settings.get_value(guild, keys::WELCOME_CHANNEL).unwrap(),
            Some(SettingValue::Id(1234))
        );
        assert_eq!(
            settings.get_value(guild, "motd").unwrap(),
            Some(SettingValue::Text("be nice".to_owned()))
        );
    }

    #[test]
    fn unset_key_is_absent() {
        let (_db, settings) = settings();
        let guild = GuildId::new(42);

        assert_eq!(settings.get_value(guild, keys::LOG_CHANNEL).unwrap(), None);
        assert!(settings.get(guild).unwrap().is_empty());

        settings.set_id(guild, keys::LOG_CHANNEL, 9u64).unwrap();
        settings.unset(guild, keys::LOG_CHANNEL).unwrap();

        assert_eq!(settings.get_id(guild, keys::LOG_CHANNEL).unwrap(), None);
    }

    #[test]
    fn servers_do_not_share_settings() {
        let (_db, settings) = settings();

        settings.set_id(GuildId::new(1), keys::STREAM_CHANNEL, 5u64).unwrap();
        settings.set_id(GuildId::new(1), keys::LOG_MOD, 6u64).unwrap();

        assert_eq!(
            settings.get_id(GuildId::new(1), keys::STREAM_CHANNEL).unwrap(),
            Some(5)
        );
        assert_eq!(settings.get_id(GuildId::new(1), keys::LOG_MOD).unwrap(), Some(6));
        assert_eq!(
            settings.get_id(GuildId::new(2), keys::STREAM_CHANNEL).unwrap(),
            None
        );
        assert_eq!(settings.iter_all().count(), 1);
    }
}
