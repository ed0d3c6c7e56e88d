pub mod clans;
pub mod pending;
pub mod settings;

use std::{fmt::Debug, path::Path};

use bot_traits::ForwardRefToTracing;
use color_eyre::eyre::{Context, Result};
use serde::{Serialize, de::DeserializeOwned};
use sled::{Db, Tree};

pub trait ReadWriteTree {
    fn typed_insert<K: DeserializeOwned + Serialize, V: DeserializeOwned + Serialize>(
        &self,
        key: &K,
        value: &V,
    ) -> Result<()>;

    fn typed_get<K: DeserializeOwned + Serialize, V: DeserializeOwned + Serialize>(
        &self,
        key: &K,
    ) -> Result<Option<V>>;

    fn typed_remove<K: DeserializeOwned + Serialize, V: DeserializeOwned + Serialize>(
        &self,
        key: &K,
    ) -> Result<Option<V>>;

    fn typed_merge<K: DeserializeOwned + Serialize, V: DeserializeOwned + Serialize>(
        &self,
        key: &K,
        value: &V,
    ) -> Result<()>;

    fn typed_iter<K: DeserializeOwned + Serialize, V: DeserializeOwned + Serialize>(
        &self,
    ) -> impl Iterator<Item = Result<(K, V)>>;

    /// Compare-and-swap loop over a single key.
    ///
    /// `transition` sees the current value and either refuses (inner `Err`, nothing is
    /// written) or returns the value to store (`None` removes the key) plus an output.
    /// If another writer changed the key in the meantime the transition is re-run on the
    /// fresh value.
    fn typed_transition<K, V, R, E>(
        &self,
        key: &K,
        transition: impl FnMut(Option<V>) -> std::result::Result<(Option<V>, R), E>,
    ) -> Result<std::result::Result<R, E>>
    where
        K: DeserializeOwned + Serialize,
        V: DeserializeOwned + Serialize;
}

impl ReadWriteTree for Tree {
    fn typed_insert<K: DeserializeOwned + Serialize, V: DeserializeOwned + Serialize>(
        &self,
        key: &K,
        value: &V,
    ) -> Result<()> {
        let key = bincode::serialize::<K>(key)?;
        let value = bincode::serialize::<V>(value)?;
        self.insert(key, value)?;
        Ok(())
    }

    fn typed_get<K: DeserializeOwned + Serialize, V: DeserializeOwned + Serialize>(
        &self,
        key: &K,
    ) -> Result<Option<V>> {
        Ok(self
            .get(bincode::serialize::<K>(key)?)?
            .map(|value| bincode::deserialize::<V>(&value))
            .transpose()?)
    }

    fn typed_remove<K: DeserializeOwned + Serialize, V: DeserializeOwned + Serialize>(
        &self,
        key: &K,
    ) -> Result<Option<V>> {
        Ok(self
            .remove(bincode::serialize::<K>(key)?)?
            .map(|value| bincode::deserialize::<V>(&value))
            .transpose()?)
    }

    fn typed_merge<K: DeserializeOwned + Serialize, V: DeserializeOwned + Serialize>(
        &self,
        key: &K,
        value: &V,
    ) -> Result<()> {
        self.merge(
            bincode::serialize::<K>(key)?,
            bincode::serialize::<V>(value)?,
        )?;
        Ok(())
    }

    fn typed_iter<K: DeserializeOwned + Serialize, V: DeserializeOwned + Serialize>(
        &self,
    ) -> impl Iterator<Item = Result<(K, V)>> {
        self.iter().map(|entry| -> Result<(K, V)> {
            let (key, value) = entry?;
            let key = bincode::deserialize::<K>(&key)?;
            let value = bincode::deserialize::<V>(&value)?;
            Ok((key, value))
        })
    }

    fn typed_transition<K, V, R, E>(
        &self,
        key: &K,
        mut transition: impl FnMut(Option<V>) -> std::result::Result<(Option<V>, R), E>,
    ) -> Result<std::result::Result<R, E>>
    where
        K: DeserializeOwned + Serialize,
        V: DeserializeOwned + Serialize,
    {
        let key = bincode::serialize::<K>(key)?;

        loop {
            let current = self.get(&key)?;
            let decoded = current
                .as_ref()
                .map(|value| bincode::deserialize::<V>(value))
                .transpose()?;

            let (next, output) = match transition(decoded) {
                Ok(accepted) => accepted,
                Err(refusal) => return Ok(Err(refusal)),
            };

            let next = next
                .map(|value| bincode::serialize::<V>(&value))
                .transpose()?;

            match self.compare_and_swap(&key, current, next)? {
                Ok(()) => return Ok(Ok(output)),
                Err(_) => {
                    tracing::debug!("Concurrent write on {:?}, retrying transition", key);
                }
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct BotDb(Db);

impl BotDb {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        sled::open(path)
            .map(Self)
            .wrap_err_with(|| format!("Failed to open database at {}", path.display()))
    }

    /// A throwaway database, removed when dropped.
    pub fn temporary() -> Result<Self> {
        Ok(Self(sled::Config::new().temporary(true).open()?))
    }

    pub fn flush(&self) -> Result<()> {
        self.0.flush().wrap_err("Failed to flush database")?;
        Ok(())
    }

    fn generate_id(&self) -> Result<u64> {
        self.0.generate_id().wrap_err("Failed to generate id")
    }

    fn create_update_with_deserialization<V: DeserializeOwned + Serialize + Debug>(
        old_value: Option<&[u8]>,
        update_function: impl FnMut(V) -> V,
        mut get_default_value: impl FnMut() -> V,
    ) -> Option<Vec<u8>> {
        old_value
            .map_or_else(
                || Ok(get_default_value()),
                |v| bincode::deserialize::<V>(v).wrap_err("Failed to deserialize"),
            )
            .trace_err_ok()
            .map(update_function)
            .map(|new_value| bincode::serialize::<V>(&new_value).wrap_err("Failed to serialize"))
            .transpose()
            .trace_err_ok()
            .flatten()
            .or_else(|| old_value.map(|v| v.to_vec()))
    }

    fn open_tree(&self, name: impl AsRef<[u8]>) -> Result<Tree> {
        self.0.open_tree(name).wrap_err("Failed to open tree")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn transition_refusal_writes_nothing() {
        let db = BotDb::temporary().unwrap();
        let tree = db.open_tree("counters").unwrap();
        tree.typed_insert(&1u64, &10u64).unwrap();

        let outcome = tree
            .typed_transition(&1u64, |value: Option<u64>| match value {
                Some(v) if v > 5 => Err("too big"),
                v => Ok((v.map(|v| v + 1), ())),
            })
            .unwrap();

        assert_eq!(outcome, Err("too big"));
        assert_eq!(tree.typed_get::<u64, u64>(&1).unwrap(), Some(10));
    }

    #[test]
    fn transition_can_remove() {
        let db = BotDb::temporary().unwrap();
        let tree = db.open_tree("counters").unwrap();
        tree.typed_insert(&7u64, &3u64).unwrap();

        let removed = tree
            .typed_transition(&7u64, |value: Option<u64>| Ok::<_, ()>((None, value)))
            .unwrap()
            .unwrap();

        assert_eq!(removed, Some(3));
        assert_eq!(tree.typed_get::<u64, u64>(&7).unwrap(), None);
    }
}
