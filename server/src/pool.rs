//! Fixed-size object pool addressed by [`ObjectKey`]
//!
//! Slot indices double as network indices: slot `i` is replicated as
//! `net_index = i` to every client. Each spawn stamps the slot with a fresh
//! serial, so keys held across a despawn/respawn of the same slot stop
//! resolving instead of silently pointing at the new occupant.

use shared::{ObjectKey, ObjectSyncState, OBJ_MAX_NETWORK_OBJECTS};

#[derive(Debug, Clone, Copy, Default)]
pub struct PooledObject {
    /// Spawn serial; 0 marks a free slot.
    serial: u32,
    pub sync: ObjectSyncState,
    /// Fractional animation progress, in frames.
    pub animation_t: f32,
}

impl PooledObject {
    pub fn is_free(&self) -> bool {
        self.serial == 0
    }
}

#[derive(Debug, Clone)]
pub struct ObjectPool {
    slots: Vec<PooledObject>,
    next_serial: u32,
}

impl ObjectPool {
    pub fn new() -> Self {
        Self {
            slots: vec![PooledObject::default(); OBJ_MAX_NETWORK_OBJECTS],
            next_serial: 1,
        }
    }

    /// Places `sync` in the first free slot.
    ///
    /// Returns `None` when every slot is taken.
    pub fn spawn(&mut self, mut sync: ObjectSyncState) -> Option<ObjectKey> {
        let index = self.slots.iter().position(PooledObject::is_free)?;

        let serial = self.next_serial;
        self.next_serial = self.next_serial.wrapping_add(1).max(1);

        sync.init = true;
        sync.is_active = true;
        self.slots[index] = PooledObject {
            serial,
            sync,
            animation_t: 0.0,
        };
        Some(ObjectKey::new(serial, index as u32))
    }

    pub fn despawn(&mut self, key: ObjectKey) -> bool {
        match self.resolve(key) {
            Some(index) => {
                self.slots[index] = PooledObject::default();
                true
            }
            None => false,
        }
    }

    fn resolve(&self, key: ObjectKey) -> Option<usize> {
        if key.is_none() {
            return None;
        }
        let index = key.index as usize;
        let slot = self.slots.get(index)?;
        (slot.serial == key.serial).then_some(index)
    }

    pub fn get(&self, key: ObjectKey) -> Option<&ObjectSyncState> {
        let index = self.resolve(key)?;
        Some(&self.slots[index].sync)
    }

    pub fn get_mut(&mut self, key: ObjectKey) -> Option<&mut ObjectSyncState> {
        let index = self.resolve(key)?;
        Some(&mut self.slots[index].sync)
    }

    pub fn key_at(&self, index: usize) -> Option<ObjectKey> {
        let slot = self.slots.get(index)?;
        (!slot.is_free()).then(|| ObjectKey::new(slot.serial, index as u32))
    }

    /// Replicated state of slot `index`, or `None` if the slot is free.
    pub fn sync_at(&self, index: usize) -> Option<&ObjectSyncState> {
        self.slots
            .get(index)
            .filter(|slot| !slot.is_free())
            .map(|slot| &slot.sync)
    }

    pub fn slots(&self) -> &[PooledObject] {
        &self.slots
    }

    pub fn slots_mut(&mut self) -> &mut [PooledObject] {
        &mut self.slots
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| !slot.is_free()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ObjectPool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec2;

    fn at(x: f32) -> ObjectSyncState {
        ObjectSyncState {
            p: Vec2::new(x, 0.0),
            ..ObjectSyncState::default()
        }
    }

    #[test]
    fn test_spawn_marks_active() {
        let mut pool = ObjectPool::new();
        let key = pool.spawn(at(1.0)).unwrap();
        assert!(!key.is_none());

        let sync = pool.get(key).unwrap();
        assert!(sync.init);
        assert!(sync.is_active);
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_stale_key_does_not_resolve_after_reuse() {
        let mut pool = ObjectPool::new();
        let old = pool.spawn(at(1.0)).unwrap();
        assert!(pool.despawn(old));

        let new = pool.spawn(at(2.0)).unwrap();
        assert_eq!(new.index, old.index);
        assert_ne!(new.serial, old.serial);
        assert!(pool.get(old).is_none());
        assert!(!pool.despawn(old));
        assert_eq!(pool.get(new).unwrap().p.x, 2.0);
    }

    #[test]
    fn test_pool_capacity() {
        let mut pool = ObjectPool::new();
        for i in 0..OBJ_MAX_NETWORK_OBJECTS {
            assert!(pool.spawn(at(i as f32)).is_some());
        }
        assert!(pool.spawn(at(0.0)).is_none());
    }

    #[test]
    fn test_default_and_out_of_range_keys() {
        let mut pool = ObjectPool::new();
        pool.spawn(at(0.0)).unwrap();
        assert!(pool.get(ObjectKey::default()).is_none());
        assert!(pool.get(ObjectKey::new(1, 9999)).is_none());
    }

    #[test]
    fn test_free_slot_has_no_sync() {
        let mut pool = ObjectPool::new();
        let key = pool.spawn(at(0.0)).unwrap();
        assert!(pool.sync_at(key.index as usize).is_some());
        assert!(pool.sync_at(key.index as usize + 1).is_none());
        assert_eq!(pool.key_at(key.index as usize), Some(key));
    }
}
