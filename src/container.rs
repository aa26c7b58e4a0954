//! The two container variants and their ownership policies.
//!
//! Each insertion comes in three flavours that differ only in who owns the
//! argument afterwards:
//!
//! - `*_copy`: the container stores a deep copy, the caller keeps the input.
//! - `*_move`: the container takes the value. If growing the container
//!   fails, the value comes back inside [`Rejected`] and the caller still
//!   owns it.
//! - `*_move_or_free`: the container takes a created node. Whatever happens,
//!   the caller is done with it: on failure the node is freed here.
//!
//! Buffers are charged to the zone as reserved slots. Growth asks the zone
//! first, so a refused growth leaves the container exactly as it was.

use crate::error::{Rejected, Result};
use crate::value::Value;
use crate::zone::Zone;
use core::mem;

/// Owned object key.
pub type Key = Box<[u8]>;

pub(crate) fn copy_key(zone: &Zone, key: &[u8]) -> Result<Key> {
    tri!(zone.allocate(key.len()));
    Ok(key.into())
}

fn next_slots(slots: usize) -> usize {
    slots.saturating_mul(2).max(4)
}

// Bytes for `slots` buffer slots, refused when no buffer could be that big.
fn slot_bytes(zone: &Zone, slots: usize, slot: usize) -> Result<usize> {
    match slots.checked_mul(slot) {
        Some(bytes) if bytes <= isize::MAX as usize => Ok(bytes),
        _ => Err(zone.refuse(usize::MAX)),
    }
}

/// A JSON array: values in a significant order.
#[derive(Debug, Default)]
pub struct List<'a> {
    pub(crate) items: Vec<Value<'a>>,
    pub(crate) slots: usize,
}

impl<'a> List<'a> {
    pub(crate) const SLOT: usize = mem::size_of::<Value<'static>>();

    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(zone: &Zone, slots: usize) -> Result<Self> {
        let bytes = tri!(slot_bytes(zone, slots, Self::SLOT));
        tri!(zone.allocate(bytes));
        Ok(Self {
            items: Vec::with_capacity(slots),
            slots,
        })
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
    pub fn iter(&self) -> core::slice::Iter<'_, Value<'a>> {
        self.items.iter()
    }
    pub fn as_slice(&self) -> &[Value<'a>] {
        &self.items
    }

    pub fn get(&self, index: usize) -> Option<&Value<'a>> {
        self.items.get(index)
    }
    pub fn get_mut(&mut self, index: usize) -> Option<&mut Value<'a>> {
        self.items.get_mut(index)
    }

    pub(crate) fn buffer_bytes(&self) -> usize {
        self.slots * Self::SLOT
    }

    fn reserve_one(&mut self, zone: &Zone) -> Result<()> {
        if self.items.len() < self.slots {
            return Ok(());
        }
        let slots = next_slots(self.slots);
        let bytes = tri!(slot_bytes(zone, slots, Self::SLOT));
        tri!(zone.reallocate(self.buffer_bytes(), bytes));
        self.items.reserve_exact(slots - self.items.len());
        self.slots = slots;
        Ok(())
    }

    /// Appends a deep copy of `value`.
    pub fn push_copy(&mut self, zone: &Zone, value: &Value<'_>) -> Result<()> {
        tri!(self.reserve_one(zone));
        let copy = tri!(value.copy(zone));
        self.items.push(copy);
        Ok(())
    }

    /// Appends `value`, taking ownership. On failure the value is returned.
    pub fn push_move(&mut self, zone: &Zone, value: Value<'a>) -> Result<(), Rejected<Value<'a>>> {
        match self.reserve_one(zone) {
            Ok(()) => {
                self.items.push(value);
                Ok(())
            }
            Err(e) => Err(Rejected::new(value, e)),
        }
    }

    /// Appends a created node. On failure the node is freed.
    pub fn push_move_or_free(&mut self, zone: &Zone, node: Box<Value<'a>>) -> Result<()> {
        let value = node.into_inner(zone);
        self.push_move(zone, value).map_err(|rejected| {
            let Rejected { mut value, error } = rejected;
            value.destroy(zone);
            error
        })
    }
}

/// What [`Array::insert_owned`] does with a moved key when the insertion
/// fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyOnFailure {
    Free,
    Return,
}

/// A JSON object: `(key, value)` pairs in insertion order. Keys are not
/// deduplicated; lookups see the first match.
#[derive(Debug, Default)]
pub struct Array<'a> {
    pub(crate) entries: Vec<(Key, Value<'a>)>,
    pub(crate) slots: usize,
}

impl<'a> Array<'a> {
    pub(crate) const SLOT: usize = mem::size_of::<(Key, Value<'static>)>();

    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(zone: &Zone, slots: usize) -> Result<Self> {
        let bytes = tri!(slot_bytes(zone, slots, Self::SLOT));
        tri!(zone.allocate(bytes));
        Ok(Self {
            entries: Vec::with_capacity(slots),
            slots,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
    pub fn iter(
        &self,
    ) -> impl DoubleEndedIterator<Item = (&[u8], &Value<'a>)> + ExactSizeIterator + '_ {
        self.entries.iter().map(|(k, v)| (&**k, v))
    }
    pub fn keys(&self) -> impl Iterator<Item = &[u8]> + '_ {
        self.entries.iter().map(|(k, _)| &**k)
    }

    fn position(&self, key: &[u8]) -> Option<usize> {
        self.entries.iter().position(|(k, _)| **k == *key)
    }

    pub fn get(&self, key: impl AsRef<[u8]>) -> Option<&Value<'a>> {
        self.position(key.as_ref()).map(|i| &self.entries[i].1)
    }
    pub fn get_mut(&mut self, key: impl AsRef<[u8]>) -> Option<&mut Value<'a>> {
        match self.position(key.as_ref()) {
            Some(i) => Some(&mut self.entries[i].1),
            None => None,
        }
    }
    pub fn contains_key(&self, key: impl AsRef<[u8]>) -> bool {
        self.position(key.as_ref()).is_some()
    }

    pub(crate) fn buffer_bytes(&self) -> usize {
        self.slots * Self::SLOT
    }

    fn reserve_one(&mut self, zone: &Zone) -> Result<()> {
        if self.entries.len() < self.slots {
            return Ok(());
        }
        let slots = next_slots(self.slots);
        let bytes = tri!(slot_bytes(zone, slots, Self::SLOT));
        tri!(zone.reallocate(self.buffer_bytes(), bytes));
        self.entries.reserve_exact(slots - self.entries.len());
        self.slots = slots;
        Ok(())
    }

    /// Copies both the key and the value.
    pub fn insert_copy(&mut self, zone: &Zone, key: impl AsRef<[u8]>, value: &Value<'_>) -> Result<()> {
        tri!(self.reserve_one(zone));
        let key = tri!(copy_key(zone, key.as_ref()));
        match value.copy(zone) {
            Ok(copy) => {
                self.entries.push((key, copy));
                Ok(())
            }
            Err(e) => {
                zone.release(key.len());
                Err(e)
            }
        }
    }

    /// Copies the key and takes ownership of `value`. On failure the value
    /// is returned.
    pub fn insert_move(
        &mut self,
        zone: &Zone,
        key: impl AsRef<[u8]>,
        value: Value<'a>,
    ) -> Result<(), Rejected<Value<'a>>> {
        let key = match self
            .reserve_one(zone)
            .and_then(|()| copy_key(zone, key.as_ref()))
        {
            Ok(key) => key,
            Err(e) => return Err(Rejected::new(value, e)),
        };
        self.entries.push((key, value));
        Ok(())
    }

    /// Copies the key and takes a created node. On failure the node is
    /// freed.
    pub fn insert_move_or_free(
        &mut self,
        zone: &Zone,
        key: impl AsRef<[u8]>,
        node: Box<Value<'a>>,
    ) -> Result<()> {
        let value = node.into_inner(zone);
        self.insert_move(zone, key, value).map_err(|rejected| {
            let Rejected { mut value, error } = rejected;
            value.destroy(zone);
            error
        })
    }

    /// Takes ownership of both the key buffer and the value. The key is
    /// charged to the zone when it is adopted. On failure the value always
    /// comes back; the key comes back only with [`KeyOnFailure::Return`].
    pub fn insert_owned(
        &mut self,
        zone: &Zone,
        key: Vec<u8>,
        value: Value<'a>,
        on_failure: KeyOnFailure,
    ) -> Result<(), Rejected<(Option<Vec<u8>>, Value<'a>)>> {
        let adopted = self
            .reserve_one(zone)
            .and_then(|()| zone.allocate(key.len()));
        match adopted {
            Ok(()) => {
                self.entries.push((key.into_boxed_slice(), value));
                Ok(())
            }
            Err(e) => {
                let key = match on_failure {
                    KeyOnFailure::Free => None,
                    KeyOnFailure::Return => Some(key),
                };
                Err(Rejected::new((key, value), e))
            }
        }
    }

    /// Removes the first entry under `key`, releasing its key and value.
    /// Later entries keep their relative order.
    pub fn remove(&mut self, zone: &Zone, key: impl AsRef<[u8]>) -> bool {
        let Some(i) = self.position(key.as_ref()) else {
            return false;
        };
        let (key, mut value) = self.entries.remove(i);
        zone.release(key.len());
        value.destroy(zone);
        true
    }

    /// Replaces the value of the first entry under `key` with a copy of
    /// `replacement`, keeping its position. Returns `Ok(false)` without
    /// touching anything when the key is absent. If the copy fails the old
    /// value is left in place.
    pub fn replace(&mut self, zone: &Zone, key: impl AsRef<[u8]>, replacement: &Value<'_>) -> Result<bool> {
        let Some(i) = self.position(key.as_ref()) else {
            return Ok(false);
        };
        let copy = tri!(replacement.copy(zone));
        let mut old = mem::replace(&mut self.entries[i].1, copy);
        old.destroy(zone);
        Ok(true)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn num(n: f64) -> Value<'static> {
        Value::number(n)
    }

    #[test]
    fn test_list_lookup_bounds() {
        let z = Zone::new("t");
        let mut l = List::new();
        l.push_move(&z, num(1.0)).unwrap();
        l.push_move(&z, num(2.0)).unwrap();
        assert_eq!(l.get(1).and_then(Value::as_f64), Some(2.0));
        assert!(l.get(2).is_none());
        assert!(l.get(usize::MAX).is_none());
        Value::List(l).destroy(&z);
        assert!(z.is_balanced());
    }

    #[test]
    fn test_list_growth_doubles() {
        let z = Zone::new("t");
        let mut l = List::new();
        for i in 0..5 {
            l.push_move(&z, num(i as f64)).unwrap();
        }
        assert_eq!(l.slots, 8);
        assert_eq!(z.live_bytes(), 8 * List::SLOT);
        assert_eq!(z.live_allocations(), 1);
        Value::List(l).destroy(&z);
        assert!(z.is_balanced());
    }

    #[test]
    fn test_push_move_rejected_keeps_value() {
        let z = Zone::failing_after("t", 1);
        let s = Value::string_copy(&z, "kept").unwrap();
        let mut l = List::new();
        let rejected = l.push_move(&z, s).unwrap_err();
        assert!(rejected.error.is_allocation());
        assert!(l.is_empty());
        let mut back = rejected.value;
        assert_eq!(back.as_bytes(), Some(&b"kept"[..]));
        back.destroy(&z);
        assert!(z.is_balanced());
    }

    #[test]
    fn test_push_move_or_free_frees_on_failure() {
        let z = Zone::failing_after("t", 2);
        let node = Value::create_string_copy(&z, "gone").unwrap();
        let mut l = List::new();
        assert!(l.push_move_or_free(&z, node).is_err());
        assert!(l.is_empty());
        assert!(z.is_balanced());
    }

    #[test]
    fn test_insert_owned_key_policy() {
        let z = Zone::with_limit("t", 0);
        let mut a = Array::new();
        let r = a
            .insert_owned(&z, b"k".to_vec(), num(1.0), KeyOnFailure::Return)
            .unwrap_err();
        assert_eq!(r.value.0.as_deref(), Some(&b"k"[..]));
        let r = a
            .insert_owned(&z, b"k".to_vec(), num(1.0), KeyOnFailure::Free)
            .unwrap_err();
        assert!(r.value.0.is_none());
        assert!(a.is_empty());
        assert!(z.is_balanced());
    }

    #[test]
    fn test_remove_shifts() {
        let z = Zone::new("t");
        let mut a = Array::new();
        for (k, n) in [("a", 1.0), ("b", 2.0), ("c", 3.0)] {
            a.insert_move(&z, k, num(n)).unwrap();
        }
        assert!(a.remove(&z, "b"));
        assert_eq!(a.keys().collect::<Vec<_>>(), [&b"a"[..], &b"c"[..]]);
        assert!(!a.remove(&z, "b"));
        assert_eq!(a.len(), 2);
        Value::Array(a).destroy(&z);
        assert!(z.is_balanced());
    }

    #[test]
    fn test_replace_failure_keeps_old() {
        let z = Zone::new("t");
        let mut a = Array::new();
        a.insert_move(&z, "k", num(1.0)).unwrap();
        let tight = Zone::failing_after("tight", 0);
        let replacement = Value::string_ref("xyz");
        assert!(a.replace(&tight, "k", &replacement).is_err());
        assert_eq!(a.get("k").and_then(Value::as_f64), Some(1.0));
        Value::Array(a).destroy(&z);
        assert!(z.is_balanced());
    }

    #[test]
    fn test_array_iter_reverses() {
        let z = Zone::new("t");
        let mut a = Array::new();
        for (k, n) in [("a", 1.0), ("b", 2.0), ("c", 3.0)] {
            a.insert_move(&z, k, num(n)).unwrap();
        }
        assert_eq!(a.iter().len(), 3);
        let back: Vec<_> = a.iter().rev().map(|(k, v)| (k, v.as_f64())).collect();
        assert_eq!(
            back,
            [(&b"c"[..], Some(3.0)), (&b"b"[..], Some(2.0)), (&b"a"[..], Some(1.0))]
        );
        let (i, (k, _)) = a.iter().enumerate().rev().next().unwrap();
        assert_eq!((i, k), (2, &b"c"[..]));
        Value::Array(a).destroy(&z);
        assert!(z.is_balanced());
    }

    #[test]
    fn test_with_capacity_overflow_is_refused() {
        let z = Zone::with_limit("t", 1024);
        let err = List::with_capacity(&z, usize::MAX / 8).unwrap_err();
        assert!(err.is_allocation());
        let err = Array::with_capacity(&z, usize::MAX / 8).unwrap_err();
        assert!(err.is_allocation());
        assert_eq!(z.refused(), 2);

        let unbounded = Zone::new("u");
        assert!(List::with_capacity(&unbounded, usize::MAX).is_err());
        assert!(Array::with_capacity(&unbounded, usize::MAX / 2).is_err());
        assert!(z.is_balanced());
        assert!(unbounded.is_balanced());
    }
}
