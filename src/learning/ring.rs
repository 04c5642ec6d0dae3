use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Fixed-capacity circular log. Backed by a single arena and a write index;
/// appending past capacity overwrites the oldest entry with no intermediate
/// allocation. Iteration is oldest to newest.
#[derive(Debug, Clone)]
pub struct RingLog<T> {
    buf: Vec<T>,
    capacity: usize,
    /// Next slot to write once the arena is full.
    head: usize,
}

impl<T> RingLog<T> {
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "ring log capacity must be non-zero");
        Self {
            buf: Vec::with_capacity(capacity),
            capacity,
            head: 0,
        }
    }

    pub fn push(&mut self, item: T) {
        if self.buf.len() < self.capacity {
            self.buf.push(item);
        } else {
            self.buf[self.head] = item;
            self.head = (self.head + 1) % self.capacity;
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Oldest-to-newest iteration.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        let (older, newer) = self.buf.split_at(self.head.min(self.buf.len()));
        newer.iter().chain(older.iter())
    }

    pub fn last(&self) -> Option<&T> {
        if self.buf.is_empty() {
            return None;
        }
        let idx = if self.buf.len() < self.capacity {
            self.buf.len() - 1
        } else {
            (self.head + self.capacity - 1) % self.capacity
        };
        self.buf.get(idx)
    }

    /// The most recent `n` entries, oldest first.
    pub fn last_n(&self, n: usize) -> Vec<&T> {
        let skip = self.len().saturating_sub(n);
        self.iter().skip(skip).collect()
    }
}

/// Serialized as `{ capacity, items }` with items already in log order, so a
/// round trip preserves both order and the overwrite behavior.
#[derive(Serialize, Deserialize)]
struct RingLogRepr<T> {
    capacity: usize,
    items: Vec<T>,
}

impl<T: Serialize + Clone> Serialize for RingLog<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        RingLogRepr {
            capacity: self.capacity,
            items: self.iter().cloned().collect(),
        }
        .serialize(serializer)
    }
}

impl<'de, T: DeserializeOwned> Deserialize<'de> for RingLog<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let repr = RingLogRepr::<T>::deserialize(deserializer)?;
        if repr.capacity == 0 {
            return Err(serde::de::Error::custom("ring log capacity must be non-zero"));
        }
        // Re-push through the ring so an oversized items list still honors
        // the capacity.
        let mut log = RingLog::with_capacity(repr.capacity);
        for item in repr.items {
            log.push(item);
        }
        Ok(log)
    }
}
