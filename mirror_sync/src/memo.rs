//! Memoized transforms over cached payloads.
//!
//! Results are keyed by `(TransformId, ContentHash)`. Content hashes never
//! change meaning, so entries never need invalidation; the LRU bound only
//! keeps long sessions from growing without limit.

use lru::LruCache;
use mirror_core::ContentHash;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use std::{
    any::Any,
    borrow::Cow,
    fmt,
    num::NonZeroUsize,
    sync::{Arc, OnceLock},
};

/// Stable name of a transform, used as half of the memo key.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TransformId(Cow<'static, str>);

impl TransformId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&'static str> for TransformId {
    fn from(value: &'static str) -> Self {
        Self(Cow::Borrowed(value))
    }
}

impl From<String> for TransformId {
    fn from(value: String) -> Self {
        Self(Cow::Owned(value))
    }
}

impl fmt::Display for TransformId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A pure function from raw payload bytes to a derived value.
///
/// Two transforms with the same id must compute the same thing: the memo
/// hands out the first result for every later caller. Transforms run
/// outside the memo lock; callers racing on the same key wait for the first
/// computation instead of running their own.
pub struct Transform<R> {
    id: TransformId,
    func: Arc<dyn Fn(&[u8]) -> R + Send + Sync>,
}

impl<R> Clone for Transform<R> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            func: self.func.clone(),
        }
    }
}

impl<R> fmt::Debug for Transform<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Transform").field(&self.id).finish()
    }
}

impl<R: Send + Sync + 'static> Transform<R> {
    pub fn new<F>(id: impl Into<TransformId>, func: F) -> Self
    where
        F: Fn(&[u8]) -> R + Send + Sync + 'static,
    {
        Self {
            id: id.into(),
            func: Arc::new(func),
        }
    }

    pub fn id(&self) -> &TransformId {
        &self.id
    }

    pub fn apply(&self, raw: &[u8]) -> R {
        (self.func)(raw)
    }
}

impl Transform<String> {
    /// Lossy UTF-8 decoding.
    pub fn text() -> Self {
        Self::new("text", |raw| String::from_utf8_lossy(raw).into_owned())
    }
}

impl<T: DeserializeOwned + Send + Sync + 'static> Transform<serde_json::Result<T>> {
    /// JSON decoding into `T`. Decoding errors are part of the value.
    pub fn json() -> Self {
        let id = format!("json:{}", std::any::type_name::<T>());
        Self::new(id, |raw| serde_json::from_slice(raw))
    }
}

type Memoized = Arc<dyn Any + Send + Sync>;

/// Filled once by whichever caller gets to it first.
type Slot = Arc<OnceLock<Memoized>>;

#[derive(Debug)]
pub struct TransformMemo {
    entries: Mutex<LruCache<(TransformId, ContentHash), Slot>>,
}

impl TransformMemo {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Returns the memoized result for `(transform, hash)`, computing it
    /// from `raw` on a miss. Hits return the same `Arc`.
    ///
    /// The lock only guards the slot lookup, so a slow transform never
    /// blocks reads of other keys.
    pub fn get_or_compute<R>(&self, transform: &Transform<R>, hash: &ContentHash, raw: &[u8]) -> Arc<R>
    where
        R: Send + Sync + 'static,
    {
        let key = (transform.id().clone(), hash.clone());
        let slot = self.entries.lock().get_or_insert(key.clone(), Slot::default).clone();
        let memoized = slot.get_or_init(|| -> Memoized { Arc::new(transform.apply(raw)) });
        if let Ok(value) = Arc::clone(memoized).downcast::<R>() {
            return value;
        }

        // same id, different output type: replace the slot
        let value = Arc::new(transform.apply(raw));
        let erased: Memoized = value.clone();
        self.entries.lock().put(key, Arc::new(OnceLock::from(erased)));
        value
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn hits_are_pointer_identical() {
        let memo = TransformMemo::new(8);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let upper = Transform::new("upper", move |raw: &[u8]| {
            counter.fetch_add(1, Ordering::SeqCst);
            raw.to_ascii_uppercase()
        });
        let hash = ContentHash::from("h1");

        let first = memo.get_or_compute(&upper, &hash, b"abc");
        let second = memo.get_or_compute(&upper, &hash, b"abc");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(*first, b"ABC".to_vec());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn keys_include_transform_and_hash() {
        let memo = TransformMemo::new(8);
        let text = Transform::text();
        let len = Transform::new("len", |raw: &[u8]| raw.len());

        let a = memo.get_or_compute(&text, &ContentHash::from("h1"), b"one");
        let b = memo.get_or_compute(&text, &ContentHash::from("h2"), b"two");
        let c = memo.get_or_compute(&len, &ContentHash::from("h1"), b"one");
        assert_eq!(a.as_str(), "one");
        assert_eq!(b.as_str(), "two");
        assert_eq!(*c, 3);
        assert_eq!(memo.len(), 3);
    }

    #[test]
    fn type_mismatch_recomputes() {
        let memo = TransformMemo::new(8);
        let hash = ContentHash::from("h1");
        let as_len = Transform::new("same", |raw: &[u8]| raw.len());
        let as_text = Transform::new("same", |raw: &[u8]| String::from_utf8_lossy(raw).into_owned());

        assert_eq!(*memo.get_or_compute(&as_len, &hash, b"xy"), 2);
        assert_eq!(memo.get_or_compute(&as_text, &hash, b"xy").as_str(), "xy");
    }

    #[test]
    fn lru_bound_evicts_oldest() {
        let memo = TransformMemo::new(2);
        let text = Transform::text();
        let first = memo.get_or_compute(&text, &ContentHash::from("a"), b"a");
        memo.get_or_compute(&text, &ContentHash::from("b"), b"b");
        memo.get_or_compute(&text, &ContentHash::from("c"), b"c");
        assert_eq!(memo.len(), 2);

        // "a" was evicted: a new value is computed
        let again = memo.get_or_compute(&text, &ContentHash::from("a"), b"a");
        assert!(!Arc::ptr_eq(&first, &again));
        assert_eq!(*first, *again);
    }

    #[test]
    fn slow_transform_does_not_block_other_keys() {
        let memo = Arc::new(TransformMemo::new(8));
        let (started_tx, started_rx) = std::sync::mpsc::channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
        let release_rx = Mutex::new(release_rx);
        let slow = Transform::new("slow", move |raw: &[u8]| {
            started_tx.send(()).unwrap();
            release_rx.lock().recv().unwrap();
            raw.len()
        });

        let blocked = std::thread::spawn({
            let memo = memo.clone();
            move || *memo.get_or_compute(&slow, &ContentHash::from("h1"), b"abc")
        });
        started_rx.recv().unwrap();

        // the slow transform is still running on the other thread
        let text = memo.get_or_compute(&Transform::text(), &ContentHash::from("h2"), b"quick");
        assert_eq!(text.as_str(), "quick");

        release_tx.send(()).unwrap();
        assert_eq!(blocked.join().unwrap(), 3);
    }

    #[test]
    fn concurrent_callers_share_one_computation() {
        let memo = Arc::new(TransformMemo::new(8));
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let upper = Transform::new("upper", move |raw: &[u8]| {
            counter.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(std::time::Duration::from_millis(20));
            raw.to_ascii_uppercase()
        });

        let results: Vec<_> = (0..4)
            .map(|_| {
                let memo = memo.clone();
                let upper = upper.clone();
                std::thread::spawn(move || memo.get_or_compute(&upper, &ContentHash::from("h1"), b"abc"))
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .collect();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(results.iter().all(|value| Arc::ptr_eq(value, &results[0])));
    }

    #[test]
    fn transforms_may_use_the_memo() {
        let memo = Arc::new(TransformMemo::new(8));
        let inner = memo.clone();
        let nested = Transform::new("nested", move |raw: &[u8]| {
            inner.get_or_compute(&Transform::text(), &ContentHash::from("h1"), raw).len()
        });
        assert_eq!(*memo.get_or_compute(&nested, &ContentHash::from("h1"), b"four"), 4);
        assert_eq!(memo.len(), 2);
    }

    #[test]
    fn json_transform_decodes() {
        let json = Transform::<serde_json::Result<serde_json::Value>>::json();
        let value = json.apply(br#"{"name":"c1"}"#).unwrap();
        assert_eq!(value["name"], "c1");
        assert!(json.apply(b"not json").is_err());
    }
}
