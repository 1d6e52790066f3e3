use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::Mutex;

use bytes::Bytes;
use futures::future::BoxFuture;

use super::{PendingItem, RequestSource, SourceError};

/// In-memory pseudo-queue with scriptable failures.
///
/// Listings return every unacknowledged payload sorted by key, like the
/// object-store source. Listing failures are scripted per call; fetch and
/// acknowledge failures are scripted per key and fire once.
#[derive(Default)]
pub(crate) struct MockSource {
    payloads: Mutex<BTreeMap<String, Bytes>>,
    list_failures: Mutex<VecDeque<Option<SourceError>>>,
    fetch_failures: Mutex<HashSet<String>>,
    ack_failures: Mutex<HashSet<String>>,
    list_calls: Mutex<u32>,
    acknowledged: Mutex<Vec<String>>,
}

impl MockSource {
    pub(crate) fn with_payloads<P: AsRef<[u8]>>(payloads: Vec<(&str, P)>) -> Self {
        let source = Self::default();
        for (key, payload) in payloads {
            source.push(key, payload.as_ref());
        }
        source
    }

    pub(crate) fn push(&self, key: &str, payload: &[u8]) {
        self.payloads
            .lock()
            .expect("payloads mutex poisoned")
            .insert(key.to_string(), Bytes::copy_from_slice(payload));
    }

    /// Scripts the next listings: `None` entries succeed, `Some` entries fail.
    pub(crate) fn script_listings(&self, script: Vec<Option<SourceError>>) {
        self.list_failures
            .lock()
            .expect("list_failures mutex poisoned")
            .extend(script);
    }

    pub(crate) fn fail_fetch_once(&self, key: &str) {
        self.fetch_failures
            .lock()
            .expect("fetch_failures mutex poisoned")
            .insert(key.to_string());
    }

    pub(crate) fn fail_ack_once(&self, key: &str) {
        self.ack_failures
            .lock()
            .expect("ack_failures mutex poisoned")
            .insert(key.to_string());
    }

    pub(crate) fn list_calls(&self) -> u32 {
        *self.list_calls.lock().expect("list_calls mutex poisoned")
    }

    pub(crate) fn acknowledged(&self) -> Vec<String> {
        self.acknowledged
            .lock()
            .expect("acknowledged mutex poisoned")
            .clone()
    }

    pub(crate) fn remaining(&self) -> Vec<String> {
        self.payloads
            .lock()
            .expect("payloads mutex poisoned")
            .keys()
            .cloned()
            .collect()
    }
}

impl RequestSource for MockSource {
    fn describe(&self) -> String {
        "mock".to_string()
    }

    fn list_pending<'a>(&'a self) -> BoxFuture<'a, Result<Vec<PendingItem>, SourceError>> {
        Box::pin(async move {
            *self.list_calls.lock().expect("list_calls mutex poisoned") += 1;

            let scripted = self
                .list_failures
                .lock()
                .expect("list_failures mutex poisoned")
                .pop_front()
                .flatten();
            if let Some(err) = scripted {
                return Err(err);
            }

            Ok(self
                .payloads
                .lock()
                .expect("payloads mutex poisoned")
                .keys()
                .map(PendingItem::keyed)
                .collect())
        })
    }

    fn fetch<'a>(&'a self, item: &'a PendingItem) -> BoxFuture<'a, Result<Bytes, SourceError>> {
        Box::pin(async move {
            if self
                .fetch_failures
                .lock()
                .expect("fetch_failures mutex poisoned")
                .remove(&item.key)
            {
                return Err(SourceError::Unavailable(format!("scripted fetch failure {}", item.key)));
            }

            self.payloads
                .lock()
                .expect("payloads mutex poisoned")
                .get(&item.key)
                .cloned()
                .ok_or_else(|| SourceError::Unavailable(format!("no payload for {}", item.key)))
        })
    }

    fn acknowledge<'a>(&'a self, item: &'a PendingItem) -> BoxFuture<'a, Result<(), SourceError>> {
        Box::pin(async move {
            if self
                .ack_failures
                .lock()
                .expect("ack_failures mutex poisoned")
                .remove(&item.key)
            {
                return Err(SourceError::Unavailable(format!("scripted ack failure {}", item.key)));
            }

            self.payloads
                .lock()
                .expect("payloads mutex poisoned")
                .remove(&item.key);
            self.acknowledged
                .lock()
                .expect("acknowledged mutex poisoned")
                .push(item.key.clone());
            Ok(())
        })
    }
}
