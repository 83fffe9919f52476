//! Service and worker registries, and the broker-wide waiting list.
//!
//! Records are owned by `HashMap`s keyed on opaque identity bytes; all
//! cross-references (a service's idle-worker list, a worker's owning
//! service) are identity keys, never owning pointers — this avoids the
//! service/worker reference cycle described in `SPEC_FULL.md` §12 item 1.

use std::collections::{HashMap, VecDeque};
use std::time::Instant;

use crate::protocol::Channel;

/// A request queued against a service, awaiting an idle worker.
#[derive(Debug)]
pub struct PendingRequest {
    pub client_identity: Vec<u8>,
    pub payload: Vec<Vec<u8>>,
    pub channel: Channel,
}

/// A named service: its request backlog and its currently-idle workers.
#[derive(Debug, Default)]
pub struct ServiceRecord {
    pub requests: VecDeque<PendingRequest>,
    pub idle_workers: VecDeque<Vec<u8>>,
    pub worker_count: usize,
}

/// A registered worker.
#[derive(Debug)]
pub struct WorkerRecord {
    pub identity: Vec<u8>,
    pub service: Vec<u8>,
    pub channel: Channel,
    pub expiry: Instant,
    /// The originating client's channel for the request currently in
    /// flight to this worker, if any. Set by dispatch, consumed when the
    /// worker's REPLY comes back — this is how the broker preserves
    /// channel preservation (spec §8 invariant 2) without putting the tag
    /// back on the wire (`SPEC_FULL.md` §12 item 2).
    pub reply_channel: Option<Channel>,
}

/// Owns all service and worker records plus the broker-wide waiting list.
#[derive(Default)]
pub struct Registry {
    services: HashMap<Vec<u8>, ServiceRecord>,
    workers: HashMap<Vec<u8>, WorkerRecord>,
    waiting: VecDeque<Vec<u8>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn worker_exists(&self, identity: &[u8]) -> bool {
        self.workers.contains_key(identity)
    }

    pub fn worker(&self, identity: &[u8]) -> Option<&WorkerRecord> {
        self.workers.get(identity)
    }

    pub fn service(&self, name: &[u8]) -> Option<&ServiceRecord> {
        self.services.get(name)
    }

    /// Returns the mutable service record, creating it if absent (lazy
    /// creation per spec §3 — no service is ever explicitly destroyed).
    pub fn service_or_create(&mut self, name: &[u8]) -> &mut ServiceRecord {
        self.services.entry(name.to_vec()).or_default()
    }

    /// Registers a brand-new worker under `identity` and immediately marks
    /// it idle for `service`. Caller must already have checked that no
    /// worker is registered under this identity (spec §4.4 READY handling).
    pub fn register_worker(&mut self, identity: Vec<u8>, service: Vec<u8>, channel: Channel, expiry: Instant) {
        self.workers.insert(
            identity.clone(),
            WorkerRecord {
                identity: identity.clone(),
                service: service.clone(),
                channel,
                expiry,
                reply_channel: None,
            },
        );
        let record = self.services.entry(service).or_default();
        record.worker_count += 1;
        record.idle_workers.push_back(identity.clone());
        self.waiting.push_back(identity);
    }

    /// Marks an already-registered worker idle again (after a REPLY),
    /// refreshing its expiry and re-enqueueing it on both FIFOs.
    pub fn worker_waiting(&mut self, identity: &[u8], expiry: Instant) {
        let Some(worker) = self.workers.get_mut(identity) else {
            return;
        };
        worker.expiry = expiry;
        let service = worker.service.clone();
        if let Some(record) = self.services.get_mut(&service) {
            record.idle_workers.push_back(identity.to_vec());
        }
        self.waiting.push_back(identity.to_vec());
    }

    /// Extends a worker's expiry without touching its position in either
    /// FIFO (mirrors the reference broker: a HEARTBEAT refreshes the
    /// deadline in place, it does not requeue).
    pub fn extend_expiry(&mut self, identity: &[u8], expiry: Instant) -> bool {
        if let Some(worker) = self.workers.get_mut(identity) {
            worker.expiry = expiry;
            true
        } else {
            false
        }
    }

    pub fn enqueue_request(&mut self, service: &[u8], request: PendingRequest) {
        self.service_or_create(service).requests.push_back(request);
    }

    /// Removes and returns the worker record, unlinking it from its
    /// service's idle list and the broker waiting list. Two-step unlink per
    /// `SPEC_FULL.md` §12 item 1.
    pub fn delete_worker(&mut self, identity: &[u8]) -> Option<WorkerRecord> {
        let worker = self.workers.remove(identity)?;
        if let Some(record) = self.services.get_mut(&worker.service) {
            record.idle_workers.retain(|id| id != identity);
            record.worker_count = record.worker_count.saturating_sub(1);
        }
        self.waiting.retain(|id| id != identity);
        Some(worker)
    }

    /// Pops the head idle worker for `service`, removing it from both the
    /// service idle list and the broker waiting list. Used by dispatch.
    pub fn pop_idle_worker(&mut self, service: &[u8]) -> Option<Vec<u8>> {
        let identity = self.services.get_mut(service)?.idle_workers.pop_front()?;
        self.waiting.retain(|id| id != &identity);
        Some(identity)
    }

    pub fn pop_request(&mut self, service: &[u8]) -> Option<PendingRequest> {
        self.services.get_mut(service)?.requests.pop_front()
    }

    /// Records which channel a dispatched request's client is on, so the
    /// eventual REPLY can be routed back correctly.
    pub fn set_reply_channel(&mut self, identity: &[u8], channel: Channel) {
        if let Some(worker) = self.workers.get_mut(identity) {
            worker.reply_channel = Some(channel);
        }
    }

    /// Consumes the channel recorded by `set_reply_channel`.
    pub fn take_reply_channel(&mut self, identity: &[u8]) -> Option<Channel> {
        self.workers.get_mut(identity)?.reply_channel.take()
    }

    pub fn has_idle_worker(&self, service: &[u8]) -> bool {
        self.services
            .get(service)
            .map(|r| !r.idle_workers.is_empty())
            .unwrap_or(false)
    }

    pub fn has_pending_request(&self, service: &[u8]) -> bool {
        self.services
            .get(service)
            .map(|r| !r.requests.is_empty())
            .unwrap_or(false)
    }

    /// Removes every worker whose expiry has passed, stopping at the first
    /// non-expired entry (the waiting list is append-ordered by expiry, so
    /// this is O(k) in the number of expired workers). Returns the deleted
    /// identities so the caller can skip sending them a DISCONNECT.
    pub fn purge_expired(&mut self, now: Instant) -> Vec<Vec<u8>> {
        let mut expired = Vec::new();
        while let Some(identity) = self.waiting.front() {
            let Some(worker) = self.workers.get(identity) else {
                self.waiting.pop_front();
                continue;
            };
            if worker.expiry > now {
                break;
            }
            let identity = self.waiting.pop_front().unwrap();
            if let Some(worker) = self.workers.remove(&identity) {
                if let Some(record) = self.services.get_mut(&worker.service) {
                    record.idle_workers.retain(|id| id != &identity);
                    record.worker_count = record.worker_count.saturating_sub(1);
                }
                expired.push(identity);
            }
        }
        expired
    }

    /// Every currently-idle worker, for broadcasting HEARTBEAT.
    pub fn idle_worker_identities(&self) -> impl Iterator<Item = &Vec<u8>> {
        self.waiting.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn later(n: u64) -> Instant {
        Instant::now() + Duration::from_secs(n)
    }

    #[test]
    fn register_and_dispatch_roundtrip() {
        let mut reg = Registry::new();
        reg.register_worker(b"w1".to_vec(), b"echo".to_vec(), Channel::Clear, later(10));
        assert!(reg.has_idle_worker(b"echo"));
        let popped = reg.pop_idle_worker(b"echo").unwrap();
        assert_eq!(popped, b"w1");
        assert!(!reg.has_idle_worker(b"echo"));
    }

    #[test]
    fn delete_worker_decrements_count() {
        let mut reg = Registry::new();
        reg.register_worker(b"w1".to_vec(), b"echo".to_vec(), Channel::Clear, later(10));
        reg.register_worker(b"w2".to_vec(), b"echo".to_vec(), Channel::Clear, later(10));
        assert_eq!(reg.service(b"echo").unwrap().worker_count, 2);
        reg.delete_worker(b"w1");
        assert_eq!(reg.service(b"echo").unwrap().worker_count, 1);
        assert!(!reg.worker_exists(b"w1"));
    }

    #[test]
    fn purge_stops_at_first_live_worker() {
        let mut reg = Registry::new();
        reg.register_worker(b"old".to_vec(), b"echo".to_vec(), Channel::Clear, later(0));
        reg.register_worker(b"new".to_vec(), b"echo".to_vec(), Channel::Clear, later(100));
        let expired = reg.purge_expired(Instant::now() + Duration::from_millis(1));
        assert_eq!(expired, vec![b"old".to_vec()]);
        assert!(reg.worker_exists(b"new"));
    }

    #[test]
    fn heartbeat_extends_without_requeue() {
        let mut reg = Registry::new();
        reg.register_worker(b"w1".to_vec(), b"echo".to_vec(), Channel::Clear, later(0));
        reg.extend_expiry(b"w1", later(100));
        // still only one entry in the waiting list, not duplicated
        assert_eq!(reg.idle_worker_identities().count(), 1);
        assert!(reg.worker(b"w1").unwrap().expiry > Instant::now());
    }

    #[test]
    fn fifo_order_preserved_across_two_services_workers() {
        let mut reg = Registry::new();
        reg.register_worker(b"a".to_vec(), b"echo".to_vec(), Channel::Clear, later(10));
        reg.register_worker(b"b".to_vec(), b"echo".to_vec(), Channel::Clear, later(10));
        assert_eq!(reg.pop_idle_worker(b"echo").unwrap(), b"a");
        assert_eq!(reg.pop_idle_worker(b"echo").unwrap(), b"b");
    }
}
