use crate::paths::normalize_url;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;
use url::Url;

/// One per URL ever admitted. Never removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisitRecord {
    pub url: String,
    pub depth: usize,
    pub visited_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontierEntry {
    pub url: Url,
    pub depth: usize,
}

#[derive(Default)]
struct FrontierState {
    visited: HashMap<String, VisitRecord>,
    queue: VecDeque<FrontierEntry>,
    in_flight: usize,
    closed: bool,
}

/// Work queue plus dedup index.
///
/// Every mutation happens under one lock that is never held across an await, so
/// check-and-insert on the visited set is atomic and a URL is handed out at most once.
#[derive(Default)]
pub struct Frontier {
    state: Mutex<FrontierState>,
    notify: Notify,
}

impl Frontier {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, FrontierState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records `url` and queues it for a worker. Returns false if it was already recorded or the
    /// frontier is closed.
    pub fn enqueue(&self, url: &Url, depth: usize) -> bool {
        let url = normalize_url(url);
        {
            let mut state = self.lock();
            if state.closed || !Self::record(&mut state, &url, depth) {
                return false;
            }
            state.queue.push_back(FrontierEntry { url, depth });
        }
        self.notify.notify_waiters();
        true
    }

    /// Records `url` as visited without queueing it, for resources fetched inline by the caller.
    /// Returns false if it was already recorded.
    pub fn claim(&self, url: &Url, depth: usize) -> bool {
        let url = normalize_url(url);
        let mut state = self.lock();
        !state.closed && Self::record(&mut state, &url, depth)
    }

    fn record(state: &mut FrontierState, url: &Url, depth: usize) -> bool {
        let key = url.to_string();
        if state.visited.contains_key(&key) {
            return false;
        }
        state.visited.insert(
            key.clone(),
            VisitRecord {
                url: key,
                depth,
                visited_at: Utc::now(),
            },
        );
        true
    }

    /// Next unit of work. Parks while other workers still have fetches in flight, since those
    /// may discover more. `None` means the crawl is finished or stopped.
    pub async fn next(&self) -> Option<FrontierEntry> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.lock();
                if state.closed {
                    return None;
                }
                if let Some(entry) = state.queue.pop_front() {
                    state.in_flight += 1;
                    return Some(entry);
                }
                if state.in_flight == 0 {
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Marks one entry handed out by `next` as done.
    pub fn complete(&self) {
        let finished = {
            let mut state = self.lock();
            state.in_flight = state.in_flight.saturating_sub(1);
            state.in_flight == 0 && state.queue.is_empty()
        };
        if finished {
            self.notify.notify_waiters();
        }
    }

    /// Stops handing out work. Queued entries stay recorded but are never fetched.
    pub fn close(&self) {
        self.lock().closed = true;
        self.notify.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn is_seen(&self, url: &Url) -> bool {
        self.lock().visited.contains_key(normalize_url(url).as_str())
    }

    pub fn visited_count(&self) -> usize {
        self.lock().visited.len()
    }

    pub fn pending_count(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn in_flight_count(&self) -> usize {
        self.lock().in_flight
    }

    /// Visit records sorted by time of admission.
    pub fn records(&self) -> Vec<VisitRecord> {
        let mut records: Vec<VisitRecord> = self.lock().visited.values().cloned().collect();
        records.sort_by(|a, b| a.visited_at.cmp(&b.visited_at).then(a.url.cmp(&b.url)));
        records
    }
}
