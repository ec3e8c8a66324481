use parking_lot::RwLock;
use std::collections::VecDeque;

/// Where user-facing failure messages go. A UI would show these as a toast.
pub trait Notifier: Send + Sync {
    fn notify(&self, message: String);
}

/// The last few failure messages, newest first, for a UI to show until dismissed.
pub struct RecentFailures {
    capacity: usize,
    messages: RwLock<VecDeque<String>>,
}

impl Default for RecentFailures {
    fn default() -> RecentFailures {
        RecentFailures::new(3)
    }
}

impl RecentFailures {
    pub fn new(capacity: usize) -> RecentFailures {
        RecentFailures {
            capacity: capacity.max(1),
            messages: RwLock::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn recent(&self) -> Vec<String> {
        self.messages.read().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.messages.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.read().is_empty()
    }

    /// Remove the message at `index` (0 is the newest)
    pub fn dismiss(&self, index: usize) -> Option<String> {
        self.messages.write().remove(index)
    }
}

impl Notifier for RecentFailures {
    fn notify(&self, message: String) {
        tracing::info!("STATUS: {}", message);
        let mut messages = self.messages.write();
        if messages.len() == self.capacity {
            messages.pop_back();
        }
        messages.push_front(message);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_oldest_drops_off() {
        let failures = RecentFailures::default();
        for n in ["one", "two", "three", "four"] {
            failures.notify(n.to_owned());
        }
        assert_eq!(failures.recent(), vec!["four", "three", "two"]);

        assert_eq!(failures.dismiss(1).as_deref(), Some("three"));
        assert_eq!(failures.recent(), vec!["four", "two"]);
        assert_eq!(failures.dismiss(5), None);
    }
}
