//! Capturing `Notifier` fake

use async_trait::async_trait;
use refinery::error::{Error, Result};
use refinery::notify::Notifier;
use std::collections::HashSet;
use std::sync::Mutex;

/// Records every notification instead of sending it
#[derive(Default)]
pub struct MockNotifier {
    sent: Mutex<Vec<(String, String)>>,
    fail_for: Mutex<HashSet<String>>,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make sends to the given recipient fail.
    pub fn fail_for(&self, to: &str) {
        self.fail_for.lock().unwrap().insert(to.to_string());
    }

    /// (recipient, subject) pairs in send order.
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn recipients(&self) -> Vec<String> {
        self.sent().into_iter().map(|(to, _)| to).collect()
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    async fn send(&self, to: &str, subject: &str, _body: &str) -> Result<()> {
        if self.fail_for.lock().unwrap().contains(to) {
            return Err(Error::store("notify", format!("undeliverable: {to}")));
        }
        self.sent
            .lock()
            .unwrap()
            .push((to.to_string(), subject.to_string()));
        Ok(())
    }
}
