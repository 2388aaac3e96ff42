// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Visitor journey tracking attached to every send as an opaque payload.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use arc_swap::ArcSwapOption;
use chrono::{DateTime, Utc};
use serde::Serialize;

use parley_core::types::PageContext;

/// Maximum number of page visits kept in the journey.
pub const MAX_JOURNEY: usize = 50;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageVisit {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct AnalyticsTracker {
    current: ArcSwapOption<PageContext>,
    journey: Mutex<VecDeque<PageVisit>>,
    referrer: Mutex<Option<String>>,
}

impl AnalyticsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a page view. Returns `false` when the page is unchanged.
    pub fn record_page(&self, page: &PageContext) -> bool {
        if self
            .current
            .load()
            .as_deref()
            .is_some_and(|current| current.url == page.url)
        {
            return false;
        }

        {
            let mut referrer = self.referrer.lock().unwrap_or_else(PoisonError::into_inner);
            if referrer.is_none() {
                referrer.clone_from(&page.referrer);
            }
        }

        let mut journey = self.journey.lock().unwrap_or_else(PoisonError::into_inner);
        if journey.len() == MAX_JOURNEY {
            journey.pop_front();
        }
        journey.push_back(PageVisit {
            url: page.url.clone(),
            title: page.title.clone(),
            at: Utc::now(),
        });
        self.current.store(Some(Arc::new(page.clone())));
        true
    }

    pub fn current_page(&self) -> Option<PageContext> {
        self.current.load_full().map(|page| (*page).clone())
    }

    pub fn journey(&self) -> Vec<PageVisit> {
        self.journey
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    /// The JSON payload forwarded with each send.
    pub fn payload(&self) -> serde_json::Value {
        let referrer = self
            .referrer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        serde_json::json!({
            "current_page": self.current_page().map(|p| p.url),
            "referrer": referrer,
            "journey": self.journey(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(url: &str) -> PageContext {
        PageContext {
            url: url.into(),
            title: None,
            referrer: Some("https://search.example".into()),
        }
    }

    #[test]
    fn repeated_page_is_not_recorded() {
        let tracker = AnalyticsTracker::new();
        assert!(tracker.record_page(&page("/pricing")));
        assert!(!tracker.record_page(&page("/pricing")));
        assert!(tracker.record_page(&page("/contact")));
        assert_eq!(tracker.journey().len(), 2);
    }

    #[test]
    fn journey_is_bounded() {
        let tracker = AnalyticsTracker::new();
        for i in 0..(MAX_JOURNEY + 5) {
            tracker.record_page(&page(&format!("/p{i}")));
        }
        let journey = tracker.journey();
        assert_eq!(journey.len(), MAX_JOURNEY);
        assert_eq!(journey[0].url, "/p5");
    }

    #[test]
    fn payload_carries_first_referrer() {
        let tracker = AnalyticsTracker::new();
        tracker.record_page(&page("/"));
        tracker.record_page(&PageContext {
            url: "/blog".into(),
            title: Some("Blog".into()),
            referrer: Some("https://other.example".into()),
        });

        let payload = tracker.payload();
        assert_eq!(payload["current_page"], "/blog");
        assert_eq!(payload["referrer"], "https://search.example");
        assert_eq!(payload["journey"].as_array().unwrap().len(), 2);
    }
}
