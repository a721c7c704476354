//! Debounced drug search.
//!
//! Turns a stream of query edits into at most one lookup per burst. Each edit
//! bumps a generation counter held inside the published view; a lookup only
//! lands if its generation is still current when it returns, checked and
//! applied in one `send_if_modified` so nothing can slip in between.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::{MIN_QUERY_CHARS, SEARCH_DEBOUNCE_MS};
use crate::models::Medication;
use crate::selection::MedicationSink;
use crate::service::DrugSearch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchConfig {
    /// Quiet period after the last edit before a lookup is issued.
    pub debounce: Duration,
    /// Shorter (trimmed) queries clear the results without a lookup.
    pub min_query_chars: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(SEARCH_DEBOUNCE_MS),
            min_query_chars: MIN_QUERY_CHARS,
        }
    }
}

/// What the search box shows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchView {
    pub query: String,
    pub results: Vec<Medication>,
    /// A lookup for the current query is in flight.
    pub loading: bool,
    generation: u64,
}

pub struct QueryController {
    provider: Arc<dyn DrugSearch>,
    config: SearchConfig,
    view: Arc<watch::Sender<SearchView>>,
    pending: Option<JoinHandle<()>>,
}

impl QueryController {
    pub fn new(provider: Arc<dyn DrugSearch>) -> Self {
        Self::with_config(provider, SearchConfig::default())
    }

    pub fn with_config(provider: Arc<dyn DrugSearch>, config: SearchConfig) -> Self {
        let (view, _) = watch::channel(SearchView::default());
        Self {
            provider,
            config,
            view: Arc::new(view),
            pending: None,
        }
    }

    /// Receiver notified whenever the view changes.
    pub fn subscribe(&self) -> watch::Receiver<SearchView> {
        self.view.subscribe()
    }

    pub fn view(&self) -> SearchView {
        self.view.borrow().clone()
    }

    /// Feed one edit of the query text. Must be called inside a tokio runtime.
    pub fn on_input(&mut self, query: &str) {
        self.cancel_pending();
        let generation = self.next_generation(|v| v.query = query.to_string());

        let trimmed = query.trim();
        if trimmed.chars().count() < self.config.min_query_chars {
            self.view.send_modify(|v| {
                v.results.clear();
                v.loading = false;
            });
            return;
        }

        let provider = Arc::clone(&self.provider);
        let view = Arc::clone(&self.view);
        let debounce = self.config.debounce;
        let query = trimmed.to_string();

        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(debounce).await;

            let current = view.send_if_modified(|v| {
                if v.generation != generation {
                    return false;
                }
                v.loading = true;
                true
            });
            if !current {
                return;
            }

            tracing::debug!(generation, "Issuing drug search");
            let results = match provider.search(&query).await {
                Ok(results) => results,
                Err(e) => {
                    tracing::warn!(error = %e, kind = ?e.kind(), "Drug search failed, showing no results");
                    Vec::new()
                }
            };

            if !apply_results(&view, generation, results) {
                tracing::debug!(generation, "Discarding superseded search result");
            }
        }));
    }

    /// Pick a candidate: clears the search and forwards it to `sink`.
    /// Returns whether the sink accepted it.
    pub fn select<S>(&mut self, candidate: Medication, sink: &mut S) -> bool
    where
        S: MedicationSink + ?Sized,
    {
        self.cancel_pending();
        self.next_generation(|v| {
            v.query.clear();
            v.results.clear();
            v.loading = false;
        });
        sink.add_medication(candidate)
    }

    /// Stop any pending lookup; a result still in flight is dropped.
    pub fn deactivate(&mut self) {
        self.cancel_pending();
        self.next_generation(|v| v.loading = false);
    }

    fn next_generation(&self, edit: impl FnOnce(&mut SearchView)) -> u64 {
        let mut generation = 0;
        self.view.send_modify(|v| {
            v.generation += 1;
            generation = v.generation;
            edit(v);
        });
        generation
    }

    fn cancel_pending(&mut self) {
        if let Some(handle) = self.pending.take() {
            if !handle.is_finished() {
                tracing::debug!("Superseding pending search");
            }
            handle.abort();
        }
    }
}

impl Drop for QueryController {
    fn drop(&mut self) {
        self.cancel_pending();
    }
}

/// Publish `results` if `generation` is still the latest edit.
fn apply_results(view: &watch::Sender<SearchView>, generation: u64, results: Vec<Medication>) -> bool {
    view.send_if_modified(|v| {
        if v.generation != generation {
            return false;
        }
        v.results = results;
        v.loading = false;
        true
    })
}
