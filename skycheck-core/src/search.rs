//! Observable search state bridging user input and the weather client.
//!
//! The controller owns a single [`SearchState`] behind a `tokio::sync::watch`
//! sender. Presentation code subscribes to it and re-renders on change; every
//! mutation goes through the sender, so observers see updates in order no
//! matter which task the network call completed on.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use serde::{Deserialize, Serialize};
use tokio::{sync::watch, task::JoinHandle};
use tracing::{debug, info, warn};

use crate::{
    client::WeatherClient,
    error::{WeatherError, WeatherErrorKind},
    model::{WeatherQuery, WeatherRecord},
};

/// What to do when an older search completes after a newer one was started.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RacePolicy {
    /// Only the most recently triggered search may update the state; older
    /// completions are discarded.
    #[default]
    LatestRequest,
    /// Every completion is applied; whichever arrives last wins.
    LastCompletion,
}

/// Diagnostic summary of the most recent failed search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchFailure {
    pub kind: WeatherErrorKind,
    pub message: String,
}

impl From<&WeatherError> for SearchFailure {
    fn from(err: &WeatherError) -> Self {
        Self { kind: err.kind(), message: err.to_string() }
    }
}

/// State observed by the presentation layer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchState {
    pub query: String,
    pub is_loading: bool,
    pub weather: Option<WeatherRecord>,
    pub last_error: Option<SearchFailure>,
}

#[derive(Debug)]
struct Shared {
    state: watch::Sender<SearchState>,
    /// Generation of the most recently triggered search.
    generation: AtomicU64,
    policy: RacePolicy,
}

impl Shared {
    /// Apply the outcome of search `generation`. Returns whether the state changed.
    fn complete(&self, generation: u64, outcome: Result<WeatherRecord, WeatherError>) -> bool {
        self.state.send_if_modified(|state| {
            let latest = self.generation.load(Ordering::SeqCst);
            if self.policy == RacePolicy::LatestRequest && generation != latest {
                debug!(generation, latest, "Discarding superseded search result");
                return false;
            }

            state.is_loading = false;
            match outcome {
                Ok(record) => {
                    info!(
                        city = %record.city_name,
                        temp_c = record.temperature_c,
                        "Weather updated"
                    );
                    state.weather = Some(record);
                    state.last_error = None;
                }
                Err(err) => {
                    warn!(error = %err, kind = ?err.kind(), "Weather lookup failed");
                    state.last_error = Some(SearchFailure::from(&err));
                    state.weather = None;
                }
            }
            true
        })
    }
}

/// Completes its search as [`WeatherError::Interrupted`] if dropped before
/// [`finish`](Self::finish), so `is_loading` is cleared even when the lookup
/// panics or its task is torn down.
struct PendingSearch {
    shared: Arc<Shared>,
    generation: u64,
    finished: bool,
}

impl PendingSearch {
    fn finish(mut self, outcome: Result<WeatherRecord, WeatherError>) {
        self.finished = true;
        self.shared.complete(self.generation, outcome);
    }
}

impl Drop for PendingSearch {
    fn drop(&mut self) {
        if !self.finished {
            self.shared.complete(self.generation, Err(WeatherError::Interrupted));
        }
    }
}

/// Mediates between search actions and a [`WeatherClient`].
#[derive(Clone)]
pub struct WeatherSearchController {
    client: Arc<dyn WeatherClient>,
    shared: Arc<Shared>,
}

impl std::fmt::Debug for WeatherSearchController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeatherSearchController")
            .field("shared", &self.shared)
            .finish_non_exhaustive()
    }
}

impl WeatherSearchController {
    pub fn new(client: Arc<dyn WeatherClient>) -> Self {
        Self::with_policy(client, RacePolicy::default())
    }

    pub fn with_policy(client: Arc<dyn WeatherClient>, policy: RacePolicy) -> Self {
        let (state, _) = watch::channel(SearchState::default());
        let shared = Shared { state, generation: AtomicU64::new(0), policy };

        Self { client, shared: Arc::new(shared) }
    }

    pub fn policy(&self) -> RacePolicy {
        self.shared.policy
    }

    /// Receiver that is notified on every state change.
    pub fn subscribe(&self) -> watch::Receiver<SearchState> {
        self.shared.state.subscribe()
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> SearchState {
        self.shared.state.borrow().clone()
    }

    pub fn set_query(&self, query: impl Into<String>) {
        let query = query.into();
        self.shared.state.send_if_modified(|state| {
            if state.query == query {
                return false;
            }
            state.query = query;
            true
        });
    }

    /// Start a lookup for the current query.
    ///
    /// Returns `None` without touching the state when the query is blank.
    /// Otherwise `is_loading` is already set when this returns, and the lookup
    /// runs on a spawned task whose handle is returned; dropping the handle
    /// does not cancel it. Must be called from within a Tokio runtime.
    pub fn trigger_search(&self) -> Option<JoinHandle<()>> {
        let mut started = None;

        self.shared.state.send_if_modified(|state| {
            let Some(query) = WeatherQuery::new(&state.query) else {
                return false;
            };
            let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
            state.is_loading = true;
            state.last_error = None;
            started = Some((query, generation));
            true
        });

        let Some((query, generation)) = started else {
            debug!("Ignoring search with blank query");
            return None;
        };

        debug!(city = %query, generation, "Starting weather search");

        let client = Arc::clone(&self.client);
        let pending =
            PendingSearch { shared: Arc::clone(&self.shared), generation, finished: false };
        Some(tokio::spawn(async move {
            let outcome = client.fetch_weather(&query).await;
            pending.finish(outcome);
        }))
    }

    /// Set the query and start a lookup for it.
    pub fn search(&self, query: impl Into<String>) -> Option<JoinHandle<()>> {
        self.set_query(query);
        self.trigger_search()
    }
}
