//! Search Dispatcher
//!
//! Owns the single in-flight search slot. Scan-triggered and manual queries both
//! go through [`SearchDispatcher::submit`]; a query that arrives while another
//! is in flight waits in a one-deep pending slot, replacing any older waiting
//! query, and the in-flight answer is marked superseded. A scan query never
//! displaces a waiting manual one.

pub mod client;
pub mod models;

use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

pub use client::{HttpSearchClient, SearchService};
pub use models::{
    classify, FailureReason, Product, QueryError, QueryOrigin, SearchError, SearchOutcome,
    SearchQuery, SearchResponse,
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("no search in flight with ticket {0}")]
    UnknownTicket(u64),
}

/// A search that holds the in-flight slot and is ready to run
pub struct SearchJob {
    pub ticket: u64,
    pub query: SearchQuery,
    service: Arc<dyn SearchService>,
}

impl SearchJob {
    /// Call the service
    pub async fn run(self) -> SearchReport {
        let result = self.service.search(self.query.text()).await;
        SearchReport {
            ticket: self.ticket,
            query: self.query,
            result,
        }
    }
}

/// Raw answer of a finished [`SearchJob`]
#[derive(Debug)]
pub struct SearchReport {
    pub ticket: u64,
    pub query: SearchQuery,
    pub result: Result<SearchResponse, SearchError>,
}

impl SearchReport {
    pub fn into_outcome(self) -> (SearchQuery, SearchOutcome) {
        let outcome = classify(&self.query, self.result);
        (self.query, outcome)
    }
}

/// What happened to a submitted query
pub enum Submission {
    /// The slot was free; run the job
    Started(SearchJob),
    /// Another search is in flight; the query waits
    Queued { replaced: Option<SearchQuery> },
    /// A manual query is already waiting; the scan query is not sent
    Declined(SearchQuery),
}

/// Result of releasing the in-flight slot
pub struct Settled {
    /// A newer query arrived while this one was in flight
    pub superseded: bool,
    /// The waiting query, now holding the slot
    pub next: Option<SearchJob>,
}

pub struct SearchDispatcher {
    service: Arc<dyn SearchService>,
    in_flight: Option<u64>,
    pending: Option<SearchQuery>,
    next_ticket: u64,
}

impl SearchDispatcher {
    pub fn new(service: Arc<dyn SearchService>) -> Self {
        Self {
            service,
            in_flight: None,
            pending: None,
            next_ticket: 1,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn submit(&mut self, query: SearchQuery) -> Submission {
        if self.in_flight.is_some() {
            let manual_waiting = matches!(
                &self.pending,
                Some(pending) if pending.origin() == QueryOrigin::Manual
            );
            if manual_waiting && query.origin() == QueryOrigin::Scan {
                debug!("Manual search waiting, declining {:?}", query.text());
                return Submission::Declined(query);
            }
            debug!("Search in flight, queueing {:?}", query.text());
            let replaced = self.pending.replace(query);
            return Submission::Queued { replaced };
        }
        Submission::Started(self.start(query))
    }

    /// Release the slot held by `ticket` and promote the waiting query
    pub fn complete(&mut self, ticket: u64) -> Result<Settled, DispatchError> {
        if self.in_flight != Some(ticket) {
            return Err(DispatchError::UnknownTicket(ticket));
        }
        self.in_flight = None;

        let next = self.pending.take().map(|query| self.start(query));
        Ok(Settled {
            superseded: next.is_some(),
            next,
        })
    }

    fn start(&mut self, query: SearchQuery) -> SearchJob {
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        self.in_flight = Some(ticket);
        SearchJob {
            ticket,
            query,
            service: self.service.clone(),
        }
    }
}
