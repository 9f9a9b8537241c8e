//! Progress and diagnostic events emitted by the normalizer
//!
//! A sink is handed to the normalizer at construction. [`TracingSink`] is
//! what the CLI uses; [`MemorySink`] collects events for inspection.

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error_log::ErrorKind;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum NormalizeEvent {
    Started { table: String },
    /// A batch of rows was consumed from `table`
    BatchIngested {
        table: String,
        processed: usize,
        quarantined: usize,
    },
    PathsCalculated { count: usize },
    ExtensionStarted { table: String, kind: ExtensionKind },
    ErrorRecorded { kind: ErrorKind, taxon: Option<String> },
    Finished { taxa: usize, errors: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtensionKind {
    Synonyms,
    VernacularNames,
}

pub trait EventSink {
    fn record(&mut self, event: NormalizeEvent);
}

impl<S: EventSink + ?Sized> EventSink for &mut S {
    fn record(&mut self, event: NormalizeEvent) {
        (**self).record(event);
    }
}

impl<S: EventSink + ?Sized> EventSink for Box<S> {
    fn record(&mut self, event: NormalizeEvent) {
        (**self).record(event);
    }
}

/// Forwards events to `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn record(&mut self, event: NormalizeEvent) {
        match event {
            NormalizeEvent::Started { table } => {
                info!(table = %table, "Started normalization of the classification");
            },
            NormalizeEvent::BatchIngested {
                table,
                processed,
                quarantined,
            } => {
                debug!(table = %table, processed, quarantined, "Ingested {} records from {}", processed, table);
            },
            NormalizeEvent::PathsCalculated { count } => {
                info!(count, "Calculated {} paths", count);
            },
            NormalizeEvent::ExtensionStarted { table, kind } => {
                info!(table = %table, kind = ?kind, "Ingesting data from extension");
            },
            NormalizeEvent::ErrorRecorded { kind, taxon } => {
                warn!(kind = %kind, taxon = ?taxon, "Recorded classification error");
            },
            NormalizeEvent::Finished { taxa, errors } => {
                info!(taxa, errors, "Finished normalization");
            },
        }
    }
}

/// Keeps every event in memory
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    pub events: Vec<NormalizeEvent>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count<F>(&self, predicate: F) -> usize
    where
        F: Fn(&NormalizeEvent) -> bool,
    {
        self.events.iter().filter(|e| predicate(e)).count()
    }
}

impl EventSink for MemorySink {
    fn record(&mut self, event: NormalizeEvent) {
        self.events.push(event);
    }
}
