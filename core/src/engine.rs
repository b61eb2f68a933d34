//! Punch counting and stage/lap derivation.
//!
//! The engine turns batches of raw log lines into per-card punch counts. A
//! punch counts when its control code equals the configured filter code. The
//! count maps to a stage and a lap given the stage divisor:
//!
//! ```text
//! lap   = (count - 1) % divisor + 1
//! stage = (count - 1) / divisor + 1
//! ```
//!
//! Replay and incremental ingestion share [`CounterEngine::ingest`]. A replay
//! clears every record first, so feeding the full history with
//! `is_replay = true` rebuilds the same state as feeding it piecewise.

use std::collections::BTreeSet;

use hashbrown::HashMap;

use crate::config::{ConfigError, EngineConfig};
use crate::punch::parse_line;
use crate::registry::Registry;

/// Punch count and its derived stage/lap.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterRecord {
    pub punch_count: u32,
    pub stage: u32,
    pub lap: u32,
}

impl CounterRecord {
    pub fn from_count(punch_count: u32, divisor: u32) -> Self {
        if punch_count == 0 || divisor == 0 {
            return Self {
                punch_count,
                stage: 0,
                lap: 0,
            };
        }
        Self {
            punch_count,
            stage: (punch_count - 1) / divisor + 1,
            lap: (punch_count - 1) % divisor + 1,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct CardState {
    record: CounterRecord,
    last_punch: Option<String>,
}

/// One card as shown to the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardRow {
    pub card_id: String,
    pub name: String,
    pub stage: u32,
    pub lap: u32,
    /// Timestamp of the most recent counted punch.
    pub last_punch: Option<String>,
}

/// Full view of every card plus the ids whose tuple changed since the
/// previous snapshot. Owns its data.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub rows: Vec<CardRow>,
    pub changed: BTreeSet<String>,
}

impl Snapshot {
    pub fn get(&self, card_id: &str) -> Option<&CardRow> {
        self.rows.iter().find(|row| row.card_id == card_id)
    }

    /// `(name, stage, lap)` for a card.
    pub fn tuple(&self, card_id: &str) -> Option<(&str, u32, u32)> {
        self.get(card_id)
            .map(|row| (row.name.as_str(), row.stage, row.lap))
    }

    pub fn is_changed(&self, card_id: &str) -> bool {
        self.changed.contains(card_id)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

pub struct CounterEngine {
    config: EngineConfig,
    registry: Registry,
    cards: HashMap<String, CardState>,
    /// Tuples of the last emitted snapshot, for change detection.
    emitted: HashMap<String, (String, u32, u32)>,
}

impl CounterEngine {
    pub fn new(config: EngineConfig, registry: Registry) -> Self {
        Self {
            config,
            registry,
            cards: HashMap::new(),
            emitted: HashMap::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record(&self, card_id: &str) -> Option<CounterRecord> {
        self.cards.get(card_id).map(|c| c.record)
    }

    /// Swap in a freshly loaded registry. Counts are left alone; call
    /// [`reset`](Self::reset) afterwards for a fresh directory.
    pub fn set_registry(&mut self, registry: Registry) {
        self.registry = registry;
    }

    /// Count the punches in `lines`, in order.
    ///
    /// With `is_replay` every record is cleared first.
    pub fn ingest<'a, I>(&mut self, lines: I, is_replay: bool) -> Snapshot
    where
        I: IntoIterator<Item = &'a str>,
    {
        if is_replay {
            self.cards.clear();
        }

        let divisor = self.config.stage_divisor();
        let mut counted = 0usize;

        for line in lines {
            let Some(event) = parse_line(line) else {
                continue;
            };
            if event.control_code != self.config.filter_code() {
                continue;
            }
            if event.card_id.is_empty() {
                tracing::debug!(line = event.raw, "Skipping punch without card id");
                continue;
            }

            if !self.registry.contains(event.card_id) {
                let name = format!("Unknown {}", event.card_id);
                if let Err(e) = self.registry.register(event.card_id, &name) {
                    tracing::warn!("Card {} kept in memory only: {}", event.card_id, e);
                }
            }

            let card = self.cards.entry(event.card_id.to_string()).or_default();
            card.record = CounterRecord::from_count(card.record.punch_count + 1, divisor);
            card.last_punch = Some(event.timestamp.to_string());
            counted += 1;
        }

        if counted > 0 || is_replay {
            tracing::debug!(counted, is_replay, "Ingested punch batch");
        }

        self.emit()
    }

    /// Replace the filter code and replay `history`.
    ///
    /// On error nothing changes.
    pub fn set_filter_code<'a, I>(&mut self, code: &str, history: I) -> Result<Snapshot, ConfigError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        self.config.set_filter_code(code)?;
        tracing::info!(filter_code = self.config.filter_code(), "Filter code changed");
        Ok(self.ingest(history, true))
    }

    /// Replace the stage divisor and replay `history`.
    ///
    /// Divisors below 1 are rejected and the previous one is kept.
    pub fn set_stage_divisor<'a, I>(&mut self, n: i64, history: I) -> Result<Snapshot, ConfigError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        self.config.set_stage_divisor(n)?;
        tracing::info!(stage_divisor = n, "Stage divisor changed");
        Ok(self.ingest(history, true))
    }

    /// Clear all counts, keeping the configuration. Every registered card
    /// shows as `(name, 0, 0)`.
    pub fn reset(&mut self) -> Snapshot {
        self.cards.clear();
        self.emit()
    }

    /// Current state without consuming the change-set.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            rows: self.rows(),
            changed: BTreeSet::new(),
        }
    }

    fn rows(&self) -> Vec<CardRow> {
        self.registry
            .ids()
            .map(|id| {
                let card = self.cards.get(id);
                let record = card.map(|c| c.record).unwrap_or_default();
                CardRow {
                    card_id: id.to_string(),
                    name: self.registry.name(id).unwrap_or(id).to_string(),
                    stage: record.stage,
                    lap: record.lap,
                    last_punch: card.and_then(|c| c.last_punch.clone()),
                }
            })
            .collect()
    }

    fn emit(&mut self) -> Snapshot {
        let rows = self.rows();
        let mut changed = BTreeSet::new();
        let mut emitted = HashMap::with_capacity(rows.len());

        for row in &rows {
            let tuple = (row.name.clone(), row.stage, row.lap);
            if self.emitted.get(&row.card_id) != Some(&tuple) {
                changed.insert(row.card_id.clone());
            }
            emitted.insert(row.card_id.clone(), tuple);
        }

        self.emitted = emitted;
        Snapshot { rows, changed }
    }
}
