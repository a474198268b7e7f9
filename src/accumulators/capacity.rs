//! Diego cell capacity, derived as percent used per resource.
//!
//! Cells report `CapacityTotal<Resource>` and `CapacityRemaining<Resource>`
//! gauges. The latest reading of each is kept per cell, across harvests,
//! until the cell goes quiet for longer than the configured age. Every drain
//! turns each complete pair into `<resource>.used`.

use crate::accumulators::{platform_attributes, Accumulator, EntityTable};
use crate::core::{AppContext, Envelope, StreamKey, Uid};
use crate::metrics::{AttributeSet, Entity, Metric, Sample};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

const CELL_JOB: &str = "diego_cell";

/// Latest reading of one source gauge.
#[derive(Debug, Clone, PartialEq)]
struct Reading {
    name: String,
    unit: String,
    value: f64,
}

#[derive(Debug, Default, Clone)]
struct CapacityPair {
    total: Option<Reading>,
    remaining: Option<Reading>,
}

#[derive(Debug)]
struct CellState {
    attributes: AttributeSet,
    updated: Instant,
    resources: BTreeMap<String, CapacityPair>,
}

pub struct CapacityAccumulator {
    table: EntityTable,
    max_age: Duration,
    cells: Mutex<HashMap<Uid, CellState>>,
}

/// Split an identifier at lower/upper/digit/other boundaries.
///
/// An upper-case run followed by lower case gives its last letter to the next
/// word, so `HTTPServer` splits into `HTTP` and `Server`.
pub fn split_camel_case(s: &str) -> Vec<String> {
    #[derive(PartialEq, Clone, Copy)]
    enum Class {
        Lower,
        Upper,
        Digit,
        Other,
    }

    fn class_of(c: char) -> Class {
        if c.is_lowercase() {
            Class::Lower
        } else if c.is_uppercase() {
            Class::Upper
        } else if c.is_numeric() {
            Class::Digit
        } else {
            Class::Other
        }
    }

    let mut runs: Vec<Vec<char>> = Vec::new();
    let mut last = None;
    for c in s.chars() {
        let class = class_of(c);
        if last != Some(class) {
            runs.push(Vec::new());
        }
        if let Some(run) = runs.last_mut() {
            run.push(c);
        }
        last = Some(class);
    }

    for i in 0..runs.len().saturating_sub(1) {
        let upper_then_lower = runs[i].first().map_or(false, |c| c.is_uppercase())
            && runs[i + 1].first().map_or(false, |c| c.is_lowercase());
        if upper_then_lower {
            if let Some(c) = runs[i].pop() {
                runs[i + 1].insert(0, c);
            }
        }
    }

    runs.into_iter()
        .filter(|run| !run.is_empty())
        .map(|run| run.into_iter().collect())
        .collect()
}

/// Whether a gauge field name is a capacity reading this accumulator tracks.
pub fn is_capacity_metric(name: &str) -> bool {
    let lower = name.to_lowercase();
    lower.contains("capacity") && !lower.contains("allocated")
}

impl CapacityAccumulator {
    pub fn new(ctx: Arc<AppContext>) -> Self {
        let max_age = ctx.config.capacity_entity_age();
        Self {
            table: EntityTable::new(ctx),
            max_age,
            cells: Mutex::new(HashMap::new()),
        }
    }

    /// Number of cells currently tracked.
    pub fn cell_count(&self) -> usize {
        self.cells.lock().len()
    }

    pub(crate) fn update_at(&self, envelope: &Envelope, now: Instant) {
        if !envelope.tag("job").contains(CELL_JOB) {
            return;
        }
        let Some(gauge) = envelope.gauge() else {
            return;
        };

        let attributes = platform_attributes(envelope, self.table.config());
        let id = attributes.signature().clone();
        let mut cells = self.cells.lock();

        for (name, reading) in &gauge.metrics {
            if !is_capacity_metric(name) {
                continue;
            }
            let words = split_camel_case(name);
            let [.., bucket, keyword] = words.as_slice() else {
                tracing::debug!("Capacity metric {} has no resource keyword", name);
                continue;
            };

            let cell = cells.entry(id.clone()).or_insert_with(|| CellState {
                attributes: attributes.clone(),
                updated: now,
                resources: BTreeMap::new(),
            });
            let pair = cell.resources.entry(keyword.clone()).or_default();
            let latest = Reading {
                name: name.clone(),
                unit: reading.unit.clone(),
                value: reading.value,
            };
            match bucket.as_str() {
                "Total" => pair.total = Some(latest),
                "Remaining" => pair.remaining = Some(latest),
                _ => {},
            }
            cell.updated = now;
        }
    }

    /// Evict stale cells, then derive usage for every complete pair.
    pub(crate) fn drain_at(&self, now: Instant) -> Vec<Arc<Entity>> {
        let snapshot: Vec<(AttributeSet, BTreeMap<String, CapacityPair>)> = {
            let mut cells = self.cells.lock();
            cells.retain(|id, cell| {
                let fresh = now.saturating_duration_since(cell.updated) < self.max_age;
                if !fresh {
                    tracing::debug!("Removing capacity data for {}, no update in {:?}", id, self.max_age);
                }
                fresh
            });
            cells
                .values()
                .map(|cell| (cell.attributes.clone(), cell.resources.clone()))
                .collect()
        };

        snapshot
            .into_iter()
            .map(|(attributes, resources)| {
                let entity = Entity::new(attributes);
                for (keyword, pair) in resources {
                    let (Some(total), Some(remaining)) = (pair.total, pair.remaining) else {
                        tracing::debug!("Capacity metrics do not match for {} ({})", entity.signature(), keyword);
                        continue;
                    };
                    if total.value == 0.0 {
                        tracing::debug!("Zero capacity total for {} ({})", entity.signature(), keyword);
                        continue;
                    }
                    let used = 100.0 - (remaining.value / total.value * 100.0);
                    entity.record(
                        Sample::gauge(format!("{}.used", keyword.to_lowercase()), "percent", used)
                            .with_attribute("metric.source.unit", total.unit)
                            .with_attribute("metric.source.remaining", remaining.name)
                            .with_attribute("metric.source.remaining.value", remaining.value)
                            .with_attribute("metric.source.total", total.name)
                            .with_attribute("metric.source.total.value", total.value),
                    );
                }
                Arc::new(entity)
            })
            .collect()
    }
}

impl Accumulator for CapacityAccumulator {
    fn name(&self) -> &'static str {
        "capacity"
    }

    fn streams(&self) -> &'static [StreamKey] {
        &[StreamKey::ValueMetric]
    }

    fn update(&self, envelope: &Envelope) {
        self.update_at(envelope, Instant::now());
    }

    fn harvest_metric(&self, entity: &Entity, metric: Metric) {
        let event = self.table.finish(entity, metric, &self.table.config().event_types.capacity);
        self.table.export(None, event);
    }

    fn drain(&self) -> Vec<Arc<Entity>> {
        self.drain_at(Instant::now())
    }
}
