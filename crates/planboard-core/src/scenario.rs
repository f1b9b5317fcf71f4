//! Scripted drags for the `planboard` CLI: a task set, a zone layout and a
//! sequence of pointer events, replayed against an in-memory store.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::backend::{MemoryBackend, MutationRecord};
use crate::config::Settings;
use crate::preview::{DragOrigin, PreviewLog, RecordingSink};
use crate::schedule::Commit;
use crate::session::DragEngine;
use crate::task::{Task, TaskList};
use crate::zone::{DropZone, ZoneRegistry};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ZoneSpec {
    /// Handle other zones use to nest inside this one.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(flatten)]
    pub zone: DropZone,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PointerEvent {
    #[serde(rename_all = "camelCase")]
    Start {
        task_id: String,
        #[serde(default)]
        origin: DragOrigin,
        x: f64,
        y: f64,
    },
    Move {
        x: f64,
        y: f64,
    },
    End {
        x: f64,
        y: f64,
    },
    Cancel,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub lists: Vec<TaskList>,
    #[serde(default)]
    pub zones: Vec<ZoneSpec>,
    #[serde(default)]
    pub events: Vec<PointerEvent>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReplayReport {
    pub commits: Vec<Commit>,
    pub mutations: Vec<MutationRecord>,
    pub previews: PreviewLog,
    pub tasks: Vec<Task>,
}

impl Scenario {
    #[tracing::instrument(skip(path), fields(path = %path.display()))]
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
        let scenario: Self =
            serde_json::from_str(&text).with_context(|| format!("invalid scenario json in {}", path.display()))?;
        debug!(
            tasks = scenario.tasks.len(),
            zones = scenario.zones.len(),
            events = scenario.events.len(),
            "loaded scenario"
        );
        Ok(scenario)
    }

    /// Builds the zone registry, resolving `parent` names to nesting.
    /// Parents must be listed before their children.
    pub fn registry(&self) -> anyhow::Result<ZoneRegistry> {
        let mut registry = ZoneRegistry::new();
        let mut named = HashMap::new();
        for (idx, spec) in self.zones.iter().enumerate() {
            let id = match &spec.parent {
                None => registry.register(spec.zone.clone()),
                Some(parent) => {
                    let parent_id = named
                        .get(parent.as_str())
                        .copied()
                        .ok_or_else(|| anyhow!("zone #{idx} nests in unknown or later zone '{parent}'"))?;
                    registry
                        .register_within(parent_id, spec.zone.clone())
                        .ok_or_else(|| anyhow!("zone #{idx} parent '{parent}' vanished from registry"))?
                }
            };
            if let Some(name) = &spec.name
                && named.insert(name.as_str(), id).is_some()
            {
                return Err(anyhow!("duplicate zone name '{name}'"));
            }
        }
        Ok(registry)
    }

    #[tracing::instrument(skip_all)]
    pub fn replay(&self, settings: Settings) -> anyhow::Result<ReplayReport> {
        let registry = self.registry()?;
        let backend = MemoryBackend::new(self.tasks.clone(), self.lists.clone());
        let mut engine = DragEngine::new(registry, backend, settings);
        let (sink, log) = RecordingSink::new();
        engine.subscribe(Box::new(sink));

        let mut commits = Vec::new();
        for (idx, event) in self.events.iter().enumerate() {
            debug!(idx, ?event, "replaying pointer event");
            match event {
                PointerEvent::Start { task_id, origin, x, y } => {
                    let task = engine
                        .backend()
                        .task(task_id)
                        .cloned()
                        .ok_or_else(|| anyhow!("event #{idx} starts a drag of unknown task '{task_id}'"))?;
                    engine.start(task, *origin, *x, *y);
                }
                PointerEvent::Move { x, y } => engine.move_to(*x, *y),
                PointerEvent::End { x, y } => commits.extend(engine.end(*x, *y)),
                PointerEvent::Cancel => engine.cancel(),
            }
        }

        if engine.is_active() {
            info!("scenario ended mid-drag; cancelling");
            engine.cancel();
        }

        let previews = log.borrow().clone();
        let (_, backend) = engine.into_parts();
        Ok(ReplayReport {
            commits,
            mutations: backend.mutations().to_vec(),
            previews,
            tasks: backend.tasks().cloned().collect(),
        })
    }
}
