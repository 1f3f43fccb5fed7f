//! Rusqlite-backed storage for trace events and trace meta rows (spec.md
//! §4.3). `events` is append-only and indexed by trace id; `meta` holds one
//! row per trace (status, timestamp, name, isRoot, inputPreview). Events
//! whose serialized size exceeds 1 MB are dropped and counted rather than
//! written.

use super::{NodeType, Status, TraceEvent, TraceNode};
use crate::error::TraceError;
use crate::stats::StatsStore;
use chrono::Utc;
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};

const MAX_EVENT_BYTES: usize = 1_000_000;
const MAX_ROOT_TRACES: usize = 100;
const INPUT_PREVIEW_BYTES: usize = 500;

/// Interval between background retention sweeps (spec.md §4.3: retention is
/// an ongoing invariant, not a startup-only check).
const RETENTION_SWEEP_INTERVAL: std::time::Duration = std::time::Duration::from_secs(300);

pub struct TraceStore {
    conn: Mutex<Connection>,
    stats: Option<Arc<Mutex<StatsStore>>>,
}

impl TraceStore {
    pub fn open(path: impl AsRef<Path>, stats: Option<Arc<Mutex<StatsStore>>>) -> Result<Self, TraceError> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn, stats)
    }

    pub fn in_memory() -> Result<Self, TraceError> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn, None)
    }

    fn from_connection(conn: Connection, stats: Option<Arc<Mutex<StatsStore>>>) -> Result<Self, TraceError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS events (
                id TEXT PRIMARY KEY,
                trace_id TEXT NOT NULL,
                seq INTEGER NOT NULL,
                payload TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_events_trace_id ON events(trace_id);
            CREATE TABLE IF NOT EXISTS meta (
                trace_id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                status TEXT NOT NULL,
                start_time_ms INTEGER NOT NULL,
                is_root INTEGER NOT NULL,
                input_preview TEXT
            );",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
            stats,
        })
    }

    /// Write (or overwrite, by event id) one trace event. `is_root` marks
    /// whether this event's own id equals its trace id (a root action node);
    /// child-action root nodes register as new meta rows at their own
    /// composite trace id.
    pub fn write_event(&self, event: &TraceEvent) -> Result<(), TraceError> {
        let payload = serde_json::to_string(event)?;
        if payload.len() > MAX_EVENT_BYTES {
            if let Some(stats) = &self.stats {
                stats
                    .lock()
                    .expect("stats mutex poisoned")
                    .record(event.name.clone(), "oversized_events", 1, Utc::now());
            }
            tracing::warn!(
                trace_id = %event.trace_id,
                event_id = %event.id,
                size = payload.len(),
                "dropping oversized trace event"
            );
            return Ok(());
        }

        let conn = self.conn.lock().expect("trace connection mutex poisoned");
        conn.execute(
            "INSERT INTO events (id, trace_id, seq, payload) VALUES (?1, ?2,
                (SELECT COALESCE(MAX(seq), 0) + 1 FROM events WHERE trace_id = ?2), ?3)
             ON CONFLICT(id) DO UPDATE SET payload = excluded.payload",
            rusqlite::params![event.id, event.trace_id, payload],
        )?;

        if event.id == event.trace_id && matches!(event.node_type, NodeType::Action) {
            let is_root = !event.trace_id.contains('_');
            let preview = event
                .input
                .as_ref()
                .map(|v| v.to_string())
                .map(|s| s.chars().take(INPUT_PREVIEW_BYTES).collect::<String>());
            conn.execute(
                "INSERT INTO meta (trace_id, name, status, start_time_ms, is_root, input_preview)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(trace_id) DO UPDATE SET status = excluded.status",
                rusqlite::params![
                    event.trace_id,
                    event.name,
                    status_str(event.status),
                    event.start_time.timestamp_millis(),
                    is_root as i64,
                    preview,
                ],
            )?;
        }

        Ok(())
    }

    /// Assemble the tree rooted at `trace_id`: its own events nested by id
    /// prefix, plus child-action traces discovered by scanning meta ids with
    /// prefix `trace_id_` and exactly one further `_`-delimited segment
    /// (spec.md §4.3).
    pub fn tree(&self, trace_id: &str) -> Result<Option<TraceNode>, TraceError> {
        // Scope the connection lock tightly: `direct_child_trace_ids` below
        // recurses into `self.tree`, which re-acquires this same mutex, so
        // the guard must be dropped before that recursive call.
        let (root_event_found, events, child_ids) = {
            let conn = self.conn.lock().expect("trace connection mutex poisoned");
            let mut stmt = conn.prepare("SELECT payload FROM events WHERE trace_id = ?1 ORDER BY seq ASC")?;
            let events: Vec<TraceEvent> = stmt
                .query_map([trace_id], |row| {
                    let payload: String = row.get(0)?;
                    Ok(payload)
                })?
                .collect::<Result<Vec<_>, _>>()?
                .into_iter()
                .map(|payload| serde_json::from_str(&payload))
                .collect::<Result<Vec<_>, _>>()?;
            drop(stmt);

            if !events.iter().any(|e| e.id == trace_id) {
                (false, events, Vec::new())
            } else {
                let child_ids = self.direct_child_trace_ids(&conn, trace_id)?;
                (true, events, child_ids)
            }
        };

        if !root_event_found {
            return Ok(None);
        }

        let root_event = events.iter().find(|e| e.id == trace_id).expect("checked above");
        let mut root = event_to_node(root_event);
        nest_local_events(&mut root, &events);

        let mut children = Vec::new();
        for child_id in child_ids {
            if let Some(child_tree) = self.tree(&child_id)? {
                children.push(child_tree);
            }
        }
        root.children.extend(children);
        root.children.sort_by_key(|n| n.start_time);

        Ok(Some(root))
    }

    fn direct_child_trace_ids(&self, conn: &Connection, trace_id: &str) -> Result<Vec<String>, TraceError> {
        let prefix = format!("{trace_id}_");
        let mut stmt = conn.prepare("SELECT trace_id FROM meta WHERE trace_id LIKE ?1")?;
        let like_pattern = format!("{prefix}%");
        let candidates: Vec<String> = stmt
            .query_map([like_pattern], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;

        // Child-action ids are `parentId_stepIndex_uuid`: after stripping
        // the `parentId_` prefix, the remainder is `stepIndex_uuid` —
        // exactly one further underscore (spec.md §4.3).
        Ok(candidates
            .into_iter()
            .filter(|id| {
                id.strip_prefix(&prefix)
                    .is_some_and(|rest| !rest.is_empty() && rest.matches('_').count() == 1)
            })
            .collect())
    }

    /// Sweep root traces down to the newest [`MAX_ROOT_TRACES`], cascade
    /// deleting their descendants (spec.md §4.3, §5).
    pub fn sweep_retention(&self) -> Result<(), TraceError> {
        let conn = self.conn.lock().expect("trace connection mutex poisoned");
        let mut stmt = conn.prepare(
            "SELECT trace_id FROM meta WHERE is_root = 1 ORDER BY start_time_ms DESC LIMIT -1 OFFSET ?1",
        )?;
        let stale: Vec<String> = stmt
            .query_map([MAX_ROOT_TRACES as i64], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        drop(stmt);

        for root_id in stale {
            self.delete_cascade(&conn, &root_id)?;
        }
        Ok(())
    }

    /// Spawn a background task that re-runs [`Self::sweep_retention`] every
    /// [`RETENTION_SWEEP_INTERVAL`] for the lifetime of `self`, exiting once
    /// the last strong reference is dropped. Mirrors the teacher's periodic
    /// idle-session cleanup task (weak reference to avoid a reference
    /// cycle, loop-sleep-upgrade).
    pub fn spawn_retention_sweeper(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let store = Arc::downgrade(self);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(RETENTION_SWEEP_INTERVAL).await;
                let Some(store) = store.upgrade() else {
                    tracing::debug!("TraceStore dropped, retention sweep task exiting");
                    break;
                };
                if let Err(err) = store.sweep_retention() {
                    tracing::warn!(error = %err, "retention sweep failed");
                }
            }
        })
    }

    /// Delete one trace and every descendant trace/event row.
    pub fn delete(&self, trace_id: &str) -> Result<(), TraceError> {
        let conn = self.conn.lock().expect("trace connection mutex poisoned");
        self.delete_cascade(&conn, trace_id)
    }

    fn delete_cascade(&self, conn: &Connection, trace_id: &str) -> Result<(), TraceError> {
        let children = self.direct_child_trace_ids(conn, trace_id)?;
        for child in children {
            self.delete_cascade(conn, &child)?;
        }
        conn.execute("DELETE FROM events WHERE trace_id = ?1", [trace_id])?;
        conn.execute("DELETE FROM meta WHERE trace_id = ?1", [trace_id])?;
        Ok(())
    }

    pub fn root_trace_count(&self) -> Result<usize, TraceError> {
        let conn = self.conn.lock().expect("trace connection mutex poisoned");
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM meta WHERE is_root = 1", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

fn status_str(status: Status) -> &'static str {
    match status {
        Status::Running => "running",
        Status::Success => "success",
        Status::Error => "error",
        Status::Skipped => "skipped",
    }
}

fn event_to_node(event: &TraceEvent) -> TraceNode {
    TraceNode {
        id: event.id.clone(),
        name: event.name.clone(),
        node_type: event.node_type,
        status: event.status,
        start_time: event.start_time,
        duration_ms: event.duration_ms,
        input: event.input.clone(),
        output: event.output.clone(),
        error: event.error.clone(),
        children: Vec::new(),
    }
}

/// Nest events that belong to the same trace under their structural parent
/// by id prefix (e.g. `trace_0` nests under `trace`, `trace_0_llm` nests
/// under `trace_0`), excluding the root itself and any event id that
/// belongs to a *different* trace (child-action roots, handled separately).
fn nest_local_events(root: &mut TraceNode, events: &[TraceEvent]) {
    let mut by_id: std::collections::HashMap<&str, Vec<&TraceEvent>> = std::collections::HashMap::new();
    for event in events {
        if event.id == root.id {
            continue;
        }
        if let Some((parent, _)) = event.id.rsplit_once('_') {
            by_id.entry(parent).or_default().push(event);
        }
    }
    attach_children(root, &by_id);
}

fn attach_children<'a>(node: &mut TraceNode, by_id: &std::collections::HashMap<&'a str, Vec<&'a TraceEvent>>) {
    let Some(direct) = by_id.get(node.id.as_str()) else {
        return;
    };
    let mut children: Vec<TraceNode> = direct.iter().map(|e| event_to_node(e)).collect();
    for child in &mut children {
        attach_children(child, by_id);
    }
    children.sort_by_key(|c| c.start_time);
    node.children = children;
}
