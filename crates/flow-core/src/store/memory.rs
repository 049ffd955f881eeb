use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use indexmap::IndexMap;

use super::{Record, RecordKind, Store, Write};
use crate::errors::{StoreError, StoreResult};
use crate::model::Workspace;
use crate::Id;

#[derive(Default)]
struct Tables {
    workspaces: IndexMap<Id, Workspace>,
    /// (workspace, usuario)
    members: HashSet<(Id, Id)>,
    records: HashMap<RecordKind, IndexMap<Id, Record>>,
}

impl Tables {
    fn table(&mut self, kind: RecordKind) -> &mut IndexMap<Id, Record> {
        self.records.entry(kind).or_default()
    }

    fn ids_in_scope(&self, kind: RecordKind, scopes: &[Id]) -> Vec<Id> {
        self.records
            .get(&kind)
            .map(|t| {
                t.values()
                 .filter(|r| r.scope_id().is_some_and(|s| scopes.contains(&s)))
                 .map(Record::id)
                 .collect()
            })
            .unwrap_or_default()
    }

    fn remove(&mut self, kind: RecordKind, ids: &[Id]) {
        let table = self.table(kind);
        for id in ids {
            table.shift_remove(id);
        }
    }

    fn delete_node(&mut self, node_id: Id) {
        let executions = self.ids_in_scope(RecordKind::NodeExecution, &[node_id]);
        self.remove(RecordKind::NodeExecution, &executions);
        self.remove(RecordKind::Node, &[node_id]);
    }

    fn delete_flow(&mut self, flow_id: Id) {
        let nodes = self.ids_in_scope(RecordKind::Node, &[flow_id]);
        for kind in RecordKind::SUB_NODES {
            self.remove(*kind, &nodes);
        }
        for node_id in nodes {
            self.delete_node(node_id);
        }
        for kind in [RecordKind::Edge, RecordKind::FlowVariable] {
            let ids = self.ids_in_scope(kind, &[flow_id]);
            self.remove(kind, &ids);
        }
        self.remove(RecordKind::Flow, &[flow_id]);
    }

    fn write(&mut self, write: Write) -> StoreResult<()> {
        match write {
            Write::Insert(record) => {
                let (kind, id) = (record.kind(), record.id());
                let table = self.table(kind);
                if table.contains_key(&id) {
                    return Err(StoreError::Conflict { kind, id });
                }
                table.insert(id, record);
            }
            Write::Patch { kind, id, fields } => {
                let table = self.table(kind);
                if let Some(current) = table.get(&id) {
                    let merged = current.merged(fields)?;
                    table.insert(id, merged);
                }
            }
            Write::Delete { kind: RecordKind::Flow, id } => self.delete_flow(id),
            Write::Delete { kind: RecordKind::Node, id } => self.delete_node(id),
            Write::Delete { kind, id } => self.remove(kind, &[id]),
            Write::AdjustWorkspace { id, flow_delta, updated } => {
                if let Some(ws) = self.workspaces.get_mut(&id) {
                    ws.flow_count = (ws.flow_count + flow_delta).max(0);
                    ws.updated = updated;
                }
            }
        }
        Ok(())
    }

    /// Copia de las tablas que `writes` puede tocar, cascadas incluidas.
    fn save(&self, writes: &[Write]) -> Saved {
        let mut kinds = HashSet::new();
        let mut workspaces = false;
        for write in writes {
            match write {
                Write::Insert(record) => {
                    kinds.insert(record.kind());
                }
                Write::Patch { kind, .. } => {
                    kinds.insert(*kind);
                }
                Write::Delete { kind: RecordKind::Flow, .. } => {
                    kinds.extend([RecordKind::Flow, RecordKind::Node, RecordKind::Edge, RecordKind::FlowVariable, RecordKind::NodeExecution]);
                    kinds.extend(RecordKind::SUB_NODES.iter().copied());
                }
                Write::Delete { kind: RecordKind::Node, .. } => {
                    kinds.extend([RecordKind::Node, RecordKind::NodeExecution]);
                }
                Write::Delete { kind, .. } => {
                    kinds.insert(*kind);
                }
                Write::AdjustWorkspace { .. } => workspaces = true,
            }
        }
        Saved { records: kinds.into_iter()
                              .map(|kind| (kind, self.records.get(&kind).cloned()))
                              .collect(),
                workspaces: workspaces.then(|| self.workspaces.clone()) }
    }

    fn restore(&mut self, saved: Saved) {
        for (kind, table) in saved.records {
            match table {
                Some(table) => self.records.insert(kind, table),
                None => self.records.remove(&kind),
            };
        }
        if let Some(workspaces) = saved.workspaces {
            self.workspaces = workspaces;
        }
    }
}

struct Saved {
    records: Vec<(RecordKind, Option<IndexMap<Id, Record>>)>,
    workspaces: Option<IndexMap<Id, Workspace>>,
}

/// Store en memoria para pruebas y demos. Cada `apply` guarda las tablas que
/// el lote toca y las restaura si alguna escritura falla.
#[derive(Default)]
pub struct InMemoryStore {
    tables: Mutex<Tables>,
    unavailable: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check(&self) -> StoreResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("in-memory store marked unavailable".into()));
        }
        Ok(())
    }

    /// Simula la caída (o recuperación) del backend.
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    pub fn create_workspace(&self, name: &str) -> Id {
        let ws = Workspace { id: Id::new(),
                             name: name.to_string(),
                             flow_count: 0,
                             updated: Utc::now() };
        let id = ws.id;
        self.lock().workspaces.insert(id, ws);
        id
    }

    pub fn add_member(&self, workspace_id: Id, user_id: Id) {
        self.lock().members.insert((workspace_id, user_id));
    }

    pub fn remove_member(&self, workspace_id: Id, user_id: Id) {
        self.lock().members.remove(&(workspace_id, user_id));
    }

    /// Cantidad de filas de un tipo (útil en pruebas de cascada).
    pub fn count(&self, kind: RecordKind) -> usize {
        self.lock().records.get(&kind).map_or(0, IndexMap::len)
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn ping(&self) -> StoreResult<()> {
        self.check()
    }

    async fn workspace(&self, id: Id) -> StoreResult<Option<Workspace>> {
        self.check()?;
        Ok(self.lock().workspaces.get(&id).cloned())
    }

    async fn member_workspaces(&self, user_id: Id) -> StoreResult<Vec<Id>> {
        self.check()?;
        let tables = self.lock();
        Ok(tables.workspaces
                 .keys()
                 .filter(|ws| tables.members.contains(&(**ws, user_id)))
                 .copied()
                 .collect())
    }

    async fn is_member(&self, user_id: Id, workspace_id: Id) -> StoreResult<bool> {
        self.check()?;
        Ok(self.lock().members.contains(&(workspace_id, user_id)))
    }

    async fn get(&self, kind: RecordKind, id: Id) -> StoreResult<Option<Record>> {
        self.check()?;
        Ok(self.lock().records.get(&kind).and_then(|t| t.get(&id)).cloned())
    }

    async fn get_many(&self, kind: RecordKind, ids: &[Id]) -> StoreResult<Vec<Record>> {
        self.check()?;
        let tables = self.lock();
        let Some(table) = tables.records.get(&kind) else {
            return Ok(Vec::new());
        };
        Ok(ids.iter().filter_map(|id| table.get(id)).cloned().collect())
    }

    async fn list_by_scope(&self, kind: RecordKind, scopes: &[Id]) -> StoreResult<Vec<Record>> {
        self.check()?;
        let tables = self.lock();
        let Some(table) = tables.records.get(&kind) else {
            return Ok(Vec::new());
        };
        Ok(table.values()
                .filter(|r| r.scope_id().is_some_and(|s| scopes.contains(&s)))
                .cloned()
                .collect())
    }

    async fn apply(&self, writes: Vec<Write>) -> StoreResult<()> {
        self.check()?;
        let mut tables = self.lock();
        let saved = tables.save(&writes);
        for write in writes {
            if let Err(e) = tables.write(write) {
                tables.restore(saved);
                return Err(e);
            }
        }
        Ok(())
    }
}
