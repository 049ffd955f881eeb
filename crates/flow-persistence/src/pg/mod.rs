//! Implementación Postgres del contrato `Store`.
//!
//! - Todas las filas del dominio viven en `records` (clave `(kind, id)`,
//!   cuerpo JSONB, `scope_id` indexado para los listados por ámbito).
//! - `apply` corre el lote completo dentro de una transacción read-write;
//!   cualquier fallo la revierte.
//! - Diesel es bloqueante: cada operación se despacha a
//!   `tokio::task::spawn_blocking` y se reintenta ante errores transitorios.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::r2d2::{self, ConnectionManager};
use diesel::sql_types::{Integer, Jsonb, Text, Timestamptz, Uuid as SqlUuid};
use log::{debug, warn};
use serde_json::Value;
use uuid::Uuid;

use flow_core::model::Workspace;
use flow_core::store::{Record, RecordKind, Store, Write};
use flow_core::{Id, StoreError, StoreResult};

use crate::error::PersistenceError;
use crate::migrations::run_pending_migrations;
use crate::schema::{records, workspace_members, workspaces};

/// Pool r2d2 de conexiones Postgres.
pub type PgPool = r2d2::Pool<ConnectionManager<PgConnection>>;

#[derive(Queryable, Debug)]
struct RecordRow {
    #[allow(dead_code)]
    seq: i64,
    kind: String,
    #[allow(dead_code)]
    id: Uuid,
    #[allow(dead_code)]
    scope_id: Option<Uuid>,
    body: Value,
}

impl RecordRow {
    fn into_record(self) -> StoreResult<Record> {
        let kind: RecordKind = self.kind.parse()?;
        Record::from_json(kind, self.body)
    }
}

#[derive(Insertable, Debug)]
#[diesel(table_name = records)]
struct NewRecordRow<'a> {
    kind: &'a str,
    id: Uuid,
    scope_id: Option<Uuid>,
    body: Value,
}

impl<'a> NewRecordRow<'a> {
    fn from_record(record: &Record) -> Result<Self, PersistenceError> {
        let body = record.to_json()
                         .map_err(|e| PersistenceError::Unknown(e.to_string()))?;
        Ok(Self { kind: record.kind().as_str(),
                  id: record.id().as_uuid(),
                  scope_id: record.scope_id().map(|s| s.as_uuid()),
                  body })
    }
}

#[derive(Queryable, Debug)]
struct WorkspaceRow {
    id: Uuid,
    name: String,
    flow_count: i32,
    updated: DateTime<Utc>,
}

impl From<WorkspaceRow> for Workspace {
    fn from(row: WorkspaceRow) -> Self {
        Workspace { id: row.id.into(),
                    name: row.name,
                    flow_count: row.flow_count,
                    updated: row.updated }
    }
}

/// Determina si un error es transitorio (reintentable con backoff).
fn is_retryable(e: &PersistenceError) -> bool {
    match e {
        PersistenceError::SerializationConflict => true,
        PersistenceError::TransientIo(_) => true,
        PersistenceError::Unknown(msg) => {
            let m = msg.to_lowercase();
            m.contains("deadlock detected") || m.contains("connection closed") || m.contains("connection refused") || m.contains("timeout")
        }
        _ => false,
    }
}

/// Reintento con backoff lineal corto (hasta 3 reintentos: 15ms, 30ms, 45ms).
fn with_retry<F, T>(mut f: F) -> Result<T, PersistenceError>
    where F: FnMut() -> Result<T, PersistenceError>
{
    let mut attempts = 0;
    loop {
        match f() {
            Err(e) if is_retryable(&e) && attempts < 3 => {
                let delay_ms = 15 * ((attempts + 1) as u64);
                warn!("retryable error (attempt {}): {:?} -> sleeping {}ms", attempts + 1, e, delay_ms);
                std::thread::sleep(std::time::Duration::from_millis(delay_ms));
                attempts += 1;
            }
            r => return r,
        }
    }
}

fn uuids(ids: &[Id]) -> Vec<Uuid> {
    ids.iter().map(Id::as_uuid).collect()
}

/// Backend Postgres de `Store`.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Corre `op` sobre una conexión del pool en un hilo bloqueante, con
    /// reintentos.
    async fn run<F, T>(&self, label: &'static str, op: F) -> Result<T, PersistenceError>
        where F: Fn(&mut PgConnection) -> Result<T, PersistenceError> + Send + 'static,
              T: Send + 'static
    {
        let pool = self.pool.clone();
        let joined = tokio::task::spawn_blocking(move || {
                         with_retry(|| {
                             let mut conn = pool.get()
                                                .map_err(|e| PersistenceError::TransientIo(format!("pool error: {e}")))?;
                             op(&mut conn)
                         })
                     }).await;
        match joined {
            Ok(result) => {
                if let Err(e) = &result {
                    debug!("{label}: {e}");
                }
                result
            }
            Err(e) => Err(PersistenceError::Unknown(format!("{label}: blocking task failed: {e}"))),
        }
    }

    /// Alta de workspace (utilidad de demo y pruebas; la gestión de
    /// workspaces vive fuera de este servicio).
    pub async fn create_workspace(&self, name: &str) -> StoreResult<Id> {
        let id = Id::new();
        let (uuid, name) = (id.as_uuid(), name.to_string());
        self.run("create_workspace", move |conn| {
                diesel::insert_into(workspaces::table).values((workspaces::id.eq(uuid),
                                                               workspaces::name.eq(&name),
                                                               workspaces::flow_count.eq(0),
                                                               workspaces::updated.eq(Utc::now())))
                                                      .execute(conn)?;
                Ok(())
            })
            .await?;
        Ok(id)
    }

    pub async fn add_member(&self, workspace_id: Id, user_id: Id) -> StoreResult<()> {
        let (ws, user) = (workspace_id.as_uuid(), user_id.as_uuid());
        self.run("add_member", move |conn| {
                diesel::insert_into(workspace_members::table).values((workspace_members::workspace_id.eq(ws),
                                                                      workspace_members::user_id.eq(user)))
                                                             .on_conflict_do_nothing()
                                                             .execute(conn)?;
                Ok(())
            })
            .await?;
        Ok(())
    }
}

fn apply_write(conn: &mut PgConnection, write: &Write) -> Result<(), PersistenceError> {
    match write {
        Write::Insert(record) => {
            let row = NewRecordRow::from_record(record)?;
            match diesel::insert_into(records::table).values(&row).execute(conn) {
                Ok(_) => Ok(()),
                Err(diesel::result::Error::DatabaseError(diesel::result::DatabaseErrorKind::UniqueViolation, _)) => {
                    Err(PersistenceError::Conflict { kind: record.kind(),
                                                     id: record.id() })
                }
                Err(e) => Err(e.into()),
            }
        }
        Write::Patch { kind, id, fields } => {
            // `||` corre sobre la versión vigente con la fila bloqueada
            diesel::sql_query("UPDATE records SET body = body || $1 WHERE kind = $2 AND id = $3")
                .bind::<Jsonb, _>(Value::Object(fields.clone()))
                .bind::<Text, _>(kind.as_str())
                .bind::<SqlUuid, _>(id.as_uuid())
                .execute(conn)?;
            Ok(())
        }
        Write::Delete { kind: RecordKind::Flow, id } => delete_flow(conn, id.as_uuid()),
        Write::Delete { kind: RecordKind::Node, id } => delete_nodes(conn, &[id.as_uuid()]),
        Write::Delete { kind, id } => {
            diesel::delete(records::table.filter(records::kind.eq(kind.as_str()))
                                         .filter(records::id.eq(id.as_uuid()))).execute(conn)?;
            Ok(())
        }
        Write::AdjustWorkspace { id, flow_delta, updated } => {
            diesel::sql_query("UPDATE workspaces SET flow_count = GREATEST(flow_count + $1, 0), updated = $2 WHERE id = $3")
                .bind::<Integer, _>(*flow_delta)
                .bind::<Timestamptz, _>(*updated)
                .bind::<SqlUuid, _>(id.as_uuid())
                .execute(conn)?;
            Ok(())
        }
    }
}

/// Borra nodos junto con sus sub-filas y ejecuciones.
fn delete_nodes(conn: &mut PgConnection, node_ids: &[Uuid]) -> Result<(), PersistenceError> {
    if node_ids.is_empty() {
        return Ok(());
    }
    let sub_kinds: Vec<&str> = RecordKind::SUB_NODES.iter().map(|k| k.as_str()).collect();
    diesel::delete(records::table.filter(records::kind.eq_any(sub_kinds))
                                 .filter(records::id.eq_any(node_ids.to_vec()))).execute(conn)?;
    diesel::delete(records::table.filter(records::kind.eq(RecordKind::NodeExecution.as_str()))
                                 .filter(records::scope_id.assume_not_null().eq_any(node_ids.to_vec()))).execute(conn)?;
    diesel::delete(records::table.filter(records::kind.eq(RecordKind::Node.as_str()))
                                 .filter(records::id.eq_any(node_ids.to_vec()))).execute(conn)?;
    Ok(())
}

fn delete_flow(conn: &mut PgConnection, flow_id: Uuid) -> Result<(), PersistenceError> {
    let node_ids: Vec<Uuid> = records::table.filter(records::kind.eq(RecordKind::Node.as_str()))
                                            .filter(records::scope_id.eq(flow_id))
                                            .select(records::id)
                                            .load(conn)?;
    delete_nodes(conn, &node_ids)?;
    let scoped = [RecordKind::Edge.as_str(), RecordKind::FlowVariable.as_str()];
    diesel::delete(records::table.filter(records::kind.eq_any(scoped))
                                 .filter(records::scope_id.eq(flow_id))).execute(conn)?;
    diesel::delete(records::table.filter(records::kind.eq(RecordKind::Flow.as_str()))
                                 .filter(records::id.eq(flow_id))).execute(conn)?;
    Ok(())
}

fn decode_rows(rows: Vec<RecordRow>) -> StoreResult<Vec<Record>> {
    rows.into_iter().map(RecordRow::into_record).collect()
}

#[async_trait]
impl Store for PgStore {
    async fn ping(&self) -> StoreResult<()> {
        self.run("ping", |conn| {
                diesel::sql_query("SELECT 1").execute(conn)?;
                Ok(())
            })
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }

    async fn workspace(&self, id: Id) -> StoreResult<Option<Workspace>> {
        let uuid = id.as_uuid();
        let row: Option<WorkspaceRow> = self.run("workspace", move |conn| Ok(workspaces::table.find(uuid).first(conn).optional()?))
                                            .await?;
        Ok(row.map(Workspace::from))
    }

    async fn member_workspaces(&self, user_id: Id) -> StoreResult<Vec<Id>> {
        let user = user_id.as_uuid();
        let ids: Vec<Uuid> = self.run("member_workspaces", move |conn| {
                                     Ok(workspace_members::table.filter(workspace_members::user_id.eq(user))
                                                                .select(workspace_members::workspace_id)
                                                                .load(conn)?)
                                 })
                                 .await?;
        Ok(ids.into_iter().map(Id::from).collect())
    }

    async fn is_member(&self, user_id: Id, workspace_id: Id) -> StoreResult<bool> {
        let (user, ws) = (user_id.as_uuid(), workspace_id.as_uuid());
        let found = self.run("is_member", move |conn| {
                            Ok(diesel::select(diesel::dsl::exists(workspace_members::table.find((ws, user)))).get_result::<bool>(conn)?)
                        })
                        .await?;
        Ok(found)
    }

    async fn get(&self, kind: RecordKind, id: Id) -> StoreResult<Option<Record>> {
        let uuid = id.as_uuid();
        let row: Option<RecordRow> = self.run("get", move |conn| {
                                             Ok(records::table.find((kind.as_str(), uuid))
                                                              .first(conn)
                                                              .optional()?)
                                         })
                                         .await?;
        row.map(RecordRow::into_record).transpose()
    }

    async fn get_many(&self, kind: RecordKind, ids: &[Id]) -> StoreResult<Vec<Record>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids = uuids(ids);
        let rows: Vec<RecordRow> = self.run("get_many", move |conn| {
                                           Ok(records::table.filter(records::kind.eq(kind.as_str()))
                                                            .filter(records::id.eq_any(ids.clone()))
                                                            .order(records::seq.asc())
                                                            .load(conn)?)
                                       })
                                       .await?;
        decode_rows(rows)
    }

    async fn list_by_scope(&self, kind: RecordKind, scopes: &[Id]) -> StoreResult<Vec<Record>> {
        if scopes.is_empty() {
            return Ok(Vec::new());
        }
        let scopes = uuids(scopes);
        let rows: Vec<RecordRow> = self.run("list_by_scope", move |conn| {
                                           Ok(records::table.filter(records::kind.eq(kind.as_str()))
                                                            .filter(records::scope_id.assume_not_null().eq_any(scopes.clone()))
                                                            .order(records::seq.asc())
                                                            .load(conn)?)
                                       })
                                       .await?;
        debug!("list_by_scope kind={kind} rows={}", rows.len());
        decode_rows(rows)
    }

    async fn apply(&self, writes: Vec<Write>) -> StoreResult<()> {
        if writes.is_empty() {
            return Ok(());
        }
        let count = writes.len();
        self.run("apply", move |conn| {
                conn.build_transaction()
                    .read_write()
                    .run(|tx| writes.iter().try_for_each(|w| apply_write(tx, w)))
            })
            .await?;
        debug!("apply committed writes={count}");
        Ok(())
    }
}

/// Construye un pool r2d2 y corre las migraciones pendientes.
///
/// Si `min_size > max_size` se usa `min_size = max_size`; un tamaño 0 se
/// trata como 1.
pub fn build_pool(database_url: &str, min_size: u32, max_size: u32) -> Result<PgPool, PersistenceError> {
    let max = max_size.max(1);
    let min = min_size.max(1);
    if min > max {
        warn!("min_size > max_size ({min} > {max}), ajustando min=max");
    }
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    let pool = r2d2::Pool::builder().min_idle(Some(min.min(max)))
                                    .max_size(max)
                                    .build(manager)
                                    .map_err(|e| PersistenceError::TransientIo(format!("pool build: {e}")))?;
    {
        let mut conn = pool.get()
                           .map_err(|e| PersistenceError::TransientIo(format!("pool get for migrations: {e}")))?;
        run_pending_migrations(&mut conn)?;
    }
    Ok(pool)
}

/// Carga `.env`, lee `DbConfig` y construye un pool ya migrado.
pub fn build_pool_from_env() -> Result<PgPool, PersistenceError> {
    let cfg = crate::config::DbConfig::from_env()?;
    build_pool(&cfg.url, cfg.min_connections, cfg.max_connections)
}
