//! Contrato de almacenamiento transaccional.
//!
//! El store expone lecturas por clave y por ámbito, y un único punto de
//! escritura (`apply`) que aplica un lote de `Write` de forma atómica: o se
//! aplican todas o ninguna. Las mutaciones acumulan sus escrituras en un
//! [`Tx`] y las confirman al final; nada se publica antes del commit.

mod memory;
mod record;
mod tx;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::errors::{StoreError, StoreResult};
use crate::model::Workspace;
use crate::Id;

pub use memory::InMemoryStore;
pub use record::{Entity, Record, RecordKind};
pub use tx::Tx;

/// Escritura dentro de un lote atómico.
#[derive(Debug, Clone, PartialEq)]
pub enum Write {
    /// Falla con `Conflict` si la clave ya existe.
    Insert(Record),
    /// Sobrescribe sólo `fields` sobre la versión vigente de la fila, bajo el
    /// lock del backend: dos patches concurrentes sobre columnas distintas se
    /// conservan ambos. No-op si la fila ya no existe.
    Patch {
        kind: RecordKind,
        id: Id,
        fields: Map<String, Value>,
    },
    /// No-op si no existe. Borrar un flow arrastra sus nodos, sub-filas,
    /// aristas, variables y ejecuciones; borrar un nodo arrastra sus
    /// ejecuciones.
    Delete { kind: RecordKind, id: Id },
    /// Ajusta el contador de flows del workspace (nunca por debajo de 0) y
    /// su marca `updated`.
    AdjustWorkspace {
        id: Id,
        flow_delta: i32,
        updated: DateTime<Utc>,
    },
}

#[async_trait]
pub trait Store: Send + Sync + 'static {
    /// Verifica que el backend acepta trabajo.
    async fn ping(&self) -> StoreResult<()>;

    async fn workspace(&self, id: Id) -> StoreResult<Option<Workspace>>;
    /// Workspaces de los que el usuario es miembro.
    async fn member_workspaces(&self, user_id: Id) -> StoreResult<Vec<Id>>;
    async fn is_member(&self, user_id: Id, workspace_id: Id) -> StoreResult<bool>;

    async fn get(&self, kind: RecordKind, id: Id) -> StoreResult<Option<Record>>;
    /// Filas existentes entre `ids`; las ausentes se omiten.
    async fn get_many(&self, kind: RecordKind, ids: &[Id]) -> StoreResult<Vec<Record>>;
    /// Filas cuyo `scope_id` está en `scopes`.
    async fn list_by_scope(&self, kind: RecordKind, scopes: &[Id]) -> StoreResult<Vec<Record>>;

    async fn apply(&self, writes: Vec<Write>) -> StoreResult<()>;
}

/// Lecturas tipadas sobre cualquier `Store`.
#[async_trait]
pub trait StoreExt: Store {
    async fn fetch<E: Entity>(&self, id: Id) -> StoreResult<Option<E>> {
        match self.get(E::KIND, id).await? {
            Some(record) => decode::<E>(record).map(Some),
            None => Ok(None),
        }
    }

    async fn fetch_many<E: Entity>(&self, ids: &[Id]) -> StoreResult<Vec<E>> {
        self.get_many(E::KIND, ids)
            .await?
            .into_iter()
            .map(decode::<E>)
            .collect()
    }

    async fn list_scoped<E: Entity>(&self, scopes: &[Id]) -> StoreResult<Vec<E>> {
        self.list_by_scope(E::KIND, scopes)
            .await?
            .into_iter()
            .map(decode::<E>)
            .collect()
    }
}

impl<S: Store + ?Sized> StoreExt for S {}

pub(crate) fn decode<E: Entity>(record: Record) -> StoreResult<E> {
    let kind = record.kind();
    E::from_record(record).ok_or_else(|| StoreError::Codec(format!("expected {} got {kind}", E::KIND)))
}
