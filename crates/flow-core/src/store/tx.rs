use std::sync::Arc;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use log::debug;

use super::{decode, Entity, Record, RecordKind, Store, StoreExt, Write};
use crate::errors::StoreResult;
use crate::Id;

/// Transacción de escritura sobre un `Store`.
///
/// Las escrituras se acumulan y se aplican en un único `apply` al hacer
/// `commit`. Las lecturas ven primero lo escrito en la propia transacción.
/// Soltar la transacción sin confirmar descarta todo.
pub struct Tx {
    store: Arc<dyn Store>,
    staged: IndexMap<(RecordKind, Id), Option<Record>>,
    writes: Vec<Write>,
}

impl Tx {
    /// Abre una transacción; falla con `Unavailable` si el store no responde.
    pub async fn begin(store: Arc<dyn Store>) -> StoreResult<Self> {
        store.ping().await?;
        Ok(Self { store,
                  staged: IndexMap::new(),
                  writes: Vec::new() })
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub async fn get<E: Entity>(&self, id: Id) -> StoreResult<Option<E>> {
        if let Some(staged) = self.staged.get(&(E::KIND, id)) {
            return staged.clone().map(decode::<E>).transpose();
        }
        self.store.fetch::<E>(id).await
    }

    /// Filas del ámbito `scope`, incluyendo inserciones y borrados de esta
    /// transacción.
    pub async fn list<E: Entity>(&self, scope: Id) -> StoreResult<Vec<E>> {
        let mut rows: IndexMap<Id, E> = self.store
                                            .list_scoped::<E>(&[scope])
                                            .await?
                                            .into_iter()
                                            .map(|row| (row.id(), row))
                                            .collect();
        for ((kind, id), staged) in self.staged.iter() {
            if *kind != E::KIND {
                continue;
            }
            match staged {
                Some(record) if record.scope_id() == Some(scope) => {
                    rows.insert(*id, decode::<E>(record.clone())?);
                }
                _ => {
                    rows.shift_remove(id);
                }
            }
        }
        Ok(rows.into_values().collect())
    }

    pub fn insert<E: Entity>(&mut self, row: E) {
        let record = row.into_record();
        self.staged.insert((E::KIND, record.id()), Some(record.clone()));
        self.writes.push(Write::Insert(record));
    }

    /// Registra `after` como nueva versión de `before`. Al store sólo viajan
    /// los campos que cambiaron.
    pub fn update<E: Entity>(&mut self, before: &E, after: E) -> StoreResult<()> {
        let record = after.into_record();
        let fields = before.clone().into_record().changed_fields(&record)?;
        let id = record.id();
        self.staged.insert((E::KIND, id), Some(record));
        if !fields.is_empty() {
            self.writes.push(Write::Patch { kind: E::KIND,
                                            id,
                                            fields });
        }
        Ok(())
    }

    pub fn delete<E: Entity>(&mut self, id: Id) {
        self.staged.insert((E::KIND, id), None);
        self.writes.push(Write::Delete { kind: E::KIND, id });
    }

    pub fn adjust_workspace(&mut self, id: Id, flow_delta: i32, updated: DateTime<Utc>) {
        self.writes.push(Write::AdjustWorkspace { id,
                                                  flow_delta,
                                                  updated });
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    pub async fn commit(self) -> StoreResult<()> {
        if self.writes.is_empty() {
            return Ok(());
        }
        debug!("tx commit writes={}", self.writes.len());
        self.store.apply(self.writes).await
    }
}
