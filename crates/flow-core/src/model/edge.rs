use serde::{Deserialize, Serialize};

use super::{apply_value, HandleKind, NodeState, Patch};
use crate::Id;

/// Arista dirigida dentro de un flow. Origen y destino no se validan contra
/// el store: un cliente puede crear la arista antes que sus nodos.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub id: Id,
    pub flow_id: Id,
    pub source_id: Id,
    pub target_id: Id,
    pub source_handle: HandleKind,
    pub state: NodeState,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EdgePatch {
    pub source_id: Option<Id>,
    pub target_id: Option<Id>,
    pub source_handle: Option<HandleKind>,
    pub state: Option<NodeState>,
}

impl Patch<Edge> for EdgePatch {
    fn apply(&self, row: &mut Edge) {
        apply_value(&mut row.source_id, &self.source_id);
        apply_value(&mut row.target_id, &self.target_id);
        apply_value(&mut row.source_handle, &self.source_handle);
        apply_value(&mut row.state, &self.state);
    }

    fn is_empty(&self) -> bool {
        self.source_id.is_none() && self.target_id.is_none() && self.source_handle.is_none() && self.state.is_none()
    }
}
