use serde::{Deserialize, Serialize};

use super::{apply_value, NodeKind, NodeState, Patch};
use crate::Id;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

/// Vértice del grafo. `kind` es inmutable; `state` es transitorio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: Id,
    pub flow_id: Id,
    pub kind: NodeKind,
    pub name: String,
    pub position: Position,
    pub state: NodeState,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodePatch {
    pub name: Option<String>,
    pub position: Option<Position>,
    pub state: Option<NodeState>,
}

impl Patch<Node> for NodePatch {
    fn apply(&self, row: &mut Node) {
        apply_value(&mut row.name, &self.name);
        apply_value(&mut row.position, &self.position);
        apply_value(&mut row.state, &self.state);
    }

    fn is_empty(&self) -> bool {
        self.name.is_none() && self.position.is_none() && self.state.is_none()
    }
}
