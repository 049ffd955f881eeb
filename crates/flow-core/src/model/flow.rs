use serde::{Deserialize, Serialize};

use super::{apply_union, apply_value, Patch, Union};
use crate::Id;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flow {
    pub id: Id,
    pub workspace_id: Id,
    pub name: String,
    pub running: bool,
    pub duration: Option<i32>,
    /// Si está presente, este flow es una versión del flow indicado.
    pub version_parent_id: Option<Id>,
}

impl Flow {
    pub fn is_version(&self) -> bool {
        self.version_parent_id.is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlowPatch {
    pub name: Option<String>,
    pub duration: Option<Union<i32>>,
    pub running: Option<bool>,
}

impl Patch<Flow> for FlowPatch {
    fn apply(&self, row: &mut Flow) {
        apply_value(&mut row.name, &self.name);
        apply_union(&mut row.duration, &self.duration);
        apply_value(&mut row.running, &self.running);
    }

    fn is_empty(&self) -> bool {
        self.name.is_none() && self.duration.is_none() && self.running.is_none()
    }
}
