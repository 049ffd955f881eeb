use serde::{Deserialize, Serialize};

use super::{apply_value, Patch};
use crate::Id;

/// Par clave/valor ordenado dentro de un flow. `order` es una clave dispersa:
/// reordenar sólo toca la variable movida.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowVariable {
    pub id: Id,
    pub flow_id: Id,
    pub name: String,
    pub value: String,
    pub enabled: bool,
    pub description: String,
    pub order: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlowVariablePatch {
    pub name: Option<String>,
    pub value: Option<String>,
    pub enabled: Option<bool>,
    pub description: Option<String>,
    pub order: Option<f64>,
}

impl FlowVariablePatch {
    /// Separa el cambio de orden del resto del patch.
    pub fn split_order(&self) -> (Option<FlowVariablePatch>, FlowVariablePatch) {
        let order = self.order.map(|o| FlowVariablePatch { order: Some(o),
                                                           ..Default::default() });
        let rest = FlowVariablePatch { order: None,
                                       ..self.clone() };
        (order, rest)
    }
}

impl Patch<FlowVariable> for FlowVariablePatch {
    fn apply(&self, row: &mut FlowVariable) {
        apply_value(&mut row.name, &self.name);
        apply_value(&mut row.value, &self.value);
        apply_value(&mut row.enabled, &self.enabled);
        apply_value(&mut row.description, &self.description);
        apply_value(&mut row.order, &self.order);
    }

    fn is_empty(&self) -> bool {
        self.name.is_none() && self.value.is_none() && self.enabled.is_none() && self.description.is_none() && self.order.is_none()
    }
}
