use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Id;

/// Frontera de tenencia. Este core sólo lee workspaces y ajusta
/// `flow_count` / `updated`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workspace {
    pub id: Id,
    pub name: String,
    /// Cantidad de flows no-versión del workspace.
    pub flow_count: i32,
    pub updated: DateTime<Utc>,
}
