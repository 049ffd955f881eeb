//! Variables de flow.
//!
//! `order` es una clave dispersa. Un alta sin orden queda al final; un cambio
//! de orden se escribe y se publica antes que el resto del update.

use log::debug;
use serde::Serialize;

use flow_core::event::{Change, VariableEvent};
use flow_core::model::{FlowVariable, FlowVariablePatch, Patch};
use flow_core::store::StoreExt;

use crate::access::dedup_ids;
use crate::auth::CallContext;
use crate::buses::Published;
use crate::error::{RpcError, RpcResult};
use crate::filter::flow_filter;
use crate::mutation::MutationContext;
use crate::service::FlowService;
use crate::sync::{SyncItem, SyncStream};
use crate::wire::{given_or_new, opt_name, parse_id, required_name, wire, WireId};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowVariableMsg {
    pub flow_variable_id: WireId,
    pub flow_id: WireId,
    pub name: String,
    pub value: String,
    pub enabled: bool,
    pub description: String,
    pub order: f64,
}

impl From<&FlowVariable> for FlowVariableMsg {
    fn from(variable: &FlowVariable) -> Self {
        Self { flow_variable_id: wire(variable.id),
               flow_id: wire(variable.flow_id),
               name: variable.name.clone(),
               value: variable.value.clone(),
               enabled: variable.enabled,
               description: variable.description.clone(),
               order: variable.order }
    }
}

/// Mensaje de UPDATE y, con la misma forma, ítem de `flow_variable_update`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FlowVariableUpdateMsg {
    pub flow_variable_id: WireId,
    pub name: Option<String>,
    pub value: Option<String>,
    pub enabled: Option<bool>,
    pub description: Option<String>,
    pub order: Option<f64>,
}

pub type FlowVariableUpdateItem = FlowVariableUpdateMsg;

pub type FlowVariableSyncItem = SyncItem<FlowVariableMsg, FlowVariableUpdateMsg>;

#[derive(Debug, Clone, Default)]
pub struct FlowVariableInsertItem {
    pub flow_variable_id: Option<WireId>,
    pub flow_id: WireId,
    pub name: String,
    pub value: String,
    pub enabled: bool,
    pub description: String,
    /// Si falta, después de la última variable del flow.
    pub order: Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct FlowVariableDeleteItem {
    pub flow_variable_id: WireId,
}

pub fn encode_variable(event: &VariableEvent) -> Option<FlowVariableSyncItem> {
    Some(match event {
             Change::Insert(variable) => SyncItem::Insert(FlowVariableMsg::from(variable)),
             Change::Update { row, patch } => SyncItem::Update(FlowVariableUpdateMsg { flow_variable_id: wire(row.id),
                                                                                      name: patch.name.clone(),
                                                                                      value: patch.value.clone(),
                                                                                      enabled: patch.enabled,
                                                                                      description: patch.description.clone(),
                                                                                      order: patch.order }),
             Change::Delete(variable) => SyncItem::Delete { id: wire(variable.id) },
         })
}

async fn next_order(mutation: &mut MutationContext, variable: &FlowVariable) -> RpcResult<f64> {
    let siblings = mutation.tx().list::<FlowVariable>(variable.flow_id).await?;
    Ok(siblings.iter()
               .map(|v| v.order)
               .fold(None, |max: Option<f64>, o| Some(max.map_or(o, |m| m.max(o))))
               .map_or(0.0, |max| max + 1.0))
}

fn apply_and_track(mutation: &mut MutationContext, variable: &mut FlowVariable, patch: FlowVariablePatch) -> RpcResult<()> {
    let before = variable.clone();
    patch.apply(variable);
    mutation.tx().update(&before, variable.clone())?;
    mutation.track(Published::Variable(variable.flow_id,
                                       Change::Update { row: variable.clone(),
                                                        patch }));
    Ok(())
}

impl FlowService {
    pub async fn flow_variable_collection(&self, ctx: &CallContext) -> RpcResult<Vec<FlowVariableMsg>> {
        let flows = self.access(ctx)?.accessible_flow_ids().await?;
        let variables = self.store.list_scoped::<FlowVariable>(&flows).await?;
        Ok(variables.iter().map(FlowVariableMsg::from).collect())
    }

    pub async fn flow_variable_insert(&self, ctx: &CallContext, items: Vec<FlowVariableInsertItem>) -> RpcResult<()> {
        let access = self.access(ctx)?;
        let mut decoded = Vec::with_capacity(items.len());
        for item in &items {
            let variable = FlowVariable { id: given_or_new("flow_variable_id", item.flow_variable_id.as_ref())?,
                                          flow_id: parse_id("flow_id", &item.flow_id)?,
                                          name: required_name("name", &item.name)?,
                                          value: item.value.clone(),
                                          enabled: item.enabled,
                                          description: item.description.clone(),
                                          order: item.order.unwrap_or_default() };
            decoded.push((variable, item.order.is_some()));
        }
        for (variable, _) in &decoded {
            access.ensure_flow(variable.flow_id).await?;
        }

        let mut mutation = self.begin(ctx).await?;
        for (mut variable, has_order) in decoded {
            if !has_order {
                variable.order = next_order(&mut mutation, &variable).await?;
            }
            mutation.tx().insert(variable.clone());
            mutation.track(Published::Variable(variable.flow_id, Change::Insert(variable)));
        }
        mutation.commit().await
    }

    pub async fn flow_variable_update(&self, ctx: &CallContext, items: Vec<FlowVariableUpdateItem>) -> RpcResult<()> {
        let access = self.access(ctx)?;
        let mut decoded = Vec::with_capacity(items.len());
        for item in &items {
            let patch = FlowVariablePatch { name: opt_name("name", item.name.as_ref())?,
                                            value: item.value.clone(),
                                            enabled: item.enabled,
                                            description: item.description.clone(),
                                            order: item.order };
            decoded.push((parse_id("flow_variable_id", &item.flow_variable_id)?, patch));
        }
        for (id, _) in &decoded {
            access.ensure_variable(*id).await?;
        }

        let mut mutation = self.begin(ctx).await?;
        for (id, patch) in decoded {
            let Some(mut variable) = mutation.tx().get::<FlowVariable>(id).await? else {
                return Err(RpcError::NotFound("flow variable"));
            };
            let (order, rest) = patch.split_order();
            if let Some(order) = order {
                apply_and_track(&mut mutation, &mut variable, order)?;
            }
            if !rest.is_empty() {
                apply_and_track(&mut mutation, &mut variable, rest)?;
            }
        }
        mutation.commit().await
    }

    pub async fn flow_variable_delete(&self, ctx: &CallContext, items: Vec<FlowVariableDeleteItem>) -> RpcResult<()> {
        let access = self.access(ctx)?;
        let ids = items.iter()
                       .map(|item| parse_id("flow_variable_id", &item.flow_variable_id))
                       .collect::<RpcResult<Vec<_>>>()?;
        let mut targets = Vec::new();
        for id in dedup_ids(ids) {
            match access.lookup_variable(id).await? {
                Some(variable) => targets.push(variable),
                None => debug!("flow_variable_delete skip missing variable={id}"),
            }
        }
        if targets.is_empty() {
            return Ok(());
        }

        let mut mutation = self.begin(ctx).await?;
        for variable in targets {
            mutation.tx().delete::<FlowVariable>(variable.id);
            mutation.track(Published::Variable(variable.flow_id, Change::Delete(variable)));
        }
        mutation.commit().await
    }

    pub async fn flow_variable_sync(&self, ctx: &CallContext) -> RpcResult<SyncStream<VariableEvent, FlowVariableSyncItem>> {
        let filter = flow_filter(self.store.clone(), ctx.user()?);
        self.open_sync(ctx,
                       &self.buses.variable,
                       "flow_variable",
                       filter,
                       move || async move {
                           let flows = self.access(ctx)?.accessible_flow_ids().await?;
                           let variables = self.store.list_scoped::<FlowVariable>(&flows).await?;
                           Ok(variables.into_iter().map(Change::Insert).collect())
                       },
                       encode_variable)
            .await
    }
}
