//! Instancias de bus compartidas por todos los handlers.
//!
//! Un bus ausente (`None`) hace que las suscripciones a él fallen con
//! `Unavailable`; las publicaciones hacia él se omiten.
//!
//! `gate` ordena commits contra aperturas de sync: un commit retiene la
//! compuerta compartida desde `apply` hasta terminar de publicar, y abrir un
//! sync la toma en exclusiva mientras registra la suscripción y arma el
//! snapshot. Así una fila entra por el snapshot o por el evento en vivo,
//! nunca por ambos.

use std::sync::Arc;

use log::debug;
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use flow_core::event::{EdgeEvent, ExecutionEvent, FlowEvent, FlowVersionEvent, HttpResponseEvent, NodeEvent, Streamer, VariableEvent};
use flow_core::Id;

use crate::error::{RpcError, RpcResult};

pub type Bus<E> = Arc<Streamer<Id, E>>;

#[derive(Clone, Default)]
pub struct Buses {
    /// Tópico = workspace.
    pub flow: Option<Bus<FlowEvent>>,
    /// Tópico = flow padre.
    pub version: Option<Bus<FlowVersionEvent>>,
    /// Tópico = flow. Nodos base y sub-filas.
    pub node: Option<Bus<NodeEvent>>,
    /// Tópico = flow.
    pub edge: Option<Bus<EdgeEvent>>,
    /// Tópico = flow.
    pub variable: Option<Bus<VariableEvent>>,
    /// Tópico = flow del nodo ejecutado.
    pub execution: Option<Bus<ExecutionEvent>>,
    /// Tópico = workspace.
    pub response: Option<Bus<HttpResponseEvent>>,
    gate: Arc<RwLock<()>>,
}

impl Buses {
    /// Todos los buses, con cola por suscriptor acotada a `capacity`.
    pub fn new(capacity: usize) -> Self {
        Self { flow: Some(Arc::new(Streamer::new("flow", capacity))),
               version: Some(Arc::new(Streamer::new("flow_version", capacity))),
               node: Some(Arc::new(Streamer::new("node", capacity))),
               edge: Some(Arc::new(Streamer::new("edge", capacity))),
               variable: Some(Arc::new(Streamer::new("flow_variable", capacity))),
               execution: Some(Arc::new(Streamer::new("node_execution", capacity))),
               response: Some(Arc::new(Streamer::new("http_response", capacity))),
               gate: Arc::default() }
    }

    pub(crate) async fn commit_gate(&self) -> RwLockReadGuard<'_, ()> {
        self.gate.read().await
    }

    pub(crate) async fn subscribe_gate(&self) -> RwLockWriteGuard<'_, ()> {
        self.gate.write().await
    }

    pub async fn publish(&self, event: Published) {
        match event {
            Published::Flow(topic, e) => offer(&self.flow, topic, e).await,
            Published::Version(topic, e) => offer(&self.version, topic, e).await,
            Published::Node(topic, e) => offer(&self.node, topic, e).await,
            Published::Edge(topic, e) => offer(&self.edge, topic, e).await,
            Published::Variable(topic, e) => offer(&self.variable, topic, e).await,
            Published::Execution(topic, e) => offer(&self.execution, topic, e).await,
            Published::Response(topic, e) => offer(&self.response, topic, e).await,
        }
    }
}

async fn offer<E>(bus: &Option<Bus<E>>, topic: Id, event: E)
    where E: Clone + Send + Sync + 'static
{
    match bus {
        Some(bus) => bus.publish(topic, event).await,
        None => debug!("publish skipped: bus not configured topic={topic}"),
    }
}

/// Devuelve el bus o `Unavailable`.
pub fn require<'a, E>(bus: &'a Option<Bus<E>>, name: &str) -> RpcResult<&'a Bus<E>> {
    bus.as_ref()
       .ok_or_else(|| RpcError::Unavailable(format!("{name} stream not configured")))
}

/// Evento pendiente de publicación, con su tópico.
#[derive(Debug, Clone)]
pub enum Published {
    Flow(Id, FlowEvent),
    Version(Id, FlowVersionEvent),
    Node(Id, NodeEvent),
    Edge(Id, EdgeEvent),
    Variable(Id, VariableEvent),
    Execution(Id, ExecutionEvent),
    Response(Id, HttpResponseEvent),
}
