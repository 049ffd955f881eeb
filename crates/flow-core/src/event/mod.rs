//! Eventos de cambio y bus tipado por tópico.

mod bus;
mod types;

pub use bus::{Admission, AllowAll, Delivery, Memoized, Streamer, Subscription, TopicFilter};
pub use types::{Change, EdgeEvent, ExecutionEvent, FlowEvent, FlowVersionEvent, HttpResponseEvent, NodeEvent, VariableEvent};
