//! Constantes compartidas por el core.

/// Cota por defecto de la cola de cada suscriptor del bus.
pub const DEFAULT_SUBSCRIBER_BUFFER: usize = 64;

/// Nombre del nodo semilla creado junto con cada flow.
pub const START_NODE_NAME: &str = "Start";

/// Prefijo del nombre de un flow duplicado.
pub const DUPLICATE_PREFIX: &str = "Copy of ";
