//! Conversión entre la forma de cable (ids en bytes, enums como `i32`) y los
//! tipos del modelo. Todo fallo aquí es `InvalidArgument`.

use flow_core::model::{Union, UnknownEnumValue};
use flow_core::Id;

use crate::error::{RpcError, RpcResult};

/// Id tal como viaja por el cable (16 bytes).
pub type WireId = Vec<u8>;

pub fn wire(id: Id) -> WireId {
    id.to_vec()
}

pub fn wire_opt(id: Option<Id>) -> Option<WireId> {
    id.map(wire)
}

/// Id obligatorio; vacío, mal formado o cero es un error.
pub fn parse_id(field: &str, bytes: &[u8]) -> RpcResult<Id> {
    if bytes.is_empty() {
        return Err(RpcError::invalid(format!("{field} is required")));
    }
    let id = Id::from_bytes(bytes).map_err(|e| RpcError::invalid(format!("{field}: {e}")))?;
    if id.is_zero() {
        return Err(RpcError::invalid(format!("{field} is required")));
    }
    Ok(id)
}

pub fn parse_opt_id(field: &str, bytes: Option<&WireId>) -> RpcResult<Option<Id>> {
    match bytes {
        None => Ok(None),
        Some(b) if b.is_empty() => Ok(None),
        Some(b) => parse_id(field, b).map(Some),
    }
}

/// Id provisto por el cliente o uno nuevo emitido por el servidor.
pub fn given_or_new(field: &str, bytes: Option<&WireId>) -> RpcResult<Id> {
    Ok(parse_opt_id(field, bytes)?.unwrap_or_else(Id::new))
}

pub fn parse_enum<T>(field: &str, value: i32) -> RpcResult<T>
    where T: TryFrom<i32, Error = UnknownEnumValue>
{
    T::try_from(value).map_err(|e| RpcError::invalid(format!("{field}: {e}")))
}

pub fn parse_opt_enum<T>(field: &str, value: Option<i32>) -> RpcResult<Option<T>>
    where T: TryFrom<i32, Error = UnknownEnumValue>
{
    value.map(|v| parse_enum(field, v)).transpose()
}

/// Nombre recortado y no vacío.
pub fn required_name(field: &str, name: &str) -> RpcResult<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(RpcError::invalid(format!("{field} must not be empty")));
    }
    Ok(trimmed.to_string())
}

pub fn opt_name(field: &str, name: Option<&String>) -> RpcResult<Option<String>> {
    name.map(|n| required_name(field, n)).transpose()
}

pub fn parse_union_id(field: &str, value: Option<&Union<WireId>>) -> RpcResult<Option<Union<Id>>> {
    match value {
        None => Ok(None),
        Some(Union::Unset) => Ok(Some(Union::Unset)),
        Some(Union::Value(b)) => parse_id(field, b).map(|id| Some(Union::Value(id))),
    }
}

pub fn wire_union_id(value: &Option<Union<Id>>) -> Option<Union<WireId>> {
    value.as_ref().map(|u| match u {
                          Union::Value(id) => Union::Value(wire(*id)),
                          Union::Unset => Union::Unset,
                      })
}
