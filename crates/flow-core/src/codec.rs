//! Compresión y decodificación de los blobs de entrada/salida de ejecuciones.

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use serde_json::Value;
use thiserror::Error;

use crate::model::Compression;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("zlib: {0}")]
    Zlib(#[from] std::io::Error),
}

pub fn compress(data: &[u8], compression: Compression) -> Result<Vec<u8>, CodecError> {
    match compression {
        Compression::None => Ok(data.to_vec()),
        Compression::Zlib => {
            let mut encoder = ZlibEncoder::new(Vec::new(), flate2::Compression::default());
            encoder.write_all(data)?;
            Ok(encoder.finish()?)
        }
    }
}

pub fn decompress(data: &[u8], compression: Compression) -> Result<Vec<u8>, CodecError> {
    match compression {
        Compression::None => Ok(data.to_vec()),
        Compression::Zlib => {
            let mut out = Vec::new();
            ZlibDecoder::new(data).read_to_end(&mut out)?;
            Ok(out)
        }
    }
}

/// Decodifica un blob JSON de ejecución.
///
/// Los productores a veces guardan el JSON serializado dos veces (un string
/// que contiene JSON). Si el primer parseo produce un string, se intenta un
/// segundo parseo; si éste falla se conserva el string. Un blob vacío es
/// `Null`; uno que no es JSON se entrega como string.
pub fn decode_json_blob(data: &[u8], compression: Compression) -> Result<Value, CodecError> {
    let raw = decompress(data, compression)?;
    if raw.is_empty() {
        return Ok(Value::Null);
    }
    let first: Value = match serde_json::from_slice(&raw) {
        Ok(v) => v,
        Err(_) => return Ok(Value::String(String::from_utf8_lossy(&raw).into_owned())),
    };
    if let Value::String(inner) = &first {
        if let Ok(second) = serde_json::from_str::<Value>(inner) {
            return Ok(second);
        }
    }
    Ok(first)
}
