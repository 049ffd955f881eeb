//! Enumeraciones con representación numérica estable en el cable.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{value} is not a valid {name}")]
pub struct UnknownEnumValue {
    pub name: &'static str,
    pub value: i32,
}

/// Declara un enum `#[repr(i32)]` con conversión validada desde `i32`.
macro_rules! wire_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident = $value:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
        #[repr(i32)]
        pub enum $name {
            #[default]
            $($variant = $value),+
        }

        impl $name {
            pub fn as_i32(self) -> i32 {
                self as i32
            }
        }

        impl TryFrom<i32> for $name {
            type Error = UnknownEnumValue;

            fn try_from(value: i32) -> Result<Self, Self::Error> {
                match value {
                    $($value => Ok(Self::$variant),)+
                    other => Err(UnknownEnumValue { name: stringify!($name), value: other }),
                }
            }
        }
    };
}

wire_enum! {
    /// Tipo de nodo. Fijado en la creación.
    NodeKind {
        Unspecified = 0,
        NoOp = 1,
        Http = 2,
        Condition = 3,
        For = 4,
        ForEach = 5,
        JavaScript = 6,
        Graphql = 7,
        AiProvider = 8,
        AiModel = 9,
        AiMemory = 10,
    }
}

wire_enum! {
    /// Estado transitorio de ejecución de nodos y aristas.
    NodeState {
        Unspecified = 0,
        Running = 1,
        Success = 2,
        Failure = 3,
        Canceled = 4,
    }
}

wire_enum! {
    NoOpKind {
        Unspecified = 0,
        Start = 1,
        Create = 2,
        Then = 3,
        Else = 4,
        Loop = 5,
    }
}

wire_enum! {
    /// Política ante errores dentro de un bucle.
    ErrorHandling {
        Unspecified = 0,
        Ignore = 1,
        Break = 2,
    }
}

wire_enum! {
    /// Puerto de salida del nodo origen de una arista.
    HandleKind {
        Unspecified = 0,
        Then = 1,
        Else = 2,
        Loop = 3,
        AiProvider = 4,
        AiMemory = 5,
        AiTools = 6,
    }
}

wire_enum! {
    AiModelKind {
        Unspecified = 0,
        Gpt4o = 1,
        Gpt4oMini = 2,
        ClaudeSonnet = 3,
        ClaudeHaiku = 4,
        Gemini = 5,
        Custom = 6,
    }
}

wire_enum! {
    MemoryType {
        Unspecified = 0,
        WindowBuffer = 1,
    }
}

wire_enum! {
    /// Compresión aplicada a los blobs de entrada/salida de ejecuciones.
    Compression {
        None = 0,
        Zlib = 1,
    }
}
