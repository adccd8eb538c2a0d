//! Storage and wire formats
//!
//! [`GraphFormat`] sits at the storage boundary: it turns opaque vertex and
//! edge documents into algorithm values and builds the result document for
//! each vertex. [`MessageFormat`] sits at the wire boundary: it encodes
//! messages into the JSON batches exchanged between workers.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::marker::PhantomData;

use crate::error::PregelError;
use crate::vertex::PregelId;

/// Converts messages to and from their wire representation
pub trait MessageFormat<M>: Send + Sync {
    /// Decode one message from the wire
    fn unwrap_value(&self, value: &Value) -> Result<M, PregelError>;

    /// Encode one message for the wire
    fn add_value(&self, message: &M) -> Result<Value, PregelError>;
}

/// serde_json based message format; the default for every algorithm
pub struct JsonMessageFormat<M> {
    _marker: PhantomData<fn() -> M>,
}

impl<M> JsonMessageFormat<M> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<M> Default for JsonMessageFormat<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> MessageFormat<M> for JsonMessageFormat<M>
where
    M: Serialize + DeserializeOwned,
{
    fn unwrap_value(&self, value: &Value) -> Result<M, PregelError> {
        M::deserialize(value).map_err(|e| PregelError::message_decode(e.to_string()))
    }

    fn add_value(&self, message: &M) -> Result<Value, PregelError> {
        serde_json::to_value(message).map_err(|e| PregelError::message_decode(e.to_string()))
    }
}

/// Converts stored documents into algorithm values and back
pub trait GraphFormat<V, E>: Send + Sync {
    /// Build the initial vertex value from its stored document
    fn copy_vertex_data(&self, id: &PregelId, document: &Value) -> Result<V, PregelError>;

    /// Build an edge value from its stored document
    fn copy_edge_data(&self, document: &Value) -> Result<E, PregelError>;

    /// Build the result document written back for a vertex
    fn build_vertex_document(&self, id: &PregelId, data: &V) -> Value;
}

/// Graph format that (de)serializes values with serde
///
/// A `null` document yields `Default::default()`.
pub struct JsonGraphFormat<V, E> {
    _marker: PhantomData<fn() -> (V, E)>,
}

impl<V, E> JsonGraphFormat<V, E> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<V, E> Default for JsonGraphFormat<V, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V, E> GraphFormat<V, E> for JsonGraphFormat<V, E>
where
    V: Serialize + DeserializeOwned + Default,
    E: DeserializeOwned + Default,
{
    fn copy_vertex_data(&self, id: &PregelId, document: &Value) -> Result<V, PregelError> {
        if document.is_null() {
            return Ok(V::default());
        }
        V::deserialize(document).map_err(|e| PregelError::vertex_decode(id.clone(), e.to_string()))
    }

    fn copy_edge_data(&self, document: &Value) -> Result<E, PregelError> {
        if document.is_null() {
            return Ok(E::default());
        }
        E::deserialize(document).map_err(|e| PregelError::graph_load(e.to_string()))
    }

    fn build_vertex_document(&self, _id: &PregelId, data: &V) -> Value {
        serde_json::to_value(data).unwrap_or(Value::Null)
    }
}
