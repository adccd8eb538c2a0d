//! Global aggregators
//!
//! Aggregators are named, globally reduced values. During a superstep each
//! worker reduces its vertices' contributions into a local
//! [`AggregatorHandler`]. At the barrier the master merges the local values
//! into its global handler and broadcasts the result, which vertices read
//! during the next superstep.
//!
//! Two lifetimes exist:
//! - *transient* values are reset at the start of every superstep
//! - *permanent* values are never reset, only updated
//!
//! # Example
//!
//! ```ignore
//! fn aggregators(&self) -> Vec<AggregatorRegistration> {
//!     vec![
//!         AggregatorRegistration::transient("changed", BoolOrAggregator::new()),
//!         AggregatorRegistration::permanent("rounds", SumAggregator::<u64>::new()),
//!     ]
//! }
//! ```

mod builtin;

pub use builtin::{
    BoolOrAggregator, KeyedAggregator, MaxAggregator, MinAggregator, OverwriteAggregator,
    SumAggregator,
};

use serde::Serialize;
use serde_json::{Map, Value};
use std::any::Any;
use std::collections::{BTreeMap, BTreeSet};

use crate::error::PregelError;

/// A reducible value with a JSON wire representation
///
/// Implementations are object safe so that algorithms can register
/// aggregators of different value types under one handler.
pub trait Aggregator: Send + Sync {
    /// Fold one contribution into the value
    ///
    /// Returns `false` if `value` has the wrong type; it is then ignored.
    fn aggregate(&mut self, value: &dyn Any) -> bool;

    /// Current value, downcast with [`AggregatorHandler::aggregated_value`]
    fn value(&self) -> &dyn Any;

    /// Fold a serialized contribution into the value
    fn parse_aggregate(&mut self, value: &Value) -> Result<(), PregelError>;

    /// Replace the value with a serialized one
    fn set_aggregated_value(&mut self, value: &Value) -> Result<(), PregelError>;

    /// Serialize the current value
    fn serialize(&self) -> Value;

    /// Return to the initial value
    fn reset(&mut self);

    /// Check if the job may terminate once this value stops changing
    fn is_converging(&self) -> bool {
        false
    }
}

/// Wrapper that makes an aggregator permanent: `reset()` does nothing
pub struct Permanent<A>(pub A);

impl<A: Aggregator> Aggregator for Permanent<A> {
    fn aggregate(&mut self, value: &dyn Any) -> bool {
        self.0.aggregate(value)
    }

    fn value(&self) -> &dyn Any {
        self.0.value()
    }

    fn parse_aggregate(&mut self, value: &Value) -> Result<(), PregelError> {
        self.0.parse_aggregate(value)
    }

    fn set_aggregated_value(&mut self, value: &Value) -> Result<(), PregelError> {
        self.0.set_aggregated_value(value)
    }

    fn serialize(&self) -> Value {
        self.0.serialize()
    }

    fn reset(&mut self) {}

    fn is_converging(&self) -> bool {
        self.0.is_converging()
    }
}

/// Wrapper that marks an aggregator as converging
///
/// When every converging aggregator keeps the same global value over two
/// consecutive supersteps, [`MasterScope::has_converged`] reports it to the
/// master, whose default hook then stops the job.
///
/// [`MasterScope::has_converged`]: crate::master::MasterScope::has_converged
pub struct Converging<A>(pub A);

impl<A: Aggregator> Aggregator for Converging<A> {
    fn aggregate(&mut self, value: &dyn Any) -> bool {
        self.0.aggregate(value)
    }

    fn value(&self) -> &dyn Any {
        self.0.value()
    }

    fn parse_aggregate(&mut self, value: &Value) -> Result<(), PregelError> {
        self.0.parse_aggregate(value)
    }

    fn set_aggregated_value(&mut self, value: &Value) -> Result<(), PregelError> {
        self.0.set_aggregated_value(value)
    }

    fn serialize(&self) -> Value {
        self.0.serialize()
    }

    fn reset(&mut self) {
        self.0.reset()
    }

    fn is_converging(&self) -> bool {
        true
    }
}

/// Lifetime of a registered aggregator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregatorLifetime {
    Transient,
    Permanent,
}

/// One named aggregator as declared by an algorithm
pub struct AggregatorRegistration {
    name: String,
    lifetime: AggregatorLifetime,
    aggregator: Box<dyn Aggregator>,
}

impl AggregatorRegistration {
    /// Register an aggregator reset at the start of each superstep
    pub fn transient(name: impl Into<String>, aggregator: impl Aggregator + 'static) -> Self {
        Self {
            name: name.into(),
            lifetime: AggregatorLifetime::Transient,
            aggregator: Box::new(aggregator),
        }
    }

    /// Register an aggregator that keeps its value for the whole job
    pub fn permanent(name: impl Into<String>, aggregator: impl Aggregator + 'static) -> Self {
        Self {
            name: name.into(),
            lifetime: AggregatorLifetime::Permanent,
            aggregator: Box::new(Permanent(aggregator)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn lifetime(&self) -> AggregatorLifetime {
        self.lifetime
    }
}

/// Named aggregators of one scope (a worker's local values or the master's
/// global values)
#[derive(Default)]
pub struct AggregatorHandler {
    transient: BTreeMap<String, Box<dyn Aggregator>>,
    permanent: BTreeMap<String, Box<dyn Aggregator>>,
    /// Names aggregated into since the last reset
    touched: BTreeSet<String>,
}

impl AggregatorHandler {
    /// Build a handler from an algorithm's registrations
    pub fn new(registrations: Vec<AggregatorRegistration>) -> Self {
        let mut handler = Self::default();
        for registration in registrations {
            let store = match registration.lifetime {
                AggregatorLifetime::Transient => &mut handler.transient,
                AggregatorLifetime::Permanent => &mut handler.permanent,
            };
            store.insert(registration.name, registration.aggregator);
        }
        handler
    }

    fn get(&self, name: &str) -> Option<&dyn Aggregator> {
        self.transient
            .get(name)
            .or_else(|| self.permanent.get(name))
            .map(|a| a.as_ref())
    }

    fn get_mut(&mut self, name: &str) -> Option<&mut Box<dyn Aggregator>> {
        match self.transient.get_mut(name) {
            Some(aggregator) => Some(aggregator),
            None => self.permanent.get_mut(name),
        }
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.transient.is_empty() && self.permanent.is_empty()
    }

    /// Registered names, transient first
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.transient.keys().chain(self.permanent.keys()).map(String::as_str)
    }

    /// Typed read; `None` if unregistered or of another type
    pub fn aggregated_value<T: Any>(&self, name: &str) -> Option<&T> {
        self.get(name)?.value().downcast_ref::<T>()
    }

    /// Fold a contribution into a named aggregator
    ///
    /// Unknown names and wrongly typed values are ignored with a warning.
    pub fn aggregate<T: Any>(&mut self, name: &str, value: &T) {
        let accepted = match self.get_mut(name) {
            Some(aggregator) => aggregator.aggregate(value),
            None => {
                tracing::warn!(aggregator = name, "Aggregate into unregistered aggregator");
                return;
            }
        };
        if accepted {
            if !self.touched.contains(name) {
                self.touched.insert(name.to_string());
            }
        } else {
            tracing::warn!(
                aggregator = name,
                value_type = std::any::type_name::<T>(),
                "Aggregate with wrong value type ignored"
            );
        }
    }

    /// Overwrite a named value
    pub fn set_aggregated_value<T: Serialize>(&mut self, name: &str, value: &T) -> Result<(), PregelError> {
        let json = serde_json::to_value(value)
            .map_err(|e| PregelError::aggregator(name, e.to_string()))?;
        let aggregator = self
            .get_mut(name)
            .ok_or_else(|| PregelError::aggregator(name, "not registered"))?;
        aggregator.set_aggregated_value(&json)?;
        self.touched.insert(name.to_string());
        Ok(())
    }

    /// Reset transient values; permanent values are kept
    pub fn reset_values(&mut self) {
        for aggregator in self.transient.values_mut() {
            aggregator.reset();
        }
        self.touched.clear();
    }

    /// Serialize every value as `{name: value}`
    pub fn serialize_values(&self) -> Value {
        let mut map = Map::new();
        for name in self.names() {
            if let Some(aggregator) = self.get(name) {
                map.insert(name.to_string(), aggregator.serialize());
            }
        }
        Value::Object(map)
    }

    /// Serialize only the values aggregated into since the last reset
    ///
    /// This is what a worker reports to the master: untouched aggregators
    /// carry no contribution.
    pub fn serialize_contributions(&self) -> Value {
        let mut map = Map::new();
        for name in &self.touched {
            if let Some(aggregator) = self.get(name) {
                map.insert(name.clone(), aggregator.serialize());
            }
        }
        Value::Object(map)
    }

    /// Merge serialized contributions from another scope
    pub fn parse_values(&mut self, values: &Value) -> Result<(), PregelError> {
        let map = values
            .as_object()
            .ok_or_else(|| PregelError::aggregator("*", "aggregator values must be an object"))?;
        for (name, value) in map {
            match self.get_mut(name) {
                Some(aggregator) => aggregator.parse_aggregate(value)?,
                None => {
                    tracing::warn!(aggregator = %name, "Ignoring value of unregistered aggregator");
                    continue;
                }
            }
            self.touched.insert(name.clone());
        }
        Ok(())
    }

    /// Replace values with serialized ones (master to worker broadcast)
    pub fn set_values(&mut self, values: &Value) -> Result<(), PregelError> {
        let map = values
            .as_object()
            .ok_or_else(|| PregelError::aggregator("*", "aggregator values must be an object"))?;
        for (name, value) in map {
            if let Some(aggregator) = self.get_mut(name) {
                aggregator.set_aggregated_value(value)?;
            }
        }
        Ok(())
    }

    /// Check if any converging aggregator is registered
    pub fn has_converging(&self) -> bool {
        self.transient
            .values()
            .chain(self.permanent.values())
            .any(|a| a.is_converging())
    }

    /// Serialized values of the converging aggregators, if any are registered
    pub fn converging_values(&self) -> Option<Value> {
        if !self.has_converging() {
            return None;
        }
        let map: Map<String, Value> = self
            .transient
            .iter()
            .chain(self.permanent.iter())
            .filter(|(_, a)| a.is_converging())
            .map(|(name, a)| (name.clone(), a.serialize()))
            .collect();
        Some(Value::Object(map))
    }
}

impl std::fmt::Debug for AggregatorHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AggregatorHandler")
            .field("values", &self.serialize_values())
            .finish()
    }
}
