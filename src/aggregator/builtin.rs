//! Built-in aggregators

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::any::Any;
use std::collections::BTreeMap;
use std::ops::AddAssign;

use super::Aggregator;
use crate::error::PregelError;
use crate::vertex::PregelId;

fn decode<T: DeserializeOwned>(value: &Value) -> Result<T, PregelError> {
    T::deserialize(value).map_err(|e| PregelError::aggregator(std::any::type_name::<T>(), e.to_string()))
}

fn encode<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

/// Sums contributions; resets to zero
///
/// Local contributions and values decoded from workers are added with
/// `+=`. Integer overflow follows `T`: plain integers panic in debug builds,
/// [`std::num::Wrapping`] wraps.
#[derive(Debug, Clone, Default)]
pub struct SumAggregator<T> {
    value: T,
}

impl<T: Default> SumAggregator<T> {
    pub fn new() -> Self {
        Self { value: T::default() }
    }
}

impl<T> Aggregator for SumAggregator<T>
where
    T: AddAssign + Default + Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    fn aggregate(&mut self, value: &dyn Any) -> bool {
        match value.downcast_ref::<T>() {
            Some(v) => {
                self.value += v.clone();
                true
            }
            None => false,
        }
    }

    fn value(&self) -> &dyn Any {
        &self.value
    }

    fn parse_aggregate(&mut self, value: &Value) -> Result<(), PregelError> {
        self.value += decode::<T>(value)?;
        Ok(())
    }

    fn set_aggregated_value(&mut self, value: &Value) -> Result<(), PregelError> {
        self.value = decode(value)?;
        Ok(())
    }

    fn serialize(&self) -> Value {
        encode(&self.value)
    }

    fn reset(&mut self) {
        self.value = T::default();
    }
}

/// Keeps the smallest contribution; resets to `init`
#[derive(Debug, Clone)]
pub struct MinAggregator<T> {
    init: T,
    value: T,
}

impl<T: Clone> MinAggregator<T> {
    /// `init` should be the identity of `min` for the value type
    pub fn new(init: T) -> Self {
        Self {
            value: init.clone(),
            init,
        }
    }
}

impl<T> MinAggregator<T>
where
    T: PartialOrd,
{
    fn fold(&mut self, candidate: T) {
        if candidate < self.value {
            self.value = candidate;
        }
    }
}

impl<T> Aggregator for MinAggregator<T>
where
    T: PartialOrd + Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    fn aggregate(&mut self, value: &dyn Any) -> bool {
        match value.downcast_ref::<T>() {
            Some(v) => {
                self.fold(v.clone());
                true
            }
            None => false,
        }
    }

    fn value(&self) -> &dyn Any {
        &self.value
    }

    fn parse_aggregate(&mut self, value: &Value) -> Result<(), PregelError> {
        self.fold(decode(value)?);
        Ok(())
    }

    fn set_aggregated_value(&mut self, value: &Value) -> Result<(), PregelError> {
        self.value = decode(value)?;
        Ok(())
    }

    fn serialize(&self) -> Value {
        encode(&self.value)
    }

    fn reset(&mut self) {
        self.value = self.init.clone();
    }
}

/// Keeps the largest contribution; resets to `init`
#[derive(Debug, Clone)]
pub struct MaxAggregator<T> {
    init: T,
    value: T,
}

impl<T: Clone> MaxAggregator<T> {
    /// `init` should be the identity of `max` for the value type
    pub fn new(init: T) -> Self {
        Self {
            value: init.clone(),
            init,
        }
    }
}

impl<T> MaxAggregator<T>
where
    T: PartialOrd,
{
    fn fold(&mut self, candidate: T) {
        if candidate > self.value {
            self.value = candidate;
        }
    }
}

impl<T> Aggregator for MaxAggregator<T>
where
    T: PartialOrd + Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    fn aggregate(&mut self, value: &dyn Any) -> bool {
        match value.downcast_ref::<T>() {
            Some(v) => {
                self.fold(v.clone());
                true
            }
            None => false,
        }
    }

    fn value(&self) -> &dyn Any {
        &self.value
    }

    fn parse_aggregate(&mut self, value: &Value) -> Result<(), PregelError> {
        self.fold(decode(value)?);
        Ok(())
    }

    fn set_aggregated_value(&mut self, value: &Value) -> Result<(), PregelError> {
        self.value = decode(value)?;
        Ok(())
    }

    fn serialize(&self) -> Value {
        encode(&self.value)
    }

    fn reset(&mut self) {
        self.value = self.init.clone();
    }
}

/// Keeps the last contribution; resets to `init`
///
/// Merge order across workers is not defined, so this is meant for values
/// that only one party writes per superstep (typically the master).
#[derive(Debug, Clone)]
pub struct OverwriteAggregator<T> {
    init: T,
    value: T,
}

impl<T: Clone> OverwriteAggregator<T> {
    pub fn new(init: T) -> Self {
        Self {
            value: init.clone(),
            init,
        }
    }
}

impl<T> Aggregator for OverwriteAggregator<T>
where
    T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    fn aggregate(&mut self, value: &dyn Any) -> bool {
        match value.downcast_ref::<T>() {
            Some(v) => {
                self.value = v.clone();
                true
            }
            None => false,
        }
    }

    fn value(&self) -> &dyn Any {
        &self.value
    }

    fn parse_aggregate(&mut self, value: &Value) -> Result<(), PregelError> {
        self.value = decode(value)?;
        Ok(())
    }

    fn set_aggregated_value(&mut self, value: &Value) -> Result<(), PregelError> {
        self.parse_aggregate(value)
    }

    fn serialize(&self) -> Value {
        encode(&self.value)
    }

    fn reset(&mut self) {
        self.value = self.init.clone();
    }
}

/// Logical or of boolean contributions; resets to `false`
#[derive(Debug, Clone, Copy, Default)]
pub struct BoolOrAggregator {
    value: bool,
}

impl BoolOrAggregator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Aggregator for BoolOrAggregator {
    fn aggregate(&mut self, value: &dyn Any) -> bool {
        match value.downcast_ref::<bool>() {
            Some(v) => {
                self.value |= *v;
                true
            }
            None => false,
        }
    }

    fn value(&self) -> &dyn Any {
        &self.value
    }

    fn parse_aggregate(&mut self, value: &Value) -> Result<(), PregelError> {
        self.value |= decode::<bool>(value)?;
        Ok(())
    }

    fn set_aggregated_value(&mut self, value: &Value) -> Result<(), PregelError> {
        self.value = decode(value)?;
        Ok(())
    }

    fn serialize(&self) -> Value {
        Value::Bool(self.value)
    }

    fn reset(&mut self) {
        self.value = false;
    }
}

/// Per-vertex values reduced with `reduce`; resets to the empty map
///
/// Contributions are `(PregelId, T)` pairs. The value is a
/// `BTreeMap<PregelId, T>`.
#[derive(Debug, Clone)]
pub struct KeyedAggregator<T> {
    values: BTreeMap<PregelId, T>,
    reduce: fn(&mut T, T),
}

impl<T> KeyedAggregator<T> {
    pub fn new(reduce: fn(&mut T, T)) -> Self {
        Self {
            values: BTreeMap::new(),
            reduce,
        }
    }

    /// Keep the last value per vertex
    pub fn overwrite() -> Self {
        Self::new(|current, next| *current = next)
    }

    fn fold(&mut self, id: PregelId, value: T) {
        match self.values.get_mut(&id) {
            Some(current) => (self.reduce)(current, value),
            None => {
                self.values.insert(id, value);
            }
        }
    }
}

impl<T: AddAssign> KeyedAggregator<T> {
    /// Sum values per vertex
    pub fn summing() -> Self {
        Self::new(|current, next| *current += next)
    }
}

impl<T: PartialOrd> KeyedAggregator<T> {
    /// Keep the smallest value per vertex
    pub fn min() -> Self {
        Self::new(|current, next| {
            if next < *current {
                *current = next;
            }
        })
    }

    /// Keep the largest value per vertex
    pub fn max() -> Self {
        Self::new(|current, next| {
            if next > *current {
                *current = next;
            }
        })
    }
}

impl<T> Aggregator for KeyedAggregator<T>
where
    T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    fn aggregate(&mut self, value: &dyn Any) -> bool {
        match value.downcast_ref::<(PregelId, T)>() {
            Some((id, v)) => {
                self.fold(id.clone(), v.clone());
                true
            }
            None => false,
        }
    }

    fn value(&self) -> &dyn Any {
        &self.values
    }

    fn parse_aggregate(&mut self, value: &Value) -> Result<(), PregelError> {
        let incoming: BTreeMap<PregelId, T> = decode(value)?;
        for (id, v) in incoming {
            self.fold(id, v);
        }
        Ok(())
    }

    fn set_aggregated_value(&mut self, value: &Value) -> Result<(), PregelError> {
        self.values = decode(value)?;
        Ok(())
    }

    fn serialize(&self) -> Value {
        encode(&self.values)
    }

    fn reset(&mut self) {
        self.values.clear();
    }
}
