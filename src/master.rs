//! Master context
//!
//! An algorithm may supply a [`MasterContext`] whose hooks run on the
//! coordinator between supersteps. The hooks see the global aggregator
//! values and may write to them, which is how multi-phase algorithms switch
//! phases and how convergence tests are expressed.

use serde::Serialize;
use std::any::Any;

use crate::aggregator::AggregatorHandler;
use crate::error::PregelError;

/// Decision returned by the `post_*` hooks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Continuation {
    #[default]
    Continue,
    Stop,
}

impl Continuation {
    pub fn is_stop(&self) -> bool {
        matches!(self, Continuation::Stop)
    }
}

/// Coordinator view passed to master hooks
pub struct MasterScope<'a> {
    pub(crate) global_superstep: u64,
    pub(crate) vertex_count: u64,
    pub(crate) edge_count: u64,
    pub(crate) active_count: u64,
    pub(crate) message_count: u64,
    pub(crate) converged: bool,
    pub(crate) aggregators: &'a mut AggregatorHandler,
}

impl<'a> MasterScope<'a> {
    pub(crate) fn new(aggregators: &'a mut AggregatorHandler, global_superstep: u64) -> Self {
        Self {
            global_superstep,
            vertex_count: 0,
            edge_count: 0,
            active_count: 0,
            message_count: 0,
            converged: false,
            aggregators,
        }
    }

    pub fn global_superstep(&self) -> u64 {
        self.global_superstep
    }

    pub fn vertex_count(&self) -> u64 {
        self.vertex_count
    }

    pub fn edge_count(&self) -> u64 {
        self.edge_count
    }

    /// Vertices left active by the last superstep
    pub fn active_vertex_count(&self) -> u64 {
        self.active_count
    }

    /// Messages sent during the last superstep
    pub fn message_count(&self) -> u64 {
        self.message_count
    }

    /// Every converging aggregator kept its value since the previous superstep
    ///
    /// Always false at superstep 0 and when no converging aggregator is
    /// registered.
    pub fn has_converged(&self) -> bool {
        self.converged
    }

    /// Global aggregator value; `None` if unregistered or of another type
    pub fn aggregated_value<T: Any>(&self, name: &str) -> Option<&T> {
        self.aggregators.aggregated_value(name)
    }

    /// Fold a value into a global aggregator
    pub fn aggregate<T: Any>(&mut self, name: &str, value: &T) {
        self.aggregators.aggregate(name, value);
    }

    /// Overwrite a global aggregator value
    pub fn set_aggregated_value<T: Serialize>(&mut self, name: &str, value: &T) -> Result<(), PregelError> {
        self.aggregators.set_aggregated_value(name, value)
    }
}

/// Coordinator hooks of an algorithm
///
/// Every hook has a default, so implementations override only what they
/// need. Without a master context the job behaves as if this trait were
/// implemented with all defaults.
pub trait MasterContext: Send {
    /// Once, before superstep 0
    fn pre_application(&mut self, _scope: &mut MasterScope<'_>) {}

    /// Before the aggregator values are broadcast for a superstep
    fn pre_global_superstep(&mut self, _scope: &mut MasterScope<'_>) {}

    /// After the workers' aggregator values have been merged
    ///
    /// The default stops once the converging aggregators have settled.
    fn post_global_superstep(&mut self, scope: &mut MasterScope<'_>) -> Continuation {
        if scope.has_converged() {
            Continuation::Stop
        } else {
            Continuation::Continue
        }
    }

    /// Before each compensation round
    fn pre_compensation(&mut self, _scope: &mut MasterScope<'_>) {}

    /// After each compensation round; the default runs a single round
    fn post_compensation(&mut self, _scope: &mut MasterScope<'_>) -> Continuation {
        Continuation::Stop
    }

    /// Once, after the last superstep
    fn post_application(&mut self, _scope: &mut MasterScope<'_>) {}
}

/// Master context with every hook left at its default
#[derive(Debug, Default)]
pub struct DefaultMasterContext;

impl MasterContext for DefaultMasterContext {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::{AggregatorRegistration, OverwriteAggregator};

    struct PhaseMaster;

    impl MasterContext for PhaseMaster {
        fn post_global_superstep(&mut self, scope: &mut MasterScope<'_>) -> Continuation {
            let phase = scope.aggregated_value::<u32>("phase").copied().unwrap_or(0);
            if phase >= 2 {
                return Continuation::Stop;
            }
            scope.aggregate("phase", &(phase + 1));
            Continuation::Continue
        }
    }

    #[test]
    fn test_default_hooks() {
        let mut handler = AggregatorHandler::default();
        let mut scope = MasterScope::new(&mut handler, 0);
        let mut master = DefaultMasterContext;
        assert_eq!(master.post_global_superstep(&mut scope), Continuation::Continue);
        assert!(master.post_compensation(&mut scope).is_stop());

        scope.converged = true;
        assert!(master.post_global_superstep(&mut scope).is_stop());
    }

    #[test]
    fn test_scope_drives_phases() {
        let mut handler = AggregatorHandler::new(vec![AggregatorRegistration::permanent(
            "phase",
            OverwriteAggregator::new(0u32),
        )]);
        let mut master = PhaseMaster;

        let mut decisions = Vec::new();
        for superstep in 0..4 {
            let mut scope = MasterScope::new(&mut handler, superstep);
            decisions.push(master.post_global_superstep(&mut scope));
        }
        assert_eq!(
            decisions,
            vec![
                Continuation::Continue,
                Continuation::Continue,
                Continuation::Stop,
                Continuation::Stop
            ]
        );
        assert_eq!(handler.aggregated_value::<u32>("phase"), Some(&2));
    }

    #[test]
    fn test_scope_set_aggregated_value() {
        let mut handler = AggregatorHandler::new(vec![AggregatorRegistration::transient(
            "label",
            OverwriteAggregator::new(String::new()),
        )]);
        let mut scope = MasterScope::new(&mut handler, 5);
        scope.set_aggregated_value("label", &"done").unwrap();
        assert_eq!(scope.aggregated_value::<String>("label").map(String::as_str), Some("done"));
        assert_eq!(scope.global_superstep(), 5);
    }
}
