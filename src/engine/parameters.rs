//! Parameter control.
//!
//! Values are clamped against the parameter's range before they are stored,
//! then dispatched to the backend through a capability map built once per
//! node instance from its template. Continuous controls are never written in
//! place: they are scheduled on the backend clock with a short exponential
//! approach so edits made during playback do not click.

use std::collections::HashMap;
use std::f32::consts::PI;
use std::fmt;

use crate::dsp::ParamBinding;
use crate::error::{GraphError, Result};
use crate::graph::{Node, NodeTemplate};

use super::backend::{AudioBackend, BackendError, UnitHandle};
use super::buffer_pool::BufferPool;

/// Length of generated waveshaping curves.
pub const CURVE_LENGTH: usize = 4096;

/// What a setter needs to reach the backend.
pub struct ControlContext<'a> {
    pub backend: &'a mut dyn AudioBackend,
    pub pool: &'a mut BufferPool,
    /// Backend time the write takes effect at.
    pub now: f64,
    /// Time constant of scheduled ramps, in seconds.
    pub time_constant: f64,
}

impl<'a> ControlContext<'a> {
    /// Creates a context timestamped at the backend's current time.
    pub fn new(
        backend: &'a mut dyn AudioBackend,
        pool: &'a mut BufferPool,
        time_constant: f64,
    ) -> Self {
        let now = backend.current_time();
        Self {
            backend,
            pool,
            now,
            time_constant,
        }
    }
}

/// Writes one parameter value to a backend unit.
pub type ParamSetter = Box<dyn Fn(&mut ControlContext<'_>, f32) -> std::result::Result<(), BackendError>>;

/// Parameter id to setter, for one node instance.
#[derive(Default)]
pub struct CapabilityMap {
    setters: HashMap<&'static str, ParamSetter>,
}

impl CapabilityMap {
    /// Builds the setters for every backend-bound parameter of a template.
    pub fn for_template(unit: UnitHandle, template: &NodeTemplate) -> Self {
        let mut setters: HashMap<&'static str, ParamSetter> = HashMap::new();
        for def in &template.parameters {
            let setter: ParamSetter = match def.binding {
                ParamBinding::AudioParam(param) => Box::new(move |ctx: &mut ControlContext<'_>, value: f32| {
                    ctx.backend
                        .schedule_value(unit, param, value, ctx.now, ctx.time_constant)
                }),
                ParamBinding::Property(property) => {
                    Box::new(move |ctx: &mut ControlContext<'_>, value: f32| {
                        ctx.backend.set_property(unit, property, value)
                    })
                }
                ParamBinding::Curve => Box::new(move |ctx: &mut ControlContext<'_>, value: f32| {
                    let curve = distortion_curve(ctx.pool, value);
                    let result = ctx.backend.set_curve(unit, &curve);
                    ctx.pool.release(curve);
                    result
                }),
            };
            setters.insert(def.id, setter);
        }
        Self { setters }
    }

    /// Runs the setter for a parameter. Returns `None` if the parameter has
    /// no backend target.
    pub fn apply(
        &self,
        parameter: &str,
        ctx: &mut ControlContext<'_>,
        value: f32,
    ) -> Option<std::result::Result<(), BackendError>> {
        self.setters.get(parameter).map(|setter| setter(ctx, value))
    }

    pub fn contains(&self, parameter: &str) -> bool {
        self.setters.contains_key(parameter)
    }

    pub fn len(&self) -> usize {
        self.setters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.setters.is_empty()
    }
}

impl fmt::Debug for CapabilityMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<_> = self.setters.keys().collect();
        keys.sort();
        f.debug_struct("CapabilityMap").field("parameters", &keys).finish()
    }
}

/// How a parameter write reached the backend.
#[derive(Clone, Debug, PartialEq)]
pub enum Dispatch {
    /// No backend unit took the write; only the model changed.
    Detached,
    /// The backend accepted the write.
    Sent,
    /// The backend refused the write. The model keeps the value.
    Failed(BackendError),
}

/// Result of a parameter write.
#[derive(Clone, Debug, PartialEq)]
pub struct ParameterWrite {
    /// The stored value after clamping.
    pub applied: f32,
    pub dispatch: Dispatch,
}

/// Validates, clamps and dispatches parameter writes.
pub struct ParameterController;

impl ParameterController {
    /// Clamps `value` into the parameter's range and stores it on the node.
    /// Choice parameters are rounded to the nearest whole index.
    ///
    /// Non-finite values are rejected and the stored value is kept.
    pub fn store(node: &mut Node, parameter_id: &str, value: f32) -> Result<f32> {
        let node_id = node.id;
        let param = node
            .parameter_mut(parameter_id)
            .ok_or_else(|| GraphError::ParameterNotFound {
                node: node_id,
                parameter: parameter_id.to_string(),
            })?;
        if !value.is_finite() {
            return Err(GraphError::InvalidParameterValue {
                parameter: parameter_id.to_string(),
                value,
            });
        }
        param.value = param.constrain(value);
        Ok(param.value)
    }

    /// Stores a value and, when the node is live, sends it to the backend.
    pub fn set_parameter(
        node: &mut Node,
        parameter_id: &str,
        value: f32,
        capabilities: Option<&CapabilityMap>,
        ctx: &mut ControlContext<'_>,
    ) -> Result<ParameterWrite> {
        let applied = Self::store(node, parameter_id, value)?;

        let dispatch = match capabilities {
            None => Dispatch::Detached,
            Some(map) => match map.apply(parameter_id, ctx, applied) {
                None => Dispatch::Detached,
                Some(Ok(())) => Dispatch::Sent,
                Some(Err(err)) => {
                    tracing::warn!(
                        "parameter write {}.{} = {} refused by backend: {}",
                        node.id,
                        parameter_id,
                        applied,
                        err
                    );
                    Dispatch::Failed(err)
                }
            },
        };

        Ok(ParameterWrite { applied, dispatch })
    }
}

/// Generates a waveshaping curve for the given drive amount.
///
/// The buffer comes from the pool; the caller releases it when done.
pub fn distortion_curve(pool: &mut BufferPool, amount: f32) -> Vec<f32> {
    let mut curve = pool.acquire(CURVE_LENGTH);
    let k = amount.max(0.0);
    let deg = PI / 180.0;
    let last = (CURVE_LENGTH - 1) as f32;
    for (i, sample) in curve.iter_mut().enumerate() {
        let x = i as f32 * 2.0 / last - 1.0;
        *sample = (3.0 + k) * x * 20.0 * deg / (PI + k * x.abs());
    }
    curve
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::backend::{BackendStatus, UnitKind};
    use crate::engine::headless::{Fault, HeadlessBackend};
    use crate::graph::{builtin_template, NodeId, NodeType, Position};
    use approx::assert_relative_eq;

    fn setup(node_type: NodeType) -> (HeadlessBackend, Node, UnitHandle, CapabilityMap) {
        let template = builtin_template(node_type);
        let mut backend = HeadlessBackend::new();
        backend.initialize(44100, 512).unwrap();
        let unit = backend.create_unit(template.unit_kind).unwrap();
        let node = Node::from_template(NodeId(1), &template, Position::default());
        let caps = CapabilityMap::for_template(unit, &template);
        (backend, node, unit, caps)
    }

    #[test]
    fn test_clamps_to_range() {
        let (mut backend, mut node, _, caps) = setup(NodeType::Filter);
        let mut pool = BufferPool::default();
        let mut ctx = ControlContext::new(&mut backend, &mut pool, 0.01);

        let low = ParameterController::set_parameter(&mut node, "frequency", 1.0, Some(&caps), &mut ctx)
            .unwrap();
        assert_eq!(low.applied, 20.0);
        let high =
            ParameterController::set_parameter(&mut node, "frequency", 1e9, Some(&caps), &mut ctx)
                .unwrap();
        assert_eq!(high.applied, 20000.0);
        assert_eq!(node.parameter("frequency").unwrap().value, 20000.0);
    }

    #[test]
    fn test_unknown_parameter() {
        let (_, mut node, _, _) = setup(NodeType::Gain);
        let err = ParameterController::store(&mut node, "cutoff", 1.0).unwrap_err();
        assert!(matches!(err, GraphError::ParameterNotFound { .. }));
    }

    #[test]
    fn test_non_finite_rejected() {
        let (_, mut node, _, _) = setup(NodeType::Gain);
        let err = ParameterController::store(&mut node, "gain", f32::NAN).unwrap_err();
        assert!(matches!(err, GraphError::InvalidParameterValue { .. }));
        assert_eq!(node.parameter("gain").unwrap().value, 1.0);
    }

    #[test]
    fn test_automatable_is_scheduled() {
        let (mut backend, mut node, unit, caps) = setup(NodeType::Oscillator);
        backend.advance(1.0);
        let mut pool = BufferPool::default();
        let mut ctx = ControlContext::new(&mut backend, &mut pool, 0.01);
        assert_relative_eq!(ctx.now, 1.0);

        let write =
            ParameterController::set_parameter(&mut node, "frequency", 880.0, Some(&caps), &mut ctx)
                .unwrap();
        assert_eq!(write.dispatch, Dispatch::Sent);
        assert_eq!(backend.unit(unit).unwrap().params.get("frequency"), Some(&880.0));
    }

    #[test]
    fn test_choice_is_property() {
        let (mut backend, mut node, unit, caps) = setup(NodeType::Oscillator);
        let mut pool = BufferPool::default();
        let mut ctx = ControlContext::new(&mut backend, &mut pool, 0.01);
        ParameterController::set_parameter(&mut node, "waveform", 2.0, Some(&caps), &mut ctx)
            .unwrap();
        assert_eq!(backend.unit(unit).unwrap().properties.get("type"), Some(&2.0));
    }

    #[test]
    fn test_choice_rounds_to_whole_index() {
        let (mut backend, mut node, unit, caps) = setup(NodeType::Oscillator);
        let mut pool = BufferPool::default();
        let mut ctx = ControlContext::new(&mut backend, &mut pool, 0.01);
        let write =
            ParameterController::set_parameter(&mut node, "waveform", 1.7, Some(&caps), &mut ctx)
                .unwrap();
        assert_eq!(write.applied, 2.0);
        assert_eq!(node.parameter("waveform").unwrap().value, 2.0);
        assert_eq!(backend.unit(unit).unwrap().properties.get("type"), Some(&2.0));

        // Continuous parameters keep their fraction.
        let mut ctx = ControlContext::new(&mut backend, &mut pool, 0.01);
        let write =
            ParameterController::set_parameter(&mut node, "detune", 12.5, Some(&caps), &mut ctx)
                .unwrap();
        assert_eq!(write.applied, 12.5);
    }

    #[test]
    fn test_curve_uses_pool() {
        let (mut backend, mut node, unit, caps) = setup(NodeType::Distortion);
        let mut pool = BufferPool::default();
        {
            let mut ctx = ControlContext::new(&mut backend, &mut pool, 0.01);
            ParameterController::set_parameter(&mut node, "amount", 50.0, Some(&caps), &mut ctx)
                .unwrap();
            ParameterController::set_parameter(&mut node, "amount", 60.0, Some(&caps), &mut ctx)
                .unwrap();
        }
        assert_eq!(backend.unit(unit).unwrap().curve.len(), CURVE_LENGTH);
        let stats = pool.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.in_use, 0);
    }

    #[test]
    fn test_detached_node_only_stores() {
        let (mut backend, mut node, _, _) = setup(NodeType::Delay);
        let mut pool = BufferPool::default();
        let mut ctx = ControlContext::new(&mut backend, &mut pool, 0.01);
        let write =
            ParameterController::set_parameter(&mut node, "time", 1.5, None, &mut ctx).unwrap();
        assert_eq!(write.dispatch, Dispatch::Detached);
        assert_eq!(node.parameter("time").unwrap().value, 1.5);
    }

    #[test]
    fn test_refused_write_keeps_model_value() {
        let (mut backend, mut node, _, caps) = setup(NodeType::Gain);
        backend.inject_fault(Fault::ScheduleValue);
        let mut pool = BufferPool::default();
        let mut ctx = ControlContext::new(&mut backend, &mut pool, 0.01);
        let write =
            ParameterController::set_parameter(&mut node, "gain", 0.25, Some(&caps), &mut ctx)
                .unwrap();
        assert!(matches!(write.dispatch, Dispatch::Failed(_)));
        assert_eq!(node.parameter("gain").unwrap().value, 0.25);
        assert_eq!(backend.status(), BackendStatus::Suspended);
    }

    #[test]
    fn test_capabilities_follow_template() {
        let template = builtin_template(NodeType::Compressor);
        let caps = CapabilityMap::for_template(UnitHandle(1), &template);
        assert_eq!(caps.len(), template.parameters.len());
        assert!(caps.contains("threshold"));
        assert!(!caps.contains("frequency"));
        assert_eq!(UnitKind::Compressor, template.unit_kind);
    }

    #[test]
    fn test_distortion_curve_shape() {
        let mut pool = BufferPool::default();
        let curve = distortion_curve(&mut pool, 20.0);
        assert_eq!(curve.len(), CURVE_LENGTH);
        assert_relative_eq!(curve[0], -curve[CURVE_LENGTH - 1], epsilon = 1e-6);
        assert!(curve.windows(2).all(|w| w[0] <= w[1]));
    }
}
