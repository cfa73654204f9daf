use super::compiled_plan::{CompiledPlan, PlanStats, PlannedInput, PlannedNode};
use super::component::{Component, ComponentKind, OutputContext};
use super::error::{PipelineError, PipelineResult};
use super::executor::{ChannelSlot, ComponentSlot};
use super::id::ComponentId;
use super::stream::StreamDescriptor;
use super::window::WindowResolver;
use crate::config::options::keys;
use crate::config::PipelineConfig;
use std::collections::VecDeque;
use std::sync::Arc;

/// Compiles a pipeline graph into an execution plan
pub struct PipelineCompiler;

impl PipelineCompiler {
    /// Check the graph and resolve every stream, window and buffer.
    ///
    /// Fails with [`PipelineError::Configuration`] when a component is
    /// missing, a stage has no input, a handler has no channel, the graph has
    /// a cycle, a rate cannot be resolved, or a buffer would be smaller than
    /// the largest frame read from it.
    pub(crate) fn compile(
        slots: &[ComponentSlot],
        channels: &[ChannelSlot],
        config: &PipelineConfig,
    ) -> PipelineResult<CompiledPlan> {
        let start_time = std::time::Instant::now();

        Self::check_structure(slots)?;

        let adj = Self::build_adjacency(slots, channels);
        let order = Self::start_order(slots, &adj)?;

        let mut nodes: Vec<PlannedNode> = slots
            .iter()
            .enumerate()
            .map(|(idx, slot)| PlannedNode {
                id: ComponentId(idx as u32),
                kind: slot.kind,
                output: None,
                capacity: 0,
                write_block: 0,
                write_chunk: 0,
                inputs: Vec::new(),
                frame: slot.frame,
            })
            .collect();

        for &idx in &order {
            Self::resolve_node(idx, slots, &mut nodes)?;
        }
        Self::size_buffers(slots, &mut nodes, config)?;

        let count = |kind: ComponentKind| slots.iter().filter(|s| s.kind == kind).count();
        let stats = PlanStats {
            total_components: slots.len(),
            sensors: count(ComponentKind::Sensor),
            providers: count(ComponentKind::Provider),
            transformers: count(ComponentKind::Transformer),
            consumers: count(ComponentKind::Consumer),
            handlers: count(ComponentKind::EventHandler),
            channels: channels.len(),
            buffers: nodes.iter().filter(|n| n.output.is_some()).count(),
            buffered_samples: nodes.iter().map(|n| n.capacity).sum(),
            compile_time_us: start_time.elapsed().as_micros() as u64,
        };

        tracing::info!(
            "Pipeline compiled: {} components, {} buffers ({} samples), {} channels in {}us",
            stats.total_components,
            stats.buffers,
            stats.buffered_samples,
            stats.channels,
            stats.compile_time_us,
        );

        Ok(CompiledPlan {
            order,
            nodes,
            stats,
        })
    }

    /// Per-kind wiring rules that do not need rates
    fn check_structure(slots: &[ComponentSlot]) -> PipelineResult<()> {
        for (idx, slot) in slots.iter().enumerate() {
            if slot.component.is_none() {
                return Err(PipelineError::Configuration(format!(
                    "component '{}' was lost when its worker was abandoned",
                    slot.name
                )));
            }
            match slot.kind {
                ComponentKind::Sensor => {
                    let id = ComponentId(idx as u32);
                    if !slots.iter().any(|s| s.sensor == Some(id)) {
                        tracing::warn!("Sensor '{}' has no providers", slot.name);
                    }
                }
                ComponentKind::Provider => {
                    let sensor = slot.sensor.and_then(|id| slots.get(id.index()));
                    if !matches!(sensor, Some(s) if s.kind == ComponentKind::Sensor) {
                        return Err(PipelineError::Configuration(format!(
                            "provider '{}' is not attached to a sensor",
                            slot.name
                        )));
                    }
                }
                ComponentKind::Transformer | ComponentKind::Consumer => {
                    if slot.inputs.is_empty() {
                        return Err(PipelineError::Configuration(format!(
                            "{} '{}' has no stream input",
                            slot.kind, slot.name
                        )));
                    }
                    if slot.frame.is_none() {
                        return Err(PipelineError::Configuration(format!(
                            "{} '{}' has no frame",
                            slot.kind, slot.name
                        )));
                    }
                    for input in &slot.inputs {
                        match slots.get(input.index()) {
                            Some(src) if src.kind.produces_stream() => {}
                            Some(src) => {
                                return Err(PipelineError::Configuration(format!(
                                    "'{}' reads from {} '{}', which produces no stream",
                                    slot.name, src.kind, src.name
                                )))
                            }
                            None => return Err(PipelineError::UnknownComponent(*input)),
                        }
                    }
                }
                ComponentKind::EventHandler => {
                    if slot.subscriptions.is_empty() {
                        return Err(PipelineError::Configuration(format!(
                            "event handler '{}' is not subscribed to any channel",
                            slot.name
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Forward adjacency: stream inputs, sensor to provider, channel owner to listener
    fn build_adjacency(slots: &[ComponentSlot], channels: &[ChannelSlot]) -> Vec<Vec<usize>> {
        let n = slots.len();
        let mut adj = vec![Vec::new(); n];

        for (idx, slot) in slots.iter().enumerate() {
            for input in &slot.inputs {
                if input.index() < n {
                    adj[input.index()].push(idx);
                }
            }
            if let Some(sensor) = slot.sensor {
                if sensor.index() < n {
                    adj[sensor.index()].push(idx);
                }
            }
        }
        for channel in channels {
            let owner = channel.owner.index();
            if owner >= n {
                continue;
            }
            for listener in &channel.listeners {
                if listener.index() < n {
                    adj[owner].push(listener.index());
                }
            }
        }

        adj
    }

    /// Kahn's algorithm, then a stable grouping by kind so that all sensors
    /// come first and all handlers last. Every edge goes from a kind to the
    /// same or a later kind, so the grouping keeps the order topological.
    fn start_order(slots: &[ComponentSlot], adj: &[Vec<usize>]) -> PipelineResult<Vec<usize>> {
        let n = slots.len();
        let mut in_degree = vec![0usize; n];
        for targets in adj {
            for &to in targets {
                in_degree[to] += 1;
            }
        }

        let mut queue: VecDeque<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
        let mut order = Vec::with_capacity(n);

        while let Some(node) = queue.pop_front() {
            order.push(node);
            for &next in &adj[node] {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    queue.push_back(next);
                }
            }
        }

        if order.len() != n {
            let stuck: Vec<&str> = (0..n)
                .filter(|&i| in_degree[i] > 0)
                .map(|i| slots[i].name.as_str())
                .collect();
            return Err(PipelineError::Configuration(format!(
                "cycle detected among: {}",
                stuck.join(", ")
            )));
        }

        order.sort_by_key(|&idx| Self::kind_rank(slots[idx].kind));
        Ok(order)
    }

    fn kind_rank(kind: ComponentKind) -> u8 {
        match kind {
            ComponentKind::Sensor => 0,
            ComponentKind::Provider => 1,
            ComponentKind::Transformer => 2,
            ComponentKind::Consumer => 3,
            ComponentKind::EventHandler => 4,
        }
    }

    /// Resolve output descriptor and input windows of one slot. Inputs are
    /// already resolved because slots are visited in topological order.
    fn resolve_node(
        idx: usize,
        slots: &[ComponentSlot],
        nodes: &mut [PlannedNode],
    ) -> PipelineResult<()> {
        let slot = &slots[idx];
        let configuration = |message: String| {
            PipelineError::Configuration(format!("'{}': {}", slot.name, message))
        };

        let mut inputs = Vec::with_capacity(slot.inputs.len());
        let mut input_descriptors = Vec::with_capacity(slot.inputs.len());
        if let Some(frame) = slot.frame.filter(|_| slot.kind.consumes_stream()) {
            for &source in &slot.inputs {
                let descriptor = nodes[source.index()].output.clone().ok_or_else(|| {
                    configuration(format!(
                        "input '{}' has no resolved stream",
                        slots[source.index()].name
                    ))
                })?;
                let resolver = WindowResolver::new(&frame, descriptor.sample_rate).map_err(|e| {
                    configuration(format!("input '{}': {}", slots[source.index()].name, e))
                })?;
                input_descriptors.push(descriptor);
                inputs.push(PlannedInput { source, resolver });
            }
        }

        let output = match &slot.component {
            Some(Component::Provider(provider)) => {
                let descriptor = provider
                    .descriptor()
                    .map_err(|e| configuration(e.to_string()))?;
                Some(descriptor)
            }
            Some(Component::Transformer(transformer)) => {
                let frame = slot.frame.ok_or_else(|| configuration("no frame".to_string()))?;
                let spec = transformer
                    .output_spec(&OutputContext {
                        inputs: &input_descriptors,
                        frame,
                    })
                    .map_err(|e| configuration(e.to_string()))?;
                if spec.samples_per_activation == 0 {
                    return Err(configuration(
                        "output must have at least one sample per activation".to_string(),
                    ));
                }
                nodes[idx].write_block = spec.samples_per_activation;
                let rate = spec.samples_per_activation as f64 / frame.step_secs();
                Some(StreamDescriptor::new(rate, spec.dim, spec.sample_type).with_labels(spec.labels))
            }
            _ => None,
        };

        if let Some(descriptor) = &output {
            descriptor.validate().map_err(configuration)?;
        }
        let node = &mut nodes[idx];
        node.output = output.map(Arc::new);
        node.inputs = inputs;
        Ok(())
    }

    /// `ceil(seconds * rate)` per producing slot, checked against every frame
    /// read from it and every block written to it.
    fn size_buffers(
        slots: &[ComponentSlot],
        nodes: &mut [PlannedNode],
        config: &PipelineConfig,
    ) -> PipelineResult<()> {
        let mut largest_frame = vec![0usize; nodes.len()];
        for node in nodes.iter() {
            for input in &node.inputs {
                let entry = &mut largest_frame[input.source.index()];
                *entry = (*entry).max(input.resolver.max_frame());
            }
        }

        for (idx, node) in nodes.iter_mut().enumerate() {
            let Some(descriptor) = node.output.clone() else {
                continue;
            };
            let slot = &slots[idx];
            let seconds = Self::buffer_seconds(slot, config)?;
            let capacity = ((seconds * descriptor.sample_rate).ceil() as usize).max(1);
            let needed = largest_frame[idx].max(node.write_block);
            if capacity < needed {
                return Err(PipelineError::Configuration(format!(
                    "buffer of '{}' holds {} samples ({}s at {} Hz) but {} are needed at once",
                    slot.name, capacity, seconds, descriptor.sample_rate, needed
                )));
            }
            node.capacity = capacity;
            // A reader waiting for a frame holds at most `largest - 1`
            // samples, so a block of this size always fits.
            let fits = capacity - largest_frame[idx].max(1) + 1;
            if node.kind == ComponentKind::Provider {
                node.write_block = (capacity / 4).max(1).min(fits);
            }
            node.write_chunk = node.write_block.min(fits);
        }
        Ok(())
    }

    fn buffer_seconds(slot: &ComponentSlot, config: &PipelineConfig) -> PipelineResult<f64> {
        let from_option = slot
            .component
            .as_ref()
            .and_then(|c| c.options())
            .filter(|o| o.contains(keys::BUFFER_SIZE))
            .map(|o| o.get_float(keys::BUFFER_SIZE));
        let seconds = match from_option {
            Some(Ok(seconds)) if seconds > 0.0 => seconds,
            Some(Ok(_)) => config.buffer_size_secs,
            Some(Err(source)) => {
                return Err(PipelineError::Option {
                    component: slot.name.clone(),
                    source,
                })
            }
            None => config.buffer_size_secs,
        };
        Ok(seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::id::ChannelId;
    use crate::pipeline::nodes::{
        EventLogger, Functionals, SignalGenerator, SimulatedSensor, ThresholdEventSender, Waveform,
    };
    use crate::pipeline::window::FrameSpec;

    fn slot(component: Component) -> ComponentSlot {
        ComponentSlot {
            name: component.name().to_string(),
            kind: component.kind(),
            component: Some(component),
            inputs: Vec::new(),
            frame: None,
            sensor: None,
            subscriptions: Vec::new(),
            channel: None,
        }
    }

    fn sensor() -> ComponentSlot {
        slot(Component::Sensor(Box::new(SimulatedSensor::new("sim"))))
    }

    fn provider(name: &str, rate: f64, sensor: u32) -> ComponentSlot {
        let mut slot = slot(Component::Provider(Box::new(SignalGenerator::new(
            name,
            rate,
            Waveform::Sine,
        ))));
        slot.sensor = Some(ComponentId(sensor));
        slot
    }

    fn stage(component: Component, inputs: &[u32], frame: FrameSpec) -> ComponentSlot {
        let mut slot = slot(component);
        slot.inputs = inputs.iter().map(|&i| ComponentId(i)).collect();
        slot.frame = Some(frame);
        slot
    }

    fn threshold(name: &str) -> Component {
        Component::Consumer(Box::new(ThresholdEventSender::new(name, 0.0, 1.0)))
    }

    fn functionals(name: &str) -> Component {
        Component::Transformer(Box::new(Functionals::new(name)))
    }

    #[test]
    fn test_start_order_groups_kinds() {
        // Added out of order: consumer first, transformer last
        let slots = vec![
            stage(threshold("alarm"), &[3], FrameSpec::new(1.0)),
            sensor(),
            provider("acc", 50.0, 1),
            stage(functionals("stats"), &[2], FrameSpec::new(0.5)),
        ];

        let plan = PipelineCompiler::compile(&slots, &[], &PipelineConfig::default()).unwrap();

        assert_eq!(plan.order, vec![1, 2, 3, 0]);
        assert_eq!(plan.workers().collect::<Vec<_>>(), vec![2, 3, 0]);
        assert_eq!(plan.stats.total_components, 4);
        assert_eq!(plan.stats.buffers, 2);
        assert_eq!(plan.stats.consumers, 1);
    }

    #[test]
    fn test_cycle_is_rejected() {
        let slots = vec![
            sensor(),
            provider("acc", 50.0, 0),
            stage(functionals("a"), &[1, 3], FrameSpec::new(1.0)),
            stage(functionals("b"), &[2], FrameSpec::new(1.0)),
        ];

        match PipelineCompiler::compile(&slots, &[], &PipelineConfig::default()) {
            Err(PipelineError::Configuration(message)) => {
                assert!(message.contains("cycle"));
                assert!(message.contains("a, b"));
            }
            other => panic!("expected a cycle error, got {:?}", other.map(|p| p.order)),
        }
    }

    #[test]
    fn test_buffer_sizing_and_write_block() {
        let slots = vec![
            sensor(),
            provider("acc", 50.0, 0),
            stage(threshold("alarm"), &[1], FrameSpec::new(1.0)),
        ];

        let plan = PipelineCompiler::compile(&slots, &[], &PipelineConfig::default()).unwrap();
        let node = &plan.nodes[1];

        // 2 s at 50 Hz, one frame of 50 samples
        assert_eq!(node.capacity, 100);
        assert_eq!(node.write_block, 25);
        assert_eq!(node.write_chunk, 25);
        assert_eq!(plan.nodes[2].inputs[0].resolver.max_frame(), 50);
    }

    #[test]
    fn test_transformer_rate_follows_step() {
        let slots = vec![
            sensor(),
            provider("acc", 100.0, 0),
            stage(functionals("stats"), &[1], FrameSpec::with_step(1.0, 0.25)),
        ];

        let plan = PipelineCompiler::compile(&slots, &[], &PipelineConfig::default()).unwrap();
        let output = plan.nodes[2].output.as_ref().unwrap();

        assert_eq!(output.sample_rate, 4.0);
        // Default selection is mean and std
        assert_eq!(output.dim, 2);
        assert_eq!(plan.nodes[2].write_block, 1);
        assert_eq!(plan.nodes[2].write_chunk, 1);
    }

    #[test]
    fn test_orphan_provider_is_rejected() {
        let mut orphan = provider("acc", 50.0, 0);
        orphan.sensor = None;
        let slots = vec![sensor(), orphan];

        assert!(matches!(
            PipelineCompiler::compile(&slots, &[], &PipelineConfig::default()),
            Err(PipelineError::Configuration(_))
        ));
    }

    #[test]
    fn test_handler_needs_a_channel() {
        let slots = vec![
            sensor(),
            provider("acc", 50.0, 0),
            stage(threshold("alarm"), &[1], FrameSpec::new(1.0)),
            slot(Component::EventHandler(Box::new(EventLogger::new("log")))),
        ];
        assert!(PipelineCompiler::compile(&slots, &[], &PipelineConfig::default()).is_err());

        let mut slots = slots;
        slots[3].subscriptions.push(ChannelId(0));
        let channels = vec![ChannelSlot {
            owner: ComponentId(2),
            listeners: vec![ComponentId(3)],
        }];
        let plan = PipelineCompiler::compile(&slots, &channels, &PipelineConfig::default()).unwrap();
        assert_eq!(plan.order.last(), Some(&3));
        assert_eq!(plan.stats.channels, 1);
    }
}
