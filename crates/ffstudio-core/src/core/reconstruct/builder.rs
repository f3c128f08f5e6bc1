//! Segment builder
//!
//! Turns one [`ParsedCommand`] into wired nodes: inputs with their decoder,
//! demuxer and flag chains, filters with their pad selectors, and outputs
//! with their maps, encoders, muxer and flag chains.

use std::collections::HashMap;

use crate::core::graph::{
    infer_from_flag_suffix, infer_from_map, infer_from_pad_label, Graph, Node, NodeKind,
    PortType, StreamSelection, ARG_ORDER_KEY, DECODER_A_SLOT, DECODER_V_SLOT, DEMUXER_SLOT,
    DST_PATH_KEY, ENCODER_A_SLOT, ENCODER_V_SLOT, GLOBALS_SLOT, INPUT_NODE_TYPE, MUXER_SLOT,
    OUTPUT_NODE_TYPE, SRC_PATH_KEY, STREAM_SLOT,
};
use crate::core::parser::{is_filename, FilterDescriptor, ParsedCommand};
use crate::core::registry::NodeRegistry;
use crate::core::{CoreError, CoreResult, NodeId};

/// Value assigned to a carrier property when its flag had no value
const IMPLICIT_FLAG_VALUE: &str = "true";

// =============================================================================
// General Parameters
// =============================================================================

/// A flag not modeled by a dedicated port, e.g. `-b:v 2M` or `-y`
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct GeneralParam {
    /// Flag without stream specifier (`-b`)
    pub name: String,
    /// Stream specifier suffix including its leading colon (`:v`)
    pub stream_spec: Option<String>,
    pub value: Option<String>,
    /// Token index of the flag within its slice
    pub position: usize,
}

impl GeneralParam {
    pub fn parse(flag: &str, value: Option<&str>) -> Self {
        let (name, stream_spec) = match flag.split_once(':') {
            Some((name, spec)) => (name, Some(format!(":{spec}"))),
            None => (flag, None),
        };
        Self {
            name: name.to_string(),
            stream_spec,
            value: value.map(str::to_string),
            position: 0,
        }
    }

    fn at(mut self, position: usize) -> Self {
        self.position = position;
        self
    }

    fn flag_text(&self) -> String {
        format!("{}{}", self.name, self.stream_spec.as_deref().unwrap_or_default())
    }
}

/// Returns true if the token after a flag can be its value.
fn is_flag_value(token: &str) -> bool {
    !token.trim_start().starts_with('-')
}

// =============================================================================
// Slice Scanning
// =============================================================================

/// Recognized parts of one input or output slice
#[derive(Debug, Default)]
struct SliceArgs {
    path: Option<String>,
    video_codec: Option<String>,
    audio_codec: Option<String>,
    format: Option<String>,
    maps: Vec<String>,
    general: Vec<GeneralParam>,
    stray: Vec<String>,
    /// Token index of the last `-c:v`, `-c:a` and `-f` seen
    positions: HashMap<&'static str, usize>,
}

impl SliceArgs {
    fn scan_input(args: &[String]) -> Self {
        Self::scan(args, false)
    }

    fn scan_output(args: &[String]) -> Self {
        Self::scan(args, true)
    }

    /// Output slices end in the destination path, which a flag never claims as its value.
    fn scan(args: &[String], output: bool) -> Self {
        let mut parsed = Self::default();
        let last = args.len().saturating_sub(1);
        let mut i = 0;

        while i < args.len() {
            let arg = args[i].as_str();
            let next = args.get(i + 1).cloned();

            if output && i == last && is_filename(arg) {
                parsed.path = Some(arg.to_string());
                i += 1;
                continue;
            }

            let (slot, flag) = match arg {
                "-i" if !output => (Some(&mut parsed.path), None),
                "-c:v" => (Some(&mut parsed.video_codec), Some("-c:v")),
                "-c:a" => (Some(&mut parsed.audio_codec), Some("-c:a")),
                "-f" => (Some(&mut parsed.format), Some("-f")),
                _ => (None, None),
            };
            if let (Some(slot), Some(value)) = (slot, next.clone()) {
                *slot = Some(value);
                if let Some(flag) = flag {
                    parsed.positions.insert(flag, i);
                }
                i += 2;
                continue;
            }

            if output && arg == "-map" {
                if let Some(value) = next {
                    parsed.maps.push(value);
                    i += 2;
                    continue;
                }
            }

            if arg.starts_with('-') {
                let value = next
                    .filter(|v| is_flag_value(v))
                    .filter(|_| !output || i + 1 != last);
                let consumed = if value.is_some() { 2 } else { 1 };
                parsed
                    .general
                    .push(GeneralParam::parse(arg, value.as_deref()).at(i));
                i += consumed;
                continue;
            }

            parsed.stray.push(arg.to_string());
            i += 1;
        }
        parsed
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Nodes and diagnostics produced for one pipeline segment
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SegmentReport {
    /// Created node ids in creation order
    pub nodes: Vec<NodeId>,
    pub diagnostics: Vec<String>,
}

/// Builds the nodes of one segment into a graph
pub(crate) struct SegmentBuilder<'a> {
    registry: &'a NodeRegistry,
    graph: &'a mut Graph,
    inputs: Vec<NodeId>,
    /// Selector per pad label or stream specifier seen so far
    labels: HashMap<String, NodeId>,
    report: SegmentReport,
}

impl<'a> SegmentBuilder<'a> {
    pub fn new(registry: &'a NodeRegistry, graph: &'a mut Graph) -> Self {
        Self {
            registry,
            graph,
            inputs: Vec::new(),
            labels: HashMap::new(),
            report: SegmentReport::default(),
        }
    }

    pub fn build(mut self, parsed: &ParsedCommand) -> CoreResult<SegmentReport> {
        for args in &parsed.inputs {
            let id = self.build_input(args)?;
            self.inputs.push(id);
        }
        for filter in &parsed.filters {
            self.build_filter(filter)?;
        }
        for args in &parsed.outputs {
            self.build_output(args)?;
        }
        if !parsed.unassigned.is_empty() {
            self.diagnose(format!(
                "ignored trailing arguments: {}",
                parsed.unassigned.join(" ")
            ));
        }

        for id in self.report.nodes.clone() {
            self.graph.refresh_stream_slots(id)?;
        }
        Ok(self.report)
    }

    fn diagnose(&mut self, message: String) {
        tracing::debug!(%message, "command reconstruction");
        self.report.diagnostics.push(message);
    }

    fn add(&mut self, node: Node) -> NodeId {
        let id = self.graph.add_node(node);
        self.report.nodes.push(id);
        id
    }

    fn add_selector(&mut self, selection: &StreamSelection) -> CoreResult<NodeId> {
        let node = self.registry.instantiate_selector(selection)?;
        Ok(self.add(node))
    }

    /// Connects output 0 of `origin` to the input named `slot` on `target`.
    fn connect_named(&mut self, origin: NodeId, target: NodeId, slot: &str) -> CoreResult<()> {
        let index = self
            .graph
            .node(target)
            .and_then(|n| n.input_index(slot))
            .ok_or_else(|| CoreError::Internal(format!("node {target} has no '{slot}' input")))?;
        self.graph.connect(origin, 0, target, index)?;
        Ok(())
    }

    fn connect_stream(&mut self, selector: NodeId, target: NodeId) -> CoreResult<()> {
        self.graph
            .connect_to_free_slot(selector, 0, target, STREAM_SLOT, PortType::MapStream)?;
        Ok(())
    }

    /// Feeds `selector` from input `index` of this segment, if it exists.
    fn feed_from_input(&mut self, index: usize, selector: NodeId) -> CoreResult<()> {
        match self.inputs.get(index).copied() {
            Some(input) => {
                self.graph.connect(input, 0, selector, 0)?;
            }
            None => self.diagnose(format!("stream refers to missing input {index}")),
        }
        Ok(())
    }

    // =========================================================================
    // Capabilities
    // =========================================================================

    /// Creates a codec or format node for `name` and connects it to `slot` of `owner`.
    ///
    /// Returns `None` when no node type matches the name.
    fn attach_capability(
        &mut self,
        owner: NodeId,
        kind: NodeKind,
        name: &str,
        slot: &str,
    ) -> CoreResult<Option<NodeId>> {
        let registry = self.registry;
        let schema = match kind {
            NodeKind::Encoder | NodeKind::Decoder => registry.find_codec(name, kind),
            _ => registry.find_format(name, kind),
        };
        let Some(schema) = schema else {
            tracing::debug!(name, ?kind, "no node type for capability, keeping as flag");
            return Ok(None);
        };
        let id = self.add(schema.instantiate());
        self.connect_named(id, owner, slot)?;
        Ok(Some(id))
    }

    /// Attaches codec and format nodes.
    ///
    /// Returns the nodes that can carry options, and the command position of
    /// every slot that received a node. Unknown codec or format names join
    /// `general` as plain flags at their original position.
    fn attach_capabilities(
        &mut self,
        owner: NodeId,
        entries: [(NodeKind, Option<String>, &'static str, &'static str); 3],
        parsed: &mut SliceArgs,
    ) -> CoreResult<(Vec<NodeId>, Vec<(usize, &'static str)>)> {
        let mut carriers = vec![owner];
        let mut placed = Vec::new();
        for (kind, name, slot, flag) in entries {
            let Some(name) = name else { continue };
            let position = parsed.positions.get(flag).copied().unwrap_or_default();
            match self.attach_capability(owner, kind, &name, slot)? {
                Some(id) => {
                    carriers.push(id);
                    placed.push((position, slot));
                }
                None => parsed
                    .general
                    .push(GeneralParam::parse(flag, Some(&name)).at(position)),
            }
        }
        parsed.general.sort_by_key(|param| param.position);
        Ok((carriers, placed))
    }

    /// Records the command order of `owner`'s option slots for emission.
    fn record_arg_order(&mut self, owner: NodeId, mut placed: Vec<(usize, &'static str)>) {
        if placed.len() < 2 {
            return;
        }
        placed.sort_by_key(|(position, _)| *position);
        let order: Vec<&str> = placed.into_iter().map(|(_, slot)| slot).collect();
        if let Some(node) = self.graph.node_mut(owner) {
            node.properties.set(ARG_ORDER_KEY, order.join(","));
        }
    }

    /// Chains general flags into `owner`'s globals input, preserving their order.
    ///
    /// Flags without a registered flag node are applied as properties of the
    /// first carrier that declares them, after any applied earlier. Returns
    /// the position of the first chained flag.
    fn attach_general(
        &mut self,
        owner: NodeId,
        params: &[GeneralParam],
        carriers: &[NodeId],
    ) -> CoreResult<Option<usize>> {
        let registry = self.registry;
        let mut last: Option<NodeId> = None;
        let mut first_position = None;

        for param in params {
            if let Some(schema) = registry.find_flag(&param.name) {
                let no_args = schema.no_args;
                let mut node = schema.instantiate();
                if let Some(value) = &param.value {
                    if no_args {
                        self.diagnose(format!("flag {} takes no value, dropped '{value}'", param.name));
                    } else {
                        node.properties.set(param.name.clone(), value.clone());
                    }
                }
                let id = self.add(node);

                if let Some(spec) = &param.stream_spec {
                    match self.graph.node(id).and_then(|n| n.input_index(STREAM_SLOT)) {
                        Some(slot) => {
                            let selector = self.add_selector(&infer_from_flag_suffix(spec))?;
                            self.graph.connect(selector, 0, id, slot)?;
                        }
                        None => self.diagnose(format!(
                            "flag {} takes no stream specifier, dropped '{spec}'",
                            param.name
                        )),
                    }
                }

                if let Some(prev) = last {
                    self.graph.connect(prev, 0, id, 0)?;
                }
                last = Some(id);
                first_position.get_or_insert(param.position);
                continue;
            }

            let carrier = carriers.iter().copied().find(|c| {
                self.graph
                    .node(*c)
                    .is_some_and(|n| n.properties.contains(&param.name))
            });
            match carrier {
                Some(carrier) => {
                    let value = param
                        .value
                        .clone()
                        .unwrap_or_else(|| IMPLICIT_FLAG_VALUE.to_string());
                    if let Some(node) = self.graph.node_mut(carrier) {
                        node.properties.set_last(param.name.clone(), value);
                    }
                }
                None => {
                    tracing::warn!(flag = %param.flag_text(), "no node type for flag, dropped");
                    self.diagnose(format!("unsupported flag {}", param.flag_text()));
                }
            }
        }

        if let Some(last) = last {
            self.connect_named(last, owner, GLOBALS_SLOT)?;
        }
        Ok(first_position)
    }

    /// Wires capabilities and general flags into `owner`.
    fn attach_options(
        &mut self,
        owner: NodeId,
        entries: [(NodeKind, Option<String>, &'static str, &'static str); 3],
        parsed: &mut SliceArgs,
    ) -> CoreResult<()> {
        let (carriers, mut placed) = self.attach_capabilities(owner, entries, parsed)?;
        if let Some(position) = self.attach_general(owner, &parsed.general, &carriers)? {
            placed.push((position, GLOBALS_SLOT));
        }
        self.record_arg_order(owner, placed);
        Ok(())
    }

    // =========================================================================
    // Inputs
    // =========================================================================

    fn build_input(&mut self, args: &[String]) -> CoreResult<NodeId> {
        let mut parsed = SliceArgs::scan_input(args);
        let mut node = self.registry.instantiate(INPUT_NODE_TYPE)?;
        if let Some(path) = &parsed.path {
            node.properties.set(SRC_PATH_KEY, path.clone());
        }
        let id = self.add(node);

        let capabilities = [
            (NodeKind::Decoder, parsed.video_codec.take(), DECODER_V_SLOT, "-c:v"),
            (NodeKind::Decoder, parsed.audio_codec.take(), DECODER_A_SLOT, "-c:a"),
            (NodeKind::Demuxer, parsed.format.take(), DEMUXER_SLOT, "-f"),
        ];
        self.attach_options(id, capabilities, &mut parsed)?;

        for token in parsed.stray {
            self.diagnose(format!("ignored input argument '{token}'"));
        }
        Ok(id)
    }

    // =========================================================================
    // Filters
    // =========================================================================

    fn build_filter(&mut self, filter: &FilterDescriptor) -> CoreResult<()> {
        let registry = self.registry;
        let Some(schema) = registry.find_filter(&filter.filter) else {
            tracing::warn!(filter = %filter.filter, "unknown filter, skipped");
            self.diagnose(format!("unknown filter '{}'", filter.filter));
            return Ok(());
        };

        let mut node = schema.instantiate();
        for (index, option) in filter.options.iter().enumerate() {
            match &option.name {
                Some(name) => node.properties.set(name.clone(), option.value.clone()),
                None => match schema.options.get(index) {
                    Some(target) => node.properties.set(target.flag.clone(), option.value.clone()),
                    None => self.diagnose(format!(
                        "filter {}: positional option {} ('{}') has no matching option",
                        filter.filter,
                        index + 1,
                        option.value
                    )),
                },
            }
        }
        if filter.id.is_some() {
            self.diagnose(format!("filter {}: instance id dropped", filter.filter));
        }
        let id = self.add(node);

        for label in &filter.inputs {
            let selector = match self.labels.get(label) {
                Some(&selector) => selector,
                None => {
                    let inferred = infer_from_pad_label(label);
                    let selector = self.add_selector(&inferred.selection)?;
                    if let Some(index) = inferred.input_index {
                        self.feed_from_input(index, selector)?;
                    }
                    self.labels.insert(label.clone(), selector);
                    selector
                }
            };
            self.connect_stream(selector, id)?;
        }

        for label in &filter.outputs {
            let selector = self.add_selector(&StreamSelection::Name(label.clone()))?;
            self.graph.connect(id, 0, selector, 0)?;
            self.labels.insert(label.clone(), selector);
        }
        Ok(())
    }

    // =========================================================================
    // Outputs
    // =========================================================================

    fn build_output(&mut self, args: &[String]) -> CoreResult<NodeId> {
        let mut parsed = SliceArgs::scan_output(args);
        let mut node = self.registry.instantiate(OUTPUT_NODE_TYPE)?;
        if let Some(path) = &parsed.path {
            node.properties.set(DST_PATH_KEY, path.clone());
        }
        let id = self.add(node);

        let capabilities = [
            (NodeKind::Encoder, parsed.video_codec.take(), ENCODER_V_SLOT, "-c:v"),
            (NodeKind::Encoder, parsed.audio_codec.take(), ENCODER_A_SLOT, "-c:a"),
            (NodeKind::Muxer, parsed.format.take(), MUXER_SLOT, "-f"),
        ];
        self.attach_options(id, capabilities, &mut parsed)?;

        for value in &parsed.maps {
            let selector = self.map_selector(value)?;
            self.connect_stream(selector, id)?;
        }

        if parsed.maps.is_empty() {
            for input in self.inputs.clone() {
                let selector = self.add_selector(&StreamSelection::Custom(String::new()))?;
                self.graph.connect(input, 0, selector, 0)?;
                self.connect_stream(selector, id)?;
            }
        }

        for token in parsed.stray {
            self.diagnose(format!("ignored output argument '{token}'"));
        }
        Ok(id)
    }

    /// Resolves a `-map` value to an existing pad selector or a new one.
    fn map_selector(&mut self, value: &str) -> CoreResult<NodeId> {
        let label = value
            .strip_prefix('[')
            .and_then(|v| v.strip_suffix(']'))
            .unwrap_or(value);
        if let Some(&selector) = self.labels.get(label) {
            return Ok(selector);
        }

        let inferred = infer_from_map(value);
        let selector = self.add_selector(&inferred.selection)?;
        if !value.starts_with('[') {
            self.feed_from_input(inferred.input_index.unwrap_or(0), selector)?;
        } else {
            self.diagnose(format!("map {value} refers to an unknown filter pad"));
        }
        Ok(selector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_general_param_split() {
        let param = GeneralParam::parse("-b:v", Some("2M"));
        assert_eq!(param.name, "-b");
        assert_eq!(param.stream_spec.as_deref(), Some(":v"));
        assert_eq!(param.value.as_deref(), Some("2M"));
        assert_eq!(param.flag_text(), "-b:v");

        let bare = GeneralParam::parse("-y", None);
        assert_eq!(bare.stream_spec, None);
    }

    #[test]
    fn test_scan_input_slice() {
        let parsed = SliceArgs::scan_input(&args(&[
            "-ss", "5", "-c:v", "h264", "-re", "-f", "mov", "-i", "in.mov",
        ]));
        assert_eq!(parsed.path.as_deref(), Some("in.mov"));
        assert_eq!(parsed.video_codec.as_deref(), Some("h264"));
        assert_eq!(parsed.format.as_deref(), Some("mov"));
        assert_eq!(parsed.general.len(), 2);
        assert_eq!(parsed.general[0].value.as_deref(), Some("5"));
        assert_eq!(parsed.general[1].value, None);
    }

    #[test]
    fn test_scan_output_slice_keeps_destination() {
        let parsed = SliceArgs::scan_output(&args(&[
            "-map", "[v]", "-c:a", "aac", "-shortest", "out.mp4",
        ]));
        assert_eq!(parsed.maps, vec!["[v]"]);
        assert_eq!(parsed.audio_codec.as_deref(), Some("aac"));
        assert_eq!(parsed.path.as_deref(), Some("out.mp4"));
        assert_eq!(parsed.general.len(), 1);
        assert_eq!(parsed.general[0].value, None);
    }

    #[test]
    fn test_scan_records_positions() {
        let parsed = SliceArgs::scan_output(&args(&[
            "-c:v", "libx264", "-preset", "slow", "-c:a", "aac", "-b:a", "128k", "out.mp4",
        ]));
        assert_eq!(parsed.positions.get("-c:v"), Some(&0));
        assert_eq!(parsed.positions.get("-c:a"), Some(&4));
        let positions: Vec<usize> = parsed.general.iter().map(|p| p.position).collect();
        assert_eq!(positions, vec![2, 6]);
    }

    #[test]
    fn test_scan_collects_stray_tokens() {
        let parsed = SliceArgs::scan_input(&args(&["stray", "-i", "a.mp4"]));
        assert_eq!(parsed.stray, vec!["stray"]);
    }
}
