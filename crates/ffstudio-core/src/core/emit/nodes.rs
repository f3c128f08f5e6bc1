//! Per-kind execution contracts
//!
//! Each function runs one node during the emission pass: it reads the values
//! on its input ports, may append a fragment to the context, and publishes
//! its own output value.

use super::context::{join_fragments, EmissionContext, PortValue, StreamRef};
use crate::core::graph::{
    Graph, Node, NodeKind, StreamSelection, ARG_ORDER_KEY, DECODER_A_SLOT, DECODER_V_SLOT,
    DEMUXER_SLOT, DST_PATH_KEY, ENCODER_A_SLOT, ENCODER_V_SLOT, GLOBALS_SLOT, MUXER_SLOT,
    N_STREAMS_SLOT, SRC_PATH_KEY, STREAM_SLOT,
};
use crate::core::parser::quote_arg;

/// Runs `node` against the context.
pub(crate) fn execute(graph: &Graph, node: &Node, ctx: &mut EmissionContext) {
    if ctx.selected_only && !node.selected {
        return;
    }

    let Some(kind) = node.kind() else {
        tracing::warn!(node_id = node.id, node_type = %node.node_type, "unknown node type, skipped");
        ctx.diagnostics
            .push(format!("node {}: unknown type '{}'", node.id, node.node_type));
        return;
    };

    match kind {
        NodeKind::Input => exec_input(graph, node, ctx),
        NodeKind::Output => exec_output(graph, node, ctx),
        NodeKind::StreamSelector => exec_selector(graph, node, ctx),
        NodeKind::GenericFlag => exec_flag(graph, node, ctx),
        // Capability nodes only run when something consumes them.
        _ if !node.has_output_links() => {}
        NodeKind::Filter => exec_filter(graph, node, ctx),
        NodeKind::Encoder | NodeKind::Decoder => exec_codec(node, ctx),
        NodeKind::Muxer | NodeKind::Demuxer => exec_format(node, ctx),
    }
}

/// `name key value ...` over the node's non-empty properties.
fn option_pairs(node: &Node) -> String {
    let mut parts = vec![node.name().to_string()];
    for (key, value) in node.properties.iter_set() {
        parts.push(format!("{key} {value}"));
    }
    parts.join(" ")
}

fn prefixed(flag: &str, value: &str) -> String {
    if value.is_empty() {
        String::new()
    } else {
        format!("{flag} {value}")
    }
}

/// Orders slot fragments by the node's recorded argument order.
///
/// Slots the node did not record keep their position in `groups`, after the
/// recorded ones.
fn ordered_groups<'a>(node: &Node, mut groups: Vec<(&str, &'a str)>) -> Vec<&'a str> {
    let recorded: Vec<&str> = node
        .properties
        .get_non_empty(ARG_ORDER_KEY)
        .map(|order| order.split(',').collect())
        .unwrap_or_default();
    groups.sort_by_key(|(slot, _)| {
        recorded
            .iter()
            .position(|r| r == slot)
            .unwrap_or(recorded.len())
    });
    groups.into_iter().map(|(_, fragment)| fragment).collect()
}

fn exec_input(graph: &Graph, node: &Node, ctx: &mut EmissionContext) {
    let text = |slot: &str| ctx.input_text(graph, node.id, node.input_index(slot)).to_string();
    let globals = text(GLOBALS_SLOT);
    let demuxer = text(DEMUXER_SLOT);
    let decoder_v = text(DECODER_V_SLOT);
    let decoder_a = text(DECODER_A_SLOT);
    let path = node.properties.get(SRC_PATH_KEY).unwrap_or_default();
    if path.is_empty() {
        ctx.diagnostics
            .push(format!("node {}: input has no source path", node.id));
    }

    let decoder_a = prefixed("-c:a", &decoder_a);
    let decoder_v = prefixed("-c:v", &decoder_v);
    let source = format!("-i {}", quote_arg(path));
    let mut parts = ordered_groups(
        node,
        vec![
            (DECODER_A_SLOT, decoder_a.as_str()),
            (DECODER_V_SLOT, decoder_v.as_str()),
            (DEMUXER_SLOT, demuxer.as_str()),
            (GLOBALS_SLOT, globals.as_str()),
        ],
    );
    parts.push(source.as_str());
    let fragment = join_fragments(parts);

    let index = ctx.inputs.len();
    ctx.inputs.push(fragment);
    ctx.publish_variable(format!("input_{index}"), path);
    ctx.publish(node.id, PortValue::Stream(StreamRef::Input(index)));
}

fn exec_filter(graph: &Graph, node: &Node, ctx: &mut EmissionContext) {
    let mut fragment = String::new();
    for slot in 0..node.inputs.len() {
        if let Some(PortValue::Selected { data, .. }) = ctx.input_value(graph, node.id, slot) {
            if !data.is_empty() {
                fragment.push_str(&format!("[{data}]"));
            }
        }
    }
    fragment.push_str(node.name());

    let options: Vec<String> = node
        .properties
        .iter_set()
        .map(|(key, value)| format!("{key}={value}"))
        .collect();
    if !options.is_empty() {
        fragment.push('=');
        fragment.push_str(&options.join(":"));
    }

    let index = ctx.filters.len();
    ctx.filters.push(fragment);
    ctx.publish(node.id, PortValue::Stream(StreamRef::Filter(index)));
}

fn exec_codec(node: &Node, ctx: &mut EmissionContext) {
    ctx.publish(node.id, PortValue::Text(option_pairs(node)));
}

fn exec_format(node: &Node, ctx: &mut EmissionContext) {
    ctx.publish(node.id, PortValue::Text(format!("-f {}", option_pairs(node))));
}

/// Resolves a selector to a stream specifier.
///
/// Selectors fed by a filter must select by name; their label is appended to
/// that filter's fragment as an output pad.
fn exec_selector(graph: &Graph, node: &Node, ctx: &mut EmissionContext) {
    let upstream = node
        .input_index(N_STREAMS_SLOT)
        .and_then(|slot| ctx.input_value(graph, node.id, slot))
        .and_then(|value| match value {
            PortValue::Stream(stream) => Some(*stream),
            _ => None,
        });
    let input = match upstream {
        Some(StreamRef::Input(index)) => Some(index),
        _ => None,
    };

    let selection = match StreamSelection::from_properties(&node.properties) {
        Some(selection) => selection,
        None => {
            ctx.usage_error(node.id, "stream selector has no valid selection mode");
            StreamSelection::Custom(String::new())
        }
    };

    let mut processed = false;
    let data = match &selection {
        StreamSelection::Name(name) => {
            processed = !name.is_empty();
            name.clone()
        }
        StreamSelection::Language(code) => match input {
            Some(index) if !code.is_empty() => format!("{index}:m:language:{code}"),
            _ => String::new(),
        },
        StreamSelection::Type { media, index } => {
            let prefix = input.map(|i| i.to_string()).unwrap_or_default();
            match index {
                Some(id) => format!("{prefix}:{}:{id}", media.letter()),
                None => format!("{prefix}:{}", media.letter()),
            }
        }
        StreamSelection::Id(id) => match input {
            Some(index) => format!("{index}:{id}"),
            None => String::new(),
        },
        StreamSelection::Program(program) => match input {
            Some(index) if !program.is_empty() => format!("{index}:p:{program}"),
            _ => String::new(),
        },
        StreamSelection::Custom(literal) => literal.clone(),
    };

    match upstream {
        Some(StreamRef::Filter(index)) => {
            if processed {
                if let Some(fragment) = ctx.filters.get_mut(index) {
                    fragment.push_str(&format!("[{data}]"));
                }
            } else {
                ctx.usage_error(node.id, "stream selector after a filter must select by name");
            }
        }
        Some(StreamRef::Input(_)) if matches!(selection, StreamSelection::Name(_)) => {
            ctx.usage_error(
                node.id,
                "name selection needs a filter upstream, not an input",
            );
        }
        _ => {}
    }

    ctx.publish(node.id, PortValue::Selected { data, processed });
}

fn exec_output(graph: &Graph, node: &Node, ctx: &mut EmissionContext) {
    let mut maps = Vec::new();
    for (slot, input) in node.inputs.iter().enumerate() {
        if input.name != STREAM_SLOT {
            continue;
        }
        if let Some(PortValue::Selected { data, processed }) = ctx.input_value(graph, node.id, slot)
        {
            match (data.is_empty(), *processed) {
                (true, _) => {}
                (false, true) => maps.push(format!("-map [{data}]")),
                (false, false) => maps.push(format!("-map {data}")),
            }
        }
    }

    let text = |slot: &str| ctx.input_text(graph, node.id, node.input_index(slot)).to_string();
    let globals = text(GLOBALS_SLOT);
    let muxer = text(MUXER_SLOT);
    let encoder_v = text(ENCODER_V_SLOT);
    let encoder_a = text(ENCODER_A_SLOT);
    let path = node.properties.get(DST_PATH_KEY).unwrap_or_default();
    if path.is_empty() {
        ctx.diagnostics
            .push(format!("node {}: output has no destination path", node.id));
    }
    let destination = quote_arg(path);

    let mut parts: Vec<&str> = maps.iter().map(String::as_str).collect();
    let encoder_a = prefixed("-c:a", &encoder_a);
    let encoder_v = prefixed("-c:v", &encoder_v);
    parts.extend(ordered_groups(
        node,
        vec![
            (MUXER_SLOT, muxer.as_str()),
            (GLOBALS_SLOT, globals.as_str()),
            (ENCODER_A_SLOT, encoder_a.as_str()),
            (ENCODER_V_SLOT, encoder_v.as_str()),
        ],
    ));
    parts.push(destination.as_str());

    let index = ctx.outputs.len();
    ctx.outputs.push(join_fragments(parts));
    ctx.publish_variable(format!("output_{index}"), path);
}

/// Appends this flag to the incoming option chain.
///
/// A connected stream selector adds its specifier without the input index,
/// so `0:v` yields `-b:v`.
fn exec_flag(graph: &Graph, node: &Node, ctx: &mut EmissionContext) {
    if !node.has_output_links() {
        return;
    }

    let globals = ctx
        .input_text(graph, node.id, node.input_index(GLOBALS_SLOT))
        .to_string();

    let own = match node.input_index(STREAM_SLOT) {
        None => node.name().to_string(),
        Some(slot) => {
            let suffix = match ctx.input_value(graph, node.id, slot) {
                Some(PortValue::Selected { data, .. }) if !data.is_empty() => {
                    let spec = data.split_once(':').map_or(data.as_str(), |(_, rest)| rest);
                    format!(":{spec}")
                }
                _ => String::new(),
            };
            let pairs: Vec<String> = node
                .properties
                .iter_set()
                .map(|(key, value)| format!("{key}{suffix} {value}"))
                .collect();
            pairs.join(" ")
        }
    };

    ctx.publish(
        node.id,
        PortValue::Text(join_fragments([globals.as_str(), own.as_str()])),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::graph::MediaType;
    use crate::core::registry::NodeRegistry;

    fn registry() -> NodeRegistry {
        NodeRegistry::builtin().unwrap()
    }

    #[test]
    fn test_codec_and_format_fragments() {
        let registry = registry();
        let mut encoder = registry.instantiate("ffmpeg/encoders/video/libx264").unwrap();
        encoder.properties.set("-preset", "slow");
        encoder.properties.set("-crf", "20");
        assert_eq!(option_pairs(&encoder), "libx264 -crf 20 -preset slow");

        let mut ctx = EmissionContext::default();
        let muxer = registry.instantiate("ffmpeg/muxers/all/mp4").unwrap();
        exec_format(&muxer, &mut ctx);
        assert_eq!(
            ctx.value_of(muxer.id),
            Some(&PortValue::Text("-f mp4".to_string()))
        );
    }

    #[test]
    fn test_ordered_groups_follow_recorded_order() {
        let registry = registry();
        let mut output = registry.instantiate("ffmpeg/output").unwrap();
        let groups = vec![
            (MUXER_SLOT, "-f mp4"),
            (GLOBALS_SLOT, "-y"),
            (ENCODER_A_SLOT, "-c:a aac"),
            (ENCODER_V_SLOT, "-c:v libx264"),
        ];
        assert_eq!(
            ordered_groups(&output, groups.clone()),
            vec!["-f mp4", "-y", "-c:a aac", "-c:v libx264"]
        );

        output.properties.set(ARG_ORDER_KEY, "enc:v,globals");
        assert_eq!(
            ordered_groups(&output, groups),
            vec!["-c:v libx264", "-y", "-f mp4", "-c:a aac"]
        );
    }

    #[test]
    fn test_selector_type_without_input() {
        let registry = registry();
        let mut graph = Graph::new();
        let id = graph.add_node(
            registry
                .instantiate_selector(&StreamSelection::Type {
                    media: MediaType::Audio,
                    index: Some("1".to_string()),
                })
                .unwrap(),
        );
        let mut ctx = EmissionContext::default();
        exec_selector(&graph, graph.node(id).unwrap(), &mut ctx);
        assert_eq!(
            ctx.value_of(id),
            Some(&PortValue::Selected {
                data: ":a:1".to_string(),
                processed: false
            })
        );
        assert!(ctx.diagnostics.is_empty());
    }

    #[test]
    fn test_name_selector_after_input_is_usage_error() {
        let registry = registry();
        let mut graph = Graph::new();
        let input = graph.add_node(registry.instantiate("ffmpeg/input").unwrap());
        let selector = graph.add_node(
            registry
                .instantiate_selector(&StreamSelection::Name("v".to_string()))
                .unwrap(),
        );
        graph.connect(input, 0, selector, 0).unwrap();

        let mut ctx = EmissionContext::default();
        ctx.publish(input, PortValue::Stream(StreamRef::Input(0)));
        exec_selector(&graph, graph.node(selector).unwrap(), &mut ctx);
        assert_eq!(ctx.diagnostics.len(), 1);
    }
}
