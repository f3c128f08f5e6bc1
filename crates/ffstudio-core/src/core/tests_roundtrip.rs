//! End-to-end translation tests
//!
//! Command text is imported into a graph, emitted back, merged, expanded and
//! edited through the history, using only the built-in registry.

use std::collections::HashSet;

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::core::emit::{emit_command, CommandEmitter, EmitOptions};
use crate::core::expand::{Expander, GlobPathResolver};
use crate::core::graph::{merge_graphs_with_rng, Graph, NodeKind, SerializedGraph};
use crate::core::history::GraphHistory;
use crate::core::reconstruct::parse_ffmpeg_command;
use crate::core::registry::NodeRegistry;
use crate::core::CoreError;

fn registry() -> NodeRegistry {
    NodeRegistry::builtin().unwrap()
}

fn import(command: &str) -> Graph {
    let mut graph = Graph::new();
    let report = parse_ffmpeg_command(command, &registry(), &mut graph).unwrap();
    assert!(
        report.diagnostics.is_empty(),
        "unexpected diagnostics: {:?}",
        report.diagnostics
    );
    graph
}

fn roundtrip(command: &str) -> String {
    emit_command(&import(command)).unwrap()
}

// =============================================================================
// Command -> Graph -> Command
// =============================================================================

#[test]
fn test_roundtrip_simple_transcode() {
    assert_eq!(
        roundtrip("ffmpeg -i in.mp4 -c:v libx264 -crf 23 out.mp4"),
        "-i in.mp4 -c:v libx264 -crf 23 out.mp4"
    );
}

#[test]
fn test_roundtrip_overlay_filter_graph() {
    assert_eq!(
        roundtrip(
            "ffmpeg -i a.mp4 -i b.mp4 -filter_complex \"[0:v][1:v]overlay=x=10:y=20[v]\" -map [v] -map 0:a out.mp4"
        ),
        "-i a.mp4 -i b.mp4 -filter_complex \"[0:v][1:v]overlay=x=10:y=20[v]\" -map [v] -map 0:a out.mp4"
    );
}

#[test]
fn test_roundtrip_positional_filter_options_become_named() {
    assert_eq!(
        roundtrip("ffmpeg -i in.mp4 -filter_complex \"[0:v]scale=640:480[s]\" -map [s] out.mp4"),
        "-i in.mp4 -filter_complex \"[0:v]scale=w=640:h=480[s]\" -map [s] out.mp4"
    );
}

#[test]
fn test_roundtrip_flags_and_stream_specifiers() {
    assert_eq!(
        roundtrip("ffmpeg -ss 10 -i in.mp4 -b:v 2M -y out.mp4"),
        "-ss 10 -i in.mp4 -b:v 2M -y out.mp4"
    );
}

#[test]
fn test_roundtrip_decoder_and_muxer() {
    assert_eq!(
        roundtrip("ffmpeg -c:v h264 -i in.mp4 -c:a aac -f matroska out.mkv"),
        "-c:v h264 -i in.mp4 -c:a aac -f matroska out.mkv"
    );
}

#[test]
fn test_roundtrip_keeps_option_order_within_slice() {
    assert_eq!(
        roundtrip("ffmpeg -i in.mp4 -c:v libx264 -preset slow -crf 20 -c:a aac -b:a 128k out.mp4"),
        "-i in.mp4 -c:v libx264 -preset slow -crf 20 -c:a aac -b:a 128k out.mp4"
    );
    assert_eq!(
        roundtrip("ffmpeg -i in.mp4 -b:a 96k -c:a libopus -vbr on -c:v libvpx-vp9 -row-mt 1 -deadline good out.webm"),
        "-i in.mp4 -b:a 96k -c:a libopus -vbr on -c:v libvpx-vp9 -row-mt 1 -deadline good out.webm"
    );
}

#[test]
fn test_emission_is_idempotent() {
    let graph = import(
        "ffmpeg -i a.mp4 -filter_complex \"[0:v]split[x][y];[x]hflip[l];[y]vflip[r];[l][r]hstack[v]\" -map [v] out.mp4",
    );
    let first = emit_command(&graph).unwrap();
    let second = emit_command(&graph).unwrap();
    assert_eq!(first, second);
    assert!(first.contains("[l][r]hstack[v]"));
}

#[test]
fn test_reimporting_emitted_command_is_stable() {
    let once = roundtrip("ffmpeg -i in.mp4 -map 0:v -map 0:a:1 -c:v libx265 -crf 28 out.mkv");
    let twice = roundtrip(&format!("ffmpeg {once}"));
    assert_eq!(once, twice);
}

#[test]
fn test_missing_output_produces_no_command() {
    let mut graph = import("ffmpeg -i in.mp4 -c:v libx264 out.mp4");
    for id in graph.ids_of_kind(NodeKind::Output) {
        graph.remove_node(id).unwrap();
    }
    assert!(!graph.is_empty());
    let err = CommandEmitter::new()
        .emit(&graph, &EmitOptions::default())
        .unwrap_err();
    assert!(matches!(err, CoreError::MissingOutput));
}

// =============================================================================
// Serialization & Merge
// =============================================================================

#[test]
fn test_serialized_graph_emits_the_same_command() {
    let graph = import("ffmpeg -i in.mp4 -vn -c:a libopus -b:a 96k out.opus");
    let json = graph.serialize().to_json().unwrap();
    let restored = Graph::from_serialized(&SerializedGraph::from_json(&json).unwrap()).unwrap();
    assert_eq!(
        emit_command(&restored).unwrap(),
        emit_command(&graph).unwrap()
    );
}

#[test]
fn test_merge_produces_disjoint_ids() {
    let a = import("ffmpeg -i a.mp4 a.mkv").serialize();
    let b = import("ffmpeg -i b.mp4 -c:v libx264 b.mkv").serialize();
    let merged = merge_graphs_with_rng(&a, &b, 200.0, &mut StdRng::seed_from_u64(7));

    let originals: HashSet<u32> = a.nodes.iter().map(|n| n.id).collect();
    let merged_ids: Vec<u32> = merged.nodes.iter().map(|n| n.id).collect();
    let unique: HashSet<u32> = merged_ids.iter().copied().collect();
    assert_eq!(unique.len(), merged_ids.len());
    assert_eq!(merged_ids.len(), a.nodes.len() + b.nodes.len());
    assert!(merged.nodes[a.nodes.len()..]
        .iter()
        .all(|n| !originals.contains(&n.id)));

    let link_ids: HashSet<u32> = merged.links.iter().map(|l| l.id()).collect();
    assert_eq!(link_ids.len(), merged.links.len());
    for link in &merged.links {
        assert!(unique.contains(&link.1));
        assert!(unique.contains(&link.3));
    }

    let graph = Graph::from_serialized(&merged).unwrap();
    let command = emit_command(&graph).unwrap();
    assert_eq!(
        command,
        "-i a.mp4 -i b.mp4 a.mkv -c:v libx264 b.mkv"
    );
}

// =============================================================================
// Expansion & History
// =============================================================================

#[tokio::test]
async fn test_expand_wildcard_inputs_from_disk() {
    let dir = tempfile::TempDir::new().unwrap();
    for name in ["clip1.mp4", "clip2.mp4", "other.mov"] {
        std::fs::write(dir.path().join(name), b"").unwrap();
    }

    let expander = Expander::new(GlobPathResolver::new().with_base_dir(dir.path()));
    let result = expander
        .expand("ffmpeg -i \"clip*.mp4\" out_{name}.mp4")
        .await
        .unwrap();
    assert_eq!(
        result.commands,
        vec![
            "ffmpeg -i clip1.mp4 out_clip1.mp4",
            "ffmpeg -i clip2.mp4 out_clip2.mp4",
        ]
    );

    // Every expanded command imports cleanly.
    for command in &result.commands {
        let graph = import(command);
        assert_eq!(graph.ids_of_kind(NodeKind::Input).len(), 1);
    }
}

#[tokio::test]
async fn test_expand_without_matches_fails() {
    let dir = tempfile::TempDir::new().unwrap();
    let expander = Expander::new(GlobPathResolver::new().with_base_dir(dir.path()));
    let err = expander
        .expand("ffmpeg -i \"*.wav\" out_*.flac")
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::EmptyExpansion { .. }));
}

#[test]
fn test_history_undo_over_imports() {
    let registry = registry();
    let mut graph = Graph::new();
    let mut history = GraphHistory::new(&graph).unwrap();

    for i in 0..12 {
        parse_ffmpeg_command(&format!("ffmpeg -i in{i}.mp4 out{i}.mp4"), &registry, &mut graph)
            .unwrap();
        history.enqueue_snapshot(&graph).unwrap();
        history.flush();
    }
    assert!(history.len() <= 10);

    let mut undone = 0;
    while history.undo(&mut graph).unwrap() {
        undone += 1;
    }
    assert_eq!(undone, 9);
    assert!(!history.undo(&mut graph).unwrap());
    assert_eq!(graph.ids_of_kind(NodeKind::Input).len(), 3);
    assert_eq!(
        emit_command(&graph).unwrap(),
        "-i in0.mp4 -i in1.mp4 -i in2.mp4 out0.mp4 out1.mp4 out2.mp4"
    );
}
