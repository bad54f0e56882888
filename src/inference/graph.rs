//! ONNX graph inspection for the embedding tap
//!
//! Exported CNNs usually declare only their final prediction as a graph
//! output, with the pooling layer buried inside. We read just enough of the
//! `ModelProto` to find the tap node, then expose its output by appending a
//! graph-output patch to the serialized model. Protobuf merges a repeated
//! field across concatenated messages, so every other field of the model is
//! left untouched.

use prost::Message;

use super::error::PipelineError;

const MODEL_NAME: &str = "feature extractor";

/// `ModelProto`, reduced to the graph
#[derive(Clone, PartialEq, Message)]
struct ModelView {
    #[prost(message, optional, tag = "7")]
    graph: Option<GraphView>,
}

/// `GraphProto`, reduced to nodes and declared outputs
#[derive(Clone, PartialEq, Message)]
struct GraphView {
    #[prost(message, repeated, tag = "1")]
    node: Vec<NodeView>,
    #[prost(message, repeated, tag = "12")]
    output: Vec<ValueInfoView>,
}

#[derive(Clone, PartialEq, Message)]
struct NodeView {
    #[prost(string, repeated, tag = "2")]
    output: Vec<String>,
    #[prost(string, tag = "3")]
    name: String,
    #[prost(string, tag = "4")]
    op_type: String,
}

#[derive(Clone, PartialEq, Message)]
struct ValueInfoView {
    #[prost(string, tag = "1")]
    name: String,
}

/// One node of the graph, in topological order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphNode {
    pub name: String,
    pub op_type: String,
    pub outputs: Vec<String>,
}

impl GraphNode {
    fn is_global_average_pooling(&self) -> bool {
        if self.op_type == "GlobalAveragePool" {
            return true;
        }
        // Keras GlobalAveragePooling2D comes out of tf2onnx as a named ReduceMean
        let lower = self.name.to_ascii_lowercase();
        lower.contains("global_average_pooling")
            || lower.contains("globalaveragepool")
            || lower.split(|c: char| !c.is_ascii_alphanumeric()).any(|part| part == "gap")
    }
}

/// Pick the node whose output becomes the embedding.
///
/// Prefers the last global-average-pooling node, then the penultimate node.
/// A graph with fewer than two nodes has no usable tap.
pub fn select_embedding_node(nodes: &[GraphNode]) -> Option<usize> {
    let with_output = |idx: &usize| !nodes[*idx].outputs.is_empty();

    let gap = nodes
        .iter()
        .rposition(|n| n.is_global_average_pooling())
        .filter(with_output);
    if gap.is_some() {
        return gap;
    }

    nodes.len().checked_sub(2).filter(with_output)
}

/// Model bytes with the embedding tap declared as a graph output
#[derive(Debug, Clone)]
pub struct TappedModel {
    pub bytes: Vec<u8>,
    pub tap: String,
}

/// Locate the embedding tap and make sure the graph exposes it.
pub fn expose_embedding_tap(bytes: Vec<u8>) -> Result<TappedModel, PipelineError> {
    let model = ModelView::decode(bytes.as_slice())
        .map_err(|e| PipelineError::configuration(MODEL_NAME, format!("invalid ONNX model: {}", e)))?;
    let graph = model
        .graph
        .ok_or_else(|| PipelineError::configuration(MODEL_NAME, "ONNX model has no graph"))?;

    let nodes: Vec<GraphNode> = graph
        .node
        .into_iter()
        .map(|n| GraphNode {
            name: n.name,
            op_type: n.op_type,
            outputs: n.output,
        })
        .collect();

    let idx = select_embedding_node(&nodes).ok_or_else(|| {
        PipelineError::configuration(
            MODEL_NAME,
            format!("no global average pooling or penultimate layer among {} nodes", nodes.len()),
        )
    })?;
    let node = &nodes[idx];
    let tap = node.outputs[0].clone();

    tracing::debug!(
        "Embedding tap: node {} ({}) -> {}",
        node.name,
        node.op_type,
        tap
    );

    if graph.output.iter().any(|o| o.name == tap) {
        return Ok(TappedModel { bytes, tap });
    }

    let patch = ModelView {
        graph: Some(GraphView {
            node: Vec::new(),
            output: vec![ValueInfoView { name: tap.clone() }],
        }),
    };
    let mut bytes = bytes;
    bytes.extend_from_slice(&patch.encode_to_vec());

    Ok(TappedModel { bytes, tap })
}
