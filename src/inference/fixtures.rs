//! Tiny ONNX models built in memory for tests.
//!
//! Only the protobuf fields these graphs need are declared.

use std::path::{Path, PathBuf};

use prost::Message;

const ELEM_FLOAT: i32 = 1;
const ELEM_INT64: i32 = 7;
const ATTR_INT: i32 = 2;
const ATTR_INTS: i32 = 7;

#[derive(Clone, PartialEq, Message)]
pub struct ModelProto {
    #[prost(int64, tag = "1")]
    pub ir_version: i64,
    #[prost(message, optional, tag = "7")]
    pub graph: Option<GraphProto>,
    #[prost(message, repeated, tag = "8")]
    pub opset_import: Vec<OperatorSetIdProto>,
}

#[derive(Clone, PartialEq, Message)]
pub struct OperatorSetIdProto {
    #[prost(string, tag = "1")]
    pub domain: String,
    #[prost(int64, tag = "2")]
    pub version: i64,
}

#[derive(Clone, PartialEq, Message)]
pub struct GraphProto {
    #[prost(message, repeated, tag = "1")]
    pub node: Vec<NodeProto>,
    #[prost(string, tag = "2")]
    pub name: String,
    #[prost(message, repeated, tag = "11")]
    pub input: Vec<ValueInfoProto>,
    #[prost(message, repeated, tag = "12")]
    pub output: Vec<ValueInfoProto>,
}

#[derive(Clone, PartialEq, Message)]
pub struct NodeProto {
    #[prost(string, repeated, tag = "1")]
    pub input: Vec<String>,
    #[prost(string, repeated, tag = "2")]
    pub output: Vec<String>,
    #[prost(string, tag = "3")]
    pub name: String,
    #[prost(string, tag = "4")]
    pub op_type: String,
    #[prost(message, repeated, tag = "5")]
    pub attribute: Vec<AttributeProto>,
}

#[derive(Clone, PartialEq, Message)]
pub struct AttributeProto {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(int64, tag = "3")]
    pub i: i64,
    #[prost(int64, repeated, tag = "8")]
    pub ints: Vec<i64>,
    #[prost(int32, tag = "20")]
    pub attr_type: i32,
}

#[derive(Clone, PartialEq, Message)]
pub struct ValueInfoProto {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(message, optional, tag = "2")]
    pub value_type: Option<TypeProto>,
}

#[derive(Clone, PartialEq, Message)]
pub struct TypeProto {
    #[prost(message, optional, tag = "1")]
    pub tensor_type: Option<TensorTypeProto>,
}

#[derive(Clone, PartialEq, Message)]
pub struct TensorTypeProto {
    #[prost(int32, tag = "1")]
    pub elem_type: i32,
    #[prost(message, optional, tag = "2")]
    pub shape: Option<TensorShapeProto>,
}

#[derive(Clone, PartialEq, Message)]
pub struct TensorShapeProto {
    #[prost(message, repeated, tag = "1")]
    pub dim: Vec<Dimension>,
}

#[derive(Clone, PartialEq, Message)]
pub struct Dimension {
    #[prost(int64, tag = "1")]
    pub dim_value: i64,
}

fn tensor(name: &str, elem_type: i32, dims: &[i64]) -> ValueInfoProto {
    ValueInfoProto {
        name: name.to_string(),
        value_type: Some(TypeProto {
            tensor_type: Some(TensorTypeProto {
                elem_type,
                shape: Some(TensorShapeProto {
                    dim: dims.iter().map(|&d| Dimension { dim_value: d }).collect(),
                }),
            }),
        }),
    }
}

fn node(name: &str, op_type: &str, input: &str, output: &str, attribute: Vec<AttributeProto>) -> NodeProto {
    NodeProto {
        input: vec![input.to_string()],
        output: vec![output.to_string()],
        name: name.to_string(),
        op_type: op_type.to_string(),
        attribute,
    }
}

fn ints(name: &str, values: &[i64]) -> AttributeProto {
    AttributeProto {
        name: name.to_string(),
        ints: values.to_vec(),
        attr_type: ATTR_INTS,
        ..Default::default()
    }
}

fn int(name: &str, value: i64) -> AttributeProto {
    AttributeProto {
        name: name.to_string(),
        i: value,
        attr_type: ATTR_INT,
        ..Default::default()
    }
}

fn model(nodes: Vec<NodeProto>, input: ValueInfoProto, output: ValueInfoProto) -> Vec<u8> {
    ModelProto {
        ir_version: 8,
        graph: Some(GraphProto {
            node: nodes,
            name: "fixture".to_string(),
            input: vec![input],
            output: vec![output],
        }),
        opset_import: vec![OperatorSetIdProto { domain: String::new(), version: 13 }],
    }
    .encode_to_vec()
}

/// NHWC image in, per-channel sigmoid out; the pooled means are internal.
pub fn feature_extractor_model() -> Vec<u8> {
    model(
        vec![
            node("to_nchw", "Transpose", "input", "nchw", vec![ints("perm", &[0, 3, 1, 2])]),
            node("pool", "GlobalAveragePool", "nchw", "pooled", vec![]),
            node("flatten", "Flatten", "pooled", "flat", vec![]),
            node("head", "Sigmoid", "flat", "predictions", vec![]),
        ],
        tensor("input", ELEM_FLOAT, &[1, 224, 224, 3]),
        tensor("predictions", ELEM_FLOAT, &[1, 3]),
    )
}

pub fn single_node_model() -> Vec<u8> {
    model(
        vec![node("head", "Sigmoid", "x", "y", vec![])],
        tensor("x", ELEM_FLOAT, &[1, 3]),
        tensor("y", ELEM_FLOAT, &[1, 3]),
    )
}

/// `probabilities` = mean of the embedding, as a single positive column
pub fn probability_classifier_model() -> Vec<u8> {
    model(
        vec![node(
            "mean",
            "ReduceMean",
            "features",
            "probabilities",
            vec![ints("axes", &[1]), int("keepdims", 1)],
        )],
        tensor("features", ELEM_FLOAT, &[1, 3]),
        tensor("probabilities", ELEM_FLOAT, &[1, 1]),
    )
}

/// `label` = round(mean of the embedding), as int64 or as float
pub fn label_classifier_model(int_labels: bool) -> Vec<u8> {
    let mut nodes = vec![node(
        "mean",
        "ReduceMean",
        "features",
        "mean_out",
        vec![ints("axes", &[1]), int("keepdims", 1)],
    )];
    let elem_type = if int_labels {
        nodes.push(node("round", "Round", "mean_out", "rounded", vec![]));
        nodes.push(node("cast", "Cast", "rounded", "label", vec![int("to", ELEM_INT64.into())]));
        ELEM_INT64
    } else {
        nodes.push(node("round", "Round", "mean_out", "label", vec![]));
        ELEM_FLOAT
    };

    model(
        nodes,
        tensor("features", ELEM_FLOAT, &[1, 3]),
        tensor("label", elem_type, &[1, 1]),
    )
}

pub fn write(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, bytes).unwrap();
    path
}
