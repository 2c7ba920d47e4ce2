use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("unknown node: {name}")]
    UnknownNode { name: String },

    #[error("invalid node index: {index}")]
    InvalidNodeIndex { index: usize },

    #[error("unknown parameter: {name}")]
    UnknownParameter { name: String },

    #[error("parameter '{name}' expects {expected}, got {actual}")]
    ParameterTypeMismatch {
        name: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("duplicate parameter: {name}")]
    DuplicateParameter { name: String },

    #[error("invalid value: {message}")]
    InvalidValue { message: String },

    #[error(
        "invalid connection from '{source_node}' port {source_port} to '{target_node}' port {target_port}: {message}"
    )]
    InvalidConnection {
        source_node: String,
        source_port: usize,
        target_node: String,
        target_port: usize,
        message: String,
    },

    #[error("input port {port} of '{node}' is already connected")]
    PortAlreadyConnected { node: String, port: usize },

    #[error("connecting '{source_node}' into '{target_node}' would create a cycle")]
    CyclicConnection {
        source_node: String,
        target_node: String,
    },

    #[error("node '{node}' cannot own child nodes")]
    NotAContainer { node: String },

    #[error("unknown parent bone '{parent}' for bone '{bone}'")]
    UnknownBoneParent { bone: String, parent: String },

    #[error("failed to decode unique data: {message}")]
    UniqueDataDecode { message: String },

    #[error("unique data byte count mismatch: expected {expected}, got {actual}")]
    ByteCountMismatch { expected: usize, actual: usize },

    #[error("recording buffer exhausted: {requested} bytes requested")]
    RecordingBufferExhausted { requested: usize },

    #[error("no recorded data for {what}")]
    NoRecordedData { what: String },

    #[error("io error on '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[cfg(feature = "json")]
    #[error("failed to parse JSON: {message}")]
    JsonParse { message: String },

    #[cfg(feature = "json")]
    #[error("unknown node type '{node_type}' for node '{node}'")]
    JsonUnknownNodeType { node: String, node_type: String },
}
