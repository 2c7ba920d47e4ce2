use crate::{
    AnimGraphId, AnimGraphNode, BlendTreeNode, Error, FinalNode, NodeId, NodeIndex, ParameterDef,
};
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PortKind {
    Pose,
    Motion,
    /// Float, int and bool values all travel through number ports.
    Number,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Connection {
    pub source: NodeIndex,
    pub source_port: usize,
}

#[derive(Clone, Debug)]
pub struct InputPort {
    pub name: String,
    pub kind: PortKind,
    pub connection: Option<Connection>,
}

#[derive(Clone, Debug)]
pub struct OutputPort {
    pub name: String,
    pub kind: PortKind,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeCategory {
    Sources,
    Blending,
    Controllers,
    Logic,
    Math,
    Misc,
}

/// Shared, static part of every node: identity, ports, incoming connections and hierarchy.
#[derive(Clone, Debug)]
pub struct NodeBase {
    pub(crate) id: NodeId,
    pub(crate) index: NodeIndex,
    pub(crate) name: String,
    pub(crate) inputs: Vec<InputPort>,
    pub(crate) outputs: Vec<OutputPort>,
    pub(crate) parent: Option<NodeIndex>,
    pub(crate) children: Vec<NodeIndex>,
    pub(crate) disabled: bool,
    pub(crate) color: u32,
}

impl NodeBase {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: NodeId::next(),
            index: NodeIndex(0),
            name: name.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            parent: None,
            children: Vec::new(),
            disabled: false,
            color: 0xFFFF_FFFF,
        }
    }

    pub fn with_input(mut self, name: impl Into<String>, kind: PortKind) -> Self {
        self.inputs.push(InputPort {
            name: name.into(),
            kind,
            connection: None,
        });
        self
    }

    pub fn with_output(mut self, name: impl Into<String>, kind: PortKind) -> Self {
        self.outputs.push(OutputPort {
            name: name.into(),
            kind,
        });
        self
    }

    pub fn with_color(mut self, color: u32) -> Self {
        self.color = color;
        self
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn index(&self) -> NodeIndex {
        self.index
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn inputs(&self) -> &[InputPort] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[OutputPort] {
        &self.outputs
    }

    pub fn parent(&self) -> Option<NodeIndex> {
        self.parent
    }

    pub fn children(&self) -> &[NodeIndex] {
        &self.children
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    pub fn color(&self) -> u32 {
        self.color
    }

    /// Connected input ports in port order.
    pub fn connections(&self) -> impl Iterator<Item = (usize, Connection)> + '_ {
        self.inputs
            .iter()
            .enumerate()
            .filter_map(|(port, input)| input.connection.map(|c| (port, c)))
    }

    pub fn num_connections(&self) -> usize {
        self.inputs
            .iter()
            .filter(|input| input.connection.is_some())
            .count()
    }

    pub fn input_source(&self, port: usize) -> Option<NodeIndex> {
        self.inputs
            .get(port)
            .and_then(|input| input.connection)
            .map(|c| c.source)
    }

    pub fn is_input_connected(&self, port: usize) -> bool {
        self.input_source(port).is_some()
    }

    pub fn has_output_pose(&self) -> bool {
        self.outputs.iter().any(|o| o.kind == PortKind::Pose)
    }
}

/// Shared, read-only blend graph. Evaluated through one [`crate::AnimGraphInstance`] per actor.
pub struct AnimGraph {
    id: AnimGraphId,
    name: String,
    nodes: Vec<Box<dyn AnimGraphNode>>,
    root: NodeIndex,
    parameters: Vec<ParameterDef>,
}

impl std::fmt::Debug for AnimGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnimGraph")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("num_nodes", &self.nodes.len())
            .field("parameters", &self.parameters)
            .finish()
    }
}

impl AnimGraph {
    pub fn id(&self) -> AnimGraphId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root(&self) -> NodeIndex {
        self.root
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn node(&self, index: NodeIndex) -> Option<&dyn AnimGraphNode> {
        self.nodes.get(index.0).map(|n| n.as_ref())
    }

    /// Indices handed out by this graph are always in range.
    pub(crate) fn node_at(&self, index: NodeIndex) -> &dyn AnimGraphNode {
        self.nodes[index.0].as_ref()
    }

    pub fn node_as<T: AnimGraphNode + 'static>(&self, index: NodeIndex) -> Option<&T> {
        self.node(index)?.as_any().downcast_ref::<T>()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &dyn AnimGraphNode> {
        self.nodes.iter().map(|n| n.as_ref())
    }

    pub fn find_node_by_name(&self, name: &str) -> Option<NodeIndex> {
        self.nodes
            .iter()
            .position(|n| n.base().name == name)
            .map(NodeIndex)
    }

    pub fn find_node_by_id(&self, id: NodeId) -> Option<NodeIndex> {
        self.nodes
            .iter()
            .position(|n| n.base().id == id)
            .map(NodeIndex)
    }

    pub fn parameters(&self) -> &[ParameterDef] {
        &self.parameters
    }

    pub fn find_parameter_index(&self, name: &str) -> Option<usize> {
        self.parameters.iter().position(|p| p.name == name)
    }

    /// Every object reachable from the root through the child hierarchy, parents before children.
    pub fn recursive_collect_objects(&self) -> Vec<NodeIndex> {
        let mut out = Vec::with_capacity(self.nodes.len());
        self.collect_objects(self.root, &mut out);
        out
    }

    fn collect_objects(&self, node: NodeIndex, out: &mut Vec<NodeIndex>) {
        out.push(node);
        for &child in self.node_at(node).base().children() {
            self.collect_objects(child, out);
        }
    }
}

/// Builds and validates an [`AnimGraph`]. The root is a blend tree with its final node already in
/// place.
pub struct AnimGraphBuilder {
    name: String,
    nodes: Vec<Box<dyn AnimGraphNode>>,
    root: NodeIndex,
    parameters: Vec<ParameterDef>,
}

impl AnimGraphBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        let mut builder = Self {
            name: name.into(),
            nodes: Vec::new(),
            root: NodeIndex(0),
            parameters: Vec::new(),
        };
        let root = builder.push_node(None, Box::new(BlendTreeNode::new("Root")));
        builder.root = root;
        let final_node = builder.push_node(Some(root), Box::new(FinalNode::new("Final")));
        builder.set_final_node(root, final_node);
        builder
    }

    pub fn root(&self) -> NodeIndex {
        self.root
    }

    pub fn add_node<N: AnimGraphNode + 'static>(
        &mut self,
        parent: NodeIndex,
        node: N,
    ) -> Result<NodeIndex, Error> {
        let parent_node = self.get(parent)?;
        if !parent_node.is_container() {
            return Err(Error::NotAContainer {
                node: parent_node.base().name.clone(),
            });
        }
        Ok(self.push_node(Some(parent), Box::new(node)))
    }

    /// Adds a nested blend tree together with its final node.
    pub fn add_blend_tree(
        &mut self,
        parent: NodeIndex,
        name: impl Into<String>,
    ) -> Result<NodeIndex, Error> {
        let tree = self.add_node(parent, BlendTreeNode::new(name))?;
        let final_node = self.push_node(Some(tree), Box::new(FinalNode::new("Final")));
        self.set_final_node(tree, final_node);
        Ok(tree)
    }

    pub fn final_node(&self, tree: NodeIndex) -> Option<NodeIndex> {
        self.nodes
            .get(tree.0)?
            .as_any()
            .downcast_ref::<BlendTreeNode>()?
            .final_node()
    }

    pub fn find_node(&self, name: &str) -> Option<NodeIndex> {
        self.nodes
            .iter()
            .position(|n| n.base().name == name)
            .map(NodeIndex)
    }

    pub fn add_parameter(&mut self, parameter: ParameterDef) -> Result<usize, Error> {
        if self.parameters.iter().any(|p| p.name == parameter.name) {
            return Err(Error::DuplicateParameter {
                name: parameter.name,
            });
        }
        self.parameters.push(parameter);
        Ok(self.parameters.len() - 1)
    }

    pub fn set_disabled(&mut self, node: NodeIndex, disabled: bool) -> Result<(), Error> {
        self.get_mut(node)?.base_mut().disabled = disabled;
        Ok(())
    }

    pub fn set_color(&mut self, node: NodeIndex, color: u32) -> Result<(), Error> {
        self.get_mut(node)?.base_mut().color = color;
        Ok(())
    }

    pub fn connect(
        &mut self,
        source: NodeIndex,
        source_port: usize,
        target: NodeIndex,
        target_port: usize,
    ) -> Result<(), Error> {
        let source_node = self.get(source)?;
        let target_node = self.get(target)?;
        let invalid = |message: &str| Error::InvalidConnection {
            source_node: source_node.base().name.clone(),
            source_port,
            target_node: target_node.base().name.clone(),
            target_port,
            message: message.to_string(),
        };

        let Some(output) = source_node.base().outputs.get(source_port) else {
            return Err(invalid("source port out of range"));
        };
        let Some(input) = target_node.base().inputs.get(target_port) else {
            return Err(invalid("target port out of range"));
        };
        if output.kind != input.kind {
            return Err(invalid("incompatible port types"));
        }
        if source_node.base().parent != target_node.base().parent {
            return Err(invalid("nodes live in different blend trees"));
        }
        if input.connection.is_some() {
            return Err(Error::PortAlreadyConnected {
                node: target_node.base().name.clone(),
                port: target_port,
            });
        }
        if source == target || self.depends_on(source, target) {
            return Err(Error::CyclicConnection {
                source_node: source_node.base().name.clone(),
                target_node: target_node.base().name.clone(),
            });
        }

        self.get_mut(target)?.base_mut().inputs[target_port].connection = Some(Connection {
            source,
            source_port,
        });
        Ok(())
    }

    /// Routes the first pose output of `source` into the final node of `tree`.
    pub fn connect_to_final(&mut self, tree: NodeIndex, source: NodeIndex) -> Result<(), Error> {
        let final_node = self.final_node(tree).ok_or_else(|| Error::NotAContainer {
            node: self
                .nodes
                .get(tree.0)
                .map(|n| n.base().name.clone())
                .unwrap_or_default(),
        })?;
        let port = self
            .get(source)?
            .base()
            .outputs
            .iter()
            .position(|o| o.kind == crate::PortKind::Pose)
            .unwrap_or(0);
        self.connect(source, port, final_node, 0)
    }

    pub fn build(self) -> Arc<AnimGraph> {
        tracing::debug!(
            graph = %self.name,
            nodes = self.nodes.len(),
            parameters = self.parameters.len(),
            "built anim graph"
        );
        Arc::new(AnimGraph {
            id: AnimGraphId::next(),
            name: self.name,
            nodes: self.nodes,
            root: self.root,
            parameters: self.parameters,
        })
    }

    fn push_node(
        &mut self,
        parent: Option<NodeIndex>,
        mut node: Box<dyn AnimGraphNode>,
    ) -> NodeIndex {
        let index = NodeIndex(self.nodes.len());
        {
            let base = node.base_mut();
            base.index = index;
            base.parent = parent;
        }
        self.nodes.push(node);
        if let Some(parent) = parent {
            self.nodes[parent.0].base_mut().children.push(index);
        }
        index
    }

    fn set_final_node(&mut self, tree: NodeIndex, final_node: NodeIndex) {
        if let Some(tree) = self
            .nodes
            .get_mut(tree.0)
            .and_then(|n| n.as_any_mut().downcast_mut::<BlendTreeNode>())
        {
            tree.set_final_node(final_node);
        }
    }

    /// True when `node` already (transitively) reads from `upstream`.
    fn depends_on(&self, node: NodeIndex, upstream: NodeIndex) -> bool {
        let mut stack = vec![node];
        let mut visited = vec![false; self.nodes.len()];
        while let Some(current) = stack.pop() {
            if current == upstream {
                return true;
            }
            if std::mem::replace(&mut visited[current.0], true) {
                continue;
            }
            stack.extend(self.nodes[current.0].base().connections().map(|(_, c)| c.source));
        }
        false
    }

    fn get(&self, index: NodeIndex) -> Result<&dyn AnimGraphNode, Error> {
        self.nodes
            .get(index.0)
            .map(|n| n.as_ref())
            .ok_or(Error::InvalidNodeIndex { index: index.0 })
    }

    fn get_mut(&mut self, index: NodeIndex) -> Result<&mut dyn AnimGraphNode, Error> {
        match self.nodes.get_mut(index.0) {
            Some(node) => Ok(node.as_mut()),
            None => Err(Error::InvalidNodeIndex { index: index.0 }),
        }
    }
}
