use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use strum_macros::Display;

/// Raw item as served by `GET /item/{id}.json`.
///
/// Upstream omits fields freely (deleted comments carry little more than an id),
/// so everything is optional.
#[derive(Debug, Deserialize, Clone, PartialEq, Default)]
pub struct Item {
    pub id: Option<u32>,
    pub by: Option<String>,
    pub text: Option<String>,
    pub time: Option<i64>,
    pub kids: Option<Vec<u32>>,
    #[serde(default)]
    pub dead: bool,
    #[serde(default)]
    pub deleted: bool,
    pub title: Option<String>,
    pub url: Option<String>,
    pub score: Option<u32>,
    pub parent: Option<u32>,
}

/// What a fetched node turned out to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum NodeKind {
    Comment,
    Deleted,
    Dead,
    /// Stub for a node whose fetch failed; it never has children.
    Failed,
}

/// One fetched unit of the discussion tree. Never mutated after construction.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: u32,
    pub author: Option<String>,
    pub text: Option<String>,
    pub created_at: Option<i64>,
    pub kind: NodeKind,
    pub child_ids: Vec<u32>,
    pub title: Option<String>,
    pub url: Option<String>,
    pub score: Option<u32>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

impl Node {
    /// Convert a wire item into a node. `requested_id` wins when the payload has no id.
    pub fn from_item(requested_id: u32, item: Item) -> Self {
        let kind = match (item.deleted, item.dead) {
            (true, _) => NodeKind::Deleted,
            (false, true) => NodeKind::Dead,
            (false, false) => NodeKind::Comment,
        };

        Self {
            id: item.id.unwrap_or(requested_id),
            author: non_empty(item.by),
            text: non_empty(item.text),
            created_at: item.time,
            kind,
            child_ids: item.kids.unwrap_or_default(),
            title: non_empty(item.title),
            url: non_empty(item.url),
            score: item.score,
        }
    }

    /// Placeholder recorded when a node could not be fetched.
    pub fn failed(id: u32) -> Self {
        Self {
            id,
            author: None,
            text: None,
            created_at: None,
            kind: NodeKind::Failed,
            child_ids: Vec::new(),
            title: None,
            url: None,
            score: None,
        }
    }

    /// Placeholders render a fixed marker instead of author/text.
    /// Text shown instead of the body for non-comment nodes.
    pub fn placeholder_label(&self) -> Option<&'static str> {
        match self.kind {
            NodeKind::Comment => None,
            NodeKind::Deleted => Some("[deleted]"),
            NodeKind::Dead => Some("[dead]"),
            NodeKind::Failed => Some("comment unavailable"),
        }
    }
}

/// Reconstructed discussion hierarchy rooted at the browsed item.
#[derive(Debug, Clone, PartialEq)]
pub struct Tree {
    root: Arc<Node>,
    nodes: HashMap<u32, Arc<Node>>,
    truncated: bool,
}

impl Tree {
    pub(crate) fn from_parts(
        root: Arc<Node>,
        mut nodes: HashMap<u32, Arc<Node>>,
        truncated: bool,
    ) -> Self {
        nodes.insert(root.id, Arc::clone(&root));
        Self {
            root,
            nodes,
            truncated,
        }
    }

    /// Assemble a tree from already-fetched nodes. Returns `None` when `root_id`
    /// is not among them.
    pub fn from_nodes(root_id: u32, nodes: Vec<Node>, truncated: bool) -> Option<Self> {
        let nodes: HashMap<u32, Arc<Node>> = nodes
            .into_iter()
            .map(|node| (node.id, Arc::new(node)))
            .collect();
        let root = Arc::clone(nodes.get(&root_id)?);
        Some(Self::from_parts(root, nodes, truncated))
    }

    pub fn root(&self) -> &Node {
        &self.root
    }

    pub fn get(&self, id: u32) -> Option<&Arc<Node>> {
        self.nodes.get(&id)
    }

    /// Number of nodes including the root.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of descendants of the root that were fetched or stubbed.
    pub fn comment_count(&self) -> usize {
        self.nodes.len().saturating_sub(1)
    }

    pub fn failed_count(&self) -> usize {
        self.nodes
            .values()
            .filter(|node| node.kind == NodeKind::Failed)
            .count()
    }

    /// True when a depth or node-count ceiling stopped the build early.
    pub fn truncated(&self) -> bool {
        self.truncated
    }
}

/// Comment ordering applied per sibling group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display)]
pub enum SortOrder {
    #[default]
    #[strum(serialize = "default")]
    Default,
    #[strum(serialize = "by time")]
    ByTime,
}

impl SortOrder {
    pub fn toggled(self) -> Self {
        match self {
            Self::Default => Self::ByTime,
            Self::ByTime => Self::Default,
        }
    }
}

/// A single renderable line: one node plus its nesting level.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub node: Arc<Node>,
    pub depth: usize,
}

/// A bounded slice of rows plus pagination metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub rows: Vec<Row>,
    pub page_number: usize,
    pub total_pages: usize,
    pub total_rows: usize,
    pub page_size: usize,
}

impl Page {
    /// An empty thread still yields one page announcing that there is nothing to show.
    pub fn is_empty_thread(&self) -> bool {
        self.total_rows == 0
    }
}
