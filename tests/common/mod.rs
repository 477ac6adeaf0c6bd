#![allow(dead_code)]

use std::collections::HashMap;
use tui_hn_threads::api::{FetchError, NodeFetcher};
use tui_hn_threads::internal::models::{Node, NodeKind, Tree};

/// Fixed clock for rendering tests.
pub const NOW: i64 = 1_700_000_000;

pub fn node(id: u32, author: Option<&str>, kids: &[u32], time: Option<i64>) -> Node {
    Node {
        id,
        author: author.map(str::to_string),
        text: author.map(|a| format!("<p>Comment by {}</p>", a)),
        created_at: time,
        kind: NodeKind::Comment,
        child_ids: kids.to_vec(),
        title: None,
        url: None,
        score: None,
    }
}

fn with_kind(mut node: Node, kind: NodeKind) -> Node {
    node.kind = kind;
    node.author = None;
    node.text = None;
    node
}

/// Story 100 with a small mixed discussion:
///
/// ```text
/// 100 -> [1, 2, 3]
/// 1 alice -> [4]; 4 bob -> [5]; 5 deleted
/// 2 dead -> [6]; 6 carol
/// 3 failed
/// ```
pub fn sample_nodes() -> Vec<Node> {
    let mut story = node(100, Some("dang"), &[1, 2, 3], Some(NOW - 86_400));
    story.text = None;
    story.title = Some("Show HN: A paginated comment reader".to_string());
    story.url = Some("https://www.example.com/post".to_string());
    story.score = Some(321);

    vec![
        story,
        node(1, Some("alice"), &[4], Some(NOW - 7_200)),
        node(4, Some("bob"), &[5], Some(NOW - 300)),
        with_kind(node(5, None, &[], None), NodeKind::Deleted),
        with_kind(node(2, None, &[6], Some(NOW - 10_000)), NodeKind::Dead),
        node(6, Some("carol"), &[], Some(NOW - 90_000)),
        Node::failed(3),
    ]
}

pub fn sample_tree() -> Tree {
    Tree::from_nodes(100, sample_nodes(), false).expect("root present")
}

/// In-memory fetcher; ids it does not know fail permanently.
pub struct MapFetcher {
    nodes: HashMap<u32, Node>,
}

impl MapFetcher {
    pub fn new(nodes: Vec<Node>) -> Self {
        Self {
            nodes: nodes.into_iter().map(|n| (n.id, n)).collect(),
        }
    }
}

impl NodeFetcher for MapFetcher {
    async fn fetch(&self, id: u32) -> Result<Node, FetchError> {
        self.nodes
            .get(&id)
            .cloned()
            .ok_or_else(|| FetchError::permanent(id, "item not found"))
    }
}
