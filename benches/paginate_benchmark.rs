use criterion::{Criterion, black_box, criterion_group, criterion_main};
use tui_hn_threads::internal::models::{Node, NodeKind, SortOrder, Tree};
use tui_hn_threads::internal::paginate::{flatten, paginate};

/// Root 0 with `count` comments, each replying to the comment `fanout` ids before it.
fn synthetic_tree(count: u32, fanout: u32) -> Tree {
    let mut nodes: Vec<Node> = (0..=count)
        .map(|id| Node {
            id,
            author: Some(format!("user{}", id % 97)),
            text: Some(format!("<p>comment {}</p>", id)),
            created_at: Some(1_700_000_000 - ((id as i64 * 7_919) % 86_400)),
            kind: NodeKind::Comment,
            child_ids: Vec::new(),
            title: None,
            url: None,
            score: None,
        })
        .collect();
    for id in 1..=count {
        let parent = id.saturating_sub(fanout.max(1)) as usize;
        nodes[parent].child_ids.push(id);
    }
    Tree::from_nodes(0, nodes, false).expect("root present")
}

fn benchmark_paginate(c: &mut Criterion) {
    let tree = synthetic_tree(2_000, 5);

    c.bench_function("flatten 2000 default", |b| {
        b.iter(|| flatten(black_box(&tree), SortOrder::Default))
    });

    c.bench_function("flatten 2000 by time", |b| {
        b.iter(|| flatten(black_box(&tree), SortOrder::ByTime))
    });

    c.bench_function("paginate 2000 last page", |b| {
        b.iter(|| paginate(black_box(&tree), SortOrder::ByTime, black_box(10), black_box(i64::MAX)))
    });
}

criterion_group!(benches, benchmark_paginate);
criterion_main!(benches);
