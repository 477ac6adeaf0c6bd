use crate::internal::models::{Node, Page, Row, SortOrder, Tree};
use std::collections::HashSet;
use std::sync::Arc;

/// `max(1, ceil(rows / page_size))`; a page size of zero is treated as one.
pub fn total_pages(row_count: usize, page_size: usize) -> usize {
    row_count.div_ceil(page_size.max(1)).max(1)
}

/// Clamp any requested page number into `[1, total_pages]`.
pub fn clamp_page(page_number: i64, total_pages: usize) -> usize {
    let last = i64::try_from(total_pages.max(1)).unwrap_or(i64::MAX);
    // The clamped value is positive and no larger than `total_pages`.
    page_number.clamp(1, last) as usize
}

/// Depth-first, sibling-order-preserving walk over the root's descendants.
///
/// With `SortOrder::ByTime` each sibling group is reordered by `created_at`
/// ascending (stable, unknown times last) before descending into it, so nesting
/// is preserved. Each id is emitted at most once, and ids the build never
/// fetched are skipped.
pub fn flatten(tree: &Tree, sort_order: SortOrder) -> Vec<Row> {
    let mut rows = Vec::with_capacity(tree.comment_count());
    let mut visited: HashSet<u32> = HashSet::from([tree.root().id]);
    let mut stack: Vec<(u32, usize)> = Vec::new();

    push_children(tree, tree.root(), 0, sort_order, &mut stack);

    while let Some((id, depth)) = stack.pop() {
        if !visited.insert(id) {
            continue;
        }
        let Some(node) = tree.get(id) else {
            continue;
        };
        push_children(tree, node, depth + 1, sort_order, &mut stack);
        rows.push(Row {
            node: Arc::clone(node),
            depth,
        });
    }

    rows
}

fn push_children(
    tree: &Tree,
    node: &Node,
    depth: usize,
    sort_order: SortOrder,
    stack: &mut Vec<(u32, usize)>,
) {
    let mut children = node.child_ids.clone();
    if sort_order == SortOrder::ByTime {
        children.sort_by_key(|id| {
            tree.get(*id)
                .and_then(|child| child.created_at)
                .unwrap_or(i64::MAX)
        });
    }
    // Reversed so the first child is popped first.
    stack.extend(children.into_iter().rev().map(|id| (id, depth)));
}

/// Number of rows the tree flattens into (independent of sort order).
pub fn row_count(tree: &Tree) -> usize {
    flatten(tree, SortOrder::Default).len()
}

/// Slice already-flattened rows into one page.
pub fn page_of(rows: Vec<Row>, page_size: usize, page_number: i64) -> Page {
    let page_size = page_size.max(1);
    let total_rows = rows.len();
    let total_pages = total_pages(total_rows, page_size);
    let page_number = clamp_page(page_number, total_pages);

    let rows = rows
        .into_iter()
        .skip((page_number - 1) * page_size)
        .take(page_size)
        .collect();

    Page {
        rows,
        page_number,
        total_pages,
        total_rows,
        page_size,
    }
}

/// Flatten `tree` under `sort_order` and return the requested page.
/// Out-of-range page numbers are clamped, never rejected.
pub fn paginate(tree: &Tree, sort_order: SortOrder, page_size: usize, page_number: i64) -> Page {
    page_of(flatten(tree, sort_order), page_size, page_number)
}
