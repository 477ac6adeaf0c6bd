use crate::internal::models::{NodeKind, Page, Row, SortOrder, Tree};
use crate::internal::paginate::flatten;
use anyhow::{Context, Result};
use jiff::Zoned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use strum_macros::Display;

/// File format of an export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Json,
    Csv,
}

impl ExportFormat {
    /// `.csv` (any case) selects CSV; every other path is written as JSON.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("csv") => Self::Csv,
            _ => Self::Json,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Csv => "csv",
        }
    }
}

const CSV_HEADER: [&str; 7] = ["id", "parent_id", "depth", "by", "time", "text", "status"];

/// One flat CSV record. Field order matches `CSV_HEADER`.
#[derive(Debug, Serialize)]
struct CsvRecord<'a> {
    id: u32,
    parent_id: u32,
    depth: usize,
    by: Option<&'a str>,
    time: Option<i64>,
    text: Option<&'a str>,
    status: String,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct ExportedComment {
    pub id: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<i64>,
    pub deleted: bool,
    pub dead: bool,
    pub unavailable: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ExportedComment>,
}

#[derive(Debug, Serialize)]
struct ExportedThread {
    id: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    by: Option<String>,
    truncated: bool,
    comments: Vec<ExportedComment>,
}

#[derive(Debug, Serialize)]
struct ExportedRow {
    depth: usize,
    #[serde(flatten)]
    comment: ExportedComment,
}

#[derive(Debug, Serialize)]
struct ExportedPage {
    page_number: usize,
    total_pages: usize,
    total_rows: usize,
    rows: Vec<ExportedRow>,
}

fn exported(row: &Row) -> ExportedComment {
    let node = &row.node;
    ExportedComment {
        id: node.id,
        by: node.author.clone(),
        text: node.text.clone(),
        time: node.created_at,
        deleted: node.kind == NodeKind::Deleted,
        dead: node.kind == NodeKind::Dead,
        unavailable: node.kind == NodeKind::Failed,
        children: Vec::new(),
    }
}

/// Re-nest preorder rows into a comment forest without recursion.
pub fn nest(rows: &[Row]) -> Vec<ExportedComment> {
    let mut roots = Vec::new();
    let mut open: Vec<(usize, ExportedComment)> = Vec::new();

    for row in rows {
        while let Some((depth, _)) = open.last()
            && *depth >= row.depth
        {
            close_last(&mut open, &mut roots);
        }
        open.push((row.depth, exported(row)));
    }
    while !open.is_empty() {
        close_last(&mut open, &mut roots);
    }
    roots
}

fn close_last(open: &mut Vec<(usize, ExportedComment)>, roots: &mut Vec<ExportedComment>) {
    if let Some((_, done)) = open.pop() {
        match open.last_mut() {
            Some((_, parent)) => parent.children.push(done),
            None => roots.push(done),
        }
    }
}

/// Whole thread as nested JSON.
pub fn export_tree_json(tree: &Tree, sort_order: SortOrder) -> Result<String> {
    let root = tree.root();
    let thread = ExportedThread {
        id: root.id,
        title: root.title.clone(),
        by: root.author.clone(),
        truncated: tree.truncated(),
        comments: nest(&flatten(tree, sort_order)),
    };
    serde_json::to_string_pretty(&thread).context("Failed to serialize thread")
}

/// One page as flat, depth-annotated rows.
pub fn export_page_json(page: &Page) -> Result<String> {
    let exported_page = ExportedPage {
        page_number: page.page_number,
        total_pages: page.total_pages,
        total_rows: page.total_rows,
        rows: page
            .rows
            .iter()
            .map(|row| ExportedRow {
                depth: row.depth,
                comment: exported(row),
            })
            .collect(),
    };
    serde_json::to_string_pretty(&exported_page).context("Failed to serialize page")
}

/// Parent id of each preorder row. Top-level rows hang off `root_id`.
fn parent_ids(rows: &[Row], root_id: u32) -> Vec<u32> {
    let mut ancestors: Vec<u32> = Vec::new();
    rows.iter()
        .map(|row| {
            ancestors.truncate(row.depth);
            let parent = ancestors.last().copied().unwrap_or(root_id);
            ancestors.push(row.node.id);
            parent
        })
        .collect()
}

fn write_csv<'a>(rows: impl IntoIterator<Item = (&'a Row, u32)>) -> Result<String> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    writer
        .write_record(CSV_HEADER)
        .context("Failed to write CSV header")?;

    for (row, parent_id) in rows {
        let node = &row.node;
        writer
            .serialize(CsvRecord {
                id: node.id,
                parent_id,
                depth: row.depth,
                by: node.author.as_deref(),
                time: node.created_at,
                text: node.text.as_deref(),
                status: node.kind.to_string(),
            })
            .with_context(|| format!("Failed to write CSV row for {}", node.id))?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("Failed to flush CSV: {}", e.error()))?;
    String::from_utf8(bytes).context("CSV output is not valid UTF-8")
}

/// Whole thread as flat CSV rows in display order, one per comment.
pub fn export_tree_csv(tree: &Tree, sort_order: SortOrder) -> Result<String> {
    let rows = flatten(tree, sort_order);
    let parents = parent_ids(&rows, tree.root().id);
    write_csv(rows.iter().zip(parents))
}

/// One page as CSV rows. Parents come from the full tree, so a reply whose
/// parent sits on an earlier page still names it.
pub fn export_page_csv(tree: &Tree, page: &Page) -> Result<String> {
    let root_id = tree.root().id;
    let all = flatten(tree, SortOrder::Default);
    let parents: HashMap<u32, u32> = all
        .iter()
        .map(|row| row.node.id)
        .zip(parent_ids(&all, root_id))
        .collect();

    write_csv(page.rows.iter().map(|row| {
        let parent = parents.get(&row.node.id).copied().unwrap_or(root_id);
        (row, parent)
    }))
}

/// Whole thread in `format`.
pub fn export_tree(tree: &Tree, sort_order: SortOrder, format: ExportFormat) -> Result<String> {
    match format {
        ExportFormat::Json => export_tree_json(tree, sort_order),
        ExportFormat::Csv => export_tree_csv(tree, sort_order),
    }
}

/// One page in `format`.
pub fn export_page(tree: &Tree, page: &Page, format: ExportFormat) -> Result<String> {
    match format {
        ExportFormat::Json => export_page_json(page),
        ExportFormat::Csv => export_page_csv(tree, page),
    }
}

pub fn default_filename(story_id: u32, format: ExportFormat, now: &Zoned) -> String {
    format!(
        "hn_story_{}_comments_{}.{}",
        story_id,
        now.strftime("%Y%m%d_%H%M%S"),
        format.extension()
    )
}

/// Write `contents` under `dir` using the default file name for `format`.
/// Returns the path written.
pub fn write_export(
    dir: &Path,
    story_id: u32,
    format: ExportFormat,
    contents: &str,
) -> Result<PathBuf> {
    if !dir.exists() {
        fs::create_dir_all(dir).context("Failed to create export directory")?;
    }
    let path = dir.join(default_filename(story_id, format, &Zoned::now()));
    fs::write(&path, contents).with_context(|| format!("Failed to write {}", path.display()))?;
    tracing::info!(%format, "Exported thread {} to {}", story_id, path.display());
    Ok(path)
}
