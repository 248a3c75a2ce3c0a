//! Path tree over source URLs.
//!
//! Every document sits at exactly one leaf: the directories of its URL path
//! become nested nodes and the last segment is its filename.

use std::collections::BTreeMap;

use docrag_core::types::{url_path_segments, DocId, DocSet, Document};
use serde::{Deserialize, Serialize};
use tracing::info;

const LEAF_HEADERS: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocRef {
    pub doc_id: DocId,
    pub title: String,
    pub url: String,
    pub filename: String,
    /// First few section headers, for browsing.
    #[serde(default)]
    pub headers: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HierarchyNode {
    #[serde(default)]
    pub subdirs: BTreeMap<String, HierarchyNode>,
    #[serde(default)]
    pub documents: Vec<DocRef>,
}

impl HierarchyNode {
    fn collect(&self, out: &mut DocSet) {
        out.extend(self.documents.iter().map(|d| d.doc_id.clone()));
        for child in self.subdirs.values() {
            child.collect(out);
        }
    }

    pub fn doc_count(&self) -> usize { self.documents.len() + self.subdirs.values().map(HierarchyNode::doc_count).sum::<usize>() }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HierarchyTree {
    pub root: HierarchyNode,
}

impl HierarchyTree {
    pub fn build(documents: &[Document]) -> Self {
        let mut root = HierarchyNode::default();
        for doc in documents {
            let mut parts = url_path_segments(&doc.url);
            let filename = parts.pop().unwrap_or_else(|| doc.id.clone());
            let mut node = &mut root;
            for part in parts {
                node = node.subdirs.entry(part).or_default();
            }
            node.documents.push(DocRef {
                doc_id: doc.id.clone(),
                title: doc.title.clone(),
                url: doc.url.clone(),
                filename,
                headers: doc.sections.iter().take(LEAF_HEADERS).map(|s| s.text.clone()).collect(),
            });
        }
        sort_leaves(&mut root);
        let tree = Self { root };
        info!(documents = tree.len(), "hierarchy built");
        tree
    }

    pub fn len(&self) -> usize { self.root.doc_count() }

    pub fn is_empty(&self) -> bool { self.len() == 0 }

    pub fn all_docs(&self) -> DocSet {
        let mut out = DocSet::new();
        self.root.collect(&mut out);
        out
    }

    /// The directory node at `path`, if there is one.
    pub fn node(&self, path: &str) -> Option<&HierarchyNode> {
        let mut node = &self.root;
        for part in split_path(path) {
            node = node.subdirs.get(part)?;
        }
        Some(node)
    }

    /// Every document at or below `prefix`, matched segment by segment.
    ///
    /// An empty prefix (or `/`) is the whole corpus. The final segment may
    /// also name a document filename. Unknown prefixes give an empty set.
    pub fn resolve(&self, prefix: &str) -> DocSet {
        let parts = split_path(prefix);
        let mut out = DocSet::new();
        let Some((last, dirs)) = parts.split_last() else {
            self.root.collect(&mut out);
            return out;
        };
        let mut node = &self.root;
        for part in dirs {
            match node.subdirs.get(*part) {
                Some(child) => node = child,
                None => return out,
            }
        }
        if let Some(child) = node.subdirs.get(*last) {
            child.collect(&mut out);
        }
        out.extend(node.documents.iter().filter(|d| d.filename == *last).map(|d| d.doc_id.clone()));
        out
    }
}

fn split_path(path: &str) -> Vec<&str> { path.split('/').filter(|p| !p.is_empty()).collect() }

fn sort_leaves(node: &mut HierarchyNode) {
    node.documents.sort_by(|a, b| a.filename.cmp(&b.filename).then_with(|| a.doc_id.cmp(&b.doc_id)));
    for child in node.subdirs.values_mut() {
        sort_leaves(child);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus() -> Vec<Document> {
        vec![
            Document::new("d1", "https://nvidia.github.io/cuda-quantum/latest/using/examples/bernstein.html", "BV", "x"),
            Document::new("d2", "https://nvidia.github.io/cuda-quantum/latest/using/install.html", "Install", "x"),
            Document::new("d3", "https://nvidia.github.io/cuda-quantum/latest/api/languages/python_api.html", "Python API", "x")
                .with_section(1, "cudaq.sample"),
            Document::new("d4", "https://nvidia.github.io/", "Home", "x"),
        ]
    }

    #[test]
    fn resolve_prefixes() {
        let tree = HierarchyTree::build(&corpus());
        assert_eq!(tree.len(), 4);
        let using = tree.resolve("cuda-quantum/latest/using");
        assert_eq!(using.into_iter().collect::<Vec<_>>(), vec!["d1", "d2"]);
        assert_eq!(tree.resolve("/cuda-quantum/latest/api/").len(), 1);
        assert_eq!(tree.resolve("cuda-quantum/latest/using/install.html").into_iter().collect::<Vec<_>>(), vec!["d2"]);
        assert_eq!(tree.resolve("").len(), 4);
        assert_eq!(tree.resolve("/"), tree.all_docs());
    }

    #[test]
    fn unknown_or_partial_segments_are_empty() {
        let tree = HierarchyTree::build(&corpus());
        assert!(tree.resolve("cuda-quantum/nightly").is_empty());
        // prefix matching is per segment, not per character
        assert!(tree.resolve("cuda-quantum/lat").is_empty());
    }

    #[test]
    fn host_only_url_is_its_own_leaf() {
        let tree = HierarchyTree::build(&corpus());
        assert_eq!(tree.root.documents.len(), 1);
        assert_eq!(tree.root.documents[0].filename, "nvidia.github.io");
        assert_eq!(tree.node("cuda-quantum/latest/api/languages").map(|n| n.documents[0].headers.clone()), Some(vec!["cudaq.sample".to_string()]));
    }
}
