use docrag_core::types::Document;
use docrag_hierarchy::{ExtractiveSummarizer, HierarchyTree, Overview, SummaryStore};
use proptest::prelude::*;

fn corpus() -> Vec<Document> {
    vec![
        Document::new("kern", "https://docs.example.org/latest/using/kernels.html", "Kernels", "Kernels are quantum functions. They are compiled ahead of time."),
        Document::new("samp", "https://docs.example.org/latest/using/sampling.html", "Sampling", "Call cudaq.sample on a kernel. It returns measurement counts.")
            .with_code_block("cudaq.sample(kernel)"),
        Document::new("inst", "https://docs.example.org/latest/install.html", "Install", "Install with pip. A docker image is also available."),
    ]
}

#[test]
fn summaries_are_reused_unless_forced() {
    let docs = corpus();
    let (first, reused) = SummaryStore::generate(&docs, &ExtractiveSummarizer, 100, None, false).unwrap();
    assert_eq!((first.len(), reused), (3, 0));
    assert!(first.get("samp").unwrap().has_code);

    let (second, reused) = SummaryStore::generate(&docs, &ExtractiveSummarizer, 100, Some(&first), false).unwrap();
    assert_eq!(reused, 3);
    assert_eq!(first, second);

    let (_, reused) = SummaryStore::generate(&docs, &ExtractiveSummarizer, 100, Some(&first), true).unwrap();
    assert_eq!(reused, 0);
}

#[test]
fn summary_search_narrows_to_documents() {
    let (store, _) = SummaryStore::generate(&corpus(), &ExtractiveSummarizer, 100, None, false).unwrap();
    let hits = store.search(&["kernel".into(), "counts".into()]);
    assert_eq!(hits[0].doc_id, "samp");
    assert_eq!(hits[0].matched_terms, 2);
    assert_eq!(hits[1].doc_id, "kern");
}

#[test]
fn artifacts_survive_json() {
    let docs = corpus();
    let tree = HierarchyTree::build(&docs);
    let (store, _) = SummaryStore::generate(&docs, &ExtractiveSummarizer, 100, None, false).unwrap();
    let overview = Overview::build(&ExtractiveSummarizer, &store, 1000).unwrap();

    let tree2: HierarchyTree = serde_json::from_str(&serde_json::to_string(&tree).unwrap()).unwrap();
    let store2: SummaryStore = serde_json::from_str(&serde_json::to_string(&store).unwrap()).unwrap();
    let overview2: Overview = serde_json::from_str(&serde_json::to_string(&overview).unwrap()).unwrap();
    assert_eq!(tree, tree2);
    assert_eq!(store, store2);
    assert!(overview2.is_current(&store2));
    assert_eq!(tree2.resolve("latest/using").len(), 2);
}

proptest! {
    #[test]
    fn every_document_has_exactly_one_leaf(paths in proptest::collection::vec("[a-c]{1,2}(/[a-c]{1,2}){0,3}", 0..20)) {
        let docs: Vec<Document> = paths
            .iter()
            .enumerate()
            .map(|(i, p)| Document::new(format!("d{i}"), format!("https://h.org/{p}"), "t", "x"))
            .collect();
        let tree = HierarchyTree::build(&docs);
        prop_assert_eq!(tree.len(), docs.len());
        prop_assert_eq!(tree.all_docs().len(), docs.len());
        for (i, p) in paths.iter().enumerate() {
            let id = format!("d{i}");
            prop_assert!(tree.resolve(p).contains(&id));
        }
    }
}
