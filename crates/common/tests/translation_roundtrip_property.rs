use proptest::prelude::*;
use tandem_common::path::{AwarenessPath, DocumentPath, DocumentPoint};
use tandem_common::translate::Translator;
use tandem_common::tree::{Document, Node, TreeSchema};

#[derive(Debug, Clone)]
enum Inline {
    Text(String),
    Span(Vec<String>),
}

#[derive(Debug, Clone)]
struct BlockSpec {
    marker: bool,
    inlines: Vec<Inline>,
}

fn inline_strategy() -> impl Strategy<Value = Inline> {
    prop_oneof![
        "[a-z ]{1,8}".prop_map(Inline::Text),
        prop::collection::vec("[a-z]{1,5}", 1..4).prop_map(Inline::Span),
    ]
}

fn block_strategy() -> impl Strategy<Value = BlockSpec> {
    (any::<bool>(), prop::collection::vec(inline_strategy(), 1..5))
        .prop_map(|(marker, inlines)| BlockSpec { marker, inlines })
}

fn build(root_marker: bool, blocks: &[BlockSpec]) -> Document {
    let mut top = Vec::new();
    if root_marker {
        top.push(Node::marker());
    }
    for (i, block) in blocks.iter().enumerate() {
        let mut children = Vec::new();
        if block.marker {
            children.push(Node::marker());
        }
        for inline in &block.inlines {
            children.push(match inline {
                Inline::Text(text) => Node::leaf(text.as_str()),
                Inline::Span(texts) => Node::element(texts.iter().map(|t| Node::leaf(t.as_str())).collect())
                    .with_attr("type", "span"),
            });
        }
        top.push(Node::block(&format!("block-{i}"), children));
    }
    Document::new(top)
}

/// Every leaf text slot in the document with its character length.
fn leaf_points(root_marker: bool, blocks: &[BlockSpec]) -> Vec<(Vec<usize>, usize)> {
    let mut out = Vec::new();
    let root_shift = usize::from(root_marker);
    for (i, block) in blocks.iter().enumerate() {
        let block_index = i + root_shift;
        let shift = usize::from(block.marker);
        for (j, inline) in block.inlines.iter().enumerate() {
            match inline {
                Inline::Text(text) => out.push((vec![block_index, j + shift, 0], text.chars().count())),
                Inline::Span(texts) => {
                    for (k, text) in texts.iter().enumerate() {
                        out.push((vec![block_index, j + shift, k, 0], text.chars().count()));
                    }
                }
            }
        }
    }
    out
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn document_points_round_trip_through_awareness(
        root_marker in any::<bool>(),
        blocks in prop::collection::vec(block_strategy(), 1..6),
        pick in any::<prop::sample::Index>(),
        offset_seed in any::<usize>(),
    ) {
        let doc = build(root_marker, &blocks);
        let schema = TreeSchema::default();
        let translator = Translator::new(&doc, &schema);

        let points = leaf_points(root_marker, &blocks);
        let (path, len) = points[pick.index(points.len())].clone();
        // Offsets start at 1 so a point never sits on the boundary shared
        // with the previous leaf, where the inverse prefers the earlier leaf.
        let offset = 1 + offset_seed % len;
        let point = DocumentPoint::new(path, offset);

        let awareness = translator.to_awareness_point(&point).expect("forward translation");
        let back = translator.try_to_document_point(&awareness).expect("inverse translation");
        prop_assert_eq!(back, point);
    }

    #[test]
    fn marker_levels_shift_block_index_by_one(
        root_marker in any::<bool>(),
        blocks in prop::collection::vec(block_strategy(), 1..6),
        pick in any::<prop::sample::Index>(),
    ) {
        let doc = build(root_marker, &blocks);
        let schema = TreeSchema::default();
        let translator = Translator::new(&doc, &schema);

        let i = pick.index(blocks.len());
        let document = translator
            .to_document_block_path(&AwarenessPath::new(vec![i]))
            .expect("block resolves");
        let expected = if root_marker { i + 1 } else { i };
        prop_assert_eq!(document.clone(), DocumentPath::new(vec![expected]));
        prop_assert_eq!(
            translator.to_awareness_block_path(&document).expect("block maps back"),
            AwarenessPath::new(vec![i])
        );
    }

    #[test]
    fn offsets_past_block_end_clamp_to_last_leaf(
        blocks in prop::collection::vec(block_strategy(), 1..4),
        pick in any::<prop::sample::Index>(),
        extra in 0usize..50,
    ) {
        let doc = build(false, &blocks);
        let schema = TreeSchema::default();
        let translator = Translator::new(&doc, &schema);

        let i = pick.index(blocks.len());
        let block = DocumentPath::new(vec![i]);
        let total = schema.content_len(doc_children(&doc, i));
        let clamped = translator.to_document_offset(&block, total + extra).expect("non-empty block");

        let (last_path, last_len) = leaf_points(false, &blocks)
            .into_iter()
            .filter(|(path, _)| path[0] == i)
            .last()
            .expect("block has leaves");
        prop_assert_eq!(clamped, DocumentPoint::new(last_path, last_len));
    }
}

fn doc_children(doc: &Document, index: usize) -> &[Node] {
    use tandem_common::tree::DocumentTree;
    doc.node_at(&[index]).map(Node::children).unwrap_or_default()
}
