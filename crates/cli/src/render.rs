use lazytree_core::{OutputNode, Tree};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Free-form node fields from the tree file, everything except `id` and `children`.
pub type Payload = Map<String, Value>;

pub fn label(node: &OutputNode<Payload>) -> &str {
    node.payload()
        .get("label")
        .and_then(Value::as_str)
        .unwrap_or_else(|| node.id())
}

/// Indented outline of the visible part of the tree.
///
/// `-` marks a leaf, `v` an expanded node and `>` a collapsed one. Children
/// are listed only under expanded nodes.
pub fn render_text(tree: &Tree<Payload>) -> String {
    let mut lines = Vec::new();
    if let Some(failure) = &tree.failure {
        lines.push(format!("! {failure}"));
    }
    if let Some(failure) = &tree.trail_failure {
        lines.push(format!("! {failure}"));
    }
    if tree.is_loading {
        lines.push("(loading)".to_string());
    }
    for node in &tree.items {
        render_node(node, &mut lines);
    }
    lines.join("\n")
}

fn render_node(node: &Arc<OutputNode<Payload>>, lines: &mut Vec<String>) {
    let indent = "  ".repeat(node.depth);
    let marker = if !node.has_children() {
        '-'
    } else if node.is_expanded {
        'v'
    } else {
        '>'
    };
    let tag = if node.is_active {
        " [active]"
    } else if node.is_active_trail {
        " [trail]"
    } else {
        ""
    };
    lines.push(format!("{indent}{marker} {}{tag}", label(node)));

    if !node.is_expanded {
        return;
    }
    let children = &node.children;
    if let Some(failure) = &children.failure {
        lines.push(format!("{indent}  ! {failure}"));
    } else if children.is_loading {
        lines.push(format!("{indent}  (loading)"));
    }
    for child in &children.items {
        render_node(child, lines);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lazytree_core::{FetchFailure, FetchKey, LoadableCollection, SourceNode};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn payload(label: Option<&str>) -> Payload {
        let mut payload = Payload::new();
        if let Some(label) = label {
            payload.insert("label".into(), json!(label));
        }
        payload
    }

    fn node(
        id: &str,
        label: Option<&str>,
        depth: usize,
        is_expanded: bool,
        children: LoadableCollection<Arc<OutputNode<Payload>>>,
        has_children: bool,
    ) -> Arc<OutputNode<Payload>> {
        Arc::new(OutputNode {
            source: Arc::new(SourceNode::new(id, has_children, payload(label))),
            is_expanded,
            is_active: false,
            is_active_trail: false,
            depth,
            children,
        })
    }

    fn on_trail(node: Arc<OutputNode<Payload>>, is_active: bool) -> Arc<OutputNode<Payload>> {
        Arc::new(OutputNode {
            source: node.source.clone(),
            is_expanded: node.is_expanded,
            is_active,
            is_active_trail: true,
            depth: node.depth,
            children: node.children.clone(),
        })
    }

    #[test]
    fn renders_only_expanded_branches() {
        let aa = node("aa", Some("Alpha one"), 1, false, LoadableCollection::default(), false);
        let a = node(
            "a",
            Some("Alpha"),
            0,
            true,
            LoadableCollection::loaded(vec![aa]),
            true,
        );
        let hidden = node("ca", None, 1, false, LoadableCollection::default(), false);
        let c = node("c", None, 0, false, LoadableCollection::loaded(vec![hidden]), true);

        let mut tree = Tree::initial();
        tree.is_loading = false;
        tree.items = vec![a, c];

        assert_eq!(render_text(&tree), "v Alpha\n  - Alpha one\n> c");
    }

    #[test]
    fn marks_active_trail_loading_and_failures() {
        let failure = FetchFailure {
            key: FetchKey::Children("b".into()),
            cause: "offline".into(),
        };
        let b = on_trail(node("b", None, 1, true, LoadableCollection::failed(failure), true), true);
        let loading = LoadableCollection {
            is_loading: true,
            items: vec![b],
            failure: None,
        };
        let a = on_trail(node("a", None, 0, true, loading, true), false);

        let mut tree = Tree::initial();
        tree.is_loading = false;
        tree.items = vec![a];

        assert_eq!(
            render_text(&tree),
            "v a [trail]\n  (loading)\n  v b [active]\n    ! children:b failed: offline"
        );
    }

    #[test]
    fn root_state_comes_first() {
        let mut tree = Tree::initial();
        assert_eq!(render_text(&tree), "(loading)");

        tree.is_loading = false;
        tree.failure = Some(FetchFailure {
            key: FetchKey::Root,
            cause: "offline".into(),
        });
        assert_eq!(render_text(&tree), "! root failed: offline");
    }
}
