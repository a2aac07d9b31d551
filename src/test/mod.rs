//! Tree factories shared by the unit tests.

use crate::ir::{IrTree, NodeId, NodeKind};

/// A small program with handles to every node.
///
/// ```text
/// app
/// ├─ com.example
/// │  ├─ Main { run { s0, s1 }, stop, count }
/// │  └─ Util { helper { s2 }, cache }
/// └─ com.example.extra
///    └─ Extra { extra }
/// ```
pub struct SampleTree {
    pub tree: IrTree,
    pub packages: Vec<NodeId>,
    pub types: Vec<NodeId>,
    pub methods: Vec<NodeId>,
    pub fields: Vec<NodeId>,
    pub statements: Vec<NodeId>,
}

pub fn sample_tree() -> SampleTree {
    let tree = IrTree::new("app");
    let root = tree.root();

    let example = tree
        .add_child(root, NodeKind::Package, "com.example")
        .unwrap();
    let extra = tree
        .add_child(root, NodeKind::Package, "com.example.extra")
        .unwrap();

    let main = tree.add_child(example, NodeKind::Type, "Main").unwrap();
    let util = tree.add_child(example, NodeKind::Type, "Util").unwrap();
    let extra_type = tree.add_child(extra, NodeKind::Type, "Extra").unwrap();

    let run = tree.add_child(main, NodeKind::Method, "run").unwrap();
    let stop = tree.add_child(main, NodeKind::Method, "stop").unwrap();
    let count = tree.add_child(main, NodeKind::Field, "count").unwrap();
    let helper = tree.add_child(util, NodeKind::Method, "helper").unwrap();
    let cache = tree.add_child(util, NodeKind::Field, "cache").unwrap();
    let extra_method = tree
        .add_child(extra_type, NodeKind::Method, "extra")
        .unwrap();

    let statements = vec![
        tree.add_child(run, NodeKind::Statement, "s0").unwrap(),
        tree.add_child(run, NodeKind::Statement, "s1").unwrap(),
        tree.add_child(helper, NodeKind::Statement, "s2").unwrap(),
    ];

    SampleTree {
        tree,
        packages: vec![example, extra],
        types: vec![main, util, extra_type],
        methods: vec![run, stop, helper, extra_method],
        fields: vec![count, cache],
        statements,
    }
}
