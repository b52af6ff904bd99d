//! 必选字段检查
//!
//! 遍历 schema，必选的字符串、序列、映射必须非空，必选的子树指针必须存在。
//! 数值和布尔字段没有“缺失”状态，不做检查。

use runtime_spec::{
    Spec,
    schema::{self, Field, Node, Presence, Visitor},
};

#[derive(Default)]
struct MissingFields {
    paths: Vec<String>,
}

impl Visitor for MissingFields {
    fn visit(&mut self, path: &str, field: &Field<'_>) {
        if field.presence != Presence::Required {
            return;
        }
        let checked = matches!(
            field.node,
            Node::Str(_) | Node::Seq { .. } | Node::Map(_) | Node::Ptr(_)
        );
        if checked && field.node.is_empty() {
            self.paths.push(path.to_string());
        }
    }
}

/// 返回缺失的必选字段路径，按遍历顺序排列
pub fn missing_fields(spec: &Spec) -> Vec<String> {
    let mut visitor = MissingFields::default();
    schema::walk(spec, "", &mut visitor);
    visitor.paths
}
