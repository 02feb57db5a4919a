use super::{TagVisitor, TagVisitorContext};

/// Annotates tags that are the LCP element of some breakpoint group.
///
/// The `viewport` meta attribute ends up holding the minimum viewport width
/// of the widest such group.
#[derive(Debug, Default, Clone, Copy)]
pub struct DebugTagVisitor;

impl DebugTagVisitor {
    pub const ID: &'static str = "optimization-detective/debug";
}

impl TagVisitor for DebugTagVisitor {
    fn visit(&self, context: &mut TagVisitorContext<'_>) -> bool {
        let collection = context.url_metric_group_collection;
        if !collection.is_any_group_populated() {
            return false;
        }

        let mut visited = false;
        for group in collection {
            let is_lcp = group
                .get_lcp_element()
                .is_some_and(|element| element.xpath() == context.xpath());
            if is_lcp {
                context.set_meta_attribute("viewport", group.minimum_viewport_width());
                context.set_meta_attribute("debug-is-lcp", true);
                visited = true;
            }
        }
        visited
    }
}
