//! DOM Tree (arena-based allocation)

use prestage_media::{ImageState, MediaState};

use crate::{Node, NodeId};

/// Arena-based DOM tree
///
/// Nodes are never deallocated; detached subtrees simply become unreachable
/// from the root. Index 0 is always the document node.
#[derive(Debug)]
pub struct DomTree {
    nodes: Vec<Node>,
}

impl DomTree {
    /// Create a tree holding only the document node
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::document()],
        }
    }

    /// The document node
    pub fn root(&self) -> NodeId {
        NodeId::from_index(0)
    }

    /// Get a node by ID
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        if !id.is_valid() {
            return None;
        }
        self.nodes.get(id.index())
    }

    /// Get a mutable node by ID
    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        if !id.is_valid() {
            return None;
        }
        self.nodes.get_mut(id.index())
    }

    /// Number of nodes in the arena (including detached ones)
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Create a detached element node for a tag name
    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.push(Node::element(tag))
    }

    /// Create a detached text node
    pub fn create_text(&mut self, content: &str) -> NodeId {
        self.push(Node::text(content.to_string()))
    }

    fn push(&mut self, node: Node) -> NodeId {
        let id = NodeId::from_index(self.nodes.len());
        self.nodes.push(node);
        id
    }

    /// Append `child` as the last child of `parent`, detaching it from any
    /// previous parent first. Invalid ids and cycles are ignored with a
    /// warning.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        if self.get(parent).is_none() || self.get(child).is_none() || parent == child {
            log::warn!("append_child: invalid nodes {:?} <- {:?}", parent, child);
            return;
        }
        // Appending an ancestor under its descendant would cut the tree loose
        if self.is_ancestor(child, parent) {
            log::warn!("append_child: {:?} is an ancestor of {:?}", child, parent);
            return;
        }

        self.detach(child);

        let old_last = self.nodes[parent.index()].last_child;
        {
            let node = &mut self.nodes[child.index()];
            node.parent = parent;
            node.prev_sibling = old_last;
        }
        if old_last.is_valid() {
            self.nodes[old_last.index()].next_sibling = child;
        } else {
            self.nodes[parent.index()].first_child = child;
        }
        self.nodes[parent.index()].last_child = child;
    }

    /// Unlink a node from its parent and siblings. Its subtree stays intact
    /// but becomes unreachable from the root. No-op for detached nodes.
    pub fn detach(&mut self, id: NodeId) {
        let Some(node) = self.get(id) else { return };
        let (parent, prev, next) = (node.parent, node.prev_sibling, node.next_sibling);
        if !parent.is_valid() {
            return;
        }

        if prev.is_valid() {
            self.nodes[prev.index()].next_sibling = next;
        } else {
            self.nodes[parent.index()].first_child = next;
        }
        if next.is_valid() {
            self.nodes[next.index()].prev_sibling = prev;
        } else {
            self.nodes[parent.index()].last_child = prev;
        }

        let node = &mut self.nodes[id.index()];
        node.parent = NodeId::NONE;
        node.prev_sibling = NodeId::NONE;
        node.next_sibling = NodeId::NONE;
    }

    /// Iterate the direct children of a node in document order
    pub fn children(&self, id: NodeId) -> Children<'_> {
        Children {
            tree: self,
            next: self.get(id).map_or(NodeId::NONE, |n| n.first_child),
        }
    }

    /// Whether `ancestor` lies on the parent chain of `id` (strictly above it)
    pub fn is_ancestor(&self, ancestor: NodeId, id: NodeId) -> bool {
        let mut current = self.get(id).map_or(NodeId::NONE, |n| n.parent);
        while current.is_valid() {
            if current == ancestor {
                return true;
            }
            current = self.nodes[current.index()].parent;
        }
        false
    }

    /// Whether a node is still reachable from the document root
    pub fn is_attached(&self, id: NodeId) -> bool {
        id == self.root() || self.is_ancestor(self.root(), id)
    }

    /// Tag name of an element node
    pub fn tag(&self, id: NodeId) -> Option<&str> {
        self.get(id)?.as_element().map(|e| e.tag.as_str())
    }

    /// Get an attribute of an element node
    pub fn get_attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.get(id)?.as_element()?.get_attr(name)
    }

    /// Set an attribute on an element node; ignored for non-elements
    pub fn set_attr(&mut self, id: NodeId, name: &str, value: &str) {
        match self.get_mut(id).and_then(|n| n.as_element_mut()) {
            Some(elem) => elem.set_attr(name, value),
            None => log::warn!("set_attr: {:?} is not an element", id),
        }
    }

    /// Remove an attribute from an element node
    pub fn remove_attr(&mut self, id: NodeId, name: &str) {
        if let Some(elem) = self.get_mut(id).and_then(|n| n.as_element_mut()) {
            elem.remove_attr(name);
        }
    }

    /// Media pipeline state of an audio/video element
    pub fn media(&self, id: NodeId) -> Option<&MediaState> {
        self.get(id)?.as_element()?.media.as_ref()
    }

    /// Mutable media pipeline state of an audio/video element
    pub fn media_mut(&mut self, id: NodeId) -> Option<&mut MediaState> {
        self.get_mut(id)?.as_element_mut()?.media.as_mut()
    }

    /// Image pipeline state of an img element
    pub fn image(&self, id: NodeId) -> Option<&ImageState> {
        self.get(id)?.as_element()?.image.as_ref()
    }

    /// Mutable image pipeline state of an img element
    pub fn image_mut(&mut self, id: NodeId) -> Option<&mut ImageState> {
        self.get_mut(id)?.as_element_mut()?.image.as_mut()
    }
}

impl Default for DomTree {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator over the direct children of a node
pub struct Children<'a> {
    tree: &'a DomTree,
    next: NodeId,
}

impl<'a> Iterator for Children<'a> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.next.is_valid() {
            return None;
        }
        let current = self.next;
        self.next = self.tree.nodes[current.index()].next_sibling;
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_and_children_order() {
        let mut tree = DomTree::new();
        let parent = tree.create_element("div");
        tree.append_child(tree.root(), parent);

        let a = tree.create_element("img");
        let b = tree.create_element("img");
        let c = tree.create_element("img");
        tree.append_child(parent, a);
        tree.append_child(parent, b);
        tree.append_child(parent, c);

        let children: Vec<_> = tree.children(parent).collect();
        assert_eq!(children, vec![a, b, c]);
    }

    #[test]
    fn test_detach_middle_child() {
        let mut tree = DomTree::new();
        let parent = tree.create_element("div");
        let a = tree.create_element("span");
        let b = tree.create_element("span");
        let c = tree.create_element("span");
        tree.append_child(parent, a);
        tree.append_child(parent, b);
        tree.append_child(parent, c);

        tree.detach(b);
        let children: Vec<_> = tree.children(parent).collect();
        assert_eq!(children, vec![a, c]);
        assert_eq!(tree.get(b).unwrap().parent, NodeId::NONE);
    }

    #[test]
    fn test_append_moves_between_parents() {
        let mut tree = DomTree::new();
        let old_parent = tree.create_element("div");
        let new_parent = tree.create_element("div");
        let child = tree.create_element("img");

        tree.append_child(old_parent, child);
        tree.append_child(new_parent, child);

        assert_eq!(tree.children(old_parent).count(), 0);
        assert_eq!(tree.children(new_parent).collect::<Vec<_>>(), vec![child]);
    }

    #[test]
    fn test_attachment() {
        let mut tree = DomTree::new();
        let staged = tree.create_element("div");
        let img = tree.create_element("img");
        tree.append_child(staged, img);

        // Detached subtree: img has a parent chain but no path to the root
        assert!(!tree.is_attached(img));

        tree.append_child(tree.root(), staged);
        assert!(tree.is_attached(img));

        tree.detach(staged);
        assert!(!tree.is_attached(img));
    }

    #[test]
    fn test_cycle_rejected() {
        let mut tree = DomTree::new();
        let outer = tree.create_element("div");
        let inner = tree.create_element("div");
        tree.append_child(outer, inner);

        tree.append_child(inner, outer);
        assert_eq!(tree.get(outer).unwrap().parent, NodeId::NONE);
        assert_eq!(tree.children(inner).count(), 0);
    }

    #[test]
    fn test_media_accessors() {
        let mut tree = DomTree::new();
        let video = tree.create_element("video");
        let div = tree.create_element("div");

        assert!(tree.media(video).is_some());
        assert!(tree.media(div).is_none());

        tree.media_mut(video).unwrap().duration = 12.0;
        assert_eq!(tree.media(video).unwrap().duration, 12.0);
    }
}
