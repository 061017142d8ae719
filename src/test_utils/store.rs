//! Hierarchical node table backing the in-memory repository.

use std::collections::HashMap;

use chrono::Utc;

use crate::error::StorageError;
use crate::model::{Node, NodeId, VersionInfo};

pub(super) struct ProxyInfo {
    pub target: NodeId,
    pub versionable: NodeId,
}

pub(super) struct MemNode {
    pub id: NodeId,
    pub name: String,
    pub type_name: String,
    pub complex: bool,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub checked_out: bool,
    pub versions: Vec<VersionInfo>,
    pub version_nodes: Vec<NodeId>,
    pub proxy: Option<ProxyInfo>,
}

impl MemNode {
    fn to_node(&self) -> Node {
        Node::new(self.id.clone(), self.name.clone(), self.complex)
    }
}

pub(super) struct StoreInner {
    nodes: HashMap<NodeId, MemNode>,
    root: NodeId,
    next_id: u64,
}

fn missing(id: &NodeId) -> StorageError {
    StorageError::Other(format!("no such node: {id}"))
}

impl StoreInner {
    pub fn new() -> Self {
        let root_id = NodeId::new("root");
        let mut nodes = HashMap::new();
        nodes.insert(
            root_id.clone(),
            MemNode {
                id: root_id.clone(),
                name: String::new(),
                type_name: "Root".into(),
                complex: false,
                parent: None,
                children: Vec::new(),
                checked_out: true,
                versions: Vec::new(),
                version_nodes: Vec::new(),
                proxy: None,
            },
        );
        Self {
            nodes,
            root: root_id,
            next_id: 1,
        }
    }

    fn alloc_id(&mut self) -> NodeId {
        let id = NodeId::new(format!("n{}", self.next_id));
        self.next_id += 1;
        id
    }

    fn get(&self, id: &NodeId) -> Result<&MemNode, StorageError> {
        self.nodes.get(id).ok_or_else(|| missing(id))
    }

    fn get_mut(&mut self, id: &NodeId) -> Result<&mut MemNode, StorageError> {
        self.nodes.get_mut(id).ok_or_else(|| missing(id))
    }

    pub fn root(&self) -> Node {
        // The root always exists.
        self.nodes[&self.root].to_node()
    }

    pub fn node_by_id(&self, id: &NodeId) -> Option<Node> {
        self.nodes.get(id).map(MemNode::to_node)
    }

    pub fn node_by_path(&self, path: &str, relative_to: Option<&NodeId>) -> Option<Node> {
        let mut current = match relative_to {
            Some(id) if !path.starts_with('/') => id.clone(),
            _ => self.root.clone(),
        };
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            let node = self.nodes.get(&current)?;
            let child = node
                .children
                .iter()
                .find(|child_id| self.nodes.get(child_id).is_some_and(|c| c.name == segment))?;
            current = child.clone();
        }
        self.nodes.get(&current).map(MemNode::to_node)
    }

    pub fn path(&self, id: &NodeId) -> Result<String, StorageError> {
        let mut segments = Vec::new();
        let mut current = self.get(id)?;
        while let Some(parent_id) = &current.parent {
            segments.push(current.name.clone());
            current = self.get(parent_id)?;
        }
        if segments.is_empty() {
            return Ok("/".into());
        }
        segments.reverse();
        Ok(format!("/{}", segments.join("/")))
    }

    pub fn child(&self, parent: &NodeId, name: &str, complex: bool) -> Option<Node> {
        let parent = self.nodes.get(parent)?;
        parent.children.iter().find_map(|child_id| {
            let child = self.nodes.get(child_id)?;
            (child.name == name && child.complex == complex).then(|| child.to_node())
        })
    }

    pub fn children(
        &self,
        parent: &NodeId,
        name: Option<&str>,
        complex: bool,
    ) -> Result<Vec<Node>, StorageError> {
        let parent = self.get(parent)?;
        Ok(parent
            .children
            .iter()
            .filter_map(|child_id| {
                let child = self.nodes.get(child_id)?;
                let name_ok = name.is_none_or(|n| child.name == n);
                (name_ok && child.complex == complex).then(|| child.to_node())
            })
            .collect())
    }

    pub fn add_child(
        &mut self,
        parent: &NodeId,
        name: &str,
        position: Option<u64>,
        type_name: &str,
        complex: bool,
    ) -> Result<Node, StorageError> {
        self.get(parent)?;
        let id = self.alloc_id();
        let node = MemNode {
            id: id.clone(),
            name: name.into(),
            type_name: type_name.into(),
            complex,
            parent: Some(parent.clone()),
            children: Vec::new(),
            checked_out: true,
            versions: Vec::new(),
            version_nodes: Vec::new(),
            proxy: None,
        };
        let result = node.to_node();
        self.nodes.insert(id.clone(), node);
        let siblings = &mut self.get_mut(parent)?.children;
        let index = position
            .map_or(siblings.len(), |p| usize::try_from(p).unwrap_or(usize::MAX))
            .min(siblings.len());
        siblings.insert(index, id);
        Ok(result)
    }

    pub fn remove(&mut self, id: &NodeId) -> Result<(), StorageError> {
        let parent = self.get(id)?.parent.clone();
        if let Some(parent_id) = parent {
            self.get_mut(&parent_id)?.children.retain(|c| c != id);
        }
        let mut stack = vec![id.clone()];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.remove(&current) {
                stack.extend(node.children);
            }
        }
        Ok(())
    }

    pub fn parent(&self, id: &NodeId) -> Result<Option<Node>, StorageError> {
        let node = self.get(id)?;
        Ok(node
            .parent
            .as_ref()
            .and_then(|parent_id| self.nodes.get(parent_id))
            .map(MemNode::to_node))
    }

    pub fn move_node(
        &mut self,
        source: &NodeId,
        dest_parent: &NodeId,
        new_name: &str,
    ) -> Result<Node, StorageError> {
        let old_parent = self.get(source)?.parent.clone();
        if let Some(old_parent) = old_parent {
            self.get_mut(&old_parent)?.children.retain(|c| c != source);
        }
        self.get_mut(dest_parent)?.children.push(source.clone());
        let node = self.get_mut(source)?;
        node.parent = Some(dest_parent.clone());
        node.name = new_name.into();
        Ok(node.to_node())
    }

    pub fn copy_node(
        &mut self,
        source: &NodeId,
        dest_parent: &NodeId,
        new_name: &str,
    ) -> Result<Node, StorageError> {
        let copy = self.copy_subtree(source, dest_parent, Some(new_name))?;
        self.get_mut(dest_parent)?.children.push(copy.clone());
        self.get(&copy).map(MemNode::to_node)
    }

    fn copy_subtree(
        &mut self,
        source: &NodeId,
        new_parent: &NodeId,
        new_name: Option<&str>,
    ) -> Result<NodeId, StorageError> {
        let (name, type_name, complex, children) = {
            let node = self.get(source)?;
            (
                new_name.map_or_else(|| node.name.clone(), Into::into),
                node.type_name.clone(),
                node.complex,
                node.children.clone(),
            )
        };
        let id = self.alloc_id();
        self.nodes.insert(
            id.clone(),
            MemNode {
                id: id.clone(),
                name,
                type_name,
                complex,
                parent: Some(new_parent.clone()),
                children: Vec::new(),
                checked_out: true,
                versions: Vec::new(),
                version_nodes: Vec::new(),
                proxy: None,
            },
        );
        for child in children {
            let child_copy = self.copy_subtree(&child, &id, None)?;
            self.get_mut(&id)?.children.push(child_copy);
        }
        Ok(id)
    }

    pub fn check_in(
        &mut self,
        id: &NodeId,
        label: &str,
        description: Option<&str>,
    ) -> Result<Node, StorageError> {
        let (name, type_name) = {
            let node = self.get(id)?;
            (node.name.clone(), node.type_name.clone())
        };
        let version_id = self.alloc_id();
        self.nodes.insert(
            version_id.clone(),
            MemNode {
                id: version_id.clone(),
                name,
                type_name,
                complex: false,
                parent: None,
                children: Vec::new(),
                checked_out: false,
                versions: Vec::new(),
                version_nodes: Vec::new(),
                proxy: None,
            },
        );
        let info = VersionInfo::new(label, description.map(Into::into), Utc::now().naive_utc());
        let node = self.get_mut(id)?;
        node.checked_out = false;
        node.versions.push(info);
        node.version_nodes.push(version_id.clone());
        self.get(&version_id).map(MemNode::to_node)
    }

    pub fn check_out(&mut self, id: &NodeId) -> Result<(), StorageError> {
        self.get_mut(id)?.checked_out = true;
        Ok(())
    }

    pub fn restore_by_label(&mut self, id: &NodeId, label: &str) -> Result<(), StorageError> {
        let node = self.get(id)?;
        if !node.versions.iter().any(|v| v.label() == label) {
            return Err(StorageError::Other(format!("no version labeled {label}")));
        }
        self.get_mut(id)?.checked_out = false;
        Ok(())
    }

    pub fn version_by_label(&self, id: &NodeId, label: &str) -> Result<Option<Node>, StorageError> {
        let node = self.get(id)?;
        Ok(node
            .versions
            .iter()
            .position(|v| v.label() == label)
            .and_then(|index| node.version_nodes.get(index))
            .and_then(|version_id| self.nodes.get(version_id))
            .map(MemNode::to_node))
    }

    pub fn versions(&self, id: &NodeId) -> Result<Vec<VersionInfo>, StorageError> {
        Ok(self.get(id)?.versions.clone())
    }

    pub fn last_version(&self, id: &NodeId) -> Result<Option<Node>, StorageError> {
        Ok(self
            .get(id)?
            .version_nodes
            .last()
            .and_then(|version_id| self.nodes.get(version_id))
            .map(MemNode::to_node))
    }

    pub fn proxies(&self, document: &NodeId, parent: Option<&NodeId>) -> Vec<Node> {
        let mut found: Vec<&MemNode> = self
            .nodes
            .values()
            .filter(|node| {
                node.proxy.as_ref().is_some_and(|proxy| {
                    &proxy.target == document || &proxy.versionable == document
                }) && parent.is_none_or(|p| node.parent.as_ref() == Some(p))
            })
            .collect();
        found.sort_by(|a, b| a.id.cmp(&b.id));
        found.into_iter().map(MemNode::to_node).collect()
    }

    pub fn add_proxy(
        &mut self,
        target: &NodeId,
        versionable: &NodeId,
        parent: &NodeId,
        name: &str,
        position: Option<u64>,
    ) -> Result<Node, StorageError> {
        let proxy = self.add_child(parent, name, position, "Proxy", false)?;
        self.get_mut(proxy.id())?.proxy = Some(ProxyInfo {
            target: target.clone(),
            versionable: versionable.clone(),
        });
        Ok(proxy)
    }

    /// Substring match of the statement against node paths, ordered by path.
    pub fn query(&self, statement: &str) -> Result<Vec<NodeId>, StorageError> {
        let mut matches: Vec<(String, NodeId)> = self
            .nodes
            .values()
            .filter(|node| node.parent.is_some() || node.id == self.root)
            .filter_map(|node| {
                let path = self.path(&node.id).ok()?;
                path.contains(statement).then_some((path, node.id.clone()))
            })
            .collect();
        matches.sort();
        Ok(matches.into_iter().map(|(_, id)| id).collect())
    }

    pub fn is_checked_out(&self, id: &NodeId) -> Result<bool, StorageError> {
        Ok(self.get(id)?.checked_out)
    }
}
