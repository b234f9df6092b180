//! Graph of openings linked by which followed which in a game.
//!
//! Nodes are keyed by position, so a transposition gives a node several
//! parents and the graph can contain cycles. Edges are counted per tracked
//! colour: `edges[parent][colour][child]` is the number of games in which
//! `child` was the next recognised opening after `parent`.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet, VecDeque};

use chess::{PlayerColour, PositionKey, START_POSITION_KEY};
use serde::{Deserialize, Serialize};

use crate::opening::{Opening, OpeningError};

/// Child key → traversal count.
pub type EdgeBag = BTreeMap<PositionKey, u32>;
/// Edge bags of one parent, per tracked colour.
pub type ColourEdges = BTreeMap<PlayerColour, EdgeBag>;

#[derive(Debug, thiserror::Error)]
pub enum TreeError {
    #[error("Tree has no root node")]
    MissingRoot,
    #[error("Edge {parent} -> {child} points at a missing node")]
    DanglingEdge {
        parent: PositionKey,
        child: PositionKey,
    },
    #[error("Node stored under {key} has key {found}")]
    KeyMismatch {
        key: PositionKey,
        found: PositionKey,
    },
    #[error("Head {0} is not a node of the tree")]
    UnknownHead(PositionKey),
    #[error("Invalid opening: {0}")]
    Invariant(#[from] OpeningError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "TreeDocument")]
pub struct OpeningTree {
    nodes: BTreeMap<PositionKey, Opening>,
    edges: BTreeMap<PositionKey, ColourEdges>,
}

/// Unchecked wire shape of a tree.
#[derive(Deserialize)]
struct TreeDocument {
    nodes: BTreeMap<PositionKey, Opening>,
    #[serde(default)]
    edges: BTreeMap<PositionKey, ColourEdges>,
}

impl TryFrom<TreeDocument> for OpeningTree {
    type Error = TreeError;

    fn try_from(doc: TreeDocument) -> Result<Self, Self::Error> {
        if !doc.nodes.contains_key(START_POSITION_KEY) {
            return Err(TreeError::MissingRoot);
        }
        for (key, opening) in &doc.nodes {
            if key != opening.key() {
                return Err(TreeError::KeyMismatch {
                    key: key.clone(),
                    found: opening.key().clone(),
                });
            }
            opening.validate()?;
        }
        for (parent, by_colour) in &doc.edges {
            for child in by_colour.values().flat_map(|bag| bag.keys()) {
                if !doc.nodes.contains_key(parent) || !doc.nodes.contains_key(child) {
                    return Err(TreeError::DanglingEdge {
                        parent: parent.clone(),
                        child: child.clone(),
                    });
                }
            }
        }

        Ok(Self {
            nodes: doc.nodes,
            edges: doc.edges,
        })
    }
}

impl Default for OpeningTree {
    fn default() -> Self {
        Self::new()
    }
}

impl OpeningTree {
    /// A tree holding only the root.
    pub fn new() -> Self {
        let root = Opening::root();
        Self {
            nodes: BTreeMap::from([(root.key().clone(), root)]),
            edges: BTreeMap::new(),
        }
    }

    pub fn root(&self) -> &Opening {
        // Present from construction; no operation removes it.
        &self.nodes[START_POSITION_KEY]
    }

    pub fn get(&self, key: &PositionKey) -> Option<&Opening> {
        self.nodes.get(key)
    }

    pub fn contains(&self, key: &PositionKey) -> bool {
        self.nodes.contains_key(key)
    }

    /// Number of nodes, root included.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// All openings in key order, root included.
    pub fn openings(&self) -> impl Iterator<Item = &Opening> {
        self.nodes.values()
    }

    /// Merge `opening` into its node (inserting it if new) and count one
    /// traversal `head -> opening` under `colour`.
    ///
    /// `head` must already be a node of this tree; otherwise nothing changes.
    pub fn upsert(
        &mut self,
        opening: Opening,
        head: &PositionKey,
        colour: PlayerColour,
    ) -> Result<(), TreeError> {
        if !self.contains(head) {
            return Err(TreeError::UnknownHead(head.clone()));
        }
        let key = opening.key().clone();

        match self.nodes.entry(key.clone()) {
            Entry::Occupied(mut node) => node.get_mut().merge_from(&opening),
            Entry::Vacant(slot) => {
                slot.insert(opening);
            }
        }

        *self
            .edges
            .entry(head.clone())
            .or_default()
            .entry(colour)
            .or_default()
            .entry(key)
            .or_insert(0) += 1;
        Ok(())
    }

    /// Number of traversals `parent -> child` under `colour`.
    pub fn edge_count(&self, parent: &PositionKey, colour: PlayerColour, child: &PositionKey) -> u32 {
        self.edges
            .get(parent)
            .and_then(|by_colour| by_colour.get(&colour))
            .and_then(|bag| bag.get(child))
            .copied()
            .unwrap_or(0)
    }

    /// Every counted edge leaving `parent`.
    pub fn edges_from<'a>(
        &'a self,
        parent: &PositionKey,
    ) -> impl Iterator<Item = (PlayerColour, &'a PositionKey, u32)> + 'a {
        self.edges
            .get(parent)
            .into_iter()
            .flat_map(|by_colour| by_colour.iter())
            .flat_map(|(colour, bag)| bag.iter().map(move |(child, count)| (*colour, child, *count)))
    }

    /// Direct successors, under one colour or across both.
    pub fn children(&self, key: &PositionKey, colour: Option<PlayerColour>) -> Vec<&Opening> {
        let keys: BTreeSet<&PositionKey> = self
            .edges
            .get(key)
            .into_iter()
            .flat_map(|by_colour| bags_for(by_colour, colour))
            .flat_map(|bag| bag.keys())
            .collect();
        self.resolve(keys)
    }

    /// Direct predecessors, under one colour or across both.
    pub fn parents(&self, key: &PositionKey, colour: Option<PlayerColour>) -> Vec<&Opening> {
        let keys: BTreeSet<&PositionKey> = self
            .edges
            .iter()
            .filter(|(_, by_colour)| {
                bags_for(by_colour, colour).any(|bag| bag.contains_key(key))
            })
            .map(|(parent, _)| parent)
            .collect();
        self.resolve(keys)
    }

    /// Everything reachable backwards from `key`, excluding `key` itself.
    pub fn ancestors(&self, key: &PositionKey) -> Vec<&Opening> {
        self.closure(key, |k| self.parents(k, None))
    }

    /// Everything reachable forwards from `key`, excluding `key` itself.
    pub fn descendants(&self, key: &PositionKey) -> Vec<&Opening> {
        self.closure(key, |k| self.children(k, None))
    }

    fn closure<'a>(
        &'a self,
        start: &PositionKey,
        step: impl Fn(&PositionKey) -> Vec<&'a Opening>,
    ) -> Vec<&'a Opening> {
        let mut visited: BTreeSet<&PositionKey> = BTreeSet::new();
        let mut queue = VecDeque::from([start.clone()]);
        let mut found = Vec::new();

        while let Some(current) = queue.pop_front() {
            for next in step(&current) {
                if next.key() != start && visited.insert(next.key()) {
                    found.push(next);
                    queue.push_back(next.key().clone());
                }
            }
        }
        found
    }

    fn resolve<'a>(&'a self, keys: BTreeSet<&PositionKey>) -> Vec<&'a Opening> {
        keys.into_iter().filter_map(|k| self.nodes.get(k)).collect()
    }

    /// Subgraph of `key`, its ancestors and its descendants. Unknown keys
    /// give a root-only tree.
    pub fn filter_by_opening(&self, key: &PositionKey) -> OpeningTree {
        if !self.contains(key) {
            return OpeningTree::new();
        }

        let mut keep: BTreeSet<PositionKey> = self
            .ancestors(key)
            .into_iter()
            .chain(self.descendants(key))
            .map(|op| op.key().clone())
            .collect();
        keep.insert(key.clone());
        keep.insert(PositionKey::start());

        let nodes = self
            .nodes
            .iter()
            .filter(|(k, _)| keep.contains(*k))
            .map(|(k, op)| (k.clone(), op.clone()))
            .collect();
        let edges = self.edges_between(&keep, None);
        OpeningTree { nodes, edges }
    }

    /// Tree of occurrences where the tracked player had `colour`.
    ///
    /// Nodes without such occurrences are dropped (the root is always kept)
    /// and only `colour`'s edge bags survive.
    pub fn partition_by_colour(&self, colour: PlayerColour) -> OpeningTree {
        let mut nodes: BTreeMap<PositionKey, Opening> = self
            .nodes
            .iter()
            .filter_map(|(k, op)| op.partition(colour).map(|p| (k.clone(), p)))
            .collect();
        nodes
            .entry(PositionKey::start())
            .or_insert_with(Opening::root);

        let keep: BTreeSet<PositionKey> = nodes.keys().cloned().collect();
        let edges = self.edges_between(&keep, Some(colour));
        OpeningTree { nodes, edges }
    }

    /// Edges whose endpoints are both in `keep`, optionally one colour only.
    fn edges_between(
        &self,
        keep: &BTreeSet<PositionKey>,
        only: Option<PlayerColour>,
    ) -> BTreeMap<PositionKey, ColourEdges> {
        let mut edges = BTreeMap::new();
        for (parent, by_colour) in &self.edges {
            if !keep.contains(parent) {
                continue;
            }
            let kept: ColourEdges = by_colour
                .iter()
                .filter(|(c, _)| only.map_or(true, |o| o == **c))
                .map(|(c, bag)| {
                    let bag: EdgeBag = bag
                        .iter()
                        .filter(|(child, _)| keep.contains(*child))
                        .map(|(child, n)| (child.clone(), *n))
                        .collect();
                    (*c, bag)
                })
                .filter(|(_, bag)| !bag.is_empty())
                .collect();
            if !kept.is_empty() {
                edges.insert(parent.clone(), kept);
            }
        }
        edges
    }

    /// Fold `other` into this tree: node occurrences concatenate and edge
    /// counts add up.
    pub fn merge_from(&mut self, other: &OpeningTree) {
        for (key, opening) in &other.nodes {
            match self.nodes.entry(key.clone()) {
                Entry::Occupied(mut node) => node.get_mut().merge_from(opening),
                Entry::Vacant(slot) => {
                    slot.insert(opening.clone());
                }
            }
        }

        for (parent, by_colour) in &other.edges {
            let ours = self.edges.entry(parent.clone()).or_default();
            for (colour, bag) in by_colour {
                let our_bag = ours.entry(*colour).or_default();
                for (child, count) in bag {
                    *our_bag.entry(child.clone()).or_insert(0) += count;
                }
            }
        }
    }

    pub fn merge(mut self, other: &OpeningTree) -> OpeningTree {
        self.merge_from(other);
        self
    }

    /// Reduce any number of trees by merging neighbours pairwise, round by
    /// round. An empty input gives a root-only tree.
    pub fn merge_all(trees: Vec<OpeningTree>) -> OpeningTree {
        let mut round = trees;
        while round.len() > 1 {
            let mut next = Vec::with_capacity(round.len().div_ceil(2));
            let mut iter = round.into_iter();
            while let Some(left) = iter.next() {
                next.push(match iter.next() {
                    Some(right) => left.merge(&right),
                    None => left,
                });
            }
            round = next;
        }
        round.pop().unwrap_or_default()
    }

    /// First opening, in key order, with this name and ply depth.
    pub fn find_by_name_and_ply(&self, name: &str, ply: usize) -> Option<&Opening> {
        self.nodes
            .values()
            .find(|op| op.name() == name && op.num_moves() == ply)
    }

    pub fn to_json_string(&self) -> Result<String, TreeError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse and validate a tree document.
    pub fn from_json_str(json: &str) -> Result<Self, TreeError> {
        let doc: TreeDocument = serde_json::from_str(json)?;
        Self::try_from(doc)
    }
}

fn bags_for(
    by_colour: &ColourEdges,
    colour: Option<PlayerColour>,
) -> impl Iterator<Item = &EdgeBag> {
    by_colour
        .iter()
        .filter(move |(c, _)| colour.map_or(true, |want| want == **c))
        .map(|(_, bag)| bag)
}
