//! In-memory network trie
//!
//! A binary trie over 128-bit addresses using arena allocation: every node
//! lives in one `Vec` and children are referenced by index. IPv4 networks
//! are inserted below `::ffff:0:0/96`.
//!
//! The trie keeps every inserted record. Deduplication happens when the
//! trie is read back (see [`NetworkTree::deduplicated`]) so the result does
//! not depend on insertion order.

use crate::address;
use crate::network::Network;

/// Child index meaning "no child". The root is never anybody's child.
const NO_CHILD: u32 = 0;

/// A node in the arena
#[derive(Debug, Clone, Default)]
struct Node {
    /// Children for bit 0 and bit 1
    children: [u32; 2],
    /// Record attached at this depth
    network: Option<Network>,
}

/// Arena-backed binary trie of networks
#[derive(Debug, Clone)]
pub struct NetworkTree {
    nodes: Vec<Node>,
    network_count: usize,
}

/// Node of the path-compressed tree produced for encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RadixNode {
    /// Child for bit 0, 0 if none
    pub zero: u32,
    /// Child for bit 1, 0 if none
    pub one: u32,
    /// Index into the record list
    pub network: Option<u32>,
    /// Bit depth of this node; its children branch on bit `depth`
    pub depth: u8,
}

impl NetworkTree {
    /// Create an empty tree with just a root node
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::default()],
            network_count: 0,
        }
    }

    /// Reserve capacity for nodes to avoid reallocation
    pub fn reserve_nodes(&mut self, capacity: usize) {
        self.nodes
            .reserve(capacity.saturating_sub(self.nodes.len()));
    }

    /// Insert a network, replacing any record with the same prefix
    ///
    /// Returns the stored record so attributes can be filled in.
    pub fn insert(&mut self, network: Network) -> &mut Network {
        let bits = network.raw_address();
        let mut node_id = 0usize;

        for depth in 0..network.raw_prefix_len() {
            let bit = address::get_bit(bits, depth) as usize;
            let child = self.nodes[node_id].children[bit];
            node_id = if child == NO_CHILD {
                let new_id = self.allocate_node();
                self.nodes[node_id].children[bit] = new_id;
                new_id as usize
            } else {
                child as usize
            };
        }

        let slot = &mut self.nodes[node_id].network;
        if slot.is_none() {
            self.network_count += 1;
        }
        slot.insert(network)
    }

    /// Allocate a new node and return its index
    fn allocate_node(&mut self) -> u32 {
        let id = self.nodes.len() as u32;
        self.nodes.push(Node::default());
        id
    }

    /// Find the record stored for exactly this prefix
    pub fn get(&self, network: &Network) -> Option<&Network> {
        let bits = network.raw_address();
        let mut node_id = 0usize;
        for depth in 0..network.raw_prefix_len() {
            let child = self.nodes[node_id].children[address::get_bit(bits, depth) as usize];
            if child == NO_CHILD {
                return None;
            }
            node_id = child as usize;
        }
        self.nodes[node_id].network.as_ref()
    }

    /// Number of stored records
    pub fn count_networks(&self) -> usize {
        self.network_count
    }

    /// Number of allocated trie nodes, including the root
    pub fn count_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// True if no record is stored
    pub fn is_empty(&self) -> bool {
        self.network_count == 0
    }

    /// All stored records, parents before children, zero branch first
    ///
    /// Every call starts a fresh traversal.
    pub fn networks(&self) -> Networks<'_> {
        Networks {
            nodes: &self.nodes,
            stack: vec![0],
        }
    }

    /// Records that survive deduplication
    ///
    /// A record is dropped when its nearest surviving ancestor has the same
    /// country code, ASN and flags. Networks without an ancestor are kept.
    pub fn deduplicated(&self) -> Deduplicated<'_> {
        Deduplicated {
            nodes: &self.nodes,
            stack: vec![(0, None)],
        }
    }

    /// Convert into the path-compressed form written to disk
    ///
    /// Only the root, nodes with a surviving record and nodes with two
    /// children are kept. The root is always at index 0, so 0 can double as
    /// "no child". Records are listed in traversal order.
    pub(crate) fn compress(&self) -> (Vec<RadixNode>, Vec<Network>) {
        let mut nodes = vec![RadixNode {
            zero: NO_CHILD,
            one: NO_CHILD,
            network: None,
            depth: 0,
        }];
        let mut records = Vec::new();

        let root = &self.nodes[0];
        if let Some(network) = root.network {
            nodes[0].network = Some(0);
            records.push(network);
        }
        let ancestor = root.network.as_ref();
        let [zero, one] = root.children;
        nodes[0].zero = self.compress_child(zero, 1, ancestor, &mut nodes, &mut records);
        nodes[0].one = self.compress_child(one, 1, ancestor, &mut nodes, &mut records);

        (nodes, records)
    }

    fn compress_child(
        &self,
        node_id: u32,
        depth: u8,
        ancestor: Option<&Network>,
        out: &mut Vec<RadixNode>,
        records: &mut Vec<Network>,
    ) -> u32 {
        if node_id == NO_CHILD {
            return NO_CHILD;
        }
        self.compress_subtree(node_id, depth, ancestor, out, records)
            .unwrap_or(NO_CHILD)
    }

    /// Returns the index of the kept node standing for this subtree, if any
    fn compress_subtree(
        &self,
        node_id: u32,
        depth: u8,
        ancestor: Option<&Network>,
        out: &mut Vec<RadixNode>,
        records: &mut Vec<Network>,
    ) -> Option<u32> {
        let node = &self.nodes[node_id as usize];

        let surviving = node
            .network
            .as_ref()
            .filter(|n| !ancestor.is_some_and(|a| a.same_attributes(n)));

        // Record first so records come out in traversal order
        let record_index = surviving.map(|n| {
            records.push(*n);
            (records.len() - 1) as u32
        });
        let ancestor = surviving.or(ancestor);

        let [zero, one] = node.children;
        let zero = self.compress_child(zero, depth + 1, ancestor, out, records);
        let one = self.compress_child(one, depth + 1, ancestor, out, records);

        if record_index.is_none() {
            match (zero, one) {
                (NO_CHILD, NO_CHILD) => return None,
                (child, NO_CHILD) | (NO_CHILD, child) => return Some(child),
                _ => {}
            }
        }

        out.push(RadixNode {
            zero,
            one,
            network: record_index,
            depth,
        });
        Some((out.len() - 1) as u32)
    }
}

impl Default for NetworkTree {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator over all stored records, see [`NetworkTree::networks`]
pub struct Networks<'a> {
    nodes: &'a [Node],
    stack: Vec<u32>,
}

impl<'a> Iterator for Networks<'a> {
    type Item = &'a Network;

    fn next(&mut self) -> Option<Self::Item> {
        let nodes = self.nodes;
        while let Some(id) = self.stack.pop() {
            let node = &nodes[id as usize];
            let [zero, one] = node.children;
            if one != NO_CHILD {
                self.stack.push(one);
            }
            if zero != NO_CHILD {
                self.stack.push(zero);
            }
            if let Some(network) = &node.network {
                return Some(network);
            }
        }
        None
    }
}

/// Iterator over surviving records, see [`NetworkTree::deduplicated`]
pub struct Deduplicated<'a> {
    nodes: &'a [Node],
    /// Node index and the nearest surviving ancestor record
    stack: Vec<(u32, Option<&'a Network>)>,
}

impl<'a> Iterator for Deduplicated<'a> {
    type Item = &'a Network;

    fn next(&mut self) -> Option<Self::Item> {
        let nodes = self.nodes;
        while let Some((id, ancestor)) = self.stack.pop() {
            let node = &nodes[id as usize];

            let surviving = node
                .network
                .as_ref()
                .filter(|n| !ancestor.is_some_and(|a| a.same_attributes(n)));
            let next_ancestor = surviving.or(ancestor);

            let [zero, one] = node.children;
            if one != NO_CHILD {
                self.stack.push((one, next_ancestor));
            }
            if zero != NO_CHILD {
                self.stack.push((zero, next_ancestor));
            }
            if surviving.is_some() {
                return surviving;
            }
        }
        None
    }
}
