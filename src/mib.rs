//! MIB indexing.
//!
//! A [`MibTree`] maps numeric OID paths to object metadata and supports exact
//! lookup plus "next OID" traversal in numeric order. A [`MibIndex`] holds
//! several named trees (one per loaded definition set) and resolves parent
//! names across all of them while a new set is parsed.
//!
//! The parser is structural only: it understands `NAME OBJECT-TYPE` style
//! macro declarations with their `SYNTAX`, `ACCESS`/`MAX-ACCESS`, `STATUS`
//! and `DESCRIPTION` clauses, and `NAME OBJECT IDENTIFIER ::= { PARENT ID }`
//! assignments. Everything else in the text is skipped.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;

use serde::Serialize;

use crate::error::{Result, ScanError};
use crate::types::OidRecord;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MibNode {
    pub name: String,
    pub oid: String,
    pub syntax: String,
    pub description: String,
    pub access: String,
    pub status: String,
    pub children: BTreeMap<u32, MibNode>,
}

/// Attributes assigned to a node. Empty fields leave the node's value untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MibMetadata {
    pub name: String,
    pub syntax: String,
    pub description: String,
    pub access: String,
    pub status: String,
}

impl MibMetadata {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }
}

/// Split a dotted OID into numeric segments. A leading dot is tolerated and
/// the empty string is the root.
pub fn parse_oid(oid: &str) -> Option<Vec<u32>> {
    let oid = oid.trim().trim_start_matches('.');
    if oid.is_empty() {
        return Some(Vec::new());
    }
    oid.split('.').map(|s| s.parse::<u32>().ok()).collect()
}

fn join_oid(segments: &[u32]) -> String {
    segments
        .iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(".")
}

fn compare_oids(a: &str, b: &str) -> std::cmp::Ordering {
    parse_oid(a).cmp(&parse_oid(b))
}

/// One definition set. The root has an empty name and an empty OID.
#[derive(Debug, Clone, Default)]
pub struct MibTree {
    root: MibNode,
    names: HashMap<String, String>,
}

impl MibTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Walk or create the path segment by segment, then assign `meta` to the
    /// terminal node. Intermediate nodes are unnamed placeholders.
    pub fn add_node(&mut self, oid: &str, meta: MibMetadata) -> Result<()> {
        let segments = parse_oid(oid).ok_or_else(|| ScanError::InvalidOid(oid.to_string()))?;
        if segments.is_empty() {
            return Err(ScanError::InvalidOid(oid.to_string()));
        }

        let mut current = &mut self.root;
        for (i, seg) in segments.iter().enumerate() {
            current = current.children.entry(*seg).or_insert_with(|| MibNode {
                oid: join_oid(&segments[..=i]),
                ..MibNode::default()
            });
        }

        if !meta.name.is_empty() {
            current.name = meta.name;
            self.names.insert(current.name.clone(), current.oid.clone());
        }
        if !meta.syntax.is_empty() {
            current.syntax = meta.syntax;
        }
        if !meta.description.is_empty() {
            current.description = meta.description;
        }
        if !meta.access.is_empty() {
            current.access = meta.access;
        }
        if !meta.status.is_empty() {
            current.status = meta.status;
        }
        Ok(())
    }

    pub fn root(&self) -> &MibNode {
        &self.root
    }

    pub fn get_node(&self, oid: &str) -> Option<&MibNode> {
        let segments = parse_oid(oid)?;
        let mut current = &self.root;
        for seg in &segments {
            current = current.children.get(seg)?;
        }
        Some(current)
    }

    /// OID of the node declared as `name` in this set.
    pub fn find_by_name(&self, name: &str) -> Option<&str> {
        self.names.get(name).map(String::as_str)
    }

    /// Number of named nodes.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Successor of `oid` in a depth-first walk ordered by numeric segment.
    ///
    /// - `oid` exists and has children: `oid` extended by its smallest child.
    /// - `oid` does not exist: at the first missing segment, the smallest
    ///   sibling numerically greater than the requested one.
    /// - otherwise the next greater sibling of the node or of its nearest
    ///   ancestor that has one; `None` past the end of the tree.
    pub fn get_next_oid(&self, oid: &str) -> Option<String> {
        let segments = parse_oid(oid)?;
        let mut path: Vec<&MibNode> = vec![&self.root];

        for (i, seg) in segments.iter().enumerate() {
            let current = path[i];
            match current.children.get(seg) {
                Some(child) => path.push(child),
                None => {
                    if let Some(next) = next_sibling(current, *seg) {
                        let mut out = segments[..i].to_vec();
                        out.push(next);
                        return Some(join_oid(&out));
                    }
                    return climb(&segments[..i], &path);
                }
            }
        }

        let node = path[segments.len()];
        if let Some(first) = node.children.keys().next() {
            let mut out = segments.clone();
            out.push(*first);
            return Some(join_oid(&out));
        }
        climb(&segments, &path)
    }

    /// Named nodes in walk order.
    pub fn named_nodes(&self) -> Vec<&MibNode> {
        let mut out = Vec::new();
        let mut stack: Vec<&MibNode> = vec![&self.root];
        while let Some(node) = stack.pop() {
            if !node.name.is_empty() {
                out.push(node);
            }
            stack.extend(node.children.values().rev());
        }
        out
    }
}

fn next_sibling(parent: &MibNode, seg: u32) -> Option<u32> {
    parent
        .children
        .range((Bound::Excluded(seg), Bound::Unbounded))
        .next()
        .map(|(k, _)| *k)
}

/// Walk back up `path` (root first, one entry per segment) looking for the
/// nearest level with a greater sibling.
fn climb(segments: &[u32], path: &[&MibNode]) -> Option<String> {
    for depth in (1..=segments.len()).rev() {
        let parent = path[depth - 1];
        if let Some(next) = next_sibling(parent, segments[depth - 1]) {
            let mut out = segments[..depth - 1].to_vec();
            out.push(next);
            return Some(join_oid(&out));
        }
    }
    None
}

/// Names every MIB text may reference without importing a base module.
const WELL_KNOWN_ROOTS: &[(&str, &str)] = &[
    ("ccitt", "0"),
    ("iso", "1"),
    ("joint-iso-ccitt", "2"),
    ("org", "1.3"),
    ("dod", "1.3.6"),
    ("internet", "1.3.6.1"),
    ("directory", "1.3.6.1.1"),
    ("mgmt", "1.3.6.1.2"),
    ("mib-2", "1.3.6.1.2.1"),
    ("experimental", "1.3.6.1.3"),
    ("private", "1.3.6.1.4"),
    ("enterprises", "1.3.6.1.4.1"),
    ("security", "1.3.6.1.5"),
    ("snmpV2", "1.3.6.1.6"),
];

/// Summary of one `load` call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    pub nodes: usize,
    /// Parent names that could not be resolved; their children were placed
    /// directly under the root.
    pub unresolved: Vec<String>,
}

/// Several named definition sets searched together.
#[derive(Debug, Clone, Default)]
pub struct MibIndex {
    sets: Vec<(String, MibTree)>,
}

impl MibIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `text` into a tree and register it as `set_name`, replacing any
    /// set already loaded under that name.
    pub fn load(&mut self, set_name: &str, text: &str) -> LoadReport {
        let (tree, unresolved) = MibParser::new(self).parse(text);
        let report = LoadReport {
            nodes: tree.len(),
            unresolved,
        };
        tracing::info!(
            set = set_name,
            nodes = report.nodes,
            unresolved = report.unresolved.len(),
            "MIB loaded"
        );
        self.insert_tree(set_name, tree);
        report
    }

    pub fn insert_tree(&mut self, set_name: &str, tree: MibTree) {
        match self.sets.iter_mut().find(|(name, _)| name == set_name) {
            Some(slot) => slot.1 = tree,
            None => self.sets.push((set_name.to_string(), tree)),
        }
    }

    pub fn remove(&mut self, set_name: &str) -> bool {
        let before = self.sets.len();
        self.sets.retain(|(name, _)| name != set_name);
        self.sets.len() != before
    }

    pub fn set_names(&self) -> impl Iterator<Item = &str> {
        self.sets.iter().map(|(name, _)| name.as_str())
    }

    pub fn tree(&self, set_name: &str) -> Option<&MibTree> {
        self.sets
            .iter()
            .find(|(name, _)| name == set_name)
            .map(|(_, tree)| tree)
    }

    /// OID for a declared name, searching loaded sets in load order.
    pub fn resolve_name(&self, name: &str) -> Option<String> {
        self.sets
            .iter()
            .find_map(|(_, tree)| tree.find_by_name(name))
            .map(str::to_string)
            .or_else(|| {
                WELL_KNOWN_ROOTS
                    .iter()
                    .find(|(n, _)| *n == name)
                    .map(|(_, oid)| oid.to_string())
            })
    }

    /// First node at exactly `oid` across loaded sets.
    pub fn get_node(&self, oid: &str) -> Option<&MibNode> {
        self.sets.iter().find_map(|(_, tree)| tree.get_node(oid))
    }

    /// Smallest successor of `oid` over every loaded set.
    pub fn get_next_oid(&self, oid: &str) -> Option<String> {
        self.sets
            .iter()
            .filter_map(|(_, tree)| tree.get_next_oid(oid))
            .min_by(|a, b| compare_oids(a, b))
    }

    /// Replace each prefix that names a known node with that name.
    /// `1.3.6.1.2.1.1.5.0` becomes `iso.org.dod.internet.mgmt.mib-2.system.sysName.0`
    /// when those nodes are loaded.
    pub fn translate(&self, oid: &str) -> String {
        let oid = oid.trim().trim_start_matches('.');
        let mut prefix = String::new();
        let mut parts = Vec::new();
        for seg in oid.split('.') {
            if !prefix.is_empty() {
                prefix.push('.');
            }
            prefix.push_str(seg);
            let named = self
                .sets
                .iter()
                .filter_map(|(_, tree)| tree.get_node(&prefix))
                .find(|node| !node.name.is_empty());
            match named {
                Some(node) => parts.push(node.name.clone()),
                None => parts.push(seg.to_string()),
            }
        }
        parts.join(".")
    }

    /// Name for an OID row: the exact node's name, else the translated path.
    pub fn display_name(&self, oid: &str) -> String {
        match self.get_node(oid) {
            Some(node) if !node.name.is_empty() => node.name.clone(),
            _ => self.translate(oid),
        }
    }

    /// Every named node of a set as store rows.
    pub fn records(&self, set_name: &str) -> Vec<OidRecord> {
        self.tree(set_name)
            .map(|tree| {
                tree.named_nodes()
                    .into_iter()
                    .map(|node| OidRecord {
                        name: node.name.clone(),
                        oid: node.oid.clone(),
                        description: node.description.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

const DECLARATION_MACROS: &[&str] = &[
    "OBJECT-TYPE",
    "MODULE-IDENTITY",
    "OBJECT-IDENTITY",
    "NOTIFICATION-TYPE",
    "OBJECT-GROUP",
    "NOTIFICATION-GROUP",
];

/// A macro declaration waiting for its `::= { parent id }` line.
struct Pending {
    name: String,
    meta: MibMetadata,
}

struct MibParser<'a> {
    index: &'a MibIndex,
    tree: MibTree,
    pending: Option<Pending>,
    unresolved: Vec<String>,
}

impl<'a> MibParser<'a> {
    fn new(index: &'a MibIndex) -> Self {
        Self {
            index,
            tree: MibTree::new(),
            pending: None,
            unresolved: Vec::new(),
        }
    }

    fn parse(mut self, text: &str) -> (MibTree, Vec<String>) {
        let lines: Vec<&str> = text.lines().collect();
        let mut i = 0;
        while i < lines.len() {
            let line = strip_comment(lines[i]).trim();
            i += 1;
            if line.is_empty() {
                continue;
            }
            let tokens: Vec<&str> = line.split_whitespace().collect();

            if is_descriptor(tokens[0]) && line.contains("OBJECT IDENTIFIER") && line.contains("::=") {
                if let Some(assignment) = parse_assignment(line) {
                    self.pending = None;
                    self.define(tokens[0], assignment, MibMetadata::named(tokens[0]));
                }
                continue;
            }

            if tokens.len() >= 2 && is_descriptor(tokens[0]) && DECLARATION_MACROS.contains(&tokens[1]) {
                self.pending = Some(Pending {
                    name: tokens[0].to_string(),
                    meta: MibMetadata::named(tokens[0]),
                });
                continue;
            }

            if let Some(pending) = self.pending.as_mut() {
                let rest = |kw: &str| line[kw.len()..].trim().to_string();
                match tokens[0] {
                    "SYNTAX" => pending.meta.syntax = rest("SYNTAX"),
                    "ACCESS" => pending.meta.access = rest("ACCESS"),
                    "MAX-ACCESS" => pending.meta.access = rest("MAX-ACCESS"),
                    "STATUS" => pending.meta.status = rest("STATUS"),
                    "DESCRIPTION" => {
                        let start = lines[i - 1].find("DESCRIPTION").unwrap_or(0) + "DESCRIPTION".len();
                        let (description, consumed) = read_description(&lines[i - 1][start..], &lines[i..]);
                        pending.meta.description = description;
                        i += consumed;
                        continue;
                    }
                    _ => {}
                }
            }

            if line.contains("::=") {
                let assignment = parse_assignment(line);
                match (self.pending.take(), assignment) {
                    (Some(p), Some(assignment)) => self.define(&p.name, assignment, p.meta),
                    // Type assignments and the like close any open declaration.
                    _ => {}
                }
            }
        }
        (self.tree, self.unresolved)
    }

    fn resolve_parent(&mut self, parent: &str) -> Vec<u32> {
        if let Ok(n) = parent.parse::<u32>() {
            return vec![n];
        }
        let found = self
            .tree
            .find_by_name(parent)
            .map(str::to_string)
            .or_else(|| self.index.resolve_name(parent));
        match found.as_deref().and_then(parse_oid) {
            Some(segments) => segments,
            None => {
                tracing::warn!(parent, "unresolved MIB parent, attaching under root");
                if !self.unresolved.iter().any(|u| u == parent) {
                    self.unresolved.push(parent.to_string());
                }
                Vec::new()
            }
        }
    }

    fn define(&mut self, name: &str, assignment: Assignment, meta: MibMetadata) {
        let mut segments = self.resolve_parent(&assignment.parent);
        let last = assignment.components.len().saturating_sub(1);
        for (i, (label, id)) in assignment.components.into_iter().enumerate() {
            segments.push(id);
            let oid = join_oid(&segments);
            let node_meta = if i == last {
                meta.clone()
            } else {
                label.map(|l| MibMetadata::named(&l)).unwrap_or_default()
            };
            if let Err(e) = self.tree.add_node(&oid, node_meta) {
                tracing::warn!(name, error = %e, "skipping MIB node");
            }
        }
    }
}

/// Right-hand side of `::= { parent [label(]n[)] ... }`.
struct Assignment {
    parent: String,
    components: Vec<(Option<String>, u32)>,
}

fn parse_assignment(line: &str) -> Option<Assignment> {
    let rhs = line.split_once("::=")?.1;
    let inner = rhs.trim().strip_prefix('{')?;
    let inner = &inner[..inner.find('}')?];
    let mut tokens = inner.split_whitespace();
    let parent = tokens.next()?.to_string();
    let mut components = Vec::new();
    for token in tokens {
        components.push(parse_component(token)?);
    }
    if components.is_empty() {
        return None;
    }
    Some(Assignment { parent, components })
}

/// `3` or `org(3)`.
fn parse_component(token: &str) -> Option<(Option<String>, u32)> {
    if let Ok(n) = token.parse::<u32>() {
        return Some((None, n));
    }
    let (label, rest) = token.split_once('(')?;
    let n = rest.strip_suffix(')')?.parse::<u32>().ok()?;
    Some((Some(label.to_string()), n))
}

/// Object descriptors start with a lowercase letter.
fn is_descriptor(token: &str) -> bool {
    token.starts_with(|c: char| c.is_ascii_lowercase())
        && token.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

fn strip_comment(line: &str) -> &str {
    match line.find("--") {
        Some(pos) => &line[..pos],
        None => line,
    }
}

/// Collect a quoted description starting at `first` and continuing over
/// `following` until the closing quote or a `::=` line. Returns the text with
/// quotes removed and whitespace collapsed, and how many following lines
/// were consumed.
fn read_description(first: &str, following: &[&str]) -> (String, usize) {
    let mut text = first.trim().to_string();
    let mut consumed = 0;
    for line in following {
        if text.matches('"').count() >= 2 || line.contains("::=") {
            break;
        }
        text.push(' ');
        text.push_str(line.trim());
        consumed += 1;
    }
    let cleaned = text.replace('"', "");
    let description = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    (description, consumed)
}
