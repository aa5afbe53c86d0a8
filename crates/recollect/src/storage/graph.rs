//! Typed relationship graph between memories
//!
//! Edges are directed and keyed by `(source, target, relationship)`. A
//! bidirectional link is two edges. Every edge is indexed under both of its
//! endpoints so removing a memory drops all edges touching it.

use std::collections::{HashMap, HashSet, VecDeque};

use uuid::Uuid;

use crate::memory::types::{MemoryLink, RelatedMemory, Relationship};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct EdgeKey {
    source: Uuid,
    target: Uuid,
    relationship: Relationship,
}

impl From<&MemoryLink> for EdgeKey {
    fn from(link: &MemoryLink) -> Self {
        Self {
            source: link.source_id,
            target: link.target_id,
            relationship: link.relationship.clone(),
        }
    }
}

/// Edge changes that re-point edges from a set of memories to a new one
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RewirePlan {
    pub removed: Vec<MemoryLink>,
    pub added: Vec<MemoryLink>,
}

#[derive(Debug, Default)]
pub struct RelationshipGraph {
    edges: HashMap<EdgeKey, MemoryLink>,
    touching: HashMap<Uuid, HashSet<EdgeKey>>,
}

impl RelationshipGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of directed edges
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Whether exactly this edge (label and bidirectional flag included) exists
    pub fn contains(&self, link: &MemoryLink) -> bool {
        self.edges
            .get(&EdgeKey::from(link))
            .is_some_and(|existing| existing == link)
    }

    /// Insert an edge. An existing edge with the same key is replaced.
    /// Self-loops are ignored.
    pub fn insert(&mut self, link: MemoryLink) -> bool {
        if link.source_id == link.target_id {
            return false;
        }
        let key = EdgeKey::from(&link);
        self.touching
            .entry(link.source_id)
            .or_default()
            .insert(key.clone());
        self.touching
            .entry(link.target_id)
            .or_default()
            .insert(key.clone());
        self.edges.insert(key, link).is_none()
    }

    pub fn remove(&mut self, link: &MemoryLink) -> bool {
        let key = EdgeKey::from(link);
        if self.edges.remove(&key).is_none() {
            return false;
        }
        for endpoint in [key.source, key.target] {
            if let Some(keys) = self.touching.get_mut(&endpoint) {
                keys.remove(&key);
                if keys.is_empty() {
                    self.touching.remove(&endpoint);
                }
            }
        }
        true
    }

    /// All edges with `id` as source or target
    pub fn edges_touching(&self, id: Uuid) -> Vec<MemoryLink> {
        let mut links: Vec<MemoryLink> = self
            .touching
            .get(&id)
            .into_iter()
            .flatten()
            .filter_map(|key| self.edges.get(key).cloned())
            .collect();
        links.sort_by(|a, b| {
            (a.source_id, a.target_id, &a.relationship).cmp(&(
                b.source_id,
                b.target_id,
                &b.relationship,
            ))
        });
        links
    }

    /// Remove every edge touching `id`, returning the removed edges
    pub fn remove_node(&mut self, id: Uuid) -> Vec<MemoryLink> {
        let links = self.edges_touching(id);
        for link in &links {
            self.remove(link);
        }
        links
    }

    pub fn links(&self) -> impl Iterator<Item = &MemoryLink> {
        self.edges.values()
    }

    /// Outgoing neighbours of `id`, sorted for deterministic traversal
    fn outgoing(&self, id: Uuid) -> Vec<(Uuid, Relationship)> {
        let mut neighbours: Vec<(Uuid, Relationship)> = self
            .touching
            .get(&id)
            .into_iter()
            .flatten()
            .filter(|key| key.source == id)
            .map(|key| (key.target, key.relationship.clone()))
            .collect();
        neighbours.sort();
        neighbours
    }

    /// Breadth-first traversal from `origin`, up to `max_depth` hops.
    ///
    /// Each node is reported once at the depth it was first reached, with the
    /// label of the edge that reached it. The origin is never reported.
    /// `admit` decides whether a node may be reported and expanded.
    pub fn traverse<F>(
        &self,
        origin: Uuid,
        max_depth: u32,
        relationships: Option<&[Relationship]>,
        mut admit: F,
    ) -> Vec<RelatedMemory>
    where
        F: FnMut(Uuid) -> bool,
    {
        let allowed: Option<HashSet<&Relationship>> = relationships.map(|r| r.iter().collect());
        let mut visited: HashSet<Uuid> = HashSet::from([origin]);
        let mut queue: VecDeque<(Uuid, u32)> = VecDeque::from([(origin, 0)]);
        let mut related = Vec::new();

        while let Some((current, depth)) = queue.pop_front() {
            if depth >= max_depth {
                continue;
            }

            for (neighbour, relationship) in self.outgoing(current) {
                if visited.contains(&neighbour) {
                    continue;
                }
                if let Some(ref allowed) = allowed {
                    if !allowed.contains(&relationship) {
                        continue;
                    }
                }
                if !admit(neighbour) {
                    continue;
                }

                visited.insert(neighbour);
                related.push(RelatedMemory {
                    id: neighbour,
                    relationship,
                    depth: depth + 1,
                });
                queue.push_back((neighbour, depth + 1));
            }
        }

        related
    }

    /// Plan re-pointing every edge that touches one of `sources` to `new_id`.
    ///
    /// Edges between two sources would become self-loops and are dropped;
    /// edges that would duplicate an existing or already planned edge are
    /// collapsed.
    pub fn plan_rewire(&self, sources: &HashSet<Uuid>, new_id: Uuid) -> RewirePlan {
        let mut removed: Vec<MemoryLink> = Vec::new();
        let mut seen: HashSet<EdgeKey> = HashSet::new();
        for source in sources {
            for link in self.edges_touching(*source) {
                if seen.insert(EdgeKey::from(&link)) {
                    removed.push(link);
                }
            }
        }
        removed.sort_by(|a, b| {
            (a.source_id, a.target_id, &a.relationship).cmp(&(
                b.source_id,
                b.target_id,
                &b.relationship,
            ))
        });

        let repoint = |id: Uuid| if sources.contains(&id) { new_id } else { id };
        let mut planned: HashSet<EdgeKey> = HashSet::new();
        let mut added = Vec::new();
        for link in &removed {
            let rewired = MemoryLink {
                source_id: repoint(link.source_id),
                target_id: repoint(link.target_id),
                relationship: link.relationship.clone(),
                bidirectional: link.bidirectional,
            };
            if rewired.source_id == rewired.target_id {
                continue;
            }
            let key = EdgeKey::from(&rewired);
            if self.edges.contains_key(&key) && !seen.contains(&key) {
                continue;
            }
            if planned.insert(key) {
                added.push(rewired);
            }
        }

        RewirePlan { removed, added }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link(a: Uuid, b: Uuid, relationship: Relationship) -> MemoryLink {
        MemoryLink::new(a, b, relationship)
    }

    fn both(graph: &mut RelationshipGraph, a: Uuid, b: Uuid, relationship: Relationship) {
        let mut forward = link(a, b, relationship);
        forward.bidirectional = true;
        graph.insert(forward.reversed());
        graph.insert(forward);
    }

    fn ids(n: usize) -> Vec<Uuid> {
        (0..n).map(|_| Uuid::new_v4()).collect()
    }

    #[test]
    fn test_insert_and_remove() {
        let mut graph = RelationshipGraph::new();
        let n = ids(2);
        let edge = link(n[0], n[1], Relationship::Related);

        assert!(graph.insert(edge.clone()));
        assert!(!graph.insert(edge.clone()));
        assert!(graph.contains(&edge));
        assert_eq!(graph.len(), 1);

        assert!(graph.remove(&edge));
        assert!(!graph.remove(&edge));
        assert!(graph.is_empty());
        assert!(graph.edges_touching(n[0]).is_empty());
    }

    #[test]
    fn test_self_loop_ignored() {
        let mut graph = RelationshipGraph::new();
        let a = Uuid::new_v4();
        assert!(!graph.insert(link(a, a, Relationship::Related)));
        assert!(graph.is_empty());
    }

    #[test]
    fn test_same_pair_different_labels_are_distinct() {
        let mut graph = RelationshipGraph::new();
        let n = ids(2);
        graph.insert(link(n[0], n[1], Relationship::Related));
        graph.insert(link(n[0], n[1], Relationship::Refines));
        assert_eq!(graph.len(), 2);
    }

    #[test]
    fn test_remove_node_drops_all_touching_edges() {
        let mut graph = RelationshipGraph::new();
        let n = ids(3);
        both(&mut graph, n[0], n[1], Relationship::Related);
        graph.insert(link(n[2], n[1], Relationship::Follows));
        graph.insert(link(n[0], n[2], Relationship::Follows));

        let removed = graph.remove_node(n[1]);
        assert_eq!(removed.len(), 3);
        assert_eq!(graph.len(), 1);
        assert!(graph.edges_touching(n[1]).is_empty());
    }

    #[test]
    fn test_traverse_depth_limits_and_first_seen_wins() {
        let mut graph = RelationshipGraph::new();
        let n = ids(4);
        // n0 -> n1 -> n2 -> n3, plus a shortcut n0 -> n2
        graph.insert(link(n[0], n[1], Relationship::Related));
        graph.insert(link(n[1], n[2], Relationship::Follows));
        graph.insert(link(n[2], n[3], Relationship::Related));
        graph.insert(link(n[0], n[2], Relationship::Refines));

        let one = graph.traverse(n[0], 1, None, |_| true);
        let reached: HashSet<Uuid> = one.iter().map(|r| r.id).collect();
        assert_eq!(reached, HashSet::from([n[1], n[2]]));
        assert!(one.iter().all(|r| r.depth == 1));

        let all = graph.traverse(n[0], 5, None, |_| true);
        assert_eq!(all.len(), 3);
        let n2 = all.iter().find(|r| r.id == n[2]).unwrap();
        assert_eq!(n2.depth, 1);
        assert_eq!(n2.relationship, Relationship::Refines);
        let n3 = all.iter().find(|r| r.id == n[3]).unwrap();
        assert_eq!(n3.depth, 2);
    }

    #[test]
    fn test_traverse_never_returns_origin() {
        let mut graph = RelationshipGraph::new();
        let n = ids(2);
        both(&mut graph, n[0], n[1], Relationship::Related);

        let related = graph.traverse(n[0], 3, None, |_| true);
        assert_eq!(related.len(), 1);
        assert_eq!(related[0].id, n[1]);
    }

    #[test]
    fn test_traverse_zero_depth_is_empty() {
        let mut graph = RelationshipGraph::new();
        let n = ids(2);
        both(&mut graph, n[0], n[1], Relationship::Related);
        assert!(graph.traverse(n[0], 0, None, |_| true).is_empty());
    }

    #[test]
    fn test_traverse_follows_direction() {
        let mut graph = RelationshipGraph::new();
        let n = ids(2);
        graph.insert(link(n[0], n[1], Relationship::Supersedes));

        assert_eq!(graph.traverse(n[0], 1, None, |_| true).len(), 1);
        assert!(graph.traverse(n[1], 1, None, |_| true).is_empty());
    }

    #[test]
    fn test_traverse_relationship_filter() {
        let mut graph = RelationshipGraph::new();
        let n = ids(3);
        graph.insert(link(n[0], n[1], Relationship::Related));
        graph.insert(link(n[0], n[2], Relationship::Contradicts));

        let related = graph.traverse(n[0], 1, Some(&[Relationship::Contradicts]), |_| true);
        assert_eq!(related.len(), 1);
        assert_eq!(related[0].id, n[2]);
    }

    #[test]
    fn test_traverse_admit_blocks_expansion() {
        let mut graph = RelationshipGraph::new();
        let n = ids(3);
        graph.insert(link(n[0], n[1], Relationship::Related));
        graph.insert(link(n[1], n[2], Relationship::Related));

        let related = graph.traverse(n[0], 3, None, |id| id != n[1]);
        assert!(related.is_empty());
    }

    #[test]
    fn test_plan_rewire_repoints_and_collapses() {
        let mut graph = RelationshipGraph::new();
        let n = ids(4);
        let (a, b, c, d) = (n[0], n[1], n[2], n[3]);
        both(&mut graph, a, b, Relationship::Related);
        both(&mut graph, a, c, Relationship::Related);
        both(&mut graph, b, c, Relationship::Related);
        graph.insert(link(d, a, Relationship::Follows));

        let new_id = Uuid::new_v4();
        let plan = graph.plan_rewire(&HashSet::from([a, b]), new_id);

        // a<->b (2), a<->c (2), b<->c (2), d->a (1)
        assert_eq!(plan.removed.len(), 7);

        let added: HashSet<(Uuid, Uuid, Relationship)> = plan
            .added
            .iter()
            .map(|l| (l.source_id, l.target_id, l.relationship.clone()))
            .collect();
        assert_eq!(
            added,
            HashSet::from([
                (new_id, c, Relationship::Related),
                (c, new_id, Relationship::Related),
                (d, new_id, Relationship::Follows),
            ])
        );
        assert_eq!(plan.added.len(), 3);
        assert!(plan.added.iter().filter(|l| l.target_id == c).all(|l| l.bidirectional));
    }
}
