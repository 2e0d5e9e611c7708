//! Role inheritance relations.
//!
//! One [`RoleGraph`] is built per role definition (`g`, `g2`, ...) from the
//! grouping rules of that type. Membership is reflexive and transitive.
//! Lookups walk the graph breadth-first with a visited set, so cyclic
//! groupings such as `(a, b)` + `(b, a)` terminate.
use std::collections::{HashMap, HashSet, VecDeque};

#[derive(Debug, Clone, PartialEq, Eq)]
struct Edge {
    group: String,
    domain: Option<String>,
}

/// Directed member -> group edges for a single role definition.
#[derive(Debug, Clone, Default)]
pub struct RoleGraph {
    edges: HashMap<String, Vec<Edge>>,
}

impl RoleGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `member` belongs to `group`, optionally within `domain`.
    pub fn add_link(&mut self, member: &str, group: &str, domain: Option<&str>) {
        let edge = Edge {
            group: group.to_string(),
            domain: domain.map(str::to_string),
        };
        let edges = self.edges.entry(member.to_string()).or_default();
        if !edges.contains(&edge) {
            edges.push(edge);
        }
    }

    /// Whether `member` reaches `group` through zero or more links.
    ///
    /// With a `domain`, only links recorded for that domain are followed.
    pub fn has_link(&self, member: &str, group: &str, domain: Option<&str>) -> bool {
        if member == group {
            return true;
        }
        let mut visited: HashSet<&str> = HashSet::new();
        let mut queue: VecDeque<&str> = VecDeque::new();
        visited.insert(member);
        queue.push_back(member);
        while let Some(current) = queue.pop_front() {
            let Some(edges) = self.edges.get(current) else {
                continue;
            };
            for edge in edges {
                if edge.domain.as_deref() != domain {
                    continue;
                }
                if edge.group == group {
                    return true;
                }
                if visited.insert(edge.group.as_str()) {
                    queue.push_back(edge.group.as_str());
                }
            }
        }
        false
    }
}
