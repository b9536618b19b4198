/// A union-find (disjoint set) structure over `0..len` with path compression
/// and union by rank.
#[derive(Clone, Debug)]
pub struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl UnionFind {
    /// Make a new structure with every index in its own set.
    pub fn new(len: usize) -> Self {
        Self {
            parent: (0..len).collect(),
            rank: vec![0; len],
        }
    }

    /// Number of indices managed.
    pub fn len(&self) -> usize {
        self.parent.len()
    }

    /// Check if no indices are managed.
    pub fn is_empty(&self) -> bool {
        self.parent.is_empty()
    }

    /// Find the representative of the set containing `x`.
    pub fn find(&mut self, x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        // Compress the path walked.
        let mut at = x;
        while self.parent[at] != root {
            let next = self.parent[at];
            self.parent[at] = root;
            at = next;
        }
        root
    }

    /// Merge the sets containing `a` and `b`. Returns the new representative.
    pub fn union(&mut self, a: usize, b: usize) -> usize {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra == rb {
            return ra;
        }
        match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => {
                self.parent[ra] = rb;
                rb
            }
            std::cmp::Ordering::Greater => {
                self.parent[rb] = ra;
                ra
            }
            std::cmp::Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] += 1;
                ra
            }
        }
    }

    /// Map each index to a dense group id in `0..num_groups`, groups ordered
    /// by first appearance.
    pub fn dense_groups(&mut self) -> (Vec<usize>, usize) {
        let mut group_of_root = vec![usize::MAX; self.len()];
        let mut groups = Vec::with_capacity(self.len());
        let mut next = 0;
        for x in 0..self.len() {
            let root = self.find(x);
            if group_of_root[root] == usize::MAX {
                group_of_root[root] = next;
                next += 1;
            }
            groups.push(group_of_root[root]);
        }
        (groups, next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn singleton_sets() {
        let mut uf = UnionFind::new(4);
        assert!((0..4).all(|i| uf.find(i) == i));
    }

    #[test]
    fn union_and_dense() {
        let mut uf = UnionFind::new(5);
        uf.union(0, 3);
        uf.union(3, 4);
        uf.union(1, 2);
        assert_eq!(uf.find(0), uf.find(4));
        assert_ne!(uf.find(0), uf.find(1));
        let (groups, n) = uf.dense_groups();
        assert_eq!(n, 2);
        assert_eq!(groups[0], groups[3]);
        assert_eq!(groups[0], groups[4]);
        assert_eq!(groups[1], groups[2]);
        assert_ne!(groups[0], groups[1]);
    }
}
