use levenshtein_automata::{Distance, DFA, SINK_STATE};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Node of the terms trie. Nodes are shared between snapshots; `insert`
/// copies the path it touches so readers keep a stable root.
#[derive(Debug, Clone, Default)]
pub struct TrieNode {
    children: BTreeMap<u8, Arc<TrieNode>>,
    terminal: bool,
}

/// Copy-on-write byte trie over the index's terms. Query-time expansion
/// (prefix, fuzzy, lexical range) walks a root snapshot taken under the
/// index lock, so it never races the writer.
#[derive(Debug, Clone, Default)]
pub struct Trie {
    root: Arc<TrieNode>,
    len: usize,
}

impl Trie {
    pub fn new() -> Self {
        Trie::default()
    }

    /// Insert a term. Returns true if it was not present before.
    pub fn insert(&mut self, key: &[u8]) -> bool {
        fn descend(node: &mut Arc<TrieNode>, key: &[u8]) -> bool {
            let n = Arc::make_mut(node);
            if key.is_empty() {
                let is_new = !n.terminal;
                n.terminal = true;
                return is_new;
            }
            let child = n.children.entry(key[0]).or_default();
            descend(child, &key[1..])
        }
        let is_new = descend(&mut self.root, key);
        if is_new {
            self.len += 1;
        }
        is_new
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        let mut node = &*self.root;
        for &b in key {
            match node.children.get(&b) {
                Some(child) => node = child,
                None => return false,
            }
        }
        node.terminal
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Stable root for lock-free iteration.
    pub fn snapshot(&self) -> Arc<TrieNode> {
        self.root.clone()
    }

    /// All terms extending `prefix`, in lexical order, capped at `max`
    /// (0 = unlimited).
    pub fn find_prefix(&self, prefix: &[u8], max: usize) -> Vec<Vec<u8>> {
        let mut node = &*self.root;
        for &b in prefix {
            match node.children.get(&b) {
                Some(child) => node = child,
                None => return Vec::new(),
            }
        }
        let mut out = Vec::new();
        collect_terminals(node, &mut prefix.to_vec(), max, &mut out);
        out
    }

    /// Terms in `[begin, end]` with per-bound inclusivity. An absent bound is
    /// unbounded on that side.
    pub fn find_range(
        &self,
        begin: Option<&[u8]>,
        include_begin: bool,
        end: Option<&[u8]>,
        include_end: bool,
        max: usize,
    ) -> Vec<Vec<u8>> {
        let mut out = Vec::new();
        let mut key = Vec::new();
        range_walk(
            &self.root,
            &mut key,
            begin,
            include_begin,
            end,
            include_end,
            max,
            &mut out,
        );
        out
    }

    /// Terms within the Levenshtein automaton, in lexical order.
    pub fn find_fuzzy(&self, dfa: &DFA, max: usize) -> Vec<Vec<u8>> {
        let mut out = Vec::new();
        let mut key = Vec::new();
        fuzzy_walk(&self.root, dfa, dfa.initial_state(), &mut key, max, &mut out);
        out
    }
}

fn collect_terminals(node: &TrieNode, key: &mut Vec<u8>, max: usize, out: &mut Vec<Vec<u8>>) {
    if max != 0 && out.len() >= max {
        return;
    }
    if node.terminal {
        out.push(key.clone());
    }
    for (&b, child) in &node.children {
        key.push(b);
        collect_terminals(child, key, max, out);
        key.pop();
        if max != 0 && out.len() >= max {
            return;
        }
    }
}

fn above_begin(key: &[u8], begin: Option<&[u8]>, include_begin: bool) -> bool {
    match begin {
        None => true,
        Some(b) => {
            if include_begin {
                key >= b
            } else {
                key > b
            }
        }
    }
}

fn below_end(key: &[u8], end: Option<&[u8]>, include_end: bool) -> bool {
    match end {
        None => true,
        Some(e) => {
            if include_end {
                key <= e
            } else {
                key < e
            }
        }
    }
}

fn range_walk(
    node: &TrieNode,
    key: &mut Vec<u8>,
    begin: Option<&[u8]>,
    include_begin: bool,
    end: Option<&[u8]>,
    include_end: bool,
    max: usize,
    out: &mut Vec<Vec<u8>>,
) {
    if max != 0 && out.len() >= max {
        return;
    }
    // Every key in this subtree is prefixed by `key`; once the prefix alone
    // exceeds the end bound the subtree cannot contribute.
    if let Some(e) = end {
        if key.as_slice() > e && !e.starts_with(key) {
            return;
        }
    }
    if node.terminal
        && above_begin(key, begin, include_begin)
        && below_end(key, end, include_end)
    {
        out.push(key.clone());
    }
    for (&b, child) in &node.children {
        key.push(b);
        range_walk(child, key, begin, include_begin, end, include_end, max, out);
        key.pop();
        if max != 0 && out.len() >= max {
            return;
        }
    }
}

fn fuzzy_walk(
    node: &TrieNode,
    dfa: &DFA,
    state: u32,
    key: &mut Vec<u8>,
    max: usize,
    out: &mut Vec<Vec<u8>>,
) {
    if max != 0 && out.len() >= max {
        return;
    }
    if node.terminal {
        if let Distance::Exact(_) = dfa.distance(state) {
            out.push(key.clone());
        }
    }
    for (&b, child) in &node.children {
        let next = dfa.transition(state, b);
        if next == SINK_STATE {
            continue;
        }
        key.push(b);
        fuzzy_walk(child, dfa, next, key, max, out);
        key.pop();
        if max != 0 && out.len() >= max {
            return;
        }
    }
}

/// Plain mutable byte trie with a value per key. Backs the tag indexes,
/// where the values (posting lists) are mutated in place under the index
/// write lock.
#[derive(Debug)]
pub struct TrieMap<V> {
    root: TrieMapNode<V>,
    len: usize,
}

#[derive(Debug)]
struct TrieMapNode<V> {
    children: BTreeMap<u8, TrieMapNode<V>>,
    value: Option<V>,
}

impl<V> Default for TrieMapNode<V> {
    fn default() -> Self {
        TrieMapNode {
            children: BTreeMap::new(),
            value: None,
        }
    }
}

impl<V> Default for TrieMap<V> {
    fn default() -> Self {
        TrieMap {
            root: TrieMapNode::default(),
            len: 0,
        }
    }
}

impl<V> TrieMap<V> {
    pub fn new() -> Self {
        TrieMap::default()
    }

    pub fn get(&self, key: &[u8]) -> Option<&V> {
        let mut node = &self.root;
        for &b in key {
            node = node.children.get(&b)?;
        }
        node.value.as_ref()
    }

    pub fn get_or_insert_with(&mut self, key: &[u8], default: impl FnOnce() -> V) -> &mut V {
        let mut node = &mut self.root;
        for &b in key {
            node = node.children.entry(b).or_default();
        }
        if node.value.is_none() {
            node.value = Some(default());
            self.len += 1;
        }
        node.value.as_mut().unwrap()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn keys_with_prefix(&self, prefix: &[u8], max: usize) -> Vec<Vec<u8>> {
        let mut node = &self.root;
        for &b in prefix {
            match node.children.get(&b) {
                Some(child) => node = child,
                None => return Vec::new(),
            }
        }
        let mut out = Vec::new();
        let mut key = prefix.to_vec();
        map_collect(node, &mut key, max, &mut out);
        out
    }

    pub fn keys_in_range(
        &self,
        begin: Option<&[u8]>,
        include_begin: bool,
        end: Option<&[u8]>,
        include_end: bool,
        max: usize,
    ) -> Vec<Vec<u8>> {
        let mut out = Vec::new();
        let mut key = Vec::new();
        map_range_walk(
            &self.root,
            &mut key,
            begin,
            include_begin,
            end,
            include_end,
            max,
            &mut out,
        );
        out
    }

    pub fn for_each(&self, mut f: impl FnMut(&[u8], &V)) {
        fn walk<V>(node: &TrieMapNode<V>, key: &mut Vec<u8>, f: &mut impl FnMut(&[u8], &V)) {
            if let Some(v) = &node.value {
                f(key, v);
            }
            for (&b, child) in &node.children {
                key.push(b);
                walk(child, key, f);
                key.pop();
            }
        }
        let mut key = Vec::new();
        walk(&self.root, &mut key, &mut f);
    }
}

fn map_collect<V>(node: &TrieMapNode<V>, key: &mut Vec<u8>, max: usize, out: &mut Vec<Vec<u8>>) {
    if max != 0 && out.len() >= max {
        return;
    }
    if node.value.is_some() {
        out.push(key.clone());
    }
    for (&b, child) in &node.children {
        key.push(b);
        map_collect(child, key, max, out);
        key.pop();
        if max != 0 && out.len() >= max {
            return;
        }
    }
}

fn map_range_walk<V>(
    node: &TrieMapNode<V>,
    key: &mut Vec<u8>,
    begin: Option<&[u8]>,
    include_begin: bool,
    end: Option<&[u8]>,
    include_end: bool,
    max: usize,
    out: &mut Vec<Vec<u8>>,
) {
    if max != 0 && out.len() >= max {
        return;
    }
    if let Some(e) = end {
        if key.as_slice() > e && !e.starts_with(key) {
            return;
        }
    }
    if node.value.is_some()
        && above_begin(key, begin, include_begin)
        && below_end(key, end, include_end)
    {
        out.push(key.clone());
    }
    for (&b, child) in &node.children {
        key.push(b);
        map_range_walk(child, key, begin, include_begin, end, include_end, max, out);
        key.pop();
        if max != 0 && out.len() >= max {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use levenshtein_automata::LevenshteinAutomatonBuilder;

    fn sample() -> Trie {
        let mut t = Trie::new();
        for term in ["hello", "help", "helicopter", "hill", "goodbye"] {
            t.insert(term.as_bytes());
        }
        t
    }

    #[test]
    fn test_insert_contains() {
        let t = sample();
        assert_eq!(t.len(), 5);
        assert!(t.contains(b"hello"));
        assert!(!t.contains(b"hel"));
    }

    #[test]
    fn test_prefix_expansion() {
        let t = sample();
        let hits = t.find_prefix(b"hel", 0);
        assert_eq!(hits, vec![b"helicopter".to_vec(), b"hello".to_vec(), b"help".to_vec()]);
        // Cap respected.
        assert_eq!(t.find_prefix(b"hel", 2).len(), 2);
    }

    #[test]
    fn test_lex_range() {
        let t = sample();
        let hits = t.find_range(Some(b"help"), true, Some(b"hill"), false, 0);
        assert_eq!(hits, vec![b"help".to_vec()]);
        let hits = t.find_range(Some(b"help"), false, None, true, 0);
        assert_eq!(hits, vec![b"hill".to_vec()]);
    }

    #[test]
    fn test_fuzzy() {
        let t = sample();
        let builder = LevenshteinAutomatonBuilder::new(1, true);
        let dfa = builder.build_dfa("helo");
        let hits = t.find_fuzzy(&dfa, 0);
        assert!(hits.contains(&b"hello".to_vec()));
        assert!(hits.contains(&b"help".to_vec()));
        assert!(!hits.contains(&b"hill".to_vec()));
    }

    #[test]
    fn test_snapshot_is_stable() {
        let mut t = sample();
        let snap = t.snapshot();
        t.insert(b"zebra");
        let mut before = Vec::new();
        collect_terminals(&snap, &mut Vec::new(), 0, &mut before);
        assert_eq!(before.len(), 5);
        assert_eq!(t.len(), 6);
    }

    #[test]
    fn test_trie_map() {
        let mut m: TrieMap<u32> = TrieMap::new();
        *m.get_or_insert_with(b"red", || 0) += 1;
        *m.get_or_insert_with(b"red", || 0) += 1;
        *m.get_or_insert_with(b"blue", || 10) += 1;
        assert_eq!(m.len(), 2);
        assert_eq!(m.get(b"red"), Some(&2));
        assert_eq!(m.keys_with_prefix(b"r", 0), vec![b"red".to_vec()]);
        let range = m.keys_in_range(Some(b"a"), true, Some(b"c"), true, 0);
        assert_eq!(range, vec![b"blue".to_vec()]);
    }
}
