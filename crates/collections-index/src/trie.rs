//! In-memory prefix index: word → set of values (§4.B).
//!
//! Used to accelerate target-name search once warm-up has populated it
//! (§4.G). The trie never normalizes its input — callers are responsible for
//! lower-casing words before `insert`/`find`/`find_with_prefix`, exactly as
//! specified.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::sync::RwLock;

use collections_core::PackageIdentity;

/// The value stored at each trie word: which collection (identified by its
/// base64-encoded `CollectionIdentifier`, the same key used in the FTS
/// tables) contains a package with this target name, and that package's
/// identity.
pub type TargetTrieValue = (String, PackageIdentity);

/// The trie specialization used for target-name search (§4.F, §4.G).
pub type TargetTrie = Trie<TargetTrieValue>;

#[derive(Debug, PartialEq, Eq)]
pub enum TrieError {
    NotFound,
}

pub type TrieResult<T> = std::result::Result<T, TrieError>;

struct TrieNode<V: Eq + Hash> {
    children: HashMap<char, TrieNode<V>>,
    values: HashSet<V>,
}

impl<V: Eq + Hash> Default for TrieNode<V> {
    fn default() -> Self {
        Self {
            children: HashMap::new(),
            values: HashSet::new(),
        }
    }
}

/// A character-keyed trie storing a multiset of values per word.
pub struct Trie<V: Eq + Hash + Clone> {
    root: RwLock<TrieNode<V>>,
}

impl<V: Eq + Hash + Clone> Default for Trie<V> {
    fn default() -> Self {
        Self {
            root: RwLock::new(TrieNode::default()),
        }
    }
}

impl<V: Eq + Hash + Clone> Trie<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Case-sensitive insertion. Lower-casing the word is the caller's
    /// responsibility.
    pub fn insert(&self, word: &str, value: V) {
        let mut root = self.root.write().expect("trie lock poisoned");
        let mut node = &mut *root;
        for c in word.chars() {
            node = node.children.entry(c).or_default();
        }
        node.values.insert(value);
    }

    /// Removes, from every terminal node, every value satisfying `predicate`.
    /// Nodes left with no values and no children are garbage-collected
    /// bottom-up.
    pub fn remove<F>(&self, predicate: F)
    where
        F: Fn(&V) -> bool,
    {
        let mut root = self.root.write().expect("trie lock poisoned");
        Self::remove_recursive(&mut root, &predicate);
    }

    fn remove_recursive<F>(node: &mut TrieNode<V>, predicate: &F) -> bool
    where
        F: Fn(&V) -> bool,
    {
        let mut emptied = Vec::new();
        for (&ch, child) in node.children.iter_mut() {
            if Self::remove_recursive(child, predicate) {
                emptied.push(ch);
            }
        }
        for ch in emptied {
            node.children.remove(&ch);
        }

        node.values.retain(|v| !predicate(v));
        node.values.is_empty() && node.children.is_empty()
    }

    /// The exact set of values stored at `word`, or `NotFound` if the word
    /// was never inserted (or has since had all its values removed).
    pub fn find(&self, word: &str) -> TrieResult<HashSet<V>> {
        let root = self.root.read().expect("trie lock poisoned");
        let mut node = &*root;
        for c in word.chars() {
            match node.children.get(&c) {
                Some(child) => node = child,
                None => return Err(TrieError::NotFound),
            }
        }

        if node.values.is_empty() {
            Err(TrieError::NotFound)
        } else {
            Ok(node.values.clone())
        }
    }

    /// Every word having `prefix`, mapped to its value set. `NotFound` if no
    /// such word exists.
    pub fn find_with_prefix(&self, prefix: &str) -> TrieResult<HashMap<String, HashSet<V>>> {
        let root = self.root.read().expect("trie lock poisoned");
        let mut node = &*root;
        for c in prefix.chars() {
            match node.children.get(&c) {
                Some(child) => node = child,
                None => return Err(TrieError::NotFound),
            }
        }

        let mut results = HashMap::new();
        Self::collect(node, prefix.to_string(), &mut results);

        if results.is_empty() {
            Err(TrieError::NotFound)
        } else {
            Ok(results)
        }
    }

    fn collect(node: &TrieNode<V>, word: String, out: &mut HashMap<String, HashSet<V>>) {
        if !node.values.is_empty() {
            out.insert(word.clone(), node.values.clone());
        }
        for (&c, child) in node.children.iter() {
            let mut next = word.clone();
            next.push(c);
            Self::collect(child, next, out);
        }
    }
}
