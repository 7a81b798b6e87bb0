//! Longest-prefix-match tries over v4 and v6 keys.

mod trie;

pub use trie::{
    free_frozen_trie, FrozenLpmTrie, FrozenLpmTrieV4, FrozenLpmTrieV6, LpmTrie, LpmTrieV4, LpmTrieV6, LPM_INVALID,
};
