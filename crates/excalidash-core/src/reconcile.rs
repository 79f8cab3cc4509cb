//! Merging remote element batches into the local scene.
//!
//! Each element is a last-writer-wins register keyed by id. A remote revision
//! replaces the local one only if its `(version, versionNonce)` pair is higher.
//! Concurrent edits to different elements always both survive; concurrent
//! edits to the same element keep whichever side drew the higher pair.

use std::collections::{HashMap, HashSet};

use crate::element::Element;

/// Merge `remote` into `local`.
///
/// Local order is preserved and remote-only elements are appended in the order
/// they first appear in `remote`. Local elements missing from `remote` are kept,
/// since batches are deltas. Pure and deterministic.
pub fn reconcile(local: &[Element], remote: &[Element]) -> Vec<Element> {
    let mut merged: Vec<Element> = local.to_vec();
    let mut index: HashMap<String, usize> = merged
        .iter()
        .enumerate()
        .map(|(pos, el)| (el.id.clone(), pos))
        .collect();

    for incoming in remote {
        match index.get(&incoming.id) {
            Some(&pos) => {
                if incoming.supersedes(&merged[pos]) {
                    merged[pos] = incoming.clone();
                }
            }
            None => {
                index.insert(incoming.id.clone(), merged.len());
                merged.push(incoming.clone());
            }
        }
    }

    merged
}

/// Drop remote elements the local user is currently selecting or dragging.
pub fn filter_selected(remote: Vec<Element>, selection: &HashSet<String>) -> Vec<Element> {
    if selection.is_empty() {
        return remote;
    }
    remote
        .into_iter()
        .filter(|el| !selection.contains(&el.id))
        .collect()
}

/// Ids of remote elements that would replace or extend `local`.
pub fn winning_ids(local: &[Element], remote: &[Element]) -> Vec<String> {
    let index: HashMap<&str, &Element> = local.iter().map(|el| (el.id.as_str(), el)).collect();
    let mut seen = HashSet::new();
    remote
        .iter()
        .filter(|el| index.get(el.id.as_str()).is_none_or(|cur| el.supersedes(cur)))
        .filter(|el| seen.insert(el.id.as_str()))
        .map(|el| el.id.clone())
        .collect()
}
