/*
 *
 *    Copyright (c) 2020-2022 Project CHIP Authors
 *
 *    Licensed under the Apache License, Version 2.0 (the "License");
 *    you may not use this file except in compliance with the License.
 *    You may obtain a copy of the License at
 *
 *        http://www.apache.org/licenses/LICENSE-2.0
 *
 *    Unless required by applicable law or agreed to in writing, software
 *    distributed under the License is distributed on an "AS IS" BASIS,
 *    WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *    See the License for the specific language governing permissions and
 *    limitations under the License.
 */

//! Wildcard expansion of attribute paths over the shape of a [`Node`].
//!
//! The expansion is driven by an explicit cursor (the last concrete path
//! produced), so that it can be suspended between report chunks and resumed
//! against a node whose shape had changed in the meantime.

use crate::im::{ConcretePath, GenericPath, IMStatusCode};

use super::node::{Node, Quality};

/// One item produced by expanding a [`GenericPath`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expanded {
    /// An existing concrete attribute
    Attr(ConcretePath, Quality),
    /// A non-wildcard path which does not exist in the node
    Status(GenericPath, IMStatusCode),
}

/// Return the first item of the expansion of `path` that comes after `after`
/// (or the very first one if `after` is `None`).
///
/// For a non-wildcard path, the expansion is exactly one item: either the
/// attribute, or a status telling which of its parts is missing.
///
/// For a wildcard path, missing pieces are silently skipped. If `after` does
/// not exist anymore, the expansion continues with the next greater existing path.
pub fn next(node: &Node, path: &GenericPath, after: Option<&ConcretePath>) -> Option<Expanded> {
    if path.is_wildcard() {
        next_wildcard(node, path, after).map(|(path, quality)| Expanded::Attr(path, quality))
    } else if after.is_none() {
        path.not_wildcard()
            .ok()
            .map(|concrete_path| concrete(node, path, &concrete_path))
    } else {
        None
    }
}

fn concrete(node: &Node, path: &GenericPath, concrete_path: &ConcretePath) -> Expanded {
    let Some(endpoint) = node.endpoint(concrete_path.endpoint) else {
        return Expanded::Status(path.clone(), IMStatusCode::UnsupportedEndpoint);
    };

    let Some(cluster) = endpoint.cluster(concrete_path.cluster) else {
        return Expanded::Status(path.clone(), IMStatusCode::UnsupportedCluster);
    };

    let Some(attr) = cluster.attribute(concrete_path.attr) else {
        return Expanded::Status(path.clone(), IMStatusCode::UnsupportedAttribute);
    };

    Expanded::Attr(*concrete_path, attr.quality)
}

fn next_wildcard(
    node: &Node,
    path: &GenericPath,
    after: Option<&ConcretePath>,
) -> Option<(ConcretePath, Quality)> {
    let from = after.map(|after| after.endpoint).unwrap_or(0);
    let from = path.endpoint.map(|id| id.max(from)).unwrap_or(from);

    node.endpoints_from(from)
        .take_while(move |endpoint| path.endpoint.map(|id| endpoint.id <= id).unwrap_or(true))
        .flat_map(move |endpoint| {
            let from = after
                .filter(|after| after.endpoint == endpoint.id)
                .map(|after| after.cluster)
                .unwrap_or(0);

            endpoint
                .clusters_from(from)
                .filter(move |cluster| path.cluster.map(|id| cluster.id == id).unwrap_or(true))
                .flat_map(move |cluster| {
                    let from = after
                        .filter(|after| after.endpoint == endpoint.id && after.cluster == cluster.id)
                        .map(|after| after.attr)
                        .unwrap_or(0);

                    cluster
                        .attributes_from(from)
                        .filter(move |attr| path.leaf.map(|id| attr.id == id).unwrap_or(true))
                        .map(move |attr| {
                            (
                                ConcretePath::new(endpoint.id, cluster.id, attr.id),
                                attr.quality,
                            )
                        })
                })
        })
        .find(|(candidate, _)| after.map(|after| candidate > after).unwrap_or(true))
}

/// A lazy iterator over the expansion of a [`GenericPath`].
///
/// Borrows the node for its lifetime; to suspend and resume an expansion over
/// a node which might change in-between, keep the [`PathExpander::cursor`] and
/// call [`next`] directly instead.
pub struct PathExpander<'a> {
    node: &'a Node,
    path: &'a GenericPath,
    cursor: Option<ConcretePath>,
    done: bool,
}

impl<'a> PathExpander<'a> {
    pub const fn new(node: &'a Node, path: &'a GenericPath) -> Self {
        Self::resume(node, path, None)
    }

    /// Continue an expansion after the given concrete path.
    pub const fn resume(
        node: &'a Node,
        path: &'a GenericPath,
        cursor: Option<ConcretePath>,
    ) -> Self {
        Self {
            node,
            path,
            cursor,
            done: false,
        }
    }

    /// The last concrete path produced, if any.
    pub fn cursor(&self) -> Option<ConcretePath> {
        self.cursor
    }
}

impl Iterator for PathExpander<'_> {
    type Item = Expanded;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let item = next(self.node, self.path, self.cursor.as_ref());

        match &item {
            Some(Expanded::Attr(path, _)) => self.cursor = Some(*path),
            _ => self.done = true,
        }

        item
    }
}
