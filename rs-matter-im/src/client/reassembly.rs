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

use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use log::warn;

use crate::dm::AttrValue;
use crate::error::{Error, ErrorCode};
use crate::im::{AttrData, AttrPath, AttrResp, ConcretePath, DataVersion, IMStatusCode};
use crate::tlv::FromTLV;

/// The outcome of reading one concrete attribute, as delivered to the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttrReport {
    pub path: ConcretePath,
    /// The value and the data version of its cluster instance (if the server reported one),
    /// or the status the server reported for the path.
    pub result: Result<(AttrValue, Option<DataVersion>), IMStatusCode>,
}

/// Rebuilds whole attribute values out of the entries of a (possibly chunked) report.
///
/// A list attribute split across entries arrives as a replace of its leading
/// items followed by list appends of the rest. The appends are concatenated
/// onto the replaced value. Completed attributes are handed out in the order
/// their paths were first seen in the report.
#[derive(Default)]
pub struct ChunkReassembler {
    index: BTreeMap<ConcretePath, usize>,
    reports: Vec<AttrReport>,
}

impl ChunkReassembler {
    pub const fn new() -> Self {
        Self {
            index: BTreeMap::new(),
            reports: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }

    /// Feed the next entry of the report.
    ///
    /// Fails with `ErrorCode::MalformedMessage` for entries which cannot be applied:
    /// wildcard or indexed paths, appends to an attribute which was not replaced
    /// earlier in the same report, or data which does not decode.
    pub fn push(&mut self, resp: &AttrResp<'_>) -> Result<(), Error> {
        match resp {
            AttrResp::Data(data) => self.push_data(data),
            AttrResp::Status(status) => {
                let path = Self::concrete(&status.path)?;

                // A status for a path discards whatever was buffered for it
                self.upsert(
                    path,
                    AttrReport {
                        path,
                        result: Err(status.status.status),
                    },
                );

                Ok(())
            }
        }
    }

    /// Take all attributes reassembled so far, in first-seen order.
    pub fn finish(&mut self) -> Vec<AttrReport> {
        self.index.clear();

        core::mem::take(&mut self.reports)
    }

    /// Drop all buffered attributes.
    pub fn clear(&mut self) {
        self.index.clear();
        self.reports.clear();
    }

    fn push_data(&mut self, data: &AttrData<'_>) -> Result<(), Error> {
        let path = Self::concrete(&data.path)?;

        let value = AttrValue::from_tlv(&data.data).map_err(|err| {
            warn!("Undecodable value for attribute {}: {:?}", path, err);
            ErrorCode::MalformedMessage
        })?;

        match &data.path.list_index {
            None => {
                self.upsert(
                    path,
                    AttrReport {
                        path,
                        result: Ok((value, data.data_ver)),
                    },
                );

                Ok(())
            }
            Some(index) if index.is_none() => {
                let report = self
                    .index
                    .get(&path)
                    .and_then(|index| self.reports.get_mut(*index));

                match report {
                    Some(AttrReport {
                        result: Ok((AttrValue::List(items), data_ver)),
                        ..
                    }) => {
                        items.push(value);

                        if data.data_ver.is_some() {
                            *data_ver = data.data_ver;
                        }

                        Ok(())
                    }
                    _ => {
                        warn!("List append to {} without a preceding list value", path);
                        Err(ErrorCode::MalformedMessage.into())
                    }
                }
            }
            Some(_) => {
                warn!("Unsupported indexed list item for attribute {}", path);
                Err(ErrorCode::MalformedMessage.into())
            }
        }
    }

    fn upsert(&mut self, path: ConcretePath, report: AttrReport) {
        if let Some(index) = self.index.get(&path) {
            self.reports[*index] = report;
        } else {
            self.index.insert(path, self.reports.len());
            self.reports.push(report);
        }
    }

    fn concrete(path: &AttrPath) -> Result<ConcretePath, Error> {
        path.to_gp().not_wildcard().map_err(|_| {
            warn!("Got a report entry for the non-concrete path {}", path);
            ErrorCode::MalformedMessage.into()
        })
    }
}
