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

//! The report engine: packs the wildcard-expanded attribute paths of a read or a
//! subscription into a sequence of `ReportData` chunks, each one fitting the
//! negotiated payload size.

use alloc::collections::BTreeMap;
use alloc::vec;
use alloc::vec::Vec;

use embassy_futures::select::{select, Either};
use embassy_time::{Duration, Timer};

use log::{debug, warn};

use crate::error::{Error, ErrorCode};
use crate::im::{
    AttrDataTag, AttrPath, AttrRespTag, AttrStatus, ClusterId, ConcretePath, DataVersion,
    DataVersionFilter, EndptId, GenericPath, IMStatusCode, OpCode, ReportDataTag, StatusResp,
    SubscriptionId, IM_REVISION, IM_REVISION_TAG, PROTO_ID_INTERACTION_MODEL,
};
use crate::tlv::{TLVTag, TLVWrite, ToTLV};
use crate::transport::{Exchange, MAX_EXCHANGE_TX_BUF_SIZE};
use crate::utils::writebuf::WriteBuf;

use super::dirty::DirtyEntry;
use super::node::Quality;
use super::path::{self, Expanded};
use super::store::AttrStore;
use super::value::AttrValue;

/// The space reserved for the TLVs closing a chunk: the end of the
/// attribute reports array, the more-chunks and suppress-response flags,
/// the IM revision and the end of the message structure.
pub const LONG_READS_TLV_RESERVE_SIZE: usize = 1 + 2 + 2 + 3 + 1;

// The closing TLVs of a list data entry: the array, the data struct and the report struct
const LIST_DATA_CLOSERS_SIZE: usize = 3;

/// How long to wait for the peer to confirm a chunk by default.
pub const REPORT_STATUS_TIMEOUT_SECS: u64 = 10;

/// Tunables of the report engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportConfig {
    /// The size of the IM payload of every chunk
    pub max_payload: usize,
    /// Additional space to keep unused at the end of every chunk
    pub reserve: usize,
    /// Close a chunk once it has that many entries
    pub max_attrs_per_chunk: Option<usize>,
    /// Give up on a report if a chunk is not confirmed within that time
    pub status_timeout: Duration,
}

impl ReportConfig {
    pub const fn new() -> Self {
        Self {
            max_payload: MAX_EXCHANGE_TX_BUF_SIZE,
            reserve: 0,
            max_attrs_per_chunk: None,
            status_timeout: Duration::from_secs(REPORT_STATUS_TIMEOUT_SECS),
        }
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self::new()
    }
}

struct ListContinuation {
    path: ConcretePath,
    dataver: DataVersion,
    items: Vec<AttrValue>,
    next: usize,
}

/// The state of one report being generated, chunk by chunk.
///
/// The packer holds a resumable cursor (the index of the requested path being
/// expanded, and the last concrete path packed from it) plus the items of a
/// list attribute still to be appended, if its value was split across chunks.
///
/// The data version of every cluster instance is pinned at the first time it
/// is touched, so all entries of a cluster instance in one report carry the
/// same version.
pub struct ReportPacker {
    paths: Vec<GenericPath>,
    dataver_filters: Vec<DataVersionFilter>,
    subscription_id: Option<SubscriptionId>,
    dirty: Option<Vec<DirtyEntry>>,
    config: ReportConfig,
    path_index: usize,
    after: Option<ConcretePath>,
    list: Option<ListContinuation>,
    pinned: BTreeMap<(EndptId, ClusterId), DataVersion>,
    chunk_entries: usize,
    chunk_paths: Vec<ConcretePath>,
    chunks: usize,
}

impl ReportPacker {
    /// A report answering a read request.
    pub fn read(
        paths: Vec<GenericPath>,
        dataver_filters: Vec<DataVersionFilter>,
        config: ReportConfig,
    ) -> Self {
        Self::new(paths, dataver_filters, None, None, config)
    }

    /// The priming report of a subscription: every requested path is reported.
    pub fn priming(
        id: SubscriptionId,
        paths: Vec<GenericPath>,
        dataver_filters: Vec<DataVersionFilter>,
        config: ReportConfig,
    ) -> Self {
        Self::new(paths, dataver_filters, Some(id), None, config)
    }

    /// A steady-state report of a subscription: only the requested paths
    /// covered by the `dirty` snapshot are reported.
    pub fn steady(
        id: SubscriptionId,
        paths: Vec<GenericPath>,
        dirty: Vec<DirtyEntry>,
        config: ReportConfig,
    ) -> Self {
        Self::new(paths, Vec::new(), Some(id), Some(dirty), config)
    }

    fn new(
        paths: Vec<GenericPath>,
        dataver_filters: Vec<DataVersionFilter>,
        subscription_id: Option<SubscriptionId>,
        dirty: Option<Vec<DirtyEntry>>,
        config: ReportConfig,
    ) -> Self {
        Self {
            paths,
            dataver_filters,
            subscription_id,
            dirty,
            config,
            path_index: 0,
            after: None,
            list: None,
            pinned: BTreeMap::new(),
            chunk_entries: 0,
            chunk_paths: Vec::new(),
            chunks: 0,
        }
    }

    /// Reads are not acknowledged after their last chunk; subscription reports are.
    pub fn suppress_response(&self) -> bool {
        self.subscription_id.is_none()
    }

    /// The number of chunks generated so far.
    pub fn chunks(&self) -> usize {
        self.chunks
    }

    /// Generate the next chunk into `wb`, which should be at least
    /// `ReportConfig::max_payload` bytes long.
    ///
    /// Return `true` if more chunks are to follow.
    pub fn fill_chunk<S>(&mut self, store: &S, wb: &mut WriteBuf<'_>) -> Result<bool, Error>
    where
        S: AttrStore,
    {
        self.start_chunk(wb).map_err(|e| {
            e.remap(
                |e| e.code() == ErrorCode::NoSpace,
                ErrorCode::ResourceExhausted.into(),
            )
        })?;

        let more = self.pack(store, wb)?;

        self.end_chunk(more, wb)?;

        Ok(more)
    }

    /// The dirty entries reported by the last chunk, now that it was confirmed.
    ///
    /// The last chunk of a report confirms all remaining entries of the snapshot,
    /// including those which did not expand to any reported path.
    pub fn confirmed(&mut self, last: bool) -> Vec<DirtyEntry> {
        let paths = core::mem::take(&mut self.chunk_paths);

        let Some(dirty) = &self.dirty else {
            return Vec::new();
        };

        if last {
            dirty.clone()
        } else {
            dirty
                .iter()
                .filter(|entry| {
                    entry
                        .path
                        .not_wildcard()
                        .map(|path| paths.contains(&path))
                        .unwrap_or(false)
                })
                .cloned()
                .collect()
        }
    }

    /// Send the whole report over `exchange`, chunk by chunk.
    ///
    /// Every chunk but the last one - and the last one too, unless the response is
    /// suppressed - needs a `StatusResponse` with a success status from the peer
    /// before continuing. `on_confirmed` is called with the dirty entries reported
    /// by each chunk once the chunk is confirmed.
    ///
    /// Return `Ok(false)` if the peer aborted the interaction.
    pub async fn respond<S, X, F>(
        &mut self,
        store: &S,
        exchange: &mut X,
        mut on_confirmed: F,
    ) -> Result<bool, Error>
    where
        S: AttrStore,
        X: Exchange,
        F: FnMut(&[DirtyEntry]),
    {
        let mut tx = vec![0; self.config.max_payload];

        loop {
            let mut wb = WriteBuf::new(&mut tx);

            let more = self.fill_chunk(store, &mut wb)?;

            exchange
                .send(OpCode::ReportData.meta(), wb.as_slice())
                .await?;

            if (more || !self.suppress_response())
                && !recv_status_success(exchange, self.config.status_timeout).await?
            {
                return Ok(false);
            }

            on_confirmed(self.confirmed(!more).as_slice());

            if !more {
                return Ok(true);
            }
        }
    }

    fn start_chunk(&mut self, wb: &mut WriteBuf<'_>) -> Result<(), Error> {
        self.chunk_entries = 0;
        self.chunk_paths.clear();

        wb.reset();
        wb.shrink(self.config.reserve + LONG_READS_TLV_RESERVE_SIZE)?;

        wb.start_struct(&TLVTag::Anonymous)?;

        if let Some(subscription_id) = self.subscription_id {
            wb.u32(
                &TLVTag::Context(ReportDataTag::SubscriptionId as _),
                subscription_id,
            )?;
        }

        wb.start_array(&TLVTag::Context(ReportDataTag::AttributeReports as _))
    }

    fn end_chunk(&mut self, more: bool, wb: &mut WriteBuf<'_>) -> Result<(), Error> {
        wb.expand(LONG_READS_TLV_RESERVE_SIZE)?;

        wb.end_container()?;

        if more {
            wb.bool(&TLVTag::Context(ReportDataTag::MoreChunkedMsgs as _), true)?;
        }

        if !more && self.suppress_response() {
            wb.bool(&TLVTag::Context(ReportDataTag::SupressResponse as _), true)?;
        }

        wb.u8(&TLVTag::Context(IM_REVISION_TAG), IM_REVISION)?;

        wb.end_container()?;

        self.chunks += 1;

        Ok(())
    }

    fn pack<S>(&mut self, store: &S, wb: &mut WriteBuf<'_>) -> Result<bool, Error>
    where
        S: AttrStore,
    {
        loop {
            if let Some(list) = self.list.take() {
                if !self.append_list_item(list, wb)? {
                    debug!("<<< No TX space, chunking >>>");
                    return Ok(true);
                }

                continue;
            }

            let Some(item) = self.peek(store) else {
                return Ok(false);
            };

            if self.chunk_full() {
                return Ok(true);
            }

            let (path, quality) = match &item {
                Expanded::Attr(path, quality) => (*path, *quality),
                Expanded::Status(_, _) if self.dirty.is_some() => {
                    self.advance(&item);
                    continue;
                }
                Expanded::Status(path, status) => {
                    if !self.write_status(wb, path, *status)? {
                        debug!("<<< No TX space, chunking >>>");
                        return Ok(true);
                    }

                    self.advance(&item);
                    continue;
                }
            };

            if !self.is_dirty(&path) {
                self.advance(&item);
                continue;
            }

            let dataver = match self.pinned_dataver(store, &path) {
                Ok(dataver) => dataver,
                Err(e) => {
                    if !self.read_failed(wb, &path, e)? {
                        return Ok(true);
                    }

                    self.advance(&item);
                    continue;
                }
            };

            if self.dirty.is_none()
                && self
                    .dataver_filters
                    .iter()
                    .any(|filter| filter.matches(path.endpoint, path.cluster, dataver))
            {
                debug!("Attribute {} skipped: data version filter matched", path);

                self.advance(&item);
                continue;
            }

            let value = match store.read(&path) {
                Ok((value, _)) => value,
                Err(e) => {
                    if !self.read_failed(wb, &path, e)? {
                        return Ok(true);
                    }

                    self.advance(&item);
                    continue;
                }
            };

            let pos = wb.get_tail();

            match write_data(wb, &AttrPath::concrete(&path), dataver, &value) {
                Ok(()) => {
                    self.advance(&item);
                    self.entry_packed(path);
                }
                Err(e) if e.code() == ErrorCode::NoSpace => {
                    wb.rewind_tail_to(pos);

                    if self.chunk_entries > 0 {
                        debug!("<<< No TX space, chunking >>>");
                        return Ok(true);
                    }

                    if let AttrValue::List(items) = value {
                        if quality.contains(Quality::ARRAY) && !items.is_empty() {
                            let written = write_list_prefix(wb, &path, dataver, &items)?;

                            if written > 0 {
                                self.advance(&item);
                                self.chunk_entries += 1;
                                self.list = Some(ListContinuation {
                                    path,
                                    dataver,
                                    items,
                                    next: written,
                                });

                                continue;
                            }
                        }
                    }

                    warn!(
                        "Attribute {} does not fit in an empty chunk, reporting it as exhausted",
                        path
                    );

                    self.write_status(wb, &(&path).into(), IMStatusCode::ResourceExhausted)?;
                    self.advance(&item);
                }
                Err(e) => Err(e)?,
            }
        }
    }

    /// Append the next item of a list split across chunks.
    ///
    /// Return `false` if the item did not fit and the chunk should be closed.
    fn append_list_item(
        &mut self,
        mut list: ListContinuation,
        wb: &mut WriteBuf<'_>,
    ) -> Result<bool, Error> {
        let Some(item) = list.items.get(list.next) else {
            self.chunk_paths.push(list.path);
            return Ok(true);
        };

        if self.chunk_full() {
            self.list = Some(list);
            return Ok(false);
        }

        let pos = wb.get_tail();

        match write_data(wb, &AttrPath::list_append(&list.path), list.dataver, item) {
            Ok(()) => {
                list.next += 1;
                self.chunk_entries += 1;
                self.list = Some(list);

                Ok(true)
            }
            Err(e) if e.code() == ErrorCode::NoSpace => {
                wb.rewind_tail_to(pos);

                if self.chunk_entries > 0 {
                    self.list = Some(list);
                    return Ok(false);
                }

                warn!(
                    "Item {} of list attribute {} does not fit in an empty chunk, reporting it as exhausted",
                    list.next, list.path
                );

                self.write_status(wb, &(&list.path).into(), IMStatusCode::ResourceExhausted)
            }
            Err(e) => Err(e),
        }
    }

    /// Report a failed read of a concrete attribute.
    ///
    /// Failures of paths expanded from a wildcard are not reported.
    fn read_failed(
        &mut self,
        wb: &mut WriteBuf<'_>,
        path: &ConcretePath,
        err: Error,
    ) -> Result<bool, Error> {
        if self.paths[self.path_index].is_wildcard() {
            debug!("Attribute {} skipped: {:?}", path, err);
            return Ok(true);
        }

        let written = self.write_status(wb, &path.into(), err.code().into())?;
        if !written {
            debug!("<<< No TX space, chunking >>>");
        }

        Ok(written)
    }

    /// Write a status entry.
    ///
    /// Return `false` if the entry did not fit and the chunk should be closed.
    fn write_status(
        &mut self,
        wb: &mut WriteBuf<'_>,
        path: &GenericPath,
        status: IMStatusCode,
    ) -> Result<bool, Error> {
        let pos = wb.get_tail();

        match write_status(wb, path, status) {
            Ok(()) => {
                self.chunk_entries += 1;
                if let Ok(path) = path.not_wildcard() {
                    self.chunk_paths.push(path);
                }

                Ok(true)
            }
            Err(e) if e.code() == ErrorCode::NoSpace => {
                wb.rewind_tail_to(pos);

                if self.chunk_entries > 0 {
                    Ok(false)
                } else {
                    Err(ErrorCode::ResourceExhausted.into())
                }
            }
            Err(e) => Err(e),
        }
    }

    fn peek<S>(&mut self, store: &S) -> Option<Expanded>
    where
        S: AttrStore,
    {
        while let Some(requested) = self.paths.get(self.path_index) {
            let item = store.with_node(|node| path::next(node, requested, self.after.as_ref()));
            if item.is_some() {
                return item;
            }

            self.path_index += 1;
            self.after = None;
        }

        None
    }

    fn advance(&mut self, item: &Expanded) {
        match item {
            Expanded::Attr(path, _) => self.after = Some(*path),
            Expanded::Status(..) => {
                self.path_index += 1;
                self.after = None;
            }
        }
    }

    fn entry_packed(&mut self, path: ConcretePath) {
        self.chunk_entries += 1;
        self.chunk_paths.push(path);
    }

    fn chunk_full(&self) -> bool {
        self.chunk_entries > 0
            && self
                .config
                .max_attrs_per_chunk
                .map(|max| self.chunk_entries >= max)
                .unwrap_or(false)
    }

    fn is_dirty(&self, path: &ConcretePath) -> bool {
        self.dirty
            .as_ref()
            .map(|dirty| dirty.iter().any(|entry| entry.covers(path)))
            .unwrap_or(true)
    }

    fn pinned_dataver<S>(&mut self, store: &S, path: &ConcretePath) -> Result<DataVersion, Error>
    where
        S: AttrStore,
    {
        let key = (path.endpoint, path.cluster);

        if let Some(dataver) = self.pinned.get(&key) {
            return Ok(*dataver);
        }

        let dataver = store.dataver(path.endpoint, path.cluster)?;
        self.pinned.insert(key, dataver);

        Ok(dataver)
    }
}

fn write_data(
    wb: &mut WriteBuf<'_>,
    path: &AttrPath,
    dataver: DataVersion,
    value: &AttrValue,
) -> Result<(), Error> {
    start_data(wb, path, dataver)?;
    value.to_tlv(&TLVTag::Context(AttrDataTag::Data as _), &mut *wb)?;
    wb.end_container()?;
    wb.end_container()
}

fn start_data(wb: &mut WriteBuf<'_>, path: &AttrPath, dataver: DataVersion) -> Result<(), Error> {
    wb.start_struct(&TLVTag::Anonymous)?;
    wb.start_struct(&TLVTag::Context(AttrRespTag::Data as _))?;
    wb.u32(&TLVTag::Context(AttrDataTag::DataVer as _), dataver)?;
    path.to_tlv(&TLVTag::Context(AttrDataTag::Path as _), &mut *wb)
}

/// Write a "replace" entry with as many leading items of `items` as fit.
///
/// Return the number of items written; nothing is written if not even the first one fits.
fn write_list_prefix(
    wb: &mut WriteBuf<'_>,
    path: &ConcretePath,
    dataver: DataVersion,
    items: &[AttrValue],
) -> Result<usize, Error> {
    let pos = wb.get_tail();

    if wb.shrink(LIST_DATA_CLOSERS_SIZE).is_err() {
        return Ok(0);
    }

    let mut written = 0;

    let header = start_data(wb, &AttrPath::concrete(path), dataver)
        .and_then(|_| wb.start_array(&TLVTag::Context(AttrDataTag::Data as _)));

    if header.is_ok() {
        for item in items {
            let item_pos = wb.get_tail();

            if let Err(e) = item.to_tlv(&TLVTag::Anonymous, &mut *wb) {
                wb.rewind_tail_to(item_pos);

                if e.code() != ErrorCode::NoSpace {
                    wb.expand(LIST_DATA_CLOSERS_SIZE)?;
                    return Err(e);
                }

                break;
            }

            written += 1;
        }
    }

    wb.expand(LIST_DATA_CLOSERS_SIZE)?;

    match header {
        Err(e) if e.code() != ErrorCode::NoSpace => return Err(e),
        _ => (),
    }

    if written == 0 {
        wb.rewind_tail_to(pos);
        return Ok(0);
    }

    debug!(
        "List attribute {} split: {} of {} items in the first chunk",
        path,
        written,
        items.len()
    );

    wb.end_container()?;
    wb.end_container()?;
    wb.end_container()?;

    Ok(written)
}

fn write_status(
    wb: &mut WriteBuf<'_>,
    path: &GenericPath,
    status: IMStatusCode,
) -> Result<(), Error> {
    wb.start_struct(&TLVTag::Anonymous)?;
    AttrStatus::new(path, status, None)
        .to_tlv(&TLVTag::Context(AttrRespTag::Status as _), &mut *wb)?;
    wb.end_container()
}

/// Receive a status response from the peer.
///
/// If the response is not a status response, the method will fail with an `InvalidOpcode` error.
///
/// Return `Ok(true)` if the response is a success response, `Ok(false)` if it is not.
/// Fail with a `Timeout` error if no response arrives within `timeout`.
pub(crate) async fn recv_status_success<X>(
    exchange: &mut X,
    timeout: Duration,
) -> Result<bool, Error>
where
    X: Exchange,
{
    let rx = match select(exchange.recv(), Timer::after(timeout)).await {
        Either::First(rx) => rx?,
        Either::Second(_) => {
            warn!(
                "No status response within {}ms, aborting interaction",
                timeout.as_millis()
            );

            Err(ErrorCode::Timeout)?
        }
    };
    let meta = rx.meta();

    if meta.proto_id != PROTO_ID_INTERACTION_MODEL
        || meta.proto_opcode != OpCode::StatusResponse as u8
    {
        warn!(
            "Got opcode {:02x}, while expecting status code {:02x}",
            meta.proto_opcode,
            OpCode::StatusResponse as u8
        );

        return Err(ErrorCode::InvalidOpcode.into());
    }

    let resp = StatusResp::parse(rx.payload())?;

    if resp.status == IMStatusCode::Success {
        Ok(true)
    } else {
        warn!(
            "Got status response {:?}, aborting interaction",
            resp.status
        );

        Ok(false)
    }
}
