//! Historical and live event delivery.
//!
//! Both paths yield [`EventRecord`]s decoded against the descriptor's event
//! schema. A log that cannot be decoded ends the sequence: history returns
//! the error once and then stops, a live subscription moves to
//! [`SubscriptionStatus::Failed`].

use crate::{
    connection::{Connection, LogStream},
    error::{ContractError, Result},
    types::{EventField, EventRecord},
};
use alloy_dyn_abi::{DynSolType, DynSolValue, Specifier};
use alloy_json_abi::Event;
use alloy_primitives::{keccak256, Address, B256};
use alloy_rpc_types_eth::{Filter, Log, Topic};
use futures::{Stream, StreamExt};
use parking_lot::Mutex;
use std::{collections::VecDeque, sync::Arc};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Build the log filter for `event` emitted by `address`, constraining each
/// indexed parameter to the accepted values in `indexed`.
pub(crate) fn build_filter(
    event: &Event,
    address: Address,
    indexed: &[Vec<DynSolValue>],
) -> Result<Filter> {
    let indexed_params: Vec<_> = event.inputs.iter().filter(|p| p.indexed).collect();
    if indexed.len() > indexed_params.len() {
        return Err(ContractError::Encoding(format!(
            "Event `{}` has {} indexed fields, got {} filter groups",
            event.name,
            indexed_params.len(),
            indexed.len()
        )));
    }

    let mut filter = Filter::new().address(address);
    let offset = if event.anonymous {
        0
    } else {
        filter = filter.event_signature(event.selector());
        1
    };

    for (position, (param, accepted)) in indexed_params.iter().zip(indexed).enumerate() {
        if accepted.is_empty() {
            continue;
        }
        let ty: DynSolType = param
            .resolve()
            .map_err(|e| ContractError::Encoding(format!("Field `{}`: {e}", param.name)))?;

        let topics = accepted
            .iter()
            .map(|value| {
                if !ty.matches(value) {
                    return Err(ContractError::Encoding(format!(
                        "Filter value for `{}` does not match type `{}`",
                        param.name, param.ty
                    )));
                }
                topic_for(value)
            })
            .collect::<Result<Vec<B256>>>()?;

        let slot = filter.topics.get_mut(offset + position).ok_or_else(|| {
            ContractError::Encoding(format!(
                "Field `{}` of `{}` does not fit in the log topics",
                param.name, event.name
            ))
        })?;
        *slot = Topic::from(topics);
    }

    Ok(filter)
}

fn topic_for(value: &DynSolValue) -> Result<B256> {
    match value {
        DynSolValue::String(s) => Ok(keccak256(s.as_bytes())),
        DynSolValue::Bytes(b) => Ok(keccak256(b)),
        other => other.as_word().ok_or_else(|| {
            ContractError::Encoding("Arrays and tuples cannot be used as indexed filters".to_string())
        }),
    }
}

/// Indexed reference types are stored on chain as a hash of their encoding.
const fn hashed_when_indexed(ty: &DynSolType) -> bool {
    matches!(
        ty,
        DynSolType::String
            | DynSolType::Bytes
            | DynSolType::Array(_)
            | DynSolType::FixedArray(_, _)
            | DynSolType::Tuple(_)
    )
}

pub(crate) fn decode_log(event: &Event, log: &Log) -> Result<EventRecord> {
    let topics = log.inner.data.topics();
    let data = &log.inner.data.data;

    let offset = if event.anonymous {
        0
    } else {
        match topics.first() {
            Some(topic0) if *topic0 == event.selector() => 1,
            _ => {
                return Err(ContractError::Decoding(format!(
                    "Log is not a `{}` event",
                    event.name
                )))
            }
        }
    };

    let indexed_count = event.inputs.iter().filter(|p| p.indexed).count();
    if topics.len() != offset + indexed_count {
        return Err(ContractError::Decoding(format!(
            "`{}` expects {} topics, log has {}",
            event.name,
            offset + indexed_count,
            topics.len()
        )));
    }

    let mut types = Vec::with_capacity(event.inputs.len());
    for param in &event.inputs {
        let ty: DynSolType = param
            .resolve()
            .map_err(|e| ContractError::Decoding(format!("Field `{}`: {e}", param.name)))?;
        types.push(ty);
    }

    let body_types: Vec<DynSolType> = event
        .inputs
        .iter()
        .zip(&types)
        .filter(|(param, _)| !param.indexed)
        .map(|(_, ty)| ty.clone())
        .collect();
    let mut body = match DynSolType::Tuple(body_types).abi_decode_sequence(data) {
        Ok(DynSolValue::Tuple(values)) => values.into_iter(),
        Ok(other) => {
            return Err(ContractError::Decoding(format!(
                "`{}` data decoded to {other:?}",
                event.name
            )))
        }
        Err(e) => {
            return Err(ContractError::Decoding(format!(
                "`{}` data: {e}",
                event.name
            )))
        }
    };

    let mut indexed_topics = topics[offset..].iter();
    let mut fields = Vec::with_capacity(event.inputs.len());
    for (param, ty) in event.inputs.iter().zip(&types) {
        let value = if param.indexed {
            let topic = indexed_topics
                .next()
                .ok_or_else(|| ContractError::Decoding("Missing topic".to_string()))?;
            if hashed_when_indexed(ty) {
                DynSolValue::FixedBytes(*topic, 32)
            } else {
                ty.abi_decode(topic.as_slice()).map_err(|e| {
                    ContractError::Decoding(format!("`{}` topic `{}`: {e}", event.name, param.name))
                })?
            }
        } else {
            body.next()
                .ok_or_else(|| ContractError::Decoding("Missing data field".to_string()))?
        };
        fields.push(EventField {
            name: param.name.clone(),
            indexed: param.indexed,
            value,
        });
    }

    Ok(EventRecord {
        event_name: event.name.clone(),
        fields,
        address: log.inner.address,
        block_number: log.block_number,
        block_hash: log.block_hash,
        transaction_hash: log.transaction_hash,
        log_index: log.log_index,
        removed: log.removed,
    })
}

/// Lazy, finite sequence of historical events.
///
/// The block range is fetched in windows of at most `page_size` blocks; a
/// window is only requested once the previous one has been consumed.
pub struct EventHistory {
    connection: Arc<dyn Connection>,
    event: Event,
    filter: Filter,
    next_from: u64,
    to: Option<u64>,
    page_size: u64,
    buffered: VecDeque<Log>,
    exhausted: bool,
}

impl std::fmt::Debug for EventHistory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventHistory")
            .field("event", &self.event.name)
            .field("next_from", &self.next_from)
            .field("to", &self.to)
            .field("page_size", &self.page_size)
            .field("buffered", &self.buffered.len())
            .field("exhausted", &self.exhausted)
            .finish_non_exhaustive()
    }
}

impl EventHistory {
    pub(crate) fn new(
        connection: Arc<dyn Connection>,
        event: Event,
        filter: Filter,
        from: u64,
        to: Option<u64>,
        page_size: u64,
    ) -> Self {
        Self {
            connection,
            event,
            filter,
            next_from: from,
            to,
            page_size: page_size.max(1),
            buffered: VecDeque::new(),
            exhausted: false,
        }
    }

    /// `None` once the range is exhausted or after an error was returned.
    pub async fn next(&mut self) -> Option<Result<EventRecord>> {
        loop {
            if let Some(log) = self.buffered.pop_front() {
                let decoded = decode_log(&self.event, &log);
                if decoded.is_err() {
                    self.abort();
                }
                return Some(decoded);
            }
            if self.exhausted {
                return None;
            }
            if let Err(e) = self.fetch_page().await {
                self.abort();
                return Some(Err(e));
            }
        }
    }

    /// Drain the whole sequence, stopping at the first error.
    pub async fn collect(mut self) -> Result<Vec<EventRecord>> {
        let mut records = Vec::new();
        while let Some(record) = self.next().await {
            records.push(record?);
        }
        Ok(records)
    }

    pub fn into_stream(self) -> impl Stream<Item = Result<EventRecord>> + Send {
        futures::stream::unfold(self, |mut history| async move {
            history.next().await.map(|item| (item, history))
        })
    }

    async fn fetch_page(&mut self) -> Result<()> {
        let to = match self.to {
            Some(to) => to,
            None => {
                let latest = self.connection.block_number().await?;
                self.to = Some(latest);
                latest
            }
        };

        if self.next_from > to {
            self.exhausted = true;
            return Ok(());
        }

        let page_end = to.min(self.next_from.saturating_add(self.page_size - 1));
        let filter = self
            .filter
            .clone()
            .from_block(self.next_from)
            .to_block(page_end);

        let logs = self.connection.get_logs(&filter).await?;
        debug!(
            "Fetched {} `{}` logs from blocks {}..={}",
            logs.len(),
            self.event.name,
            self.next_from,
            page_end
        );
        self.buffered.extend(logs);

        match page_end.checked_add(1) {
            Some(next) => self.next_from = next,
            None => self.exhausted = true,
        }
        Ok(())
    }

    fn abort(&mut self) {
        self.buffered.clear();
        self.exhausted = true;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionStatus {
    Active,
    /// Terminal; the cause is available from [`EventSubscription::error`].
    Failed,
    /// Terminal; cancelled by the caller.
    Closed,
}

struct SubscriptionState {
    inner: Mutex<(SubscriptionStatus, Option<Arc<ContractError>>)>,
    cancelled: watch::Sender<bool>,
}

impl SubscriptionState {
    fn new() -> Self {
        let (cancelled, _) = watch::channel(false);
        Self {
            inner: Mutex::new((SubscriptionStatus::Active, None)),
            cancelled,
        }
    }

    fn status(&self) -> SubscriptionStatus {
        self.inner.lock().0
    }

    fn close(&self) {
        {
            let mut inner = self.inner.lock();
            if inner.0 == SubscriptionStatus::Active {
                inner.0 = SubscriptionStatus::Closed;
            }
        }
        self.cancelled.send_replace(true);
    }

    fn fail(&self, err: ContractError) {
        let mut inner = self.inner.lock();
        if inner.0 == SubscriptionStatus::Active {
            warn!("Event subscription failed: {err}");
            *inner = (SubscriptionStatus::Failed, Some(Arc::new(err)));
        }
    }
}

async fn wait_cancelled(cancelled: &mut watch::Receiver<bool>) {
    let _ = cancelled.wait_for(|cancelled| *cancelled).await;
}

/// Cancels a subscription from any thread. Cancelling twice is a no-op.
#[derive(Clone)]
pub struct CancelHandle {
    state: Arc<SubscriptionState>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.state.close();
    }
}

/// Live feed of decoded events.
///
/// A background task reads the connection's log stream and pushes decoded
/// records into a bounded channel; when the consumer falls behind the task
/// waits for capacity instead of dropping records.
pub struct EventSubscription {
    receiver: mpsc::Receiver<EventRecord>,
    state: Arc<SubscriptionState>,
}

impl EventSubscription {
    pub(crate) fn spawn(logs: LogStream, event: Event, capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let state = Arc::new(SubscriptionState::new());

        info!("Watching `{}` events", event.name);
        tokio::spawn(pump(logs, event, sender, Arc::clone(&state)));

        Self { receiver, state }
    }

    /// Next record, or `None` once the subscription is closed or failed and
    /// everything already delivered has been drained.
    pub async fn next(&mut self) -> Option<EventRecord> {
        let mut cancelled = self.state.cancelled.subscribe();
        tokio::select! {
            biased;
            () = wait_cancelled(&mut cancelled) => None,
            record = self.receiver.recv() => record,
        }
    }

    pub fn status(&self) -> SubscriptionStatus {
        self.state.status()
    }

    pub fn error(&self) -> Option<Arc<ContractError>> {
        self.state.inner.lock().1.clone()
    }

    pub fn cancel(&self) {
        self.state.close();
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            state: Arc::clone(&self.state),
        }
    }

    pub fn into_stream(self) -> impl Stream<Item = EventRecord> + Send {
        futures::stream::unfold(self, |mut subscription| async move {
            subscription
                .next()
                .await
                .map(|record| (record, subscription))
        })
    }
}

impl Drop for EventSubscription {
    fn drop(&mut self) {
        self.state.close();
    }
}

async fn pump(
    mut logs: LogStream,
    event: Event,
    sender: mpsc::Sender<EventRecord>,
    state: Arc<SubscriptionState>,
) {
    let mut cancelled = state.cancelled.subscribe();

    loop {
        let next = tokio::select! {
            biased;
            () = wait_cancelled(&mut cancelled) => break,
            next = logs.next() => next,
        };

        let log = match next {
            Some(Ok(log)) => log,
            Some(Err(e)) => {
                state.fail(e);
                break;
            }
            None => {
                state.fail(ContractError::transport("Log subscription ended upstream"));
                break;
            }
        };

        let record = match decode_log(&event, &log) {
            Ok(record) => record,
            Err(e) => {
                state.fail(e);
                break;
            }
        };

        tokio::select! {
            biased;
            () = wait_cancelled(&mut cancelled) => break,
            sent = sender.send(record) => {
                if sent.is_err() {
                    break;
                }
            }
        }
    }

    debug!("Stopped watching `{}` events", event.name);
}
