//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::VecDeque;
use std::time::Duration;

use derive_new::new;
use ribflow_utils::ip::IpNetworkKind;
use ribflow_utils::task::TimeoutTask;
use ribflow_utils::{Responder, Sender, UnboundedSender};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::oneshot;
use tracing::error;

use crate::config::RedistOutputCfg;
use crate::error::OutputError;
use crate::redist::RedistributorId;
use crate::route::RouteEntry;
use crate::tasks;
use crate::tasks::messages::RibMsg;
use crate::tasks::messages::input::RedistOutputEventMsg;
use crate::version::Version;

// Consumer of the route events relayed by a redistributor.
pub trait RedistOutput<V: Version>: Send {
    fn add_route(&mut self, route: &RouteEntry<V>);

    fn delete_route(&mut self, route: &RouteEntry<V>);

    fn starting_route_dump(&mut self);

    fn finishing_route_dump(&mut self);

    // Processes feedback addressed to the output itself (request
    // completions and retry timers).
    fn process_event(&mut self, _event: OutputEvent) {}
}

// Events an output posts back to the RIB.
#[derive(Debug)]
pub enum OutputEvent {
    HighWater,
    LowWater,
    FatalError(OutputError),
    RequestDone(Result<(), OutputError>),
    Retry,
}

// Handle used by an output to signal its redistributor.
#[derive(Clone, Debug, new)]
pub struct RedistEventSender {
    redist_id: RedistributorId,
    msg_tx: UnboundedSender<RibMsg>,
}

// Redistribution request operation.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RedistOp<V: Version> {
    AddRoute(RouteEntry<V>),
    DeleteRoute(RouteEntry<V>),
    StartingRouteDump,
    FinishingRouteDump,
}

// Redistribution request sent to a target.
#[derive(Debug)]
pub struct RedistRequest<V: Version> {
    pub target: String,
    pub cookie: String,
    pub op: RedistOp<V>,
    pub responder: Responder<Result<(), OutputError>>,
}

// Output that turns route events into requests queued towards a target
// over a bounded channel, tracking the number of outstanding requests to
// drive flow control.
pub struct RedistQueueOutput<V: Version> {
    target: String,
    cookie: String,
    network_prefix: V::IpNetwork,
    config: RedistOutputCfg,
    events: RedistEventSender,
    request_tx: Sender<RedistRequest<V>>,
    queue: VecDeque<RedistOp<V>>,
    inflight: usize,
    flow_controlled: bool,
    retry_timer: Option<TimeoutTask>,
}

// ===== impl RedistEventSender =====

impl RedistEventSender {
    pub fn announce_high_water(&self) {
        self.send(OutputEvent::HighWater);
    }

    pub fn announce_low_water(&self) {
        self.send(OutputEvent::LowWater);
    }

    pub fn announce_fatal_error(&self, error: OutputError) {
        self.send(OutputEvent::FatalError(error));
    }

    pub fn send(&self, event: OutputEvent) {
        let msg = RibMsg::RedistOutputEvent(RedistOutputEventMsg {
            redist_id: self.redist_id,
            event,
        });
        if self.msg_tx.send(msg).is_err() {
            error!("failed to post redistribution output event");
        }
    }
}

// ===== impl RedistQueueOutput =====

impl<V> RedistQueueOutput<V>
where
    V: Version,
{
    pub fn new(
        target: String,
        cookie: String,
        network_prefix: V::IpNetwork,
        config: RedistOutputCfg,
        events: RedistEventSender,
        request_tx: Sender<RedistRequest<V>>,
    ) -> RedistQueueOutput<V> {
        RedistQueueOutput {
            target,
            cookie,
            network_prefix: network_prefix.apply_mask(),
            config,
            events,
            request_tx,
            queue: Default::default(),
            inflight: 0,
            flow_controlled: false,
            retry_timer: None,
        }
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn inflight(&self) -> usize {
        self.inflight
    }

    fn outstanding(&self) -> usize {
        self.queue.len() + self.inflight
    }

    // Only routes within the configured network prefix are redistributed.
    fn accepts(&self, route: &RouteEntry<V>) -> bool {
        self.network_prefix.prefix() <= route.net.prefix()
            && IpNetworkKind::contains(&self.network_prefix, route.net.ip())
    }

    fn enqueue(&mut self, op: RedistOp<V>) {
        self.queue.push_back(op);
        self.start_next();

        if !self.flow_controlled && self.outstanding() >= self.config.hi_water
        {
            self.flow_controlled = true;
            self.events.announce_high_water();
        }
    }

    fn start_next(&mut self) {
        // Wait for the retry timer when the target is congested.
        if self.retry_timer.is_some() {
            return;
        }

        while let Some(op) = self.queue.front() {
            let (reply_tx, reply_rx) = oneshot::channel();
            let request = RedistRequest {
                target: self.target.clone(),
                cookie: self.cookie.clone(),
                op: op.clone(),
                responder: reply_tx,
            };
            match self.request_tx.try_send(request) {
                Ok(()) => {
                    self.queue.pop_front();
                    self.inflight += 1;
                    tasks::redist_request_reply(reply_rx, self.events.clone());
                }
                Err(TrySendError::Full(_)) => {
                    let pause =
                        Duration::from_millis(self.config.retry_pause_ms);
                    self.retry_timer = Some(tasks::redist_retry_timer(
                        pause,
                        self.events.clone(),
                    ));
                    break;
                }
                Err(TrySendError::Closed(_)) => {
                    self.queue.clear();
                    let error = OutputError::ChannelClosed;
                    self.events.announce_fatal_error(error);
                    break;
                }
            }
        }
    }

    fn request_done(&mut self, result: Result<(), OutputError>) {
        assert!(self.inflight > 0, "unexpected request completion");
        self.inflight -= 1;

        if let Err(error) = result {
            error.log(&self.cookie);
            if error.is_fatal() {
                self.queue.clear();
                self.events.announce_fatal_error(error);
                return;
            }
        }

        if self.flow_controlled && self.outstanding() <= self.config.lo_water {
            self.flow_controlled = false;
            self.events.announce_low_water();
        }
        self.start_next();
    }
}

impl<V> RedistOutput<V> for RedistQueueOutput<V>
where
    V: Version,
{
    fn add_route(&mut self, route: &RouteEntry<V>) {
        if self.accepts(route) {
            self.enqueue(RedistOp::AddRoute(route.clone()));
        }
    }

    fn delete_route(&mut self, route: &RouteEntry<V>) {
        if self.accepts(route) {
            self.enqueue(RedistOp::DeleteRoute(route.clone()));
        }
    }

    fn starting_route_dump(&mut self) {
        self.enqueue(RedistOp::StartingRouteDump);
    }

    fn finishing_route_dump(&mut self) {
        self.enqueue(RedistOp::FinishingRouteDump);
    }

    fn process_event(&mut self, event: OutputEvent) {
        match event {
            OutputEvent::RequestDone(result) => self.request_done(result),
            OutputEvent::Retry => {
                self.retry_timer = None;
                self.start_next();
            }
            _ => (),
        }
    }
}
