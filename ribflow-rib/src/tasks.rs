//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::time::Duration;

use ribflow_utils::UnboundedSender;
use ribflow_utils::task::{Task, TimeoutTask};
use tokio::sync::oneshot;
use tracing::error;

use crate::error::OutputError;
use crate::output::{OutputEvent, RedistEventSender};
use crate::redist::RedistributorId;
use crate::table::TableId;

//
// RIB tasks diagram:
//
//                              +--------------+
//      routing protocols  ---> |              |
//                              |              |
//       deletion_pass (Nx) --> |              |
//      redist_dump_step (Nx) > |     rib      | -> (Nx) redist requests
// redist_request_reply (Nx) -> |              |
//   redist_retry_timer (Nx) -> |              | -> (1x) policy redist
//                              +--------------+
//
// Background work never runs outside the main RIB task. Timers and request
// replies only post messages that the RIB processes in order.
//

// RIB inter-task message types.
pub mod messages {
    use super::*;

    // Type aliases.
    pub type RibMsg = input::RibMsg;

    // Input messages (child task -> main task).
    pub mod input {
        use super::*;

        #[derive(Debug)]
        pub enum RibMsg {
            DeletionPass(DeletionPassMsg),
            RedistDumpStep(RedistDumpStepMsg),
            RedistOutputEvent(RedistOutputEventMsg),
        }

        #[derive(Debug)]
        pub struct DeletionPassMsg {
            pub table_id: TableId,
        }

        #[derive(Debug)]
        pub struct RedistDumpStepMsg {
            pub redist_id: RedistributorId,
            pub seqno: u64,
        }

        #[derive(Debug)]
        pub struct RedistOutputEventMsg {
            pub redist_id: RedistributorId,
            pub event: OutputEvent,
        }
    }
}

use messages::RibMsg;
use messages::input::{DeletionPassMsg, RedistDumpStepMsg};

// ===== RIB tasks =====

// Schedules one background deletion pass on the given deletion table.
pub(crate) fn deletion_pass(
    table_id: TableId,
    msg_tx: &UnboundedSender<RibMsg>,
) {
    let msg = RibMsg::DeletionPass(DeletionPassMsg { table_id });
    if msg_tx.send(msg).is_err() {
        error!("failed to schedule deletion pass");
    }
}

// Schedules one route dump step of the given redistributor.
pub(crate) fn redist_dump_step(
    redist_id: RedistributorId,
    seqno: u64,
    msg_tx: &UnboundedSender<RibMsg>,
) {
    let msg = RibMsg::RedistDumpStep(RedistDumpStepMsg { redist_id, seqno });
    if msg_tx.send(msg).is_err() {
        error!("failed to schedule route dump step");
    }
}

// Waits for the reply to a redistribution request.
pub(crate) fn redist_request_reply(
    reply_rx: oneshot::Receiver<Result<(), OutputError>>,
    events: RedistEventSender,
) {
    let mut task = Task::spawn(async move {
        let result = reply_rx.await.unwrap_or(Err(OutputError::ChannelClosed));
        events.send(OutputEvent::RequestDone(result));
    });
    task.detach();
}

// Retries dispatching queued redistribution requests after a pause.
pub(crate) fn redist_retry_timer(
    pause: Duration,
    events: RedistEventSender,
) -> TimeoutTask {
    TimeoutTask::new(pause, move || async move {
        events.send(OutputEvent::Retry);
    })
}
