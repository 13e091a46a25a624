//! [`ProtocolHandler`] – validation and dispatch of control messages.
//!
//! Handling is split in two so the server can answer bad input immediately
//! and still run slow lid motions off the connection's read loop:
//!
//! 1. [`ProtocolHandler::parse`] is synchronous and side-effect free.  It
//!    turns a [`Frame`] into a fully validated [`Request`] or a protocol
//!    [`BotError`].
//! 2. [`ProtocolHandler::execute`] applies a validated request and builds
//!    the [`Reply`].  Only lid requests suspend.

use std::sync::Arc;

use tracing::{debug, error, warn};
use trashbot_hal::LidBank;
use trashbot_runtime::MotionScheduler;
use trashbot_types::{BotError, Direction, Frame, InboundMessage, LidId, Reply, events};

/// A validated control request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    TestConnection,
    Move(Direction),
    OpenLid(LidId),
    CloseLid(LidId),
}

impl Request {
    /// Lid requests hold for the configured motion time before replying.
    pub fn is_lid_motion(&self) -> bool {
        matches!(self, Request::OpenLid(_) | Request::CloseLid(_))
    }

    /// The wire event name this request came from.
    pub fn event(&self) -> &'static str {
        match self {
            Request::TestConnection => events::TEST_CONNECTION,
            Request::Move(_) => events::MOVE,
            Request::OpenLid(_) => events::OPEN_TRASHCAN,
            Request::CloseLid(_) => events::CLOSE_TRASHCAN,
        }
    }
}

/// Routes requests to the motion scheduler and the lid bank.
pub struct ProtocolHandler {
    scheduler: Arc<MotionScheduler>,
    lids: Arc<LidBank>,
}

impl ProtocolHandler {
    pub fn new(scheduler: Arc<MotionScheduler>, lids: Arc<LidBank>) -> Self {
        Self { scheduler, lids }
    }

    pub fn scheduler(&self) -> &Arc<MotionScheduler> {
        &self.scheduler
    }

    pub fn lids(&self) -> &Arc<LidBank> {
        &self.lids
    }

    /// Validate one inbound frame.
    ///
    /// # Errors
    ///
    /// | Condition | Error |
    /// |---|---|
    /// | binary frame | [`BotError::UnsupportedMessageType`] |
    /// | not JSON | [`BotError::InvalidFormat`] |
    /// | no `event` | [`BotError::MissingEvent`] |
    /// | unrecognised `event` | [`BotError::UnknownEvent`] |
    /// | `MOVE` without a valid `direction` | [`BotError::UnknownDirection`] |
    /// | lid event with a `lid` outside the configured set | [`BotError::InvalidLidId`] |
    pub fn parse(&self, frame: &Frame) -> Result<Request, BotError> {
        let text = match frame {
            Frame::Text(text) => text,
            Frame::Binary => return Err(BotError::UnsupportedMessageType),
        };
        let message = InboundMessage::parse(text)?;

        match message.event.as_str() {
            events::TEST_CONNECTION => Ok(Request::TestConnection),
            events::MOVE => message
                .direction
                .as_deref()
                .ok_or(BotError::UnknownDirection)?
                .parse()
                .map(Request::Move),
            events::OPEN_TRASHCAN => self.lid_id(&message).map(Request::OpenLid),
            events::CLOSE_TRASHCAN => self.lid_id(&message).map(Request::CloseLid),
            _ => Err(BotError::UnknownEvent),
        }
    }

    fn lid_id(&self, message: &InboundMessage) -> Result<LidId, BotError> {
        message
            .lid
            .as_ref()
            .and_then(LidId::from_json)
            .filter(|id| self.lids.contains(*id))
            .ok_or(BotError::InvalidLidId)
    }

    /// Apply a validated request and build its reply.
    pub async fn execute(&self, request: Request) -> Reply {
        debug!(?request, "executing request");
        match request {
            Request::TestConnection => Reply::connection_active(),
            Request::Move(direction) => {
                self.scheduler.set_direction(direction);
                Reply::moved(direction)
            }
            Request::OpenLid(id) => self.lid_reply(request, self.lids.open(id).await, id),
            Request::CloseLid(id) => self.lid_reply(request, self.lids.close(id).await, id),
        }
    }

    fn lid_reply(&self, request: Request, outcome: Result<(), BotError>, id: LidId) -> Reply {
        match outcome {
            Ok(()) => Reply::lid(id, request.event()),
            Err(e) => {
                if e.is_protocol() {
                    warn!(lid = %id, error = %e, "lid request rejected");
                } else {
                    error!(lid = %id, error = %e, "lid motion failed");
                }
                Reply::error(&e)
            }
        }
    }

    /// A client connection ended.  The robot must not keep driving on a
    /// command nobody can revoke any more.
    pub fn connection_closed(&self) -> Direction {
        self.scheduler.force_stop("connection closed")
    }
}
