// ============================
// crates/gateway-lib/src/curriculum.rs
// ============================
//! Per-room curriculum actor.
//!
//! All ADD/REMOVE mutations for a room funnel through one task, so
//! persist-then-broadcast is serialized and concurrent ADD/REMOVE on
//! the same problem cannot interleave between the disk write and the
//! room fan-out.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::warn;

use crate::{
    error::GatewayError,
    rooms::RoomDirectory,
    session::SessionRegistry,
    storage::{ProblemRecord, Storage},
};
use studyroom_common::{topics, CurriculumEvent, RoomEvent};

/// Message sent *into* the actor
#[derive(Debug)]
enum CurriculumMsg {
    Add {
        problem_id: i64,
        resp_tx: mpsc::UnboundedSender<Result<(), GatewayError>>,
    },
    Remove {
        problem_id: i64,
        resp_tx: mpsc::UnboundedSender<Result<(), GatewayError>>,
    },
}

/// Handle that other components keep: the actor's command channel.
#[derive(Clone)]
pub struct CurriculumHandle {
    cmd_tx: mpsc::UnboundedSender<CurriculumMsg>,
}

impl CurriculumHandle {
    pub fn spawn(
        room: String,
        storage: Arc<dyn Storage>,
        sessions: Arc<SessionRegistry>,
        rooms: Arc<RoomDirectory>,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let actor = CurriculumActor {
            room,
            storage,
            sessions,
            rooms,
        };
        tokio::spawn(actor.run(cmd_rx));
        CurriculumHandle { cmd_tx }
    }

    pub async fn add(&self, problem_id: i64) -> Result<(), GatewayError> {
        let (resp_tx, mut resp_rx) = mpsc::unbounded_channel();
        self.cmd_tx.send(CurriculumMsg::Add { problem_id, resp_tx })?;
        resp_rx.recv().await.ok_or(GatewayError::ChannelClosed)?
    }

    pub async fn remove(&self, problem_id: i64) -> Result<(), GatewayError> {
        let (resp_tx, mut resp_rx) = mpsc::unbounded_channel();
        self.cmd_tx
            .send(CurriculumMsg::Remove { problem_id, resp_tx })?;
        resp_rx.recv().await.ok_or(GatewayError::ChannelClosed)?
    }
}

struct CurriculumActor {
    room: String,
    storage: Arc<dyn Storage>,
    sessions: Arc<SessionRegistry>,
    rooms: Arc<RoomDirectory>,
}

impl CurriculumActor {
    async fn run(self, mut cmd_rx: mpsc::UnboundedReceiver<CurriculumMsg>) {
        while let Some(msg) = cmd_rx.recv().await {
            match msg {
                CurriculumMsg::Add { problem_id, resp_tx } => {
                    let result = self.handle_add(problem_id).await;
                    let _ = resp_tx.send(result);
                }
                CurriculumMsg::Remove { problem_id, resp_tx } => {
                    let result = self.handle_remove(problem_id).await;
                    let _ = resp_tx.send(result);
                }
            }
        }
    }

    /// ADD: ensure the problem record exists, associate it with the
    /// room, then broadcast. A persist failure is logged but does not
    /// suppress the broadcast; members still learn the intended state
    /// and a later refresh reconciles.
    async fn handle_add(&self, problem_id: i64) -> Result<(), GatewayError> {
        let title = match self.ensure_problem(problem_id).await {
            Ok(record) => record.title,
            Err(err) => {
                warn!(room = %self.room, problem_id, %err, "curriculum add persist failed");
                format!("Problem {problem_id}")
            }
        };

        if let Err(err) = self.storage.create_association(&self.room, problem_id).await {
            warn!(room = %self.room, problem_id, %err, "curriculum association persist failed");
        }

        self.broadcast(CurriculumEvent::Add { problem_id, title });
        Ok(())
    }

    /// REMOVE: broadcast only when an association was actually deleted,
    /// so removing an absent problem is silent.
    async fn handle_remove(&self, problem_id: i64) -> Result<(), GatewayError> {
        match self.storage.delete_association(&self.room, problem_id).await {
            Ok(true) => {
                self.broadcast(CurriculumEvent::Remove { problem_id });
            }
            Ok(false) => {}
            Err(err) => {
                warn!(room = %self.room, problem_id, %err, "curriculum remove persist failed");
            }
        }
        Ok(())
    }

    async fn ensure_problem(&self, problem_id: i64) -> Result<ProblemRecord, GatewayError> {
        if let Some(record) = self.storage.find_problem(problem_id).await? {
            return Ok(record);
        }
        let record = ProblemRecord {
            external_id: problem_id,
            title: format!("Problem {problem_id}"),
        };
        self.storage.create_problem(&record).await?;
        Ok(record)
    }

    /// Mutations go out in the same `{type, data}` envelope as every
    /// other room event, so subscribers of the problems topic see one
    /// shape whether the change came from a member or a refresh.
    fn broadcast(&self, event: CurriculumEvent) {
        self.rooms.broadcast(
            &self.sessions,
            &self.room,
            &topics::room_problems(&self.room),
            &RoomEvent::Curriculum(event),
            None,
        );
    }
}
