use tracing::{debug, info};

use crate::engine::errors::AggError;
use crate::engine::request;
use crate::engine::session::{CursorSession, FieldReport};
use crate::engine::strategy::{Scheduler, release};
use crate::engine::types::{AggregationMode, AggregationRequest};
use crate::wire::{Command, RespValue, Transport, TransportError};

/// Single connection, single thread. Every phase goes out as one pipeline and
/// waits for all of its replies before the next phase starts.
pub struct SequentialScheduler<'c, T: Transport + ?Sized> {
    conn: &'c mut T,
}

impl<'c, T: Transport + ?Sized> SequentialScheduler<'c, T> {
    pub fn new(conn: &'c mut T) -> Self {
        Self { conn }
    }

    fn run_top_n(&mut self, request: &AggregationRequest, n: usize) -> Vec<FieldReport> {
        let cmds: Vec<Command> = request
            .fields()
            .iter()
            .map(|field| request::top_n(request, field, n))
            .collect();

        match self.conn.send_batch(&cmds) {
            Ok(replies) => request
                .fields()
                .iter()
                .zip(replies)
                .map(|(field, reply)| FieldReport::top_n(request, field, reply))
                .collect(),
            Err(e) => request
                .fields()
                .iter()
                .map(|field| FieldReport::failed(field, e.clone().into()))
                .collect(),
        }
    }

    fn run_cursors(&mut self, request: &AggregationRequest) -> Vec<FieldReport> {
        let mut sessions: Vec<CursorSession<'_>> = request
            .fields()
            .iter()
            .map(|field| CursorSession::new(request, field))
            .collect();
        let everyone: Vec<usize> = (0..sessions.len()).collect();

        let initials: Vec<Command> = sessions.iter().map(CursorSession::initial_command).collect();
        self.exchange(&mut sessions, &everyone, &initials, CursorSession::on_initial);
        self.release_finished(&mut sessions, &everyone);

        let mut round = 0usize;
        loop {
            let (active, reads): (Vec<usize>, Vec<Command>) = sessions
                .iter()
                .enumerate()
                .filter_map(|(idx, s)| s.next_read().map(|cmd| (idx, cmd)))
                .unzip();
            if active.is_empty() {
                break;
            }
            round += 1;
            debug!(target: "rqe::orchestrator", round, cursors = active.len(), "Read round");

            self.exchange(&mut sessions, &active, &reads, CursorSession::on_page);
            self.release_finished(&mut sessions, &active);
        }

        let pending: Vec<usize> = (0..sessions.len())
            .filter(|&idx| sessions[idx].needs_fallback())
            .collect();
        if !pending.is_empty() {
            info!(
                target: "rqe::orchestrator",
                fields = pending.len(),
                "Cursor pages were empty; retrying without pagination"
            );
            let fallbacks: Vec<Command> = pending
                .iter()
                .map(|&idx| sessions[idx].fallback_command())
                .collect();
            self.exchange(&mut sessions, &pending, &fallbacks, CursorSession::on_fallback);
        }

        sessions.into_iter().map(CursorSession::into_report).collect()
    }

    /// Sends `cmds` as one pipeline; reply `i` goes to `sessions[targets[i]]`.
    fn exchange<'s, F>(
        &mut self,
        sessions: &mut [CursorSession<'s>],
        targets: &[usize],
        cmds: &[Command],
        apply: F,
    ) where
        F: Fn(&mut CursorSession<'s>, RespValue),
    {
        match self.conn.send_batch(cmds) {
            Ok(replies) => {
                for (&idx, reply) in targets.iter().zip(replies) {
                    apply(&mut sessions[idx], reply);
                }
            }
            Err(e) => {
                for &idx in targets {
                    sessions[idx].fail(e.clone().into());
                }
            }
        }
    }

    /// One pipelined DEL for every session among `candidates` that stopped this phase.
    fn release_finished(&mut self, sessions: &mut [CursorSession<'_>], candidates: &[usize]) {
        let (owners, dels): (Vec<usize>, Vec<Command>) = candidates
            .iter()
            .filter_map(|&idx| sessions[idx].close_command().map(|cmd| (idx, cmd)))
            .unzip();
        if dels.is_empty() {
            return;
        }

        match self.conn.send_batch(&dels) {
            Ok(replies) => {
                for ((&idx, del), reply) in owners.iter().zip(&dels).zip(replies) {
                    release(sessions[idx].field(), del, Ok::<_, TransportError>(reply));
                }
            }
            Err(e) => {
                for (&idx, del) in owners.iter().zip(&dels) {
                    release(sessions[idx].field(), del, Err::<RespValue, _>(&e));
                }
            }
        }
    }
}

impl<T: Transport + ?Sized> Scheduler for SequentialScheduler<'_, T> {
    fn run(&mut self, request: &AggregationRequest) -> Result<Vec<FieldReport>, AggError> {
        Ok(match request.mode() {
            AggregationMode::TopN(n) => self.run_top_n(request, n),
            AggregationMode::Cursor => self.run_cursors(request),
        })
    }
}
