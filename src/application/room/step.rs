//! Asynchronous negotiation steps
//!
//! Each queued [`SessionOp`] becomes one future that talks to the transport
//! engine and resolves to a [`StepCompletion`]. The room loop applies the
//! completion; the future itself never touches room state.

use crate::domain::media::LocalTrack;
use crate::domain::session::{SessionDescription, SessionOp};
use crate::domain::shared::{DomainError, ParticipantId, Result, SessionKey};
use crate::domain::transport::{PeerConnection, TransportEngine, TransportEventSink};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::fmt;
use std::sync::Arc;

/// What a finished step produced
pub(crate) enum StepOutput {
    /// Transport connection built and local tracks attached
    Connected(Arc<dyn PeerConnection>),
    /// Local offer applied, ready to transmit
    OfferReady(SessionDescription),
    /// Remote offer and local answer applied, answer ready to transmit
    AnswerReady(SessionDescription),
    /// Remote answer applied
    RemoteApplied,
    CandidateApplied,
}

impl fmt::Debug for StepOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepOutput::Connected(_) => f.write_str("Connected"),
            StepOutput::OfferReady(_) => f.write_str("OfferReady"),
            StepOutput::AnswerReady(_) => f.write_str("AnswerReady"),
            StepOutput::RemoteApplied => f.write_str("RemoteApplied"),
            StepOutput::CandidateApplied => f.write_str("CandidateApplied"),
        }
    }
}

#[derive(Debug)]
pub(crate) struct StepCompletion {
    pub key: SessionKey,
    pub participant: ParticipantId,
    pub op: &'static str,
    pub result: Result<StepOutput>,
}

/// Turn one session operation into a future
pub(crate) fn run(
    engine: Arc<dyn TransportEngine>,
    sink: TransportEventSink,
    key: SessionKey,
    participant: ParticipantId,
    op: SessionOp,
    connection: Option<Arc<dyn PeerConnection>>,
) -> BoxFuture<'static, StepCompletion> {
    let name = op.name();
    async move {
        let result = execute(engine, sink, &participant, op, connection)
            .await
            .map_err(|e| scope_to_peer(&participant, e));
        StepCompletion {
            key,
            participant,
            op: name,
            result,
        }
    }
    .boxed()
}

async fn execute(
    engine: Arc<dyn TransportEngine>,
    sink: TransportEventSink,
    participant: &ParticipantId,
    op: SessionOp,
    connection: Option<Arc<dyn PeerConnection>>,
) -> Result<StepOutput> {
    match op {
        SessionOp::Connect { tracks } => connect(engine, sink, participant, tracks).await,
        SessionOp::CreateOffer => {
            let connection = require(participant, connection)?;
            let offer = connection.create_offer().await?;
            connection.set_local_description(offer.clone()).await?;
            Ok(StepOutput::OfferReady(offer))
        }
        SessionOp::AcceptOffer(offer) => {
            let connection = require(participant, connection)?;
            connection.set_remote_description(offer).await?;
            let answer = connection.create_answer().await?;
            connection.set_local_description(answer.clone()).await?;
            Ok(StepOutput::AnswerReady(answer))
        }
        SessionOp::AcceptAnswer(answer) => {
            require(participant, connection)?
                .set_remote_description(answer)
                .await?;
            Ok(StepOutput::RemoteApplied)
        }
        SessionOp::AddCandidate(candidate) => {
            require(participant, connection)?
                .add_remote_candidate(candidate)
                .await?;
            Ok(StepOutput::CandidateApplied)
        }
    }
}

/// Build the connection and attach every local track; a half-built connection is closed
async fn connect(
    engine: Arc<dyn TransportEngine>,
    sink: TransportEventSink,
    participant: &ParticipantId,
    tracks: Vec<LocalTrack>,
) -> Result<StepOutput> {
    let connection = engine
        .create_connection(participant, sink)
        .await
        .map_err(|e| match e {
            e if e.is_peer_scoped() => e,
            e => DomainError::connection_setup(participant, e),
        })?;

    for track in &tracks {
        if let Err(e) = connection.add_local_track(track).await {
            connection.close();
            return Err(DomainError::connection_setup(
                participant,
                format!("attaching {} track {}: {}", track.kind(), track.id(), e),
            ));
        }
    }

    Ok(StepOutput::Connected(connection))
}

fn require(
    participant: &ParticipantId,
    connection: Option<Arc<dyn PeerConnection>>,
) -> Result<Arc<dyn PeerConnection>> {
    connection.ok_or_else(|| DomainError::negotiation(participant, "no transport connection"))
}

/// Engine errors that are not already per-peer become negotiation failures
fn scope_to_peer(participant: &ParticipantId, error: DomainError) -> DomainError {
    if error.is_peer_scoped() {
        error
    } else {
        DomainError::negotiation(participant, error)
    }
}
