use std::fmt;

use super::NegotiationSession;
use super::signaling::SignalingMessage;
use crate::error::{Error, Result};
use crate::peer_connection::EndpointRole;
use crate::peer_connection::sdp::RTCSessionDescription;

/// One operation of the offer/answer handshake, named in negotiation errors.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum NegotiationStep {
    CreateOffer,
    SetLocalOffer,
    SetRemoteOffer,
    CreateAnswer,
    SetLocalAnswer,
    SetRemoteAnswer,
    AddIceCandidate,
}

impl fmt::Display for NegotiationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            NegotiationStep::CreateOffer => "create offer",
            NegotiationStep::SetLocalOffer => "set local offer",
            NegotiationStep::SetRemoteOffer => "set remote offer",
            NegotiationStep::CreateAnswer => "create answer",
            NegotiationStep::SetLocalAnswer => "set local answer",
            NegotiationStep::SetRemoteAnswer => "set remote answer",
            NegotiationStep::AddIceCandidate => "add ice candidate",
        };
        write!(f, "{s}")
    }
}

impl NegotiationSession {
    /// Runs the offer/answer handshake strictly in order:
    ///
    /// 1. local creates and applies an offer
    /// 2. remote applies the offer
    /// 3. remote creates and applies an answer
    /// 4. local applies the answer
    ///
    /// Between steps the session is driven once so timers fire and trickled
    /// candidates flow to the peer. The exchange is complete once both remote
    /// descriptions are set; trickling carries on during monitoring.
    pub(crate) async fn negotiate(&mut self) -> Result<()> {
        let offer = self
            .local
            .create_offer()
            .map_err(|err| err.at(NegotiationStep::CreateOffer))?;
        log::debug!("offer created");
        self.local
            .set_local_description(offer.clone())
            .map_err(|err| err.at(NegotiationStep::SetLocalOffer))?;
        log::debug!("local description set on local endpoint");
        let message = self.post(EndpointRole::Local, SignalingMessage::Offer(offer.sdp));
        self.step().await?;

        let offer = received(&message).map_err(|err| err.at(NegotiationStep::SetRemoteOffer))?;
        self.remote
            .set_remote_description(offer)
            .map_err(|err| err.at(NegotiationStep::SetRemoteOffer))?;
        log::debug!("remote description set on remote endpoint");
        self.step().await?;

        let answer = self
            .remote
            .create_answer()
            .map_err(|err| err.at(NegotiationStep::CreateAnswer))?;
        log::debug!("answer created");
        self.remote
            .set_local_description(answer.clone())
            .map_err(|err| err.at(NegotiationStep::SetLocalAnswer))?;
        log::debug!("local description set on remote endpoint");
        let message = self.post(EndpointRole::Remote, SignalingMessage::Answer(answer.sdp));
        self.step().await?;

        let answer =
            received(&message).map_err(|err| err.at(NegotiationStep::SetRemoteAnswer))?;
        self.local
            .set_remote_description(answer)
            .map_err(|err| err.at(NegotiationStep::SetRemoteAnswer))?;
        log::debug!("remote description set on local endpoint");
        self.step().await?;

        log::info!(
            "description exchange complete, {} candidates exchanged so far",
            self.candidates_exchanged()
        );
        Ok(())
    }

    /// Records an offer or answer in the signaling log.
    fn post(&mut self, from: EndpointRole, message: SignalingMessage) -> SignalingMessage {
        log::trace!("signaling: {} from {from}", message.kind());
        self.signaling_log.push(message.clone());
        message
    }

    async fn step(&mut self) -> Result<()> {
        self.drive()?;
        tokio::task::yield_now().await;
        Ok(())
    }
}

fn received(message: &SignalingMessage) -> Result<RTCSessionDescription> {
    message
        .description()
        .unwrap_or_else(|| Err(Error::Other(format!("{} carries no description", message.kind()))))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_negotiation_step_string() {
        let tests = vec![
            (NegotiationStep::CreateOffer, "create offer"),
            (NegotiationStep::SetLocalOffer, "set local offer"),
            (NegotiationStep::SetRemoteOffer, "set remote offer"),
            (NegotiationStep::CreateAnswer, "create answer"),
            (NegotiationStep::SetLocalAnswer, "set local answer"),
            (NegotiationStep::SetRemoteAnswer, "set remote answer"),
            (NegotiationStep::AddIceCandidate, "add ice candidate"),
        ];

        for (step, expected_string) in tests {
            assert_eq!(step.to_string(), expected_string);
        }
    }

    #[test]
    fn test_received_requires_description() {
        let message = SignalingMessage::Candidate(Default::default());
        assert!(matches!(received(&message), Err(Error::Other(_))));

        let message = SignalingMessage::Offer("not sdp".to_owned());
        assert!(matches!(
            received(&message),
            Err(Error::ErrSdpInvalidSyntax(_))
        ));
    }
}
