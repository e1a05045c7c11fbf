use std::num::ParseIntError;
use thiserror::Error;

use crate::session::NegotiationStep;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, PartialEq)]
#[non_exhaustive]
pub enum Error {
    /// A required platform primitive is missing. Raised before any endpoint exists.
    #[error("platform does not support: {0}")]
    ErrUnsupportedPlatform(String),
    /// The media collaborator refused to hand out tracks. Recoverable.
    #[error("media access denied: {0}")]
    ErrMediaAccessDenied(String),

    #[error("connection closed")]
    ErrConnectionClosed,
    #[error("local description already set, a new offer can not be created")]
    ErrLocalDescriptionAlreadySet,
    #[error("no remote description")]
    ErrNoRemoteDescription,
    #[error("no previously created offer or answer to apply")]
    ErrNoPendingDescription,
    #[error("operation can not be run in current signaling state")]
    ErrIncorrectSignalingState,
    #[error("invalid proposed signaling state transition: {0}")]
    ErrSignalingStateProposedTransitionInvalid(String),
    #[error("remote description has no media sections to answer")]
    ErrNoMediaSections,
    #[error("remote description is missing ice-ufrag")]
    ErrRemoteUfragEmpty,
    #[error("remote description is missing ice-pwd")]
    ErrRemotePwdEmpty,

    #[error("sdp: invalid syntax `{0}`")]
    ErrSdpInvalidSyntax(String),
    #[error("sdp: invalid value `{0}`")]
    ErrSdpInvalidValue(String),

    #[error("attribute not long enough to be ICE candidate ({0})")]
    ErrAttributeTooShortIceCandidate(usize),
    #[error("unknown candidate type `{0}`")]
    ErrUnknownCandidateType(String),
    #[error("unknown candidate network `{0}`")]
    ErrUnknownCandidateNetwork(String),
    #[error("could not parse related addresses")]
    ErrParseRelatedAddr,
    #[error("invalid candidate address `{0}`")]
    ErrInvalidCandidateAddress(String),
    #[error("candidate username fragment `{0}` does not match the remote description")]
    ErrCandidateUfragMismatch(String),

    #[error("invalid ICE server url `{0}`")]
    ErrInvalidIceServerUrl(String),
    #[error("unknown ICE server scheme `{0}`")]
    ErrUnknownIceServerScheme(String),
    #[error("TURN server requires username and credential")]
    ErrNoTurnCredentials,

    #[error("binding message too short ({0} bytes)")]
    ErrBindingMessageTooShort(usize),
    #[error("binding message has bad magic cookie")]
    ErrBadMagicCookie,
    #[error("unknown binding message type {0:#06x}")]
    ErrUnknownBindingMessageType(u16),
    #[error("no local candidate bound to {0}")]
    ErrNoSuchLocalCandidate(String),

    #[error("negotiation failed at {step}: {source}")]
    ErrNegotiationFailed {
        step: NegotiationStep,
        source: Box<Error>,
    },
    #[error("signaling channel closed")]
    ErrSignalingChannelClosed,

    #[error("parse int: {0}")]
    ParseInt(#[from] ParseIntError),
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Reports whether the error belongs to the negotiation class: a description
    /// or candidate operation rejected by an endpoint. These end the session.
    pub fn is_negotiation_failure(&self) -> bool {
        matches!(
            self,
            Error::ErrConnectionClosed
                | Error::ErrLocalDescriptionAlreadySet
                | Error::ErrNoRemoteDescription
                | Error::ErrNoPendingDescription
                | Error::ErrIncorrectSignalingState
                | Error::ErrSignalingStateProposedTransitionInvalid(_)
                | Error::ErrNoMediaSections
                | Error::ErrRemoteUfragEmpty
                | Error::ErrRemotePwdEmpty
                | Error::ErrSdpInvalidSyntax(_)
                | Error::ErrSdpInvalidValue(_)
                | Error::ErrAttributeTooShortIceCandidate(_)
                | Error::ErrUnknownCandidateType(_)
                | Error::ErrUnknownCandidateNetwork(_)
                | Error::ErrParseRelatedAddr
                | Error::ErrInvalidCandidateAddress(_)
                | Error::ErrCandidateUfragMismatch(_)
                | Error::ErrNegotiationFailed { .. }
                | Error::ErrSignalingChannelClosed
        )
    }

    pub fn is_unsupported_platform(&self) -> bool {
        matches!(self, Error::ErrUnsupportedPlatform(_))
    }

    pub(crate) fn at(self, step: NegotiationStep) -> Self {
        match self {
            err @ Error::ErrNegotiationFailed { .. } => err,
            err => Error::ErrNegotiationFailed {
                step,
                source: Box::new(err),
            },
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_error_classification() {
        let tests = vec![
            (Error::ErrUnsupportedPlatform("RTCDataChannel".to_owned()), false),
            (Error::ErrMediaAccessDenied("NotAllowedError".to_owned()), false),
            (Error::ErrNoRemoteDescription, true),
            (Error::ErrAttributeTooShortIceCandidate(3), true),
            (Error::ErrIncorrectSignalingState, true),
            (
                Error::ErrCandidateUfragMismatch("someone-else".to_owned())
                    .at(NegotiationStep::AddIceCandidate),
                true,
            ),
            (
                Error::ErrInvalidIceServerUrl("stun:".to_owned()),
                false,
            ),
            (Error::ErrNoTurnCredentials, false),
            (
                Error::ErrUnknownIceServerScheme("http".to_owned()),
                false,
            ),
            (Error::ErrBadMagicCookie, false),
            (
                Error::ParseInt("x".parse::<u16>().expect_err("not a number")),
                false,
            ),
            (Error::Other("configuration: eof".to_owned()), false),
        ];

        for (err, expected) in tests {
            assert_eq!(err.is_negotiation_failure(), expected, "testCase: {err}");
        }
    }

    #[test]
    fn test_error_at_wraps_once() {
        let err = Error::ErrNoRemoteDescription
            .at(NegotiationStep::CreateAnswer)
            .at(NegotiationStep::SetRemoteAnswer);
        assert_eq!(
            err,
            Error::ErrNegotiationFailed {
                step: NegotiationStep::CreateAnswer,
                source: Box::new(Error::ErrNoRemoteDescription),
            }
        );
        assert_eq!(
            err.to_string(),
            "negotiation failed at create answer: no remote description"
        );
    }
}
