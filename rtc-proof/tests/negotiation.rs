/// Integration test for offer/answer between two sans-I/O endpoints driven by
/// hand: candidates are trickled through a queue and datagrams are handed
/// straight to the peer, with a virtual clock.
use anyhow::Result;
use sansio::Protocol;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

use rtc_proof::peer_connection::configuration::RTCConfigurationBuilder;
use rtc_proof::peer_connection::event::RTCPeerConnectionEvent;
use rtc_proof::peer_connection::state::{
    RTCIceConnectionState, RTCIceGatheringState, RTCPeerConnectionState, RTCSignalingState,
};
use rtc_proof::peer_connection::transport::TaggedBytesMut;
use rtc_proof::peer_connection::transport::ice::{
    RTCIceCandidateInit, RTCIceCandidateType, RTCIceServer,
};
use rtc_proof::{EndpointRole, RTCPeerConnection};

fn ice_servers() -> Vec<RTCIceServer> {
    vec![
        RTCIceServer {
            urls: vec!["stun:stun.l.google.com:19302".to_owned()],
            ..Default::default()
        },
        RTCIceServer {
            urls: vec!["turn:turn.example.org:3478".to_owned()],
            username: "user".to_owned(),
            credential: "secret".to_owned(),
        },
    ]
}

fn endpoint(role: EndpointRole) -> Result<RTCPeerConnection> {
    let configuration = RTCConfigurationBuilder::new()
        .with_ice_servers(ice_servers())
        .build();
    Ok(RTCPeerConnection::new(configuration, role)?)
}

/// Collects trickled candidates and records every ICE state change.
fn drain_events(
    pc: &mut RTCPeerConnection,
    candidates: &mut VecDeque<RTCIceCandidateInit>,
    ice_states: &mut Vec<RTCIceConnectionState>,
) {
    while let Some(event) = pc.poll_event() {
        match event {
            RTCPeerConnectionEvent::OnIceCandidateEvent(ice_event) => {
                candidates.push_back(ice_event.to_init());
            }
            RTCPeerConnectionEvent::OnIceConnectionStateChangeEvent(state) => {
                ice_states.push(state);
            }
            _ => {}
        }
    }
}

fn received(mut msg: TaggedBytesMut) -> TaggedBytesMut {
    std::mem::swap(&mut msg.transport.local_addr, &mut msg.transport.peer_addr);
    msg
}

#[test]
fn test_trickle_negotiation_between_endpoints() -> Result<()> {
    env_logger::builder().is_test(true).try_init().ok();

    let start = Instant::now();
    let mut local = endpoint(EndpointRole::Local)?;
    let mut remote = endpoint(EndpointRole::Remote)?;
    let mut to_remote = VecDeque::new();
    let mut to_local = VecDeque::new();
    let mut local_states = vec![];
    let mut remote_states = vec![];

    let offer = local.create_offer()?;
    local.set_local_description(offer.clone())?;
    assert_eq!(local.ice_gathering_state(), RTCIceGatheringState::Gathering);

    // let local finish gathering before the remote side has seen the offer
    let mut now = start;
    while now < start + Duration::from_millis(100) {
        local.handle_timeout(now)?;
        now += Duration::from_millis(10);
    }
    drain_events(&mut local, &mut to_remote, &mut local_states);
    assert_eq!(local.ice_gathering_state(), RTCIceGatheringState::Complete);

    let types: Vec<RTCIceCandidateType> = local.local_candidates().iter().map(|c| c.typ).collect();
    assert_eq!(
        types,
        vec![
            RTCIceCandidateType::Host,
            RTCIceCandidateType::Srflx,
            RTCIceCandidateType::Relay
        ]
    );
    // three candidates and the end-of-candidates marker
    assert_eq!(to_remote.len(), 4);

    while let Some(init) = to_remote.pop_front() {
        remote.add_ice_candidate(init)?;
    }
    assert_eq!(remote.pending_remote_candidate_count(), 4);
    assert!(remote.remote_candidates().is_empty());

    remote.set_remote_description(offer)?;
    assert_eq!(remote.pending_remote_candidate_count(), 0);
    assert_eq!(remote.remote_candidates().len(), 3);
    assert_eq!(remote.signaling_state(), RTCSignalingState::HaveRemoteOffer);

    let answer = remote.create_answer()?;
    remote.set_local_description(answer.clone())?;
    local.set_remote_description(answer)?;

    for _ in 0..300 {
        local.handle_timeout(now)?;
        remote.handle_timeout(now)?;
        drain_events(&mut local, &mut to_remote, &mut local_states);
        drain_events(&mut remote, &mut to_local, &mut remote_states);

        while let Some(init) = to_remote.pop_front() {
            remote.add_ice_candidate(init)?;
        }
        while let Some(init) = to_local.pop_front() {
            local.add_ice_candidate(init)?;
        }
        while let Some(msg) = local.poll_write() {
            remote.handle_read(received(msg))?;
        }
        while let Some(msg) = remote.poll_write() {
            local.handle_read(received(msg))?;
        }

        if local.ice_connection_state() == RTCIceConnectionState::Completed
            && remote.ice_connection_state() == RTCIceConnectionState::Connected
        {
            break;
        }
        now += Duration::from_millis(10);
    }

    assert_eq!(
        local_states,
        vec![
            RTCIceConnectionState::Checking,
            RTCIceConnectionState::Connected,
            RTCIceConnectionState::Completed
        ]
    );
    assert_eq!(
        remote_states,
        vec![
            RTCIceConnectionState::Checking,
            RTCIceConnectionState::Connected
        ]
    );
    assert_eq!(local.connection_state(), RTCPeerConnectionState::Connected);
    assert_eq!(remote.connection_state(), RTCPeerConnectionState::Connected);
    assert_eq!(local.remote_candidates().len(), 3);

    let (selected_local, selected_remote) = local
        .selected_candidate_pair()
        .expect("local selected pair");
    assert!(selected_local.address.ends_with(".1"));
    assert!(selected_remote.address.ends_with(".2"));

    local.close()?;
    remote.close()?;
    assert_eq!(local.connection_state(), RTCPeerConnectionState::Closed);
    assert_eq!(remote.ice_connection_state(), RTCIceConnectionState::Closed);
    Ok(())
}

#[test]
fn test_non_trickle_description_carries_candidates() -> Result<()> {
    let start = Instant::now();
    let mut local = endpoint(EndpointRole::Local)?;
    let mut remote = endpoint(EndpointRole::Remote)?;

    let offer = local.create_offer()?;
    local.set_local_description(offer)?;
    local.handle_timeout(start + Duration::from_millis(100))?;
    assert_eq!(local.ice_gathering_state(), RTCIceGatheringState::Complete);

    // the full local description now lists every gathered candidate
    let offer = local.local_description().expect("local description");
    assert_eq!(offer.sdp.matches("a=candidate:").count(), 3);
    assert!(offer.sdp.contains("a=end-of-candidates"));

    remote.set_remote_description(offer)?;
    assert_eq!(remote.remote_candidates().len(), 3);
    Ok(())
}
