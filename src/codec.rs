//! Encodes and decodes the Irondomo Protocol wire envelope.
//!
//! A message on either router-style socket is a sequence of opaque frames.
//! This module only understands framing (header, command byte, routing
//! envelopes); it has no opinion on payload contents. See spec §4.1.

use zeromq::ZmqMessage;

use crate::error::IdpError;
use crate::protocol::{command, CLIENT_HEADER, WORKER_HEADER};

/// Collects a `ZmqMessage`'s frames into owned byte vectors, in order.
pub fn frames_of(msg: &ZmqMessage) -> Vec<Vec<u8>> {
    msg.iter().map(|f| f.as_ref().to_vec()).collect()
}

/// Builds a `ZmqMessage` from an ordered list of owned frames.
pub fn message_of(frames: Vec<Vec<u8>>) -> ZmqMessage {
    let mut iter = frames.into_iter();
    let first = iter.next().unwrap_or_default();
    let mut msg = ZmqMessage::from(first);
    for frame in iter {
        msg.push_back(frame.into());
    }
    msg
}

/// A worker-header message with its command byte and trailing frames
/// (whatever followed the command — empty for HEARTBEAT/DISCONNECT, the
/// service name for READY, the embedded client envelope plus payload for
/// REQUEST/REPLY).
#[derive(Debug)]
pub struct WorkerFrame {
    pub command: u8,
    pub rest: Vec<Vec<u8>>,
}

/// A client-header message: the requested service name plus payload frames.
#[derive(Debug)]
pub struct ClientFrame {
    pub service: Vec<u8>,
    pub payload: Vec<Vec<u8>>,
}

/// Decodes `[empty, IDPW01, command, ...rest]` (the identity frame, if any,
/// must already have been stripped by the caller).
pub fn decode_worker_frames(frames: &[Vec<u8>]) -> Result<WorkerFrame, IdpError> {
    if frames.len() < 3 {
        return Err(IdpError::MalformedEnvelope(format!(
            "worker message needs at least 3 frames, got {}",
            frames.len()
        )));
    }
    if !frames[0].is_empty() {
        return Err(IdpError::MalformedEnvelope(
            "worker message missing empty delimiter".into(),
        ));
    }
    if frames[1] != WORKER_HEADER {
        return Err(IdpError::MalformedEnvelope(format!(
            "expected worker header {:?}, got {:?}",
            WORKER_HEADER, frames[1]
        )));
    }
    if frames[2].len() != 1 {
        return Err(IdpError::MalformedEnvelope(
            "command frame must be exactly one byte".into(),
        ));
    }
    let command = frames[2][0];
    let rest = frames[3..].to_vec();

    match command {
        command::READY if rest.len() != 1 => {
            return Err(IdpError::MalformedEnvelope(
                "READY requires exactly one service-name frame".into(),
            ))
        }
        command::REQUEST | command::REPLY if rest.len() < 2 => {
            return Err(IdpError::MalformedEnvelope(
                "REQUEST/REPLY requires an embedded client envelope".into(),
            ))
        }
        command::READY | command::REQUEST | command::REPLY | command::HEARTBEAT
        | command::DISCONNECT => {}
        other => {
            return Err(IdpError::MalformedEnvelope(format!(
                "unknown worker command byte {:#04x}",
                other
            )))
        }
    }

    Ok(WorkerFrame { command, rest })
}

/// Decodes `[empty, IDPC01, service, ...payload]` (identity frame already
/// stripped by the caller).
pub fn decode_client_frames(frames: &[Vec<u8>]) -> Result<ClientFrame, IdpError> {
    if frames.len() < 3 {
        return Err(IdpError::MalformedEnvelope(format!(
            "client message needs at least 3 frames, got {}",
            frames.len()
        )));
    }
    if !frames[0].is_empty() {
        return Err(IdpError::MalformedEnvelope(
            "client message missing empty delimiter".into(),
        ));
    }
    if frames[1] != CLIENT_HEADER {
        return Err(IdpError::MalformedEnvelope(format!(
            "expected client header {:?}, got {:?}",
            CLIENT_HEADER, frames[1]
        )));
    }
    Ok(ClientFrame {
        service: frames[2].clone(),
        payload: frames[3..].to_vec(),
    })
}

/// Builds `[worker_identity, empty, IDPW01, command, ...rest]` for sending
/// on a ROUTER socket (the identity frame is popped by the socket on send).
pub fn encode_to_worker(identity: &[u8], command: u8, rest: &[Vec<u8>]) -> ZmqMessage {
    let mut frames = Vec::with_capacity(4 + rest.len());
    frames.push(identity.to_vec());
    frames.push(Vec::new());
    frames.push(WORKER_HEADER.to_vec());
    frames.push(vec![command]);
    frames.extend_from_slice(rest);
    message_of(frames)
}

/// Builds `[client_identity, empty, IDPC01, service, ...payload]` for
/// sending on a ROUTER socket.
pub fn encode_to_client(identity: &[u8], service: &[u8], payload: &[Vec<u8>]) -> ZmqMessage {
    let mut frames = Vec::with_capacity(4 + payload.len());
    frames.push(identity.to_vec());
    frames.push(Vec::new());
    frames.push(CLIENT_HEADER.to_vec());
    frames.push(service.to_vec());
    frames.extend_from_slice(payload);
    message_of(frames)
}

/// Builds `[empty, IDPW01, command, ...rest]` for a DEALER socket's send
/// (no identity frame — the socket's own identity is implicit).
pub fn encode_from_worker(command: u8, rest: &[Vec<u8>]) -> ZmqMessage {
    let mut frames = Vec::with_capacity(3 + rest.len());
    frames.push(Vec::new());
    frames.push(WORKER_HEADER.to_vec());
    frames.push(vec![command]);
    frames.extend_from_slice(rest);
    message_of(frames)
}

/// Builds `[empty, IDPC01, service, ...payload]` for a DEALER socket's send.
///
/// The leading empty frame emulates a REQ-style envelope over the DEALER
/// socket this crate uses for both client modes (see `SPEC_FULL.md` §11.4).
pub fn encode_from_client(service: &[u8], payload: &[Vec<u8>]) -> ZmqMessage {
    let mut frames = Vec::with_capacity(3 + payload.len());
    frames.push(Vec::new());
    frames.push(CLIENT_HEADER.to_vec());
    frames.push(service.to_vec());
    frames.extend_from_slice(payload);
    message_of(frames)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_ready() {
        let frames = vec![
            vec![],
            WORKER_HEADER.to_vec(),
            vec![command::READY],
            b"echo".to_vec(),
        ];
        let decoded = decode_worker_frames(&frames).unwrap();
        assert_eq!(decoded.command, command::READY);
        assert_eq!(decoded.rest, vec![b"echo".to_vec()]);
    }

    #[test]
    fn decode_reply_requires_envelope() {
        let frames = vec![vec![], WORKER_HEADER.to_vec(), vec![command::REPLY]];
        assert!(decode_worker_frames(&frames).is_err());
    }

    #[test]
    fn decode_rejects_bad_header() {
        let frames = vec![vec![], b"BOGUS1".to_vec(), vec![command::HEARTBEAT]];
        assert!(decode_worker_frames(&frames).is_err());
    }

    #[test]
    fn decode_rejects_unknown_command() {
        let frames = vec![vec![], WORKER_HEADER.to_vec(), vec![0x7f]];
        assert!(decode_worker_frames(&frames).is_err());
    }

    #[test]
    fn client_roundtrip() {
        let frames = vec![
            vec![],
            CLIENT_HEADER.to_vec(),
            b"echo".to_vec(),
            b"Hello".to_vec(),
            b" ".to_vec(),
            b"world".to_vec(),
        ];
        let decoded = decode_client_frames(&frames).unwrap();
        assert_eq!(decoded.service, b"echo");
        assert_eq!(decoded.payload, vec![b"Hello".to_vec(), b" ".to_vec(), b"world".to_vec()]);
    }

    #[test]
    fn encode_to_worker_shapes_frames() {
        let msg = encode_to_worker(b"wid", command::HEARTBEAT, &[]);
        let frames = frames_of(&msg);
        assert_eq!(frames, vec![b"wid".to_vec(), vec![], WORKER_HEADER.to_vec(), vec![command::HEARTBEAT]]);
    }

    #[test]
    fn encode_to_client_shapes_frames() {
        let msg = encode_to_client(b"cid", b"echo", &[b"hi".to_vec()]);
        let frames = frames_of(&msg);
        assert_eq!(
            frames,
            vec![b"cid".to_vec(), vec![], CLIENT_HEADER.to_vec(), b"echo".to_vec(), b"hi".to_vec()]
        );
    }
}
