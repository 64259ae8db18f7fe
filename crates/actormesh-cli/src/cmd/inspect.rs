//! `actormesh inspect`: walk a captured byte stream frame by frame.

use actormesh_types::ExitReason;
use actormesh_wire::handshake::{ClientHandshake, ServerHandshake};
use actormesh_wire::payload::{self, DispatchPayload};
use actormesh_wire::{check_frame, Header, MessageType, HEADER_SIZE};
use serde::Serialize;
use std::path::Path;
use tracing::debug;

pub struct InspectOptions {
    pub hex: bool,
    pub json: bool,
    pub max_frame_size: u32,
}

/// One decoded frame.
#[derive(Debug, Serialize)]
pub struct FrameSummary {
    pub index: usize,
    pub offset: usize,
    pub operation: &'static str,
    pub payload_len: u32,
    pub operation_data: u64,
    pub source_node: String,
    pub source_actor: u64,
    pub dest_node: String,
    pub dest: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload_hex: Option<String>,
}

pub fn run(file: &Path, opts: &InspectOptions) -> Result<(), String> {
    let bytes = std::fs::read(file).map_err(|e| format!("Cannot read {}: {e}", file.display()))?;
    debug!(path = %file.display(), size = bytes.len(), "Inspecting capture");
    let frames = walk(&bytes, opts)?;
    for frame in &frames {
        if opts.json {
            let line = serde_json::to_string(frame).map_err(|e| e.to_string())?;
            println!("{line}");
        } else {
            print_text(frame);
        }
    }
    if !opts.json {
        println!("{} frame(s), {} bytes", frames.len(), bytes.len());
    }
    Ok(())
}

/// Split `bytes` into frames, applying the size and payload checks of a live
/// connection. Stops at the first bad frame.
pub fn walk(bytes: &[u8], opts: &InspectOptions) -> Result<Vec<FrameSummary>, String> {
    let mut frames = Vec::new();
    let mut offset = 0;
    while offset < bytes.len() {
        let index = frames.len();
        let rest = &bytes[offset..];
        let hdr = Header::decode(rest).map_err(|e| format!("frame {index} at offset {offset}: {e}"))?;
        check_frame(&hdr, opts.max_frame_size)
            .map_err(|e| format!("frame {index} at offset {offset}: {e}"))?;
        let end = HEADER_SIZE + hdr.payload_len() as usize;
        if rest.len() < end {
            return Err(format!(
                "frame {index} at offset {offset}: truncated payload, {} of {} bytes",
                rest.len() - HEADER_SIZE,
                hdr.payload_len()
            ));
        }
        let body = &rest[HEADER_SIZE..end];
        frames.push(FrameSummary {
            index,
            offset,
            operation: hdr.operation().as_str(),
            payload_len: hdr.payload_len(),
            operation_data: hdr.operation_data(),
            source_node: hdr.source_node().to_string(),
            source_actor: hdr.source_actor().0,
            dest_node: hdr.dest_node().to_string(),
            dest: hdr.dest().to_string(),
            details: describe(&hdr, body),
            payload_hex: (opts.hex && !body.is_empty()).then(|| hex::encode(body)),
        });
        offset += end;
    }
    Ok(frames)
}

/// Short description of a payload, if it decodes.
fn describe(hdr: &Header, body: &[u8]) -> Option<String> {
    match hdr.operation() {
        MessageType::ServerHandshake => payload::decode::<ServerHandshake>(body).ok().map(|hs| {
            match hs.published {
                Some(p) => format!(
                    "app={:?} published={} [{}]",
                    hs.app_identifier,
                    p.actor,
                    p.signatures.into_iter().collect::<Vec<_>>().join(", ")
                ),
                None => format!("app={:?}", hs.app_identifier),
            }
        }),
        MessageType::ClientHandshake => payload::decode::<ClientHandshake>(body)
            .ok()
            .map(|hs| format!("app={:?}", hs.app_identifier)),
        MessageType::DispatchMessage | MessageType::DispatchMessageNamed => {
            payload::decode::<DispatchPayload>(body).ok().map(|p| {
                format!(
                    "id={} stack={} message={} bytes",
                    hdr.message_id(),
                    p.forwarding_stack.len(),
                    p.message.len()
                )
            })
        }
        MessageType::KillProxy => payload::decode::<ExitReason>(body)
            .ok()
            .map(|r| format!("reason={r}")),
        MessageType::AnnounceProxy | MessageType::Heartbeat => None,
    }
}

fn print_text(frame: &FrameSummary) {
    println!(
        "#{:<4} @{:<8} {:<24} {}:{} -> {}:{} len={}",
        frame.index,
        frame.offset,
        frame.operation,
        frame.source_node,
        frame.source_actor,
        frame.dest_node,
        frame.dest,
        frame.payload_len
    );
    if let Some(details) = &frame.details {
        println!("       {details}");
    }
    if let Some(hex) = &frame.payload_hex {
        println!("       {hex}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actormesh_types::{ActorId, Message, MessageId, NodeId};

    fn opts() -> InspectOptions {
        InspectOptions {
            hex: true,
            json: false,
            max_frame_size: 1024,
        }
    }

    fn frame(hdr: Header, body: &[u8]) -> Vec<u8> {
        let mut out = hdr.encode().to_vec();
        out.extend_from_slice(body);
        out
    }

    fn dispatch_frame(node: NodeId) -> Vec<u8> {
        let body = payload::encode(&DispatchPayload {
            forwarding_stack: Vec::new(),
            message: Message::from_bytes(vec![1, 2, 3]),
        })
        .unwrap();
        let hdr = Header::builder(MessageType::DispatchMessage)
            .message_id(MessageId::request(2))
            .source(node, ActorId(1))
            .dest_node(NodeId::new())
            .dest_actor(ActorId(5))
            .build(body.len() as u32);
        frame(hdr, &body)
    }

    #[test]
    fn test_walk_multiple_frames() {
        let node = NodeId::new();
        let mut bytes = dispatch_frame(node);
        bytes.extend(frame(
            Header::builder(MessageType::Heartbeat)
                .source(node, ActorId::INVALID)
                .build(0),
            &[],
        ));

        let frames = walk(&bytes, &opts()).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].operation, "dispatch_message");
        assert_eq!(frames[0].dest, "5");
        assert!(frames[0].details.as_deref().unwrap().contains("request#2"));
        assert!(frames[0].payload_hex.is_some());
        assert_eq!(frames[1].operation, "heartbeat");
        assert_eq!(frames[1].offset, bytes.len() - HEADER_SIZE);
        assert!(frames[1].payload_hex.is_none());
    }

    #[test]
    fn test_walk_rejects_oversized() {
        let hdr = Header::builder(MessageType::DispatchMessage).build(4096);
        let err = walk(&frame(hdr, &[]), &opts()).unwrap_err();
        assert!(err.contains("too large"));
    }

    #[test]
    fn test_walk_rejects_truncated_payload() {
        let mut bytes = dispatch_frame(NodeId::new());
        bytes.pop();
        let err = walk(&bytes, &opts()).unwrap_err();
        assert!(err.contains("truncated payload"));
    }

    #[test]
    fn test_walk_rejects_garbage_header() {
        let err = walk(&[0xff; HEADER_SIZE], &opts()).unwrap_err();
        assert!(err.starts_with("frame 0 at offset 0"));
    }

    #[test]
    fn test_json_summary() {
        let frames = walk(&dispatch_frame(NodeId::new()), &opts()).unwrap();
        let value: serde_json::Value = serde_json::to_value(&frames[0]).unwrap();
        assert_eq!(value["operation"], "dispatch_message");
        assert_eq!(value["source_actor"], 1);
    }

    #[test]
    fn test_run_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture.bin");
        std::fs::write(&path, dispatch_frame(NodeId::new())).unwrap();
        assert!(run(&path, &opts()).is_ok());
        assert!(run(&dir.path().join("missing.bin"), &opts()).is_err());
    }
}
