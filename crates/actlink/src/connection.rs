//! High-level netlink connection for action chain operations.

use std::ops::ControlFlow;
use std::sync::Arc;

use tracing::debug;

use crate::act::{
    DeleteRequest, build_add_request, build_change_request, build_delete_request,
    build_dump_request, parse_action_message, parse_and_deliver,
};
use crate::action::{Action, ActionChain, LinkResolver};
use crate::codec::CodecRegistry;
use crate::error::{Error, Result};
use crate::message::{MessageIter, NLMSG_HDRLEN, NlMsgError};
use crate::socket::NetlinkSocket;

/// High-level connection to the kernel's action subsystem.
pub struct Connection {
    socket: NetlinkSocket,
}

impl Connection {
    /// Open a routing-socket connection.
    pub fn new() -> Result<Self> {
        Ok(Self {
            socket: NetlinkSocket::new()?,
        })
    }

    /// Get the underlying socket.
    pub fn socket(&self) -> &NetlinkSocket {
        &self.socket
    }

    /// Patch sequence and port ID into a finished message.
    fn prepare(&self, msg: &mut [u8], seq: u32) {
        msg[8..12].copy_from_slice(&seq.to_ne_bytes());
        msg[12..16].copy_from_slice(&self.socket.pid().to_ne_bytes());
    }

    /// Send a request that expects an ACK only (no data response).
    async fn request_ack(&self, mut msg: Vec<u8>) -> Result<()> {
        let seq = self.socket.next_seq();
        self.prepare(&mut msg, seq);
        self.socket.send(&msg).await?;

        let response = self.socket.recv_msg().await?;
        self.process_ack(&response, seq)
    }

    /// Send a dump request and collect all response messages.
    async fn dump(&self, mut msg: Vec<u8>) -> Result<Vec<Vec<u8>>> {
        let seq = self.socket.next_seq();
        self.prepare(&mut msg, seq);
        self.socket.send(&msg).await?;

        let mut responses = Vec::new();
        loop {
            let data = self.socket.recv_msg().await?;
            if collect_dump_messages(&data, seq, &mut responses)? {
                break;
            }
        }
        Ok(responses)
    }

    /// Process an ACK response.
    fn process_ack(&self, data: &[u8], expected_seq: u32) -> Result<()> {
        for result in MessageIter::new(data) {
            let (header, payload) = result?;

            if header.nlmsg_seq != expected_seq {
                continue;
            }

            if header.is_error() {
                let err = NlMsgError::from_bytes(payload)?;
                if !err.is_ack() {
                    return Err(Error::from_errno(err.error));
                }
                return Ok(());
            }
        }

        Err(Error::InvalidMessage("expected ACK message".into()))
    }

    /// Install a chain of actions in the kernel.
    ///
    /// `flags` may add NLM_F_CREATE or NLM_F_EXCL.
    pub async fn add_actions(
        &self,
        chain: &ActionChain,
        registry: &CodecRegistry,
        flags: u16,
    ) -> Result<()> {
        let msg = build_add_request(chain, registry, flags)?;
        debug!(actions = chain.len(), "adding actions");
        self.request_ack(msg).await
    }

    /// Replace existing actions in the kernel.
    pub async fn change_actions(
        &self,
        chain: &ActionChain,
        registry: &CodecRegistry,
        flags: u16,
    ) -> Result<()> {
        let msg = build_change_request(chain, registry, flags)?;
        debug!(actions = chain.len(), "changing actions");
        self.request_ack(msg).await
    }

    /// Delete the action binding identified by the request.
    pub async fn delete_action(&self, request: &DeleteRequest, flags: u16) -> Result<()> {
        let msg = build_delete_request(request, flags)?;
        debug!(ifindex = request.ifindex, handle = request.handle, "deleting action");
        self.request_ack(msg).await
    }

    /// Dump all installed actions, one chain per kernel message.
    pub async fn get_actions(&self, registry: &CodecRegistry) -> Result<Vec<ActionChain>> {
        let responses = self.dump(build_dump_request()).await?;
        let mut chains = Vec::with_capacity(responses.len());
        for response in responses {
            chains.push(parse_action_message(&response, registry, None)?);
        }
        Ok(chains)
    }

    /// Dump all installed actions, delivering each record to a
    /// callback as its message is parsed. Links are resolved through
    /// the given resolver.
    pub async fn get_actions_with<F>(
        &self,
        registry: &CodecRegistry,
        resolver: Option<&dyn LinkResolver>,
        mut deliver: F,
    ) -> Result<Vec<ActionChain>>
    where
        F: FnMut(&Arc<Action>) -> ControlFlow<()>,
    {
        let responses = self.dump(build_dump_request()).await?;
        let mut chains = Vec::with_capacity(responses.len());
        for response in responses {
            chains.push(parse_and_deliver(&response, registry, resolver, &mut deliver)?);
        }
        Ok(chains)
    }

    /// Subscribe to a multicast group for monitoring.
    pub fn subscribe(&mut self, group: u32) -> Result<()> {
        self.socket.add_membership(group)
    }

    /// Receive the next event message (for monitoring).
    pub async fn recv_event(&self) -> Result<Vec<u8>> {
        self.socket.recv_msg().await
    }
}

/// Fold one received datagram into the dump results. Returns true once
/// the DONE message is seen. ACKs and messages from other sequences
/// are skipped, never collected.
fn collect_dump_messages(data: &[u8], seq: u32, responses: &mut Vec<Vec<u8>>) -> Result<bool> {
    for result in MessageIter::new(data) {
        let (header, payload) = result?;

        if header.nlmsg_seq != seq {
            continue;
        }

        if header.is_error() {
            let err = NlMsgError::from_bytes(payload)?;
            if !err.is_ack() {
                return Err(Error::from_errno(err.error));
            }
            continue;
        }

        if header.is_done() {
            return Ok(true);
        }

        // Collect the full message (header + payload)
        let msg_len = header.nlmsg_len as usize;
        let msg_start = payload.as_ptr() as usize - data.as_ptr() as usize - NLMSG_HDRLEN;
        if msg_start + msg_len <= data.len() {
            responses.push(data[msg_start..msg_start + msg_len].to_vec());
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{NlMsgHdr, NlMsgType};

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn connection_is_send_sync() {
        assert_send::<Connection>();
        assert_sync::<Connection>();
    }

    fn push_message(buf: &mut Vec<u8>, msg_type: u16, seq: u32, payload: &[u8]) {
        let mut hdr = NlMsgHdr::new(msg_type, 0);
        hdr.nlmsg_seq = seq;
        hdr.nlmsg_len = (NLMSG_HDRLEN + payload.len()) as u32;
        buf.extend_from_slice(hdr.as_bytes());
        buf.extend_from_slice(payload);
    }

    fn error_payload(error: i32) -> Vec<u8> {
        let mut payload = error.to_ne_bytes().to_vec();
        payload.extend_from_slice(NlMsgHdr::new(NlMsgType::RTM_GETACTION, 0).as_bytes());
        payload
    }

    #[test]
    fn test_dump_skips_acks_and_foreign_sequences() {
        let mut data = Vec::new();
        push_message(&mut data, NlMsgType::RTM_NEWACTION, 7, &[0u8; 4]);
        push_message(&mut data, NlMsgType::ERROR, 7, &error_payload(0)); // ACK
        push_message(&mut data, NlMsgType::RTM_NEWACTION, 99, &[0u8; 4]); // wrong seq
        push_message(&mut data, NlMsgType::DONE, 7, &[0u8; 4]);

        let mut responses = Vec::new();
        let done = collect_dump_messages(&data, 7, &mut responses).unwrap();

        assert!(done);
        assert_eq!(responses.len(), 1);
        let header = NlMsgHdr::from_bytes(&responses[0]).unwrap();
        assert_eq!(header.nlmsg_type, NlMsgType::RTM_NEWACTION);
        assert_eq!(header.nlmsg_seq, 7);
    }

    #[test]
    fn test_dump_surfaces_kernel_error() {
        let mut data = Vec::new();
        push_message(&mut data, NlMsgType::ERROR, 7, &error_payload(-1)); // EPERM

        let mut responses = Vec::new();
        let err = collect_dump_messages(&data, 7, &mut responses).unwrap_err();
        assert!(err.is_permission_denied());
        assert!(responses.is_empty());
    }

    #[test]
    fn test_dump_not_done_without_done_message() {
        let mut data = Vec::new();
        push_message(&mut data, NlMsgType::RTM_NEWACTION, 7, &[0u8; 4]);

        let mut responses = Vec::new();
        assert!(!collect_dump_messages(&data, 7, &mut responses).unwrap());
        assert_eq!(responses.len(), 1);
    }
}
