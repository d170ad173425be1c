//! Shared fixtures: a scripted network link and wire-frame builders.

// Not every test binary uses every fixture.
#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;

use asraw::AsRaw;
use boot::{
    crc32, ChunkMsg, ConfigRecord, Ipv4Addr, LinkError, MetadataMsg, MsgType, Transport,
    UpdateType, CHUNK_SIZE,
};
use simflash::SimFlash;

/// A transport whose receive side replays a pre-recorded byte stream and
/// whose send side records everything, so a test can assert on the exact
/// conversation.
pub struct ScriptedTransport {
    rx: VecDeque<u8>,
    pub tx: Vec<u8>,
    hosts: Vec<(String, Ipv4Addr)>,
    reachable: Vec<Ipv4Addr>,
    /// Every connect attempt, in order, reachable or not.
    pub connects: Vec<(Ipv4Addr, u16)>,
    pub timeout_ms: Option<u32>,
    recv_limit: usize,
}

impl ScriptedTransport {
    pub fn new() -> ScriptedTransport {
        ScriptedTransport {
            rx: VecDeque::new(),
            tx: Vec::new(),
            hosts: Vec::new(),
            reachable: Vec::new(),
            connects: Vec::new(),
            timeout_ms: None,
            recv_limit: usize::MAX,
        }
    }

    /// Make `name` resolvable to `ip`.
    pub fn host(mut self, name: &str, ip: Ipv4Addr) -> ScriptedTransport {
        self.hosts.push((name.to_string(), ip));
        self
    }

    /// Make connects to `ip` succeed.
    pub fn reachable(mut self, ip: Ipv4Addr) -> ScriptedTransport {
        self.reachable.push(ip);
        self
    }

    /// Cap how many bytes a single `recv` returns, to exercise the
    /// partial-read path.
    pub fn recv_limit(mut self, limit: usize) -> ScriptedTransport {
        self.recv_limit = limit;
        self
    }

    /// Queue bytes for the device to receive.
    pub fn script(&mut self, bytes: &[u8]) {
        self.rx.extend(bytes.iter().copied());
    }
}

impl Transport for ScriptedTransport {
    fn resolve(&mut self, hostname: &str) -> Result<Ipv4Addr, LinkError> {
        self.hosts
            .iter()
            .find(|(name, _)| name == hostname)
            .map(|(_, ip)| *ip)
            .ok_or(LinkError)
    }

    fn connect(&mut self, addr: Ipv4Addr, port: u16) -> Result<(), LinkError> {
        self.connects.push((addr, port));
        if self.reachable.contains(&addr) {
            Ok(())
        } else {
            Err(LinkError)
        }
    }

    fn send(&mut self, bytes: &[u8]) -> Result<usize, LinkError> {
        self.tx.extend_from_slice(bytes);
        Ok(bytes.len())
    }

    fn recv(&mut self, buf: &mut [u8]) -> Result<usize, LinkError> {
        if self.rx.is_empty() {
            return Err(LinkError);
        }
        let n = buf.len().min(self.recv_limit).min(self.rx.len());
        for slot in buf[..n].iter_mut() {
            *slot = self.rx.pop_front().ok_or(LinkError)?;
        }
        Ok(n)
    }

    fn set_recv_timeout_ms(&mut self, ms: u32) {
        self.timeout_ms = Some(ms);
    }
}

/// The METADATA frame a server would send for `image`.
pub fn metadata_frame(update_type: UpdateType, image: &[u8]) -> Vec<u8> {
    let msg = MetadataMsg {
        msg_type: MsgType::Metadata as u8,
        img_crc: crc32(image),
        img_num_chunks: image.len().div_ceil(CHUNK_SIZE) as u32,
        img_num_bytes: image.len() as u32,
        update_type: update_type as u8,
    };
    msg.as_raw().to_vec()
}

/// One CHUNK frame carrying `payload` at index `num`.
pub fn chunk_frame(num: u32, payload: &[u8]) -> Vec<u8> {
    let mut msg = ChunkMsg {
        msg_type: MsgType::Chunk as u8,
        chunk_num: num,
        chunk_num_bytes: payload.len() as u32,
        ..Default::default()
    };
    msg.chunk_data[..payload.len()].copy_from_slice(payload);
    msg.chunk_crc32 = crc32(payload);
    msg.as_raw().to_vec()
}

/// A CHUNK frame whose payload was flipped after the CRC was computed,
/// as corruption in flight would leave it.
pub fn corrupt_chunk_frame(num: u32, payload: &[u8]) -> Vec<u8> {
    let mut frame = chunk_frame(num, payload);
    // First payload byte lives after the 9-byte header.
    frame[9] ^= 0x01;
    frame
}

/// Every chunk of `image`, in order, concatenated.
pub fn chunk_frames(image: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    for (num, payload) in image.chunks(CHUNK_SIZE).enumerate() {
        out.extend_from_slice(&chunk_frame(num as u32, payload));
    }
    out
}

/// A plausible provisioned record: one mDNS server, one raw-IP fallback.
pub fn provisioned_record() -> ConfigRecord {
    let mut rec = ConfigRecord::blank();
    rec.anchor_id = 7;
    rec.socket_recv_timeout_ms = 2500;
    rec.mac_addr = [0x02, 0x00, 0x00, 0xAB, 0xCD, 0x07];
    rec.set_server(0, Some("anchor-server.local"), None, 6900);
    rec.set_server(1, None, Some([192, 168, 1, 50]), 6900);
    rec.seal();
    rec
}

/// Write a record straight into a config page, bypassing NOR rules.
pub fn install_record(flash: &RefCell<SimFlash>, rec: &ConfigRecord, addr: u32) {
    flash
        .borrow_mut()
        .install(rec.as_raw(), addr)
        .expect("record fits in page");
}
