//! The DFU session state machine.
//!
//! Runs the device side of the wire protocol: connect to a configured
//! server, announce READY, take the METADATA, stream chunks into flash,
//! validate the result, and CONFIRM.  The session owns no policy about
//! *when* to update; that lives in [`crate::decision`].

use core::cell::RefCell;

use asraw::{AsMutRaw, AsRaw};
use log::{debug, info, warn};
use storage::Flash;

use crate::chunk::ChunkWriter;
use crate::config::{hostname_str, ConfigRecord};
use crate::image::validate_image;
use crate::layout::MemoryMap;
use crate::wire::{
    BeginMsg, ChunkMsg, ConfirmMsg, ImageMetadata, MetadataMsg, MsgType, OkMsg, ReadyMsg,
    DFU_SERVER_PORT, MAX_CHUNK_RETRIES,
};
use crate::{Error, Result, Transport};

/// Push every byte of `bytes` through the link.
fn send_all<T: Transport>(transport: &mut T, mut bytes: &[u8]) -> Result<()> {
    while !bytes.is_empty() {
        let n = transport.send(bytes).map_err(|_| Error::Transport)?;
        if n == 0 {
            return Err(Error::Transport);
        }
        bytes = &bytes[n..];
    }
    Ok(())
}

/// Fill `buf` completely or fail.  A zero-length read means the server
/// closed the stream mid-message, which is as fatal as a broken link.
fn recv_exact<T: Transport>(transport: &mut T, buf: &mut [u8]) -> Result<()> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = transport
            .recv(&mut buf[filled..])
            .map_err(|_| Error::Transport)?;
        if n == 0 {
            return Err(Error::Transport);
        }
        filled += n;
    }
    Ok(())
}

pub struct DfuSession<'a, T, F> {
    transport: &'a mut T,
    flash: &'a RefCell<F>,
    map: MemoryMap,
}

impl<'a, T: Transport, F: Flash> DfuSession<'a, T, F> {
    pub fn new(transport: &'a mut T, flash: &'a RefCell<F>, map: MemoryMap) -> DfuSession<'a, T, F> {
        DfuSession {
            transport,
            flash,
            map,
        }
    }

    /// Find a reachable update server.
    ///
    /// Two passes over the fallback list, in slot order: first every slot
    /// with a hostname (resolved over mDNS), then every slot with a raw
    /// IP.  The configured per-slot port only gates slot validity; the
    /// connection itself always goes to [`DFU_SERVER_PORT`].
    pub fn connect(&mut self, record: &ConfigRecord) -> Result<()> {
        self.transport
            .set_recv_timeout_ms(record.socket_recv_timeout_ms);

        let candidates = record.server_candidates();
        if candidates.is_empty() {
            warn!("no usable server slots in config");
            return Err(Error::NoServer);
        }

        for candidate in candidates.iter() {
            let Some(hostname) = candidate.hostname.as_ref() else {
                continue;
            };
            let Some(name) = hostname_str(hostname) else {
                continue;
            };
            debug!("trying server by hostname: {}", name);
            let Ok(addr) = self.transport.resolve(name) else {
                continue;
            };
            if self.transport.connect(addr, DFU_SERVER_PORT).is_ok() {
                info!("connected to {} ({:?})", name, addr);
                return Ok(());
            }
        }

        for candidate in candidates.iter() {
            let Some(ip) = candidate.ip else {
                continue;
            };
            debug!("trying server by address: {:?}", ip);
            if self.transport.connect(ip, DFU_SERVER_PORT).is_ok() {
                info!("connected to {:?}", ip);
                return Ok(());
            }
        }

        warn!("no update server reachable");
        Err(Error::NoServer)
    }

    /// Run one full update over the already-connected link.  On success
    /// the target region holds a validated image and the server has been
    /// told so; the caller decides what happens next (reset, reload).
    pub fn run(&mut self) -> Result<ImageMetadata> {
        send_all(self.transport, ReadyMsg::new().as_raw())?;

        let mut meta_msg = MetadataMsg::default();
        recv_exact(self.transport, meta_msg.as_mut_raw())?;
        if meta_msg.msg_type != MsgType::Metadata as u8 {
            return Err(Error::UnexpectedMessage(meta_msg.msg_type));
        }
        let meta = ImageMetadata::parse(&meta_msg)?;
        info!(
            "update offered: {:?}, {} bytes in {} chunks",
            meta.update_type, meta.num_bytes, meta.num_chunks
        );

        let region = self.map.update_target(meta.update_type);
        if meta.num_bytes as usize > region.len() {
            return Err(Error::BadMetadata);
        }

        // The erase happens before BEGIN so the server never outruns it.
        let mut writer = ChunkWriter::new(self.flash, region);
        writer.erase_region()?;
        send_all(self.transport, BeginMsg::new().as_raw())?;

        let mut msg = ChunkMsg::default();
        for expected in 0..meta.num_chunks {
            self.next_chunk(&mut writer, &mut msg, expected)?;
        }

        match validate_image(self.flash, &region, &meta) {
            Ok(()) => {
                send_all(self.transport, ConfirmMsg::new(true).as_raw())?;
                info!("update complete");
                Ok(meta)
            }
            Err(e) => {
                // Best-effort: the link may already be gone.
                let _ = send_all(self.transport, ConfirmMsg::new(false).as_raw());
                Err(e)
            }
        }
    }

    /// Receive chunk `expected`, retrying over the NACK budget, and commit
    /// it.  Wrong tag, wrong index, or a payload CRC mismatch all get the
    /// same answer: NACK and wait for a resend.  The ACK goes out before
    /// the flash write so the server can put the next chunk on the wire
    /// while the page programs.
    fn next_chunk(
        &mut self,
        writer: &mut ChunkWriter<'a, F>,
        msg: &mut ChunkMsg,
        expected: u32,
    ) -> Result<()> {
        let mut retries = 0;
        loop {
            recv_exact(self.transport, msg.as_mut_raw())?;

            let good = msg.msg_type == MsgType::Chunk as u8
                && msg.chunk_num == expected
                && msg.chunk_num_bytes != 0
                && ChunkWriter::<F>::check_crc(msg);
            if good {
                debug!("chunk {} ok", expected);
                send_all(self.transport, OkMsg::ack().as_raw())?;
                return writer.write(msg);
            }

            retries += 1;
            warn!(
                "chunk {} rejected ({}/{})",
                expected, retries, MAX_CHUNK_RETRIES
            );
            send_all(self.transport, OkMsg::nack().as_raw())?;
            if retries >= MAX_CHUNK_RETRIES {
                return Err(Error::RetriesExhausted);
            }
        }
    }
}
