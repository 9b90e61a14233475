#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use wfxlink_bh::LinkTrigger;
use wfxlink_bus::{round_up, SimChip};
use wfxlink_frame::{
    encode_message, encrypted_len, CryptoError, Envelope, Message, SecureLink, LEN_FIELD_SIZE,
    SL_BLOCK_SIZE, SL_HEADER_SIZE, SL_TAG_SIZE,
};

/// Keystream cipher with the secure-link geometry and a checksum tag.
pub struct StreamCipher {
    seed: u8,
    counter: u32,
    secure_ids: Vec<u8>,
}

impl StreamCipher {
    pub fn new(seed: u8, secure_ids: &[u8]) -> Self {
        Self {
            seed,
            counter: 0,
            secure_ids: secure_ids.to_vec(),
        }
    }

    fn keystream(&self, i: usize) -> u8 {
        self.seed.wrapping_add((i as u8).wrapping_mul(31))
    }

    fn tag(&self, ciphertext: &[u8]) -> [u8; SL_TAG_SIZE] {
        let mut tag = [0u8; SL_TAG_SIZE];
        for (i, byte) in ciphertext.iter().enumerate() {
            tag[i % SL_TAG_SIZE] ^= byte.rotate_left((i % 8) as u32);
        }
        tag[0] ^= self.seed;
        tag
    }
}

impl SecureLink for StreamCipher {
    fn requires_security(&self, id: u8) -> bool {
        self.secure_ids.contains(&id)
    }

    fn encode(&mut self, plain: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let word = (self.counter & 0x3FFF_FFFF) | (0b10 << 30);
        self.counter += 1;

        let mut region = plain[LEN_FIELD_SIZE..].to_vec();
        region.resize(round_up(region.len(), SL_BLOCK_SIZE), 0);
        for (i, byte) in region.iter_mut().enumerate() {
            *byte ^= self.keystream(i);
        }

        let mut out = Vec::with_capacity(encrypted_len(plain.len()));
        out.extend_from_slice(&word.to_le_bytes());
        out.extend_from_slice(&(plain.len() as u16).to_le_bytes());
        out.extend_from_slice(&region);
        out.extend_from_slice(&self.tag(&region));
        Ok(out)
    }

    fn decode(&mut self, raw: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if raw.len() < SL_HEADER_SIZE + SL_TAG_SIZE {
            return Err(CryptoError::Malformed("short envelope".to_string()));
        }
        let plain_len = u16::from_le_bytes([raw[4], raw[5]]) as usize;
        let region = &raw[SL_HEADER_SIZE..raw.len() - SL_TAG_SIZE];
        if self.tag(region) != raw[raw.len() - SL_TAG_SIZE..] {
            return Err(CryptoError::TagMismatch);
        }
        if plain_len < LEN_FIELD_SIZE || plain_len - LEN_FIELD_SIZE > region.len() {
            return Err(CryptoError::Malformed(format!("length {plain_len}")));
        }

        let mut plain = (plain_len as u16).to_le_bytes().to_vec();
        plain.extend(
            region[..plain_len - LEN_FIELD_SIZE]
                .iter()
                .enumerate()
                .map(|(i, byte)| byte ^ self.keystream(i)),
        );
        Ok(plain)
    }
}

/// Raw bytes of a cleartext chip-to-host message.
pub fn chip_message(id: u8, seq: u8, body: &[u8]) -> Vec<u8> {
    encode_message(&Envelope::new(id, body.to_vec()), seq, None)
        .expect("message should encode")
        .to_vec()
}

/// Firmware that confirms every request with an empty confirmation.
pub fn auto_confirm(chip: &SimChip) {
    let mut seq = 0u8;
    chip.set_responder(move |buf| {
        let reply = chip_message(buf[2], seq, &[]);
        seq = (seq + 1) % 8;
        vec![reply]
    });
}

/// Collects dispatched messages.
pub fn collector() -> (
    Arc<Mutex<Vec<Message>>>,
    impl FnMut(Message) + Send + 'static,
) {
    let received = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&received);
    (received, move |msg: Message| {
        sink.lock().expect("collector lock").push(msg)
    })
}

/// Forwards simulated interrupts to the link until dropped.
pub struct IrqThread {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl IrqThread {
    pub fn start(chip: &SimChip, trigger: LinkTrigger) -> Self {
        let chip = chip.clone();
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let thread = thread::spawn(move || {
            while !flag.load(Ordering::Acquire) {
                if chip.wait_irq(Duration::from_millis(5)) && trigger.request_receive().is_err() {
                    break;
                }
            }
        });
        Self {
            stop,
            thread: Some(thread),
        }
    }
}

impl Drop for IrqThread {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}
