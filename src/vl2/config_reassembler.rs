// (c) 2020-2022 ZeroTier, Inc. -- currently propritery pending actual release and licensing. See LICENSE.md.

use std::collections::BTreeMap;

/// Upper bound on the total size of a reassembled netconf dictionary. Anything claiming a
/// larger total is rejected outright rather than accumulated.
pub const DICT_CAPACITY: usize = 1024 * 128;

/// Collects chunked configuration replies keyed by an in-reply packet id, reassembling them
/// in byte-offset order. A new packet id or an overflowing total silently resets accumulated
/// state -- there is no cancellation model here beyond "a fresher request superseded this one."
#[derive(Debug, Default)]
pub struct ConfigReassembler {
    in_reply_packet_id: Option<u64>,
    total_size: usize,
    chunks: BTreeMap<usize, Vec<u8>>,
    accumulated: usize,
}

impl ConfigReassembler {
    pub fn new() -> ConfigReassembler {
        ConfigReassembler::default()
    }

    /// Begin tracking a new outgoing request's packet id, discarding any prior in-progress
    /// reassembly.
    pub fn begin(&mut self, packet_id: u64) {
        self.in_reply_packet_id = Some(packet_id);
        self.total_size = 0;
        self.chunks.clear();
        self.accumulated = 0;
    }

    /// Feed in one chunk of a chunked netconf reply. Returns the fully reassembled dictionary
    /// bytes once every chunk has arrived, or `None` if reassembly is still in progress (or the
    /// chunk was rejected/reset).
    pub fn handle_chunk(&mut self, in_re_packet_id: u64, data: &[u8], offset: usize, total_size: usize) -> Option<Vec<u8>> {
        if Some(in_re_packet_id) != self.in_reply_packet_id {
            return None;
        }
        if total_size >= DICT_CAPACITY {
            self.reset();
            return None;
        }
        if offset.checked_add(data.len())? > total_size {
            self.reset();
            return None;
        }

        self.total_size = total_size;
        if self.chunks.insert(offset, data.to_vec()).is_none() {
            self.accumulated += data.len();
        } else {
            // Re-delivery of a previously seen offset: replace in place without double-counting.
            self.accumulated = self.chunks.values().map(|c| c.len()).sum();
        }

        if self.accumulated > total_size {
            self.reset();
            return None;
        }
        if self.accumulated == total_size && total_size > 0 {
            let mut out = Vec::with_capacity(total_size);
            for (_, chunk) in self.chunks.iter() {
                out.extend_from_slice(chunk);
            }
            self.reset();
            return Some(out);
        }
        None
    }

    fn reset(&mut self) {
        self.in_reply_packet_id = None;
        self.total_size = 0;
        self.chunks.clear();
        self.accumulated = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reassembles_two_chunks_in_order() {
        let mut r = ConfigReassembler::new();
        r.begin(42);
        assert!(r.handle_chunk(42, &[0u8; 100], 0, 200).is_none());
        let out = r.handle_chunk(42, &[1u8; 100], 100, 200).unwrap();
        assert_eq!(out.len(), 200);
        assert_eq!(&out[0..100], &[0u8; 100][..]);
        assert_eq!(&out[100..200], &[1u8; 100][..]);
    }

    #[test]
    fn redelivery_of_same_chunk_does_not_double_count() {
        let mut r = ConfigReassembler::new();
        r.begin(42);
        assert!(r.handle_chunk(42, &[0u8; 100], 0, 200).is_none());
        assert!(r.handle_chunk(42, &[0u8; 100], 0, 200).is_none());
        let out = r.handle_chunk(42, &[1u8; 100], 100, 200).unwrap();
        assert_eq!(out.len(), 200);
    }

    #[test]
    fn wrong_packet_id_is_ignored() {
        let mut r = ConfigReassembler::new();
        r.begin(42);
        assert!(r.handle_chunk(99, &[0u8; 100], 0, 200).is_none());
    }

    #[test]
    fn oversized_total_is_rejected() {
        let mut r = ConfigReassembler::new();
        r.begin(1);
        assert!(r.handle_chunk(1, &[0u8; 10], 0, DICT_CAPACITY).is_none());
        assert!(r.handle_chunk(1, &[0u8; 10], 0, 10).is_none());
    }

    #[test]
    fn new_begin_resets_prior_progress() {
        let mut r = ConfigReassembler::new();
        r.begin(1);
        assert!(r.handle_chunk(1, &[0u8; 10], 0, 20).is_none());
        r.begin(2);
        assert!(r.handle_chunk(1, &[0u8; 10], 10, 20).is_none());
    }
}
